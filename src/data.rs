use crate::models::{ModelAnswer, Question};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Answers keyed by model name, then by question uid
pub type AnswerIndex = HashMap<String, HashMap<String, ModelAnswer>>;

/// Judged question uids keyed by model name
pub type JudgedIndex = HashMap<String, HashSet<String>>;

/// Parse a JSON-lines file, failing on the first malformed line
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON at {}:{}", path.display(), index + 1))
        })
        .collect()
}

/// Load the benchmark questions
pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let questions: Vec<Question> = read_jsonl(path)?;
    debug!(count = questions.len(), path = %path.display(), "Loaded questions");
    Ok(questions)
}

/// All `*.jsonl` files of a directory, in name order
fn jsonl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;

    files.retain(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl"));
    files.sort();
    Ok(files)
}

/// Load every model's answers from a directory of JSON-lines files.
///
/// Records are keyed by their `model` field, or by the file stem when it is
/// empty. A later record for the same uid replaces an earlier one.
pub fn load_model_answers(dir: &Path) -> Result<AnswerIndex> {
    let mut index = AnswerIndex::new();

    for path in jsonl_files(dir)? {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let answers: Vec<ModelAnswer> = read_jsonl(&path)?;
        debug!(count = answers.len(), path = %path.display(), "Loaded model answers");

        for answer in answers {
            let model = if answer.model.is_empty() {
                stem.clone()
            } else {
                answer.model.clone()
            };
            index
                .entry(model)
                .or_default()
                .insert(answer.uid.clone(), answer);
        }
    }

    Ok(index)
}

#[derive(Deserialize)]
struct JudgedLine {
    uid: String,
    model: String,
}

/// Uids already judged for `model` in one output file.
///
/// Distinct model names can share a file once made filesystem safe, so
/// only records whose `model` matches count. A missing file means nothing
/// was judged yet. Lines that do not parse (a write cut short by an
/// interrupted run) are skipped with a warning.
pub fn load_judged_uids(path: &Path, model: &str) -> Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read judgments: {}", path.display()))?;

    let mut uids = HashSet::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JudgedLine>(line) {
            Ok(judged) if judged.model == model => {
                uids.insert(judged.uid);
            }
            Ok(_) => {}
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                "Skipping unreadable judgment line: {}",
                e
            ),
        }
    }

    Ok(uids)
}
