use crate::backend::{CompletionRequest, JudgeBackend};
use crate::config::{Config, JudgeSettings, RunConfig};
use crate::extract::ScorePatterns;
use crate::models::{ChatMessage, Game, JudgmentRecord, Question};
use crate::output::JudgmentWriter;
use crate::planner::Task;
use crate::template;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Template arguments for one game
pub fn prompt_args(
    question: &str,
    answer_a: &str,
    answer_b: &str,
    references: &[String],
) -> Vec<(String, String)> {
    let mut args = vec![
        ("QUESTION".to_string(), question.to_string()),
        ("ANSWER_A".to_string(), answer_a.to_string()),
        ("ANSWER_B".to_string(), answer_b.to_string()),
    ];

    if let Some(first) = references.first() {
        args.push(("REFERENCE".to_string(), first.clone()));
    }
    for (i, reference) in references.iter().enumerate() {
        args.push((format!("REFERENCE_{}", i + 1), reference.clone()));
    }

    args
}

/// Runs pairwise games against the judge and persists judgment records
pub struct Judge {
    backend: Arc<dyn JudgeBackend>,
    run: RunConfig,
    model_name: String,
    patterns: ScorePatterns,
    categories: HashMap<String, JudgeSettings>,
    writer: JudgmentWriter,
}

impl Judge {
    pub fn new(config: &Config, backend: Arc<dyn JudgeBackend>) -> Result<Self> {
        let patterns = ScorePatterns::compile(config.run.regex_patterns.as_slice())?;
        if patterns.is_empty() {
            warn!("No regex_patterns configured, every score will be absent");
        } else {
            debug!(patterns = patterns.len(), "Compiled verdict patterns");
        }

        Ok(Self {
            backend,
            run: config.run.clone(),
            model_name: config.judge_model_name().to_string(),
            patterns,
            categories: config.categories.clone(),
            writer: JudgmentWriter::new(),
        })
    }

    /// Build the system and user messages for one game
    pub fn build_messages(
        &self,
        question: &Question,
        left: &str,
        right: &str,
        references: &[String],
        settings: &JudgeSettings,
    ) -> Result<Vec<ChatMessage>> {
        let args = prompt_args(&question.prompt, left, right, references);
        let user_prompt = template::render(&self.run.prompt_template, &args)
            .with_context(|| format!("Failed to render prompt for question {}", question.uid))?;

        Ok(vec![
            ChatMessage::system(settings.system_prompt.clone()),
            ChatMessage::user(user_prompt),
        ])
    }

    /// Judge one comparison with `left` in slot A and `right` in slot B.
    ///
    /// A failed judge call yields `Ok(None)`; no judgment is fabricated.
    pub async fn run_game(
        &self,
        question: &Question,
        left: &str,
        right: &str,
        references: &[String],
        settings: &JudgeSettings,
    ) -> Result<Option<Game>> {
        let messages = self.build_messages(question, left, right, references, settings)?;
        let request = CompletionRequest {
            model: self.model_name.clone(),
            messages,
            temperature: self.run.temperature,
            max_tokens: self.run.max_tokens,
        };

        let output = match self.backend.complete(&request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(uid = %question.uid, "Judge call failed: {:#}", e);
                return Ok(None);
            }
        };

        let score = self.patterns.extract(&output.answer);
        if score.is_none() {
            debug!(uid = %question.uid, "No verdict found in judge output");
        }

        Ok(Some(Game {
            score,
            judgment: output,
            prompt: request.messages,
        }))
    }

    /// Judge one task in both slot orders and append the record to its output file
    pub async fn run_judgment(&self, task: &Task) -> Result<JudgmentRecord> {
        let question = &task.question;
        let settings = self
            .categories
            .get(&question.category)
            .with_context(|| format!("No judge settings for category {}", question.category))?;

        let baseline_first = self
            .run_game(
                question,
                &task.baseline_answer,
                &task.answer,
                &task.references,
                settings,
            )
            .await?;
        let model_first = self
            .run_game(
                question,
                &task.answer,
                &task.baseline_answer,
                &task.references,
                settings,
            )
            .await?;

        let record = JudgmentRecord {
            uid: question.uid.clone(),
            category: question.category.clone(),
            judge: self.run.judge_model.clone(),
            model: task.model.clone(),
            baseline: task.baseline.clone(),
            games: [baseline_first, model_first],
        };

        self.writer.append(&task.output_file, &record).await?;
        debug!(
            uid = %record.uid,
            model = %record.model,
            scores = ?record.games.iter().map(|g| g.as_ref().and_then(|g| g.score.clone())).collect::<Vec<_>>(),
            "Judgment written"
        );

        Ok(record)
    }
}
