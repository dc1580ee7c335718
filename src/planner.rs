use crate::config::Config;
use crate::data::{AnswerIndex, JudgedIndex};
use crate::models::Question;
use crate::output::judgment_file;
use std::path::PathBuf;
use tracing::{info, warn};

/// One unit of work: judge `model` against `baseline` on one question
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub question: Question,
    pub model: String,
    pub answer: String,
    pub baseline: String,
    pub baseline_answer: String,
    /// Reference answers in configured order, empty without references
    pub references: Vec<String>,
    /// Judgment file the record is appended to
    pub output_file: PathBuf,
}

/// Planned tasks plus the units left out and why
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub tasks: Vec<Task>,
    pub existing: usize,
    pub skipped_missing_answer: usize,
    pub skipped_missing_baseline: usize,
    pub skipped_missing_reference: usize,
    pub models_without_answers: Vec<String>,
}

fn answer_text<'a>(answers: &'a AnswerIndex, model: &str, uid: &str) -> Option<&'a str> {
    answers.get(model)?.get(uid)?.answer_text()
}

/// Compute the remaining work for every configured model and question.
///
/// Pure over its inputs: units already present in `judged` are skipped, as
/// are units whose answer, baseline answer or reference answers are missing.
pub fn plan(
    questions: &[Question],
    answers: &AnswerIndex,
    judged: &JudgedIndex,
    config: &Config,
) -> Plan {
    let mut plan = Plan::default();
    let judgment_dir = config.run.judgment_dir();
    let reference_models = config.run.reference.models();

    for model in &config.run.model_list {
        if !answers.contains_key(model) {
            warn!("No answers found for model {}. Skipping.", model);
            plan.models_without_answers.push(model.clone());
            continue;
        }

        let output_file = judgment_file(&judgment_dir, model);
        let mut existing = 0;

        for question in questions {
            let uid = &question.uid;

            let Some(answer) = answer_text(answers, model, uid) else {
                warn!("{} answer to {} cannot be found.", model, uid);
                plan.skipped_missing_answer += 1;
                continue;
            };

            if judged.get(model).is_some_and(|uids| uids.contains(uid)) {
                existing += 1;
                continue;
            }

            let Some(settings) = config.categories.get(&question.category) else {
                warn!("No judge settings for category {} of {}.", question.category, uid);
                plan.skipped_missing_baseline += 1;
                continue;
            };

            let Some(baseline_answer) = answer_text(answers, &settings.baseline, uid) else {
                warn!("Baseline {} answer to {} cannot be found.", settings.baseline, uid);
                plan.skipped_missing_baseline += 1;
                continue;
            };

            let references: Option<Vec<String>> = reference_models
                .iter()
                .map(|reference| {
                    let text = answer_text(answers, reference, uid);
                    if text.is_none() {
                        warn!("Reference {} answer to {} cannot be found.", reference, uid);
                    }
                    text.map(str::to_string)
                })
                .collect();
            let Some(references) = references else {
                plan.skipped_missing_reference += 1;
                continue;
            };

            plan.tasks.push(Task {
                question: question.clone(),
                model: model.clone(),
                answer: answer.to_string(),
                baseline: settings.baseline.clone(),
                baseline_answer: baseline_answer.to_string(),
                references,
                output_file: output_file.clone(),
            });
        }

        if existing > 0 {
            info!("{} existing judgments for model {}", existing, model);
        }
        plan.existing += existing;
    }

    plan
}
