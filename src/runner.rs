use crate::backend::{JudgeBackend, build_backend};
use crate::config::Config;
use crate::data::{self, JudgedIndex};
use crate::judge::Judge;
use crate::models::RunSummary;
use crate::output::judgment_file;
use crate::planner::{self, Task};
use crate::scheduler::Scheduler;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Main runner that orchestrates a judging run
pub struct Runner {
    config: Config,
    backend: Arc<dyn JudgeBackend>,
}

impl Runner {
    /// Create a runner talking to the configured judge endpoint
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let backend = build_backend(&config.endpoint)?;
        Ok(Self::with_backend(config, backend))
    }

    /// Create a runner with an explicit judge backend
    pub fn with_backend(config: Config, backend: Arc<dyn JudgeBackend>) -> Self {
        Self { config, backend }
    }

    /// Judge every model answer that has no judgment yet
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let run = &self.config.run;

        info!(
            judge_model = %run.judge_model,
            temperature = run.temperature,
            max_tokens = run.max_tokens,
            "Starting judgment run"
        );
        if run.reference.is_enabled() {
            info!(models = ?run.reference.models(), "Using reference answers");
        }

        let questions = data::load_questions(&run.question_file())?;
        self.config.validate_categories(&questions)?;
        let answers = data::load_model_answers(&run.answer_dir())?;

        self.ensure_output_dir()?;
        let judged = self.load_existing_judgments()?;

        let plan = planner::plan(&questions, &answers, &judged, &self.config);
        info!(
            tasks = plan.tasks.len(),
            existing = plan.existing,
            "Planned judgment tasks"
        );

        let mut summary = RunSummary {
            judge_model: run.judge_model.clone(),
            planned: plan.tasks.len(),
            existing: plan.existing,
            skipped_missing_answer: plan.skipped_missing_answer,
            skipped_missing_baseline: plan.skipped_missing_baseline,
            skipped_missing_reference: plan.skipped_missing_reference,
            models_without_answers: plan.models_without_answers,
            ..Default::default()
        };

        let judge = Arc::new(Judge::new(&self.config, Arc::clone(&self.backend))?);
        let scheduler = Scheduler::new(self.config.endpoint.parallel, run.batch_size);
        let report = scheduler
            .run(plan.tasks, move |task: Task| {
                let judge = Arc::clone(&judge);
                async move {
                    judge.run_judgment(&task).await.map(|_| ()).with_context(|| {
                        format!("Judging {} on {} failed", task.model, task.question.uid)
                    })
                }
            })
            .await;

        summary.completed = report.completed;
        summary.failed = report.failed;
        summary.batches = report.batches;

        info!(
            completed = summary.completed,
            failed = summary.failed,
            "Judgment run finished"
        );
        Ok(summary)
    }

    /// Ensure the judge's output directory exists
    fn ensure_output_dir(&self) -> Result<()> {
        let dir = self.config.run.judgment_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))
    }

    /// Read the uids already judged for each configured model
    fn load_existing_judgments(&self) -> Result<JudgedIndex> {
        let dir = self.config.run.judgment_dir();
        self.config
            .run
            .model_list
            .iter()
            .map(|model| {
                let uids = data::load_judged_uids(&judgment_file(&dir, model), model)?;
                Ok((model.clone(), uids))
            })
            .collect()
    }
}
