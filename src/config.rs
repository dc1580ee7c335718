use crate::extract::ScorePatterns;
use crate::judge::prompt_args;
use crate::models::Question;
use crate::template;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reference answers setting: `false` or a list of reference model names
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ReferenceSetting {
    Flag(bool),
    Models(Vec<String>),
}

impl Default for ReferenceSetting {
    fn default() -> Self {
        ReferenceSetting::Flag(false)
    }
}

impl ReferenceSetting {
    /// Reference model names, empty when references are disabled
    pub fn models(&self) -> &[String] {
        match self {
            ReferenceSetting::Flag(_) => &[],
            ReferenceSetting::Models(models) => models,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.models().is_empty()
    }
}

/// Settings for one judging run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Benchmark name, selects the data directory
    pub bench_name: String,
    /// Judge model name, also names the judgment output directory
    pub judge_model: String,
    /// Reference answers included in every judge prompt
    #[serde(default)]
    pub reference: ReferenceSetting,
    /// Judge sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum tokens for a judge completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Models to judge against their category baseline
    pub model_list: Vec<String>,
    /// User prompt template with {QUESTION}, {ANSWER_A}, {ANSWER_B} placeholders
    pub prompt_template: String,
    /// Verdict patterns, tried in order
    #[serde(default)]
    pub regex_patterns: Vec<String>,
    /// Root of the benchmark data tree
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Number of tasks submitted to the worker pool at a time
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Which provider protocol the judge endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Openai,
    Anthropic,
}

/// Connection settings for the judge endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointSettings {
    pub api_type: ApiType,
    /// Model name sent to the provider, defaults to the run's judge model
    #[serde(default)]
    pub model_name: Option<String>,
    /// API base URL, provider default when absent
    #[serde(default)]
    pub api_base: Option<String>,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Number of concurrent judge tasks
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    /// Rate limit for judge requests per second, 0 disables it
    #[serde(default)]
    pub rate_limit_rps: f64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointSettings {
    /// Minimum spacing between judge requests, `None` when rate limiting is off
    pub fn request_interval(&self) -> Result<Option<Duration>> {
        let rps = self.rate_limit_rps;
        if !rps.is_finite() || rps < 0.0 {
            bail!("rate_limit_rps must be a non-negative number, got {}", rps);
        }
        if rps == 0.0 {
            return Ok(None);
        }
        Duration::try_from_secs_f64(1.0 / rps)
            .map(Some)
            .with_context(|| format!("rate_limit_rps {} is too small", rps))
    }
}

/// Judge settings for one question category
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeSettings {
    /// System prompt sent to the judge
    pub system_prompt: String,
    /// Model every candidate is compared against
    #[serde(alias = "baseline_model_name")]
    pub baseline: String,
}

fn default_temperature() -> f64 {
    0.0
}

fn default_max_tokens() -> u32 {
    16000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_batch_size() -> usize {
    100
}

fn default_parallel() -> usize {
    1
}

fn default_timeout_secs() -> u64 {
    600
}

/// Root configuration of a judging run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub run: RunConfig,
    pub endpoint: EndpointSettings,
    /// Judge settings keyed by question category
    pub categories: HashMap<String, JudgeSettings>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Check the run's premises before any work is planned
    pub fn validate(&self) -> Result<()> {
        let run = &self.run;

        if run.model_list.is_empty() {
            bail!("model_list is empty, nothing to judge");
        }
        if run.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.endpoint.parallel == 0 {
            bail!("endpoint parallel must be at least 1");
        }
        if run.reference == ReferenceSetting::Flag(true) {
            bail!("reference = true requires a list of reference model names");
        }
        if let Some(model) = run
            .model_list
            .iter()
            .find(|m| run.reference.models().contains(*m))
        {
            bail!(
                "Model {} is being evaluated and is also used as reference",
                model
            );
        }
        self.endpoint.request_interval()?;
        if self.categories.is_empty() {
            bail!("No category judge settings configured");
        }

        ScorePatterns::compile(run.regex_patterns.as_slice())?;

        let references: Vec<String> = run
            .reference
            .models()
            .iter()
            .map(|model| format!("<{} reference>", model))
            .collect();
        template::render(&run.prompt_template, &prompt_args("", "", "", &references))
            .context("Invalid prompt_template")?;
        Ok(())
    }

    /// Every question category must have judge settings
    pub fn validate_categories(&self, questions: &[Question]) -> Result<()> {
        match questions
            .iter()
            .find(|q| !self.categories.contains_key(&q.category))
        {
            Some(q) => bail!(
                "No judge settings for category {} (question {})",
                q.category,
                q.uid
            ),
            None => Ok(()),
        }
    }

    /// Model name sent to the judge endpoint
    pub fn judge_model_name(&self) -> &str {
        self.endpoint
            .model_name
            .as_deref()
            .unwrap_or(&self.run.judge_model)
    }
}

impl RunConfig {
    fn bench_dir(&self) -> PathBuf {
        self.data_dir.join(&self.bench_name)
    }

    pub fn question_file(&self) -> PathBuf {
        self.bench_dir().join("question.jsonl")
    }

    pub fn answer_dir(&self) -> PathBuf {
        self.bench_dir().join("model_answer")
    }

    pub fn judgment_dir(&self) -> PathBuf {
        self.bench_dir()
            .join("model_judgment")
            .join(&self.judge_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
[run]
bench_name = "arena-hard-v2.0"
judge_model = "gpt-4.1"
reference = ["ref-model"]
temperature = 0.2
max_tokens = 4096
data_dir = "/srv/data"
batch_size = 10
model_list = ["model-a", "org/model-b"]
prompt_template = "{QUESTION} {ANSWER_A} {ANSWER_B} {REFERENCE}"
regex_patterns = ['\[\[([AB<>=]+)\]\]', '\[([AB<>=]+)\]']

[endpoint]
api_type = "openai"
model_name = "gpt-4.1-2025-04-14"
api_base = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
parallel = 16
rate_limit_rps = 5.0

[categories.hard_prompt]
system_prompt = "Please act as an impartial judge."
baseline = "o3-mini"

[categories.creative_writing]
system_prompt = "Judge the story."
baseline_model_name = "gemini-2.0-flash"
"#;

    const MINIMAL_CONFIG: &str = r#"
[run]
bench_name = "bench"
judge_model = "judge"
model_list = ["model-a"]
prompt_template = "{QUESTION}"

[endpoint]
api_type = "anthropic"
env_var_api_key = "ANTHROPIC_API_KEY"

[categories.general]
system_prompt = "Judge."
baseline = "base"
"#;

    fn parse(content: &str) -> Config {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        Config::from_file(temp_file.path()).unwrap()
    }

    #[test]
    fn test_config_parsing() {
        let config = parse(FULL_CONFIG);

        assert_eq!(config.run.judge_model, "gpt-4.1");
        assert_eq!(config.run.reference.models(), ["ref-model".to_string()]);
        assert_eq!(config.run.temperature, 0.2);
        assert_eq!(config.run.max_tokens, 4096);
        assert_eq!(config.run.batch_size, 10);
        assert_eq!(config.run.model_list.len(), 2);
        assert_eq!(config.run.regex_patterns.len(), 2);
        assert_eq!(config.endpoint.api_type, ApiType::Openai);
        assert_eq!(config.endpoint.parallel, 16);
        assert_eq!(config.judge_model_name(), "gpt-4.1-2025-04-14");
        assert_eq!(config.categories["hard_prompt"].baseline, "o3-mini");
        assert_eq!(
            config.categories["creative_writing"].baseline,
            "gemini-2.0-flash"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_defaults() {
        let config = parse(MINIMAL_CONFIG);

        assert_eq!(config.run.reference, ReferenceSetting::Flag(false));
        assert!(!config.run.reference.is_enabled());
        assert_eq!(config.run.temperature, 0.0);
        assert_eq!(config.run.max_tokens, 16000);
        assert_eq!(config.run.data_dir, PathBuf::from("data"));
        assert_eq!(config.run.batch_size, 100);
        assert!(config.run.regex_patterns.is_empty());
        assert_eq!(config.endpoint.api_type, ApiType::Anthropic);
        assert_eq!(config.endpoint.parallel, 1);
        assert_eq!(config.endpoint.rate_limit_rps, 0.0);
        assert_eq!(config.endpoint.timeout_secs, 600);
        assert_eq!(config.judge_model_name(), "judge");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reference_false_is_disabled() {
        let config = parse(&MINIMAL_CONFIG.replace(
            "judge_model = \"judge\"",
            "judge_model = \"judge\"\nreference = false",
        ));
        assert!(!config.run.reference.is_enabled());
    }

    #[test]
    fn test_derived_paths() {
        let config = parse(FULL_CONFIG);

        assert_eq!(
            config.run.question_file(),
            PathBuf::from("/srv/data/arena-hard-v2.0/question.jsonl")
        );
        assert_eq!(
            config.run.answer_dir(),
            PathBuf::from("/srv/data/arena-hard-v2.0/model_answer")
        );
        assert_eq!(
            config.run.judgment_dir(),
            PathBuf::from("/srv/data/arena-hard-v2.0/model_judgment/gpt-4.1")
        );
    }

    #[test]
    fn test_validate_rejects_reference_in_model_list() {
        let mut config = parse(FULL_CONFIG);
        config.run.model_list.push("ref-model".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("also used as reference"));
    }

    #[test]
    fn test_validate_rejects_reference_true_without_models() {
        let mut config = parse(MINIMAL_CONFIG);
        config.run.reference = ReferenceSetting::Flag(true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = parse(MINIMAL_CONFIG);
        config.endpoint.parallel = 0;
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL_CONFIG);
        config.run.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL_CONFIG);
        config.run.model_list.clear();
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL_CONFIG);
        config.run.regex_patterns = vec!["[[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_interval() {
        let mut config = parse(MINIMAL_CONFIG);
        assert_eq!(config.endpoint.request_interval().unwrap(), None);

        config.endpoint.rate_limit_rps = 4.0;
        assert_eq!(
            config.endpoint.request_interval().unwrap(),
            Some(Duration::from_millis(250))
        );

        for rps in [1e-30, -1.0, f64::NAN, f64::INFINITY] {
            config.endpoint.rate_limit_rps = rps;
            assert!(config.endpoint.request_interval().is_err());
            assert!(config.validate().is_err());
        }
    }

    #[test]
    fn test_validate_rejects_unknown_template_key() {
        let mut config = parse(MINIMAL_CONFIG);
        config.run.prompt_template = "{QUESTION} {REFERENCE}".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid prompt_template"));
    }

    #[test]
    fn test_validate_categories() {
        let config = parse(MINIMAL_CONFIG);
        let known = Question {
            uid: "q1".to_string(),
            category: "general".to_string(),
            prompt: "p".to_string(),
        };
        let unknown = Question {
            uid: "q2".to_string(),
            category: "math".to_string(),
            prompt: "p".to_string(),
        };

        assert!(config.validate_categories(&[known.clone()]).is_ok());
        let err = config.validate_categories(&[known, unknown]).unwrap_err();
        assert!(err.to_string().contains("math"));
    }

    #[test]
    fn test_unknown_api_type_fails_to_parse() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            "{}",
            MINIMAL_CONFIG.replace("\"anthropic\"", "\"carrier-pigeon\"")
        )
        .unwrap();
        assert!(Config::from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
