use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A benchmark question shared by every model under evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique question identifier
    #[serde(alias = "question_id")]
    pub uid: String,
    /// Category, selects the judge settings and baseline
    pub category: String,
    /// The user prompt the models answered
    pub prompt: String,
}

/// One turn of a stored model conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMessage {
    #[serde(default)]
    pub role: String,
    /// Either `{"answer": "..."}` or a plain string
    #[serde(default)]
    pub content: Value,
}

/// A pre-generated answer of one model to one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAnswer {
    #[serde(default)]
    pub model: String,
    #[serde(alias = "question_id")]
    pub uid: String,
    #[serde(default)]
    pub messages: Vec<AnswerMessage>,
}

impl ModelAnswer {
    /// Answer text held by the last message, if any
    pub fn answer_text(&self) -> Option<&str> {
        match &self.messages.last()?.content {
            Value::String(text) => Some(text),
            Value::Object(content) => content.get("answer")?.as_str(),
            _ => None,
        }
    }
}

/// Chat role of a judge prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message sent to the judge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Normalized output of a judge completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeOutput {
    /// The judge's free-text verdict
    pub answer: String,
    /// Provider metadata (token usage, finish reason, ...)
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl JudgeOutput {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            metadata: Map::new(),
        }
    }
}

/// One judged comparison with a fixed A/B slot assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Extracted verdict token, `None` when no pattern matched
    pub score: Option<String>,
    /// Raw judge output
    pub judgment: JudgeOutput,
    /// The exact messages sent to the judge
    pub prompt: Vec<ChatMessage>,
}

/// Persisted result of judging one (model, question) pair
///
/// `games[0]` places the baseline in slot A, `games[1]` swaps the slots.
/// A game whose judge call failed is serialized as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    pub uid: String,
    pub category: String,
    pub judge: String,
    pub model: String,
    pub baseline: String,
    pub games: [Option<Game>; 2],
}

/// Counts reported at the end of a judging run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub judge_model: String,
    /// Tasks handed to the scheduler
    pub planned: usize,
    /// Units skipped because a judgment already exists
    pub existing: usize,
    pub skipped_missing_answer: usize,
    pub skipped_missing_baseline: usize,
    pub skipped_missing_reference: usize,
    /// Configured models with no answer file at all
    pub models_without_answers: Vec<String>,
    pub completed: usize,
    pub failed: usize,
    pub batches: usize,
}
