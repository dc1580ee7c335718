use crate::config::{ApiType, EndpointSettings};
use crate::models::{ChatMessage, JudgeOutput, Role};
use anyhow::{Context, Result, bail};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// A judge completion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// A provider able to answer judge prompts.
///
/// Provider differences end here: every implementation returns the judge's
/// text as `JudgeOutput::answer`, or an error when no verdict text came back.
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<JudgeOutput>;
}

/// Build the backend selected by the endpoint settings
pub fn build_backend(settings: &EndpointSettings) -> Result<Arc<dyn JudgeBackend>> {
    let min_interval = settings.request_interval()?;
    let backend: Arc<dyn JudgeBackend> = match settings.api_type {
        ApiType::Openai => Arc::new(RateLimited::new(
            OpenAiBackend::from_settings(settings)?,
            min_interval,
        )),
        ApiType::Anthropic => Arc::new(RateLimited::new(
            AnthropicBackend::from_settings(settings)?,
            min_interval,
        )),
    };
    Ok(backend)
}

fn api_key_from_env(env_var: &str) -> Result<String> {
    std::env::var(env_var).with_context(|| format!("Environment variable {} not found", env_var))
}

/// OpenAI-compatible chat completions endpoint
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>, api_base: Option<&str>) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key.into());
        if let Some(api_base) = api_base {
            openai_config = openai_config.with_api_base(api_base);
        }

        Self {
            client: Client::with_config(openai_config),
        }
    }

    pub fn from_settings(settings: &EndpointSettings) -> Result<Self> {
        let api_key = api_key_from_env(&settings.env_var_api_key)?;
        Ok(Self::new(api_key, settings.api_base.as_deref()))
    }

    /// Build the chat completion request
    fn build_request(&self, request: &CompletionRequest) -> Result<CreateChatCompletionRequest> {
        let messages = request
            .messages
            .iter()
            .map(Self::build_message)
            .collect::<Result<Vec<_>>>()?;

        CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(messages)
            .temperature(request.temperature as f32)
            .max_tokens(u16::try_from(request.max_tokens).unwrap_or(u16::MAX))
            .build()
            .context("Failed to build chat completion request")
    }

    fn build_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
        let built: ChatCompletionRequestMessage = match message.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(message.content.clone())
                .build()
                .context("Failed to build system message")?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(message.content.clone())
                .build()
                .context("Failed to build user message")?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.clone())
                .build()
                .context("Failed to build assistant message")?
                .into(),
        };
        Ok(built)
    }

    /// Extract the judge output from the API response
    fn extract_output(response: CreateChatCompletionResponse) -> Result<JudgeOutput> {
        let choice = response
            .choices
            .first()
            .context("Judge response contained no choices")?;

        let answer = match &choice.message.content {
            Some(content) if !content.is_empty() => content.clone(),
            _ => bail!("Judge returned an empty completion"),
        };

        let mut output = JudgeOutput::new(answer);
        let metadata = &mut output.metadata;
        metadata.insert("model".to_string(), json!(response.model));
        if let Some(reason) = &choice.finish_reason {
            metadata.insert("finish_reason".to_string(), serde_json::to_value(reason)?);
        }
        if let Some(usage) = &response.usage {
            metadata.insert("prompt_tokens".to_string(), json!(usage.prompt_tokens));
            metadata.insert("completion_tokens".to_string(), json!(usage.completion_tokens));
            metadata.insert("total_tokens".to_string(), json!(usage.total_tokens));
        }

        Ok(output)
    }
}

#[async_trait]
impl JudgeBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<JudgeOutput> {
        let api_request = self.build_request(request)?;
        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .context("Failed to generate judgment")?;

        Self::extract_output(response)
    }
}

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API endpoint
pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
    model: Option<String>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicBackend {
    pub fn with_config(
        api_key: &str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).context("Invalid API key format")?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_settings(settings: &EndpointSettings) -> Result<Self> {
        let api_key = api_key_from_env(&settings.env_var_api_key)?;
        Self::with_config(
            &api_key,
            settings.api_base.as_deref().unwrap_or(ANTHROPIC_API_BASE),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }

    /// System messages move to the top-level `system` field
    fn build_body(request: &CompletionRequest) -> Value {
        let system = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        body
    }

    fn extract_output(response: AnthropicResponse) -> Result<JudgeOutput> {
        let answer = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<String>();

        if answer.is_empty() {
            bail!("Judge returned an empty completion");
        }

        let mut output = JudgeOutput::new(answer);
        let metadata = &mut output.metadata;
        if let Some(model) = response.model {
            metadata.insert("model".to_string(), json!(model));
        }
        if let Some(reason) = response.stop_reason {
            metadata.insert("finish_reason".to_string(), json!(reason));
        }
        if let Some(usage) = response.usage {
            metadata.insert("prompt_tokens".to_string(), json!(usage.input_tokens));
            metadata.insert("completion_tokens".to_string(), json!(usage.output_tokens));
        }

        Ok(output)
    }
}

#[async_trait]
impl JudgeBackend for AnthropicBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<JudgeOutput> {
        let response = self
            .client
            .post(self.messages_url())
            .json(&Self::build_body(request))
            .send()
            .await
            .context("Failed to send judgment request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Judge endpoint returned {}: {}", status, body);
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .context("Failed to parse judgment response")?;
        Self::extract_output(parsed)
    }
}

/// Spaces request starts at least `1 / rate_limit_rps` apart across all workers
pub struct RateLimited<B> {
    inner: B,
    min_interval: Option<Duration>,
    last_request: Mutex<Option<Instant>>,
}

impl<B> RateLimited<B> {
    pub fn new(inner: B, min_interval: Option<Duration>) -> Self {
        Self {
            inner,
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Enforce rate limiting for judge requests
    async fn enforce_rate_limit(&self) {
        let Some(min_interval) = self.min_interval else {
            return;
        };

        let mut last_request = self.last_request.lock().await;
        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                let sleep_duration = min_interval - elapsed;
                debug!(?sleep_duration, "Rate limiting judge request");
                sleep(sleep_duration).await;
            }
        }

        *last_request = Some(Instant::now());
    }
}

#[async_trait]
impl<B: JudgeBackend> JudgeBackend for RateLimited<B> {
    async fn complete(&self, request: &CompletionRequest) -> Result<JudgeOutput> {
        self.enforce_rate_limit().await;
        self.inner.complete(request).await
    }
}
