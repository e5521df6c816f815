//! LLM access: the [`ChatBackend`] seam, its two implementations, and the
//! rate-limit retry loop shared by every call site.
//!
//! ## Backends
//!
//! * [`OpenAiClient`]: talks to any OpenAI-compatible `/chat/completions`
//!   endpoint with `reqwest`. The API key is handed over at construction, so
//!   HTTP status codes can be classified precisely (429 → rate limit,
//!   401/403 → authentication).
//! * [`ProviderBackend`]: wraps an `edgequake-llm` provider (Anthropic,
//!   Gemini, Ollama, …). Errors from those providers arrive as text, so they
//!   are classified by message.
//!
//! ## Retry Strategy
//!
//! Only rate limiting is retried. With the default 1 s base delay and three
//! attempts the wait sequence is 1 s → 2 s before giving up, stretched to the
//! server's `Retry-After` when that is longer. Transport and API errors fail
//! immediately.

use crate::config::PipelineConfig;
use crate::error::{IngestError, LlmError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

// ── Request types ────────────────────────────────────────────────────────────

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

/// A provider-neutral completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// A chat-completion service.
///
/// Implementations return the text of the first completion choice.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short provider name used in logs and error messages.
    fn provider(&self) -> &str;

    /// Run one completion request. No retries happen here.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

// ── Retry ────────────────────────────────────────────────────────────────────

/// Exponential backoff applied to rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

/// Run `op` until it succeeds, fails with a non-rate-limit error, or the
/// policy's attempts are used up.
///
/// A server `Retry-After` hint longer than the backoff replaces it.
pub async fn with_rate_limit_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_rate_limited() && attempt < policy.max_attempts => {
                let backoff = match e.retry_after() {
                    Some(hint) => policy.delay_before_retry(attempt).max(hint),
                    None => policy.delay_before_retry(attempt),
                };
                warn!(
                    "Rate limited (attempt {}/{}), retrying after {}ms",
                    attempt,
                    policy.max_attempts,
                    backoff.as_millis()
                );
                sleep(backoff).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

// ── OpenAI-compatible HTTP client ────────────────────────────────────────────

const OPENAI_PROVIDER: &str = "openai";

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Build from a config that carries an API key.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, IngestError> {
        let key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| IngestError::ProviderNotConfigured {
                provider: OPENAI_PROVIDER.to_string(),
                hint: "No API key configured. Pass --api-key or set OPENAI_API_KEY.".to_string(),
            })?;
        Self::new(
            key,
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.api_timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ChatBackend for OpenAiClient {
    fn provider(&self) -> &str {
        OPENAI_PROVIDER
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport {
                provider: OPENAI_PROVIDER.to_string(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(OPENAI_PROVIDER, status, retry_after, &text));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| LlmError::Api {
            provider: OPENAI_PROVIDER.to_string(),
            message: format!("invalid response body: {e}"),
        })?;

        debug!("Completion returned {} choice(s)", parsed.choices.len());

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: OPENAI_PROVIDER.to_string(),
            })
    }
}

/// Map a non-success HTTP answer to an [`LlmError`].
pub(crate) fn classify_status(
    provider: &str,
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> LlmError {
    let message = api_error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication {
            provider: provider.to_string(),
            detail: message,
        },
        _ => LlmError::Api {
            provider: provider.to_string(),
            message,
        },
    }
}

/// Pull `error.message` out of an OpenAI-style error body.
fn api_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

// ── edgequake-llm adapter ────────────────────────────────────────────────────

/// Adapter exposing an `edgequake-llm` provider as a [`ChatBackend`].
pub struct ProviderBackend {
    name: String,
    provider: Arc<dyn LLMProvider>,
}

impl std::fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("name", &self.name)
            .field("provider", &"<dyn LLMProvider>")
            .finish()
    }
}

impl ProviderBackend {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    /// Instantiate a named provider through [`ProviderFactory`].
    pub fn from_factory(provider_name: &str, model: &str) -> Result<Self, IngestError> {
        let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
            IngestError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider_name, provider))
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    fn provider(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let messages: Vec<ChatMessage> = request
            .messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::system(m.content.as_str()),
                Role::User => ChatMessage::user(m.content.as_str()),
            })
            .collect();

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    self.name, response.prompt_tokens, response.completion_tokens
                );
                if response.content.trim().is_empty() {
                    Err(LlmError::EmptyResponse {
                        provider: self.name.clone(),
                    })
                } else {
                    Ok(response.content)
                }
            }
            Err(e) => Err(classify_message(&self.name, &e.to_string())),
        }
    }
}

/// Classify a provider error that only exposes a message.
pub(crate) fn classify_message(provider: &str, message: &str) -> LlmError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs: None,
        }
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
        || lower.contains("invalid api key")
    {
        LlmError::Authentication {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else {
        LlmError::Api {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

// ── Backend selection ────────────────────────────────────────────────────────

/// Pick the backend described by `config`.
///
/// An explicit API key selects [`OpenAiClient`]; otherwise a provider name
/// selects [`ProviderBackend`]. With neither, no backend can be built.
pub fn build_backend(config: &PipelineConfig) -> Result<Arc<dyn ChatBackend>, IngestError> {
    if config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
        return Ok(Arc::new(OpenAiClient::from_config(config)?));
    }
    if let Some(ref name) = config.provider_name {
        return Ok(Arc::new(ProviderBackend::from_factory(name, &config.model)?));
    }
    Err(IngestError::ProviderNotConfigured {
        provider: OPENAI_PROVIDER.to_string(),
        hint: "Set an API key (--api-key / OPENAI_API_KEY) or choose a provider with --provider."
            .to_string(),
    })
}
