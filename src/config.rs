//! Configuration for the ingestion pipeline and its LLM clients.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The config is a plain value handed to the
//! components that need it at construction time; nothing in the library
//! reads or mutates process-wide settings after that point.

use crate::error::IngestError;
use crate::llm::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default model for both summaries and chat.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for extraction, summarization and chat.
///
/// # Example
/// ```rust
/// use legal_ingest::{ExtractionMode, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .api_key("sk-test")
///     .extraction_mode(ExtractionMode::Markdown)
///     .max_attempts(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 5);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Plain page text or Markdown output. Default: [`ExtractionMode::PlainText`].
    pub extraction_mode: ExtractionMode,

    /// Explicit path to a pdfium shared library. Default: None (look next to
    /// the working directory, then the system library path).
    pub pdfium_library_path: Option<PathBuf>,

    /// User password for encrypted PDFs. Default: None.
    pub pdf_password: Option<String>,

    /// `edgequake-llm` provider name (openai, anthropic, gemini, ollama, …).
    /// Only consulted when no `api_key` is set. Default: None.
    pub provider_name: Option<String>,

    /// Model id sent with every completion request. Default: `gpt-3.5-turbo`.
    pub model: String,

    /// API key for the OpenAI-compatible HTTP client. Default: None.
    pub api_key: Option<String>,

    /// Root URL of the OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub base_url: String,

    /// Per-request HTTP timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Sampling temperature for summaries. Default: 0.3.
    ///
    /// Kept low so repeated summaries of the same document stay close.
    pub summary_temperature: f32,

    /// Output token budget for summaries. Default: 1000.
    pub summary_max_tokens: usize,

    /// Sampling temperature for the chat assistant. Default: 0.7.
    pub chat_temperature: f32,

    /// Output token budget for chat replies. Default: 500.
    pub chat_max_tokens: usize,

    /// Total LLM attempts per call when rate limited (first try included). Default: 3.
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for every further retry. Default: 1000 ms.
    pub retry_base_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction_mode: ExtractionMode::default(),
            pdfium_library_path: None,
            pdf_password: None,
            provider_name: None,
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_timeout_secs: 60,
            summary_temperature: 0.3,
            summary_max_tokens: 1000,
            chat_temperature: 0.7,
            chat_max_tokens: 500,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("extraction_mode", &self.extraction_mode)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("pdf_password", &self.pdf_password.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("summary_temperature", &self.summary_temperature)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .field("chat_temperature", &self.chat_temperature)
            .field("chat_max_tokens", &self.chat_max_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Retry policy shared by the summarizer and the chat assistant.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn extraction_mode(mut self, mode: ExtractionMode) -> Self {
        self.config.extraction_mode = mode;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn pdf_password(mut self, pwd: impl Into<String>) -> Self {
        self.config.pdf_password = Some(pwd.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn summary_temperature(mut self, t: f32) -> Self {
        self.config.summary_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn summary_max_tokens(mut self, n: usize) -> Self {
        self.config.summary_max_tokens = n;
        self
    }

    pub fn chat_temperature(mut self, t: f32) -> Self {
        self.config.chat_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn chat_max_tokens(mut self, n: usize) -> Self {
        self.config.chat_max_tokens = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_base_delay_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, IngestError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(IngestError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.summary_max_tokens == 0 || c.chat_max_tokens == 0 {
            return Err(IngestError::InvalidConfig(
                "token budgets must be ≥ 1".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(IngestError::InvalidConfig("model must not be empty".into()));
        }
        if !c.base_url.starts_with("http://") && !c.base_url.starts_with("https://") {
            return Err(IngestError::InvalidConfig(format!(
                "base_url must be an HTTP(S) URL, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Shape of the text produced by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Raw page text joined with blank lines. (default)
    #[default]
    PlainText,
    /// Page text re-flowed into Markdown (headings, lists) and normalised.
    Markdown,
}
