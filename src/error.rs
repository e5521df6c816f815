//! Error types for the legal-ingest library.
//!
//! Two families of errors reflect two distinct failure modes:
//!
//! * **Outcome errors**: [`ExtractError`], [`SummarizeError`] and the
//!   [`LlmError`] they wrap. These describe why one extraction or
//!   summarization attempt failed. The state machine in [`crate::ingest`]
//!   never propagates them: it renders them with `Display` and stores the
//!   message on the resource record, so their messages are written for the
//!   person reading the record.
//!
//! * [`IngestError`] (**fatal**): the transition itself could not run
//!   (resource missing, store unavailable, configuration invalid). Returned
//!   as `Err(IngestError)` from the public entry points.
//!
//! [`ChatError`] belongs to the chat assistant and carries its own HTTP
//! status mapping.

use reqwest::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Fatal errors returned by the pipeline entry points.
///
/// Extraction and summarization failures are *not* represented here; they
/// end up in the resource's `extraction_error` / `summary_error` fields.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Store errors ──────────────────────────────────────────────────────
    /// No resource with this id exists in the store.
    #[error("Resource {id} not found")]
    ResourceNotFound { id: Uuid },

    /// The backing store failed to read or write a record.
    #[error("Resource store error: {detail}")]
    Store { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The LLM backend could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Upload errors ─────────────────────────────────────────────────────
    /// The uploaded file could not be inspected when registering a resource.
    #[error("Failed to read upload '{path}': {source}")]
    Upload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single extraction attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The stored file is missing.
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The stored file exists but could not be read.
    #[error("Failed to read '{}': {detail}", path.display())]
    Unreadable { path: PathBuf, detail: String },

    /// Content sniffing found something other than a PDF.
    #[error("Unsupported file type: {mime}")]
    UnsupportedType { mime: String },

    /// The PDF parser rejected the document.
    #[error("Error extracting text from PDF: {detail}")]
    Parse { detail: String },
}

/// Why a single summarization attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummarizeError {
    /// The summarizer was handed empty or whitespace-only text.
    #[error("Cannot summarize empty text")]
    EmptyInput,

    /// The LLM call failed (after retries, for rate limits).
    #[error("Error generating summary: {0}")]
    Llm(#[from] LlmError),
}

/// Failure talking to the external chat-completion service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// HTTP 429: the only retryable condition.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// HTTP 401/403: the service is misconfigured; retrying will not help.
    #[error("Authentication error from provider '{provider}': {detail}")]
    Authentication { provider: String, detail: String },

    /// Any other non-success answer from the API.
    #[error("LLM API error from provider '{provider}': {message}")]
    Api { provider: String, message: String },

    /// The request never produced an HTTP answer (DNS, TLS, timeout…).
    #[error("Transport error talking to provider '{provider}': {detail}")]
    Transport { provider: String, detail: String },

    /// The response carried no completion choices, or only a blank one.
    #[error("Provider '{provider}' returned no completion")]
    EmptyResponse { provider: String },
}

impl LlmError {
    /// Whether the retry loop should try again after a backoff.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Server-requested wait carried by a rate-limit answer.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Errors surfaced by the chat assistant, each with an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Request body had no (or a blank) `message`.
    #[error("Message is required")]
    MissingMessage,

    /// Rate limit persisted through every retry.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    /// The API key was rejected.
    #[error("Authentication with the AI service failed")]
    Authentication,

    /// Any other API failure.
    #[error("Failed to process chat message: {0}")]
    Api(String),
}

impl ChatError {
    /// HTTP status the surrounding web layer should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::MissingMessage => StatusCode::BAD_REQUEST,
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ChatError::Authentication | ChatError::Api(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON error body: `{"error": "<message>"}`.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl From<LlmError> for ChatError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited { .. } => ChatError::RateLimited,
            LlmError::Authentication { .. } => ChatError::Authentication,
            other => ChatError::Api(other.to_string()),
        }
    }
}
