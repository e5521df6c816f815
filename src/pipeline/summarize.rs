//! Summarization: extracted text → prose summary via the chat backend.
//!
//! The only pipeline stage with network I/O. Each call sends the fixed
//! summary system prompt plus the full document text, retrying rate-limited
//! requests with the shared [`RetryPolicy`].

use crate::config::PipelineConfig;
use crate::error::{LlmError, SummarizeError};
use crate::llm::{with_rate_limit_retry, ChatBackend, ChatRequest, Message, RetryPolicy};
use crate::prompts::{summary_user_message, SUMMARY_SYSTEM_PROMPT};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Summarizes document text with a [`ChatBackend`].
#[derive(Clone)]
pub struct Summarizer {
    backend: Arc<dyn ChatBackend>,
    temperature: f32,
    max_tokens: usize,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summarizer")
            .field("provider", &self.backend.provider())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Summarizer {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        temperature: f32,
        max_tokens: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            temperature,
            max_tokens,
            retry,
        }
    }

    pub fn from_config(backend: Arc<dyn ChatBackend>, config: &PipelineConfig) -> Self {
        Self::new(
            backend,
            config.summary_temperature,
            config.summary_max_tokens,
            config.retry_policy(),
        )
    }

    /// Summarize `text`.
    ///
    /// Fails with [`SummarizeError::EmptyInput`] for blank text without
    /// contacting the backend. A blank completion is an
    /// [`LlmError::EmptyResponse`].
    pub async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        if text.trim().is_empty() {
            return Err(SummarizeError::EmptyInput);
        }

        let request = ChatRequest {
            messages: vec![
                Message::system(SUMMARY_SYSTEM_PROMPT),
                Message::user(summary_user_message(text)),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            "Summarizing {} chars with provider '{}'",
            text.len(),
            self.backend.provider()
        );
        let start = Instant::now();
        let reply =
            with_rate_limit_retry(&self.retry, || self.backend.complete(&request)).await?;
        let summary = reply.trim();
        if summary.is_empty() {
            return Err(SummarizeError::Llm(LlmError::EmptyResponse {
                provider: self.backend.provider().to_string(),
            }));
        }
        info!(
            "Summary produced in {}ms ({} chars)",
            start.elapsed().as_millis(),
            summary.len()
        );

        Ok(summary.to_string())
    }
}
