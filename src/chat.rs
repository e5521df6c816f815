//! Drafting assistant: answers a user message using selected context items.
//!
//! The web layer deserialises the request body into [`ChatRequestBody`],
//! calls [`ChatAssistant::respond`], and answers with either the
//! [`ChatReply`] or the error's [`status_code`](ChatError::status_code) and
//! [`to_body`](ChatError::to_body).

use crate::config::PipelineConfig;
use crate::error::ChatError;
use crate::llm::{with_rate_limit_retry, ChatBackend, ChatRequest, Message, RetryPolicy};
use crate::prompts::{CHAT_CONTEXT_HEADER, CHAT_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A document, note or resource the user attached to the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Incoming chat request body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub contexts: Vec<ContextItem>,
}

/// Successful chat answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
}

/// Answers chat requests through a [`ChatBackend`].
#[derive(Clone)]
pub struct ChatAssistant {
    backend: Arc<dyn ChatBackend>,
    temperature: f32,
    max_tokens: usize,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ChatAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatAssistant")
            .field("provider", &self.backend.provider())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ChatAssistant {
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
            config.chat_temperature,
            config.chat_max_tokens,
            config.retry_policy(),
        )
    }

    pub async fn respond(&self, body: &ChatRequestBody) -> Result<ChatReply, ChatError> {
        let message = body
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or(ChatError::MissingMessage)?;

        let request = ChatRequest {
            messages: vec![
                Message::system(build_system_prompt(&body.contexts)),
                Message::user(message),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match with_rate_limit_retry(&self.retry, || self.backend.complete(&request)).await {
            Ok(content) => {
                info!(
                    contexts = body.contexts.len(),
                    "Chat reply: {} chars",
                    content.len()
                );
                Ok(ChatReply {
                    content: content.trim().to_string(),
                })
            }
            Err(e) => {
                warn!("Chat request failed: {e}");
                Err(e.into())
            }
        }
    }
}

/// System prompt with every context item rendered as a titled block.
pub fn build_system_prompt(contexts: &[ContextItem]) -> String {
    if contexts.is_empty() {
        return CHAT_SYSTEM_PROMPT.to_string();
    }
    let blocks: Vec<String> = contexts
        .iter()
        .map(|c| format!("### {}: {}\n{}", capitalise(&c.kind), c.title, c.content.trim()))
        .collect();
    format!(
        "{CHAT_SYSTEM_PROMPT}\n\n{CHAT_CONTEXT_HEADER}\n\n{}",
        blocks.join("\n\n---\n\n")
    )
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Fixed {
        reply: Result<String, LlmError>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl Fixed {
        fn new(reply: Result<String, LlmError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for Fixed {
        fn provider(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn assistant(backend: Arc<Fixed>) -> ChatAssistant {
        ChatAssistant::new(backend, 0.7, 500, RetryPolicy::new(3, Duration::from_secs(1)))
    }

    fn body(message: Option<&str>) -> ChatRequestBody {
        ChatRequestBody {
            message: message.map(str::to_string),
            contexts: vec![ContextItem {
                kind: "document".into(),
                title: "Lease".into(),
                content: "The rent is 1000 per month.".into(),
            }],
        }
    }

    #[test]
    fn request_body_parses() {
        let json = r#"{"message":"Hi","contexts":[{"type":"note","title":"N","content":"c"}]}"#;
        let body: ChatRequestBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.message.as_deref(), Some("Hi"));
        assert_eq!(body.contexts[0].kind, "note");

        let empty: ChatRequestBody = serde_json::from_str("{}").unwrap();
        assert!(empty.message.is_none());
        assert!(empty.contexts.is_empty());
    }

    #[test]
    fn system_prompt_embeds_contexts() {
        let prompt = build_system_prompt(&[
            ContextItem {
                kind: "document".into(),
                title: "Lease".into(),
                content: "Rent clause.".into(),
            },
            ContextItem {
                kind: "note".into(),
                title: "Call".into(),
                content: "Client wants renewal.".into(),
            },
        ]);
        assert!(prompt.starts_with(CHAT_SYSTEM_PROMPT));
        assert!(prompt.contains("### Document: Lease\nRent clause."));
        assert!(prompt.contains("\n\n---\n\n### Note: Call\nClient wants renewal."));
        assert_eq!(build_system_prompt(&[]), CHAT_SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn replies_with_content() {
        let backend = Fixed::new(Ok(" The rent is 1000. ".into()));
        let reply = assistant(backend.clone())
            .respond(&body(Some("What is the rent?")))
            .await
            .unwrap();
        assert_eq!(reply.content, "The rent is 1000.");

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, 500);
        assert!(seen[0].messages[0].content.contains("### Document: Lease"));
        assert_eq!(seen[0].messages[1], Message::user("What is the rent?"));
    }

    #[tokio::test]
    async fn missing_message_is_400() {
        let backend = Fixed::new(Ok("unused".into()));
        let a = assistant(backend.clone());
        for m in [None, Some(""), Some("   ")] {
            let err = a.respond(&body(m)).await.unwrap_err();
            assert_eq!(err, ChatError::MissingMessage);
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        }
        assert!(backend.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_429_after_retries() {
        let backend = Fixed::new(Err(LlmError::RateLimited {
            provider: "fixed".into(),
            retry_after_secs: None,
        }));
        let err = assistant(backend.clone())
            .respond(&body(Some("Hi")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(backend.seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn auth_failure_is_500() {
        let backend = Fixed::new(Err(LlmError::Authentication {
            provider: "fixed".into(),
            detail: "bad key".into(),
        }));
        let err = assistant(backend).respond(&body(Some("Hi"))).await.unwrap_err();
        assert_eq!(err, ChatError::Authentication);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_body()["error"].is_string());
    }
}
