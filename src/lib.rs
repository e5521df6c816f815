//! # legal-ingest
//!
//! Ingestion and summarization of uploaded legal documents.
//!
//! A drafting backend stores the files its users upload against a project.
//! This crate turns those files into something the rest of the system can
//! use: it checks what a file really is, pulls the text out of PDFs, tidies
//! it into Markdown if asked, and has an LLM write a prose summary. Every
//! attempt is recorded on the resource record, success or failure.
//!
//! ## Pipeline Overview
//!
//! ```text
//! stored file
//!  │
//!  ├─ 1. Sniff      MIME type from magic bytes (declared type is ignored)
//!  ├─ 2. Extract    page text via pdfium (blocking pool)
//!  ├─ 3. Markdown   optional: legal headings, bullets, re-flow + normalise
//!  ├─ 4. Persist    content / error / timestamp on the resource
//!  └─ 5. Summarize  chat completion with rate-limit retry, then persist
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use legal_ingest::{
//!     build_backend, DeclaredFileType, InMemoryStore, PipelineConfig, Resource,
//!     ResourcePipeline, ResourceStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().api_key("sk-…").build()?;
//!     let store = Arc::new(InMemoryStore::new());
//!     let pipeline = ResourcePipeline::from_config(store.clone(), build_backend(&config)?, &config);
//!
//!     let project = uuid::Uuid::new_v4();
//!     let resource = Resource::from_upload(project, "Lease", "lease.pdf", DeclaredFileType::Pdf)?;
//!     store.save(&resource).await?;
//!
//!     let response = pipeline.trigger_summarize(resource.id).await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `legal-ingest` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chat;
pub mod config;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod resource;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chat::{ChatAssistant, ChatReply, ChatRequestBody, ContextItem};
pub use config::{ExtractionMode, PipelineConfig, PipelineConfigBuilder};
pub use error::{ChatError, ExtractError, IngestError, LlmError, SummarizeError};
pub use ingest::ResourcePipeline;
pub use llm::{build_backend, ChatBackend, OpenAiClient, ProviderBackend, RetryPolicy};
pub use pipeline::extract::{PageTextSource, PdfiumSource, TextExtractor};
pub use pipeline::normalize::normalize_markdown;
pub use pipeline::sniff::sniff_path;
pub use pipeline::summarize::Summarizer;
pub use resource::{DeclaredFileType, ExtractResponse, Outcome, Resource, SummarizeResponse};
pub use store::{InMemoryStore, JsonFileStore, ResourceStore};
