//! Pipeline stages for resource ingestion.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the PDF backend can be swapped without touching
//! the rest.
//!
//! ## Data Flow
//!
//! ```text
//! sniff ──▶ extract ──▶ markdown ──▶ normalize ──▶ (persist) ──▶ summarize
//! (magic)   (pdfium)    (headings)   (cleanup)                  (LLM)
//! ```
//!
//! 1. [`sniff`]    : MIME type from the file's leading bytes
//! 2. [`extract`]  : page-ordered text via a [`extract::PageTextSource`];
//!    blocking, so async callers use `spawn_blocking`
//! 3. [`markdown`] : page text → Markdown (legal headings,
//!    bullets, re-flowed paragraphs), Markdown mode only
//! 4. [`normalize`]: deterministic spacing and heading-level rules
//! 5. [`summarize`]: LLM summary with rate-limit retry; the only stage
//!    with network I/O

pub mod extract;
pub mod markdown;
pub mod normalize;
pub mod sniff;
pub mod summarize;
