//! The resource record and the response payloads built from it.
//!
//! A [`Resource`] is one uploaded file attached to a project. Its extraction
//! and summary fields record the outcome of the most recent attempt and can
//! only change through [`Resource::record_extraction`] and
//! [`Resource::record_summary`], which keep each success/error pair mutually
//! exclusive and always stamp the attempt time.

use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stored as the summary error when there is no text to summarize.
pub const NO_CONTENT_MESSAGE: &str = "No content available for summarization";

/// File type chosen by the uploader. Informational only; extraction sniffs
/// the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeclaredFileType {
    Pdf,
    Doc,
    Txt,
    #[default]
    Other,
}

impl DeclaredFileType {
    /// Guess from a file name's extension.
    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("doc") | Some("docx") => Self::Doc,
            Some("txt") | Some("text") => Self::Txt,
            _ => Self::Other,
        }
    }
}

/// Result of one extraction or summarization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Extracted text or summary.
    Success(String),
    /// Message stored in the matching error field.
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// One uploaded file attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub project: Uuid,
    pub title: String,
    pub file: PathBuf,
    pub file_type: DeclaredFileType,
    #[serde(default)]
    pub description: String,
    file_size: u64,
    uploaded_at: DateTime<Utc>,

    content_extracted: Option<String>,
    extraction_error: Option<String>,
    last_extracted: Option<DateTime<Utc>>,

    summary: Option<String>,
    summary_error: Option<String>,
    last_summarized: Option<DateTime<Utc>>,
}

impl Resource {
    /// A freshly uploaded resource with no extraction or summary attempts.
    pub fn new(
        project: Uuid,
        title: impl Into<String>,
        file: impl Into<PathBuf>,
        file_type: DeclaredFileType,
        file_size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project,
            title: title.into(),
            file: file.into(),
            file_type,
            description: String::new(),
            file_size,
            uploaded_at: Utc::now(),
            content_extracted: None,
            extraction_error: None,
            last_extracted: None,
            summary: None,
            summary_error: None,
            last_summarized: None,
        }
    }

    /// Register an uploaded file, capturing its size from file metadata.
    pub fn from_upload(
        project: Uuid,
        title: impl Into<String>,
        file: impl Into<PathBuf>,
        file_type: DeclaredFileType,
    ) -> Result<Self, IngestError> {
        let file = file.into();
        let meta = std::fs::metadata(&file).map_err(|source| IngestError::Upload {
            path: file.clone(),
            source,
        })?;
        Ok(Self::new(project, title, file, file_type, meta.len()))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    pub fn content_extracted(&self) -> Option<&str> {
        self.content_extracted.as_deref()
    }

    pub fn extraction_error(&self) -> Option<&str> {
        self.extraction_error.as_deref()
    }

    pub fn last_extracted(&self) -> Option<DateTime<Utc>> {
        self.last_extracted
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn summary_error(&self) -> Option<&str> {
        self.summary_error.as_deref()
    }

    pub fn last_summarized(&self) -> Option<DateTime<Utc>> {
        self.last_summarized
    }

    /// Whether there is non-empty extracted text to summarize.
    pub fn has_content(&self) -> bool {
        self.content_extracted
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Overwrite the extraction fields with the outcome of an attempt made at `at`.
    pub fn record_extraction(&mut self, outcome: &Outcome, at: DateTime<Utc>) {
        match outcome {
            Outcome::Success(text) => {
                self.content_extracted = Some(text.clone());
                self.extraction_error = None;
            }
            Outcome::Failure(msg) => {
                self.content_extracted = None;
                self.extraction_error = Some(msg.clone());
            }
        }
        self.last_extracted = Some(at);
    }

    /// Overwrite the summary fields with the outcome of an attempt made at `at`.
    pub fn record_summary(&mut self, outcome: &Outcome, at: DateTime<Utc>) {
        match outcome {
            Outcome::Success(text) => {
                self.summary = Some(text.clone());
                self.summary_error = None;
            }
            Outcome::Failure(msg) => {
                self.summary = None;
                self.summary_error = Some(msg.clone());
            }
        }
        self.last_summarized = Some(at);
    }
}

// ── Response payloads ────────────────────────────────────────────────────────

/// Payload returned by the extract trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub status: String,
    pub content_extracted: bool,
    pub extraction_error: Option<String>,
    pub last_extracted: Option<DateTime<Utc>>,
}

impl From<&Resource> for ExtractResponse {
    fn from(r: &Resource) -> Self {
        Self {
            status: "success".to_string(),
            content_extracted: r.has_content(),
            extraction_error: r.extraction_error.clone(),
            last_extracted: r.last_extracted,
        }
    }
}

/// Payload returned by the summarize trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeResponse {
    pub status: String,
    pub summary: Option<String>,
    pub summary_error: Option<String>,
    pub last_summarized: Option<DateTime<Utc>>,
}

impl From<&Resource> for SummarizeResponse {
    fn from(r: &Resource) -> Self {
        Self {
            status: "success".to_string(),
            summary: r.summary.clone(),
            summary_error: r.summary_error.clone(),
            last_summarized: r.last_summarized,
        }
    }
}
