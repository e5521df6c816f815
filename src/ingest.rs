//! The resource state machine: extraction and summarization transitions.
//!
//! [`ResourcePipeline`] is what the host application calls. Each transition
//! runs one stage, records the outcome on the [`Resource`] (last attempt
//! wins), stamps the attempt time and persists the record through the
//! [`ResourceStore`].
//!
//! ## Errors
//!
//! Expected failures (missing file, wrong type, unreadable PDF, LLM errors)
//! come back as [`Outcome::Failure`] and are stored on the record. Store
//! failures, missing resources, a missing LLM backend and panicked tasks are
//! returned as `Err`.
//!
//! ## Concurrency
//!
//! Extraction runs on tokio's blocking pool. Transitions on the same resource
//! id are serialised by a per-resource async mutex, so two triggers never
//! interleave their read-modify-write of one record.

use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::llm::ChatBackend;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::summarize::Summarizer;
use crate::resource::{ExtractResponse, Outcome, Resource, SummarizeResponse, NO_CONTENT_MESSAGE};
use crate::store::ResourceStore;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

type LockMap = Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>;

/// Orchestrates extraction and summarization for stored resources.
pub struct ResourcePipeline {
    store: Arc<dyn ResourceStore>,
    extractor: Arc<TextExtractor>,
    summarizer: Option<Summarizer>,
    locks: LockMap,
}

impl std::fmt::Debug for ResourcePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePipeline")
            .field("extractor", &self.extractor)
            .field("summarizer", &self.summarizer)
            .finish_non_exhaustive()
    }
}

impl ResourcePipeline {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        extractor: TextExtractor,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            store,
            extractor: Arc::new(extractor),
            summarizer: Some(summarizer),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Pipeline without an LLM backend. Summarize transitions fail with
    /// [`IngestError::ProviderNotConfigured`].
    pub fn extraction_only(store: Arc<dyn ResourceStore>, extractor: TextExtractor) -> Self {
        Self {
            store,
            extractor: Arc::new(extractor),
            summarizer: None,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Pipeline with a pdfium extractor and a summarizer over `backend`.
    pub fn from_config(
        store: Arc<dyn ResourceStore>,
        backend: Arc<dyn ChatBackend>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(
            store,
            TextExtractor::from_config(config),
            Summarizer::from_config(backend, config),
        )
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Extract text from the resource's file, record the outcome and persist.
    pub async fn extract_content(&self, resource: &mut Resource) -> Result<Outcome, IngestError> {
        let _lock = self.lock(resource.id).await?;
        self.extract_locked(resource).await
    }

    /// Summarize the resource's text, extracting it first if there is none,
    /// then record the outcome and persist.
    pub async fn summarize(&self, resource: &mut Resource) -> Result<Outcome, IngestError> {
        let _lock = self.lock(resource.id).await?;
        self.summarize_locked(resource).await
    }

    /// Load resource `id`, run extraction, and report the stored state.
    pub async fn trigger_extract(&self, id: Uuid) -> Result<ExtractResponse, IngestError> {
        let _lock = self.lock(id).await?;
        let mut resource = self.store.load(id).await?;
        self.extract_locked(&mut resource).await?;
        Ok(ExtractResponse::from(&resource))
    }

    /// Load resource `id`, run summarization, and report the stored state.
    pub async fn trigger_summarize(&self, id: Uuid) -> Result<SummarizeResponse, IngestError> {
        let _lock = self.lock(id).await?;
        let mut resource = self.store.load(id).await?;
        self.summarize_locked(&mut resource).await?;
        Ok(SummarizeResponse::from(&resource))
    }

    // ── Blocking wrappers ────────────────────────────────────────────────

    // Each wrapper drives its future on a private runtime. Called from inside
    // a tokio runtime they return `IngestError::Internal` instead of blocking.

    /// Synchronous version of [`extract_content`](Self::extract_content).
    pub fn extract_content_blocking(&self, resource: &mut Resource) -> Result<Outcome, IngestError> {
        block_on(self.extract_content(resource))?
    }

    /// Synchronous version of [`summarize`](Self::summarize).
    pub fn summarize_blocking(&self, resource: &mut Resource) -> Result<Outcome, IngestError> {
        block_on(self.summarize(resource))?
    }

    pub fn trigger_extract_blocking(&self, id: Uuid) -> Result<ExtractResponse, IngestError> {
        block_on(self.trigger_extract(id))?
    }

    pub fn trigger_summarize_blocking(&self, id: Uuid) -> Result<SummarizeResponse, IngestError> {
        block_on(self.trigger_summarize(id))?
    }

    // ── Internals (caller holds the resource lock) ───────────────────────

    async fn extract_locked(&self, resource: &mut Resource) -> Result<Outcome, IngestError> {
        let extractor = Arc::clone(&self.extractor);
        let path = resource.file.clone();
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || extractor.extract(&path))
            .await
            .map_err(|e| IngestError::Internal(format!("Extraction task panicked: {e}")))?;

        let outcome = match result {
            Ok(text) => {
                info!(
                    resource_id = %resource.id,
                    chars = text.len(),
                    "Extraction succeeded in {}ms",
                    start.elapsed().as_millis()
                );
                Outcome::Success(text)
            }
            Err(e) => {
                warn!(resource_id = %resource.id, "Extraction failed: {e}");
                Outcome::Failure(e.to_string())
            }
        };

        resource.record_extraction(&outcome, Utc::now());
        self.store.save(resource).await?;
        Ok(outcome)
    }

    async fn summarize_locked(&self, resource: &mut Resource) -> Result<Outcome, IngestError> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| IngestError::ProviderNotConfigured {
                provider: "none".to_string(),
                hint: "This pipeline was built without an LLM backend.".to_string(),
            })?;

        if !resource.has_content() {
            debug!(resource_id = %resource.id, "No extracted text yet; extracting first");
            self.extract_locked(resource).await?;
        }

        let outcome = match resource.content_extracted().filter(|t| !t.trim().is_empty()) {
            None => {
                warn!(resource_id = %resource.id, "{NO_CONTENT_MESSAGE}");
                Outcome::Failure(NO_CONTENT_MESSAGE.to_string())
            }
            Some(text) => match summarizer.summarize(text).await {
                Ok(summary) => {
                    info!(resource_id = %resource.id, chars = summary.len(), "Summary stored");
                    Outcome::Success(summary)
                }
                Err(e) => {
                    warn!(resource_id = %resource.id, "Summarization failed: {e}");
                    Outcome::Failure(e.to_string())
                }
            },
        };

        resource.record_summary(&outcome, Utc::now());
        self.store.save(resource).await?;
        Ok(outcome)
    }

    // ── Per-resource locks ───────────────────────────────────────────────

    async fn lock(&self, id: Uuid) -> Result<ResourceLock<'_>, IngestError> {
        let mutex = {
            let mut map = self.locks.lock().map_err(|_| lock_poisoned())?;
            Arc::clone(map.entry(id).or_default())
        };
        let guard = mutex.lock_owned().await;
        Ok(ResourceLock {
            locks: &self.locks,
            id,
            guard: Some(guard),
        })
    }

    /// Number of resources with a live lock entry.
    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// Held for the duration of a transition; prunes its map entry when the last
/// user lets go.
struct ResourceLock<'a> {
    locks: &'a LockMap,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ResourceLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        if let Ok(mut map) = self.locks.lock() {
            if map
                .get(&self.id)
                .is_some_and(|m| Arc::strong_count(m) == 1)
            {
                map.remove(&self.id);
            }
        }
    }
}

fn lock_poisoned() -> IngestError {
    IngestError::Internal("resource lock map poisoned".to_string())
}

/// Drive `fut` on a private current-thread runtime.
fn block_on<F: Future>(fut: F) -> Result<F::Output, IngestError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(IngestError::Internal(
            "blocking call made from inside a tokio runtime; use the async method".into(),
        ));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| IngestError::Internal(format!("Failed to create tokio runtime: {e}")))?;
    Ok(runtime.block_on(fut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionMode;
    use crate::error::LlmError;
    use crate::llm::{ChatRequest, RetryPolicy};
    use crate::pipeline::extract::PageTextSource;
    use crate::resource::DeclaredFileType;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Pages(Vec<String>);

    impl PageTextSource for Pages {
        fn page_texts(&self, _path: &Path) -> Result<Vec<String>, String> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for Echo {
        fn provider(&self) -> &str {
            "echo"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("A short summary.".into())
        }
    }

    fn pipeline(pages: &[&str], backend: Arc<Echo>) -> ResourcePipeline {
        let source = Pages(pages.iter().map(|s| s.to_string()).collect());
        ResourcePipeline::new(
            Arc::new(InMemoryStore::new()),
            TextExtractor::new(Arc::new(source), ExtractionMode::PlainText),
            Summarizer::new(backend, 0.3, 1000, RetryPolicy::new(3, Duration::from_millis(10))),
        )
    }

    fn pdf_resource(dir: &tempfile::TempDir) -> Resource {
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%stub\n").unwrap();
        Resource::from_upload(Uuid::new_v4(), "Doc", path, DeclaredFileType::Pdf).unwrap()
    }

    #[tokio::test]
    async fn extract_records_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(&["Page1", "Page2"], Arc::default());
        let mut r = pdf_resource(&dir);

        let outcome = p.extract_content(&mut r).await.unwrap();
        assert_eq!(outcome, Outcome::Success("Page1\n\nPage2".into()));
        assert_eq!(p.store().load(r.id).await.unwrap(), r);
        assert_eq!(p.lock_entries(), 0);
    }

    #[tokio::test]
    async fn summarize_extracts_first() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(Echo::default());
        let p = pipeline(&["Some contract text."], backend.clone());
        let mut r = pdf_resource(&dir);

        let outcome = p.summarize(&mut r).await.unwrap();
        assert_eq!(outcome, Outcome::Success("A short summary.".into()));
        assert_eq!(r.content_extracted(), Some("Some contract text."));
        assert!(r.last_extracted().is_some());
        assert!(r.last_summarized().is_some());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn summarize_without_text_skips_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(Echo::default());
        let p = pipeline(&["", "  "], backend.clone());
        let mut r = pdf_resource(&dir);

        let outcome = p.summarize(&mut r).await.unwrap();
        assert_eq!(outcome, Outcome::Failure(NO_CONTENT_MESSAGE.into()));
        assert_eq!(r.summary_error(), Some(NO_CONTENT_MESSAGE));
        assert!(r.summary().is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn trigger_unknown_id() {
        let p = pipeline(&[], Arc::default());
        let err = p.trigger_extract(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, IngestError::ResourceNotFound { .. }));
        assert_eq!(p.lock_entries(), 0);
    }

    #[tokio::test]
    async fn summarize_needs_backend() {
        let dir = tempfile::tempdir().unwrap();
        let source = Pages(vec!["text".into()]);
        let p = ResourcePipeline::extraction_only(
            Arc::new(InMemoryStore::new()),
            TextExtractor::new(Arc::new(source), ExtractionMode::PlainText),
        );
        let mut r = pdf_resource(&dir);
        assert!(p.extract_content(&mut r).await.unwrap().is_success());
        assert!(matches!(
            p.summarize(&mut r).await,
            Err(IngestError::ProviderNotConfigured { .. })
        ));
        assert!(r.last_summarized().is_none());
    }

    #[test]
    fn blocking_wrappers() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(&["Page1"], Arc::default());
        let mut r = pdf_resource(&dir);
        let outcome = p.extract_content_blocking(&mut r).unwrap();
        assert!(outcome.is_success());

        let resp = p.trigger_summarize_blocking(r.id).unwrap();
        assert_eq!(resp.summary.as_deref(), Some("A short summary."));
    }

    #[tokio::test]
    async fn blocking_wrappers_refuse_inside_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(Echo::default());
        let p = pipeline(&["Page1"], backend.clone());
        let mut r = pdf_resource(&dir);

        assert!(matches!(
            p.extract_content_blocking(&mut r),
            Err(IngestError::Internal(_))
        ));
        assert!(matches!(
            p.summarize_blocking(&mut r),
            Err(IngestError::Internal(_))
        ));
        assert!(matches!(
            p.trigger_extract_blocking(r.id),
            Err(IngestError::Internal(_))
        ));
        assert!(matches!(
            p.trigger_summarize_blocking(r.id),
            Err(IngestError::Internal(_))
        ));
        assert!(r.last_extracted().is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.lock_entries(), 0);
    }
}
