//! Text extraction: stored file → page-ordered text.
//!
//! The extractor never trusts a declared type. It re-sniffs the file, refuses
//! anything that is not a PDF, and asks a [`PageTextSource`] for the text of
//! every page. Pages that yield no text are dropped; the rest are joined with
//! a blank line so page boundaries survive as paragraph breaks.
//!
//! ## Why a trait?
//!
//! pdfium is a native library that has to be present at runtime. Keeping the
//! parser behind [`PageTextSource`] lets the state machine and its tests run
//! against a stub source, while production uses [`PdfiumSource`].
//!
//! All work here is blocking. Async callers go through `spawn_blocking`
//! (see [`crate::ingest`]).

use crate::config::{ExtractionMode, PipelineConfig};
use crate::error::ExtractError;
use crate::pipeline::markdown::page_to_markdown;
use crate::pipeline::normalize::normalize_markdown;
use crate::pipeline::sniff::{is_pdf, sniff_path};
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Produces the raw text of each page of a PDF, in page order.
///
/// Errors are plain messages; the extractor wraps them into
/// [`ExtractError::Parse`].
pub trait PageTextSource: Send + Sync {
    fn page_texts(&self, path: &Path) -> Result<Vec<String>, String>;
}

// ── pdfium ───────────────────────────────────────────────────────────────────

/// pdfium's init/destroy calls act on process-global state, so the library is
/// bound once and the instance lives for the rest of the process. The first
/// successful bind decides which library file is used.
static PDFIUM: OnceCell<BoundPdfium> = OnceCell::new();

struct BoundPdfium {
    pdfium: Pdfium,
    library_path: Option<PathBuf>,
}

/// [`PageTextSource`] backed by the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumSource {
    library_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumSource {
    pub fn new(library_path: Option<PathBuf>, password: Option<String>) -> Self {
        Self {
            library_path,
            password,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.pdfium_library_path.clone(),
            config.pdf_password.clone(),
        )
    }

    /// Bind to the configured library, else one next to the working
    /// directory, else the system library.
    fn bind(&self) -> Result<Pdfium, String> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| format!("failed to load pdfium library: {e:?}"))?;
        Ok(Pdfium::new(bindings))
    }

    /// The shared pdfium instance, binding it on first use. A failed bind is
    /// not remembered, so a later call can try again.
    fn pdfium(&self) -> Result<&'static Pdfium, String> {
        let bound = PDFIUM.get_or_try_init(|| {
            info!("Binding pdfium ({:?})", self.library_path);
            self.bind().map(|pdfium| BoundPdfium {
                pdfium,
                library_path: self.library_path.clone(),
            })
        })?;
        if self.library_path.is_some() && bound.library_path != self.library_path {
            warn!(
                "pdfium already bound from {:?}; ignoring {:?}",
                bound.library_path, self.library_path
            );
        }
        Ok(&bound.pdfium)
    }
}

impl PageTextSource for PdfiumSource {
    fn page_texts(&self, path: &Path) -> Result<Vec<String>, String> {
        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_file(path, self.password.as_deref())
            .map_err(|e| format!("{e:?}"))?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            let text = page
                .text()
                .map_err(|e| format!("page {}: {e:?}", idx + 1))?
                .all();
            debug!("Page {}: {} chars of text", idx + 1, text.len());
            texts.push(text);
        }
        Ok(texts)
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Sniff → parse → join.
#[derive(Clone)]
pub struct TextExtractor {
    source: Arc<dyn PageTextSource>,
    mode: ExtractionMode,
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("source", &"<dyn PageTextSource>")
            .field("mode", &self.mode)
            .finish()
    }
}

impl TextExtractor {
    pub fn new(source: Arc<dyn PageTextSource>, mode: ExtractionMode) -> Self {
        Self { source, mode }
    }

    /// Extractor backed by pdfium, configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(PdfiumSource::from_config(config)),
            config.extraction_mode,
        )
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Extract the text of the PDF at `path`.
    ///
    /// An empty string is a valid result for a PDF without a text layer.
    pub fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mime = sniff_path(path)?;
        if !is_pdf(&mime) {
            return Err(ExtractError::UnsupportedType { mime });
        }

        let pages = self
            .source
            .page_texts(path)
            .map_err(|detail| ExtractError::Parse { detail })?;

        let text = join_pages(&pages, self.mode);
        info!(
            "Extracted {} chars from {} page(s) of {}",
            text.len(),
            pages.len(),
            path.display()
        );
        Ok(text)
    }
}

/// Join page texts with a blank line, skipping pages with no text.
pub fn join_pages(pages: &[String], mode: ExtractionMode) -> String {
    let parts: Vec<String> = pages
        .iter()
        .map(|p| p.replace("\r\n", "\n").replace('\r', "\n"))
        .filter(|p| !p.trim().is_empty())
        .map(|p| match mode {
            ExtractionMode::PlainText => p.trim_end().to_string(),
            ExtractionMode::Markdown => page_to_markdown(&p),
        })
        .collect();

    let joined = parts.join("\n\n");
    match mode {
        ExtractionMode::PlainText => joined,
        ExtractionMode::Markdown => normalize_markdown(&joined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct StubSource(Result<Vec<String>, String>);

    impl PageTextSource for StubSource {
        fn page_texts(&self, _path: &Path) -> Result<Vec<String>, String> {
            self.0.clone()
        }
    }

    fn extractor(pages: &[&str], mode: ExtractionMode) -> TextExtractor {
        let pages = pages.iter().map(|s| s.to_string()).collect();
        TextExtractor::new(Arc::new(StubSource(Ok(pages))), mode)
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    #[test]
    fn failed_pdfium_bind_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_file(&dir, "a.pdf", b"%PDF-1.4\n%stub\n");
        let source = PdfiumSource::new(Some(dir.path().join("missing-libpdfium.so")), None);

        for _ in 0..2 {
            let err = source.page_texts(&pdf).unwrap_err();
            assert!(err.starts_with("failed to load pdfium library"), "{err}");
        }
        assert!(PDFIUM.get().is_none());
    }

    #[test]
    fn joins_pages_and_skips_empty() {
        assert_eq!(
            join_pages(
                &["Page1".into(), "".into(), "  \n".into(), "Page2".into()],
                ExtractionMode::PlainText
            ),
            "Page1\n\nPage2"
        );
    }

    #[test]
    fn no_text_is_empty_string() {
        assert_eq!(join_pages(&[], ExtractionMode::PlainText), "");
        assert_eq!(join_pages(&["".into()], ExtractionMode::Markdown), "");
    }

    #[test]
    fn crlf_normalised() {
        assert_eq!(
            join_pages(&["a\r\nb\r\n".into()], ExtractionMode::PlainText),
            "a\nb"
        );
    }

    #[test]
    fn markdown_mode_formats_and_normalises() {
        let out = join_pages(
            &["ARTICLE 1 SCOPE\nThe supplier shall\ndeliver goods.".into()],
            ExtractionMode::Markdown,
        );
        assert_eq!(out, "# ARTICLE 1 SCOPE\n\nThe supplier shall deliver goods.");
    }

    #[test]
    fn extract_pdf_with_stub() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.pdf", b"%PDF-1.4\n%stub\n");
        let text = extractor(&["Page1", "", "Page2"], ExtractionMode::PlainText)
            .extract(&path)
            .unwrap();
        assert_eq!(text, "Page1\n\nPage2");
    }

    #[test]
    fn rejects_non_pdf_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "contract.pdf", b"just some text");
        let err = extractor(&["x"], ExtractionMode::PlainText)
            .extract(&path)
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type: text/plain");
    }

    #[test]
    fn missing_file() {
        let err = extractor(&[], ExtractionMode::PlainText)
            .extract(Path::new("/nope/missing.pdf"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound { .. }));
        assert!(err.to_string().starts_with("File not found"));
    }

    #[test]
    fn parser_failure_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.pdf", b"%PDF-1.4 truncated");
        let ex = TextExtractor::new(
            Arc::new(StubSource(Err("invalid xref".into()))),
            ExtractionMode::PlainText,
        );
        let err = ex.extract(&path).unwrap_err();
        assert_eq!(err.to_string(), "Error extracting text from PDF: invalid xref");
    }
}
