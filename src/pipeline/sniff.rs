//! Content-based MIME detection.
//!
//! The declared file type on a resource comes from the uploader and is not
//! trusted. Instead the first few kilobytes of the stored file are compared
//! against known signatures, the same way the PDF magic check guards the
//! parser.

use crate::error::ExtractError;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes inspected from the start of the file.
const SNIFF_LEN: usize = 8192;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// Sniff the MIME type of the file at `path`.
pub fn sniff_path(path: &Path) -> Result<String, ExtractError> {
    let mut file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ExtractError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ExtractError::Unreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;

    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.by_ref()
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .map_err(|e| ExtractError::Unreadable {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    Ok(sniff_bytes(&head).to_string())
}

/// Sniff the MIME type of a leading byte slice.
pub fn sniff_bytes(head: &[u8]) -> &'static str {
    if head.is_empty() {
        return "application/x-empty";
    }

    if head.starts_with(b"%PDF-") {
        return MIME_PDF;
    }
    if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return "image/png";
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "image/jpeg";
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return "image/gif";
    }
    if head.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        return "application/msword";
    }
    if head.starts_with(b"PK\x03\x04") {
        return if contains(head, b"word/") {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        } else {
            "application/zip"
        };
    }
    if head.starts_with(b"{\\rtf") {
        return "text/rtf";
    }
    if head.starts_with(&[0x1F, 0x8B]) {
        return "application/gzip";
    }

    if looks_like_text(head) {
        let start = String::from_utf8_lossy(&head[..head.len().min(256)])
            .trim_start_matches('\u{FEFF}')
            .trim_start()
            .to_ascii_lowercase();
        if start.starts_with("<!doctype html") || start.starts_with("<html") {
            return "text/html";
        }
        if start.starts_with("<?xml") {
            return "text/xml";
        }
        return "text/plain";
    }

    MIME_OCTET_STREAM
}

/// Case-insensitive prefix check for `application/pdf`.
pub fn is_pdf(mime: &str) -> bool {
    mime.to_ascii_lowercase().starts_with(MIME_PDF)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Valid UTF-8 (a sequence cut off by the sniff window is tolerated) with no
/// NUL bytes and no stray control characters.
fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    let valid = match std::str::from_utf8(head) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&head[..e.valid_up_to()]) {
            Ok(s) => s,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    valid
        .chars()
        .all(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t' | '\u{0C}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_pdf() {
        assert_eq!(sniff_bytes(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n"), MIME_PDF);
    }

    #[test]
    fn pdf_marker_must_be_at_start() {
        assert_eq!(sniff_bytes(b"hello %PDF-1.4"), "text/plain");
    }

    #[test]
    fn detects_images() {
        assert_eq!(
            sniff_bytes(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]),
            "image/png"
        );
        assert_eq!(sniff_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_bytes(b"GIF89a...."), "image/gif");
    }

    #[test]
    fn detects_word_formats() {
        assert_eq!(
            sniff_bytes(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0]),
            "application/msword"
        );
        let mut docx = b"PK\x03\x04\x14\x00\x06\x00".to_vec();
        docx.extend_from_slice(b"[Content_Types].xml...word/document.xml");
        assert_eq!(
            sniff_bytes(&docx),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(sniff_bytes(b"PK\x03\x04data.csv"), "application/zip");
    }

    #[test]
    fn detects_text_variants() {
        assert_eq!(sniff_bytes(b"Plain contract text.\n"), "text/plain");
        assert_eq!(sniff_bytes(b"<!DOCTYPE html><html></html>"), "text/html");
        assert_eq!(sniff_bytes(b"<?xml version=\"1.0\"?><a/>"), "text/xml");
        assert_eq!(sniff_bytes(b"{\\rtf1\\ansi"), "text/rtf");
    }

    #[test]
    fn truncated_utf8_is_still_text() {
        // "é" is 0xC3 0xA9; cut after the first byte.
        assert_eq!(sniff_bytes(b"caf\xC3"), "text/plain");
    }

    #[test]
    fn binary_and_empty() {
        assert_eq!(sniff_bytes(&[0x00, 0x01, 0x02, 0xFE]), MIME_OCTET_STREAM);
        assert_eq!(sniff_bytes(b""), "application/x-empty");
    }

    #[test]
    fn is_pdf_prefix_case_insensitive() {
        assert!(is_pdf("application/pdf"));
        assert!(is_pdf("Application/PDF"));
        assert!(is_pdf("application/pdf; charset=binary"));
        assert!(!is_pdf("text/plain"));
    }

    #[test]
    fn sniff_ignores_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contract.pdf");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"not really a pdf").unwrap();
        assert_eq!(sniff_path(&path).unwrap(), "text/plain");
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = sniff_path(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::NotFound { .. }));
    }
}
