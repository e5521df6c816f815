//! Page text → Markdown for legal documents.
//!
//! pdfium hands back page text as the layout engine saw it: one physical line
//! per output line, hyphenated words split across lines, bullets drawn with
//! whatever glyph the author's word processor used. This module turns that
//! into Markdown a renderer (or an LLM) can work with:
//!
//! * ALL-CAPS title lines become `#` headings.
//! * `ARTICLE n` / `CHAPTER n` / `PART n` lines become `##` headings.
//! * `Section n.n` / `Schedule n` / `Exhibit A` lines become `###` headings.
//! * Bullet glyphs (`•`, `◦`, `▪`, …) become `- ` list items.
//! * Soft-wrapped prose is re-flowed into one line per paragraph, joining
//!   words split by an end-of-line hyphen.
//! * Lines that are already Markdown (table rows, quotes, `#` headings) pass
//!   through untouched. Consecutive table rows and quote lines stay on
//!   adjacent lines.
//!
//! The output is not normalised; the extractor runs
//! [`normalize_markdown`](super::normalize::normalize_markdown) over the
//! joined document.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest line still considered a heading candidate.
const MAX_HEADING_CHARS: usize = 80;

/// Most words a heading candidate may contain.
const MAX_HEADING_WORDS: usize = 12;

static RE_ARTICLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:article|chapter|part)\s+(?:[0-9]+|[ivxlcdm]+)\b").unwrap()
});

static RE_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:section|schedule|exhibit|annex|appendix)\s+(?:[0-9]+(?:\.[0-9]+)*|[ivxlcdm]+|[a-z])\b",
    )
    .unwrap()
});

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[•◦▪‣●·\-\*]\s+(\S.*)$").unwrap());

static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s+\S").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Heading,
    ListItem,
    TableRow,
    Quote,
    Paragraph,
}

impl BlockKind {
    /// Runs of these are joined with a single newline.
    fn groups(self) -> bool {
        matches!(self, BlockKind::ListItem | BlockKind::TableRow | BlockKind::Quote)
    }
}

/// Convert the text of one page into Markdown.
pub fn page_to_markdown(page: &str) -> String {
    let mut blocks: Vec<(BlockKind, String)> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for raw in page.lines() {
        let line = raw.trim();
        if line.is_empty() {
            flush_paragraph(&mut paragraph, &mut blocks);
            continue;
        }

        if let Some(kind) = markdown_shaped(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push((kind, line.to_string()));
        } else if let Some(heading) = heading_for(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push((BlockKind::Heading, heading));
        } else if let Some(caps) = RE_BULLET.captures(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push((BlockKind::ListItem, format!("- {}", &caps[1])));
        } else if RE_ORDERED.is_match(line) {
            flush_paragraph(&mut paragraph, &mut blocks);
            blocks.push((BlockKind::ListItem, line.to_string()));
        } else {
            paragraph.push(line);
        }
    }
    flush_paragraph(&mut paragraph, &mut blocks);

    let mut out = String::new();
    let mut prev: Option<BlockKind> = None;
    for (kind, text) in blocks {
        if let Some(p) = prev {
            if p == kind && kind.groups() {
                out.push('\n');
            } else {
                out.push_str("\n\n");
            }
        }
        out.push_str(&text);
        prev = Some(kind);
    }
    out
}

fn markdown_shaped(line: &str) -> Option<BlockKind> {
    match line.chars().next()? {
        '|' => Some(BlockKind::TableRow),
        '>' => Some(BlockKind::Quote),
        '#' => Some(BlockKind::Heading),
        _ => None,
    }
}

fn flush_paragraph(lines: &mut Vec<&str>, blocks: &mut Vec<(BlockKind, String)>) {
    if lines.is_empty() {
        return;
    }
    blocks.push((BlockKind::Paragraph, reflow(lines)));
    lines.clear();
}

/// Join soft-wrapped lines into a single line.
///
/// A trailing hyphen after a letter is dropped when the next line starts with
/// a lowercase letter (`agree-` + `ment` → `agreement`).
fn reflow(lines: &[&str]) -> String {
    let mut out = String::new();
    for line in lines {
        if out.is_empty() {
            out.push_str(line);
            continue;
        }
        let next_lower = line.chars().next().is_some_and(char::is_lowercase);
        if out.ends_with('-') && next_lower && ends_with_letter_before_hyphen(&out) {
            out.pop();
        } else {
            out.push(' ');
        }
        out.push_str(line);
    }
    out
}

fn ends_with_letter_before_hyphen(s: &str) -> bool {
    let mut rev = s.chars().rev();
    rev.next() == Some('-') && rev.next().is_some_and(char::is_alphabetic)
}

fn heading_for(line: &str) -> Option<String> {
    if !is_heading_shaped(line) {
        return None;
    }
    if RE_ARTICLE.is_match(line) {
        Some(format!("## {line}"))
    } else if RE_SECTION.is_match(line) {
        Some(format!("### {line}"))
    } else if is_caps_title(line) {
        Some(format!("# {line}"))
    } else {
        None
    }
}

fn is_heading_shaped(line: &str) -> bool {
    line.chars().count() <= MAX_HEADING_CHARS
        && line.split_whitespace().count() <= MAX_HEADING_WORDS
        && !line.ends_with([',', ';', ':'])
}

/// At least three letters and none of them lowercase.
fn is_caps_title(line: &str) -> bool {
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    letters >= 3 && !line.chars().any(char::is_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_headings() {
        assert_eq!(heading_for("MASTER SERVICES AGREEMENT").unwrap(), "# MASTER SERVICES AGREEMENT");
        assert_eq!(heading_for("ARTICLE 1 DEFINITIONS").unwrap(), "## ARTICLE 1 DEFINITIONS");
        assert_eq!(heading_for("Article IV").unwrap(), "## Article IV");
        assert_eq!(heading_for("Section 1.1 Terms").unwrap(), "### Section 1.1 Terms");
        assert_eq!(heading_for("Exhibit A").unwrap(), "### Exhibit A");
    }

    #[test]
    fn test_not_headings() {
        assert!(heading_for("Sections 2 and 3 apply").is_none());
        assert!(heading_for("NOW, THEREFORE,").is_none());
        assert!(heading_for("IN WITNESS WHEREOF, the parties have signed").is_none());
        assert!(heading_for("12").is_none());
        assert!(heading_for("Partnership terms").is_none());
    }

    #[test]
    fn test_reflow_joins_hyphenation() {
        assert_eq!(reflow(&["the mean-", "ing given"]), "the meaning given");
        assert_eq!(reflow(&["self-", "Executing"]), "self- Executing");
        assert_eq!(reflow(&["a line", "continues"]), "a line continues");
    }

    #[test]
    fn test_page_to_markdown() {
        let page = "MASTER SERVICES AGREEMENT\n\
                    This Agreement is entered into\n\
                    by and between the parties.\n\
                    \n\
                    ARTICLE 1 DEFINITIONS\n\
                    Section 1.1 Terms\n\
                    • Buyer means the purchaser.\n\
                    • Seller means the vendor.\n\
                    The term \"Affiliate\" has the mean-\n\
                    ing given below.";
        let expected = "# MASTER SERVICES AGREEMENT\n\n\
                        This Agreement is entered into by and between the parties.\n\n\
                        ## ARTICLE 1 DEFINITIONS\n\n\
                        ### Section 1.1 Terms\n\n\
                        - Buyer means the purchaser.\n\
                        - Seller means the vendor.\n\n\
                        The term \"Affiliate\" has the meaning given below.";
        assert_eq!(page_to_markdown(page), expected);
    }

    #[test]
    fn test_ordered_items_kept() {
        assert_eq!(
            page_to_markdown("1. First term\n2. Second term"),
            "1. First term\n2. Second term"
        );
    }

    #[test]
    fn test_tables_and_quotes_stay_together() {
        let page = "Fee schedule\n\
                    |ITEM|FEE|\n\
                    |---|---|\n\
                    |Filing|100|\n\
                    > first quote line\n\
                    > second quote line";
        let md = page_to_markdown(page);
        assert_eq!(
            md,
            "Fee schedule\n\n\
             |ITEM|FEE|\n|---|---|\n|Filing|100|\n\n\
             > first quote line\n> second quote line"
        );

        let normalized = crate::pipeline::normalize::normalize_markdown(&md);
        assert!(normalized.contains("|ITEM|FEE|\n|---|---|"), "{normalized}");
        assert!(
            normalized.contains("> first quote line\n> second quote line"),
            "{normalized}"
        );
    }

    #[test]
    fn test_existing_heading_not_doubled() {
        assert_eq!(page_to_markdown("# TERMS"), "# TERMS");
    }

    #[test]
    fn test_empty_page() {
        assert_eq!(page_to_markdown(""), "");
        assert_eq!(page_to_markdown("  \n \n"), "");
    }
}
