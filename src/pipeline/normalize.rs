//! Markdown normalisation: deterministic cleanup of extracted Markdown.
//!
//! Page text turned into Markdown comes out with uneven spacing: headings
//! glued to the next paragraph, tables and fenced blocks without the blank
//! lines renderers need, runs of empty lines where page furniture was
//! dropped, and heading levels that start at `###` because the document's
//! title page was skipped.
//!
//! ## Rule Order
//!
//! Rules run in a fixed order. The first collapse gives the insertion rules
//! a predictable starting point; the insertion rules may then create runs of
//! blank lines, which the second collapse cleans up before headings are
//! re-levelled and the result trimmed. Line-based rules skip the inside of
//! fenced code blocks.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to extracted Markdown.
///
/// Rules (applied in order):
/// 1. Collapse 3+ consecutive newlines to exactly 2
/// 2. Ensure a blank line after every heading
/// 3. Ensure a blank line after the last item of a list
/// 4. Surround fenced code blocks with blank lines
/// 5. Blank line before each table and after its separator row
/// 6. Ensure a blank line after a block quote
/// 7. Collapse 3+ consecutive newlines again
/// 8. Shift headings so the shallowest is level 1
/// 9. Trim leading/trailing whitespace
pub fn normalize_markdown(input: &str) -> String {
    let s = collapse_newlines(input);
    let s = space_after_headings(&s);
    let s = space_after_list_items(&s);
    let s = space_around_code_fences(&s);
    let s = space_around_tables(&s);
    let s = space_after_quotes(&s);
    let s = collapse_newlines(&s);
    let s = shift_headings(&s);
    s.trim().to_string()
}

static RE_EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+\S").unwrap());

static RE_LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*(?:[-*+]|\d+[.)])[ \t]+\S").unwrap());

static RE_CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());

// ── Rules 1 & 7: Collapse blank lines ────────────────────────────────────────

fn collapse_newlines(input: &str) -> String {
    RE_EXCESS_NEWLINES.replace_all(input, "\n\n").into_owned()
}

// ── Rule 2: Blank line after headings ────────────────────────────────────────

fn space_after_headings(input: &str) -> String {
    blank_line_after(input, is_heading, |_| false)
}

// ── Rule 3: Blank line after list items ──────────────────────────────────────

/// Consecutive items and indented continuation lines stay together; the
/// blank line goes after the item that ends the list.
fn space_after_list_items(input: &str) -> String {
    blank_line_after(input, is_list_item, |next| {
        is_list_item(next) || next.starts_with([' ', '\t'])
    })
}

// ── Rule 4: Blank lines around fenced code ───────────────────────────────────

fn space_around_code_fences(input: &str) -> String {
    RE_CODE_BLOCK.replace_all(input, "\n\n$0\n\n").into_owned()
}

// ── Rule 5: Table spacing ────────────────────────────────────────────────────

/// A line containing `|` belongs to a table. The first line of each table
/// gets a blank line before it; a separator row (`|---…`) gets one after it.
fn space_around_tables(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_table = false;
    let mut in_fence = false;

    for line in input.split('\n') {
        if toggles_fence(line) {
            in_fence = !in_fence;
            in_table = false;
            out.push(line);
            continue;
        }
        if in_fence {
            out.push(line);
            continue;
        }

        if line.contains('|') {
            if !in_table {
                in_table = true;
                out.push("");
            }
            out.push(line);
            if line.trim().starts_with("|---") {
                out.push("");
            }
        } else {
            in_table = false;
            out.push(line);
        }
    }

    out.join("\n")
}

// ── Rule 6: Blank line after block quotes ────────────────────────────────────

fn space_after_quotes(input: &str) -> String {
    blank_line_after(input, is_quote, is_quote)
}

// ── Rule 8: Re-level headings ────────────────────────────────────────────────

fn shift_headings(input: &str) -> String {
    let mut in_fence = false;
    let mut min_level: Option<usize> = None;
    for line in input.split('\n') {
        if toggles_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(level) = heading_level(line) {
            min_level = Some(min_level.map_or(level, |m| m.min(level)));
        }
    }

    let shift = match min_level {
        Some(level) if level > 1 => level - 1,
        _ => return input.to_string(),
    };

    let mut in_fence = false;
    input
        .split('\n')
        .map(|line| {
            if toggles_fence(line) {
                in_fence = !in_fence;
                return line;
            }
            if !in_fence && heading_level(line).is_some() {
                &line[shift..]
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Line helpers ─────────────────────────────────────────────────────────────

fn is_heading(line: &str) -> bool {
    RE_HEADING.is_match(line)
}

fn heading_level(line: &str) -> Option<usize> {
    RE_HEADING.captures(line).map(|caps| caps[1].len())
}

fn is_list_item(line: &str) -> bool {
    RE_LIST_ITEM.is_match(line)
}

fn is_quote(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

/// A line that opens or closes a fenced block. A fence that opens and
/// closes on the same line does not change state.
fn toggles_fence(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with("```") {
        return false;
    }
    !(trimmed.len() >= 6 && trimmed[3..].contains("```"))
}

/// Insert a blank line after every line matching `is_target` whose next line
/// is non-blank, unless `joins_next` says the two lines belong together.
fn blank_line_after(
    input: &str,
    is_target: impl Fn(&str) -> bool,
    joins_next: impl Fn(&str) -> bool,
) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 16);
    let mut in_fence = false;

    for (i, &line) in lines.iter().enumerate() {
        out.push(line);
        if toggles_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence || !is_target(line) {
            continue;
        }
        if let Some(&next) = lines.get(i + 1) {
            if !next.trim().is_empty() && !joins_next(next) {
                out.push("");
            }
        }
    }

    out.join("\n")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_newlines() {
        assert_eq!(collapse_newlines("a\n\n\n\n\nb\n\n\nc\n\nd"), "a\n\nb\n\nc\n\nd");
    }

    #[test]
    fn test_heading_gets_trailing_blank() {
        assert_eq!(
            space_after_headings("# Title\nBody\n## Next\n\nMore"),
            "# Title\n\nBody\n## Next\n\nMore"
        );
    }

    #[test]
    fn test_hashtag_is_not_heading() {
        assert_eq!(space_after_headings("#hashtag\ntext"), "#hashtag\ntext");
        assert_eq!(space_after_headings("####### seven\ntext"), "####### seven\ntext");
    }

    #[test]
    fn test_list_end_gets_blank() {
        assert_eq!(
            space_after_list_items("- one\n- two\nAfter"),
            "- one\n- two\n\nAfter"
        );
        assert_eq!(
            space_after_list_items("1. first\n2. second\nAfter"),
            "1. first\n2. second\n\nAfter"
        );
    }

    #[test]
    fn test_list_continuation_kept() {
        let input = "- item\n  continued\n\nNext";
        assert_eq!(space_after_list_items(input), input);
    }

    #[test]
    fn test_code_fence_spacing() {
        assert_eq!(
            normalize_markdown("Intro\n```bash\n# comment\necho hi\n```\nOutro"),
            "Intro\n\n```bash\n# comment\necho hi\n```\n\nOutro"
        );
    }

    #[test]
    fn test_table_spacing() {
        assert_eq!(
            normalize_markdown("para\n|a|b|\n|---|---|\n|1|2|\nend"),
            "para\n\n|a|b|\n|---|---|\n\n|1|2|\nend"
        );
    }

    #[test]
    fn test_table_inside_fence_untouched() {
        let input = "```\n|a|b|\n|---|---|\n```";
        assert_eq!(space_around_tables(input), input);
    }

    #[test]
    fn test_quote_spacing() {
        assert_eq!(space_after_quotes("> quoted\nnext"), "> quoted\n\nnext");
        assert_eq!(
            space_after_quotes("> line one\n> line two\nnext"),
            "> line one\n> line two\n\nnext"
        );
    }

    #[test]
    fn test_heading_shift() {
        assert_eq!(
            normalize_markdown("### Title\nIntro\n#### Sub\nBody\n##### Deep\nText"),
            "# Title\n\nIntro\n## Sub\n\nBody\n### Deep\n\nText"
        );
    }

    #[test]
    fn test_no_shift_when_h1_present() {
        assert_eq!(
            normalize_markdown("# Top\n\n### Deep"),
            "# Top\n\n### Deep"
        );
    }

    #[test]
    fn test_shift_ignores_fenced_hashes() {
        assert_eq!(
            shift_headings("```\n# not a heading\n```\n## Real"),
            "```\n# not a heading\n```\n# Real"
        );
    }

    #[test]
    fn test_trims_result() {
        assert_eq!(normalize_markdown("\n\n  text  \n\n"), "text");
        assert_eq!(normalize_markdown(""), "");
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(normalize_markdown("Page1\n\nPage2"), "Page1\n\nPage2");
    }

    #[test]
    fn test_full_document() {
        let input = "### Agreement\nThis Agreement is made.\n\n\n\n#### Parties\n- Buyer\n- Seller\nSigned below.\n> Note: draft\nEnd\n| A | B |\n|---|---|\n| 1 | 2 |\n```\nx\n```\nDone";
        let expected = "# Agreement\n\nThis Agreement is made.\n\n## Parties\n\n- Buyer\n- Seller\n\nSigned below.\n> Note: draft\n\nEnd\n\n| A | B |\n|---|---|\n\n| 1 | 2 |\n\n```\nx\n```\n\nDone";
        assert_eq!(normalize_markdown(input), expected);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "### Agreement\nThis Agreement is made.\n\n\n\n#### Parties\n- Buyer\n- Seller\nSigned below.\n> Note: draft\nEnd\n| A | B |\n|---|---|\n| 1 | 2 |\n```\nx\n```\nDone",
            "para\n|a|b|\n|---|---|\n|1|2|\nend",
            "Intro\n```bash\n# comment\necho hi\n```\nOutro",
            "## One\n## Two\n- a\n> q\nz",
        ];
        for input in inputs {
            let once = normalize_markdown(input);
            let twice = normalize_markdown(&once);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
