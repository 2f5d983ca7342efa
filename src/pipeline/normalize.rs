//! Deterministic text cleanup.
//!
//! Two consumers:
//!
//! * [`normalize_text`] runs over native text from a PDF text layer or a
//!   DOCX body before it is stored or sent to the model. OCR output is never
//!   passed through here; it is kept verbatim.
//! * [`strip_code_fence`] runs over model and face-detector replies before
//!   JSON parsing (models wrap JSON in ```` ```json ```` fences despite being
//!   told not to).
//!
//! ## Rule Order
//!
//! Line endings are normalised before trimming so `\r` is never left at a
//! line end; invisible characters are removed before blank-line collapsing
//! so a line holding only a zero-width space counts as blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to native document text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 1
/// 5. Trim leading and trailing blank lines
pub fn normalize_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Count characters that are not whitespace.
pub fn non_whitespace_chars(input: &str) -> usize {
    input.chars().filter(|c| !c.is_whitespace()).count()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Reply fences ─────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

/// Remove one outer ```` ``` ```` fence (with any language tag) around a reply.
///
/// Input without a surrounding fence is returned trimmed.
pub fn strip_code_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].trim().to_string(),
        None => trimmed.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
