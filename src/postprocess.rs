//! Deterministic cleanup of vision-model transcriptions.
//!
//! Vision models prompted for plain OCR still wrap answers in code fences,
//! emit CRLF line endings, or sprinkle zero-width characters. These passes
//! remove that noise without touching the transcribed content. Traditional OCR
//! output only gets [`normalise_whitespace`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup pass to raw model output.
///
/// Order matters: fences are stripped before line endings are normalised so
/// the fence regex sees the original first/last lines.
pub fn clean_transcription(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = remove_invisible_chars(&s);
    normalise_whitespace(&s)
}

/// Normalise line endings, trim trailing spaces, collapse blank runs, and
/// trim the whole text.
pub fn normalise_whitespace(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    RE_BLANK_RUN.replace_all(&s, "\n\n").trim().to_string()
}

// ── Outer fences ─────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Blank runs ───────────────────────────────────────────────────────────────

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

// ── Invisible Unicode ────────────────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}
