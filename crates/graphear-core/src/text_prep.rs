//! Text preparation for speech — OCR markup cleanup, spoken pauses, chunking
//! and download file naming.
//!
//! Pure functions, no I/O. Every length in this module counts `char`s, not
//! bytes: exam scripts are mostly Hangul.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::Question;

static RE_FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z]*\n?(.*?)```").unwrap());
static RE_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").unwrap());
static RE_DOLLAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$+").unwrap());
static RE_MULTI_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static RE_QUESTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\[문항[ \t]+(\d+)\][ \t]*(.*)$").unwrap());

/// Spoken pause inserted for every line break. The speech engine reads the
/// isolated periods as short silences.
pub const PAUSE_MARKER: &str = " . . . . . . . . . . ";

/// Default chunk length for [`split_text`]; the translate-style speech
/// endpoint rejects longer inputs.
pub const DEFAULT_MAX_CHUNK_LEN: usize = 100;

/// Strip the markup an OCR model tends to leave behind so the text reads
/// naturally when spoken.
///
/// Unwraps fenced blocks and bold/italic, drops heading marks and `$` signs
/// (a speech engine reads those as "dollar"), collapses runs of spaces.
/// Line breaks are kept; see [`insert_pauses`].
pub fn clean_text_for_speech(text: &str) -> String {
    let mut c = text.replace("\r\n", "\n");

    c = RE_FENCED_CODE.replace_all(&c, "$1").into_owned();
    c = RE_BOLD.replace_all(&c, "$1").into_owned();
    c = RE_ITALIC.replace_all(&c, "$1").into_owned();
    c = RE_HEADING.replace_all(&c, "").into_owned();
    c = RE_DOLLAR.replace_all(&c, "").into_owned();
    c = RE_MULTI_SPACE.replace_all(&c, " ").into_owned();

    c.trim().to_string()
}

/// Replace every line break with [`PAUSE_MARKER`].
pub fn insert_pauses(text: &str) -> String {
    text.replace('\n', PAUSE_MARKER)
}

/// Full preparation applied by the backend before synthesis.
pub fn prepare_for_speech(text: &str) -> String {
    insert_pauses(&clean_text_for_speech(text))
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Prefers sentence boundaries (`. `), then word boundaries, then hard-splits.
/// No text is dropped: a trailing remainder of any length becomes the last
/// chunk.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(2);
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
    }

    let mut result = Vec::new();
    let mut remaining = text;

    while let Some((window_end, _)) = remaining.char_indices().nth(max_chars) {
        let window = &remaining[..window_end];

        // Prefer sentence boundary (". ")
        let split_at = match window.rfind(". ") {
            Some(pos) if char_len(&window[..pos]) >= max_chars / 2 => pos + 1,
            _ => word_boundary_or_hard(window, max_chars),
        };

        let chunk = remaining[..split_at].trim_end();
        if !chunk.is_empty() {
            result.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() {
        result.push(remaining.to_string());
    }

    result
}

/// Download file name for a synthesized explanation: the problem title with
/// whitespace and non-alphanumerics removed, or `default_stem` when nothing
/// survives, plus `.mp3`.
pub fn download_filename(title: Option<&str>, default_stem: &str) -> String {
    let stem: String = title
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if stem.is_empty() {
        format!("{default_stem}.mp3")
    } else {
        format!("{stem}.mp3")
    }
}

/// Split an extracted script into questions at `[문항 N]` header lines.
///
/// Text after the header on the same line is the start of the body. Text
/// before the first header is dropped. A script with no headers comes back
/// as a single question numbered 0 with an empty header.
pub fn split_questions(text: &str) -> Vec<Question> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let headers: Vec<_> = RE_QUESTION_HEADER.captures_iter(text).collect();
    if headers.is_empty() {
        return vec![Question {
            number: 0,
            header: String::new(),
            body: text.to_string(),
        }];
    }

    headers
        .iter()
        .enumerate()
        .map(|(i, caps)| {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let end = headers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(text.len(), |m| m.start());
            let rest = caps.get(2).map_or("", |m| m.as_str()).trim();
            let tail = text[whole.end..end].trim();
            let body = match (rest.is_empty(), tail.is_empty()) {
                (true, _) => tail.to_string(),
                (false, true) => rest.to_string(),
                (false, false) => format!("{rest}\n{tail}"),
            };
            Question {
                number: caps
                    .get(1)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or_default(),
                header: text[whole].trim().to_string(),
                body,
            }
        })
        .collect()
}

/// Byte offset of a word boundary, or the full window for a hard split.
fn word_boundary_or_hard(window: &str, max_chars: usize) -> usize {
    if let Some(pos) = window.rfind(' ') {
        if char_len(&window[..pos]) >= max_chars / 3 {
            return pos;
        }
    }
    window.len()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
