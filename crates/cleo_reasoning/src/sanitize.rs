//! Cleanup of raw model output before delivery.

use regex::Regex;
use std::sync::LazyLock;

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@[!&]?\d+>").unwrap());
static SPECIAL_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\|[a-z_]+\|>").unwrap());
static CAMEL_JOIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());
static PUNCT_JOIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z][.!?,;])([A-Za-z])").unwrap());
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static USER_NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<user_note>(.*?)</user_note>").unwrap());

/// Pull `<user_note>...</user_note>` blocks out of a completion. Returns the
/// text without them and the trimmed, non-empty notes in order. An
/// unterminated note runs to the end of the text and is dropped.
pub fn extract_user_notes(raw: &str) -> (String, Vec<String>) {
    let notes = USER_NOTE_RE
        .captures_iter(raw)
        .map(|caps| caps[1].trim().to_string())
        .filter(|note| !note.is_empty())
        .collect();
    let mut text = USER_NOTE_RE.replace_all(raw, "").into_owned();
    if let Some(idx) = text.find("<user_note>") {
        text.truncate(idx);
    }
    (text, notes)
}

/// Strip platform mentions, special tokens and stop sequences, then fix
/// run-together words and collapse whitespace. Everything after the first
/// stop sequence is cut.
pub fn sanitize_reply(raw: &str, stop_sequences: &[String]) -> String {
    let mut text = raw;
    for stop in stop_sequences.iter().filter(|s| !s.is_empty()) {
        if let Some(idx) = text.find(stop.as_str()) {
            text = &text[..idx];
        }
    }

    let text = MENTION_RE.replace_all(text, "");
    let text = SPECIAL_TOKEN_RE.replace_all(&text, "");
    let text = fix_spacing(&text);
    let text = SPACES_RE.replace_all(&text, " ");
    let text = NEWLINES_RE.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Insert the missing space in "wordWord" and "end.Start". URLs and
/// dotted names like "example.com" are left alone.
pub fn fix_spacing(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            if word.contains("://") || word.starts_with("www.") {
                return word.to_string();
            }
            let word = CAMEL_JOIN_RE.replace_all(word, "$1 $2");
            PUNCT_JOIN_RE
                .replace_all(&word, |caps: &regex::Captures| {
                    let (left, right) = (&caps[1], &caps[2]);
                    if left.ends_with('.') && right.chars().all(|c| c.is_ascii_lowercase()) {
                        // "example.com", "e.g"
                        format!("{}{}", left, right)
                    } else {
                        format!("{} {}", left, right)
                    }
                })
                .into_owned()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
