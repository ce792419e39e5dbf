// Transcript sanitizer
//
// The live model embeds transport markers in its transcription stream
// (`<<AudioTranscription: ...>>`, `[inaudible]`, stray markup). None of it may
// reach the user-visible transcript. Comparison text such as "2 < 3" survives
// because the bracket stands alone between spaces.

use once_cell::sync::Lazy;
use regex::Regex;

static DOUBLE_ANGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<<.*?>>").unwrap());

static BRACKET_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\[\s*(?:audio|sound|music|noise|silence|inaudible|timestamp|stt|asr|transcription)\b[^\]]*\]",
    )
    .unwrap()
});

static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip transport tags and markers from a transcript fragment.
///
/// The pass runs until the text stops changing: removing one construct can
/// join a `<` to a letter and form a new tag. Every pass either shortens the
/// text or leaves it as is, so the loop terminates and the result is a fixed
/// point (`sanitize(sanitize(s)) == sanitize(s)`).
pub fn sanitize(raw: &str) -> String {
    let mut current = sanitize_pass(raw);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let text = strip_markers(text);
    let text = strip_stray_brackets(&text);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Remove marker and tag constructs until none are left
fn strip_markers(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = DOUBLE_ANGLE.replace_all(&current, "");
        let next = BRACKET_MARKER.replace_all(&next, "");
        let next = MARKUP_TAG.replace_all(&next, "").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Drop every `<` or `>` that does not have whitespace on both sides
fn strip_stray_brackets(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();

    chars
        .iter()
        .enumerate()
        .filter(|&(i, &c)| {
            if c != '<' && c != '>' {
                return true;
            }
            let before = i.checked_sub(1).map(|j| chars[j]);
            let after = chars.get(i + 1).copied();
            matches!((before, after), (Some(b), Some(a)) if b.is_whitespace() && a.is_whitespace())
        })
        .map(|(_, &c)| c)
        .collect()
}
