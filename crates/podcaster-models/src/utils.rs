//! Small helpers shared across crates.

/// Maximum length, in characters, of an error message persisted on a job.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Reduce arbitrary diagnostic text to a bounded, single-line summary.
///
/// Whitespace runs (including newlines) collapse to one space and the
/// result is cut at `max_chars` characters, never inside a code point.
/// Truncated messages end with `...`.
pub fn bounded_message(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = collapsed.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_unchanged() {
        assert_eq!(bounded_message("ffmpeg exited", 500), "ffmpeg exited");
    }

    #[test]
    fn test_collapses_lines() {
        assert_eq!(
            bounded_message("line one\n  line two\r\n\tthree", 500),
            "line one line two three"
        );
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let text = "é".repeat(600);
        let out = bounded_message(&text, MAX_ERROR_MESSAGE_LEN);
        assert_eq!(out.chars().count(), MAX_ERROR_MESSAGE_LEN);
        assert!(out.ends_with("..."));
    }
}
