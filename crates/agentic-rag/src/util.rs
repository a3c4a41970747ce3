//! Time conversion and token estimation helpers

use std::time::Duration;

/// Words-to-tokens ratio used for rough token estimates
const TOKENS_PER_WORD: f64 = 1.3;

/// Estimate the token count of one or more texts.
///
/// Counts whitespace-separated words and scales by 1.3, truncating.
pub fn estimate_tokens(texts: &[&str]) -> u32 {
    let words: usize = texts.iter().map(|t| t.split_whitespace().count()).sum();
    (words as f64 * TOKENS_PER_WORD) as u32
}

/// Convert milliseconds to seconds, rounded to two decimals
pub fn millis_to_seconds(millis: u64) -> f64 {
    (millis as f64 / 10.0).round() / 100.0
}

/// Milliseconds elapsed in a duration, saturating at `u64::MAX`
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Human-readable execution time: `"123ms"`, `"1.23s"`, `"2m 5s"`
pub fn format_execution_time(millis: u64) -> String {
    if millis < 1_000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{}s", millis_to_seconds(millis))
    } else {
        format!("{}m {}s", millis / 60_000, (millis % 60_000) / 1_000)
    }
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(&["How does RAG work?"]), 5); // 4 words * 1.3
        assert_eq!(estimate_tokens(&["one two", "three"]), 3);
        assert_eq!(estimate_tokens(&[""]), 0);
    }

    #[test]
    fn test_millis_to_seconds() {
        assert_eq!(millis_to_seconds(0), 0.0);
        assert_eq!(millis_to_seconds(1234), 1.23);
        assert_eq!(millis_to_seconds(1235), 1.24);
        assert_eq!(millis_to_seconds(60_000), 60.0);
    }

    #[test]
    fn test_format_execution_time() {
        assert_eq!(format_execution_time(123), "123ms");
        assert_eq!(format_execution_time(1230), "1.23s");
        assert_eq!(format_execution_time(125_000), "2m 5s");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("héllo", 2), "hé...");
    }
}
