//! Occurrence finding with context windows.

use crate::error::{KildeError, Result};
use regex::{Regex, RegexBuilder};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Query must be delimited by non-word characters.
    WholeWord,
    /// Query may appear inside longer words.
    Substring,
}

/// One emitted occurrence with its surrounding text.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSpan {
    /// Byte offset of the occurrence in the source text.
    pub offset: usize,
    /// Text as it appears in the source.
    pub matched: String,
    /// Up to `context_chars` on each side, with `...` where text was cut.
    pub context: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchSet {
    /// Every occurrence, including ones suppressed from `spans`.
    pub total: usize,
    pub spans: Vec<MatchSpan>,
}

impl MatchSet {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// Case-insensitive pattern for `query`.
///
/// Whole-word boundaries are only asserted on sides where the query starts or
/// ends with a word character, so queries like `c++` still match.
pub fn build_pattern(query: &str, mode: MatchMode) -> Result<Regex> {
    let query = query.trim();
    if query.is_empty() {
        return Err(KildeError::InvalidInput("Search query is empty".to_string()));
    }

    let escaped = regex::escape(query);
    let pattern = match mode {
        MatchMode::Substring => escaped,
        MatchMode::WholeWord => {
            let is_word = |c: char| c.is_alphanumeric() || c == '_';
            let lead = if query.starts_with(is_word) { r"\b" } else { "" };
            let trail = if query.ends_with(is_word) { r"\b" } else { "" };
            format!("{}{}{}", lead, escaped, trail)
        }
    };

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| KildeError::InvalidInput(format!("Bad search pattern: {}", e)))
}

/// Byte index `n` characters before `byte`, clamped to the start.
fn back_chars(text: &str, byte: usize, n: usize) -> usize {
    if n == 0 {
        return byte;
    }
    text[..byte]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte index `n` characters after `byte`, clamped to the end.
fn forward_chars(text: &str, byte: usize, n: usize) -> usize {
    text[byte..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| byte + i)
        .unwrap_or(text.len())
}

/// Find occurrences of `pattern` in `text` with `context_chars` on each side.
///
/// An occurrence whose window would overlap the previously emitted window
/// (closer than `2 * context_chars` to it) is counted but not emitted.
pub fn find_matches_with(text: &str, pattern: &Regex, context_chars: usize) -> MatchSet {
    let mut set = MatchSet::default();
    let mut kept_window_end: Option<usize> = None;

    for m in pattern.find_iter(text) {
        set.total += 1;

        let start = back_chars(text, m.start(), context_chars);
        if kept_window_end.is_some_and(|end| start < end) {
            continue;
        }
        let end = forward_chars(text, m.end(), context_chars);
        kept_window_end = Some(end);

        let mut context = String::with_capacity(end - start + 6);
        if start > 0 {
            context.push_str("...");
        }
        context.push_str(text[start..end].trim());
        if end < text.len() {
            context.push_str("...");
        }

        set.spans.push(MatchSpan {
            offset: m.start(),
            matched: m.as_str().to_string(),
            context,
        });
    }

    set
}

/// Convenience wrapper that builds the pattern first.
pub fn find_matches(text: &str, query: &str, context_chars: usize, mode: MatchMode) -> Result<MatchSet> {
    let pattern = build_pattern(query, mode)?;
    Ok(find_matches_with(text, &pattern, context_chars))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_word_vs_substring() {
        let text = "More ore was mined before the ore crusher broke.";

        let strict = find_matches(text, "ore", 5, MatchMode::WholeWord).unwrap();
        assert_eq!(strict.total, 2);

        let loose = find_matches(text, "ore", 5, MatchMode::Substring).unwrap();
        assert_eq!(loose.total, 4);
    }

    #[test]
    fn test_inflection_only_found_by_substring() {
        let text = "The patents were filed in 2019.";
        assert!(find_matches(text, "patent", 20, MatchMode::WholeWord).unwrap().is_empty());
        assert_eq!(find_matches(text, "patent", 20, MatchMode::Substring).unwrap().total, 1);
    }

    #[test]
    fn test_case_insensitive_and_phrases() {
        let text = "Magnetic Confinement Fusion differs from inertial confinement fusion.";
        let set = find_matches(text, "confinement fusion", 0, MatchMode::WholeWord).unwrap();
        assert_eq!(set.total, 2);
        assert_eq!(set.spans[0].matched, "Confinement Fusion");
    }

    #[test]
    fn test_symbol_queries_still_match() {
        let set = find_matches("I write C++ daily", "c++", 3, MatchMode::WholeWord).unwrap();
        assert_eq!(set.total, 1);
    }

    #[test]
    fn test_close_matches_emit_one_block() {
        let text = format!("{}tritium and tritium{}", "x ".repeat(50), " y".repeat(50));
        let set = find_matches(&text, "tritium", 20, MatchMode::WholeWord).unwrap();

        assert_eq!(set.total, 2);
        assert_eq!(set.spans.len(), 1);
        assert!(set.spans[0].context.starts_with("..."));
        assert!(set.spans[0].context.ends_with("..."));
    }

    #[test]
    fn test_distant_matches_emit_separate_blocks() {
        let text = format!("tritium{}tritium", " filler ".repeat(20));
        let set = find_matches(&text, "tritium", 10, MatchMode::WholeWord).unwrap();
        assert_eq!(set.spans.len(), 2);
        assert!(!set.spans[0].context.starts_with("..."));
        assert!(!set.spans[1].context.ends_with("..."));
    }

    #[test]
    fn test_context_counts_characters_not_bytes() {
        let text = "ééééé fusion ééééé";
        let set = find_matches(text, "fusion", 3, MatchMode::WholeWord).unwrap();
        assert_eq!(set.spans[0].context, "...éé fusion éé...");
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(find_matches("text", "   ", 10, MatchMode::WholeWord).is_err());
    }
}
