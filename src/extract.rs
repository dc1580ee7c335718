use anyhow::{Context, Result};
use regex::Regex;

/// Ordered verdict patterns, compiled once per run
#[derive(Debug, Clone, Default)]
pub struct ScorePatterns {
    patterns: Vec<Regex>,
}

impl ScorePatterns {
    /// Compile the configured patterns, failing on the first invalid one
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref())
                    .with_context(|| format!("Invalid score pattern: {}", p.as_ref()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Extract the verdict token from a judge's free-text output.
    ///
    /// The text is uppercased, then patterns are tried in order. The first
    /// pattern with any non-empty match wins and its last match is returned.
    /// For patterns with capture groups the first group is the match text.
    pub fn extract(&self, judgment: &str) -> Option<String> {
        let upper = judgment.to_uppercase();

        self.patterns.iter().find_map(|pattern| {
            pattern
                .captures_iter(&upper)
                .filter_map(|caps| {
                    let m = if pattern.captures_len() > 1 {
                        caps.get(1)
                    } else {
                        caps.get(0)
                    };
                    m.map(|m| m.as_str()).filter(|s| !s.is_empty())
                })
                .last()
                .map(|s| s.trim_matches('\n').to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> ScorePatterns {
        ScorePatterns::compile(list).unwrap()
    }

    #[test]
    fn test_last_match_of_first_pattern_wins() {
        let p = patterns(&[r"\[\[(A|B)\]\]", r"(A|B)"]);
        assert_eq!(p.extract("... [[A]] ... [[B]]"), Some("B".to_string()));
    }

    #[test]
    fn test_falls_back_to_later_pattern() {
        let p = patterns(&[r"\[\[([AB<>=]+)\]\]", r"\[([AB<>=]+)\]"]);
        assert_eq!(
            p.extract("My final verdict is [A>>B]."),
            Some("A>>B".to_string())
        );
    }

    #[test]
    fn test_first_pattern_shadows_later_patterns() {
        let p = patterns(&[r"\[\[([AB<>=]+)\]\]", r"\[([AB<>=]+)\]"]);
        assert_eq!(
            p.extract("[B>A] at first, then [[A=B]]"),
            Some("A=B".to_string())
        );
    }

    #[test]
    fn test_text_is_uppercased_before_matching() {
        let p = patterns(&[r"\[\[([AB<>=]+)\]\]"]);
        assert_eq!(p.extract("verdict: [[a>b]]"), Some("A>B".to_string()));
    }

    #[test]
    fn test_empty_matches_are_dropped() {
        let p = patterns(&[r"VERDICT:([AB]*)", r"\[\[(A|B)\]\]"]);
        assert_eq!(p.extract("verdict: [[B]]"), Some("B".to_string()));
    }

    #[test]
    fn test_pattern_without_groups_uses_whole_match() {
        let p = patterns(&[r"A>+B|B>+A"]);
        assert_eq!(p.extract("a>b then b>>a"), Some("B>>A".to_string()));
    }

    #[test]
    fn test_surrounding_newlines_are_stripped() {
        let p = patterns(&[r"VERDICT:(\s*[AB]\s*)"]);
        assert_eq!(p.extract("verdict:\nA\n"), Some("A".to_string()));
    }

    #[test]
    fn test_no_match_is_absent() {
        let p = patterns(&[r"\[\[(A|B)\]\]"]);
        assert_eq!(p.extract("I cannot decide."), None);
    }

    #[test]
    fn test_empty_pattern_list_is_absent() {
        let p = ScorePatterns::default();
        assert!(p.is_empty());
        assert_eq!(p.extract("[[A]]"), None);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = ScorePatterns::compile(&["(unclosed"]).unwrap_err();
        assert!(err.to_string().contains("Invalid score pattern"));
    }
}
