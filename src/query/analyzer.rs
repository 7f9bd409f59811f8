//! Query classification used to pick fusion weights

use crate::config::AnalyzerConfig;
use crate::error::{RankFuseError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

const OPERATORS: [char; 4] = ['=', '+', '/', '\\'];
const BRACKETS: [(char, char); 3] = [('(', ')'), ('[', ']'), ('{', '}')];

/// Characteristics of a query string
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryProfile {
    pub word_count: usize,
    pub is_short: bool,
    pub is_long: bool,
    pub is_technical: bool,
    pub is_question: bool,
}

/// Classifies raw query text into a [`QueryProfile`]
///
/// Patterns are compiled once from [`AnalyzerConfig`]; analysis itself is
/// pure and cannot fail.
#[derive(Debug, Clone)]
pub struct QueryAnalyzer {
    short_max_words: usize,
    long_min_words: usize,
    interrogatives: Vec<String>,
    math_symbols: Vec<char>,
    identifier_patterns: Vec<Regex>,
}

impl QueryAnalyzer {
    /// Build an analyzer from configuration
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let identifier_patterns = config
            .identifier_patterns
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                Regex::new(pattern).map_err(|e| RankFuseError::InvalidConfigValue {
                    path: format!("analyzer.identifier_patterns[{}]", i),
                    message: format!("Invalid regex '{}': {}", pattern, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            short_max_words: config.short_max_words,
            long_min_words: config.long_min_words,
            interrogatives: config
                .interrogatives
                .iter()
                .map(|w| w.to_lowercase())
                .collect(),
            math_symbols: config.math_symbols.chars().collect(),
            identifier_patterns,
        })
    }

    /// Classify a query
    ///
    /// Empty or whitespace-only text yields the default profile.
    pub fn analyze(&self, text: &str) -> QueryProfile {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return QueryProfile::default();
        }

        let word_count = tokens.len();

        QueryProfile {
            word_count,
            is_short: word_count <= self.short_max_words,
            is_long: word_count > self.long_min_words,
            is_technical: self.is_technical(text, &tokens),
            is_question: self.is_question(text, &tokens),
        }
    }

    fn is_technical(&self, text: &str, tokens: &[&str]) -> bool {
        if has_bracket_pair(text) {
            return true;
        }

        if text.chars().any(|c| OPERATORS.contains(&c)) {
            return true;
        }

        if text.chars().any(|c| self.math_symbols.contains(&c)) {
            return true;
        }

        tokens.iter().any(|token| {
            let word = trim_punctuation(token);
            !word.is_empty() && self.identifier_patterns.iter().any(|re| re.is_match(word))
        })
    }

    fn is_question(&self, text: &str, tokens: &[&str]) -> bool {
        if text.trim_end().ends_with('?') {
            return true;
        }

        let first = tokens
            .first()
            .map(|t| trim_punctuation(t).to_lowercase())
            .unwrap_or_default();
        self.interrogatives.iter().any(|w| *w == first)
    }
}

/// An opening bracket followed somewhere later by its closing counterpart
fn has_bracket_pair(text: &str) -> bool {
    BRACKETS.iter().any(|(open, close)| {
        text.find(*open)
            .map(|start| text[start + open.len_utf8()..].contains(*close))
            .unwrap_or(false)
    })
}

fn trim_punctuation(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '"' | '\''))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::from_config(&AnalyzerConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_query_yields_default_profile() {
        assert_eq!(analyzer().analyze(""), QueryProfile::default());
        assert_eq!(analyzer().analyze("   \t "), QueryProfile::default());
    }

    #[test]
    fn test_single_word_is_short() {
        let profile = analyzer().analyze("AI");
        assert_eq!(profile.word_count, 1);
        assert!(profile.is_short);
        assert!(!profile.is_long);
        assert!(!profile.is_technical);
        assert!(!profile.is_question);
    }

    #[test]
    fn test_length_boundaries() {
        let a = analyzer();
        assert!(a.analyze("one two three").is_short);

        let medium = a.analyze("one two three four");
        assert!(!medium.is_short && !medium.is_long);

        let ten = a.analyze("w w w w w w w w w w");
        assert!(!ten.is_long);

        let eleven = a.analyze("w w w w w w w w w w w");
        assert!(eleven.is_long);
    }

    #[test]
    fn test_technical_markers() {
        let a = analyzer();
        assert!(a.analyze("f(x) for large inputs").is_technical);
        assert!(a.analyze("a = b").is_technical);
        assert!(a.analyze("1 + 1").is_technical);
        assert!(a.analyze("path/to/file").is_technical);
        assert!(a.analyze("x ≤ 5").is_technical);
        assert!(a.analyze("why does parseJsonValue fail").is_technical);
        assert!(a.analyze("HashMap iteration order").is_technical);
        assert!(a.analyze("read_to_string, panics").is_technical);

        assert!(!a.analyze("machine learning").is_technical);
        assert!(!a.analyze("HTTP API design").is_technical);
        // Closing bracket before the opener is not a pair
        assert!(!a.analyze("smile :) then (wave").is_technical);
    }

    #[test]
    fn test_question_detection() {
        let a = analyzer();
        assert!(a.analyze("How does tokio schedule tasks").is_question);
        assert!(a.analyze("Why, exactly").is_question);
        assert!(a.analyze("is this thing on?").is_question);
        assert!(a.analyze("is this thing on ?  ").is_question);

        assert!(!a.analyze("however it works").is_question);
        assert!(!a.analyze("tokio scheduling").is_question);
    }

    #[test]
    fn test_categories_overlap() {
        let profile = analyzer().analyze("what is snake_case?");
        assert!(profile.is_short);
        assert!(profile.is_technical);
        assert!(profile.is_question);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let config = AnalyzerConfig {
            identifier_patterns: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            QueryAnalyzer::from_config(&config),
            Err(RankFuseError::InvalidConfigValue { .. })
        ));
    }
}
