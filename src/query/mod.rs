//! Search queries and query classification

mod analyzer;

pub use analyzer::{QueryAnalyzer, QueryProfile};

use crate::error::{RankFuseError, Result};
use serde::Serialize;

/// Opaque filters forwarded untouched to every retrieval collaborator
pub type QueryFilters = serde_json::Map<String, serde_json::Value>;

/// A validated, immutable search request
///
/// Built through [`Query::new`], which rejects empty text and a zero limit,
/// so every `Query` the engine sees satisfies those invariants.
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    text: String,
    limit: usize,
    filters: QueryFilters,
    enable_reranking: bool,
    adaptive_weights: bool,
}

impl Query {
    pub fn new(text: impl Into<String>, limit: usize) -> Result<Self> {
        let text = text.into();

        if text.trim().is_empty() {
            return Err(RankFuseError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        if limit == 0 {
            return Err(RankFuseError::InvalidQuery(
                "Limit must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            text,
            limit,
            filters: QueryFilters::new(),
            enable_reranking: true,
            adaptive_weights: true,
        })
    }

    pub fn with_filters(mut self, filters: QueryFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_reranking(mut self, enabled: bool) -> Self {
        self.enable_reranking = enabled;
        self
    }

    pub fn with_adaptive_weights(mut self, enabled: bool) -> Self {
        self.adaptive_weights = enabled;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn filters(&self) -> &QueryFilters {
        &self.filters
    }

    pub fn enable_reranking(&self) -> bool {
        self.enable_reranking
    }

    pub fn adaptive_weights(&self) -> bool {
        self.adaptive_weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_text() {
        assert!(matches!(
            Query::new("   ", 10),
            Err(RankFuseError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_rejects_zero_limit() {
        assert!(matches!(
            Query::new("rust", 0),
            Err(RankFuseError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_defaults_and_builders() {
        let mut filters = QueryFilters::new();
        filters.insert("lang".to_string(), serde_json::json!("en"));

        let query = Query::new("rust async", 5)
            .unwrap()
            .with_filters(filters)
            .with_reranking(false);

        assert_eq!(query.text(), "rust async");
        assert_eq!(query.limit(), 5);
        assert!(!query.enable_reranking());
        assert!(query.adaptive_weights());
        assert_eq!(query.filters()["lang"], "en");
    }
}
