use crate::config::Config;
use crate::error::{RankFuseError, Result, ValidationError};
use regex::Regex;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem before failing
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_fusion(config, &mut errors);
        Self::validate_analyzer(config, &mut errors);
        Self::validate_rerank(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RankFuseError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;
        for (path, timeout) in [
            ("retrieval.lexical_timeout_ms", retrieval.lexical_timeout_ms),
            ("retrieval.dense_timeout_ms", retrieval.dense_timeout_ms),
            ("retrieval.sparse_timeout_ms", retrieval.sparse_timeout_ms),
        ] {
            if timeout == 0 {
                errors.push(ValidationError::new(path, "Timeout must be greater than 0"));
            }
        }

        if retrieval.min_candidates == 0 {
            errors.push(ValidationError::new(
                "retrieval.min_candidates",
                "Minimum candidate count must be greater than 0",
            ));
        }

        if retrieval.overfetch_factor == 0 {
            errors.push(ValidationError::new(
                "retrieval.overfetch_factor",
                "Over-fetch factor must be greater than 0",
            ));
        }
    }

    fn validate_fusion(config: &Config, errors: &mut Vec<ValidationError>) {
        let fusion = &config.fusion;

        if !fusion.rrf_k.is_finite() || fusion.rrf_k <= 0.0 {
            errors.push(ValidationError::new(
                "fusion.rrf_k",
                format!("RRF k must be a positive number, got {}", fusion.rrf_k),
            ));
        }

        let weights = [
            ("fusion.lexical_weight", fusion.lexical_weight),
            ("fusion.dense_weight", fusion.dense_weight),
            ("fusion.sparse_weight", fusion.sparse_weight),
        ];
        for (path, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be a non-negative number, got {}", weight),
                ));
            }
        }
        if weights.iter().all(|(_, w)| *w == 0.0) {
            errors.push(ValidationError::new(
                "fusion",
                "At least one method weight must be greater than 0",
            ));
        }

        for (path, boost) in [
            ("fusion.short_lexical_boost", fusion.short_lexical_boost),
            ("fusion.long_dense_boost", fusion.long_dense_boost),
            ("fusion.technical_sparse_boost", fusion.technical_sparse_boost),
            ("fusion.question_dense_boost", fusion.question_dense_boost),
        ] {
            if !boost.is_finite() || boost <= 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Boost must be a positive number, got {}", boost),
                ));
            }
        }
    }

    fn validate_analyzer(config: &Config, errors: &mut Vec<ValidationError>) {
        let analyzer = &config.analyzer;

        if analyzer.short_max_words > analyzer.long_min_words {
            errors.push(ValidationError::new(
                "analyzer.short_max_words",
                format!(
                    "Short threshold ({}) cannot exceed long threshold ({})",
                    analyzer.short_max_words, analyzer.long_min_words
                ),
            ));
        }

        if analyzer.interrogatives.iter().any(|w| w.trim().is_empty()) {
            errors.push(ValidationError::new(
                "analyzer.interrogatives",
                "Interrogative words cannot be empty",
            ));
        }

        for (i, pattern) in analyzer.identifier_patterns.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                errors.push(ValidationError::new(
                    format!("analyzer.identifier_patterns[{}]", i),
                    format!("Invalid regex '{}': {}", pattern, e),
                ));
            }
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        let rerank = &config.rerank;

        if rerank.top_n == 0 {
            errors.push(ValidationError::new(
                "rerank.top_n",
                "Top N must be greater than 0",
            ));
        }

        if rerank.batch_size == 0 {
            errors.push(ValidationError::new(
                "rerank.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if rerank.max_concurrent_batches == 0 {
            errors.push(ValidationError::new(
                "rerank.max_concurrent_batches",
                "Concurrent batch limit must be greater than 0",
            ));
        }

        if rerank.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "rerank.timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        if rerank.model.is_empty() {
            errors.push(ValidationError::new(
                "rerank.model",
                "Model name cannot be empty",
            ));
        }
    }
}
