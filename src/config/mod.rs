//! Configuration management for rankfuse
//!
//! Every tunable of the engine (timeouts, fusion weights, analyzer rules,
//! reranking budget) lives here and is loaded from TOML, optionally adjusted
//! by a named profile and by `RANKFUSE_*` environment variables.

use crate::error::{RankFuseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

mod validator;

pub use validator::ConfigValidator;

/// Prefix of environment variables that override configuration values
pub const ENV_PREFIX: &str = "RANKFUSE_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Retrieval fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub lexical_timeout_ms: u64,
    pub dense_timeout_ms: u64,
    pub sparse_timeout_ms: u64,
    /// Lower bound on how many candidates each method is asked for
    pub min_candidates: usize,
    /// Candidates requested per result slot
    pub overfetch_factor: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_timeout_ms: 150,
            dense_timeout_ms: 150,
            sparse_timeout_ms: 150,
            min_candidates: 100,
            overfetch_factor: 5,
        }
    }
}

/// Reciprocal Rank Fusion and adaptive weighting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// RRF K constant
    pub rrf_k: f64,
    pub lexical_weight: f64,
    pub dense_weight: f64,
    pub sparse_weight: f64,
    /// Lexical multiplier for short queries
    pub short_lexical_boost: f64,
    /// Dense multiplier for long queries
    pub long_dense_boost: f64,
    /// Sparse multiplier for technical queries
    pub technical_sparse_boost: f64,
    /// Dense multiplier for questions
    pub question_dense_boost: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            lexical_weight: 0.33,
            dense_weight: 0.34,
            sparse_weight: 0.33,
            short_lexical_boost: 1.5,
            long_dense_boost: 1.5,
            technical_sparse_boost: 1.5,
            question_dense_boost: 1.3,
        }
    }
}

/// Query classification rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Queries with at most this many words are short
    pub short_max_words: usize,
    /// Queries with more than this many words are long
    pub long_min_words: usize,
    /// Leading words that mark a question
    pub interrogatives: Vec<String>,
    /// Characters that mark a query as mathematical
    pub math_symbols: String,
    /// Regexes a single token must fully match to count as a code identifier
    pub identifier_patterns: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            short_max_words: 3,
            long_min_words: 10,
            interrogatives: ["who", "what", "when", "where", "why", "how"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            math_symbols: "<>*^%±×÷√∞≈≠≤≥∑∏∫∂∇".to_string(),
            identifier_patterns: vec![
                // camelCase
                r"^[a-z][a-z0-9]*[A-Z][A-Za-z0-9]*$".to_string(),
                // PascalCase with an inner capital
                r"^[A-Z][a-z0-9]+[A-Z][A-Za-z0-9]*$".to_string(),
                // snake_case
                r"^[A-Za-z][A-Za-z0-9]*_[A-Za-z0-9_]*[A-Za-z0-9]$".to_string(),
            ],
        }
    }
}

/// Reranking stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    /// Number of fused candidates sent to the model
    pub top_n: usize,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    /// Budget for the whole stage
    pub timeout_ms: u64,
    /// Model name used by the bundled local reranker
    pub model: String,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n: 100,
            batch_size: 32,
            max_concurrent_batches: 4,
            timeout_ms: 200,
            model: "BAAI/bge-reranker-base".to_string(),
        }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_top_n: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_k: Option<f64>,
    /// Applied to all three retrieval methods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_timeout_ms: Option<u64>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RankFuseError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RankFuseError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RankFuseError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| RankFuseError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(enabled) = overrides.rerank_enabled {
            self.rerank.enabled = enabled;
        }
        if let Some(top_n) = overrides.rerank_top_n {
            self.rerank.top_n = top_n;
        }
        if let Some(k) = overrides.rrf_k {
            self.fusion.rrf_k = k;
        }
        if let Some(timeout) = overrides.retrieval_timeout_ms {
            self.retrieval.lexical_timeout_ms = timeout;
            self.retrieval.dense_timeout_ms = timeout;
            self.retrieval.sparse_timeout_ms = timeout;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RANKFUSE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `RANKFUSE_*` style overrides from any key/value source
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, value.as_ref()) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "RERANK__ENABLED" => self.rerank.enabled = parse_value(path, value)?,
            "RERANK__TOP_N" => self.rerank.top_n = parse_value(path, value)?,
            "RERANK__TIMEOUT_MS" => self.rerank.timeout_ms = parse_value(path, value)?,
            "RERANK__MODEL" => self.rerank.model = value.to_string(),
            "RETRIEVAL__LEXICAL_TIMEOUT_MS" => {
                self.retrieval.lexical_timeout_ms = parse_value(path, value)?
            }
            "RETRIEVAL__DENSE_TIMEOUT_MS" => {
                self.retrieval.dense_timeout_ms = parse_value(path, value)?
            }
            "RETRIEVAL__SPARSE_TIMEOUT_MS" => {
                self.retrieval.sparse_timeout_ms = parse_value(path, value)?
            }
            "FUSION__RRF_K" => self.fusion.rrf_k = parse_value(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| RankFuseError::InvalidConfigValue {
        path: path.to_string(),
        message: format!(
            "Cannot parse '{}' as {}",
            value,
            std::any::type_name::<T>()
        ),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            retrieval: RetrievalConfig::default(),
            fusion: FusionConfig::default(),
            analyzer: AnalyzerConfig::default(),
            rerank: RerankConfig::default(),
            profiles: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.rerank.top_n = 40;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.rerank.top_n, 40);
        assert_eq!(loaded.fusion.rrf_k, 60.0);
        assert_eq!(loaded.meta.schema_version, "1.0.0");
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[_meta]\nschema_version = \"1.0.0\"\n\n[rerank]\nenabled = false\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.rerank.enabled);
        assert_eq!(config.rerank.top_n, 100);
        assert_eq!(config.retrieval.min_candidates, 100);
        assert_eq!(config.analyzer.interrogatives.len(), 6);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/rankfuse.toml"));
        assert!(matches!(result, Err(RankFuseError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_profile_overrides() {
        let mut config = Config::default();
        config.profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                rerank_enabled: Some(false),
                retrieval_timeout_ms: Some(50),
                ..Default::default()
            },
        );

        config.apply_profile("fast").unwrap();
        assert!(!config.rerank.enabled);
        assert_eq!(config.retrieval.dense_timeout_ms, 50);
        assert_eq!(config.retrieval.sparse_timeout_ms, 50);

        assert!(config.apply_profile("missing").is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("RANKFUSE_RERANK__TOP_N", "25"),
            ("RANKFUSE_FUSION__RRF_K", "30"),
            ("RANKFUSE_RERANK__ENABLED", "not-a-bool"),
            ("RANKFUSE_UNKNOWN__KEY", "1"),
            ("OTHER_VAR", "ignored"),
        ]);

        assert_eq!(config.rerank.top_n, 25);
        assert_eq!(config.fusion.rrf_k, 30.0);
        // Unparsable value is skipped
        assert!(config.rerank.enabled);
    }
}
