//! Local ONNX models via FastEmbed: cross-encoder reranking and query embedding
//!
//! Models are downloaded on first use to `~/.cache/huggingface/`. Inference
//! is CPU bound, so every call runs on the blocking thread pool.

use crate::config::RerankConfig;
use crate::retrieval::{IndexError, QueryEmbedder, RerankCandidate, RerankError, Reranker};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, TextEmbedding, TextRerank,
};
use std::sync::Arc;

/// Cross-encoder reranker backed by FastEmbed
pub struct FastEmbedReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl FastEmbedReranker {
    /// Load a reranking model
    ///
    /// # Arguments
    /// * `model_name` - Model name (e.g., "BAAI/bge-reranker-base")
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let reranker_model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            "rozgo/bge-reranker-v2-m3" | "bge-reranker-v2-m3" => RerankerModel::BGERerankerV2M3,
            _ => {
                return Err(RerankError::InvalidInput(format!(
                    "Unsupported reranker model: {}. Supported: BAAI/bge-reranker-base, rozgo/bge-reranker-v2-m3",
                    model_name
                )));
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options =
            RerankInitOptions::new(reranker_model).with_show_download_progress(true);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    pub fn from_config(config: &RerankConfig) -> Result<Self, RerankError> {
        Self::new(&config.model)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl Reranker for FastEmbedReranker {
    async fn score(&self, query: &str, candidate: &RerankCandidate) -> Result<f32, RerankError> {
        let scores = self
            .score_batch(query, std::slice::from_ref(candidate))
            .await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| RerankError::Backend(anyhow::anyhow!("model returned no score")))
    }

    async fn score_batch(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<f32>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        if query.is_empty() {
            return Err(RerankError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        let model = Arc::clone(&self.model);
        let query = query.to_string();
        let documents: Vec<String> = candidates.iter().map(|c| c.snippet.clone()).collect();
        let count = documents.len();

        let results = tokio::task::spawn_blocking(move || {
            let documents: Vec<&str> = documents.iter().map(|s| s.as_str()).collect();
            model.rerank(query.as_str(), documents, false, None)
        })
        .await
        .map_err(|e| RerankError::Backend(anyhow::anyhow!("reranker task failed: {}", e)))?
        .map_err(|e| RerankError::Backend(anyhow::anyhow!("{}", e)))?;

        // FastEmbed returns results sorted by score; put them back in input order
        let mut scores = vec![f32::NAN; count];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = sigmoid(result.score);
            }
        }

        Ok(scores)
    }
}

/// Map a cross-encoder logit into `[0, 1]`
fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

/// Query embedder backed by a FastEmbed sentence model
pub struct FastEmbedQueryEmbedder {
    model: Arc<TextEmbedding>,
    dimension: usize,
}

impl FastEmbedQueryEmbedder {
    pub fn new(model_name: &str) -> Result<Self, IndexError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(IndexError::Unavailable(format!(
                    "Unsupported embedding model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            dimension,
        })
    }

    pub fn with_default_model() -> Result<Self, IndexError> {
        Self::new("all-MiniLM-L6-v2")
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl QueryEmbedder for FastEmbedQueryEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let mut embeddings = tokio::task::spawn_blocking(move || model.embed(vec![text], None))
            .await
            .map_err(|e| IndexError::Backend(anyhow::anyhow!("embedding task failed: {}", e)))?
            .map_err(|e| IndexError::Backend(anyhow::anyhow!("{}", e)))?;

        let embedding = embeddings
            .pop()
            .ok_or_else(|| IndexError::Backend(anyhow::anyhow!("No embeddings generated")))?;

        if embedding.len() != self.dimension {
            return Err(IndexError::Backend(anyhow::anyhow!(
                "Dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }

        Ok(embedding)
    }
}
