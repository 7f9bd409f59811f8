//! Post-fusion reranking with a pairwise relevance model

use crate::cancel::CancellationToken;
use crate::config::RerankConfig;
use crate::error::{RankFuseError, Result};
use crate::query::Query;
use crate::retrieval::{
    DocumentId, FusedResult, RerankCandidate, RerankError, Reranker, RetrievalMethod,
    SnippetSource,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Reranking budget and batching
#[derive(Debug, Clone)]
pub struct RerankSettings {
    pub enabled: bool,
    pub top_n: usize,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub timeout: Duration,
}

impl RerankSettings {
    pub fn from_config(config: &RerankConfig) -> Self {
        Self {
            enabled: config.enabled,
            top_n: config.top_n,
            batch_size: config.batch_size.max(1),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self::from_config(&RerankConfig::default())
    }
}

/// A document in the final ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub document_id: DocumentId,
    /// Model score in `[0, 1]` for the reranked head, fused score for the tail
    ///
    /// The two scales are not comparable: a tail score sits near the RRF
    /// range (about `1 / (k + rank)`), well below typical model scores.
    /// Ordering across the boundary comes from position, not from this value.
    pub rerank_score: f64,
    pub fused_score: f64,
    /// 1-based position in the fused ranking
    pub original_rank: usize,
    pub contributing_methods: BTreeSet<RetrievalMethod>,
}

/// What the reranking stage did for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RerankStatus {
    /// The model rescored the head of the ranking
    Applied { reranked: usize },
    /// Turned off by the query or by configuration
    Disabled,
    /// No reranker configured, or it reports unavailable
    Unavailable,
    /// The model failed or timed out; fused order was kept
    Degraded { reason: String },
}

impl RerankStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, RerankStatus::Degraded { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub results: Vec<RerankedResult>,
    pub status: RerankStatus,
}

/// Rescores the top fused candidates; never fails the query on model errors
pub struct RerankingStage {
    reranker: Option<Arc<dyn Reranker>>,
    snippets: Option<Arc<dyn SnippetSource>>,
    settings: RerankSettings,
}

impl RerankingStage {
    pub fn new(settings: RerankSettings) -> Self {
        Self {
            reranker: None,
            snippets: None,
            settings,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_snippets(mut self, snippets: Arc<dyn SnippetSource>) -> Self {
        self.snippets = Some(snippets);
        self
    }

    pub fn settings(&self) -> &RerankSettings {
        &self.settings
    }

    /// Wrap fused results unchanged: `rerank_score = fused_score`, fused order kept
    pub fn passthrough(fused: Vec<FusedResult>) -> Vec<RerankedResult> {
        passthrough_from(fused, 1)
    }

    /// Rerank the top `top_n` fused candidates
    ///
    /// Candidates past `top_n` keep their fused order and are appended after
    /// the reranked head. Only caller cancellation is an error.
    pub async fn rerank(
        &self,
        query: &Query,
        mut fused: Vec<FusedResult>,
        top_n: usize,
        cancel: &CancellationToken,
    ) -> Result<RerankOutcome> {
        if !query.enable_reranking() || !self.settings.enabled {
            return Ok(RerankOutcome {
                results: Self::passthrough(fused),
                status: RerankStatus::Disabled,
            });
        }

        let reranker = match &self.reranker {
            Some(reranker) if reranker.is_available() => reranker.clone(),
            _ => {
                debug!("Reranker not available, keeping fused order");
                return Ok(RerankOutcome {
                    results: Self::passthrough(fused),
                    status: RerankStatus::Unavailable,
                });
            }
        };

        let head_len = top_n.min(fused.len());
        if head_len == 0 {
            return Ok(RerankOutcome {
                results: Self::passthrough(fused),
                status: RerankStatus::Applied { reranked: 0 },
            });
        }

        let scored = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RankFuseError::Cancelled),
            result = tokio::time::timeout(
                self.settings.timeout,
                self.score_head(reranker, query.text(), &fused[..head_len]),
            ) => result,
        };

        let scores = match scored {
            Ok(Ok(scores)) => scores,
            Ok(Err(e)) => return Ok(degraded(fused, e.to_string())),
            Err(_) => {
                return Ok(degraded(
                    fused,
                    format!("timed out after {}ms", self.settings.timeout.as_millis()),
                ))
            }
        };

        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Ok(degraded(fused, format!("model returned non-finite score {}", bad)));
        }

        let tail = fused.split_off(head_len);
        let mut head: Vec<RerankedResult> = fused
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(i, (result, score))| {
                if !(0.0..=1.0).contains(&score) {
                    debug!("Clamping out-of-range rerank score {} for {}", score, result.document_id);
                }
                RerankedResult {
                    document_id: result.document_id,
                    rerank_score: f64::from(score.clamp(0.0, 1.0)),
                    fused_score: result.fused_score,
                    original_rank: i + 1,
                    contributing_methods: result.contributing_methods,
                }
            })
            .collect();

        head.sort_by(|a, b| {
            b.rerank_score
                .total_cmp(&a.rerank_score)
                .then_with(|| a.original_rank.cmp(&b.original_rank))
        });

        debug!("Reranked {} of {} candidates", head_len, head_len + tail.len());

        head.extend(passthrough_from(tail, head_len + 1));
        Ok(RerankOutcome {
            results: head,
            status: RerankStatus::Applied { reranked: head_len },
        })
    }

    /// Score the head in concurrent batches; scores come back in input order
    async fn score_head(
        &self,
        reranker: Arc<dyn Reranker>,
        query_text: &str,
        head: &[FusedResult],
    ) -> std::result::Result<Vec<f32>, RerankError> {
        let ids: Vec<DocumentId> = head.iter().map(|r| r.document_id.clone()).collect();

        let mut snippet_map: HashMap<DocumentId, String> = match &self.snippets {
            Some(source) if source.is_available() => source.snippets(&ids).await?,
            _ => HashMap::new(),
        };

        let candidates: Vec<RerankCandidate> = ids
            .into_iter()
            .map(|document_id| {
                let snippet = snippet_map.remove(&document_id).unwrap_or_default();
                RerankCandidate {
                    document_id,
                    snippet,
                }
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_batches));
        let query: Arc<str> = Arc::from(query_text);
        let batches: Vec<Vec<RerankCandidate>> = candidates
            .chunks(self.settings.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let batch_count = batches.len();

        // Dropping the set aborts every batch still in flight
        let mut tasks = JoinSet::new();
        for (batch_index, batch) in batches.into_iter().enumerate() {
            let reranker = reranker.clone();
            let semaphore = semaphore.clone();
            let query = query.clone();

            tasks.spawn(async move {
                score_batch(reranker, semaphore, query, batch)
                    .await
                    .map(|scores| (batch_index, scores))
            });
        }

        let mut per_batch: Vec<Vec<f32>> = vec![Vec::new(); batch_count];
        while let Some(joined) = tasks.join_next().await {
            let (batch_index, scores) = joined.map_err(|e| {
                RerankError::Backend(anyhow::anyhow!("Rerank task failed: {}", e))
            })??;
            per_batch[batch_index] = scores;
        }

        Ok(per_batch.concat())
    }
}

/// Score one batch once a concurrency permit is available
async fn score_batch(
    reranker: Arc<dyn Reranker>,
    semaphore: Arc<Semaphore>,
    query: Arc<str>,
    batch: Vec<RerankCandidate>,
) -> std::result::Result<Vec<f32>, RerankError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| RerankError::Backend(e.into()))?;

    let scores = reranker.score_batch(&query, &batch).await?;
    if scores.len() != batch.len() {
        return Err(RerankError::InvalidInput(format!(
            "Score count mismatch: expected {}, got {}",
            batch.len(),
            scores.len()
        )));
    }
    Ok(scores)
}

fn passthrough_from(fused: Vec<FusedResult>, first_rank: usize) -> Vec<RerankedResult> {
    fused
        .into_iter()
        .enumerate()
        .map(|(i, result)| RerankedResult {
            document_id: result.document_id,
            rerank_score: result.fused_score,
            fused_score: result.fused_score,
            original_rank: first_rank + i,
            contributing_methods: result.contributing_methods,
        })
        .collect()
}

fn degraded(fused: Vec<FusedResult>, reason: String) -> RerankOutcome {
    warn!("Reranking degraded to fused order: {}", reason);
    RerankOutcome {
        results: RerankingStage::passthrough(fused),
        status: RerankStatus::Degraded { reason },
    }
}
