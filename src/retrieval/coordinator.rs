//! Concurrent fan-out to the lexical, dense and sparse indexes

use crate::cancel::CancellationToken;
use crate::config::RetrievalConfig;
use crate::error::{RankFuseError, Result};
use crate::query::Query;
use crate::retrieval::{
    DenseIndex, DenseQuery, DocumentId, FailureKind, IndexError, LexicalIndex, MethodResult,
    QueryEmbedder, RetrievalCandidates, RetrievalMethod, SparseIndex,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type CallResult = std::result::Result<Vec<DocumentId>, (FailureKind, String)>;

/// Budgets and fetch depth for the retrieval fan-out
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub lexical_timeout: Duration,
    pub dense_timeout: Duration,
    pub sparse_timeout: Duration,
    pub min_candidates: usize,
    pub overfetch_factor: usize,
}

impl CoordinatorSettings {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            lexical_timeout: Duration::from_millis(config.lexical_timeout_ms),
            dense_timeout: Duration::from_millis(config.dense_timeout_ms),
            sparse_timeout: Duration::from_millis(config.sparse_timeout_ms),
            min_candidates: config.min_candidates,
            overfetch_factor: config.overfetch_factor,
        }
    }

    pub fn timeout_for(&self, method: RetrievalMethod) -> Duration {
        match method {
            RetrievalMethod::Lexical => self.lexical_timeout,
            RetrievalMethod::Dense => self.dense_timeout,
            RetrievalMethod::Sparse => self.sparse_timeout,
        }
    }

    /// Candidates requested from each method: `max(min_candidates, limit * overfetch_factor)`
    pub fn fetch_depth(&self, limit: usize) -> usize {
        self.min_candidates
            .max(limit.saturating_mul(self.overfetch_factor))
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Runs every retrieval method concurrently and collects what completes
///
/// A method that is missing, unavailable, slow or failing yields an empty
/// failed [`MethodResult`]; only the failure of all three is an error.
pub struct RetrievalCoordinator {
    lexical: Option<Arc<dyn LexicalIndex>>,
    dense: Option<Arc<dyn DenseIndex>>,
    sparse: Option<Arc<dyn SparseIndex>>,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    settings: CoordinatorSettings,
}

impl RetrievalCoordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            lexical: None,
            dense: None,
            sparse: None,
            embedder: None,
            settings,
        }
    }

    pub fn with_lexical(mut self, index: Arc<dyn LexicalIndex>) -> Self {
        self.lexical = Some(index);
        self
    }

    pub fn with_dense(mut self, index: Arc<dyn DenseIndex>) -> Self {
        self.dense = Some(index);
        self
    }

    pub fn with_sparse(mut self, index: Arc<dyn SparseIndex>) -> Self {
        self.sparse = Some(index);
        self
    }

    /// Embed queries before dense retrieval instead of sending raw text
    pub fn with_embedder(mut self, embedder: Arc<dyn QueryEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Query every method in parallel, each under its own timeout
    pub async fn retrieve(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<RetrievalCandidates> {
        if cancel.is_cancelled() {
            return Err(RankFuseError::Cancelled);
        }

        let depth = self.settings.fetch_depth(query.limit());

        let (lexical, dense, sparse) = tokio::join!(
            self.run_method(
                RetrievalMethod::Lexical,
                depth,
                cancel,
                self.lexical_call(query, depth)
            ),
            self.run_method(
                RetrievalMethod::Dense,
                depth,
                cancel,
                self.dense_call(query, depth)
            ),
            self.run_method(
                RetrievalMethod::Sparse,
                depth,
                cancel,
                self.sparse_call(query, depth)
            ),
        );

        if cancel.is_cancelled() {
            debug!("Retrieval cancelled by caller");
            return Err(RankFuseError::Cancelled);
        }

        let candidates = RetrievalCandidates::new(lexical, dense, sparse);

        match candidates.succeeded_count() {
            0 => {
                let failures = candidates.failures();
                warn!("All retrieval methods failed: {:?}", failures);
                Err(RankFuseError::RetrievalUnavailable { failures })
            }
            3 => Ok(candidates),
            n => {
                warn!(
                    "Retrieval degraded: {} of {} methods succeeded",
                    n,
                    RetrievalMethod::ALL.len()
                );
                Ok(candidates)
            }
        }
    }

    /// Bound one collaborator call by its timeout and the cancellation token
    async fn run_method<F>(
        &self,
        method: RetrievalMethod,
        depth: usize,
        cancel: &CancellationToken,
        call: F,
    ) -> MethodResult
    where
        F: Future<Output = CallResult>,
    {
        let start = Instant::now();
        let budget = self.settings.timeout_for(method);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err((FailureKind::Cancelled, String::new())),
            result = tokio::time::timeout(budget, call) => match result {
                Ok(call_result) => call_result,
                Err(_) => Err((
                    FailureKind::Timeout,
                    format!("exceeded {}ms", budget.as_millis()),
                )),
            },
        };

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(mut ids) => {
                ids.truncate(depth);
                debug!(
                    "{} retrieval returned {} candidates in {:.1}ms",
                    method,
                    ids.len(),
                    latency_ms
                );
                MethodResult::success(method, ids, latency_ms)
            }
            Err((kind, message)) => {
                match kind {
                    FailureKind::NotConfigured | FailureKind::Cancelled => {
                        debug!("{} retrieval skipped: {}", method, kind.as_str())
                    }
                    _ => warn!(
                        "{} retrieval failed after {:.1}ms: {} {}",
                        method,
                        latency_ms,
                        kind.as_str(),
                        message
                    ),
                }
                MethodResult::failed(method, kind, message, latency_ms)
            }
        }
    }

    async fn lexical_call(&self, query: &Query, depth: usize) -> CallResult {
        let index = self.lexical.as_ref().ok_or_else(not_configured)?;
        if !index.is_available() {
            return Err(unavailable());
        }

        index
            .search(query.text(), depth, query.filters())
            .await
            .map_err(index_failure)
    }

    async fn dense_call(&self, query: &Query, depth: usize) -> CallResult {
        let index = self.dense.as_ref().ok_or_else(not_configured)?;
        if !index.is_available() {
            return Err(unavailable());
        }

        let dense_query = match &self.embedder {
            Some(embedder) if embedder.is_available() => DenseQuery::Vector(
                embedder
                    .embed(query.text())
                    .await
                    .map_err(index_failure)?,
            ),
            _ => DenseQuery::Text(query.text().to_string()),
        };

        index
            .search(&dense_query, depth, query.filters())
            .await
            .map_err(index_failure)
    }

    async fn sparse_call(&self, query: &Query, depth: usize) -> CallResult {
        let index = self.sparse.as_ref().ok_or_else(not_configured)?;
        if !index.is_available() {
            return Err(unavailable());
        }

        index
            .search(query.text(), depth, query.filters())
            .await
            .map_err(index_failure)
    }
}

fn not_configured() -> (FailureKind, String) {
    (FailureKind::NotConfigured, String::new())
}

fn unavailable() -> (FailureKind, String) {
    (
        FailureKind::Unavailable,
        "index reports unavailable".to_string(),
    )
}

fn index_failure(e: IndexError) -> (FailureKind, String) {
    match e {
        IndexError::Unavailable(msg) => (FailureKind::Unavailable, msg),
        IndexError::Backend(err) => (FailureKind::Error, err.to_string()),
    }
}
