//! Hybrid search: analyze, retrieve, fuse, rerank, assemble

use crate::cancel::CancellationToken;
use crate::config::{Config, ConfigValidator};
use crate::error::Result;
use crate::query::{Query, QueryAnalyzer};
use crate::retrieval::{
    CoordinatorSettings, DenseIndex, DocumentLookup, FusionEngine, LexicalIndex,
    MethodDiagnostics, QueryEmbedder, RerankSettings, Reranker, RerankingStage, ResultAssembler,
    RetrievalCoordinator, SearchDiagnostics, SearchResponse, SnippetSource, SparseIndex,
    StageTimings, WeightPolicy,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Builds a [`HybridSearcher`] from configuration plus injected collaborators
pub struct HybridSearcherBuilder {
    config: Config,
    lexical: Option<Arc<dyn LexicalIndex>>,
    dense: Option<Arc<dyn DenseIndex>>,
    sparse: Option<Arc<dyn SparseIndex>>,
    embedder: Option<Arc<dyn QueryEmbedder>>,
    reranker: Option<Arc<dyn Reranker>>,
    snippets: Option<Arc<dyn SnippetSource>>,
    lookup: Option<Arc<dyn DocumentLookup>>,
}

impl HybridSearcherBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            lexical: None,
            dense: None,
            sparse: None,
            embedder: None,
            reranker: None,
            snippets: None,
            lookup: None,
        }
    }

    pub fn lexical(mut self, index: Arc<dyn LexicalIndex>) -> Self {
        self.lexical = Some(index);
        self
    }

    pub fn dense(mut self, index: Arc<dyn DenseIndex>) -> Self {
        self.dense = Some(index);
        self
    }

    pub fn sparse(mut self, index: Arc<dyn SparseIndex>) -> Self {
        self.sparse = Some(index);
        self
    }

    /// Turns dense queries into vectors before they reach the dense index
    pub fn embedder(mut self, embedder: Arc<dyn QueryEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn snippets(mut self, snippets: Arc<dyn SnippetSource>) -> Self {
        self.snippets = Some(snippets);
        self
    }

    pub fn lookup(mut self, lookup: Arc<dyn DocumentLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Validate the configuration and wire every stage
    pub fn build(self) -> Result<HybridSearcher> {
        ConfigValidator::validate(&self.config)?;

        let analyzer = QueryAnalyzer::from_config(&self.config.analyzer)?;
        let policy = WeightPolicy::from_config(&self.config.fusion);
        let fusion = FusionEngine::from_config(&self.config.fusion)?;

        let mut coordinator =
            RetrievalCoordinator::new(CoordinatorSettings::from_config(&self.config.retrieval));
        if let Some(index) = self.lexical {
            coordinator = coordinator.with_lexical(index);
        }
        if let Some(index) = self.dense {
            coordinator = coordinator.with_dense(index);
        }
        if let Some(index) = self.sparse {
            coordinator = coordinator.with_sparse(index);
        }
        if let Some(embedder) = self.embedder {
            coordinator = coordinator.with_embedder(embedder);
        }

        let mut reranking = RerankingStage::new(RerankSettings::from_config(&self.config.rerank));
        if let Some(reranker) = self.reranker {
            reranking = reranking.with_reranker(reranker);
        }
        if let Some(snippets) = self.snippets {
            reranking = reranking.with_snippets(snippets);
        }

        Ok(HybridSearcher {
            analyzer,
            policy,
            coordinator,
            fusion,
            reranking,
            assembler: ResultAssembler::new(self.lookup),
        })
    }
}

/// Multi-method searcher: the public entry point of the engine
///
/// Holds no per-query state, so one instance can serve concurrent searches.
pub struct HybridSearcher {
    analyzer: QueryAnalyzer,
    policy: WeightPolicy,
    coordinator: RetrievalCoordinator,
    fusion: FusionEngine,
    reranking: RerankingStage,
    assembler: ResultAssembler,
}

impl HybridSearcher {
    pub fn builder(config: Config) -> HybridSearcherBuilder {
        HybridSearcherBuilder::new(config)
    }

    /// Run a search to completion
    pub async fn search(&self, query: &Query) -> Result<SearchResponse> {
        self.search_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Run a search that the caller may abandon through `cancel`
    ///
    /// Fails with `RetrievalUnavailable` only when every method failed, and
    /// with `Cancelled` only when the token fired. Reranker and lookup
    /// failures degrade the response instead.
    pub async fn search_with_cancel(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let query_id = Uuid::new_v4();
        let span = tracing::info_span!("search", query_id = %query_id);

        self.execute(query_id, query, cancel).instrument(span).await
    }

    async fn execute(
        &self,
        query_id: Uuid,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut timings = StageTimings::default();

        // Step 1: Classify the query and pick weights
        let stage = Instant::now();
        let profile = self.analyzer.analyze(query.text());
        let weights = self.policy.weights_for(&profile, query.adaptive_weights());
        timings.analyze_ms = elapsed_ms(stage);
        tracing::debug!(
            "Query profile: words={}, short={}, long={}, technical={}, question={}",
            profile.word_count,
            profile.is_short,
            profile.is_long,
            profile.is_technical,
            profile.is_question
        );

        // Step 2: Parallel lexical + dense + sparse retrieval
        let stage = Instant::now();
        let candidates = self.coordinator.retrieve(query, cancel).await?;
        timings.retrieval_ms = elapsed_ms(stage);

        // Step 3: Weighted Reciprocal Rank Fusion
        let stage = Instant::now();
        let effective_weights = weights.restricted_to(|m| candidates.is_succeeded(m));
        let fused = self.fusion.fuse(&candidates, &weights);
        let fused_candidates = fused.len();
        timings.fusion_ms = elapsed_ms(stage);

        // Step 4: Rerank the head of the fused list
        let stage = Instant::now();
        let top_n = self.reranking.settings().top_n;
        let outcome = self.reranking.rerank(query, fused, top_n, cancel).await?;
        timings.rerank_ms = elapsed_ms(stage);
        tracing::debug!("Rerank status: {:?}", outcome.status);

        // Step 5: Truncate and hydrate
        let stage = Instant::now();
        let (results, report) = self.assembler.assemble(outcome.results, query.limit()).await;
        timings.assemble_ms = elapsed_ms(stage);

        let diagnostics = SearchDiagnostics {
            query_id,
            started_at,
            profile,
            weights,
            effective_weights,
            methods: candidates.iter().map(MethodDiagnostics::from).collect(),
            contributions: report.contributions,
            fused_candidates,
            rerank: outcome.status,
            lookup_degraded: report.lookup_degraded,
            missing_documents: report.missing_documents,
            timings,
            total_ms: elapsed_ms(start),
        };

        tracing::info!(
            "Search returned {} results from {} candidates in {:.1}ms (degraded: {})",
            results.len(),
            fused_candidates,
            diagnostics.total_ms,
            diagnostics.is_degraded()
        );

        Ok(SearchResponse {
            results,
            diagnostics,
        })
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RankFuseError;
    use crate::query::QueryFilters;
    use crate::retrieval::{DenseQuery, DocumentId, IndexError, RerankStatus, RetrievalMethod};
    use async_trait::async_trait;

    struct FixedIndex(Vec<&'static str>);

    impl FixedIndex {
        fn ids(&self, limit: usize) -> Vec<DocumentId> {
            self.0.iter().take(limit).map(|id| DocumentId::from(*id)).collect()
        }
    }

    #[async_trait]
    impl LexicalIndex for FixedIndex {
        async fn search(
            &self,
            _text: &str,
            limit: usize,
            _filters: &QueryFilters,
        ) -> std::result::Result<Vec<DocumentId>, IndexError> {
            Ok(self.ids(limit))
        }
    }

    #[async_trait]
    impl DenseIndex for FixedIndex {
        async fn search(
            &self,
            _query: &DenseQuery,
            limit: usize,
            _filters: &QueryFilters,
        ) -> std::result::Result<Vec<DocumentId>, IndexError> {
            Ok(self.ids(limit))
        }
    }

    #[async_trait]
    impl SparseIndex for FixedIndex {
        async fn search(
            &self,
            _text: &str,
            limit: usize,
            _filters: &QueryFilters,
        ) -> std::result::Result<Vec<DocumentId>, IndexError> {
            Ok(self.ids(limit))
        }
    }

    fn searcher() -> HybridSearcher {
        HybridSearcher::builder(Config::default())
            .lexical(Arc::new(FixedIndex(vec!["docA", "docB"])))
            .dense(Arc::new(FixedIndex(vec!["docB", "docA"])))
            .sparse(Arc::new(FixedIndex(vec!["docC"])))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_search_fills_diagnostics() {
        let query = Query::new("rust async runtime", 10).unwrap();
        let response = searcher().search(&query).await.unwrap();

        assert_eq!(response.results.len(), 3);
        assert_eq!(response.diagnostics.methods.len(), 3);
        assert_eq!(response.diagnostics.fused_candidates, 3);
        assert!(response.diagnostics.profile.is_short);
        assert_eq!(response.diagnostics.rerank, RerankStatus::Unavailable);
        assert!(!response.diagnostics.is_degraded());
        assert!((response.diagnostics.effective_weights.total() - 1.0).abs() < 1e-12);
        assert_eq!(
            response.diagnostics.contributions.get(RetrievalMethod::Sparse),
            1
        );
    }

    #[tokio::test]
    async fn test_limit_truncates_results() {
        let query = Query::new("rust", 1).unwrap();
        let response = searcher().search(&query).await.unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_each_search_gets_its_own_id() {
        let searcher = searcher();
        let query = Query::new("rust", 5).unwrap();

        let first = searcher.search(&query).await.unwrap();
        let second = searcher.search(&query).await.unwrap();

        assert_ne!(first.diagnostics.query_id, second.diagnostics.query_id);
        let ids = |r: &SearchResponse| -> Vec<DocumentId> {
            r.results.iter().map(|x| x.document_id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn test_no_collaborators_is_unavailable() {
        let searcher = HybridSearcher::builder(Config::default()).build().unwrap();
        let query = Query::new("rust", 5).unwrap();

        let err = searcher.search(&query).await.unwrap_err();
        assert!(matches!(err, RankFuseError::RetrievalUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let query = Query::new("rust", 5).unwrap();

        let err = searcher()
            .search_with_cancel(&query, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, RankFuseError::Cancelled));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::default();
        config.fusion.rrf_k = 0.0;

        assert!(HybridSearcher::builder(config).build().is_err());
    }
}
