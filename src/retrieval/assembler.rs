//! Result hydration and search diagnostics

use crate::query::QueryProfile;
use crate::retrieval::{
    DocumentId, DocumentLookup, DocumentSummary, MethodFailure, MethodResult, MethodWeights,
    RerankStatus, RerankedResult, RetrievalMethod,
};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// One entry of the final ranking, ready for the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based position in the final ranking
    pub rank: usize,
    pub document_id: DocumentId,
    /// Final ranking score: the model score in `[0, 1]` for reranked
    /// results, the fused RRF score otherwise
    ///
    /// Reranked results are followed by fused-only results, so the scale
    /// changes at that boundary. Compare scores only within one group.
    pub score: f64,
    pub fused_score: f64,
    pub original_rank: usize,
    pub contributing_methods: BTreeSet<RetrievalMethod>,
    /// Hydrated document; `None` when the lookup could not resolve it
    pub document: Option<DocumentSummary>,
}

/// How many final results each method contributed to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCounts {
    pub lexical: usize,
    pub dense: usize,
    pub sparse: usize,
}

impl MethodCounts {
    pub fn get(&self, method: RetrievalMethod) -> usize {
        match method {
            RetrievalMethod::Lexical => self.lexical,
            RetrievalMethod::Dense => self.dense,
            RetrievalMethod::Sparse => self.sparse,
        }
    }

    fn increment(&mut self, method: RetrievalMethod) {
        match method {
            RetrievalMethod::Lexical => self.lexical += 1,
            RetrievalMethod::Dense => self.dense += 1,
            RetrievalMethod::Sparse => self.sparse += 1,
        }
    }
}

/// Outcome of one retrieval method, as reported to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDiagnostics {
    pub method: RetrievalMethod,
    pub succeeded: bool,
    pub latency_ms: f64,
    pub candidates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<MethodFailure>,
}

impl From<&MethodResult> for MethodDiagnostics {
    fn from(result: &MethodResult) -> Self {
        Self {
            method: result.method,
            succeeded: result.succeeded,
            latency_ms: result.latency_ms,
            candidates: result.ranked.len(),
            failure: result.failure.clone(),
        }
    }
}

/// Elapsed time per pipeline stage, in milliseconds
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub analyze_ms: f64,
    pub retrieval_ms: f64,
    pub fusion_ms: f64,
    pub rerank_ms: f64,
    pub assemble_ms: f64,
}

/// Everything the engine knows about how a search was answered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchDiagnostics {
    pub query_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub profile: QueryProfile,
    /// Weights after adaptive rules, before masking failed methods
    pub weights: MethodWeights,
    /// Weights actually used for fusion
    pub effective_weights: MethodWeights,
    pub methods: Vec<MethodDiagnostics>,
    pub contributions: MethodCounts,
    pub fused_candidates: usize,
    pub rerank: RerankStatus,
    pub lookup_degraded: bool,
    pub missing_documents: usize,
    pub timings: StageTimings,
    pub total_ms: f64,
}

impl SearchDiagnostics {
    /// True when any method failed or reranking fell back to fused order
    pub fn is_degraded(&self) -> bool {
        self.methods.iter().any(|m| !m.succeeded) || self.rerank.is_degraded()
    }
}

/// Ordered results plus diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub diagnostics: SearchDiagnostics,
}

/// What the assembler observed while hydrating
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    pub contributions: MethodCounts,
    pub lookup_degraded: bool,
    /// Results the lookup answered without a summary; 0 when no lookup ran
    pub missing_documents: usize,
}

/// Truncates the final ranking and hydrates it through [`DocumentLookup`]
pub struct ResultAssembler {
    lookup: Option<Arc<dyn DocumentLookup>>,
}

impl ResultAssembler {
    pub fn new(lookup: Option<Arc<dyn DocumentLookup>>) -> Self {
        Self { lookup }
    }

    /// Truncate to `limit` and attach documents, never changing order
    pub async fn assemble(
        &self,
        mut reranked: Vec<RerankedResult>,
        limit: usize,
    ) -> (Vec<SearchResult>, AssemblyReport) {
        reranked.truncate(limit);

        let mut report = AssemblyReport::default();
        for result in &reranked {
            for method in &result.contributing_methods {
                report.contributions.increment(*method);
            }
        }

        let mut documents = self.resolve(&reranked, &mut report).await;
        let looked_up = documents.is_some();

        let results: Vec<SearchResult> = reranked
            .into_iter()
            .enumerate()
            .map(|(i, result)| {
                let document = documents
                    .as_mut()
                    .and_then(|found| found.remove(&result.document_id));
                if looked_up && document.is_none() {
                    report.missing_documents += 1;
                }
                SearchResult {
                    rank: i + 1,
                    document_id: result.document_id,
                    score: result.rerank_score,
                    fused_score: result.fused_score,
                    original_rank: result.original_rank,
                    contributing_methods: result.contributing_methods,
                    document,
                }
            })
            .collect();

        (results, report)
    }

    /// Summaries keyed by ID, or `None` when no lookup answered
    async fn resolve(
        &self,
        reranked: &[RerankedResult],
        report: &mut AssemblyReport,
    ) -> Option<AHashMap<DocumentId, DocumentSummary>> {
        let lookup = self.lookup.as_ref()?;
        if reranked.is_empty() {
            return None;
        }
        if !lookup.is_available() {
            tracing::debug!("Document lookup unavailable, returning bare IDs");
            report.lookup_degraded = true;
            return None;
        }

        let ids: Vec<DocumentId> = reranked.iter().map(|r| r.document_id.clone()).collect();
        match lookup.resolve(&ids).await {
            Ok(summaries) => Some(
                summaries
                    .into_iter()
                    .map(|summary| (summary.document_id.clone(), summary))
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!("Document lookup failed, returning bare IDs: {}", e);
                report.lookup_degraded = true;
                None
            }
        }
    }
}
