//! Hybrid retrieval & reranking
//!
//! Runs lexical, dense and sparse retrieval in parallel, merges the ranked
//! lists with weighted Reciprocal Rank Fusion and optionally refines the head
//! of the ranking with a pairwise reranking model.

mod assembler;
mod collaborators;
mod coordinator;
mod deduplication;
#[cfg(feature = "fastembed")]
mod fastembed;
mod fusion;
mod hybrid;
mod reranker;

pub use assembler::{
    AssemblyReport, MethodCounts, MethodDiagnostics, ResultAssembler, SearchDiagnostics,
    SearchResponse, SearchResult, StageTimings,
};
pub use collaborators::{
    DenseIndex, DenseQuery, DocumentLookup, DocumentSummary, IndexError, LexicalIndex,
    LookupError, QueryEmbedder, RerankCandidate, RerankError, Reranker, SnippetSource,
    SparseIndex,
};
pub use coordinator::{CoordinatorSettings, RetrievalCoordinator};
pub use deduplication::deduplicate_ids;
#[cfg(feature = "fastembed")]
pub use self::fastembed::{FastEmbedQueryEmbedder, FastEmbedReranker};
pub use fusion::{FusedResult, FusionEngine, MethodWeights, WeightPolicy};
pub use hybrid::{HybridSearcher, HybridSearcherBuilder};
pub use reranker::{RerankOutcome, RerankSettings, RerankStatus, RerankedResult, RerankingStage};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a document as understood by every collaborator
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The closed set of retrieval strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    /// Keyword matching against an inverted term index
    Lexical,
    /// Nearest-neighbour search over dense embeddings
    Dense,
    /// Nearest-neighbour search over learned sparse term weights
    Sparse,
}

impl RetrievalMethod {
    /// Every method, in the fixed order used for accumulation and reporting
    pub const ALL: [RetrievalMethod; 3] = [
        RetrievalMethod::Lexical,
        RetrievalMethod::Dense,
        RetrievalMethod::Sparse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::Lexical => "lexical",
            RetrievalMethod::Dense => "dense",
            RetrievalMethod::Sparse => "sparse",
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a retrieval method produced no candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call exceeded its per-method budget
    Timeout,
    /// The collaborator reported itself unreachable
    Unavailable,
    /// No collaborator was injected for this method
    NotConfigured,
    /// The collaborator returned an error
    Error,
    /// The caller cancelled the search while the call was in flight
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Unavailable => "unavailable",
            FailureKind::NotConfigured => "not_configured",
            FailureKind::Error => "error",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

/// Failure record for one retrieval method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodFailure {
    pub method: RetrievalMethod,
    pub kind: FailureKind,
    pub message: String,
}

impl MethodFailure {
    pub fn new(method: RetrievalMethod, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            method,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for MethodFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}: {}", self.method, self.kind.as_str())
        } else {
            write!(f, "{}: {} ({})", self.method, self.kind.as_str(), self.message)
        }
    }
}

/// A document at a 1-based position in one method's ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedDocument {
    pub document_id: DocumentId,
    pub rank: usize,
}

/// Output of one retrieval method for one query execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: RetrievalMethod,
    pub ranked: Vec<RankedDocument>,
    pub latency_ms: f64,
    pub succeeded: bool,
    pub failure: Option<MethodFailure>,
}

impl MethodResult {
    /// Build a successful result from an ordered id list
    ///
    /// Duplicate ids keep their first position; ranks are assigned 1..=n
    /// after de-duplication so they stay contiguous.
    pub fn success(method: RetrievalMethod, ids: Vec<DocumentId>, latency_ms: f64) -> Self {
        let ranked = deduplicate_ids(ids)
            .into_iter()
            .enumerate()
            .map(|(i, document_id)| RankedDocument {
                document_id,
                rank: i + 1,
            })
            .collect();

        Self {
            method,
            ranked,
            latency_ms,
            succeeded: true,
            failure: None,
        }
    }

    /// Build a failed result carrying no candidates
    pub fn failed(
        method: RetrievalMethod,
        kind: FailureKind,
        message: impl Into<String>,
        latency_ms: f64,
    ) -> Self {
        Self {
            method,
            ranked: Vec::new(),
            latency_ms,
            succeeded: false,
            failure: Some(MethodFailure::new(method, kind, message)),
        }
    }
}

/// Results of every retrieval method for one query execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalCandidates {
    pub lexical: MethodResult,
    pub dense: MethodResult,
    pub sparse: MethodResult,
}

impl RetrievalCandidates {
    pub fn new(lexical: MethodResult, dense: MethodResult, sparse: MethodResult) -> Self {
        Self {
            lexical,
            dense,
            sparse,
        }
    }

    pub fn get(&self, method: RetrievalMethod) -> &MethodResult {
        match method {
            RetrievalMethod::Lexical => &self.lexical,
            RetrievalMethod::Dense => &self.dense,
            RetrievalMethod::Sparse => &self.sparse,
        }
    }

    /// Method results in the fixed method order
    pub fn iter(&self) -> impl Iterator<Item = &MethodResult> {
        RetrievalMethod::ALL.into_iter().map(move |m| self.get(m))
    }

    pub fn succeeded_count(&self) -> usize {
        self.iter().filter(|r| r.succeeded).count()
    }

    pub fn is_succeeded(&self, method: RetrievalMethod) -> bool {
        self.get(method).succeeded
    }

    pub fn failures(&self) -> Vec<MethodFailure> {
        self.iter().filter_map(|r| r.failure.clone()).collect()
    }
}
