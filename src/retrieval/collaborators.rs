//! Interfaces to the external services the engine depends on
//!
//! Index clients, the reranking model and the document store are injected
//! as trait objects so each search can run against mock collaborators.

use crate::query::QueryFilters;
use crate::retrieval::DocumentId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    #[error("Index search failed: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker unavailable: {0}")]
    Unavailable(String),

    #[error("Reranking failed: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Document lookup unavailable: {0}")]
    Unavailable(String),

    #[error("Document lookup failed: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Keyword search over an inverted term index
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Return up to `limit` document IDs, best match first
    async fn search(
        &self,
        text: &str,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError>;

    /// Whether the index can currently be queried
    fn is_available(&self) -> bool {
        true
    }
}

/// Input accepted by the dense index
#[derive(Debug, Clone, PartialEq)]
pub enum DenseQuery {
    /// Raw query text, embedded by the index itself
    Text(String),
    /// Query embedding produced by a [`QueryEmbedder`]
    Vector(Vec<f32>),
}

/// Nearest-neighbour search over dense embeddings
#[async_trait]
pub trait DenseIndex: Send + Sync {
    async fn search(
        &self,
        query: &DenseQuery,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Nearest-neighbour search over learned sparse term weights
#[async_trait]
pub trait SparseIndex: Send + Sync {
    async fn search(
        &self,
        text: &str,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Turns query text into a dense vector before dense retrieval
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// A document presented to the reranking model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankCandidate {
    pub document_id: DocumentId,
    pub snippet: String,
}

/// Pairwise query-document relevance model
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Relevance of one document to the query, in `[0, 1]`
    async fn score(&self, query: &str, candidate: &RerankCandidate) -> Result<f32, RerankError>;

    /// Score several documents at once; one score per candidate, same order
    async fn score_batch(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<f32>, RerankError> {
        let mut scores = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            scores.push(self.score(query, candidate).await?);
        }
        Ok(scores)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Supplies the text the reranking model reads for each document
#[async_trait]
pub trait SnippetSource: Send + Sync {
    /// Snippets keyed by document ID; missing IDs are scored with an empty snippet
    async fn snippets(
        &self,
        ids: &[DocumentId],
    ) -> Result<HashMap<DocumentId, String>, RerankError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Caller-facing representation of a stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: DocumentId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    /// Free-form metadata owned by the document store
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DocumentSummary {
    pub fn new(document_id: impl Into<DocumentId>) -> Self {
        Self {
            document_id: document_id.into(),
            title: None,
            snippet: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// Resolves document IDs into caller-usable summaries
#[async_trait]
pub trait DocumentLookup: Send + Sync {
    /// Summaries for the requested IDs; unknown IDs may be omitted
    async fn resolve(&self, ids: &[DocumentId]) -> Result<Vec<DocumentSummary>, LookupError>;

    fn is_available(&self) -> bool {
        true
    }
}
