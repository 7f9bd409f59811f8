//! Mock collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use rankfuse::query::QueryFilters;
use rankfuse::retrieval::{
    DenseIndex, DenseQuery, DocumentId, DocumentLookup, DocumentSummary, IndexError, LexicalIndex,
    LookupError, RerankCandidate, RerankError, Reranker, SparseIndex,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Index that returns a fixed ranking and records what it was asked
pub struct StaticIndex {
    ids: Vec<DocumentId>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(usize, QueryFilters)>>,
}

impl StaticIndex {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: ids.iter().map(|id| DocumentId::from(*id)).collect(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer only after `delay`, to exercise timeouts and cancellation
    pub fn slow(ids: &[&str], delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(ids)
        }
    }

    /// `(limit, filters)` of every call so far
    pub fn calls(&self) -> Vec<(usize, QueryFilters)> {
        self.calls.lock().unwrap().clone()
    }

    async fn answer(
        &self,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError> {
        self.calls.lock().unwrap().push((limit, filters.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.ids.iter().take(limit).cloned().collect())
    }
}

#[async_trait]
impl LexicalIndex for StaticIndex {
    async fn search(
        &self,
        _text: &str,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError> {
        self.answer(limit, filters).await
    }
}

#[async_trait]
impl DenseIndex for StaticIndex {
    async fn search(
        &self,
        _query: &DenseQuery,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError> {
        self.answer(limit, filters).await
    }
}

#[async_trait]
impl SparseIndex for StaticIndex {
    async fn search(
        &self,
        _text: &str,
        limit: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError> {
        self.answer(limit, filters).await
    }
}

/// Index whose backend always errors
pub struct FailingIndex;

impl FailingIndex {
    fn error() -> IndexError {
        IndexError::Backend(anyhow::anyhow!("connection refused"))
    }
}

#[async_trait]
impl LexicalIndex for FailingIndex {
    async fn search(
        &self,
        _text: &str,
        _limit: usize,
        _filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError> {
        Err(Self::error())
    }
}

#[async_trait]
impl DenseIndex for FailingIndex {
    async fn search(
        &self,
        _query: &DenseQuery,
        _limit: usize,
        _filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError> {
        Err(Self::error())
    }
}

#[async_trait]
impl SparseIndex for FailingIndex {
    async fn search(
        &self,
        _text: &str,
        _limit: usize,
        _filters: &QueryFilters,
    ) -> Result<Vec<DocumentId>, IndexError> {
        Err(Self::error())
    }
}

/// Reranker with a fixed score per document
pub struct ScriptedReranker {
    scores: HashMap<DocumentId, f32>,
    fail: bool,
    available: bool,
}

impl ScriptedReranker {
    pub fn new(scores: &[(&str, f32)]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(id, score)| (DocumentId::from(*id), *score))
                .collect(),
            fail: false,
            available: true,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(&[])
        }
    }
}

#[async_trait]
impl Reranker for ScriptedReranker {
    async fn score(&self, _query: &str, candidate: &RerankCandidate) -> Result<f32, RerankError> {
        if self.fail {
            return Err(RerankError::Backend(anyhow::anyhow!("model crashed")));
        }
        Ok(self
            .scores
            .get(&candidate.document_id)
            .copied()
            .unwrap_or(0.0))
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Document store backed by a map of titles
pub struct MemoryLookup {
    titles: HashMap<DocumentId, String>,
}

impl MemoryLookup {
    pub fn new(titles: &[(&str, &str)]) -> Self {
        Self {
            titles: titles
                .iter()
                .map(|(id, title)| (DocumentId::from(*id), title.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl DocumentLookup for MemoryLookup {
    async fn resolve(&self, ids: &[DocumentId]) -> Result<Vec<DocumentSummary>, LookupError> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.titles
                    .get(id)
                    .map(|title| DocumentSummary::new(id.clone()).with_title(title.clone()))
            })
            .collect())
    }
}

/// Document IDs of a response, in final order
pub fn ids(response: &rankfuse::SearchResponse) -> Vec<String> {
    response
        .results
        .iter()
        .map(|r| r.document_id.as_str().to_string())
        .collect()
}
