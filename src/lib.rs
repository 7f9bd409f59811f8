//! RankFuse - Multi-method retrieval fusion engine
//!
//! Answers a query by running lexical, dense and sparse retrieval in
//! parallel, merging the ranked lists with weighted Reciprocal Rank Fusion,
//! optionally reranking the head with a pairwise relevance model, and
//! returning the final ranking with per-query diagnostics. Index clients,
//! the reranker and the document store are injected collaborators.

pub mod cancel;
pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod retrieval;

pub use cancel::CancellationToken;
pub use config::Config;
pub use error::{RankFuseError, Result};
pub use query::{Query, QueryProfile};
pub use retrieval::{HybridSearcher, HybridSearcherBuilder, SearchResponse};
