//! Ranked-list deduplication by document ID

use crate::retrieval::DocumentId;
use ahash::AHashSet;

/// Deduplicate document IDs, keeping the first (best ranked) occurrence
///
/// # Arguments
/// * `ids` - Ranked document IDs as returned by a collaborator
///
/// # Returns
/// Deduplicated IDs, maintaining rank order
pub fn deduplicate_ids(ids: Vec<DocumentId>) -> Vec<DocumentId> {
    let mut seen: AHashSet<DocumentId> = AHashSet::with_capacity(ids.len());

    ids.into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
