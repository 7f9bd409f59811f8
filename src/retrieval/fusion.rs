//! Weighted Reciprocal Rank Fusion across retrieval methods

use crate::config::FusionConfig;
use crate::error::{RankFuseError, Result};
use crate::query::QueryProfile;
use crate::retrieval::{DocumentId, RetrievalCandidates, RetrievalMethod};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-method fusion weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MethodWeights {
    pub lexical: f64,
    pub dense: f64,
    pub sparse: f64,
}

impl MethodWeights {
    pub fn new(lexical: f64, dense: f64, sparse: f64) -> Self {
        Self {
            lexical,
            dense,
            sparse,
        }
    }

    pub fn get(&self, method: RetrievalMethod) -> f64 {
        match method {
            RetrievalMethod::Lexical => self.lexical,
            RetrievalMethod::Dense => self.dense,
            RetrievalMethod::Sparse => self.sparse,
        }
    }

    fn get_mut(&mut self, method: RetrievalMethod) -> &mut f64 {
        match method {
            RetrievalMethod::Lexical => &mut self.lexical,
            RetrievalMethod::Dense => &mut self.dense,
            RetrievalMethod::Sparse => &mut self.sparse,
        }
    }

    pub fn total(&self) -> f64 {
        self.lexical + self.dense + self.sparse
    }

    /// Scale so the weights sum to 1.0
    ///
    /// All-zero weights stay zero.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return *self;
        }

        Self {
            lexical: self.lexical / total,
            dense: self.dense / total,
            sparse: self.sparse / total,
        }
    }

    /// Zero out methods that are not available and renormalize the rest
    ///
    /// If every available method has weight 0 they share the weight equally.
    pub fn restricted_to<F>(&self, is_available: F) -> Self
    where
        F: Fn(RetrievalMethod) -> bool,
    {
        let mut restricted = Self::new(0.0, 0.0, 0.0);
        let available: Vec<RetrievalMethod> = RetrievalMethod::ALL
            .into_iter()
            .filter(|m| is_available(*m))
            .collect();

        for method in &available {
            *restricted.get_mut(*method) = self.get(*method);
        }

        if restricted.total() <= 0.0 {
            for method in &available {
                *restricted.get_mut(*method) = 1.0;
            }
        }

        restricted.normalized()
    }
}

/// Computes method weights from a query profile
#[derive(Debug, Clone)]
pub struct WeightPolicy {
    defaults: MethodWeights,
    short_lexical_boost: f64,
    long_dense_boost: f64,
    technical_sparse_boost: f64,
    question_dense_boost: f64,
}

impl WeightPolicy {
    pub fn from_config(config: &FusionConfig) -> Self {
        Self {
            defaults: MethodWeights::new(
                config.lexical_weight,
                config.dense_weight,
                config.sparse_weight,
            ),
            short_lexical_boost: config.short_lexical_boost,
            long_dense_boost: config.long_dense_boost,
            technical_sparse_boost: config.technical_sparse_boost,
            question_dense_boost: config.question_dense_boost,
        }
    }

    /// Normalized fixed weights, used when adaptive weighting is off
    pub fn defaults(&self) -> MethodWeights {
        self.defaults.normalized()
    }

    /// Default weights with every matching adaptive rule applied, before normalization
    ///
    /// Rules are independent and compose multiplicatively.
    pub fn boosted(&self, profile: &QueryProfile) -> MethodWeights {
        let mut weights = self.defaults;

        if profile.is_short {
            weights.lexical *= self.short_lexical_boost;
        }
        if profile.is_long {
            weights.dense *= self.long_dense_boost;
        }
        if profile.is_technical {
            weights.sparse *= self.technical_sparse_boost;
        }
        if profile.is_question {
            weights.dense *= self.question_dense_boost;
        }

        weights
    }

    /// Final weights for a query, summing to 1.0
    pub fn weights_for(&self, profile: &QueryProfile, adaptive: bool) -> MethodWeights {
        if adaptive {
            self.boosted(profile).normalized()
        } else {
            self.defaults()
        }
    }
}

/// One document in the fused ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub document_id: DocumentId,
    pub fused_score: f64,
    pub contributing_methods: BTreeSet<RetrievalMethod>,
}

/// Merges ranked lists with weighted RRF
///
/// RRF formula: score(doc) = sum over methods m ranking doc at r_m of: weight(m) / (k + r_m)
#[derive(Debug, Clone)]
pub struct FusionEngine {
    rrf_k: f64,
}

impl FusionEngine {
    pub fn new(rrf_k: f64) -> Result<Self> {
        if !rrf_k.is_finite() || rrf_k <= 0.0 {
            return Err(RankFuseError::InvalidConfigValue {
                path: "fusion.rrf_k".to_string(),
                message: format!("RRF k must be a positive number, got {}", rrf_k),
            });
        }

        Ok(Self { rrf_k })
    }

    pub fn from_config(config: &FusionConfig) -> Result<Self> {
        Self::new(config.rrf_k)
    }

    pub fn rrf_k(&self) -> f64 {
        self.rrf_k
    }

    /// Fuse the ranked lists of every succeeded method
    ///
    /// Weights are renormalized over the methods that succeeded. Documents
    /// missing from a method get no contribution from it. Output is sorted by
    /// fused score descending, ties by ascending document ID.
    pub fn fuse(
        &self,
        candidates: &RetrievalCandidates,
        weights: &MethodWeights,
    ) -> Vec<FusedResult> {
        let effective = weights.restricted_to(|m| candidates.is_succeeded(m));
        let mut scores: AHashMap<&DocumentId, (f64, BTreeSet<RetrievalMethod>)> =
            AHashMap::new();

        // Fixed method order keeps every per-document sum bit-identical across runs
        for result in candidates.iter().filter(|r| r.succeeded) {
            let weight = effective.get(result.method);
            for ranked in &result.ranked {
                let rrf_score = weight / (self.rrf_k + ranked.rank as f64);
                let entry = scores
                    .entry(&ranked.document_id)
                    .or_insert_with(|| (0.0, BTreeSet::new()));
                entry.0 += rrf_score;
                entry.1.insert(result.method);
            }
        }

        let mut fused: Vec<FusedResult> = scores
            .into_iter()
            .map(|(document_id, (fused_score, contributing_methods))| FusedResult {
                document_id: document_id.clone(),
                fused_score,
                contributing_methods,
            })
            .collect();

        fused.sort_by(|a, b| {
            b.fused_score
                .total_cmp(&a.fused_score)
                .then_with(|| a.document_id.cmp(&b.document_id))
        });

        tracing::debug!(
            "Fused {} documents from {} methods (weights: lexical={:.3}, dense={:.3}, sparse={:.3})",
            fused.len(),
            candidates.succeeded_count(),
            effective.lexical,
            effective.dense,
            effective.sparse
        );

        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{FailureKind, MethodResult};

    const EPS: f64 = 1e-12;

    fn ok(method: RetrievalMethod, ids: &[&str]) -> MethodResult {
        MethodResult::success(
            method,
            ids.iter().map(|s| DocumentId::from(*s)).collect(),
            1.0,
        )
    }

    fn down(method: RetrievalMethod) -> MethodResult {
        MethodResult::failed(method, FailureKind::Unavailable, "down", 0.0)
    }

    fn policy() -> WeightPolicy {
        WeightPolicy::from_config(&FusionConfig::default())
    }

    fn engine() -> FusionEngine {
        FusionEngine::new(60.0).unwrap()
    }

    #[test]
    fn test_rrf_formula() {
        let candidates = RetrievalCandidates::new(
            ok(RetrievalMethod::Lexical, &["x"]),
            ok(RetrievalMethod::Dense, &["a", "b", "x"]),
            down(RetrievalMethod::Sparse),
        );
        let weights = MethodWeights::new(0.5, 0.5, 0.0);

        let fused = engine().fuse(&candidates, &weights);
        let x = fused
            .iter()
            .find(|r| r.document_id.as_str() == "x")
            .unwrap();

        let expected = 0.5 / 61.0 + 0.5 / 63.0;
        assert!((x.fused_score - expected).abs() < EPS);
        assert!((x.fused_score - 0.016133).abs() < 1e-6);
        assert_eq!(
            x.contributing_methods,
            BTreeSet::from([RetrievalMethod::Lexical, RetrievalMethod::Dense])
        );
    }

    #[test]
    fn test_single_method_document_gets_single_term() {
        let candidates = RetrievalCandidates::new(
            ok(RetrievalMethod::Lexical, &["a", "b"]),
            ok(RetrievalMethod::Dense, &["a"]),
            ok(RetrievalMethod::Sparse, &["a"]),
        );
        let weights = MethodWeights::new(0.2, 0.3, 0.5);

        let fused = engine().fuse(&candidates, &weights);
        let b = fused
            .iter()
            .find(|r| r.document_id.as_str() == "b")
            .unwrap();

        assert!((b.fused_score - 0.2 / 62.0).abs() < EPS);
        assert_eq!(
            b.contributing_methods,
            BTreeSet::from([RetrievalMethod::Lexical])
        );
    }

    #[test]
    fn test_ties_break_by_document_id() {
        let candidates = RetrievalCandidates::new(
            ok(RetrievalMethod::Lexical, &["zeta"]),
            ok(RetrievalMethod::Dense, &["alpha"]),
            down(RetrievalMethod::Sparse),
        );
        let weights = MethodWeights::new(0.5, 0.5, 0.0);

        let fused = engine().fuse(&candidates, &weights);
        assert_eq!(fused[0].document_id.as_str(), "alpha");
        assert_eq!(fused[1].document_id.as_str(), "zeta");
        assert_eq!(fused[0].fused_score, fused[1].fused_score);
    }

    #[test]
    fn test_fusion_is_deterministic() {
        let candidates = RetrievalCandidates::new(
            ok(RetrievalMethod::Lexical, &["d", "c", "b", "a"]),
            ok(RetrievalMethod::Dense, &["a", "b", "c", "d"]),
            ok(RetrievalMethod::Sparse, &["b", "d", "a", "c"]),
        );
        let weights = policy().defaults();

        let first = engine().fuse(&candidates, &weights);
        for _ in 0..10 {
            assert_eq!(engine().fuse(&candidates, &weights), first);
        }
    }

    #[test]
    fn test_degraded_single_method() {
        let candidates = RetrievalCandidates::new(
            down(RetrievalMethod::Lexical),
            ok(RetrievalMethod::Dense, &["a", "b"]),
            down(RetrievalMethod::Sparse),
        );

        let fused = engine().fuse(&candidates, &policy().defaults());

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].document_id.as_str(), "a");
        assert!((fused[0].fused_score - 1.0 / 61.0).abs() < EPS);
        assert!((fused[1].fused_score - 1.0 / 62.0).abs() < EPS);
    }

    #[test]
    fn test_failed_method_candidates_are_ignored() {
        let mut dense = ok(RetrievalMethod::Dense, &["ghost"]);
        dense.succeeded = false;
        let candidates = RetrievalCandidates::new(
            ok(RetrievalMethod::Lexical, &["a"]),
            dense,
            down(RetrievalMethod::Sparse),
        );

        let fused = engine().fuse(&candidates, &policy().defaults());
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].document_id.as_str(), "a");
    }

    #[test]
    fn test_non_adaptive_weights_are_fixed() {
        let policy = policy();
        let analyzer_profiles = [
            QueryProfile::default(),
            QueryProfile {
                word_count: 1,
                is_short: true,
                is_technical: true,
                is_question: true,
                ..Default::default()
            },
            QueryProfile {
                word_count: 20,
                is_long: true,
                ..Default::default()
            },
        ];

        for profile in analyzer_profiles {
            let weights = policy.weights_for(&profile, false);
            assert!((weights.total() - 1.0).abs() < EPS);
            assert!((weights.lexical - 0.33).abs() < 1e-9);
            assert!((weights.dense - 0.34).abs() < 1e-9);
            assert!((weights.sparse - 0.33).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_query_boosts_lexical() {
        let policy = policy();
        let profile = QueryProfile {
            word_count: 1,
            is_short: true,
            ..Default::default()
        };

        let boosted = policy.boosted(&profile);
        assert!((boosted.lexical - 0.33 * 1.5).abs() < EPS);
        assert!((boosted.dense - 0.34).abs() < EPS);

        let weights = policy.weights_for(&profile, true);
        assert!((weights.total() - 1.0).abs() < EPS);
        assert!(weights.lexical > weights.dense);
    }

    #[test]
    fn test_rules_compose_multiplicatively() {
        let profile = QueryProfile {
            word_count: 12,
            is_long: true,
            is_technical: true,
            is_question: true,
            ..Default::default()
        };

        let boosted = policy().boosted(&profile);
        assert!((boosted.lexical - 0.33).abs() < EPS);
        assert!((boosted.dense - 0.34 * 1.5 * 1.3).abs() < EPS);
        assert!((boosted.sparse - 0.33 * 1.5).abs() < EPS);
    }

    #[test]
    fn test_restricted_weights_renormalize() {
        let weights = MethodWeights::new(0.5, 0.3, 0.2);

        let restricted = weights.restricted_to(|m| m != RetrievalMethod::Sparse);
        assert_eq!(restricted.sparse, 0.0);
        assert!((restricted.lexical - 0.625).abs() < EPS);
        assert!((restricted.dense - 0.375).abs() < EPS);

        let zero = MethodWeights::new(0.0, 0.0, 1.0).restricted_to(|m| m != RetrievalMethod::Sparse);
        assert!((zero.lexical - 0.5).abs() < EPS);
        assert!((zero.dense - 0.5).abs() < EPS);
    }

    #[test]
    fn test_invalid_k_rejected() {
        assert!(FusionEngine::new(0.0).is_err());
        assert!(FusionEngine::new(f64::NAN).is_err());
    }
}
