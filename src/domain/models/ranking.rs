//! Weighted re-ranking of multi-field search results.
//!
//! Each sub-search returns L2 distances on its own scale. Distances are
//! squashed into `[0, 1)` with `2/π · atan(d)` and combined as
//! `Σ weight_f × normalized_f`. Lower composite scores rank first, ties go
//! to the smaller primary key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::record::Record;
use super::search::SearchHit;
use crate::domain::errors::{DomainError, DomainResult};

/// Normalized distance charged for a field a record did not appear in
pub const WORST_NORMALIZED_DISTANCE: f32 = 1.0;

/// How records absent from some sub-results are scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    /// Charge the worst normalized distance for the missing field
    #[default]
    Penalize,
    /// Keep only records present in every sub-result
    Drop,
}

/// A hit after re-ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHit {
    pub id: i64,
    /// Composite score, lower is better
    pub score: f32,
    pub record: Record,
    /// Raw distance per sub-search, `None` where the record was absent
    pub distances: Vec<Option<f32>>,
}

/// Weighted reranker over N sub-searches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRanker {
    weights: Vec<f32>,
    #[serde(default)]
    missing: MissingFieldPolicy,
}

impl WeightedRanker {
    /// Weights are relative and must be finite and non-negative.
    pub fn new(weights: Vec<f32>) -> DomainResult<Self> {
        if weights.is_empty() {
            return Err(DomainError::ValidationFailed(
                "reranker needs at least one weight".to_string(),
            ));
        }
        if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(DomainError::ValidationFailed(format!(
                "reranker weights must be finite and non-negative, got {bad}"
            )));
        }
        if weights.iter().all(|w| *w == 0.0) {
            return Err(DomainError::ValidationFailed(
                "at least one reranker weight must be positive".to_string(),
            ));
        }
        Ok(Self {
            weights,
            missing: MissingFieldPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_missing_policy(mut self, missing: MissingFieldPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn missing_policy(&self) -> MissingFieldPolicy {
        self.missing
    }

    /// Map an L2 distance into `[0, 1)`.
    pub fn normalize(distance: f32) -> f32 {
        (2.0 / std::f32::consts::PI) * distance.max(0.0).atan()
    }

    /// Merge sub-results (one per weight, in weight order).
    pub fn rerank(&self, sub_results: Vec<Vec<SearchHit>>, limit: usize) -> DomainResult<Vec<RankedHit>> {
        if sub_results.len() != self.weights.len() {
            return Err(DomainError::ValidationFailed(format!(
                "reranker has {} weights but received {} sub-results",
                self.weights.len(),
                sub_results.len()
            )));
        }

        let fields = self.weights.len();
        let mut merged: BTreeMap<i64, (Record, Vec<Option<f32>>)> = BTreeMap::new();
        for (field, hits) in sub_results.into_iter().enumerate() {
            for hit in hits {
                let entry = merged
                    .entry(hit.id)
                    .or_insert_with(|| (hit.record.clone(), vec![None; fields]));
                let slot = &mut entry.1[field];
                *slot = Some(slot.map_or(hit.distance, |d| d.min(hit.distance)));
            }
        }

        let mut ranked: Vec<RankedHit> = merged
            .into_iter()
            .filter(|(_, (_, distances))| {
                self.missing == MissingFieldPolicy::Penalize || distances.iter().all(Option::is_some)
            })
            .map(|(id, (record, distances))| RankedHit {
                id,
                score: self.composite(&distances),
                record,
                distances,
            })
            .collect();

        ranked.sort_by(|a, b| a.score.total_cmp(&b.score).then(a.id.cmp(&b.id)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn composite(&self, distances: &[Option<f32>]) -> f32 {
        self.weights
            .iter()
            .zip(distances)
            .map(|(weight, distance)| {
                weight * distance.map_or(WORST_NORMALIZED_DISTANCE, Self::normalize)
            })
            .sum()
    }
}
