//! Score fusion and deterministic ranking.
//!
//! ```text
//! fused = w_l · lexical_norm + w_s · semantic + w_p · proximity
//! ```
//!
//! `lexical_norm` is the BM25 score min-max normalised across the candidate
//! set. Semantic and proximity scores are already in `[0, 1]`.
//!
//! Weights of scorers that are switched off (by mode) or unavailable (no
//! embeddings) are zeroed and the remaining weights rescaled to sum to 1.
//!
//! Ordering: fused score descending, then path ascending.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::SearchMode;
use crate::config::RetrievalConfig;

/// Per-scorer weights. Always sum to 1 after [`FusionWeights::effective`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionWeights {
    pub lexical: f64,
    pub semantic: f64,
    pub proximity: f64,
}

impl FusionWeights {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            lexical: config.lexical_weight,
            semantic: config.semantic_weight,
            proximity: config.proximity_weight,
        }
    }

    /// Weights actually applied for `mode`.
    ///
    /// Semantic mode without embeddings degrades to keyword weighting.
    pub fn effective(&self, mode: SearchMode, semantic_available: bool) -> Self {
        let mut w = *self;
        match mode {
            SearchMode::Keyword => w.semantic = 0.0,
            SearchMode::Semantic if semantic_available => {
                w.lexical = 0.0;
                w.proximity = 0.0;
                w.semantic = 1.0;
            }
            SearchMode::Semantic => w.semantic = 0.0,
            SearchMode::Hybrid if !semantic_available => w.semantic = 0.0,
            SearchMode::Hybrid => {}
        }
        w.renormalized()
    }

    fn renormalized(self) -> Self {
        let sum = self.lexical + self.semantic + self.proximity;
        if sum <= f64::EPSILON {
            return Self {
                lexical: 1.0,
                semantic: 0.0,
                proximity: 0.0,
            };
        }
        Self {
            lexical: self.lexical / sum,
            semantic: self.semantic / sum,
            proximity: self.proximity / sum,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// One candidate document with its component scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub document_path: String,
    /// Raw BM25 score.
    pub lexical_score: f64,
    /// Clamped cosine similarity in `[0, 1]`.
    pub semantic_score: f64,
    pub proximity_score: f64,
    /// Min-max normalised lexical score; set by [`rank`].
    pub lexical_norm: f64,
    /// Set by [`rank`].
    pub fused_score: f64,
}

impl ScoredCandidate {
    pub fn new(path: impl Into<String>, lexical: f64, semantic: f64, proximity: f64) -> Self {
        Self {
            document_path: path.into(),
            lexical_score: lexical,
            semantic_score: semantic,
            proximity_score: proximity,
            lexical_norm: 0.0,
            fused_score: 0.0,
        }
    }

    fn merge(&mut self, other: &ScoredCandidate) {
        self.lexical_score = self.lexical_score.max(other.lexical_score);
        self.semantic_score = self.semantic_score.max(other.semantic_score);
        self.proximity_score = self.proximity_score.max(other.proximity_score);
    }
}

/// Per-result score breakdown returned when `explain` is requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreExplanation {
    pub lexical_raw: f64,
    pub lexical_norm: f64,
    pub semantic: f64,
    pub proximity: f64,
    pub weights: FusionWeights,
    pub semantic_available: bool,
    pub fused: f64,
}

impl ScoreExplanation {
    pub fn new(
        candidate: &ScoredCandidate,
        weights: &FusionWeights,
        semantic_available: bool,
    ) -> Self {
        Self {
            lexical_raw: candidate.lexical_score,
            lexical_norm: candidate.lexical_norm,
            semantic: candidate.semantic_score,
            proximity: candidate.proximity_score,
            weights: *weights,
            semantic_available,
            fused: candidate.fused_score,
        }
    }
}

/// Fused score for normalised inputs. Pure.
pub fn fuse(weights: &FusionWeights, lexical_norm: f64, semantic: f64, proximity: f64) -> f64 {
    weights.lexical * lexical_norm + weights.semantic * semantic + weights.proximity * proximity
}

/// Min-max normalise raw scores into `[0, 1]`.
///
/// If every score is equal and positive, all normalise to `1.0`. If no
/// score is positive, all normalise to `0.0`.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    let s_min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let s_max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if s_max <= 0.0 {
        return vec![0.0; scores.len()];
    }

    scores
        .iter()
        .map(|&s| {
            if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (s - s_min) / (s_max - s_min)
            }
        })
        .collect()
}

/// Fused score descending, path ascending.
pub fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| a.document_path.cmp(&b.document_path))
}

/// Dedupe by path, normalise, fuse, sort, and truncate to `limit`.
///
/// Duplicate paths keep the best score from each scorer.
pub fn rank(
    candidates: Vec<ScoredCandidate>,
    weights: &FusionWeights,
    limit: usize,
) -> Vec<ScoredCandidate> {
    let mut by_path: BTreeMap<String, ScoredCandidate> = BTreeMap::new();
    for candidate in candidates {
        match by_path.get_mut(&candidate.document_path) {
            Some(existing) => existing.merge(&candidate),
            None => {
                by_path.insert(candidate.document_path.clone(), candidate);
            }
        }
    }

    let mut ranked: Vec<ScoredCandidate> = by_path.into_values().collect();
    let raw: Vec<f64> = ranked.iter().map(|c| c.lexical_score).collect();
    for (candidate, norm) in ranked.iter_mut().zip(normalize_scores(&raw)) {
        candidate.lexical_norm = norm;
        candidate.fused_score = fuse(
            weights,
            norm,
            candidate.semantic_score,
            candidate.proximity_score,
        );
    }

    ranked.sort_by(compare_ranked);
    ranked.truncate(limit);
    ranked
}
