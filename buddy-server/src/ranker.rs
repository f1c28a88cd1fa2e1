use std::collections::BTreeSet;

use buddy_common::non_api_structs::AttributeSets;
use buddy_common::{MatchEntry, MatchResult, UserId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::store::Store;

const WEIGHT_TOLERANCE: f64 = 1e-9;
/// Scores are rounded to this many parts per unit before ranking, so sums
/// that are equal on paper compare equal and fall through to the id.
const SCORE_PRECISION: f64 = 1e9;

/// |X ∩ Y| / |X ∪ Y|, and 0 when both sets are empty.
pub fn jaccard(x: &BTreeSet<String>, y: &BTreeSet<String>) -> f64 {
    let intersection = x.intersection(y).count();
    let union = x.len() + y.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub courses: f64,
    pub hobbies: f64,
    pub community: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            courses: 1.0 / 3.0,
            hobbies: 1.0 / 3.0,
            community: 1.0 / 3.0,
        }
    }
}

impl Weights {
    pub fn new(courses: f64, hobbies: f64, community: f64) -> CoreResult<Self> {
        Self { courses, hobbies, community }.validated()
    }

    /// Each weight must be finite and non-negative, and together they sum to 1.
    pub fn validated(self) -> CoreResult<Self> {
        let all = [self.courses, self.hobbies, self.community];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(CoreError::InvalidConfiguration(format!("weights must be finite and non-negative: {:?}", self)));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(CoreError::InvalidConfiguration(format!("weights must sum to 1, got {sum}")));
        }
        Ok(self)
    }
}

/// Anything that can say how compatible two users are. Higher is better.
pub trait Scorer: Send + Sync {
    fn score(&self, subject: &AttributeSets, candidate: &AttributeSets) -> f64;
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WeightedJaccard {
    weights: Weights,
}

impl WeightedJaccard {
    pub fn new(weights: Weights) -> CoreResult<Self> {
        Ok(Self { weights: weights.validated()? })
    }
}

impl Scorer for WeightedJaccard {
    fn score(&self, subject: &AttributeSets, candidate: &AttributeSets) -> f64 {
        self.weights.courses * jaccard(&subject.courses, &candidate.courses)
            + self.weights.hobbies * jaccard(&subject.hobbies, &candidate.hobbies)
            + self.weights.community * jaccard(&subject.community, &candidate.community)
    }
}

impl Store {
    /// Scores every candidate against `subject` and returns the best `k`,
    /// highest score first, ties going to the lower id. The subject never
    /// ranks against itself.
    pub fn rank(&self, scorer: &dyn Scorer, subject: UserId, pool: &BTreeSet<UserId>, k: usize) -> CoreResult<MatchResult> {
        let subject = self.lookup_by_id(subject)?;
        let mut scored = Vec::with_capacity(pool.len());
        for &candidate in pool.iter().filter(|&&id| id != subject.id) {
            let candidate = self.lookup_by_id(candidate)?;
            let score = (scorer.score(&subject.attributes, &candidate.attributes) * SCORE_PRECISION).round() / SCORE_PRECISION;
            scored.push(MatchEntry { user_id: candidate.id, username: candidate.username, score });
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.user_id.cmp(&b.user_id)));
        scored.truncate(k);
        debug!(subject = %subject.id, pool = pool.len(), returned = scored.len(), "ranked candidates");
        Ok(MatchResult(scored))
    }
}
