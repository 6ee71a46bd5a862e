use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::game::models::ScoringPolicy;
use crate::shared::AppError;

/// Largest raw score the normalizer accepts. Matches the ledger's 12-digit,
/// 2-decimal score column; anything above it is rejected, never wrapped.
pub const MAX_RAW_SCORE: f64 = 9_999_999_999.99;

/// Normalized, order-correct value stored in the ranking store. Keys are
/// always finite (enforced by [`normalize`]), so the total order from
/// `f64::total_cmp` is safe, and a larger key always means a better score
/// regardless of the leaderboard's policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingKey(f64);

impl RankingKey {
    fn new(value: f64) -> Self {
        // +0.0 and -0.0 compare equal but have distinct total_cmp order;
        // canonicalize so Eq and Ord agree.
        Self(value + 0.0)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Builds a key directly from an already-ordered value. Only the store's
    /// increment path uses this, where keys are counters rather than
    /// normalized raw scores.
    pub(crate) fn from_value(value: f64) -> Self {
        Self::new(value)
    }
}

impl Eq for RankingKey {}

impl Ord for RankingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for RankingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Maps a raw score to its ranking key. Pure and total over the valid
/// domain: finite values in `[0, MAX_RAW_SCORE]`. Shared by the live write
/// path and the rebuild controller so both always agree.
///
/// For `higher_is_better` the key is the raw score itself; for
/// `lower_is_better` the key is the negated raw score, so reading the store
/// from the largest key down always yields best-first order. Negation of a
/// finite f64 is exact, so distinct raw scores never collapse or reorder.
pub fn normalize(raw_score: f64, policy: ScoringPolicy) -> Result<RankingKey, AppError> {
    if !raw_score.is_finite() {
        return Err(AppError::OutOfRange(
            "score must be a finite number".to_string(),
        ));
    }
    if raw_score < 0.0 {
        return Err(AppError::OutOfRange(format!(
            "score {} is negative",
            raw_score
        )));
    }
    if raw_score > MAX_RAW_SCORE {
        return Err(AppError::OutOfRange(format!(
            "score {} exceeds maximum {}",
            raw_score, MAX_RAW_SCORE
        )));
    }

    match policy {
        ScoringPolicy::HigherIsBetter => Ok(RankingKey::new(raw_score)),
        ScoringPolicy::LowerIsBetter => Ok(RankingKey::new(-raw_score)),
    }
}

/// Inverse of [`normalize`] for display: recovers the raw score from a
/// stored ranking key under the same policy.
pub fn denormalize(key: RankingKey, policy: ScoringPolicy) -> f64 {
    match policy {
        ScoringPolicy::HigherIsBetter => key.value(),
        ScoringPolicy::LowerIsBetter => -key.value() + 0.0,
    }
}
