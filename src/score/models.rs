use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::models::LeaderboardId;

/// One accepted score submission. Ledger records are append-only: once
/// written they are never mutated or deleted, so the full submission history
/// stays available for audit and rebuilds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: Uuid,
    pub entrant_id: String,
    /// Leaderboard the score was submitted to, including the scoring policy
    /// in effect at submission time
    pub board: LeaderboardId,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
    /// Game-specific payload (level reached, replay reference, ...)
    pub metadata: Value,
}

/// A submission about to be appended to the ledger. The ledger assigns the
/// record ID and the submission timestamp at the durability point.
#[derive(Debug, Clone)]
pub struct NewScoreRecord {
    pub entrant_id: String,
    pub board: LeaderboardId,
    pub score: f64,
    pub metadata: Value,
}

/// Best score record per entrant on one leaderboard, as derived from the
/// ledger. `achieved_at` is the earliest submission that attained the best
/// value, so tie-breaks agree with the live write path.
#[derive(Debug, Clone, PartialEq)]
pub struct BestRecord {
    pub entrant_id: String,
    pub score: f64,
    pub achieved_at: DateTime<Utc>,
}

/// Number of strictly-improving submissions an entrant has made across all
/// games, replayed in ledger-append order. Feeds the global aggregate board.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalBestCount {
    pub entrant_id: String,
    pub personal_bests: u64,
    /// Time of the entrant's most recent personal best
    pub latest_at: DateTime<Utc>,
}
