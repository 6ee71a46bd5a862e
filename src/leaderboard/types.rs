use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Request body for score submission
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreSubmissionRequest {
    pub game_id: String,
    pub score: f64,
    /// Optional game-specific payload stored verbatim on the ledger record
    #[serde(default)]
    pub metadata: Value,
}

/// Pagination query parameters shared by the leaderboard and history views
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Neighbor-window query parameters for the my-rank view
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowParams {
    pub above: Option<u64>,
    pub below: Option<u64>,
}

/// Result of a score submission.
///
/// `Degraded` means the score is durably ledgered but the ranking store
/// could not be read or written; the fast path catches up on the next
/// rebuild. It is a success to the submitter, not a failure.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Ranked {
        record_id: Uuid,
        is_personal_best: bool,
        rank: u64,
        score: f64,
        total_entrants: u64,
    },
    Degraded {
        record_id: Uuid,
    },
}

/// One displayed leaderboard row. `score` is the raw score recovered from
/// the stored ranking key under the board's policy.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u64,
    pub entrant_id: String,
    pub score: f64,
    pub achieved_at: DateTime<Utc>,
    pub is_self: bool,
}

/// One page of a leaderboard, best first
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardPage {
    pub entries: Vec<LeaderboardEntry>,
    pub page: u32,
    pub page_size: u32,
    pub total_entrants: u64,
    pub has_next: bool,
}

/// My-rank query result. An entrant with no standing is a valid outcome,
/// not an error; it still reports how many entrants hold a rank.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RankOutcome {
    Ranked(RankView),
    Unranked { total_entrants: u64 },
}

/// Rank, display score and surrounding entrants for one ranked entrant
#[derive(Debug, Clone, Serialize)]
pub struct RankView {
    pub rank: u64,
    pub score: f64,
    pub total_entrants: u64,
    pub neighbors: Vec<LeaderboardEntry>,
}

/// One row of an entrant's submission history
#[derive(Debug, Clone, Serialize)]
pub struct ScoreHistoryEntry {
    pub record_id: Uuid,
    pub score: f64,
    pub submitted_at: DateTime<Utc>,
    pub metadata: Value,
}

/// One page of submission history, newest first. `personal_best` is the
/// entrant's best ledgered raw score for the game, independent of the page.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreHistoryPage {
    pub entries: Vec<ScoreHistoryEntry>,
    pub personal_best: Option<f64>,
    pub page: u32,
    pub page_size: u32,
    pub has_next: bool,
}
