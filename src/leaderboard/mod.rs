// Public API - what other modules can use
pub use handlers::{
    get_global_leaderboard, get_global_rank, get_leaderboard, get_my_rank, get_score_history,
    submit_score, EntrantIdentity, ENTRANT_HEADER,
};
pub use service::{LeaderboardService, DEFAULT_NEIGHBORS, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use store::{InMemoryRankingStore, RankedEntry, RankingStore, Standing, UpsertOutcome};
pub use types::{
    LeaderboardEntry, LeaderboardPage, PageParams, RankOutcome, RankView, ScoreHistoryEntry,
    ScoreHistoryPage, ScoreSubmissionRequest, SubmitOutcome, WindowParams,
};

// Internal modules
mod handlers;
pub mod service;
pub mod store;
pub mod types;
