// Library crate for the ranking service
// This file exposes the public API for integration tests

pub mod game;
pub mod leaderboard;
pub mod rebuild;
pub mod score;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use game::{GameModel, GameRepository, InMemoryGameRepository, LeaderboardId, ScoringPolicy};
pub use leaderboard::{
    InMemoryRankingStore, LeaderboardService, PageParams, RankOutcome, RankingStore,
    ScoreSubmissionRequest, SubmitOutcome, WindowParams,
};
pub use rebuild::{RebuildController, RebuildMode};
pub use score::{InMemoryScoreLedger, ScoreLedger};
pub use shared::{AppError, AppState};
