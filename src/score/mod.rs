// Public API - what other modules can use
pub use ledger::{InMemoryScoreLedger, PostgresScoreLedger, ScoreLedger};
pub use models::{BestRecord, NewScoreRecord, PersonalBestCount, ScoreRecord};
pub use normalizer::{denormalize, normalize, RankingKey, MAX_RAW_SCORE};

// Internal modules
pub mod ledger;
pub mod models;
pub mod normalizer;
