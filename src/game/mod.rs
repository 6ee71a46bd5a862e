// Public API - what other modules can use
pub use handlers::{create_game, list_games, GameCreateRequest};
pub use models::{GameModel, LeaderboardId, ScoringPolicy};
pub use repository::{GameRepository, InMemoryGameRepository, PostgresGameRepository};

// Internal modules
mod handlers;
pub mod models;
pub mod repository;
