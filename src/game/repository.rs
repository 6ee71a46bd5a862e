use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{GameModel, ScoringPolicy};
use crate::shared::AppError;

/// Trait for game registry operations
#[async_trait]
pub trait GameRepository {
    async fn create_game(&self, game: &GameModel) -> Result<(), AppError>;
    async fn get_game(&self, game_id: &str) -> Result<Option<GameModel>, AppError>;
    async fn list_games(&self) -> Result<Vec<GameModel>, AppError>;
}

/// In-memory implementation of GameRepository for development and testing
pub struct InMemoryGameRepository {
    games: Mutex<HashMap<String, GameModel>>,
}

impl Default for InMemoryGameRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGameRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            games: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an in-memory repository with pre-registered games
    pub fn with_games(games: Vec<GameModel>) -> Self {
        let mut game_map = HashMap::new();
        for game in games {
            game_map.insert(game.id.clone(), game);
        }

        Self {
            games: Mutex::new(game_map),
        }
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    #[instrument(skip(self, game))]
    async fn create_game(&self, game: &GameModel) -> Result<(), AppError> {
        debug!(game_id = %game.id, name = %game.name, "Registering game in memory");

        let mut games = self.games.lock().unwrap();
        if games.contains_key(&game.id) {
            warn!(game_id = %game.id, "Game already exists in memory");
            return Err(AppError::Validation("Game already exists".to_string()));
        }
        if games.values().any(|g| g.name == game.name) {
            warn!(name = %game.name, "Game name already taken");
            return Err(AppError::Validation("Game name already taken".to_string()));
        }
        games.insert(game.id.clone(), game.clone());

        debug!(game_id = %game.id, "Game registered successfully in memory");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_game(&self, game_id: &str) -> Result<Option<GameModel>, AppError> {
        let games = self.games.lock().unwrap();
        Ok(games.get(game_id).cloned())
    }

    #[instrument(skip(self))]
    async fn list_games(&self) -> Result<Vec<GameModel>, AppError> {
        let games = self.games.lock().unwrap();
        let mut list: Vec<GameModel> = games.values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }
}

/// PostgreSQL implementation of the game registry.
///
/// Expected table:
///   games (id TEXT PRIMARY KEY, name TEXT UNIQUE NOT NULL, description TEXT,
///          policy TEXT NOT NULL, is_active BOOLEAN NOT NULL,
///          created_at TIMESTAMPTZ NOT NULL)
pub struct PostgresGameRepository {
    pool: PgPool,
}

impl PostgresGameRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn game_from_row(row: &sqlx::postgres::PgRow) -> Result<GameModel, AppError> {
    let policy_text: String = row.get("policy");
    let policy = ScoringPolicy::from_str(&policy_text).map_err(|_| {
        warn!(policy = %policy_text, "Unknown scoring policy stored for game");
        AppError::Internal
    })?;

    Ok(GameModel {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        policy,
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl GameRepository for PostgresGameRepository {
    #[instrument(skip(self, game))]
    async fn create_game(&self, game: &GameModel) -> Result<(), AppError> {
        debug!(game_id = %game.id, name = %game.name, "Registering game in database");

        sqlx::query(
            "INSERT INTO games (id, name, description, policy, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6)"
        )
        .bind(&game.id)
        .bind(&game.name)
        .bind(&game.description)
        .bind(game.policy.to_string())
        .bind(game.is_active)
        .bind(game.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id = %game.id, "Failed to register game in database");
            AppError::Unavailable(e.to_string())
        })?;

        debug!(game_id = %game.id, "Game registered successfully in database");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_game(&self, game_id: &str) -> Result<Option<GameModel>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, description, policy, is_active, created_at FROM games WHERE id = $1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, game_id = %game_id, "Failed to fetch game from database");
            AppError::Unavailable(e.to_string())
        })?;

        row.as_ref().map(game_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list_games(&self) -> Result<Vec<GameModel>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, description, policy, is_active, created_at FROM games ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to list games from database");
            AppError::Unavailable(e.to_string())
        })?;

        rows.iter().map(game_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_game(name: &str, policy: ScoringPolicy) -> GameModel {
        GameModel::new(name.to_string(), format!("{} rules", name), policy)
    }

    #[tokio::test]
    async fn create_and_get_game() {
        let repo = InMemoryGameRepository::new();
        let game = sample_game("Tetris", ScoringPolicy::HigherIsBetter);

        repo.create_game(&game).await.unwrap();

        let retrieved = repo.get_game(&game.id).await.unwrap().unwrap();
        assert_eq!(retrieved.id, game.id);
        assert_eq!(retrieved.name, "Tetris");
        assert_eq!(retrieved.policy, ScoringPolicy::HigherIsBetter);
        assert!(retrieved.is_active);
    }

    #[tokio::test]
    async fn get_nonexistent_game_returns_none() {
        let repo = InMemoryGameRepository::new();
        assert!(repo.get_game("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let repo = InMemoryGameRepository::new();
        repo.create_game(&sample_game("Tetris", ScoringPolicy::HigherIsBetter))
            .await
            .unwrap();

        let result = repo
            .create_game(&sample_game("Tetris", ScoringPolicy::LowerIsBetter))
            .await;
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn list_games_sorts_by_name() {
        let repo = InMemoryGameRepository::new();
        repo.create_game(&sample_game("Zuma", ScoringPolicy::HigherIsBetter))
            .await
            .unwrap();
        repo.create_game(&sample_game("Asteroids", ScoringPolicy::HigherIsBetter))
            .await
            .unwrap();

        let games = repo.list_games().await.unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].name, "Asteroids");
        assert_eq!(games[1].name, "Zuma");
    }
}
