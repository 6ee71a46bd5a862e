use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::game::repository::GameRepository;
use crate::leaderboard::store::RankingStore;
use crate::score::ledger::ScoreLedger;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub game_repository: Arc<dyn GameRepository + Send + Sync>,
    pub ledger: Arc<dyn ScoreLedger + Send + Sync>,
    pub ranking_store: Arc<dyn RankingStore + Send + Sync>,
}

impl AppState {
    pub fn new(
        game_repository: Arc<dyn GameRepository + Send + Sync>,
        ledger: Arc<dyn ScoreLedger + Send + Sync>,
        ranking_store: Arc<dyn RankingStore + Send + Sync>,
    ) -> Self {
        Self {
            game_repository,
            ledger,
            ranking_store,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Score out of range: {0}")]
    OutOfRange(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::OutOfRange(msg) => (
                StatusCode::BAD_REQUEST,
                format!("Score out of range: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Service unavailable: {}", msg),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
