use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use super::controller::{RebuildController, RebuildMode};
use crate::game::models::LeaderboardId;
use crate::shared::{AppError, AppState};

/// Path value addressing the global aggregate board instead of a game
pub const GLOBAL_BOARD: &str = "global";

#[derive(Debug, Deserialize)]
pub struct RebuildParams {
    pub mode: Option<RebuildMode>,
}

async fn resolve_board(state: &AppState, board_id: &str) -> Result<LeaderboardId, AppError> {
    if board_id == GLOBAL_BOARD {
        return Ok(LeaderboardId::Global);
    }
    let game = state
        .game_repository
        .get_game(board_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Game not found".to_string()))?;
    Ok(game.leaderboard())
}

fn controller(state: &AppState) -> RebuildController {
    RebuildController::new(Arc::clone(&state.ledger), Arc::clone(&state.ranking_store))
}

/// HTTP handler for triggering a leaderboard rebuild
///
/// POST /admin/rebuild/{board_id}?mode=merge|full_replace
/// `board_id` is a game id or the `global` sentinel; mode defaults to the
/// non-destructive merge
#[instrument(name = "rebuild_leaderboard", skip(state))]
pub async fn rebuild_leaderboard(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(params): Query<RebuildParams>,
) -> Result<impl IntoResponse, AppError> {
    let board = resolve_board(&state, &board_id).await?;
    let mode = params.mode.unwrap_or(RebuildMode::Merge);

    info!(board = %board, ?mode, "Rebuild requested");
    let report = controller(&state).rebuild(&board, mode).await?;
    Ok(Json(report))
}

/// HTTP handler for a read-only consistency check of one leaderboard
///
/// GET /admin/verify/{board_id}
#[instrument(name = "verify_leaderboard", skip(state))]
pub async fn verify_leaderboard(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let board = resolve_board(&state, &board_id).await?;
    let report = controller(&state).verify(&board).await?;
    Ok(Json(report))
}
