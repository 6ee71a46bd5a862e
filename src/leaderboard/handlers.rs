use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::service::LeaderboardService;
use super::types::{PageParams, ScoreSubmissionRequest, SubmitOutcome, WindowParams};
use crate::shared::{AppError, AppState};

/// Authenticated entrant identity, installed as a request header by the
/// upstream identity layer. The ranking core trusts it opaquely.
#[derive(Debug, Clone)]
pub struct EntrantIdentity(pub String);

pub const ENTRANT_HEADER: &str = "x-entrant-id";

#[async_trait]
impl<S> FromRequestParts<S> for EntrantIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ENTRANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(|value| EntrantIdentity(value.to_string()))
            .ok_or_else(|| AppError::Unauthorized("Missing entrant identity".to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub record_id: Uuid,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_personal_best: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_entrants: Option<u64>,
}

fn service(state: &AppState) -> LeaderboardService {
    LeaderboardService::new(
        Arc::clone(&state.game_repository),
        Arc::clone(&state.ledger),
        Arc::clone(&state.ranking_store),
    )
}

/// HTTP handler for submitting a score
///
/// POST /scores
/// Returns 201 with the resulting rank, or 202 when the score was durably
/// recorded but the ranking store is catching up
#[instrument(name = "submit_score", skip(state, request))]
pub async fn submit_score(
    State(state): State<AppState>,
    entrant: EntrantIdentity,
    Json(request): Json<ScoreSubmissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(entrant_id = %entrant.0, game_id = %request.game_id, "Submitting score");

    let outcome = service(&state).submit_score(&entrant.0, request).await?;

    let response = match outcome {
        SubmitOutcome::Ranked {
            record_id,
            is_personal_best,
            rank,
            score,
            total_entrants,
        } => (
            StatusCode::CREATED,
            Json(SubmissionResponse {
                record_id,
                message: "Score submitted successfully".to_string(),
                is_personal_best: Some(is_personal_best),
                rank: Some(rank),
                score: Some(score),
                total_entrants: Some(total_entrants),
            }),
        ),
        SubmitOutcome::Degraded { record_id } => (
            StatusCode::ACCEPTED,
            Json(SubmissionResponse {
                record_id,
                message: "Score recorded; ranking temporarily unavailable".to_string(),
                is_personal_best: None,
                rank: None,
                score: None,
                total_entrants: None,
            }),
        ),
    };

    Ok(response)
}

/// HTTP handler for one page of a game's leaderboard
///
/// GET /leaderboards/{game_id}?page=&page_size=
#[instrument(name = "get_leaderboard", skip(state))]
pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = service(&state).leaderboard_page(&game_id, params).await?;
    Ok(Json(page))
}

/// HTTP handler for one page of the global leaderboard
///
/// GET /leaderboards/global?page=&page_size=
#[instrument(name = "get_global_leaderboard", skip(state))]
pub async fn get_global_leaderboard(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = service(&state).global_page(params).await?;
    Ok(Json(page))
}

/// HTTP handler for the caller's rank and neighbors on a game's leaderboard
///
/// GET /leaderboards/{game_id}/me?above=&below=
/// Returns a structured "unranked" result (not an error) for entrants with
/// no submissions
#[instrument(name = "get_my_rank", skip(state))]
pub async fn get_my_rank(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    entrant: EntrantIdentity,
    Query(params): Query<WindowParams>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = service(&state).my_rank(&game_id, &entrant.0, params).await?;
    Ok(Json(outcome))
}

/// HTTP handler for the caller's rank on the global leaderboard
///
/// GET /leaderboards/global/me?above=&below=
#[instrument(name = "get_global_rank", skip(state))]
pub async fn get_global_rank(
    State(state): State<AppState>,
    entrant: EntrantIdentity,
    Query(params): Query<WindowParams>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = service(&state).global_rank(&entrant.0, params).await?;
    Ok(Json(outcome))
}

/// HTTP handler for the caller's submission history in one game
///
/// GET /scores/history/{game_id}?page=&page_size=
#[instrument(name = "get_score_history", skip(state))]
pub async fn get_score_history(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    entrant: EntrantIdentity,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = service(&state)
        .score_history(&game_id, &entrant.0, params)
        .await?;
    Ok(Json(page))
}
