use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use tracing::{info, instrument};

use super::models::{GameModel, ScoringPolicy};
use crate::shared::{AppError, AppState};

/// Request body for registering a game
#[derive(Debug, Deserialize)]
pub struct GameCreateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub policy: ScoringPolicy,
}

/// HTTP handler for registering a new game
///
/// POST /games
/// The scoring policy is fixed here for the lifetime of the game; changing
/// it later would invalidate every stored ranking key.
#[instrument(name = "create_game", skip(state, request))]
pub async fn create_game(
    State(state): State<AppState>,
    Json(request): Json<GameCreateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Game name must not be empty".to_string()));
    }

    let game = GameModel::new(request.name, request.description, request.policy);
    state.game_repository.create_game(&game).await?;

    info!(game_id = %game.id, name = %game.name, policy = %game.policy, "Game registered");
    Ok((StatusCode::CREATED, Json(game)))
}

/// HTTP handler for listing registered games
///
/// GET /games
#[instrument(name = "list_games", skip(state))]
pub async fn list_games(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let games = state.game_repository.list_games().await?;
    Ok(Json(games))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Request},
        routing::post,
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    fn test_app() -> Router {
        Router::new()
            .route("/games", post(create_game).get(list_games))
            .with_state(AppStateBuilder::new().build())
    }

    #[tokio::test]
    async fn create_game_returns_created() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/games")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"name": "Sprint", "policy": "lower_is_better"}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["name"], "Sprint");
        assert_eq!(json["policy"], "lower_is_better");
        assert_eq!(json["is_active"], true);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/games")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name": "  ", "policy": "higher_is_better"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
