use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ranker::game::repository::PostgresGameRepository;
use ranker::score::ledger::PostgresScoreLedger;
use ranker::{
    game, leaderboard, rebuild, AppState, GameRepository, InMemoryGameRepository,
    InMemoryRankingStore, InMemoryScoreLedger, LeaderboardId, RankingStore, RebuildController,
    RebuildMode, ScoreLedger,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ranker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ranking service");

    // Create shared application state with dependency injection.
    // With DATABASE_URL set, games and the score ledger live in PostgreSQL;
    // otherwise everything runs in memory for development.
    let (game_repository, ledger): (
        Arc<dyn GameRepository + Send + Sync>,
        Arc<dyn ScoreLedger + Send + Sync>,
    ) = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::PgPool::connect(&database_url)
                .await
                .expect("Failed to connect to database");
            info!("Using PostgreSQL ledger");
            (
                Arc::new(PostgresGameRepository::new(pool.clone())),
                Arc::new(PostgresScoreLedger::new(pool)),
            )
        }
        Err(_) => {
            info!("DATABASE_URL not set, using in-memory ledger");
            (
                Arc::new(InMemoryGameRepository::new()),
                Arc::new(InMemoryScoreLedger::new()),
            )
        }
    };

    // The ranking store is always the in-memory ordered-set structure; it is
    // rebuilt from the ledger below and on demand via the admin endpoints.
    let ranking_store: Arc<dyn RankingStore + Send + Sync> = Arc::new(InMemoryRankingStore::new());

    // Cold start: repopulate every leaderboard from the durable ledger
    let controller = RebuildController::new(Arc::clone(&ledger), Arc::clone(&ranking_store));
    match game_repository.list_games().await {
        Ok(games) => {
            for game in games {
                if let Err(e) = controller
                    .rebuild(&game.leaderboard(), RebuildMode::FullReplace)
                    .await
                {
                    warn!(game_id = %game.id, error = %e, "Cold-start rebuild failed");
                }
            }
            if let Err(e) = controller
                .rebuild(&LeaderboardId::Global, RebuildMode::FullReplace)
                .await
            {
                warn!(error = %e, "Cold-start global rebuild failed");
            }
        }
        Err(e) => warn!(error = %e, "Could not list games for cold-start rebuild"),
    }

    let app_state = AppState::new(game_repository, ledger, ranking_store);

    // build our application routes
    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/games", get(game::list_games).post(game::create_game))
        .route("/scores", post(leaderboard::submit_score))
        .route(
            "/scores/history/:game_id",
            get(leaderboard::get_score_history),
        )
        .route(
            "/leaderboards/global",
            get(leaderboard::get_global_leaderboard),
        )
        .route("/leaderboards/global/me", get(leaderboard::get_global_rank))
        .route("/leaderboards/:game_id", get(leaderboard::get_leaderboard))
        .route("/leaderboards/:game_id/me", get(leaderboard::get_my_rank))
        .route(
            "/admin/rebuild/:board_id",
            post(rebuild::rebuild_leaderboard),
        )
        .route("/admin/verify/:board_id", get(rebuild::verify_leaderboard))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // run our app with hyper
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();
    info!("Server running on http://{}", bind_addr);
    axum::serve(listener, app).await.unwrap();
}
