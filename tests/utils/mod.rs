use std::sync::Arc;

use serde_json::json;

use ranker::{
    GameModel, GameRepository, InMemoryGameRepository, InMemoryRankingStore, InMemoryScoreLedger,
    LeaderboardService, RankingStore, RebuildController, ScoreLedger, ScoreSubmissionRequest,
    ScoringPolicy, SubmitOutcome,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub service: LeaderboardService,
    pub ledger: Arc<InMemoryScoreLedger>,
    pub store: Arc<InMemoryRankingStore>,
    pub games: Vec<GameModel>,
}

pub struct TestSetupBuilder {
    games: Vec<GameModel>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self { games: vec![] }
    }

    pub fn with_game(mut self, name: &str, policy: ScoringPolicy) -> Self {
        self.games
            .push(GameModel::new(name.to_string(), String::new(), policy));
        self
    }

    pub fn build(self) -> TestSetup {
        let games_repo = Arc::new(InMemoryGameRepository::with_games(self.games.clone()));
        let ledger = Arc::new(InMemoryScoreLedger::new());
        let store = Arc::new(InMemoryRankingStore::new());
        let service = LeaderboardService::new(
            games_repo as Arc<dyn GameRepository + Send + Sync>,
            Arc::clone(&ledger) as Arc<dyn ScoreLedger + Send + Sync>,
            Arc::clone(&store) as Arc<dyn RankingStore + Send + Sync>,
        );

        TestSetup {
            service,
            ledger,
            store,
            games: self.games,
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSetup {
    pub fn game(&self, index: usize) -> &GameModel {
        &self.games[index]
    }

    #[allow(dead_code)]
    pub fn rebuild_controller(&self) -> RebuildController {
        RebuildController::new(
            Arc::clone(&self.ledger) as Arc<dyn ScoreLedger + Send + Sync>,
            Arc::clone(&self.store) as Arc<dyn RankingStore + Send + Sync>,
        )
    }

    pub async fn submit(&self, entrant: &str, game: &GameModel, score: f64) -> SubmitOutcome {
        self.service
            .submit_score(
                entrant,
                ScoreSubmissionRequest {
                    game_id: game.id.clone(),
                    score,
                    metadata: json!({}),
                },
            )
            .await
            .expect("submission failed")
    }
}

/// Unwraps a ranked submission outcome into
/// (rank, is_personal_best, score, total_entrants)
#[allow(dead_code)]
pub fn ranked(outcome: SubmitOutcome) -> (u64, bool, f64, u64) {
    match outcome {
        SubmitOutcome::Ranked {
            rank,
            is_personal_best,
            score,
            total_entrants,
            ..
        } => (rank, is_personal_best, score, total_entrants),
        SubmitOutcome::Degraded { .. } => panic!("expected ranked outcome, got degraded"),
    }
}
