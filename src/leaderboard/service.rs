use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::store::{RankedEntry, RankingStore, Standing};
use super::types::{
    LeaderboardEntry, LeaderboardPage, PageParams, RankOutcome, RankView, ScoreHistoryEntry,
    ScoreHistoryPage, ScoreSubmissionRequest, SubmitOutcome, WindowParams,
};
use crate::game::models::{GameModel, LeaderboardId, ScoringPolicy};
use crate::game::repository::GameRepository;
use crate::score::ledger::ScoreLedger;
use crate::score::models::NewScoreRecord;
use crate::score::normalizer::{denormalize, normalize};
use crate::shared::AppError;

/// Hard cap on page and window sizes, to bound response size and store cost
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_NEIGHBORS: u64 = 5;

/// The rank query engine: composes the durable ledger and the ranking store
/// into the four query shapes the system offers (submit, top-N page,
/// my-rank-with-neighbors, global), plus per-entrant score history.
///
/// Stateless per request; the only stateful transitions are standing
/// upserts, which happen inside the store's atomic conditional write.
pub struct LeaderboardService {
    games: Arc<dyn GameRepository + Send + Sync>,
    ledger: Arc<dyn ScoreLedger + Send + Sync>,
    store: Arc<dyn RankingStore + Send + Sync>,
}

impl LeaderboardService {
    pub fn new(
        games: Arc<dyn GameRepository + Send + Sync>,
        ledger: Arc<dyn ScoreLedger + Send + Sync>,
        store: Arc<dyn RankingStore + Send + Sync>,
    ) -> Self {
        Self {
            games,
            ledger,
            store,
        }
    }

    async fn resolve_game(&self, game_id: &str) -> Result<GameModel, AppError> {
        self.games
            .get_game(game_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Game not found".to_string()))
    }

    /// Accepts a score submission.
    ///
    /// Order matters: normalization (and its range check) happens before any
    /// side effect, the ledger append is the durability point and is never
    /// skipped, and only then is the ranking store touched. A ranking-store
    /// failure after a successful append degrades the response instead of
    /// failing it.
    #[instrument(skip(self, request), fields(game_id = %request.game_id))]
    pub async fn submit_score(
        &self,
        entrant_id: &str,
        request: ScoreSubmissionRequest,
    ) -> Result<SubmitOutcome, AppError> {
        let game = self.resolve_game(&request.game_id).await?;
        if !game.is_active {
            return Err(AppError::Validation(
                "Game is not accepting submissions".to_string(),
            ));
        }

        let board = game.leaderboard();
        let key = normalize(request.score, game.policy)?;

        let record = self
            .ledger
            .append(NewScoreRecord {
                entrant_id: entrant_id.to_string(),
                board: board.clone(),
                score: request.score,
                metadata: request.metadata,
            })
            .await?;

        let standing = Standing {
            key,
            achieved_at: record.submitted_at,
        };
        let outcome = match self
            .store
            .upsert_if_better(&board, entrant_id, standing)
            .await
        {
            Ok(outcome) => outcome,
            Err(AppError::Unavailable(msg)) => {
                warn!(
                    record_id = %record.id,
                    error = %msg,
                    "Score ledgered but ranking store unavailable"
                );
                return Ok(SubmitOutcome::Degraded {
                    record_id: record.id,
                });
            }
            Err(e) => return Err(e),
        };

        let is_personal_best = outcome.is_personal_best();
        if is_personal_best {
            // One global point per personal best. A failure here only skews
            // the aggregate until the next global rebuild, so the submission
            // itself still succeeds.
            if let Err(e) = self
                .store
                .increment(&LeaderboardId::Global, entrant_id, 1.0, record.submitted_at)
                .await
            {
                warn!(
                    entrant_id = %entrant_id,
                    error = %e,
                    "Failed to update global aggregate"
                );
            }
        }

        let entry = self.store.rank(&board, entrant_id).await;
        let total = self.store.cardinality(&board).await;
        match (entry, total) {
            (Ok(Some(entry)), Ok(total)) => {
                info!(
                    entrant_id = %entrant_id,
                    board = %board,
                    rank = entry.rank,
                    is_personal_best,
                    "Score submitted"
                );
                Ok(SubmitOutcome::Ranked {
                    record_id: record.id,
                    is_personal_best,
                    rank: entry.rank,
                    score: denormalize(entry.standing.key, game.policy),
                    total_entrants: total,
                })
            }
            (Ok(None), _) => {
                warn!(entrant_id = %entrant_id, board = %board, "Standing missing after upsert");
                Ok(SubmitOutcome::Degraded {
                    record_id: record.id,
                })
            }
            (Err(AppError::Unavailable(msg)), _) | (_, Err(AppError::Unavailable(msg))) => {
                warn!(error = %msg, "Rank read unavailable after submission");
                Ok(SubmitOutcome::Degraded {
                    record_id: record.id,
                })
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    /// One page of a game's leaderboard, best first
    #[instrument(skip(self))]
    pub async fn leaderboard_page(
        &self,
        game_id: &str,
        params: PageParams,
    ) -> Result<LeaderboardPage, AppError> {
        let game = self.resolve_game(game_id).await?;
        self.page(&game.leaderboard(), game.policy, params).await
    }

    /// One page of the global aggregate leaderboard (personal-best counts)
    #[instrument(skip(self))]
    pub async fn global_page(&self, params: PageParams) -> Result<LeaderboardPage, AppError> {
        let board = LeaderboardId::Global;
        self.page(&board, board.policy(), params).await
    }

    /// An entrant's rank with surrounding neighbors on a game's leaderboard
    #[instrument(skip(self))]
    pub async fn my_rank(
        &self,
        game_id: &str,
        entrant_id: &str,
        params: WindowParams,
    ) -> Result<RankOutcome, AppError> {
        let game = self.resolve_game(game_id).await?;
        self.rank_with_neighbors(&game.leaderboard(), game.policy, entrant_id, params)
            .await
    }

    /// An entrant's rank with neighbors on the global aggregate board
    #[instrument(skip(self))]
    pub async fn global_rank(
        &self,
        entrant_id: &str,
        params: WindowParams,
    ) -> Result<RankOutcome, AppError> {
        let board = LeaderboardId::Global;
        self.rank_with_neighbors(&board, board.policy(), entrant_id, params)
            .await
    }

    /// An entrant's own submission history for one game, newest first
    #[instrument(skip(self))]
    pub async fn score_history(
        &self,
        game_id: &str,
        entrant_id: &str,
        params: PageParams,
    ) -> Result<ScoreHistoryPage, AppError> {
        let game = self.resolve_game(game_id).await?;
        let (page, page_size) = clamp_page(params);
        let offset = (page - 1) * page_size;

        let records = self
            .ledger
            .history(
                entrant_id,
                &game.leaderboard(),
                offset as usize,
                page_size as usize,
            )
            .await?;
        let personal_best = self
            .ledger
            .best_for(entrant_id, &game.leaderboard())
            .await?
            .map(|best| best.score);

        let has_next = records.len() == page_size as usize;
        Ok(ScoreHistoryPage {
            personal_best,
            entries: records
                .into_iter()
                .map(|r| ScoreHistoryEntry {
                    record_id: r.id,
                    score: r.score,
                    submitted_at: r.submitted_at,
                    metadata: r.metadata,
                })
                .collect(),
            page,
            page_size,
            has_next,
        })
    }

    async fn page(
        &self,
        board: &LeaderboardId,
        policy: ScoringPolicy,
        params: PageParams,
    ) -> Result<LeaderboardPage, AppError> {
        let (page, page_size) = clamp_page(params);
        let offset = ((page - 1) * page_size) as u64;

        // One range read per page: entries within a page can never
        // duplicate or skip, even under concurrent writes.
        let entries = self.store.top_range(board, offset, page_size as u64).await?;
        let total = self.store.cardinality(board).await?;

        debug!(board = %board, page, returned = entries.len(), "Leaderboard page read");

        let has_next = offset + (entries.len() as u64) < total;
        Ok(LeaderboardPage {
            entries: entries
                .into_iter()
                .map(|e| display_entry(e, policy, None))
                .collect(),
            page,
            page_size,
            total_entrants: total,
            has_next,
        })
    }

    async fn rank_with_neighbors(
        &self,
        board: &LeaderboardId,
        policy: ScoringPolicy,
        entrant_id: &str,
        params: WindowParams,
    ) -> Result<RankOutcome, AppError> {
        let above = params.above.unwrap_or(DEFAULT_NEIGHBORS).min(MAX_PAGE_SIZE as u64);
        let below = params.below.unwrap_or(DEFAULT_NEIGHBORS).min(MAX_PAGE_SIZE as u64);

        let total = self.store.cardinality(board).await?;
        let Some(entry) = self.store.rank(board, entrant_id).await? else {
            debug!(board = %board, entrant_id = %entrant_id, "Entrant not yet ranked");
            return Ok(RankOutcome::Unranked {
                total_entrants: total,
            });
        };

        let neighbors = self
            .store
            .window(board, entrant_id, above, below)
            .await?
            .unwrap_or_default();

        Ok(RankOutcome::Ranked(RankView {
            rank: entry.rank,
            score: denormalize(entry.standing.key, policy),
            total_entrants: total,
            neighbors: neighbors
                .into_iter()
                .map(|e| display_entry(e, policy, Some(entrant_id)))
                .collect(),
        }))
    }
}

fn clamp_page(params: PageParams) -> (u32, u32) {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

fn display_entry(
    entry: RankedEntry,
    policy: ScoringPolicy,
    self_id: Option<&str>,
) -> LeaderboardEntry {
    LeaderboardEntry {
        rank: entry.rank,
        is_self: self_id == Some(entry.entrant_id.as_str()),
        score: denormalize(entry.standing.key, policy),
        achieved_at: entry.standing.achieved_at,
        entrant_id: entry.entrant_id,
    }
}
