use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::models::{BestRecord, NewScoreRecord, PersonalBestCount, ScoreRecord};
use crate::game::models::{LeaderboardId, ScoringPolicy};
use crate::shared::AppError;

/// Append-only durable ledger of accepted score submissions: the source of
/// truth the ranking store is rebuilt from.
///
/// `scan_best` and `scan_personal_best_counts` return entrants in ascending
/// id order with keyset resumption (`after_entrant`), so a rebuild can
/// checkpoint between batches.
#[async_trait]
pub trait ScoreLedger {
    /// Appends one submission. The record is durable before this returns;
    /// the ledger assigns the record ID and submission timestamp.
    async fn append(&self, record: NewScoreRecord) -> Result<ScoreRecord, AppError>;

    /// Best score record per entrant for one game leaderboard.
    async fn scan_best(
        &self,
        board: &LeaderboardId,
        after_entrant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BestRecord>, AppError>;

    /// Per-entrant count of strictly-improving submissions across all games,
    /// replayed in append order. Source data for the global aggregate board.
    async fn scan_personal_best_counts(
        &self,
        after_entrant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PersonalBestCount>, AppError>;

    /// Best record for a single entrant on one game leaderboard.
    async fn best_for(
        &self,
        entrant_id: &str,
        board: &LeaderboardId,
    ) -> Result<Option<BestRecord>, AppError>;

    /// An entrant's submission history for one game, newest first.
    async fn history(
        &self,
        entrant_id: &str,
        board: &LeaderboardId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, AppError>;
}

fn improves(candidate: f64, incumbent: f64, policy: ScoringPolicy) -> bool {
    match policy {
        ScoringPolicy::HigherIsBetter => candidate > incumbent,
        ScoringPolicy::LowerIsBetter => candidate < incumbent,
    }
}

fn require_game_board(board: &LeaderboardId) -> Result<&str, AppError> {
    board.game_id().ok_or_else(|| {
        AppError::Validation("the global board has no per-game ledger scan".to_string())
    })
}

/// In-memory implementation of ScoreLedger for development and testing.
/// Keeps records in append order, which doubles as the replay order for
/// personal-best counting.
pub struct InMemoryScoreLedger {
    records: Mutex<Vec<ScoreRecord>>,
}

impl Default for InMemoryScoreLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryScoreLedger {
    /// Creates a new empty in-memory ledger
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current number of ledgered records
    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl ScoreLedger for InMemoryScoreLedger {
    #[instrument(skip(self, record))]
    async fn append(&self, record: NewScoreRecord) -> Result<ScoreRecord, AppError> {
        let stored = ScoreRecord {
            id: Uuid::new_v4(),
            entrant_id: record.entrant_id,
            board: record.board,
            score: record.score,
            submitted_at: Utc::now(),
            metadata: record.metadata,
        };

        debug!(
            record_id = %stored.id,
            entrant_id = %stored.entrant_id,
            board = %stored.board,
            score = stored.score,
            "Appending score record in memory"
        );

        let mut records = self.records.lock().unwrap();
        records.push(stored.clone());
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn scan_best(
        &self,
        board: &LeaderboardId,
        after_entrant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BestRecord>, AppError> {
        require_game_board(board)?;
        let policy = board.policy();

        let records = self.records.lock().unwrap();
        let mut best: HashMap<String, BestRecord> = HashMap::new();

        // Append order: on an exact tie the earlier submission keeps the
        // achieved_at timestamp, matching the live path which never moves a
        // standing on an equal score.
        for record in records.iter().filter(|r| &r.board == board) {
            match best.get_mut(&record.entrant_id) {
                Some(current) if !improves(record.score, current.score, policy) => {}
                Some(current) => {
                    current.score = record.score;
                    current.achieved_at = record.submitted_at;
                }
                None => {
                    best.insert(
                        record.entrant_id.clone(),
                        BestRecord {
                            entrant_id: record.entrant_id.clone(),
                            score: record.score,
                            achieved_at: record.submitted_at,
                        },
                    );
                }
            }
        }

        let mut rows: Vec<BestRecord> = best.into_values().collect();
        rows.sort_by(|a, b| a.entrant_id.cmp(&b.entrant_id));
        if let Some(after) = after_entrant {
            rows.retain(|r| r.entrant_id.as_str() > after);
        }
        rows.truncate(limit);
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn scan_personal_best_counts(
        &self,
        after_entrant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PersonalBestCount>, AppError> {
        let records = self.records.lock().unwrap();

        // Replay every submission in append order, tracking the running best
        // per (entrant, game); each strict improvement is one personal best.
        let mut running_best: HashMap<(String, String), f64> = HashMap::new();
        let mut counts: HashMap<String, PersonalBestCount> = HashMap::new();

        for record in records.iter() {
            let Some(game_id) = record.board.game_id() else {
                continue;
            };
            let policy = record.board.policy();
            let slot = (record.entrant_id.clone(), game_id.to_string());

            let is_best = match running_best.get(&slot) {
                Some(&incumbent) => improves(record.score, incumbent, policy),
                None => true,
            };
            if !is_best {
                continue;
            }
            running_best.insert(slot, record.score);

            counts
                .entry(record.entrant_id.clone())
                .and_modify(|c| {
                    c.personal_bests += 1;
                    c.latest_at = record.submitted_at;
                })
                .or_insert_with(|| PersonalBestCount {
                    entrant_id: record.entrant_id.clone(),
                    personal_bests: 1,
                    latest_at: record.submitted_at,
                });
        }

        let mut rows: Vec<PersonalBestCount> = counts.into_values().collect();
        rows.sort_by(|a, b| a.entrant_id.cmp(&b.entrant_id));
        if let Some(after) = after_entrant {
            rows.retain(|r| r.entrant_id.as_str() > after);
        }
        rows.truncate(limit);
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn best_for(
        &self,
        entrant_id: &str,
        board: &LeaderboardId,
    ) -> Result<Option<BestRecord>, AppError> {
        require_game_board(board)?;
        let policy = board.policy();

        let records = self.records.lock().unwrap();
        let mut best: Option<BestRecord> = None;
        for record in records
            .iter()
            .filter(|r| &r.board == board && r.entrant_id == entrant_id)
        {
            match &mut best {
                Some(current) if !improves(record.score, current.score, policy) => {}
                Some(current) => {
                    current.score = record.score;
                    current.achieved_at = record.submitted_at;
                }
                None => {
                    best = Some(BestRecord {
                        entrant_id: record.entrant_id.clone(),
                        score: record.score,
                        achieved_at: record.submitted_at,
                    });
                }
            }
        }
        Ok(best)
    }

    #[instrument(skip(self))]
    async fn history(
        &self,
        entrant_id: &str,
        board: &LeaderboardId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, AppError> {
        require_game_board(board)?;

        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .rev()
            .filter(|r| &r.board == board && r.entrant_id == entrant_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// PostgreSQL implementation of the score ledger.
///
/// Expected table:
///   scores (id UUID PRIMARY KEY, entrant_id TEXT NOT NULL,
///           game_id TEXT NOT NULL, policy TEXT NOT NULL,
///           score DOUBLE PRECISION NOT NULL,
///           submitted_at TIMESTAMPTZ NOT NULL, metadata JSONB NOT NULL)
///   with indexes on (game_id, entrant_id) and (entrant_id, game_id,
///   submitted_at DESC).
///
/// The scoring policy is denormalized onto every record: the ledger is an
/// audit trail, so each row keeps the policy that was in effect when the
/// score was accepted.
pub struct PostgresScoreLedger {
    pool: PgPool,
}

impl PostgresScoreLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<ScoreRecord, AppError> {
    let policy_text: String = row.get("policy");
    let policy = ScoringPolicy::from_str(&policy_text).map_err(|_| {
        warn!(policy = %policy_text, "Unknown scoring policy stored on score record");
        AppError::Internal
    })?;

    Ok(ScoreRecord {
        id: row.get("id"),
        entrant_id: row.get("entrant_id"),
        board: LeaderboardId::Game {
            game_id: row.get("game_id"),
            policy,
        },
        score: row.get("score"),
        submitted_at: row.get("submitted_at"),
        metadata: row.get("metadata"),
    })
}

#[async_trait]
impl ScoreLedger for PostgresScoreLedger {
    #[instrument(skip(self, record))]
    async fn append(&self, record: NewScoreRecord) -> Result<ScoreRecord, AppError> {
        let game_id = require_game_board(&record.board)?.to_string();
        let stored = ScoreRecord {
            id: Uuid::new_v4(),
            entrant_id: record.entrant_id,
            board: record.board,
            score: record.score,
            submitted_at: Utc::now(),
            metadata: record.metadata,
        };

        debug!(
            record_id = %stored.id,
            entrant_id = %stored.entrant_id,
            board = %stored.board,
            score = stored.score,
            "Appending score record to database"
        );

        sqlx::query(
            "INSERT INTO scores (id, entrant_id, game_id, policy, score, submitted_at, metadata) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        )
        .bind(stored.id)
        .bind(&stored.entrant_id)
        .bind(&game_id)
        .bind(stored.board.policy().to_string())
        .bind(stored.score)
        .bind(stored.submitted_at)
        .bind(&stored.metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, entrant_id = %stored.entrant_id, "Failed to append score record");
            AppError::Unavailable(e.to_string())
        })?;

        debug!(record_id = %stored.id, "Score record appended successfully");
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn scan_best(
        &self,
        board: &LeaderboardId,
        after_entrant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<BestRecord>, AppError> {
        let game_id = require_game_board(board)?;

        // DISTINCT ON picks each entrant's best row; the secondary
        // submitted_at ASC keeps the earliest submission attaining it.
        let query = match board.policy() {
            ScoringPolicy::HigherIsBetter => {
                "SELECT DISTINCT ON (entrant_id) entrant_id, score, submitted_at \
                 FROM scores WHERE game_id = $1 AND entrant_id > $2 \
                 ORDER BY entrant_id, score DESC, submitted_at ASC, id ASC LIMIT $3"
            }
            ScoringPolicy::LowerIsBetter => {
                "SELECT DISTINCT ON (entrant_id) entrant_id, score, submitted_at \
                 FROM scores WHERE game_id = $1 AND entrant_id > $2 \
                 ORDER BY entrant_id, score ASC, submitted_at ASC, id ASC LIMIT $3"
            }
        };

        let rows = sqlx::query(query)
            .bind(game_id)
            .bind(after_entrant.unwrap_or(""))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, board = %board, "Failed to scan best records");
                AppError::Unavailable(e.to_string())
            })?;

        Ok(rows
            .iter()
            .map(|row| BestRecord {
                entrant_id: row.get("entrant_id"),
                score: row.get("score"),
                achieved_at: row.get("submitted_at"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn scan_personal_best_counts(
        &self,
        after_entrant: Option<&str>,
        limit: usize,
    ) -> Result<Vec<PersonalBestCount>, AppError> {
        // A submission is a personal best when it strictly improves on every
        // earlier submission for the same (entrant, game), replayed in
        // append order (submitted_at, then id).
        let rows = sqlx::query(
            "WITH ordered AS ( \
                 SELECT entrant_id, score, submitted_at, policy, \
                        CASE WHEN policy = 'higher_is_better' \
                             THEN MAX(score) OVER w \
                             ELSE MIN(score) OVER w END AS prior_best \
                 FROM scores \
                 WINDOW w AS (PARTITION BY entrant_id, game_id \
                              ORDER BY submitted_at, id \
                              ROWS BETWEEN UNBOUNDED PRECEDING AND 1 PRECEDING) \
             ) \
             SELECT entrant_id, COUNT(*) AS personal_bests, MAX(submitted_at) AS latest_at \
             FROM ordered \
             WHERE (prior_best IS NULL \
                    OR (policy = 'higher_is_better' AND score > prior_best) \
                    OR (policy = 'lower_is_better' AND score < prior_best)) \
               AND entrant_id > $1 \
             GROUP BY entrant_id \
             ORDER BY entrant_id \
             LIMIT $2",
        )
        .bind(after_entrant.unwrap_or(""))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to scan personal-best counts");
            AppError::Unavailable(e.to_string())
        })?;

        Ok(rows
            .iter()
            .map(|row| PersonalBestCount {
                entrant_id: row.get("entrant_id"),
                personal_bests: row.get::<i64, _>("personal_bests") as u64,
                latest_at: row.get("latest_at"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn best_for(
        &self,
        entrant_id: &str,
        board: &LeaderboardId,
    ) -> Result<Option<BestRecord>, AppError> {
        let game_id = require_game_board(board)?;

        let query = match board.policy() {
            ScoringPolicy::HigherIsBetter => {
                "SELECT entrant_id, score, submitted_at FROM scores \
                 WHERE game_id = $1 AND entrant_id = $2 \
                 ORDER BY score DESC, submitted_at ASC, id ASC LIMIT 1"
            }
            ScoringPolicy::LowerIsBetter => {
                "SELECT entrant_id, score, submitted_at FROM scores \
                 WHERE game_id = $1 AND entrant_id = $2 \
                 ORDER BY score ASC, submitted_at ASC, id ASC LIMIT 1"
            }
        };

        let row = sqlx::query(query)
            .bind(game_id)
            .bind(entrant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, entrant_id = %entrant_id, "Failed to fetch best record");
                AppError::Unavailable(e.to_string())
            })?;

        Ok(row.map(|row| BestRecord {
            entrant_id: row.get("entrant_id"),
            score: row.get("score"),
            achieved_at: row.get("submitted_at"),
        }))
    }

    #[instrument(skip(self))]
    async fn history(
        &self,
        entrant_id: &str,
        board: &LeaderboardId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ScoreRecord>, AppError> {
        let game_id = require_game_board(board)?;

        let rows = sqlx::query(
            "SELECT id, entrant_id, game_id, policy, score, submitted_at, metadata \
             FROM scores WHERE game_id = $1 AND entrant_id = $2 \
             ORDER BY submitted_at DESC, id DESC OFFSET $3 LIMIT $4",
        )
        .bind(game_id)
        .bind(entrant_id)
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, entrant_id = %entrant_id, "Failed to fetch score history");
            AppError::Unavailable(e.to_string())
        })?;

        rows.iter().map(record_from_row).collect()
    }
}
