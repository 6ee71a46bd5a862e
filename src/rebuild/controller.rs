use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::game::models::LeaderboardId;
use crate::leaderboard::store::{RankingStore, Standing};
use crate::score::ledger::ScoreLedger;
use crate::score::normalizer::{normalize, RankingKey};
use crate::shared::AppError;

/// Entrants fetched from the ledger per batch during a rebuild
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// How a rebuild treats standings already present in the ranking store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildMode {
    /// Additive and corrective: upserts each entrant's best record, never
    /// removes entrants not yet seen in the scan. Safe under live traffic.
    Merge,
    /// Clears the board before replaying the ledger. Authoritative, but the
    /// board is empty (and queries are lossy) while the replay runs.
    FullReplace,
}

/// Outcome of one rebuild run
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub board: String,
    pub mode: RebuildMode,
    pub batches: u32,
    pub scanned: u64,
    /// Standings created where the store had none
    pub applied: u64,
    /// Standings that already matched the ledger
    pub unchanged: u64,
    /// Standings that disagreed with the ledger and were corrected
    pub drift_corrected: u64,
}

/// Outcome of a read-only consistency check
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub board: String,
    pub scanned: u64,
    /// Standings that disagree with the ledger's best-known record
    pub drift: u64,
    /// Entrants the ledger knows but the store does not
    pub missing: u64,
}

/// Rebuilds a leaderboard's standings from the durable ledger, the only
/// path that bulk-writes the ranking store.
///
/// The ledger scan already yields each entrant's best record, and this
/// controller normalizes with the same function as the live write path, so
/// the unconditional `upsert` below can never regress a standing to a
/// non-best value. Scans are keyset-paginated, so a rebuild holds no state
/// beyond the last entrant id seen and is safe to re-run at any time.
pub struct RebuildController {
    ledger: Arc<dyn ScoreLedger + Send + Sync>,
    store: Arc<dyn RankingStore + Send + Sync>,
    batch_size: usize,
}

impl RebuildController {
    pub fn new(
        ledger: Arc<dyn ScoreLedger + Send + Sync>,
        store: Arc<dyn RankingStore + Send + Sync>,
    ) -> Self {
        Self {
            ledger,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Replays the ledger's best records into the ranking store.
    /// Idempotent: rebuilding an already-consistent board reports every
    /// entrant as unchanged and shifts no rank.
    #[instrument(skip(self))]
    pub async fn rebuild(
        &self,
        board: &LeaderboardId,
        mode: RebuildMode,
    ) -> Result<RebuildReport, AppError> {
        info!(board = %board, ?mode, "Starting leaderboard rebuild");

        if mode == RebuildMode::FullReplace {
            self.store.clear(board).await?;
        }

        let mut report = RebuildReport {
            board: board.to_string(),
            mode,
            batches: 0,
            scanned: 0,
            applied: 0,
            unchanged: 0,
            drift_corrected: 0,
        };

        let mut after: Option<String> = None;
        loop {
            let batch = self.scan_batch(board, after.as_deref()).await?;
            let batch_len = batch.len();
            if batch_len > 0 {
                report.batches += 1;
            }

            for (entrant_id, target) in batch {
                report.scanned += 1;

                match self.store.standing(board, &entrant_id).await? {
                    None => {
                        self.store.upsert(board, &entrant_id, target).await?;
                        report.applied += 1;
                    }
                    Some(current) if current == target => {
                        report.unchanged += 1;
                    }
                    Some(current) => {
                        warn!(
                            board = %board,
                            entrant_id = %entrant_id,
                            stored_key = current.key.value(),
                            ledger_key = target.key.value(),
                            "Standing disagrees with ledger; correcting"
                        );
                        self.store.upsert(board, &entrant_id, target).await?;
                        report.drift_corrected += 1;
                    }
                }
                after = Some(entrant_id);
            }

            if batch_len < self.batch_size {
                break;
            }
        }

        info!(
            board = %board,
            scanned = report.scanned,
            applied = report.applied,
            drift_corrected = report.drift_corrected,
            "Leaderboard rebuild finished"
        );
        Ok(report)
    }

    /// Read-only drift detection over the same ledger scan a rebuild uses
    #[instrument(skip(self))]
    pub async fn verify(&self, board: &LeaderboardId) -> Result<VerifyReport, AppError> {
        let mut report = VerifyReport {
            board: board.to_string(),
            scanned: 0,
            drift: 0,
            missing: 0,
        };

        let mut after: Option<String> = None;
        loop {
            let batch = self.scan_batch(board, after.as_deref()).await?;
            let batch_len = batch.len();

            for (entrant_id, target) in batch {
                report.scanned += 1;

                match self.store.standing(board, &entrant_id).await? {
                    None => {
                        warn!(board = %board, entrant_id = %entrant_id, "Entrant missing from ranking store");
                        report.missing += 1;
                    }
                    Some(current) if current == target => {}
                    Some(current) => {
                        warn!(
                            board = %board,
                            entrant_id = %entrant_id,
                            stored_key = current.key.value(),
                            ledger_key = target.key.value(),
                            "Standing disagrees with ledger"
                        );
                        report.drift += 1;
                    }
                }
                after = Some(entrant_id);
            }

            if batch_len < self.batch_size {
                break;
            }
        }

        Ok(report)
    }

    /// One keyset batch of (entrant, best standing) derived from the ledger.
    /// Game boards replay best scores; the global board replays
    /// personal-best counts.
    async fn scan_batch(
        &self,
        board: &LeaderboardId,
        after: Option<&str>,
    ) -> Result<Vec<(String, Standing)>, AppError> {
        if board.is_global() {
            let rows = self
                .ledger
                .scan_personal_best_counts(after, self.batch_size)
                .await?;
            return Ok(rows
                .into_iter()
                .map(|row| {
                    (
                        row.entrant_id,
                        Standing {
                            key: RankingKey::from_value(row.personal_bests as f64),
                            achieved_at: row.latest_at,
                        },
                    )
                })
                .collect());
        }

        let policy = board.policy();
        let rows = self.ledger.scan_best(board, after, self.batch_size).await?;
        rows.into_iter()
            .map(|row| {
                let key = normalize(row.score, policy)?;
                Ok((
                    row.entrant_id,
                    Standing {
                        key,
                        achieved_at: row.achieved_at,
                    },
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::models::ScoringPolicy;
    use crate::leaderboard::store::InMemoryRankingStore;
    use crate::score::ledger::InMemoryScoreLedger;
    use crate::score::models::NewScoreRecord;
    use chrono::Utc;
    use serde_json::json;

    /// Test helper functions for creating test data
    mod helpers {
        use super::*;

        pub struct Fixture {
            pub ledger: Arc<InMemoryScoreLedger>,
            pub store: Arc<InMemoryRankingStore>,
            pub board: LeaderboardId,
        }

        pub fn fixture(policy: ScoringPolicy) -> Fixture {
            Fixture {
                ledger: Arc::new(InMemoryScoreLedger::new()),
                store: Arc::new(InMemoryRankingStore::new()),
                board: LeaderboardId::Game {
                    game_id: "g1".to_string(),
                    policy,
                },
            }
        }

        impl Fixture {
            pub fn controller(&self) -> RebuildController {
                RebuildController::new(
                    Arc::clone(&self.ledger) as Arc<dyn ScoreLedger + Send + Sync>,
                    Arc::clone(&self.store) as Arc<dyn RankingStore + Send + Sync>,
                )
            }

            pub async fn ledgered(&self, entrant: &str, score: f64) {
                self.ledger
                    .append(NewScoreRecord {
                        entrant_id: entrant.to_string(),
                        board: self.board.clone(),
                        score,
                        metadata: json!({}),
                    })
                    .await
                    .unwrap();
            }
        }
    }

    use helpers::*;

    #[tokio::test]
    async fn rebuild_reconstructs_ranks_from_ledger() {
        let fx = fixture(ScoringPolicy::HigherIsBetter);
        fx.ledgered("alice", 100.0).await;
        fx.ledgered("alice", 80.0).await;
        fx.ledgered("bob", 150.0).await;
        fx.ledgered("carol", 120.0).await;

        let report = fx
            .controller()
            .rebuild(&fx.board, RebuildMode::FullReplace)
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.applied, 3);
        assert_eq!(report.drift_corrected, 0);

        let top = fx.store.top_range(&fx.board, 0, 10).await.unwrap();
        let ids: Vec<&str> = top.iter().map(|e| e.entrant_id.as_str()).collect();
        assert_eq!(ids, vec!["bob", "carol", "alice"]);
        // alice's standing is her best ledgered score, not her latest
        assert_eq!(top[2].standing.key.value(), 100.0);
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let fx = fixture(ScoringPolicy::LowerIsBetter);
        fx.ledgered("bob", 12.3).await;
        fx.ledgered("bob", 9.8).await;
        fx.ledgered("eve", 11.0).await;

        let controller = fx.controller();
        controller.rebuild(&fx.board, RebuildMode::Merge).await.unwrap();
        let before = fx.store.top_range(&fx.board, 0, 10).await.unwrap();

        let second = controller.rebuild(&fx.board, RebuildMode::Merge).await.unwrap();
        let after = fx.store.top_range(&fx.board, 0, 10).await.unwrap();

        assert_eq!(second.scanned, 2);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.applied, 0);
        assert_eq!(second.drift_corrected, 0);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn rebuild_corrects_drifted_standing() {
        let fx = fixture(ScoringPolicy::HigherIsBetter);
        fx.ledgered("alice", 100.0).await;

        // Simulate drift: the store holds a stale, wrong key
        fx.store
            .upsert(
                &fx.board,
                "alice",
                Standing {
                    key: normalize(55.0, ScoringPolicy::HigherIsBetter).unwrap(),
                    achieved_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let report = fx
            .controller()
            .rebuild(&fx.board, RebuildMode::Merge)
            .await
            .unwrap();

        assert_eq!(report.drift_corrected, 1);
        let standing = fx.store.standing(&fx.board, "alice").await.unwrap().unwrap();
        assert_eq!(standing.key.value(), 100.0);
    }

    #[tokio::test]
    async fn merge_keeps_entrants_absent_from_the_scan() {
        let fx = fixture(ScoringPolicy::HigherIsBetter);
        fx.ledgered("alice", 100.0).await;

        // "live" is ranked in the store but has no ledger record in this
        // scan (e.g. a submission racing the rebuild)
        fx.store
            .upsert(
                &fx.board,
                "live",
                Standing {
                    key: normalize(70.0, ScoringPolicy::HigherIsBetter).unwrap(),
                    achieved_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        fx.controller()
            .rebuild(&fx.board, RebuildMode::Merge)
            .await
            .unwrap();
        assert_eq!(fx.store.cardinality(&fx.board).await.unwrap(), 2);

        fx.controller()
            .rebuild(&fx.board, RebuildMode::FullReplace)
            .await
            .unwrap();
        assert_eq!(fx.store.cardinality(&fx.board).await.unwrap(), 1);
        assert!(fx.store.standing(&fx.board, "live").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rebuild_pages_through_bounded_batches() {
        let fx = fixture(ScoringPolicy::HigherIsBetter);
        for i in 0..5 {
            fx.ledgered(&format!("entrant-{}", i), (i * 10) as f64).await;
        }

        let report = fx
            .controller()
            .with_batch_size(2)
            .rebuild(&fx.board, RebuildMode::FullReplace)
            .await
            .unwrap();

        assert_eq!(report.scanned, 5);
        assert_eq!(report.batches, 3);
        assert_eq!(fx.store.cardinality(&fx.board).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn global_rebuild_replays_personal_best_counts() {
        let fx = fixture(ScoringPolicy::HigherIsBetter);
        // alice: 50 (pb), 60 (pb), 55 (no) -> 2; bob: 40 (pb) -> 1
        fx.ledgered("alice", 50.0).await;
        fx.ledgered("alice", 60.0).await;
        fx.ledgered("alice", 55.0).await;
        fx.ledgered("bob", 40.0).await;

        let report = fx
            .controller()
            .rebuild(&LeaderboardId::Global, RebuildMode::FullReplace)
            .await
            .unwrap();
        assert_eq!(report.scanned, 2);

        let top = fx.store.top_range(&LeaderboardId::Global, 0, 10).await.unwrap();
        assert_eq!(top[0].entrant_id, "alice");
        assert_eq!(top[0].standing.key.value(), 2.0);
        assert_eq!(top[1].entrant_id, "bob");
        assert_eq!(top[1].standing.key.value(), 1.0);
    }

    #[tokio::test]
    async fn verify_reports_without_mutating() {
        let fx = fixture(ScoringPolicy::HigherIsBetter);
        fx.ledgered("alice", 100.0).await;
        fx.ledgered("bob", 90.0).await;

        // alice drifted, bob missing entirely
        let wrong = Standing {
            key: normalize(10.0, ScoringPolicy::HigherIsBetter).unwrap(),
            achieved_at: Utc::now(),
        };
        fx.store.upsert(&fx.board, "alice", wrong).await.unwrap();

        let report = fx.controller().verify(&fx.board).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.drift, 1);
        assert_eq!(report.missing, 1);

        // Nothing was corrected
        let standing = fx.store.standing(&fx.board, "alice").await.unwrap().unwrap();
        assert_eq!(standing, wrong);
        assert!(fx.store.standing(&fx.board, "bob").await.unwrap().is_none());
    }
}
