use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;
use tracing::{debug, instrument};

use crate::game::models::LeaderboardId;
use crate::score::normalizer::RankingKey;
use crate::shared::AppError;

/// An entrant's current standing on one leaderboard: the best ranking key
/// seen so far and when it was first achieved (the tie-break timestamp).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub key: RankingKey,
    pub achieved_at: DateTime<Utc>,
}

/// One row of a range or window read. Rank is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub rank: u64,
    pub entrant_id: String,
    pub standing: Standing,
}

/// Result of the conditional upsert used by the live submit path
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// First standing for this entrant on this board
    Created,
    /// Standing replaced because the new key is strictly better
    Improved { previous: RankingKey },
    /// Existing standing is at least as good; nothing changed
    NotImproved { current: RankingKey },
}

impl UpsertOutcome {
    pub fn is_personal_best(&self) -> bool {
        matches!(self, UpsertOutcome::Created | UpsertOutcome::Improved { .. })
    }
}

/// Ordered-set store of standings, one pool per leaderboard identity.
///
/// Keys are normalized, so "best" is always the largest key regardless of
/// the leaderboard's scoring policy. Ties order by earlier `achieved_at`
/// (earlier achievers keep the better rank), then entrant id.
///
/// `upsert` sets unconditionally and exists for the rebuild path; the live
/// write path must go through `upsert_if_better`, which performs the
/// improvement check atomically so concurrent submissions from one entrant
/// cannot lose an update. `Unavailable` errors are always distinct from
/// absence: a missing entrant is `Ok(None)`, never an error.
#[async_trait]
pub trait RankingStore {
    /// Unconditionally sets the entrant's standing (rebuild path; callers
    /// are responsible for only supplying best-applicable records)
    async fn upsert(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        standing: Standing,
    ) -> Result<(), AppError>;

    /// Atomically replaces the entrant's standing only if the new key is a
    /// strict improvement (an equal key keeps the incumbent)
    async fn upsert_if_better(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        standing: Standing,
    ) -> Result<UpsertOutcome, AppError>;

    /// Atomically adds `delta` to the entrant's key (0 when absent),
    /// stamping `at` as the new tie-break time. Maintains counter-valued
    /// boards such as the global aggregate.
    async fn increment(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        delta: f64,
        at: DateTime<Utc>,
    ) -> Result<RankingKey, AppError>;

    async fn rank(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
    ) -> Result<Option<RankedEntry>, AppError>;

    /// Top `limit` entrants starting `offset` from the best end, read as a
    /// single consistent snapshot
    async fn top_range(
        &self,
        board: &LeaderboardId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RankedEntry>, AppError>;

    /// The entrant plus up to `above` better-ranked and `below` worse-ranked
    /// neighbors, truncated at the ends of the board. `None` when unranked.
    async fn window(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        above: u64,
        below: u64,
    ) -> Result<Option<Vec<RankedEntry>>, AppError>;

    async fn cardinality(&self, board: &LeaderboardId) -> Result<u64, AppError>;

    /// Administrative removal; returns whether the entrant was present
    async fn remove(&self, board: &LeaderboardId, entrant_id: &str) -> Result<bool, AppError>;

    /// Drops every standing on the board (full-replace rebuilds)
    async fn clear(&self, board: &LeaderboardId) -> Result<(), AppError>;

    async fn standing(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
    ) -> Result<Option<Standing>, AppError>;
}

/// Sort key of the in-memory ordered set. Iteration order is rank order:
/// largest ranking key first, then earliest achiever, then entrant id.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderKey {
    key: RankingKey,
    achieved_at: DateTime<Utc>,
    entrant_id: String,
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.achieved_at.cmp(&other.achieved_at))
            .then_with(|| self.entrant_id.cmp(&other.entrant_id))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct BoardState {
    standings: HashMap<String, Standing>,
    order: BTreeSet<OrderKey>,
}

impl BoardState {
    fn set(&mut self, entrant_id: &str, standing: Standing) {
        if let Some(previous) = self.standings.insert(entrant_id.to_string(), standing) {
            self.order.remove(&OrderKey {
                key: previous.key,
                achieved_at: previous.achieved_at,
                entrant_id: entrant_id.to_string(),
            });
        }
        self.order.insert(OrderKey {
            key: standing.key,
            achieved_at: standing.achieved_at,
            entrant_id: entrant_id.to_string(),
        });
    }

    fn position(&self, entrant_id: &str) -> Option<(usize, Standing)> {
        let standing = *self.standings.get(entrant_id)?;
        let index = self
            .order
            .iter()
            .position(|entry| entry.entrant_id == entrant_id)?;
        Some((index, standing))
    }

    fn entries(&self, skip: usize, take: usize) -> Vec<RankedEntry> {
        self.order
            .iter()
            .enumerate()
            .skip(skip)
            .take(take)
            .map(|(index, entry)| RankedEntry {
                rank: index as u64 + 1,
                entrant_id: entry.entrant_id.clone(),
                standing: Standing {
                    key: entry.key,
                    achieved_at: entry.achieved_at,
                },
            })
            .collect()
    }
}

/// In-memory implementation of RankingStore.
///
/// Each operation takes the lock exactly once, so every read sees one
/// consistent snapshot and every conditional write is atomic with respect
/// to concurrent submissions for the same entrant. No standing is ever
/// cached outside this structure.
pub struct InMemoryRankingStore {
    boards: RwLock<HashMap<LeaderboardId, BoardState>>,
}

impl Default for InMemoryRankingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRankingStore {
    /// Creates a new empty store
    pub fn new() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RankingStore for InMemoryRankingStore {
    #[instrument(skip(self, standing))]
    async fn upsert(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        standing: Standing,
    ) -> Result<(), AppError> {
        let mut boards = self.boards.write().unwrap();
        let state = boards.entry(board.clone()).or_default();
        state.set(entrant_id, standing);

        debug!(board = %board, entrant_id = %entrant_id, "Standing upserted");
        Ok(())
    }

    #[instrument(skip(self, standing))]
    async fn upsert_if_better(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        standing: Standing,
    ) -> Result<UpsertOutcome, AppError> {
        let mut boards = self.boards.write().unwrap();
        let state = boards.entry(board.clone()).or_default();

        let outcome = match state.standings.get(entrant_id).copied() {
            None => {
                state.set(entrant_id, standing);
                UpsertOutcome::Created
            }
            Some(current) if standing.key > current.key => {
                state.set(entrant_id, standing);
                UpsertOutcome::Improved {
                    previous: current.key,
                }
            }
            Some(current) => UpsertOutcome::NotImproved {
                current: current.key,
            },
        };

        debug!(
            board = %board,
            entrant_id = %entrant_id,
            personal_best = outcome.is_personal_best(),
            "Conditional upsert applied"
        );
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn increment(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        delta: f64,
        at: DateTime<Utc>,
    ) -> Result<RankingKey, AppError> {
        let mut boards = self.boards.write().unwrap();
        let state = boards.entry(board.clone()).or_default();

        let current = state
            .standings
            .get(entrant_id)
            .map(|s| s.key.value())
            .unwrap_or(0.0);
        let key = RankingKey::from_value(current + delta);
        state.set(
            entrant_id,
            Standing {
                key,
                achieved_at: at,
            },
        );

        debug!(board = %board, entrant_id = %entrant_id, value = key.value(), "Key incremented");
        Ok(key)
    }

    #[instrument(skip(self))]
    async fn rank(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
    ) -> Result<Option<RankedEntry>, AppError> {
        let boards = self.boards.read().unwrap();
        let Some(state) = boards.get(board) else {
            return Ok(None);
        };

        Ok(state.position(entrant_id).map(|(index, standing)| {
            RankedEntry {
                rank: index as u64 + 1,
                entrant_id: entrant_id.to_string(),
                standing,
            }
        }))
    }

    #[instrument(skip(self))]
    async fn top_range(
        &self,
        board: &LeaderboardId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RankedEntry>, AppError> {
        let boards = self.boards.read().unwrap();
        let Some(state) = boards.get(board) else {
            return Ok(Vec::new());
        };

        Ok(state.entries(offset as usize, limit as usize))
    }

    #[instrument(skip(self))]
    async fn window(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
        above: u64,
        below: u64,
    ) -> Result<Option<Vec<RankedEntry>>, AppError> {
        let boards = self.boards.read().unwrap();
        let Some(state) = boards.get(board) else {
            return Ok(None);
        };
        let Some((index, _)) = state.position(entrant_id) else {
            return Ok(None);
        };

        let start = index.saturating_sub(above as usize);
        let len = index - start + 1 + below as usize;
        Ok(Some(state.entries(start, len)))
    }

    #[instrument(skip(self))]
    async fn cardinality(&self, board: &LeaderboardId) -> Result<u64, AppError> {
        let boards = self.boards.read().unwrap();
        Ok(boards
            .get(board)
            .map(|state| state.standings.len() as u64)
            .unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn remove(&self, board: &LeaderboardId, entrant_id: &str) -> Result<bool, AppError> {
        let mut boards = self.boards.write().unwrap();
        let Some(state) = boards.get_mut(board) else {
            return Ok(false);
        };

        let Some(standing) = state.standings.remove(entrant_id) else {
            return Ok(false);
        };
        state.order.remove(&OrderKey {
            key: standing.key,
            achieved_at: standing.achieved_at,
            entrant_id: entrant_id.to_string(),
        });

        debug!(board = %board, entrant_id = %entrant_id, "Standing removed");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn clear(&self, board: &LeaderboardId) -> Result<(), AppError> {
        let mut boards = self.boards.write().unwrap();
        boards.remove(board);

        debug!(board = %board, "Board cleared");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn standing(
        &self,
        board: &LeaderboardId,
        entrant_id: &str,
    ) -> Result<Option<Standing>, AppError> {
        let boards = self.boards.read().unwrap();
        Ok(boards
            .get(board)
            .and_then(|state| state.standings.get(entrant_id))
            .copied())
    }
}
