use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Direction of desirability for a game's raw scores.
///
/// Closed set on purpose: adding a policy means auditing the normalizer,
/// the rebuild controller and the global-aggregate proxy together.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScoringPolicy {
    /// Larger raw scores rank higher (points, distance, coins)
    HigherIsBetter,
    /// Smaller raw scores rank higher (elapsed time, strokes, penalties)
    LowerIsBetter,
}

/// A game that entrants can submit scores for. Each game owns one
/// leaderboard; the scoring policy is fixed at creation time (changing it
/// would invalidate every stored ranking key for the game).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameModel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub policy: ScoringPolicy,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl GameModel {
    /// Creates a new active game with a generated ID
    pub fn new(name: String, description: String, policy: ScoringPolicy) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            policy,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Identity of this game's leaderboard
    pub fn leaderboard(&self) -> LeaderboardId {
        LeaderboardId::Game {
            game_id: self.id.clone(),
            policy: self.policy,
        }
    }
}

/// Identity of one ranked pool of entrants: a single game's leaderboard, or
/// the cross-game global aggregate. Carries the scoring direction so the
/// normalizer, the ranking store and the rebuild controller always agree on
/// how keys for this pool are ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaderboardId {
    Game {
        game_id: String,
        policy: ScoringPolicy,
    },
    /// Ranks entrants by personal-best count; always higher-is-better
    Global,
}

impl LeaderboardId {
    pub fn policy(&self) -> ScoringPolicy {
        match self {
            LeaderboardId::Game { policy, .. } => *policy,
            LeaderboardId::Global => ScoringPolicy::HigherIsBetter,
        }
    }

    pub fn game_id(&self) -> Option<&str> {
        match self {
            LeaderboardId::Game { game_id, .. } => Some(game_id),
            LeaderboardId::Global => None,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, LeaderboardId::Global)
    }
}

impl fmt::Display for LeaderboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderboardId::Game { game_id, .. } => write!(f, "leaderboard:{}", game_id),
            LeaderboardId::Global => write!(f, "leaderboard:global"),
        }
    }
}
