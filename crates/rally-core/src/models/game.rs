//! Per-game result model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{MatchId, Syncable};

/// A unique identifier for a game result, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(Uuid);

impl GameId {
    /// Create a new unique game ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GameId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The result of a single game inside a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    /// Unique identifier
    pub id: GameId,
    /// Match this game belongs to
    pub match_id: MatchId,
    /// Ordinal of the game within the match (1-based)
    pub game_number: u32,
    /// Points scored by the home-side player
    pub home_score: u32,
    /// Points scored by the away-side player
    pub away_score: u32,
    /// Last local mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Remote acknowledgment flag (replica-local, never sent over the wire)
    #[serde(skip_serializing, default)]
    pub synced: bool,
}

impl GameResult {
    /// Record a new game result
    #[must_use]
    pub fn new(match_id: MatchId, game_number: u32, home_score: u32, away_score: u32) -> Self {
        Self {
            id: GameId::new(),
            match_id,
            game_number,
            home_score,
            away_score,
            updated_at: crate::util::now(),
            synced: false,
        }
    }
}

impl Syncable for GameResult {
    fn record_id(&self) -> String {
        self.id.as_str()
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    fn set_synced(&mut self, synced: bool) {
        self.synced = synced;
    }
}
