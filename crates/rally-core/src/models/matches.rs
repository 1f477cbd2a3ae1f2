//! Match model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{PlayerId, Syncable};

/// A unique identifier for a match, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(Uuid);

impl MatchId {
    /// Create a new unique match ID using UUID v7
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

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MatchId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A match between two players
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// Unique identifier
    pub id: MatchId,
    /// Home-side player
    pub home_player: PlayerId,
    /// Away-side player
    pub away_player: PlayerId,
    /// When the match started
    pub started_at: DateTime<Utc>,
    /// Whether the match has finished
    pub completed: bool,
    /// Last local mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Remote acknowledgment flag (replica-local, never sent over the wire)
    #[serde(skip_serializing, default)]
    pub synced: bool,
}

impl Match {
    /// Create a new, in-progress match starting now
    #[must_use]
    pub fn new(home_player: PlayerId, away_player: PlayerId) -> Self {
        let now = crate::util::now();
        Self {
            id: MatchId::new(),
            home_player,
            away_player,
            started_at: now,
            completed: false,
            updated_at: now,
            synced: false,
        }
    }
}

impl Syncable for Match {
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
