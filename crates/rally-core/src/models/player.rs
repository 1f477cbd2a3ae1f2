//! Player model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Syncable;
use crate::identity::DeviceIdentity;

/// A unique identifier for a player, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Create a new unique player ID using UUID v7
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

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A player profile
///
/// A player starts life as a local-only record scoped to the device that
/// created it. Once linked to a remote account (`account_id` set) it becomes
/// eligible for push. `merged_into` marks a duplicate profile that has been
/// folded into a canonical one; the record stays in place so matches and
/// games that reference it remain valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Unique identifier
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Remote account this player is linked to, if any
    pub account_id: Option<String>,
    /// Device that created this profile
    pub device_id: String,
    /// Canonical player this duplicate was merged into, if any
    pub merged_into: Option<PlayerId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last local mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Remote acknowledgment flag (replica-local, never sent over the wire)
    #[serde(skip_serializing, default)]
    pub synced: bool,
}

impl Player {
    /// Create a new, unlinked player profile on the given device
    #[must_use]
    pub fn new(name: impl Into<String>, device: &DeviceIdentity) -> Self {
        let now = crate::util::now();
        Self {
            id: PlayerId::new(),
            name: name.into(),
            account_id: None,
            device_id: device.as_str().to_string(),
            merged_into: None,
            created_at: now,
            updated_at: now,
            synced: false,
        }
    }

    /// A player with no linked remote account never leaves the device
    #[must_use]
    pub const fn is_local_only(&self) -> bool {
        self.account_id.is_none()
    }

    /// Whether this profile has been folded into another one
    #[must_use]
    pub const fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }
}

impl Syncable for Player {
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

    fn push_eligible(&self, _device: &DeviceIdentity) -> bool {
        // Local-only profiles have no canonical remote identity yet.
        !self.is_local_only()
    }
}
