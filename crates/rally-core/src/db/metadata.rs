//! Sync metadata repository implementation
//!
//! A durable key/value map holding the per-entity pull watermarks, the
//! engine-wide `lastSynced` stamp, and the device identity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::Result;
use crate::util::{format_timestamp, parse_timestamp};

use super::Database;

/// Recognized metadata keys
pub mod keys {
    /// Completion time of the most recent engine cycle
    pub const LAST_SYNCED: &str = "lastSynced";
    /// Pull watermark for player profiles
    pub const LAST_PLAYER_SYNC: &str = "lastPlayerSync";
    /// Pull watermark for matches
    pub const LAST_MATCH_SYNC: &str = "lastMatchSync";
    /// Pull watermark for game results
    pub const LAST_GAME_SYNC: &str = "lastGameSync";
    /// Stable per-installation device identifier
    pub const DEVICE_ID: &str = "deviceId";
}

/// Trait for sync metadata storage operations
pub trait MetadataStore: Send + Sync {
    /// Read a metadata value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a metadata value
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Read a watermark as a timestamp
    fn watermark(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(parse_timestamp(&raw)?)),
            None => Ok(None),
        }
    }

    /// Advance a watermark, never moving it backwards
    fn advance_watermark(&self, key: &str, to: DateTime<Utc>) -> Result<()> {
        if let Some(current) = self.watermark(key)? {
            if to <= current {
                return Ok(());
            }
        }
        self.put(key, &format_timestamp(to))
    }
}

/// SQLite implementation of [`MetadataStore`] over the `sync_meta` table
pub struct SqliteMetadataStore {
    db: Arc<Database>,
}

impl SqliteMetadataStore {
    /// Create a new store over the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.connection()?;
        let result = conn.query_row(
            "SELECT value FROM sync_meta WHERE key = ?",
            params![key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.db.connection()?.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }
}
