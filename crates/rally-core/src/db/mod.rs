//! Local store layer for Rally
//!
//! One repository per entity type over a shared [`Database`]. Each repository
//! exposes its domain operations plus the [`SyncStore`] surface the sync
//! adapters run against: unsynced selection, full upsert, and the
//! mark-synced acknowledgment write.

mod connection;
mod games;
mod matches;
mod metadata;
mod migrations;
mod players;

pub use connection::Database;
pub use games::{GameRepository, SqliteGameRepository};
pub use matches::{MatchRepository, SqliteMatchRepository};
pub use metadata::{keys, MetadataStore, SqliteMetadataStore};
pub use players::{PlayerRepository, SqlitePlayerRepository};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

use crate::error::Result;
use crate::models::Syncable;

/// The per-entity local store surface consumed by the sync adapters.
///
/// All writes here uphold the replica invariant: locally mutated records are
/// stored with `synced = false`; only [`SyncStore::mark_synced`] (after a
/// remote acknowledgment) and pull-phase inserts flip the flag to `true`.
pub trait SyncStore<T: Syncable>: Send + Sync {
    /// Fetch a record by its cross-device id, merged or not.
    fn get(&self, id: &str) -> Result<Option<T>>;

    /// Insert or fully replace a record, including its `synced` flag.
    fn put(&self, record: &T) -> Result<()>;

    /// Flip `synced` to true for the given id, touching no other field.
    ///
    /// The write is guarded on `version` (the pushed record's `updated_at`):
    /// if the row was edited again while the push was in flight, the newer
    /// version stays unsynced and is retried next cycle.
    fn mark_synced(&self, id: &str, version: DateTime<Utc>) -> Result<()>;

    /// All records with `synced = false`, oldest mutation first.
    fn unsynced(&self) -> Result<Vec<T>>;

    /// Number of records with `synced = false`.
    fn count_unsynced(&self) -> Result<usize>;
}

/// Parse an RFC-3339 TEXT column into a UTC timestamp.
pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
