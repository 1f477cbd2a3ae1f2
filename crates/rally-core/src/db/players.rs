//! Player repository implementation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;
use crate::models::{Player, PlayerId};
use crate::util::format_timestamp;

use super::{timestamp_column, Database, SyncStore};

/// Trait for player storage operations
pub trait PlayerRepository: SyncStore<Player> {
    /// Create a new local-only player profile
    fn create(&self, name: &str, device: &DeviceIdentity) -> Result<Player>;

    /// List active players (excluding merged duplicates), newest first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Player>>;

    /// List every profile, merged duplicates included, newest first
    ///
    /// Merged records are hidden from active views but must stay
    /// addressable, matches and games still reference them.
    fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<Player>>;

    /// Rename a player
    fn rename(&self, id: &PlayerId, name: &str) -> Result<Player>;

    /// Link a player to a remote account, making it push-eligible
    fn link_account(&self, id: &PlayerId, account_id: &str) -> Result<Player>;

    /// Fold a duplicate profile into a canonical one
    ///
    /// The merged record stays in place so matches and games that reference
    /// it remain valid; it is only excluded from active listings.
    fn merge(&self, id: &PlayerId, into: &PlayerId) -> Result<Player>;
}

/// SQLite implementation of [`PlayerRepository`]
pub struct SqlitePlayerRepository {
    db: Arc<Database>,
}

impl SqlitePlayerRepository {
    /// Create a new repository over the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn parse_player(row: &Row<'_>) -> rusqlite::Result<Player> {
        let id: String = row.get(0)?;
        let merged_into: Option<String> = row.get(4)?;
        Ok(Player {
            id: id.parse().unwrap_or_default(),
            name: row.get(1)?,
            account_id: row.get(2)?,
            device_id: row.get(3)?,
            merged_into: merged_into.and_then(|raw| raw.parse().ok()),
            created_at: timestamp_column(row, 5)?,
            updated_at: timestamp_column(row, 6)?,
            synced: row.get::<_, i32>(7)? != 0,
        })
    }

    fn get_required(&self, id: &PlayerId) -> Result<Player> {
        self.get(&id.as_str())?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

const SELECT_COLUMNS: &str =
    "id, name, account_id, device_id, merged_into, created_at, updated_at, synced";

impl PlayerRepository for SqlitePlayerRepository {
    fn create(&self, name: &str, device: &DeviceIdentity) -> Result<Player> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Player name cannot be empty".into()));
        }

        let player = Player::new(name, device);
        self.put(&player)?;
        Ok(player)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Player>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM players
             WHERE merged_into IS NULL
             ORDER BY created_at DESC
             LIMIT ? OFFSET ?"
        ))?;

        let players = stmt
            .query_map(
                params![limit as i64, offset as i64],
                Self::parse_player,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(players)
    }

    fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<Player>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM players
             ORDER BY created_at DESC
             LIMIT ? OFFSET ?"
        ))?;

        let players = stmt
            .query_map(
                params![limit as i64, offset as i64],
                Self::parse_player,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(players)
    }

    fn rename(&self, id: &PlayerId, name: &str) -> Result<Player> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Player name cannot be empty".into()));
        }

        let now = format_timestamp(crate::util::now());
        let rows = self.db.connection()?.execute(
            "UPDATE players SET name = ?, updated_at = ?, synced = 0 WHERE id = ?",
            params![name, now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get_required(id)
    }

    fn link_account(&self, id: &PlayerId, account_id: &str) -> Result<Player> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(Error::InvalidInput("Account id cannot be empty".into()));
        }

        let now = format_timestamp(crate::util::now());
        let rows = self.db.connection()?.execute(
            "UPDATE players SET account_id = ?, updated_at = ?, synced = 0 WHERE id = ?",
            params![account_id, now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get_required(id)
    }

    fn merge(&self, id: &PlayerId, into: &PlayerId) -> Result<Player> {
        if id == into {
            return Err(Error::InvalidInput(
                "Cannot merge a player into itself".into(),
            ));
        }
        // The canonical side must exist
        self.get_required(into)?;

        let now = format_timestamp(crate::util::now());
        let rows = self.db.connection()?.execute(
            "UPDATE players SET merged_into = ?, updated_at = ?, synced = 0 WHERE id = ?",
            params![into.as_str(), now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get_required(id)
    }
}

impl SyncStore<Player> for SqlitePlayerRepository {
    fn get(&self, id: &str) -> Result<Option<Player>> {
        let conn = self.db.connection()?;
        let result = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM players WHERE id = ?"),
            params![id],
            Self::parse_player,
        );

        match result {
            Ok(player) => Ok(Some(player)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, record: &Player) -> Result<()> {
        self.db.connection()?.execute(
            "INSERT OR REPLACE INTO players
             (id, name, account_id, device_id, merged_into, created_at, updated_at, synced)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.as_str(),
                record.name,
                record.account_id,
                record.device_id,
                record.merged_into.map(|id| id.as_str()),
                format_timestamp(record.created_at),
                format_timestamp(record.updated_at),
                i32::from(record.synced),
            ],
        )?;
        Ok(())
    }

    fn mark_synced(&self, id: &str, version: DateTime<Utc>) -> Result<()> {
        self.db.connection()?.execute(
            "UPDATE players SET synced = 1 WHERE id = ? AND updated_at = ?",
            params![id, format_timestamp(version)],
        )?;
        Ok(())
    }

    fn unsynced(&self) -> Result<Vec<Player>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM players
             WHERE synced = 0
             ORDER BY updated_at ASC"
        ))?;

        let players = stmt
            .query_map([], Self::parse_player)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(players)
    }

    fn count_unsynced(&self) -> Result<usize> {
        let count: i64 = self.db.connection()?.query_row(
            "SELECT COUNT(*) FROM players WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SqlitePlayerRepository, DeviceIdentity) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (SqlitePlayerRepository::new(db), DeviceIdentity::generate())
    }

    #[test]
    fn test_create_and_get() {
        let (repo, device) = setup();

        let player = repo.create("Ada", &device).unwrap();
        assert_eq!(player.name, "Ada");
        assert!(!player.synced);

        let fetched = repo.get(&player.id.as_str()).unwrap().unwrap();
        assert_eq!(fetched, player);
    }

    #[test]
    fn test_create_rejects_blank_name() {
        let (repo, device) = setup();
        assert!(repo.create("   ", &device).is_err());
    }

    #[test]
    fn test_rename_marks_unsynced() {
        let (repo, device) = setup();
        let player = repo.create("Ada", &device).unwrap();
        repo.mark_synced(&player.id.as_str(), player.updated_at)
            .unwrap();

        let renamed = repo.rename(&player.id, "Ada L.").unwrap();
        assert_eq!(renamed.name, "Ada L.");
        assert!(!renamed.synced);
        assert!(renamed.updated_at >= player.updated_at);
    }

    #[test]
    fn test_link_account_makes_player_push_eligible() {
        let (repo, device) = setup();
        let player = repo.create("Ada", &device).unwrap();
        assert!(player.is_local_only());

        let linked = repo.link_account(&player.id, "acct-9").unwrap();
        assert_eq!(linked.account_id.as_deref(), Some("acct-9"));
        assert!(!linked.synced);
    }

    #[test]
    fn test_merge_excludes_from_list_but_keeps_record() {
        let (repo, device) = setup();
        let canonical = repo.create("Ada", &device).unwrap();
        let duplicate = repo.create("Ada Lovelace", &device).unwrap();

        let merged = repo.merge(&duplicate.id, &canonical.id).unwrap();
        assert_eq!(merged.merged_into, Some(canonical.id));

        let listed = repo.list(10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, canonical.id);

        // Still fetchable by id so match and game references stay valid
        assert!(repo.get(&duplicate.id.as_str()).unwrap().is_some());

        // And still visible in the unfiltered listing
        let everyone = repo.list_all(10, 0).unwrap();
        assert_eq!(everyone.len(), 2);
        assert!(everyone.iter().any(|player| player.id == duplicate.id));
    }

    #[test]
    fn test_merge_rejects_self_and_missing_canonical() {
        let (repo, device) = setup();
        let player = repo.create("Ada", &device).unwrap();

        assert!(repo.merge(&player.id, &player.id).is_err());
        assert!(repo.merge(&player.id, &PlayerId::new()).is_err());
    }

    #[test]
    fn test_mark_synced_is_version_guarded() {
        let (repo, device) = setup();
        let player = repo.create("Ada", &device).unwrap();

        // A newer edit landed while the push was in flight
        let renamed = repo.rename(&player.id, "Ada L.").unwrap();
        repo.mark_synced(&player.id.as_str(), player.updated_at)
            .unwrap();

        let current = repo.get(&player.id.as_str()).unwrap().unwrap();
        assert!(!current.synced, "stale acknowledgment must not stick");

        repo.mark_synced(&player.id.as_str(), renamed.updated_at)
            .unwrap();
        assert!(repo.get(&player.id.as_str()).unwrap().unwrap().synced);
    }

    #[test]
    fn test_unsynced_and_count() {
        let (repo, device) = setup();
        let a = repo.create("Ada", &device).unwrap();
        let b = repo.create("Bea", &device).unwrap();
        assert_eq!(repo.count_unsynced().unwrap(), 2);

        repo.mark_synced(&a.id.as_str(), a.updated_at).unwrap();
        let pending = repo.unsynced().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(repo.count_unsynced().unwrap(), 1);
    }
}
