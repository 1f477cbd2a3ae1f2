//! Match repository implementation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::models::{Match, MatchId, PlayerId};
use crate::util::format_timestamp;

use super::{timestamp_column, Database, SyncStore};

/// Trait for match storage operations
pub trait MatchRepository: SyncStore<Match> {
    /// Create a new in-progress match
    fn create(&self, home_player: &PlayerId, away_player: &PlayerId) -> Result<Match>;

    /// List matches, most recently started first
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Match>>;

    /// Mark a match as completed
    fn complete(&self, id: &MatchId) -> Result<Match>;
}

/// SQLite implementation of [`MatchRepository`]
pub struct SqliteMatchRepository {
    db: Arc<Database>,
}

impl SqliteMatchRepository {
    /// Create a new repository over the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn parse_match(row: &Row<'_>) -> rusqlite::Result<Match> {
        let id: String = row.get(0)?;
        let home: String = row.get(1)?;
        let away: String = row.get(2)?;
        Ok(Match {
            id: id.parse().unwrap_or_default(),
            home_player: home.parse().unwrap_or_default(),
            away_player: away.parse().unwrap_or_default(),
            started_at: timestamp_column(row, 3)?,
            completed: row.get::<_, i32>(4)? != 0,
            updated_at: timestamp_column(row, 5)?,
            synced: row.get::<_, i32>(6)? != 0,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, home_player, away_player, started_at, completed, updated_at, synced";

impl MatchRepository for SqliteMatchRepository {
    fn create(&self, home_player: &PlayerId, away_player: &PlayerId) -> Result<Match> {
        if home_player == away_player {
            return Err(Error::InvalidInput(
                "A match needs two distinct players".into(),
            ));
        }

        let game_match = Match::new(*home_player, *away_player);
        self.put(&game_match)?;
        Ok(game_match)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<Match>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM matches
             ORDER BY started_at DESC
             LIMIT ? OFFSET ?"
        ))?;

        let matches = stmt
            .query_map(params![limit as i64, offset as i64], Self::parse_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(matches)
    }

    fn complete(&self, id: &MatchId) -> Result<Match> {
        let now = format_timestamp(crate::util::now());
        let rows = self.db.connection()?.execute(
            "UPDATE matches SET completed = 1, updated_at = ?, synced = 0 WHERE id = ?",
            params![now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(&id.as_str())?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

impl SyncStore<Match> for SqliteMatchRepository {
    fn get(&self, id: &str) -> Result<Option<Match>> {
        let conn = self.db.connection()?;
        let result = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM matches WHERE id = ?"),
            params![id],
            Self::parse_match,
        );

        match result {
            Ok(game_match) => Ok(Some(game_match)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, record: &Match) -> Result<()> {
        self.db.connection()?.execute(
            "INSERT OR REPLACE INTO matches
             (id, home_player, away_player, started_at, completed, updated_at, synced)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.as_str(),
                record.home_player.as_str(),
                record.away_player.as_str(),
                format_timestamp(record.started_at),
                i32::from(record.completed),
                format_timestamp(record.updated_at),
                i32::from(record.synced),
            ],
        )?;
        Ok(())
    }

    fn mark_synced(&self, id: &str, version: DateTime<Utc>) -> Result<()> {
        self.db.connection()?.execute(
            "UPDATE matches SET synced = 1 WHERE id = ? AND updated_at = ?",
            params![id, format_timestamp(version)],
        )?;
        Ok(())
    }

    fn unsynced(&self) -> Result<Vec<Match>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM matches
             WHERE synced = 0
             ORDER BY updated_at ASC"
        ))?;

        let matches = stmt
            .query_map([], Self::parse_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(matches)
    }

    fn count_unsynced(&self) -> Result<usize> {
        let count: i64 = self.db.connection()?.query_row(
            "SELECT COUNT(*) FROM matches WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PlayerRepository, SqlitePlayerRepository};
    use crate::identity::DeviceIdentity;

    fn setup() -> (SqliteMatchRepository, PlayerId, PlayerId) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let players = SqlitePlayerRepository::new(db.clone());
        let device = DeviceIdentity::generate();
        let home = players.create("Home", &device).unwrap();
        let away = players.create("Away", &device).unwrap();
        (SqliteMatchRepository::new(db), home.id, away.id)
    }

    #[test]
    fn test_create_and_get() {
        let (repo, home, away) = setup();

        let game_match = repo.create(&home, &away).unwrap();
        assert!(!game_match.synced);

        let fetched = repo.get(&game_match.id.as_str()).unwrap().unwrap();
        assert_eq!(fetched, game_match);
    }

    #[test]
    fn test_create_rejects_same_player_twice() {
        let (repo, home, _) = setup();
        assert!(repo.create(&home, &home).is_err());
    }

    #[test]
    fn test_complete_marks_unsynced() {
        let (repo, home, away) = setup();
        let game_match = repo.create(&home, &away).unwrap();
        repo.mark_synced(&game_match.id.as_str(), game_match.updated_at)
            .unwrap();

        let completed = repo.complete(&game_match.id).unwrap();
        assert!(completed.completed);
        assert!(!completed.synced);
    }

    #[test]
    fn test_list_orders_by_start_time_desc() {
        let (repo, home, away) = setup();
        let first = repo.create(&home, &away).unwrap();
        let second = repo.create(&away, &home).unwrap();

        let listed = repo.list(10, 0).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].started_at >= listed[1].started_at);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn test_unsynced_count() {
        let (repo, home, away) = setup();
        let game_match = repo.create(&home, &away).unwrap();
        assert_eq!(repo.count_unsynced().unwrap(), 1);

        repo.mark_synced(&game_match.id.as_str(), game_match.updated_at)
            .unwrap();
        assert_eq!(repo.count_unsynced().unwrap(), 0);
        assert!(repo.unsynced().unwrap().is_empty());
    }
}
