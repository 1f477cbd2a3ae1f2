//! Game result repository implementation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::models::{GameId, GameResult, MatchId};
use crate::util::format_timestamp;

use super::{timestamp_column, Database, SyncStore};

/// Trait for per-game result storage operations
pub trait GameRepository: SyncStore<GameResult> {
    /// Record the result of one game inside a match
    fn record(
        &self,
        match_id: &MatchId,
        game_number: u32,
        home_score: u32,
        away_score: u32,
    ) -> Result<GameResult>;

    /// List a match's games in play order
    fn list_for_match(&self, match_id: &MatchId) -> Result<Vec<GameResult>>;

    /// Correct the scores of an already-recorded game
    fn correct_scores(&self, id: &GameId, home_score: u32, away_score: u32) -> Result<GameResult>;
}

/// SQLite implementation of [`GameRepository`]
pub struct SqliteGameRepository {
    db: Arc<Database>,
}

impl SqliteGameRepository {
    /// Create a new repository over the given database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn parse_game(row: &Row<'_>) -> rusqlite::Result<GameResult> {
        let id: String = row.get(0)?;
        let match_id: String = row.get(1)?;
        Ok(GameResult {
            id: id.parse().unwrap_or_default(),
            match_id: match_id.parse().unwrap_or_default(),
            game_number: row.get(2)?,
            home_score: row.get(3)?,
            away_score: row.get(4)?,
            updated_at: timestamp_column(row, 5)?,
            synced: row.get::<_, i32>(6)? != 0,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, match_id, game_number, home_score, away_score, updated_at, synced";

impl GameRepository for SqliteGameRepository {
    fn record(
        &self,
        match_id: &MatchId,
        game_number: u32,
        home_score: u32,
        away_score: u32,
    ) -> Result<GameResult> {
        if game_number == 0 {
            return Err(Error::InvalidInput("Game numbers start at 1".into()));
        }

        // put() replaces on conflict, so duplicate ordinals must be caught here
        let exists: bool = self.db.connection()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM games WHERE match_id = ? AND game_number = ?)",
            params![match_id.as_str(), game_number],
            |row| row.get::<_, i32>(0).map(|v| v != 0),
        )?;
        if exists {
            return Err(Error::InvalidInput(format!(
                "Game {game_number} is already recorded for this match"
            )));
        }

        let game = GameResult::new(*match_id, game_number, home_score, away_score);
        self.put(&game)?;
        Ok(game)
    }

    fn list_for_match(&self, match_id: &MatchId) -> Result<Vec<GameResult>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM games
             WHERE match_id = ?
             ORDER BY game_number ASC"
        ))?;

        let games = stmt
            .query_map(params![match_id.as_str()], Self::parse_game)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(games)
    }

    fn correct_scores(&self, id: &GameId, home_score: u32, away_score: u32) -> Result<GameResult> {
        let now = format_timestamp(crate::util::now());
        let rows = self.db.connection()?.execute(
            "UPDATE games SET home_score = ?, away_score = ?, updated_at = ?, synced = 0
             WHERE id = ?",
            params![home_score, away_score, now, id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.get(&id.as_str())?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

impl SyncStore<GameResult> for SqliteGameRepository {
    fn get(&self, id: &str) -> Result<Option<GameResult>> {
        let conn = self.db.connection()?;
        let result = conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM games WHERE id = ?"),
            params![id],
            Self::parse_game,
        );

        match result {
            Ok(game) => Ok(Some(game)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, record: &GameResult) -> Result<()> {
        self.db.connection()?.execute(
            "INSERT OR REPLACE INTO games
             (id, match_id, game_number, home_score, away_score, updated_at, synced)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                record.id.as_str(),
                record.match_id.as_str(),
                record.game_number,
                record.home_score,
                record.away_score,
                format_timestamp(record.updated_at),
                i32::from(record.synced),
            ],
        )?;
        Ok(())
    }

    fn mark_synced(&self, id: &str, version: DateTime<Utc>) -> Result<()> {
        self.db.connection()?.execute(
            "UPDATE games SET synced = 1 WHERE id = ? AND updated_at = ?",
            params![id, format_timestamp(version)],
        )?;
        Ok(())
    }

    fn unsynced(&self) -> Result<Vec<GameResult>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM games
             WHERE synced = 0
             ORDER BY updated_at ASC"
        ))?;

        let games = stmt
            .query_map([], Self::parse_game)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(games)
    }

    fn count_unsynced(&self) -> Result<usize> {
        let count: i64 = self.db.connection()?.query_row(
            "SELECT COUNT(*) FROM games WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
