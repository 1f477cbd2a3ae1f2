//! Database connection management

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

use super::migrations;

/// Database wrapper for the local SQLite replica.
///
/// The connection sits behind a mutex so repositories can be shared across
/// concurrently running sync adapters. Statements here are short synchronous
/// sections; the guard is never held across an await point.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::prepare(conn)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        let database = Self {
            conn: Mutex::new(conn),
        };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure SQLite for optimal performance
    fn configure(&self) -> Result<()> {
        let conn = self.connection()?;
        // WAL fails on some in-memory/readonly setups; not fatal
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.pragma_update(None, "cache_size", 10000).ok();
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&*self.connection()?)
    }

    /// Lock and return the underlying connection
    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("connection lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.connection().unwrap();
        let value: i32 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(value, 1);
    }

    #[test]
    fn test_open_creates_file_and_reopens() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("rally.db");

        {
            let db = Database::open(&path).unwrap();
            db.connection()
                .unwrap()
                .execute(
                    "INSERT INTO sync_meta (key, value) VALUES ('probe', 'ok')",
                    [],
                )
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let value: String = db
            .connection()
            .unwrap()
            .query_row("SELECT value FROM sync_meta WHERE key = 'probe'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(value, "ok");
    }
}
