// Secrets Engine — Database management
//
// Opens the SQLite database in WAL journal mode with foreign keys on and a
// 5 s busy timeout, runs the schema DDL, and clamps the file mode. The
// connection is wrapped so checkpoint and close stay in one place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::fsguard;

/// Name of the main database file inside the storage directory.
pub const DB_FILE_NAME: &str = "store.db";

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Wrapper around the store's SQLite connection.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the database inside the given storage directory.
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&path)?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            return Err(Error::Initialization(format!(
                "could not enable WAL journal mode (got {mode})"
            )));
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self { conn, path };
        db.init_schema()?;
        fsguard::restrict_db_mode(&db.path)?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS secrets (
                key_hash    TEXT PRIMARY KEY,
                key_enc     BLOB NOT NULL,
                iv          BLOB NOT NULL,
                cipher      BLOB NOT NULL,
                created     INTEGER NOT NULL,
                updated     INTEGER NOT NULL
            );
            ",
        )?;

        tracing::debug!("secrets schema ready");
        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Absolute path of the main database file (WAL/SHM siblings excluded).
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Force a TRUNCATE-style WAL checkpoint: all committed data lands in the
    /// main file and the WAL is emptied.
    pub fn checkpoint(&self) -> Result<()> {
        let (busy, wal_pages, moved): (i64, i64, i64) =
            self.conn
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?;

        if busy != 0 {
            return Err(Error::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                Some("wal checkpoint could not complete".to_string()),
            )));
        }

        tracing::debug!(wal_pages, moved, "wal checkpoint complete");
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_conn, e)| Error::Database(e))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
