// Secrets Engine — Secret row repository
//
// One row per secret: the blind name hash is the primary key, the encrypted
// name and value travel as IV-prefixed and IV-separated blobs. Every query
// binds parameters; no data is ever interpolated into SQL text.

use chrono::Utc;
use rusqlite::params;

use std::path::Path;

use super::db::Database;
use crate::error::{Error, Result};

/// A stored secret as it exists on disk. All fields are opaque without the
/// master key.
pub struct SecretRow {
    /// Hex HMAC-SHA256 of the plaintext name; 64 chars.
    pub key_hash: String,
    /// 12-byte IV followed by the AEAD ciphertext of the name.
    pub key_enc: Vec<u8>,
    /// 12-byte IV for the value.
    pub iv: Vec<u8>,
    /// AEAD ciphertext of the value, tag appended.
    pub cipher: Vec<u8>,
    pub created: i64,
    pub updated: i64,
}

/// CRUD operations over the secrets table, plus checkpoint/close pass-through.
pub struct SecretRepository {
    db: Database,
}

impl SecretRepository {
    /// Open the repository inside the given storage directory.
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self {
            db: Database::open(dir)?,
        })
    }

    /// Insert or update a row. A conflict on `key_hash` replaces the
    /// encrypted payload and refreshes `updated`, preserving `created`.
    pub fn upsert(&self, key_hash: &str, key_enc: &[u8], iv: &[u8], cipher: &[u8]) -> Result<()> {
        let now = Utc::now().timestamp();
        self.db.conn().execute(
            "INSERT INTO secrets (key_hash, key_enc, iv, cipher, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(key_hash) DO UPDATE SET
                 key_enc = excluded.key_enc,
                 iv = excluded.iv,
                 cipher = excluded.cipher,
                 updated = excluded.updated",
            params![key_hash, key_enc, iv, cipher, now],
        )?;
        Ok(())
    }

    pub fn find_by_hash(&self, key_hash: &str) -> Result<Option<SecretRow>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT key_hash, key_enc, iv, cipher, created, updated
             FROM secrets WHERE key_hash = ?1",
        )?;

        let mut rows = stmt.query_map(params![key_hash], Self::row_to_secret)?;

        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(Error::Database(e)),
            None => Ok(None),
        }
    }

    /// All rows, used once per open to build the in-memory name index.
    pub fn find_all(&self) -> Result<Vec<SecretRow>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT key_hash, key_enc, iv, cipher, created, updated FROM secrets",
        )?;

        let rows = stmt.query_map([], Self::row_to_secret)?;

        let mut secrets = Vec::new();
        for row in rows {
            secrets.push(row?);
        }
        Ok(secrets)
    }

    /// Delete a row by its name hash. Returns true iff a row was removed.
    pub fn delete_by_hash(&self, key_hash: &str) -> Result<bool> {
        let affected = self
            .db
            .conn()
            .execute("DELETE FROM secrets WHERE key_hash = ?1", params![key_hash])?;
        Ok(affected > 0)
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.db.checkpoint()
    }

    pub fn file_path(&self) -> &Path {
        self.db.file_path()
    }

    pub fn close(self) -> Result<()> {
        self.db.close()
    }

    fn row_to_secret(row: &rusqlite::Row<'_>) -> rusqlite::Result<SecretRow> {
        Ok(SecretRow {
            key_hash: row.get(0)?,
            key_enc: row.get(1)?,
            iv: row.get(2)?,
            cipher: row.get(3)?,
            created: row.get(4)?,
            updated: row.get(5)?,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
