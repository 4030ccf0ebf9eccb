// Secrets Engine — Vault
//
// Orchestrates the storage directory, master key, row store, integrity seal,
// and in-memory name index. Names and values are encrypted per entry; lookup
// goes through the blind name hash so the database never sees a plaintext
// name. The index is the sole source of truth for `keys()` and `len()`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::crypto::{self, MasterKey, IV_LEN, SALT_LEN};
use crate::error::{Error, Result};
use crate::fsguard;
use crate::identity;
use crate::paths;
use crate::pattern::GlobMatcher;
use crate::seal;
use crate::store::SecretRepository;

/// How long to let the OS release lingering handles on the WAL/SHM sidecar
/// files before the storage directory is removed.
const DESTROY_SETTLE: Duration = Duration::from_millis(150);

/// Where the store lives when no explicit path is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Platform config root: `$XDG_CONFIG_HOME`/`~/.config` (POSIX) or
    /// `%APPDATA%` (Windows), plus `secrets-engine/`.
    Xdg,
    /// `$HOME/.secrets-engine`.
    Home,
}

/// Options for [`Vault::open`]. An explicit `path` wins over `location`.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub path: Option<PathBuf>,
    pub location: Option<Location>,
}

impl OpenOptions {
    /// Open at an explicit directory.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            location: None,
        }
    }

    /// Open at a well-known location.
    pub fn in_location(location: Location) -> Self {
        Self {
            path: None,
            location: Some(location),
        }
    }
}

/// An open secret store bound to this machine.
///
/// Not safe for concurrent use from multiple threads; callers that need
/// parallelism must serialize externally. Calling any operation other than
/// `close`, `destroy`, or `storage_path` after `close()` panics.
pub struct Vault {
    dir: PathBuf,
    master_key: MasterKey,
    salt_hex: String,
    repo: Option<SecretRepository>,
    /// key_hash → plaintext name, built on open by decrypting every key_enc.
    index: HashMap<String, String>,
    closed: bool,
}

impl Vault {
    /// Open (or create) a store.
    ///
    /// A store is new only when no meta.json exists in the resolved
    /// directory. A meta.json that is present but unparseable is corruption,
    /// never a fresh store: regenerating the salt would orphan every
    /// existing row. An existing store's salt is reused and its integrity
    /// seal verified before any entry is served.
    pub fn open(options: OpenOptions) -> Result<Self> {
        let dir = paths::resolve(&options)?;

        fsguard::ensure_dir(&dir)?;
        let keyfile = fsguard::ensure_keyfile(&dir)?;
        let raw_meta = fsguard::read_meta(&dir)?;

        let existing: Option<seal::MetaDocument> = match raw_meta.as_deref() {
            None => None,
            Some(raw) => Some(serde_json::from_str(raw).map_err(|_| {
                Error::Integrity("metadata file corrupted".to_string())
            })?),
        };

        let (salt, salt_hex, is_new) = match &existing {
            Some(meta) => {
                let bytes = hex::decode(&meta.salt)
                    .map_err(|_| Error::Integrity("metadata file corrupted".to_string()))?;
                let salt: [u8; SALT_LEN] = bytes
                    .try_into()
                    .map_err(|_| Error::Integrity("metadata file corrupted".to_string()))?;
                (salt, meta.salt.clone(), false)
            }
            None => {
                let salt = crypto::random_bytes::<SALT_LEN>();
                (salt, hex::encode(salt), true)
            }
        };

        let machine_id = identity::machine_identity();
        let master_key = crypto::derive_master_key(&machine_id, &keyfile, &salt)?;

        let repo = SecretRepository::open(&dir)?;
        let index = match Self::finish_open(&repo, &master_key, &dir, &salt_hex, is_new) {
            Ok(index) => index,
            Err(e) => {
                let _ = repo.close();
                return Err(e);
            }
        };

        Ok(Self {
            dir,
            master_key,
            salt_hex,
            repo: Some(repo),
            index,
            closed: false,
        })
    }

    /// Verify an existing store, build the name index, and seal a new store.
    fn finish_open(
        repo: &SecretRepository,
        master_key: &MasterKey,
        dir: &Path,
        salt_hex: &str,
        is_new: bool,
    ) -> Result<HashMap<String, String>> {
        if !is_new {
            seal::verify(repo, master_key.as_slice(), dir)?;
        }

        let mut index = HashMap::new();
        for row in repo.find_all()? {
            if row.key_enc.len() <= IV_LEN {
                tracing::warn!(
                    key_hash = short_hash(&row.key_hash),
                    "skipping entry with malformed encrypted name"
                );
                continue;
            }
            let (iv, ciphertext) = row.key_enc.split_at(IV_LEN);
            match crypto::decrypt(master_key, iv, ciphertext, Some(&row.key_hash)) {
                Ok(name) => {
                    index.insert(row.key_hash, name);
                }
                Err(e) => {
                    tracing::warn!(
                        key_hash = short_hash(&row.key_hash),
                        "skipping undecryptable entry: {e}"
                    );
                }
            }
        }

        if is_new {
            seal::update(repo, master_key.as_slice(), dir, salt_hex)?;
            tracing::info!(dir = %dir.display(), "secret store created");
        }

        Ok(index)
    }

    /// Decrypted value for `name`, or `None` if absent.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        self.assert_open();
        let key_hash = self.hash_name(name);

        let Some(row) = self.repo().find_by_hash(&key_hash)? else {
            return Ok(None);
        };

        let value = crypto::decrypt(&self.master_key, &row.iv, &row.cipher, Some(&row.key_hash))?;
        Ok(Some(value))
    }

    /// As [`get`](Self::get), but an absent name is an error.
    pub fn get_required(&self, name: &str) -> Result<String> {
        self.get(name)?
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))
    }

    /// Insert or overwrite a secret and re-seal the database file.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        self.assert_open();
        let key_hash = self.hash_name(name);

        let (name_iv, name_ct) = crypto::encrypt(&self.master_key, name)?;
        let (value_iv, value_ct) = crypto::encrypt(&self.master_key, value)?;

        let mut key_enc = Vec::with_capacity(IV_LEN + name_ct.len());
        key_enc.extend_from_slice(&name_iv);
        key_enc.extend_from_slice(&name_ct);

        self.repo().upsert(&key_hash, &key_enc, &value_iv, &value_ct)?;
        self.index.insert(key_hash.clone(), name.to_string());
        seal::update(self.repo(), self.master_key.as_slice(), &self.dir, &self.salt_hex)?;

        tracing::debug!(key_hash = short_hash(&key_hash), "secret stored");
        Ok(())
    }

    /// Whether `name` exists. Pure in-memory lookup; no row fetch, no
    /// decryption.
    pub fn has(&self, name: &str) -> bool {
        self.assert_open();
        self.index.contains_key(&self.hash_name(name))
    }

    /// Remove a secret. Returns true iff it existed.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        self.assert_open();
        let key_hash = self.hash_name(name);

        let removed = self.repo().delete_by_hash(&key_hash)?;
        if removed {
            self.index.remove(&key_hash);
            seal::update(self.repo(), self.master_key.as_slice(), &self.dir, &self.salt_hex)?;
            tracing::debug!(key_hash = short_hash(&key_hash), "secret deleted");
        }

        Ok(removed)
    }

    /// All names, optionally filtered by a glob pattern, sorted ascending by
    /// code point.
    pub fn keys(&self, pattern: Option<&str>) -> Vec<String> {
        self.assert_open();

        let mut names: Vec<String> = match pattern {
            Some(pattern) => {
                let matcher = GlobMatcher::new(pattern);
                self.index
                    .values()
                    .filter(|name| matcher.matches(name))
                    .cloned()
                    .collect()
            }
            None => self.index.values().cloned().collect(),
        };
        names.sort_unstable();
        names
    }

    /// Number of stored secrets.
    pub fn len(&self) -> usize {
        self.assert_open();
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The resolved storage directory. Callable after close.
    pub fn storage_path(&self) -> &Path {
        &self.dir
    }

    /// Checkpoint, re-seal so the seal matches the main file with an empty
    /// WAL, and release the database. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let mut result = Ok(());
        if let Some(repo) = self.repo.take() {
            result = seal::update_checkpointed(
                &repo,
                self.master_key.as_slice(),
                &self.dir,
                &self.salt_hex,
            );
            let close_result = repo.close();
            if result.is_ok() {
                result = close_result;
            }
        }

        self.index.clear();
        self.closed = true;
        tracing::debug!(dir = %self.dir.display(), "store closed");
        result
    }

    /// Close the store and delete the storage directory and everything in
    /// it. Retries removal on busy/permission errors since the OS may hold
    /// the WAL/SHM sidecars briefly after close.
    pub fn destroy(mut self) -> Result<()> {
        if let Some(repo) = self.repo.take() {
            repo.checkpoint()?;
            repo.close()?;
        }
        self.index.clear();
        self.closed = true;

        thread::sleep(DESTROY_SETTLE);
        fsguard::remove_dir_retrying(&self.dir)?;

        tracing::info!(dir = %self.dir.display(), "secret store destroyed");
        Ok(())
    }

    fn hash_name(&self, name: &str) -> String {
        crypto::hmac_hex(self.master_key.as_slice(), name.as_bytes())
    }

    fn repo(&self) -> &SecretRepository {
        self.repo.as_ref().expect("open vault has a live store")
    }

    fn assert_open(&self) {
        assert!(!self.closed, "instance is closed");
    }
}

/// Never reveals key material.
impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("dir", &self.dir)
            .field("master_key", &"[REDACTED]")
            .field("entries", &self.index.len())
            .field("closed", &self.closed)
            .finish()
    }
}

fn short_hash(key_hash: &str) -> &str {
    &key_hash[..key_hash.len().min(16)]
}

// ─── Tests ───────────────────────────────────────────────────────────────────
