// Secrets Engine — Integrity sealer
//
// The seal is HMAC-SHA256(master_key, SHA-256(file_bytes(store.db))), stored
// in meta.json next to the version tag and KDF salt. Verification forces a
// WAL checkpoint first so the main file reflects every committed write;
// steady-state updates seal the file as-is and leave the WAL alone.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::crypto;
use crate::error::{Error, Result};
use crate::fsguard;
use crate::store::SecretRepository;

/// Current metadata format version.
pub const META_VERSION: &str = "1";

/// The meta.json document. Unknown fields are ignored on read; the file is
/// written pretty-printed with 2-space indent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaDocument {
    /// Format version tag, currently `"1"`.
    pub version: String,
    /// Hex-encoded 32-byte KDF salt, fixed at store creation.
    pub salt: String,
    /// Hex-encoded seal over the current database file.
    pub integrity: String,
}

/// Compute the seal over the database file as it currently exists on disk.
pub fn compute_seal(master_key: &[u8], db_path: &Path) -> Result<[u8; 32]> {
    let file_bytes = fs::read(db_path)?;
    let digest = crypto::sha256(&file_bytes);
    Ok(crypto::hmac_sha256(master_key, &digest))
}

/// Verify the stored seal against the database file. Called on open for an
/// existing store; checkpoints the WAL first so platform- or third-party-
/// driven checkpoints between close and open cannot desynchronize the hash.
pub fn verify(repo: &SecretRepository, master_key: &[u8], dir: &Path) -> Result<()> {
    let raw = fsguard::read_meta(dir)?
        .ok_or_else(|| Error::Integrity("metadata file missing".to_string()))?;

    let meta: MetaDocument = serde_json::from_str(&raw)
        .map_err(|_| Error::Integrity("metadata file corrupted".to_string()))?;

    if meta.version != META_VERSION {
        return Err(Error::Integrity(format!(
            "unsupported metadata version {:?}",
            meta.version
        )));
    }

    repo.checkpoint()
        .map_err(|e| Error::Integrity(format!("checkpoint failed: {e}")))?;

    let computed = compute_seal(master_key, repo.file_path())?;
    let stored = hex::decode(&meta.integrity)
        .map_err(|_| Error::Integrity("metadata file corrupted".to_string()))?;

    if !bool::from(computed.as_slice().ct_eq(stored.as_slice())) {
        return Err(Error::Integrity(
            "database file does not match its seal".to_string(),
        ));
    }

    Ok(())
}

/// Re-seal after a mutation, without checkpointing: the seal covers the main
/// file bytes as they are, and the next verify checkpoints before hashing.
/// Rewrites meta.json preserving version and salt.
pub fn update(repo: &SecretRepository, master_key: &[u8], dir: &Path, salt_hex: &str) -> Result<()> {
    let seal = compute_seal(master_key, repo.file_path())?;
    let meta = MetaDocument {
        version: META_VERSION.to_string(),
        salt: salt_hex.to_string(),
        integrity: hex::encode(seal),
    };

    let contents = serde_json::to_string_pretty(&meta)
        .map_err(|e| Error::Initialization(format!("could not serialize metadata: {e}")))?;
    fsguard::write_meta(dir, &contents)
}

/// Re-seal on close: checkpoint first so the seal matches the main file with
/// an empty WAL, leaving the store verifiable whether or not anything
/// checkpoints it again before the next open.
pub fn update_checkpointed(
    repo: &SecretRepository,
    master_key: &[u8],
    dir: &Path,
    salt_hex: &str,
) -> Result<()> {
    repo.checkpoint()?;
    update(repo, master_key, dir, salt_hex)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    const KEY: [u8; 32] = [42u8; 32];
    const SALT_HEX: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    fn setup() -> (tempfile::TempDir, SecretRepository) {
        let tmp = tempfile::tempdir().unwrap();
        let repo = SecretRepository::open(tmp.path()).unwrap();
        (tmp, repo)
    }

    #[test]
    fn test_update_then_verify_roundtrip() {
        let (tmp, repo) = setup();

        update_checkpointed(&repo, &KEY, tmp.path(), SALT_HEX).unwrap();
        verify(&repo, &KEY, tmp.path()).unwrap();
    }

    #[test]
    fn test_meta_document_shape() {
        let (tmp, repo) = setup();
        update_checkpointed(&repo, &KEY, tmp.path(), SALT_HEX).unwrap();

        let raw = fsguard::read_meta(tmp.path()).unwrap().unwrap();
        let meta: MetaDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta.version, "1");
        assert_eq!(meta.salt, SALT_HEX);
        assert_eq!(meta.integrity.len(), 64);

        // pretty-printed, 2-space indent
        assert!(raw.contains("\n  \"version\""));
    }

    #[test]
    fn test_verify_missing_meta() {
        let (tmp, repo) = setup();
        let err = verify(&repo, &KEY, tmp.path()).unwrap_err();
        match err {
            Error::Integrity(msg) => assert!(msg.contains("missing")),
            other => panic!("expected Integrity, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_corrupted_meta() {
        let (tmp, repo) = setup();
        fsguard::write_meta(tmp.path(), "not json {").unwrap();

        let err = verify(&repo, &KEY, tmp.path()).unwrap_err();
        match err {
            Error::Integrity(msg) => assert!(msg.contains("corrupted")),
            other => panic!("expected Integrity, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_version_mismatch() {
        let (tmp, repo) = setup();
        update_checkpointed(&repo, &KEY, tmp.path(), SALT_HEX).unwrap();

        let raw = fsguard::read_meta(tmp.path()).unwrap().unwrap();
        fsguard::write_meta(tmp.path(), &raw.replace("\"1\"", "\"2\"")).unwrap();

        let err = verify(&repo, &KEY, tmp.path()).unwrap_err();
        assert_eq!(err.code(), "INTEGRITY_ERROR");
    }

    #[test]
    fn test_verify_detects_tampered_db_file() {
        let (tmp, repo) = setup();
        update_checkpointed(&repo, &KEY, tmp.path(), SALT_HEX).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(repo.file_path())
            .unwrap();
        file.write_all(b"tamper").unwrap();
        drop(file);

        let err = verify(&repo, &KEY, tmp.path()).unwrap_err();
        assert_eq!(err.code(), "INTEGRITY_ERROR");
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let (tmp, repo) = setup();
        update_checkpointed(&repo, &KEY, tmp.path(), SALT_HEX).unwrap();

        let err = verify(&repo, &[9u8; 32], tmp.path()).unwrap_err();
        assert_eq!(err.code(), "INTEGRITY_ERROR");
    }

    #[test]
    fn test_unknown_meta_fields_are_ignored() {
        let raw = format!(
            "{{\"version\":\"1\",\"salt\":\"{SALT_HEX}\",\"integrity\":\"{}\",\"extra\":true}}",
            "0".repeat(64)
        );
        let meta: MetaDocument = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta.version, "1");
    }
}
