// Secrets Engine — Error taxonomy
//
// Every failure mode maps to a stable `code()` string so callers can branch
// on error kind without matching enum variants. The `Database` and `Io`
// variants carry storage-layer failures through unchanged.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An on-disk permission mode is more permissive than the store requires.
    /// POSIX only; mode checks are skipped on Windows.
    #[error("{}: mode {:03o} does not match the required {:03o}", .path.display(), .actual, .expected)]
    Security {
        expected: u32,
        actual: u32,
        path: PathBuf,
    },

    /// The metadata file is missing or corrupted, the seal does not match the
    /// database file, or the WAL could not be checkpointed during verification.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// `get_required` was called for a name that is not in the store.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Authentication tag mismatch, truncated ciphertext, or non-UTF-8
    /// plaintext. Carries the first 16 chars of the key hash for diagnostics;
    /// never the plaintext name or value.
    #[error("decryption failed for entry {key_hash}: {reason}")]
    Decryption { key_hash: String, reason: String },

    /// Storage directory or keyfile could not be created, or the key
    /// derivation primitive refused its parameters.
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Security { .. } => "SECURITY_ERROR",
            Error::Integrity(_) => "INTEGRITY_ERROR",
            Error::KeyNotFound(_) => "KEY_NOT_FOUND",
            Error::Decryption { .. } => "DECRYPTION_ERROR",
            Error::Initialization(_) => "INITIALIZATION_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = Error::Security {
            expected: 0o700,
            actual: 0o755,
            path: PathBuf::from("/tmp/x"),
        };
        assert_eq!(err.code(), "SECURITY_ERROR");
        assert_eq!(Error::Integrity("seal mismatch".into()).code(), "INTEGRITY_ERROR");
        assert_eq!(Error::KeyNotFound("a".into()).code(), "KEY_NOT_FOUND");
        assert_eq!(Error::Initialization("x".into()).code(), "INITIALIZATION_ERROR");
    }

    #[test]
    fn test_security_error_shows_octal_modes() {
        let err = Error::Security {
            expected: 0o700,
            actual: 0o755,
            path: PathBuf::from("/tmp/store"),
        };
        let message = err.to_string();
        assert!(message.contains("755"));
        assert!(message.contains("700"));
        assert!(message.contains("/tmp/store"));
    }

    #[test]
    fn test_decryption_error_never_leaks_plaintext() {
        let err = Error::Decryption {
            key_hash: "ab12cd34ef56ab12".into(),
            reason: "authentication tag mismatch".into(),
        };
        let message = err.to_string();
        assert!(message.contains("ab12cd34ef56ab12"));
        assert!(!message.contains("secret"));
    }
}
