// Secrets Engine — Filesystem guard
//
// Creates and verifies the storage directory, keyfile, and metadata file
// under strict POSIX modes. Every chmod happens after the write so the
// process umask cannot widen the result. On Windows all mode checks are
// skipped and NTFS defaults apply.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::crypto::{self, KEYFILE_LEN};
use crate::error::{Error, Result};

/// Name of the keyfile inside the storage directory.
pub const KEYFILE_NAME: &str = ".keyfile";

/// Name of the metadata file inside the storage directory.
pub const META_NAME: &str = "meta.json";

/// Staging name for atomic metadata rewrites.
const META_TMP_NAME: &str = "meta.json.tmp";

/// Required mode of the storage directory.
pub const DIR_MODE: u32 = 0o700;

/// Required mode of the keyfile.
pub const KEYFILE_MODE: u32 = 0o400;

/// Required mode of the metadata and database files.
pub const FILE_MODE: u32 = 0o600;

const REMOVE_ATTEMPTS: u32 = 5;
const REMOVE_BACKOFF: Duration = Duration::from_millis(200);

/// Create the storage directory if needed and verify its mode is exactly
/// `0o700`. An existing directory with a wider mode fails closed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| {
            Error::Initialization(format!(
                "failed to create storage directory {}: {e}",
                dir.display()
            ))
        })?;
        set_mode(dir, DIR_MODE)?;
        tracing::debug!(dir = %dir.display(), "storage directory created");
    }
    verify_mode(dir, DIR_MODE)
}

/// Return the 32 keyfile bytes, generating the file on first use. An
/// existing keyfile must be exactly mode `0o400`.
pub fn ensure_keyfile(dir: &Path) -> Result<Zeroizing<[u8; KEYFILE_LEN]>> {
    let path = dir.join(KEYFILE_NAME);

    if path.exists() {
        verify_mode(&path, KEYFILE_MODE)?;
        let bytes = Zeroizing::new(fs::read(&path)?);
        let key: [u8; KEYFILE_LEN] = bytes.as_slice().try_into().map_err(|_| {
            Error::Initialization(format!(
                "keyfile {} is not {KEYFILE_LEN} bytes",
                path.display()
            ))
        })?;
        return Ok(Zeroizing::new(key));
    }

    let key = Zeroizing::new(crypto::random_bytes::<KEYFILE_LEN>());
    fs::write(&path, &*key)?;
    set_mode(&path, KEYFILE_MODE)?;
    tracing::debug!(path = %path.display(), "keyfile generated");
    Ok(key)
}

/// Raw contents of the metadata file, or `None` if it does not exist.
pub fn read_meta(dir: &Path) -> Result<Option<String>> {
    match fs::read_to_string(dir.join(META_NAME)) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write the metadata file atomically and clamp it to mode `0o600`. The
/// contents land in a temp file in the same directory which is renamed over
/// meta.json, so a crash mid-write leaves either the old document or the new
/// one, never a truncated file.
pub fn write_meta(dir: &Path, contents: &str) -> Result<()> {
    let tmp = dir.join(META_TMP_NAME);
    fs::write(&tmp, contents)?;
    set_mode(&tmp, FILE_MODE)?;
    fs::rename(&tmp, dir.join(META_NAME))?;
    Ok(())
}

/// Clamp the database file to mode `0o600` after it is created.
pub fn restrict_db_mode(path: &Path) -> Result<()> {
    set_mode(path, FILE_MODE)
}

/// Remove everything inside `dir` and then the directory itself, retrying
/// on busy/permission errors with increasing delay. The OS may briefly hold
/// handles on the WAL/SHM sidecar files after close.
pub fn remove_dir_retrying(dir: &Path) -> Result<()> {
    for attempt in 1..=REMOVE_ATTEMPTS {
        match remove_dir_contents(dir) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < REMOVE_ATTEMPTS && is_retryable(&e) => {
                tracing::debug!(
                    dir = %dir.display(),
                    attempt,
                    "directory removal blocked, retrying: {e}"
                );
                thread::sleep(REMOVE_BACKOFF * attempt);
            }
            Err(e) => return Err(e.into()),
        }
    }
    unreachable!("the final attempt either returned or propagated its error")
}

fn remove_dir_contents(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    fs::remove_dir(dir)
}

fn is_retryable(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    )
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn verify_mode(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let actual = fs::metadata(path)?.permissions().mode() & 0o777;
    if actual != expected {
        return Err(Error::Security {
            expected,
            actual,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn verify_mode(_path: &Path, _expected: u32) -> Result<()> {
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn mode_of(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_ensure_dir_creates_with_restricted_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("store");

        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        #[cfg(unix)]
        assert_eq!(mode_of(&dir), DIR_MODE);

        // Idempotent on an already-correct directory
        ensure_dir(&dir).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_dir_rejects_permissive_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("store");
        ensure_dir(&dir).unwrap();

        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        let err = ensure_dir(&dir).unwrap_err();
        match err {
            Error::Security { expected, actual, .. } => {
                assert_eq!(expected, 0o700);
                assert_eq!(actual, 0o755);
            }
            other => panic!("expected Security, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_keyfile_generates_once() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();

        let first = ensure_keyfile(&dir).unwrap();
        let second = ensure_keyfile(&dir).unwrap();
        assert_eq!(first.as_slice(), second.as_slice());

        #[cfg(unix)]
        assert_eq!(mode_of(&dir.join(KEYFILE_NAME)), KEYFILE_MODE);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_keyfile_rejects_wrong_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        ensure_keyfile(&dir).unwrap();

        let path = dir.join(KEYFILE_NAME);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let err = ensure_keyfile(&dir).unwrap_err();
        assert_eq!(err.code(), "SECURITY_ERROR");
    }

    #[test]
    fn test_ensure_keyfile_rejects_truncated_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        let path = dir.join(KEYFILE_NAME);
        fs::write(&path, [0u8; 7]).unwrap();
        set_mode(&path, KEYFILE_MODE).unwrap();

        let err = ensure_keyfile(&dir).unwrap_err();
        assert_eq!(err.code(), "INITIALIZATION_ERROR");
    }

    #[test]
    fn test_read_meta_absent_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read_meta(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn test_write_then_read_meta() {
        let tmp = tempfile::tempdir().unwrap();
        write_meta(tmp.path(), "{\"version\":\"1\"}").unwrap();

        let contents = read_meta(tmp.path()).unwrap().unwrap();
        assert_eq!(contents, "{\"version\":\"1\"}");

        #[cfg(unix)]
        assert_eq!(mode_of(&tmp.path().join(META_NAME)), FILE_MODE);
    }

    #[test]
    fn test_write_meta_leaves_no_staging_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_meta(tmp.path(), "first").unwrap();
        write_meta(tmp.path(), "second").unwrap();

        assert_eq!(read_meta(tmp.path()).unwrap().unwrap(), "second");
        assert!(!tmp.path().join(META_TMP_NAME).exists());
    }

    #[test]
    fn test_remove_dir_retrying_removes_populated_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("doomed");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a.txt"), b"x").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("b.txt"), b"y").unwrap();

        remove_dir_retrying(&dir).unwrap();
        assert!(!dir.exists());
    }
}
