// Secrets Engine — Storage path resolution
//
// Resolves the storage directory from caller options and the environment.
// Priority: explicit path, then the requested location token, then
// XDG_CONFIG_HOME if set (POSIX), then a dot-directory under $HOME.

use std::env;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::vault::{Location, OpenOptions};

/// Directory name used under config roots (XDG / APPDATA).
pub const STORE_DIR_NAME: &str = "secrets-engine";

/// Dot-directory name used directly under the home directory.
pub const HOME_DIR_NAME: &str = ".secrets-engine";

/// The environment slice the resolver consumes, injected as data so
/// resolution is testable without mutating process env.
pub(crate) struct ResolverEnv {
    pub home: Option<PathBuf>,
    pub xdg_config_home: Option<PathBuf>,
    pub appdata: Option<PathBuf>,
}

impl ResolverEnv {
    fn from_process() -> Self {
        Self {
            home: dirs::home_dir(),
            xdg_config_home: non_empty_var("XDG_CONFIG_HOME"),
            appdata: non_empty_var("APPDATA"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Resolve the storage directory for the given open options.
pub fn resolve(options: &OpenOptions) -> Result<PathBuf> {
    resolve_with(options, &ResolverEnv::from_process())
}

pub(crate) fn resolve_with(options: &OpenOptions, env: &ResolverEnv) -> Result<PathBuf> {
    if let Some(path) = &options.path {
        return Ok(path.clone());
    }

    match options.location {
        Some(Location::Xdg) => {
            if cfg!(windows) {
                let appdata = env.appdata.clone().ok_or_else(|| {
                    Error::Initialization("APPDATA is not set".to_string())
                })?;
                Ok(appdata.join(STORE_DIR_NAME))
            } else if let Some(xdg) = &env.xdg_config_home {
                Ok(xdg.join(STORE_DIR_NAME))
            } else {
                Ok(home(env)?.join(".config").join(STORE_DIR_NAME))
            }
        }
        Some(Location::Home) => Ok(home(env)?.join(HOME_DIR_NAME)),
        None => {
            if !cfg!(windows) {
                if let Some(xdg) = &env.xdg_config_home {
                    return Ok(xdg.join(STORE_DIR_NAME));
                }
            }
            Ok(home(env)?.join(HOME_DIR_NAME))
        }
    }
}

fn home(env: &ResolverEnv) -> Result<PathBuf> {
    env.home
        .clone()
        .ok_or_else(|| Error::Initialization("home directory could not be determined".to_string()))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn env(home: &str, xdg: Option<&str>) -> ResolverEnv {
        ResolverEnv {
            home: Some(PathBuf::from(home)),
            xdg_config_home: xdg.map(PathBuf::from),
            appdata: None,
        }
    }

    #[test]
    fn test_explicit_path_wins() {
        let options = OpenOptions {
            path: Some(PathBuf::from("/data/vault")),
            location: Some(Location::Xdg),
        };
        let resolved = resolve_with(&options, &env("/home/u", Some("/home/u/.config"))).unwrap();
        assert_eq!(resolved, PathBuf::from("/data/vault"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_xdg_location_uses_xdg_config_home() {
        let options = OpenOptions {
            path: None,
            location: Some(Location::Xdg),
        };
        let resolved = resolve_with(&options, &env("/home/u", Some("/cfg"))).unwrap();
        assert_eq!(resolved, PathBuf::from("/cfg/secrets-engine"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_xdg_location_falls_back_to_dot_config() {
        let options = OpenOptions {
            path: None,
            location: Some(Location::Xdg),
        };
        let resolved = resolve_with(&options, &env("/home/u", None)).unwrap();
        assert_eq!(resolved, PathBuf::from("/home/u/.config/secrets-engine"));
    }

    #[test]
    fn test_home_location_ignores_xdg() {
        let options = OpenOptions {
            path: None,
            location: Some(Location::Home),
        };
        let resolved = resolve_with(&options, &env("/home/u", Some("/cfg"))).unwrap();
        assert_eq!(resolved, PathBuf::from("/home/u/.secrets-engine"));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_default_prefers_xdg_when_set() {
        let options = OpenOptions::default();
        let resolved = resolve_with(&options, &env("/home/u", Some("/cfg"))).unwrap();
        assert_eq!(resolved, PathBuf::from("/cfg/secrets-engine"));
    }

    #[test]
    fn test_default_without_xdg_is_home_dot_dir() {
        let options = OpenOptions::default();
        let resolved = resolve_with(&options, &env("/home/u", None)).unwrap();
        assert_eq!(resolved, PathBuf::from("/home/u/.secrets-engine"));
    }

    #[test]
    fn test_missing_home_fails_initialization() {
        let options = OpenOptions::default();
        let no_home = ResolverEnv {
            home: None,
            xdg_config_home: None,
            appdata: None,
        };
        let err = resolve_with(&options, &no_home).unwrap_err();
        assert_eq!(err.code(), "INITIALIZATION_ERROR");
    }
}
