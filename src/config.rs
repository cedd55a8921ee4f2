//! Runtime configuration loaded from environment variables.
//!
//! - `AUTOENV_CONFIG_DIR` - State directory (default: `$XDG_CONFIG_HOME/autoenv`
//!   or the platform config directory)
//! - `AUTOENV_TURSO_URL` / `AUTOENV_TURSO_AUTH_TOKEN` - Remote registry replica
//! - `AUTOENV_MODE` - `registered` (default) or `adhoc`
//! - `AUTOENV_SHELL_PID` - Overrides the detected shell process id

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ShellId;

const PROJECTS_DB: &str = "projects.db";
const SESSIONS_DB: &str = "sessions.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine a config directory; set AUTOENV_CONFIG_DIR")]
    NoConfigDir,

    #[error("invalid AUTOENV_MODE {0:?} (expected registered or adhoc)")]
    InvalidMode(String),

    #[error("invalid AUTOENV_SHELL_PID {0:?}")]
    InvalidShellPid(String),

    #[error("create config directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which directories may activate a `.env`.
///
/// - `Registered`: only registered projects (and directories below them)
/// - `Adhoc`: additionally any directory that contains a `.env` itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivationMode {
    #[default]
    Registered,
    Adhoc,
}

impl ActivationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Adhoc => "adhoc",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(Self::Registered),
            "adhoc" => Some(Self::Adhoc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub dir: PathBuf,
    pub projects_db: PathBuf,
    pub sessions_db: PathBuf,
    pub turso_url: Option<String>,
    pub turso_auth_token: Option<String>,
    pub mode: ActivationMode,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let dir = match (var("AUTOENV_CONFIG_DIR"), var("XDG_CONFIG_HOME")) {
            (Some(dir), _) => PathBuf::from(dir),
            (None, Some(xdg)) => PathBuf::from(xdg).join("autoenv"),
            (None, None) => directories::ProjectDirs::from("", "", "autoenv")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or(ConfigError::NoConfigDir)?,
        };

        let mode = match var("AUTOENV_MODE") {
            Some(mode) => {
                ActivationMode::from_str(&mode).ok_or(ConfigError::InvalidMode(mode))?
            }
            None => ActivationMode::default(),
        };

        Ok(Self {
            projects_db: dir.join(PROJECTS_DB),
            sessions_db: dir.join(SESSIONS_DB),
            dir,
            turso_url: var("AUTOENV_TURSO_URL"),
            turso_auth_token: var("AUTOENV_TURSO_AUTH_TOKEN"),
            mode,
        })
    }

    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ConfigError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn remote_enabled(&self) -> bool {
        self.turso_url.is_some()
    }
}

/// Shell that owns this invocation's session.
///
/// `AUTOENV_SHELL_PID` wins (the hooks set it to `$$`); otherwise the parent
/// process is assumed to be the shell.
pub fn shell_id() -> Result<ShellId, ConfigError> {
    shell_id_from(std::env::var("AUTOENV_SHELL_PID").ok(), parent_pid())
}

fn shell_id_from(override_pid: Option<String>, parent: u32) -> Result<ShellId, ConfigError> {
    match override_pid.filter(|v| !v.is_empty()) {
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(pid) if pid != 0 => Ok(ShellId(pid)),
            _ => Err(ConfigError::InvalidShellPid(raw)),
        },
        None => Ok(ShellId(parent)),
    }
}

#[cfg(unix)]
fn parent_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_dir_wins() {
        let cfg = Config::from_lookup(lookup(&[
            ("AUTOENV_CONFIG_DIR", "/tmp/ae"),
            ("XDG_CONFIG_HOME", "/tmp/xdg"),
        ]))
        .unwrap();
        assert_eq!(cfg.dir, PathBuf::from("/tmp/ae"));
        assert_eq!(cfg.projects_db, PathBuf::from("/tmp/ae/projects.db"));
        assert_eq!(cfg.sessions_db, PathBuf::from("/tmp/ae/sessions.db"));
    }

    #[test]
    fn xdg_config_home_is_used() {
        let cfg = Config::from_lookup(lookup(&[("XDG_CONFIG_HOME", "/tmp/xdg")])).unwrap();
        assert_eq!(cfg.dir, PathBuf::from("/tmp/xdg/autoenv"));
        assert_eq!(cfg.mode, ActivationMode::Registered);
        assert!(!cfg.remote_enabled());
    }

    #[test]
    fn mode_and_remote_are_read() {
        let cfg = Config::from_lookup(lookup(&[
            ("AUTOENV_CONFIG_DIR", "/tmp/ae"),
            ("AUTOENV_MODE", "adhoc"),
            ("AUTOENV_TURSO_URL", "libsql://db.turso.io"),
            ("AUTOENV_TURSO_AUTH_TOKEN", "tok"),
        ]))
        .unwrap();
        assert_eq!(cfg.mode, ActivationMode::Adhoc);
        assert!(cfg.remote_enabled());
        assert_eq!(cfg.turso_auth_token.as_deref(), Some("tok"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("AUTOENV_CONFIG_DIR", "/tmp/ae"),
            ("AUTOENV_MODE", "sometimes"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMode(m) if m == "sometimes"));
    }

    #[test]
    fn shell_id_prefers_override() {
        assert_eq!(shell_id_from(Some("123".into()), 9).unwrap(), ShellId(123));
        assert_eq!(shell_id_from(None, 9).unwrap(), ShellId(9));
        assert_eq!(shell_id_from(Some(String::new()), 9).unwrap(), ShellId(9));
        assert!(shell_id_from(Some("abc".into()), 9).is_err());
        assert!(shell_id_from(Some("0".into()), 9).is_err());
    }
}
