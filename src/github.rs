//! Upload `.env` values to GitHub Actions secrets through the `gh` CLI.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::ports::SecretSyncer;

#[derive(Debug, Error)]
pub enum SecretSyncError {
    #[error("gh CLI not found: install from https://cli.github.com")]
    GhMissing,

    #[error("set secret {name}: {stderr}")]
    Command { name: String, stderr: String },

    #[error("set secret {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Runs `gh secret set` once per variable.
#[derive(Debug, Clone)]
pub struct GhSecretSyncer {
    program: String,
}

impl Default for GhSecretSyncer {
    fn default() -> Self {
        Self::new()
    }
}

impl GhSecretSyncer {
    pub fn new() -> Self {
        Self::with_program("gh")
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn set_secret(&self, repo: &str, name: &str, value: &str) -> Result<(), SecretSyncError> {
        let io_err = |source: io::Error| {
            if source.kind() == io::ErrorKind::NotFound {
                SecretSyncError::GhMissing
            } else {
                SecretSyncError::Io {
                    name: name.to_string(),
                    source,
                }
            }
        };

        // Value goes through stdin so it never shows up in the process list
        let mut child = Command::new(&self.program)
            .args(["secret", "set", name, "--repo", repo])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(io_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            // An early exit closes the pipe; the exit status tells what happened
            match stdin.write_all(value.as_bytes()) {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(io_err(e)),
                _ => {}
            }
        }

        let output = child.wait_with_output().map_err(io_err)?;
        if !output.status.success() {
            return Err(SecretSyncError::Command {
                name: name.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

impl SecretSyncer for GhSecretSyncer {
    fn sync(
        &self,
        repo: &str,
        secrets: &BTreeMap<String, String>,
    ) -> Result<usize, SecretSyncError> {
        for (name, value) in secrets {
            tracing::debug!("setting secret {} on {}", name, repo);
            self.set_secret(repo, name, value)?;
        }
        Ok(secrets.len())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn secrets() -> BTreeMap<String, String> {
        BTreeMap::from([("A".to_string(), "1".to_string())])
    }

    #[test]
    fn missing_binary_is_reported() {
        let syncer = GhSecretSyncer::with_program("autoenv-no-such-gh-binary");
        let err = syncer.sync("o/r", &secrets()).unwrap_err();
        assert!(matches!(err, SecretSyncError::GhMissing));
    }

    #[test]
    fn failing_command_names_the_key() {
        let syncer = GhSecretSyncer::with_program("false");
        let err = syncer.sync("o/r", &secrets()).unwrap_err();
        match err {
            SecretSyncError::Command { name, .. } => assert_eq!(name, "A"),
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[test]
    fn successful_upload_counts_keys() {
        // `true` ignores its arguments and stdin
        let syncer = GhSecretSyncer::with_program("true");
        assert_eq!(syncer.sync("o/r", &secrets()).unwrap(), 1);
    }
}
