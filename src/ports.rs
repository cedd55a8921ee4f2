//! Capability contracts injected into [`crate::app::App`].
//!
//! The export decision logic depends only on these traits. SQLite, the
//! filesystem, the shell syntax and the `gh` CLI are adapters behind them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::env::{EnvFileError, ExportPlan};
use crate::github::SecretSyncError;
use crate::models::*;
use crate::shell::Shell;

/// Reads a directory's `.env`.
pub trait EnvLoader {
    /// `Ok(None)` when the directory has no `.env`.
    fn load(&self, dir: &Path) -> Result<Option<EnvSnapshot>, EnvFileError>;
}

/// Finds the project a directory belongs to.
pub trait ProjectLookup {
    /// Most specific live project whose root is `dir` or an ancestor of it.
    fn match_dir(&self, dir: &Path) -> Result<Option<Project>>;
}

/// Administrative access to the project registry.
pub trait ProjectRegistry: ProjectLookup {
    fn register(&self, input: RegisterProjectInput) -> Result<Project>;
    fn find_by_path(&self, path: &Path) -> Result<Option<Project>>;
    fn list(&self) -> Result<Vec<Project>>;
    /// Returns `false` when no live project is registered at `path`.
    fn forget(&self, path: &Path) -> Result<bool>;
}

/// Per-shell activation state.
pub trait SessionStore {
    fn get(&self, shell: ShellId) -> Result<Option<Session>>;
    fn get_keys(&self, shell: ShellId) -> Result<SessionKeys>;
    fn upsert(&self, shell: ShellId, origin: &Path, env_mtime: i64) -> Result<()>;
    /// Replace the full key set of `shell`. All-or-nothing.
    fn replace_keys(&self, shell: ShellId, keys: &SessionKeys) -> Result<()>;
    /// Remove the session and all of its keys.
    fn delete(&self, shell: ShellId) -> Result<()>;

    /// Record a complete activation: session row and key set together.
    ///
    /// Stores backed by a transactional engine override this so both writes
    /// commit as one unit.
    fn activate(
        &self,
        shell: ShellId,
        origin: &Path,
        env_mtime: i64,
        keys: &SessionKeys,
    ) -> Result<()> {
        self.upsert(shell, origin, env_mtime)?;
        self.replace_keys(shell, keys)
    }
}

/// Turns an export plan into shell source.
pub trait ShellRenderer {
    fn format_unsets(&self, shell: Shell, names: &[&str]) -> String;
    fn format_exports(&self, shell: Shell, vars: &[(&str, &str)]) -> String;

    /// Deactivations first, then activations.
    fn render(&self, shell: Shell, plan: &ExportPlan) -> String {
        let unsets: Vec<&str> = plan.deactivate.iter().map(String::as_str).collect();
        let exports: Vec<(&str, &str)> = plan
            .activate
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let mut out = self.format_unsets(shell, &unsets);
        out.push_str(&self.format_exports(shell, &exports));
        out
    }
}

/// Uploads values to an external secret store.
pub trait SecretSyncer {
    fn sync(&self, repo: &str, secrets: &BTreeMap<String, String>)
        -> Result<usize, SecretSyncError>;
}

/// Key-value user defaults.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<Setting>;
    fn list(&self) -> Result<Vec<Setting>>;
}
