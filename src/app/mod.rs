//! Application layer: every command the CLI exposes, expressed against the
//! capability traits in [`crate::ports`].

mod target;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use target::resolve_repo;

use crate::config::ActivationMode;
use crate::env::{decide, ExportPlan, SessionUpdate};
use crate::models::*;
use crate::paths;
use crate::ports::*;
use crate::shell::Shell;

/// Capabilities the application is built from.
pub struct Deps {
    pub projects: Box<dyn ProjectRegistry>,
    pub sessions: Box<dyn SessionStore>,
    pub loader: Box<dyn EnvLoader>,
    pub renderer: Box<dyn ShellRenderer>,
    pub secrets: Box<dyn SecretSyncer>,
    pub settings: Box<dyn SettingsStore>,
}

pub struct App {
    deps: Deps,
    mode: ActivationMode,
}

/// Result of `load`: the registered project and the script to eval.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub project: Project,
    pub script: String,
}

/// Result of a secret upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretUpload {
    pub repo: String,
    pub count: usize,
}

impl App {
    pub fn new(deps: Deps, mode: ActivationMode) -> Self {
        Self { deps, mode }
    }

    // ============================================================
    // Activation
    // ============================================================

    /// Script that brings `shell_id`'s environment in line with `cwd`.
    ///
    /// Runs on every prompt. Returns an empty string when nothing changes.
    pub fn export(&self, shell: Shell, shell_id: ShellId, cwd: &Path) -> Result<String> {
        let dir = paths::resolve(cwd).with_context(|| format!("resolve {}", cwd.display()))?;
        self.sync_shell(shell, shell_id, &dir)
    }

    /// Register `dir` as a project and activate it for `shell_id`.
    pub fn load(
        &self,
        shell: Shell,
        shell_id: ShellId,
        dir: &Path,
        name: Option<String>,
    ) -> Result<LoadOutcome> {
        let project = self
            .deps
            .projects
            .register(RegisterProjectInput {
                path: dir.to_path_buf(),
                name,
            })
            .with_context(|| format!("register project {}", dir.display()))?;
        tracing::info!("registered project {}", project.path.display());

        let script = self.sync_shell(shell, shell_id, &project.path)?;
        Ok(LoadOutcome { project, script })
    }

    /// Unset everything `shell_id` activated and drop its session.
    pub fn clear(&self, shell: Shell, shell_id: ShellId) -> Result<String> {
        let keys = self
            .deps
            .sessions
            .get_keys(shell_id)
            .with_context(|| format!("read session keys for shell {shell_id}"))?;

        let plan = ExportPlan::unset_all(&keys);
        let script = self.deps.renderer.render(shell, &plan);

        self.deps
            .sessions
            .delete(shell_id)
            .with_context(|| format!("clear session for shell {shell_id}"))?;
        tracing::debug!(shell = %shell_id, unset = plan.deactivate.len(), "session cleared");
        Ok(script)
    }

    fn sync_shell(&self, shell: Shell, shell_id: ShellId, dir: &Path) -> Result<String> {
        let (origin, snapshot) = self.resolve_origin(dir)?;

        let prior = self
            .deps
            .sessions
            .get(shell_id)
            .with_context(|| format!("read session for shell {shell_id}"))?;
        let prior_keys = self
            .deps
            .sessions
            .get_keys(shell_id)
            .with_context(|| format!("read session keys for shell {shell_id}"))?;

        let decision = decide(
            origin.as_deref(),
            snapshot.as_ref(),
            prior.as_ref(),
            &prior_keys,
        );
        tracing::debug!(
            shell = %shell_id,
            dir = %dir.display(),
            origin = ?origin,
            unset = decision.plan.deactivate.len(),
            export = decision.plan.activate.len(),
            "export decision"
        );

        let script = self.deps.renderer.render(shell, &decision.plan);

        // The store must know every activation before the shell sees it
        match decision.session {
            SessionUpdate::Unchanged => {}
            SessionUpdate::Record {
                origin,
                env_mtime,
                keys,
            } => self
                .deps
                .sessions
                .activate(shell_id, &origin, env_mtime, &keys)
                .with_context(|| format!("record session for shell {shell_id}"))?,
            SessionUpdate::Delete => self
                .deps
                .sessions
                .delete(shell_id)
                .with_context(|| format!("delete session for shell {shell_id}"))?,
        }

        Ok(script)
    }

    /// Which directory's `.env` applies to `dir`, and that file if present.
    fn resolve_origin(&self, dir: &Path) -> Result<(Option<PathBuf>, Option<EnvSnapshot>)> {
        let project = self
            .deps
            .projects
            .match_dir(dir)
            .with_context(|| format!("match project for {}", dir.display()))?;

        if let Some(project) = project {
            let snapshot = self.load_env(&project.path)?;
            return Ok((Some(project.path), snapshot));
        }

        if self.mode == ActivationMode::Adhoc {
            if let Some(snapshot) = self.load_env(dir)? {
                return Ok((Some(dir.to_path_buf()), Some(snapshot)));
            }
        }

        Ok((None, None))
    }

    fn load_env(&self, dir: &Path) -> Result<Option<EnvSnapshot>> {
        self.deps
            .loader
            .load(dir)
            .with_context(|| format!("load .env in {}", dir.display()))
    }

    // ============================================================
    // Registry
    // ============================================================

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.deps.projects.list().context("list projects")
    }

    /// Returns `false` when `dir` was not a registered project.
    pub fn forget(&self, dir: &Path) -> Result<bool> {
        self.deps
            .projects
            .forget(dir)
            .with_context(|| format!("forget project {}", dir.display()))
    }

    // ============================================================
    // Settings
    // ============================================================

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.deps
            .settings
            .get(key)
            .with_context(|| format!("read setting {key}"))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<Setting> {
        self.deps
            .settings
            .set(key, value)
            .with_context(|| format!("write setting {key}"))
    }

    pub fn list_settings(&self) -> Result<Vec<Setting>> {
        self.deps.settings.list().context("list settings")
    }

    // ============================================================
    // Secrets
    // ============================================================

    /// Upload the `.env` of `dir` to the GitHub repository named by `target`.
    pub fn sync_secrets(&self, dir: &Path, target: &str) -> Result<SecretUpload> {
        let owner = self.get_setting(GITHUB_DEFAULT_OWNER)?;
        let repo = resolve_repo(target, owner.as_deref())?;

        let snapshot = self
            .load_env(dir)?
            .with_context(|| format!("no .env file in {}", dir.display()))?;

        let count = self
            .deps
            .secrets
            .sync(&repo, &snapshot.values)
            .with_context(|| format!("upload secrets to {repo}"))?;
        tracing::info!("uploaded {} secrets to {}", count, repo);

        Ok(SecretUpload { repo, count })
    }
}
