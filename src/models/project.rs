use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered project directory.
///
/// Projects are identified by their absolute root path. Entering the root or
/// any directory below it activates the `.env` file found at the root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Absolute path to the project root.
    pub path: PathBuf,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Name shown in listings; `-` when the project was registered without one.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("-")
    }

    /// Whether `dir` is the project root or lies below it.
    ///
    /// The comparison is component-wise, so `/a/b` contains `/a/b/c` but
    /// not `/a/bc`.
    pub fn contains(&self, dir: &Path) -> bool {
        dir.starts_with(&self.path)
    }
}

/// Input for registering (or re-registering) a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterProjectInput {
    pub path: PathBuf,
    pub name: Option<String>,
}

/// A registry row as exchanged with the remote replica, tombstones included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRecord {
    pub path: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the project was forgotten.
    pub deleted_at: Option<DateTime<Utc>>,
}
