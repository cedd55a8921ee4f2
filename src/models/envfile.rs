use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Parsed contents of a directory's `.env` at one point in time.
///
/// Snapshots are produced fresh on every read and never cached between
/// invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvSnapshot {
    /// Directory the file was loaded from.
    pub origin: PathBuf,
    /// Path of the `.env` file itself.
    pub file: PathBuf,
    /// Modification time in nanoseconds since the epoch.
    pub mtime: i64,
    pub values: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}
