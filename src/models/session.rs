use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating-system process id of an interactive shell.
///
/// Every shell owns exactly one session row, keyed by this id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShellId(pub u32);

impl fmt::Display for ShellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The last activation performed in a shell.
///
/// Sessions are **local and disposable**: losing them only means stale
/// variables stay exported until the next directory change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub shell_id: ShellId,
    /// Directory whose `.env` was activated (project root or ad hoc directory).
    pub origin: PathBuf,
    /// Modification time of the `.env` at activation, in nanoseconds since the epoch.
    pub env_mtime: i64,
    pub activated_at: DateTime<Utc>,
}

/// One-way, truncated digest of an activated value.
///
/// Only used to detect that a value changed; the raw value is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed digest, e.g. one read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Variable names activated in a shell, with the fingerprint of each value.
pub type SessionKeys = BTreeMap<String, Fingerprint>;
