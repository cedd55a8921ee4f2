//! Export decision engine.
//!
//! Given where a shell is now and what it activated last, decide the minimal
//! set of variables to unset and export, and what to remember for next time.
//! Everything here is pure; persistence and rendering happen in the caller.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::*;

/// Number of digest bytes kept in a [`Fingerprint`] (16 hex characters).
pub const FINGERPRINT_BYTES: usize = 8;

/// Fingerprint of a single value: truncated SHA-256, lower-case hex.
pub fn fingerprint(value: &str) -> Fingerprint {
    let digest = Sha256::digest(value.as_bytes());
    Fingerprint::from_hex(hex::encode(&digest[..FINGERPRINT_BYTES]))
}

/// Fingerprints of every value in a snapshot.
pub fn fingerprints(snapshot: &EnvSnapshot) -> SessionKeys {
    snapshot
        .values
        .iter()
        .map(|(name, value)| (name.clone(), fingerprint(value)))
        .collect()
}

/// Variables to remove from and add to a shell, in rendering order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPlan {
    pub deactivate: BTreeSet<String>,
    pub activate: BTreeMap<String, String>,
}

impl ExportPlan {
    pub fn is_empty(&self) -> bool {
        self.deactivate.is_empty() && self.activate.is_empty()
    }

    /// Deactivate every name in `keys`.
    pub fn unset_all(keys: &SessionKeys) -> Self {
        Self {
            deactivate: keys.keys().cloned().collect(),
            activate: BTreeMap::new(),
        }
    }
}

/// What to persist for the shell after rendering a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Unchanged,
    Record {
        origin: PathBuf,
        env_mtime: i64,
        keys: SessionKeys,
    },
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub plan: ExportPlan,
    pub session: SessionUpdate,
}

impl Decision {
    fn noop() -> Self {
        Self {
            plan: ExportPlan::default(),
            session: SessionUpdate::Unchanged,
        }
    }
}

/// Decide what a shell must do after a directory change.
///
/// `origin` is the directory whose `.env` should be active (a project root,
/// or an ad hoc directory), `snapshot` is that file if it exists, and
/// `prior`/`prior_keys` describe what the shell activated last.
pub fn decide(
    origin: Option<&Path>,
    snapshot: Option<&EnvSnapshot>,
    prior: Option<&Session>,
    prior_keys: &SessionKeys,
) -> Decision {
    let had_session = prior.is_some() || !prior_keys.is_empty();

    let Some(origin) = origin else {
        if !had_session {
            return Decision::noop();
        }
        return Decision {
            plan: ExportPlan::unset_all(prior_keys),
            session: SessionUpdate::Delete,
        };
    };

    if let (Some(prior), Some(snapshot)) = (prior, snapshot) {
        if prior.origin == origin && prior.env_mtime == snapshot.mtime {
            return Decision::noop();
        }
    }

    let plan = diff(snapshot, prior_keys);
    let session = match snapshot {
        Some(snapshot) => SessionUpdate::Record {
            origin: origin.to_path_buf(),
            env_mtime: snapshot.mtime,
            keys: fingerprints(snapshot),
        },
        None if had_session => SessionUpdate::Delete,
        None => SessionUpdate::Unchanged,
    };

    Decision { plan, session }
}

/// Added/changed values to export and removed names to unset.
///
/// Removal is judged against the new snapshot's names only, so nothing
/// activated for a previous origin survives unless the new file defines it
/// with the same value.
pub fn diff(snapshot: Option<&EnvSnapshot>, prior_keys: &SessionKeys) -> ExportPlan {
    let Some(snapshot) = snapshot else {
        return ExportPlan::unset_all(prior_keys);
    };

    let activate = snapshot
        .values
        .iter()
        .filter(|(name, value)| {
            prior_keys
                .get(name.as_str())
                .is_none_or(|prior| *prior != fingerprint(value))
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let deactivate = prior_keys
        .keys()
        .filter(|name| !snapshot.contains(name))
        .cloned()
        .collect();

    ExportPlan {
        deactivate,
        activate,
    }
}
