use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{ProjectRecord, Setting};

/// A row that can be reconciled between two replicas.
pub trait Versioned: Clone {
    fn key(&self) -> &str;
    fn updated_at(&self) -> DateTime<Utc>;
}

impl Versioned for ProjectRecord {
    fn key(&self) -> &str {
        &self.path
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Versioned for Setting {
    fn key(&self) -> &str {
        &self.key
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Rows each side is missing or holds an older version of.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan<T> {
    /// Remote rows to write locally.
    pub pull: Vec<T>,
    /// Local rows to write remotely.
    pub push: Vec<T>,
}

impl<T> MergePlan<T> {
    pub fn is_empty(&self) -> bool {
        self.pull.is_empty() && self.push.is_empty()
    }
}

/// Last writer wins, keyed by row identity. Equal timestamps leave both
/// sides untouched.
pub fn plan_merge<T: Versioned>(local: &[T], remote: &[T]) -> MergePlan<T> {
    let local_by_key: BTreeMap<&str, &T> = local.iter().map(|r| (r.key(), r)).collect();
    let remote_by_key: BTreeMap<&str, &T> = remote.iter().map(|r| (r.key(), r)).collect();

    let mut pull = Vec::new();
    let mut push = Vec::new();

    for (key, &mine) in &local_by_key {
        match remote_by_key.get(key) {
            None => push.push(mine.clone()),
            Some(&theirs) if mine.updated_at() > theirs.updated_at() => push.push(mine.clone()),
            Some(&theirs) if theirs.updated_at() > mine.updated_at() => pull.push(theirs.clone()),
            Some(_) => {}
        }
    }

    for (key, &theirs) in &remote_by_key {
        if !local_by_key.contains_key(key) {
            pull.push(theirs.clone());
        }
    }

    MergePlan { pull, push }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(path: &str, updated: i64, deleted: bool) -> ProjectRecord {
        ProjectRecord {
            path: path.to_string(),
            name: None,
            created_at: at(0),
            updated_at: at(updated),
            deleted_at: deleted.then(|| at(updated)),
        }
    }

    fn paths(records: &[ProjectRecord]) -> Vec<&str> {
        records.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn one_sided_rows_are_copied_across() {
        let plan = plan_merge(&[record("/local", 1, false)], &[record("/remote", 1, false)]);

        assert_eq!(paths(&plan.push), vec!["/local"]);
        assert_eq!(paths(&plan.pull), vec!["/remote"]);
    }

    #[test]
    fn newer_side_wins() {
        let local = [record("/a", 5, false), record("/b", 1, false)];
        let remote = [record("/a", 3, false), record("/b", 9, true)];

        let plan = plan_merge(&local, &remote);

        assert_eq!(paths(&plan.push), vec!["/a"]);
        assert_eq!(paths(&plan.pull), vec!["/b"]);
        assert!(plan.pull[0].deleted_at.is_some());
    }

    #[test]
    fn equal_timestamps_are_left_alone() {
        let plan = plan_merge(&[record("/a", 4, false)], &[record("/a", 4, true)]);
        assert!(plan.is_empty());
    }

    #[test]
    fn settings_merge_by_key() {
        let local = [Setting {
            key: "github.default_owner".to_string(),
            value: "me".to_string(),
            updated_at: at(2),
        }];
        let remote = [Setting {
            key: "github.default_owner".to_string(),
            value: "org".to_string(),
            updated_at: at(7),
        }];

        let plan = plan_merge(&local, &remote);

        assert!(plan.push.is_empty());
        assert_eq!(plan.pull[0].value, "org");
    }
}
