//! Optional remote replica of the project registry.
//!
//! Only projects and settings travel; sessions are machine-local. Both sides
//! keep tombstones, so a forgotten project stays forgotten after a sync.

mod client;
mod merge;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub use client::{ClientError, QueryResult, RemoteClient, Statement, Value};
pub use merge::{plan_merge, MergePlan, Versioned};

use crate::db::{ProjectRepo, SettingsRepo};
use crate::models::{ProjectRecord, Setting};
use crate::ports::SettingsStore;

const REMOTE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS projects (
        path TEXT PRIMARY KEY,
        name TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

/// Row counts moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pulled_projects: usize,
    pub pushed_projects: usize,
    pub pulled_settings: usize,
    pub pushed_settings: usize,
}

impl SyncReport {
    pub fn pulled(&self) -> usize {
        self.pulled_projects + self.pulled_settings
    }

    pub fn pushed(&self) -> usize {
        self.pushed_projects + self.pushed_settings
    }
}

/// Reconcile the local registry with the remote replica.
///
/// Remote writes go first and commit as one transaction; local rows are only
/// touched after the push succeeded.
pub async fn sync_registry(
    client: &RemoteClient,
    projects: &ProjectRepo,
    settings: &SettingsRepo,
) -> Result<SyncReport> {
    let schema = REMOTE_SCHEMA.iter().copied().map(Statement::new).collect();
    client
        .execute(schema)
        .await
        .with_context(|| format!("prepare remote schema at {}", client.base_url()))?;

    let mut results = client
        .execute(vec![
            Statement::new(
                "SELECT path, name, created_at, updated_at, deleted_at FROM projects",
            ),
            Statement::new("SELECT key, value, updated_at FROM settings"),
        ])
        .await
        .context("fetch remote registry")?
        .into_iter();

    let remote_projects = decode_rows(results.next(), decode_project)?;
    let remote_settings = decode_rows(results.next(), decode_setting)?;

    let project_plan = plan_merge(&projects.records()?, &remote_projects);
    let settings_plan = plan_merge(&settings.list()?, &remote_settings);

    let mut push: Vec<Statement> = project_plan.push.iter().map(project_upsert).collect();
    push.extend(settings_plan.push.iter().map(setting_upsert));
    client
        .transaction(push)
        .await
        .context("push registry to remote")?;

    projects
        .apply_records(&project_plan.pull)
        .context("apply remote projects")?;
    settings
        .apply_records(&settings_plan.pull)
        .context("apply remote settings")?;

    let report = SyncReport {
        pulled_projects: project_plan.pull.len(),
        pushed_projects: project_plan.push.len(),
        pulled_settings: settings_plan.pull.len(),
        pushed_settings: settings_plan.push.len(),
    };
    tracing::info!(
        pulled = report.pulled(),
        pushed = report.pushed(),
        "registry sync complete"
    );
    Ok(report)
}

fn project_upsert(record: &ProjectRecord) -> Statement {
    Statement::with_args(
        "INSERT INTO projects (path, name, created_at, updated_at, deleted_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(path) DO UPDATE SET
           name = excluded.name,
           created_at = excluded.created_at,
           updated_at = excluded.updated_at,
           deleted_at = excluded.deleted_at",
        vec![
            Value::text(&record.path),
            Value::opt_text(record.name.as_deref()),
            Value::text(record.created_at.to_rfc3339()),
            Value::text(record.updated_at.to_rfc3339()),
            Value::opt_text(record.deleted_at.map(|d| d.to_rfc3339())),
        ],
    )
}

fn setting_upsert(setting: &Setting) -> Statement {
    Statement::with_args(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET
           value = excluded.value,
           updated_at = excluded.updated_at",
        vec![
            Value::text(&setting.key),
            Value::text(&setting.value),
            Value::text(setting.updated_at.to_rfc3339()),
        ],
    )
}

fn decode_rows<T>(
    result: Option<QueryResult>,
    decode: impl Fn(&[Value]) -> Result<T>,
) -> Result<Vec<T>> {
    let result = result.context("remote returned fewer results than requested")?;
    result.rows.iter().map(|row| decode(row)).collect()
}

fn decode_project(row: &[Value]) -> Result<ProjectRecord> {
    Ok(ProjectRecord {
        path: required_text(row, 0)?.to_string(),
        name: optional_text(row, 1)?.map(str::to_string),
        created_at: timestamp(required_text(row, 2)?)?,
        updated_at: timestamp(required_text(row, 3)?)?,
        deleted_at: optional_text(row, 4)?.map(timestamp).transpose()?,
    })
}

fn decode_setting(row: &[Value]) -> Result<Setting> {
    Ok(Setting {
        key: required_text(row, 0)?.to_string(),
        value: required_text(row, 1)?.to_string(),
        updated_at: timestamp(required_text(row, 2)?)?,
    })
}

fn required_text(row: &[Value], idx: usize) -> Result<&str> {
    optional_text(row, idx)?.with_context(|| format!("remote column {idx} is null"))
}

fn optional_text(row: &[Value], idx: usize) -> Result<Option<&str>> {
    match row.get(idx) {
        Some(Value::Null) => Ok(None),
        Some(Value::Text { value }) => Ok(Some(value.as_str())),
        Some(other) => anyhow::bail!("remote column {idx}: expected text, got {other:?}"),
        None => anyhow::bail!("remote row has no column {idx}"),
    }
}

fn timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("invalid remote timestamp {s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_project_rows_with_tombstones() {
        let row = vec![
            Value::text("/w/api"),
            Value::Null,
            Value::text("2024-01-01T00:00:00+00:00"),
            Value::text("2024-02-01T00:00:00+00:00"),
            Value::text("2024-02-01T00:00:00+00:00"),
        ];

        let record = decode_project(&row).unwrap();

        assert_eq!(record.path, "/w/api");
        assert_eq!(record.name, None);
        assert_eq!(record.deleted_at, Some(record.updated_at));
    }

    #[test]
    fn rejects_non_text_columns() {
        let row = vec![
            Value::Integer {
                value: "1".to_string(),
            },
            Value::text("v"),
            Value::text("2024-01-01T00:00:00+00:00"),
        ];

        assert!(decode_setting(&row).is_err());
    }

    #[test]
    fn upsert_binds_null_name() {
        let record = decode_project(&[
            Value::text("/w"),
            Value::Null,
            Value::text("2024-01-01T00:00:00Z"),
            Value::text("2024-01-01T00:00:00Z"),
            Value::Null,
        ])
        .unwrap();

        let stmt = project_upsert(&record);

        assert_eq!(stmt.args.len(), 5);
        assert!(stmt.args[1].is_null());
        assert!(stmt.args[4].is_null());
    }
}
