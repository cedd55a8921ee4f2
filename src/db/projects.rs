use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use super::{parse_datetime, parse_path, path_text, Database};
use crate::models::*;
use crate::paths;
use crate::ports::{ProjectLookup, ProjectRegistry};

const PROJECT_COLUMNS: &str = "path, name, created_at, updated_at";

/// Project registry backed by the registry database.
#[derive(Clone)]
pub struct ProjectRepo {
    db: Database,
}

impl ProjectRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Every row, tombstones included, for replica sync.
    pub fn records(&self) -> Result<Vec<ProjectRecord>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT path, name, created_at, updated_at, deleted_at FROM projects ORDER BY path",
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(ProjectRecord {
                    path: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(2, row.get(2)?)?,
                    updated_at: parse_datetime(3, row.get(3)?)?,
                    deleted_at: row
                        .get::<_, Option<String>>(4)?
                        .map(|s| parse_datetime(4, s))
                        .transpose()?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Overwrite rows with the given records in one transaction.
    pub fn apply_records(&self, records: &[ProjectRecord]) -> Result<usize> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        for record in records {
            tx.execute(
                "INSERT INTO projects (path, name, created_at, updated_at, deleted_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(path) DO UPDATE SET
                   name = excluded.name,
                   created_at = excluded.created_at,
                   updated_at = excluded.updated_at,
                   deleted_at = excluded.deleted_at",
                (
                    &record.path,
                    &record.name,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    record.deleted_at.map(|d| d.to_rfc3339()),
                ),
            )?;
        }
        tx.commit()?;
        Ok(records.len())
    }
}

impl ProjectLookup for ProjectRepo {
    fn match_dir(&self, dir: &Path) -> Result<Option<Project>> {
        let dir = paths::resolve(dir).with_context(|| format!("resolve {}", dir.display()))?;
        let conn = self.db.lock()?;

        // Longest root first, so the first containing project is the most specific
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE deleted_at IS NULL ORDER BY length(path) DESC"
        ))?;

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let project = row_to_project(row)?;
            if project.contains(&dir) {
                tracing::debug!("{} matches project {}", dir.display(), project.path.display());
                return Ok(Some(project));
            }
        }

        Ok(None)
    }
}

impl ProjectRegistry for ProjectRepo {
    fn register(&self, input: RegisterProjectInput) -> Result<Project> {
        let path = paths::resolve(&input.path)
            .with_context(|| format!("resolve {}", input.path.display()))?;
        let key = path_text(&path)?;
        let conn = self.db.lock()?;
        let now = Utc::now().to_rfc3339();

        // A forgotten project comes back as a new registration
        conn.execute(
            "INSERT INTO projects (path, name, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?3, NULL)
             ON CONFLICT(path) DO UPDATE SET
               name = COALESCE(excluded.name, CASE WHEN projects.deleted_at IS NULL THEN projects.name END),
               created_at = CASE WHEN projects.deleted_at IS NULL THEN projects.created_at ELSE excluded.created_at END,
               updated_at = excluded.updated_at,
               deleted_at = NULL",
            (key, &input.name, &now),
        )
        .with_context(|| format!("register project {}", path.display()))?;

        find_live(&conn, key)?
            .ok_or_else(|| anyhow::anyhow!("project {} vanished after upsert", path.display()))
    }

    fn find_by_path(&self, path: &Path) -> Result<Option<Project>> {
        let path = paths::resolve(path).with_context(|| format!("resolve {}", path.display()))?;
        let conn = self.db.lock()?;
        find_live(&conn, path_text(&path)?)
    }

    fn list(&self) -> Result<Vec<Project>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE deleted_at IS NULL ORDER BY name, path"
        ))?;

        let projects = stmt
            .query_map([], row_to_project)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    fn forget(&self, path: &Path) -> Result<bool> {
        let path = paths::resolve(path).with_context(|| format!("resolve {}", path.display()))?;
        let conn = self.db.lock()?;
        let now = Utc::now().to_rfc3339();

        let rows = conn.execute(
            "UPDATE projects SET deleted_at = ?1, updated_at = ?1
             WHERE path = ?2 AND deleted_at IS NULL",
            (&now, path_text(&path)?),
        )?;

        Ok(rows > 0)
    }
}

fn find_live(conn: &Connection, path: &str) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            &format!(
                "SELECT {PROJECT_COLUMNS} FROM projects WHERE path = ? AND deleted_at IS NULL"
            ),
            [path],
            row_to_project,
        )
        .optional()?;
    Ok(project)
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        path: parse_path(row.get(0)?),
        name: row.get(1)?,
        created_at: parse_datetime(2, row.get(2)?)?,
        updated_at: parse_datetime(3, row.get(3)?)?,
    })
}
