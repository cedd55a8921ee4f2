use anyhow::{Context, Result};
use rusqlite::Connection;

pub(crate) struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

pub(crate) const REGISTRY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001",
        name: "projects",
        sql: include_str!("migrations/registry/001_projects.sql"),
    },
    Migration {
        version: "002",
        name: "settings",
        sql: include_str!("migrations/registry/002_settings.sql"),
    },
];

pub(crate) const SESSION_MIGRATIONS: &[Migration] = &[Migration {
    version: "001",
    name: "sessions",
    sql: include_str!("migrations/sessions/001_sessions.sql"),
}];

pub(crate) fn run_migrations(conn: &mut Connection, migrations: &[Migration]) -> Result<()> {
    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    let applied = get_applied_migrations(conn)?;

    for migration in migrations {
        if !applied.iter().any(|v| v == migration.version) {
            apply_migration(conn, migration)?;
        }
    }

    Ok(())
}

fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    tracing::info!(
        "Applying migration {}: {}",
        migration.version,
        migration.name
    );

    // Schema change and bookkeeping commit together, or not at all
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql).with_context(|| {
        format!(
            "Failed to apply migration {}: {}",
            migration.version, migration.name
        )
    })?;
    tx.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (
            migration.version,
            migration.name,
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;
    tx.commit()?;

    tracing::info!("Migration {} applied successfully", migration.version);
    Ok(())
}
