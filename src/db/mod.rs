mod projects;
mod schema;
mod sessions;
mod settings;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub use projects::ProjectRepo;
pub use sessions::SessionRepo;
pub use settings::SettingsRepo;

/// How long a writer waits for another shell's transaction to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Which schema a database file carries.
///
/// The registry may be replicated; sessions never leave the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Registry,
    Sessions,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Sessions => "sessions",
        }
    }
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
    kind: StoreKind,
}

impl Database {
    pub fn open(path: &Path, kind: StoreKind) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
        let conn = Connection::open(path)
            .with_context(|| format!("open {} database {}", kind.as_str(), path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::configure(conn, kind)
    }

    pub fn open_memory(kind: StoreKind) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, kind)
    }

    fn configure(conn: Connection, kind: StoreKind) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            kind,
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let migrations = match self.kind {
            StoreKind::Registry => schema::REGISTRY_MIGRATIONS,
            StoreKind::Sessions => schema::SESSION_MIGRATIONS,
        };
        schema::run_migrations(&mut conn, migrations)
            .with_context(|| format!("migrate {} database", self.kind.as_str()))
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            kind: self.kind,
        }
    }
}

fn path_text(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("path is not valid UTF-8: {}", path.display()))
}

fn parse_path(s: String) -> PathBuf {
    PathBuf::from(s)
}

fn parse_datetime(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
