use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use super::{parse_datetime, parse_path, path_text, Database};
use crate::models::*;
use crate::ports::SessionStore;

/// Per-shell activation state backed by the local sessions database.
#[derive(Clone)]
pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl SessionStore for SessionRepo {
    fn get(&self, shell: ShellId) -> Result<Option<Session>> {
        let conn = self.db.lock()?;
        let session = conn
            .query_row(
                "SELECT shell_id, origin_path, env_mtime, activated_at
                 FROM sessions WHERE shell_id = ?",
                [i64::from(shell.0)],
                |row| {
                    Ok(Session {
                        shell_id: ShellId(row.get(0)?),
                        origin: parse_path(row.get(1)?),
                        env_mtime: row.get(2)?,
                        activated_at: parse_datetime(3, row.get(3)?)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("read session for shell {shell}"))?;
        Ok(session)
    }

    fn get_keys(&self, shell: ShellId) -> Result<SessionKeys> {
        let conn = self.db.lock()?;
        let mut stmt =
            conn.prepare("SELECT name, fingerprint FROM session_keys WHERE shell_id = ?")?;

        let keys = stmt
            .query_map([i64::from(shell.0)], |row| {
                Ok((row.get::<_, String>(0)?, Fingerprint::from_hex(row.get::<_, String>(1)?)))
            })?
            .collect::<Result<SessionKeys, _>>()
            .with_context(|| format!("read session keys for shell {shell}"))?;

        Ok(keys)
    }

    fn upsert(&self, shell: ShellId, origin: &Path, env_mtime: i64) -> Result<()> {
        let conn = self.db.lock()?;
        upsert_session(&conn, shell, origin, env_mtime)
    }

    fn replace_keys(&self, shell: ShellId, keys: &SessionKeys) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        replace_session_keys(&tx, shell, keys)?;
        tx.commit()
            .with_context(|| format!("commit session keys for shell {shell}"))?;
        Ok(())
    }

    fn delete(&self, shell: ShellId) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM session_keys WHERE shell_id = ?",
            [i64::from(shell.0)],
        )?;
        tx.execute("DELETE FROM sessions WHERE shell_id = ?", [i64::from(shell.0)])?;
        tx.commit()
            .with_context(|| format!("delete session for shell {shell}"))?;
        Ok(())
    }

    fn activate(
        &self,
        shell: ShellId,
        origin: &Path,
        env_mtime: i64,
        keys: &SessionKeys,
    ) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        upsert_session(&tx, shell, origin, env_mtime)?;
        replace_session_keys(&tx, shell, keys)?;
        tx.commit()
            .with_context(|| format!("commit activation for shell {shell}"))?;
        Ok(())
    }
}

fn upsert_session(conn: &Connection, shell: ShellId, origin: &Path, env_mtime: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (shell_id, origin_path, env_mtime, activated_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(shell_id) DO UPDATE SET
           origin_path = excluded.origin_path,
           env_mtime = excluded.env_mtime,
           activated_at = excluded.activated_at",
        (
            i64::from(shell.0),
            path_text(origin)?,
            env_mtime,
            Utc::now().to_rfc3339(),
        ),
    )
    .with_context(|| format!("write session for shell {shell}"))?;
    Ok(())
}

// Callers wrap this in a transaction; a failed insert must not leave a
// half-replaced key set behind.
fn replace_session_keys(conn: &Connection, shell: ShellId, keys: &SessionKeys) -> Result<()> {
    conn.execute(
        "DELETE FROM session_keys WHERE shell_id = ?",
        [i64::from(shell.0)],
    )?;

    let mut stmt =
        conn.prepare("INSERT INTO session_keys (shell_id, name, fingerprint) VALUES (?, ?, ?)")?;
    for (name, fingerprint) in keys {
        stmt.execute((i64::from(shell.0), name, fingerprint.as_str()))
            .with_context(|| format!("write session key {name} for shell {shell}"))?;
    }

    Ok(())
}
