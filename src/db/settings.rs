use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::models::Setting;
use crate::ports::SettingsStore;

/// User defaults stored in the registry database.
#[derive(Clone)]
pub struct SettingsRepo {
    db: Database,
}

impl SettingsRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Overwrite rows with the given settings in one transaction.
    pub fn apply_records(&self, settings: &[Setting]) -> Result<usize> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        for setting in settings {
            tx.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                (
                    &setting.key,
                    &setting.value,
                    setting.updated_at.to_rfc3339(),
                ),
            )?;
        }
        tx.commit()?;
        Ok(settings.len())
    }
}

impl SettingsStore for SettingsRepo {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.db.lock()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<Setting> {
        let conn = self.db.lock()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            (key, value, now.to_rfc3339()),
        )?;

        Ok(Setting {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now,
        })
    }

    fn list(&self) -> Result<Vec<Setting>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM settings ORDER BY key")?;

        let settings = stmt
            .query_map([], row_to_setting)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(settings)
    }
}

fn row_to_setting(row: &Row<'_>) -> rusqlite::Result<Setting> {
    Ok(Setting {
        key: row.get(0)?,
        value: row.get(1)?,
        updated_at: parse_datetime(2, row.get(2)?)?,
    })
}
