//! SQLite-backed variable store.
//! One `variables` table of JSON values; survives restarts and is shared by
//! the `run`, `watch`, `cache` and `var` commands.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use courtwatch_core::error::{CourtwatchError, Result};
use courtwatch_core::store::VariableStore;
use rusqlite::OptionalExtension;
use serde_json::Value;

/// A stored variable with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRecord {
    pub key: String,
    pub value: Value,
    pub description: Option<String>,
    pub updated_at: String,
}

pub struct SqliteVariableStore {
    conn: Mutex<rusqlite::Connection>,
}

fn db_err(e: impl std::fmt::Display) -> CourtwatchError {
    CourtwatchError::Store(e.to_string())
}

impl SqliteVariableStore {
    /// Open or create the database, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = rusqlite::Connection::open(path).map_err(|e| db_err(format!("DB open: {e}")))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS variables (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,            -- JSON
                description TEXT,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| db_err(format!("Migration: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| CourtwatchError::Store("variable store lock poisoned".into()))
    }

    /// Full record for `key`, including description and timestamp.
    pub fn record(&self, key: &str) -> Result<Option<VariableRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT key, value, description, updated_at FROM variables WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(key, raw, description, updated_at)| {
            let value = serde_json::from_str(&raw)
                .map_err(|e| db_err(format!("variable '{key}' is not valid JSON: {e}")))?;
            Ok(VariableRecord {
                key,
                value,
                description,
                updated_at,
            })
        })
        .transpose()
    }

    /// All variable keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM variables ORDER BY key")
            .map_err(db_err)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(keys)
    }
}

impl VariableStore for SqliteVariableStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.record(key)?.map(|r| r.value))
    }

    fn set(&self, key: &str, value: &Value, description: Option<&str>) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.conn()?
            .execute(
                "INSERT INTO variables (key, value, description, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    description = COALESCE(excluded.description, variables.description),
                    updated_at = excluded.updated_at",
                rusqlite::params![key, raw, description, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM variables WHERE key = ?1", [key])
            .map_err(db_err)?;
        Ok(removed > 0)
    }
}
