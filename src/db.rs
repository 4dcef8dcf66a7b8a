//! Database module for Niles
//!
//! Provides versioned persistence for scoped bot state.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored state is not valid JSON for scope {scope}: {source}")]
    Corrupt {
        scope: String,
        source: serde_json::Error,
    },
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Scope Operations ====================

    /// Load the stored document for a scope key, if any
    pub fn load_scope(&self, scope_key: &str) -> DbResult<Option<ScopeRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT scope_key, version, data, updated_at FROM state_scopes WHERE scope_key = ?1",
                params![scope_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((scope_key, version, data, updated_at)) = row else {
            return Ok(None);
        };

        let properties = serde_json::from_str(&data).map_err(|source| DbError::Corrupt {
            scope: scope_key.clone(),
            source,
        })?;

        Ok(Some(ScopeRow {
            scope_key,
            version: u64::try_from(version).unwrap_or_default(),
            properties,
            updated_at: parse_datetime(&updated_at),
        }))
    }

    /// Write a scope document.
    ///
    /// With `expected_version = None` the write always wins. With
    /// `Some(v)` the write only happens when the stored version is still `v`
    /// (`Some(0)` meaning "must not exist yet"); `Ok(None)` reports a lost race.
    pub fn store_scope(
        &self,
        scope_key: &str,
        properties: &PropertyMap,
        expected_version: Option<u64>,
    ) -> DbResult<Option<u64>> {
        let data = serde_json::to_string(properties).map_err(|source| DbError::Corrupt {
            scope: scope_key.to_string(),
            source,
        })?;
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;

        match expected_version {
            None => {
                let version: i64 = conn.query_row(
                    "INSERT INTO state_scopes (scope_key, version, data, updated_at)
                     VALUES (?1, 1, ?2, ?3)
                     ON CONFLICT(scope_key) DO UPDATE SET
                        version = state_scopes.version + 1,
                        data = excluded.data,
                        updated_at = excluded.updated_at
                     RETURNING version",
                    params![scope_key, data, now],
                    |row| row.get(0),
                )?;
                Ok(Some(u64::try_from(version).unwrap_or_default()))
            }
            Some(0) => {
                let changed = conn.execute(
                    "INSERT INTO state_scopes (scope_key, version, data, updated_at)
                     VALUES (?1, 1, ?2, ?3)
                     ON CONFLICT(scope_key) DO NOTHING",
                    params![scope_key, data, now],
                )?;
                Ok((changed == 1).then_some(1))
            }
            Some(expected) => {
                let expected = i64::try_from(expected).unwrap_or(i64::MAX);
                let changed = conn.execute(
                    "UPDATE state_scopes SET version = version + 1, data = ?2, updated_at = ?3
                     WHERE scope_key = ?1 AND version = ?4",
                    params![scope_key, data, now, expected],
                )?;
                Ok((changed == 1).then(|| u64::try_from(expected + 1).unwrap_or_default()))
            }
        }
    }

    /// Delete a scope entirely
    #[allow(dead_code)] // API completeness
    pub fn delete_scope(&self, scope_key: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM state_scopes WHERE scope_key = ?1",
            params![scope_key],
        )?;
        Ok(changed > 0)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
