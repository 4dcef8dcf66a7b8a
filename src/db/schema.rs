//! Database schema and types

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS state_scopes (
    scope_key TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_state_scopes_updated ON state_scopes(updated_at DESC);
";

/// Named properties stored under one scope key
pub type PropertyMap = Map<String, Value>;

/// One stored scope document
#[derive(Debug, Clone)]
pub struct ScopeRow {
    #[allow(dead_code)] // Useful when debugging
    pub scope_key: String,
    pub version: u64,
    pub properties: PropertyMap,
    #[allow(dead_code)] // Useful when debugging
    pub updated_at: DateTime<Utc>,
}
