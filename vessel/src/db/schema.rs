//! SQL schema for daemon-owned persisted state.
//!
//! Each table follows the same shape: a natural-key primary column, a few
//! queryable columns pulled out for indexing, and a `data` JSON blob holding
//! the full serialized entity. This mirrors the teacher's box-metadata table
//! design (queryable columns + JSON blob for flexibility).

pub const SCHEMA_VERSION: i32 = 1;

pub fn all_schemas() -> Vec<&'static str> {
    vec![
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY,
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );",
        "CREATE TABLE IF NOT EXISTS containers (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            data TEXT NOT NULL
        );",
        "CREATE TABLE IF NOT EXISTS networks (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            data TEXT NOT NULL
        );",
        "CREATE TABLE IF NOT EXISTS volumes (
            name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            data TEXT NOT NULL
        );",
        "CREATE TABLE IF NOT EXISTS dns_hosts (
            hostname TEXT PRIMARY KEY,
            addresses TEXT NOT NULL,
            network_id TEXT NOT NULL
        );",
    ]
}
