//! Database layer for the `vessel` daemon.
//!
//! Provides SQLite-based persistence for daemon-owned entity state
//! (kernels, networks, volumes) using a Podman-style pattern: a small
//! set of queryable columns plus a JSON blob for the full entity. Every
//! service singleton in [`crate::services`] wraps a [`Database`] handle
//! to persist before it updates its in-memory cache, the same
//! database-first ordering the teacher runtime uses for its box cache.

mod container_store;
mod dns_store;
mod network_store;
mod schema;
mod volume_store;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

use vessel_shared::Error;
use vessel_shared::Result;

pub use container_store::{ContainerRecord, ContainerStore};
pub use dns_store::{DnsHostRecord, DnsHostStore};
pub use network_store::{NetworkRecord, NetworkStatus, NetworkStore};
pub use volume_store::{VolumeRecord, VolumeStore};

/// Helper macro to convert rusqlite errors to [`Error::Internal`].
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| Error::Internal(format!("database error: {e}")))
    };
}

pub(crate) use db_err;

/// SQLite database handle.
///
/// Thread-safe via `parking_lot::Mutex`. Domain-specific stores
/// (`KernelStore`, `NetworkStore`, `VolumeStore` in [`crate::services`])
/// wrap this to provide their APIs.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(db_path))?;

        // - WAL mode: better concurrent read performance
        // - FULL sync: maximum durability (fsync after each transaction)
        // - Foreign keys: referential integrity
        // - Busy timeout: 100s to handle long operations
        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=100000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database, used by unit tests that don't need a
    /// file on disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = db_err!(Connection::open_in_memory())?;
        db_err!(conn.execute_batch("PRAGMA foreign_keys=ON;"))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the database connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        for sql in schema::all_schemas() {
            db_err!(conn.execute_batch(sql))?;
        }

        let current_version: Option<i32> = db_err!(
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        )?;

        match current_version {
            None => {
                let now = Utc::now().to_rfc3339();
                db_err!(conn.execute(
                    "INSERT INTO schema_version (id, version, updated_at) VALUES (1, ?1, ?2)",
                    rusqlite::params![schema::SCHEMA_VERSION, now],
                ))?;
                tracing::info!(
                    "initialized database schema version {}",
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) if v < schema::SCHEMA_VERSION => {
                tracing::warn!(
                    "database schema version {} is older than current {}; migrations not yet implemented",
                    v,
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::Internal(format!(
                    "database schema version {} is newer than supported {}; please upgrade vessel",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }
}
