//! Persistence for container records (§6 "Persisted state layout" — the
//! container service's share of `<app_root>`). Podman-style: a few
//! queryable columns plus a JSON blob holding the full serialized record.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{db_err, Database};
use vessel_shared::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub status: String,
    pub configuration_json: String,
}

#[derive(Clone)]
pub struct ContainerStore {
    db: Database,
}

impl ContainerStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn save(&self, record: &ContainerRecord) -> Result<()> {
        let conn = self.db.conn();
        let now = Utc::now().to_rfc3339();
        db_err!(conn.execute(
            "INSERT INTO containers (id, status, created_at, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data",
            params![record.id, record.status, now, record.configuration_json],
        ))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<ContainerRecord>> {
        let conn = self.db.conn();
        use rusqlite::OptionalExtension;
        let row = db_err!(conn
            .query_row(
                "SELECT id, status, data FROM containers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ContainerRecord {
                        id: row.get(0)?,
                        status: row.get(1)?,
                        configuration_json: row.get(2)?,
                    })
                },
            )
            .optional())?;
        Ok(row)
    }

    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare("SELECT id, status, data FROM containers"))?;
        let rows = db_err!(stmt.query_map([], |row| {
            Ok(ContainerRecord {
                id: row.get(0)?,
                status: row.get(1)?,
                configuration_json: row.get(2)?,
            })
        }))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(db_err!(row)?);
        }
        Ok(out)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let conn = self.db.conn();
        db_err!(conn.execute("DELETE FROM containers WHERE id = ?1", params![id]))?;
        Ok(())
    }
}
