//! Persistence for named-volume records (§3 "Named volume").

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{db_err, Database};
use vessel_shared::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub name: String,
    pub path: String,
    pub labels: std::collections::HashMap<String, String>,
}

#[derive(Clone)]
pub struct VolumeStore {
    db: Database,
}

impl VolumeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn save(&self, record: &VolumeRecord) -> Result<()> {
        let conn = self.db.conn();
        let now = Utc::now().to_rfc3339();
        let data = serde_json::to_string(record)
            .map_err(|e| vessel_shared::Error::internal(format!("serialize volume: {e}")))?;
        db_err!(conn.execute(
            "INSERT INTO volumes (name, created_at, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET data = excluded.data",
            params![record.name, now, data],
        ))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<VolumeRecord>> {
        let conn = self.db.conn();
        let data: Option<String> = db_err!(conn
            .query_row("SELECT data FROM volumes WHERE name = ?1", params![name], |row| row
                .get(0))
            .optional())?;
        data.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| vessel_shared::Error::internal(format!("deserialize volume: {e}")))
        })
        .transpose()
    }

    pub fn list(&self) -> Result<Vec<VolumeRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare("SELECT data FROM volumes"))?;
        let rows = db_err!(stmt.query_map([], |row| row.get::<_, String>(0)))?;
        let mut out = Vec::new();
        for row in rows {
            let json = db_err!(row)?;
            out.push(
                serde_json::from_str(&json)
                    .map_err(|e| vessel_shared::Error::internal(format!("deserialize volume: {e}")))?,
            );
        }
        Ok(out)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let conn = self.db.conn();
        db_err!(conn.execute("DELETE FROM volumes WHERE name = ?1", params![name]))?;
        Ok(())
    }
}
