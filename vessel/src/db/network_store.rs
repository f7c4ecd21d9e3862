//! Persistence for network records (§3 "Attachment", §4.7 default network).

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{db_err, Database};
use vessel_shared::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    Running,
    Stopped,
}

impl NetworkStatus {
    fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Running => "running",
            NetworkStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    pub status: NetworkStatus,
    pub mode: String,
    pub gateway: Option<String>,
}

#[derive(Clone)]
pub struct NetworkStore {
    db: Database,
}

impl NetworkStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn save(&self, record: &NetworkRecord) -> Result<()> {
        let conn = self.db.conn();
        let now = Utc::now().to_rfc3339();
        let data = serde_json::to_string(record)
            .map_err(|e| vessel_shared::Error::internal(format!("serialize network: {e}")))?;
        db_err!(conn.execute(
            "INSERT INTO networks (id, status, created_at, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, data = excluded.data",
            params![record.id, record.status.as_str(), now, data],
        ))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<NetworkRecord>> {
        let conn = self.db.conn();
        let data: Option<String> = db_err!(conn
            .query_row("SELECT data FROM networks WHERE id = ?1", params![id], |row| row.get(0))
            .optional())?;
        data.map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| vessel_shared::Error::internal(format!("deserialize network: {e}")))
        })
        .transpose()
    }

    pub fn list(&self) -> Result<Vec<NetworkRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare("SELECT data FROM networks"))?;
        let rows = db_err!(stmt.query_map([], |row| row.get::<_, String>(0)))?;
        let mut out = Vec::new();
        for row in rows {
            let json = db_err!(row)?;
            out.push(
                serde_json::from_str(&json)
                    .map_err(|e| vessel_shared::Error::internal(format!("deserialize network: {e}")))?,
            );
        }
        Ok(out)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let conn = self.db.conn();
        db_err!(conn.execute("DELETE FROM networks WHERE id = ?1", params![id]))?;
        Ok(())
    }
}
