//! Persistence for the container-hosts table the embedded DNS server
//! answers from (§4.7, §6 "DNS listener").

use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::{db_err, Database};
use vessel_shared::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsHostRecord {
    pub hostname: String,
    pub addresses: Vec<String>,
    pub network_id: String,
}

#[derive(Clone)]
pub struct DnsHostStore {
    db: Database,
}

impl DnsHostStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn upsert(&self, record: &DnsHostRecord) -> Result<()> {
        let conn = self.db.conn();
        let addresses = serde_json::to_string(&record.addresses)
            .map_err(|e| vessel_shared::Error::internal(format!("serialize addresses: {e}")))?;
        db_err!(conn.execute(
            "INSERT INTO dns_hosts (hostname, addresses, network_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(hostname) DO UPDATE SET addresses = excluded.addresses, network_id = excluded.network_id",
            params![record.hostname, addresses, record.network_id],
        ))?;
        Ok(())
    }

    pub fn remove_for_network(&self, network_id: &str) -> Result<()> {
        let conn = self.db.conn();
        db_err!(conn.execute(
            "DELETE FROM dns_hosts WHERE network_id = ?1",
            params![network_id],
        ))?;
        Ok(())
    }

    pub fn lookup(&self, hostname: &str) -> Result<Option<Vec<String>>> {
        let conn = self.db.conn();
        use rusqlite::OptionalExtension;
        let addresses: Option<String> = db_err!(conn
            .query_row(
                "SELECT addresses FROM dns_hosts WHERE hostname = ?1",
                params![hostname],
                |row| row.get(0),
            )
            .optional())?;
        addresses
            .map(|json| {
                serde_json::from_str(&json)
                    .map_err(|e| vessel_shared::Error::internal(format!("deserialize addresses: {e}")))
            })
            .transpose()
    }

    pub fn all(&self) -> Result<Vec<DnsHostRecord>> {
        let conn = self.db.conn();
        let mut stmt = db_err!(conn.prepare("SELECT hostname, addresses, network_id FROM dns_hosts"))?;
        let rows = db_err!(stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        }))?;
        let mut out = Vec::new();
        for row in rows {
            let (hostname, addresses_json, network_id) = db_err!(row)?;
            let addresses = serde_json::from_str(&addresses_json)
                .map_err(|e| vessel_shared::Error::internal(format!("deserialize addresses: {e}")))?;
            out.push(DnsHostRecord {
                hostname,
                addresses,
                network_id,
            });
        }
        Ok(out)
    }
}
