//! The network service (§4.7 stage 5 "ensure default network", §6
//! `network.*` routes). Owns the daemon's network inventory and the
//! container-hosts table the DNS listener answers from.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use vessel_shared::{constants, Error, Result};

use crate::db::{DnsHostRecord, DnsHostStore, NetworkRecord, NetworkStatus, NetworkStore};

/// In-memory cache over [`NetworkStore`], database-first on every mutation:
/// every `create`/`delete` writes through to SQLite before the cache is
/// updated, so a crash between the two never leaves the cache ahead of the
/// database.
pub struct NetworkService {
    store: NetworkStore,
    hosts: DnsHostStore,
    cache: RwLock<HashMap<String, NetworkRecord>>,
}

impl NetworkService {
    pub fn new(store: NetworkStore, hosts: DnsHostStore) -> Result<Arc<Self>> {
        let records = store.list()?;
        let cache = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Ok(Arc::new(Self {
            store,
            hosts,
            cache: RwLock::new(cache),
        }))
    }

    /// Idempotently ensures the default NAT network exists, per §4.7 stage
    /// 5. Called once during daemon bootstrap.
    pub fn ensure_default(&self) -> Result<()> {
        if self.cache.read().contains_key(constants::DEFAULT_NETWORK_NAME) {
            return Ok(());
        }
        self.create(constants::DEFAULT_NETWORK_NAME, "nat")?;
        Ok(())
    }

    pub fn create(&self, id: &str, mode: &str) -> Result<NetworkRecord> {
        if self.cache.read().contains_key(id) {
            return Err(Error::conflict(format!("network {id} already exists")));
        }
        let record = NetworkRecord {
            id: id.to_string(),
            status: NetworkStatus::Running,
            mode: mode.to_string(),
            gateway: None,
        };
        self.store.save(&record)?;
        self.cache.write().insert(id.to_string(), record.clone());
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Option<NetworkRecord> {
        self.cache.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<NetworkRecord> {
        self.cache.read().values().cloned().collect()
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.cache.read().contains_key(id) {
            return Err(Error::not_found(format!("network {id} not found")));
        }
        self.store.remove(id)?;
        self.hosts.remove_for_network(id)?;
        self.cache.write().remove(id);
        Ok(())
    }

    /// Registers a container's hostname against a network's attachment
    /// (§3 "Attachment"), so the DNS listener can resolve it.
    pub fn register_attachment(
        &self,
        network_id: &str,
        hostname: &str,
        addresses: Vec<String>,
    ) -> Result<()> {
        if !self.cache.read().contains_key(network_id) {
            return Err(Error::not_found(format!("network {network_id} not found")));
        }
        self.hosts.upsert(&DnsHostRecord {
            hostname: hostname.to_string(),
            addresses,
            network_id: network_id.to_string(),
        })
    }

    /// Resolves a hostname against the container-hosts table, per §6 "DNS
    /// listener": `Some(addrs)` on a hit, `None` meaning NXDOMAIN.
    pub fn resolve_hostname(&self, hostname: &str) -> Result<Option<Vec<String>>> {
        self.hosts.lookup(hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn service() -> Arc<NetworkService> {
        let db = Database::open_in_memory().unwrap();
        NetworkService::new(NetworkStore::new(db.clone()), DnsHostStore::new(db)).unwrap()
    }

    #[test]
    fn ensure_default_is_idempotent() {
        let svc = service();
        svc.ensure_default().unwrap();
        svc.ensure_default().unwrap();
        assert_eq!(svc.list().len(), 1);
    }

    #[test]
    fn create_duplicate_is_conflict() {
        let svc = service();
        svc.create("net1", "nat").unwrap();
        let err = svc.create("net1", "nat").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let svc = service();
        let err = svc.delete("nope").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn delete_clears_attached_hosts() {
        let svc = service();
        svc.create("net1", "nat").unwrap();
        svc.register_attachment("net1", "web", vec!["10.0.0.2".into()])
            .unwrap();
        assert_eq!(svc.resolve_hostname("web").unwrap().unwrap(), vec!["10.0.0.2"]);
        svc.delete("net1").unwrap();
        assert!(svc.resolve_hostname("web").unwrap().is_none());
    }

    #[test]
    fn attach_to_missing_network_is_not_found() {
        let svc = service();
        let err = svc
            .register_attachment("ghost", "web", vec!["10.0.0.2".into()])
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
