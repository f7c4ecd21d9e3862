//! Container service (§6 `container.*` routes). Owns the daemon's
//! container inventory; the actual VM lifecycle (boot, dial, process
//! control) is an out-of-scope external collaborator (§1) reached through
//! [`ContainerRuntime`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use vessel_shared::{Error, Result};

use crate::config::types::{ContainerConfiguration, Kernel};
use crate::db::{ContainerRecord, ContainerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
}

/// The out-of-scope VM runtime (§1 "the low-level container/VM runtime").
/// A concrete implementation owns virtio transport and the guest init
/// process; this trait is the one seam the container service reaches
/// through to drive it.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn bootstrap(&self, configuration: &ContainerConfiguration, kernel: &Kernel) -> Result<()>;
    async fn dial(&self, id: &str, port: u32) -> Result<()>;
    async fn stop(&self, id: &str) -> Result<()>;
    async fn start_process(&self, id: &str) -> Result<()>;
    async fn create_process(&self, id: &str, process: &crate::config::types::ProcessConfiguration) -> Result<()>;
    async fn resize(&self, id: &str, columns: u32, rows: u32) -> Result<()>;
    async fn wait(&self, id: &str) -> Result<i32>;
    async fn kill(&self, id: &str, signal: i32) -> Result<()>;
    async fn logs(&self, id: &str) -> Result<mpsc::Receiver<Vec<u8>>>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    configuration: ContainerConfiguration,
    status: ContainerStatus,
}

/// Database-first cache over [`ContainerStore`], mirroring the pattern
/// already used by [`crate::services::NetworkService`] and
/// [`crate::services::VolumeService`]: every mutation writes through to
/// SQLite before the in-memory cache is updated.
pub struct ContainerService {
    store: ContainerStore,
    runtime: Arc<dyn ContainerRuntime>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    /// Serialises mutating operations per container id (§5 "the container,
    /// network, and volume services serialise mutating operations
    /// per-entity").
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContainerService {
    pub fn new(store: ContainerStore, runtime: Arc<dyn ContainerRuntime>) -> Result<Arc<Self>> {
        let records = store.list()?;
        let mut cache = HashMap::new();
        for record in records {
            let configuration: ContainerConfiguration = serde_json::from_str(&record.configuration_json)
                .map_err(|e| Error::internal(format!("deserialize container configuration: {e}")))?;
            let status = parse_status(&record.status)?;
            cache.insert(record.id, CacheEntry { configuration, status });
        }
        Ok(Arc::new(Self {
            store,
            runtime,
            cache: RwLock::new(cache),
            locks: Mutex::new(HashMap::new()),
        }))
    }

    fn entity_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(id.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))))
    }

    pub async fn create(&self, configuration: ContainerConfiguration, kernel: Kernel) -> Result<()> {
        let lock = self.entity_lock(&configuration.id);
        let _guard = lock.lock().await;

        if self.cache.read().contains_key(&configuration.id) {
            return Err(Error::conflict(format!("container {} already exists", configuration.id)));
        }

        self.runtime.bootstrap(&configuration, &kernel).await?;

        let record = ContainerRecord {
            id: configuration.id.clone(),
            status: "created".to_string(),
            configuration_json: serde_json::to_string(&configuration)
                .map_err(|e| Error::internal(format!("serialize container configuration: {e}")))?,
        };
        self.store.save(&record)?;
        self.cache.write().insert(
            configuration.id.clone(),
            CacheEntry {
                configuration,
                status: ContainerStatus::Created,
            },
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<ContainerConfiguration> {
        self.cache.read().get(id).map(|e| e.configuration.clone())
    }

    /// Re-invokes the runtime's bootstrap step for an already-persisted
    /// container (`container.bootstrap`, distinct from `container.create`).
    /// The runtime itself holds no state across a daemon restart, so a
    /// container recovered from the database needs its VM launched again
    /// before any other lifecycle call can reach it.
    pub async fn bootstrap(&self, id: &str, kernel: &Kernel) -> Result<()> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        let configuration = self
            .cache
            .read()
            .get(id)
            .map(|e| e.configuration.clone())
            .ok_or_else(|| Error::not_found(format!("container {id} not found")))?;

        self.runtime.bootstrap(&configuration, kernel).await
    }

    pub fn list(&self) -> Vec<ContainerConfiguration> {
        self.cache.read().values().map(|e| e.configuration.clone()).collect()
    }

    /// Deletes a container. Per §7 "user-visible behaviour": deleting a
    /// builder container that does not exist is not an error — any other
    /// container id that does not exist still is.
    pub async fn delete(&self, id: &str, is_builder: bool) -> Result<()> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        if !self.cache.read().contains_key(id) {
            if is_builder {
                return Ok(());
            }
            return Err(Error::not_found(format!("container {id} not found")));
        }

        self.runtime.stop(id).await.ok();
        self.store.remove(id)?;
        self.cache.write().remove(id);
        Ok(())
    }

    pub async fn dial(&self, id: &str, port: u32) -> Result<()> {
        self.ensure_known(id)?;
        self.runtime.dial(id, port).await
    }

    pub async fn start_process(&self, id: &str) -> Result<()> {
        self.ensure_known(id)?;
        self.runtime.start_process(id).await
    }

    pub async fn create_process(&self, id: &str, process: &crate::config::types::ProcessConfiguration) -> Result<()> {
        self.ensure_known(id)?;
        self.runtime.create_process(id, process).await
    }

    pub async fn resize(&self, id: &str, columns: u32, rows: u32) -> Result<()> {
        self.ensure_known(id)?;
        self.runtime.resize(id, columns, rows).await
    }

    pub async fn wait(&self, id: &str) -> Result<i32> {
        self.ensure_known(id)?;
        self.runtime.wait(id).await
    }

    pub async fn kill(&self, id: &str, signal: i32) -> Result<()> {
        self.ensure_known(id)?;
        self.runtime.kill(id, signal).await
    }

    pub async fn logs(&self, id: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        self.ensure_known(id)?;
        self.runtime.logs(id).await
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;
        self.ensure_known(id)?;
        self.runtime.stop(id).await?;
        if let Some(entry) = self.cache.write().get_mut(id) {
            entry.status = ContainerStatus::Stopped;
        }
        Ok(())
    }

    fn ensure_known(&self, id: &str) -> Result<()> {
        if self.cache.read().contains_key(id) {
            Ok(())
        } else {
            Err(Error::not_found(format!("container {id} not found")))
        }
    }
}

fn parse_status(s: &str) -> Result<ContainerStatus> {
    match s {
        "created" => Ok(ContainerStatus::Created),
        "running" => Ok(ContainerStatus::Running),
        "stopped" => Ok(ContainerStatus::Stopped),
        other => Err(Error::internal(format!("unknown container status: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{Platform, ProcessConfiguration, User, VirtualizationOptions};
    use crate::db::Database;

    struct NoopRuntime;

    #[async_trait]
    impl ContainerRuntime for NoopRuntime {
        async fn bootstrap(&self, _configuration: &ContainerConfiguration, _kernel: &Kernel) -> Result<()> {
            Ok(())
        }
        async fn dial(&self, _id: &str, _port: u32) -> Result<()> {
            Ok(())
        }
        async fn stop(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn start_process(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn create_process(&self, _id: &str, _process: &ProcessConfiguration) -> Result<()> {
            Ok(())
        }
        async fn resize(&self, _id: &str, _columns: u32, _rows: u32) -> Result<()> {
            Ok(())
        }
        async fn wait(&self, _id: &str) -> Result<i32> {
            Ok(0)
        }
        async fn kill(&self, _id: &str, _signal: i32) -> Result<()> {
            Ok(())
        }
        async fn logs(&self, _id: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    fn configuration(id: &str) -> ContainerConfiguration {
        ContainerConfiguration {
            id: id.to_string(),
            image_reference: "example/image:latest".to_string(),
            process: ProcessConfiguration {
                executable: "/app".to_string(),
                arguments: vec![],
                env: vec![],
                working_directory: "/".to_string(),
                terminal: false,
                user: User::Id(0, 0),
                supplemental_groups: vec![],
            },
            cpus: None,
            memory_bytes: None,
            platform: Platform::new("linux", "arm64"),
            mounts: vec![],
            networks: vec![],
            dns: None,
            labels: HashMap::new(),
            ports: vec![],
            sockets: vec![],
            ssh: false,
            rosetta: false,
            virtualization: VirtualizationOptions::default(),
        }
    }

    fn kernel() -> Kernel {
        Kernel {
            path: "/tmp/kernel".into(),
            platform: "arm64".to_string(),
        }
    }

    fn service() -> Arc<ContainerService> {
        let db = Database::open_in_memory().unwrap();
        ContainerService::new(ContainerStore::new(db), Arc::new(NoopRuntime)).unwrap()
    }

    #[tokio::test]
    async fn create_then_get() {
        let svc = service();
        svc.create(configuration("c1"), kernel()).await.unwrap();
        assert!(svc.get("c1").is_some());
    }

    #[tokio::test]
    async fn create_duplicate_is_conflict() {
        let svc = service();
        svc.create(configuration("c1"), kernel()).await.unwrap();
        let err = svc.create(configuration("c1"), kernel()).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_missing_non_builder_is_not_found() {
        let svc = service();
        let err = svc.delete("ghost", false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_missing_builder_is_not_an_error() {
        let svc = service();
        svc.delete("ghost-builder", true).await.unwrap();
    }

    #[tokio::test]
    async fn delete_existing_removes_from_cache() {
        let svc = service();
        svc.create(configuration("c1"), kernel()).await.unwrap();
        svc.delete("c1", false).await.unwrap();
        assert!(svc.get("c1").is_none());
    }

    #[tokio::test]
    async fn operations_on_unknown_container_are_not_found() {
        let svc = service();
        assert!(svc.dial("ghost", 80).await.is_err());
        assert!(svc.wait("ghost").await.is_err());
    }
}
