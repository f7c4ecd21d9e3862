//! The volume service (§6 `volume.*` routes, §4.5 "Volume resolution").
//! Named volumes are directories under `<app_root>/volumes/<name>`; the
//! service is the single source of truth for which names exist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use vessel_shared::{Error, Result};

use crate::db::{VolumeRecord, VolumeStore};

pub struct VolumeService {
    store: VolumeStore,
    volumes_dir: PathBuf,
    cache: RwLock<HashMap<String, VolumeRecord>>,
}

impl VolumeService {
    pub fn new(store: VolumeStore, volumes_dir: PathBuf) -> Result<Arc<Self>> {
        let records = store.list()?;
        let cache = records.into_iter().map(|r| (r.name.clone(), r)).collect();
        Ok(Arc::new(Self {
            store,
            volumes_dir,
            cache: RwLock::new(cache),
        }))
    }

    pub fn create(&self, name: &str, labels: HashMap<String, String>) -> Result<VolumeRecord> {
        if self.cache.read().contains_key(name) {
            return Err(Error::conflict(format!("volume {name} already exists")));
        }
        let path = self.volumes_dir.join(name);
        std::fs::create_dir_all(&path)?;
        let record = VolumeRecord {
            name: name.to_string(),
            path: path.to_string_lossy().into_owned(),
            labels,
        };
        self.store.save(&record)?;
        self.cache.write().insert(name.to_string(), record.clone());
        Ok(record)
    }

    pub fn inspect(&self, name: &str) -> Result<VolumeRecord> {
        self.cache
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("volume {name} not found")))
    }

    pub fn list(&self) -> Vec<VolumeRecord> {
        self.cache.read().values().cloned().collect()
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        if !self.cache.read().contains_key(name) {
            return Err(Error::not_found(format!("volume {name} not found")));
        }
        self.store.remove(name)?;
        self.cache.write().remove(name);
        Ok(())
    }

    /// Resolves a named-volume reference produced by C2 into the host path
    /// the runtime mounts. Per §4.5, a missing volume is a fatal
    /// `InvalidArgument` — pipeline assembly does not auto-create volumes.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.cache
            .read()
            .get(name)
            .map(|r| PathBuf::from(&r.path))
            .ok_or_else(|| Error::invalid_argument(format!("volume {name} does not exist")))
    }

    pub fn volumes_dir(&self) -> &Path {
        &self.volumes_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    fn service() -> (Arc<VolumeService>, TempDir) {
        let db = Database::open_in_memory().unwrap();
        let dir = TempDir::new().unwrap();
        let svc = VolumeService::new(VolumeStore::new(db), dir.path().to_path_buf()).unwrap();
        (svc, dir)
    }

    #[test]
    fn create_then_resolve() {
        let (svc, dir) = service();
        svc.create("data", HashMap::new()).unwrap();
        let path = svc.resolve("data").unwrap();
        assert_eq!(path, dir.path().join("data"));
        assert!(path.is_dir());
    }

    #[test]
    fn resolve_missing_is_invalid_argument() {
        let (svc, _dir) = service();
        let err = svc.resolve("ghost").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn create_duplicate_is_conflict() {
        let (svc, _dir) = service();
        svc.create("data", HashMap::new()).unwrap();
        let err = svc.create("data", HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn delete_missing_is_not_found() {
        let (svc, _dir) = service();
        let err = svc.delete("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn inspect_roundtrips_labels() {
        let (svc, _dir) = service();
        let mut labels = HashMap::new();
        labels.insert("owner".to_string(), "tests".to_string());
        svc.create("data", labels.clone()).unwrap();
        assert_eq!(svc.inspect("data").unwrap().labels, labels);
    }
}
