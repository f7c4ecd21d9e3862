//! Application root resolution and daemon-wide options (§0.3 of the
//! expanded spec). Mirrors the teacher's `FilesystemLayout`: a single
//! struct that knows where every daemon-owned subdirectory lives and is
//! responsible for creating them on first use.

use std::path::{Path, PathBuf};

use vessel_shared::constants::{
    APP_ROOT_DIR_NAME, APP_ROOT_ENV, DB_FILE_NAME, IMAGES_DIR, KERNELS_DIR, LOGS_DIR,
    NETWORKS_DIR, PLUGINS_DIR, VOLUMES_DIR,
};
use vessel_shared::Result;

/// Typed accessors over `<app_root>/...`. Never changes after construction;
/// shared read-only by every service singleton.
#[derive(Debug, Clone)]
pub struct FilesystemLayout {
    home_dir: PathBuf,
}

impl FilesystemLayout {
    /// Resolves the application root: `CONTAINER_APP_ROOT` if set and
    /// non-empty, else the platform application-support directory joined
    /// with [`APP_ROOT_DIR_NAME`] (§6 "Environment variables").
    pub fn resolve() -> Result<Self> {
        let home_dir = match std::env::var(APP_ROOT_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::data_dir()
                .ok_or_else(|| {
                    vessel_shared::Error::internal("could not determine application-support directory")
                })?
                .join(APP_ROOT_DIR_NAME),
        };
        Ok(Self { home_dir })
    }

    /// Builds a layout rooted at an explicit directory, bypassing
    /// environment resolution. Used by tests and by `--app-root` overrides.
    pub fn at(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
        }
    }

    /// Creates every daemon-owned subdirectory. Idempotent.
    pub fn prepare(&self) -> Result<()> {
        for dir in [
            self.kernels_dir(),
            self.networks_dir(),
            self.volumes_dir(),
            self.logs_dir(),
            self.plugins_dir(),
            self.images_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn kernels_dir(&self) -> PathBuf {
        self.home_dir.join(KERNELS_DIR)
    }

    pub fn networks_dir(&self) -> PathBuf {
        self.home_dir.join(NETWORKS_DIR)
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.home_dir.join(VOLUMES_DIR)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join(LOGS_DIR)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.home_dir.join(PLUGINS_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.home_dir.join(IMAGES_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.home_dir.join(DB_FILE_NAME)
    }

    pub fn rpc_socket_path(&self) -> PathBuf {
        self.home_dir.join(vessel_shared::constants::RPC_SOCKET_NAME)
    }

    /// Plugin directories to scan, in precedence order (§4.7 step 2):
    /// user plugins dir under the install root, the application-bundle
    /// plugins dir, then the install-root libexec plugins dir.
    /// Non-existent directories are filtered out by the caller (the
    /// plugin loader), not here.
    pub fn plugin_scan_dirs(&self, install_root: &Path) -> Vec<PathBuf> {
        vec![
            install_root.join("plugins"),
            install_root.join("Contents/PlugIns"),
            install_root.join("libexec/plugins"),
        ]
    }
}

/// Daemon-wide options constructed from environment variables and CLI
/// flags at startup (§0.3). Not a dynamic config-reload system: these
/// fields are read once, at bootstrap.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub layout: FilesystemLayout,
    pub dns_bind_addr: String,
    pub default_network_mode: String,
    pub default_dns_domain: Option<String>,
    pub install_root: PathBuf,
}

impl DaemonOptions {
    pub fn from_env() -> Result<Self> {
        let layout = FilesystemLayout::resolve()?;
        let install_root = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("/usr/local"));
        Ok(Self {
            layout,
            dns_bind_addr: vessel_shared::constants::DNS_BIND_ADDR.to_string(),
            default_network_mode: "nat".to_string(),
            default_dns_domain: Some("container.local".to_string()),
            install_root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        let temp = tempfile::TempDir::new().unwrap();
        std::env::set_var(APP_ROOT_ENV, temp.path());
        let layout = FilesystemLayout::resolve().unwrap();
        assert_eq!(layout.home_dir(), temp.path());
        std::env::remove_var(APP_ROOT_ENV);
    }

    #[test]
    fn prepare_creates_subdirectories() {
        let temp = tempfile::TempDir::new().unwrap();
        let layout = FilesystemLayout::at(temp.path());
        layout.prepare().unwrap();
        assert!(layout.kernels_dir().is_dir());
        assert!(layout.networks_dir().is_dir());
        assert!(layout.volumes_dir().is_dir());
        assert!(layout.logs_dir().is_dir());
        assert!(layout.plugins_dir().is_dir());
        assert!(layout.images_dir().is_dir());
    }
}
