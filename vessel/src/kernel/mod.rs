//! Kernel service (C6, §4.6). Maintains `<app_root>/kernels/`: kernel
//! binaries plus a `default.kernel-<arch>` symlink per architecture.
//!
//! Operations are serialised with a `tokio::sync::Mutex` guarding the
//! directory (§5 "actor-style serialisation", §9 design note) rather than
//! relying on filesystem-level locking, matching the single-writer
//! coordination pattern the rest of this crate's services use.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::types::Kernel;
use vessel_shared::constants::DEFAULT_KERNEL_PREFIX;
use vessel_shared::{Error, Result};

/// Fetches a kernel tar artifact from wherever `source` names it. The wire
/// protocol (HTTP, registry blob, etc.) is out of scope (§1); this is the
/// seam an external fetch implementation plugs into.
#[async_trait]
pub trait KernelArtifactFetcher: Send + Sync {
    async fn fetch(&self, source: &str, destination: &Path) -> Result<()>;
}

pub struct KernelService {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl KernelService {
    pub fn new(kernels_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&kernels_dir)?;
        Ok(Self {
            dir: kernels_dir,
            lock: Mutex::new(()),
        })
    }

    fn default_link_path(&self, arch: &str) -> PathBuf {
        self.dir.join(format!("{DEFAULT_KERNEL_PREFIX}{arch}"))
    }

    /// Installs a kernel from a local file (§4.6 "Install from file").
    ///
    /// Copies `source` into the kernels directory, then creates or replaces
    /// the `default.kernel-<arch>` symlink. If the symlink step fails, the
    /// copied file is removed (atomic rollback) — no kernel is left
    /// half-installed.
    pub async fn install_from_file(&self, source: &Path, arch: &str, force: bool) -> Result<Kernel> {
        let _guard = self.lock.lock().await;

        let file_name = source
            .file_name()
            .ok_or_else(|| Error::invalid_argument("kernel source has no file name"))?;
        let dest = self.dir.join(file_name);

        if dest.exists() && !force {
            return Err(Error::invalid_argument(format!(
                "kernel artifact already exists at {}; pass force to replace",
                dest.display()
            )));
        }

        std::fs::copy(source, &dest)?;

        if let Err(e) = self.set_default_link(&dest, arch) {
            let _ = std::fs::remove_file(&dest);
            return Err(e);
        }

        Ok(Kernel {
            path: dest,
            platform: arch.to_string(),
        })
    }

    /// Installs a kernel from a tar archive (§4.6 "Install from tar").
    ///
    /// If `source` is not an existing local path, it is fetched via
    /// `fetcher` to a temporary file first. The requested `path_in_tar`
    /// entry is extracted; if that entry is a symlink, the archive is
    /// reopened and the symlink's target (path-normalised: `.`/`..`
    /// collapsed) is extracted instead. The result is written atomically
    /// (temp file + rename) before handing off to
    /// [`KernelService::install_from_file`].
    pub async fn install_from_tar(
        &self,
        source: &str,
        path_in_tar: &str,
        arch: &str,
        force: bool,
        fetcher: &dyn KernelArtifactFetcher,
    ) -> Result<Kernel> {
        let local_source_path = Path::new(source);
        let temp_dir = tempfile::tempdir().map_err(Error::from)?;

        let tar_path = if local_source_path.exists() {
            local_source_path.to_path_buf()
        } else {
            let dest = temp_dir.path().join("kernel.tar");
            fetcher.fetch(source, &dest).await?;
            dest
        };

        let extracted = extract_kernel_entry(&tar_path, path_in_tar)?;

        let staged = temp_dir.path().join("kernel.img");
        std::fs::write(&staged, extracted)?;

        self.install_from_file(&staged, arch, force).await
    }

    /// Resolves the `default.kernel-<arch>` symlink (§4.6 "Get default").
    pub fn get_default(&self, arch: &str) -> Result<Kernel> {
        let link = self.default_link_path(arch);
        let target = std::fs::read_link(&link).map_err(|_| {
            Error::not_found(format!("no default kernel installed for architecture {arch}"))
        })?;
        let resolved = if target.is_absolute() {
            target
        } else {
            self.dir.join(target)
        };
        Ok(Kernel {
            path: resolved,
            platform: arch.to_string(),
        })
    }

    fn set_default_link(&self, target: &Path, arch: &str) -> Result<()> {
        let link = self.default_link_path(arch);
        if link.exists() || std::fs::symlink_metadata(&link).is_ok() {
            std::fs::remove_file(&link)?;
        }
        std::os::unix::fs::symlink(target, &link)?;
        Ok(())
    }
}

/// Normalises a tar path: collapses `.` and `..` components without
/// touching the filesystem.
fn normalize_tar_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

enum TarEntryLookup {
    Data(Vec<u8>),
    SymlinkTo(PathBuf),
}

fn find_tar_entry(tar_path: &Path, wanted: &Path) -> Result<Option<TarEntryLookup>> {
    let file = std::fs::File::open(tar_path)?;
    let mut archive = tar::Archive::new(file);
    for entry in archive
        .entries()
        .map_err(|e| Error::internal(format!("tar read error: {e}")))?
    {
        let mut entry = entry.map_err(|e| Error::internal(format!("tar entry error: {e}")))?;
        let entry_path = entry
            .path()
            .map_err(|e| Error::internal(format!("tar entry path error: {e}")))?
            .into_owned();
        if normalize_tar_path(&entry_path) != *wanted {
            continue;
        }

        if entry.header().entry_type().is_symlink() {
            let link_target = entry
                .link_name()
                .map_err(|e| Error::internal(format!("tar symlink read error: {e}")))?
                .ok_or_else(|| Error::internal("symlink entry missing target"))?
                .into_owned();
            let base = wanted.parent().unwrap_or_else(|| Path::new(""));
            return Ok(Some(TarEntryLookup::SymlinkTo(normalize_tar_path(
                &base.join(link_target),
            ))));
        }

        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut buf).map_err(Error::from)?;
        return Ok(Some(TarEntryLookup::Data(buf)));
    }
    Ok(None)
}

fn extract_kernel_entry(tar_path: &Path, path_in_tar: &str) -> Result<Vec<u8>> {
    let wanted = normalize_tar_path(Path::new(path_in_tar));
    match find_tar_entry(tar_path, &wanted)? {
        Some(TarEntryLookup::Data(data)) => Ok(data),
        Some(TarEntryLookup::SymlinkTo(target)) => match find_tar_entry(tar_path, &target)? {
            Some(TarEntryLookup::Data(data)) => Ok(data),
            _ => Err(Error::not_found(format!(
                "kernel tar symlink target not found: {}",
                target.display()
            ))),
        },
        None => Err(Error::not_found(format!(
            "kernel tar entry not found: {path_in_tar}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_test_tar(path: &Path, entries: &[(&str, &[u8])], symlinks: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        for (name, target) in symlinks {
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Symlink);
            header.set_size(0);
            header.set_mode(0o777);
            header.set_cksum();
            builder.append_link(&mut header, name, target).unwrap();
        }
        builder.finish().unwrap();
    }

    #[tokio::test]
    async fn install_from_file_and_get_default() {
        let app_root = TempDir::new().unwrap();
        let service = KernelService::new(app_root.path().join("kernels")).unwrap();

        let source_dir = TempDir::new().unwrap();
        let source_file = source_dir.path().join("vmlinux");
        std::fs::write(&source_file, b"kernel-bytes").unwrap();

        let kernel = service
            .install_from_file(&source_file, "arm64", false)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&kernel.path).unwrap(), b"kernel-bytes");

        let default = service.get_default("arm64").unwrap();
        assert_eq!(default.path, kernel.path);
    }

    #[tokio::test]
    async fn get_default_missing_is_not_found() {
        let app_root = TempDir::new().unwrap();
        let service = KernelService::new(app_root.path().join("kernels")).unwrap();
        let err = service.get_default("amd64").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn install_from_file_without_force_rejects_existing() {
        let app_root = TempDir::new().unwrap();
        let service = KernelService::new(app_root.path().join("kernels")).unwrap();
        let source_dir = TempDir::new().unwrap();
        let source_file = source_dir.path().join("vmlinux");
        std::fs::write(&source_file, b"v1").unwrap();

        service.install_from_file(&source_file, "arm64", false).await.unwrap();
        let err = service
            .install_from_file(&source_file, "arm64", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        service.install_from_file(&source_file, "arm64", true).await.unwrap();
    }

    #[test]
    fn extract_plain_entry() {
        let dir = TempDir::new().unwrap();
        let tar_path = dir.path().join("kernel.tar");
        write_test_tar(&tar_path, &[("boot/vmlinux", b"abc")], &[]);
        let data = extract_kernel_entry(&tar_path, "boot/vmlinux").unwrap();
        assert_eq!(data, b"abc");
    }

    #[test]
    fn extract_follows_symlink() {
        let dir = TempDir::new().unwrap();
        let tar_path = dir.path().join("kernel.tar");
        write_test_tar(
            &tar_path,
            &[("boot/vmlinux-5.15", b"real-kernel")],
            &[("boot/vmlinux", "vmlinux-5.15")],
        );
        let data = extract_kernel_entry(&tar_path, "boot/vmlinux").unwrap();
        assert_eq!(data, b"real-kernel");
    }

    #[test]
    fn extract_missing_entry_is_not_found() {
        let dir = TempDir::new().unwrap();
        let tar_path = dir.path().join("kernel.tar");
        write_test_tar(&tar_path, &[("boot/vmlinux", b"abc")], &[]);
        let err = extract_kernel_entry(&tar_path, "boot/missing").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
