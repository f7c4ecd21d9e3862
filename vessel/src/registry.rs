//! Concrete [`ImageClient`] implementation: pulls OCI images from a
//! registry, caches layers by digest, and extracts a rootfs, matching the
//! `oci-client`/`oci-spec` pull-then-extract pattern. The registry client
//! and archive extraction are out-of-scope collaborators per §1; this
//! module is the one place they are wired to a concrete crate.

use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use oci_client::client::{ClientConfig, ClientProtocol};
use oci_client::secrets::RegistryAuth;
use oci_client::Reference;
use sha2::{Digest, Sha256};

use vessel_shared::{Error, Result};

use crate::config::pipeline::{FetchedImage, ImageClient};
use crate::config::types::{ImageConfig as VesselImageConfig, Platform};

const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    "application/vnd.oci.image.layer.v1.tar+gzip",
    "application/vnd.docker.image.rootfs.diff.tar.gzip",
];

/// Registry connection scheme (§6 "Registry flags: `--scheme`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryScheme {
    #[default]
    Auto,
    Http,
    Https,
}

impl RegistryScheme {
    fn into_protocol(self) -> ClientProtocol {
        match self {
            RegistryScheme::Auto => ClientProtocol::Https,
            RegistryScheme::Http => ClientProtocol::Http,
            RegistryScheme::Https => ClientProtocol::Https,
        }
    }
}

pub struct RegistryImageClient {
    client: oci_client::Client,
    auth: RegistryAuth,
    cache_dir: PathBuf,
}

impl RegistryImageClient {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        Self::with_scheme(cache_dir, RegistryScheme::default())
    }

    /// `scheme = Auto` keeps `oci-client`'s own per-registry fallback
    /// (HTTPS, dropping to HTTP only for registries it already treats as
    /// insecure); `Http`/`Https` force the connection to the named scheme.
    pub fn with_scheme(cache_dir: PathBuf, scheme: RegistryScheme) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        let config = match scheme {
            RegistryScheme::Auto => ClientConfig::default(),
            explicit => ClientConfig {
                protocol: explicit.into_protocol(),
                ..ClientConfig::default()
            },
        };
        Ok(Self {
            client: oci_client::Client::new(config),
            auth: RegistryAuth::Anonymous,
            cache_dir,
        })
    }

    fn rootfs_dir(&self, digest: &str) -> PathBuf {
        self.cache_dir.join("rootfs").join(sanitize_digest(digest))
    }
}

fn sanitize_digest(digest: &str) -> String {
    digest.replace(':', "_")
}

fn parse_reference(reference: &str) -> Result<Reference> {
    reference
        .parse()
        .map_err(|e: oci_client::ParseError| Error::invalid_argument(format!("invalid image reference: {e}")))
}

#[async_trait::async_trait]
impl ImageClient for RegistryImageClient {
    async fn fetch(&self, reference: &str, _platform: &Platform) -> Result<FetchedImage> {
        let parsed = parse_reference(reference)?;
        let image_data = self
            .client
            .pull(&parsed, &self.auth, ACCEPTED_MEDIA_TYPES.to_vec())
            .await
            .map_err(|e| Error::internal(format!("registry pull failed: {e}")))?;

        // The registry usually reports a manifest digest; fall back to
        // hashing the config blob when it doesn't, so the rootfs cache key
        // is always content-addressed rather than reference-addressed.
        let digest = image_data.digest.clone().unwrap_or_else(|| {
            let mut hasher = Sha256::new();
            hasher.update(&image_data.config.data);
            format!("sha256:{}", hex::encode(hasher.finalize()))
        });
        let rootfs = self.rootfs_dir(&digest);
        std::fs::create_dir_all(&rootfs)?;

        if !has_been_extracted(&rootfs) {
            let layers: Vec<Vec<u8>> = image_data.layers.iter().map(|l| l.data.clone()).collect();
            let rootfs_clone = rootfs.clone();
            tokio::task::spawn_blocking(move || extract_layers(&layers, &rootfs_clone))
                .await
                .map_err(|e| Error::internal(format!("extraction task panicked: {e}")))??;
        }

        let config_path = rootfs.join(".image-config.json");
        std::fs::write(&config_path, &image_data.config.data)?;

        Ok(FetchedImage {
            reference: parsed.to_string(),
            local_path: rootfs,
        })
    }

    async fn unpack(&self, image: &FetchedImage) -> Result<VesselImageConfig> {
        let config_path = image.local_path.join(".image-config.json");
        let raw = std::fs::read(&config_path)?;
        Ok(parse_image_config(&raw))
    }
}

fn has_been_extracted(rootfs: &Path) -> bool {
    std::fs::read_dir(rootfs).map(|mut it| it.next().is_some()).unwrap_or(false)
}

/// Extracts gzip-compressed tar layers in order into `rootfs`, honouring
/// OCI whiteout markers (`.wh.<name>` deletes, `.wh..wh..opq` clears a
/// directory).
fn extract_layers(layers: &[Vec<u8>], rootfs: &Path) -> Result<()> {
    for data in layers {
        extract_layer(GzDecoder::new(data.as_slice()), rootfs)?;
    }
    Ok(())
}

fn extract_layer(reader: impl Read, rootfs: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    for raw_entry in archive.entries().map_err(Error::from)? {
        let mut entry = raw_entry.map_err(Error::from)?;
        let rel = entry.path().map_err(Error::from)?.into_owned();

        let file_name = match rel.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };

        if file_name == ".wh..wh..opq" {
            if let Some(parent) = rel.parent() {
                let target = rootfs.join(parent);
                if target.exists() {
                    clear_directory(&target)?;
                }
            }
            continue;
        }

        if let Some(target_name) = file_name.strip_prefix(".wh.") {
            if let Some(parent) = rel.parent() {
                let target = rootfs.join(parent).join(target_name);
                if target.is_dir() {
                    std::fs::remove_dir_all(&target).ok();
                } else {
                    std::fs::remove_file(&target).ok();
                }
            }
            continue;
        }

        entry.unpack_in(rootfs).map_err(Error::from)?;
    }

    Ok(())
}

fn clear_directory(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Deserializes the OCI config blob (wrapped under a top-level `"config"`
/// key) into this crate's [`VesselImageConfig`].
fn parse_image_config(data: &[u8]) -> VesselImageConfig {
    #[derive(serde::Deserialize, Default)]
    struct RawImageConfig {
        #[serde(default, alias = "Entrypoint")]
        entrypoint: Vec<String>,
        #[serde(default, alias = "Cmd")]
        cmd: Vec<String>,
        #[serde(default, alias = "Env")]
        env: Vec<String>,
        #[serde(default, alias = "User")]
        user: Option<String>,
        #[serde(default, alias = "WorkingDir")]
        working_dir: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct TopLevel {
        config: Option<RawImageConfig>,
    }

    let raw = serde_json::from_slice::<TopLevel>(data)
        .ok()
        .and_then(|t| t.config)
        .unwrap_or_default();

    VesselImageConfig {
        entrypoint: raw.entrypoint,
        cmd: raw.cmd,
        env: raw.env,
        user: raw.user,
        working_dir: raw.working_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_style_config_keys() {
        let data = br#"{"config":{"Entrypoint":["/app"],"Cmd":["serve"],"Env":["A=1"],"User":"nobody","WorkingDir":"/srv"}}"#;
        let config = parse_image_config(data);
        assert_eq!(config.entrypoint, vec!["/app".to_string()]);
        assert_eq!(config.cmd, vec!["serve".to_string()]);
        assert_eq!(config.user.as_deref(), Some("nobody"));
        assert_eq!(config.working_dir.as_deref(), Some("/srv"));
    }

    #[test]
    fn missing_config_key_yields_defaults() {
        let config = parse_image_config(b"{}");
        assert!(config.entrypoint.is_empty());
        assert!(config.cmd.is_empty());
    }

    #[test]
    fn rejects_unparseable_reference() {
        let err = parse_reference("!!!not a reference!!!").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
