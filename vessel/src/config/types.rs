//! Data model produced by the configuration pipeline (C5) and consumed by
//! the container service. Variant fields (user, mount target, protocol) are
//! plain Rust enums, not a class hierarchy, per the design notes.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A fully resolved, immutable container configuration. Produced only by
/// [`crate::config::pipeline::assemble`]; every instance in existence
/// satisfies the invariants documented on its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfiguration {
    pub id: String,
    pub image_reference: String,
    pub process: ProcessConfiguration,
    pub cpus: Option<u32>,
    pub memory_bytes: Option<u64>,
    pub platform: Platform,
    /// `(tmpfs mounts)(volumes, flag order)(mount directives, flag order)`.
    pub mounts: Vec<FilesystemMount>,
    pub networks: Vec<Attachment>,
    pub dns: Option<DnsConfig>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PublishPort>,
    pub sockets: Vec<PublishSocket>,
    pub ssh: bool,
    pub rosetta: bool,
    pub virtualization: VirtualizationOptions,
}

impl ContainerConfiguration {
    /// Checks the invariants §3 and §8 require of every produced
    /// configuration. Called once at the end of pipeline assembly; a
    /// failure here indicates a bug in an upstream stage, not bad user
    /// input (user input is rejected earlier, by the parsers themselves).
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.process.executable.is_empty() {
            return Err("process executable must not be empty".into());
        }
        for mount in &self.mounts {
            if mount.destination.is_empty() {
                return Err("mount destination must not be empty".into());
            }
            if mount.kind != MountType::Tmpfs && mount.source.is_empty() {
                return Err("non-tmpfs mount must have a source".into());
            }
        }
        for key in self.labels.keys() {
            if key.is_empty() {
                return Err("label keys must not be empty".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualizationOptions {
    pub nested_virtualization: bool,
}

/// The launchable process inside the guest. See §4.4 for how this is
/// resolved from image config plus CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfiguration {
    pub executable: String,
    pub arguments: Vec<String>,
    pub env: Vec<String>,
    pub working_directory: String,
    pub terminal: bool,
    pub user: User,
    pub supplemental_groups: Vec<u32>,
}

/// Tagged union: a user is either a raw identifier string (resolved by the
/// guest's `/etc/passwd`) or a numeric uid/gid pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum User {
    Raw(String),
    Id(u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MountType {
    Virtiofs,
    Tmpfs,
    Volume,
}

/// A resolved filesystem mount, ready to hand to the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemMount {
    /// Absolute host path (virtiofs), volume name (volume), or empty
    /// (tmpfs).
    pub source: String,
    /// Absolute guest path. Never empty.
    pub destination: String,
    pub kind: MountType,
    /// Recognized options: `ro`, `size=N`, `mode=M`.
    pub options: Vec<String>,
}

/// An unresolved named-volume reference, produced by C2 and joined against
/// the volume service's inventory during C5 stage 6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedVolume {
    pub name: String,
    pub destination: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl Platform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPort {
    pub host_address: String,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSocket {
    pub container_path: String,
    pub host_path: PathBuf,
    pub permissions: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    pub path: PathBuf,
    pub platform: String,
}

/// A container's attachment to a network, constructed during C5 stage 7.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub network_id: String,
    pub hostname: String,
    pub fully_qualified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    pub nameservers: Vec<String>,
    pub search_domains: Vec<String>,
    pub options: Vec<String>,
    pub domain: Option<String>,
}

/// Image configuration as retrieved from the OCI registry client. This is
/// the input C4 merges with CLI overrides; the registry client itself is
/// out of scope (§1) — callers obtain this from whatever OCI client they
/// wire in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub user: Option<String>,
    pub working_dir: Option<String>,
}
