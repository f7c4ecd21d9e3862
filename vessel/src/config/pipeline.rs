//! Configuration pipeline (C5, §4.5). Orchestrates image fetch+unpack,
//! init image fetch+unpack, kernel acquisition, and all C1-C4 parsing into
//! a single `(ContainerConfiguration, Kernel)`, with progress reporting
//! and the concurrency shape §4.5/§5 require: image fetch, init image
//! fetch, and kernel acquisition run as one parallel stage on top of the
//! generic [`crate::pipeline`] executor; everything after is synchronous
//! assembly over the results.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use vessel_shared::constants::{EMULATION_HOST_ARCH, EMULATION_REQUEST_ARCH, MIN_NON_DEFAULT_NETWORK_OS_MAJOR_VERSION};
use vessel_shared::{Error, Result};

use crate::db::NetworkStatus;
use crate::kernel::KernelService;
use crate::pipeline::{ExecutionPlan, Pipeline, PipelineBuilder, PipelineExecutor, PipelineTask, Stage};
use crate::progress::{ProgressCoordinator, ProgressEvent, ProgressHandle};
use crate::services::{NetworkService, VolumeService};

use super::dns::{assemble_dns, DnsFlags};
use super::labels::parse_labels;
use super::mount::{parse_mount_directive, parse_tmpfs_list, parse_volume_flag, validate_filesystem_mount, ParsedMount};
use super::process::{resolve_process, ProcessFlags};
use super::publish::{parse_port, parse_socket};
use super::resources::resolve_resources;
use super::types::{
    Attachment, ContainerConfiguration, DnsConfig, FilesystemMount, ImageConfig, Kernel, Platform,
    PublishPort, PublishSocket, VirtualizationOptions,
};

/// A fetched-but-not-yet-unpacked image artifact. Opaque outside the
/// [`ImageClient`] implementation; the pipeline only ever passes it back
/// to `unpack`.
pub struct FetchedImage {
    pub reference: String,
    pub local_path: PathBuf,
}

/// Seam for the out-of-scope OCI registry client (§1 "out of scope: the
/// OCI registry client"). A concrete implementation downloads blobs,
/// materialises a rootfs, and reads the image's config.
#[async_trait]
pub trait ImageClient: Send + Sync {
    async fn fetch(&self, reference: &str, platform: &Platform) -> Result<FetchedImage>;
    async fn unpack(&self, image: &FetchedImage) -> Result<ImageConfig>;
}

/// Seam for host facts the pipeline needs but does not itself observe:
/// the running CPU architecture (emulation flag, §4.5 stage 9) and the
/// host OS major version (non-default network gate, §4.5 stage 7).
pub trait HostInfo: Send + Sync {
    fn architecture(&self) -> String;
    fn os_major_version(&self) -> u32;
}

/// Everything the caller supplies to assemble one container configuration,
/// grouped the way §6 groups the CLI flags.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PipelineInput {
    pub id: String,
    pub image_reference: String,
    pub os: String,
    pub arch: String,
    pub platform_string: Option<String>,
    pub process: ProcessFlags,
    pub volumes: Vec<String>,
    pub mounts: Vec<String>,
    pub tmpfs: Vec<String>,
    pub labels: Vec<String>,
    pub networks: Vec<String>,
    pub dns: DnsFlags,
    pub ports: Vec<String>,
    pub sockets: Vec<String>,
    pub kernel_path: Option<PathBuf>,
    pub cpus: Option<u32>,
    pub memory: Option<String>,
    pub ssh: bool,
    pub virtualization: VirtualizationOptions,
    pub default_dns_domain: Option<String>,
}

/// Shared write-once slots the parallel stage's tasks populate. Cloned per
/// task by the generic executor; the `Arc`s make every clone point at the
/// same cells.
#[derive(Clone)]
struct AssemblyContext {
    image_config: Arc<OnceCell<ImageConfig>>,
    kernel: Arc<OnceCell<Kernel>>,
}

struct ImageFetchTask {
    client: Arc<dyn ImageClient>,
    reference: String,
    platform: Platform,
    progress: ProgressHandle,
}

#[async_trait]
impl PipelineTask<AssemblyContext> for ImageFetchTask {
    async fn run(self: Box<Self>, ctx: AssemblyContext) -> Result<()> {
        self.progress.update(ProgressEvent::new("Fetching image"));
        let fetched = self.client.fetch(&self.reference, &self.platform).await?;
        self.progress.update(ProgressEvent::new("Unpacking image"));
        let config = self.client.unpack(&fetched).await?;
        ctx.image_config
            .set(config)
            .map_err(|_| Error::internal("image config already assembled"))
    }

    fn name(&self) -> &str {
        "image-fetch"
    }
}

struct InitImageFetchTask {
    client: Arc<dyn ImageClient>,
    host_platform: Platform,
    progress: ProgressHandle,
}

#[async_trait]
impl PipelineTask<AssemblyContext> for InitImageFetchTask {
    async fn run(self: Box<Self>, _ctx: AssemblyContext) -> Result<()> {
        self.progress.update(ProgressEvent::new("Fetching init image"));
        // Always fetched for the host platform, regardless of the
        // container's requested platform (§4.5 stage 3, GLOSSARY "Init
        // image").
        let fetched = self.client.fetch("init", &self.host_platform).await?;
        self.progress.update(ProgressEvent::new("Unpacking init image"));
        self.client.unpack(&fetched).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "init-image-fetch"
    }
}

struct KernelAcquisitionTask {
    kernel_path: Option<PathBuf>,
    arch: String,
    kernel_service: Arc<KernelService>,
    progress: ProgressHandle,
}

#[async_trait]
impl PipelineTask<AssemblyContext> for KernelAcquisitionTask {
    async fn run(self: Box<Self>, ctx: AssemblyContext) -> Result<()> {
        self.progress.update(ProgressEvent::new("Fetching kernel"));
        // A user-supplied `--kernel PATH` is used directly, as-is; only the
        // absence of an override falls back to the kernel service's
        // installed default (§4.5 stage 3).
        let kernel = match &self.kernel_path {
            Some(path) => Kernel {
                path: path.clone(),
                platform: self.arch.clone(),
            },
            None => self.kernel_service.get_default(&self.arch)?,
        };
        ctx.kernel
            .set(kernel)
            .map_err(|_| Error::internal("kernel already assembled"))
    }

    fn name(&self) -> &str {
        "kernel-acquisition"
    }
}

/// Assembles one `(ContainerConfiguration, Kernel)` per §4.5's eleven
/// stages. `progress` is the caller's coordinator; a handle is allocated
/// per concurrent task and dropped as each finishes.
#[allow(clippy::too_many_arguments)]
pub async fn assemble(
    input: PipelineInput,
    image_client: Arc<dyn ImageClient>,
    host_info: Arc<dyn HostInfo>,
    kernel_service: Arc<KernelService>,
    network_service: Arc<NetworkService>,
    volume_service: Arc<VolumeService>,
    progress: &ProgressCoordinator,
) -> Result<(ContainerConfiguration, Kernel)> {
    // Stage 1: platform selection.
    let platform = Platform::resolve(&input.os, &input.arch, input.platform_string.as_deref())?;
    let host_arch = host_info.architecture();
    let host_platform = Platform::from_parts("linux", host_arch.clone());

    // Stages 2-3: image fetch/unpack, init image fetch/unpack, and kernel
    // acquisition run concurrently (§4.5 "in any order but all required
    // before completion", §5 "dispatches fetch/unpack/kernel stages as
    // concurrent tasks").
    let ctx = AssemblyContext {
        image_config: Arc::new(OnceCell::new()),
        kernel: Arc::new(OnceCell::new()),
    };

    let image_task = Box::new(ImageFetchTask {
        client: Arc::clone(&image_client),
        reference: input.image_reference.clone(),
        platform: platform.clone(),
        progress: progress.handle(),
    });
    let init_task = Box::new(InitImageFetchTask {
        client: Arc::clone(&image_client),
        host_platform: host_platform.clone(),
        progress: progress.handle(),
    });
    let kernel_task = Box::new(KernelAcquisitionTask {
        kernel_path: input.kernel_path.clone(),
        arch: platform.architecture.clone(),
        kernel_service,
        progress: progress.handle(),
    });

    let plan: ExecutionPlan<AssemblyContext> = ExecutionPlan::new(vec![Stage::parallel(vec![
        image_task as Box<dyn PipelineTask<AssemblyContext>>,
        init_task as Box<dyn PipelineTask<AssemblyContext>>,
        kernel_task as Box<dyn PipelineTask<AssemblyContext>>,
    ])]);
    let pipeline: Pipeline<AssemblyContext> = PipelineBuilder::from_plan(plan);
    PipelineExecutor::execute(pipeline, ctx.clone()).await?;

    let image_config = ctx
        .image_config
        .get()
        .cloned()
        .ok_or_else(|| Error::internal("image fetch task did not populate image config"))?;
    let kernel = ctx
        .kernel
        .get()
        .cloned()
        .ok_or_else(|| Error::internal("kernel acquisition task did not populate kernel"))?;

    // Stage 4: process configuration (C4).
    let process_env = std::env::vars().collect::<HashMap<_, _>>();
    let process = resolve_process(&input.process, &image_config, &process_env)?;

    // Stage 5: resources (C1).
    let resources = resolve_resources(input.cpus, input.memory.as_deref())?;

    // Stage 6: mount resolution. Order is (tmpfs)(volumes, flag
    // order)(mount directives, flag order) per §5 "ordering guarantees".
    let mut mounts: Vec<FilesystemMount> = parse_tmpfs_list(&input.tmpfs)?;
    for entry in &input.volumes {
        mounts.push(resolve_parsed_mount(parse_volume_flag(entry)?, &volume_service)?);
    }
    for directive in &input.mounts {
        mounts.push(resolve_parsed_mount(parse_mount_directive(directive)?, &volume_service)?);
    }
    for mount in &mounts {
        validate_filesystem_mount(mount)?;
    }

    // Stage 7: network attachment.
    check_non_default_network_support(&input.networks, host_info.as_ref())?;
    let networks = assemble_networks(&input, &network_service)?;

    // Stage 8: DNS config.
    let mut dns_flags = input.dns.clone();
    if dns_flags.domain.is_none() {
        dns_flags.domain = input.default_dns_domain.clone();
    }
    let dns: Option<DnsConfig> = assemble_dns(&dns_flags)?;

    // Stage 9: emulation flag.
    let rosetta = host_arch == EMULATION_HOST_ARCH && platform.architecture == EMULATION_REQUEST_ARCH;

    // Stage 10: labels, ports, sockets.
    let labels = parse_labels(&input.labels)?;
    let ports: Vec<PublishPort> = input.ports.iter().map(|p| parse_port(p)).collect::<Result<_>>()?;
    let sockets: Vec<PublishSocket> = input.sockets.iter().map(|s| parse_socket(s)).collect::<Result<_>>()?;

    // Stage 11: SSH passthrough, virtualization options.
    let configuration = ContainerConfiguration {
        id: input.id,
        image_reference: input.image_reference,
        process,
        cpus: resources.cpus,
        memory_bytes: resources.memory_bytes,
        platform,
        mounts,
        networks,
        dns,
        labels,
        ports,
        sockets,
        ssh: input.ssh,
        rosetta,
        virtualization: input.virtualization,
    };

    configuration
        .check_invariants()
        .map_err(Error::internal)?;

    Ok((configuration, kernel))
}

fn resolve_parsed_mount(parsed: ParsedMount, volume_service: &VolumeService) -> Result<FilesystemMount> {
    match parsed {
        ParsedMount::Filesystem(mount) => Ok(mount),
        ParsedMount::Volume(volume) => {
            let host_path = volume_service.resolve(&volume.name)?;
            Ok(FilesystemMount {
                source: host_path.to_string_lossy().into_owned(),
                destination: volume.destination,
                kind: super::types::MountType::Volume,
                options: volume.options,
            })
        }
    }
}

/// Builds the container's network attachments (§4.5 stage 7). Requested
/// networks must already be running; the first attachment in the
/// user-specified order receives the fully-qualified hostname when a
/// default DNS domain is configured. An empty request attaches to the
/// default network instead.
fn assemble_networks(input: &PipelineInput, network_service: &NetworkService) -> Result<Vec<Attachment>> {
    let requested: Vec<String> = if input.networks.is_empty() {
        vec![vessel_shared::constants::DEFAULT_NETWORK_NAME.to_string()]
    } else {
        input.networks.clone()
    };

    let mut attachments = Vec::with_capacity(requested.len());
    for (index, network_id) in requested.iter().enumerate() {
        let record = network_service
            .get(network_id)
            .ok_or_else(|| Error::not_found(format!("network {network_id} not found")))?;
        if record.status != NetworkStatus::Running {
            return Err(Error::invalid_state(format!(
                "network {network_id} is not running"
            )));
        }

        let fully_qualified = index == 0 && input.default_dns_domain.is_some();
        let hostname = if fully_qualified {
            format!("{}.{}.", input.id, input.default_dns_domain.as_deref().unwrap_or_default())
        } else {
            input.id.clone()
        };

        attachments.push(Attachment {
            network_id: network_id.clone(),
            hostname,
            fully_qualified,
        });
    }
    Ok(attachments)
}

/// Enforces §4.5 stage 7's minimum host OS version gate for any
/// non-default network in the request. Called before [`assemble_networks`]
/// reaches out to the network service, so a rejected host never creates
/// partial attachment state.
pub fn check_non_default_network_support(requested: &[String], host_info: &dyn HostInfo) -> Result<()> {
    let has_non_default = requested
        .iter()
        .any(|id| id != vessel_shared::constants::DEFAULT_NETWORK_NAME);
    if has_non_default && host_info.os_major_version() < MIN_NON_DEFAULT_NETWORK_OS_MAJOR_VERSION {
        return Err(Error::invalid_argument(format!(
            "non-default networks require host OS major version >= {MIN_NON_DEFAULT_NETWORK_OS_MAJOR_VERSION}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DnsHostStore, NetworkStore, VolumeStore};
    use std::sync::Arc as StdArc;

    struct FakeImageClient;

    #[async_trait]
    impl ImageClient for FakeImageClient {
        async fn fetch(&self, reference: &str, _platform: &Platform) -> Result<FetchedImage> {
            Ok(FetchedImage {
                reference: reference.to_string(),
                local_path: PathBuf::from("/tmp/fake"),
            })
        }

        async fn unpack(&self, _image: &FetchedImage) -> Result<ImageConfig> {
            Ok(ImageConfig {
                entrypoint: vec!["/app".to_string()],
                cmd: vec![],
                env: vec![],
                user: None,
                working_dir: None,
            })
        }
    }

    struct FakeHostInfo;

    impl HostInfo for FakeHostInfo {
        fn architecture(&self) -> String {
            "arm64".to_string()
        }

        fn os_major_version(&self) -> u32 {
            14
        }
    }

    fn services() -> (StdArc<NetworkService>, StdArc<VolumeService>, StdArc<KernelService>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let network = NetworkService::new(NetworkStore::new(db.clone()), DnsHostStore::new(db.clone())).unwrap();
        network.ensure_default().unwrap();
        let volume = VolumeService::new(VolumeStore::new(db), dir.path().join("volumes")).unwrap();
        let kernel_dir = dir.path().join("kernels");
        let kernel_service = StdArc::new(KernelService::new(kernel_dir.clone()).unwrap());
        let kernel_file = dir.path().join("kernel-bin");
        std::fs::write(&kernel_file, b"fake-kernel").unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(kernel_service.install_from_file(&kernel_file, "arm64", false))
            .unwrap();
        (network, volume, kernel_service, dir)
    }

    #[tokio::test]
    async fn assembles_minimal_configuration() {
        let (network, volume, kernel_service, _dir) = services();
        let (coordinator, _stream) = ProgressCoordinator::new();

        let input = PipelineInput {
            id: "c1".to_string(),
            image_reference: "example/image:latest".to_string(),
            os: "linux".to_string(),
            arch: "arm64".to_string(),
            ..Default::default()
        };

        let (config, kernel) = assemble(
            input,
            StdArc::new(FakeImageClient),
            StdArc::new(FakeHostInfo),
            kernel_service,
            network,
            volume,
            &coordinator,
        )
        .await
        .unwrap();

        assert_eq!(config.process.executable, "/app");
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].network_id, vessel_shared::constants::DEFAULT_NETWORK_NAME);
        assert!(!config.rosetta);
        assert_eq!(kernel.platform, "arm64");
    }

    #[tokio::test]
    async fn rosetta_flag_set_for_amd64_request_on_arm64_host() {
        let (network, volume, kernel_service, _dir) = services();
        let kernel_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(kernel_file.path(), b"fake").unwrap();
        kernel_service
            .install_from_file(kernel_file.path(), "amd64", false)
            .await
            .unwrap();
        let (coordinator, _stream) = ProgressCoordinator::new();

        let input = PipelineInput {
            id: "c2".to_string(),
            image_reference: "example/image:latest".to_string(),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
            ..Default::default()
        };

        let (config, _kernel) = assemble(
            input,
            StdArc::new(FakeImageClient),
            StdArc::new(FakeHostInfo),
            kernel_service,
            network,
            volume,
            &coordinator,
        )
        .await
        .unwrap();

        assert!(config.rosetta);
    }

    #[test]
    fn non_default_network_gate_rejects_old_hosts() {
        struct OldHost;
        impl HostInfo for OldHost {
            fn architecture(&self) -> String {
                "arm64".to_string()
            }
            fn os_major_version(&self) -> u32 {
                12
            }
        }
        let err = check_non_default_network_support(&["custom".to_string()], &OldHost).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn non_default_network_gate_allows_default_only_requests() {
        struct OldHost;
        impl HostInfo for OldHost {
            fn architecture(&self) -> String {
                "arm64".to_string()
            }
            fn os_major_version(&self) -> u32 {
                12
            }
        }
        assert!(check_non_default_network_support(&[], &OldHost).is_ok());
    }
}
