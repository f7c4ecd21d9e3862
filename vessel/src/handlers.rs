//! Route handlers: the glue between [`crate::rpc::RouteTable`] and the
//! service singletons. Each handler deserialises its JSON payload into a
//! small request type, calls the owning service, and serialises the
//! response — the route table and transport never see a typed service
//! method directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use vessel_shared::{Error, Result};

use crate::config::pipeline::{self, HostInfo, ImageClient, PipelineInput};
use crate::config::types::ProcessConfiguration;
use crate::kernel::KernelService;
use crate::progress::ProgressCoordinator;
use crate::rpc::{RouteHandler, RouteTableBuilder, RouteId, StreamRouteHandler};
use crate::services::{ContainerService, HealthService, NetworkService, PluginLoader, VolumeService};

fn decode<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::invalid_argument(format!("malformed request: {e}")))
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::internal(format!("failed to encode response: {e}")))
}

/// Every service singleton a route handler might need. Constructed once at
/// bootstrap and handed to [`register_routes`].
pub struct Services {
    pub containers: Arc<ContainerService>,
    pub networks: Arc<NetworkService>,
    pub volumes: Arc<VolumeService>,
    pub kernels: Arc<KernelService>,
    pub plugins: Arc<PluginLoader>,
    pub health: Arc<HealthService>,
    pub image_client: Arc<dyn ImageClient>,
    pub host_info: Arc<dyn HostInfo>,
}

/// Registers every route named in §6 into a builder. Called once during
/// bootstrap, before the RPC server starts listening (§5).
pub fn register_routes(services: Services) -> RouteTableBuilder {
    let services = Arc::new(services);

    RouteTableBuilder::new()
        .register(RouteId::HealthPing, Arc::new(HealthPingHandler { services: services.clone() }))
        .register(RouteId::ContainerList, Arc::new(ContainerListHandler { services: services.clone() }))
        .register(RouteId::ContainerCreate, Arc::new(ContainerCreateHandler { services: services.clone() }))
        .register(RouteId::ContainerDelete, Arc::new(ContainerDeleteHandler { services: services.clone() }))
        .register(RouteId::ContainerBootstrap, Arc::new(ContainerBootstrapHandler { services: services.clone() }))
        .register(RouteId::ContainerStop, Arc::new(ContainerStopHandler { services: services.clone() }))
        .register(RouteId::ContainerStartProcess, Arc::new(ContainerStartProcessHandler { services: services.clone() }))
        .register(RouteId::ContainerCreateProcess, Arc::new(ContainerCreateProcessHandler { services: services.clone() }))
        .register(RouteId::ContainerResize, Arc::new(ContainerResizeHandler { services: services.clone() }))
        .register(RouteId::ContainerKill, Arc::new(ContainerKillHandler { services: services.clone() }))
        .register(RouteId::NetworkCreate, Arc::new(NetworkCreateHandler { services: services.clone() }))
        .register(RouteId::NetworkDelete, Arc::new(NetworkDeleteHandler { services: services.clone() }))
        .register(RouteId::NetworkList, Arc::new(NetworkListHandler { services: services.clone() }))
        .register(RouteId::VolumeCreate, Arc::new(VolumeCreateHandler { services: services.clone() }))
        .register(RouteId::VolumeDelete, Arc::new(VolumeDeleteHandler { services: services.clone() }))
        .register(RouteId::VolumeList, Arc::new(VolumeListHandler { services: services.clone() }))
        .register(RouteId::VolumeInspect, Arc::new(VolumeInspectHandler { services: services.clone() }))
        .register(RouteId::KernelInstallKernel, Arc::new(KernelInstallHandler { services: services.clone() }))
        .register(RouteId::KernelGetDefaultKernel, Arc::new(KernelGetDefaultHandler { services: services.clone() }))
        .register(RouteId::PluginGet, Arc::new(PluginGetHandler { services: services.clone() }))
        .register(RouteId::PluginList, Arc::new(PluginListHandler { services: services.clone() }))
        .register(RouteId::PluginLoad, Arc::new(PluginProcessHandler { services: services.clone() }))
        .register(RouteId::PluginUnload, Arc::new(PluginProcessHandler { services: services.clone() }))
        .register(RouteId::PluginRestart, Arc::new(PluginProcessHandler { services: services.clone() }))
        .register_stream(RouteId::ContainerLogs, Arc::new(ContainerLogsHandler { services: services.clone() }))
        .register_stream(RouteId::ContainerWait, Arc::new(ContainerWaitHandler { services: services.clone() }))
        .register_stream(RouteId::ContainerDial, Arc::new(ContainerDialHandler { services }))
}

struct HealthPingHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for HealthPingHandler {
    async fn handle(&self, _payload: Value) -> Result<Value> {
        encode(&self.services.health.ping())
    }
}

struct ContainerListHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerListHandler {
    async fn handle(&self, _payload: Value) -> Result<Value> {
        encode(&self.services.containers.list())
    }
}

#[derive(Deserialize)]
struct CreateContainerRequest {
    input: PipelineInput,
}

struct ContainerCreateHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerCreateHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: CreateContainerRequest = decode(payload)?;
        let (coordinator, _progress_stream) = ProgressCoordinator::new();
        let (configuration, kernel) = pipeline::assemble(
            request.input,
            self.services.image_client.clone(),
            self.services.host_info.clone(),
            self.services.kernels.clone(),
            self.services.networks.clone(),
            self.services.volumes.clone(),
            &coordinator,
        )
        .await?;
        self.services.containers.create(configuration.clone(), kernel).await?;
        encode(&configuration)
    }
}

#[derive(Deserialize)]
struct ContainerIdRequest {
    id: String,
}

struct ContainerBootstrapHandler {
    services: Arc<Services>,
}

/// Re-launches an already-persisted container through the runtime.
/// `container.create` bootstraps once as part of assembling a new
/// configuration; `container.bootstrap` is the recovery path a restarted
/// daemon uses to bring an existing container's VM back up, since the
/// runtime itself keeps no state across a process restart.
#[async_trait]
impl RouteHandler for ContainerBootstrapHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: ContainerIdRequest = decode(payload)?;
        let configuration = self
            .services
            .containers
            .get(&request.id)
            .ok_or_else(|| Error::not_found(format!("container {} not found", request.id)))?;
        let kernel = self.services.kernels.get_default(&configuration.platform.architecture)?;
        self.services.containers.bootstrap(&request.id, &kernel).await?;
        encode(&configuration)
    }
}

#[derive(Deserialize)]
struct DeleteContainerRequest {
    id: String,
    #[serde(default)]
    is_builder: bool,
}

struct ContainerDeleteHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerDeleteHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: DeleteContainerRequest = decode(payload)?;
        self.services.containers.delete(&request.id, request.is_builder).await?;
        encode(&Value::Null)
    }
}

struct ContainerStopHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerStopHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: ContainerIdRequest = decode(payload)?;
        self.services.containers.stop(&request.id).await?;
        encode(&Value::Null)
    }
}

struct ContainerStartProcessHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerStartProcessHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: ContainerIdRequest = decode(payload)?;
        self.services.containers.start_process(&request.id).await?;
        encode(&Value::Null)
    }
}

#[derive(Deserialize)]
struct CreateProcessRequest {
    id: String,
    process: ProcessConfiguration,
}

struct ContainerCreateProcessHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerCreateProcessHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: CreateProcessRequest = decode(payload)?;
        self.services.containers.create_process(&request.id, &request.process).await?;
        encode(&Value::Null)
    }
}

#[derive(Deserialize)]
struct ResizeRequest {
    id: String,
    columns: u32,
    rows: u32,
}

struct ContainerResizeHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerResizeHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: ResizeRequest = decode(payload)?;
        self.services.containers.resize(&request.id, request.columns, request.rows).await?;
        encode(&Value::Null)
    }
}

#[derive(Deserialize)]
struct KillRequest {
    id: String,
    signal: i32,
}

struct ContainerKillHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for ContainerKillHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: KillRequest = decode(payload)?;
        self.services.containers.kill(&request.id, request.signal).await?;
        encode(&Value::Null)
    }
}

struct ContainerWaitHandler {
    services: Arc<Services>,
}

#[async_trait]
impl StreamRouteHandler for ContainerWaitHandler {
    async fn handle(&self, payload: Value) -> Result<ReceiverStream<Result<Value>>> {
        let request: ContainerIdRequest = decode(payload)?;
        let exit_code = self.services.containers.wait(&request.id).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(encode(&exit_code)).await;
        Ok(ReceiverStream::new(rx))
    }
}

#[derive(Deserialize)]
struct DialRequest {
    id: String,
    port: u32,
}

struct ContainerDialHandler {
    services: Arc<Services>,
}

#[async_trait]
impl StreamRouteHandler for ContainerDialHandler {
    async fn handle(&self, payload: Value) -> Result<ReceiverStream<Result<Value>>> {
        let request: DialRequest = decode(payload)?;
        self.services.containers.dial(&request.id, request.port).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx.send(encode(&Value::Null)).await;
        Ok(ReceiverStream::new(rx))
    }
}

struct ContainerLogsHandler {
    services: Arc<Services>,
}

#[async_trait]
impl StreamRouteHandler for ContainerLogsHandler {
    async fn handle(&self, payload: Value) -> Result<ReceiverStream<Result<Value>>> {
        let request: ContainerIdRequest = decode(payload)?;
        let mut log_chunks = self.services.containers.logs(&request.id).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        tokio::spawn(async move {
            while let Some(chunk) = log_chunks.recv().await {
                let encoded = encode(&hex_encode(&chunk));
                if tx.send(encoded).await.is_err() {
                    break;
                }
            }
        });
        Ok(ReceiverStream::new(rx))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}

#[derive(Deserialize)]
struct CreateNetworkRequest {
    id: String,
    #[serde(default = "default_network_mode")]
    mode: String,
}

fn default_network_mode() -> String {
    "nat".to_string()
}

struct NetworkCreateHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for NetworkCreateHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: CreateNetworkRequest = decode(payload)?;
        let record = self.services.networks.create(&request.id, &request.mode)?;
        encode(&record)
    }
}

struct NetworkDeleteHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for NetworkDeleteHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Request {
            id: String,
        }
        let request: Request = decode(payload)?;
        self.services.networks.delete(&request.id)?;
        encode(&Value::Null)
    }
}

struct NetworkListHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for NetworkListHandler {
    async fn handle(&self, _payload: Value) -> Result<Value> {
        encode(&self.services.networks.list())
    }
}

#[derive(Deserialize)]
struct CreateVolumeRequest {
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

struct VolumeCreateHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for VolumeCreateHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: CreateVolumeRequest = decode(payload)?;
        let record = self.services.volumes.create(&request.name, request.labels)?;
        encode(&record)
    }
}

struct VolumeDeleteHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for VolumeDeleteHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Request {
            name: String,
        }
        let request: Request = decode(payload)?;
        self.services.volumes.delete(&request.name)?;
        encode(&Value::Null)
    }
}

struct VolumeListHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for VolumeListHandler {
    async fn handle(&self, _payload: Value) -> Result<Value> {
        encode(&self.services.volumes.list())
    }
}

struct VolumeInspectHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for VolumeInspectHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Request {
            name: String,
        }
        let request: Request = decode(payload)?;
        encode(&self.services.volumes.inspect(&request.name)?)
    }
}

#[derive(Deserialize)]
struct InstallKernelRequest {
    source_path: String,
    arch: String,
    #[serde(default)]
    force: bool,
}

struct KernelInstallHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for KernelInstallHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        let request: InstallKernelRequest = decode(payload)?;
        let kernel = self
            .services
            .kernels
            .install_from_file(std::path::Path::new(&request.source_path), &request.arch, request.force)
            .await?;
        encode(&kernel)
    }
}

struct KernelGetDefaultHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for KernelGetDefaultHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Request {
            arch: String,
        }
        let request: Request = decode(payload)?;
        encode(&self.services.kernels.get_default(&request.arch)?)
    }
}

struct PluginGetHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for PluginGetHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Request {
            name: String,
        }
        let request: Request = decode(payload)?;
        let plugin = self
            .services
            .plugins
            .find_plugin(&request.name)
            .ok_or_else(|| Error::not_found(format!("plugin {} not found", request.name)))?;
        encode(&PluginView::from(plugin))
    }
}

struct PluginListHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for PluginListHandler {
    async fn handle(&self, _payload: Value) -> Result<Value> {
        let plugins: Vec<PluginView> = self.services.plugins.list().into_iter().map(PluginView::from).collect();
        encode(&plugins)
    }
}

/// Handles `plugin.load`/`plugin.unload`/`plugin.restart`. Actually
/// launching, tearing down, or restarting a plugin process is out of
/// scope here (§1 "plugin process launching") — this daemon only
/// discovers and catalogs plugins, so these routes exist in the table
/// for a real process-launch collaborator to take over and report a
/// clear error in the meantime rather than a bare route-not-found.
struct PluginProcessHandler {
    services: Arc<Services>,
}

#[async_trait]
impl RouteHandler for PluginProcessHandler {
    async fn handle(&self, payload: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Request {
            name: String,
        }
        let request: Request = decode(payload)?;
        self.services
            .plugins
            .find_plugin(&request.name)
            .ok_or_else(|| Error::not_found(format!("plugin {} not found", request.name)))?;
        Err(Error::invalid_state(format!(
            "plugin process launching is not implemented by this daemon build (plugin {})",
            request.name
        )))
    }
}

/// Wire shape for a plugin; `binary_path` is serialised as a string since
/// `Plugin` itself does not derive `Serialize`.
#[derive(Serialize)]
struct PluginView {
    name: String,
    binary_path: String,
    should_boot: bool,
    service_roles: Vec<String>,
}

impl From<crate::services::plugin::Plugin> for PluginView {
    fn from(plugin: crate::services::plugin::Plugin) -> Self {
        Self {
            name: plugin.name,
            binary_path: plugin.binary_path.to_string_lossy().into_owned(),
            should_boot: plugin.config.should_boot,
            service_roles: plugin.config.service_roles,
        }
    }
}
