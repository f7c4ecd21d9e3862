//! `vessel`: the CLI surface (§6 "External interfaces"). A thin RPC
//! client: every subcommand builds one route call, sends it over the
//! daemon's Unix socket, and maps the result to an exit code
//! ([`vessel_shared::Error::exit_code`]).

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use vessel::config::dns::DnsFlags;
use vessel::config::pipeline::PipelineInput;
use vessel::config::process::ProcessFlags;
use vessel::config::types::VirtualizationOptions;
use vessel::layout::FilesystemLayout;
use vessel::rpc::server::proto::call_result::Outcome;
use vessel::rpc::server::proto::vessel_client::VesselClient;
use vessel::rpc::server::proto::CallEnvelope;
use vessel::rpc::RouteId;

#[derive(Parser)]
#[command(name = "vessel", about = "Run OCI images as per-container virtual machines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates and bootstraps a new container from an image.
    Create(CreateArgs),
    /// Stops a running container.
    Stop { id: String },
    /// Deletes a container.
    Delete {
        id: String,
        #[arg(long)]
        is_builder: bool,
    },
    /// Lists containers.
    List,
    /// Health check against the daemon.
    HealthCheck,
    /// Creates a network.
    NetworkCreate {
        id: String,
        #[arg(long, default_value = "nat")]
        mode: String,
    },
    /// Deletes a network.
    NetworkDelete { id: String },
    /// Lists networks.
    NetworkList,
    /// Creates a named volume.
    VolumeCreate { name: String },
    /// Deletes a named volume.
    VolumeDelete { name: String },
    /// Lists named volumes.
    VolumeList,
    /// Installs a kernel from a local file.
    KernelInstall {
        source_path: PathBuf,
        #[arg(long)]
        arch: String,
        #[arg(long)]
        force: bool,
    },
    /// Lists discovered plugins.
    PluginList,
}

#[derive(Parser)]
struct CreateArgs {
    image_reference: String,

    /// Command and arguments to run in the container, overriding the
    /// image's `cmd` (§4.4 step 3/4).
    #[arg(trailing_var_arg = true)]
    arguments: Vec<String>,

    #[arg(long)]
    entrypoint: Option<String>,
    #[arg(long)]
    os: Option<String>,
    #[arg(long)]
    arch: Option<String>,
    #[arg(long)]
    platform: Option<String>,

    #[arg(long = "env")]
    env: Vec<String>,
    #[arg(long = "env-file")]
    env_files: Vec<String>,
    #[arg(long)]
    cwd: Option<String>,
    #[arg(long)]
    tty: bool,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    uid: Option<u32>,
    #[arg(long)]
    gid: Option<u32>,

    #[arg(long = "volume")]
    volumes: Vec<String>,
    #[arg(long = "mount")]
    mounts: Vec<String>,
    #[arg(long = "tmpfs")]
    tmpfs: Vec<String>,
    #[arg(long = "label")]
    labels: Vec<String>,
    #[arg(long = "network")]
    networks: Vec<String>,

    #[arg(long = "dns-disabled")]
    dns_disabled: bool,
    #[arg(long = "dns-nameserver")]
    dns_nameservers: Vec<String>,
    #[arg(long = "dns-search")]
    dns_search: Vec<String>,
    #[arg(long = "dns-option")]
    dns_options: Vec<String>,
    #[arg(long = "dns-domain")]
    dns_domain: Option<String>,

    #[arg(long = "publish-port")]
    publish_ports: Vec<String>,
    #[arg(long = "publish-socket")]
    publish_sockets: Vec<String>,

    #[arg(long)]
    kernel: Option<PathBuf>,
    #[arg(long)]
    ssh: bool,
    #[arg(long)]
    cpus: Option<u32>,
    #[arg(long)]
    memory: Option<String>,
    #[arg(long)]
    nested_virtualization: bool,

    #[arg(long, value_parser = ["auto", "http", "https"], default_value = "auto")]
    scheme: String,
}

impl From<CreateArgs> for PipelineInput {
    fn from(args: CreateArgs) -> Self {
        PipelineInput {
            id: uuid::Uuid::new_v4().to_string(),
            image_reference: args.image_reference,
            os: args.os.unwrap_or_default(),
            arch: args.arch.unwrap_or_default(),
            platform_string: args.platform,
            process: ProcessFlags {
                arguments: args.arguments,
                cwd: args.cwd,
                env: args.env,
                env_files: args.env_files,
                tty: args.tty,
                user: args.user,
                uid: args.uid,
                gid: args.gid,
                entrypoint: args.entrypoint,
            },
            volumes: args.volumes,
            mounts: args.mounts,
            tmpfs: args.tmpfs,
            labels: args.labels,
            networks: args.networks,
            dns: DnsFlags {
                disabled: args.dns_disabled,
                nameservers: args.dns_nameservers,
                search_domains: args.dns_search,
                options: args.dns_options,
                domain: args.dns_domain,
            },
            ports: args.publish_ports,
            sockets: args.publish_sockets,
            kernel_path: args.kernel,
            cpus: args.cpus,
            memory: args.memory,
            ssh: args.ssh,
            virtualization: VirtualizationOptions {
                nested_virtualization: args.nested_virtualization,
            },
            default_dns_domain: None,
        }
    }
}

async fn connect() -> anyhow::Result<VesselClient<Channel>> {
    let socket_path = FilesystemLayout::resolve()?.rpc_socket_path();
    let channel = Endpoint::try_from("http://[::]:0")?
        .connect_with_connector(service_fn(move |_: Uri| {
            let socket_path = socket_path.clone();
            async move { tokio::net::UnixStream::connect(socket_path).await.map(hyper_util::rt::TokioIo::new) }
        }))
        .await?;
    Ok(VesselClient::new(channel))
}

async fn call(client: &mut VesselClient<Channel>, route: RouteId, payload: Value) -> anyhow::Result<Value> {
    let envelope = CallEnvelope {
        route: route.to_string(),
        payload: serde_json::to_vec(&payload)?,
    };
    let response = client.call(envelope).await?.into_inner();
    match response.outcome {
        Some(Outcome::Ok(ok)) => Ok(serde_json::from_slice(&ok.payload)?),
        Some(Outcome::Err(err)) => anyhow::bail!("{}: {}", err.kind, err.message),
        None => anyhow::bail!("empty response from daemon"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("vessel: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut client = connect().await?;

    let result = match cli.command {
        Command::Create(args) => {
            let input: PipelineInput = args.into();
            call(&mut client, RouteId::ContainerCreate, serde_json::json!({ "input": input })).await?
        }
        Command::Stop { id } => call(&mut client, RouteId::ContainerStop, serde_json::json!({ "id": id })).await?,
        Command::Delete { id, is_builder } => {
            call(&mut client, RouteId::ContainerDelete, serde_json::json!({ "id": id, "is_builder": is_builder })).await?
        }
        Command::List => call(&mut client, RouteId::ContainerList, Value::Null).await?,
        Command::HealthCheck => call(&mut client, RouteId::HealthPing, Value::Null).await?,
        Command::NetworkCreate { id, mode } => {
            call(&mut client, RouteId::NetworkCreate, serde_json::json!({ "id": id, "mode": mode })).await?
        }
        Command::NetworkDelete { id } => {
            call(&mut client, RouteId::NetworkDelete, serde_json::json!({ "id": id })).await?
        }
        Command::NetworkList => call(&mut client, RouteId::NetworkList, Value::Null).await?,
        Command::VolumeCreate { name } => {
            call(
                &mut client,
                RouteId::VolumeCreate,
                serde_json::json!({ "name": name, "labels": HashMap::<String, String>::new() }),
            )
            .await?
        }
        Command::VolumeDelete { name } => {
            call(&mut client, RouteId::VolumeDelete, serde_json::json!({ "name": name })).await?
        }
        Command::VolumeList => call(&mut client, RouteId::VolumeList, Value::Null).await?,
        Command::KernelInstall { source_path, arch, force } => {
            call(
                &mut client,
                RouteId::KernelInstallKernel,
                serde_json::json!({ "source_path": source_path.to_string_lossy(), "arch": arch, "force": force }),
            )
            .await?
        }
        Command::PluginList => call(&mut client, RouteId::PluginList, Value::Null).await?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
