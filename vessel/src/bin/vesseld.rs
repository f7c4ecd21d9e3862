//! `vesseld`: the API daemon (C7, §4.7 "Daemon bootstrap sequence").
//!
//! Bootstrap order, matching §4.7 exactly: init logging, scan and load
//! bootable plugins, construct every service singleton, register every
//! route into one table before the RPC server starts listening, ensure
//! the default network exists, then run the RPC server and DNS server
//! concurrently until either exits with a fatal error.

use std::path::PathBuf;
use std::sync::Arc;

use vessel::config::pipeline::{HostInfo, ImageClient};
use vessel::db::{ContainerStore, Database, DnsHostStore, NetworkStore, VolumeStore};
use vessel::dns::DnsServer;
use vessel::handlers::{self, Services};
use vessel::host::SystemHostInfo;
use vessel::kernel::KernelService;
use vessel::layout::DaemonOptions;
use vessel::registry::RegistryImageClient;
use vessel::rpc::server::VesselRpcService;
use vessel::rpc::unix_stream;
use vessel::services::{ContainerService, HealthService, NetworkService, PluginLoader, VolumeService};

fn init_logging(logs_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    std::fs::create_dir_all(logs_dir).expect("create logs directory");
    let file_appender = tracing_appender::rolling::daily(logs_dir, "vesseld.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    let options = DaemonOptions::from_env().expect("resolve daemon options");
    options.layout.prepare().expect("prepare filesystem layout");
    let _logging_guard = init_logging(&options.layout.logs_dir());

    tracing::info!(home = %options.layout.home_dir().display(), "vesseld starting");

    let plugin_loader = Arc::new(PluginLoader::with_default_factories());
    let scan_dirs = options.layout.plugin_scan_dirs(&options.install_root);
    if let Err(e) = plugin_loader.scan(&scan_dirs) {
        tracing::error!(error = %e, "plugin scan failed");
    }
    for plugin in plugin_loader.bootable() {
        tracing::info!(name = %plugin.name, "discovered bootable plugin");
    }

    let db = Database::open(&options.layout.db_path()).expect("open database");

    let networks = NetworkService::new(NetworkStore::new(db.clone()), DnsHostStore::new(db.clone()))
        .expect("construct network service");
    let volumes = VolumeService::new(VolumeStore::new(db.clone()), options.layout.volumes_dir())
        .expect("construct volume service");
    let kernels = Arc::new(KernelService::new(options.layout.kernels_dir()).expect("construct kernel service"));
    let containers = ContainerService::new(
        ContainerStore::new(db.clone()),
        Arc::new(vessel::runtime::UnimplementedContainerRuntime),
    )
    .expect("construct container service");
    let health = Arc::new(HealthService::new());
    let image_client: Arc<dyn ImageClient> =
        Arc::new(RegistryImageClient::new(options.layout.images_dir()).expect("construct registry client"));
    let host_info: Arc<dyn HostInfo> = Arc::new(SystemHostInfo);

    let route_table = Arc::new(
        handlers::register_routes(Services {
            containers,
            networks: networks.clone(),
            volumes,
            kernels,
            plugins: plugin_loader,
            health,
            image_client,
            host_info,
        })
        .build(),
    );

    networks.ensure_default().expect("ensure default network");

    let rpc_socket_path = options.layout.rpc_socket_path();
    let dns_bind_addr: std::net::SocketAddr = options.dns_bind_addr.parse().expect("parse dns bind address");

    let rpc_task = tokio::spawn(run_rpc_server(rpc_socket_path, route_table));
    let dns_task = tokio::spawn(async move {
        Arc::new(DnsServer::new(networks, dns_bind_addr)).run().await
    });

    tokio::select! {
        result = rpc_task => {
            if let Err(e) = result.expect("rpc server task panicked") {
                tracing::error!(error = %e, "rpc server exited");
                std::process::exit(e.exit_code());
            }
        }
        result = dns_task => {
            if let Err(e) = result.expect("dns server task panicked") {
                tracing::error!(error = %e, "dns server exited");
                std::process::exit(e.exit_code());
            }
        }
    }
}

async fn run_rpc_server(
    socket_path: PathBuf,
    route_table: Arc<vessel::rpc::RouteTable>,
) -> vessel_shared::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = tokio::net::UnixListener::bind(&socket_path)?;
    tracing::info!(socket = %socket_path.display(), "rpc server listening");

    let service = VesselRpcService::new(route_table).into_server();
    tonic::transport::Server::builder()
        .add_service(service)
        .serve_with_incoming(unix_stream::incoming(listener))
        .await
        .map_err(|e| vessel_shared::Error::internal(format!("rpc server failed: {e}")))
}
