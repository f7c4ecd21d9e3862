//! Placeholder [`ContainerRuntime`] wiring. The virtual-machine backend
//! itself is out of scope (§1 "container runtime semantics inside the
//! guest"); this is the seam an actual backend plugs into, mirroring
//! [`crate::kernel::KernelArtifactFetcher`]'s out-of-scope-collaborator
//! pattern. It logs every call and returns the minimal response shape
//! each operation needs so the rest of the daemon (route handlers,
//! container service bookkeeping) is fully exercisable without one.

use async_trait::async_trait;
use tokio::sync::mpsc;
use vessel_shared::Result;

use crate::config::types::{ContainerConfiguration, Kernel, ProcessConfiguration};
use crate::services::container::ContainerRuntime;

pub struct UnimplementedContainerRuntime;

#[async_trait]
impl ContainerRuntime for UnimplementedContainerRuntime {
    async fn bootstrap(&self, configuration: &ContainerConfiguration, kernel: &Kernel) -> Result<()> {
        tracing::info!(id = %configuration.id, kernel = %kernel.path.display(), "bootstrap (no VM backend wired in)");
        Ok(())
    }

    async fn dial(&self, id: &str, port: u32) -> Result<()> {
        tracing::info!(%id, port, "dial (no VM backend wired in)");
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<()> {
        tracing::info!(%id, "stop (no VM backend wired in)");
        Ok(())
    }

    async fn start_process(&self, id: &str) -> Result<()> {
        tracing::info!(%id, "start_process (no VM backend wired in)");
        Ok(())
    }

    async fn create_process(&self, id: &str, process: &ProcessConfiguration) -> Result<()> {
        tracing::info!(%id, executable = %process.executable, "create_process (no VM backend wired in)");
        Ok(())
    }

    async fn resize(&self, id: &str, columns: u32, rows: u32) -> Result<()> {
        tracing::info!(%id, columns, rows, "resize (no VM backend wired in)");
        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<i32> {
        tracing::info!(%id, "wait (no VM backend wired in)");
        Ok(0)
    }

    async fn kill(&self, id: &str, signal: i32) -> Result<()> {
        tracing::info!(%id, signal, "kill (no VM backend wired in)");
        Ok(())
    }

    async fn logs(&self, id: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        tracing::info!(%id, "logs (no VM backend wired in)");
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }
}
