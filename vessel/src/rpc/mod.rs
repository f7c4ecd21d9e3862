//! RPC route table and transport (C7, §6 "RPC route identifiers").
//!
//! The route table itself is transport-agnostic: a map from a stable
//! [`RouteId`] to a handler, built once during bootstrap and never
//! mutated again (§5 "the route map is fully built before the RPC server
//! begins listening"). [`server`] wires that map to the one concrete
//! transport it runs over — a generic envelope RPC rather than one method
//! per route, since the route identifier is already how call sites select
//! behaviour.

pub mod server;
pub mod unix_stream;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_stream::wrappers::ReceiverStream;
use vessel_shared::{Error, Result};

/// Stable RPC route identifiers (§6). Unary routes are dispatched through
/// [`RouteHandler`]; the three streaming routes (`ContainerLogs`,
/// `ContainerWait`, `ContainerDial`) through [`StreamRouteHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteId {
    ContainerList,
    ContainerCreate,
    ContainerDelete,
    ContainerLogs,
    ContainerBootstrap,
    ContainerDial,
    ContainerStop,
    ContainerStartProcess,
    ContainerCreateProcess,
    ContainerResize,
    ContainerWait,
    ContainerKill,
    NetworkCreate,
    NetworkDelete,
    NetworkList,
    VolumeCreate,
    VolumeDelete,
    VolumeList,
    VolumeInspect,
    KernelInstallKernel,
    KernelGetDefaultKernel,
    PluginGet,
    PluginList,
    PluginLoad,
    PluginUnload,
    PluginRestart,
    HealthPing,
}

impl RouteId {
    pub const fn as_str(self) -> &'static str {
        match self {
            RouteId::ContainerList => "container.list",
            RouteId::ContainerCreate => "container.create",
            RouteId::ContainerDelete => "container.delete",
            RouteId::ContainerLogs => "container.logs",
            RouteId::ContainerBootstrap => "container.bootstrap",
            RouteId::ContainerDial => "container.dial",
            RouteId::ContainerStop => "container.stop",
            RouteId::ContainerStartProcess => "container.startProcess",
            RouteId::ContainerCreateProcess => "container.createProcess",
            RouteId::ContainerResize => "container.resize",
            RouteId::ContainerWait => "container.wait",
            RouteId::ContainerKill => "container.kill",
            RouteId::NetworkCreate => "network.create",
            RouteId::NetworkDelete => "network.delete",
            RouteId::NetworkList => "network.list",
            RouteId::VolumeCreate => "volume.create",
            RouteId::VolumeDelete => "volume.delete",
            RouteId::VolumeList => "volume.list",
            RouteId::VolumeInspect => "volume.inspect",
            RouteId::KernelInstallKernel => "kernel.installKernel",
            RouteId::KernelGetDefaultKernel => "kernel.getDefaultKernel",
            RouteId::PluginGet => "plugin.get",
            RouteId::PluginList => "plugin.list",
            RouteId::PluginLoad => "plugin.load",
            RouteId::PluginUnload => "plugin.unload",
            RouteId::PluginRestart => "plugin.restart",
            RouteId::HealthPing => "health.ping",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        ALL_ROUTES
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| Error::invalid_argument(format!("unknown route: {s}")))
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, RouteId::ContainerLogs | RouteId::ContainerWait | RouteId::ContainerDial)
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ALL_ROUTES: &[RouteId] = &[
    RouteId::ContainerList,
    RouteId::ContainerCreate,
    RouteId::ContainerDelete,
    RouteId::ContainerLogs,
    RouteId::ContainerBootstrap,
    RouteId::ContainerDial,
    RouteId::ContainerStop,
    RouteId::ContainerStartProcess,
    RouteId::ContainerCreateProcess,
    RouteId::ContainerResize,
    RouteId::ContainerWait,
    RouteId::ContainerKill,
    RouteId::NetworkCreate,
    RouteId::NetworkDelete,
    RouteId::NetworkList,
    RouteId::VolumeCreate,
    RouteId::VolumeDelete,
    RouteId::VolumeList,
    RouteId::VolumeInspect,
    RouteId::KernelInstallKernel,
    RouteId::KernelGetDefaultKernel,
    RouteId::PluginGet,
    RouteId::PluginList,
    RouteId::PluginLoad,
    RouteId::PluginUnload,
    RouteId::PluginRestart,
    RouteId::HealthPing,
];

/// A unary route handler. Handlers must be safe for concurrent invocation
/// (§5 "route handler concurrency") — any per-entity serialisation is the
/// owning service's responsibility, not the route table's.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<Value>;
}

/// A streaming route handler, yielding a sequence of payloads on one
/// invocation (container logs, wait, dial).
#[async_trait]
pub trait StreamRouteHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<ReceiverStream<Result<Value>>>;
}

/// The daemon's public API surface: every registered route, built once
/// and shared read-only thereafter.
pub struct RouteTable {
    unary: HashMap<RouteId, Arc<dyn RouteHandler>>,
    streaming: HashMap<RouteId, Arc<dyn StreamRouteHandler>>,
}

impl RouteTable {
    pub async fn dispatch(&self, route: RouteId, payload: Value) -> Result<Value> {
        let handler = self
            .unary
            .get(&route)
            .ok_or_else(|| Error::not_found(format!("no handler registered for {route}")))?;
        handler.handle(payload).await
    }

    pub async fn dispatch_stream(&self, route: RouteId, payload: Value) -> Result<ReceiverStream<Result<Value>>> {
        let handler = self
            .streaming
            .get(&route)
            .ok_or_else(|| Error::not_found(format!("no streaming handler registered for {route}")))?;
        handler.handle(payload).await
    }
}

/// Accumulates route registrations during bootstrap (§4.7 step 4: "each
/// service registers a set of route handlers into a shared route map").
#[derive(Default)]
pub struct RouteTableBuilder {
    unary: HashMap<RouteId, Arc<dyn RouteHandler>>,
    streaming: HashMap<RouteId, Arc<dyn StreamRouteHandler>>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, route: RouteId, handler: Arc<dyn RouteHandler>) -> Self {
        self.unary.insert(route, handler);
        self
    }

    pub fn register_stream(mut self, route: RouteId, handler: Arc<dyn StreamRouteHandler>) -> Self {
        self.streaming.insert(route, handler);
        self
    }

    pub fn build(self) -> RouteTable {
        RouteTable {
            unary: self.unary,
            streaming: self.streaming,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl RouteHandler for EchoHandler {
        async fn handle(&self, payload: Value) -> Result<Value> {
            Ok(payload)
        }
    }

    #[test]
    fn every_route_id_round_trips_through_its_string_form() {
        for route in ALL_ROUTES {
            assert_eq!(RouteId::parse(route.as_str()).unwrap(), *route);
        }
    }

    #[test]
    fn unknown_route_string_is_rejected() {
        assert!(RouteId::parse("bogus.route").is_err());
    }

    #[tokio::test]
    async fn dispatch_invokes_registered_handler() {
        let table = RouteTableBuilder::new()
            .register(RouteId::HealthPing, Arc::new(EchoHandler))
            .build();
        let result = table.dispatch(RouteId::HealthPing, Value::String("ping".into())).await.unwrap();
        assert_eq!(result, Value::String("ping".into()));
    }

    #[tokio::test]
    async fn dispatch_to_unregistered_route_is_not_found() {
        let table = RouteTableBuilder::new().build();
        let err = table.dispatch(RouteId::HealthPing, Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn streaming_routes_match_spec_enumeration() {
        assert!(RouteId::ContainerLogs.is_streaming());
        assert!(RouteId::ContainerWait.is_streaming());
        assert!(RouteId::ContainerDial.is_streaming());
        assert!(!RouteId::ContainerCreate.is_streaming());
    }
}
