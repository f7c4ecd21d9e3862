//! The daemon's service singletons (§3 "Ownership", §4.7 stage 4). Each
//! service owns an in-memory cache backed by a [`crate::db`] store,
//! database-first on every mutation — the same pattern the teacher's
//! `BoxManager` uses for its box cache, generalised to containers,
//! networks, volumes and plugins.

pub mod container;
pub mod health;
pub mod network;
pub mod plugin;
pub mod volume;

pub use container::ContainerService;
pub use health::HealthService;
pub use network::NetworkService;
pub use plugin::PluginLoader;
pub use volume::VolumeService;
