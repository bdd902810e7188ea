//! Wires the rest of the workspace's crates into the running call-handling
//! core: the Connection Manager, its gated entry path, the per-call actor,
//! and the lifecycle monitors (spec §4.6, §4.10).

pub mod config;
pub mod connection;
pub mod manager;
pub mod monitors;
pub mod observability;
pub mod prompt;
pub mod provider_factory;

pub use config::{BridgeConfig, ConfigError};
pub use connection::{ConnectionDeps, ConnectionHandle};
pub use manager::{ConnectionManager, ManagerConfig};
pub use monitors::Monitors;
pub use observability::{ObservabilityEvent, ObservabilitySink, SharedSink};
