//! HTTP client wrapping the Management API, with an in-process TTL cache
//! for Agent Config (spec §4.x, §6.3).

pub mod cache;
pub mod client;
pub mod error;

pub use cache::AgentCache;
pub use client::MgmtClient;
pub use error::MgmtError;
