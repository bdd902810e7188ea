//! Monitor server: the one concrete `ObservabilitySink` implementation,
//! pushing lifecycle/transcript/cost/function events to an in-memory
//! projection and out over a websocket push channel (spec Ambient:
//! Observability).

pub mod router;
pub mod sink;
pub mod state;

pub use router::{router, serve};
pub use sink::MonitorSink;
pub use state::{ConnectionSnapshot, Stats, Store};
