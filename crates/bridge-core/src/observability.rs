//! The observability sink contract (spec §6.5). `bridge-core` only knows
//! it has *some* sink to push lifecycle/transcript/cost/function events
//! to; the `observability` crate is the one concrete implementation
//! (a push-channel HTTP server), kept out of this crate to avoid a
//! dependency cycle (it needs these event shapes, not the other way
//! around).

use std::sync::Arc;

use bridge_types::{CostBreakdown, FunctionCallOutcome};
use provider_session::Speaker;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ObservabilityEvent {
    ConnectionAdded {
        connection_id: String,
        session_id: String,
        agent_id: String,
        caller_id: String,
    },
    ConnectionUpdated {
        connection_id: String,
        cost: CostBreakdown,
    },
    ConnectionRemoved {
        connection_id: String,
    },
    Transcript {
        connection_id: String,
        speaker: Speaker,
        text: String,
        is_final: bool,
    },
    CostUpdate {
        connection_id: String,
        cost: CostBreakdown,
    },
    FunctionCall {
        connection_id: String,
        call_id: String,
        name: String,
        arguments: Value,
    },
    FunctionResponse {
        connection_id: String,
        call_id: String,
        outcome: FunctionCallOutcome,
    },
}

/// Fire-and-forget by design (spec §6.5: observability is read-only and
/// best-effort): a lagging or absent subscriber must never slow down or
/// block call handling.
pub trait ObservabilitySink: Send + Sync {
    fn emit(&self, event: ObservabilityEvent);
}

/// Used where no process-wide sink has been wired in yet (e.g. unit
/// tests exercising `Connection` in isolation).
pub struct NullSink;

impl ObservabilitySink for NullSink {
    fn emit(&self, _event: ObservabilityEvent) {}
}

pub type SharedSink = Arc<dyn ObservabilitySink>;
