//! Domain types shared by every crate in the bridge workspace.
//!
//! Nothing in here talks to the network; these are the nouns the rest of
//! the bridge is built from (call metadata, agent configuration, function
//! specs, the session ledger, price table).

mod agent;
mod call;
mod endpoint;
mod function_spec;
mod ledger;
mod price;

pub use agent::{
    AgentConfig, CompositeConfig, DeepgramConfig, OpenAiRealtimeConfig, ProviderConfig,
    ProviderVariant,
};
pub use call::{CallMetadata, CustomData};
pub use endpoint::Endpoint;
pub use function_spec::{ExecutionMode, FunctionSpec, HandlerType};
pub use ledger::{CostBreakdown, FunctionCallOutcome, FunctionCallRecord, SessionLedger};
pub use price::{PriceTable, ProviderPrice};

use thiserror::Error;

/// Errors that arise purely from validating/constructing domain values.
#[derive(Debug, Error)]
pub enum BridgeTypesError {
    #[error("agent {0} is inactive")]
    AgentInactive(String),
    #[error("agent config missing required field: {0}")]
    MissingField(&'static str),
    #[error("temperature {0} out of range [0,2]")]
    TemperatureOutOfRange(f32),
    #[error("vad threshold {0} out of range [0,1]")]
    VadThresholdOutOfRange(f32),
    #[error("no price entry for provider variant {0:?}")]
    NoPriceEntry(ProviderVariant),
}
