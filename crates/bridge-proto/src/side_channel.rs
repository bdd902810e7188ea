//! Payload shapes for the side-channel store (spec §6.2): the per-call
//! metadata hash and the two pub/sub channels the bridge publishes to.

use serde::{Deserialize, Serialize};

/// `aiva_ready` pub/sub payload, published once a Connection is ready so
/// the PBX may unmute audio toward the bridge (spec §4.6 step 8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyEvent {
    pub session_id: String,
}

/// `transfer:{port}` pub/sub payload, published by the transfer handler
/// (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    pub session_id: String,
    pub queue_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Field names inside the `transcriptionPort:{port}` hash (spec §6.2). The
/// hash itself is read/written field-by-field by `side-channel`'s Redis
/// client; these constants keep the field names in one place.
pub mod fields {
    pub const SESSION_ID: &str = "sessionId";
    pub const AGENT_ID: &str = "agentId";
    pub const CALLER_ID: &str = "callerId";
    pub const CALLER_NAME: &str = "callerName";
    pub const TENANT_ID: &str = "tenantId";
    pub const CUSTOM_DATA: &str = "customData";
    pub const HANGUP: &str = "hangup";
}

pub fn metadata_key(port: u16) -> String {
    format!("transcriptionPort:{port}")
}

pub fn transfer_channel(port: u16) -> String {
    format!("transfer:{port}")
}

pub const READY_CHANNEL: &str = "aiva_ready";
