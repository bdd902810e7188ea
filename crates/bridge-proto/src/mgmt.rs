//! Request/response bodies for the four Management API endpoints consumed
//! by the bridge (spec §6.3). The endpoints themselves live externally;
//! this module only pins down what goes over the wire.

use bridge_types::{AgentConfig, FunctionSpec};
use serde::{Deserialize, Serialize};

/// `GET /agents/{id}` response. The agent record itself deserializes
/// straight into `AgentConfig`; this wrapper exists because the endpoint
/// may wrap it in an envelope depending on deployment (kept explicit so a
/// future envelope change is a one-line fix here, not at every call site).
#[derive(Debug, Clone, Deserialize)]
pub struct GetAgentResponse {
    #[serde(flatten)]
    pub agent: AgentConfig,
}

/// `GET /functions/agent/{agent_id}` response.
#[derive(Debug, Clone, Deserialize)]
pub struct GetFunctionsResponse {
    pub functions: Vec<FunctionSpec>,
}

/// `GET /credits/balance` response.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CreditBalanceResponse {
    pub balance: f64,
}

/// `POST /credits/deduct` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductCreditsRequest {
    pub tenant_id: String,
    pub amount: f64,
    pub call_log_id: String,
}

/// `POST /credits/deduct` response.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeductCreditsResponse {
    pub balance_after: f64,
}

/// `POST /calls/create` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub session_id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub caller_id: String,
    pub asterisk_port: u16,
}

/// `POST /calls/create` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCallResponse {
    pub id: String,
}

/// Per-provider metrics attached to the finalize update, mirroring
/// `SessionLedger`'s raw counters so the Management API can display them
/// without re-deriving anything.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub audio_input_seconds: f64,
    pub audio_output_seconds: f64,
    pub text_input_tokens: u64,
    pub text_output_tokens: u64,
    pub cached_input_tokens: u64,
    pub session_minutes: f64,
    pub tts_characters: u64,
    pub tts_seconds: f64,
}

/// `PUT /calls/{session_id}` request body: a partial update with end
/// time, duration, per-provider metrics, and cost breakdown (spec §6.3).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCallRequest {
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub duration_seconds: f64,
    pub status: CallStatus,
    pub provider_metrics: ProviderMetrics,
    pub base_cost_usd: f64,
    pub profit_amount_usd: f64,
    pub final_cost_usd: f64,
    /// Per-provider legs recorded for the composite variant (spec S6);
    /// empty for single-endpoint variants.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub provider_metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Completed,
    Failed,
    Abandoned,
}

/// `POST /calls/{call_log_id}/functions` request body, one per function
/// call record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFunctionCallRequest {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub elapsed_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /knowledge/{kb_id}/search` request body.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeSearchRequest {
    pub query: String,
    pub top_k: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeChunk {
    pub text: String,
    pub source: String,
    pub score: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeSearchResponse {
    pub chunks: Vec<KnowledgeChunk>,
    #[serde(default)]
    pub images: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_call_request_omits_empty_provider_metadata() {
        let req = UpdateCallRequest {
            end_time: chrono::Utc::now(),
            duration_seconds: 6.0,
            status: CallStatus::Completed,
            provider_metrics: ProviderMetrics {
                audio_input_seconds: 4.0,
                audio_output_seconds: 2.0,
                text_input_tokens: 0,
                text_output_tokens: 0,
                cached_input_tokens: 0,
                session_minutes: 0.0,
                tts_characters: 0,
                tts_seconds: 0.0,
            },
            base_cost_usd: 0.01,
            profit_amount_usd: 0.002,
            final_cost_usd: 0.012,
            provider_metadata: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("providerMetadata").is_none());
    }
}
