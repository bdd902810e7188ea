//! The two mandatory built-in inline handlers (spec §4.7, §4.8). A third
//! function, `check_order_status`, is not hand-coded here: spec §4.5
//! describes it as an ordinary `HandlerType::Api` spec an agent opts into
//! by naming it in its own function list, so `FunctionExecutor::register`'s
//! existing `Api` branch already covers it with no special-casing needed.

use async_trait::async_trait;
use bridge_types::FunctionCallOutcome;
use mgmt_client::MgmtClient;
use serde::Deserialize;
use serde_json::json;
use side_channel::SideChannelClient;

use crate::context::CallContext;
use crate::handler::FunctionHandler;

/// `transfer_to_agent({queue_name, reason?})` (spec §4.7). Publishes a
/// transfer request on the side-channel pub/sub channel keyed by the
/// connection's PBX port; the PBX performs the actual bridge. Does not
/// close the Connection itself.
pub struct TransferToAgentHandler {
    side_channel: SideChannelClient,
}

impl TransferToAgentHandler {
    pub fn new(side_channel: SideChannelClient) -> Self {
        Self { side_channel }
    }
}

#[derive(Deserialize)]
struct TransferArgs {
    queue_name: String,
    reason: Option<String>,
}

#[async_trait]
impl FunctionHandler for TransferToAgentHandler {
    async fn call(&self, arguments: serde_json::Value, ctx: &CallContext) -> FunctionCallOutcome {
        let args: TransferArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(err) => {
                return FunctionCallOutcome::Error {
                    error: format!("invalid arguments: {err}"),
                }
            }
        };

        let publish = self
            .side_channel
            .publish_transfer(
                ctx.asterisk_port,
                &ctx.session_id,
                &args.queue_name,
                args.reason.as_deref(),
            )
            .await;

        match publish {
            Ok(()) => FunctionCallOutcome::Success {
                data: json!({
                    "success": true,
                    "spoken": format!("Transferring you to the {} queue now", args.queue_name),
                }),
            },
            Err(err) => FunctionCallOutcome::Error {
                error: err.to_string(),
            },
        }
    }
}

/// `search_knowledge({query, top_k?})` (spec §4.8). Looks up the agent's
/// knowledge-base id from context and calls the Mgmt API search endpoint,
/// capped to `top_k` (default 5, max 10).
pub struct SearchKnowledgeHandler {
    mgmt: MgmtClient,
}

impl SearchKnowledgeHandler {
    pub fn new(mgmt: MgmtClient) -> Self {
        Self { mgmt }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    top_k: Option<u32>,
}

#[async_trait]
impl FunctionHandler for SearchKnowledgeHandler {
    async fn call(&self, arguments: serde_json::Value, ctx: &CallContext) -> FunctionCallOutcome {
        let Some(kb_id) = ctx.knowledge_base_id.clone() else {
            return FunctionCallOutcome::Error {
                error: "agent has no knowledge base configured".into(),
            };
        };

        let args: SearchArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(err) => {
                return FunctionCallOutcome::Error {
                    error: format!("invalid arguments: {err}"),
                }
            }
        };
        let top_k = args.top_k.unwrap_or(5).min(10);

        let request = bridge_proto::mgmt::KnowledgeSearchRequest {
            query: args.query,
            top_k,
        };

        match self.mgmt.search_knowledge(&kb_id, request).await {
            Ok(response) => FunctionCallOutcome::Success {
                data: serde_json::to_value(response).unwrap_or(serde_json::Value::Null),
            },
            Err(err) => FunctionCallOutcome::Error {
                error: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CallContext {
        CallContext {
            connection_id: "conn-1".into(),
            session_id: "sess-1".into(),
            caller_id: "+15551234567".into(),
            tenant_id: Some("tenant-1".into()),
            asterisk_port: 5000,
            knowledge_base_id: Some("kb-1".into()),
        }
    }

    #[tokio::test]
    async fn search_knowledge_without_kb_id_errors() {
        let handler = SearchKnowledgeHandler::new(
            MgmtClient::new("https://example.invalid".into(), "key", std::time::Duration::from_secs(60)).unwrap(),
        );
        let mut no_kb = ctx();
        no_kb.knowledge_base_id = None;
        let outcome = handler.call(json!({"query": "return policy"}), &no_kb).await;
        assert!(matches!(outcome, FunctionCallOutcome::Error { .. }));
    }
}
