//! System-prompt composition (spec §4.4, "performed by the Connection
//! before `configure`"): five ordered blocks concatenated into the single
//! string every provider variant receives as `instructions`.

use bridge_types::{AgentConfig, CallMetadata};
use chrono::{DateTime, Utc};

const OUT_OF_CONTEXT_CLAUSE: &str = "Only answer using the context and instructions provided above. \
If the caller asks something outside that context, say you are not able to help with that and offer \
to transfer them to a human agent.";

const TRANSFER_CLAUSE: &str = "If the caller explicitly asks to speak to a human or be transferred, \
confirm once (\"Just to confirm, you'd like me to transfer you now?\") and, once they agree, call the \
transfer_to_agent function with the appropriate queue_name.";

/// Builds the composed `instructions` string for a call, in the order
/// spec §4.4 lists: caller-info block, custom-context block, agent
/// instructions, the out-of-context clause, the transfer-usage clause.
pub fn compose(agent: &AgentConfig, metadata: &CallMetadata, session_started_at: DateTime<Utc>) -> String {
    let caller_block = format!(
        "Caller ID: {}\nCaller name: {}\nSession ID: {}\nCall start (UTC): {}",
        metadata.caller_id,
        metadata.caller_name.as_deref().unwrap_or("unknown"),
        metadata.session_id,
        session_started_at.to_rfc3339(),
    );

    let mut blocks = vec![caller_block];

    if let Some(custom_data) = &metadata.custom_data {
        let rendered = custom_data.as_prompt_block();
        if !rendered.is_empty() {
            blocks.push(rendered);
        }
    }

    blocks.push(agent.instructions.clone());
    blocks.push(OUT_OF_CONTEXT_CLAUSE.to_string());
    blocks.push(TRANSFER_CLAUSE.to_string());

    blocks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{CustomData, OpenAiRealtimeConfig, ProviderConfig};
    use std::collections::HashMap;

    fn agent() -> AgentConfig {
        AgentConfig {
            agent_id: "G1".into(),
            name: "Sales".into(),
            tenant_id: "T1".into(),
            is_active: true,
            provider: ProviderConfig::OpenaiRealtime(OpenAiRealtimeConfig {
                realtime_url: "wss://example".into(),
                api_key_env: None,
            }),
            instructions: "Help the caller with orders.".into(),
            greeting: "Hello".into(),
            language: "en".into(),
            voice: "alloy".into(),
            model: "gpt-4o-realtime".into(),
            temperature: 0.8,
            max_tokens: 200,
            vad_threshold: 0.5,
            silence_duration_ms: 500,
            functions: vec![],
            knowledge_base_id: None,
        }
    }

    fn metadata() -> CallMetadata {
        let mut data = HashMap::new();
        data.insert("order_id".to_string(), "A-42".to_string());
        CallMetadata {
            session_id: "S1".into(),
            agent_id: "G1".into(),
            caller_id: "+15551234567".into(),
            tenant_id: Some("T1".into()),
            caller_name: Some("Riley".into()),
            custom_data: Some(CustomData(data)),
        }
    }

    #[test]
    fn composition_preserves_block_order() {
        let prompt = compose(&agent(), &metadata(), Utc::now());
        let caller_pos = prompt.find("Caller ID").unwrap();
        let custom_pos = prompt.find("order_id").unwrap();
        let instructions_pos = prompt.find("Help the caller").unwrap();
        let out_of_context_pos = prompt.find("not able to help").unwrap();
        let transfer_pos = prompt.find("transfer_to_agent").unwrap();
        assert!(caller_pos < custom_pos);
        assert!(custom_pos < instructions_pos);
        assert!(instructions_pos < out_of_context_pos);
        assert!(out_of_context_pos < transfer_pos);
    }

    #[test]
    fn missing_custom_data_skips_that_block_without_gap() {
        let mut md = metadata();
        md.custom_data = None;
        let prompt = compose(&agent(), &md, Utc::now());
        assert!(!prompt.contains("order_id"));
    }
}
