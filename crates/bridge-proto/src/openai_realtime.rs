//! OpenAI Realtime-WS wire protocol (spec §4.4.a): a single duplex
//! WebSocket exchanging JSON client/server events.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerVadTurnDetection {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeFunctionTool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// `session.update` payload: the composed system prompt, tool schemas,
/// voice id, and server-side VAD settings (spec §4.4.a).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionUpdate {
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub turn_detection: ServerVadTurnDetection,
    pub tools: Vec<RealtimeFunctionTool>,
    pub temperature: f32,
    pub max_response_output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConversationItemContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ConversationItemContent>>,
}

/// Events sent client (bridge) -> server (provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
    #[serde(rename = "response.cancel")]
    ResponseCancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageTokenDetails {
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub text_tokens: u64,
    #[serde(default)]
    pub audio_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub input_token_details: Option<UsageTokenDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub id: String,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// Events sent server (provider) -> client (bridge).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,
    #[serde(rename = "session.updated")]
    SessionUpdated,
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta { response_id: String, delta: String },
    #[serde(rename = "response.audio.done")]
    ResponseAudioDone { response_id: String },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted { transcript: String },
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta { response_id: String, delta: String },
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        response_id: String,
        transcript: String,
    },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { call_id: String, delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        call_id: String,
        name: String,
        arguments: String,
    },
    #[serde(rename = "response.done")]
    ResponseDone { response: ResponseInfo },
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_event_tags_by_type() {
        let ev = ClientEvent::ResponseCreate;
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "response.create");
    }

    #[test]
    fn server_event_parses_function_call_done() {
        let raw = serde_json::json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_123",
            "name": "transfer_to_agent",
            "arguments": "{\"queue_name\":\"sales\"}",
        });
        let ev: ServerEvent = serde_json::from_value(raw).unwrap();
        match ev {
            ServerEvent::FunctionCallArgumentsDone { call_id, name, .. } => {
                assert_eq!(call_id, "call_123");
                assert_eq!(name, "transfer_to_agent");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn response_done_carries_usage_for_cost_accounting() {
        let raw = serde_json::json!({
            "type": "response.done",
            "response": {
                "id": "resp_1",
                "usage": {"input_tokens": 120, "output_tokens": 48}
            }
        });
        let ev: ServerEvent = serde_json::from_value(raw).unwrap();
        match ev {
            ServerEvent::ResponseDone { response } => {
                let usage = response.usage.unwrap();
                assert_eq!(usage.input_tokens, 120);
                assert_eq!(usage.output_tokens, 48);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
