//! Deepgram voice-agent wire protocol (spec §4.4.b). Externally the same
//! Provider Session contract as Realtime-WS, but the wire shape differs:
//! session config rides query parameters plus a `Settings` frame, audio is
//! raw binary (not base64-wrapped JSON), and keepalive is required during
//! silence (grounded on the documented OpenAI/Deepgram contrast in the
//! pack's streaming-transcription provider trait).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentListen {
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentThink {
    pub provider: ThinkProvider,
    pub instructions: String,
    pub functions: Vec<AgentFunction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkProvider {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpeak {
    pub model: String,
}

/// `Settings` frame, sent once right after the socket opens. The `type`
/// discriminant is supplied by `ClientFrame`'s tag, not a field here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    pub audio: SettingsAudio,
    pub agent: SettingsAgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsAudio {
    pub input: AudioFormat,
    pub output: AudioFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: String,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsAgent {
    pub listen: AgentListen,
    pub think: AgentThink,
    pub speak: AgentSpeak,
    pub greeting: String,
}

/// Client (bridge) -> server control frames other than raw audio bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    Settings(Settings),
    #[serde(rename = "KeepAlive")]
    KeepAlive,
    #[serde(rename = "FunctionCallResponse")]
    FunctionCallResponse {
        function_call_id: String,
        output: serde_json::Value,
    },
    #[serde(rename = "InjectAgentMessage")]
    InjectAgentMessage { message: String },
}

/// Server (provider) -> client control frames. Audio arrives as raw binary
/// WS messages and is not represented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    Welcome,
    SettingsApplied,
    #[serde(rename = "ConversationText")]
    ConversationText { role: String, content: String },
    #[serde(rename = "FunctionCallRequest")]
    FunctionCallRequest {
        function_call_id: String,
        function_name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "AgentThinking")]
    AgentThinking,
    #[serde(rename = "AgentStartedSpeaking")]
    AgentStartedSpeaking,
    #[serde(rename = "AgentAudioDone")]
    AgentAudioDone,
    #[serde(rename = "UserStartedSpeaking")]
    UserStartedSpeaking,
    #[serde(rename = "History")]
    History { session_minutes: f64 },
    Error {
        description: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_call_request_parses() {
        let raw = serde_json::json!({
            "type": "FunctionCallRequest",
            "function_call_id": "fc_1",
            "function_name": "search_knowledge",
            "input": {"query": "return policy"},
        });
        let frame: ServerFrame = serde_json::from_value(raw).unwrap();
        match frame {
            ServerFrame::FunctionCallRequest { function_name, .. } => {
                assert_eq!(function_name, "search_knowledge");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}
