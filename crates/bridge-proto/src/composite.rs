//! Wire shapes for the three sub-legs the composite provider variant
//! stitches together (spec §4.4.c): a streaming STT WebSocket, a
//! non-streaming chat-completion LLM HTTP endpoint, and a TTS HTTP/WS
//! endpoint. Grounded on the OpenAI-compatible chat-completion shape that
//! recurs across the pack's LLM-gateway style code.

use serde::{Deserialize, Serialize};

/// STT server frame: interim/final transcripts plus a language hint
/// (spec §4.4.c).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SttEvent {
    Partial {
        text: String,
        #[serde(default)]
        language: Option<String>,
    },
    Final {
        text: String,
        #[serde(default)]
        language: Option<String>,
    },
    Error {
        message: String,
    },
}

/// STT client frame: raw PCM16 16kHz audio, base64-wrapped to keep the
/// transport JSON-only like the other two legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SttClientFrame {
    Audio { pcm16_base64: String },
    Finalize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: ChatFunctionDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Non-streaming chat-completion request (spec §4.4.c: "Each STT final
/// triggers an LLM chat completion").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatTool>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    pub function: ChatToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCallFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// TTS synthesis request. `voice` and sub-provider are resolved from the
/// agent's `CompositeConfig` before this is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    pub voice: String,
}

/// TTS response: PCM frames at the sub-provider's native sample rate plus
/// either a character or a duration count for billing (spec §4.4.c).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsResponse {
    pub sample_rate: u32,
    pub pcm16_base64: String,
    #[serde(default)]
    pub seconds: Option<f64>,
}
