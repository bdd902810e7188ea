//! The polymorphic Provider Session contract (spec §4.3) implemented by
//! all three provider variants.

use async_trait::async_trait;
use bridge_types::ProviderVariant;
use serde_json::Value;

use crate::error::ProviderError;
use crate::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Pcm16_16kHz,
    Pcm16_24kHz,
}

impl AudioFormat {
    pub fn sample_rate_hz(self) -> u32 {
        match self {
            AudioFormat::Pcm16_16kHz => 16_000,
            AudioFormat::Pcm16_24kHz => 24_000,
        }
    }
}

#[async_trait]
pub trait ProviderSession: Send + Sync {
    fn session_id(&self) -> &str;
    fn variant(&self) -> ProviderVariant;
    fn state(&self) -> SessionState;

    /// Idempotent; the Connection may call this more than once (e.g. a
    /// retried setup) and only the first call should take effect once
    /// past `ready`.
    async fn configure(
        &self,
        instructions: String,
        tools: Vec<Value>,
        audio_format: AudioFormat,
    ) -> Result<(), ProviderError>;

    /// Enqueue a caller-side audio frame. Safe to call from any scheduler
    /// slot (spec §4.3): implementations buffer internally rather than
    /// blocking on the network write.
    fn push_audio(&self, pcm16_frame: Vec<i16>) -> Result<(), ProviderError>;

    async fn request_response(&self) -> Result<(), ProviderError>;

    async fn submit_tool_result(&self, call_id: String, result: Value) -> Result<(), ProviderError>;

    /// Inject a system-authored context message without resolving any
    /// pending tool call. Used for an async function's follow-up turn
    /// (spec §4.5): the model should hear about a background job's result
    /// on its next utterance, not as a response to a tool call it already
    /// got an immediate ack for.
    async fn push_context_message(&self, text: String) -> Result<(), ProviderError>;

    /// Idempotent; safe to call more than once.
    async fn close(&self);
}
