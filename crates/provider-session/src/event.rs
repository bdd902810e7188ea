//! Upstream event channel emitted by a Provider Session (spec §4.3).

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// Provider-tagged bag of ledger deltas. Every field defaults to zero so a
/// variant only sets what it actually measured; `SessionLedger::apply`
/// folds these in (spec §3, "counters are monotonically non-decreasing").
#[derive(Debug, Clone, Copy, Default)]
pub struct CostMetricDelta {
    pub audio_input_seconds: f64,
    pub audio_output_seconds: f64,
    pub text_input_tokens: u64,
    pub text_output_tokens: u64,
    pub cached_input_tokens: u64,
    pub session_minutes: f64,
    pub tts_characters: u64,
    pub tts_seconds: f64,
}

#[derive(Debug, Clone)]
pub enum ProviderEvent {
    AudioOut(Vec<i16>),
    Transcript {
        speaker: Speaker,
        text: String,
        is_final: bool,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: Value,
    },
    CostMetric(CostMetricDelta),
    Done,
    Error {
        kind: String,
        message: String,
    },
}
