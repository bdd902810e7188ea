use crate::{BridgeTypesError, FunctionSpec};
use serde::{Deserialize, Serialize};

/// The three provider wire protocols the bridge speaks. Resolved once at
/// Agent Config load time and never re-matched on the hot path (spec §9:
/// "resolve the variant at load, never at use").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderVariant {
    OpenaiRealtime,
    Deepgram,
    Composite,
}

/// OpenAI Realtime-WS specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiRealtimeConfig {
    pub realtime_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Deepgram voice-agent specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepgramConfig {
    pub voice_agent_url: String,
    pub deepgram_voice: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Composite STT+LLM+TTS specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeConfig {
    pub stt_url: String,
    #[serde(default)]
    pub stt_language_hints: Vec<String>,
    pub llm_url: String,
    pub llm_model: String,
    pub tts_provider: String,
    pub tts_url: String,
    pub custom_voice: String,
}

/// Tagged variant of provider-specific agent fields, sharing a common base
/// (spec §9: "ad-hoc object bags ... map to a tagged variant per provider
/// with a shared base").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "kebab-case")]
pub enum ProviderConfig {
    OpenaiRealtime(OpenAiRealtimeConfig),
    Deepgram(DeepgramConfig),
    Composite(CompositeConfig),
}

impl ProviderConfig {
    pub fn variant(&self) -> ProviderVariant {
        match self {
            ProviderConfig::OpenaiRealtime(_) => ProviderVariant::OpenaiRealtime,
            ProviderConfig::Deepgram(_) => ProviderVariant::Deepgram,
            ProviderConfig::Composite(_) => ProviderVariant::Composite,
        }
    }
}

/// Fetched by `agent_id` from the Management API and cached with a TTL
/// (spec §3). Shared-immutable once cached: cache eviction replaces the
/// whole entry rather than mutating fields in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub agent_id: String,
    pub name: String,
    pub tenant_id: String,
    pub is_active: bool,
    pub provider: ProviderConfig,
    pub instructions: String,
    pub greeting: String,
    pub language: String,
    pub voice: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub vad_threshold: f32,
    pub silence_duration_ms: u32,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
}

impl AgentConfig {
    /// Validates the invariants spec §3 lists for Agent Config. Called
    /// once right after the Management API response is deserialized.
    pub fn validate(&self) -> Result<(), BridgeTypesError> {
        if !self.is_active {
            return Err(BridgeTypesError::AgentInactive(self.agent_id.clone()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(BridgeTypesError::TemperatureOutOfRange(self.temperature));
        }
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            return Err(BridgeTypesError::VadThresholdOutOfRange(self.vad_threshold));
        }
        Ok(())
    }

    pub fn provider_variant(&self) -> ProviderVariant {
        self.provider.variant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AgentConfig {
        AgentConfig {
            agent_id: "G1".into(),
            name: "Sales agent".into(),
            tenant_id: "T1".into(),
            is_active: true,
            provider: ProviderConfig::OpenaiRealtime(OpenAiRealtimeConfig {
                realtime_url: "wss://example.com/realtime".into(),
                api_key_env: None,
            }),
            instructions: "Be helpful.".into(),
            greeting: "Hello".into(),
            language: "en".into(),
            voice: "alloy".into(),
            model: "gpt-4o-realtime".into(),
            temperature: 0.8,
            max_tokens: 4096,
            vad_threshold: 0.5,
            silence_duration_ms: 500,
            functions: vec![],
            knowledge_base_id: None,
        }
    }

    #[test]
    fn inactive_agent_rejected() {
        let mut cfg = base_config();
        cfg.is_active = false;
        assert!(matches!(
            cfg.validate(),
            Err(BridgeTypesError::AgentInactive(_))
        ));
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        let mut cfg = base_config();
        cfg.temperature = 2.5;
        assert!(matches!(
            cfg.validate(),
            Err(BridgeTypesError::TemperatureOutOfRange(_))
        ));
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn provider_tag_roundtrips() {
        let cfg = base_config();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider_variant(), ProviderVariant::OpenaiRealtime);
    }
}
