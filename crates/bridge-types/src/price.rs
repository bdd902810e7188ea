use crate::{BridgeTypesError, ProviderVariant};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-provider rates. Loaded wholesale from the `PROVIDER_PRICES` JSON
/// environment variable (spec §6.4); the accounting code never hard-codes
/// a rate (spec §4.9, §9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPrice {
    /// USD per audio minute (input+output combined, or per §4.4.b the
    /// Deepgram `session_minutes` unit).
    #[serde(default)]
    pub per_audio_minute_usd: f64,
    /// USD per 1,000,000 input tokens.
    #[serde(default)]
    pub per_million_input_tokens_usd: f64,
    /// USD per 1,000,000 output tokens.
    #[serde(default)]
    pub per_million_output_tokens_usd: f64,
    /// USD per 1,000,000 cached input tokens.
    #[serde(default)]
    pub per_million_cached_tokens_usd: f64,
    /// USD per TTS character (composite variant, character-billed
    /// sub-providers).
    #[serde(default)]
    pub per_tts_character_usd: f64,
    /// USD per TTS second (composite variant, duration-billed
    /// sub-providers).
    #[serde(default)]
    pub per_tts_second_usd: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceTable(pub HashMap<ProviderVariant, ProviderPrice>);

impl PriceTable {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn get(&self, variant: ProviderVariant) -> Result<&ProviderPrice, BridgeTypesError> {
        self.0
            .get(&variant)
            .ok_or(BridgeTypesError::NoPriceEntry(variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_variant_keys() {
        let raw = r#"{
            "openai-realtime": {"perAudioMinuteUsd": 0.06, "perMillionInputTokensUsd": 5.0, "perMillionOutputTokensUsd": 20.0},
            "deepgram": {"perAudioMinuteUsd": 0.043},
            "composite": {"perTtsCharacterUsd": 0.00003}
        }"#;
        let table = PriceTable::from_json(raw).unwrap();
        assert_eq!(
            table.get(ProviderVariant::OpenaiRealtime).unwrap().per_audio_minute_usd,
            0.06
        );
        assert_eq!(
            table.get(ProviderVariant::Composite).unwrap().per_tts_character_usd,
            0.00003
        );
    }

    #[test]
    fn missing_entry_errors() {
        let table = PriceTable::default();
        assert!(table.get(ProviderVariant::Deepgram).is_err());
    }
}
