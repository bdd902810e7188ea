use crate::{BridgeTypesError, PriceTable, ProviderVariant};
use serde::{Deserialize, Serialize};

/// Per-call cost breakdown, derived from the ledger's raw counters and the
/// price table. Frozen once `finalize` runs (spec §3: "finalization
/// freezes them").
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub base_cost_usd: f64,
    pub profit_amount_usd: f64,
    pub final_cost_usd: f64,
}

/// Per-call counters and cost accumulators (spec §3).
///
/// Counters are monotonically non-decreasing while the call is live
/// (testable property in spec §8, invariant 1); callers enforce the
/// elapsed-time bound by comparing against wall-clock call start, which
/// lives one layer up in `Connection` since `SessionLedger` itself has no
/// notion of time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLedger {
    pub audio_input_seconds: f64,
    pub audio_output_seconds: f64,
    pub text_input_tokens: u64,
    pub text_output_tokens: u64,
    pub cached_input_tokens: u64,
    /// Provider-specific unit (Deepgram's natural billing unit, spec
    /// §4.4.b). Zero for token-billed providers.
    pub session_minutes: f64,
    /// Composite-variant TTS billing units; at most one of these two is
    /// nonzero depending on the sub-provider's pricing model (spec §4.4.c).
    pub tts_characters: u64,
    pub tts_seconds: f64,
    #[serde(default)]
    finalized: bool,
    #[serde(default)]
    pub cost: CostBreakdown,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_audio_input_seconds(&mut self, seconds: f64) {
        debug_assert!(!self.finalized, "ledger mutated after finalize");
        self.audio_input_seconds += seconds.max(0.0);
    }

    pub fn add_audio_output_seconds(&mut self, seconds: f64) {
        debug_assert!(!self.finalized, "ledger mutated after finalize");
        self.audio_output_seconds += seconds.max(0.0);
    }

    pub fn add_text_tokens(&mut self, input: u64, output: u64, cached: u64) {
        debug_assert!(!self.finalized, "ledger mutated after finalize");
        self.text_input_tokens += input;
        self.text_output_tokens += output;
        self.cached_input_tokens += cached;
    }

    pub fn add_session_minutes(&mut self, minutes: f64) {
        debug_assert!(!self.finalized, "ledger mutated after finalize");
        self.session_minutes += minutes.max(0.0);
    }

    pub fn add_tts_characters(&mut self, chars: u64) {
        debug_assert!(!self.finalized, "ledger mutated after finalize");
        self.tts_characters += chars;
    }

    pub fn add_tts_seconds(&mut self, seconds: f64) {
        debug_assert!(!self.finalized, "ledger mutated after finalize");
        self.tts_seconds += seconds.max(0.0);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Computes `base_cost`, `profit_amount = base_cost * margin`, and
    /// `final_cost = base_cost + profit_amount` (spec §3, §4.9, tested
    /// invariant 2 in spec §8) without touching `finalized`. Callers that
    /// want a running total for a still-live call (e.g. a cost_update
    /// observability event) use this; only `finalize` freezes the ledger.
    pub fn preview(&self, prices: &PriceTable, variant: ProviderVariant, margin: f64) -> Result<CostBreakdown, BridgeTypesError> {
        let price = prices.get(variant)?;

        let audio_minutes = (self.audio_input_seconds + self.audio_output_seconds) / 60.0;
        let audio_cost = audio_minutes * price.per_audio_minute_usd;
        let session_minute_cost = self.session_minutes * price.per_audio_minute_usd;
        let input_token_cost =
            (self.text_input_tokens as f64 / 1_000_000.0) * price.per_million_input_tokens_usd;
        let output_token_cost =
            (self.text_output_tokens as f64 / 1_000_000.0) * price.per_million_output_tokens_usd;
        let cached_token_cost =
            (self.cached_input_tokens as f64 / 1_000_000.0) * price.per_million_cached_tokens_usd;
        let tts_char_cost = self.tts_characters as f64 * price.per_tts_character_usd;
        let tts_seconds_cost = self.tts_seconds * price.per_tts_second_usd;

        let base_cost = audio_cost
            + session_minute_cost
            + input_token_cost
            + output_token_cost
            + cached_token_cost
            + tts_char_cost
            + tts_seconds_cost;

        let profit_amount = base_cost * margin;
        let final_cost = base_cost + profit_amount;

        Ok(CostBreakdown {
            base_cost_usd: base_cost,
            profit_amount_usd: profit_amount,
            final_cost_usd: final_cost,
        })
    }

    /// Freezes the counters and records the final breakdown (spec §3:
    /// "finalization freezes them"). Called once, at call teardown.
    pub fn finalize(
        &mut self,
        prices: &PriceTable,
        variant: ProviderVariant,
        margin: f64,
    ) -> Result<CostBreakdown, BridgeTypesError> {
        let cost = self.preview(prices, variant, margin)?;
        self.cost = cost;
        self.finalized = true;
        Ok(cost)
    }
}

/// Whether a completed function call succeeded or errored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCallOutcome {
    Success { data: serde_json::Value },
    Error { error: String },
}

/// A completed (or timed-out) function call, emitted to the call log
/// after the handler returns (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallRecord {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub elapsed_ms: u64,
    pub outcome: FunctionCallOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn price_table() -> PriceTable {
        let mut map = HashMap::new();
        map.insert(
            ProviderVariant::OpenaiRealtime,
            crate::ProviderPrice {
                per_audio_minute_usd: 0.06,
                per_million_input_tokens_usd: 5.0,
                per_million_output_tokens_usd: 20.0,
                per_million_cached_tokens_usd: 2.5,
                per_tts_character_usd: 0.0,
                per_tts_second_usd: 0.0,
            },
        );
        PriceTable(map)
    }

    #[test]
    fn final_cost_equals_base_times_one_plus_margin() {
        let mut ledger = SessionLedger::new();
        ledger.add_audio_input_seconds(120.0);
        ledger.add_audio_output_seconds(60.0);
        ledger.add_text_tokens(10_000, 2_000, 0);

        let table = price_table();
        let cost = ledger
            .finalize(&table, ProviderVariant::OpenaiRealtime, 0.20)
            .unwrap();

        let expected_base = (180.0 / 60.0) * 0.06 + (10_000.0 / 1_000_000.0) * 5.0
            + (2_000.0 / 1_000_000.0) * 20.0;
        assert!((cost.base_cost_usd - expected_base).abs() < 1e-9);
        assert!((cost.final_cost_usd - expected_base * 1.20).abs() < 1e-9);
        assert!(ledger.is_finalized());
    }

    #[test]
    fn counters_never_go_negative() {
        let mut ledger = SessionLedger::new();
        ledger.add_audio_input_seconds(-5.0);
        assert_eq!(ledger.audio_input_seconds, 0.0);
    }

    #[test]
    fn missing_price_entry_does_not_panic() {
        let mut ledger = SessionLedger::new();
        let table = PriceTable::default();
        assert!(ledger
            .finalize(&table, ProviderVariant::Deepgram, 0.2)
            .is_err());
        assert!(!ledger.is_finalized());
    }
}
