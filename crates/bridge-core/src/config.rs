//! Process configuration, loaded once from the environment into a typed
//! struct instead of scattering `std::env::var(...)` calls across the
//! codebase.

use std::net::SocketAddr;
use std::time::Duration;

use bridge_types::PriceTable;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub rtp_bind: SocketAddr,
    pub mgmt_api_url: String,
    pub mgmt_api_key: String,
    pub side_channel_url: String,
    pub monitor_port: u16,
    pub monitor_shared_secret: Option<String>,
    pub profit_margin_percent: f64,
    pub default_min_credit_usd: f64,
    pub hangup_poll_ms: u64,
    pub stale_idle_sec: u64,
    pub agent_cache_ttl_sec: u64,
    pub agent_cache_sweep_sec: u64,
    pub session_start_debounce_ms: u64,
    pub provider_prices: PriceTable,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().map_err(|err| ConfigError::Invalid {
            name,
            source: Box::new(err),
        }),
        Err(_) => Ok(default),
    }
}

impl BridgeConfig {
    /// Reads and validates every recognized option (spec §6.4). Unset
    /// optional values fall back to the documented defaults; unset
    /// required values (the two API endpoints, the price table) fail
    /// boot outright rather than silently running with nothing wired up.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rtp_bind = parsed_or("RTP_BIND", "0.0.0.0:40000".parse().unwrap())?;
        let mgmt_api_url = required("MGMT_API_URL")?;
        let mgmt_api_key = required("MGMT_API_KEY")?;
        let side_channel_url = required("SIDE_CHANNEL_URL")?;
        let monitor_port = parsed_or("MONITOR_PORT", 8090u16)?;
        let monitor_shared_secret = std::env::var("MONITOR_SHARED_SECRET").ok();
        let profit_margin_percent = parsed_or("PROFIT_MARGIN_PERCENT", 20.0)?;
        let default_min_credit_usd = parsed_or("DEFAULT_MIN_CREDIT_USD", 0.10)?;
        let hangup_poll_ms = parsed_or("HANGUP_POLL_MS", 500u64)?;
        let stale_idle_sec = parsed_or("STALE_IDLE_SEC", 300u64)?;
        let agent_cache_ttl_sec = parsed_or("AGENT_CACHE_TTL_SEC", 300u64)?;
        let agent_cache_sweep_sec = parsed_or("AGENT_CACHE_SWEEP_SEC", 600u64)?;
        let session_start_debounce_ms = parsed_or("SESSION_START_DEBOUNCE_MS", 700u64)?;

        let prices_raw = required("PROVIDER_PRICES")?;
        let provider_prices = PriceTable::from_json(&prices_raw).map_err(|err| ConfigError::Invalid {
            name: "PROVIDER_PRICES",
            source: Box::new(err),
        })?;

        Ok(Self {
            rtp_bind,
            mgmt_api_url,
            mgmt_api_key,
            side_channel_url,
            monitor_port,
            monitor_shared_secret,
            profit_margin_percent,
            default_min_credit_usd,
            hangup_poll_ms,
            stale_idle_sec,
            agent_cache_ttl_sec,
            agent_cache_sweep_sec,
            session_start_debounce_ms,
            provider_prices,
        })
    }

    pub fn cost_margin(&self) -> f64 {
        self.profit_margin_percent / 100.0
    }

    pub fn hangup_poll_interval(&self) -> Duration {
        Duration::from_millis(self.hangup_poll_ms)
    }

    pub fn stale_idle(&self) -> Duration {
        Duration::from_secs(self.stale_idle_sec)
    }

    pub fn agent_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_cache_ttl_sec)
    }

    pub fn agent_cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.agent_cache_sweep_sec)
    }

    pub fn session_start_debounce(&self) -> Duration {
        Duration::from_millis(self.session_start_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_margin_converts_percent_to_fraction() {
        let config = BridgeConfig {
            rtp_bind: "0.0.0.0:40000".parse().unwrap(),
            mgmt_api_url: String::new(),
            mgmt_api_key: String::new(),
            side_channel_url: String::new(),
            monitor_port: 8090,
            monitor_shared_secret: None,
            profit_margin_percent: 20.0,
            default_min_credit_usd: 0.10,
            hangup_poll_ms: 500,
            stale_idle_sec: 300,
            agent_cache_ttl_sec: 300,
            agent_cache_sweep_sec: 600,
            session_start_debounce_ms: 700,
            provider_prices: PriceTable::default(),
        };
        assert!((config.cost_margin() - 0.2).abs() < f64::EPSILON);
    }
}
