//! Resolves an `AgentConfig`'s `ProviderConfig` tag into a connected
//! `ProviderSession` (spec §9: "resolve the variant at load, never at
//! use"; this is the one `match` on the tag, run once per call).

use std::sync::Arc;

use bridge_types::{AgentConfig, ProviderConfig};
use provider_session::{
    CompositeConfig, CompositeSession, DeepgramConfig, DeepgramSession, ProviderError,
    ProviderEvent, ProviderSession, RealtimeWsConfig, RealtimeWsSession,
};
use tokio::sync::mpsc;

pub async fn connect(
    session_id: String,
    agent: &AgentConfig,
) -> Result<(Arc<dyn ProviderSession>, mpsc::Receiver<ProviderEvent>), ProviderError> {
    match &agent.provider {
        ProviderConfig::OpenaiRealtime(cfg) => {
            let api_key = cfg
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok());
            let (session, events) = RealtimeWsSession::connect(
                session_id,
                RealtimeWsConfig {
                    url: cfg.realtime_url.clone(),
                    api_key,
                    voice: agent.voice.clone(),
                    vad_threshold: agent.vad_threshold,
                    silence_duration_ms: agent.silence_duration_ms,
                    temperature: agent.temperature,
                    max_tokens: agent.max_tokens,
                },
            )
            .await?;
            Ok((session as Arc<dyn ProviderSession>, events))
        }
        ProviderConfig::Deepgram(cfg) => {
            let api_key = cfg
                .api_key_env
                .as_deref()
                .and_then(|name| std::env::var(name).ok());
            let (session, events) = DeepgramSession::connect(
                session_id,
                DeepgramConfig {
                    url: cfg.voice_agent_url.clone(),
                    api_key,
                    listen_model: agent.model.clone(),
                    think_model: agent.model.clone(),
                    temperature: agent.temperature,
                    speak_model: cfg.deepgram_voice.clone(),
                    greeting: agent.greeting.clone(),
                },
            )
            .await?;
            Ok((session as Arc<dyn ProviderSession>, events))
        }
        ProviderConfig::Composite(cfg) => {
            let (session, events) = CompositeSession::connect(
                session_id,
                CompositeConfig {
                    stt_url: cfg.stt_url.clone(),
                    llm_url: cfg.llm_url.clone(),
                    llm_model: cfg.llm_model.clone(),
                    temperature: agent.temperature,
                    max_tokens: agent.max_tokens,
                    tts_url: cfg.tts_url.clone(),
                    tts_voice: cfg.custom_voice.clone(),
                    greeting: agent.greeting.clone(),
                },
            )
            .await?;
            Ok((session as Arc<dyn ProviderSession>, events))
        }
    }
}
