//! The per-call actor (spec §4.6, §5): owns exactly one Provider Session,
//! the audio path between it and the RTP transport, the function-call
//! dispatch loop, and the session ledger. Reached only through its own
//! command channel; there are no connection-level locks (spec §5).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use audio_codec::{
    decode_frame, downsample_16k_to_8k, downsample_24k_to_8k, upsample_8k_to_16k, upsample_8k_to_24k,
    Framer,
};
use bridge_proto::mgmt::{CallStatus, LogFunctionCallRequest, ProviderMetrics, UpdateCallRequest};
use bridge_types::{
    AgentConfig, CallMetadata, Endpoint, ExecutionMode, FunctionCallOutcome, PriceTable, ProviderVariant,
    SessionLedger,
};
use chrono::Utc;
use function_executor::{CallContext, FunctionExecutor};
use mgmt_client::MgmtClient;
use provider_session::{AudioFormat, ProviderEvent, ProviderSession, Speaker};
use rtp_transport::RtpTransport;
use side_channel::SideChannelClient;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::observability::{ObservabilityEvent, SharedSink};

/// Messages the Connection Manager and the RTP recv loop feed into a
/// running Connection. Kept small and owned so the channel never blocks
/// the producer on a full queue beyond its bound.
pub enum ConnectionCommand {
    CallerAudio(Vec<u8>),
    Close,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Deepgram reports its own `session_minutes` covering both audio
/// directions, and Composite's TTS leg reports `tts_characters`/
/// `tts_seconds` for this same synthesized audio. Crediting
/// `audio_output_seconds` too would double-bill it (price.rs's
/// per-audio-minute rate is either/or with those fields, never both).
/// Only the OpenAI Realtime variant, which reports no output-audio metric
/// of its own, bills through this channel.
fn billable_audio_output_seconds(variant: ProviderVariant, seconds: f64) -> f64 {
    if variant == ProviderVariant::OpenaiRealtime {
        seconds
    } else {
        0.0
    }
}

/// Lightweight handle a Connection Manager keeps in its endpoint map.
/// Cloning is cheap; the actual state lives in the spawned task.
#[derive(Clone)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<ConnectionCommand>,
    cancel: CancellationToken,
    closed: Arc<AtomicBool>,
    last_activity_millis: Arc<AtomicU64>,
}

impl ConnectionHandle {
    pub fn send_audio(&self, payload: Vec<u8>) {
        let _ = self.commands.try_send(ConnectionCommand::CallerAudio(payload));
    }

    /// Idempotent; safe to call from the manager's gone-handler and the
    /// hangup monitor racing each other (spec §9, Open Question 1).
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.commands.try_send(ConnectionCommand::Close);
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Time elapsed since the last caller- or provider-audio frame was
    /// processed (spec §4.10 stale sweeper: idle-since-last-activity, not
    /// total call duration).
    pub fn idle_for(&self) -> std::time::Duration {
        let last = self.last_activity_millis.load(Ordering::SeqCst);
        std::time::Duration::from_millis(now_millis().saturating_sub(last))
    }
}

pub struct ConnectionDeps {
    pub rtp: RtpTransport,
    pub side_channel: SideChannelClient,
    pub mgmt: MgmtClient,
    pub functions: Arc<FunctionExecutor>,
    pub prices: Arc<PriceTable>,
    pub margin: f64,
    pub observability: SharedSink,
}

struct Connection {
    connection_id: String,
    endpoint: Endpoint,
    metadata: CallMetadata,
    agent: Arc<AgentConfig>,
    session: Arc<dyn ProviderSession>,
    audio_format: AudioFormat,
    call_log_id: String,
    ledger: SessionLedger,
    started_at: chrono::DateTime<Utc>,
    framer: Framer,
    deps: ConnectionDeps,
    last_activity_millis: Arc<AtomicU64>,
}

/// Spawns a Connection's run loop and returns the handle the manager keeps.
/// `provider_events` is the receiver half the caller already pulled off
/// `ProviderSession::connect`.
pub fn spawn(
    connection_id: String,
    endpoint: Endpoint,
    metadata: CallMetadata,
    agent: Arc<AgentConfig>,
    session: Arc<dyn ProviderSession>,
    provider_events: mpsc::Receiver<ProviderEvent>,
    audio_format: AudioFormat,
    call_log_id: String,
    deps: ConnectionDeps,
) -> ConnectionHandle {
    let (tx, rx) = mpsc::channel(256);
    let cancel = CancellationToken::new();
    let closed = Arc::new(AtomicBool::new(false));
    let last_activity_millis = Arc::new(AtomicU64::new(now_millis()));

    let connection = Connection {
        connection_id,
        endpoint,
        metadata,
        agent,
        session,
        audio_format,
        call_log_id,
        ledger: SessionLedger::new(),
        started_at: Utc::now(),
        framer: Framer::new(),
        deps,
        last_activity_millis: last_activity_millis.clone(),
    };

    let task_cancel = cancel.clone();
    tokio::spawn(connection.run(rx, provider_events, task_cancel));

    ConnectionHandle { commands: tx, cancel, closed, last_activity_millis }
}

impl Connection {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ConnectionCommand>,
        mut provider_events: mpsc::Receiver<ProviderEvent>,
        cancel: CancellationToken,
    ) {
        self.deps.observability.emit(ObservabilityEvent::ConnectionAdded {
            connection_id: self.connection_id.clone(),
            session_id: self.metadata.session_id.clone(),
            agent_id: self.metadata.agent_id.clone(),
            caller_id: self.metadata.caller_id.clone(),
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(ConnectionCommand::CallerAudio(payload)) => self.handle_caller_audio(&payload),
                    Some(ConnectionCommand::Close) | None => break,
                },
                event = provider_events.recv() => match event {
                    Some(event) => self.handle_provider_event(event).await,
                    None => break,
                },
            }
        }

        self.teardown().await;
    }

    fn touch_activity(&self) {
        self.last_activity_millis.store(now_millis(), Ordering::SeqCst);
    }

    fn handle_caller_audio(&mut self, ulaw_frame: &[u8]) {
        self.touch_activity();
        let pcm8k = decode_frame(ulaw_frame);
        let seconds = pcm8k.len() as f64 / 8_000.0;
        self.ledger.add_audio_input_seconds(seconds);

        let pcm_provider = match self.audio_format {
            AudioFormat::Pcm16_16kHz => upsample_8k_to_16k(&pcm8k),
            AudioFormat::Pcm16_24kHz => upsample_8k_to_24k(&pcm8k),
        };

        if let Err(err) = self.session.push_audio(pcm_provider) {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "push_audio failed");
        }
    }

    async fn handle_provider_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::AudioOut(samples) => self.handle_provider_audio(samples).await,
            ProviderEvent::Transcript { speaker, text, is_final } => {
                self.handle_transcript(speaker, text, is_final);
            }
            ProviderEvent::FunctionCall { call_id, name, arguments } => {
                self.handle_function_call(call_id, name, arguments).await;
            }
            ProviderEvent::CostMetric(delta) => self.apply_cost_delta(delta),
            ProviderEvent::Done => {}
            ProviderEvent::Error { kind, message } => {
                tracing::warn!(connection_id = %self.connection_id, kind = %kind, message = %message, "provider error event");
            }
        }
    }

    async fn handle_provider_audio(&mut self, samples: Vec<i16>) {
        self.touch_activity();
        let seconds = samples.len() as f64 / self.audio_format.sample_rate_hz() as f64;
        self.ledger
            .add_audio_output_seconds(billable_audio_output_seconds(self.agent.provider_variant(), seconds));

        let pcm8k = match self.audio_format {
            AudioFormat::Pcm16_16kHz => downsample_16k_to_8k(&samples),
            AudioFormat::Pcm16_24kHz => downsample_24k_to_8k(&samples),
        };

        for frame in self.framer.push(&pcm8k) {
            if let Err(err) = self.deps.rtp.send(self.endpoint, &frame).await {
                tracing::warn!(connection_id = %self.connection_id, error = %err, "rtp send failed");
            }
        }
    }

    fn handle_transcript(&mut self, speaker: Speaker, text: String, is_final: bool) {
        self.deps.observability.emit(ObservabilityEvent::Transcript {
            connection_id: self.connection_id.clone(),
            speaker,
            text,
            is_final,
        });
    }

    async fn handle_function_call(&mut self, call_id: String, name: String, arguments: serde_json::Value) {
        self.deps.observability.emit(ObservabilityEvent::FunctionCall {
            connection_id: self.connection_id.clone(),
            call_id: call_id.clone(),
            name: name.clone(),
            arguments: arguments.clone(),
        });

        let ctx = CallContext {
            connection_id: self.connection_id.clone(),
            session_id: self.metadata.session_id.clone(),
            caller_id: self.metadata.caller_id.clone(),
            tenant_id: self.metadata.tenant_id.clone(),
            asterisk_port: self.endpoint.port(),
            knowledge_base_id: self.agent.knowledge_base_id.clone(),
        };

        let started_at = Utc::now();

        match self.deps.functions.execution_mode(&name) {
            Some(ExecutionMode::Async) => {
                let (ack, rx) = self.deps.functions.execute_async(name.clone(), arguments.clone(), ctx);
                self.resolve_tool_call(&call_id, &name, &arguments, started_at, ack.clone()).await;
                self.spawn_async_followup(name, call_id, started_at, rx);
            }
            _ => {
                let outcome = self.deps.functions.execute_sync(&name, arguments.clone(), &ctx).await;
                self.resolve_tool_call(&call_id, &name, &arguments, started_at, outcome).await;
            }
        }
    }

    /// Submit the tool result to the provider and fire the log/observability
    /// side effects common to both sync and the immediate async ack.
    async fn resolve_tool_call(
        &mut self,
        call_id: &str,
        name: &str,
        arguments: &serde_json::Value,
        started_at: chrono::DateTime<Utc>,
        outcome: FunctionCallOutcome,
    ) {
        let result_value = match &outcome {
            FunctionCallOutcome::Success { data } => data.clone(),
            FunctionCallOutcome::Error { error } => serde_json::json!({ "error": error }),
        };

        if let Err(err) = self.session.submit_tool_result(call_id.to_string(), result_value).await {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "submit_tool_result failed");
        }
        if let Err(err) = self.session.request_response().await {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "request_response after tool call failed");
        }

        self.deps.observability.emit(ObservabilityEvent::FunctionResponse {
            connection_id: self.connection_id.clone(),
            call_id: call_id.to_string(),
            outcome: outcome.clone(),
        });

        let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        let log_request = LogFunctionCallRequest {
            call_id: call_id.to_string(),
            name: name.to_string(),
            arguments: arguments.clone(),
            elapsed_ms,
            success: matches!(outcome, FunctionCallOutcome::Success { .. }),
            error: match &outcome {
                FunctionCallOutcome::Error { error } => Some(error.clone()),
                FunctionCallOutcome::Success { .. } => None,
            },
        };
        if let Err(err) = self.deps.mgmt.log_function_call(&self.call_log_id, log_request).await {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "log_function_call failed");
        }
    }

    /// The real result of an async function arrives later; the model never
    /// had a pending tool call to resolve for it by the time this fires, so
    /// it is narrated as a context message instead (spec §4.5).
    fn spawn_async_followup(
        &self,
        name: String,
        call_id: String,
        started_at: chrono::DateTime<Utc>,
        rx: tokio::sync::oneshot::Receiver<FunctionCallOutcome>,
    ) {
        let session = self.session.clone();
        let mgmt = self.deps.mgmt.clone();
        let call_log_id = self.call_log_id.clone();
        let connection_id = self.connection_id.clone();
        let sink = self.deps.observability.clone();

        tokio::spawn(async move {
            let Ok(outcome) = rx.await else {
                return;
            };

            let narration = match &outcome {
                FunctionCallOutcome::Success { data } => {
                    format!("Background task '{name}' finished: {data}")
                }
                FunctionCallOutcome::Error { error } => {
                    format!("Background task '{name}' failed: {error}")
                }
            };
            if let Err(err) = session.push_context_message(narration).await {
                tracing::warn!(%connection_id, error = %err, "push_context_message failed");
            }
            if let Err(err) = session.request_response().await {
                tracing::warn!(%connection_id, error = %err, "request_response after async function failed");
            }

            sink.emit(ObservabilityEvent::FunctionResponse {
                connection_id: connection_id.clone(),
                call_id: call_id.clone(),
                outcome: outcome.clone(),
            });

            let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
            let log_request = LogFunctionCallRequest {
                call_id,
                name,
                arguments: serde_json::Value::Null,
                elapsed_ms,
                success: matches!(outcome, FunctionCallOutcome::Success { .. }),
                error: match &outcome {
                    FunctionCallOutcome::Error { error } => Some(error.clone()),
                    FunctionCallOutcome::Success { .. } => None,
                },
            };
            if let Err(err) = mgmt.log_function_call(&call_log_id, log_request).await {
                tracing::warn!(%connection_id, error = %err, "log_function_call failed for async function");
            }
        });
    }

    fn apply_cost_delta(&mut self, delta: provider_session::CostMetricDelta) {
        self.ledger.add_audio_input_seconds(delta.audio_input_seconds);
        self.ledger.add_audio_output_seconds(delta.audio_output_seconds);
        self.ledger.add_text_tokens(delta.text_input_tokens, delta.text_output_tokens, delta.cached_input_tokens);
        self.ledger.add_session_minutes(delta.session_minutes);
        self.ledger.add_tts_characters(delta.tts_characters);
        self.ledger.add_tts_seconds(delta.tts_seconds);

        if let Ok(cost) = self.ledger.preview(&self.deps.prices, self.agent.provider_variant(), self.deps.margin) {
            self.deps.observability.emit(ObservabilityEvent::CostUpdate {
                connection_id: self.connection_id.clone(),
                cost,
            });
        }
    }

    async fn teardown(mut self) {
        self.session.close().await;
        self.deps.rtp.release(self.endpoint);

        let duration_seconds = (Utc::now() - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;
        let cost = self
            .ledger
            .finalize(&self.deps.prices, self.agent.provider_variant(), self.deps.margin)
            .unwrap_or_default();

        let update = UpdateCallRequest {
            end_time: Utc::now(),
            duration_seconds,
            status: CallStatus::Completed,
            provider_metrics: ProviderMetrics {
                audio_input_seconds: self.ledger.audio_input_seconds,
                audio_output_seconds: self.ledger.audio_output_seconds,
                text_input_tokens: self.ledger.text_input_tokens,
                text_output_tokens: self.ledger.text_output_tokens,
                cached_input_tokens: self.ledger.cached_input_tokens,
                session_minutes: self.ledger.session_minutes,
                tts_characters: self.ledger.tts_characters,
                tts_seconds: self.ledger.tts_seconds,
            },
            base_cost_usd: cost.base_cost_usd,
            profit_amount_usd: cost.profit_amount_usd,
            final_cost_usd: cost.final_cost_usd,
            provider_metadata: serde_json::Map::new(),
        };
        if let Err(err) = self.deps.mgmt.update_call(&self.metadata.session_id, update).await {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "update_call failed at teardown");
        }

        if let Err(err) = self
            .deps
            .mgmt
            .deduct_credits(&self.agent.tenant_id, cost.final_cost_usd, &self.call_log_id)
            .await
        {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "deduct_credits failed at teardown");
        }

        if let Err(err) = self.deps.side_channel.delete(self.endpoint.port()).await {
            tracing::warn!(connection_id = %self.connection_id, error = %err, "side-channel delete failed at teardown");
        }

        self.deps.observability.emit(ObservabilityEvent::ConnectionRemoved {
            connection_id: self.connection_id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_realtime_bills_its_own_output_audio() {
        let seconds = billable_audio_output_seconds(ProviderVariant::OpenaiRealtime, 2.0);
        assert_eq!(seconds, 2.0);
    }

    #[test]
    fn deepgram_output_audio_is_not_double_billed() {
        let seconds = billable_audio_output_seconds(ProviderVariant::Deepgram, 2.0);
        assert_eq!(seconds, 0.0, "Deepgram already reports session_minutes for this audio");
    }

    #[test]
    fn composite_output_audio_is_not_double_billed() {
        let seconds = billable_audio_output_seconds(ProviderVariant::Composite, 2.0);
        assert_eq!(seconds, 0.0, "Composite already reports tts_characters/tts_seconds for this audio");
    }
}
