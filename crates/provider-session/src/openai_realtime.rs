//! Realtime-WS provider variant (spec §4.4.a): a single duplex WebSocket
//! speaking OpenAI's realtime wire protocol, with server-side VAD.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bridge_proto::openai_realtime::{
    ClientEvent, ConversationItem, ConversationItemContent, RealtimeFunctionTool, ServerEvent,
    ServerVadTurnDetection, SessionUpdate,
};
use bridge_types::ProviderVariant;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ProviderError;
use crate::event::{CostMetricDelta, ProviderEvent, Speaker};
use crate::session::{AudioFormat, ProviderSession};
use crate::state::{SessionState, StateMachine};

pub struct RealtimeWsConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub voice: String,
    pub vad_threshold: f32,
    pub silence_duration_ms: u32,
    pub temperature: f32,
    pub max_tokens: u32,
}

pub struct RealtimeWsSession {
    session_id: String,
    state: Arc<StateMachine>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    configured_once: AtomicU32,
    /// `call_id`s emitted via `FunctionCallArgumentsDone` that have not yet
    /// been resolved by `submit_tool_result` (spec §8 invariant 5: no
    /// duplicate or unsolicited submissions).
    pending_calls: Arc<Mutex<HashSet<String>>>,
    voice: String,
    vad_threshold: f32,
    silence_duration_ms: u32,
    temperature: f32,
    max_tokens: u32,
}

impl RealtimeWsSession {
    pub async fn connect(
        session_id: String,
        config: RealtimeWsConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ProviderEvent>), ProviderError> {
        let mut request = config
            .url
            .clone()
            .into_client_request()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        if let Some(key) = &config.api_key {
            request.headers_mut().insert(
                "Authorization",
                format!("Bearer {key}")
                    .parse()
                    .map_err(|_| ProviderError::Transport("invalid api key header".into()))?,
            );
        }
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse().unwrap());

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (events_tx, events_rx) = mpsc::channel(256);

        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let Ok(text) = serde_json::to_string(&event) else {
                    continue;
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let state = Arc::new(StateMachine::new());
        let pending_calls = Arc::new(Mutex::new(HashSet::new()));
        let reader_state = state.clone();
        let reader_events = events_tx.clone();
        let reader_pending_calls = pending_calls.clone();
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let Ok(Message::Text(text)) = message else {
                    continue;
                };
                let Ok(server_event) = serde_json::from_str::<ServerEvent>(&text) else {
                    tracing::warn!(payload = %text, "unrecognized realtime server event");
                    continue;
                };
                handle_server_event(server_event, &reader_state, &reader_events, &reader_pending_calls).await;
            }
            let _ = reader_events.send(ProviderEvent::Done).await;
        });

        let session = Arc::new(Self {
            session_id,
            state,
            outbound: outbound_tx,
            configured_once: AtomicU32::new(0),
            pending_calls,
            voice: config.voice,
            vad_threshold: config.vad_threshold,
            silence_duration_ms: config.silence_duration_ms,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        });

        Ok((session, events_rx))
    }
}

async fn handle_server_event(
    event: ServerEvent,
    state: &Arc<StateMachine>,
    events: &mpsc::Sender<ProviderEvent>,
    pending_calls: &Arc<Mutex<HashSet<String>>>,
) {
    match event {
        ServerEvent::SessionCreated | ServerEvent::SessionUpdated => {
            state.transition(SessionState::Ready);
        }
        ServerEvent::ResponseAudioDelta { delta, .. } => {
            state.transition(SessionState::Streaming);
            if let Ok(bytes) = BASE64.decode(delta.as_bytes()) {
                let samples = bytes_to_pcm16(&bytes);
                let _ = events.send(ProviderEvent::AudioOut(samples)).await;
            }
        }
        ServerEvent::ResponseAudioDone { .. } => {}
        ServerEvent::InputTranscriptionCompleted { transcript } => {
            let _ = events
                .send(ProviderEvent::Transcript {
                    speaker: Speaker::User,
                    text: transcript,
                    is_final: true,
                })
                .await;
        }
        ServerEvent::ResponseAudioTranscriptDelta { delta, .. } => {
            let _ = events
                .send(ProviderEvent::Transcript {
                    speaker: Speaker::Assistant,
                    text: delta,
                    is_final: false,
                })
                .await;
        }
        ServerEvent::ResponseAudioTranscriptDone { transcript, .. } => {
            let _ = events
                .send(ProviderEvent::Transcript {
                    speaker: Speaker::Assistant,
                    text: transcript,
                    is_final: true,
                })
                .await;
        }
        ServerEvent::FunctionCallArgumentsDelta { .. } => {}
        ServerEvent::FunctionCallArgumentsDone {
            call_id,
            name,
            arguments,
        } => {
            state.transition(SessionState::AwaitingTool);
            pending_calls.lock().unwrap().insert(call_id.clone());
            let parsed: Value =
                serde_json::from_str(&arguments).unwrap_or_else(|_| Value::Object(Default::default()));
            let _ = events
                .send(ProviderEvent::FunctionCall {
                    call_id,
                    name,
                    arguments: parsed,
                })
                .await;
        }
        ServerEvent::ResponseDone { response } => {
            if let Some(usage) = response.usage {
                let delta = CostMetricDelta {
                    text_input_tokens: usage.input_tokens,
                    text_output_tokens: usage.output_tokens,
                    cached_input_tokens: usage
                        .input_token_details
                        .as_ref()
                        .map(|d| d.cached_tokens)
                        .unwrap_or(0),
                    ..Default::default()
                };
                let _ = events.send(ProviderEvent::CostMetric(delta)).await;
            }
        }
        ServerEvent::Error { error } => {
            state.transition(SessionState::Error);
            let _ = events
                .send(ProviderEvent::Error {
                    kind: error.code.unwrap_or_else(|| "unknown".into()),
                    message: error.message,
                })
                .await;
        }
    }
}

fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

fn pcm16_to_base64(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64.encode(bytes)
}

#[async_trait]
impl ProviderSession for RealtimeWsSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn variant(&self) -> ProviderVariant {
        ProviderVariant::OpenaiRealtime
    }

    fn state(&self) -> SessionState {
        self.state.get()
    }

    async fn configure(
        &self,
        instructions: String,
        tools: Vec<Value>,
        _audio_format: AudioFormat,
    ) -> Result<(), ProviderError> {
        if self.state.get() != SessionState::Connecting && self.state.get() != SessionState::Ready {
            return Err(ProviderError::InvalidState);
        }
        if self.configured_once.swap(1, Ordering::SeqCst) == 1 {
            return Ok(());
        }

        let tools: Vec<RealtimeFunctionTool> = tools
            .into_iter()
            .filter_map(|tool| {
                Some(RealtimeFunctionTool {
                    name: tool.get("name")?.as_str()?.to_string(),
                    description: tool.get("description")?.as_str()?.to_string(),
                    parameters: tool.get("parameters").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        let update = ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions,
                voice: self.voice.clone(),
                input_audio_format: "pcm16".into(),
                output_audio_format: "pcm16".into(),
                turn_detection: ServerVadTurnDetection {
                    threshold: self.vad_threshold,
                    prefix_padding_ms: 300,
                    silence_duration_ms: self.silence_duration_ms,
                },
                tools,
                temperature: self.temperature,
                max_response_output_tokens: self.max_tokens,
            },
        };
        self.outbound
            .send(update)
            .map_err(|_| ProviderError::Closed)
    }

    fn push_audio(&self, pcm16_frame: Vec<i16>) -> Result<(), ProviderError> {
        if self.state.is_terminal() {
            return Err(ProviderError::Closed);
        }
        if self.configured_once.load(Ordering::SeqCst) == 0 {
            return Err(ProviderError::InvalidState);
        }
        self.state.transition(SessionState::Streaming);
        let audio = pcm16_to_base64(&pcm16_frame);
        self.outbound
            .send(ClientEvent::InputAudioBufferAppend { audio })
            .map_err(|_| ProviderError::Closed)
    }

    async fn request_response(&self) -> Result<(), ProviderError> {
        self.outbound
            .send(ClientEvent::ResponseCreate)
            .map_err(|_| ProviderError::Closed)
    }

    async fn submit_tool_result(&self, call_id: String, result: Value) -> Result<(), ProviderError> {
        if self.state.get() != SessionState::AwaitingTool {
            return Err(ProviderError::InvalidState);
        }
        if !self.pending_calls.lock().unwrap().remove(&call_id) {
            return Err(ProviderError::Protocol(format!(
                "unsolicited or duplicate function-call result for call_id {call_id}"
            )));
        }
        let item = ConversationItem {
            item_type: "function_call_output".into(),
            call_id: Some(call_id),
            output: Some(result.to_string()),
            role: None,
            content: None,
        };
        self.outbound
            .send(ClientEvent::ConversationItemCreate { item })
            .map_err(|_| ProviderError::Closed)?;
        self.state.transition(SessionState::Streaming);
        self.request_response().await
    }

    async fn push_context_message(&self, text: String) -> Result<(), ProviderError> {
        let item = ConversationItem {
            item_type: "message".into(),
            call_id: None,
            output: None,
            role: Some("system".into()),
            content: Some(vec![ConversationItemContent {
                content_type: "input_text".into(),
                text: Some(text),
            }]),
        };
        self.outbound
            .send(ClientEvent::ConversationItemCreate { item })
            .map_err(|_| ProviderError::Closed)
    }

    async fn close(&self) {
        self.state.transition(SessionState::Closing);
        let _ = self.outbound.send(ClientEvent::ResponseCancel);
        self.state.transition(SessionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::WebSocketStream;

    fn config(url: String) -> RealtimeWsConfig {
        RealtimeWsConfig {
            url,
            api_key: None,
            voice: "alloy".into(),
            vad_threshold: 0.5,
            silence_duration_ms: 500,
            temperature: 0.8,
            max_tokens: 200,
        }
    }

    /// A bare WS listener standing in for the real OpenAI endpoint, so the
    /// session's wire behavior can be driven and observed without network
    /// access.
    async fn fake_server() -> (String, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (format!("ws://{addr}"), listener)
    }

    async fn accept(listener: TcpListener) -> WebSocketStream<tokio::net::TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn recv_client_event(ws: &mut WebSocketStream<tokio::net::TcpStream>) -> ClientEvent {
        let msg = ws.next().await.unwrap().unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    async fn send_server_event(ws: &mut WebSocketStream<tokio::net::TcpStream>, event: ServerEvent) {
        ws.send(Message::Text(serde_json::to_string(&event).unwrap()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn push_audio_before_configure_is_rejected() {
        let (url, listener) = fake_server().await;
        let server = tokio::spawn(async move {
            let _ws = accept(listener).await;
        });

        let (session, _events) = RealtimeWsSession::connect("sess-1".into(), config(url)).await.unwrap();
        let result = session.push_audio(vec![0i16; 160]);
        assert!(matches!(result, Err(ProviderError::InvalidState)));

        server.abort();
    }

    #[tokio::test]
    async fn configure_then_push_audio_sends_session_update_before_audio() {
        let (url, listener) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(listener).await;
            let first = recv_client_event(&mut ws).await;
            assert!(matches!(first, ClientEvent::SessionUpdate { .. }));
            send_server_event(&mut ws, ServerEvent::SessionUpdated).await;
            let second = recv_client_event(&mut ws).await;
            assert!(matches!(second, ClientEvent::InputAudioBufferAppend { .. }));
        });

        let (session, _events) = RealtimeWsSession::connect("sess-1".into(), config(url)).await.unwrap();
        session
            .configure("be helpful".into(), vec![], AudioFormat::Pcm16_24kHz)
            .await
            .unwrap();
        session.push_audio(vec![0i16; 160]).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), server)
            .await
            .expect("server task timed out")
            .unwrap();
    }

    #[tokio::test]
    async fn submit_tool_result_for_an_unsolicited_call_id_is_rejected() {
        let (url, listener) = fake_server().await;
        let server = tokio::spawn(async move {
            let _ws = accept(listener).await;
        });

        let (session, _events) = RealtimeWsSession::connect("sess-1".into(), config(url)).await.unwrap();
        session
            .configure("be helpful".into(), vec![], AudioFormat::Pcm16_24kHz)
            .await
            .unwrap();

        let result = session
            .submit_tool_result("call_never_emitted".into(), serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(ProviderError::InvalidState)), "state is not awaiting-tool yet");

        server.abort();
    }

    #[tokio::test]
    async fn submit_tool_result_accepts_a_previously_emitted_call_id_exactly_once() {
        let (url, listener) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(listener).await;
            let _ = recv_client_event(&mut ws).await; // session.update
            send_server_event(&mut ws, ServerEvent::SessionUpdated).await;
            send_server_event(
                &mut ws,
                ServerEvent::FunctionCallArgumentsDone {
                    call_id: "call_abc".into(),
                    name: "transfer_to_agent".into(),
                    arguments: "{}".into(),
                },
            )
            .await;
            // drain whatever the client sends back so the socket does not
            // close before the test assertions run
            loop {
                if ws.next().await.is_none() {
                    break;
                }
            }
        });

        let (session, mut events) = RealtimeWsSession::connect("sess-1".into(), config(url)).await.unwrap();
        session
            .configure("be helpful".into(), vec![], AudioFormat::Pcm16_24kHz)
            .await
            .unwrap();

        let mut call_id = None;
        while let Some(event) = events.recv().await {
            if let ProviderEvent::FunctionCall { call_id: id, .. } = event {
                call_id = Some(id);
                break;
            }
        }
        let call_id = call_id.expect("function call event was emitted");

        session
            .submit_tool_result(call_id.clone(), serde_json::json!({"ok": true}))
            .await
            .unwrap();

        let duplicate = session.submit_tool_result(call_id, serde_json::json!({"ok": true})).await;
        assert!(
            matches!(duplicate, Err(ProviderError::InvalidState) | Err(ProviderError::Protocol(_))),
            "a call_id already resolved must not be resolvable again"
        );

        server.abort();
    }
}
