//! Deepgram voice-agent provider variant (spec §4.4.b). Same external
//! contract as Realtime-WS; audio rides as raw binary WS frames instead of
//! base64 JSON, and cost is reported in `session_minutes` rather than
//! per-token counts.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_proto::deepgram::{
    AgentFunction, AgentListen, AgentSpeak, AgentThink, AudioFormat as WireAudioFormat,
    ClientFrame, ServerFrame, Settings, SettingsAgent, SettingsAudio, ThinkProvider,
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

pub struct DeepgramConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub listen_model: String,
    pub think_model: String,
    pub temperature: f32,
    pub speak_model: String,
    pub greeting: String,
}

enum Outbound {
    Audio(Vec<u8>),
    Control(ClientFrame),
}

pub struct DeepgramSession {
    session_id: String,
    state: Arc<StateMachine>,
    outbound: mpsc::UnboundedSender<Outbound>,
    configured_once: AtomicU32,
    /// `function_call_id`s emitted by the agent that have not yet been
    /// resolved by `submit_tool_result` (spec §8 invariant 5).
    pending_calls: Arc<Mutex<HashSet<String>>>,
    think_model: String,
    temperature: f32,
    greeting: String,
    listen_model: String,
    speak_model: String,
}

impl DeepgramSession {
    pub async fn connect(
        session_id: String,
        config: DeepgramConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ProviderEvent>), ProviderError> {
        let mut request = config
            .url
            .clone()
            .into_client_request()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        if let Some(key) = &config.api_key {
            request.headers_mut().insert(
                "Authorization",
                format!("Token {key}")
                    .parse()
                    .map_err(|_| ProviderError::Transport("invalid api key header".into()))?,
            );
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let (mut sink, mut stream) = ws_stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (events_tx, events_rx) = mpsc::channel(256);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let ws_message = match message {
                    Outbound::Audio(bytes) => Message::Binary(bytes),
                    Outbound::Control(frame) => match serde_json::to_string(&frame) {
                        Ok(text) => Message::Text(text),
                        Err(_) => continue,
                    },
                };
                if sink.send(ws_message).await.is_err() {
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
                match message {
                    Ok(Message::Text(text)) => {
                        let Ok(frame) = serde_json::from_str::<ServerFrame>(&text) else {
                            tracing::warn!(payload = %text, "unrecognized deepgram server frame");
                            continue;
                        };
                        handle_server_frame(frame, &reader_state, &reader_events, &reader_pending_calls).await;
                    }
                    Ok(Message::Binary(bytes)) => {
                        reader_state.transition(SessionState::Streaming);
                        let samples = bytes_to_pcm16(&bytes);
                        let _ = reader_events.send(ProviderEvent::AudioOut(samples)).await;
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            let _ = reader_events.send(ProviderEvent::Done).await;
        });

        let session = Arc::new(Self {
            session_id,
            state,
            outbound: outbound_tx,
            configured_once: AtomicU32::new(0),
            pending_calls,
            think_model: config.think_model,
            temperature: config.temperature,
            greeting: config.greeting,
            listen_model: config.listen_model,
            speak_model: config.speak_model,
        });

        Ok((session, events_rx))
    }
}

async fn handle_server_frame(
    frame: ServerFrame,
    state: &Arc<StateMachine>,
    events: &mpsc::Sender<ProviderEvent>,
    pending_calls: &Arc<Mutex<HashSet<String>>>,
) {
    match frame {
        ServerFrame::Welcome | ServerFrame::SettingsApplied => {
            state.transition(SessionState::Ready);
        }
        ServerFrame::ConversationText { role, content } => {
            let speaker = if role == "assistant" {
                Speaker::Assistant
            } else {
                Speaker::User
            };
            let _ = events
                .send(ProviderEvent::Transcript {
                    speaker,
                    text: content,
                    is_final: true,
                })
                .await;
        }
        ServerFrame::FunctionCallRequest {
            function_call_id,
            function_name,
            input,
        } => {
            state.transition(SessionState::AwaitingTool);
            pending_calls.lock().unwrap().insert(function_call_id.clone());
            let _ = events
                .send(ProviderEvent::FunctionCall {
                    call_id: function_call_id,
                    name: function_name,
                    arguments: input,
                })
                .await;
        }
        ServerFrame::AgentThinking => {}
        ServerFrame::AgentStartedSpeaking => {
            state.transition(SessionState::Streaming);
        }
        ServerFrame::AgentAudioDone => {}
        ServerFrame::UserStartedSpeaking => {
            state.transition(SessionState::Streaming);
        }
        ServerFrame::History { session_minutes } => {
            let _ = events
                .send(ProviderEvent::CostMetric(CostMetricDelta {
                    session_minutes,
                    ..Default::default()
                }))
                .await;
        }
        ServerFrame::Error { description } => {
            state.transition(SessionState::Error);
            let _ = events
                .send(ProviderEvent::Error {
                    kind: "deepgram_error".into(),
                    message: description,
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

fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[async_trait]
impl ProviderSession for DeepgramSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn variant(&self) -> ProviderVariant {
        ProviderVariant::Deepgram
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
        if self.configured_once.swap(1, Ordering::SeqCst) == 1 {
            return Ok(());
        }

        let functions: Vec<AgentFunction> = tools
            .into_iter()
            .filter_map(|tool| {
                Some(AgentFunction {
                    name: tool.get("name")?.as_str()?.to_string(),
                    description: tool.get("description")?.as_str()?.to_string(),
                    parameters: tool.get("parameters").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();

        let settings = Settings {
            audio: SettingsAudio {
                input: WireAudioFormat {
                    encoding: "linear16".into(),
                    sample_rate: 16_000,
                },
                output: WireAudioFormat {
                    encoding: "linear16".into(),
                    sample_rate: 16_000,
                },
            },
            agent: SettingsAgent {
                listen: AgentListen {
                    model: self.listen_model.clone(),
                },
                think: AgentThink {
                    provider: ThinkProvider {
                        provider_type: "open_ai".into(),
                        model: self.think_model.clone(),
                        temperature: self.temperature,
                    },
                    instructions,
                    functions,
                },
                speak: AgentSpeak {
                    model: self.speak_model.clone(),
                },
                greeting: self.greeting.clone(),
            },
        };

        self.outbound
            .send(Outbound::Control(ClientFrame::Settings(settings)))
            .map_err(|_| ProviderError::Closed)
    }

    fn push_audio(&self, pcm16_frame: Vec<i16>) -> Result<(), ProviderError> {
        if self.state.is_terminal() {
            return Err(ProviderError::Closed);
        }
        self.state.transition(SessionState::Streaming);
        self.outbound
            .send(Outbound::Audio(pcm16_to_bytes(&pcm16_frame)))
            .map_err(|_| ProviderError::Closed)
    }

    async fn request_response(&self) -> Result<(), ProviderError> {
        // The Deepgram agent speaks its greeting as soon as Settings is
        // applied; there is no separate kickoff frame to send.
        Ok(())
    }

    async fn submit_tool_result(&self, call_id: String, result: Value) -> Result<(), ProviderError> {
        if !self.pending_calls.lock().unwrap().remove(&call_id) {
            return Err(ProviderError::Protocol(format!(
                "unsolicited or duplicate function-call result for call_id {call_id}"
            )));
        }
        self.state.transition(SessionState::Streaming);
        self.outbound
            .send(Outbound::Control(ClientFrame::FunctionCallResponse {
                function_call_id: call_id,
                output: result,
            }))
            .map_err(|_| ProviderError::Closed)
    }

    async fn push_context_message(&self, text: String) -> Result<(), ProviderError> {
        self.outbound
            .send(Outbound::Control(ClientFrame::InjectAgentMessage { message: text }))
            .map_err(|_| ProviderError::Closed)
    }

    async fn close(&self) {
        self.state.transition(SessionState::Closing);
        self.state.transition(SessionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::WebSocketStream;

    fn config(url: String) -> DeepgramConfig {
        DeepgramConfig {
            url,
            api_key: None,
            listen_model: "nova-2".into(),
            think_model: "gpt-4o-mini".into(),
            temperature: 0.7,
            speak_model: "aura-asteria-en".into(),
            greeting: "Hi, how can I help?".into(),
        }
    }

    async fn fake_server() -> (String, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (format!("ws://{addr}"), listener)
    }

    async fn accept(listener: TcpListener) -> WebSocketStream<tokio::net::TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    #[tokio::test]
    async fn submit_tool_result_for_an_unsolicited_call_id_is_rejected() {
        let (url, listener) = fake_server().await;
        let server = tokio::spawn(async move {
            let _ws = accept(listener).await;
        });

        let (session, _events) = DeepgramSession::connect("sess-1".into(), config(url)).await.unwrap();
        let result = session
            .submit_tool_result("fc_never_emitted".into(), serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(ProviderError::Protocol(_))));

        server.abort();
    }

    #[tokio::test]
    async fn submit_tool_result_accepts_a_previously_emitted_call_id_exactly_once() {
        let (url, listener) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(listener).await;
            let frame = ServerFrame::FunctionCallRequest {
                function_call_id: "fc_1".into(),
                function_name: "transfer_to_agent".into(),
                input: serde_json::json!({}),
            };
            ws.send(Message::Text(serde_json::to_string(&frame).unwrap()))
                .await
                .unwrap();
            loop {
                if ws.next().await.is_none() {
                    break;
                }
            }
        });

        let (session, mut events) = DeepgramSession::connect("sess-1".into(), config(url)).await.unwrap();

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
            matches!(duplicate, Err(ProviderError::Protocol(_))),
            "a call_id already resolved must not be resolvable again"
        );

        server.abort();
    }
}
