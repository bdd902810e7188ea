//! Composite STT+LLM+TTS provider variant (spec §4.4.c): stitches a
//! streaming STT WebSocket, a non-streaming LLM chat-completion endpoint,
//! and a TTS endpoint into the same Provider Session contract the other
//! two single-endpoint variants implement.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bridge_proto::composite::{
    ChatChoiceMessage, ChatCompletionRequest, ChatCompletionResponse, ChatFunctionDef, ChatMessage,
    ChatTool, SttClientFrame, SttEvent, TtsRequest, TtsResponse,
};
use bridge_types::ProviderVariant;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::ProviderError;
use crate::event::{CostMetricDelta, ProviderEvent, Speaker};
use crate::session::{AudioFormat, ProviderSession};
use crate::state::{SessionState, StateMachine};

pub struct CompositeConfig {
    pub stt_url: String,
    pub llm_url: String,
    pub llm_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tts_url: String,
    pub tts_voice: String,
    pub greeting: String,
}

struct LlmTts {
    http: reqwest::Client,
    llm_url: String,
    llm_model: String,
    temperature: f32,
    max_tokens: u32,
    tts_url: String,
    tts_voice: String,
}

pub struct CompositeSession {
    session_id: String,
    state: Arc<StateMachine>,
    stt_outbound: mpsc::UnboundedSender<SttClientFrame>,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    tools: Arc<Mutex<Vec<ChatTool>>>,
    llm_tts: Arc<LlmTts>,
    events: mpsc::Sender<ProviderEvent>,
    configured_once: AtomicU32,
    /// Tool call ids surfaced to the caller that have not yet been resolved
    /// by `submit_tool_result` (spec §8 invariant 5).
    pending_calls: Arc<Mutex<HashSet<String>>>,
    greeting: String,
}

impl CompositeSession {
    pub async fn connect(
        session_id: String,
        config: CompositeConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<ProviderEvent>), ProviderError> {
        let (stt_stream, _) = tokio_tungstenite::connect_async(&config.stt_url)
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let (mut stt_sink, mut stt_source) = stt_stream.split();

        let (stt_outbound_tx, mut stt_outbound_rx) = mpsc::unbounded_channel::<SttClientFrame>();
        let (events_tx, events_rx) = mpsc::channel(256);

        tokio::spawn(async move {
            while let Some(frame) = stt_outbound_rx.recv().await {
                let Ok(text) = serde_json::to_string(&frame) else {
                    continue;
                };
                if stt_sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let state = Arc::new(StateMachine::new());
        state.transition(SessionState::Ready);

        let llm_tts = Arc::new(LlmTts {
            http: reqwest::Client::new(),
            llm_url: config.llm_url,
            llm_model: config.llm_model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            tts_url: config.tts_url,
            tts_voice: config.tts_voice,
        });

        let session = Arc::new(Self {
            session_id,
            state: state.clone(),
            stt_outbound: stt_outbound_tx,
            messages: Arc::new(Mutex::new(Vec::new())),
            tools: Arc::new(Mutex::new(Vec::new())),
            llm_tts: llm_tts.clone(),
            events: events_tx.clone(),
            configured_once: AtomicU32::new(0),
            pending_calls: Arc::new(Mutex::new(HashSet::new())),
            greeting: config.greeting,
        });

        let reader_session = session.clone();
        tokio::spawn(async move {
            while let Some(message) = stt_source.next().await {
                let Ok(Message::Text(text)) = message else {
                    continue;
                };
                let Ok(event) = serde_json::from_str::<SttEvent>(&text) else {
                    continue;
                };
                reader_session.handle_stt_event(event).await;
            }
            let _ = reader_session.events.send(ProviderEvent::Done).await;
        });

        Ok((session, events_rx))
    }

    async fn handle_stt_event(&self, event: SttEvent) {
        match event {
            SttEvent::Partial { text, .. } => {
                let _ = self
                    .events
                    .send(ProviderEvent::Transcript {
                        speaker: Speaker::User,
                        text,
                        is_final: false,
                    })
                    .await;
            }
            SttEvent::Final { text, .. } => {
                let _ = self
                    .events
                    .send(ProviderEvent::Transcript {
                        speaker: Speaker::User,
                        text: text.clone(),
                        is_final: true,
                    })
                    .await;
                self.messages.lock().unwrap().push(ChatMessage {
                    role: "user".into(),
                    content: text,
                });
                self.run_completion_turn().await;
            }
            SttEvent::Error { message } => {
                self.state.transition(SessionState::Error);
                let _ = self
                    .events
                    .send(ProviderEvent::Error {
                        kind: "stt_error".into(),
                        message,
                    })
                    .await;
            }
        }
    }

    /// Run one LLM completion against the accumulated conversation and
    /// either surface a function call or speak the reply via TTS.
    async fn run_completion_turn(&self) {
        let messages = self.messages.lock().unwrap().clone();
        let tools = self.tools.lock().unwrap().clone();

        let response = match self.llm_tts.complete(messages, tools).await {
            Ok(response) => response,
            Err(err) => {
                self.state.transition(SessionState::Error);
                let _ = self
                    .events
                    .send(ProviderEvent::Error {
                        kind: "llm_error".into(),
                        message: err.to_string(),
                    })
                    .await;
                return;
            }
        };

        if let Some(usage) = response.usage {
            let _ = self
                .events
                .send(ProviderEvent::CostMetric(CostMetricDelta {
                    text_input_tokens: usage.prompt_tokens,
                    text_output_tokens: usage.completion_tokens,
                    ..Default::default()
                }))
                .await;
        }

        let Some(choice) = response.choices.into_iter().next() else {
            return;
        };
        self.dispatch_choice(choice.message).await;
    }

    async fn dispatch_choice(&self, message: ChatChoiceMessage) {
        if !message.tool_calls.is_empty() {
            self.state.transition(SessionState::AwaitingTool);
            for call in message.tool_calls {
                self.pending_calls.lock().unwrap().insert(call.id.clone());
                let arguments: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
                let _ = self
                    .events
                    .send(ProviderEvent::FunctionCall {
                        call_id: call.id,
                        name: call.function.name,
                        arguments,
                    })
                    .await;
            }
            return;
        }

        let Some(content) = message.content else {
            return;
        };
        self.messages.lock().unwrap().push(ChatMessage {
            role: "assistant".into(),
            content: content.clone(),
        });
        self.speak(content).await;
    }

    async fn speak(&self, text: String) {
        let _ = self
            .events
            .send(ProviderEvent::Transcript {
                speaker: Speaker::Assistant,
                text: text.clone(),
                is_final: true,
            })
            .await;

        match self.llm_tts.synthesize(&text).await {
            Ok((samples, delta)) => {
                self.state.transition(SessionState::Streaming);
                let _ = self.events.send(ProviderEvent::AudioOut(samples)).await;
                let _ = self.events.send(ProviderEvent::CostMetric(delta)).await;
            }
            Err(err) => {
                let _ = self
                    .events
                    .send(ProviderEvent::Error {
                        kind: "tts_error".into(),
                        message: err.to_string(),
                    })
                    .await;
            }
        }
    }
}

impl LlmTts {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        tools: Vec<ChatTool>,
    ) -> Result<ChatCompletionResponse, reqwest::Error> {
        let request = ChatCompletionRequest {
            model: self.llm_model.clone(),
            messages,
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        self.http
            .post(&self.llm_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn synthesize(&self, text: &str) -> Result<(Vec<i16>, CostMetricDelta), reqwest::Error> {
        let request = TtsRequest {
            text: text.to_string(),
            voice: self.tts_voice.clone(),
        };
        let response: TtsResponse = self
            .http
            .post(&self.tts_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let bytes = BASE64.decode(response.pcm16_base64.as_bytes()).unwrap_or_default();
        let native_samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        // `Connection` assumes Composite's `AudioFormat` is 16kHz (the rate
        // its STT leg already exercises) and does its own 16kHz to 8kHz
        // conversion before framing for the PBX; resampling straight to
        // 8kHz here would halve that audio again.
        let samples = audio_codec::resample(&native_samples, response.sample_rate, 16_000);

        let delta = CostMetricDelta {
            tts_characters: text.chars().count() as u64,
            tts_seconds: response.seconds.unwrap_or(0.0),
            ..Default::default()
        };
        Ok((samples, delta))
    }
}

fn pcm16_to_base64(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    BASE64.encode(bytes)
}

#[async_trait]
impl ProviderSession for CompositeSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn variant(&self) -> ProviderVariant {
        ProviderVariant::Composite
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

        *self.messages.lock().unwrap() = vec![ChatMessage {
            role: "system".into(),
            content: instructions,
        }];
        *self.tools.lock().unwrap() = tools
            .into_iter()
            .filter_map(|tool| {
                Some(ChatTool {
                    tool_type: "function".into(),
                    function: ChatFunctionDef {
                        name: tool.get("name")?.as_str()?.to_string(),
                        description: tool.get("description")?.as_str().unwrap_or("").to_string(),
                        parameters: tool.get("parameters").cloned().unwrap_or(Value::Null),
                    },
                })
            })
            .collect();

        self.state.transition(SessionState::Ready);
        Ok(())
    }

    fn push_audio(&self, pcm16_frame: Vec<i16>) -> Result<(), ProviderError> {
        if self.state.is_terminal() {
            return Err(ProviderError::Closed);
        }
        self.state.transition(SessionState::Streaming);
        self.stt_outbound
            .send(SttClientFrame::Audio {
                pcm16_base64: pcm16_to_base64(&pcm16_frame),
            })
            .map_err(|_| ProviderError::Closed)
    }

    async fn request_response(&self) -> Result<(), ProviderError> {
        let greeting = self.greeting.clone();
        self.messages.lock().unwrap().push(ChatMessage {
            role: "assistant".into(),
            content: greeting.clone(),
        });
        self.speak(greeting).await;
        Ok(())
    }

    async fn submit_tool_result(&self, call_id: String, result: Value) -> Result<(), ProviderError> {
        if !self.pending_calls.lock().unwrap().remove(&call_id) {
            return Err(ProviderError::Protocol(format!(
                "unsolicited or duplicate function-call result for call_id {call_id}"
            )));
        }
        self.messages.lock().unwrap().push(ChatMessage {
            role: "tool".into(),
            content: format!("{{\"call_id\":\"{call_id}\",\"result\":{result}}}"),
        });
        self.state.transition(SessionState::Streaming);
        self.run_completion_turn().await;
        Ok(())
    }

    async fn push_context_message(&self, text: String) -> Result<(), ProviderError> {
        self.messages.lock().unwrap().push(ChatMessage {
            role: "system".into(),
            content: text,
        });
        self.run_completion_turn().await;
        Ok(())
    }

    async fn close(&self) {
        self.state.transition(SessionState::Closing);
        let _ = self.stt_outbound.send(SttClientFrame::Finalize);
        self.state.transition(SessionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::WebSocketStream;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fake_stt_server() -> (String, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (format!("ws://{addr}"), listener)
    }

    async fn accept(listener: TcpListener) -> WebSocketStream<tokio::net::TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    fn pcm16_base64(samples: &[i16]) -> String {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    #[tokio::test]
    async fn synthesize_resamples_tts_audio_to_the_sessions_16khz_format() {
        let tts_server = MockServer::start().await;
        let native_samples: Vec<i16> = (0..240).map(|i| (i * 100) as i16).collect();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sample_rate": 24_000,
                "pcm16_base64": pcm16_base64(&native_samples),
                "seconds": 0.01,
            })))
            .mount(&tts_server)
            .await;

        let llm_tts = LlmTts {
            http: reqwest::Client::new(),
            llm_url: format!("{}/chat", tts_server.uri()),
            llm_model: "gpt-4o-mini".into(),
            temperature: 0.5,
            max_tokens: 200,
            tts_url: format!("{}/tts", tts_server.uri()),
            tts_voice: "alloy".into(),
        };

        let (samples, delta) = llm_tts.synthesize("hello there").await.unwrap();
        let expected = audio_codec::resample(&native_samples, 24_000, 16_000);
        assert_eq!(samples, expected);
        assert_eq!(delta.tts_characters, "hello there".chars().count() as u64);
    }

    #[tokio::test]
    async fn a_tool_call_id_can_only_be_resolved_once() {
        let (stt_url, listener) = fake_stt_server().await;
        let stt_server = tokio::spawn(async move {
            let _ws = accept(listener).await;
        });

        let llm_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "function": {"name": "search_knowledge", "arguments": "{}"}
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5}
            })))
            .mount(&llm_server)
            .await;

        let (session, mut events) = CompositeSession::connect(
            "sess-1".into(),
            CompositeConfig {
                stt_url,
                llm_url: format!("{}/chat", llm_server.uri()),
                llm_model: "gpt-4o-mini".into(),
                temperature: 0.5,
                max_tokens: 200,
                tts_url: format!("{}/tts", llm_server.uri()),
                tts_voice: "alloy".into(),
                greeting: "Hi".into(),
            },
        )
        .await
        .unwrap();

        session
            .configure("be helpful".into(), vec![], AudioFormat::Pcm16_16kHz)
            .await
            .unwrap();
        session
            .push_context_message("trigger a completion turn".into())
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
        assert_eq!(session.state(), SessionState::AwaitingTool);

        let unsolicited = session.submit_tool_result("call_never_emitted".into(), Value::Null).await;
        assert!(matches!(unsolicited, Err(ProviderError::Protocol(_))));

        session
            .submit_tool_result(call_id.clone(), Value::Null)
            .await
            .expect("a previously emitted call_id resolves");

        stt_server.abort();
    }
}
