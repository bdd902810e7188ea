//! The Connection Manager (spec §4.6): owns the endpoint → Connection map
//! and the gated entry path that turns a freshly appeared RTP peer into a
//! running Connection.

use std::sync::Arc;
use std::time::Duration;

use bridge_proto::mgmt::CreateCallRequest;
use bridge_types::{AgentConfig, CallMetadata, Endpoint, PriceTable};
use dashmap::DashMap;
use mgmt_client::MgmtClient;
use provider_session::AudioFormat;
use rtp_transport::{RtpTransport, TransportEvent};
use side_channel::SideChannelClient;
use tokio::sync::mpsc;

use crate::connection::{self, ConnectionDeps, ConnectionHandle};
use crate::observability::{ObservabilityEvent, SharedSink};
use crate::prompt;
use crate::provider_factory;

pub struct ManagerConfig {
    pub min_credit_balance: f64,
    pub cost_margin: f64,
    pub max_idle: Duration,
    /// How long a newly appeared endpoint is given to let the PBX finish
    /// populating side-channel metadata before the first lookup (spec
    /// §4.6 step 1; `SESSION_START_DEBOUNCE_MS`, spec §6.4).
    pub metadata_debounce: Duration,
}

pub struct ConnectionManager {
    connections: DashMap<Endpoint, ConnectionHandle>,
    rtp: RtpTransport,
    side_channel: SideChannelClient,
    mgmt: MgmtClient,
    functions: Arc<function_executor::FunctionExecutor>,
    prices: Arc<PriceTable>,
    observability: SharedSink,
    config: ManagerConfig,
}

impl ConnectionManager {
    pub fn new(
        rtp: RtpTransport,
        side_channel: SideChannelClient,
        mgmt: MgmtClient,
        functions: Arc<function_executor::FunctionExecutor>,
        prices: Arc<PriceTable>,
        observability: SharedSink,
        config: ManagerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            rtp,
            side_channel,
            mgmt,
            functions,
            prices,
            observability,
            config,
        })
    }

    /// Drains the RTP transport's event stream for the process lifetime.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::ClientAppeared(endpoint) => {
                    let manager = self.clone();
                    tokio::spawn(async move { manager.accept(endpoint).await });
                }
                TransportEvent::Audio(endpoint, payload) => {
                    if let Some(handle) = self.connections.get(&endpoint) {
                        handle.send_audio(payload);
                    }
                }
                TransportEvent::ClientGone(endpoint) => self.handle_client_gone(endpoint),
            }
        }
    }

    /// The gated entry path (spec §4.6 steps 1-10): debounce, load
    /// metadata, load+validate the agent, check credit, register
    /// functions, build the Provider Session, create the call log,
    /// publish ready, and kick off the greeting. Any failed step releases
    /// the endpoint without leaving a half-built Connection behind.
    async fn accept(self: Arc<Self>, endpoint: Endpoint) {
        tokio::time::sleep(self.config.metadata_debounce).await;

        if self.connections.contains_key(&endpoint) {
            return;
        }

        let metadata = match self.side_channel.get_call_metadata(endpoint.port()).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                tracing::warn!(%endpoint, "no call metadata for endpoint, releasing");
                self.rtp.release(endpoint);
                return;
            }
            Err(err) => {
                tracing::warn!(%endpoint, error = %err, "side-channel metadata lookup failed, releasing");
                self.rtp.release(endpoint);
                return;
            }
        };

        let agent = match self.mgmt.get_agent(&metadata.agent_id).await {
            Ok(agent) => agent,
            Err(err) => {
                tracing::warn!(%endpoint, agent_id = %metadata.agent_id, error = %err, "agent config fetch failed, releasing");
                self.rtp.release(endpoint);
                return;
            }
        };
        if let Err(err) = agent.validate() {
            tracing::warn!(%endpoint, agent_id = %metadata.agent_id, error = %err, "agent config invalid, releasing");
            self.rtp.release(endpoint);
            return;
        }

        if !self.credit_check(&agent.tenant_id).await {
            tracing::warn!(%endpoint, tenant_id = %agent.tenant_id, "tenant below minimum credit balance, releasing");
            self.rtp.release(endpoint);
            return;
        }

        for spec in &agent.functions {
            self.functions.register(spec.clone());
        }
        let tool_schemas = self.functions.tool_schemas();

        let session_id = metadata.session_id.clone();
        let audio_format = match agent.provider_variant() {
            bridge_types::ProviderVariant::OpenaiRealtime => AudioFormat::Pcm16_24kHz,
            bridge_types::ProviderVariant::Deepgram | bridge_types::ProviderVariant::Composite => {
                AudioFormat::Pcm16_16kHz
            }
        };

        let (session, provider_events) = match provider_factory::connect(session_id.clone(), &agent).await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%endpoint, error = %err, "provider session connect failed, releasing");
                self.rtp.release(endpoint);
                return;
            }
        };

        let instructions = prompt::compose(&agent, &metadata, chrono::Utc::now());
        if let Err(err) = session.configure(instructions, tool_schemas, audio_format).await {
            tracing::warn!(%endpoint, error = %err, "provider session configure failed, releasing");
            session.close().await;
            self.rtp.release(endpoint);
            return;
        }

        let call_log_id = match self
            .mgmt
            .create_call(create_call_request(endpoint, session_id.clone(), &agent, &metadata))
            .await
        {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%endpoint, error = %err, "call log creation failed, releasing");
                session.close().await;
                self.rtp.release(endpoint);
                return;
            }
        };

        let deps = ConnectionDeps {
            rtp: self.rtp.clone(),
            side_channel: self.side_channel.clone(),
            mgmt: self.mgmt.clone(),
            functions: self.functions.clone(),
            prices: self.prices.clone(),
            margin: self.config.cost_margin,
            observability: self.observability.clone(),
        };

        let handle = connection::spawn(
            session_id.clone(),
            endpoint,
            metadata,
            agent,
            session.clone(),
            provider_events,
            audio_format,
            call_log_id,
            deps,
        );
        self.connections.insert(endpoint, handle);

        if let Err(err) = self.side_channel.publish_ready(&session_id).await {
            tracing::warn!(%endpoint, error = %err, "publish_ready failed");
        }

        if let Err(err) = session.request_response().await {
            tracing::warn!(%endpoint, error = %err, "greeting kickoff failed");
        }
    }

    /// Fail-open: an unreachable credit service admits the call rather
    /// than blocking it (spec §4.9).
    async fn credit_check(&self, tenant_id: &str) -> bool {
        check_credit(&self.mgmt, tenant_id, self.config.min_credit_balance).await
    }

    pub fn handle_client_gone(&self, endpoint: Endpoint) {
        if let Some((_, handle)) = self.connections.remove(&endpoint) {
            handle.close();
        }
    }

    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().close();
        }
        self.connections.clear();
    }

    /// Snapshot used by the lifecycle monitors (spec §4.10); cloning the
    /// handles is cheap and avoids holding the map locked while awaiting.
    pub fn connections_snapshot(&self) -> Vec<(Endpoint, ConnectionHandle)> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn remove_if_closed(&self, endpoint: Endpoint) {
        if let Some(handle) = self.connections.get(&endpoint) {
            if handle.is_closed() {
                drop(handle);
                self.connections.remove(&endpoint);
            }
        }
    }

    pub fn mgmt(&self) -> &MgmtClient {
        &self.mgmt
    }

    pub fn rtp(&self) -> &RtpTransport {
        &self.rtp
    }

    pub fn max_idle(&self) -> Duration {
        self.config.max_idle
    }

    pub fn side_channel(&self) -> &SideChannelClient {
        &self.side_channel
    }
}

/// The agent's own `tenant_id` is the authoritative owner of a call, not
/// the side-channel metadata's optional copy. A PBX that never populated
/// `tenant_id` on the metadata hash must still be billed and logged
/// correctly.
fn create_call_request(
    endpoint: Endpoint,
    session_id: String,
    agent: &AgentConfig,
    metadata: &CallMetadata,
) -> CreateCallRequest {
    CreateCallRequest {
        session_id,
        tenant_id: agent.tenant_id.clone(),
        agent_id: metadata.agent_id.clone(),
        caller_id: metadata.caller_id.clone(),
        asterisk_port: endpoint.port(),
    }
}

async fn check_credit(mgmt: &MgmtClient, tenant_id: &str, min_balance: f64) -> bool {
    match mgmt.get_credit_balance(tenant_id).await {
        Ok(balance) => balance >= min_balance,
        Err(err) => {
            tracing::warn!(tenant_id, error = %err, "credit service unreachable; admitting call");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{OpenAiRealtimeConfig, ProviderConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_agent(tenant_id: &str) -> AgentConfig {
        AgentConfig {
            agent_id: "agent-1".into(),
            name: "Sales".into(),
            tenant_id: tenant_id.into(),
            is_active: true,
            provider: ProviderConfig::OpenaiRealtime(OpenAiRealtimeConfig {
                realtime_url: "wss://example.com/realtime".into(),
                api_key_env: None,
            }),
            instructions: "Be helpful.".into(),
            greeting: "Hi".into(),
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

    fn sample_metadata(tenant_id: Option<&str>) -> CallMetadata {
        CallMetadata {
            session_id: "s1".into(),
            agent_id: "agent-1".into(),
            caller_id: "+15555550100".into(),
            tenant_id: tenant_id.map(str::to_string),
            caller_name: None,
            custom_data: None,
        }
    }

    #[test]
    fn create_call_request_uses_agents_tenant_id_when_metadata_tenant_is_absent() {
        let agent = sample_agent("tenant-from-agent");
        let metadata = sample_metadata(None);
        let endpoint = Endpoint::from(std::net::SocketAddr::from(([127, 0, 0, 1], 20000)));

        let request = create_call_request(endpoint, "session-1".into(), &agent, &metadata);
        assert_eq!(request.tenant_id, "tenant-from-agent");
    }

    #[test]
    fn create_call_request_ignores_a_mismatched_metadata_tenant_id() {
        let agent = sample_agent("tenant-from-agent");
        let metadata = sample_metadata(Some("tenant-from-metadata"));
        let endpoint = Endpoint::from(std::net::SocketAddr::from(([127, 0, 0, 1], 20000)));

        let request = create_call_request(endpoint, "session-1".into(), &agent, &metadata);
        assert_eq!(request.tenant_id, "tenant-from-agent");
    }

    #[tokio::test]
    async fn check_credit_denies_a_tenant_below_the_minimum_balance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/credits/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "balance": 1.0 })))
            .mount(&server)
            .await;
        let mgmt = MgmtClient::new(server.uri(), "key", Duration::from_secs(60)).unwrap();

        assert!(!check_credit(&mgmt, "tenant-1", 5.0).await);
    }

    #[tokio::test]
    async fn check_credit_admits_a_tenant_at_or_above_the_minimum_balance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/credits/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "balance": 5.0 })))
            .mount(&server)
            .await;
        let mgmt = MgmtClient::new(server.uri(), "key", Duration::from_secs(60)).unwrap();

        assert!(check_credit(&mgmt, "tenant-1", 5.0).await);
    }

    #[tokio::test]
    async fn check_credit_fails_open_when_the_credit_service_is_unreachable() {
        let mgmt = MgmtClient::new("http://127.0.0.1:1".into(), "key", Duration::from_secs(60)).unwrap();
        assert!(check_credit(&mgmt, "tenant-1", 5.0).await);
    }
}
