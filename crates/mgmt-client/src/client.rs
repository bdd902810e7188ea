//! HTTP client for the Management API (spec §6.3). One `reqwest::Client`
//! shared across calls, a shared-secret header for authentication, and two
//! timeout tiers: short for control endpoints, long for knowledge search.

use std::sync::Arc;
use std::time::Duration;

use bridge_proto::mgmt::{
    CreateCallRequest, CreateCallResponse, CreditBalanceResponse, DeductCreditsRequest,
    DeductCreditsResponse, GetAgentResponse, GetFunctionsResponse, KnowledgeSearchRequest,
    KnowledgeSearchResponse, LogFunctionCallRequest, UpdateCallRequest,
};
use bridge_types::{AgentConfig, FunctionSpec};
use reqwest::header::{HeaderMap, HeaderValue};

use crate::cache::AgentCache;
use crate::error::MgmtError;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
const KNOWLEDGE_TIMEOUT: Duration = Duration::from_secs(15);
const AUTH_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct MgmtClient {
    http: reqwest::Client,
    base_url: String,
    agent_cache: Arc<AgentCache>,
}

impl MgmtClient {
    pub fn new(base_url: String, api_key: &str, agent_cache_ttl: Duration) -> Result<Self, MgmtError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTH_HEADER,
            HeaderValue::from_str(api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url,
            agent_cache: Arc::new(AgentCache::new(agent_cache_ttl)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MgmtError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(MgmtError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch the Agent Config, serving from the TTL cache when possible.
    /// Caller is responsible for calling `.validate()` on a fresh fetch.
    pub async fn get_agent(&self, agent_id: &str) -> Result<Arc<AgentConfig>, MgmtError> {
        if let Some(cached) = self.agent_cache.get(agent_id) {
            return Ok(cached);
        }

        let response = self
            .http
            .get(self.url(&format!("/agents/{agent_id}")))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        let body: GetAgentResponse = Self::decode(response).await?;
        Ok(self.agent_cache.insert(agent_id.to_string(), body.agent))
    }

    pub async fn get_functions(&self, agent_id: &str) -> Result<Vec<FunctionSpec>, MgmtError> {
        let response = self
            .http
            .get(self.url(&format!("/functions/agent/{agent_id}")))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        let body: GetFunctionsResponse = Self::decode(response).await?;
        Ok(body.functions)
    }

    pub async fn get_credit_balance(&self, tenant_id: &str) -> Result<f64, MgmtError> {
        let response = self
            .http
            .get(self.url("/credits/balance"))
            .header("x-tenant-id", tenant_id)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        let body: CreditBalanceResponse = Self::decode(response).await?;
        Ok(body.balance)
    }

    pub async fn deduct_credits(
        &self,
        tenant_id: &str,
        amount: f64,
        call_log_id: &str,
    ) -> Result<f64, MgmtError> {
        let request = DeductCreditsRequest {
            tenant_id: tenant_id.to_string(),
            amount,
            call_log_id: call_log_id.to_string(),
        };
        let response = self
            .http
            .post(self.url("/credits/deduct"))
            .json(&request)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        let body: DeductCreditsResponse = Self::decode(response).await?;
        Ok(body.balance_after)
    }

    pub async fn create_call(&self, request: CreateCallRequest) -> Result<String, MgmtError> {
        let response = self
            .http
            .post(self.url("/calls/create"))
            .json(&request)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        let body: CreateCallResponse = Self::decode(response).await?;
        Ok(body.id)
    }

    pub async fn update_call(
        &self,
        session_id: &str,
        request: UpdateCallRequest,
    ) -> Result<(), MgmtError> {
        let response = self
            .http
            .put(self.url(&format!("/calls/{session_id}")))
            .json(&request)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MgmtError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    pub async fn log_function_call(
        &self,
        call_log_id: &str,
        request: LogFunctionCallRequest,
    ) -> Result<(), MgmtError> {
        let response = self
            .http
            .post(self.url(&format!("/calls/{call_log_id}/functions")))
            .json(&request)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MgmtError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    pub async fn search_knowledge(
        &self,
        kb_id: &str,
        request: KnowledgeSearchRequest,
    ) -> Result<KnowledgeSearchResponse, MgmtError> {
        let response = self
            .http
            .post(self.url(&format!("/knowledge/{kb_id}/search")))
            .json(&request)
            .timeout(KNOWLEDGE_TIMEOUT)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Drop expired agent-config entries. Run periodically by the
    /// agent-cache sweeper monitor (spec §4.10, default every 600s).
    pub fn sweep_agent_cache(&self) -> usize {
        self.agent_cache.sweep_expired()
    }
}
