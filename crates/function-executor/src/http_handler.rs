//! HTTP handler adapter (spec §4.5): calls a Function Spec's `api_endpoint`
//! with the decoded arguments as the body, retrying with exponential
//! backoff capped at 10s.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bridge_types::FunctionCallOutcome;
use reqwest::Method;
use serde_json::Value;

use crate::context::CallContext;
use crate::handler::FunctionHandler;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub struct HttpHandler {
    http: reqwest::Client,
    endpoint: String,
    method: Method,
    headers: HashMap<String, String>,
    timeout: Duration,
    retries: u32,
}

impl HttpHandler {
    pub fn new(
        endpoint: String,
        method: Option<String>,
        headers: HashMap<String, String>,
        timeout_ms: u64,
        retries: u32,
    ) -> Self {
        let method = method
            .as_deref()
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .unwrap_or(Method::POST);
        Self {
            http: reqwest::Client::new(),
            endpoint,
            method,
            headers,
            timeout: Duration::from_millis(timeout_ms),
            retries,
        }
    }

    async fn attempt(&self, body: &Value) -> Result<Value, String> {
        let mut request = self
            .http
            .request(self.method.clone(), &self.endpoint)
            .timeout(self.timeout)
            .json(body);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|err| err.to_string())?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("http status {status}: {body}"));
        }
        serde_json::from_str(&body).map_err(|err| err.to_string())
    }
}

#[async_trait]
impl FunctionHandler for HttpHandler {
    async fn call(&self, arguments: Value, _ctx: &CallContext) -> FunctionCallOutcome {
        let mut backoff = Duration::from_secs(1);
        let mut last_error = String::new();

        for attempt in 0..=self.retries {
            match self.attempt(&arguments).await {
                Ok(data) => return FunctionCallOutcome::Success { data },
                Err(err) => {
                    last_error = err;
                    if attempt < self.retries {
                        tracing::warn!(
                            endpoint = %self.endpoint,
                            attempt,
                            error = %last_error,
                            "http handler attempt failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }

        FunctionCallOutcome::Error { error: last_error }
    }
}
