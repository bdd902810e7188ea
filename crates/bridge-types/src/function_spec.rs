use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a function's handler is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
    /// Implemented in-process (the two built-ins, or a dynamically
    /// registered inline handler).
    Inline,
    /// Registered from this function's own `api_endpoint`; the executor
    /// performs the HTTP call itself.
    Api,
}

/// Whether the Connection blocks the provider's tool-resolution slot for
/// this function, or acknowledges immediately and resolves later (spec
/// §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sync
    }
}

/// The declarative description of a tool available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON-schema-like parameter description, passed through verbatim to
    /// the provider's tool schema.
    pub parameters: serde_json::Value,
    pub handler_type: HandlerType,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl FunctionSpec {
    /// The JSON-schema tool entry sent to the provider in `configure`.
    pub fn to_tool_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_omitted() {
        let json = serde_json::json!({
            "name": "check_order_status",
            "description": "look up an order",
            "parameters": {"type": "object", "properties": {}},
            "handlerType": "api",
            "apiEndpoint": "https://example.com/orders",
        });
        let spec: FunctionSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.timeout_ms, 30_000);
        assert_eq!(spec.retries, 2);
        assert!(spec.is_active);
        assert_eq!(spec.execution_mode, ExecutionMode::Sync);
    }

    #[test]
    fn retries_zero_is_respected_not_defaulted() {
        let json = serde_json::json!({
            "name": "f",
            "description": "d",
            "parameters": {},
            "handlerType": "api",
            "retries": 0,
        });
        let spec: FunctionSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec.retries, 0);
    }
}
