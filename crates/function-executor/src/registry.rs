//! Process-wide function registry (spec §4.5, §5): one `FunctionExecutor`
//! lives for the process lifetime, shared by every Connection. Agent
//! functions register into it at Connection setup (idempotent, last
//! write wins); two inline handlers are wired in at process bootstrap.

use std::sync::Arc;
use std::time::Duration;

use bridge_types::{ExecutionMode, FunctionCallOutcome, FunctionSpec, HandlerType};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::context::CallContext;
use crate::handler::FunctionHandler;
use crate::http_handler::HttpHandler;

struct RegisteredFunction {
    spec: FunctionSpec,
    handler: Arc<dyn FunctionHandler>,
}

/// Maps function name to handler. `register()` is driven by an agent's
/// `FunctionSpec` list (spec §4.6 step 5); built-ins are wired in once at
/// bootstrap via `register_builtin` and are never overwritten by a
/// `HandlerType::Inline` spec with no matching handler already present.
pub struct FunctionExecutor {
    registry: DashMap<String, RegisteredFunction>,
}

impl Default for FunctionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionExecutor {
    pub fn new() -> Self {
        Self {
            registry: DashMap::new(),
        }
    }

    pub fn register_builtin(&self, spec: FunctionSpec, handler: Arc<dyn FunctionHandler>) {
        self.registry
            .insert(spec.name.clone(), RegisteredFunction { spec, handler });
    }

    /// Register (or re-register) one of an agent's functions. Inactive
    /// specs are removed outright. `Api` specs get a fresh `HttpHandler`
    /// built from this function's own endpoint/method/headers/timeout/retries;
    /// `Inline` specs must already have a handler wired in by name
    /// (a built-in) or registration is a no-op with a warning, since this
    /// crate has no way to manufacture inline behavior from JSON alone.
    pub fn register(&self, spec: FunctionSpec) {
        if !spec.is_active {
            self.registry.remove(&spec.name);
            return;
        }

        match spec.handler_type {
            HandlerType::Api => {
                let Some(endpoint) = spec.api_endpoint.clone() else {
                    tracing::warn!(name = %spec.name, "api handler spec missing api_endpoint, skipping");
                    return;
                };
                let handler = Arc::new(HttpHandler::new(
                    endpoint,
                    spec.method.clone(),
                    spec.headers.clone(),
                    spec.timeout_ms,
                    spec.retries,
                ));
                self.registry
                    .insert(spec.name.clone(), RegisteredFunction { spec, handler });
            }
            HandlerType::Inline => {
                if let Some(mut existing) = self.registry.get_mut(&spec.name) {
                    existing.spec = spec;
                } else {
                    tracing::warn!(name = %spec.name, "inline handler spec has no matching built-in, skipping");
                }
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// Tool schemas for every active function, for inclusion in a Provider
    /// Session's `configure()` call.
    pub fn tool_schemas(&self) -> Vec<Value> {
        self.registry
            .iter()
            .map(|entry| entry.spec.to_tool_schema())
            .collect()
    }

    /// Run `name` to completion, enforcing its own `timeout_ms` budget.
    /// Used directly for `ExecutionMode::Sync` functions and internally by
    /// `execute_async`.
    pub async fn execute_sync(&self, name: &str, arguments: Value, ctx: &CallContext) -> FunctionCallOutcome {
        let Some(entry) = self.registry.get(name).map(|e| (e.handler.clone(), e.spec.timeout_ms)) else {
            return FunctionCallOutcome::Error {
                error: format!("no function registered with name '{name}'"),
            };
        };
        let (handler, timeout_ms) = entry;

        match tokio::time::timeout(Duration::from_millis(timeout_ms), handler.call(arguments, ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => FunctionCallOutcome::Error {
                error: format!("function '{name}' timed out after {timeout_ms}ms"),
            },
        }
    }

    /// Kick off an `ExecutionMode::Async` function in the background.
    /// Returns an immediate acknowledgement outcome plus a receiver the
    /// caller can await (within the provider's tool-response window) to
    /// learn the real result.
    pub fn execute_async(
        self: &Arc<Self>,
        name: String,
        arguments: Value,
        ctx: CallContext,
    ) -> (FunctionCallOutcome, oneshot::Receiver<FunctionCallOutcome>) {
        let (tx, rx) = oneshot::channel();
        let executor = self.clone();
        tokio::spawn(async move {
            let outcome = executor.execute_sync(&name, arguments, &ctx).await;
            let _ = tx.send(outcome);
        });

        let ack = FunctionCallOutcome::Success {
            data: json!({ "accepted": true }),
        };
        (ack, rx)
    }

    /// Which execution mode a registered function expects, for dispatch
    /// by the caller. `None` if unregistered.
    pub fn execution_mode(&self, name: &str) -> Option<ExecutionMode> {
        self.registry.get(name).map(|e| e.spec.execution_mode)
    }

    /// Run several independent calls concurrently, preserving input order
    /// and isolating per-entry failure. One slow or failing call never
    /// blocks or poisons the others (spec §4.5, batch execution).
    pub async fn execute_batch(&self, calls: Vec<(String, Value, CallContext)>) -> Vec<FunctionCallOutcome> {
        let futures = calls
            .into_iter()
            .map(|(name, arguments, ctx)| async move { self.execute_sync(&name, arguments, &ctx).await });
        futures::future::join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_types::{ExecutionMode, HandlerType};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ctx() -> CallContext {
        CallContext {
            connection_id: "conn-1".into(),
            session_id: "sess-1".into(),
            caller_id: "+15551234567".into(),
            tenant_id: Some("tenant-1".into()),
            asterisk_port: 5000,
            knowledge_base_id: None,
        }
    }

    fn spec(name: &str, handler_type: HandlerType, execution_mode: ExecutionMode) -> FunctionSpec {
        FunctionSpec {
            name: name.into(),
            description: "test".into(),
            parameters: json!({"type": "object", "properties": {}}),
            handler_type,
            api_endpoint: None,
            method: None,
            headers: Default::default(),
            execution_mode,
            timeout_ms: 1000,
            retries: 0,
            is_active: true,
        }
    }

    struct CountingHandler(Arc<AtomicU32>);

    #[async_trait]
    impl FunctionHandler for CountingHandler {
        async fn call(&self, _arguments: Value, _ctx: &CallContext) -> FunctionCallOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            FunctionCallOutcome::Success { data: json!({"ok": true}) }
        }
    }

    #[tokio::test]
    async fn unregistered_function_returns_error() {
        let executor = FunctionExecutor::new();
        let outcome = executor.execute_sync("missing", json!({}), &ctx()).await;
        assert!(matches!(outcome, FunctionCallOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn builtin_inline_handler_survives_agent_reregistration() {
        let executor = FunctionExecutor::new();
        let calls = Arc::new(AtomicU32::new(0));
        executor.register_builtin(
            spec("transfer_to_agent", HandlerType::Inline, ExecutionMode::Sync),
            Arc::new(CountingHandler(calls.clone())),
        );

        executor.register(spec("transfer_to_agent", HandlerType::Inline, ExecutionMode::Sync));

        let outcome = executor.execute_sync("transfer_to_agent", json!({}), &ctx()).await;
        assert!(matches!(outcome, FunctionCallOutcome::Success { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inactive_spec_deregisters_function() {
        let executor = FunctionExecutor::new();
        executor.register_builtin(
            spec("transfer_to_agent", HandlerType::Inline, ExecutionMode::Sync),
            Arc::new(CountingHandler(Arc::new(AtomicU32::new(0)))),
        );

        let mut inactive = spec("transfer_to_agent", HandlerType::Inline, ExecutionMode::Sync);
        inactive.is_active = false;
        executor.register(inactive);

        assert!(!executor.is_registered("transfer_to_agent"));
    }

    #[tokio::test]
    async fn batch_preserves_order_and_isolates_failures() {
        let executor = FunctionExecutor::new();
        executor.register_builtin(
            spec("ok_fn", HandlerType::Inline, ExecutionMode::Sync),
            Arc::new(CountingHandler(Arc::new(AtomicU32::new(0)))),
        );

        let results = executor
            .execute_batch(vec![
                ("ok_fn".into(), json!({}), ctx()),
                ("missing_fn".into(), json!({}), ctx()),
                ("ok_fn".into(), json!({}), ctx()),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], FunctionCallOutcome::Success { .. }));
        assert!(matches!(results[1], FunctionCallOutcome::Error { .. }));
        assert!(matches!(results[2], FunctionCallOutcome::Success { .. }));
    }
}
