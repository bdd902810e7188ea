//! The handler contract (spec §4.5): `(arguments, context) -> outcome`.

use async_trait::async_trait;
use bridge_types::FunctionCallOutcome;
use serde_json::Value;

use crate::context::CallContext;

#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, arguments: Value, ctx: &CallContext) -> FunctionCallOutcome;
}
