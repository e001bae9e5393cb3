//! Trigger handlers.
//!
//! Triggers do not fetch work — schedule and webhook plumbing enqueue
//! executions from outside. At run time a trigger node only stamps the
//! initial input with metadata about what fired.

use async_trait::async_trait;
use chrono::Utc;
use conflux_core::{EngineError, JsonMap};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::json;

fn stamp(kind: &str, node: &Node, mut input: JsonMap) -> JsonMap {
    input.insert(
        "_trigger".into(),
        json!({
            "type": kind,
            "nodeId": node.id,
            "firedAt": Utc::now().to_rfc3339(),
        }),
    );
    input
}

/// `manualTrigger` — a user or the engine API started the run.
pub struct ManualTrigger;

#[async_trait]
impl NodeHandler for ManualTrigger {
    fn node_type(&self) -> &str {
        crate::types::MANUAL_TRIGGER
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        Ok(stamp("manual", node, input))
    }
}

/// `scheduleTrigger` — the scheduler started the run; the cron expression
/// lives in the node parameters and is echoed into the metadata.
pub struct ScheduleTrigger;

#[async_trait]
impl NodeHandler for ScheduleTrigger {
    fn node_type(&self) -> &str {
        crate::types::SCHEDULE_TRIGGER
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let mut output = stamp("schedule", node, input);
        if let Some(cron) = conflux_core::value::str_opt(&node.parameters, "cron") {
            if let Some(serde_json::Value::Object(meta)) = output.get_mut("_trigger") {
                meta.insert("cron".into(), json!(cron));
            }
        }
        Ok(output)
    }
}

/// `webhookTrigger` — an inbound request started the run; its payload is
/// the initial input and passes through untouched.
pub struct WebhookTrigger;

#[async_trait]
impl NodeHandler for WebhookTrigger {
    fn node_type(&self) -> &str {
        crate::types::WEBHOOK_TRIGGER
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        Ok(stamp("webhook", node, input))
    }
}
