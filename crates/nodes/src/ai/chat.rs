//! The `llmChat` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::interpolate;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

use super::provider::{self, Purpose};

/// Sends a chat completion to the configured provider.
///
/// Either a `prompt` string (with optional `system`) or a full `messages`
/// list; string content is interpolated against the input. The provider's
/// reply lands under `response`.
pub struct LlmChatHandler {
    client: reqwest::Client,
}

impl LlmChatHandler {
    /// Create the handler with a shared client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for LlmChatHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the message list from `messages` or `prompt`/`system` parameters.
pub(super) fn build_messages(
    params: &JsonMap,
    data: &Value,
    ctx: &ExecutionContext,
) -> Result<Vec<Value>, EngineError> {
    if let Some(raw) = value::array(params, "messages") {
        let mut messages = Vec::with_capacity(raw.len());
        for entry in raw {
            let role = entry
                .get("role")
                .and_then(Value::as_str)
                .unwrap_or("user")
                .to_string();
            let content = entry
                .get("content")
                .and_then(Value::as_str)
                .map(|text| interpolate(text, data, Some(ctx)))
                .unwrap_or_default();
            messages.push(json!({"role": role, "content": content}));
        }
        return Ok(messages);
    }

    let prompt = value::str_opt(params, "prompt")
        .ok_or_else(|| EngineError::handler("llmChat requires `prompt` or `messages`"))?;
    let mut messages = Vec::new();
    if let Some(system) = value::str_opt(params, "system") {
        messages.push(json!({
            "role": "system",
            "content": interpolate(&system, data, Some(ctx)),
        }));
    }
    messages.push(json!({
        "role": "user",
        "content": interpolate(&prompt, data, Some(ctx)),
    }));
    Ok(messages)
}

#[async_trait]
impl NodeHandler for LlmChatHandler {
    fn node_type(&self) -> &str {
        crate::types::LLM_CHAT
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;
        let data = Value::Object(input.clone());

        let target = provider::resolve_target(node, ctx, Purpose::Chat)?;
        let messages = build_messages(params, &data, ctx)?;
        let temperature = value::f64_or(params, "temperature", 0.7);
        let max_tokens = value::u64_or(params, "maxTokens", 1024);
        let timeout_ms = value::u64_or(params, "timeoutMs", 60_000);

        let response = provider::chat(
            &self.client,
            &target,
            &messages,
            temperature,
            max_tokens,
            timeout_ms,
            ctx,
        )
        .await?;

        let mut output = input;
        output.insert("response".into(), json!(response));
        output.insert("provider".into(), json!(target.provider));
        output.insert("model".into(), json!(target.model));
        Ok(output)
    }
}
