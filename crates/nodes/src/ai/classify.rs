//! The `textClassifier` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::interpolate;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

use super::provider::{self, Purpose};

/// Classifies `text` into one of `categories` with a constrained prompt
/// through the chat plumbing.
///
/// The model is instructed to answer with one category name; the reply is
/// normalized against the list (case-insensitive, punctuation trimmed).
/// `_matched` reports whether the reply named a known category — when it
/// did not, `category` falls back to the first entry.
pub struct TextClassifierHandler {
    client: reqwest::Client,
}

impl TextClassifierHandler {
    /// Create the handler with a shared client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for TextClassifierHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// The classification prompt sent as the user message.
pub(super) fn classification_prompt(text: &str, categories: &[String]) -> String {
    format!(
        "Classify the following text into exactly one of these categories: {}.\n\
         Respond with only the category name, nothing else.\n\nText: {text}",
        categories.join(", ")
    )
}

/// Match the model's reply against the category list.
pub(super) fn normalize_category<'a>(reply: &str, categories: &'a [String]) -> Option<&'a str> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .to_lowercase();
    categories
        .iter()
        .find(|cat| cat.to_lowercase() == cleaned)
        .or_else(|| {
            categories
                .iter()
                .find(|cat| cleaned.contains(&cat.to_lowercase()))
        })
        .map(String::as_str)
}

#[async_trait]
impl NodeHandler for TextClassifierHandler {
    fn node_type(&self) -> &str {
        crate::types::TEXT_CLASSIFIER
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

        let text = value::str_opt(params, "text")
            .map(|t| interpolate(&t, &data, Some(ctx)))
            .ok_or_else(|| EngineError::handler("textClassifier requires `text`"))?;
        let categories: Vec<String> = value::array(params, "categories")
            .map(|items| items.iter().map(value::render).collect())
            .unwrap_or_default();
        if categories.is_empty() {
            return Err(EngineError::handler(
                "textClassifier requires a non-empty `categories` list",
            ));
        }

        let target = provider::resolve_target(node, ctx, Purpose::Chat)?;
        let messages = vec![json!({
            "role": "user",
            "content": classification_prompt(&text, &categories),
        })];
        let timeout_ms = value::u64_or(params, "timeoutMs", 60_000);

        // Temperature 0: classification wants the mode, not a sample.
        let reply = provider::chat(&self.client, &target, &messages, 0.0, 32, timeout_ms, ctx)
            .await?;

        let matched = normalize_category(&reply, &categories);
        let mut output = input;
        output.insert(
            "category".into(),
            json!(matched.unwrap_or(categories[0].as_str())),
        );
        output.insert("_matched".into(), json!(matched.is_some()));
        output.insert("raw".into(), json!(reply.trim()));
        output.insert("provider".into(), json!(target.provider));
        output.insert("model".into(), json!(target.model));
        Ok(output)
    }
}
