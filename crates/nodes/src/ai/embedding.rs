//! The `embedding` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::interpolate;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

use super::provider::{self, Purpose};


/// Embeds `text` (or a `texts` list) with the configured provider.
///
/// Output: `embeddings` (one vector per input, in order), `count`, and
/// `dimensions` of the first vector.
pub struct EmbeddingHandler {
    client: reqwest::Client,
}

impl EmbeddingHandler {
    /// Create the handler with a shared client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for EmbeddingHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect the texts to embed from `texts` or `text`.
pub(super) fn collect_texts(
    params: &JsonMap,
    data: &Value,
    ctx: &ExecutionContext,
) -> Result<Vec<String>, EngineError> {
    if let Some(items) = value::array(params, "texts") {
        let texts: Vec<String> = items
            .iter()
            .map(|item| interpolate(&value::render(item), data, Some(ctx)))
            .collect();
        if texts.is_empty() {
            return Err(EngineError::handler("embedding `texts` list is empty"));
        }
        return Ok(texts);
    }
    value::str_opt(params, "text")
        .map(|t| vec![interpolate(&t, data, Some(ctx))])
        .ok_or_else(|| EngineError::handler("embedding requires `text` or `texts`"))
}

#[async_trait]
impl NodeHandler for EmbeddingHandler {
    fn node_type(&self) -> &str {
        crate::types::EMBEDDING
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

        let target = provider::resolve_target(node, ctx, Purpose::Embedding)?;
        let texts = collect_texts(params, &data, ctx)?;
        let timeout_ms = value::u64_or(params, "timeoutMs", 60_000);

        let vectors = provider::embed(&self.client, &target, &texts, timeout_ms, ctx).await?;
        let dimensions = vectors.first().map_or(0, Vec::len);

        let mut output = input;
        output.insert("embeddings".into(), json!(vectors));
        output.insert("count".into(), json!(texts.len()));
        output.insert("dimensions".into(), json!(dimensions));
        output.insert("provider".into(), json!(target.provider));
        output.insert("model".into(), json!(target.model));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn embeds_a_batch_through_ollama_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": [0.1, 0.2, 0.3],
            })))
            .mount(&server)
            .await;

        let ctx = testing::context();
        let node = testing::node(
            crate::types::EMBEDDING,
            json!({
                "provider": "ollama",
                "baseUrl": server.uri(),
                "texts": ["first", "second"],
            }),
        );
        let out = EmbeddingHandler::new()
            .execute(&node, JsonMap::new(), &ctx)
            .await
            .unwrap();

        assert_eq!(out.get("count"), Some(&json!(2)));
        assert_eq!(out.get("dimensions"), Some(&json!(3)));
        assert_eq!(
            out.get("embeddings"),
            Some(&json!([[0.1, 0.2, 0.3], [0.1, 0.2, 0.3]]))
        );
    }

    #[tokio::test]
    async fn single_text_is_interpolated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(json!({"prompt": "embed ada"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embedding": [1.0],
            })))
            .mount(&server)
            .await;

        let ctx = testing::context();
        let node = testing::node(
            crate::types::EMBEDDING,
            json!({
                "provider": "ollama",
                "baseUrl": server.uri(),
                "text": "embed ${name}",
            }),
        );
        let out = EmbeddingHandler::new()
            .execute(&node, testing::map(json!({"name": "ada"})), &ctx)
            .await
            .unwrap();
        assert_eq!(out.get("count"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn missing_text_is_a_handler_error() {
        let ctx = testing::context();
        let node = testing::node(
            crate::types::EMBEDDING,
            json!({"provider": "ollama"}),
        );
        let err = EmbeddingHandler::new()
            .execute(&node, JsonMap::new(), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires `text`"));
    }

    #[tokio::test]
    async fn provider_failure_is_external() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let ctx = testing::context();
        let node = testing::node(
            crate::types::EMBEDDING,
            json!({
                "provider": "ollama",
                "baseUrl": server.uri(),
                "text": "x",
            }),
        );
        let err = EmbeddingHandler::new()
            .execute(&node, JsonMap::new(), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "external");
    }
}
