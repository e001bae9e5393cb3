//! The `httpRequest` handler.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::{interpolate, interpolate_value};
use conflux_handler::{ExecutionContext, NodeHandler, keys};
use conflux_workflow::Node;
use reqwest::Method;
use serde_json::{Value, json};

/// Performs an HTTP request described by the node parameters.
///
/// `url`, header values, query values, and string bodies are interpolated
/// against the input (with credential fallback for `{{name}}`). The
/// response lands in the output as `{status, success, headers, body}`;
/// the body is parsed as JSON when it parses, kept as a string otherwise.
/// A non-2xx status is reported through `success: false`, not raised —
/// branching on status is a workflow concern.
pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    /// Create the handler with a shared client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    fn node_type(&self) -> &str {
        crate::types::HTTP_REQUEST
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;
        // Opted into workflow settings: request templates routinely
        // reference shared base URLs and the like.
        let data = ctx.interpolation_data(&input, true);

        let url = value::str_opt(params, "url")
            .ok_or_else(|| EngineError::handler("httpRequest requires a `url`"))?;
        let url = interpolate(&url, &data, Some(ctx));

        let method_name = value::str_or(params, "method", "GET").to_uppercase();
        let method = Method::from_str(&method_name)
            .map_err(|_| EngineError::handler(format!("invalid HTTP method `{method_name}`")))?;

        let timeout_ms = value::u64_or(
            params,
            "timeoutMs",
            ctx.settings().get_u64(keys::HTTP_READ_TIMEOUT_MS, 30_000),
        );

        let mut request = self
            .client
            .request(method, &url)
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(headers) = value::object(params, "headers") {
            for (name, raw) in headers {
                request = request.header(
                    name.as_str(),
                    interpolate(&value::render(raw), &data, Some(ctx)),
                );
            }
        }

        if let Some(query) = value::object(params, "queryParams") {
            let pairs: Vec<(String, String)> = query
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        interpolate(&value::render(v), &data, Some(ctx)),
                    )
                })
                .collect();
            request = request.query(&pairs);
        }

        match params.get("body") {
            Some(Value::String(text)) => {
                request = request.body(interpolate(text, &data, Some(ctx)));
            }
            Some(body) => {
                request = request.json(&interpolate_value(body, &data, Some(ctx)));
            }
            None => {}
        }

        let response = tokio::select! {
            () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
            result = request.send() => result.map_err(|e| {
                if e.is_timeout() {
                    EngineError::timeout(format!("httpRequest {url}"), timeout_ms)
                } else {
                    EngineError::handler(format!("request to {url} failed: {e}"))
                }
            })?,
        };

        let status = response.status();
        let mut headers = JsonMap::new();
        for (name, header_value) in response.headers() {
            headers.insert(
                name.to_string(),
                json!(header_value.to_str().unwrap_or_default()),
            );
        }

        let text = tokio::select! {
            () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
            result = response.text() => result.map_err(|e| {
                EngineError::handler(format!("reading response from {url} failed: {e}"))
            })?,
        };
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        let mut output = input;
        output.insert("status".into(), json!(status.as_u16()));
        output.insert("success".into(), json!(status.is_success()));
        output.insert("headers".into(), Value::Object(headers));
        output.insert("body".into(), body);
        Ok(output)
    }
}
