//! Shared provider plumbing for the AI handlers.
//!
//! Providers are invoked at their canonical endpoints with provider-shaped
//! request bodies; everything a handler needs beyond its own parameters is
//! resolved here: model defaults, base URLs, and api keys (node credential
//! ref first, settings fallback).

use std::time::Duration;

use conflux_core::{EngineError, value};
use conflux_handler::{ExecutionContext, keys};
use conflux_workflow::Node;
use serde_json::{Value, json};

/// A fully resolved provider target.
#[derive(Debug, Clone)]
pub struct Target {
    /// Provider tag: `openai`, `anthropic`, `ollama`, `azure`, `cohere`.
    pub provider: String,
    /// Model (or Azure deployment) name.
    pub model: String,
    /// Endpoint base URL without a trailing slash.
    pub base_url: String,
    /// Bearer/api key, when the provider needs one.
    pub api_key: Option<String>,
}

/// What the target will be used for; drives the model default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Chat completion.
    Chat,
    /// Text embedding.
    Embedding,
}

fn default_model(provider: &str, purpose: Purpose) -> &'static str {
    match (provider, purpose) {
        ("openai", Purpose::Chat) => "gpt-4o-mini",
        ("openai", Purpose::Embedding) => "text-embedding-3-small",
        ("anthropic", Purpose::Chat) => "claude-3-5-haiku-latest",
        ("ollama", Purpose::Chat) => "llama3.1",
        ("ollama", Purpose::Embedding) => "nomic-embed-text",
        ("cohere", Purpose::Embedding) => "embed-english-v3.0",
        _ => "",
    }
}

fn default_base_url(provider: &str) -> &'static str {
    match provider {
        "openai" => "https://api.openai.com",
        "anthropic" => "https://api.anthropic.com",
        "ollama" => "http://localhost:11434",
        "cohere" => "https://api.cohere.com",
        _ => "",
    }
}

/// Resolve provider, model, base URL, and api key for a node.
///
/// The api key comes from the node's credential ref when set (a dangling
/// ref is `CredentialMissing`), else from `ai.<provider>.apiKey` in
/// settings. Ollama runs keyless; every other provider requires a key.
pub fn resolve_target(
    node: &Node,
    ctx: &ExecutionContext,
    purpose: Purpose,
) -> Result<Target, EngineError> {
    let params = &node.parameters;
    let provider = value::str_or(params, "provider", "openai").to_lowercase();

    let model = value::str_opt(params, "model")
        .or_else(|| {
            let configured = ctx.settings().get_str(&keys::ai_model(&provider), "");
            (!configured.is_empty()).then_some(configured)
        })
        .unwrap_or_else(|| default_model(&provider, purpose).to_string());
    if model.is_empty() {
        return Err(EngineError::handler(format!(
            "provider `{provider}` requires an explicit `model`"
        )));
    }

    let base_url = value::str_opt(params, "baseUrl")
        .or_else(|| {
            let configured = ctx.settings().get_str(&keys::ai_base_url(&provider), "");
            (!configured.is_empty()).then_some(configured)
        })
        .unwrap_or_else(|| default_base_url(&provider).to_string());
    if base_url.is_empty() {
        return Err(EngineError::handler(format!(
            "provider `{provider}` requires a `baseUrl`"
        )));
    }
    let base_url = base_url.trim_end_matches('/').to_string();

    let api_key = match &node.credential_ref {
        Some(cred_id) => Some(
            ctx.credentials()
                .decrypted_by_id(cred_id)
                .ok_or_else(|| EngineError::CredentialMissing(cred_id.clone()))?,
        ),
        None => {
            let configured = ctx.settings().get_str(&keys::ai_api_key(&provider), "");
            (!configured.is_empty()).then_some(configured)
        }
    };
    if api_key.is_none() && provider != "ollama" {
        return Err(EngineError::CredentialMissing(keys::ai_api_key(&provider)));
    }

    Ok(Target {
        provider,
        model,
        base_url,
        api_key,
    })
}

/// POST a JSON body, mapping non-success statuses to `ExternalFailure` with
/// a body snippet.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(String, String)],
    body: &Value,
    timeout_ms: u64,
    ctx: &ExecutionContext,
) -> Result<Value, EngineError> {
    let mut request = client
        .post(url)
        .timeout(Duration::from_millis(timeout_ms))
        .json(body);
    for (name, header_value) in headers {
        request = request.header(name.as_str(), header_value.as_str());
    }

    let response = tokio::select! {
        () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
        result = request.send() => result.map_err(|e| {
            if e.is_timeout() {
                EngineError::timeout(format!("POST {url}"), timeout_ms)
            } else {
                EngineError::handler(format!("request to {url} failed: {e}"))
            }
        })?,
    };

    let status = response.status().as_u16();
    let text = tokio::select! {
        () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
        result = response.text() => result.map_err(|e| {
            EngineError::handler(format!("reading response from {url} failed: {e}"))
        })?,
    };

    if !(200..300).contains(&status) {
        return Err(EngineError::External {
            status,
            detail: snippet(&text, 200),
        });
    }

    serde_json::from_str(&text)
        .map_err(|e| EngineError::handler(format!("{url} returned non-JSON: {e}")))
}

fn snippet(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

/// Build the chat request for a target: `(url, headers, body)`.
pub fn chat_request(
    target: &Target,
    messages: &[Value],
    temperature: f64,
    max_tokens: u64,
) -> Result<(String, Vec<(String, String)>, Value), EngineError> {
    let key = target.api_key.clone().unwrap_or_default();
    match target.provider.as_str() {
        "openai" => Ok((
            format!("{}/v1/chat/completions", target.base_url),
            vec![("authorization".into(), format!("Bearer {key}"))],
            json!({
                "model": target.model,
                "messages": messages,
                "temperature": temperature,
                "max_tokens": max_tokens,
            }),
        )),
        "azure" => Ok((
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version=2024-02-15-preview",
                target.base_url, target.model
            ),
            vec![("api-key".into(), key)],
            json!({
                "messages": messages,
                "temperature": temperature,
                "max_tokens": max_tokens,
            }),
        )),
        "anthropic" => {
            // Anthropic wants system prompts out-of-band.
            let (system, rest): (Vec<&Value>, Vec<&Value>) = messages
                .iter()
                .partition(|m| m.get("role") == Some(&json!("system")));
            let mut body = json!({
                "model": target.model,
                "max_tokens": max_tokens,
                "temperature": temperature,
                "messages": rest,
            });
            if let Some(first) = system.first() {
                body["system"] = first.get("content").cloned().unwrap_or(Value::Null);
            }
            Ok((
                format!("{}/v1/messages", target.base_url),
                vec![
                    ("x-api-key".into(), key),
                    ("anthropic-version".into(), "2023-06-01".into()),
                ],
                body,
            ))
        }
        "ollama" => Ok((
            format!("{}/api/chat", target.base_url),
            Vec::new(),
            json!({
                "model": target.model,
                "messages": messages,
                "stream": false,
                "options": {"temperature": temperature},
            }),
        )),
        other => Err(EngineError::handler(format!(
            "unsupported chat provider `{other}`"
        ))),
    }
}

/// Pull the assistant text out of a chat response.
pub fn chat_extract(provider: &str, response: &Value) -> Result<String, EngineError> {
    let text = match provider {
        "openai" | "azure" => response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str),
        "anthropic" => response.pointer("/content/0/text").and_then(Value::as_str),
        "ollama" => response.pointer("/message/content").and_then(Value::as_str),
        _ => None,
    };
    text.map(str::to_string).ok_or_else(|| {
        EngineError::handler(format!("{provider} response had no message content"))
    })
}

/// Run a chat completion end to end.
pub async fn chat(
    client: &reqwest::Client,
    target: &Target,
    messages: &[Value],
    temperature: f64,
    max_tokens: u64,
    timeout_ms: u64,
    ctx: &ExecutionContext,
) -> Result<String, EngineError> {
    let (url, headers, body) = chat_request(target, messages, temperature, max_tokens)?;
    let response = post_json(client, &url, &headers, &body, timeout_ms, ctx).await?;
    chat_extract(&target.provider, &response)
}

/// Embed a batch of texts, one vector per text, in input order.
pub async fn embed(
    client: &reqwest::Client,
    target: &Target,
    texts: &[String],
    timeout_ms: u64,
    ctx: &ExecutionContext,
) -> Result<Vec<Vec<f64>>, EngineError> {
    let key = target.api_key.clone().unwrap_or_default();
    match target.provider.as_str() {
        "openai" => {
            let response = post_json(
                client,
                &format!("{}/v1/embeddings", target.base_url),
                &[("authorization".into(), format!("Bearer {key}"))],
                &json!({"model": target.model, "input": texts}),
                timeout_ms,
                ctx,
            )
            .await?;
            extract_vectors(response.pointer("/data"), "/embedding", texts.len())
        }
        "cohere" => {
            let response = post_json(
                client,
                &format!("{}/v1/embed", target.base_url),
                &[("authorization".into(), format!("Bearer {key}"))],
                &json!({
                    "model": target.model,
                    "texts": texts,
                    "input_type": "search_document",
                }),
                timeout_ms,
                ctx,
            )
            .await?;
            let embeddings = response
                .get("embeddings")
                .and_then(Value::as_array)
                .ok_or_else(|| EngineError::handler("cohere response had no embeddings"))?;
            embeddings.iter().map(as_vector).collect()
        }
        "ollama" => {
            // Ollama embeds one prompt per call.
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                let response = post_json(
                    client,
                    &format!("{}/api/embeddings", target.base_url),
                    &[],
                    &json!({"model": target.model, "prompt": text}),
                    timeout_ms,
                    ctx,
                )
                .await?;
                let vector = response
                    .get("embedding")
                    .ok_or_else(|| EngineError::handler("ollama response had no embedding"))?;
                vectors.push(as_vector(vector)?);
            }
            Ok(vectors)
        }
        other => Err(EngineError::handler(format!(
            "unsupported embedding provider `{other}`"
        ))),
    }
}

fn extract_vectors(
    data: Option<&Value>,
    vector_pointer: &str,
    expected: usize,
) -> Result<Vec<Vec<f64>>, EngineError> {
    let rows = data
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::handler("embedding response had no data"))?;
    if rows.len() != expected {
        return Err(EngineError::handler(format!(
            "embedding response had {} vectors, expected {expected}",
            rows.len()
        )));
    }
    rows.iter()
        .map(|row| {
            row.pointer(vector_pointer)
                .ok_or_else(|| EngineError::handler("embedding row had no vector"))
                .and_then(as_vector)
        })
        .collect()
}

fn as_vector(value: &Value) -> Result<Vec<f64>, EngineError> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_f64).collect())
        .ok_or_else(|| EngineError::handler("embedding vector was not a list"))
}
