//! The `rag` handler.

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_expression::interpolate;
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};

use super::provider::{self, Purpose};

/// Retrieval-augmented generation over the `documents` parameter.
///
/// The query and every document are embedded, documents are ranked by
/// cosine similarity, the top `topK` become the context for a chat
/// completion. Output: `answer` plus the ranked `sources` with their
/// scores.
pub struct RagHandler {
    client: reqwest::Client,
}

impl RagHandler {
    /// Create the handler with a shared client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for RagHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine similarity; zero vectors score 0.
pub(super) fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Pull document texts out of the `documents` parameter: plain strings or
/// objects with a `text` field.
pub(super) fn document_texts(params: &JsonMap) -> Vec<String> {
    value::array(params, "documents")
        .map(|docs| {
            docs.iter()
                .filter_map(|doc| match doc {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(map) => value::str_opt(map, "text"),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn answer_prompt(query: &str, context: &[&str]) -> String {
    let mut sections = String::new();
    for (i, chunk) in context.iter().enumerate() {
        sections.push_str(&format!("[{}] {chunk}\n", i + 1));
    }
    format!(
        "Answer the question using only the context below. If the context \
         does not contain the answer, say so.\n\nContext:\n{sections}\nQuestion: {query}"
    )
}

#[async_trait]
impl NodeHandler for RagHandler {
    fn node_type(&self) -> &str {
        crate::types::RAG
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

        let query = value::str_opt(params, "query")
            .map(|q| interpolate(&q, &data, Some(ctx)))
            .ok_or_else(|| EngineError::handler("rag requires a `query`"))?;
        let documents = document_texts(params);
        if documents.is_empty() {
            return Err(EngineError::handler("rag requires a non-empty `documents` list"));
        }
        let top_k = value::i64_or(params, "topK", 3).max(1) as usize;
        let timeout_ms = value::u64_or(params, "timeoutMs", 60_000);

        let target = provider::resolve_target(node, ctx, Purpose::Embedding)?;

        // One batch: the query first, then every document.
        let mut to_embed = Vec::with_capacity(documents.len() + 1);
        to_embed.push(query.clone());
        to_embed.extend(documents.iter().cloned());
        let vectors = provider::embed(&self.client, &target, &to_embed, timeout_ms, ctx).await?;
        let (query_vec, doc_vecs) = vectors
            .split_first()
            .ok_or_else(|| EngineError::handler("embedding returned no vectors"))?;

        let mut ranked: Vec<(usize, f64)> = doc_vecs
            .iter()
            .enumerate()
            .map(|(i, vec)| (i, cosine_similarity(query_vec, vec)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);

        let context_chunks: Vec<&str> = ranked
            .iter()
            .map(|(i, _)| documents[*i].as_str())
            .collect();
        let messages = vec![json!({
            "role": "user",
            "content": answer_prompt(&query, &context_chunks),
        })];

        // The chat side may use a different provider/model via chat* params.
        let chat_target = resolve_chat_target(node, ctx)?;
        let answer = provider::chat(
            &self.client,
            &chat_target,
            &messages,
            value::f64_or(params, "temperature", 0.2),
            value::u64_or(params, "maxTokens", 1024),
            timeout_ms,
            ctx,
        )
        .await?;

        let sources: Vec<Value> = ranked
            .iter()
            .map(|(i, score)| json!({"text": documents[*i], "score": score}))
            .collect();

        let mut output = input;
        output.insert("answer".into(), json!(answer));
        output.insert("sources".into(), Value::Array(sources));
        output.insert("provider".into(), json!(chat_target.provider));
        output.insert("model".into(), json!(chat_target.model));
        Ok(output)
    }
}

/// Chat target for the answer step: `chatProvider`/`chatModel` override the
/// embedding-side settings when present.
fn resolve_chat_target(
    node: &Node,
    ctx: &ExecutionContext,
) -> Result<provider::Target, EngineError> {
    let params = &node.parameters;
    let mut chat_node = node.clone();
    if let Some(p) = value::str_opt(params, "chatProvider") {
        chat_node.parameters.insert("provider".into(), json!(p));
    }
    if let Some(m) = value::str_opt(params, "chatModel") {
        chat_node.parameters.insert("model".into(), json!(m));
    } else {
        chat_node.parameters.remove("model");
    }
    provider::resolve_target(&chat_node, ctx, Purpose::Chat)
}
