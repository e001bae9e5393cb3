//! The `retry` handler.

use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::ops::run_operations;

/// Re-runs the embedded `operations` body with a configurable backoff until
/// it succeeds or the attempt budget is spent.
///
/// Backoff strategies (attempt index `a` starting at 0, all capped at
/// `maxDelayMs`):
///
/// - `fixed` — `initial`
/// - `linear` — `initial * (1 + a * multiplier)`
/// - `exponential` — `initial * multiplier^a`
/// - `fibonacci` — `initial * fib(a + 1)` with `fib(1) = fib(2) = 1`
///
/// An error is retried when its kind is not listed in `nonRetryableErrors`
/// and `retryableErrors` is either empty or lists it. Exhausted attempts
/// are absorbed into a `success: false` output so the workflow can branch
/// on the outcome; cancellation always aborts immediately.
pub struct RetryHandler;

#[async_trait]
impl NodeHandler for RetryHandler {
    fn node_type(&self) -> &str {
        crate::types::RETRY
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let operations: Vec<Value> = value::array(params, "operations")
            .cloned()
            .unwrap_or_default();
        let max_retries = value::i64_or(params, "maxRetries", 3).max(0) as u32;
        let strategy = value::str_or(params, "backoffStrategy", "exponential");
        let initial_delay_ms = value::f64_or(params, "initialDelayMs", 1_000.0).max(0.0);
        let max_delay_ms = value::f64_or(params, "maxDelayMs", 30_000.0).max(0.0);
        let multiplier = value::f64_or(params, "multiplier", 2.0);
        let jitter = value::bool_or(params, "jitter", true);
        let jitter_factor = value::f64_or(params, "jitterFactor", 0.1).clamp(0.0, 1.0);
        let retryable = kind_list(params, "retryableErrors");
        let non_retryable = kind_list(params, "nonRetryableErrors");

        let started = Instant::now();
        let mut total_delay_ms = 0u64;
        let mut errors: Vec<String> = Vec::new();

        for attempt in 0..=max_retries {
            ctx.check_cancelled()?;

            match run_operations(&operations, input.clone(), ctx).await {
                Ok(out) => {
                    let mut output = JsonMap::new();
                    output.insert("success".into(), json!(true));
                    output.insert("attemptCount".into(), json!(attempt + 1));
                    output.insert("totalDelayMs".into(), json!(total_delay_ms));
                    output.insert(
                        "totalTimeMs".into(),
                        json!(started.elapsed().as_millis() as u64),
                    );
                    output.insert("backoffStrategy".into(), json!(strategy));
                    output.insert("result".into(), Value::Object(out));
                    return Ok(output);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    let kind = err.kind();
                    tracing::warn!(
                        node_id = %node.id,
                        attempt = attempt + 1,
                        max_attempts = max_retries + 1,
                        error = %err,
                        "retry attempt failed"
                    );
                    errors.push(err.to_string());

                    let exhausted = attempt == max_retries;
                    if exhausted || !is_retryable(kind, &retryable, &non_retryable) {
                        break;
                    }

                    let delay = jittered_delay_ms(
                        &strategy,
                        attempt,
                        initial_delay_ms,
                        multiplier,
                        max_delay_ms,
                        jitter,
                        jitter_factor,
                    );
                    if delay > 0.0 {
                        let sleep = Duration::from_millis(delay as u64);
                        tokio::select! {
                            () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
                            () = tokio::time::sleep(sleep) => {}
                        }
                        total_delay_ms += delay as u64;
                    }
                }
            }
        }

        let mut output = JsonMap::new();
        output.insert("success".into(), json!(false));
        output.insert("attemptCount".into(), json!(errors.len()));
        output.insert("totalDelayMs".into(), json!(total_delay_ms));
        output.insert(
            "totalTimeMs".into(),
            json!(started.elapsed().as_millis() as u64),
        );
        output.insert("backoffStrategy".into(), json!(strategy));
        output.insert("lastError".into(), json!(errors.last().cloned()));
        output.insert("errors".into(), json!(errors));
        Ok(output)
    }
}

fn kind_list(params: &JsonMap, key: &str) -> Vec<String> {
    value::array(params, key)
        .map(|items| items.iter().map(value::render).collect())
        .unwrap_or_default()
}

fn is_retryable(kind: &str, retryable: &[String], non_retryable: &[String]) -> bool {
    if non_retryable.iter().any(|k| k == kind) {
        return false;
    }
    retryable.is_empty() || retryable.iter().any(|k| k == kind)
}

/// The un-jittered delay for an attempt, capped at `max_delay_ms`.
fn backoff_delay_ms(
    strategy: &str,
    attempt: u32,
    initial_ms: f64,
    multiplier: f64,
    max_delay_ms: f64,
) -> f64 {
    let raw = match strategy {
        "fixed" => initial_ms,
        "linear" => initial_ms * (1.0 + f64::from(attempt) * multiplier),
        "fibonacci" => initial_ms * fib(u64::from(attempt) + 1) as f64,
        _ => initial_ms * multiplier.powi(attempt as i32),
    };
    raw.min(max_delay_ms)
}

fn jittered_delay_ms(
    strategy: &str,
    attempt: u32,
    initial_ms: f64,
    multiplier: f64,
    max_delay_ms: f64,
    jitter: bool,
    jitter_factor: f64,
) -> f64 {
    let base = backoff_delay_ms(strategy, attempt, initial_ms, multiplier, max_delay_ms);
    if !jitter || base == 0.0 {
        return base;
    }
    use rand::RngExt;
    let perturbation = base * jitter_factor * rand::rng().random_range(-1.0..=1.0);
    (base + perturbation).max(0.0)
}

/// `fib(1) = fib(2) = 1`, saturating for absurd attempt counts.
fn fib(n: u64) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}
