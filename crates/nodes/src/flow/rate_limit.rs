//! The `rate_limit` handler and its process-wide bucket registry.

use std::collections::VecDeque;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conflux_core::{EngineError, JsonMap, value};
use conflux_handler::{ExecutionContext, NodeHandler};
use conflux_workflow::Node;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::ops::run_operations;

/// Buckets are shared across every execution in the process, keyed by
/// `bucketId`. Each bucket has its own async mutex so contention on one id
/// never serialises the others; the first node to use an id fixes the
/// bucket's strategy and parameters.
static BUCKETS: LazyLock<DashMap<String, Arc<Mutex<Bucket>>>> = LazyLock::new(DashMap::new);

enum Bucket {
    Token(TokenBucket),
    Window(SlidingWindow),
}

/// Continuous-refill token bucket.
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    tokens_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(tokens_per_second: f64, max_tokens: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            tokens_per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.tokens_per_second).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_acquire(&mut self, requested: f64) -> bool {
        self.refill();
        if self.tokens >= requested {
            self.tokens -= requested;
            true
        } else {
            false
        }
    }

    /// How long until `requested` tokens will have accrued.
    fn wait_hint(&self, requested: f64) -> Duration {
        let missing = (requested - self.tokens).max(0.0);
        if self.tokens_per_second <= 0.0 {
            Duration::from_secs(3600)
        } else {
            Duration::from_secs_f64(missing / self.tokens_per_second)
        }
    }

    fn remaining(&self) -> f64 {
        self.tokens
    }
}

/// Sliding window of grant timestamps.
struct SlidingWindow {
    grants: VecDeque<Instant>,
    window: Duration,
    max_requests: usize,
}

impl SlidingWindow {
    fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            grants: VecDeque::new(),
            window,
            max_requests,
        }
    }

    fn evict(&mut self) {
        let now = Instant::now();
        while let Some(&oldest) = self.grants.front() {
            if now.duration_since(oldest) > self.window {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    fn try_acquire(&mut self) -> bool {
        self.evict();
        if self.grants.len() < self.max_requests {
            self.grants.push_back(Instant::now());
            true
        } else {
            false
        }
    }

    /// Time until the oldest retained grant ages out.
    fn wait_hint(&self) -> Duration {
        match self.grants.front() {
            Some(&oldest) => {
                let age = Instant::now().duration_since(oldest);
                self.window.saturating_sub(age)
            }
            None => Duration::ZERO,
        }
    }

    fn in_window(&self) -> usize {
        self.grants.len()
    }
}

/// Gates the embedded `operations` body behind a shared rate limit.
///
/// `token_bucket` refills continuously at `tokensPerSecond` up to
/// `maxTokens`; `sliding_window` admits at most `maxRequestsPerWindow`
/// grants per `windowSizeMs`. With `waitForTokens=false` a denied acquire
/// returns `{success: false, throttled: true}` without running the body;
/// with `waitForTokens=true` the handler sleeps and retries until
/// `maxWaitMs`, failing `RateLimited` if the deadline passes.
pub struct RateLimitHandler;

#[async_trait]
impl NodeHandler for RateLimitHandler {
    fn node_type(&self) -> &str {
        crate::types::RATE_LIMIT
    }

    async fn execute(
        &self,
        node: &Node,
        input: JsonMap,
        ctx: &ExecutionContext,
    ) -> Result<JsonMap, EngineError> {
        ctx.check_cancelled()?;
        let params = &node.parameters;

        let bucket_id = value::str_or(params, "bucketId", "default");
        let strategy = value::str_or(params, "strategy", "token_bucket");
        let wait_for_tokens = value::bool_or(params, "waitForTokens", true);
        let max_wait_ms = value::u64_or(params, "maxWaitMs", 60_000);
        let tokens_per_request = value::f64_or(params, "tokensPerRequest", 1.0).max(0.0);
        let operations: Vec<Value> = value::array(params, "operations")
            .cloned()
            .unwrap_or_default();

        let bucket = BUCKETS
            .entry(bucket_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(if strategy == "sliding_window" {
                    Bucket::Window(SlidingWindow::new(
                        Duration::from_millis(value::u64_or(params, "windowSizeMs", 1_000)),
                        value::i64_or(params, "maxRequestsPerWindow", 10).max(1) as usize,
                    ))
                } else {
                    Bucket::Token(TokenBucket::new(
                        value::f64_or(params, "tokensPerSecond", 10.0).max(0.0),
                        value::f64_or(params, "maxTokens", 100.0).max(0.0),
                    ))
                }))
            })
            .clone();

        let wait_started = Instant::now();
        let deadline = wait_started + Duration::from_millis(max_wait_ms);
        let (acquired, stats) = loop {
            let (ok, stats, hint) = {
                let mut bucket = bucket.lock().await;
                match &mut *bucket {
                    Bucket::Token(tb) => {
                        let ok = tb.try_acquire(tokens_per_request);
                        let hint = tb.wait_hint(tokens_per_request);
                        (ok, ("tokensRemaining", json!(tb.remaining())), hint)
                    }
                    Bucket::Window(sw) => {
                        let ok = sw.try_acquire();
                        let hint = sw.wait_hint();
                        (ok, ("requestsInWindow", json!(sw.in_window())), hint)
                    }
                }
            };

            if ok {
                break (true, stats);
            }
            if !wait_for_tokens {
                break (false, stats);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break (false, stats);
            }
            let nap = hint.max(Duration::from_millis(1)).min(remaining);
            tokio::select! {
                () = ctx.cancellation.cancelled() => return Err(EngineError::Cancelled),
                () = tokio::time::sleep(nap) => {}
            }
        };

        let waited_ms = wait_started.elapsed().as_millis() as u64;

        if !acquired {
            if wait_for_tokens {
                return Err(EngineError::RateLimited {
                    bucket: bucket_id,
                    waited_ms,
                });
            }
            let mut output = input;
            output.insert("bucketId".into(), json!(bucket_id));
            output.insert("strategy".into(), json!(strategy));
            output.insert("waitedMs".into(), json!(waited_ms));
            output.insert("throttled".into(), json!(true));
            output.insert(stats.0.into(), stats.1);
            output.insert("success".into(), json!(false));
            return Ok(output);
        }

        let mut output = run_operations(&operations, input, ctx).await?;
        output.insert("bucketId".into(), json!(bucket_id));
        output.insert("strategy".into(), json!(strategy));
        output.insert("waitedMs".into(), json!(waited_ms));
        output.insert("throttled".into(), json!(false));
        output.insert(stats.0.into(), stats.1);
        output.insert("success".into(), json!(true));
        Ok(output)
    }
}
