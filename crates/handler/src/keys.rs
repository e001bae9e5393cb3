//! Well-known settings keys.
//!
//! The settings store is schemaless; these constants are the engine's
//! vocabulary so call sites and configuration files agree on spelling.

/// HTTP client connect timeout, milliseconds.
pub const HTTP_CONNECT_TIMEOUT_MS: &str = "http.connectTimeoutMs";
/// HTTP client read timeout, milliseconds.
pub const HTTP_READ_TIMEOUT_MS: &str = "http.readTimeoutMs";

/// Overall execution timeout, seconds. Workflow `settings.timeout`
/// overrides per workflow.
pub const EXECUTION_TIMEOUT_SECONDS: &str = "execution.timeoutSeconds";
/// Upper bound on concurrently running handlers within one execution.
pub const EXECUTION_MAX_PARALLEL: &str = "execution.maxParallel";
/// Minimum level for the execution log pipeline.
pub const EXECUTION_LOG_LEVEL: &str = "execution.logLevel";

/// Default retry attempt count for handlers that retry internally.
pub const RETRY_MAX_ATTEMPTS: &str = "retry.maxAttempts";
/// Default retry delay, milliseconds.
pub const RETRY_DELAY_MS: &str = "retry.delayMs";

/// Default model for an AI provider, e.g. `ai.openai.model`.
#[must_use]
pub fn ai_model(provider: &str) -> String {
    format!("ai.{provider}.model")
}

/// Base URL override for an AI provider, e.g. `ai.ollama.baseUrl`.
#[must_use]
pub fn ai_base_url(provider: &str) -> String {
    format!("ai.{provider}.baseUrl")
}

/// API key for an AI provider, e.g. `ai.anthropic.apiKey`.
#[must_use]
pub fn ai_api_key(provider: &str) -> String {
    format!("ai.{provider}.apiKey")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_keys() {
        assert_eq!(ai_model("openai"), "ai.openai.model");
        assert_eq!(ai_base_url("ollama"), "ai.ollama.baseUrl");
        assert_eq!(ai_api_key("anthropic"), "ai.anthropic.apiKey");
    }
}
