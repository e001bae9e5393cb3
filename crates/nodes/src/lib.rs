#![forbid(unsafe_code)]

//! # Conflux Nodes
//!
//! The built-in node handlers: trigger stubs, the coordination nodes whose
//! semantics make up the engine's hard part (branching, switching, merging,
//! parallel iteration, try/catch, retry, rate limiting, subworkflow
//! invocation), and the action nodes (HTTP, command execution, data
//! shaping, AI providers).
//!
//! [`all_handlers`] returns one instance of everything for registry wiring.

use std::sync::Arc;

use conflux_handler::NodeHandler;

pub mod ai;
pub mod code;
pub mod data;
pub mod flow;
pub mod net;
pub mod ops;
pub mod process;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

/// The node type tags served by this crate.
pub mod types {
    /// Manual trigger.
    pub const MANUAL_TRIGGER: &str = "manualTrigger";
    /// Schedule trigger.
    pub const SCHEDULE_TRIGGER: &str = "scheduleTrigger";
    /// Webhook trigger.
    pub const WEBHOOK_TRIGGER: &str = "webhookTrigger";
    /// HTTP request action.
    pub const HTTP_REQUEST: &str = "httpRequest";
    /// Restricted-expression code action.
    pub const CODE: &str = "code";
    /// Shell command action.
    pub const EXECUTE_COMMAND: &str = "executeCommand";
    /// Conditional branch.
    pub const IF: &str = "if";
    /// Multi-way switch.
    pub const SWITCH: &str = "switch";
    /// Multi-input merge.
    pub const MERGE: &str = "merge";
    /// Iteration / parallel fan-out.
    pub const LOOP: &str = "loop";
    /// Value assignment action.
    pub const SET: &str = "set";
    /// List filter action.
    pub const FILTER: &str = "filter";
    /// List sort action.
    pub const SORT: &str = "sort";
    /// LLM chat action.
    pub const LLM_CHAT: &str = "llmChat";
    /// LLM-backed text classifier.
    pub const TEXT_CLASSIFIER: &str = "textClassifier";
    /// Embedding action.
    pub const EMBEDDING: &str = "embedding";
    /// Retrieval-augmented generation action.
    pub const RAG: &str = "rag";
    /// Subworkflow invocation.
    pub const SUBWORKFLOW: &str = "subworkflow";
    /// Try/catch/finally.
    pub const TRY_CATCH: &str = "tryCatch";
    /// Retry with backoff.
    pub const RETRY: &str = "retry";
    /// Token-bucket / sliding-window rate limit.
    pub const RATE_LIMIT: &str = "rate_limit";
}

/// One instance of every built-in handler, for registry wiring.
#[must_use]
pub fn all_handlers() -> Vec<Arc<dyn NodeHandler>> {
    vec![
        Arc::new(trigger::ManualTrigger),
        Arc::new(trigger::ScheduleTrigger),
        Arc::new(trigger::WebhookTrigger),
        Arc::new(flow::branch::IfHandler),
        Arc::new(flow::switch::SwitchHandler),
        Arc::new(flow::merge::MergeHandler),
        Arc::new(flow::iterate::LoopHandler),
        Arc::new(flow::try_catch::TryCatchHandler),
        Arc::new(flow::retry::RetryHandler),
        Arc::new(flow::rate_limit::RateLimitHandler),
        Arc::new(flow::subworkflow::SubworkflowHandler),
        Arc::new(code::CodeHandler),
        Arc::new(process::ExecuteCommandHandler),
        Arc::new(net::http::HttpRequestHandler::new()),
        Arc::new(data::set::SetHandler),
        Arc::new(data::filter::FilterHandler),
        Arc::new(data::sort::SortHandler),
        Arc::new(ai::chat::LlmChatHandler::new()),
        Arc::new(ai::classify::TextClassifierHandler::new()),
        Arc::new(ai::embedding::EmbeddingHandler::new()),
        Arc::new(ai::rag::RagHandler::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_handlers_cover_the_type_set() {
        let handlers = all_handlers();
        let tags: Vec<&str> = vec![
            types::MANUAL_TRIGGER,
            types::SCHEDULE_TRIGGER,
            types::WEBHOOK_TRIGGER,
            types::HTTP_REQUEST,
            types::CODE,
            types::EXECUTE_COMMAND,
            types::IF,
            types::SWITCH,
            types::MERGE,
            types::LOOP,
            types::SET,
            types::FILTER,
            types::SORT,
            types::LLM_CHAT,
            types::TEXT_CLASSIFIER,
            types::EMBEDDING,
            types::RAG,
            types::SUBWORKFLOW,
            types::TRY_CATCH,
            types::RETRY,
            types::RATE_LIMIT,
        ];
        assert_eq!(handlers.len(), tags.len());
        for tag in tags {
            assert!(
                handlers.iter().any(|h| h.node_type() == tag),
                "missing handler for {tag}"
            );
        }
    }
}
