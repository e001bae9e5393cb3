//! The engine-wide error taxonomy.

use thiserror::Error;

/// Errors produced anywhere in the engine, from workflow validation to
/// individual handler failures.
///
/// Each variant carries a stable [`kind`](EngineError::kind) tag. Retry
/// policies match on kinds, and the log pipeline records them, so the tag
/// strings are part of the public contract and must not change casually.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow failed structural validation.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// No workflow exists for the given id or name.
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// A node's type string has no registered handler.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// A handler failed while executing a node.
    #[error("handler failed: {message}")]
    Handler {
        /// Human-readable description of the failure.
        message: String,
        /// Nested cause, when the failure wraps another engine error.
        #[source]
        cause: Option<Box<EngineError>>,
    },

    /// A deadline expired.
    #[error("timeout after {after_ms} ms: {scope}")]
    Timeout {
        /// What timed out (execution, node, wait).
        scope: String,
        /// The deadline that expired, in milliseconds.
        after_ms: u64,
    },

    /// Cancellation was observed.
    #[error("execution cancelled")]
    Cancelled,

    /// A rate-limit acquire did not succeed within its wait budget.
    #[error("rate limited on bucket `{bucket}` after waiting {waited_ms} ms")]
    RateLimited {
        /// The bucket that denied the request.
        bucket: String,
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },

    /// A credential reference could not be resolved.
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// A subworkflow invoked itself or one of its ancestors.
    #[error("recursive subworkflow invocation of `{workflow_id}`")]
    Recursion {
        /// The workflow id that closed the cycle.
        workflow_id: String,
    },

    /// A third-party API returned a non-success status.
    #[error("external service returned {status}: {detail}")]
    External {
        /// HTTP status code.
        status: u16,
        /// Response body snippet.
        detail: String,
    },

    /// A backing store operation failed.
    #[error("store: {0}")]
    Store(String),

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a handler failure with no nested cause.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            cause: None,
        }
    }

    /// Create a handler failure wrapping another engine error.
    pub fn handler_caused_by(message: impl Into<String>, cause: EngineError) -> Self {
        Self::Handler {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Create a timeout error.
    pub fn timeout(scope: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            scope: scope.into(),
            after_ms,
        }
    }

    /// The stable kind tag for this error.
    ///
    /// These are the strings retry policies list in `retryableErrors` /
    /// `nonRetryableErrors` and the log pipeline records as `errorKind`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidWorkflow(_) => "invalidWorkflow",
            Self::WorkflowNotFound(_) => "notFound",
            Self::UnknownNodeType(_) => "unknownNodeType",
            Self::Handler { .. } => "handler",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::RateLimited { .. } => "rateLimited",
            Self::CredentialMissing(_) => "credentialMissing",
            Self::Recursion { .. } => "recursion",
            Self::External { .. } => "external",
            Self::Store(_) => "store",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Returns `true` if this error is a cancellation.
    ///
    /// Cancellation is never absorbed by tryCatch or masked by retry; every
    /// layer checks this before deciding to swallow a failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
