//! Error types for veritas-core.

use thiserror::Error;

/// Result type alias using veritas-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during claim-verification operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport/provider failure talking to an LLM.
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// LLM error (simple variant, used where no provider context is available).
    #[error("LLM error: {0}")]
    Llm(String),

    /// Every layer of the structured-output resilience chain was exhausted
    /// (strict schema, lenient schema, compact retry, free-text salvage).
    #[error("structured output resilience exhausted for task {task}: {message}")]
    StructuredOutput { task: String, message: String },

    /// A value failed validation even against the lenient schema.
    #[error("schema validation failed: {0:?}")]
    Schema(Vec<String>),

    /// Fetching a URL's content failed.
    #[error("fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    /// A search-provider call failed.
    #[error("search error: {0}")]
    Search(String),

    /// Timeout during an operation.
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error at load time (hard failure, not recoverable).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration error (generic; retained for compatibility with
    /// constructors that predate `InvalidConfig`).
    #[error("configuration error: {0}")]
    Config(String),

    /// Research/iteration budget exhausted.
    #[error("budget exhausted: {resource}")]
    BudgetExhausted { resource: String },

    /// Persistence (config-snapshot store) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a structured-output resilience error.
    pub fn structured_output(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StructuredOutput {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create a schema validation error.
    pub fn schema(errors: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Schema(errors.into_iter().map(Into::into).collect())
    }

    /// Create a fetch error.
    pub fn fetch(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create an invalid-config error (hard failure at config load time).
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a budget exhausted error.
    pub fn budget_exhausted(resource: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            resource: resource.into(),
        }
    }

    /// True for errors the structured-output resilience chain should treat
    /// as recoverable (worth trying the next layer) rather than fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::LlmApi { .. } | Self::Llm(_) | Self::Timeout { .. } | Self::Schema(_)
        )
    }
}
