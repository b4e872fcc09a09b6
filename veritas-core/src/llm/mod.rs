//! LLM client abstraction.
//!
//! This module provides a unified interface for working with multiple LLM
//! providers (Anthropic, OpenAI, and optionally Gemini) plus the
//! structured-output gateway (`gateway`) the rest of the pipeline calls
//! through.
//!
//! ## Example
//!
//! ```rust,ignore
//! use veritas_core::llm::{AnthropicClient, ClientConfig, CompletionRequest, ChatMessage};
//!
//! let client = AnthropicClient::new(
//!     ClientConfig::new("your-api-key")
//!         .with_default_model("claude-3-5-sonnet-20241022")
//! );
//!
//! let request = CompletionRequest::new()
//!     .with_message(ChatMessage::user("Hello"));
//!
//! let response = client.complete(request).await?;
//! ```

mod client;
pub mod gateway;
mod types;

pub use gateway::{freeform, select_model, structured, StructuredCall};
pub use client::{
    AnthropicClient, ClientConfig, LLMClient, MultiProviderClient, OpenAIClient, TrackedClient,
};
#[cfg(feature = "gemini")]
pub use client::GoogleClient;
pub use types::{
    CacheControl, ChatMessage, ChatRole, CompletionRequest, CompletionResponse, CostTracker,
    EmbeddingRequest, EmbeddingResponse, ModelCosts, ModelSpec, ModelTier, Provider, StopReason,
    ModelCallTier, TierBreakdown, TierCosts, TokenUsage,
};
