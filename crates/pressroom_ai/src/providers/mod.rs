//! Provider adapter trait and implementations.
//!
//! Each adapter module exposes a struct that implements [`ChatProvider`]:
//! it translates the generic message list into the vendor's request shape,
//! makes exactly one outbound HTTP call, and extracts plain text from the
//! response. Adapters never retry -- retry and fallback belong to the
//! [`crate::failover::FailoverDispatcher`].

pub mod anthropic;
pub mod nvidia;
pub mod openai;
pub(crate) mod openai_sse;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{ChatRequest, ChatResponse, ProviderKind, StreamChunk};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that any provider may return from a single vendor call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited")]
    RateLimit,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Timeout")]
    Timeout,

    #[error("API error: {0}")]
    Api(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Unified interface for the hosted chat backends.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Which vendor this adapter talks to.
    fn provider_kind(&self) -> ProviderKind;

    /// Human-readable display name.
    fn name(&self) -> &str;

    /// Non-streaming completion. Returns only the fully concatenated text;
    /// whether the transport streams internally is an adapter detail.
    async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Streaming completion -- returns a channel that yields chunks.
    async fn stream_generate(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError>;
}
