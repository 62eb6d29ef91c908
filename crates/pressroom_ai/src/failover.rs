//! Failover dispatcher.
//!
//! Holds the fixed, ordered fallback list and walks it sequentially on each
//! call: the requested model (if present in the list) is tried first, then
//! every remaining entry in configured order, stopping at the first success.
//! Provider outages are independent, so a user-facing request should degrade
//! to an alternate vendor rather than surface one vendor's transient failure;
//! the fixed order keeps behavior deterministic and reproducible in tests.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model_registry;
use crate::providers::ChatProvider;
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, GenerationParams, ModelDescriptor, ProviderKind,
    StreamChunk,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One failed candidate attempt, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub model: String,
    pub provider: ProviderKind,
    pub error: String,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.model, self.provider, self.error)
    }
}

/// Errors surfaced to the caller of [`FailoverDispatcher`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Every candidate in the try-order failed. Carries one entry per
    /// candidate tried, in attempt order, so the caller sees every failure.
    #[error("All providers failed: [{}]", format_failures(.0))]
    AllProvidersFailed(Vec<AttemptFailure>),

    /// The request was rejected before any network call was attempted.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn format_failures(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Default fallback list
// ---------------------------------------------------------------------------

/// The fixed vendor try-order used when none is supplied explicitly.
pub fn default_fallback_list() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("gpt-4", ProviderKind::OpenAi),
        ModelDescriptor::new("claude-3-opus", ProviderKind::Anthropic),
        ModelDescriptor::new("claude-3-sonnet", ProviderKind::Anthropic),
        ModelDescriptor::new("nvidia-llama", ProviderKind::Nvidia),
        ModelDescriptor::new("gpt-3.5-turbo", ProviderKind::OpenAi),
    ]
}

// ---------------------------------------------------------------------------
// FailoverDispatcher
// ---------------------------------------------------------------------------

/// Dispatches chat requests across providers with sequential failover.
///
/// Strictly one outbound call at a time: no speculative parallel attempts
/// (which would duplicate billable calls) and no second pass over the list.
/// Adapters are injected, so tests can substitute stubs.
pub struct FailoverDispatcher {
    fallback_list: Vec<ModelDescriptor>,
    providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
}

impl FailoverDispatcher {
    /// Create a dispatcher with an explicit fallback list.
    pub fn new(
        fallback_list: Vec<ModelDescriptor>,
        providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
    ) -> Self {
        Self {
            fallback_list,
            providers,
        }
    }

    /// Create a dispatcher with [`default_fallback_list`].
    pub fn with_default_list(providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>) -> Self {
        Self::new(default_fallback_list(), providers)
    }

    /// The configured fallback list (read-only).
    pub fn fallback_list(&self) -> &[ModelDescriptor] {
        &self.fallback_list
    }

    /// True when a candidate answers to the requested name, either by its
    /// logical name or by the vendor model id it resolves to (callers may
    /// pass either, e.g. "nvidia-llama" or
    /// "nvidia/llama-3.1-nemotron-70b-instruct").
    fn matches_request(candidate: &ModelDescriptor, requested_model: &str) -> bool {
        if candidate.name == requested_model {
            return true;
        }
        let Some(spec) = model_registry::model_spec(&candidate.name) else {
            return false;
        };
        spec.vendor_id == requested_model
            || model_registry::model_spec(requested_model)
                .is_some_and(|r| r.vendor_id == spec.vendor_id)
    }

    /// Build the per-call try-order: entries matching the requested model
    /// first, then all remaining entries in configured order. A requested
    /// name absent from the list simply yields the plain configured order.
    fn try_order(&self, requested_model: &str) -> Vec<&ModelDescriptor> {
        let mut order: Vec<&ModelDescriptor> = self
            .fallback_list
            .iter()
            .filter(|d| Self::matches_request(d, requested_model))
            .collect();
        order.extend(
            self.fallback_list
                .iter()
                .filter(|d| !Self::matches_request(d, requested_model)),
        );
        order
    }

    /// Reject empty conversations and empty message bodies before any
    /// network call is attempted.
    fn validate(messages: &[ChatMessage]) -> Result<(), DispatchError> {
        if messages.is_empty() {
            return Err(DispatchError::InvalidRequest("messages must not be empty".into()));
        }
        if messages.iter().any(|m| m.content.trim().is_empty()) {
            return Err(DispatchError::InvalidRequest(
                "message content must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve a candidate to a concrete [`ChatRequest`], overlaying caller
    /// params on the registry defaults for that model.
    fn build_request(
        candidate: &ModelDescriptor,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<ChatRequest, String> {
        let spec = model_registry::model_spec(&candidate.name)
            .ok_or_else(|| format!("model '{}' not in registry", candidate.name))?;

        Ok(ChatRequest {
            messages: messages.to_vec(),
            model: spec.vendor_id.to_string(),
            max_tokens: params.max_tokens.unwrap_or(spec.max_tokens),
            temperature: params.temperature.or(spec.temperature),
            top_p: params.top_p.or(spec.top_p),
        })
    }

    /// Generate a response, falling back through the configured list until a
    /// provider succeeds. Returns the first successful result unchanged;
    /// intermediate failures are recorded but never exposed on success.
    pub async fn dispatch(
        &self,
        messages: &[ChatMessage],
        requested_model: &str,
        params: &GenerationParams,
    ) -> Result<ChatResponse, DispatchError> {
        Self::validate(messages)?;

        let mut failures: Vec<AttemptFailure> = Vec::new();

        for candidate in self.try_order(requested_model) {
            let request = match Self::build_request(candidate, messages, params) {
                Ok(r) => r,
                Err(e) => {
                    failures.push(AttemptFailure {
                        model: candidate.name.clone(),
                        provider: candidate.provider,
                        error: e,
                    });
                    continue;
                }
            };

            let Some(provider) = self.providers.get(&candidate.provider) else {
                failures.push(AttemptFailure {
                    model: candidate.name.clone(),
                    provider: candidate.provider,
                    error: "provider not configured".into(),
                });
                continue;
            };

            info!(model = %candidate.name, provider = %candidate.provider, "Attempting generation");

            match provider.generate(&request).await {
                Ok(response) => {
                    if !failures.is_empty() {
                        info!(
                            model = %candidate.name,
                            provider = %candidate.provider,
                            failed_attempts = failures.len(),
                            "Fallback succeeded"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(model = %candidate.name, provider = %candidate.provider, "Attempt failed: {e}");
                    failures.push(AttemptFailure {
                        model: candidate.name.clone(),
                        provider: candidate.provider,
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(DispatchError::AllProvidersFailed(failures))
    }

    /// Streaming variant. A candidate counts as successful once it hands
    /// back a live chunk receiver; failover covers connection and
    /// authorization errors, not mid-stream drops (a re-dispatch after
    /// partial output would duplicate text and billable tokens).
    pub async fn dispatch_stream(
        &self,
        messages: &[ChatMessage],
        requested_model: &str,
        params: &GenerationParams,
    ) -> Result<mpsc::Receiver<StreamChunk>, DispatchError> {
        Self::validate(messages)?;

        let mut failures: Vec<AttemptFailure> = Vec::new();

        for candidate in self.try_order(requested_model) {
            let request = match Self::build_request(candidate, messages, params) {
                Ok(r) => r,
                Err(e) => {
                    failures.push(AttemptFailure {
                        model: candidate.name.clone(),
                        provider: candidate.provider,
                        error: e,
                    });
                    continue;
                }
            };

            let Some(provider) = self.providers.get(&candidate.provider) else {
                failures.push(AttemptFailure {
                    model: candidate.name.clone(),
                    provider: candidate.provider,
                    error: "provider not configured".into(),
                });
                continue;
            };

            info!(model = %candidate.name, provider = %candidate.provider, "Attempting stream");

            match provider.stream_generate(&request).await {
                Ok(rx) => return Ok(rx),
                Err(e) => {
                    warn!(model = %candidate.name, provider = %candidate.provider, "Stream attempt failed: {e}");
                    failures.push(AttemptFailure {
                        model: candidate.name.clone(),
                        provider: candidate.provider,
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(DispatchError::AllProvidersFailed(failures))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
