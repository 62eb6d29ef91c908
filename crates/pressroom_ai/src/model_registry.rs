//! Static registry of supported models and their per-model defaults.
//!
//! Logical names ("gpt-4-turbo", "claude-3", ...) are what callers and the
//! fallback list use; each maps to the concrete vendor model ID plus the
//! default generation parameters sent when the caller leaves them unset.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::types::ProviderKind;

// ---------------------------------------------------------------------------
// ModelSpec
// ---------------------------------------------------------------------------

/// Defaults and routing data for one logical model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// The exact model ID sent on the wire.
    pub vendor_id: &'static str,
    pub provider: ProviderKind,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    /// Image size, only set for image models.
    pub size: Option<&'static str>,
    /// Image quality, only set for image models.
    pub quality: Option<&'static str>,
}

impl ModelSpec {
    const fn chat(
        vendor_id: &'static str,
        provider: ProviderKind,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            vendor_id,
            provider,
            max_tokens,
            temperature: Some(temperature),
            top_p: None,
            size: None,
            quality: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Registry table
// ---------------------------------------------------------------------------

static MODELS: Lazy<HashMap<&'static str, ModelSpec>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert(
        "gpt-4-turbo",
        ModelSpec::chat("gpt-4-1106-preview", ProviderKind::OpenAi, 4096, 0.7),
    );
    m.insert("gpt-4", ModelSpec::chat("gpt-4", ProviderKind::OpenAi, 2048, 0.7));
    m.insert(
        "gpt-3.5-turbo",
        ModelSpec::chat("gpt-3.5-turbo", ProviderKind::OpenAi, 1024, 0.7),
    );

    // "claude-3" is the short name used by agent profiles; "claude-3-opus"
    // the one used in the fallback list. Same underlying model.
    m.insert(
        "claude-3",
        ModelSpec::chat("claude-3-opus-20240229", ProviderKind::Anthropic, 4096, 0.7),
    );
    m.insert(
        "claude-3-opus",
        ModelSpec::chat("claude-3-opus-20240229", ProviderKind::Anthropic, 4096, 0.7),
    );
    m.insert(
        "claude-3-sonnet",
        ModelSpec::chat("claude-3-sonnet-20240229", ProviderKind::Anthropic, 4096, 0.7),
    );

    m.insert("nvidia-llama", {
        let mut spec = ModelSpec::chat(
            "nvidia/llama-3.1-nemotron-70b-instruct",
            ProviderKind::Nvidia,
            1024,
            0.7,
        );
        spec.top_p = Some(1.0);
        spec
    });

    m.insert(
        "dall-e-3",
        ModelSpec {
            vendor_id: "dall-e-3",
            provider: ProviderKind::OpenAi,
            max_tokens: 0,
            temperature: None,
            top_p: None,
            size: Some("1024x1024"),
            quality: Some("standard"),
        },
    );

    m.insert(
        "embeddings",
        ModelSpec {
            vendor_id: "text-embedding-ada-002",
            provider: ProviderKind::OpenAi,
            max_tokens: 0,
            temperature: None,
            top_p: None,
            size: None,
            quality: None,
        },
    );

    m
});

/// Look up a model by its logical name.
pub fn model_spec(name: &str) -> Option<&'static ModelSpec> {
    MODELS.get(name)
}

/// All logical model names served by the given provider, sorted by name.
pub fn models_for_provider(provider: ProviderKind) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = MODELS
        .iter()
        .filter(|(_, spec)| spec.provider == provider)
        .map(|(name, _)| *name)
        .collect();
    names.sort_unstable();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
