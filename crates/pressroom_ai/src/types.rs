use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Represents a chat message in the system.
///
/// The order of messages in a conversation is chronological turn order and
/// is preserved through every adapter translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    /// Create a simple text message.
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

// ---------------------------------------------------------------------------
// Providers & models
// ---------------------------------------------------------------------------

/// The hosted vendors the dispatcher can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Nvidia,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Nvidia => "nvidia",
        };
        f.write_str(s)
    }
}

/// An entry in the fallback list: a logical model name bound to its vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub provider: ProviderKind,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, provider: ProviderKind) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation parameters
// ---------------------------------------------------------------------------

/// Caller-supplied generation options. Unset fields fall back to
/// per-provider/per-model defaults; adapters silently drop options they do
/// not accept (e.g. `top_p` on Anthropic, `size` on chat models).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Image generation only (e.g. "1024x1024").
    #[serde(default)]
    pub size: Option<String>,
    /// Image generation only (e.g. "standard", "hd").
    #[serde(default)]
    pub quality: Option<String>,
}

// ---------------------------------------------------------------------------
// Request / Response
// ---------------------------------------------------------------------------

/// A request to a chat provider. `model` is the vendor model id, already
/// resolved through the model registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

/// Token usage statistics returned by providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Complete response from a chat provider, tagged with which model and
/// vendor actually produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub provider: ProviderKind,
    pub usage: TokenUsage,
}

/// Result of a one-shot image generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image_url: String,
    pub model: String,
    pub provider: ProviderKind,
}

/// Result of a one-shot embedding call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub model: String,
    pub provider: ProviderKind,
}

/// A single chunk from a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub done: bool,
    /// Usage is typically only present on the final chunk.
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roles_serialize_lowercase() {
        let msg = ChatMessage::text(MessageRole::Assistant, "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn provider_kind_display() {
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
        assert_eq!(ProviderKind::Anthropic.to_string(), "anthropic");
        assert_eq!(ProviderKind::Nvidia.to_string(), "nvidia");
    }

    #[test]
    fn generation_params_default_is_all_unset() {
        let params = GenerationParams::default();
        assert!(params.max_tokens.is_none());
        assert!(params.temperature.is_none());
        assert!(params.top_p.is_none());
        assert!(params.size.is_none());
        assert!(params.quality.is_none());
    }

    #[test]
    fn model_descriptor_equality() {
        let a = ModelDescriptor::new("gpt-4", ProviderKind::OpenAi);
        let b = ModelDescriptor::new("gpt-4", ProviderKind::OpenAi);
        assert_eq!(a, b);
        let c = ModelDescriptor::new("gpt-4", ProviderKind::Nvidia);
        assert_ne!(a, c);
    }
}
