//! OpenAI provider (GPT chat models, DALL-E images, embeddings).
//!
//! Uses raw `reqwest` against the OpenAI REST API. Chat streaming uses SSE
//! (`stream: true`) and shares the parsing logic in [`super::openai_sse`].
//! Image generation and embeddings are one-shot calls with no streaming and
//! no fallback chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::openai_sse::{self, ChatCompletionResponse};
use super::{ChatProvider, ProviderError};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, EmbeddingResponse, GenerationParams, ImageResponse,
    MessageRole, ProviderKind, StreamChunk,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
const DEFAULT_IMAGE_QUALITY: &str = "standard";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OpenAiChatBody {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// When streaming, ask the API to include usage in the final chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ImageBody {
    model: String,
    prompt: String,
    size: String,
    quality: String,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImageApiResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingBody {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingDatum>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// OpenAI API adapter. Besides chat completions it carries the two
/// single-provider operations: DALL-E image generation and text embeddings.
pub struct OpenAiProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a new OpenAI adapter.
    ///
    /// Pass an empty string for `api_key` to create an adapter that fails
    /// every call with [`ProviderError::InvalidKey`].
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.into())
    }

    /// Create an adapter with a custom base URL (useful for proxies).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key: if api_key.is_empty() { None } else { Some(api_key) },
            base_url,
            client,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Convert generic messages to the OpenAI wire format, preserving order.
    fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    MessageRole::System => "system".into(),
                    MessageRole::User => "user".into(),
                    MessageRole::Assistant => "assistant".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    /// Build the JSON request body.
    fn build_body(&self, request: &ChatRequest, stream: bool) -> OpenAiChatBody {
        OpenAiChatBody {
            model: request.model.clone(),
            messages: Self::convert_messages(&request.messages),
            stream,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            stream_options: if stream {
                Some(StreamOptions { include_usage: true })
            } else {
                None
            },
        }
    }

    /// Get the API key or return an error.
    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::InvalidKey)
    }

    /// Map an HTTP status code (and body) to a ProviderError.
    fn map_status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
        match status.as_u16() {
            401 | 403 => ProviderError::InvalidKey,
            429 => ProviderError::RateLimit,
            408 | 504 => ProviderError::Timeout,
            s => ProviderError::Api(format!("OpenAI API error {s}: {body}")),
        }
    }

    /// Map a reqwest error to a ProviderError.
    fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    /// Send an authenticated POST and map error statuses.
    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        let key = self.require_key()?;
        let url = format!("{}{path}", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, &text));
        }

        Ok(resp)
    }

    // -----------------------------------------------------------------------
    // Single-provider operations (no fallback chain)
    // -----------------------------------------------------------------------

    /// Generate an image via DALL-E and return the hosted URL.
    pub async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ImageResponse, ProviderError> {
        let body = ImageBody {
            model: model.to_string(),
            prompt: prompt.to_string(),
            size: params.size.clone().unwrap_or_else(|| DEFAULT_IMAGE_SIZE.into()),
            quality: params
                .quality
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_QUALITY.into()),
            n: 1,
        };

        let resp = self
            .post_json(
                "/images/generations",
                &body,
                std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS * 2),
            )
            .await?;

        let data: ImageApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("Failed to parse image response: {e}")))?;

        let url = data
            .data
            .first()
            .and_then(|d| d.url.clone())
            .ok_or_else(|| ProviderError::Api("No image URL in response".into()))?;

        Ok(ImageResponse {
            image_url: url,
            model: model.to_string(),
            provider: ProviderKind::OpenAi,
        })
    }

    /// Generate an embedding vector for the given text.
    pub async fn embed(&self, model: &str, input: &str) -> Result<EmbeddingResponse, ProviderError> {
        let body = EmbeddingBody {
            model: model.to_string(),
            input: input.to_string(),
        };

        let resp = self
            .post_json(
                "/embeddings",
                &body,
                std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS),
            )
            .await?;

        let data: EmbeddingApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("Failed to parse embedding response: {e}")))?;

        let embedding = data
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::Api("No embedding in response".into()))?;

        Ok(EmbeddingResponse {
            embedding,
            model: data.model,
            provider: ProviderKind::OpenAi,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    /// Non-streaming chat completion.
    async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_body(request, false);
        let resp = self
            .post_json(
                "/chat/completions",
                &body,
                std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS),
            )
            .await?;

        let data: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("JSON parse error: {e}")))?;

        let choice = data
            .choices
            .first()
            .ok_or_else(|| ProviderError::Api("No choices in OpenAI response".into()))?;

        Ok(ChatResponse {
            content: choice.message.content.clone().unwrap_or_default(),
            model: data.model,
            provider: ProviderKind::OpenAi,
            usage: data.usage.map(|u| u.to_usage()).unwrap_or_default(),
        })
    }

    /// Streaming chat completion via SSE.
    async fn stream_generate(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let body = self.build_body(request, true);
        // The initial connection should happen within the default timeout,
        // but reading chunks can take much longer.
        let resp = self
            .post_json(
                "/chat/completions",
                &body,
                std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS * 5),
            )
            .await?;

        let (tx, rx) = mpsc::channel::<StreamChunk>(64);

        tokio::spawn(async move {
            openai_sse::drive_sse_stream(resp, tx).await;
        });

        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, MessageRole};

    fn sample_request(model: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::text(MessageRole::User, "Hello")],
            model: model.into(),
            max_tokens: 1024,
            temperature: Some(0.7),
            top_p: None,
        }
    }

    #[test]
    fn build_body_non_streaming() {
        let provider = OpenAiProvider::new("sk-test".into());
        let body = provider.build_body(&sample_request("gpt-4"), false);

        assert_eq!(body.model, "gpt-4");
        assert_eq!(body.max_tokens, Some(1024));
        assert_eq!(body.temperature, Some(0.7));
        assert!(!body.stream);
        assert!(body.stream_options.is_none());
    }

    #[test]
    fn build_body_stream_includes_usage_option() {
        let provider = OpenAiProvider::new("sk-test".into());
        let body = provider.build_body(&sample_request("gpt-4"), true);

        assert!(body.stream);
        assert!(body.stream_options.unwrap().include_usage);
    }

    #[test]
    fn convert_messages_preserves_order_and_roles() {
        let messages = vec![
            ChatMessage::text(MessageRole::System, "Be brief."),
            ChatMessage::text(MessageRole::User, "Hi"),
            ChatMessage::text(MessageRole::Assistant, "Hello"),
            ChatMessage::text(MessageRole::User, "Bye"),
        ];
        let wire = OpenAiProvider::convert_messages(&messages);

        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(wire[3].content, "Bye");
    }

    #[test]
    fn request_body_serializes_correctly() {
        let provider = OpenAiProvider::new("sk-test".into());
        let body = provider.build_body(&sample_request("gpt-4"), false);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["max_tokens"], 1024);
        assert_eq!(json["stream"], false);
        // f32 0.7 doesn't round-trip exactly through JSON, so compare approximately.
        let temp = json["temperature"].as_f64().unwrap();
        assert!((temp - 0.7).abs() < 0.001, "temperature was {temp}");
        // stream_options should not appear when not streaming.
        assert!(json.get("stream_options").is_none());
    }

    #[test]
    fn image_body_uses_defaults_when_params_unset() {
        let body = ImageBody {
            model: "dall-e-3".into(),
            prompt: "a lighthouse".into(),
            size: GenerationParams::default()
                .size
                .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.into()),
            quality: GenerationParams::default()
                .quality
                .unwrap_or_else(|| DEFAULT_IMAGE_QUALITY.into()),
            n: 1,
        };
        assert_eq!(body.size, "1024x1024");
        assert_eq!(body.quality, "standard");
    }

    #[test]
    fn parse_image_response() {
        let json = r#"{"created":1700000000,"data":[{"url":"https://img.example/1.png"}]}"#;
        let resp: ImageApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].url.as_deref(), Some("https://img.example/1.png"));
    }

    #[test]
    fn parse_embedding_response() {
        let json = r#"{
            "object": "list",
            "model": "text-embedding-ada-002",
            "data": [{ "object": "embedding", "index": 0, "embedding": [0.1, -0.2, 0.3] }],
            "usage": { "prompt_tokens": 4, "total_tokens": 4 }
        }"#;
        let resp: EmbeddingApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.model, "text-embedding-ada-002");
        assert_eq!(resp.data[0].embedding.len(), 3);
    }

    #[test]
    fn require_key_returns_error_when_missing() {
        let provider = OpenAiProvider::new(String::new());
        assert!(matches!(provider.require_key(), Err(ProviderError::InvalidKey)));
    }

    #[test]
    fn status_error_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            OpenAiProvider::map_status_error(StatusCode::UNAUTHORIZED, ""),
            ProviderError::InvalidKey
        ));
        assert!(matches!(
            OpenAiProvider::map_status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimit
        ));
        assert!(matches!(
            OpenAiProvider::map_status_error(StatusCode::GATEWAY_TIMEOUT, ""),
            ProviderError::Timeout
        ));
        assert!(matches!(
            OpenAiProvider::map_status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ProviderError::Api(_)
        ));
    }

    #[test]
    fn provider_metadata() {
        let provider = OpenAiProvider::new("sk-test".into());
        assert_eq!(provider.provider_kind(), ProviderKind::OpenAi);
        assert_eq!(provider.name(), "OpenAI");
    }
}
