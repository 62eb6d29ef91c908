//! NVIDIA-hosted provider (Llama Nemotron models).
//!
//! NVIDIA's `integrate.api.nvidia.com` endpoint speaks the same chat
//! completions API format as OpenAI, so this adapter reuses the shared SSE
//! parsing from [`super::openai_sse`]. The differences are:
//!
//! - Base URL: `https://integrate.api.nvidia.com/v1`
//! - Model IDs use `org/name` format (e.g. `nvidia/llama-3.1-nemotron-70b-instruct`)
//! - `top_p` is part of the accepted parameter set

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use super::openai_sse::{self, ChatCompletionResponse};
use super::{ChatProvider, ProviderError};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, MessageRole, ProviderKind, StreamChunk,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Wire types (serialization only)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct NvidiaChatBody {
    model: String,
    messages: Vec<NvidiaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct NvidiaMessage {
    role: String,
    content: String,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Adapter for the NVIDIA-hosted OpenAI-compatible chat completions API.
pub struct NvidiaProvider {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
}

impl NvidiaProvider {
    /// Create a new NVIDIA adapter against the default integrate endpoint.
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.into())
    }

    /// Create an adapter with a custom base URL.
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

    fn convert_messages(messages: &[ChatMessage]) -> Vec<NvidiaMessage> {
        messages
            .iter()
            .map(|m| NvidiaMessage {
                role: match m.role {
                    MessageRole::System => "system".into(),
                    MessageRole::User => "user".into(),
                    MessageRole::Assistant => "assistant".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> NvidiaChatBody {
        NvidiaChatBody {
            model: request.model.clone(),
            messages: Self::convert_messages(&request.messages),
            stream,
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            stream_options: if stream {
                Some(StreamOptions { include_usage: true })
            } else {
                None
            },
        }
    }

    fn require_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::InvalidKey)
    }

    fn map_status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
        match status.as_u16() {
            401 | 403 => ProviderError::InvalidKey,
            429 => ProviderError::RateLimit,
            408 | 504 => ProviderError::Timeout,
            s => ProviderError::Api(format!("NVIDIA API error {s}: {body}")),
        }
    }

    fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    async fn post_completions(
        &self,
        body: &NvidiaChatBody,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        let key = self.require_key()?;
        let url = format!("{}/chat/completions", self.base_url);

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
}

#[async_trait]
impl ChatProvider for NvidiaProvider {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Nvidia
    }

    fn name(&self) -> &str {
        "NVIDIA"
    }

    /// Non-streaming chat completion.
    async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_body(request, false);
        let resp = self
            .post_completions(&body, std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .await?;

        let data: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("JSON parse error: {e}")))?;

        let choice = data
            .choices
            .first()
            .ok_or_else(|| ProviderError::Api("No choices in NVIDIA response".into()))?;

        Ok(ChatResponse {
            content: choice.message.content.clone().unwrap_or_default(),
            model: data.model,
            provider: ProviderKind::Nvidia,
            usage: data.usage.map(|u| u.to_usage()).unwrap_or_default(),
        })
    }

    /// Streaming chat completion via SSE.
    async fn stream_generate(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let body = self.build_body(request, true);
        let resp = self
            .post_completions(
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
