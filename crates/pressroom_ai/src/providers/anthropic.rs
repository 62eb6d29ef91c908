//! Anthropic (Claude) provider.
//!
//! Talks directly to the Anthropic Messages API (`/v1/messages`) with both
//! non-streaming and streaming (SSE) completions. The generic conversation
//! is sent in the API's native multi-turn format: system messages are
//! extracted into the `system` field and user/assistant turns pass through
//! in order, rather than being flattened into one prompt string.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ChatProvider, ProviderError};
use crate::types::{
    ChatRequest, ChatResponse, MessageRole, ProviderKind, StreamChunk, TokenUsage,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const API_BASE: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AnthropicBody {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

// -- Non-streaming response types --

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// -- SSE streaming types --

#[derive(Debug, Deserialize)]
struct SseMessageStart {
    message: Option<SseMessageInfo>,
}

#[derive(Debug, Deserialize)]
struct SseMessageInfo {
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct SseContentBlockDelta {
    delta: Option<SseDelta>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseMessageDelta {
    usage: Option<SseMessageDeltaUsage>,
}

#[derive(Debug, Deserialize)]
struct SseMessageDeltaUsage {
    output_tokens: Option<u32>,
}

// -- Error response --

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: Option<AnthropicErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Anthropic API adapter (Claude models).
pub struct AnthropicProvider {
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { api_key, client }
    }

    /// Convert generic chat messages to Anthropic's format, extracting
    /// system messages into the dedicated `system` field.
    fn build_body(&self, request: &ChatRequest, stream: bool) -> AnthropicBody {
        let system_parts: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        // Conversation turns (non-system only), order preserved.
        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| AnthropicMessage {
                role: match m.role {
                    MessageRole::Assistant => "assistant".into(),
                    _ => "user".into(),
                },
                content: m.content.clone(),
            })
            .collect();

        AnthropicBody {
            model: request.model.clone(),
            max_tokens: if request.max_tokens > 0 {
                request.max_tokens
            } else {
                DEFAULT_MAX_TOKENS
            },
            messages,
            system,
            temperature: request.temperature,
            stream,
        }
    }

    /// Map an HTTP status code (and body) to a ProviderError.
    fn map_status_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
        match status.as_u16() {
            401 | 403 => ProviderError::InvalidKey,
            429 => ProviderError::RateLimit,
            s => ProviderError::Api(format!("Anthropic API error {s}: {}", truncate_error(body))),
        }
    }

    /// Map a reqwest error to a ProviderError.
    fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Network(format!("Connection failed: {e}"))
        } else {
            ProviderError::Network(e.to_string())
        }
    }

    async fn post_messages(
        &self,
        body: &AnthropicBody,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::InvalidKey);
        }

        let resp = self
            .client
            .post(API_BASE)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::map_status_error(status, &text));
        }

        Ok(resp)
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn name(&self) -> &str {
        "Anthropic"
    }

    /// Non-streaming completion via the Anthropic Messages API.
    async fn generate(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = self.build_body(request, false);
        let resp = self
            .post_messages(&body, std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .await?;

        let data: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("Failed to parse response: {e}")))?;

        // Concatenate text blocks.
        let mut content = String::new();
        for block in &data.content {
            if block.block_type == "text" {
                if let Some(ref t) = block.text {
                    content.push_str(t);
                }
            }
        }

        Ok(ChatResponse {
            content,
            model: data.model,
            provider: ProviderKind::Anthropic,
            usage: TokenUsage {
                prompt_tokens: data.usage.input_tokens,
                completion_tokens: data.usage.output_tokens,
                total_tokens: data.usage.input_tokens + data.usage.output_tokens,
            },
        })
    }

    /// Streaming completion via SSE.
    ///
    /// Spawns a background task that reads SSE events from the response body
    /// and sends `StreamChunk`s over an mpsc channel.
    async fn stream_generate(
        &self,
        request: &ChatRequest,
    ) -> Result<mpsc::Receiver<StreamChunk>, ProviderError> {
        let body = self.build_body(request, true);
        // Longer timeout for streaming -- the connection is established
        // quickly but chunks keep arriving for a while.
        let resp = self
            .post_messages(
                &body,
                std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS * 5),
            )
            .await?;

        let (tx, rx) = mpsc::channel::<StreamChunk>(64);

        tokio::spawn(async move {
            use futures::StreamExt;

            let mut stream = resp.bytes_stream();
            let mut buffer = String::new();

            // State tracked across SSE events.
            let mut input_tokens: u32 = 0;
            let mut output_tokens: u32 = 0;
            let mut current_event_type = String::new();
            let mut done_sent = false;

            while let Some(chunk_result) = stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("Anthropic stream read error: {e}");
                        break;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines.
                while let Some(newline_pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=newline_pos).collect();
                    let line = line.trim_end();

                    if line.is_empty() {
                        // Empty line after event+data = end of SSE event block.
                        continue;
                    }

                    if let Some(event_type) = line.strip_prefix("event: ") {
                        current_event_type = event_type.trim().to_string();
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        let data = data.trim();
                        if data == "[DONE]" {
                            continue;
                        }

                        if current_event_type == "message_stop" {
                            done_sent = true;
                        }
                        if let Err(receiver_gone) = process_sse_event(
                            &current_event_type,
                            data,
                            &mut input_tokens,
                            &mut output_tokens,
                            &tx,
                        )
                        .await
                        {
                            if receiver_gone {
                                return;
                            }
                        }

                        current_event_type.clear();
                    }
                }
            }

            // Stream ended without message_stop -- send a final done chunk.
            if !done_sent {
                let _ = tx
                    .send(StreamChunk {
                        content: String::new(),
                        done: true,
                        usage: Some(TokenUsage {
                            prompt_tokens: input_tokens,
                            completion_tokens: output_tokens,
                            total_tokens: input_tokens + output_tokens,
                        }),
                    })
                    .await;
            }
        });

        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// SSE event processing (extracted for testability)
// ---------------------------------------------------------------------------

/// Process a single SSE event. Returns `Err(true)` if the channel receiver
/// has been dropped (stop reading), `Err(false)` for parse errors (keep
/// going).
async fn process_sse_event(
    event_type: &str,
    data: &str,
    input_tokens: &mut u32,
    output_tokens: &mut u32,
    tx: &mpsc::Sender<StreamChunk>,
) -> Result<(), bool> {
    match event_type {
        "message_start" => {
            if let Ok(msg) = serde_json::from_str::<SseMessageStart>(data) {
                if let Some(info) = msg.message {
                    if let Some(usage) = info.usage {
                        *input_tokens = usage.input_tokens;
                    }
                }
            }
        }

        "content_block_delta" => {
            if let Ok(delta_msg) = serde_json::from_str::<SseContentBlockDelta>(data) {
                if let Some(delta) = delta_msg.delta {
                    if delta.delta_type.as_deref() == Some("text_delta") {
                        if let Some(text) = delta.text {
                            let chunk = StreamChunk {
                                content: text,
                                done: false,
                                usage: None,
                            };
                            if tx.send(chunk).await.is_err() {
                                return Err(true);
                            }
                        }
                    }
                }
            }
        }

        "message_delta" => {
            if let Ok(msg_delta) = serde_json::from_str::<SseMessageDelta>(data) {
                if let Some(usage) = msg_delta.usage {
                    if let Some(out) = usage.output_tokens {
                        *output_tokens = out;
                    }
                }
            }
        }

        "message_stop" => {
            let chunk = StreamChunk {
                content: String::new(),
                done: true,
                usage: Some(TokenUsage {
                    prompt_tokens: *input_tokens,
                    completion_tokens: *output_tokens,
                    total_tokens: *input_tokens + *output_tokens,
                }),
            };
            if tx.send(chunk).await.is_err() {
                return Err(true);
            }
        }

        "ping" => {
            // Anthropic sends periodic pings during streaming; ignore.
        }

        "error" => {
            warn!("Anthropic SSE error event: {data}");
        }

        other => {
            debug!("Unknown SSE event type: {other}");
        }
    }

    Ok(())
}

/// Truncate error bodies to avoid bloating logs.
fn truncate_error(body: &str) -> String {
    // Try to extract a useful message from the JSON error body.
    if let Ok(err) = serde_json::from_str::<AnthropicErrorResponse>(body) {
        if let Some(detail) = err.error {
            if let Some(msg) = detail.message {
                return msg;
            }
        }
    }

    if body.len() > 200 {
        // Back off to a char boundary so multibyte bodies cannot panic.
        let mut end = 200;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatMessage;

    fn test_request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::text(MessageRole::User, "Hello")],
            model: "claude-3-opus-20240229".into(),
            max_tokens: 1024,
            temperature: None,
            top_p: None,
        }
    }

    #[test]
    fn build_body_non_streaming() {
        let provider = AnthropicProvider::new("test-key".into());
        let body = provider.build_body(&test_request(), false);

        assert_eq!(body.model, "claude-3-opus-20240229");
        assert_eq!(body.max_tokens, 1024);
        assert!(!body.stream);
        assert!(body.system.is_none());
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.messages[0].content, "Hello");
    }

    #[test]
    fn build_body_streaming() {
        let provider = AnthropicProvider::new("test-key".into());
        let body = provider.build_body(&test_request(), true);
        assert!(body.stream);
    }

    #[test]
    fn system_messages_extracted_not_flattened() {
        let provider = AnthropicProvider::new("test-key".into());
        let req = ChatRequest {
            messages: vec![
                ChatMessage::text(MessageRole::System, "Be concise."),
                ChatMessage::text(MessageRole::User, "Hi"),
                ChatMessage::text(MessageRole::Assistant, "Hello!"),
                ChatMessage::text(MessageRole::User, "Bye"),
            ],
            model: "claude-3-opus-20240229".into(),
            max_tokens: 4096,
            temperature: Some(0.7),
            top_p: None,
        };
        let body = provider.build_body(&req, false);

        // System message goes to the dedicated field; turns keep their roles
        // and order instead of being joined into one prompt string.
        assert_eq!(body.system, Some("Be concise.".into()));
        assert_eq!(body.messages.len(), 3);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.messages[1].role, "assistant");
        assert_eq!(body.messages[2].role, "user");
        assert_eq!(body.messages[2].content, "Bye");
    }

    #[test]
    fn multiple_system_messages_joined() {
        let provider = AnthropicProvider::new("test-key".into());
        let req = ChatRequest {
            messages: vec![
                ChatMessage::text(MessageRole::System, "One."),
                ChatMessage::text(MessageRole::System, "Two."),
                ChatMessage::text(MessageRole::User, "Hi"),
            ],
            model: "claude-3-sonnet-20240229".into(),
            max_tokens: 4096,
            temperature: None,
            top_p: None,
        };
        let body = provider.build_body(&req, false);
        assert_eq!(body.system, Some("One.\n\nTwo.".into()));
        assert_eq!(body.messages.len(), 1);
    }

    #[test]
    fn zero_max_tokens_falls_back_to_default() {
        let provider = AnthropicProvider::new("test-key".into());
        let mut req = test_request();
        req.max_tokens = 0;
        let body = provider.build_body(&req, false);
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn top_p_is_dropped_silently() {
        let provider = AnthropicProvider::new("test-key".into());
        let mut req = test_request();
        req.top_p = Some(0.9);
        let body = provider.build_body(&req, false);
        // The wire body has no top_p field at all.
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("top_p").is_none());
    }

    #[test]
    fn status_error_mapping() {
        use reqwest::StatusCode;
        assert!(matches!(
            AnthropicProvider::map_status_error(StatusCode::UNAUTHORIZED, ""),
            ProviderError::InvalidKey
        ));
        assert!(matches!(
            AnthropicProvider::map_status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimit
        ));
        assert!(matches!(
            AnthropicProvider::map_status_error(StatusCode::BAD_GATEWAY, "upstream"),
            ProviderError::Api(_)
        ));
    }

    #[test]
    fn truncate_error_extracts_json_message() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens required"}}"#;
        assert_eq!(truncate_error(body), "max_tokens required");
    }

    #[test]
    fn truncate_error_caps_raw_body() {
        let body = "x".repeat(500);
        let out = truncate_error(&body);
        assert!(out.len() < 250);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn truncate_error_handles_multibyte_body() {
        // 100 three-byte chars = 300 bytes; byte offset 200 falls mid-char.
        let body = "気".repeat(100);
        let out = truncate_error(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
        // Still valid UTF-8 made of whole characters.
        assert!(out.trim_end_matches("...").chars().all(|c| c == '気'));
    }

    #[test]
    fn parse_non_streaming_response() {
        let json = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-opus-20240229",
            "content": [{"type": "text", "text": "Hi there"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;
        let resp: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.content[0].text.as_deref(), Some("Hi there"));
        assert_eq!(resp.usage.input_tokens, 12);
    }

    #[tokio::test]
    async fn process_sse_events_accumulate_text_and_usage() {
        let (tx, mut rx) = mpsc::channel::<StreamChunk>(16);
        let mut input = 0u32;
        let mut output = 0u32;

        process_sse_event(
            "message_start",
            r#"{"message":{"usage":{"input_tokens":7,"output_tokens":0}}}"#,
            &mut input,
            &mut output,
            &tx,
        )
        .await
        .unwrap();

        process_sse_event(
            "content_block_delta",
            r#"{"delta":{"type":"text_delta","text":"Hi"}}"#,
            &mut input,
            &mut output,
            &tx,
        )
        .await
        .unwrap();

        process_sse_event(
            "message_delta",
            r#"{"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":2}}"#,
            &mut input,
            &mut output,
            &tx,
        )
        .await
        .unwrap();

        process_sse_event("message_stop", "{}", &mut input, &mut output, &tx)
            .await
            .unwrap();
        drop(tx);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.content, "Hi");
        assert!(!first.done);

        let last = rx.recv().await.unwrap();
        assert!(last.done);
        let usage = last.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 9);
    }

    #[tokio::test]
    async fn empty_key_fails_before_network() {
        let provider = AnthropicProvider::new(String::new());
        let err = provider.generate(&test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidKey));
    }
}
