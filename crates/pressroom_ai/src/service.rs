//! High-level generation service.
//!
//! Owns the provider adapters and the failover dispatcher, and exposes the
//! operations the rest of the application calls: chat generation (plain and
//! streaming), image generation, embeddings, and keyed task execution.
//! Adapters are registered based on which API keys the config carries.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use pressroom_core::PressroomConfig;

use crate::agents::{self, AgentProfile, TaskKind, TaskProfile};
use crate::failover::{AttemptFailure, DispatchError, FailoverDispatcher};
use crate::model_registry;
use crate::providers::anthropic::AnthropicProvider;
use crate::providers::nvidia::NvidiaProvider;
use crate::providers::openai::OpenAiProvider;
use crate::providers::{ChatProvider, ProviderError};
use crate::types::{
    ChatMessage, ChatResponse, EmbeddingResponse, GenerationParams, ImageResponse, MessageRole,
    ModelDescriptor, ProviderKind, StreamChunk,
};

// ---------------------------------------------------------------------------
// TaskOutput
// ---------------------------------------------------------------------------

/// Result of [`PressroomService::run_task`], shaped by the task's kind.
#[derive(Debug, Clone)]
pub enum TaskOutput {
    Chat(ChatResponse),
    Image(ImageResponse),
    Embedding(EmbeddingResponse),
}

// ---------------------------------------------------------------------------
// PressroomService
// ---------------------------------------------------------------------------

/// Provider registry plus dispatcher, built once at startup.
pub struct PressroomService {
    dispatcher: FailoverDispatcher,
    /// Kept separately because images and embeddings are OpenAI-only and do
    /// not go through the fallback chain.
    openai: Option<Arc<OpenAiProvider>>,
    default_model: String,
}

impl PressroomService {
    /// Build the service from config, registering one adapter per configured
    /// API key. A service with no keys still constructs; every generation
    /// call then fails with per-candidate "provider not configured" errors.
    pub fn new(config: &PressroomConfig) -> Self {
        let mut providers: HashMap<ProviderKind, Arc<dyn ChatProvider>> = HashMap::new();
        let mut openai: Option<Arc<OpenAiProvider>> = None;

        if let Some(key) = &config.openai_api_key {
            let provider = Arc::new(OpenAiProvider::new(key.clone()));
            openai = Some(provider.clone());
            providers.insert(ProviderKind::OpenAi, provider);
            info!("Registered OpenAI provider");
        }
        if let Some(key) = &config.anthropic_api_key {
            providers.insert(
                ProviderKind::Anthropic,
                Arc::new(AnthropicProvider::new(key.clone())),
            );
            info!("Registered Anthropic provider");
        }
        if let Some(key) = &config.nvidia_api_key {
            providers.insert(
                ProviderKind::Nvidia,
                Arc::new(NvidiaProvider::with_base_url(
                    key.clone(),
                    config.nvidia_base_url.clone(),
                )),
            );
            info!("Registered NVIDIA provider");
        }

        Self {
            dispatcher: FailoverDispatcher::with_default_list(providers),
            openai,
            default_model: config.default_model.clone(),
        }
    }

    /// Build a service over explicit adapters with the default fallback
    /// order. Used by tests to inject stubs; also useful when the caller
    /// manages its own adapters.
    pub fn with_providers(
        providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
        openai: Option<Arc<OpenAiProvider>>,
        default_model: String,
    ) -> Self {
        Self {
            dispatcher: FailoverDispatcher::with_default_list(providers),
            openai,
            default_model,
        }
    }

    /// Like [`Self::with_providers`] but with an explicit fallback order.
    pub fn with_fallback_list(
        fallback_list: Vec<ModelDescriptor>,
        providers: HashMap<ProviderKind, Arc<dyn ChatProvider>>,
        openai: Option<Arc<OpenAiProvider>>,
        default_model: String,
    ) -> Self {
        Self {
            dispatcher: FailoverDispatcher::new(fallback_list, providers),
            openai,
            default_model,
        }
    }

    /// The model used when the caller names none.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Generate a chat completion, failing over across providers.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        params: &GenerationParams,
    ) -> Result<ChatResponse, DispatchError> {
        let model = model.unwrap_or(&self.default_model);
        self.dispatcher.dispatch(messages, model, params).await
    }

    /// Streaming chat completion. Failover applies only until a provider
    /// hands back a live chunk receiver.
    pub async fn stream_generate(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        params: &GenerationParams,
    ) -> Result<mpsc::Receiver<StreamChunk>, DispatchError> {
        let model = model.unwrap_or(&self.default_model);
        self.dispatcher.dispatch_stream(messages, model, params).await
    }

    // -----------------------------------------------------------------------
    // Images and embeddings (OpenAI-only, no fallback chain)
    // -----------------------------------------------------------------------

    /// Generate an image from a prompt. Registry defaults for size and
    /// quality apply when the caller leaves them unset.
    pub async fn generate_image(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ImageResponse, DispatchError> {
        if prompt.trim().is_empty() {
            return Err(DispatchError::InvalidRequest("prompt must not be empty".into()));
        }
        let openai = self.require_openai()?;

        let spec = model_registry::model_spec("dall-e-3")
            .ok_or_else(|| DispatchError::InvalidRequest("image model not registered".into()))?;

        let mut effective = params.clone();
        if effective.size.is_none() {
            effective.size = spec.size.map(String::from);
        }
        if effective.quality.is_none() {
            effective.quality = spec.quality.map(String::from);
        }

        openai
            .generate_image(spec.vendor_id, prompt, &effective)
            .await
            .map_err(|e| Self::single_failure("dall-e-3", ProviderKind::OpenAi, e))
    }

    /// Generate an embedding vector for the given text.
    pub async fn embed(&self, input: &str) -> Result<EmbeddingResponse, DispatchError> {
        if input.trim().is_empty() {
            return Err(DispatchError::InvalidRequest("input must not be empty".into()));
        }
        let openai = self.require_openai()?;

        let spec = model_registry::model_spec("embeddings")
            .ok_or_else(|| DispatchError::InvalidRequest("embedding model not registered".into()))?;

        openai
            .embed(spec.vendor_id, input)
            .await
            .map_err(|e| Self::single_failure("embeddings", ProviderKind::OpenAi, e))
    }

    // -----------------------------------------------------------------------
    // Tasks and catalogs
    // -----------------------------------------------------------------------

    /// Run a keyed task against the given content. Chat tasks prepend the
    /// task's system prompt; image tasks treat content as the prompt;
    /// embedding tasks embed the content verbatim.
    pub async fn run_task(&self, task_key: &str, content: &str) -> Result<TaskOutput, DispatchError> {
        let task = agents::task(task_key)
            .ok_or_else(|| DispatchError::InvalidRequest(format!("unknown task '{task_key}'")))?;

        info!(task = task_key, model = task.model, "Running task");

        match task.kind {
            TaskKind::Chat => {
                let messages = vec![
                    ChatMessage::text(MessageRole::System, task.system_prompt),
                    ChatMessage::text(MessageRole::User, content),
                ];
                let response = self
                    .generate(&messages, Some(task.model), &GenerationParams::default())
                    .await?;
                Ok(TaskOutput::Chat(response))
            }
            TaskKind::Image => {
                let image = self.generate_image(content, &GenerationParams::default()).await?;
                Ok(TaskOutput::Image(image))
            }
            TaskKind::Embedding => {
                let embedding = self.embed(content).await?;
                Ok(TaskOutput::Embedding(embedding))
            }
        }
    }

    /// Look up an agent profile.
    pub fn agent(&self, key: &str) -> Option<&'static AgentProfile> {
        agents::agent(key)
    }

    /// Look up a task profile.
    pub fn task(&self, key: &str) -> Option<&'static TaskProfile> {
        agents::task(key)
    }

    /// Logical model names available for a provider.
    pub fn models_for_provider(&self, provider: ProviderKind) -> Vec<&'static str> {
        model_registry::models_for_provider(provider)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn require_openai(&self) -> Result<&Arc<OpenAiProvider>, DispatchError> {
        self.openai.as_ref().ok_or_else(|| {
            DispatchError::InvalidRequest("OpenAI provider not configured".into())
        })
    }

    fn single_failure(model: &str, provider: ProviderKind, e: ProviderError) -> DispatchError {
        DispatchError::AllProvidersFailed(vec![AttemptFailure {
            model: model.into(),
            provider,
            error: e.to_string(),
        }])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
