//! Static agent and task catalogs.
//!
//! Agent profiles describe the persona surface (title, description, input
//! placeholder) and the default model each persona uses. Task profiles map a
//! task key to the system prompt prepended to the user's content and the
//! model that task routes to.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

// ---------------------------------------------------------------------------
// Agent profiles
// ---------------------------------------------------------------------------

/// One PR agent persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub title: &'static str,
    pub description: &'static str,
    pub placeholder: &'static str,
    pub default_model: &'static str,
}

static AGENTS: Lazy<BTreeMap<&'static str, AgentProfile>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "content_strategist",
            AgentProfile {
                title: "Content Strategist",
                description: "Content creation and brand voice management",
                placeholder: "What content would you like me to help with?",
                default_model: "gpt-4-turbo",
            },
        ),
        (
            "crisis_manager",
            AgentProfile {
                title: "Crisis Manager",
                description: "Crisis response and risk management",
                placeholder: "Describe the situation that needs addressing...",
                default_model: "gpt-4",
            },
        ),
        (
            "media_relations",
            AgentProfile {
                title: "Media Relations",
                description: "Press releases and media communications",
                placeholder: "What would you like to communicate to the media?",
                default_model: "gpt-4-turbo",
            },
        ),
        (
            "analytics_expert",
            AgentProfile {
                title: "Analytics Expert",
                description: "Content and sentiment analysis",
                placeholder: "What would you like me to analyze?",
                default_model: "claude-3",
            },
        ),
        (
            "visual_creator",
            AgentProfile {
                title: "Visual Creator",
                description: "Visual content generation and guidance",
                placeholder: "Describe the visual content you need...",
                default_model: "dall-e-3",
            },
        ),
    ])
});

/// Look up an agent profile by key.
pub fn agent(key: &str) -> Option<&'static AgentProfile> {
    AGENTS.get(key)
}

/// All agent keys, in stable order.
pub fn agent_keys() -> impl Iterator<Item = &'static str> {
    AGENTS.keys().copied()
}

// ---------------------------------------------------------------------------
// Task profiles
// ---------------------------------------------------------------------------

/// How a task's output is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Chat,
    Image,
    Embedding,
}

/// One routed task: system prompt plus target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProfile {
    pub name: &'static str,
    pub description: &'static str,
    /// System prompt prepended to the user content. Empty for non-chat tasks
    /// that take the content verbatim.
    pub system_prompt: &'static str,
    pub model: &'static str,
    pub kind: TaskKind,
}

static TASKS: Lazy<BTreeMap<&'static str, TaskProfile>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "sentiment_analysis",
            TaskProfile {
                name: "Sentiment Analysis",
                description: "Analyze sentiment and themes in content",
                system_prompt: "Analyze the following content for sentiment and key themes:",
                model: "gpt-4",
                kind: TaskKind::Chat,
            },
        ),
        (
            "content_creation",
            TaskProfile {
                name: "Content Creation",
                description: "Generate PR content and materials",
                system_prompt: "Create PR content for the following context:",
                model: "gpt-4-turbo",
                kind: TaskKind::Chat,
            },
        ),
        (
            "crisis_management",
            TaskProfile {
                name: "Crisis Management",
                description: "Draft crisis response statements",
                system_prompt: "Draft a crisis response statement for the following situation:",
                model: "gpt-4",
                kind: TaskKind::Chat,
            },
        ),
        (
            "visual_content",
            TaskProfile {
                name: "Visual Content",
                description: "Generate PR-related images",
                system_prompt: "Generate a PR campaign image based on:",
                model: "dall-e-3",
                kind: TaskKind::Image,
            },
        ),
        (
            "content_embedding",
            TaskProfile {
                name: "Content Embedding",
                description: "Generate embeddings for content analysis",
                system_prompt: "",
                model: "embeddings",
                kind: TaskKind::Embedding,
            },
        ),
    ])
});

/// Look up a task profile by key.
pub fn task(key: &str) -> Option<&'static TaskProfile> {
    TASKS.get(key)
}

/// All task keys, in stable order.
pub fn task_keys() -> impl Iterator<Item = &'static str> {
    TASKS.keys().copied()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
