use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
const ENV_NVIDIA_KEY: &str = "NVIDIA_API_KEY";

/// Read an environment variable, treating empty values as absent.
fn env_key(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// PressroomConfig
// ---------------------------------------------------------------------------

/// Application configuration stored at `~/.pressroom/config.json`.
///
/// API keys are **never** written to the JSON config file. They are read
/// from the process environment once at load time and are immutable
/// afterwards; the service layer receives them by injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PressroomConfig {
    // API keys -- skipped during JSON serialization, sourced from env.
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub anthropic_api_key: Option<String>,
    #[serde(skip)]
    pub nvidia_api_key: Option<String>,

    /// Base URL for the NVIDIA-hosted OpenAI-compatible endpoint.
    pub nvidia_base_url: String,

    /// Logical model used when the caller does not pick one.
    pub default_model: String,

    // General
    pub log_level: String,
}

impl Default for PressroomConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            nvidia_api_key: None,
            nvidia_base_url: "https://integrate.api.nvidia.com/v1".into(),
            default_model: "gpt-4".into(),
            log_level: "info".into(),
        }
    }
}

impl PressroomConfig {
    /// Returns the base config directory: `~/.pressroom`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".pressroom"))
    }

    /// Returns the config file path: `~/.pressroom/config.json`
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Returns the logs directory: `~/.pressroom/logs/`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    /// Ensures all required directories exist.
    pub fn ensure_dirs() -> Result<()> {
        let dirs = [Self::base_dir()?, Self::logs_dir()?];
        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Loads config from disk (or defaults if missing), then overlays API
    /// keys from the environment. Called once at startup.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from_path(&path);
        config.apply_env_keys();
        Ok(config)
    }

    /// Load the JSON config file at `path`, falling back to defaults when the
    /// file is missing or malformed.
    pub fn load_from_path(path: &PathBuf) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Malformed config at {}: {e} -- using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Overlay API keys from the process environment.
    pub fn apply_env_keys(&mut self) {
        self.openai_api_key = env_key(ENV_OPENAI_KEY);
        self.anthropic_api_key = env_key(ENV_ANTHROPIC_KEY);
        self.nvidia_api_key = env_key(ENV_NVIDIA_KEY);
    }

    /// Saves the non-secret portion of the config to disk.
    pub fn save(&self) -> Result<()> {
        Self::ensure_dirs()?;
        let path = Self::config_path()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// True if at least one provider key is configured.
    pub fn any_provider_configured(&self) -> bool {
        self.openai_api_key.is_some()
            || self.anthropic_api_key.is_some()
            || self.nvidia_api_key.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
