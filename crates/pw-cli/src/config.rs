use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the planner, loaded from
/// `~/.config/planwise/config.toml` when present. Every knob has a default,
/// so the file is optional; the API key may instead come from the
/// environment (`GROQ_API_KEY` or `PLANWISE_API_KEY`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the reasoning backend.
    pub api_key: Option<String>,

    /// Base URL override for an alternative OpenAI-compatible endpoint.
    pub base_url: Option<String>,

    /// Model override.
    pub model: Option<String>,

    /// Sampling temperature passed to the backend.
    pub temperature: Option<f32>,

    /// Maximum attempts per agent call, including the first.
    pub max_attempts: u32,

    /// Per-call timeout in seconds.
    pub request_timeout_secs: u64,

    /// Base retry backoff in milliseconds (doubles per attempt).
    pub retry_backoff_ms: u64,

    /// Subtask count policy.
    pub min_subtasks: usize,
    pub max_subtasks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: None,
            temperature: None,
            max_attempts: 3,
            request_timeout_secs: 60,
            retry_backoff_ms: 500,
            min_subtasks: 1,
            max_subtasks: 20,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;
        Ok(config_dir.join("planwise").join("config.toml"))
    }

    /// Resolve the backend credential: environment first, then the config
    /// file. Never accepted on the command line.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            if !key.is_empty() {
                return Ok(key);
            }
        }
        if let Ok(key) = std::env::var("PLANWISE_API_KEY") {
            if !key.is_empty() {
                return Ok(key);
            }
        }
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        anyhow::bail!(
            "No API key found. Set GROQ_API_KEY in the environment, or create \
             ~/.config/planwise/config.toml with:\n\n\
             api_key = \"gsk-...\"\n"
        )
    }
}
