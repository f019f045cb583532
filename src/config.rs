//! Configuration management for the furigana service.
//!
//! Handles loading and parsing of `furigana.toml` configuration file.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Annotation request settings
    #[serde(default)]
    pub annotate: AnnotateConfig,

    /// History persistence settings
    #[serde(default)]
    pub history: HistoryConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "claude", "openai", or "none"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API key (can also be set via environment variable)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name (e.g., "claude-3-5-sonnet-20241022", "gpt-4o")
    #[serde(default)]
    pub model: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Maximum tokens for response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            model: None,
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Annotation request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotateConfig {
    /// Maximum accepted input length, counted in UTF-16 code units
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
        }
    }
}

/// History persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HistoryConfig {
    /// Path to the history JSON file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_provider() -> String {
    "none".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_max_text_length() -> usize {
    10_000
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "furigana")
            .map(|dirs| dirs.config_dir().join("furigana.toml"))
    }

    /// Load configuration from default path or workspace
    pub fn load_from_default() -> Self {
        // Try workspace path first
        let workspace_path = PathBuf::from("furigana.toml");
        if workspace_path.exists() {
            if let Ok(config) = Self::load(&workspace_path) {
                return config;
            }
        }

        // Try user config directory
        if let Some(default_path) = Self::default_path() {
            if let Ok(config) = Self::load(&default_path) {
                return config;
            }
        }

        Config::default()
    }

    /// Get the effective API key (from config or environment)
    pub fn get_api_key(&self) -> Option<String> {
        // First check config file
        if let Some(ref key) = self.llm.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }

        // Then check environment variables
        match self.llm.provider.as_str() {
            "claude" => std::env::var("ANTHROPIC_API_KEY").ok(),
            "openai" => std::env::var("OPENAI_API_KEY").ok(),
            _ => None,
        }
    }

    /// Get the effective model name
    pub fn get_model(&self) -> String {
        if let Some(ref model) = self.llm.model {
            return model.clone();
        }

        match self.llm.provider.as_str() {
            "claude" => "claude-3-5-sonnet-20241022".to_string(),
            // OPENAI_MODEL picks the accuracy/cost tradeoff; gpt-4o-mini is
            // cheapest but may skip some kanji.
            "openai" => std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            _ => String::new(),
        }
    }

    /// Check if LLM integration is enabled
    pub fn is_llm_enabled(&self) -> bool {
        self.llm.provider != "none" && self.get_api_key().is_some()
    }

    /// Resolve the history file location.
    pub fn history_path(&self) -> PathBuf {
        if let Some(ref path) = self.history.path {
            return path.clone();
        }

        directories::ProjectDirs::from("", "", "furigana")
            .map(|dirs| dirs.data_dir().join("furigana-history.json"))
            .unwrap_or_else(|| PathBuf::from("furigana-history.json"))
    }
}
