//! Configuration management
//!
//! This module handles loading, validation, and management of the Kotoba
//! configuration. Configuration is stored in TOML format at
//! ~/.kotoba/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory and log level
//! - **llm**: OpenAI-compatible backend settings for the classifier fallback
//!   and the stock agents
//! - **classifier**: Keyword → intent fast-path table
//! - **server**: REST API bind address
//!
//! A missing file is created with defaults on first start, so `kotoba serve`
//! works out of the box (given an API key in the environment).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// LLM backend configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Intent keyword fast-path table
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// REST API server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LLM backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the OpenAI-compatible API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Keyword routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Keyword → intent label table checked before the LLM fallback
    #[serde(default = "default_keywords")]
    pub keywords: HashMap<String, String>,
}

/// REST API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kotoba")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_keywords() -> HashMap<String, String> {
    HashMap::from([
        ("lộ trình".to_string(), "planner".to_string()),
        ("kế hoạch học".to_string(), "planner".to_string()),
        ("luyện nói".to_string(), "speaking".to_string()),
        ("chấm bài".to_string(), "reviewer".to_string()),
        ("bài học".to_string(), "learning".to_string()),
    ])
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8642
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Config {
    /// Default config file location: ~/.kotoba/config.toml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kotoba")
            .join("config.toml")
    }

    /// Load the configuration from the default location, writing a default
    /// file first if none exists.
    pub fn load_or_create() -> Result<Self> {
        let path = Self::default_path();

        if !path.exists() {
            let config = Config::default();
            config.save_to_path(&path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            return Ok(config);
        }

        Self::load_from_path(&path)
    }

    /// Load the configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Write the configuration to a path, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, raw)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// Location of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("kotoba.db")
    }
}
