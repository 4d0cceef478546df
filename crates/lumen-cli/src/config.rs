//! Configuration file support

use lumen_ai::ModelConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for lumen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider API key (alternative to the LUMEN_API_KEY env var)
    pub api_key: Option<String>,
    /// Model to use
    pub model: Option<String>,
    /// Chat-completion endpoint base URL
    pub base_url: Option<String>,
    /// Persona for the standard prompt path
    pub persona: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lumen")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for LUMEN_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("LUMEN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        let dir = path.parent().unwrap();
        fs::create_dir_all(dir)?;

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            api_key: None,
            model: Some("gpt-4o-mini".to_string()),
            base_url: Some("https://api.openai.com/v1".to_string()),
            persona: Some("assistant".to_string()),
        };

        default_config.save()?;
        Ok(path)
    }

    /// Resolve the provider configuration, checking config then env.
    /// Returns `None` when no API key is available.
    pub fn model_config(&self) -> Option<ModelConfig> {
        let api_key = self
            .api_key
            .clone()
            .or_else(|| std::env::var("LUMEN_API_KEY").ok())?;

        let model = self
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Some(ModelConfig::new(api_key, model, base_url))
    }

    /// The persona for standard prompts
    pub fn persona(&self) -> String {
        self.persona
            .clone()
            .unwrap_or_else(|| "assistant".to_string())
    }
}
