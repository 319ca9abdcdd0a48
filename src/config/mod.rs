
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunker::ChunkingConfig;

/// Environment variable consulted when no API key is present in the config file.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const CONFIG_DIR_ENV: &str = "PLAN_GROUNDING_CONFIG_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub batch_size: u32,
    pub cooldown_ms: u64,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            batch_size: 100,
            cooldown_ms: 500,
            api_key: None,
        }
    }
}

/// Where the source documents live and where the persisted index goes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorpusConfig {
    pub handbook_dir: PathBuf,
    pub example_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            handbook_dir: PathBuf::from("corpus/handbooks"),
            example_dir: PathBuf::from("corpus/examples"),
            index_dir: PathBuf::from("index"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid cooldown: {0}ms (must be at most 60000)")]
    InvalidCooldown(u64),
    #[error("Invalid chunk size: {0} tokens (must be between 50 and 2048)")]
    InvalidChunkSize(usize),
    #[error("Overlap ({0} tokens) must be smaller than chunk size ({1} tokens)")]
    OverlapTooLarge(usize, usize),
    #[error("No embedding API key configured; set api_key or the OPENAI_API_KEY environment variable")]
    MissingApiKey,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Resolve the directory the config file lives in.
#[inline]
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|dir| dir.join("plan-grounding"))
        .ok_or(ConfigError::DirectoryError)
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                embedding: EmbeddingConfig::default(),
                chunking: ChunkingConfig::default(),
                corpus: CorpusConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.chunking.validate()?;
        Ok(())
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if self.cooldown_ms > 60_000 {
            return Err(ConfigError::InvalidCooldown(self.cooldown_ms));
        }

        Ok(())
    }

    #[inline]
    pub fn service_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }

    /// The API key from the config file, falling back to the environment.
    /// A missing key is a hard configuration error; ingestion must not start
    /// without one.
    #[inline]
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = &self.api_key {
            if !key.trim().is_empty() {
                return Ok(key.clone());
            }
        }

        match env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ConfigError::MissingApiKey),
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(50..=2048).contains(&self.chunk_size_tokens) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size_tokens));
        }

        // Windows must advance; overlap >= chunk size would never terminate.
        if self.overlap_tokens >= self.chunk_size_tokens {
            return Err(ConfigError::OverlapTooLarge(
                self.overlap_tokens,
                self.chunk_size_tokens,
            ));
        }

        Ok(())
    }
}
