
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::retrieval::FailurePolicy;

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "PDF_RAG_CONFIG_DIR";

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_DIR_NAME: &str = "pdf-rag";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Path or name of the poppler `pdftotext` binary
    pub pdftotext_path: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestionConfig {
    /// What to do with the rest of a batch after a document fails to extract
    pub failure_policy: FailurePolicy,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

impl Default for ExtractionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            pdftotext_path: "pdftotext".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid pdftotext path: cannot be empty")]
    InvalidPdftotextPath,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            ollama: OllamaConfig::default(),
            extraction: ExtractionConfig::default(),
            ingestion: IngestionConfig::default(),
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Resolve the configuration directory: `$PDF_RAG_CONFIG_DIR` if set, otherwise the
    /// platform config directory
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
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

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    /// Dimension of the vectors the index accepts
    #[inline]
    pub fn embedding_dimension(&self) -> usize {
        self.ollama.embedding_dimension as usize
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        if self.extraction.pdftotext_path.trim().is_empty() {
            return Err(ConfigError::InvalidPdftotextPath);
        }
        Ok(())
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.ollama_url()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    #[inline]
    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    #[inline]
    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}
