// Configuration management
// TOML settings for the embedding server, text extraction, and ingestion policy

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    CONFIG_DIR_ENV, Config, ConfigError, ExtractionConfig, IngestionConfig, OllamaConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}
