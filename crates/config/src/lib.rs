//! Configuration management for the transaction parser
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default.*`, `config/{env}.*`)
//! - Environment variables (`DOMPET__` prefix, `__` separator)
//! - A standalone lexicon YAML file (`lexicon_path`)
//!
//! Malformed configuration fails at startup through `Settings::validate`.

pub mod constants;
pub mod lexicon;
pub mod models;
pub mod settings;

pub use lexicon::{CategoryRule, IntentKeywords, LexiconConfig};
pub use models::{BackendKind, Device, FieldModelConfig, ModelConfig};
pub use settings::{
    load_settings, ObservabilityConfig, RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
