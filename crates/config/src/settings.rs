//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::server as server_defaults;
use crate::{ConfigError, LexiconConfig, ModelConfig};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Per-field model configuration
    #[serde(default)]
    pub models: ModelConfig,

    /// Rule-based parser keyword tables
    #[serde(default)]
    pub lexicon: LexiconConfig,

    /// Optional YAML file replacing `lexicon`
    #[serde(default)]
    pub lexicon_path: Option<String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.models.validate()?;
        self.lexicon.validate()?;
        self.validate_server()?;
        self.validate_model_paths()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout cannot be 0".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&server.clarification_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "server.clarification_threshold".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    server.clarification_threshold
                ),
            });
        }

        if self.environment.is_production()
            && server.cors_enabled
            && server.cors_origins.iter().any(|o| o == "*")
        {
            return Err(ConfigError::InvalidValue {
                field: "server.cors_origins".to_string(),
                message: "Wildcard origin not allowed in production".to_string(),
            });
        }

        Ok(())
    }

    /// Lexicon weight files must exist in strict environments
    ///
    /// In development a missing file only leaves that field fallback-only.
    fn validate_model_paths(&self) -> Result<(), ConfigError> {
        for task in dompet_core::ModelTask::ALL {
            let field = self.models.field(task);
            if field.backend != crate::BackendKind::Lexicon {
                continue;
            }
            let Some(path) = field.path.as_deref() else {
                continue;
            };
            if std::path::Path::new(path).exists() {
                continue;
            }
            if self.environment.is_strict() {
                return Err(ConfigError::FileNotFound(format!("models.{}.path: {}", task, path)));
            }
            tracing::warn!(task = %task, path, "Model file not found, field will use fallback");
        }
        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins; empty means same-origin only
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Overall confidence below which responses ask for clarification
    #[serde(default = "default_clarification_threshold")]
    pub clarification_threshold: f32,
}

fn default_host() -> String {
    server_defaults::HOST.to_string()
}

fn default_port() -> u16 {
    server_defaults::PORT
}

fn default_timeout() -> u64 {
    server_defaults::REQUEST_TIMEOUT_SECS
}

fn default_clarification_threshold() -> f32 {
    server_defaults::CLARIFICATION_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            clarification_threshold: default_clarification_threshold(),
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// Install the Prometheus recorder and serve `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Layers `config/default`, `config/{env}` and `DOMPET__*` variables, then
/// replaces the lexicon from `lexicon_path` when set.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DOMPET")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let mut settings: Settings = config.try_deserialize()?;

    if let Some(path) = settings.lexicon_path.clone() {
        settings.lexicon = LexiconConfig::load(&path)?;
    }

    settings.validate()?;

    Ok(settings)
}
