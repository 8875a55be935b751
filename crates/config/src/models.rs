//! Per-field model configuration
//!
//! One `FieldModelConfig` per model task (intent, category, entities), plus
//! the confidence assigned to rule-based fallback values. Read-only for the
//! lifetime of a parse.

use serde::{Deserialize, Serialize};

use dompet_core::ModelTask;

use crate::constants::models as defaults;
use crate::ConfigError;

/// Which backend serves a model task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Weighted keyword model loaded from a local JSON file
    #[default]
    Lexicon,
    /// Remote inference service
    Http,
    /// Always unavailable; the field is fallback-only
    Disabled,
}

/// Device preference forwarded to backends that care
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

/// Model settings for a single task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldModelConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Identifier reported in logs and health output
    #[serde(default)]
    pub model_id: Option<String>,

    /// Weights file for the lexicon backend
    #[serde(default)]
    pub path: Option<String>,

    /// Base URL for the http backend
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub device: Device,

    /// Minimum confidence for the model value to be accepted
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Inference budget per call
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries on transient http failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_threshold() -> f32 {
    defaults::DEFAULT_THRESHOLD
}

fn default_timeout_ms() -> u64 {
    defaults::DEFAULT_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    defaults::DEFAULT_MAX_RETRIES
}

fn default_fallback_confidence() -> f32 {
    defaults::FALLBACK_CONFIDENCE
}

impl Default for FieldModelConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model_id: None,
            path: None,
            endpoint: None,
            device: Device::default(),
            threshold: default_threshold(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl FieldModelConfig {
    /// Lexicon model read from `path`
    pub fn lexicon(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Remote model served at `endpoint`
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Http,
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    pub fn disabled() -> Self {
        Self {
            backend: BackendKind::Disabled,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    /// Identifier for logs, derived from the backend when unset
    pub fn display_id(&self, task: ModelTask) -> String {
        if let Some(id) = &self.model_id {
            return id.clone();
        }
        match self.backend {
            BackendKind::Lexicon => self
                .path
                .clone()
                .unwrap_or_else(|| format!("{}-lexicon", task)),
            BackendKind::Http => format!("{}-http", task),
            BackendKind::Disabled => format!("{}-disabled", task),
        }
    }

    fn validate(&self, task: ModelTask) -> Result<(), ConfigError> {
        let field = |name: &str| format!("models.{}.{}", task, name);

        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidValue {
                field: field("threshold"),
                message: format!("Must be between 0.0 and 1.0, got {}", self.threshold),
            });
        }

        if self.timeout_ms == 0 || self.timeout_ms > defaults::MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: field("timeout_ms"),
                message: format!(
                    "Must be between 1 and {}ms, got {}",
                    defaults::MAX_TIMEOUT_MS,
                    self.timeout_ms
                ),
            });
        }

        match self.backend {
            BackendKind::Lexicon if self.path.as_deref().map_or(true, str::is_empty) => {
                Err(ConfigError::MissingField(field("path")))
            },
            BackendKind::Http if self.endpoint.as_deref().map_or(true, str::is_empty) => {
                Err(ConfigError::MissingField(field("endpoint")))
            },
            _ => Ok(()),
        }
    }
}

/// Model configuration for the whole pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_intent")]
    pub intent: FieldModelConfig,

    #[serde(default = "default_category")]
    pub category: FieldModelConfig,

    #[serde(default = "default_entities")]
    pub entities: FieldModelConfig,

    /// Confidence given to values the rule-based parser determined
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f32,
}

fn default_intent() -> FieldModelConfig {
    FieldModelConfig::lexicon(defaults::INTENT_MODEL_PATH)
}

fn default_category() -> FieldModelConfig {
    FieldModelConfig::lexicon(defaults::CATEGORY_MODEL_PATH)
}

fn default_entities() -> FieldModelConfig {
    FieldModelConfig::lexicon(defaults::ENTITIES_MODEL_PATH)
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            intent: default_intent(),
            category: default_category(),
            entities: default_entities(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

impl ModelConfig {
    /// Every task disabled; parsing is purely rule-based
    pub fn fallback_only() -> Self {
        Self {
            intent: FieldModelConfig::disabled(),
            category: FieldModelConfig::disabled(),
            entities: FieldModelConfig::disabled(),
            fallback_confidence: default_fallback_confidence(),
        }
    }

    pub fn field(&self, task: ModelTask) -> &FieldModelConfig {
        match task {
            ModelTask::Intent => &self.intent,
            ModelTask::Category => &self.category,
            ModelTask::Entities => &self.entities,
        }
    }

    pub fn threshold(&self, task: ModelTask) -> f32 {
        self.field(task).threshold
    }

    /// Largest per-adapter timeout
    pub fn max_timeout(&self) -> std::time::Duration {
        ModelTask::ALL
            .iter()
            .map(|t| self.field(*t).timeout())
            .max()
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for task in ModelTask::ALL {
            self.field(task).validate(task)?;
        }

        if !self.fallback_confidence.is_finite()
            || !(0.0..=1.0).contains(&self.fallback_confidence)
        {
            return Err(ConfigError::InvalidValue {
                field: "models.fallback_confidence".to_string(),
                message: format!(
                    "Must be between 0.0 and 1.0, got {}",
                    self.fallback_confidence
                ),
            });
        }

        for task in ModelTask::ALL {
            let threshold = self.threshold(task);
            if self.fallback_confidence >= threshold && self.field(task).backend != BackendKind::Disabled {
                tracing::warn!(
                    task = %task,
                    threshold,
                    fallback_confidence = self.fallback_confidence,
                    "Fallback confidence is not below the model threshold"
                );
            }
        }

        Ok(())
    }
}
