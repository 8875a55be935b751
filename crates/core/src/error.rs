//! Error types shared by the parser crates

use thiserror::Error;

use crate::inference::ModelTask;

/// Result alias used across the core traits
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by model backends and adapters
///
/// None of these cross the orchestrator boundary: every variant is turned
/// into a fallback-derived field plus a warning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Weights missing or corrupt; the field stays fallback-only until reload
    #[error("Model load error ({task}): {message}")]
    ModelLoad { task: ModelTask, message: String },

    #[error("Inference timeout ({task}) after {timeout_ms}ms")]
    InferenceTimeout { task: ModelTask, timeout_ms: u64 },

    /// Backend failure that survived retries
    #[error("Inference error ({task}): {message}")]
    Inference { task: ModelTask, message: String },
}

impl Error {
    pub fn model_load(task: ModelTask, message: impl Into<String>) -> Self {
        Error::ModelLoad {
            task,
            message: message.into(),
        }
    }

    pub fn inference(task: ModelTask, message: impl Into<String>) -> Self {
        Error::Inference {
            task,
            message: message.into(),
        }
    }

    /// Task the error belongs to
    pub fn task(&self) -> ModelTask {
        match self {
            Error::ModelLoad { task, .. }
            | Error::InferenceTimeout { task, .. }
            | Error::Inference { task, .. } => *task,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::InferenceTimeout { .. })
    }

    pub fn is_model_load(&self) -> bool {
        matches!(self, Error::ModelLoad { .. })
    }
}
