//! Model adapters
//!
//! Each adapter resolves its model from the `ModelRegistry`, runs it under
//! a timeout and sanitizes the raw output into a typed `Prediction`.
//! Malformed output (empty text, unknown labels, non-finite confidence) is
//! never an error: it becomes an empty prediction with confidence 0.0.
//! Errors are reserved for unavailable models and timeouts.

pub mod category;
pub mod entities;
pub mod intent;

use std::future::Future;
use std::time::Duration;

use dompet_core::{Error, ModelTask, Result};

pub use category::CategoryAdapter;
pub use entities::{EntityAdapter, EntityPrediction};
pub use intent::IntentAdapter;

/// Sanitized model output for one field
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction<T> {
    /// `None` when the model had nothing usable to say
    pub value: Option<T>,
    /// Always finite and within [0, 1]; 0.0 when `value` is `None`
    pub confidence: f32,
}

impl<T> Prediction<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        let confidence = sanitize_confidence(confidence);
        Self {
            value: Some(value),
            confidence,
        }
    }

    pub fn empty() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

impl<T> Default for Prediction<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Clamp to [0, 1]; NaN and infinities become 0.0
pub fn sanitize_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Run `fut` under `limit`, mapping expiry to `InferenceTimeout`
pub(crate) async fn with_timeout<T>(
    task: ModelTask,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(task = %task, timeout_ms = limit.as_millis() as u64, "Inference timed out");
            Err(Error::InferenceTimeout {
                task,
                timeout_ms: limit.as_millis() as u64,
            })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_confidence() {
        assert_eq!(sanitize_confidence(0.42), 0.42);
        assert_eq!(sanitize_confidence(-1.0), 0.0);
        assert_eq!(sanitize_confidence(3.0), 1.0);
        assert_eq!(sanitize_confidence(f32::NAN), 0.0);
        assert_eq!(sanitize_confidence(f32::INFINITY), 0.0);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(())
        };
        let err = with_timeout(ModelTask::Intent, Duration::from_millis(10), slow)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::InferenceTimeout {
                task: ModelTask::Intent,
                timeout_ms: 10
            }
        );
    }
}
