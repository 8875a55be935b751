//! Intent classifier adapter

use std::sync::Arc;
use std::time::Duration;

use dompet_core::{Intent, LabelPrediction, ModelTask, Result};

use super::{with_timeout, Prediction};
use crate::models::ModelRegistry;

/// Maps classifier labels onto `Intent`
#[derive(Debug, Clone)]
pub struct IntentAdapter {
    registry: Arc<ModelRegistry>,
}

impl IntentAdapter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Classify `text` within `timeout`
    pub async fn infer(&self, text: &str, timeout: Duration) -> Result<Prediction<Intent>> {
        if text.trim().is_empty() {
            return Ok(Prediction::empty());
        }

        with_timeout(ModelTask::Intent, timeout, async {
            let model = self.registry.intent().await?;
            let raw = model.classify(text).await?;
            Ok(Self::sanitize(raw))
        })
        .await
    }

    fn sanitize(raw: LabelPrediction) -> Prediction<Intent> {
        let intent = raw.label.as_deref().and_then(Intent::from_label);
        match intent {
            // "unknown" carries no information
            Some(intent) if !intent.is_unknown() => Prediction::new(intent, raw.confidence),
            _ => {
                if let Some(label) = &raw.label {
                    tracing::debug!(label = %label, "Dropping unusable intent label");
                }
                Prediction::empty()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dompet_core::{Error, TextClassifier};

    struct Fixed(Option<&'static str>, f32);

    #[async_trait]
    impl TextClassifier for Fixed {
        async fn classify(&self, _text: &str) -> Result<LabelPrediction> {
            Ok(LabelPrediction {
                label: self.0.map(String::from),
                confidence: self.1,
            })
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    fn adapter(model: Fixed) -> IntentAdapter {
        IntentAdapter::new(Arc::new(ModelRegistry::preloaded(
            Some(Arc::new(model)),
            None,
            None,
        )))
    }

    const LIMIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_maps_label() {
        let p = adapter(Fixed(Some("pemasukan"), 0.81))
            .infer("gaji masuk", LIMIT)
            .await
            .unwrap();
        assert_eq!(p.value, Some(Intent::Income));
        assert_eq!(p.confidence, 0.81);
    }

    #[tokio::test]
    async fn test_unknown_label_is_empty() {
        let p = adapter(Fixed(Some("refund"), 0.99))
            .infer("refund", LIMIT)
            .await
            .unwrap();
        assert!(p.is_empty());
        assert_eq!(p.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_nan_confidence_is_zero() {
        let p = adapter(Fixed(Some("expense"), f32::NAN))
            .infer("bayar", LIMIT)
            .await
            .unwrap();
        assert_eq!(p.value, Some(Intent::Expense));
        assert_eq!(p.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_empty_text_is_empty() {
        let p = adapter(Fixed(Some("expense"), 0.9))
            .infer("   ", LIMIT)
            .await
            .unwrap();
        assert!(p.is_empty());
    }

    #[tokio::test]
    async fn test_missing_model_is_error() {
        let adapter = IntentAdapter::new(Arc::new(ModelRegistry::preloaded(None, None, None)));
        let err = adapter.infer("bayar", LIMIT).await.unwrap_err();
        assert!(matches!(err, Error::ModelLoad { task: ModelTask::Intent, .. }));
    }
}
