//! Category classifier adapter
//!
//! Labels outside the configured taxonomy are dropped.

use std::sync::Arc;
use std::time::Duration;

use dompet_core::{LabelPrediction, ModelTask, Result};

use super::{with_timeout, Prediction};
use crate::models::ModelRegistry;

#[derive(Debug, Clone)]
pub struct CategoryAdapter {
    registry: Arc<ModelRegistry>,
    taxonomy: Arc<[String]>,
}

impl CategoryAdapter {
    pub fn new(registry: Arc<ModelRegistry>, taxonomy: impl Into<Arc<[String]>>) -> Self {
        Self {
            registry,
            taxonomy: taxonomy.into(),
        }
    }

    pub fn taxonomy(&self) -> &[String] {
        &self.taxonomy
    }

    /// Classify `text` within `timeout`
    pub async fn infer(&self, text: &str, timeout: Duration) -> Result<Prediction<String>> {
        if text.trim().is_empty() {
            return Ok(Prediction::empty());
        }

        with_timeout(ModelTask::Category, timeout, async {
            let model = self.registry.category().await?;
            let raw = model.classify(text).await?;
            Ok(self.sanitize(raw))
        })
        .await
    }

    fn sanitize(&self, raw: LabelPrediction) -> Prediction<String> {
        let Some(label) = raw.label else {
            return Prediction::empty();
        };
        let normalized = label.trim().to_lowercase();
        match self.taxonomy.iter().find(|c| **c == normalized) {
            Some(category) => Prediction::new(category.clone(), raw.confidence),
            None => {
                tracing::debug!(label = %label, "Dropping category outside taxonomy");
                Prediction::empty()
            },
        }
    }
}
