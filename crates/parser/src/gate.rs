//! Confidence gate
//!
//! Compares each model prediction against its task threshold. Fields are
//! gated independently, so a single record may mix model and fallback values.

use std::collections::BTreeMap;

use dompet_config::ModelConfig;
use dompet_core::{Field, FieldResult, ModelTask};

use crate::adapters::Prediction;
use crate::merge::ModelField;

/// Outcome of gating one confidence value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Accept,
    /// Below threshold; the field must come from the fallback
    NeedsFallback { confidence: f32, threshold: f32 },
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceGate {
    thresholds: BTreeMap<ModelTask, f32>,
}

impl ConfidenceGate {
    pub fn from_config(config: &ModelConfig) -> Self {
        let thresholds = ModelTask::ALL
            .iter()
            .map(|task| (*task, config.threshold(*task)))
            .collect();
        Self { thresholds }
    }

    pub fn with_threshold(mut self, task: ModelTask, threshold: f32) -> Self {
        self.thresholds.insert(task, threshold);
        self
    }

    pub fn threshold(&self, task: ModelTask) -> f32 {
        self.thresholds
            .get(&task)
            .copied()
            .unwrap_or(dompet_config::constants::models::DEFAULT_THRESHOLD)
    }

    /// `confidence >= threshold` accepts
    pub fn evaluate(&self, task: ModelTask, confidence: f32) -> GateDecision {
        let threshold = self.threshold(task);
        if confidence.is_finite() && confidence >= threshold {
            GateDecision::Accept
        } else {
            GateDecision::NeedsFallback {
                confidence,
                threshold,
            }
        }
    }

    /// Gate one field's prediction
    pub fn gate<T>(&self, field: Field, prediction: Prediction<T>) -> ModelField<T> {
        let Some(value) = prediction.value else {
            return ModelField::Unavailable("no prediction".to_string());
        };

        match self.evaluate(field.task(), prediction.confidence) {
            GateDecision::Accept => ModelField::Accepted(FieldResult::model(value, prediction.confidence)),
            GateDecision::NeedsFallback {
                confidence,
                threshold,
            } => {
                tracing::debug!(
                    field = %field,
                    confidence,
                    threshold,
                    "Model value below threshold"
                );
                ModelField::Rejected {
                    candidate: FieldResult::model(value, confidence),
                    threshold,
                }
            },
        }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dompet_core::Intent;

    #[test]
    fn test_threshold_boundary_accepts() {
        let gate = ConfidenceGate::default().with_threshold(ModelTask::Intent, 0.7);
        assert!(gate.evaluate(ModelTask::Intent, 0.7).is_accept());
        assert_eq!(
            gate.evaluate(ModelTask::Intent, 0.69),
            GateDecision::NeedsFallback {
                confidence: 0.69,
                threshold: 0.7
            }
        );
    }

    #[test]
    fn test_fields_use_own_threshold() {
        let gate = ConfidenceGate::default()
            .with_threshold(ModelTask::Intent, 0.9)
            .with_threshold(ModelTask::Category, 0.3);

        let intent = gate.gate(Field::Intent, Prediction::new(Intent::Expense, 0.8));
        assert!(matches!(intent, ModelField::Rejected { threshold, .. } if threshold == 0.9));

        let category = gate.gate(Field::Category, Prediction::new("makanan".to_string(), 0.4));
        assert!(matches!(category, ModelField::Accepted(r) if r.value == "makanan"));
    }

    #[test]
    fn test_entities_share_entity_threshold() {
        let gate = ConfidenceGate::default().with_threshold(ModelTask::Entities, 0.5);
        let merchant = gate.gate(Field::Merchant, Prediction::new("Indomaret".to_string(), 0.55));
        assert!(matches!(merchant, ModelField::Accepted(_)));
    }

    #[test]
    fn test_empty_prediction_is_unavailable() {
        let gate = ConfidenceGate::default();
        let field: ModelField<Intent> = gate.gate(Field::Intent, Prediction::empty());
        assert!(matches!(field, ModelField::Unavailable(_)));
    }

    #[test]
    fn test_nan_never_accepted() {
        let gate = ConfidenceGate::default().with_threshold(ModelTask::Intent, 0.0);
        assert!(!gate.evaluate(ModelTask::Intent, f32::NAN).is_accept());
    }
}
