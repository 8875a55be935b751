//! Raw model outputs, before gating
//!
//! Backends produce these; adapters sanitize them into typed predictions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which model a backend serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTask {
    Intent,
    Category,
    Entities,
}

impl ModelTask {
    pub const ALL: [ModelTask; 3] = [ModelTask::Intent, ModelTask::Category, ModelTask::Entities];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTask::Intent => "intent",
            ModelTask::Category => "category",
            ModelTask::Entities => "entities",
        }
    }
}

impl fmt::Display for ModelTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label + confidence from a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPrediction {
    /// Predicted label, `None` when the model had no opinion
    pub label: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl LabelPrediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: Some(label.into()),
            confidence,
        }
    }

    /// No label, zero confidence
    pub fn empty() -> Self {
        Self {
            label: None,
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none()
    }
}

/// Entity span kinds an extractor may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Amount,
    Merchant,
    DateReference,
    Description,
}

/// A typed span found by an entity model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    #[serde(rename = "type")]
    pub kind: SpanKind,
    /// Surface text (amount spans are normalized by the adapter)
    pub text: String,
    pub confidence: f32,
}

impl EntitySpan {
    pub fn new(kind: SpanKind, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            kind,
            text: text.into(),
            confidence,
        }
    }
}
