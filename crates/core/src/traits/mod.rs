//! Core traits for model backends and monitoring
//!
//! - `TextClassifier` - single-label classification (intent, category)
//! - `EntityModel` - typed span extraction (amount, merchant, dates)
//! - `ParseMonitor` - sink for completed parse outcomes

use async_trait::async_trait;

use crate::inference::{EntitySpan, LabelPrediction};
use crate::monitor::{MonitorSnapshot, ParseOutcome};
use crate::Result;

/// Text classification backend
///
/// Implementations:
/// - `LexiconClassifier` - weighted keyword model loaded from a JSON file
/// - `HttpClassifier` - remote inference service
///
/// # Example
///
/// ```ignore
/// let classifier: Arc<dyn TextClassifier> = registry.intent().await?;
/// let prediction = classifier.classify("bayar kos 800 ribu").await?;
/// println!("{:?} ({:.2})", prediction.label, prediction.confidence);
/// ```
#[async_trait]
pub trait TextClassifier: Send + Sync + 'static {
    /// Classify a message
    ///
    /// An empty prediction means the model had no opinion; errors are
    /// reserved for backend failures.
    async fn classify(&self, text: &str) -> Result<LabelPrediction>;

    /// Model identifier for logging
    fn model_id(&self) -> &str;
}

/// Entity extraction backend
#[async_trait]
pub trait EntityModel: Send + Sync + 'static {
    /// Extract typed spans from a message
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>>;

    fn model_id(&self) -> &str;
}

/// Receives one outcome per completed parse
///
/// `record` must not block and must not fail; a broken monitor never
/// affects parsing.
pub trait ParseMonitor: Send + Sync {
    fn record(&self, outcome: &ParseOutcome);

    /// Current aggregate stats
    fn snapshot(&self) -> MonitorSnapshot;
}

/// Monitor that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl ParseMonitor for NoopMonitor {
    fn record(&self, _outcome: &ParseOutcome) {}

    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot::default()
    }
}
