//! Parse outcome records and aggregate stats

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::transaction::{Field, FieldSource, Intent, ParsedTransaction};

/// One completed parse, as reported to a monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub intent: Intent,
    pub success: bool,
    pub used_fallback: bool,
    pub overall_confidence: f32,
    pub field_source: BTreeMap<Field, FieldSource>,
    pub warning_count: usize,
    pub latency_ms: u64,
}

impl ParseOutcome {
    /// Summarize a finished record
    ///
    /// A parse counts as successful when the intent is known and an amount
    /// was found.
    pub fn from_transaction(tx: &ParsedTransaction, latency: Duration) -> Self {
        Self {
            intent: tx.intent(),
            success: !tx.intent().is_unknown() && !tx.amount().is_zero(),
            used_fallback: tx.used_fallback(),
            overall_confidence: tx.overall_confidence(),
            field_source: tx.field_source().clone(),
            warning_count: tx.warnings().len(),
            latency_ms: latency.as_millis() as u64,
        }
    }
}

/// Model vs fallback counts for one field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAcceptance {
    pub model: u64,
    pub fallback: u64,
}

impl FieldAcceptance {
    pub fn record(&mut self, source: FieldSource) {
        match source {
            FieldSource::Model => self.model += 1,
            FieldSource::Fallback => self.fallback += 1,
        }
    }

    /// Share of values accepted from the model
    pub fn model_rate(&self) -> f64 {
        let total = self.model + self.fallback;
        if total == 0 {
            0.0
        } else {
            self.model as f64 / total as f64
        }
    }
}

/// Aggregate parsing stats
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub total_parses: u64,
    pub successful_parses: u64,
    pub failed_parses: u64,
    pub fallback_parses: u64,
    pub success_rate: f64,
    pub fallback_rate: f64,
    pub avg_confidence: f64,
    pub avg_latency_ms: f64,
    pub intent_distribution: BTreeMap<Intent, u64>,
    pub field_acceptance: BTreeMap<Field, FieldAcceptance>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Amount, FieldResult, TransactionBuilder};

    #[test]
    fn test_outcome_success_requires_intent_and_amount() {
        let tx = TransactionBuilder::new("gaji 5 juta")
            .intent(FieldResult::model(Intent::Income, 0.9))
            .category(FieldResult::fallback("pemasukan".to_string(), 0.5))
            .amount(FieldResult::fallback(Amount::from_rupiah(5_000_000), 0.5))
            .build();
        let outcome = ParseOutcome::from_transaction(&tx, Duration::from_millis(12));
        assert!(outcome.success);
        assert!(outcome.used_fallback);
        assert_eq!(outcome.latency_ms, 12);

        let tx = TransactionBuilder::new("gaji")
            .intent(FieldResult::model(Intent::Income, 0.9))
            .build();
        let outcome = ParseOutcome::from_transaction(&tx, Duration::ZERO);
        assert!(!outcome.success);
    }

    #[test]
    fn test_field_acceptance_rate() {
        let mut acc = FieldAcceptance::default();
        assert_eq!(acc.model_rate(), 0.0);
        acc.record(FieldSource::Model);
        acc.record(FieldSource::Model);
        acc.record(FieldSource::Fallback);
        assert!((acc.model_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}
