//! In-memory parse monitor
//!
//! Aggregates outcomes behind a mutex for `/api/parsing/stats` and mirrors
//! them into `metrics` counters and histograms for Prometheus.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use dompet_core::{
    Field, FieldAcceptance, Intent, MonitorSnapshot, ParseMonitor, ParseOutcome,
};

#[derive(Debug, Default)]
struct Aggregate {
    total: u64,
    successful: u64,
    fallback: u64,
    confidence_sum: f64,
    latency_sum_ms: f64,
    intents: BTreeMap<Intent, u64>,
    fields: BTreeMap<Field, FieldAcceptance>,
}

#[derive(Debug, Default)]
pub struct InMemoryMonitor {
    inner: Mutex<Aggregate>,
}

impl InMemoryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all recorded outcomes
    pub fn reset(&self) {
        *self.inner.lock() = Aggregate::default();
    }

    fn emit(outcome: &ParseOutcome) {
        metrics::counter!("dompet_parses_total", "intent" => outcome.intent.as_str()).increment(1);
        if !outcome.success {
            metrics::counter!("dompet_parse_failures_total").increment(1);
        }
        if outcome.used_fallback {
            metrics::counter!("dompet_parse_fallback_total").increment(1);
        }
        for (field, source) in &outcome.field_source {
            metrics::counter!(
                "dompet_field_source_total",
                "field" => field.as_str(),
                "source" => source.as_str()
            )
            .increment(1);
        }
        metrics::histogram!("dompet_parse_latency_ms").record(outcome.latency_ms as f64);
        metrics::histogram!("dompet_parse_confidence").record(outcome.overall_confidence as f64);
    }
}

impl ParseMonitor for InMemoryMonitor {
    fn record(&self, outcome: &ParseOutcome) {
        {
            let mut agg = self.inner.lock();
            agg.total += 1;
            if outcome.success {
                agg.successful += 1;
            }
            if outcome.used_fallback {
                agg.fallback += 1;
            }
            agg.confidence_sum += outcome.overall_confidence as f64;
            agg.latency_sum_ms += outcome.latency_ms as f64;
            *agg.intents.entry(outcome.intent).or_default() += 1;
            for (field, source) in &outcome.field_source {
                agg.fields.entry(*field).or_default().record(*source);
            }
        }
        Self::emit(outcome);
    }

    fn snapshot(&self) -> MonitorSnapshot {
        let agg = self.inner.lock();
        let ratio = |n: f64| {
            if agg.total == 0 {
                0.0
            } else {
                n / agg.total as f64
            }
        };

        MonitorSnapshot {
            total_parses: agg.total,
            successful_parses: agg.successful,
            failed_parses: agg.total - agg.successful,
            fallback_parses: agg.fallback,
            success_rate: ratio(agg.successful as f64),
            fallback_rate: ratio(agg.fallback as f64),
            avg_confidence: ratio(agg.confidence_sum),
            avg_latency_ms: ratio(agg.latency_sum_ms),
            intent_distribution: agg.intents.clone(),
            field_acceptance: agg.fields.clone(),
        }
    }
}
