//! Prometheus exporter
//!
//! The parser's monitor emits through the `metrics` facade; this installs
//! the global recorder and renders it for `/metrics`.

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::ServerError;

const LATENCY_BUCKETS_MS: &[f64] = &[1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];
const CONFIDENCE_BUCKETS: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Install the global Prometheus recorder
///
/// Fails if a recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("dompet_parse_latency_ms".to_string()),
            LATENCY_BUCKETS_MS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(
                Matcher::Full("dompet_parse_confidence".to_string()),
                CONFIDENCE_BUCKETS,
            )
        })
        .and_then(|b| b.install_recorder())
        .map_err(|e| ServerError::Metrics(e.to_string()))
}
