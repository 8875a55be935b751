//! Application State
//!
//! Shared state across all handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;

use dompet_config::Settings;
use dompet_core::ModelTask;
use dompet_parser::{InMemoryMonitor, ModelRegistry, ParserOrchestrator, SlotStatus};

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Settings the server was started with
    pub config: Arc<RwLock<Settings>>,
    pub registry: Arc<ModelRegistry>,
    pub parser: Arc<ParserOrchestrator>,
    pub monitor: Arc<InMemoryMonitor>,
    /// Present when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// State with models loaded from `settings.models`
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(ModelRegistry::from_config(settings.models.clone()));
        Self::with_registry(settings, registry)
    }

    /// State over an existing registry
    pub fn with_registry(settings: Settings, registry: Arc<ModelRegistry>) -> Self {
        let monitor = Arc::new(InMemoryMonitor::new());
        let parser = ParserOrchestrator::new(registry.clone(), settings.models.clone(), monitor.clone())
            .with_lexicon(&settings.lexicon);

        Self {
            config: Arc::new(RwLock::new(settings)),
            registry,
            parser: Arc::new(parser),
            monitor,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Get a read guard to the current configuration
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }

    /// Drop cached models and load failures, then load again
    pub async fn reload_models(&self) -> BTreeMap<ModelTask, SlotStatus> {
        self.registry.reload();
        let status = self.registry.warm_up().await;
        tracing::info!(
            ready = status.values().filter(|s| s.is_ready()).count(),
            total = status.len(),
            "Models reloaded"
        );
        status
    }
}
