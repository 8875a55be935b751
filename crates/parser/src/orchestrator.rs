//! Parser orchestrator
//!
//! Drives one message through
//! `Idle → ModelInference → GateEvaluation → FallbackInvocation → Merge → Done`.
//!
//! The three adapters run as spawned tasks with their own timeouts and are
//! joined against a shared deadline. Dropping a `parse` future aborts any
//! adapter still running. When every adapter fails there is nothing to gate
//! and the orchestrator goes straight to the fallback. No error escapes
//! `parse`: failures become warnings and a degraded record.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use dompet_config::{LexiconConfig, ModelConfig};
use dompet_core::{
    EntityType, Error, Field, ModelTask, NoopMonitor, ParseMonitor, ParseOutcome,
    ParsedTransaction, Result,
};

use crate::adapters::{CategoryAdapter, EntityAdapter, EntityPrediction, IntentAdapter, Prediction};
use crate::fallback::{FallbackParse, RuleBasedParser};
use crate::gate::ConfidenceGate;
use crate::merge::{self, ModelField, ModelFields};
use crate::models::ModelRegistry;

/// Slack on top of the slowest adapter timeout before a task is abandoned
const JOIN_GRACE: Duration = Duration::from_millis(50);

/// Orchestrator states, in visiting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseState {
    Idle,
    ModelInference,
    GateEvaluation,
    FallbackInvocation,
    Merge,
    Done,
}

impl ParseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseState::Idle => "idle",
            ParseState::ModelInference => "model_inference",
            ParseState::GateEvaluation => "gate_evaluation",
            ParseState::FallbackInvocation => "fallback_invocation",
            ParseState::Merge => "merge",
            ParseState::Done => "done",
        }
    }
}

/// Visited states and wall time of one parse
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseTrace {
    pub states: Vec<ParseState>,
    pub latency: Duration,
}

impl ParseTrace {
    pub fn visited(&self, state: ParseState) -> bool {
        self.states.contains(&state)
    }
}

/// Aborts the task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn join<T>(
    task: ModelTask,
    guard: &mut AbortOnDrop<Result<T>>,
    started: Instant,
    budget: Duration,
) -> Result<T> {
    match tokio::time::timeout_at(started + budget, &mut guard.0).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => Err(Error::inference(task, "adapter task panicked")),
        Ok(Err(e)) => Err(Error::inference(task, e.to_string())),
        Err(_) => {
            guard.0.abort();
            Err(Error::InferenceTimeout {
                task,
                timeout_ms: budget.as_millis() as u64,
            })
        },
    }
}

pub struct ParserOrchestrator {
    registry: Arc<ModelRegistry>,
    config: ModelConfig,
    monitor: Arc<dyn ParseMonitor>,
    fallback: Arc<RuleBasedParser>,
    intent: IntentAdapter,
    category: CategoryAdapter,
    entities: EntityAdapter,
}

impl std::fmt::Debug for ParserOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserOrchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ParserOrchestrator {
    /// Orchestrator over the default lexicon
    pub fn new(registry: Arc<ModelRegistry>, config: ModelConfig, monitor: Arc<dyn ParseMonitor>) -> Self {
        let lexicon = LexiconConfig::default();
        Self {
            fallback: Arc::new(RuleBasedParser::new(&lexicon, config.fallback_confidence)),
            intent: IntentAdapter::new(registry.clone()),
            category: CategoryAdapter::new(registry.clone(), lexicon.taxonomy()),
            entities: EntityAdapter::new(registry.clone()),
            registry,
            config,
            monitor,
        }
    }

    /// Orchestrator whose models come from its own config, without a monitor
    pub fn from_config(config: ModelConfig) -> Self {
        let registry = Arc::new(ModelRegistry::from_config(config.clone()));
        Self::new(registry, config, Arc::new(NoopMonitor))
    }

    /// Replace the keyword tables and category taxonomy
    pub fn with_lexicon(mut self, lexicon: &LexiconConfig) -> Self {
        self.fallback = Arc::new(RuleBasedParser::new(lexicon, self.config.fallback_confidence));
        self.category = CategoryAdapter::new(self.registry.clone(), lexicon.taxonomy());
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<dyn ParseMonitor> {
        &self.monitor
    }

    /// Parse with the orchestrator's own config
    pub async fn parse(&self, raw_text: &str) -> ParsedTransaction {
        self.run(raw_text, &self.config).await.0
    }

    /// Parse with per-call thresholds, timeouts and fallback confidence
    pub async fn parse_with(&self, raw_text: &str, config: &ModelConfig) -> ParsedTransaction {
        self.run(raw_text, config).await.0
    }

    /// Parse and report the visited states
    pub async fn parse_traced(&self, raw_text: &str) -> (ParsedTransaction, ParseTrace) {
        self.run(raw_text, &self.config).await
    }

    async fn run(&self, raw_text: &str, config: &ModelConfig) -> (ParsedTransaction, ParseTrace) {
        let started = Instant::now();
        let mut states = vec![ParseState::Idle];
        let mut warnings = Vec::new();

        states.push(ParseState::ModelInference);
        let (intent, category, entities) = self.infer(raw_text, config).await;

        let failures: Vec<&Error> = [
            intent.as_ref().err(),
            category.as_ref().err(),
            entities.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .collect();
        for err in &failures {
            tracing::warn!(task = %err.task(), error = %err, "Model unavailable, using fallback");
            warnings.push(format!("{} model unavailable: {}", err.task(), err));
        }

        let fields = if failures.len() == ModelTask::ALL.len() {
            ModelFields::unavailable("all models failed")
        } else {
            states.push(ParseState::GateEvaluation);
            Self::gate(&ConfidenceGate::from_config(config), intent, category, entities)
        };

        let fallback = if fields.all_accepted() {
            None
        } else {
            states.push(ParseState::FallbackInvocation);
            self.run_fallback(raw_text, config.fallback_confidence, &mut warnings)
        };

        states.push(ParseState::Merge);
        let tx = merge::merge(raw_text, fields, fallback, warnings, Utc::now());
        states.push(ParseState::Done);

        let latency = started.elapsed();
        self.monitor.record(&ParseOutcome::from_transaction(&tx, latency));
        tracing::debug!(
            intent = %tx.intent(),
            amount = %tx.amount(),
            confidence = tx.overall_confidence(),
            used_fallback = tx.used_fallback(),
            latency_ms = latency.as_millis() as u64,
            "Parsed message"
        );

        (tx, ParseTrace { states, latency })
    }

    async fn infer(
        &self,
        raw_text: &str,
        config: &ModelConfig,
    ) -> (Result<Prediction<dompet_core::Intent>>, Result<Prediction<String>>, Result<EntityPrediction>) {
        let text: Arc<str> = Arc::from(raw_text);

        let mut intent = {
            let adapter = self.intent.clone();
            let text = text.clone();
            let limit = config.intent.timeout();
            AbortOnDrop(tokio::spawn(async move { adapter.infer(&text, limit).await }))
        };
        let mut category = {
            let adapter = self.category.clone();
            let text = text.clone();
            let limit = config.category.timeout();
            AbortOnDrop(tokio::spawn(async move { adapter.infer(&text, limit).await }))
        };
        let mut entities = {
            let adapter = self.entities.clone();
            let text = text.clone();
            let limit = config.entities.timeout();
            AbortOnDrop(tokio::spawn(async move { adapter.infer(&text, limit).await }))
        };

        let started = Instant::now();
        let budget = config.max_timeout() + JOIN_GRACE;
        futures::join!(
            join(ModelTask::Intent, &mut intent, started, budget),
            join(ModelTask::Category, &mut category, started, budget),
            join(ModelTask::Entities, &mut entities, started, budget)
        )
    }

    fn gate(
        gate: &ConfidenceGate,
        intent: Result<Prediction<dompet_core::Intent>>,
        category: Result<Prediction<String>>,
        entities: Result<EntityPrediction>,
    ) -> ModelFields {
        fn unavailable<T>(err: Error) -> ModelField<T> {
            ModelField::Unavailable(err.to_string())
        }

        let intent = intent.map_or_else(unavailable, |p| gate.gate(Field::Intent, p));
        let category = category.map_or_else(unavailable, |p| gate.gate(Field::Category, p));

        let (amount, entities, amount_note) = match entities {
            Ok(EntityPrediction {
                amount,
                mut entities,
                amount_note,
            }) => {
                let fields: BTreeMap<EntityType, ModelField<String>> = EntityType::ALL
                    .iter()
                    .map(|t| {
                        let field = match entities.remove(t) {
                            Some(p) => gate.gate(t.field(), p),
                            None => ModelField::Unavailable("no prediction".to_string()),
                        };
                        (*t, field)
                    })
                    .collect();
                (gate.gate(Field::Amount, amount), fields, amount_note)
            },
            Err(err) => {
                let reason = err.to_string();
                let fields = EntityType::ALL
                    .iter()
                    .map(|t| (*t, ModelField::Unavailable(reason.clone())))
                    .collect();
                (ModelField::Unavailable(reason), fields, None)
            },
        };

        ModelFields {
            intent,
            category,
            amount,
            entities,
            amount_note,
        }
    }

    fn run_fallback(&self, raw_text: &str, confidence: f32, warnings: &mut Vec<String>) -> Option<FallbackParse> {
        match catch_unwind(AssertUnwindSafe(|| self.fallback.parse_fields_with(raw_text, confidence))) {
            Ok(parse) => Some(parse),
            Err(_) => {
                tracing::error!("Rule-based parser panicked");
                warnings.push("fallback parser failed".to_string());
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dompet_core::{FieldSource, Intent, LabelPrediction, TextClassifier};

    struct Fixed(&'static str, f32);

    #[async_trait]
    impl TextClassifier for Fixed {
        async fn classify(&self, _text: &str) -> Result<LabelPrediction> {
            Ok(LabelPrediction::new(self.0, self.1))
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    struct Panics;

    #[async_trait]
    impl TextClassifier for Panics {
        async fn classify(&self, _text: &str) -> Result<LabelPrediction> {
            panic!("boom")
        }

        fn model_id(&self) -> &str {
            "panics"
        }
    }

    fn orchestrator(registry: ModelRegistry) -> ParserOrchestrator {
        ParserOrchestrator::new(Arc::new(registry), ModelConfig::default(), Arc::new(NoopMonitor))
    }

    #[tokio::test]
    async fn test_all_models_missing_skips_gate() {
        let orch = orchestrator(ModelRegistry::preloaded(None, None, None));
        let (tx, trace) = orch.parse_traced("Bayar kos 800 ribu").await;
        assert_eq!(
            trace.states,
            vec![
                ParseState::Idle,
                ParseState::ModelInference,
                ParseState::FallbackInvocation,
                ParseState::Merge,
                ParseState::Done
            ]
        );
        assert_eq!(tx.intent(), Intent::Expense);
        assert!(tx.field_source().values().all(|s| *s == FieldSource::Fallback));
    }

    #[tokio::test]
    async fn test_partial_models_go_through_gate() {
        let registry = ModelRegistry::preloaded(Some(Arc::new(Fixed("expense", 0.95))), None, None);
        let (tx, trace) = orchestrator(registry).parse_traced("bayar kos 800 ribu").await;
        assert!(trace.visited(ParseState::GateEvaluation));
        assert!(trace.visited(ParseState::FallbackInvocation));
        assert_eq!(tx.source_of(Field::Intent), Some(FieldSource::Model));
        assert_eq!(tx.source_of(Field::Category), Some(FieldSource::Fallback));
        assert!(tx.warnings().iter().any(|w| w.starts_with("category model unavailable")));
    }

    #[tokio::test]
    async fn test_panicked_adapter_degrades() {
        let registry = ModelRegistry::preloaded(Some(Arc::new(Panics)), None, None);
        let tx = orchestrator(registry).parse("terima uang saku 500000").await;
        assert_eq!(tx.intent(), Intent::Income);
        assert_eq!(tx.source_of(Field::Intent), Some(FieldSource::Fallback));
        assert!(tx.warnings().iter().any(|w| w.contains("panicked")));
    }

    #[tokio::test]
    async fn test_per_call_threshold() {
        let registry = ModelRegistry::preloaded(Some(Arc::new(Fixed("income", 0.8))), None, None);
        let orch = orchestrator(registry);

        let tx = orch.parse("gaji 5 juta").await;
        assert_eq!(tx.source_of(Field::Intent), Some(FieldSource::Model));

        let mut strict = ModelConfig::default();
        strict.intent.threshold = 0.9;
        let tx = orch.parse_with("gaji 5 juta", &strict).await;
        assert_eq!(tx.source_of(Field::Intent), Some(FieldSource::Fallback));
        assert_eq!(tx.intent(), Intent::Income);
    }
}
