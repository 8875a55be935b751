//! End-to-end tests for the parsing pipeline
//!
//! Models are either real lexicon files written to temp dirs or mocks
//! injected through the registry.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use dompet_config::{FieldModelConfig, ModelConfig};
use dompet_core::{
    Amount, EntityModel, EntitySpan, EntityType, Error, Field, FieldSource, Intent,
    LabelPrediction, ModelTask, NoopMonitor, ParseMonitor, Result, SpanKind, TextClassifier,
};
use dompet_parser::{
    amount, InMemoryMonitor, ModelLoader, ModelRegistry, ParseState, ParserOrchestrator,
};

const INTENT_MODEL: &str = r#"{
    "model_id": "intent-lexicon-test",
    "labels": {
        "expense": {"weights": {"bayar": 3.0, "beli": 2.5, "kos": 0.5}},
        "income": {"weights": {"terima": 3.0, "uang saku": 2.0, "gaji": 3.0}},
        "transfer": {"weights": {"transfer": 3.0, "kirim": 2.0}},
        "query": {"weights": {"berapa": 3.0}}
    }
}"#;

const CATEGORY_MODEL: &str = r#"{
    "labels": {
        "tempat_tinggal": {"weights": {"kos": 4.0, "kontrakan": 4.0}},
        "makanan": {"weights": {"makan": 3.0, "kopi": 3.0}},
        "pemasukan": {"weights": {"uang saku": 3.0, "gaji": 3.0}}
    }
}"#;

const ENTITY_MODEL: &str = r#"{
    "merchants": [{"pattern": "indomaret", "name": "Indomaret", "confidence": 0.9}],
    "date_phrases": [{"pattern": "kemarin", "confidence": 0.95}]
}"#;

struct ModelFiles {
    _dir: tempfile::TempDir,
    config: ModelConfig,
}

fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path.to_string_lossy().into_owned()
}

fn model_files() -> ModelFiles {
    let dir = tempfile::tempdir().unwrap();
    let config = ModelConfig {
        intent: FieldModelConfig::lexicon(write(&dir, "intent.json", INTENT_MODEL)),
        category: FieldModelConfig::lexicon(write(&dir, "category.json", CATEGORY_MODEL)),
        entities: FieldModelConfig::lexicon(write(&dir, "entities.json", ENTITY_MODEL)),
        ..ModelConfig::default()
    };
    ModelFiles { _dir: dir, config }
}

struct FailingLoader {
    calls: AtomicUsize,
}

#[async_trait]
impl ModelLoader for FailingLoader {
    async fn load_classifier(
        &self,
        task: ModelTask,
        _config: &FieldModelConfig,
    ) -> Result<Arc<dyn TextClassifier>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::model_load(task, "weights missing"))
    }

    async fn load_entity_model(&self, _config: &FieldModelConfig) -> Result<Arc<dyn EntityModel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::model_load(ModelTask::Entities, "weights missing"))
    }
}

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

struct FixedSpans(Vec<EntitySpan>);

#[async_trait]
impl EntityModel for FixedSpans {
    async fn extract(&self, _text: &str) -> Result<Vec<EntitySpan>> {
        Ok(self.0.clone())
    }

    fn model_id(&self) -> &str {
        "fixed-spans"
    }
}

/// Sleeps, then records that it finished
struct Slow {
    delay: Duration,
    finished: Arc<AtomicBool>,
}

#[async_trait]
impl TextClassifier for Slow {
    async fn classify(&self, _text: &str) -> Result<LabelPrediction> {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(LabelPrediction::new("expense", 0.99))
    }

    fn model_id(&self) -> &str {
        "slow"
    }
}

#[async_trait]
impl EntityModel for Slow {
    async fn extract(&self, _text: &str) -> Result<Vec<EntitySpan>> {
        tokio::time::sleep(self.delay).await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(Vec::new())
    }

    fn model_id(&self) -> &str {
        "slow"
    }
}

fn fallback_only() -> ParserOrchestrator {
    let loader = Arc::new(FailingLoader {
        calls: AtomicUsize::new(0),
    });
    let registry = Arc::new(ModelRegistry::new(ModelConfig::default(), loader));
    ParserOrchestrator::new(registry, ModelConfig::default(), Arc::new(NoopMonitor))
}

#[test]
fn test_magnitude_words() {
    assert_eq!(amount::normalize("800 ribu"), Ok(Amount::from_rupiah(800_000)));
    assert_eq!(amount::normalize("1.5 juta"), Ok(Amount::from_rupiah(1_500_000)));
    assert_eq!(amount::normalize("1,5 juta"), Ok(Amount::from_rupiah(1_500_000)));
    assert_eq!(amount::normalize("Rp 25.000"), Ok(Amount::from_rupiah(25_000)));
}

#[test]
fn test_canonical_strings_are_fixed_points() {
    for value in [
        Amount::from_rupiah(800_000),
        Amount::from_rupiah(1_500_000),
        Amount::from_sen(125_050),
        Amount::from_rupiah(7),
    ] {
        let canonical = value.to_canonical_string();
        assert_eq!(amount::normalize(&canonical), Ok(value), "{}", canonical);
    }
}

#[tokio::test]
async fn test_bayar_kos_fallback_only() {
    let tx = fallback_only().parse("Bayar kos 800 ribu").await;
    assert_eq!(tx.intent(), Intent::Expense);
    assert_eq!(tx.category(), "tempat_tinggal");
    assert_eq!(tx.amount(), Amount::from_rupiah(800_000));
    assert_eq!(tx.currency().code(), "IDR");
}

#[tokio::test]
async fn test_terima_uang_saku() {
    let tx = fallback_only().parse("Terima uang saku 500000").await;
    assert_eq!(tx.intent(), Intent::Income);
    assert_eq!(tx.amount(), Amount::from_rupiah(500_000));
}

#[tokio::test]
async fn test_small_talk_is_unknown() {
    let tx = fallback_only().parse("halo apa kabar").await;
    assert_eq!(tx.intent(), Intent::Unknown);
    assert!(tx.amount().is_zero());
    assert!(!tx.warnings().is_empty());
    assert!(tx.needs_clarification(0.6));
}

#[tokio::test]
async fn test_all_models_fail_to_load() {
    let loader = Arc::new(FailingLoader {
        calls: AtomicUsize::new(0),
    });
    let registry = Arc::new(ModelRegistry::new(ModelConfig::default(), loader.clone()));
    let orch = ParserOrchestrator::new(registry, ModelConfig::default(), Arc::new(NoopMonitor));

    let (tx, trace) = orch.parse_traced("beli kopi 25 ribu di indomaret").await;
    assert_eq!(tx.intent(), Intent::Expense);
    assert_eq!(tx.amount(), Amount::from_rupiah(25_000));
    assert!(!trace.visited(ParseState::GateEvaluation));
    assert_eq!(trace.states.last(), Some(&ParseState::Done));
    for field in [Field::Intent, Field::Category, Field::Amount] {
        assert_eq!(tx.source_of(field), Some(FieldSource::Fallback));
    }
    assert!(tx.field_source().values().all(|s| *s == FieldSource::Fallback));
    assert!(tx
        .warnings()
        .iter()
        .any(|w| w == "intent model unavailable: Model load error (intent): weights missing"));

    // Failed loads are cached, and so is the original error
    let again = orch.parse("beli kopi 25 ribu").await;
    assert!(again
        .warnings()
        .iter()
        .any(|w| w == "category model unavailable: Model load error (category): weights missing"));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_low_confidence_goes_to_fallback() {
    let registry = ModelRegistry::preloaded(
        Some(Arc::new(Fixed("income", 0.65))),
        Some(Arc::new(Fixed("makanan", 0.69))),
        Some(Arc::new(FixedSpans(vec![EntitySpan::new(SpanKind::Amount, "900 ribu", 0.3)]))),
    );
    let orch = ParserOrchestrator::new(Arc::new(registry), ModelConfig::default(), Arc::new(NoopMonitor));

    let tx = orch.parse("bayar kos 800 ribu").await;
    assert_eq!(tx.intent(), Intent::Expense);
    assert_eq!(tx.category(), "tempat_tinggal");
    assert_eq!(tx.amount(), Amount::from_rupiah(800_000));
    for field in [Field::Intent, Field::Category, Field::Amount] {
        assert_eq!(tx.source_of(field), Some(FieldSource::Fallback));
    }
    assert!(tx
        .warnings()
        .iter()
        .any(|w| w.starts_with("intent model suggested 'income' (0.65)")));
}

#[tokio::test]
async fn test_mixed_provenance() {
    let registry = ModelRegistry::preloaded(
        Some(Arc::new(Fixed("expense", 0.91))),
        Some(Arc::new(Fixed("makanan", 0.4))),
        Some(Arc::new(FixedSpans(vec![
            EntitySpan::new(SpanKind::Amount, "25 ribu", 0.95),
            EntitySpan::new(SpanKind::Merchant, "Indomaret", 0.9),
        ]))),
    );
    let orch = ParserOrchestrator::new(Arc::new(registry), ModelConfig::default(), Arc::new(NoopMonitor));

    let tx = orch.parse("beli kopi 25 ribu di indomaret").await;
    assert_eq!(tx.source_of(Field::Intent), Some(FieldSource::Model));
    assert_eq!(tx.source_of(Field::Amount), Some(FieldSource::Model));
    assert_eq!(tx.source_of(Field::Merchant), Some(FieldSource::Model));
    assert_eq!(tx.source_of(Field::Category), Some(FieldSource::Fallback));
    assert_eq!(tx.entity(EntityType::Merchant), Some("Indomaret"));
    assert!(tx.used_fallback());
}

#[tokio::test]
async fn test_lexicon_models_from_files() {
    let files = model_files();
    let orch = ParserOrchestrator::from_config(files.config.clone());

    let tx = orch.parse("Bayar kos 800 ribu kemarin").await;
    assert_eq!(tx.intent(), Intent::Expense);
    assert_eq!(tx.category(), "tempat_tinggal");
    assert_eq!(tx.amount(), Amount::from_rupiah(800_000));
    assert_eq!(tx.source_of(Field::Amount), Some(FieldSource::Model));
    assert_eq!(tx.entity(EntityType::DateReference), Some("kemarin"));

    let status = orch.registry().status();
    assert!(status.values().all(|s| s.is_ready()));
}

#[tokio::test]
async fn test_model_amount_ambiguity_is_warned() {
    let files = model_files();
    let orch = ParserOrchestrator::from_config(files.config.clone());

    let tx = orch.parse("beli kopi 25rb roti 30rb").await;
    assert_eq!(tx.amount(), Amount::from_rupiah(30_000));
    assert_eq!(tx.source_of(Field::Amount), Some(FieldSource::Model));
    assert!(
        tx.warnings()
            .iter()
            .any(|w| w == "Ambiguous amount: chose Rp30.000 from 2 candidates"),
        "{:?}",
        tx.warnings()
    );

    // same wording as the rule-based path
    let fallback = fallback_only().parse("beli kopi 25rb roti 30rb").await;
    assert!(fallback
        .warnings()
        .iter()
        .any(|w| w == "Ambiguous amount: chose Rp30.000 from 2 candidates"));
}

#[tokio::test]
async fn test_corrupt_model_file_falls_back() {
    let files = model_files();
    let mut config = files.config.clone();
    config.intent.path = Some(write(&files._dir, "broken.json", "{ not json"));
    let orch = ParserOrchestrator::from_config(config);

    let tx = orch.parse("Terima uang saku 500000").await;
    assert_eq!(tx.intent(), Intent::Income);
    assert_eq!(tx.source_of(Field::Intent), Some(FieldSource::Fallback));
    assert!(tx.warnings().iter().any(|w| w.starts_with("intent model unavailable")));
}

#[tokio::test]
async fn test_slow_models_bounded_by_timeout() {
    let finished = Arc::new(AtomicBool::new(false));
    let slow = || Slow {
        delay: Duration::from_secs(5),
        finished: finished.clone(),
    };
    let registry = ModelRegistry::preloaded(
        Some(Arc::new(slow())),
        Some(Arc::new(slow())),
        Some(Arc::new(slow())),
    );
    let mut config = ModelConfig::default();
    for field in [&mut config.intent, &mut config.category, &mut config.entities] {
        field.timeout_ms = 50;
    }
    let orch = ParserOrchestrator::new(Arc::new(registry), config, Arc::new(NoopMonitor));

    let started = Instant::now();
    let tx = orch.parse("bayar kos 800 ribu").await;
    assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());
    assert_eq!(tx.intent(), Intent::Expense);
    assert_eq!(tx.amount(), Amount::from_rupiah(800_000));
    assert!(tx.warnings().iter().any(|w| w.contains("timeout")));
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dropped_parse_aborts_adapters() {
    let finished = Arc::new(AtomicBool::new(false));
    let registry = ModelRegistry::preloaded(
        Some(Arc::new(Slow {
            delay: Duration::from_millis(100),
            finished: finished.clone(),
        })),
        None,
        None,
    );
    let orch = ParserOrchestrator::new(Arc::new(registry), ModelConfig::default(), Arc::new(NoopMonitor));

    let abandoned = tokio::time::timeout(Duration::from_millis(20), orch.parse("bayar kos")).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_monitor_records_every_parse() {
    let monitor = Arc::new(InMemoryMonitor::new());
    let orch = ParserOrchestrator::new(
        Arc::new(ModelRegistry::preloaded(None, None, None)),
        ModelConfig::default(),
        monitor.clone(),
    );

    orch.parse("Bayar kos 800 ribu").await;
    orch.parse("Terima uang saku 500000").await;
    orch.parse("halo apa kabar").await;

    let snap = monitor.snapshot();
    assert_eq!(snap.total_parses, 3);
    assert_eq!(snap.successful_parses, 2);
    assert_eq!(snap.fallback_parses, 3);
    assert_eq!(snap.intent_distribution.get(&Intent::Unknown), Some(&1));
    assert_eq!(snap.field_acceptance[&Field::Intent].model, 0);
}

#[tokio::test]
async fn test_reload_retries_failed_models() {
    let files = model_files();
    let mut config = files.config.clone();
    let intent_path = config.intent.path.clone().unwrap();
    config.intent.path = Some(format!("{}.missing", intent_path));
    let registry = Arc::new(ModelRegistry::from_config(config.clone()));
    let orch = ParserOrchestrator::new(registry.clone(), config, Arc::new(NoopMonitor));

    let tx = orch.parse("bayar kos 800 ribu").await;
    assert_eq!(tx.source_of(Field::Intent), Some(FieldSource::Fallback));
    assert!(!registry.status()[&ModelTask::Intent].is_ready());

    std::fs::copy(&intent_path, format!("{}.missing", intent_path)).unwrap();
    registry.reload();
    let status = registry.warm_up().await;
    assert!(status[&ModelTask::Intent].is_ready());
}
