//! Local weighted-keyword models
//!
//! - `LexiconClassifier`: per-label bias plus unigram/bigram weights, softmax
//!   over labels. A message with no weighted feature gets an empty prediction.
//! - `GazetteerEntityModel`: merchant and date phrase lists plus amount span
//!   detection.
//!
//! Both load from JSON files; a missing or corrupt file is a `ModelLoad` error.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize};
use unicode_segmentation::UnicodeSegmentation;

use dompet_core::{
    EntityModel, EntitySpan, Error, LabelPrediction, ModelTask, Result, SpanKind, TextClassifier,
};

use crate::amount;

async fn read_json<T: DeserializeOwned>(task: ModelTask, path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::model_load(task, format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::model_load(task, format!("{}: corrupt weights: {}", path.display(), e)))
}

/// Lower-cased unigrams and bigrams
fn features(text: &str) -> Vec<String> {
    let words: Vec<String> = text.unicode_words().map(|w| w.to_lowercase()).collect();
    let mut out = Vec::with_capacity(words.len() * 2);
    out.extend(words.iter().cloned());
    out.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    out
}

#[derive(Debug, Clone, Deserialize)]
struct LabelWeights {
    #[serde(default)]
    bias: f32,
    #[serde(default)]
    weights: HashMap<String, f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClassifierFile {
    #[serde(default)]
    model_id: Option<String>,
    labels: BTreeMap<String, LabelWeights>,
    #[serde(default = "default_temperature")]
    temperature: f32,
}

fn default_temperature() -> f32 {
    1.0
}

/// Weighted keyword classifier
#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    model_id: String,
    labels: Vec<(String, LabelWeights)>,
    temperature: f32,
}

impl LexiconClassifier {
    /// Load weights from a JSON file
    pub async fn load(task: ModelTask, path: impl AsRef<Path>, fallback_id: String) -> Result<Self> {
        let path = path.as_ref();
        let file: ClassifierFile = read_json(task, path).await?;

        if file.labels.is_empty() {
            return Err(Error::model_load(task, format!("{}: no labels", path.display())));
        }
        if !file.temperature.is_finite() || file.temperature <= 0.0 {
            return Err(Error::model_load(task, format!("{}: invalid temperature", path.display())));
        }
        let all_finite = file
            .labels
            .values()
            .all(|l| l.bias.is_finite() && l.weights.values().all(|w| w.is_finite()));
        if !all_finite {
            return Err(Error::model_load(task, format!("{}: non-finite weight", path.display())));
        }

        let model_id = file.model_id.unwrap_or(fallback_id);
        tracing::info!(task = %task, model_id = %model_id, labels = file.labels.len(), "Loaded lexicon classifier");

        Ok(Self {
            model_id,
            labels: file
                .labels
                .into_iter()
                .map(|(label, w)| (label, normalize_weights(w)))
                .collect(),
            temperature: file.temperature,
        })
    }

    /// Synchronous scoring
    pub fn predict(&self, text: &str) -> LabelPrediction {
        let feats = features(text);
        let mut evidence = false;

        let scores: Vec<f32> = self
            .labels
            .iter()
            .map(|(_, lw)| {
                let mut score = lw.bias;
                for f in &feats {
                    if let Some(w) = lw.weights.get(f) {
                        score += w;
                        evidence = true;
                    }
                }
                score / self.temperature
            })
            .collect();

        if !evidence {
            return LabelPrediction::empty();
        }

        let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f32 = exps.iter().sum();

        let (best, best_exp) = exps
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (i, e)| if *e > acc.1 { (i, *e) } else { acc });

        LabelPrediction::new(self.labels[best].0.clone(), best_exp / total)
    }
}

fn normalize_weights(w: LabelWeights) -> LabelWeights {
    LabelWeights {
        bias: w.bias,
        weights: w
            .weights
            .into_iter()
            .map(|(k, v)| (k.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(), v))
            .collect(),
    }
}

#[async_trait]
impl TextClassifier for LexiconClassifier {
    async fn classify(&self, text: &str) -> Result<LabelPrediction> {
        Ok(self.predict(text))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GazetteerEntry {
    pattern: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_entry_confidence")]
    confidence: f32,
}

fn default_entry_confidence() -> f32 {
    0.85
}

#[derive(Debug, Clone, Deserialize)]
struct AmountConfidence {
    #[serde(default = "default_keyworded_confidence")]
    keyworded: f32,
    #[serde(default = "default_bare_confidence")]
    bare: f32,
}

fn default_keyworded_confidence() -> f32 {
    0.92
}

fn default_bare_confidence() -> f32 {
    0.6
}

impl Default for AmountConfidence {
    fn default() -> Self {
        Self {
            keyworded: default_keyworded_confidence(),
            bare: default_bare_confidence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GazetteerFile {
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    merchants: Vec<GazetteerEntry>,
    #[serde(default)]
    date_phrases: Vec<GazetteerEntry>,
    #[serde(default)]
    amount_confidence: AmountConfidence,
}

#[derive(Debug, Clone)]
struct CompiledEntry {
    regex: Regex,
    name: Option<String>,
    confidence: f32,
}

fn compile_entries(task: ModelTask, entries: Vec<GazetteerEntry>) -> Result<Vec<CompiledEntry>> {
    entries
        .into_iter()
        .map(|e| {
            let pattern = e
                .pattern
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+");
            if pattern.is_empty() {
                return Err(Error::model_load(task, "empty gazetteer pattern"));
            }
            let regex = Regex::new(&format!(r"(?i)\b{}\b", pattern))
                .map_err(|err| Error::model_load(task, err.to_string()))?;
            Ok(CompiledEntry {
                regex,
                name: e.name,
                confidence: e.confidence,
            })
        })
        .collect()
}

/// Gazetteer entity extractor
#[derive(Debug, Clone)]
pub struct GazetteerEntityModel {
    model_id: String,
    merchants: Vec<CompiledEntry>,
    date_phrases: Vec<CompiledEntry>,
    amount_confidence: AmountConfidence,
}

impl GazetteerEntityModel {
    pub async fn load(path: impl AsRef<Path>, fallback_id: String) -> Result<Self> {
        let task = ModelTask::Entities;
        let file: GazetteerFile = read_json(task, path.as_ref()).await?;

        let model_id = file.model_id.unwrap_or(fallback_id);
        let merchants = compile_entries(task, file.merchants)?;
        let date_phrases = compile_entries(task, file.date_phrases)?;
        tracing::info!(
            model_id = %model_id,
            merchants = merchants.len(),
            date_phrases = date_phrases.len(),
            "Loaded gazetteer entity model"
        );

        Ok(Self {
            model_id,
            merchants,
            date_phrases,
            amount_confidence: file.amount_confidence,
        })
    }

    fn find(entries: &[CompiledEntry], kind: SpanKind, text: &str, out: &mut Vec<EntitySpan>) {
        for entry in entries {
            if let Some(m) = entry.regex.find(text) {
                let surface = entry.name.clone().unwrap_or_else(|| m.as_str().to_string());
                out.push(EntitySpan::new(kind, surface, entry.confidence));
            }
        }
    }

    pub fn spans(&self, text: &str) -> Vec<EntitySpan> {
        let mut out = Vec::new();

        for candidate in amount::find_candidates(text) {
            let confidence = if candidate.keyworded {
                self.amount_confidence.keyworded
            } else {
                self.amount_confidence.bare
            };
            out.push(EntitySpan::new(SpanKind::Amount, candidate.text, confidence));
        }

        Self::find(&self.merchants, SpanKind::Merchant, text, &mut out);
        Self::find(&self.date_phrases, SpanKind::DateReference, text, &mut out);
        out
    }
}

#[async_trait]
impl EntityModel for GazetteerEntityModel {
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>> {
        Ok(self.spans(text))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const INTENT_WEIGHTS: &str = r#"{
        "model_id": "intent-test",
        "labels": {
            "expense": {"weights": {"bayar": 3.0, "beli": 2.5}},
            "income": {"weights": {"terima": 3.0, "uang saku": 1.5}},
            "transfer": {"weights": {"transfer": 3.0}},
            "query": {"weights": {"berapa": 3.0}}
        }
    }"#;

    #[tokio::test]
    async fn test_classifier_prediction() {
        let file = write_file(INTENT_WEIGHTS);
        let model = LexiconClassifier::load(ModelTask::Intent, file.path(), "x".into())
            .await
            .unwrap();
        assert_eq!(model.model_id(), "intent-test");

        let p = model.classify("Bayar kos 800 ribu").await.unwrap();
        assert_eq!(p.label.as_deref(), Some("expense"));
        // e^3 / (e^3 + 3)
        assert!(p.confidence > 0.85 && p.confidence < 0.9);

        let p = model.classify("terima uang saku").await.unwrap();
        assert_eq!(p.label.as_deref(), Some("income"));
        assert!(p.confidence > 0.95);
    }

    #[tokio::test]
    async fn test_no_evidence_is_empty() {
        let file = write_file(INTENT_WEIGHTS);
        let model = LexiconClassifier::load(ModelTask::Intent, file.path(), "x".into())
            .await
            .unwrap();
        let p = model.classify("halo apa kabar").await.unwrap();
        assert!(p.is_empty());
        assert_eq!(p.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_missing_file_is_model_load() {
        let err = LexiconClassifier::load(ModelTask::Category, "/nonexistent/c.json", "x".into())
            .await
            .unwrap_err();
        assert!(err.is_model_load());
        assert_eq!(err.task(), ModelTask::Category);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_model_load() {
        let file = write_file("{ not json");
        let err = LexiconClassifier::load(ModelTask::Intent, file.path(), "x".into())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("corrupt"));

        let file = write_file(r#"{"labels": {}}"#);
        assert!(LexiconClassifier::load(ModelTask::Intent, file.path(), "x".into())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_gazetteer_spans() {
        let file = write_file(
            r#"{
                "merchants": [{"pattern": "kopi kenangan", "name": "Kopi Kenangan", "confidence": 0.9}],
                "date_phrases": [{"pattern": "kemarin", "confidence": 0.88}]
            }"#,
        );
        let model = GazetteerEntityModel::load(file.path(), "entities-test".into())
            .await
            .unwrap();
        assert_eq!(model.model_id(), "entities-test");

        let spans = model
            .extract("beli kopi di kopi  kenangan 25rb kemarin")
            .await
            .unwrap();
        let kinds: Vec<SpanKind> = spans.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![SpanKind::Amount, SpanKind::Merchant, SpanKind::DateReference]
        );
        assert_eq!(spans[0].text, "25rb");
        assert_eq!(spans[0].confidence, 0.92);
        assert_eq!(spans[1].text, "Kopi Kenangan");
    }
}
