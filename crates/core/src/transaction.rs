//! Parsed transaction record
//!
//! `ParsedTransaction` is the only thing the pipeline hands back to callers.
//! It is assembled through `TransactionBuilder`, which writes a field's value,
//! confidence and provenance in one step, so the confidence/source maps can
//! never mention a field the record does not carry.
//!
//! # Example
//!
//! ```
//! use dompet_core::{Amount, FieldResult, Intent, TransactionBuilder};
//!
//! let tx = TransactionBuilder::new("Bayar kos 800 ribu")
//!     .intent(FieldResult::model(Intent::Expense, 0.93))
//!     .category(FieldResult::fallback("tempat_tinggal".to_string(), 0.5))
//!     .amount(FieldResult::fallback(Amount::from_rupiah(800_000), 0.5))
//!     .build();
//!
//! assert_eq!(tx.amount().rupiah(), 800_000.0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::inference::ModelTask;

/// Category used when nothing more specific is known
pub const DEFAULT_CATEGORY: &str = "lainnya";

/// Transaction intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Expense,
    Income,
    Transfer,
    Query,
    #[default]
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Expense,
        Intent::Income,
        Intent::Transfer,
        Intent::Query,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Expense => "expense",
            Intent::Income => "income",
            Intent::Transfer => "transfer",
            Intent::Query => "query",
            Intent::Unknown => "unknown",
        }
    }

    /// Map a model label onto the fixed intent set
    ///
    /// Accepts the Indonesian label names some classifiers are trained with.
    pub fn from_label(label: &str) -> Option<Intent> {
        match label.trim().to_lowercase().as_str() {
            "expense" | "pengeluaran" => Some(Intent::Expense),
            "income" | "pemasukan" => Some(Intent::Income),
            "transfer" => Some(Intent::Transfer),
            "query" | "pertanyaan" => Some(Intent::Query),
            "unknown" => Some(Intent::Unknown),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Intent::Unknown)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currency code; only rupiah for now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    #[serde(rename = "IDR")]
    Idr,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Idr => "IDR",
        }
    }
}

/// Monetary amount in rupiah, held exactly as integer sen (1/100 rupiah)
///
/// Serialized as a JSON number of rupiah.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Amount {
    sen: i64,
}

impl Amount {
    pub const ZERO: Amount = Amount { sen: 0 };
    pub const SEN_PER_RUPIAH: i64 = 100;

    pub fn from_sen(sen: i64) -> Self {
        Self { sen }
    }

    pub fn from_rupiah(rupiah: i64) -> Self {
        Self {
            sen: rupiah.saturating_mul(Self::SEN_PER_RUPIAH),
        }
    }

    pub fn sen(&self) -> i64 {
        self.sen
    }

    pub fn rupiah(&self) -> f64 {
        self.sen as f64 / Self::SEN_PER_RUPIAH as f64
    }

    pub fn is_zero(&self) -> bool {
        self.sen == 0
    }

    /// Plain digits with an optional `.` decimal part ("800000", "1250.50")
    pub fn to_canonical_string(&self) -> String {
        let whole = self.sen / Self::SEN_PER_RUPIAH;
        let frac = (self.sen % Self::SEN_PER_RUPIAH).abs();
        if frac == 0 {
            whole.to_string()
        } else {
            format!("{}.{:02}", whole, frac)
        }
    }
}

impl From<f64> for Amount {
    fn from(rupiah: f64) -> Self {
        if !rupiah.is_finite() {
            return Amount::ZERO;
        }
        Amount {
            sen: (rupiah * Amount::SEN_PER_RUPIAH as f64).round() as i64,
        }
    }
}

impl From<Amount> for f64 {
    fn from(amount: Amount) -> Self {
        amount.rupiah()
    }
}

impl fmt::Display for Amount {
    /// Indonesian grouping: `Rp800.000`, `Rp1.250,50`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = (self.sen / Self::SEN_PER_RUPIAH).unsigned_abs().to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.sen < 0 { "-" } else { "" };
        let frac = (self.sen % Self::SEN_PER_RUPIAH).abs();
        if frac == 0 {
            write!(f, "{}Rp{}", sign, grouped)
        } else {
            write!(f, "{}Rp{},{:02}", sign, grouped, frac)
        }
    }
}

/// Entity types carried in `ParsedTransaction::entities`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Merchant,
    DateReference,
    Description,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [
        EntityType::Merchant,
        EntityType::DateReference,
        EntityType::Description,
    ];

    pub fn field(&self) -> Field {
        match self {
            EntityType::Merchant => Field::Merchant,
            EntityType::DateReference => Field::DateReference,
            EntityType::Description => Field::Description,
        }
    }
}

/// Every field that carries confidence and provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Intent,
    Category,
    Amount,
    Merchant,
    DateReference,
    Description,
}

impl Field {
    /// Fields always present on a record
    pub const CORE: [Field; 3] = [Field::Intent, Field::Category, Field::Amount];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Intent => "intent",
            Field::Category => "category",
            Field::Amount => "amount",
            Field::Merchant => "merchant",
            Field::DateReference => "date_reference",
            Field::Description => "description",
        }
    }

    /// Model whose confidence threshold governs this field
    pub fn task(&self) -> ModelTask {
        match self {
            Field::Intent => ModelTask::Intent,
            Field::Category => ModelTask::Category,
            Field::Amount | Field::Merchant | Field::DateReference | Field::Description => {
                ModelTask::Entities
            },
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a field's final value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Model,
    Fallback,
}

impl FieldSource {
    pub fn is_model(&self) -> bool {
        matches!(self, FieldSource::Model)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldSource::Model => "model",
            FieldSource::Fallback => "fallback",
        }
    }
}

/// A field value tagged with its confidence and provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult<T> {
    pub value: T,
    pub confidence: f32,
    pub source: FieldSource,
}

impl<T> FieldResult<T> {
    pub fn model(value: T, confidence: f32) -> Self {
        Self {
            value,
            confidence: clamp_confidence(confidence),
            source: FieldSource::Model,
        }
    }

    pub fn fallback(value: T, confidence: f32) -> Self {
        Self {
            value,
            confidence: clamp_confidence(confidence),
            source: FieldSource::Fallback,
        }
    }
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Structured transaction parsed from one chat message
///
/// Only `TransactionBuilder` constructs one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedTransaction {
    raw_text: String,
    intent: Intent,
    category: String,
    amount: Amount,
    currency: Currency,
    entities: BTreeMap<EntityType, String>,
    field_confidence: BTreeMap<Field, f32>,
    field_source: BTreeMap<Field, FieldSource>,
    warnings: Vec<String>,
    created_at: DateTime<Utc>,
}

impl ParsedTransaction {
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn entities(&self) -> &BTreeMap<EntityType, String> {
        &self.entities
    }

    pub fn entity(&self, entity_type: EntityType) -> Option<&str> {
        self.entities.get(&entity_type).map(String::as_str)
    }

    pub fn field_confidence(&self) -> &BTreeMap<Field, f32> {
        &self.field_confidence
    }

    pub fn field_source(&self) -> &BTreeMap<Field, FieldSource> {
        &self.field_source
    }

    pub fn confidence_of(&self, field: Field) -> Option<f32> {
        self.field_confidence.get(&field).copied()
    }

    pub fn source_of(&self, field: Field) -> Option<FieldSource> {
        self.field_source.get(&field).copied()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True when any field fell back to the rule-based parser
    pub fn used_fallback(&self) -> bool {
        self.field_source
            .values()
            .any(|s| *s == FieldSource::Fallback)
    }

    /// Mean confidence over intent, category and amount
    pub fn overall_confidence(&self) -> f32 {
        let sum: f32 = Field::CORE
            .iter()
            .map(|f| self.field_confidence.get(f).copied().unwrap_or(0.0))
            .sum();
        sum / Field::CORE.len() as f32
    }

    /// Whether the chat layer should ask the user to clarify
    pub fn needs_clarification(&self, min_confidence: f32) -> bool {
        self.intent.is_unknown() || self.amount.is_zero() || self.overall_confidence() < min_confidence
    }
}

/// Assembles a `ParsedTransaction` one tagged field at a time
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    raw_text: String,
    intent: Option<FieldResult<Intent>>,
    category: Option<FieldResult<String>>,
    amount: Option<FieldResult<Amount>>,
    entities: BTreeMap<EntityType, FieldResult<String>>,
    warnings: Vec<String>,
    created_at: Option<DateTime<Utc>>,
}

impl TransactionBuilder {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            intent: None,
            category: None,
            amount: None,
            entities: BTreeMap::new(),
            warnings: Vec::new(),
            created_at: None,
        }
    }

    pub fn intent(mut self, result: FieldResult<Intent>) -> Self {
        self.intent = Some(result);
        self
    }

    pub fn category(mut self, result: FieldResult<String>) -> Self {
        self.category = Some(result);
        self
    }

    pub fn amount(mut self, result: FieldResult<Amount>) -> Self {
        self.amount = Some(result);
        self
    }

    /// Empty values are dropped rather than recorded
    pub fn entity(mut self, entity_type: EntityType, result: FieldResult<String>) -> Self {
        if !result.value.trim().is_empty() {
            self.entities.insert(entity_type, result);
        }
        self
    }

    pub fn warnings<I, S>(mut self, warnings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warnings.extend(warnings.into_iter().map(Into::into));
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Finish the record
    ///
    /// Missing core fields degrade to `unknown` / default category / zero
    /// amount, each with zero confidence, fallback provenance and a warning.
    pub fn build(mut self) -> ParsedTransaction {
        let intent = self.intent.take().unwrap_or_else(|| {
            self.warnings.push("intent could not be determined".to_string());
            FieldResult::fallback(Intent::Unknown, 0.0)
        });
        let category = self.category.take().unwrap_or_else(|| {
            self.warnings.push("category could not be determined".to_string());
            FieldResult::fallback(DEFAULT_CATEGORY.to_string(), 0.0)
        });
        let amount = self.amount.take().unwrap_or_else(|| {
            self.warnings.push("no amount found, defaulted to 0".to_string());
            FieldResult::fallback(Amount::ZERO, 0.0)
        });

        let mut field_confidence = BTreeMap::new();
        let mut field_source = BTreeMap::new();
        let mut record = |field: Field, confidence: f32, source: FieldSource| {
            field_confidence.insert(field, confidence);
            field_source.insert(field, source);
        };

        record(Field::Intent, intent.confidence, intent.source);
        record(Field::Category, category.confidence, category.source);
        record(Field::Amount, amount.confidence, amount.source);

        let mut entities = BTreeMap::new();
        for (entity_type, result) in self.entities {
            record(entity_type.field(), result.confidence, result.source);
            entities.insert(entity_type, result.value);
        }

        ParsedTransaction {
            raw_text: self.raw_text,
            intent: intent.value,
            category: category.value,
            amount: amount.value,
            currency: Currency::Idr,
            entities,
            field_confidence,
            field_source,
            warnings: self.warnings,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}
