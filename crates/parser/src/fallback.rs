//! Rule-based fallback parser
//!
//! Deterministic, model-free extraction driven by the keyword tables in
//! `LexiconConfig`. Always produces a complete set of field results, so the
//! pipeline has something to fall back on for any field a model could not
//! supply.
//!
//! Fields the parser actually determined carry the configured fallback
//! confidence; fields it had to default (unknown intent, zero amount,
//! default category) carry 0.0.
//!
//! # Example
//!
//! ```ignore
//! use dompet_parser::fallback::RuleBasedParser;
//!
//! let parser = RuleBasedParser::default();
//! let tx = parser.parse("Bayar kos 800 ribu");
//! assert_eq!(tx.intent(), Intent::Expense);
//! assert_eq!(tx.category(), "tempat_tinggal");
//! ```

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use dompet_config::constants::{categories, models};
use dompet_config::LexiconConfig;
use dompet_core::{
    Amount, EntityType, Field, FieldResult, Intent, ParsedTransaction, TransactionBuilder,
    DEFAULT_CATEGORY,
};

use crate::amount::{self, AmountCandidate, AmountError};

static DAY_OF_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:tanggal|tgl\.?)\s*\d{1,2}\b").unwrap());

static CLAUSE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;!?\n()]|\.\s").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Words that end a merchant name
const MERCHANT_STOPWORDS: &[&str] = &[
    "rp", "idr", "buat", "untuk", "utk", "pakai", "pake", "sebesar", "seharga", "harga",
    "total", "sama", "dan", "yang", "tanggal", "tgl", "hari", "tadi", "minggu", "bulan",
    "tahun", "jam", "bayar", "beli",
];

/// Longest merchant name, in words
const MAX_MERCHANT_WORDS: usize = 3;

/// Field results produced by the rule-based parser
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackParse {
    pub intent: FieldResult<Intent>,
    /// Keyword match only; see `category_for`
    pub category_match: Option<FieldResult<String>>,
    pub amount: FieldResult<Amount>,
    pub entities: BTreeMap<EntityType, FieldResult<String>>,
    /// Non-fatal issues, tagged with the field they concern
    pub notes: Vec<(Field, String)>,
    confidence: f32,
}

impl FallbackParse {
    /// Category for a message whose final intent is `intent`
    ///
    /// A keyword match wins; otherwise income and transfer intents map to
    /// their own categories and everything else to the default category.
    pub fn category_for(&self, intent: Intent) -> FieldResult<String> {
        if let Some(matched) = &self.category_match {
            return matched.clone();
        }
        match intent {
            Intent::Income => FieldResult::fallback(categories::INCOME.to_string(), self.confidence),
            Intent::Transfer => {
                FieldResult::fallback(categories::TRANSFER.to_string(), self.confidence)
            },
            _ => FieldResult::fallback(DEFAULT_CATEGORY.to_string(), 0.0),
        }
    }

    /// Notes concerning one field
    pub fn notes_for(&self, field: Field) -> impl Iterator<Item = &str> {
        self.notes
            .iter()
            .filter(move |(f, _)| *f == field)
            .map(|(_, note)| note.as_str())
    }
}

/// Deterministic keyword parser
#[derive(Debug, Clone)]
pub struct RuleBasedParser {
    intent_tables: Vec<(Intent, Regex)>,
    category_rules: Vec<(String, Regex)>,
    date_phrases: Option<Regex>,
    merchant_prefix: Option<Regex>,
    stopwords: HashSet<String>,
    confidence: f32,
}

impl Default for RuleBasedParser {
    fn default() -> Self {
        Self::new(&LexiconConfig::default(), models::FALLBACK_CONFIDENCE)
    }
}

/// Case-insensitive, word-bounded alternation over `keywords`
///
/// Longer keywords come first so multi-word phrases win over their prefixes.
/// Returns `None` for an empty list or a pattern the regex engine rejects.
fn keyword_pattern(keywords: &[String]) -> Option<Regex> {
    let mut sorted: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| b.len().cmp(&a.len()));

    let alternation = sorted
        .iter()
        .map(|k| {
            k.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping keyword table that failed to compile");
            None
        },
    }
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

impl RuleBasedParser {
    pub fn new(lexicon: &LexiconConfig, confidence: f32) -> Self {
        let intent_tables = lexicon
            .intents
            .iter()
            .filter_map(|t| keyword_pattern(&t.keywords).map(|re| (t.intent, re)))
            .collect();

        let category_rules = lexicon
            .categories
            .iter()
            .filter_map(|r| keyword_pattern(&r.keywords).map(|re| (r.category.clone(), re)))
            .collect();

        let merchant_prefix = keyword_pattern(&lexicon.merchant_prepositions).and_then(|p| {
            Regex::new(&format!(r"{}\s+", p.as_str())).ok()
        });

        let mut stopwords: HashSet<String> =
            MERCHANT_STOPWORDS.iter().map(|s| s.to_string()).collect();
        stopwords.extend(lexicon.merchant_prepositions.iter().map(|p| p.to_lowercase()));
        for phrase in &lexicon.date_phrases {
            if let Some(first) = phrase.split_whitespace().next() {
                stopwords.insert(first.to_lowercase());
            }
        }

        Self {
            intent_tables,
            category_rules,
            date_phrases: keyword_pattern(&lexicon.date_phrases),
            merchant_prefix,
            stopwords,
            confidence,
        }
    }

    /// Confidence given to determined fields
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// First intent table with a keyword hit
    pub fn detect_intent(&self, text: &str) -> Option<Intent> {
        self.intent_tables
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(intent, _)| *intent)
    }

    /// First category rule with a keyword hit
    pub fn detect_category(&self, text: &str) -> Option<&str> {
        self.category_rules
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(category, _)| category.as_str())
    }

    /// Relative date phrase or "tanggal N", lower-cased
    pub fn extract_date(&self, text: &str) -> Option<String> {
        let phrase = self.date_phrases.as_ref().and_then(|re| re.find(text));
        let day = DAY_OF_MONTH.find(text);
        let found = match (phrase, day) {
            (Some(p), Some(d)) => Some(if d.start() < p.start() { d } else { p }),
            (p, d) => p.or(d),
        }?;
        Some(collapse_whitespace(&found.as_str().to_lowercase()))
    }

    /// Name following a preposition ("di", "ke", "dari", "at")
    ///
    /// Takes up to three words and stops at digits, stopwords and clause
    /// punctuation.
    pub fn extract_merchant(&self, text: &str) -> Option<String> {
        let prefix = self.merchant_prefix.as_ref()?;

        for m in prefix.find_iter(text) {
            let rest = &text[m.end()..];
            let clause = match CLAUSE_END.find(rest) {
                Some(end) => &rest[..end.start()],
                None => rest,
            };

            let name: Vec<&str> = clause
                .unicode_words()
                .take_while(|w| {
                    !w.chars().any(|c| c.is_ascii_digit())
                        && !self.stopwords.contains(&w.to_lowercase())
                })
                .take(MAX_MERCHANT_WORDS)
                .collect();

            if !name.is_empty() {
                return Some(name.join(" "));
            }
        }
        None
    }

    /// Message with amount spans removed
    pub fn describe(text: &str, spans: &[AmountCandidate]) -> Option<String> {
        let mut kept = String::with_capacity(text.len());
        let mut cursor = 0;
        for span in spans {
            if span.start < cursor {
                continue;
            }
            kept.push_str(&text[cursor..span.start]);
            kept.push(' ');
            cursor = span.end;
        }
        kept.push_str(&text[cursor..]);

        let description = collapse_whitespace(&kept);
        let description = description.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
        if description.is_empty() {
            None
        } else {
            Some(description.to_string())
        }
    }

    /// Field results at the parser's own confidence
    pub fn parse_fields(&self, text: &str) -> FallbackParse {
        self.parse_fields_with(text, self.confidence)
    }

    /// Field results at an explicit fallback confidence
    pub fn parse_fields_with(&self, text: &str, confidence: f32) -> FallbackParse {
        let mut notes = Vec::new();

        let intent = match self.detect_intent(text) {
            Some(intent) => FieldResult::fallback(intent, confidence),
            None => {
                notes.push((Field::Intent, "no intent keyword matched".to_string()));
                FieldResult::fallback(Intent::Unknown, 0.0)
            },
        };

        let category_match = self
            .detect_category(text)
            .map(|c| FieldResult::fallback(c.to_string(), confidence));

        let amount = match amount::select(text) {
            Ok(candidate) => FieldResult::fallback(candidate.amount, confidence),
            Err(AmountError::NotFound) => {
                notes.push((Field::Amount, "no amount found, defaulted to 0".to_string()));
                FieldResult::fallback(Amount::ZERO, 0.0)
            },
            Err(err @ AmountError::Ambiguous { .. }) => {
                notes.push((Field::Amount, err.to_string()));
                let chosen = err.best_effort().map(|c| c.amount).unwrap_or(Amount::ZERO);
                FieldResult::fallback(chosen, confidence)
            },
        };

        let mut entities = BTreeMap::new();
        if let Some(merchant) = self.extract_merchant(text) {
            entities.insert(EntityType::Merchant, FieldResult::fallback(merchant, confidence));
        }
        if let Some(date) = self.extract_date(text) {
            entities.insert(EntityType::DateReference, FieldResult::fallback(date, confidence));
        }
        if let Some(description) = Self::describe(text, &amount::find_candidates(text)) {
            entities.insert(
                EntityType::Description,
                FieldResult::fallback(description, confidence),
            );
        }

        FallbackParse {
            intent,
            category_match,
            amount,
            entities,
            notes,
            confidence,
        }
    }

    /// Complete record from rules alone
    pub fn parse(&self, text: &str) -> ParsedTransaction {
        let fields = self.parse_fields(text);
        let category = fields.category_for(fields.intent.value);

        let mut builder = TransactionBuilder::new(text)
            .intent(fields.intent.clone())
            .category(category)
            .amount(fields.amount.clone())
            .warnings(fields.notes.iter().map(|(_, note)| note.clone()))
            .created_at(Utc::now());
        for (entity_type, result) in fields.entities {
            builder = builder.entity(entity_type, result);
        }
        builder.build()
    }
}
