//! Result merger
//!
//! Combines gated model fields with the rule-based parse into a single
//! `ParsedTransaction`. Per field: the accepted model value, else the
//! fallback value, else the builder default. A rejected model value is
//! never promoted; it only shows up as a warning.

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use dompet_core::{
    Amount, EntityType, Field, FieldResult, Intent, ParsedTransaction, TransactionBuilder,
};

use crate::fallback::FallbackParse;

/// Gated model output for one field
#[derive(Debug, Clone, PartialEq)]
pub enum ModelField<T> {
    Accepted(FieldResult<T>),
    /// Below threshold; kept only for the warning
    Rejected {
        candidate: FieldResult<T>,
        threshold: f32,
    },
    /// Model failed or had nothing to say
    Unavailable(String),
}

impl<T> ModelField<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ModelField::Accepted(_))
    }

    pub fn accepted(&self) -> Option<&FieldResult<T>> {
        match self {
            ModelField::Accepted(result) => Some(result),
            _ => None,
        }
    }
}

/// Every field's gated model output for one message
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFields {
    pub intent: ModelField<Intent>,
    pub category: ModelField<String>,
    pub amount: ModelField<Amount>,
    pub entities: BTreeMap<EntityType, ModelField<String>>,
    /// Extractor note on the amount, kept only if the model amount is used
    pub amount_note: Option<String>,
}

impl ModelFields {
    /// No model contributed anything
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            intent: ModelField::Unavailable(reason.clone()),
            category: ModelField::Unavailable(reason.clone()),
            amount: ModelField::Unavailable(reason.clone()),
            entities: EntityType::ALL
                .iter()
                .map(|t| (*t, ModelField::Unavailable(reason.clone())))
                .collect(),
            amount_note: None,
        }
    }

    /// True when the fallback has nothing left to fill
    pub fn all_accepted(&self) -> bool {
        self.intent.is_accepted()
            && self.category.is_accepted()
            && self.amount.is_accepted()
            && EntityType::ALL
                .iter()
                .all(|t| self.entities.get(t).is_some_and(ModelField::is_accepted))
    }
}

fn resolve<T: Display>(
    field: Field,
    model: ModelField<T>,
    fallback: Option<FieldResult<T>>,
    warnings: &mut Vec<String>,
) -> Option<FieldResult<T>> {
    match model {
        ModelField::Accepted(result) => Some(result),
        ModelField::Rejected {
            candidate,
            threshold,
        } => {
            warnings.push(format!(
                "{} model suggested '{}' ({:.2}) below threshold {:.2}",
                field, candidate.value, candidate.confidence, threshold
            ));
            fallback
        },
        ModelField::Unavailable(_) => fallback,
    }
}

/// Assemble the final record
///
/// `warnings` are carried over first; rejection warnings and fallback notes
/// for fields that ended up with fallback values follow.
pub fn merge(
    raw_text: &str,
    fields: ModelFields,
    fallback: Option<FallbackParse>,
    mut warnings: Vec<String>,
    created_at: DateTime<Utc>,
) -> ParsedTransaction {
    let ModelFields {
        intent,
        category,
        amount,
        mut entities,
        amount_note,
    } = fields;
    let fb = fallback.as_ref();

    let mut builder = TransactionBuilder::new(raw_text).created_at(created_at);

    let intent = resolve(
        Field::Intent,
        intent,
        fb.map(|f| f.intent.clone()),
        &mut warnings,
    );
    let final_intent = intent.as_ref().map(|r| r.value).unwrap_or_default();
    let category = resolve(
        Field::Category,
        category,
        fb.map(|f| f.category_for(final_intent)),
        &mut warnings,
    );
    let amount = resolve(
        Field::Amount,
        amount,
        fb.map(|f| f.amount.clone()),
        &mut warnings,
    );

    let mut fallback_fields = Vec::new();
    if let Some(result) = intent {
        if !result.source.is_model() {
            fallback_fields.push(Field::Intent);
        }
        builder = builder.intent(result);
    }
    if let Some(result) = category {
        if !result.source.is_model() {
            fallback_fields.push(Field::Category);
        }
        builder = builder.category(result);
    }
    if let Some(result) = amount {
        if !result.source.is_model() {
            fallback_fields.push(Field::Amount);
        } else if let Some(note) = amount_note {
            warnings.push(note);
        }
        builder = builder.amount(result);
    }

    for entity_type in EntityType::ALL {
        let model = entities
            .remove(&entity_type)
            .unwrap_or_else(|| ModelField::Unavailable("no prediction".to_string()));
        let fallback_value = fb.and_then(|f| f.entities.get(&entity_type).cloned());
        if let Some(result) = resolve(entity_type.field(), model, fallback_value, &mut warnings) {
            if !result.source.is_model() {
                fallback_fields.push(entity_type.field());
            }
            builder = builder.entity(entity_type, result);
        }
    }

    if let Some(f) = fb {
        for field in fallback_fields {
            warnings.extend(f.notes_for(field).map(String::from));
        }
    }

    builder.warnings(warnings).build()
}
