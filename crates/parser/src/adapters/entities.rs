//! Entity / amount extractor adapter
//!
//! Amount spans are run through the numeric normalizer; the best-scoring
//! span that normalizes wins (ties go to the larger amount and are reported
//! in `amount_note`). For the other entity types the highest-confidence
//! non-empty span wins.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dompet_core::{Amount, EntitySpan, EntityType, ModelTask, Result, SpanKind};

use super::{sanitize_confidence, with_timeout, Prediction};
use crate::amount;
use crate::models::ModelRegistry;

/// Sanitized entity model output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPrediction {
    pub amount: Prediction<Amount>,
    pub entities: BTreeMap<EntityType, Prediction<String>>,
    /// Set when the chosen amount was one of several equally likely values
    pub amount_note: Option<String>,
}

impl EntityPrediction {
    pub fn entity(&self, entity_type: EntityType) -> Option<&Prediction<String>> {
        self.entities.get(&entity_type)
    }
}

fn entity_type(kind: SpanKind) -> Option<EntityType> {
    match kind {
        SpanKind::Amount => None,
        SpanKind::Merchant => Some(EntityType::Merchant),
        SpanKind::DateReference => Some(EntityType::DateReference),
        SpanKind::Description => Some(EntityType::Description),
    }
}

#[derive(Debug, Clone)]
pub struct EntityAdapter {
    registry: Arc<ModelRegistry>,
}

impl EntityAdapter {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Extract entities from `text` within `timeout`
    pub async fn infer(&self, text: &str, timeout: Duration) -> Result<EntityPrediction> {
        if text.trim().is_empty() {
            return Ok(EntityPrediction::default());
        }

        with_timeout(ModelTask::Entities, timeout, async {
            let model = self.registry.entities().await?;
            let spans = model.extract(text).await?;
            Ok(Self::sanitize(spans))
        })
        .await
    }

    fn sanitize(spans: Vec<EntitySpan>) -> EntityPrediction {
        // (confidence, value, note from the normalizer)
        let mut amounts: Vec<(f32, Amount, Option<String>)> = Vec::new();
        let mut entities: BTreeMap<EntityType, Prediction<String>> = BTreeMap::new();

        for span in spans {
            let confidence = sanitize_confidence(span.confidence);
            let text = span.text.trim();
            if text.is_empty() {
                continue;
            }

            match entity_type(span.kind) {
                None => {
                    // spans the normalizer calls ambiguous still carry a usable value
                    match amount::select(text) {
                        Ok(c) => amounts.push((confidence, c.amount, None)),
                        Err(e) => match e.best_effort() {
                            Some(c) => amounts.push((confidence, c.amount, Some(e.to_string()))),
                            None => {
                                tracing::debug!(span = %text, "Dropping amount span that does not normalize");
                            },
                        },
                    }
                },
                Some(entity_type) => {
                    let better = entities
                        .get(&entity_type)
                        .map_or(true, |current| confidence > current.confidence);
                    if better {
                        entities.insert(entity_type, Prediction::new(text.to_string(), confidence));
                    }
                },
            }
        }

        let (amount, amount_note) = Self::pick_amount(&amounts);
        EntityPrediction {
            amount,
            entities,
            amount_note,
        }
    }

    /// Highest confidence wins, then the larger value
    fn pick_amount(amounts: &[(f32, Amount, Option<String>)]) -> (Prediction<Amount>, Option<String>) {
        let best = amounts.iter().fold(None::<&(f32, Amount, Option<String>)>, |best, entry| {
            match best {
                Some((c, a, _)) if entry.0 < *c || (entry.0 == *c && entry.1 <= *a) => best,
                _ => Some(entry),
            }
        });
        let Some((confidence, value, span_note)) = best else {
            return (Prediction::default(), None);
        };

        let mut tied: Vec<Amount> = amounts
            .iter()
            .filter(|(c, _, _)| c == confidence)
            .map(|(_, a, _)| *a)
            .collect();
        tied.sort();
        tied.dedup();

        let note = if tied.len() > 1 {
            Some(format!(
                "Ambiguous amount: chose {} from {} candidates",
                value,
                tied.len()
            ))
        } else {
            span_note.clone()
        };
        (Prediction::new(*value, *confidence), note)
    }
}
