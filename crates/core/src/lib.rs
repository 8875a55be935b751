//! Core traits and types for the chat transaction parser
//!
//! This crate provides foundational types used across all other crates:
//! - `ParsedTransaction` and its builder (the pipeline's only output)
//! - Field/provenance types shared by the gate, merger and monitor
//! - Model backend traits (text classifiers, entity models)
//! - Monitor trait and aggregate snapshot types
//! - Error types

pub mod error;
pub mod inference;
pub mod monitor;
pub mod traits;
pub mod transaction;

pub use error::{Error, Result};
pub use inference::{EntitySpan, LabelPrediction, ModelTask, SpanKind};
pub use monitor::{FieldAcceptance, MonitorSnapshot, ParseOutcome};
pub use traits::{EntityModel, NoopMonitor, ParseMonitor, TextClassifier};
pub use transaction::{
    Amount, Currency, EntityType, Field, FieldResult, FieldSource, Intent, ParsedTransaction,
    TransactionBuilder, DEFAULT_CATEGORY,
};
