//! Chat message transaction parser
//!
//! Turns an informal Indonesian chat message ("Bayar kos 800 ribu") into a
//! `ParsedTransaction`:
//! - **Model adapters**: intent, category and entity models behind a registry
//! - **Confidence gate**: per-field thresholds decide what the models may set
//! - **Rule-based fallback**: keyword tables and the numeric normalizer fill the rest
//! - **Merger**: one record with per-field confidence and provenance
//! - **Monitor**: aggregate parse stats and `metrics` export
//!
//! # Example
//!
//! ```ignore
//! use dompet_parser::ParserOrchestrator;
//!
//! let parser = ParserOrchestrator::from_config(settings.models.clone());
//! let tx = parser.parse("Bayar kos 800 ribu").await;
//! println!("{} {} {}", tx.intent(), tx.category(), tx.amount());
//! ```

pub mod adapters;
pub mod amount;
pub mod fallback;
pub mod gate;
pub mod merge;
pub mod models;
pub mod monitor;
pub mod orchestrator;

pub use adapters::{CategoryAdapter, EntityAdapter, EntityPrediction, IntentAdapter, Prediction};
pub use amount::{AmountCandidate, AmountError};
pub use fallback::{FallbackParse, RuleBasedParser};
pub use gate::{ConfidenceGate, GateDecision};
pub use merge::{merge, ModelField, ModelFields};
pub use models::{BackendLoader, ModelLoader, ModelRegistry, SlotStatus};
pub use monitor::InMemoryMonitor;
pub use orchestrator::{ParseState, ParseTrace, ParserOrchestrator};
