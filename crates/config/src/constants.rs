//! Centralized defaults for the parser
//!
//! Every default used by the serde `default = ...` functions lives here so the
//! config structs, the sample `config/default.yaml` and the tests agree.

/// Model gating and inference defaults
pub mod models {
    /// Minimum model confidence for a field to be accepted
    pub const DEFAULT_THRESHOLD: f32 = 0.7;

    /// Per-adapter inference budget (ms)
    pub const DEFAULT_TIMEOUT_MS: u64 = 500;

    /// Upper bound accepted by validation (ms)
    pub const MAX_TIMEOUT_MS: u64 = 10_000;

    /// Retries for transient remote-backend failures
    pub const DEFAULT_MAX_RETRIES: u32 = 1;

    /// Confidence assigned to fields the rule-based parser determined
    pub const FALLBACK_CONFIDENCE: f32 = 0.5;

    pub const INTENT_MODEL_PATH: &str = "models/intent.json";
    pub const CATEGORY_MODEL_PATH: &str = "models/category.json";
    pub const ENTITIES_MODEL_PATH: &str = "models/entities.json";
}

/// Category taxonomy defaults
pub mod categories {
    pub const HOUSING: &str = "tempat_tinggal";
    pub const BILLS: &str = "tagihan";
    pub const FOOD: &str = "makanan";
    pub const TRANSPORT: &str = "transportasi";
    pub const EDUCATION: &str = "pendidikan";
    pub const HEALTH: &str = "kesehatan";
    pub const SHOPPING: &str = "belanja";
    pub const ENTERTAINMENT: &str = "hiburan";
    pub const INCOME: &str = "pemasukan";
    pub const TRANSFER: &str = "transfer";
    pub const OTHER: &str = dompet_core::DEFAULT_CATEGORY;

    /// Default taxonomy, most specific first
    pub const ALL: [&str; 11] = [
        HOUSING,
        BILLS,
        FOOD,
        TRANSPORT,
        EDUCATION,
        HEALTH,
        SHOPPING,
        ENTERTAINMENT,
        INCOME,
        TRANSFER,
        OTHER,
    ];
}

/// Server defaults
pub mod server {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8080;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Overall confidence below which the chat layer should ask the user
    pub const CLARIFICATION_THRESHOLD: f32 = 0.6;
}
