//! Keyword tables for the rule-based parser
//!
//! Intent tables are checked in order, category rules first-match with the
//! most specific lists first. Everything here can be overridden from the
//! `lexicon` section of the settings or loaded from a standalone YAML file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use dompet_core::Intent;

use crate::constants::categories;
use crate::ConfigError;

/// Keywords that signal one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentKeywords {
    pub intent: Intent,
    pub keywords: Vec<String>,
}

/// Keywords that map a message onto a category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconConfig {
    /// Checked in order; first table with a word-boundary hit wins
    #[serde(default = "default_intents")]
    pub intents: Vec<IntentKeywords>,

    /// Checked in order; first rule with a hit wins
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryRule>,

    /// Relative date phrases recognized as `date_reference`
    #[serde(default = "default_date_phrases")]
    pub date_phrases: Vec<String>,

    /// Words that introduce a merchant or counterparty
    #[serde(default = "default_merchant_prepositions")]
    pub merchant_prepositions: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_intents() -> Vec<IntentKeywords> {
    vec![
        IntentKeywords {
            intent: Intent::Transfer,
            keywords: words(&[
                "transfer", "tf", "trf", "kirim", "kirim uang", "top up", "topup", "pindah dana",
            ]),
        },
        IntentKeywords {
            intent: Intent::Income,
            keywords: words(&[
                "terima", "diterima", "dapat", "dapet", "gaji", "gajian", "uang saku", "bonus",
                "thr", "pemasukan", "dikasih", "honor", "cair",
            ]),
        },
        IntentKeywords {
            intent: Intent::Expense,
            keywords: words(&[
                "bayar", "beli", "belanja", "jajan", "makan", "isi", "langganan", "sewa",
                "pengeluaran", "habis", "keluar", "traktir", "checkout",
            ]),
        },
        IntentKeywords {
            intent: Intent::Query,
            keywords: words(&[
                "berapa", "cek", "lihat", "total", "sisa", "saldo", "laporan", "rekap",
            ]),
        },
    ]
}

fn default_categories() -> Vec<CategoryRule> {
    let rule = |category: &str, keywords: &[&str]| CategoryRule {
        category: category.to_string(),
        keywords: words(keywords),
    };
    vec![
        rule(
            categories::HOUSING,
            &["kos", "kost", "kosan", "kontrakan", "sewa rumah", "sewa", "apartemen"],
        ),
        rule(
            categories::BILLS,
            &[
                "listrik", "token listrik", "pln", "pdam", "air", "internet", "wifi",
                "indihome", "pulsa", "paket data", "kuota", "tagihan", "cicilan", "bpjs",
            ],
        ),
        rule(
            categories::FOOD,
            &[
                "makan", "makanan", "minum", "kopi", "nasi", "sarapan", "makan siang",
                "makan malam", "jajan", "gofood", "grabfood", "shopeefood", "snack", "bakso",
                "mie", "ayam",
            ],
        ),
        rule(
            categories::TRANSPORT,
            &[
                "bensin", "pertalite", "pertamax", "grab", "gojek", "ojek", "ojol", "taksi",
                "parkir", "tol", "kereta", "krl", "busway", "transjakarta", "angkot",
            ],
        ),
        rule(
            categories::EDUCATION,
            &["spp", "ukt", "kuliah", "semester", "buku", "kursus", "les", "sekolah"],
        ),
        rule(
            categories::HEALTH,
            &["obat", "dokter", "apotek", "rumah sakit", "klinik", "vitamin"],
        ),
        rule(
            categories::SHOPPING,
            &[
                "belanja", "baju", "sepatu", "shopee", "tokopedia", "tokped", "lazada",
                "indomaret", "alfamart", "supermarket",
            ],
        ),
        rule(
            categories::ENTERTAINMENT,
            &["nonton", "bioskop", "netflix", "spotify", "game", "konser", "liburan"],
        ),
        rule(
            categories::INCOME,
            &["gaji", "gajian", "uang saku", "bonus", "thr", "honor", "freelance"],
        ),
        rule(categories::TRANSFER, &["transfer", "tf", "trf", "kirim uang"]),
    ]
}

fn default_date_phrases() -> Vec<String> {
    words(&[
        "hari ini",
        "kemarin",
        "kemaren",
        "kemarin lusa",
        "besok",
        "lusa",
        "tadi pagi",
        "tadi siang",
        "tadi sore",
        "tadi malam",
        "semalam",
        "minggu lalu",
        "minggu kemarin",
        "bulan lalu",
        "bulan kemarin",
        "tahun lalu",
    ])
}

fn default_merchant_prepositions() -> Vec<String> {
    words(&["di", "ke", "dari", "at"])
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            intents: default_intents(),
            categories: default_categories(),
            date_phrases: default_date_phrases(),
            merchant_prepositions: default_merchant_prepositions(),
        }
    }
}

impl LexiconConfig {
    /// Load from a YAML, TOML or JSON file (by extension, YAML otherwise)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| e.to_string()),
            Some("json") => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        };
        let lexicon: Self = parsed.map_err(ConfigError::ParseError)?;
        lexicon.validate()?;
        Ok(lexicon)
    }

    /// Category labels in rule order, default category last
    pub fn taxonomy(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::with_capacity(self.categories.len() + 1);
        for rule in &self.categories {
            if !labels.contains(&rule.category) {
                labels.push(rule.category.clone());
            }
        }
        if !labels.iter().any(|l| l == categories::OTHER) {
            labels.push(categories::OTHER.to_string());
        }
        labels
    }

    pub fn has_category(&self, label: &str) -> bool {
        label == categories::OTHER || self.categories.iter().any(|r| r.category == label)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, table) in self.intents.iter().enumerate() {
            if table.intent.is_unknown() {
                return Err(ConfigError::InvalidValue {
                    field: format!("lexicon.intents[{}].intent", i),
                    message: "'unknown' cannot have keywords".to_string(),
                });
            }
            if table.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("lexicon.intents[{}].keywords", i),
                    message: "Keywords must not be empty".to_string(),
                });
            }
        }

        for (i, rule) in self.categories.iter().enumerate() {
            if rule.category.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "lexicon.categories[{}].category",
                    i
                )));
            }
            if rule.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("lexicon.categories[{}].keywords", i),
                    message: "Keywords must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
