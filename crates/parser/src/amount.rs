//! Indonesian amount normalization
//!
//! Turns colloquial amount spans into exact rupiah values:
//! - digit groups with thousands separators ("800.000", "1,250,000")
//! - magnitude words: ribu/rb/k ×1.000, juta/jt ×1.000.000,
//!   miliar/milyar/M ×1.000.000.000 (upper-case M only)
//! - currency markers: "Rp"/"IDR" before, "rupiah"/"perak" after
//!
//! Separator rules, in order:
//! 1. both '.' and ',' present: periods group thousands and a single
//!    trailing comma is the decimal ("1.250.000,50"); any other layout
//!    ("1,250,000.50") is not read as an amount
//! 2. one kind repeated: thousands separators ("1.500.000")
//! 3. a single separator followed by exactly three digits: thousands ("800.000")
//! 4. otherwise the single separator is decimal ("1.5 juta", "2,5jt")
//!
//! # Example
//!
//! ```ignore
//! use dompet_parser::amount;
//!
//! assert_eq!(amount::normalize("bayar kos 800 ribu")?.rupiah(), 800_000.0);
//! assert_eq!(amount::normalize("gaji 1.5 juta")?.rupiah(), 1_500_000.0);
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use thiserror::Error;

use dompet_core::Amount;

static AMOUNT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:(?P<cur>\b(?:rp|idr)\.?)\s*|\b)(?P<num>\d+(?:[.,]\d+)*)(?:\s*(?P<mag>ribu|rb|k|juta|jt|miliar|milyar|(?-i:M))\b)?(?:\s*(?P<post>rupiah|perak)\b)?",
    )
    .unwrap()
});

/// Date prefix that makes the following number a day of month, not money
static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:tanggal|tgl\.?)\s*$").unwrap());

/// Longest digit run accepted before arithmetic is attempted
const MAX_DIGITS: usize = 24;

/// An amount-looking span found in a message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmountCandidate {
    pub amount: Amount,
    /// Matched text, including any magnitude and currency words
    pub text: String,
    /// Byte offsets into the source text
    pub start: usize,
    pub end: usize,
    /// Adjacent to a currency or magnitude keyword
    pub keyworded: bool,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmountError {
    /// Several equally plausible candidates; `chosen` is the largest
    #[error("Ambiguous amount: chose {} from {} candidates", .chosen.amount, .candidates.len())]
    Ambiguous {
        chosen: AmountCandidate,
        candidates: Vec<AmountCandidate>,
    },

    #[error("No amount found")]
    NotFound,
}

impl AmountError {
    /// Best-effort value the caller may still use
    pub fn best_effort(&self) -> Option<&AmountCandidate> {
        match self {
            AmountError::Ambiguous { chosen, .. } => Some(chosen),
            AmountError::NotFound => None,
        }
    }
}

/// Magnitude multiplier for a matched magnitude word
fn magnitude(word: &str) -> i128 {
    if word == "M" {
        return 1_000_000_000;
    }
    match word.to_lowercase().as_str() {
        "ribu" | "rb" | "k" => 1_000,
        "juta" | "jt" => 1_000_000,
        "miliar" | "milyar" => 1_000_000_000,
        _ => 1,
    }
}

/// Split a digit group into integer digits and fractional digits
fn split_number(num: &str) -> Option<(String, String)> {
    let dots = num.matches('.').count();
    let commas = num.matches(',').count();

    let decimal_sep = match (dots, commas) {
        (0, 0) => None,
        (_, 0) | (0, _) => {
            let sep = if dots > 0 { '.' } else { ',' };
            let count = dots + commas;
            let tail = num.rsplit(sep).next().unwrap_or("");
            if count > 1 || tail.len() == 3 {
                None
            } else {
                Some(sep)
            }
        },
        (_, 1) if num.rfind(',') > num.rfind('.') => Some(','),
        _ => return None,
    };

    match decimal_sep {
        None => Some((num.chars().filter(char::is_ascii_digit).collect(), String::new())),
        Some(sep) => {
            let (int_part, frac_part) = num.rsplit_once(sep)?;
            Some((
                int_part.chars().filter(char::is_ascii_digit).collect(),
                frac_part.to_string(),
            ))
        },
    }
}

/// Exact value in sen, rounded half-up at the sen boundary
fn to_sen(num: &str, multiplier: i128) -> Option<i64> {
    let (int_digits, frac_digits) = split_number(num)?;
    if int_digits.len() + frac_digits.len() > MAX_DIGITS {
        return None;
    }

    let scale = 10i128.checked_pow(frac_digits.len() as u32)?;
    let int_value: i128 = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse().ok()?
    };
    let frac_value: i128 = if frac_digits.is_empty() {
        0
    } else {
        frac_digits.parse().ok()?
    };

    let mantissa = int_value.checked_mul(scale)?.checked_add(frac_value)?;
    let scaled = mantissa
        .checked_mul(multiplier)?
        .checked_mul(Amount::SEN_PER_RUPIAH as i128)?;
    let sen = (scaled + scale / 2) / scale;

    i64::try_from(sen).ok()
}

fn candidate_from(text: &str, caps: &Captures<'_>) -> Option<AmountCandidate> {
    let whole = caps.get(0)?;
    let num = caps.name("num")?;

    if DATE_PREFIX.is_match(&text[..whole.start()]) {
        return None;
    }

    let mag = caps.name("mag").map(|m| m.as_str());
    let sen = to_sen(num.as_str(), mag.map(magnitude).unwrap_or(1))?;
    if sen <= 0 {
        return None;
    }

    Some(AmountCandidate {
        amount: Amount::from_sen(sen),
        text: whole.as_str().trim().to_string(),
        start: whole.start(),
        end: whole.end(),
        keyworded: caps.name("cur").is_some() || mag.is_some() || caps.name("post").is_some(),
    })
}

/// Every non-zero amount span in the text, in order of appearance
pub fn find_candidates(text: &str) -> Vec<AmountCandidate> {
    AMOUNT_PATTERN
        .captures_iter(text)
        .filter_map(|caps| candidate_from(text, &caps))
        .collect()
}

/// Pick the amount a message refers to
///
/// Keyworded spans win over bare numbers. When more than one span is left,
/// the largest is chosen and reported as `Ambiguous`.
pub fn select(text: &str) -> Result<AmountCandidate, AmountError> {
    let candidates = find_candidates(text);
    if candidates.is_empty() {
        return Err(AmountError::NotFound);
    }

    let keyworded: Vec<&AmountCandidate> = candidates.iter().filter(|c| c.keyworded).collect();
    let pool: Vec<&AmountCandidate> = if keyworded.is_empty() {
        candidates.iter().collect()
    } else {
        keyworded
    };

    // pool is never empty here
    let chosen = match pool.iter().max_by_key(|c| c.amount) {
        Some(c) => (*c).clone(),
        None => return Err(AmountError::NotFound),
    };

    if pool.len() == 1 {
        Ok(chosen)
    } else {
        Err(AmountError::Ambiguous {
            chosen,
            candidates: pool.into_iter().cloned().collect(),
        })
    }
}

/// Canonical amount for a text span
pub fn normalize(text: &str) -> Result<Amount, AmountError> {
    select(text).map(|c| c.amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rupiah(text: &str) -> i64 {
        normalize(text).unwrap().sen() / 100
    }

    #[test]
    fn test_magnitude_words() {
        assert_eq!(rupiah("800 ribu"), 800_000);
        assert_eq!(rupiah("25rb"), 25_000);
        assert_eq!(rupiah("50k"), 50_000);
        assert_eq!(rupiah("1.5 juta"), 1_500_000);
        assert_eq!(rupiah("2,5jt"), 2_500_000);
        assert_eq!(rupiah("3 miliar"), 3_000_000_000);
        assert_eq!(rupiah("1M"), 1_000_000_000);
    }

    #[test]
    fn test_lowercase_m_is_not_miliar() {
        assert_eq!(rupiah("lari 5m"), 5);
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(rupiah("Rp800.000"), 800_000);
        assert_eq!(rupiah("Rp 1.500.000"), 1_500_000);
        assert_eq!(rupiah("1,250,000"), 1_250_000);
        assert_eq!(rupiah("500000"), 500_000);
    }

    #[test]
    fn test_decimal_separators() {
        assert_eq!(normalize("Rp1.250.000,50").unwrap().sen(), 125_000_050);
        assert_eq!(normalize("12,5 perak").unwrap().sen(), 1_250);
    }

    #[test]
    fn test_mixed_separators_follow_indonesian_convention() {
        assert_eq!(normalize("Rp 2.500,75").unwrap().sen(), 250_075);
        assert_eq!(normalize("1,250,000.50 rupiah"), Err(AmountError::NotFound));
        assert_eq!(normalize("1,5.000"), Err(AmountError::NotFound));
        assert_eq!(normalize("2.500,7,5"), Err(AmountError::NotFound));
    }

    #[test]
    fn test_currency_markers_are_keywords() {
        let c = select("idr 75000").unwrap();
        assert!(c.keyworded);
        assert_eq!(c.amount, Amount::from_rupiah(75_000));
        let c = select("20000 rupiah").unwrap();
        assert!(c.keyworded);
    }

    #[test]
    fn test_keyworded_candidate_preferred() {
        let c = select("beli 2 kopi 40rb").unwrap();
        assert_eq!(c.amount, Amount::from_rupiah(40_000));
        assert_eq!(c.text, "40rb");
    }

    #[test]
    fn test_ambiguous_picks_largest() {
        let err = select("kopi 25rb roti 30rb").unwrap_err();
        match &err {
            AmountError::Ambiguous { chosen, candidates } => {
                assert_eq!(chosen.amount, Amount::from_rupiah(30_000));
                assert_eq!(candidates.len(), 2);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            err.best_effort().map(|c| c.amount),
            Some(Amount::from_rupiah(30_000))
        );
    }

    #[test]
    fn test_zero_is_not_a_candidate() {
        assert_eq!(normalize("0 rupiah"), Err(AmountError::NotFound));
        assert_eq!(normalize("halo apa kabar"), Err(AmountError::NotFound));
    }

    #[test]
    fn test_day_of_month_is_not_money() {
        let c = select("bayar kos 800 ribu tanggal 5").unwrap();
        assert_eq!(c.amount, Amount::from_rupiah(800_000));
        assert_eq!(normalize("tanggal 17"), Err(AmountError::NotFound));
    }

    #[test]
    fn test_canonical_string_is_fixed_point() {
        for text in ["800 ribu", "Rp1.250.000,50", "1.5 juta", "12,5", "3 miliar", "0,75"] {
            let amount = normalize(text).unwrap();
            let again = normalize(&amount.to_canonical_string()).unwrap();
            assert_eq!(amount, again, "{}", text);
        }
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert_eq!(
            normalize("999999999999999999999999999 miliar"),
            Err(AmountError::NotFound)
        );
    }

    #[test]
    fn test_span_offsets() {
        let text = "Bayar kos 800 ribu";
        let c = select(text).unwrap();
        assert_eq!(&text[c.start..c.end], "800 ribu");
    }
}
