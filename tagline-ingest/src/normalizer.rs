//! Merchant normalization: raw bank description -> (merchant_norm, merchant_detail).
//!
//! Stages run in a fixed order and each pattern table is an ordered list,
//! first match wins:
//!   1. upper-case + trim (empty -> UNKNOWN)
//!   2. POS aggregators ("SQ *", "TST *", "SP ") keep the sub-business as detail
//!   3. internal transactions (autopay, Zelle, Venmo, transfers, deposits)
//!   4. noise stripping (IDs, asterisks, entities, URLs)
//!   5. merchant aliases
//!   6. fallback cleanup (whitespace, store numbers, legal suffixes)
//!   7. validation (< 2 chars -> UNKNOWN)
//!
//! POS detection has to run before noise stripping, which removes the `*`
//! delimiter it keys on.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const UNKNOWN_MERCHANT: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedMerchant {
    pub merchant_norm: String,
    pub merchant_detail: Option<String>,
}

impl NormalizedMerchant {
    fn new(norm: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            merchant_norm: norm.into(),
            merchant_detail: detail,
        }
    }

    fn unknown() -> Self {
        Self::new(UNKNOWN_MERCHANT, None)
    }

    pub fn into_parts(self) -> (String, Option<String>) {
        (self.merchant_norm, self.merchant_detail)
    }
}

/// A compiled pattern paired with the canonical name it maps to.
struct NamedPattern {
    re: Regex,
    name: &'static str,
}

/// A compiled noise pattern paired with its replacement text.
struct Substitution {
    re: Regex,
    replacement: &'static str,
}

fn named(table: &[(&str, &'static str)]) -> Vec<NamedPattern> {
    table
        .iter()
        .map(|(pat, name)| NamedPattern {
            re: Regex::new(pat).expect("static merchant pattern"),
            name,
        })
        .collect()
}

fn regex(pat: &str) -> Regex {
    Regex::new(pat).expect("static merchant pattern")
}

static POS_AGGREGATORS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    named(&[
        (r"\bSQ\s*\*\s*(.+)", "SQ"),
        (r"\bTST\s*\*\s*(.+)", "TST"),
        (r"^SP\s+(.+)", "SP"),
    ])
});

// Anchored at the start. Patterns with a capture group record the
// counterparty as detail.
static INTERNAL_PATTERNS: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    named(&[
        (r"^CHASE.*AUTOPAY", "CHASE CREDIT CARD PAYMENT"),
        (r"^CHASE.*PAYMENT", "CHASE CREDIT CARD PAYMENT"),
        (r"^VENMO\s+PAYMENT", "VENMO OUTGOING"),
        (r"^VENMO\s+CASHOUT", "VENMO CASHOUT"),
        (r"^ZELLE\s+PAYMENT\s+TO\s+(.+)", "ZELLE TO"),
        (r"^ZELLE\s+PAYMENT\s+FROM\s+(.+)", "ZELLE FROM"),
        (r"^INTEREST\s+PAYMENT", "BANK INTEREST"),
        (r"^ATM\s+WITHDRAWAL", "ATM WITHDRAWAL"),
        (r"^WIRE\s+TRANSFER", "WIRE TRANSFER"),
        (r"^ACH\s+TRANSFER", "ACH TRANSFER"),
        (r"^ONLINE\s+TRANSFER", "ONLINE TRANSFER"),
        (r"^CHECK\s+\d+", "CHECK PAYMENT"),
        (r"^DEPOSIT", "DEPOSIT"),
        (r"^REMOTE.*DEPOSIT", "REMOTE DEPOSIT"),
    ])
});

static NOISE_PATTERNS: LazyLock<Vec<Substitution>> = LazyLock::new(|| {
    [
        (r"\s+\d{10,}", ""),
        (r"\s+(?:WEB|PPD)\s+ID:\s*\d*", ""),
        (r"\s+#\d+", ""),
        (r"\*+", ""),
        (r"&AMP;", "&"),
        (r"&(?:GT|LT);", ""),
        (r"\s+[A-Z]{2}\s+\d{2}/\d{2}", ""),
        (r"(?i)https?://\S+", ""),
    ]
    .iter()
    .map(|(pat, replacement)| Substitution {
        re: regex(pat),
        replacement,
    })
    .collect()
});

// Capture group 1, when present, becomes the detail.
static MERCHANT_ALIASES: LazyLock<Vec<NamedPattern>> = LazyLock::new(|| {
    named(&[
        // Amazon
        (r"AMZN.*MKTP", "AMAZON"),
        (r"AMAZON.*MKTP", "AMAZON"),
        (r"AMAZON\.COM", "AMAZON"),
        // Warehouse clubs
        (r"COSTCO\s+WHSE", "COSTCO"),
        (r"COSTCO\s+GAS", "COSTCO GAS"),
        // Grocery
        (r"STOP\s*&?\s*SHOP", "STOP & SHOP"),
        (r"TRADER\s+JOE", "TRADER JOES"),
        (r"KEY\s+FOOD", "KEY FOOD"),
        // Delivery / ride share
        (r"DOORDASH", "DOORDASH"),
        (r"^DD\s+", "DOORDASH"),
        (r"GRUBHUB", "GRUBHUB"),
        (r"UBER\s+EATS", "UBER EATS"),
        (r"UBER.*TRIP", "UBER"),
        (r"LYFT", "LYFT"),
        // Pharmacy
        (r"CVS.*PHARMACY", "CVS"),
        (r"WALGREENS", "WALGREENS"),
        // Fuel
        (r"EXXON", "EXXON"),
        (r"\bSHELL\b", "SHELL"),
        (r"\bBP\s+", "BP"),
        // Transit (asterisk already stripped: "MTA*NYCT" -> "MTANYCT")
        (r"MTA\s*NYCT", "MTA SUBWAY"),
        (r"MTA\s*LIRR", "MTA LIRR"),
        // Payment processors that carry the seller
        (r"^PAYPAL\s+(.+)", "PAYPAL"),
    ])
});

static TRAILING_LONG_ID: LazyLock<Regex> = LazyLock::new(|| regex(r"\s+\d{10,}$"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| regex(r"\s+"));
static TRAILING_STORE_NUMBER: LazyLock<Regex> = LazyLock::new(|| regex(r"\s+#\s*\d+$"));

const LEGAL_SUFFIXES: [&str; 5] = [" INC", " LLC", " LTD", " CO", " CORP"];

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Clean an extracted sub-merchant / counterparty name.
fn clean_detail(raw: &str) -> Option<String> {
    let trimmed = TRAILING_LONG_ID.replace(raw.trim(), "");
    let detail = collapse_whitespace(&trimmed);
    if detail.is_empty() { None } else { Some(detail) }
}

fn captured_detail(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| clean_detail(m.as_str()))
}

/// Normalize a raw bank description into a canonical merchant and optional detail.
///
/// Pure and deterministic: the same input always yields the same output.
pub fn normalize_merchant(raw_description: &str) -> NormalizedMerchant {
    let text = raw_description.trim().to_uppercase();
    if text.is_empty() {
        return NormalizedMerchant::unknown();
    }

    for p in POS_AGGREGATORS.iter() {
        if let Some(detail) = captured_detail(&p.re, &text) {
            return NormalizedMerchant::new(p.name, Some(detail));
        }
    }

    for p in INTERNAL_PATTERNS.iter() {
        if p.re.is_match(&text) {
            let detail = if p.re.captures_len() > 1 {
                captured_detail(&p.re, &text)
            } else {
                None
            };
            return NormalizedMerchant::new(p.name, detail);
        }
    }

    let mut text = text;
    for s in NOISE_PATTERNS.iter() {
        text = s.re.replace_all(&text, s.replacement).into_owned();
    }

    for p in MERCHANT_ALIASES.iter() {
        if p.re.is_match(&text) {
            let detail = if p.re.captures_len() > 1 {
                captured_detail(&p.re, &text)
            } else {
                None
            };
            return NormalizedMerchant::new(p.name, detail);
        }
    }

    let mut text = collapse_whitespace(&text);
    text = TRAILING_STORE_NUMBER.replace(&text, "").into_owned();
    for suffix in LEGAL_SUFFIXES {
        if let Some(stripped) = text.strip_suffix(suffix) {
            text = stripped.trim().to_string();
        }
    }

    if text.chars().count() < 2 {
        return NormalizedMerchant::unknown();
    }

    NormalizedMerchant::new(text, None)
}
