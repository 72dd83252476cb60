//! Transaction record flowing through normalization and categorization

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{NEEDS_REVIEW, UNCATEGORIZED};

/// Money direction relative to the account holder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Direction {
    #[serde(rename = "debit")]
    Debit,
    #[serde(rename = "credit")]
    Credit,
}

impl Direction {
    /// Label used in LLM prompts
    pub fn prompt_label(&self) -> &'static str {
        match self {
            Direction::Debit => "Expense",
            Direction::Credit => "Income/Credit",
        }
    }
}

/// Which stage produced the category on a transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TagSource {
    #[serde(rename = "rule")]
    Rule,
    #[serde(rename = "llm")]
    Llm,
    #[serde(rename = "manual")]
    Manual,
    /// Derived from a second source (Venmo statement, Amazon order history)
    #[serde(rename = "enrichment")]
    Enrichment,
    /// Nothing categorized the transaction; it sits in the review queue.
    #[serde(rename = "none")]
    None,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::Rule => "rule",
            TagSource::Llm => "llm",
            TagSource::Manual => "manual",
            TagSource::Enrichment => "enrichment",
            TagSource::None => "none",
        }
    }
}

/// A single transaction, mutated in place by the categorization pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    /// External id assigned by the persistence layer, if any
    #[serde(default)]
    pub txn_id: Option<i64>,
    /// Canonical merchant name
    pub merchant_norm: String,
    /// Sub-merchant qualifier (POS sub-seller, Zelle counterparty, ...)
    #[serde(default)]
    pub merchant_detail: Option<String>,
    /// Original description, kept for audit
    pub description_raw: String,
    /// Non-negative magnitude
    pub amount: f64,
    pub direction: Direction,
    pub txn_date: NaiveDate,
    #[serde(default)]
    pub post_date: Option<NaiveDate>,
    #[serde(default)]
    pub account_id: Option<i64>,
    /// Import source label (bank export, amazon, venmo, ...)
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub tag_source: Option<TagSource>,
    #[serde(default)]
    pub tag_confidence: Option<f64>,
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Transaction {
    /// Create an uncategorized transaction. `amount` is stored as a magnitude.
    pub fn new(
        merchant_norm: impl Into<String>,
        merchant_detail: Option<String>,
        description_raw: impl Into<String>,
        amount: f64,
        direction: Direction,
        txn_date: NaiveDate,
    ) -> Self {
        Self {
            txn_id: None,
            merchant_norm: merchant_norm.into(),
            merchant_detail,
            description_raw: description_raw.into(),
            amount: amount.abs(),
            direction,
            txn_date,
            post_date: None,
            account_id: None,
            source: String::new(),
            category: None,
            subcategory: None,
            tag_source: None,
            tag_confidence: None,
            needs_review: false,
            notes: None,
        }
    }

    pub fn with_post_date(mut self, post_date: NaiveDate) -> Self {
        self.post_date = Some(post_date);
        self
    }

    pub fn with_account(mut self, account_id: i64, source: impl Into<String>) -> Self {
        self.account_id = Some(account_id);
        self.source = source.into();
        self
    }

    /// True once any stage has written a tag source.
    pub fn is_categorized(&self) -> bool {
        self.tag_source.is_some()
    }

    /// Record a final categorization decision.
    pub fn set_category(
        &mut self,
        category: impl Into<String>,
        subcategory: impl Into<String>,
        tag_source: TagSource,
        confidence: f64,
        needs_review: bool,
        notes: impl Into<String>,
    ) {
        self.category = Some(category.into());
        self.subcategory = Some(subcategory.into());
        self.tag_source = Some(tag_source);
        self.tag_confidence = Some(match tag_source {
            TagSource::Rule | TagSource::Manual => 1.0,
            _ => confidence.clamp(0.0, 1.0),
        });
        self.needs_review = needs_review;
        self.notes = Some(notes.into());
    }

    /// Park the transaction in the review queue with no suggestion.
    pub fn mark_for_review(&mut self, notes: impl Into<String>) {
        self.set_category(UNCATEGORIZED, NEEDS_REVIEW, TagSource::None, 0.0, true, notes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction::new(
            "AMAZON",
            None,
            "AMZN Mktp US*UE1F70L13",
            -25.0,
            Direction::Debit,
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        )
    }

    #[test]
    fn test_new_stores_magnitude() {
        let t = sample();
        assert_eq!(t.amount, 25.0);
        assert!(!t.is_categorized());
        assert_eq!(t.category, None);
    }

    #[test]
    fn test_rule_and_manual_pin_confidence() {
        let mut t = sample();
        t.set_category("Shopping", "Amazon", TagSource::Rule, 0.2, false, "Matched rule 1");
        assert_eq!(t.tag_confidence, Some(1.0));

        t.set_category("Shopping", "Amazon", TagSource::Manual, 0.0, false, "reviewed");
        assert_eq!(t.tag_confidence, Some(1.0));
    }

    #[test]
    fn test_mark_for_review() {
        let mut t = sample();
        t.mark_for_review("No matching rule");
        assert_eq!(t.category.as_deref(), Some("Uncategorized"));
        assert_eq!(t.subcategory.as_deref(), Some("Needs Review"));
        assert_eq!(t.tag_source, Some(TagSource::None));
        assert_eq!(t.tag_confidence, Some(0.0));
        assert!(t.needs_review);
    }

    #[test]
    fn test_serde_lowercase_enums() {
        let mut t = sample();
        t.set_category("Shopping", "Amazon", TagSource::Llm, 0.9, false, "online retail");
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["direction"], "debit");
        assert_eq!(v["tag_source"], "llm");

        let back: Transaction = serde_json::from_value(v).unwrap();
        assert_eq!(back, t);
    }
}
