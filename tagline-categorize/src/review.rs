//! Applying a human decision from the review queue.

use tagline_core::{MerchantRule, TagSource, Taxonomy, Transaction};
use tagline_ingest::UNKNOWN_MERCHANT;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReviewError {
    #[error("'{category} / {subcategory}' is not in the taxonomy")]
    NotInTaxonomy {
        category: String,
        subcategory: String,
    },
}

/// Set a reviewer-chosen category on `txn`.
pub fn apply_manual_review(
    taxonomy: &Taxonomy,
    txn: &mut Transaction,
    category: &str,
    subcategory: &str,
    note: Option<&str>,
) -> Result<(), ReviewError> {
    if !taxonomy.contains(category, subcategory) {
        return Err(ReviewError::NotInTaxonomy {
            category: category.to_string(),
            subcategory: subcategory.to_string(),
        });
    }
    let notes = note
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("Manually reviewed");
    txn.set_category(category, subcategory, TagSource::Manual, 1.0, false, notes);
    Ok(())
}

/// Turn a reviewed transaction into a rule for future imports.
///
/// Returns `None` if the transaction has no category yet or its merchant
/// could not be normalized. The rule is composite when the transaction has
/// a merchant detail, so one Zelle payee does not recategorize every Zelle.
pub fn rule_from_review(txn: &Transaction, rule_id: i64, priority: i32) -> Option<MerchantRule> {
    let category = txn.category.as_deref()?;
    let subcategory = txn.subcategory.as_deref()?;
    if txn.merchant_norm.is_empty() || txn.merchant_norm == UNKNOWN_MERCHANT {
        return None;
    }

    let mut rule = MerchantRule::exact(rule_id, priority, &txn.merchant_norm, category, subcategory);
    if let Some(detail) = txn.merchant_detail.as_deref().filter(|d| !d.trim().is_empty()) {
        rule = rule.with_detail(detail);
    }
    rule.created_by = Some("review".to_string());
    if let Some(notes) = &txn.notes {
        rule = rule.with_notes(notes.clone());
    }
    Some(rule)
}
