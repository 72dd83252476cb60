//! Splitting Amazon card charges into the products that were bought.
//!
//! A card statement shows one `AMAZON` line per order. Order history lists
//! the items. Orders are matched to charges by date and total, and each item
//! becomes its own transaction, categorized by product name when an LLM is
//! available.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tagline_core::{Direction, TagSource, Transaction};
use tracing::{debug, info};

use crate::llm_categorizer::{LlmCategorizer, LlmSuggestion, TransactionSummary};

pub const AMAZON_MERCHANT: &str = "AMAZON";
/// Source label on transactions created from order history
pub const ENRICHMENT_SOURCE: &str = "amazon_enrichment";
pub const FALLBACK_CATEGORY: &str = "Shopping";
pub const FALLBACK_SUBCATEGORY: &str = "Amazon";
pub const ORDER_MATCH_WINDOW_DAYS: i64 = 3;

const AMOUNT_TOLERANCE: f64 = 0.02;
const PROMPT_NAME_CHARS: usize = 100;
const DETAIL_CHARS: usize = 60;

fn one() -> u32 {
    1
}

/// One line of an Amazon order history export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmazonOrderItem {
    pub order_id: String,
    pub order_date: NaiveDate,
    pub product_name: String,
    #[serde(default)]
    pub asin: String,
    #[serde(default = "one")]
    pub quantity: u32,
    /// Charged for this line, tax and shipping included
    pub total_owed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmazonOrder {
    pub order_id: String,
    pub order_date: NaiveDate,
    pub items: Vec<AmazonOrderItem>,
    pub total: f64,
}

/// Group item rows into orders, oldest first (ties by order id).
pub fn group_orders(items: &[AmazonOrderItem]) -> Vec<AmazonOrder> {
    let mut orders: Vec<AmazonOrder> = Vec::new();
    let mut cents: Vec<i64> = Vec::new();
    for item in items {
        let line = (item.total_owed * 100.0).round() as i64;
        match orders.iter().position(|o| o.order_id == item.order_id) {
            Some(i) => {
                orders[i].items.push(item.clone());
                cents[i] += line;
            }
            None => {
                orders.push(AmazonOrder {
                    order_id: item.order_id.clone(),
                    order_date: item.order_date,
                    items: vec![item.clone()],
                    total: 0.0,
                });
                cents.push(line);
            }
        }
    }
    for (order, c) in orders.iter_mut().zip(cents) {
        order.total = c as f64 / 100.0;
    }
    orders.sort_by(|a, b| {
        a.order_date
            .cmp(&b.order_date)
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
    orders
}

fn is_original_charge(txn: &Transaction) -> bool {
    txn.merchant_norm == AMAZON_MERCHANT && txn.source != ENRICHMENT_SOURCE
}

/// Index of the `AMAZON` charge closest to the order: within `window_days`
/// of the order date and two cents of its total. Nearest date wins, then
/// nearest amount. Lines created from order history are never matched.
pub fn find_matching_transaction(
    order_date: NaiveDate,
    order_total: f64,
    txns: &[Transaction],
    window_days: i64,
) -> Option<usize> {
    candidates(order_date, order_total, txns, window_days, &[])
}

fn candidates(
    order_date: NaiveDate,
    order_total: f64,
    txns: &[Transaction],
    window_days: i64,
    claimed: &[bool],
) -> Option<usize> {
    let window = Duration::days(window_days);
    txns.iter()
        .enumerate()
        .filter(|(i, t)| {
            !claimed.get(*i).copied().unwrap_or(false)
                && is_original_charge(t)
                && t.txn_date >= order_date - window
                && t.txn_date <= order_date + window
                && (t.amount - order_total).abs() < AMOUNT_TOLERANCE
        })
        .min_by_key(|(_, t)| {
            (
                (t.txn_date - order_date).num_days().abs(),
                ((t.amount - order_total).abs() * 100.0).round() as i64,
            )
        })
        .map(|(i, _)| i)
}

/// An order and the card charge that paid for it, if one was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderMatch {
    pub order: usize,
    pub txn: Option<usize>,
}

/// Match every order to a charge; each charge pays for at most one order.
pub fn match_orders(orders: &[AmazonOrder], txns: &[Transaction]) -> Vec<OrderMatch> {
    let mut claimed = vec![false; txns.len()];
    let matches: Vec<OrderMatch> = orders
        .iter()
        .enumerate()
        .map(|(oi, order)| {
            let txn = candidates(order.order_date, order.total, txns, ORDER_MATCH_WINDOW_DAYS, &claimed);
            match txn {
                Some(ti) => claimed[ti] = true,
                None => debug!(order = %order.order_id, total = order.total, "no card charge for order"),
            }
            OrderMatch { order: oi, txn }
        })
        .collect();

    let matched = matches.iter().filter(|m| m.txn.is_some()).count();
    info!(orders = orders.len(), matched, "matched Amazon orders to card charges");
    matches
}

/// Ask the LLM to categorize a product by name. Without one, or when it has
/// nothing to offer, the product stays `Shopping / Amazon` with confidence 0.
pub fn categorize_product(llm: Option<&LlmCategorizer>, product_name: &str) -> LlmSuggestion {
    let fallback = || LlmSuggestion {
        category: FALLBACK_CATEGORY.to_string(),
        subcategory: FALLBACK_SUBCATEGORY.to_string(),
        confidence: 0.0,
        rationale: "Default Amazon category".to_string(),
    };
    let Some(llm) = llm.filter(|l| l.is_enabled()) else {
        return fallback();
    };

    let detail: String = product_name.chars().take(PROMPT_NAME_CHARS).collect();
    let description = format!("Amazon - {product_name}");
    let summary = TransactionSummary {
        merchant_norm: AMAZON_MERCHANT,
        merchant_detail: Some(detail.as_str()),
        description_raw: &description,
        amount: 0.0,
        direction: Direction::Debit,
    };
    llm.categorize(&summary).unwrap_or_else(fallback)
}

/// One review-queue transaction per order item.
///
/// Items take the charge's date and account when the order was matched;
/// otherwise the order date and no account, with a note that payment was
/// probably a gift card.
pub fn line_items(
    order: &AmazonOrder,
    charge: Option<&Transaction>,
    llm: Option<&LlmCategorizer>,
) -> Vec<Transaction> {
    let date = charge.map_or(order.order_date, |t| t.txn_date);
    let payment = if charge.is_some() {
        "Paid via credit card"
    } else {
        "Payment method unknown (possibly gift card)"
    };

    order
        .items
        .iter()
        .map(|item| {
            let suggestion = categorize_product(llm, &item.product_name);
            let short: String = item.product_name.chars().take(DETAIL_CHARS).collect();
            let notes = format!(
                "Order: {} | ASIN: {} | Qty: {} | {payment}",
                order.order_id, item.asin, item.quantity
            );

            let mut txn = Transaction::new(
                AMAZON_MERCHANT,
                Some(short.clone()),
                format!("Amazon - {short}"),
                item.total_owed,
                Direction::Debit,
                date,
            )
            .with_post_date(date);
            txn.account_id = charge.and_then(|t| t.account_id);
            txn.source = ENRICHMENT_SOURCE.to_string();
            txn.set_category(
                suggestion.category,
                suggestion.subcategory,
                TagSource::Enrichment,
                suggestion.confidence,
                true,
                notes,
            );
            txn
        })
        .collect()
}
