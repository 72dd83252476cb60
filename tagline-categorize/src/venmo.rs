//! Pairing Venmo statement rows with the bank lines they produced.
//!
//! Bank exports only say `VENMO OUTGOING` or `VENMO CASHOUT`. The Venmo
//! statement knows who was paid and why. Outgoing payments are matched one to
//! one; a cashout is split back into the incoming payments that summed to it.
//! Reading the Venmo export is up to the caller.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tagline_core::{Direction, TagSource, Transaction};
use tracing::{debug, info};

pub const VENMO_CASHOUT: &str = "VENMO CASHOUT";
/// Merchant given to income lines split out of a cashout
pub const VENMO_INCOME: &str = "VENMO FROM";
pub const EXPANDED_CATEGORY: &str = "Income";
pub const EXPANDED_SUBCATEGORY: &str = "Other";
pub const EXPANDED_CONFIDENCE: f64 = 0.80;

const STANDARD_TRANSFER: &str = "Standard Transfer";
const UNKNOWN_ACCOUNT: &str = "unknown";
const PAYMENT_WINDOW_DAYS: i64 = 1;
const CASHOUT_LOOKBACK_DAYS: i64 = 14;
const CASHOUT_TOLERANCE: f64 = 0.01;
/// Subset search is exhaustive, so it gives up past this many candidates.
pub const MAX_SUBSET_CANDIDATES: usize = 20;
const DESCRIPTION_MAX_CHARS: usize = 200;

/// One row of a Venmo statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenmoPayment {
    pub date: NaiveDate,
    /// Non-negative magnitude
    pub amount: f64,
    pub direction: Direction,
    /// Venmo's "Type" column (Payment, Standard Transfer, ...)
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub from_name: String,
    #[serde(default)]
    pub to_name: String,
    /// Which Venmo account the statement belongs to
    #[serde(default)]
    pub account_owner: Option<String>,
}

impl VenmoPayment {
    /// Venmo balance moved to the bank; not a payment between people.
    pub fn is_transfer(&self) -> bool {
        self.kind.trim().eq_ignore_ascii_case(STANDARD_TRANSFER)
    }

    /// Recipient of money sent, sender of money received.
    pub fn counterparty(&self) -> Option<&str> {
        let name = match self.direction {
            Direction::Debit => &self.to_name,
            Direction::Credit => &self.from_name,
        };
        Some(name.trim()).filter(|n| !n.is_empty())
    }

    /// "Note: rent | To: Jane Doe"
    pub fn enrichment_note(&self) -> String {
        let mut parts = Vec::new();
        if !self.note.trim().is_empty() {
            parts.push(format!("Note: {}", self.note.trim()));
        }
        if let Some(name) = self.counterparty() {
            let label = match self.direction {
                Direction::Debit => "To",
                Direction::Credit => "From",
            };
            parts.push(format!("{label}: {name}"));
        }
        parts.join(" | ")
    }
}

/// Parse Venmo's amount column: `- $3,700.00`, `+ $300.00`.
pub fn parse_venmo_amount(raw: &str) -> Option<(f64, Direction)> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '$' | ','))
        .collect();
    let direction = if cleaned.starts_with('+') || !cleaned.contains('-') {
        Direction::Credit
    } else {
        Direction::Debit
    };
    let digits: String = cleaned.chars().filter(|c| !matches!(c, '+' | '-')).collect();
    let amount = digits.parse::<f64>().ok().filter(|a| a.is_finite())?;
    Some((amount, direction))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    /// Same day on both sides
    High,
    /// Within the one-day settlement window
    Medium,
}

/// A Venmo payment (index into the payment slice) and the bank line it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMatch {
    pub payment: usize,
    pub txn: usize,
    pub confidence: MatchConfidence,
}

fn is_venmo_line(txn: &Transaction) -> bool {
    txn.merchant_norm.contains("VENMO") || txn.description_raw.to_uppercase().contains("VENMO")
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn days_apart(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Match Venmo payments to bank Venmo lines by amount, direction and date
/// (one day either side). Closest amount wins, then closest date. Transfers
/// are skipped and each bank line is claimed at most once.
pub fn match_payments(payments: &[VenmoPayment], txns: &[Transaction]) -> Vec<PaymentMatch> {
    let mut claimed = vec![false; txns.len()];
    let mut matches = Vec::new();

    for (pi, payment) in payments.iter().enumerate() {
        if payment.is_transfer() {
            continue;
        }
        let best = txns
            .iter()
            .enumerate()
            .filter(|(ti, t)| {
                !claimed[*ti]
                    && t.direction == payment.direction
                    && (t.amount - payment.amount).abs() < 0.01
                    && days_apart(t.txn_date, payment.date) <= PAYMENT_WINDOW_DAYS
                    && is_venmo_line(t)
            })
            .min_by_key(|(_, t)| {
                (
                    (to_cents(t.amount) - to_cents(payment.amount)).abs(),
                    days_apart(t.txn_date, payment.date),
                )
            });

        match best {
            Some((ti, t)) => {
                claimed[ti] = true;
                let confidence = if t.txn_date == payment.date {
                    MatchConfidence::High
                } else {
                    MatchConfidence::Medium
                };
                matches.push(PaymentMatch {
                    payment: pi,
                    txn: ti,
                    confidence,
                });
            }
            None => debug!(
                date = %payment.date,
                amount = payment.amount,
                "no bank line for Venmo payment"
            ),
        }
    }
    matches
}

/// Copy the counterparty and note from a matched payment onto its bank line.
///
/// The counterparty becomes the merchant detail (upper-cased like normalized
/// details) unless the line already has one, so composite rules keyed on
/// `VENMO OUTGOING` + payee can fire.
pub fn apply_payment_match(txn: &mut Transaction, payment: &VenmoPayment) {
    let note = payment.enrichment_note();
    if !note.is_empty() {
        txn.notes = Some(note);
    }
    if txn.merchant_detail.as_deref().is_none_or(|d| d.trim().is_empty()) {
        txn.merchant_detail = payment.counterparty().map(str::to_uppercase);
    }
}

/// Indices of a subset of `amounts` summing to `target` within `tolerance`.
///
/// Works in cents. Exact totals are tried before off-by-a-cent ones and
/// smaller subsets before larger. Returns `None` for an empty input or more
/// than [`MAX_SUBSET_CANDIDATES`] amounts.
pub fn find_subset_sum(amounts: &[f64], target: f64, tolerance: f64) -> Option<Vec<usize>> {
    if amounts.is_empty() || amounts.len() > MAX_SUBSET_CANDIDATES {
        return None;
    }
    let cents: Vec<i64> = amounts.iter().map(|a| to_cents(*a)).collect();
    let target = to_cents(target);
    let tolerance = to_cents(tolerance).abs();

    let mut offsets: Vec<i64> = (-tolerance..=tolerance).collect();
    offsets.sort_by_key(|o| o.abs());

    for offset in offsets {
        let goal = target + offset;
        if goal < 0 {
            continue;
        }
        for size in 1..=cents.len() {
            if let Some(found) = combination_summing_to(&cents, size, goal) {
                return Some(found);
            }
        }
    }
    None
}

// Walks combinations of `size` indices in lexicographic order.
fn combination_summing_to(cents: &[i64], size: usize, goal: i64) -> Option<Vec<usize>> {
    let n = cents.len();
    let mut idx: Vec<usize> = (0..size).collect();
    loop {
        if idx.iter().map(|&i| cents[i]).sum::<i64>() == goal {
            return Some(idx);
        }
        let mut i = size;
        loop {
            if i == 0 {
                return None;
            }
            i -= 1;
            if idx[i] != i + n - size {
                break;
            }
        }
        idx[i] += 1;
        for j in i + 1..size {
            idx[j] = idx[j - 1] + 1;
        }
    }
}

/// A bank cashout explained by incoming Venmo payments from one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashoutExpansion {
    /// Index of the `VENMO CASHOUT` line
    pub cashout: usize,
    pub account: String,
    /// Indices into the income slice
    pub payments: Vec<usize>,
}

/// Split bank cashouts into the Venmo income that funded them.
///
/// Only cashouts dated inside the span of the income data are considered,
/// oldest first. For each one, accounts are tried in first-seen order; the
/// candidates are that account's unused incoming payments from the 14 days
/// up to the cashout. The first account with a subset summing to the
/// cashout amount wins and its payments are used up.
pub fn expand_cashouts(income: &[VenmoPayment], txns: &[Transaction]) -> Vec<CashoutExpansion> {
    let incoming = |p: &VenmoPayment| p.direction == Direction::Credit && !p.is_transfer();
    let dates = income.iter().filter(|p| incoming(*p)).map(|p| p.date);
    let (Some(first), Some(last)) = (dates.clone().min(), dates.max()) else {
        return Vec::new();
    };

    let mut cashouts: Vec<usize> = txns
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            t.merchant_norm == VENMO_CASHOUT
                && t.direction == Direction::Credit
                && (first..=last).contains(&t.txn_date)
        })
        .map(|(i, _)| i)
        .collect();
    cashouts.sort_by(|&a, &b| {
        txns[a]
            .txn_date
            .cmp(&txns[b].txn_date)
            .then(txns[a].amount.total_cmp(&txns[b].amount))
    });

    let mut accounts: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, p) in income.iter().enumerate().filter(|(_, p)| incoming(*p)) {
        let owner = p.account_owner.as_deref().unwrap_or(UNKNOWN_ACCOUNT);
        match accounts.iter_mut().find(|(name, _)| name == owner) {
            Some((_, members)) => members.push(i),
            None => accounts.push((owner.to_string(), vec![i])),
        }
    }

    let mut used = vec![false; income.len()];
    let mut expansions = Vec::new();
    for ci in cashouts {
        let cashout = &txns[ci];
        let window_start = cashout.txn_date - Duration::days(CASHOUT_LOOKBACK_DAYS);

        let found = accounts.iter().find_map(|(owner, members)| {
            let mut candidates: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| !used[i] && (window_start..=cashout.txn_date).contains(&income[i].date))
                .collect();
            candidates.sort_by_key(|&i| income[i].date);
            let amounts: Vec<f64> = candidates.iter().map(|&i| income[i].amount).collect();
            let picked = find_subset_sum(&amounts, cashout.amount, CASHOUT_TOLERANCE)?;
            Some((owner.clone(), picked.into_iter().map(|k| candidates[k]).collect::<Vec<_>>()))
        });

        match found {
            Some((account, payments)) => {
                for &i in &payments {
                    used[i] = true;
                }
                info!(
                    date = %cashout.txn_date,
                    amount = cashout.amount,
                    account = %account,
                    payments = payments.len(),
                    "matched Venmo cashout"
                );
                expansions.push(CashoutExpansion {
                    cashout: ci,
                    account,
                    payments,
                });
            }
            None => debug!(
                date = %cashout.txn_date,
                amount = cashout.amount,
                "no combination of Venmo income equals cashout"
            ),
        }
    }
    expansions
}

/// The income transactions that replace an expanded cashout.
///
/// Each lands in the review queue as `Income / Other` with the sender as
/// merchant detail, on the cashout's account and with its date as post date.
pub fn income_transactions(
    expansion: &CashoutExpansion,
    income: &[VenmoPayment],
    cashout: &Transaction,
) -> Vec<Transaction> {
    let account = &expansion.account;
    expansion
        .payments
        .iter()
        .filter_map(|&i| income.get(i))
        .map(|p| {
            let sender = p.from_name.trim();
            let note = p.note.trim();
            let mut description = format!("Venmo (@{account}) from {sender}");
            let mut notes = format!("Venmo Account: @{account} | From: {sender}");
            if !note.is_empty() {
                description.push_str(&format!(": {note}"));
                notes.push_str(&format!(" | Note: {note}"));
            }
            let description: String = description.chars().take(DESCRIPTION_MAX_CHARS).collect();
            let detail = Some(sender.to_uppercase()).filter(|d| !d.is_empty());

            let mut txn = Transaction::new(VENMO_INCOME, detail, description, p.amount, Direction::Credit, p.date)
                .with_post_date(cashout.txn_date);
            txn.account_id = cashout.account_id;
            txn.source = cashout.source.clone();
            txn.set_category(
                EXPANDED_CATEGORY,
                EXPANDED_SUBCATEGORY,
                TagSource::Enrichment,
                EXPANDED_CONFIDENCE,
                true,
                notes,
            );
            txn
        })
        .collect()
}
