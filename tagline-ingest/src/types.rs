use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tagline_core::{Direction, Transaction};

use crate::normalizer::normalize_merchant;

/// Sign convention of the statement the rows came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Positive amount = charge
    CreditCard,
    /// Negative amount = money leaving the account
    BankAccount,
}

/// Normalized output of statement parsers (bank-agnostic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementTransaction {
    pub trans_date: NaiveDate,
    #[serde(default)]
    pub post_date: Option<NaiveDate>,
    pub description: String,
    /// Signed as the statement prints it; see [`StatementKind`].
    pub amount: f64,
    /// Optional running balance (debit/checking statements often include this)
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub raw_category: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl StatementTransaction {
    pub fn direction(&self, kind: StatementKind) -> Direction {
        let outflow = match kind {
            StatementKind::CreditCard => self.amount >= 0.0,
            StatementKind::BankAccount => self.amount <= 0.0,
        };
        if outflow { Direction::Debit } else { Direction::Credit }
    }

    /// Build an uncategorized [`Transaction`] with a normalized merchant.
    pub fn to_transaction(&self, kind: StatementKind) -> Transaction {
        let (merchant_norm, merchant_detail) = normalize_merchant(&self.description).into_parts();
        let mut txn = Transaction::new(
            merchant_norm,
            merchant_detail,
            self.description.clone(),
            self.amount,
            self.direction(kind),
            self.trans_date,
        );
        txn.post_date = self.post_date;
        txn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(description: &str, amount: f64) -> StatementTransaction {
        StatementTransaction {
            trans_date: NaiveDate::from_ymd_opt(2026, 4, 22).unwrap(),
            post_date: NaiveDate::from_ymd_opt(2026, 4, 23),
            description: description.to_string(),
            amount,
            balance: None,
            currency: "USD".to_string(),
            raw_category: None,
        }
    }

    #[test]
    fn test_credit_card_sign_convention() {
        assert_eq!(row("SQ *BREADS BAKERY", 8.5).direction(StatementKind::CreditCard), Direction::Debit);
        assert_eq!(row("AMAZON.COM REFUND", -20.0).direction(StatementKind::CreditCard), Direction::Credit);
    }

    #[test]
    fn test_bank_account_sign_convention() {
        assert_eq!(row("Discover E-Payment", -15.0).direction(StatementKind::BankAccount), Direction::Debit);
        assert_eq!(row("PAYROLL ACME INC", 100.0).direction(StatementKind::BankAccount), Direction::Credit);
    }

    #[test]
    fn test_to_transaction_normalizes() {
        let txn = row("Zelle payment to Devi Daycare  27420707612", -350.0)
            .to_transaction(StatementKind::BankAccount);
        assert_eq!(txn.merchant_norm, "ZELLE TO");
        assert_eq!(txn.merchant_detail.as_deref(), Some("DEVI DAYCARE"));
        assert_eq!(txn.amount, 350.0);
        assert_eq!(txn.direction, Direction::Debit);
        assert_eq!(txn.post_date, NaiveDate::from_ymd_opt(2026, 4, 23));
        assert!(!txn.is_categorized());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{"trans_date": "2026-02-16", "description": "MTA*NYCT PAYGO", "amount": 2.9}"#;
        let t: StatementTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(t.currency, "USD");
        assert_eq!(t.post_date, None);
    }
}
