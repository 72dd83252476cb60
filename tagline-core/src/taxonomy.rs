//! Category taxonomy: the closed set of category/subcategory pairs every
//! rule or LLM suggestion is validated against.
//!
//! Accepted JSON shapes:
//! - `{"categories": [{"name": "Food & Drink", "subcategories": ["Coffee", ...]}, ...]}`
//! - a bare list of the same category objects
//!
//! The category key may be `name` or `category`; subcategories may be plain
//! strings or `{"name": "..."}` objects.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("Failed to parse taxonomy: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate category: {0}")]
    DuplicateCategory(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaxonomyCategory {
    pub name: String,
    pub display_order: u32,
    pub is_income: bool,
    pub is_transfer: bool,
    pub subcategories: Vec<String>,
}

impl TaxonomyCategory {
    pub fn new(name: impl Into<String>, subcategories: &[&str]) -> Self {
        Self {
            name: name.into(),
            display_order: 0,
            is_income: false,
            is_transfer: false,
            subcategories: subcategories.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn income(mut self) -> Self {
        self.is_income = true;
        self
    }

    pub fn transfer(mut self) -> Self {
        self.is_transfer = true;
        self
    }

    pub fn has_subcategory(&self, subcategory: &str) -> bool {
        self.subcategories.iter().any(|s| s == subcategory)
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Taxonomy {
    categories: Vec<TaxonomyCategory>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaxonomyFile {
    Wrapped { categories: Vec<RawCategory> },
    Bare(Vec<RawCategory>),
}

#[derive(Deserialize)]
struct RawCategory {
    #[serde(alias = "category")]
    name: String,
    #[serde(default)]
    display_order: Option<u32>,
    #[serde(default)]
    is_income: bool,
    #[serde(default)]
    is_transfer: bool,
    #[serde(default, alias = "subcats")]
    subcategories: Vec<RawSubcategory>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSubcategory {
    Name(String),
    Entry {
        #[serde(alias = "subcategory")]
        name: String,
    },
}

impl Taxonomy {
    /// Build a taxonomy, keeping the given order. Unset display orders
    /// (zero) are replaced by the 1-based position.
    pub fn new(categories: Vec<TaxonomyCategory>) -> Result<Self, TaxonomyError> {
        let mut out: Vec<TaxonomyCategory> = Vec::with_capacity(categories.len());
        for (i, mut cat) in categories.into_iter().enumerate() {
            if out.iter().any(|c| c.name == cat.name) {
                return Err(TaxonomyError::DuplicateCategory(cat.name));
            }
            if cat.display_order == 0 {
                cat.display_order = i as u32 + 1;
            }
            out.push(cat);
        }
        Ok(Self { categories: out })
    }

    pub fn from_json(json: &str) -> Result<Self, TaxonomyError> {
        let raw = match serde_json::from_str::<TaxonomyFile>(json)? {
            TaxonomyFile::Wrapped { categories } => categories,
            TaxonomyFile::Bare(categories) => categories,
        };

        let categories = raw
            .into_iter()
            .map(|c| TaxonomyCategory {
                name: c.name.trim().to_string(),
                display_order: c.display_order.unwrap_or(0),
                is_income: c.is_income,
                is_transfer: c.is_transfer,
                subcategories: c
                    .subcategories
                    .into_iter()
                    .map(|s| match s {
                        RawSubcategory::Name(n) => n,
                        RawSubcategory::Entry { name } => name,
                    })
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            })
            .filter(|c| !c.name.is_empty())
            .collect();

        Self::new(categories)
    }

    pub fn categories(&self) -> &[TaxonomyCategory] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&TaxonomyCategory> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn contains_category(&self, name: &str) -> bool {
        self.category(name).is_some()
    }

    /// True when `subcategory` is listed under `category`.
    pub fn contains(&self, category: &str, subcategory: &str) -> bool {
        self.category(category)
            .is_some_and(|c| c.has_subcategory(subcategory))
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of category/subcategory pairs
    pub fn pair_count(&self) -> usize {
        self.categories.iter().map(|c| c.subcategories.len()).sum()
    }

    /// One `- Category: sub1, sub2` line per category, in taxonomy order.
    pub fn prompt_lines(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("- {}: {}", c.name, c.subcategories.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Taxonomy {
        Taxonomy::new(vec![
            TaxonomyCategory::new("Food & Drink", &["Groceries", "Coffee", "Restaurants"]),
            TaxonomyCategory::new("Shopping", &["Amazon", "Clothing"]),
            TaxonomyCategory::new("Income", &["Salary", "Family Support"]).income(),
        ])
        .unwrap()
    }

    #[test]
    fn test_contains_pairs() {
        let t = sample();
        assert!(t.contains("Shopping", "Amazon"));
        assert!(!t.contains("Shopping", "Coffee"));
        assert!(!t.contains("Travel", "Flights"));
        assert!(t.contains_category("Income"));
        assert!(t.category("Income").unwrap().is_income);
        assert_eq!(t.pair_count(), 7);
    }

    #[test]
    fn test_display_order_defaults_to_position() {
        let t = sample();
        let orders: Vec<u32> = t.categories().iter().map(|c| c.display_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_prompt_lines() {
        let t = sample();
        let lines = t.prompt_lines();
        assert!(lines.starts_with("- Food & Drink: Groceries, Coffee, Restaurants\n"));
        assert!(lines.ends_with("- Income: Salary, Family Support"));
    }

    #[test]
    fn test_from_wrapped_json() {
        let json = r#"{"categories": [
            {"name": "Baby", "display_order": 4, "is_income": false, "is_transfer": false,
             "subcategories": ["Daycare", "Diapers"]},
            {"name": "Transfers", "is_transfer": true, "subcategories": [{"name": "Credit Card Payment"}]}
        ]}"#;
        let t = Taxonomy::from_json(json).unwrap();
        assert_eq!(t.categories().len(), 2);
        assert_eq!(t.category("Baby").unwrap().display_order, 4);
        assert!(t.contains("Transfers", "Credit Card Payment"));
        assert!(t.category("Transfers").unwrap().is_transfer);
    }

    #[test]
    fn test_from_bare_list_with_category_key() {
        let json = r#"[{"category": "Transport", "subcats": ["Subway", "Rideshare"]}]"#;
        let t = Taxonomy::from_json(json).unwrap();
        assert!(t.contains("Transport", "Rideshare"));
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let err = Taxonomy::new(vec![
            TaxonomyCategory::new("Shopping", &["Amazon"]),
            TaxonomyCategory::new("Shopping", &["Clothing"]),
        ])
        .unwrap_err();
        assert!(matches!(err, TaxonomyError::DuplicateCategory(name) if name == "Shopping"));
    }
}
