//! Merchant rule records as loaded from the rule source.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Unknown match type: '{0}'")]
    UnknownMatchType(String),
    #[error("Failed to parse rules: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How `match_value` is compared against a normalized merchant name
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum MatchType {
    #[default]
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "startswith", alias = "starts_with")]
    StartsWith,
    #[serde(rename = "regex")]
    Regex,
}

impl std::str::FromStr for MatchType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(MatchType::Exact),
            "contains" => Ok(MatchType::Contains),
            "startswith" | "starts_with" => Ok(MatchType::StartsWith),
            "regex" => Ok(MatchType::Regex),
            other => Err(RuleError::UnknownMatchType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MerchantRule {
    pub rule_id: i64,
    /// Provenance tag, e.g. "learned" or "manual"
    #[serde(default = "default_rule_pack")]
    pub rule_pack: String,
    /// Lower is evaluated first
    pub priority: i32,
    #[serde(default)]
    pub match_type: MatchType,
    pub match_value: String,
    /// When set, the rule only fires if the transaction detail also matches
    #[serde(default)]
    pub match_detail: Option<String>,
    pub category: String,
    pub subcategory: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_rule_pack() -> String {
    "manual".to_string()
}

fn default_active() -> bool {
    true
}

impl MerchantRule {
    /// Active exact-match rule in the manual pack.
    pub fn exact(
        rule_id: i64,
        priority: i32,
        match_value: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        Self {
            rule_id,
            rule_pack: default_rule_pack(),
            priority,
            match_type: MatchType::Exact,
            match_value: match_value.into(),
            match_detail: None,
            category: category.into(),
            subcategory: subcategory.into(),
            is_active: true,
            created_by: None,
            notes: None,
        }
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.match_detail = Some(detail.into());
        self
    }

    pub fn with_pack(mut self, pack: impl Into<String>) -> Self {
        self.rule_pack = pack.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Parse a JSON list of rules.
    pub fn list_from_json(json: &str) -> Result<Vec<MerchantRule>, RuleError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_from_str() {
        assert_eq!("EXACT".parse::<MatchType>().unwrap(), MatchType::Exact);
        assert_eq!("startswith".parse::<MatchType>().unwrap(), MatchType::StartsWith);
        assert_eq!("starts_with".parse::<MatchType>().unwrap(), MatchType::StartsWith);
        assert_eq!(" regex ".parse::<MatchType>().unwrap(), MatchType::Regex);
        assert!("fuzzy".parse::<MatchType>().is_err());
    }

    #[test]
    fn test_rules_from_json_defaults() {
        let json = r#"[
            {"rule_id": 1, "priority": 100, "match_type": "exact", "match_value": "AMAZON",
             "category": "Shopping", "subcategory": "Amazon"},
            {"rule_id": 2, "rule_pack": "learned", "priority": 50, "match_type": "startswith",
             "match_value": "SQ", "match_detail": "BREADS BAKERY",
             "category": "Food & Drink", "subcategory": "Coffee", "is_active": false}
        ]"#;
        let rules = MerchantRule::list_from_json(json).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].rule_pack, "manual");
        assert!(rules[0].is_active);
        assert_eq!(rules[0].match_detail, None);
        assert_eq!(rules[1].match_type, MatchType::StartsWith);
        assert_eq!(rules[1].match_detail.as_deref(), Some("BREADS BAKERY"));
        assert!(!rules[1].is_active);
    }

    #[test]
    fn test_rules_from_bad_json() {
        assert!(matches!(
            MerchantRule::list_from_json("{not json"),
            Err(RuleError::Parse(_))
        ));
    }
}
