//! Deterministic merchant rule matching.
//!
//! Rules are evaluated in `(priority, rule_id)` order and the first rule that
//! matches wins. A rule with `match_detail` is a composite rule: it only fires
//! when the transaction's merchant detail and the rule detail contain one
//! another (either direction), which absorbs truncation between imports.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use tagline_core::{MatchType, MerchantRule, NEEDS_REVIEW, TagSource, UNCATEGORIZED};
use tracing::{debug, warn};

/// Outcome of running one transaction through the rule set
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizationResult {
    pub category: String,
    pub subcategory: String,
    pub tag_source: TagSource,
    pub tag_confidence: f64,
    pub needs_review: bool,
    pub matched_rule_id: Option<i64>,
    pub rationale: String,
}

impl CategorizationResult {
    fn matched(rule: &MerchantRule, merchant_detail: Option<&str>) -> Self {
        let mut rationale = format!("Matched rule {}", rule.rule_id);
        if let Some(detail) = merchant_detail {
            rationale.push_str(&format!(" (detail: {detail})"));
        }
        Self {
            category: rule.category.clone(),
            subcategory: rule.subcategory.clone(),
            tag_source: TagSource::Rule,
            tag_confidence: 1.0,
            needs_review: false,
            matched_rule_id: Some(rule.rule_id),
            rationale,
        }
    }

    fn no_match() -> Self {
        Self {
            category: UNCATEGORIZED.to_string(),
            subcategory: NEEDS_REVIEW.to_string(),
            tag_source: TagSource::None,
            tag_confidence: 0.0,
            needs_review: true,
            matched_rule_id: None,
            rationale: "No matching rule found".to_string(),
        }
    }

    /// Anything other than the Uncategorized fallback counts as a hit.
    pub fn is_match(&self) -> bool {
        self.category != UNCATEGORIZED
    }
}

/// Per-session counters. Live on the matcher instance, never global.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatcherStats {
    pub matches: usize,
    pub no_match: usize,
    pub by_rule_pack: BTreeMap<String, usize>,
}

impl MatcherStats {
    pub fn total(&self) -> usize {
        self.matches + self.no_match
    }
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 { 0.0 } else { part as f64 / total as f64 * 100.0 }
}

impl fmt::Display for MatcherStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total();
        if total == 0 {
            return writeln!(f, "Rule matcher: no transactions processed yet");
        }
        writeln!(f, "Rule matcher: {total} transactions")?;
        writeln!(f, "  matched:  {} ({:.1}%)", self.matches, pct(self.matches, total))?;
        writeln!(f, "  no match: {} ({:.1}%)", self.no_match, pct(self.no_match, total))?;
        if !self.by_rule_pack.is_empty() {
            let mut packs: Vec<_> = self.by_rule_pack.iter().collect();
            // Most-used pack first; BTreeMap order breaks ties by name.
            packs.sort_by(|a, b| b.1.cmp(a.1));
            writeln!(f, "  by rule pack:")?;
            for (pack, count) in packs {
                writeln!(f, "    {pack}: {count}")?;
            }
        }
        Ok(())
    }
}

/// A rule with its comparison inputs prepared once at load time.
struct CompiledRule {
    rule: MerchantRule,
    value_upper: String,
    detail_upper: Option<String>,
    /// Only set for regex rules whose pattern compiled.
    regex: Option<Regex>,
}

impl CompiledRule {
    fn new(rule: MerchantRule) -> Self {
        let regex = if rule.match_type == MatchType::Regex {
            match Regex::new(&format!("(?i){}", rule.match_value)) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(
                        rule_id = rule.rule_id,
                        pattern = %rule.match_value,
                        error = %e,
                        "invalid regex in rule; it will never match"
                    );
                    None
                }
            }
        } else {
            None
        };

        let detail_upper = rule
            .match_detail
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_uppercase);

        Self {
            value_upper: rule.match_value.trim().to_uppercase(),
            detail_upper,
            regex,
            rule,
        }
    }

    fn matches(&self, merchant_upper: &str, detail_upper: Option<&str>) -> bool {
        let name_matches = match self.rule.match_type {
            MatchType::Exact => merchant_upper == self.value_upper,
            MatchType::Contains => merchant_upper.contains(&self.value_upper),
            MatchType::StartsWith => merchant_upper.starts_with(&self.value_upper),
            MatchType::Regex => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(merchant_upper)),
        };
        if !name_matches {
            return false;
        }

        let Some(rule_detail) = &self.detail_upper else {
            return true;
        };
        let Some(txn_detail) = detail_upper else {
            return false;
        };
        rule_detail.contains(txn_detail) || txn_detail.contains(rule_detail.as_str())
    }
}

/// Ordered, read-only rule set plus this session's counters.
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
    stats: MatcherStats,
}

impl RuleMatcher {
    /// Keep active rules and sort them by `(priority, rule_id)`.
    pub fn load(rules: impl IntoIterator<Item = MerchantRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .filter(|r| r.is_active)
            .map(CompiledRule::new)
            .collect();
        compiled.sort_by(|a, b| {
            (a.rule.priority, a.rule.rule_id).cmp(&(b.rule.priority, b.rule.rule_id))
        });
        debug!(active_rules = compiled.len(), "loaded merchant rules");
        Self {
            rules: compiled,
            stats: MatcherStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> impl Iterator<Item = &MerchantRule> {
        self.rules.iter().map(|cr| &cr.rule)
    }

    /// First matching rule, without touching the counters.
    pub fn find_matching_rule(
        &self,
        merchant_norm: &str,
        merchant_detail: Option<&str>,
    ) -> Option<&MerchantRule> {
        let merchant_upper = merchant_norm.trim().to_uppercase();
        let detail_upper = merchant_detail
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_uppercase);
        self.rules
            .iter()
            .find(|cr| cr.matches(&merchant_upper, detail_upper.as_deref()))
            .map(|cr| &cr.rule)
    }

    /// Categorize one normalized merchant and record the outcome.
    pub fn categorize(
        &mut self,
        merchant_norm: &str,
        merchant_detail: Option<&str>,
    ) -> CategorizationResult {
        match self.find_matching_rule(merchant_norm, merchant_detail) {
            Some(rule) => {
                let pack = rule.rule_pack.clone();
                let result = CategorizationResult::matched(rule, merchant_detail);
                *self.stats.by_rule_pack.entry(pack).or_insert(0) += 1;
                self.stats.matches += 1;
                result
            }
            None => {
                self.stats.no_match += 1;
                CategorizationResult::no_match()
            }
        }
    }

    pub fn stats(&self) -> &MatcherStats {
        &self.stats
    }
}
