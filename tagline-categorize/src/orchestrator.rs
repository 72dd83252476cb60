//! Categorization policy: rules first, LLM second, review queue last.

use std::fmt;

use tagline_core::{MerchantRule, TagSource, Taxonomy, Transaction};
use tracing::{debug, info, warn};

use crate::llm_categorizer::{LlmCategorizer, LlmSuggestion, TransactionSummary};
use crate::rule_matcher::{CategorizationResult, MatcherStats, RuleMatcher};

const NO_RULE: &str = "No matching rule";
const NO_RULE_OR_LLM: &str = "No matching rule or LLM suggestion";

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// LLM suggestions below this confidence go to review
    pub review_threshold: f64,
    pub enable_llm: bool,
    /// Transactions per LLM batch request
    pub chunk_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            review_threshold: 0.80,
            enable_llm: true,
            chunk_size: 50,
        }
    }
}

/// How a single transaction was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    RuleMatched,
    /// LLM suggestion at or above the review threshold
    LlmAccepted,
    /// LLM suggestion below the review threshold
    LlmReview,
    NoSuggestion,
}

impl Outcome {
    pub fn needs_review(&self) -> bool {
        matches!(self, Outcome::LlmReview | Outcome::NoSuggestion)
    }
}

/// Counters for one orchestrator instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub rule_match: usize,
    pub llm_suggest: usize,
    pub high_confidence: usize,
    pub needs_review: usize,
}

impl RunStats {
    fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::RuleMatched => {
                self.rule_match += 1;
                self.high_confidence += 1;
            }
            Outcome::LlmAccepted => {
                self.llm_suggest += 1;
                self.high_confidence += 1;
            }
            Outcome::LlmReview => {
                self.llm_suggest += 1;
                self.needs_review += 1;
            }
            Outcome::NoSuggestion => self.needs_review += 1,
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return writeln!(f, "Categorization: no transactions processed");
        }
        let pct = |n: usize| n as f64 / self.total as f64 * 100.0;
        writeln!(f, "Categorization: {} transactions", self.total)?;
        writeln!(f, "  rule match:      {:>5} ({:.1}%)", self.rule_match, pct(self.rule_match))?;
        writeln!(f, "  llm suggestion:  {:>5} ({:.1}%)", self.llm_suggest, pct(self.llm_suggest))?;
        writeln!(f, "  high confidence: {:>5} ({:.1}%)", self.high_confidence, pct(self.high_confidence))?;
        writeln!(f, "  needs review:    {:>5} ({:.1}%)", self.needs_review, pct(self.needs_review))
    }
}

pub struct CategorizationOrchestrator {
    matcher: RuleMatcher,
    llm: Option<LlmCategorizer>,
    config: OrchestratorConfig,
    rejected_rules: Vec<MerchantRule>,
    stats: RunStats,
}

impl CategorizationOrchestrator {
    /// Rules whose category/subcategory pair is not in `taxonomy` are dropped.
    pub fn new(
        taxonomy: &Taxonomy,
        rules: Vec<MerchantRule>,
        llm: Option<LlmCategorizer>,
        config: OrchestratorConfig,
    ) -> Self {
        let (valid, rejected): (Vec<_>, Vec<_>) = rules
            .into_iter()
            .partition(|r| !r.is_active || taxonomy.contains(&r.category, &r.subcategory));
        for rule in &rejected {
            warn!(
                rule_id = rule.rule_id,
                category = %rule.category,
                subcategory = %rule.subcategory,
                "rule targets a category not in the taxonomy; skipping"
            );
        }

        if config.enable_llm && !llm.as_ref().is_some_and(LlmCategorizer::is_enabled) {
            info!("LLM categorization requested but unavailable; unmatched transactions go to review");
        }

        Self {
            matcher: RuleMatcher::load(valid),
            llm,
            config,
            rejected_rules: rejected,
            stats: RunStats::default(),
        }
    }

    /// The LLM categorizer to consult, if it is both configured and usable.
    fn active_llm(&self) -> Option<&LlmCategorizer> {
        if !self.config.enable_llm {
            return None;
        }
        self.llm.as_ref().filter(|l| l.is_enabled())
    }

    pub fn llm_enabled(&self) -> bool {
        self.active_llm().is_some()
    }

    pub fn review_threshold(&self) -> f64 {
        self.config.review_threshold
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn matcher_stats(&self) -> &MatcherStats {
        self.matcher.stats()
    }

    pub fn rejected_rules(&self) -> &[MerchantRule] {
        &self.rejected_rules
    }

    pub fn categorize_transaction(&mut self, txn: &mut Transaction) -> Outcome {
        let result = self.matcher.categorize(&txn.merchant_norm, txn.merchant_detail.as_deref());
        let outcome = if result.is_match() {
            apply_rule(txn, result)
        } else {
            match self.active_llm() {
                Some(llm) => {
                    let suggestion = llm.categorize(&TransactionSummary::from(&*txn));
                    self.apply_llm(txn, suggestion)
                }
                None => no_suggestion(txn, NO_RULE),
            }
        };
        self.stats.record(outcome);
        outcome
    }

    /// Categorize in place, one LLM batch for everything rules missed.
    /// Outcomes are returned in input order.
    pub fn categorize_batch(&mut self, txns: &mut [Transaction]) -> Vec<Outcome> {
        let mut outcomes: Vec<Option<Outcome>> = vec![None; txns.len()];
        let mut unmatched = Vec::new();

        for (i, txn) in txns.iter_mut().enumerate() {
            let result = self.matcher.categorize(&txn.merchant_norm, txn.merchant_detail.as_deref());
            if result.is_match() {
                outcomes[i] = Some(apply_rule(txn, result));
            } else {
                unmatched.push(i);
            }
        }
        debug!(
            total = txns.len(),
            unmatched = unmatched.len(),
            "rule pass complete"
        );

        let suggestions: Vec<Option<LlmSuggestion>> = match self.active_llm() {
            Some(llm) if !unmatched.is_empty() => {
                let summaries: Vec<TransactionSummary> =
                    unmatched.iter().map(|&i| TransactionSummary::from(&txns[i])).collect();
                llm.categorize_batch(&summaries, self.config.chunk_size)
            }
            _ => Vec::new(),
        };
        let llm_consulted = self.llm_enabled();

        let mut suggestions = suggestions.into_iter();
        for &i in &unmatched {
            let outcome = if llm_consulted {
                self.apply_llm(&mut txns[i], suggestions.next().flatten())
            } else {
                no_suggestion(&mut txns[i], NO_RULE)
            };
            outcomes[i] = Some(outcome);
        }

        let outcomes: Vec<Outcome> = outcomes
            .into_iter()
            .map(|o| o.unwrap_or(Outcome::NoSuggestion))
            .collect();
        for &outcome in &outcomes {
            self.stats.record(outcome);
        }
        outcomes
    }

    fn apply_llm(&self, txn: &mut Transaction, suggestion: Option<LlmSuggestion>) -> Outcome {
        let Some(s) = suggestion else {
            return no_suggestion(txn, NO_RULE_OR_LLM);
        };
        let needs_review = s.confidence < self.config.review_threshold;
        let notes = if s.rationale.is_empty() {
            "LLM suggestion".to_string()
        } else {
            s.rationale
        };
        txn.set_category(s.category, s.subcategory, TagSource::Llm, s.confidence, needs_review, notes);
        if needs_review {
            Outcome::LlmReview
        } else {
            Outcome::LlmAccepted
        }
    }
}

fn apply_rule(txn: &mut Transaction, result: CategorizationResult) -> Outcome {
    txn.set_category(
        result.category,
        result.subcategory,
        TagSource::Rule,
        result.tag_confidence,
        false,
        result.rationale,
    );
    Outcome::RuleMatched
}

fn no_suggestion(txn: &mut Transaction, notes: &str) -> Outcome {
    txn.mark_for_review(notes);
    Outcome::NoSuggestion
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tagline_core::{Direction, TaxonomyCategory};

    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(vec![
            TaxonomyCategory::new("Food & Drink", &["Coffee", "Restaurants"]),
            TaxonomyCategory::new("Shopping", &["Amazon"]),
        ])
        .unwrap()
    }

    fn txn(merchant: &str) -> Transaction {
        Transaction::new(
            merchant,
            None,
            merchant,
            12.5,
            Direction::Debit,
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
        )
    }

    fn rules() -> Vec<MerchantRule> {
        vec![MerchantRule::exact(1, 100, "AMAZON", "Shopping", "Amazon")]
    }

    #[test]
    fn test_rule_hit_finalizes() {
        let mut o = CategorizationOrchestrator::new(&taxonomy(), rules(), None, OrchestratorConfig::default());
        let mut t = txn("AMAZON");
        assert_eq!(o.categorize_transaction(&mut t), Outcome::RuleMatched);
        assert_eq!(t.category.as_deref(), Some("Shopping"));
        assert_eq!(t.tag_source, Some(TagSource::Rule));
        assert_eq!(t.tag_confidence, Some(1.0));
        assert!(!t.needs_review);
        assert_eq!(t.notes.as_deref(), Some("Matched rule 1"));
    }

    #[test]
    fn test_no_rule_no_llm() {
        let mut o = CategorizationOrchestrator::new(&taxonomy(), rules(), None, OrchestratorConfig::default());
        assert!(!o.llm_enabled());
        let mut t = txn("CORNER DELI");
        assert_eq!(o.categorize_transaction(&mut t), Outcome::NoSuggestion);
        assert_eq!(t.category.as_deref(), Some("Uncategorized"));
        assert_eq!(t.subcategory.as_deref(), Some("Needs Review"));
        assert_eq!(t.tag_source, Some(TagSource::None));
        assert_eq!(t.tag_confidence, Some(0.0));
        assert!(t.needs_review);
        assert_eq!(t.notes.as_deref(), Some("No matching rule"));
    }

    #[test]
    fn test_rules_outside_taxonomy_rejected() {
        let mut rs = rules();
        rs.push(MerchantRule::exact(2, 50, "DELTA", "Travel", "Flights"));
        let mut o = CategorizationOrchestrator::new(&taxonomy(), rs, None, OrchestratorConfig::default());
        assert_eq!(o.rejected_rules().len(), 1);
        assert_eq!(o.rejected_rules()[0].rule_id, 2);
        let mut t = txn("DELTA");
        assert_eq!(o.categorize_transaction(&mut t), Outcome::NoSuggestion);
    }

    #[test]
    fn test_stats_accumulate_and_report() {
        let mut o = CategorizationOrchestrator::new(&taxonomy(), rules(), None, OrchestratorConfig::default());
        let mut batch = vec![txn("AMAZON"), txn("CORNER DELI"), txn("AMAZON"), txn("BODEGA")];
        let outcomes = o.categorize_batch(&mut batch);
        assert_eq!(
            outcomes,
            vec![
                Outcome::RuleMatched,
                Outcome::NoSuggestion,
                Outcome::RuleMatched,
                Outcome::NoSuggestion
            ]
        );
        let s = *o.stats();
        assert_eq!(s.total, 4);
        assert_eq!(s.rule_match, 2);
        assert_eq!(s.high_confidence, 2);
        assert_eq!(s.needs_review, 2);
        assert_eq!(s.llm_suggest, 0);
        assert!(s.to_string().contains("rule match:          2 (50.0%)"));
        assert_eq!(o.matcher_stats().matches, 2);
    }

    #[test]
    fn test_outcome_review_flag() {
        assert!(Outcome::LlmReview.needs_review());
        assert!(Outcome::NoSuggestion.needs_review());
        assert!(!Outcome::LlmAccepted.needs_review());
        assert!(!Outcome::RuleMatched.needs_review());
    }
}
