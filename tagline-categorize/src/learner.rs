//! Derive merchant rules from already-categorized history.
//!
//! Rows are grouped by normalized merchant. A merchant that appears often
//! enough and almost always lands in the same category/subcategory becomes
//! a `learned` rule; weaker patterns are reported for a human to decide.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tagline_core::{MerchantRule, UNCATEGORIZED};
use tagline_ingest::{UNKNOWN_MERCHANT, normalize_merchant};
use tracing::{debug, info};

/// Below this share a merchant is a conflict rather than a medium rule.
const MEDIUM_CONSISTENCY: f64 = 0.70;
const LEARNED_PACK: &str = "learned";
const LEARNED_PRIORITY: i32 = 100;
const MAX_SAMPLES: usize = 3;

/// One historical row. Field aliases match the spreadsheet export headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    #[serde(alias = "Description")]
    pub description: String,
    #[serde(alias = "Category")]
    pub category: String,
    #[serde(alias = "Sub Category", alias = "sub_category", default)]
    pub subcategory: String,
}

impl HistoricalRecord {
    pub fn new(
        description: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            category: category.into(),
            subcategory: subcategory.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedRule {
    pub merchant_norm: String,
    pub category: String,
    pub subcategory: String,
    pub occurrences: usize,
    /// Share of rows that used the winning pair
    pub consistency: f64,
    pub sample_descriptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub subcategory: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedConflict {
    #[serde(flatten)]
    pub rule: LearnedRule,
    /// Every pair seen for the merchant, most frequent first
    pub all_categories: Vec<CategoryCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningReport {
    pub high_confidence: Vec<LearnedRule>,
    pub medium_confidence: Vec<LearnedRule>,
    pub conflicts: Vec<LearnedConflict>,
    pub merchant_count: usize,
    pub record_count: usize,
}

impl LearningReport {
    /// High-confidence rules as exact-match rules, ids from `start_id`.
    pub fn to_merchant_rules(&self, start_id: i64) -> Vec<MerchantRule> {
        self.high_confidence
            .iter()
            .zip(start_id..)
            .map(|(r, id)| {
                let mut rule = MerchantRule::exact(
                    id,
                    LEARNED_PRIORITY,
                    &r.merchant_norm,
                    &r.category,
                    &r.subcategory,
                )
                .with_pack(LEARNED_PACK)
                .with_notes(format!(
                    "{} occurrences, {:.1}% consistency",
                    r.occurrences,
                    r.consistency * 100.0
                ));
                rule.created_by = Some(LEARNED_PACK.to_string());
                rule
            })
            .collect()
    }
}

impl fmt::Display for LearningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Learned from {} rows across {} merchants",
            self.record_count, self.merchant_count
        )?;
        writeln!(f, "  high confidence:   {}", self.high_confidence.len())?;
        for r in self.high_confidence.iter().take(10) {
            writeln!(
                f,
                "    {:<30} -> {} / {} ({} times, {:.0}%)",
                r.merchant_norm,
                r.category,
                r.subcategory,
                r.occurrences,
                r.consistency * 100.0
            )?;
        }
        writeln!(f, "  medium confidence: {}", self.medium_confidence.len())?;
        writeln!(f, "  conflicts:         {}", self.conflicts.len())?;
        for c in self.conflicts.iter().take(5) {
            let pairs = c
                .all_categories
                .iter()
                .map(|p| format!("{} / {} ({})", p.category, p.subcategory, p.count))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "    {:<30} {}", c.rule.merchant_norm, pairs)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryLearner {
    pub min_occurrences: usize,
    pub min_consistency: f64,
    overrides: Vec<(String, String, String)>,
}

impl Default for HistoryLearner {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            min_consistency: 0.90,
            overrides: Vec::new(),
        }
    }
}

/// Per-merchant tallies, in first-seen order.
#[derive(Default)]
struct MerchantTally {
    pairs: Vec<CategoryCount>,
    samples: Vec<String>,
    total: usize,
}

impl MerchantTally {
    fn add(&mut self, record: &HistoricalRecord, description: &str) {
        self.total += 1;
        match self
            .pairs
            .iter_mut()
            .find(|p| p.category == record.category.trim() && p.subcategory == record.subcategory.trim())
        {
            Some(p) => p.count += 1,
            None => self.pairs.push(CategoryCount {
                category: record.category.trim().to_string(),
                subcategory: record.subcategory.trim().to_string(),
                count: 1,
            }),
        }
        if self.samples.len() < MAX_SAMPLES && !self.samples.iter().any(|s| s == description) {
            self.samples.push(description.to_string());
        }
    }

    /// Pairs by count descending; stable, so ties keep first-seen order.
    fn ranked(&self) -> Vec<CategoryCount> {
        let mut pairs = self.pairs.clone();
        pairs.sort_by(|a, b| b.count.cmp(&a.count));
        pairs
    }
}

impl HistoryLearner {
    pub fn new(min_occurrences: usize, min_consistency: f64) -> Self {
        Self {
            min_occurrences,
            min_consistency,
            overrides: Vec::new(),
        }
    }

    /// Force `merchant_norm` to a pair regardless of what history says.
    pub fn with_override(
        mut self,
        merchant_norm: impl Into<String>,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        self.overrides
            .push((merchant_norm.into(), category.into(), subcategory.into()));
        self
    }

    fn override_for(&self, merchant: &str) -> Option<(&str, &str)> {
        self.overrides
            .iter()
            .find(|(m, _, _)| m == merchant)
            .map(|(_, c, s)| (c.as_str(), s.as_str()))
    }

    pub fn learn(&self, records: &[HistoricalRecord]) -> LearningReport {
        let mut order: Vec<String> = Vec::new();
        let mut tallies: HashMap<String, MerchantTally> = HashMap::new();
        let mut record_count = 0;

        for record in records {
            let category = record.category.trim();
            if category.is_empty() || category == "Category" || category == UNCATEGORIZED {
                continue;
            }
            let description = record.description.trim();
            let merchant = normalize_merchant(description).merchant_norm;
            if merchant == UNKNOWN_MERCHANT {
                debug!(description, "skipping row with unrecognizable merchant");
                continue;
            }
            record_count += 1;
            if !tallies.contains_key(&merchant) {
                order.push(merchant.clone());
            }
            tallies.entry(merchant).or_default().add(record, description);
        }

        let mut report = LearningReport {
            merchant_count: order.len(),
            record_count,
            ..LearningReport::default()
        };

        for merchant in order {
            let Some(tally) = tallies.remove(&merchant) else {
                continue;
            };

            if let Some((category, subcategory)) = self.override_for(&merchant) {
                report.high_confidence.push(LearnedRule {
                    merchant_norm: merchant,
                    category: category.to_string(),
                    subcategory: subcategory.to_string(),
                    occurrences: tally.total,
                    consistency: 1.0,
                    sample_descriptions: tally.samples,
                });
                continue;
            }

            if tally.total < self.min_occurrences {
                continue;
            }

            let ranked = tally.ranked();
            let Some(top) = ranked.first() else {
                continue;
            };
            let consistency = top.count as f64 / tally.total as f64;
            let rule = LearnedRule {
                merchant_norm: merchant,
                category: top.category.clone(),
                subcategory: top.subcategory.clone(),
                occurrences: tally.total,
                consistency,
                sample_descriptions: tally.samples,
            };

            if consistency >= self.min_consistency {
                report.high_confidence.push(rule);
            } else if consistency >= MEDIUM_CONSISTENCY {
                report.medium_confidence.push(rule);
            } else {
                report.conflicts.push(LearnedConflict {
                    rule,
                    all_categories: ranked,
                });
            }
        }

        let by_frequency =
            |a: &LearnedRule, b: &LearnedRule| b.occurrences.cmp(&a.occurrences).then_with(|| a.merchant_norm.cmp(&b.merchant_norm));
        report.high_confidence.sort_by(by_frequency);
        report.medium_confidence.sort_by(by_frequency);
        report.conflicts.sort_by(|a, b| by_frequency(&a.rule, &b.rule));

        info!(
            records = report.record_count,
            merchants = report.merchant_count,
            high = report.high_confidence.len(),
            medium = report.medium_confidence.len(),
            conflicts = report.conflicts.len(),
            "learned rules from history"
        );
        report
    }
}
