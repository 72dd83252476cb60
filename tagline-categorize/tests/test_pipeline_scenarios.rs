use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tagline_categorize::{
    CategorizationOrchestrator, CompletionProvider, CompletionRequest, LlmCategorizer, LlmError,
    LlmSettings, OrchestratorConfig, Outcome,
};
use tagline_core::{MerchantRule, TagSource, Taxonomy, Transaction};
use tagline_ingest::{StatementKind, StatementTransaction};

/// Replays canned completions in order and counts requests.
struct CannedProvider {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<usize>,
}

impl CannedProvider {
    fn new(replies: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect()),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CompletionProvider for CannedProvider {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        *self.calls.lock().unwrap() += 1;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("no more replies".into())))
    }
}

const TAXONOMY: &str = r#"{"categories": [
    {"name": "Food & Drink", "subcategories": ["Coffee", "Restaurants", "Groceries"]},
    {"name": "Shopping", "subcategories": ["Amazon", "General"]},
    {"name": "Baby", "subcategories": ["Daycare", "Diapers"]},
    {"name": "Transport", "subcategories": ["Subway", "Rideshare"]}
]}"#;

const RULES: &str = r#"[
    {"rule_id": 1, "priority": 100, "match_type": "exact", "match_value": "AMAZON",
     "category": "Shopping", "subcategory": "Amazon", "rule_pack": "learned"},
    {"rule_id": 2, "priority": 50, "match_type": "exact", "match_value": "SQ",
     "match_detail": "BAKERY", "category": "Food & Drink", "subcategory": "Coffee"},
    {"rule_id": 3, "priority": 50, "match_type": "exact", "match_value": "ZELLE TO",
     "match_detail": "DEVI DAYCARE", "category": "Baby", "subcategory": "Daycare"},
    {"rule_id": 4, "priority": 100, "match_type": "startswith", "match_value": "MTA",
     "category": "Transport", "subcategory": "Subway"}
]"#;

fn taxonomy() -> Taxonomy {
    Taxonomy::from_json(TAXONOMY).unwrap()
}

fn rules() -> Vec<MerchantRule> {
    MerchantRule::list_from_json(RULES).unwrap()
}

fn statement(description: &str, amount: f64) -> Transaction {
    StatementTransaction {
        trans_date: NaiveDate::from_ymd_opt(2025, 5, 10).unwrap(),
        post_date: NaiveDate::from_ymd_opt(2025, 5, 11),
        description: description.to_string(),
        amount,
        balance: None,
        currency: "USD".to_string(),
        raw_category: None,
    }
    .to_transaction(StatementKind::CreditCard)
}

fn fast() -> LlmSettings {
    LlmSettings {
        inter_chunk_delay: Duration::ZERO,
        retry_delay: Duration::ZERO,
        ..LlmSettings::default()
    }
}

fn with_llm(provider: Arc<CannedProvider>) -> CategorizationOrchestrator {
    let llm = LlmCategorizer::with_provider(taxonomy(), provider).with_settings(fast());
    CategorizationOrchestrator::new(&taxonomy(), rules(), Some(llm), OrchestratorConfig::default())
}

fn without_llm() -> CategorizationOrchestrator {
    CategorizationOrchestrator::new(
        &taxonomy(),
        rules(),
        Some(LlmCategorizer::disabled(taxonomy())),
        OrchestratorConfig::default(),
    )
}

fn suggestion(confidence: f64) -> String {
    format!(
        r#"{{"category": "Food & Drink", "subcategory": "Restaurants", "confidence": {confidence}, "rationale": "Looks like a restaurant"}}"#
    )
}

#[test]
fn test_amazon_statement_hits_learned_rule() {
    let mut o = without_llm();
    let mut t = statement("AMZN Mktp US*UE1F70L13", 25.99);
    assert_eq!(t.merchant_norm, "AMAZON");

    assert_eq!(o.categorize_transaction(&mut t), Outcome::RuleMatched);
    assert_eq!(t.category.as_deref(), Some("Shopping"));
    assert_eq!(t.subcategory.as_deref(), Some("Amazon"));
    assert_eq!(t.tag_source, Some(TagSource::Rule));
    assert_eq!(t.tag_confidence, Some(1.0));
    assert!(!t.needs_review);
    assert_eq!(o.matcher_stats().by_rule_pack.get("learned"), Some(&1));
}

#[test]
fn test_square_bakery_composite_rule() {
    let mut o = without_llm();
    let mut bakery = statement("SQ *BREADS BAKERY", 8.50);
    assert_eq!(bakery.merchant_norm, "SQ");
    assert_eq!(bakery.merchant_detail.as_deref(), Some("BREADS BAKERY"));
    assert_eq!(o.categorize_transaction(&mut bakery), Outcome::RuleMatched);
    assert_eq!(bakery.subcategory.as_deref(), Some("Coffee"));
    assert_eq!(bakery.notes.as_deref(), Some("Matched rule 2 (detail: BREADS BAKERY)"));

    // Same aggregator, different seller: rule must not fire.
    let mut pizza = statement("SQ *JOES PIZZA", 18.0);
    assert_eq!(o.categorize_transaction(&mut pizza), Outcome::NoSuggestion);
}

#[test]
fn test_zelle_daycare_composite_rule() {
    let mut o = without_llm();
    let mut t = statement("Zelle payment to Devi Daycare  27420707612", 1400.0);
    assert_eq!(t.merchant_norm, "ZELLE TO");
    assert_eq!(t.merchant_detail.as_deref(), Some("DEVI DAYCARE"));
    o.categorize_transaction(&mut t);
    assert_eq!(t.category.as_deref(), Some("Baby"));
    assert_eq!(t.subcategory.as_deref(), Some("Daycare"));
}

#[test]
fn test_no_rule_and_llm_disabled_goes_to_review() {
    let mut o = without_llm();
    assert!(!o.llm_enabled());
    let mut t = statement("CORNER DELI BROOKLYN", 9.25);
    assert_eq!(o.categorize_transaction(&mut t), Outcome::NoSuggestion);
    assert_eq!(t.category.as_deref(), Some("Uncategorized"));
    assert_eq!(t.subcategory.as_deref(), Some("Needs Review"));
    assert_eq!(t.tag_source, Some(TagSource::None));
    assert_eq!(t.tag_confidence, Some(0.0));
    assert!(t.needs_review);
    assert!(t.notes.is_some());
}

#[test]
fn test_low_confidence_llm_suggestion_needs_review() {
    let provider = CannedProvider::new(vec![suggestion(0.75).as_str()]);
    let mut o = with_llm(provider.clone());
    let mut t = statement("CORNER DELI BROOKLYN", 9.25);

    assert_eq!(o.categorize_transaction(&mut t), Outcome::LlmReview);
    assert_eq!(t.category.as_deref(), Some("Food & Drink"));
    assert_eq!(t.subcategory.as_deref(), Some("Restaurants"));
    assert_eq!(t.tag_source, Some(TagSource::Llm));
    assert_eq!(t.tag_confidence, Some(0.75));
    assert!(t.needs_review);
    assert_eq!(t.notes.as_deref(), Some("Looks like a restaurant"));

    let s = o.stats();
    assert_eq!((s.total, s.llm_suggest, s.needs_review, s.high_confidence), (1, 1, 1, 0));
    assert_eq!(provider.calls(), 1);
}

#[test]
fn test_threshold_boundary_is_high_confidence() {
    let provider = CannedProvider::new(vec![suggestion(0.80).as_str(), suggestion(0.79).as_str()]);
    let mut o = with_llm(provider);

    let mut at = statement("CORNER DELI BROOKLYN", 9.25);
    assert_eq!(o.categorize_transaction(&mut at), Outcome::LlmAccepted);
    assert!(!at.needs_review);

    let mut below = statement("CORNER DELI BROOKLYN", 9.25);
    assert_eq!(o.categorize_transaction(&mut below), Outcome::LlmReview);
    assert!(below.needs_review);
}

#[test]
fn test_custom_threshold() {
    let provider = CannedProvider::new(vec![suggestion(0.75).as_str()]);
    let llm = LlmCategorizer::with_provider(taxonomy(), provider).with_settings(fast());
    let config = OrchestratorConfig {
        review_threshold: 0.70,
        ..OrchestratorConfig::default()
    };
    let mut o = CategorizationOrchestrator::new(&taxonomy(), rules(), Some(llm), config);
    let mut t = statement("CORNER DELI BROOKLYN", 9.25);
    assert_eq!(o.categorize_transaction(&mut t), Outcome::LlmAccepted);
}

#[test]
fn test_llm_failure_lands_in_review() {
    let provider = CannedProvider::new(vec!["the model is overloaded, try later"]);
    let mut o = with_llm(provider);
    let mut t = statement("CORNER DELI BROOKLYN", 9.25);
    assert_eq!(o.categorize_transaction(&mut t), Outcome::NoSuggestion);
    assert_eq!(t.notes.as_deref(), Some("No matching rule or LLM suggestion"));
    assert!(t.needs_review);
}

#[test]
fn test_llm_disabled_by_config_skips_provider() {
    let provider = CannedProvider::new(vec![suggestion(0.95).as_str()]);
    let llm = LlmCategorizer::with_provider(taxonomy(), provider.clone()).with_settings(fast());
    let config = OrchestratorConfig {
        enable_llm: false,
        ..OrchestratorConfig::default()
    };
    let mut o = CategorizationOrchestrator::new(&taxonomy(), rules(), Some(llm), config);
    let mut t = statement("CORNER DELI BROOKLYN", 9.25);
    assert_eq!(o.categorize_transaction(&mut t), Outcome::NoSuggestion);
    assert_eq!(provider.calls(), 0);
}

#[test]
fn test_batch_matches_single_when_all_rule_matched() {
    let descriptions = [
        "AMZN Mktp US*UE1F70L13",
        "SQ *BREADS BAKERY",
        "Zelle payment to Devi Daycare  27420707612",
        "MTA*NYCT PAYGO",
        "Amazon.com*4309A8OT3",
    ];
    let fresh = || descriptions.iter().map(|d| statement(d, 10.0)).collect::<Vec<_>>();

    let mut single = fresh();
    let mut o1 = without_llm();
    let single_outcomes: Vec<Outcome> = single.iter_mut().map(|t| o1.categorize_transaction(t)).collect();

    let mut batch = fresh();
    let mut o2 = without_llm();
    let batch_outcomes = o2.categorize_batch(&mut batch);

    assert_eq!(single_outcomes, batch_outcomes);
    assert!(batch_outcomes.iter().all(|o| *o == Outcome::RuleMatched));
    assert_eq!(single, batch);
    assert_eq!(o1.stats(), o2.stats());
}

#[test]
fn test_batch_preserves_input_order_with_llm() {
    let reply = r#"```json
[
  {"txn": 2, "category": "Transport", "subcategory": "Rideshare", "confidence": 0.6, "rationale": "ride"},
  {"txn": 1, "category": "Food & Drink", "subcategory": "Restaurants", "confidence": 0.92, "rationale": "deli"}
]
```"#;
    let provider = CannedProvider::new(vec![reply]);
    let mut o = with_llm(provider.clone());
    let mut batch = vec![
        statement("CORNER DELI BROOKLYN", 9.25),
        statement("AMZN Mktp US*UE1F70L13", 25.99),
        statement("REVEL TRANSIT", 14.0),
    ];

    let outcomes = o.categorize_batch(&mut batch);
    assert_eq!(
        outcomes,
        vec![Outcome::LlmAccepted, Outcome::RuleMatched, Outcome::LlmReview]
    );
    assert_eq!(batch[0].subcategory.as_deref(), Some("Restaurants"));
    assert_eq!(batch[1].subcategory.as_deref(), Some("Amazon"));
    assert_eq!(batch[2].subcategory.as_deref(), Some("Rideshare"));
    assert!(batch[2].needs_review);
    assert_eq!(provider.calls(), 1);

    let s = o.stats();
    assert_eq!(s.total, 3);
    assert_eq!(s.rule_match, 1);
    assert_eq!(s.llm_suggest, 2);
    assert_eq!(s.high_confidence, 2);
    assert_eq!(s.needs_review, 1);
}

#[test]
fn test_batch_short_llm_answer_pads_to_review() {
    let reply = r#"[{"txn": 1, "category": "Food & Drink", "subcategory": "Restaurants", "confidence": 0.9, "rationale": "deli"}]"#;
    let mut o = with_llm(CannedProvider::new(vec![reply]));
    let mut batch = vec![
        statement("CORNER DELI BROOKLYN", 9.25),
        statement("REVEL TRANSIT", 14.0),
    ];
    let outcomes = o.categorize_batch(&mut batch);
    assert_eq!(outcomes, vec![Outcome::LlmAccepted, Outcome::NoSuggestion]);
    assert_eq!(batch[1].category.as_deref(), Some("Uncategorized"));
    assert!(batch[1].needs_review);
}
