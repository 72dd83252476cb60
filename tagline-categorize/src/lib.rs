//! tagline-categorize: rule matching, LLM fallback, and the orchestration policy
//! that turns both into a categorized-or-review decision per transaction.
//! Venmo and Amazon enrichment fill in what bank lines leave out.

pub mod amazon;
pub mod error;
pub mod json_extract;
pub mod learner;
pub mod llm_categorizer;
pub mod llm_client;
pub mod orchestrator;
pub mod review;
pub mod rule_matcher;
pub mod venmo;

pub use amazon::{
    AmazonOrder, AmazonOrderItem, OrderMatch, categorize_product, find_matching_transaction,
    group_orders, line_items, match_orders,
};
pub use error::LlmError;
pub use learner::{
    CategoryCount, HistoricalRecord, HistoryLearner, LearnedConflict, LearnedRule, LearningReport,
};
pub use llm_categorizer::{LlmCategorizer, LlmSettings, LlmSuggestion, TransactionSummary};
pub use llm_client::{CompletionProvider, CompletionRequest, HttpCompletionClient, LlmCredential, Provider};
pub use orchestrator::{CategorizationOrchestrator, OrchestratorConfig, Outcome, RunStats};
pub use review::{ReviewError, apply_manual_review, rule_from_review};
pub use rule_matcher::{CategorizationResult, MatcherStats, RuleMatcher};
pub use venmo::{
    CashoutExpansion, MatchConfidence, PaymentMatch, VenmoPayment, apply_payment_match,
    expand_cashouts, find_subset_sum, income_transactions, match_payments, parse_venmo_amount,
};
