//! tagline-core: data model shared by the normalizer, rule matcher, LLM categorizer and orchestrator

pub mod rules;
pub mod taxonomy;
pub mod transaction;

pub use rules::{MatchType, MerchantRule, RuleError};
pub use taxonomy::{Taxonomy, TaxonomyCategory, TaxonomyError};
pub use transaction::{Direction, TagSource, Transaction};

/// Category assigned when nothing could categorize a transaction.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Subcategory paired with [`UNCATEGORIZED`].
pub const NEEDS_REVIEW: &str = "Needs Review";
