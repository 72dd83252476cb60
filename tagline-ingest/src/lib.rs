//! tagline-ingest: the bank-agnostic statement shape parsers feed, and merchant normalization.

pub mod normalizer;
pub mod types;

pub use normalizer::{NormalizedMerchant, UNKNOWN_MERCHANT, normalize_merchant};
pub use types::{StatementKind, StatementTransaction};
