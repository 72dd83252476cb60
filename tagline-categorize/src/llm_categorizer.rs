//! LLM fallback for transactions no rule matched.
//!
//! Every failure (transport, malformed output, out-of-taxonomy answer) is
//! logged and surfaces as "no suggestion". Batch mode sends one prompt per
//! chunk and recovers from bad output by bisecting, then by going one at a time.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tagline_core::{Direction, Taxonomy, Transaction};
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::json_extract;
use crate::llm_client::{CompletionProvider, CompletionRequest, HttpCompletionClient, LlmCredential};

/// A validated category guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSuggestion {
    pub category: String,
    pub subcategory: String,
    /// Clamped to [0, 1]
    pub confidence: f64,
    pub rationale: String,
}

/// The parts of a transaction the prompt needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionSummary<'a> {
    pub merchant_norm: &'a str,
    pub merchant_detail: Option<&'a str>,
    pub description_raw: &'a str,
    pub amount: f64,
    pub direction: Direction,
}

impl<'a> From<&'a Transaction> for TransactionSummary<'a> {
    fn from(txn: &'a Transaction) -> Self {
        Self {
            merchant_norm: &txn.merchant_norm,
            merchant_detail: txn.merchant_detail.as_deref(),
            description_raw: &txn.description_raw,
            amount: txn.amount,
            direction: txn.direction,
        }
    }
}

impl TransactionSummary<'_> {
    /// "SQ (JOES PIZZA)" or just "SQ"
    fn merchant_label(&self) -> String {
        match self.merchant_detail.filter(|d| !d.trim().is_empty()) {
            Some(detail) => format!("{} ({})", self.merchant_norm, detail),
            None => self.merchant_norm.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    /// Token budget for a single-transaction request
    pub max_tokens: u32,
    /// Token budget for a chunk request
    pub batch_max_tokens: u32,
    pub temperature: f32,
    /// Pause between successive chunk requests
    pub inter_chunk_delay: Duration,
    /// Pause before retrying a chunk after a non-parse failure
    pub retry_delay: Duration,
    /// Chunks larger than this are bisected on a first parse failure
    pub bisect_min_len: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            batch_max_tokens: 4000,
            temperature: 0.0,
            inter_chunk_delay: Duration::from_millis(500),
            retry_delay: Duration::from_secs(1),
            bisect_min_len: 10,
        }
    }
}

pub struct LlmCategorizer {
    taxonomy: Taxonomy,
    taxonomy_lines: String,
    provider: Option<Box<dyn CompletionProvider>>,
    settings: LlmSettings,
}

impl LlmCategorizer {
    /// HTTP-backed categorizer; without a credential it is disabled.
    pub fn new(taxonomy: Taxonomy, credential: Option<LlmCredential>) -> Self {
        match credential {
            Some(credential) => {
                Self::with_provider(taxonomy, HttpCompletionClient::new(credential, None, None))
            }
            None => {
                info!("no LLM credential configured; LLM categorization disabled");
                Self::disabled(taxonomy)
            }
        }
    }

    pub fn with_provider(taxonomy: Taxonomy, provider: impl CompletionProvider + 'static) -> Self {
        Self {
            taxonomy_lines: taxonomy.prompt_lines(),
            taxonomy,
            provider: Some(Box::new(provider)),
            settings: LlmSettings::default(),
        }
    }

    pub fn disabled(taxonomy: Taxonomy) -> Self {
        Self {
            taxonomy_lines: taxonomy.prompt_lines(),
            taxonomy,
            provider: None,
            settings: LlmSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: LlmSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Suggest a category for one transaction.
    pub fn categorize(&self, summary: &TransactionSummary<'_>) -> Option<LlmSuggestion> {
        let provider = self.provider.as_deref()?;
        match self.try_categorize(provider, summary) {
            Ok(suggestion) => Some(suggestion),
            Err(e) => {
                warn!(merchant = summary.merchant_norm, error = %e, "LLM categorization failed");
                None
            }
        }
    }

    fn try_categorize(
        &self,
        provider: &dyn CompletionProvider,
        summary: &TransactionSummary<'_>,
    ) -> Result<LlmSuggestion, LlmError> {
        let request = CompletionRequest {
            prompt: self.single_prompt(summary),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };
        let text = provider.complete(&request)?;
        let obj = json_extract::parse_object(&text)?;
        self.suggestion_from(&obj)
    }

    /// Suggest categories for many transactions, one slot per input.
    pub fn categorize_batch(
        &self,
        summaries: &[TransactionSummary<'_>],
        chunk_size: usize,
    ) -> Vec<Option<LlmSuggestion>> {
        let Some(provider) = self.provider.as_deref() else {
            return vec![None; summaries.len()];
        };
        if summaries.is_empty() {
            return Vec::new();
        }

        let chunk_size = chunk_size.max(1);
        let total_chunks = summaries.len().div_ceil(chunk_size);
        if total_chunks > 1 {
            info!(
                transactions = summaries.len(),
                chunks = total_chunks,
                "categorizing with LLM in chunks"
            );
        }

        let mut results = Vec::with_capacity(summaries.len());
        for (i, chunk) in summaries.chunks(chunk_size).enumerate() {
            let chunk_num = i + 1;
            let chunk_results = self.categorize_chunk(provider, chunk, chunk_num, 0);
            let categorized = chunk_results.iter().filter(|r| r.is_some()).count();
            debug!(chunk = chunk_num, of = total_chunks, categorized, size = chunk.len(), "chunk done");
            results.extend(chunk_results);

            if chunk_num < total_chunks {
                pause(self.settings.inter_chunk_delay);
            }
        }
        results
    }

    fn categorize_chunk(
        &self,
        provider: &dyn CompletionProvider,
        chunk: &[TransactionSummary<'_>],
        chunk_num: usize,
        retry: u8,
    ) -> Vec<Option<LlmSuggestion>> {
        match self.request_chunk(provider, chunk) {
            Ok(results) => results,
            Err(e) if e.is_parse_failure() => {
                warn!(chunk = chunk_num, error = %e, "chunk response could not be parsed");
                if retry == 0 && chunk.len() > self.settings.bisect_min_len {
                    info!(chunk = chunk_num, "retrying chunk as two halves");
                    let mid = chunk.len() / 2;
                    let mut out = self.categorize_chunk(provider, &chunk[..mid], chunk_num, 1);
                    out.extend(self.categorize_chunk(provider, &chunk[mid..], chunk_num, 1));
                    out
                } else {
                    info!(chunk = chunk_num, "falling back to one request per transaction");
                    chunk.iter().map(|s| self.categorize(s)).collect()
                }
            }
            Err(e) => {
                warn!(chunk = chunk_num, error = %e, "chunk request failed");
                if retry == 0 {
                    pause(self.settings.retry_delay);
                    self.categorize_chunk(provider, chunk, chunk_num, 1)
                } else {
                    vec![None; chunk.len()]
                }
            }
        }
    }

    fn request_chunk(
        &self,
        provider: &dyn CompletionProvider,
        chunk: &[TransactionSummary<'_>],
    ) -> Result<Vec<Option<LlmSuggestion>>, LlmError> {
        let request = CompletionRequest {
            prompt: self.batch_prompt(chunk),
            max_tokens: self.settings.batch_max_tokens,
            temperature: self.settings.temperature,
        };
        let text = provider.complete(&request)?;
        let entries = json_extract::parse_array(&text)?;
        if entries.len() != chunk.len() {
            warn!(expected = chunk.len(), got = entries.len(), "LLM returned wrong number of results");
        }
        Ok(self.align(&entries, chunk.len()))
    }

    /// Place entries by their 1-based `txn` ordinal. Duplicate or
    /// out-of-range ordinals are dropped; entries without an ordinal fill the
    /// remaining slots in order. Missing slots stay `None`.
    fn align(&self, entries: &[Value], n: usize) -> Vec<Option<LlmSuggestion>> {
        let mut slots: Vec<Option<LlmSuggestion>> = vec![None; n];
        let mut filled = vec![false; n];
        let mut unnumbered = Vec::new();

        for entry in entries {
            let Some(obj) = entry.as_object() else {
                debug!("skipping non-object batch entry");
                continue;
            };
            match ordinal(obj) {
                Some(k) if (1..=n).contains(&k) && !filled[k - 1] => {
                    filled[k - 1] = true;
                    slots[k - 1] = self.validated(obj, k);
                }
                Some(k) => debug!(txn = k, "dropping duplicate or out-of-range ordinal"),
                None => unnumbered.push(obj),
            }
        }

        let mut free = (0..n).filter(|&i| !filled[i]);
        for obj in unnumbered {
            let Some(i) = free.next() else { break };
            slots[i] = self.validated(obj, i + 1);
        }
        slots
    }

    fn validated(&self, obj: &Map<String, Value>, k: usize) -> Option<LlmSuggestion> {
        match self.suggestion_from(obj) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(txn = k, error = %e, "rejected batch entry");
                None
            }
        }
    }

    fn suggestion_from(&self, obj: &Map<String, Value>) -> Result<LlmSuggestion, LlmError> {
        let category = string_field(obj, "category")?;
        let subcategory = string_field(obj, "subcategory")?;
        let confidence = confidence_field(obj)?;
        let rationale = string_field(obj, "rationale")?;

        if !self.taxonomy.contains(&category, &subcategory) {
            return Err(LlmError::NotInTaxonomy {
                category,
                subcategory,
            });
        }

        Ok(LlmSuggestion {
            category,
            subcategory,
            confidence: confidence.clamp(0.0, 1.0),
            rationale,
        })
    }

    fn single_prompt(&self, summary: &TransactionSummary<'_>) -> String {
        format!(
            r#"You are a transaction categorization assistant. Given a transaction, suggest the most appropriate category and subcategory.

TAXONOMY:
{taxonomy}

TRANSACTION:
Merchant: {merchant}
Description: {description}
Amount: ${amount:.2}
Type: {kind}

Respond with ONLY a JSON object (no markdown, no explanations):
{{
  "category": "Category Name",
  "subcategory": "Subcategory Name",
  "confidence": 0.85,
  "rationale": "Brief 1-sentence explanation"
}}

Rules:
- Choose ONLY from the taxonomy above
- confidence must be between 0.0 and 1.0
- If uncertain, use lower confidence
- rationale should be max 15 words"#,
            taxonomy = self.taxonomy_lines,
            merchant = summary.merchant_label(),
            description = summary.description_raw,
            amount = summary.amount.abs(),
            kind = summary.direction.prompt_label(),
        )
    }

    fn batch_prompt(&self, chunk: &[TransactionSummary<'_>]) -> String {
        let n = chunk.len();
        let listing = chunk
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {} - ${:.2}", i + 1, s.merchant_label(), s.amount.abs()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Categorize these {n} transactions. Respond with ONLY a JSON array:

TAXONOMY:
{taxonomy}

TRANSACTIONS:
{listing}

Response format (JSON array only, no markdown, no preamble):
[
  {{"txn": 1, "category": "...", "subcategory": "...", "confidence": 0.85, "rationale": "..."}},
  {{"txn": 2, "category": "...", "subcategory": "...", "confidence": 0.90, "rationale": "..."}}
]

Rules:
- Choose ONLY from taxonomy above
- Include ALL {n} transactions
- confidence 0.0-1.0
- rationale max 15 words
- CRITICAL: Return ONLY the JSON array, nothing else"#,
            taxonomy = self.taxonomy_lines,
        )
    }
}

fn pause(d: Duration) {
    if !d.is_zero() {
        thread::sleep(d);
    }
}

fn ordinal(obj: &Map<String, Value>) -> Option<usize> {
    match obj.get("txn")? {
        Value::Number(n) => n.as_u64().map(|v| v as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string_field(obj: &Map<String, Value>, key: &'static str) -> Result<String, LlmError> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(LlmError::MissingField(key)),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(LlmError::InvalidField(key)),
    }
}

fn confidence_field(obj: &Map<String, Value>) -> Result<f64, LlmError> {
    let value = match obj.get("confidence") {
        None | Some(Value::Null) => return Err(LlmError::MissingField("confidence")),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or(LlmError::InvalidField("confidence"))
}
