use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

use tagline_categorize::HistoricalRecord;
use tagline_core::{MerchantRule, Taxonomy, Transaction};
use tagline_ingest::{StatementKind, StatementTransaction};

pub fn load_taxonomy(path: &Path) -> Result<Taxonomy> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let taxonomy = Taxonomy::from_json(&s).with_context(|| format!("parse {}", path.display()))?;
    if taxonomy.is_empty() {
        bail!("taxonomy {} has no categories", path.display());
    }
    Ok(taxonomy)
}

pub fn load_rules(path: &Path) -> Result<Vec<MerchantRule>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    MerchantRule::list_from_json(&s).with_context(|| format!("parse {}", path.display()))
}

/// Statement rows (JSON list) converted to uncategorized transactions.
pub fn load_statement(
    path: &Path,
    kind: StatementKind,
    account_id: Option<i64>,
    source: &str,
) -> Result<Vec<Transaction>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let rows: Vec<StatementTransaction> =
        serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
    Ok(rows
        .iter()
        .map(|row| {
            let mut txn = row.to_transaction(kind);
            txn.account_id = account_id;
            txn.source = source.to_string();
            txn
        })
        .collect())
}

/// Historical rows from a CSV export with Description / Category / Sub Category columns.
pub fn load_history(path: &Path) -> Result<Vec<HistoricalRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    for (i, row) in rdr.deserialize::<HistoricalRecord>().enumerate() {
        let record = row.with_context(|| format!("{}: row {}", path.display(), i + 2))?;
        out.push(record);
    }
    Ok(out)
}
