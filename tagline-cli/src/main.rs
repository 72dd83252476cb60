use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use tagline_categorize::{
    CategorizationOrchestrator, HistoryLearner, HttpCompletionClient, LlmCategorizer,
};
use tagline_core::Taxonomy;
use tagline_ingest::{StatementKind, normalize_merchant};

mod auth;
mod config;
mod inputs;
mod state;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TAGLINE_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "tagline", version = VERSION, about = "Categorize bank transactions with rules and an LLM fallback")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the normalized merchant (and detail) for each description
    Normalize {
        #[arg(required = true)]
        descriptions: Vec<String>,
    },

    /// Categorize statement rows with rules, then the LLM for anything left over
    Categorize {
        /// JSON list of statement rows
        #[arg(long)]
        input: PathBuf,

        /// JSON list of merchant rules
        #[arg(long)]
        rules: PathBuf,

        /// Taxonomy JSON
        #[arg(long)]
        taxonomy: PathBuf,

        /// Write categorized transactions here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// One LLM request per transaction instead of batches
        #[arg(long)]
        single: bool,

        /// Rules only; unmatched transactions go to review
        #[arg(long)]
        no_llm: bool,

        /// Override categorize.review_threshold
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        account_id: Option<i64>,

        /// Import source label stored on each transaction
        #[arg(long, default_value = "import")]
        source: String,

        /// Sign convention of the statement amounts
        #[arg(long, value_enum, default_value_t = KindArg::CreditCard)]
        statement_kind: KindArg,
    },

    /// Derive a learned rule pack from categorized history (CSV)
    Learn {
        #[arg(long)]
        history: PathBuf,

        /// Where to write the rules JSON
        #[arg(long)]
        output: PathBuf,

        #[arg(long, default_value_t = 3)]
        min_occurrences: usize,

        #[arg(long, default_value_t = 0.90)]
        min_consistency: f64,

        /// First rule_id to assign
        #[arg(long, default_value_t = 1)]
        start_id: i64,

        /// Force a merchant's category: "MERCHANT=Category/Subcategory" (repeatable)
        #[arg(long = "override", value_name = "MERCHANT=CATEGORY/SUBCATEGORY")]
        overrides: Vec<String>,

        /// Also write the full analysis (medium-confidence rules, conflicts) as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Manage ~/.tagline/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store provider API keys in ~/.tagline/auth.json
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    PasteAnthropicKey,
    PasteOpenaiKey,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    CreditCard,
    BankAccount,
}

impl From<KindArg> for StatementKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::CreditCard => StatementKind::CreditCard,
            KindArg::BankAccount => StatementKind::BankAccount,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Normalize { descriptions } => {
            for d in &descriptions {
                let n = normalize_merchant(d);
                println!(
                    "{}\t{}\t{}",
                    d,
                    n.merchant_norm,
                    n.merchant_detail.as_deref().unwrap_or("-")
                );
            }
        }

        Command::Categorize {
            input,
            rules,
            taxonomy,
            output,
            single,
            no_llm,
            threshold,
            account_id,
            source,
            statement_kind,
        } => {
            let args = CategorizeArgs {
                input,
                rules,
                taxonomy,
                output,
                single,
                no_llm,
                threshold,
                account_id,
                source,
                kind: statement_kind.into(),
            };
            run_categorize(&args)?;
        }

        Command::Learn {
            history,
            output,
            min_occurrences,
            min_consistency,
            start_id,
            overrides,
            report,
        } => {
            config::check_threshold(min_consistency).context("--min-consistency")?;
            let mut learner = HistoryLearner::new(min_occurrences, min_consistency);
            for o in &overrides {
                let (merchant, category, subcategory) = parse_override(o)?;
                learner = learner.with_override(merchant, category, subcategory);
            }

            let records = inputs::load_history(&history)?;
            let analysis = learner.learn(&records);
            let rules = analysis.to_merchant_rules(start_id);
            write_json(&output, &rules)?;
            if let Some(report_path) = report {
                write_json(&report_path, &analysis)?;
            }

            eprint!("{analysis}");
            eprintln!("Wrote {} rules to {}", rules.len(), output.display());
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteAnthropicKey => auth::paste_anthropic_key()?,
            AuthCommand::PasteOpenaiKey => auth::paste_openai_key()?,
        },
    }

    Ok(())
}

struct CategorizeArgs {
    input: PathBuf,
    rules: PathBuf,
    taxonomy: PathBuf,
    output: Option<PathBuf>,
    single: bool,
    no_llm: bool,
    threshold: Option<f64>,
    account_id: Option<i64>,
    source: String,
    kind: StatementKind,
}

fn run_categorize(args: &CategorizeArgs) -> Result<()> {
    let mut cfg = config::load_config()?;
    if let Some(t) = args.threshold {
        config::check_threshold(t).context("--threshold")?;
        cfg.categorize.review_threshold = t;
    }
    if args.no_llm {
        cfg.llm.enabled = false;
    }

    let taxonomy = inputs::load_taxonomy(&args.taxonomy)?;
    let rules = inputs::load_rules(&args.rules)?;
    let mut txns = inputs::load_statement(&args.input, args.kind, args.account_id, &args.source)?;

    let llm = build_llm(&cfg, &taxonomy)?;
    let mut orchestrator =
        CategorizationOrchestrator::new(&taxonomy, rules, llm, cfg.orchestrator_config());
    if !orchestrator.rejected_rules().is_empty() {
        eprintln!(
            "Skipped {} rules whose category is not in the taxonomy",
            orchestrator.rejected_rules().len()
        );
    }

    if args.single {
        for txn in txns.iter_mut() {
            orchestrator.categorize_transaction(txn);
        }
    } else {
        orchestrator.categorize_batch(&mut txns);
    }

    match &args.output {
        Some(path) => {
            write_json(path, &txns)?;
            eprintln!("Wrote {} transactions to {}", txns.len(), path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&txns)?),
    }

    eprint!("{}", orchestrator.stats());
    eprint!("{}", orchestrator.matcher_stats());
    Ok(())
}

/// `None` when the LLM is switched off; a disabled categorizer when no key is found.
fn build_llm(cfg: &config::Config, taxonomy: &Taxonomy) -> Result<Option<LlmCategorizer>> {
    if !cfg.llm.enabled {
        return Ok(None);
    }
    let llm = match auth::resolve_credential(cfg.llm.provider)? {
        Some(credential) => {
            let client = HttpCompletionClient::new(
                credential,
                Some(cfg.llm.model().to_string()),
                Some(cfg.llm.base_url().to_string()),
            );
            LlmCategorizer::with_provider(taxonomy.clone(), client)
        }
        None => LlmCategorizer::new(taxonomy.clone(), None),
    };
    Ok(Some(llm.with_settings(cfg.llm_settings())))
}

fn parse_override(s: &str) -> Result<(String, String, String)> {
    let Some((merchant, pair)) = s.split_once('=') else {
        bail!("override '{s}' must look like MERCHANT=Category/Subcategory");
    };
    let Some((category, subcategory)) = pair.split_once('/') else {
        bail!("override '{s}' must look like MERCHANT=Category/Subcategory");
    };
    let (merchant, category, subcategory) = (merchant.trim(), category.trim(), subcategory.trim());
    if merchant.is_empty() || category.is_empty() || subcategory.is_empty() {
        bail!("override '{s}' has an empty part");
    }
    Ok((merchant.to_uppercase(), category.to_string(), subcategory.to_string()))
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
