use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use k1_ledger_core::{resolver, run_validation, K1Record, ReportSink};
use k1_ledger_store::{JsonReportSink, SnapshotStore};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

const CLI_CONTRACT_VERSION: &str = "k1.v1";

#[derive(Debug, Parser)]
#[command(name = "k1")]
#[command(about = "K-1 cross-record validation ledger")]
struct Cli {
    #[arg(long, default_value = "./k1_ledger.ndjson")]
    snapshot: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest one extraction bundle plus its source document.
    Ingest(IngestArgs),
    /// Run the rule library over stored records and emit a report.
    Validate(ValidateArgs),
    Records {
        #[command(subcommand)]
        command: RecordsCommand,
    },
}

#[derive(Debug, Args)]
struct IngestArgs {
    /// Extraction bundle JSON produced by the upstream pipeline.
    #[arg(long)]
    bundle: PathBuf,
    /// The source document the bundle was extracted from.
    #[arg(long)]
    document: PathBuf,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Restrict validation to one issuer (requires --period).
    #[arg(long, requires = "period")]
    issuer: Option<String>,
    /// Restrict validation to one period (requires --issuer).
    #[arg(long, requires = "issuer")]
    period: Option<String>,
    /// Also write the report document to this path.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Ingestion run id to stamp onto every result.
    #[arg(long)]
    triggered_by: Option<String>,
}

#[derive(Debug, Subcommand)]
enum RecordsCommand {
    Count,
    Purge(PurgeArgs),
}

#[derive(Debug, Args)]
struct PurgeArgs {
    #[arg(long, requires = "period")]
    issuer: Option<String>,
    #[arg(long, requires = "issuer")]
    period: Option<String>,
}

/// The extraction pipeline's per-document output, as handed to `ingest`.
/// Every financial field is optional; partial extraction is normal.
#[derive(Debug, Deserialize)]
struct ExtractionBundle {
    source_run_id: String,
    period: String,
    #[serde(default)]
    placeholder_mapping: BTreeMap<String, String>,

    #[serde(default)]
    issuer_name: Option<String>,
    #[serde(default)]
    recipient_role: Option<String>,
    #[serde(default)]
    share_percentage: Option<f64>,

    #[serde(default)]
    ordinary_business_income: Option<f64>,
    #[serde(default)]
    rental_real_estate_income: Option<f64>,
    #[serde(default)]
    guaranteed_payments: Option<f64>,
    #[serde(default)]
    interest_income: Option<f64>,
    #[serde(default)]
    ordinary_dividends: Option<f64>,
    #[serde(default)]
    qualified_dividends: Option<f64>,
    #[serde(default)]
    short_term_capital_gains: Option<f64>,
    #[serde(default)]
    long_term_capital_gains: Option<f64>,
    #[serde(default)]
    section_179_deduction: Option<f64>,
    #[serde(default)]
    distributions: Option<f64>,
    #[serde(default)]
    capital_account_beginning: Option<f64>,
    #[serde(default)]
    capital_account_ending: Option<f64>,
    #[serde(default)]
    self_employment_earnings: Option<f64>,
    #[serde(default)]
    foreign_taxes_paid: Option<f64>,
    #[serde(default)]
    qbi_deduction: Option<f64>,

    #[serde(default)]
    precheck: Option<PrecheckSection>,
    #[serde(default)]
    ai_review: Option<AiReviewSection>,
}

#[derive(Debug, Default, Deserialize)]
struct PrecheckSection {
    #[serde(default)]
    passed: Option<bool>,
    #[serde(default)]
    critical_count: u32,
    #[serde(default)]
    warning_count: u32,
}

#[derive(Debug, Default, Deserialize)]
struct AiReviewSection {
    #[serde(default)]
    coherence_score: Option<f64>,
    #[serde(default)]
    ocr_confidence: Option<f64>,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().to_string())
}

/// Undo de-identification inside a display-name field: the extraction
/// step leaves placeholder tokens in free text, and the mapping carries
/// the originals.
fn restore_placeholders(text: &str, mapping: &BTreeMap<String, String>) -> String {
    let mut restored = text.to_string();
    for (placeholder, original) in mapping {
        if restored.contains(placeholder.as_str()) {
            restored = restored.replace(placeholder.as_str(), original);
        }
    }
    restored
}

fn run_ingest(args: &IngestArgs, store: &SnapshotStore) -> Result<()> {
    let bundle_bytes = fs::read(&args.bundle)
        .with_context(|| format!("failed to read bundle {}", args.bundle.display()))?;
    let bundle: ExtractionBundle = serde_json::from_slice(&bundle_bytes)
        .with_context(|| format!("failed to parse bundle {}", args.bundle.display()))?;

    let document_bytes = fs::read(&args.document)
        .with_context(|| format!("failed to read document {}", args.document.display()))?;
    let content_hash = format!("{:x}", Sha256::digest(&document_bytes));
    let name = document_name(&args.document);

    let (issuer_id, recipient_id) = resolver::resolve_identifiers(&bundle.placeholder_mapping);
    let (Some(issuer_id), Some(recipient_id)) = (issuer_id, recipient_id) else {
        tracing::warn!(
            document = %name,
            run = %bundle.source_run_id,
            "could not resolve issuer/recipient identifiers, skipping"
        );
        return emit_json(serde_json::json!({
            "status": "skipped",
            "reason": "unresolvable_identifiers",
            "document": name,
            "source_run_id": bundle.source_run_id,
        }));
    };

    let issuer_name = bundle
        .issuer_name
        .as_deref()
        .map(|text| restore_placeholders(text, &bundle.placeholder_mapping));
    let precheck = bundle.precheck.unwrap_or_default();
    let ai_review = bundle.ai_review.unwrap_or_default();

    let record = K1Record {
        issuer_id,
        recipient_id,
        period: bundle.period,
        source_run_id: bundle.source_run_id,
        source_document_name: name,
        source_content_hash: content_hash,
        ingested_at: OffsetDateTime::now_utc(),
        issuer_name,
        recipient_role: bundle.recipient_role,
        share_percentage: bundle.share_percentage,
        ordinary_business_income: bundle.ordinary_business_income,
        rental_real_estate_income: bundle.rental_real_estate_income,
        guaranteed_payments: bundle.guaranteed_payments,
        interest_income: bundle.interest_income,
        ordinary_dividends: bundle.ordinary_dividends,
        qualified_dividends: bundle.qualified_dividends,
        short_term_capital_gains: bundle.short_term_capital_gains,
        long_term_capital_gains: bundle.long_term_capital_gains,
        section_179_deduction: bundle.section_179_deduction,
        distributions: bundle.distributions,
        capital_account_beginning: bundle.capital_account_beginning,
        capital_account_ending: bundle.capital_account_ending,
        self_employment_earnings: bundle.self_employment_earnings,
        foreign_taxes_paid: bundle.foreign_taxes_paid,
        qbi_deduction: bundle.qbi_deduction,
        precheck_passed: precheck.passed,
        precheck_critical_count: precheck.critical_count,
        precheck_warning_count: precheck.warning_count,
        coherence_score: ai_review.coherence_score,
        ocr_confidence: ai_review.ocr_confidence,
    };

    let outcome = store.upsert(&record)?;
    let status = if outcome.stored { "stored" } else { "duplicate" };
    emit_json(serde_json::json!({
        "status": status,
        "issuer_id": record.issuer_id,
        "period": record.period,
        "record_count": outcome.record_count,
        "duplicate_of": outcome.duplicate_of,
    }))
}

fn run_validate(args: &ValidateArgs, store: &SnapshotStore) -> Result<()> {
    let scopes = match (&args.issuer, &args.period) {
        (Some(issuer), Some(period)) => vec![store.scope_records(issuer, period)],
        _ => store.all_scope_records(),
    };

    let mut pairs = store.consecutive_period_pairs();
    if let Some(issuer) = &args.issuer {
        pairs.retain(|(prior, _)| &prior.issuer_id == issuer);
    }

    // Validation reads the last-exported snapshot without the write
    // lock; a concurrent ingest may land one version later.
    tracing::info!(
        scopes = scopes.len(),
        pairs = pairs.len(),
        "validating last-exported snapshot"
    );
    let report = run_validation(&scopes, &pairs, args.triggered_by.as_deref());

    if let Some(out) = &args.out {
        JsonReportSink::new(out).write_report(&report)?;
        tracing::info!(path = %out.display(), report = %report.report_id, "report written");
    }
    emit_json(serde_json::to_value(&report)?)
}

fn run_records(command: &RecordsCommand, store: &SnapshotStore) -> Result<()> {
    match command {
        RecordsCommand::Count => emit_json(serde_json::json!({
            "record_count": store.record_count(),
        })),
        RecordsCommand::Purge(args) => {
            let removed = match (&args.issuer, &args.period) {
                (Some(issuer), Some(period)) => store.purge_scope(issuer, period)?,
                _ => store.purge_all()?,
            };
            emit_json(serde_json::json!({
                "removed": removed,
                "record_count": store.record_count(),
            }))
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = SnapshotStore::open(&cli.snapshot);
    match &cli.command {
        Command::Ingest(args) => run_ingest(args, &store),
        Command::Validate(args) => run_validate(args, &store),
        Command::Records { command } => run_records(command, &store),
    }
}
