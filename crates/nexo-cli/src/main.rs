//! Nexo CLI - anchor and retrieve encrypted accreditation records
//!
//! Usage:
//!   nexo register --record ana.json   - Encrypt, anchor and index a record
//!   nexo lookup <case-id>             - Fetch and decrypt an anchored record
//!   nexo verify <case-id>             - Check the index against the chain
//!   nexo records list|stats|find|clear
//!   nexo keygen | nexo case-id

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use nexo_core::{
    AnchorError, Network, NexoConfig, Orchestrator, RegistrationRequest, ValidationPolicy,
};
use nexo_crypto::PersonalRecord;
use nexo_index::{IndexRecord, JsonFileIndex, RecordIndex};
use serde::Serialize;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nexo")]
#[command(author = "Nexo Developers")]
#[command(version)]
#[command(about = "Encrypted on-chain anchoring of accreditation records", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// JSON configuration file
    #[arg(long, global = true, env = "NEXO_CONFIG")]
    config: Option<PathBuf>,

    /// Index file (overrides config and NEXO_INDEX_PATH)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Wallet base URL
    #[arg(long, global = true)]
    wallet_url: Option<String>,

    /// Explorer API base URL
    #[arg(long, global = true)]
    explorer_url: Option<String>,

    /// `main` or `test`
    #[arg(long, global = true)]
    network: Option<Network>,

    /// Timeout for each wallet or explorer call
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a record, anchor it on chain and index it
    Register(RegisterArgs),

    /// Fetch and decrypt the record anchored for a case
    Lookup {
        /// Case identifier (expediente)
        case_id: String,
    },

    /// Check a case's index entry against its on-chain envelope
    Verify {
        /// Case identifier (expediente)
        case_id: String,
    },

    /// Inspect or reset the local index
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },

    /// Print a fresh random symmetric key
    Keygen,

    /// Print a fresh case identifier
    CaseId {
        /// Prefix (defaults to the configured case prefix)
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Args)]
struct RegisterArgs {
    /// JSON file holding the record object
    #[arg(long)]
    record: PathBuf,

    /// Case identifier; generated when omitted
    #[arg(long)]
    case_id: Option<String>,

    /// Subject identifier; defaults to the record's `dni`
    #[arg(long)]
    subject_id: Option<String>,

    /// Symmetric key; generated when omitted
    #[arg(long)]
    key: Option<String>,

    #[arg(long)]
    issuer: Option<String>,

    /// Identity key to embed; asked from the wallet when omitted
    #[arg(long)]
    identity_key: Option<String>,

    /// RFC 3339 registration time; defaults to now
    #[arg(long)]
    timestamp: Option<String>,

    /// Skip the accreditation required-field checks
    #[arg(long)]
    allow_partial: bool,
}

#[derive(Subcommand)]
enum RecordsAction {
    /// List every indexed registration (keys are not shown)
    List,

    /// Counts per issuer
    Stats,

    /// Find registrations by transaction or subject
    Find {
        #[arg(long, conflicts_with = "subject", required_unless_present = "subject")]
        txid: Option<String>,

        #[arg(long)]
        subject: Option<String>,
    },

    /// Remove every record from the index
    Clear {
        /// Confirm the irreversible reset
        #[arg(long)]
        yes: bool,
    },
}

/// Index entry without its key material
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordSummary<'a> {
    record_id: &'a str,
    transaction_id: &'a str,
    case_id: &'a str,
    subject_id: &'a str,
    issuer: &'a str,
    timestamp: &'a str,
    key_hash: &'a str,
}

impl<'a> From<&'a IndexRecord> for RecordSummary<'a> {
    fn from(r: &'a IndexRecord) -> Self {
        Self {
            record_id: &r.record_id,
            transaction_id: &r.transaction_id,
            case_id: &r.case_id,
            subject_id: &r.subject_id,
            issuer: &r.issuer,
            timestamp: &r.timestamp,
            key_hash: &r.key_hash,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is reserved for JSON output
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.global)?;

    match cli.command {
        Commands::Register(args) => register(&config, args).await?,

        Commands::Lookup { case_id } => {
            let result = Orchestrator::from_config(&config)
                .lookup(&case_id)
                .await
                .map_err(failure)?;
            print_json(&result)?;
        }

        Commands::Verify { case_id } => {
            let report = Orchestrator::from_config(&config)
                .verify(&case_id)
                .await
                .map_err(failure)?;
            print_json(&report)?;
            if !report.verified {
                bail!("verification failed for case {case_id}");
            }
        }

        Commands::Records { action } => records(&config, action)?,

        Commands::Keygen => println!("{}", nexo_crypto::generate_symmetric_key()),

        Commands::CaseId { prefix } => {
            let prefix = prefix.unwrap_or_else(|| config.case_prefix.clone());
            println!("{}", nexo_core::generate_case_id(&prefix, Utc::now()));
        }
    }

    Ok(())
}

/// Config file and environment, then command-line flags on top
fn load_config(flags: &GlobalArgs) -> anyhow::Result<NexoConfig> {
    let mut config = NexoConfig::load(flags.config.as_deref()).context("Failed to load configuration")?;

    if let Some(index) = &flags.index {
        config.index_path = index.clone();
    }
    if let Some(url) = &flags.wallet_url {
        config.wallet_url = url.clone();
    }
    if let Some(url) = &flags.explorer_url {
        config.explorer_url = url.clone();
    }
    if let Some(network) = flags.network {
        config.network = network;
    }
    if let Some(secs) = flags.timeout_secs {
        if secs == 0 {
            bail!("--timeout-secs must be at least 1");
        }
        config.timeout_secs = secs;
    }
    Ok(config)
}

async fn register(config: &NexoConfig, args: RegisterArgs) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&args.record)
        .with_context(|| format!("Failed to read record file {}", args.record.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", args.record.display()))?;
    let Some(record) = PersonalRecord::from_value(value) else {
        bail!("{} must contain a JSON object", args.record.display());
    };

    let subject_id = match args.subject_id.or_else(|| record.get_str("dni").map(str::to_string)) {
        Some(id) => id,
        None => bail!("no --subject-id given and the record has no `dni`"),
    };
    let case_id = args
        .case_id
        .unwrap_or_else(|| nexo_core::generate_case_id(&config.case_prefix, Utc::now()));
    let key = args.key.unwrap_or_else(nexo_crypto::generate_symmetric_key);

    let mut request = RegistrationRequest::new(record, key, case_id, subject_id);
    request.issuer = args.issuer;
    request.identity_key = args.identity_key;
    request.timestamp = args.timestamp;

    let validation = if args.allow_partial {
        config.validation.clone()
    } else {
        ValidationPolicy::accreditation()
    };

    let receipt = Orchestrator::from_config(config)
        .with_validation(validation)
        .register(request)
        .await
        .map_err(failure)?;
    if let Some(warning) = &receipt.warning {
        warn!(case_id = %receipt.case_id, txid = %receipt.transaction_id, "{warning}");
    }
    print_json(&receipt)
}

fn records(config: &NexoConfig, action: RecordsAction) -> anyhow::Result<()> {
    let index = JsonFileIndex::open(&config.index_path);

    match action {
        RecordsAction::List => {
            let records = index.all_records();
            let summaries: Vec<RecordSummary> = records.iter().map(RecordSummary::from).collect();
            print_json(&summaries)
        }
        RecordsAction::Stats => print_json(&index.stats()),
        RecordsAction::Find { txid, subject } => {
            let found: Vec<IndexRecord> = match (txid, subject) {
                (Some(txid), _) => index.find_by_transaction_id(&txid).into_iter().collect(),
                (None, Some(subject)) => index.find_by_subject_id(&subject),
                (None, None) => bail!("give --txid or --subject"),
            };
            let summaries: Vec<RecordSummary> = found.iter().map(RecordSummary::from).collect();
            print_json(&summaries)
        }
        RecordsAction::Clear { yes } => {
            if !yes {
                bail!("refusing to clear {} without --yes", config.index_path.display());
            }
            index
                .clear()
                .with_context(|| format!("Failed to clear {}", config.index_path.display()))?;
            println!("Index cleared: {}", config.index_path.display());
            Ok(())
        }
    }
}

/// Prefix the operator-facing failure kind
fn failure(err: AnchorError) -> anyhow::Error {
    anyhow::anyhow!("{}: {}", err.kind(), err)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
