//! `tel` command-line ledger

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tel_core::{verify_proof, IntegrityStatus};
use tel_ledger::{AnchorScheduler, Ledger, LedgerConfig, ListQuery, Reanchor};
use tel_types::{AnchorScope, InclusionProof, OwnerId, RecordId, WindowKey};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tel")]
#[command(about = "Tamper-evident record ledger", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "tel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Add a record
    Add {
        owner: OwnerId,

        /// Read the text from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Record text (reads stdin if neither --text nor --file is given)
        #[arg(short, long)]
        text: Option<String>,
    },

    /// List an owner's live records, newest first
    List {
        owner: OwnerId,

        /// Case-insensitive text filter
        #[arg(short, long)]
        search: Option<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = ListQuery::DEFAULT_LIMIT)]
        limit: usize,
    },

    /// Check a record's content hash and integrity tag
    Verify { owner: OwnerId, id: RecordId },

    /// Mark a record deleted
    Tombstone { owner: OwnerId, id: RecordId },

    /// Recompute a record's hash and tag
    Rehash { owner: OwnerId, id: RecordId },

    /// Anchor a day window (defaults to yesterday, UTC)
    Anchor {
        #[arg(short, long)]
        date: Option<WindowKey>,

        /// Anchor only this owner's records
        #[arg(short, long)]
        owner: Option<OwnerId>,
    },

    /// Show all anchors
    Anchors,

    /// Produce an inclusion proof for a record
    Proof {
        id: RecordId,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify an inclusion proof file (offline)
    VerifyProof { file: PathBuf },

    /// Show the audit trail
    Audit { owner: Option<OwnerId> },

    /// Run the anchoring scheduler until Ctrl-C
    Run,
}

fn load_config(path: &Path) -> Result<LedgerConfig> {
    if !path.exists() {
        bail!(
            "Configuration file not found: {} (run `tel init` first)",
            path.display()
        );
    }
    Ok(LedgerConfig::from_file(path)?)
}

fn open_ledger(path: &Path) -> Result<Ledger> {
    let config = load_config(path)?;
    Ok(Ledger::open(&config)?)
}

fn read_text(file: Option<PathBuf>, text: Option<String>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    // Raw bytes, so non-UTF-8 input reaches canonicalization instead of failing here
    let bytes = match file {
        Some(path) => {
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            use std::io::Read;
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            data
        }
    };
    Ok(tel_core::canonicalize_bytes(&bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            if cli.config.exists() {
                bail!("{} already exists", cli.config.display());
            }
            LedgerConfig::default().to_file(&cli.config)?;
            println!("Default configuration saved to {}", cli.config.display());
            println!("Set {} before running other commands", tel_ledger::SECRET_ENV);
        }

        Commands::Add { owner, file, text } => {
            let ledger = open_ledger(&cli.config)?;
            let record = ledger.append(&owner, &read_text(file, text)?)?;

            println!("Record created");
            println!("Id:        {}", record.id);
            println!("Created:   {}", record.created_at_iso());
            println!("Window:    {}", record.window_key());
            println!("Hash:      {}", record.content_hash);
        }

        Commands::List {
            owner,
            search,
            page,
            limit,
        } => {
            let ledger = open_ledger(&cli.config)?;
            let result = ledger.list(&owner, &ListQuery { search, page, limit })?;

            if result.items.is_empty() {
                println!("No records");
            } else {
                println!("{:<8} {:<26} {:<64}", "Id", "Created", "Hash");
                println!("{}", "-".repeat(100));
                for record in &result.items {
                    println!(
                        "{:<8} {:<26} {}",
                        record.id,
                        record.created_at_iso(),
                        record.content_hash
                    );
                }
            }
            println!(
                "\nPage {} of {} ({} records)",
                result.page,
                result.pages.max(1),
                result.total
            );
        }

        Commands::Verify { owner, id } => {
            let ledger = open_ledger(&cli.config)?;
            let result = ledger.verify(&owner, id)?;

            println!("Content hash: {}", if result.content_ok { "OK" } else { "MISMATCH" });
            println!("Integrity tag: {}", if result.tag_ok { "OK" } else { "MISMATCH" });
            if result.status() != IntegrityStatus::Intact {
                println!("Stored hash:     {}", result.stored_hash);
                println!("Recomputed hash: {}", result.recomputed_hash);
                bail!("Record {} failed verification: {}", id, result.status());
            }
            println!("Record {} is intact", id);
        }

        Commands::Tombstone { owner, id } => {
            let ledger = open_ledger(&cli.config)?;
            ledger.tombstone(&owner, id)?;
            println!("Record {} tombstoned", id);
        }

        Commands::Rehash { owner, id } => {
            let ledger = open_ledger(&cli.config)?;
            let record = ledger.rehash(&owner, id)?;
            println!("Record {} rehashed", id);
            println!("Hash: {}", record.content_hash);
        }

        Commands::Anchor { date, owner } => {
            let ledger = open_ledger(&cli.config)?;
            let window = match date {
                Some(window) => window,
                None => WindowKey::for_instant(ledger.now())
                    .previous()
                    .context("No previous day to anchor")?,
            };

            let anchors = match owner {
                Some(owner) => vec![ledger.anchor(window, &AnchorScope::Owner(owner))?],
                None => ledger.anchor_day(window, Reanchor::Always)?,
            };
            for anchor in anchors {
                println!(
                    "{} {:<20} {} ({} leaves)",
                    anchor.window_key,
                    anchor.scope.to_string(),
                    anchor.root_hash,
                    anchor.leaf_count
                );
            }
        }

        Commands::Anchors => {
            let ledger = open_ledger(&cli.config)?;
            let anchors = ledger.anchors()?;

            if anchors.is_empty() {
                println!("No anchors");
            } else {
                println!("{:<10} {:<20} {:<64} {}", "Window", "Scope", "Root", "Leaves");
                println!("{}", "-".repeat(104));
                for anchor in anchors {
                    println!(
                        "{} {:<20} {} {}",
                        anchor.window_key,
                        anchor.scope.to_string(),
                        anchor.root_hash,
                        anchor.leaf_count
                    );
                }
            }
        }

        Commands::Proof { id, output } => {
            let ledger = open_ledger(&cli.config)?;
            let proof = ledger.inclusion_proof(id)?;
            let json = proof.to_json_pretty()?;

            if let Some(path) = output {
                std::fs::write(&path, &json)?;
                println!("Proof written to {}", path.display());
            } else {
                println!("{}", json);
            }
        }

        Commands::VerifyProof { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let proof = InclusionProof::from_json(&json)?;

            match verify_proof(&proof) {
                Ok(()) => {
                    println!("Proof is VALID");
                    println!("Window: {}", proof.window_key);
                    println!("Leaf:   {}", proof.leaf_hash);
                    println!("Root:   {}", proof.root_hash);
                }
                Err(e) => bail!("Proof is INVALID: {}", e),
            }
        }

        Commands::Audit { owner } => {
            let ledger = open_ledger(&cli.config)?;
            for event in ledger.audit_log(owner.as_ref())? {
                println!(
                    "{:>6} {} {:<10} {:<10} {:<8} {}{}",
                    event.seq,
                    tel_types::iso_millis(&event.at),
                    event.action,
                    event.owner.as_ref().map(OwnerId::as_str).unwrap_or("-"),
                    event.record_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
                    if event.success { "ok" } else { "FAILED" },
                    event.detail.map(|d| format!(" {}", d)).unwrap_or_default(),
                );
            }
        }

        Commands::Run => {
            let config = load_config(&cli.config)?;
            let ledger = Arc::new(Ledger::open(&config)?);
            let interval = Duration::from_secs(config.anchoring.interval_secs.max(1));

            let (handle, task) = AnchorScheduler::spawn(ledger, interval);
            tokio::signal::ctrl_c().await?;
            handle.shutdown();
            task.await?;
        }
    }

    Ok(())
}
