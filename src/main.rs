//! Block Writer CLI
//!
//! Runs the block writer against an in-memory ledger, feeding it synthetic
//! transactions. Supports continuous mode (run) and single-block mode (once).

use anyhow::Result;
use block_writer::{BlockWriter, Ledger, Transaction, TracingSink, WriterConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "block-writer")]
#[command(about = "Periodically write blocks from pending mempool transactions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct LedgerArgs {
    /// Maximum transactions per block (default: BLOCK_WRITER_MAX_TXNS or 1000)
    #[arg(short, long)]
    max_txns: Option<usize>,

    /// Append written blocks as JSON lines to this file (default: BLOCK_WRITER_JOURNAL)
    #[arg(short, long)]
    journal: Option<PathBuf>,

    /// Number of transactions placed in the mempool before starting
    #[arg(short, long, default_value = "10")]
    seed_txns: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the writer until Ctrl+C
    Run {
        /// Write interval in milliseconds (default: BLOCK_WRITER_INTERVAL_MS or 5000)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Submit one synthetic transaction every N milliseconds
        #[arg(long)]
        feed_every_ms: Option<u64>,

        /// Stop after this many seconds instead of waiting for Ctrl+C
        #[arg(long)]
        duration_secs: Option<u64>,

        #[command(flatten)]
        ledger: LedgerArgs,
    },

    /// Write a single block from the seeded mempool and exit
    Once {
        #[command(flatten)]
        ledger: LedgerArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load .env file if present
    dotenvy::dotenv().ok();
    let env_config = WriterConfig::from_env()?;

    match cli.command {
        Commands::Run {
            interval_ms,
            feed_every_ms,
            duration_secs,
            ledger,
        } => {
            let config = WriterConfig::builder()
                .interval(
                    interval_ms
                        .map(Duration::from_millis)
                        .unwrap_or(env_config.interval),
                )
                .max_block_transactions(
                    ledger.max_txns.unwrap_or(env_config.max_block_transactions),
                )
                .journal_path(ledger.journal.clone().or(env_config.journal_path.clone()))
                .build();
            config.validate()?;

            let store = Arc::new(open_ledger(&config));
            seed(&store, ledger.seed_txns).await;

            info!("Starting block writer...");
            info!("Write interval: {:?}", config.interval);
            info!("Max transactions per block: {}", config.max_block_transactions);

            let feeder = feed_every_ms.map(|millis| {
                let store = Arc::clone(&store);
                let start = ledger.seed_txns;
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(Duration::from_millis(millis.max(1)));
                    let mut nonce = start;
                    loop {
                        ticker.tick().await;
                        nonce += 1;
                        store.submit(synthetic_transaction(nonce)).await;
                    }
                })
            });

            let writer = BlockWriter::from_config(Arc::clone(&store), &config, TracingSink);

            match duration_secs {
                Some(secs) => {
                    info!("Running for {}s", secs);
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                }
                None => {
                    tokio::signal::ctrl_c().await?;
                    info!("Received Ctrl+C, initiating shutdown...");
                }
            }

            if let Some(feeder) = feeder {
                feeder.abort();
            }
            writer.shutdown().await;

            info!(
                "Writer stopped: {} blocks written, {} transactions pending",
                store.chain_len().await,
                store.mempool_len().await
            );
        }

        Commands::Once { ledger } => {
            let config = WriterConfig::builder()
                .max_block_transactions(
                    ledger.max_txns.unwrap_or(env_config.max_block_transactions),
                )
                .journal_path(ledger.journal.clone().or(env_config.journal_path.clone()))
                .build();
            config.validate()?;

            let store = open_ledger(&config);
            seed(&store, ledger.seed_txns).await;

            info!("Writing a single block...");
            let block = store.write_block().await?;
            println!("Block {} written", block.header.number);
            println!("  Hash: {}", hex::encode(block.hash()?));
            println!("  Previous: {}", hex::encode(&block.header.prev_block));
            println!("  Transactions: {}", block.transactions.len());
            println!("  Still pending: {}", store.mempool_len().await);
        }
    }

    Ok(())
}

fn open_ledger(config: &WriterConfig) -> Ledger {
    let ledger = match &config.journal_path {
        Some(path) => Ledger::with_journal(config.max_block_transactions, path),
        None => Ledger::new(config.max_block_transactions),
    };
    if let Some(path) = ledger.journal_path() {
        info!("Journaling blocks to {}", path.display());
    }
    ledger
}

async fn seed(store: &Ledger, count: u64) {
    for nonce in 1..=count {
        store.submit(synthetic_transaction(nonce)).await;
    }
}

fn synthetic_transaction(nonce: u64) -> Transaction {
    const ACCOUNTS: [&str; 4] = ["alice", "bob", "carol", "dave"];
    let from = ACCOUNTS[(nonce % 4) as usize];
    let to = ACCOUNTS[((nonce + 1) % 4) as usize];
    Transaction::new(from, to, nonce * 10, nonce).with_tip(nonce % 3)
}
