use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use bitcoin_relay_core::{target::encode_target, BlockHeader, Digest, Network, Relay, RelayError};
use clap::Parser;
use relay_host::{config::Config, parse_headers_from_file, rocks_db::RocksDbStore, TracingEventSink};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// RocksDB directory (defaults to ROCKS_DB_PATH or data/relay_db)
    #[clap(long, global = true)]
    db_path: Option<PathBuf>,

    /// Bitcoin network whose rules to apply (defaults to BITCOIN_NETWORK or mainnet)
    #[clap(long, global = true)]
    network: Option<Network>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Stores the header the relay starts from.
    Init {
        /// Hex-encoded 80-byte header
        header_hex: String,
        /// Height of that header
        height: u32,
    },
    /// Stores headers without linkage checks, at consecutive heights.
    Bootstrap {
        file: PathBuf,
        start_height: u32,
    },
    /// Extends the chain with headers at constant difficulty.
    Ingest {
        file: PathBuf,
        /// Allow difficulty to change inside the segment
        #[clap(long)]
        internal: bool,
    },
    /// Ingests headers that open a new difficulty epoch.
    Retarget {
        /// Digest of the first block of the previous epoch
        epoch_start: Digest,
        file: PathBuf,
    },
    /// Prints a stored header as JSON.
    Header { digest: Digest },
    /// Moves the best known digest to a heavier header.
    MarkHeaviest {
        current_best: Digest,
        new_best: Digest,
    },
    /// Shows the relay state.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?.with_overrides(cli.db_path, cli.network);

    info!("Network: {}", config.network);
    if !config.rocks_db_path.exists() {
        fs::create_dir_all(&config.rocks_db_path)?;
    }
    info!("Using database at: {}", config.rocks_db_path.display());

    let store = RocksDbStore::new(&config.rocks_db_path)?;
    let mut relay = Relay::new(store, TracingEventSink::default(), config.network.params());

    match cli.command {
        Commands::Init { header_hex, height } => {
            let header = BlockHeader::from_hex(&header_hex)?;
            let digest = relay
                .initialize(header, height)
                .context("Failed to initialize relay")?;
            println!("Initialized relay at {} (height {})", digest, height);
        }
        Commands::Bootstrap { file, start_height } => {
            let headers = parse_headers_from_file(&file)?;
            for (height, header) in (start_height..).zip(headers) {
                let digest = relay
                    .ingest_header(header, height)
                    .with_context(|| format!("Failed to store header at height {}", height))?;
                println!("{} {}", height, digest);
            }
        }
        Commands::Ingest { file, internal } => {
            let headers = parse_headers_from_file(&file)?;
            let tip = relay
                .ingest_headers(&headers, internal)
                .context("Header segment rejected")?;
            println!("New tip: {} (height {})", tip, relay.find_height(&tip)?);
        }
        Commands::Retarget { epoch_start, file } => {
            let headers = parse_headers_from_file(&file)?;
            let tip = relay
                .ingest_difficulty_change(&epoch_start, &headers)
                .context("Difficulty change rejected")?;
            println!("New tip: {} (height {})", tip, relay.find_height(&tip)?);
            println!(
                "Epoch bits: {:#010x}",
                encode_target(&relay.current_epoch_difficulty()?)
            );
        }
        Commands::Header { digest } => {
            let stored = relay.get_header(&digest)?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        Commands::MarkHeaviest {
            current_best,
            new_best,
        } => {
            let ancestor = relay
                .mark_new_heaviest(&current_best, &new_best)
                .context("Failed to mark new heaviest header")?;
            println!("Best known: {} (common ancestor {})", new_best, ancestor);
        }
        Commands::Status => status_command(&relay)?,
    }

    Ok(())
}

fn status_command(relay: &Relay<RocksDbStore, TracingEventSink>) -> Result<()> {
    match relay.relay_genesis() {
        Ok(genesis) => {
            let best = relay.best_known_digest()?;
            println!("Relay genesis: {}", genesis);
            println!("Best known:    {} (height {})", best, relay.find_height(&best)?);
            println!("Last reorg ancestor: {}", relay.last_reorg_common_ancestor()?);
        }
        Err(RelayError::Uninitialized) => println!("Relay is not initialized"),
        Err(e) => return Err(e.into()),
    }
    println!(
        "Current epoch bits: {:#010x}",
        encode_target(&relay.current_epoch_difficulty()?)
    );
    println!(
        "Previous epoch bits: {:#010x}",
        encode_target(&relay.prev_epoch_difficulty()?)
    );
    println!("Stored headers: {}", relay.store().header_count()?);
    Ok(())
}
