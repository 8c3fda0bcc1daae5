use std::sync::Arc;

use clap::Parser;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tokio::sync::mpsc;

use timed::config::Config;
use timed::consensus::driver::{ConsensusDriver, RoundOutcome};
use timed::network::LoopbackNetwork;
use timed::shutdown::ShutdownManager;
use timed::storage::{BlockStore, InMemoryKv, KvStore, SledKv, StateStore, TransactionStore};

#[derive(Parser, Debug)]
#[command(name = "timed")]
#[command(about = "Hybrid VRF + PoS + PoW consensus node", long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[arg(short, long)]
    verbose: bool,

    /// Write a default config.toml at `--config` and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.generate_config {
        let config = Config::default();
        match config.save_to_file(&args.config) {
            Ok(()) => {
                println!("generated default config at {}", args.config);
                return;
            }
            Err(e) => {
                eprintln!("failed to generate config: {e}");
                std::process::exit(1);
            }
        }
    }

    let config = match Config::load_from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(_) => {
            tracing::warn!(path = %args.config, "config file not found, using defaults");
            Config::default()
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        std::process::exit(1);
    }
    let config = Arc::new(config);

    setup_logging(&config.logging, args.verbose);
    tracing::info!(node = %config.node.name, "starting consensus node");

    let kv: Arc<dyn KvStore> = match config.storage.backend {
        timed::config::StorageBackend::Memory => Arc::new(InMemoryKv::new()),
        timed::config::StorageBackend::Sled => {
            std::fs::create_dir_all(config.node.data_path()).ok();
            match SledKv::open(std::path::Path::new(&config.storage.sled_path)) {
                Ok(db) => Arc::new(db),
                Err(e) => {
                    tracing::error!(%e, "failed to open sled store, falling back to in-memory");
                    Arc::new(InMemoryKv::new())
                }
            }
        }
    };

    let blocks = BlockStore::new(kv.clone());
    let transactions = TransactionStore::new(kv.clone());
    let state = StateStore::new(kv);
    let chain_state = state.get_chain_state().await.unwrap_or_default();

    // Key management is an external collaborator (SPEC_FULL §1); this node
    // generates an ephemeral signing key for standalone operation rather
    // than reaching into a wallet service.
    let local_sk = SigningKey::generate(&mut OsRng);
    let network: Arc<dyn timed::network::NetworkHandle> = Arc::new(LoopbackNetwork::new());

    let driver = Arc::new(ConsensusDriver::new(
        config.clone(),
        local_sk,
        network,
        blocks,
        transactions,
        state,
        &chain_state,
    ));

    let mut shutdown_manager = ShutdownManager::new();
    let shutdown_token = shutdown_manager.token();

    let round_driver = driver.clone();
    let round_cancel = shutdown_token.clone();
    let round_handle = tokio::spawn(async move {
        let mut prev_hash = [0u8; 32];
        loop {
            if round_cancel.is_cancelled() {
                break;
            }
            let (_vrf_tx, vrf_rx) = mpsc::unbounded_channel();
            let (_block_tx, block_rx) = mpsc::unbounded_channel();
            let now = chrono::Utc::now().timestamp_millis();
            let outcome = round_driver
                .run_round(prev_hash, 1.0, 1.0, 1.0, now, vrf_rx, block_rx, round_cancel.clone())
                .await;
            match outcome {
                RoundOutcome::Committed(block) => {
                    tracing::info!(height = block.header.height, "committed block");
                    prev_hash = block.hash();
                }
                RoundOutcome::Retry => {
                    tracing::debug!("round retried without commit");
                }
                RoundOutcome::Aborted => break,
            }
        }
    });
    shutdown_manager.register_task(round_handle);

    shutdown_manager.wait_for_shutdown().await;
    tracing::info!("shutdown complete");
}

fn setup_logging(config: &timed::config::LoggingConfig, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "trace" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match config.format {
        timed::config::LogFormat::Json => {
            fmt().json().with_env_filter(filter).with_thread_ids(false).init();
        }
        timed::config::LogFormat::Compact => {
            fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact()
                .init();
        }
    }
}
