//! skiff: light payment client.
//!
//! Syncs headers from a small pool of peers, watches relayed transactions
//! for payments to freshly generated addresses and prints what happens.
//! With `--send-to`, one payment is built and broadcast once the client is
//! synced.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use skiff_core::constants::{COIN, NetworkType};
use skiff_core::events::{ClientEvent, EventReceiver};
use skiff_node_lib::{Client, ClientConfig};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "skiff", version, about = "Skiff header-syncing payment client")]
struct Args {
    /// TOML config file (default: <data-dir>/skiff.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Connect to mainnet instead of testnet
    #[arg(long, conflicts_with = "regtest")]
    mainnet: bool,

    /// Local regression-test network; peers must be given with --peer
    #[arg(long, conflicts_with = "mainnet")]
    regtest: bool,

    /// Peers dialled before DNS seeding (comma-separated host:port)
    #[arg(long, value_delimiter = ',')]
    peer: Vec<SocketAddr>,

    /// Number of simultaneous peer connections
    #[arg(long)]
    max_peers: Option<usize>,

    /// Pay this address once synced
    #[arg(long, requires = "amount")]
    send_to: Option<String>,

    /// Amount to pay, in base units
    #[arg(long)]
    amount: Option<u64>,

    /// Fee to offer, in base units; raised automatically if too low
    #[arg(long, default_value_t = 0)]
    fee: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    /// Layer command-line flags over the loaded configuration.
    fn into_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::load(self.config.as_deref()).context("loading configuration")?;

        let network = if self.regtest {
            Some(NetworkType::Regtest)
        } else if self.mainnet {
            Some(NetworkType::Mainnet)
        } else {
            None
        };
        if let Some(network) = network.filter(|n| *n != config.network_type()) {
            let mut switched = ClientConfig::for_network(network);
            switched.network.bootstrap_peers = config.network.bootstrap_peers.clone();
            switched.log_level = config.log_level.clone();
            config = switched;
        }

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        config.network.bootstrap_peers.extend(self.peer.iter().copied());
        if let Some(n) = self.max_peers {
            config.network.max_peers = n;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

#[derive(Debug)]
struct Payment {
    recipient: String,
    amount: u64,
    fee: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.into_config()?;
    init_logging(&config.log_level, &args.log_format);

    info!("Skiff v{}", env!("CARGO_PKG_VERSION"));
    info!(network = ?config.network_type(), data_dir = %config.data_dir.display(), "configuration");

    let payment = match (args.send_to, args.amount) {
        (Some(recipient), Some(amount)) => Some(Payment {
            recipient,
            amount,
            fee: args.fee,
        }),
        _ => None,
    };

    let (client, events) = Client::start(config).context("starting client")?;
    for address in client.addresses() {
        info!(%address, "receiving address");
    }

    tokio::select! {
        _ = event_loop(&client, events, payment) => {
            info!("event channel closed");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "cannot listen for Ctrl+C");
            }
            info!("shutting down");
        }
    }

    client.shutdown().await;
    info!(balance = %format_coins(client.get_balance(0)), "final balance");
    Ok(())
}

async fn event_loop(client: &Client, mut events: EventReceiver, mut payment: Option<Payment>) {
    let threshold = client.config().wallet.min_confirmations;
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::PeerConnected { addr, height } => info!(%addr, height, "peer connected"),
            ClientEvent::PeerDisconnected { addr } => info!(%addr, "peer disconnected"),
            ClientEvent::SyncProgress { height } => info!(height, "syncing"),
            ClientEvent::Synced => {
                info!(
                    height = client.best_height(),
                    peers = client.peer_count(),
                    balance = %format_coins(client.get_balance(threshold)),
                    "synced"
                );
                if let Some(p) = payment.take() {
                    send(client, &p, threshold);
                }
            }
            ClientEvent::FundsReceived { address, value, txid } => {
                info!(%address, value = %format_coins(value), %txid, "funds received");
            }
            ClientEvent::FundsReturned { address, value } => {
                info!(%address, value = %format_coins(value), "funds returned");
            }
            ClientEvent::TransactionRejected { txid, code, reason } => {
                warn!(%txid, code, %reason, "transaction rejected");
            }
        }
    }
}

fn send(client: &Client, payment: &Payment, threshold: u64) {
    let tx = match client.create_transaction(&payment.recipient, payment.amount, payment.fee, threshold) {
        Ok(tx) => tx,
        Err(e) => {
            error!(error = %e, "cannot create payment");
            return;
        }
    };
    match tx.txid() {
        Ok(txid) => info!(%txid, amount = %format_coins(payment.amount), "payment created"),
        Err(e) => warn!(error = %e, "payment has no txid"),
    }
    match client.broadcast(tx) {
        Ok(reached) => info!(reached, "payment broadcast"),
        Err(e) => error!(error = %e, "broadcast failed"),
    }
}

fn format_coins(value: u64) -> String {
    format!("{}.{:08}", value / COIN, value % COIN)
}

/// Initialize tracing with the given level and output format.
///
/// `RUST_LOG` takes precedence over `level`. Pass `format = "json"` for
/// structured output; anything else selects human-readable text.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
