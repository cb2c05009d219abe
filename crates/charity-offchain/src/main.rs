//! # Charity Off-chain Server
//!
//! Runs the mirror service and the fraud service until Ctrl+C.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use charity_offchain::{FraudState, OffchainConfig, OffchainServices};

/// Mirror and fraud services for the charity ledger.
#[derive(Parser, Debug)]
#[command(name = "charity-offchain")]
#[command(about = "Off-chain mirror and fraud screening services")]
struct Args {
    /// Bind address (defaults to CHARITY_OFFCHAIN_HOST or 127.0.0.1)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Mirror service port (defaults to CHARITY_MIRROR_PORT or 3000)
    #[arg(long)]
    mirror_port: Option<u16>,

    /// Fraud service port (defaults to CHARITY_FRAUD_PORT or 3001)
    #[arg(long)]
    fraud_port: Option<u16>,

    /// Emit JSON logs
    #[arg(long, env = "CHARITY_JSON_LOGS")]
    json_logs: bool,
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_env("CHARITY_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    installed.context("failed to install tracing subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.json_logs)?;

    let mut config = OffchainConfig::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.mirror_port {
        config.mirror_port = port;
    }
    if let Some(port) = args.fraud_port {
        config.fraud_port = port;
    }

    let services = OffchainServices::start(&config, Arc::new(FraudState::default()))
        .await
        .context("failed to start off-chain services")?;
    info!(
        mirror = %services.mirror_url(&config),
        fraud = %services.fraud_url(&config),
        "Off-chain services running. Press Ctrl+C to stop."
    );

    let OffchainServices { mirror, fraud, .. } = services;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl+C")?;
            info!("Received shutdown signal");
        }
        outcome = mirror.handle => {
            error!(?outcome, "Mirror service exited");
        }
        outcome = fraud.handle => {
            error!(?outcome, "Fraud service exited");
        }
    }

    Ok(())
}
