//! # Charity Node
//!
//! Connects the sync engine to a JSON-RPC wallet/node and the off-chain
//! services, then either watches the ledger or submits a single write.
//!
//! ```text
//! charity-node watch
//! charity-node create-charity --name "Red Cross" --description Aid --bank-account ACC1 --bank-name BankA
//! charity-node donate-charity --id 1 --amount 5
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use primitive_types::U256;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use charity_sync::{
    spawn_wallet_listener, spawn_wallet_poller, Amount, ContractDescriptor, EndpointConfig,
    EntityId, HttpFraudScreen, HttpMirrorStore, Identity, JsonRpcLedger, LedgerClient, Snapshot,
    SyncApi, SyncConfig, SyncEngine, WriteIntent, WriteResult,
};

type Engine = SyncEngine<JsonRpcLedger, HttpMirrorStore, HttpFraudScreen>;

#[derive(Parser, Debug)]
#[command(name = "charity-node")]
#[command(about = "Charity ledger sync node")]
#[command(version)]
struct Cli {
    /// JSON-RPC endpoint (overrides CHARITY_RPC_URL)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Contract descriptor path (overrides CHARITY_DESCRIPTOR_PATH)
    #[arg(long, global = true)]
    descriptor: Option<String>,

    /// Emit JSON logs
    #[arg(long, global = true, env = "CHARITY_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the wallet and log every published snapshot until Ctrl+C
    Watch,
    /// Create a charity
    CreateCharity {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        bank_account: String,
        #[arg(long)]
        bank_name: String,
    },
    /// Create an organisation
    CreateOrganisation {
        #[arg(long)]
        name: String,
        #[arg(long)]
        bank_account: String,
        #[arg(long)]
        bank_name: String,
    },
    /// Donate to a charity
    DonateCharity {
        #[arg(long)]
        id: EntityId,
        /// Amount in the ledger's smallest unit, decimal
        #[arg(long, value_parser = parse_amount)]
        amount: Amount,
    },
    /// Donate to an organisation
    DonateOrganisation {
        #[arg(long)]
        id: EntityId,
        /// Amount in the ledger's smallest unit, decimal
        #[arg(long, value_parser = parse_amount)]
        amount: Amount,
    },
}

impl Command {
    fn into_intent(self) -> Option<WriteIntent> {
        match self {
            Command::Watch => None,
            Command::CreateCharity {
                name,
                description,
                bank_account,
                bank_name,
            } => Some(WriteIntent::CreateCharity {
                name,
                description,
                bank_account,
                bank_name,
            }),
            Command::CreateOrganisation {
                name,
                bank_account,
                bank_name,
            } => Some(WriteIntent::CreateOrganisation {
                name,
                bank_account,
                bank_name,
            }),
            Command::DonateCharity { id, amount } => Some(WriteIntent::DonateToCharity {
                charity_id: id,
                amount,
            }),
            Command::DonateOrganisation { id, amount } => {
                Some(WriteIntent::DonateToOrganisation {
                    organisation_id: id,
                    amount,
                })
            }
        }
    }
}

fn parse_amount(raw: &str) -> Result<Amount, String> {
    U256::from_dec_str(raw.trim()).map_err(|e| format!("invalid amount {raw:?}: {e:?}"))
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

async fn connect(endpoints: &EndpointConfig, config: SyncConfig) -> Result<Arc<Engine>> {
    let descriptor = ContractDescriptor::load(&endpoints.descriptor_path)
        .with_context(|| format!("failed to load {}", endpoints.descriptor_path))?;
    let ledger = JsonRpcLedger::connect(
        endpoints.rpc_url.clone(),
        descriptor,
        config.gas_limit,
        config.call_timeout(),
    )
    .await
    .with_context(|| format!("failed to connect to {}", endpoints.rpc_url))?;
    let mirror = HttpMirrorStore::new(endpoints.mirror_url.clone(), config.side_call_timeout())?;
    let screen = HttpFraudScreen::new(endpoints.fraud_url.clone(), config.side_call_timeout())?;

    let engine = Arc::new(SyncEngine::new(
        config,
        Arc::new(ledger),
        Arc::new(mirror),
        Arc::new(screen),
    ));
    for failure in engine.prepare_side_services().await {
        warn!(error = %failure, "Off-chain service unavailable, continuing without it");
    }
    Ok(engine)
}

async fn initialize(engine: &Engine) -> Result<Arc<Snapshot>> {
    let ledger = engine.ledger();
    let network = ledger.current_network().await?;
    let snapshot = match ledger.current_identity().await? {
        Some(identity) => engine.initialize(identity, network).await?,
        None => {
            warn!(%network, "Wallet exposes no account; waiting for one");
            engine.on_network_changed(network).await?
        }
    };
    Ok(snapshot)
}

fn log_snapshot(snapshot: &Arc<Snapshot>) {
    info!(
        version = snapshot.version,
        block = snapshot.block_height,
        identity = snapshot.identity.as_ref().map(Identity::as_str).unwrap_or("-"),
        charities = snapshot.charities.len(),
        organisations = snapshot.organisations.len(),
        transactions = snapshot.transactions.len(),
        "Snapshot published"
    );
}

async fn watch(engine: Arc<Engine>, endpoints: &EndpointConfig) -> Result<()> {
    let _subscription = engine.subscribe(Arc::new(log_snapshot));
    let ledger = Arc::clone(engine.ledger());
    let listener = spawn_wallet_listener(Arc::clone(&engine), ledger.wallet_events());
    let poller = spawn_wallet_poller(
        Arc::clone(&ledger),
        ledger.feed().clone(),
        endpoints.wallet_poll_interval(),
    );

    info!("Watching wallet. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Received shutdown signal");

    poller.abort();
    listener.abort();
    Ok(())
}

fn report(result: &WriteResult) -> serde_json::Value {
    json!({
        "txId": result.tx_id,
        "entity": result.entity,
        "version": result.version,
        "mirrorWarning": result.mirror_warning,
        "screenWarning": result.screen_warning,
        "fraudVerdict": result.fraud_verdict,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs)?;

    let mut endpoints = EndpointConfig::from_env();
    if let Some(url) = cli.rpc_url {
        endpoints.rpc_url = url;
    }
    if let Some(path) = cli.descriptor {
        endpoints.descriptor_path = path;
    }

    let engine = connect(&endpoints, SyncConfig::from_env()).await?;
    let snapshot = initialize(&engine).await?;
    log_snapshot(&snapshot);

    match cli.command.into_intent() {
        None => watch(engine, &endpoints).await,
        Some(intent) => {
            let method = intent.method();
            let result = engine
                .submit_write(intent)
                .await
                .with_context(|| format!("{method} failed"))?;
            if let Some(verdict) = result.fraud_verdict.filter(|v| v.is_fraud) {
                warn!(?verdict, "Donation flagged by fraud screen");
            }
            println!("{}", serde_json::to_string_pretty(&report(&result))?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("5").unwrap(), Amount::from(5u64));
        assert_eq!(parse_amount(" 1000000000000000000 ").unwrap(), Amount::exp10(18));
        assert!(parse_amount("-1").is_err());
        assert!(parse_amount("ten").is_err());
    }

    #[test]
    fn test_donate_command_maps_to_intent() {
        let cli = Cli::try_parse_from([
            "charity-node",
            "donate-organisation",
            "--id",
            "2",
            "--amount",
            "7",
        ])
        .unwrap();

        assert_eq!(
            cli.command.into_intent(),
            Some(WriteIntent::DonateToOrganisation {
                organisation_id: 2,
                amount: Amount::from(7u64),
            })
        );
    }

    #[test]
    fn test_watch_has_no_intent() {
        let cli = Cli::try_parse_from(["charity-node", "watch", "--rpc-url", "http://node:8545"])
            .unwrap();

        assert_eq!(cli.rpc_url.as_deref(), Some("http://node:8545"));
        assert!(cli.command.into_intent().is_none());
    }
}
