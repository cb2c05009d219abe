//! # Wallet Listener
//!
//! Forwards wallet events from a broadcast feed into the engine.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::SyncEngine;
use crate::domain::SyncError;
use crate::ports::{FraudScreen, LedgerClient, MirrorStore, WalletEvent};

/// Spawn a task applying every wallet event to `engine` in arrival order.
///
/// The task ends when the feed closes.
pub fn spawn_wallet_listener<L, M, F>(
    engine: Arc<SyncEngine<L, M, F>>,
    mut events: broadcast::Receiver<WalletEvent>,
) -> JoinHandle<()>
where
    L: LedgerClient + 'static,
    M: MirrorStore + 'static,
    F: FraudScreen + 'static,
{
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Wallet listener lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => {
                    info!("Wallet event feed closed");
                    break;
                }
            };

            let resync = engine.apply_wallet_event(event.clone());
            tokio::spawn(async move {
                match resync.await {
                    Ok(Ok(snapshot)) => {
                        info!(?event, version = snapshot.version, "Resynced after wallet event")
                    }
                    Ok(Err(SyncError::Cancelled(_))) => {
                        info!(?event, "Resync superseded by a later network change")
                    }
                    Ok(Err(e)) => warn!(?event, error = %e, "Resync after wallet event failed"),
                    Err(e) => warn!(?event, error = %e, "Resync task aborted"),
                }
            });
        }
    })
}
