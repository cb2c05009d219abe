//! Wallet poller: turns periodic account/network queries into wallet events.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::domain::{Identity, NetworkId};
use crate::ports::{LedgerClient, WalletEvent, WalletFeed};

/// Poll `ledger` every `interval` and emit a `WalletEvent` on `feed` whenever
/// the reported identity or network differs from the previous poll.
///
/// The first successful poll only records the baseline.
pub fn spawn_wallet_poller<L>(ledger: Arc<L>, feed: WalletFeed, interval: Duration) -> JoinHandle<()>
where
    L: LedgerClient + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<(Option<Identity>, NetworkId)> = None;

        loop {
            ticker.tick().await;

            let polled = async {
                let network = ledger.current_network().await?;
                let identity = ledger.current_identity().await?;
                Ok::<_, crate::domain::SyncError>((identity, network))
            }
            .await;

            let (identity, network) = match polled {
                Ok(state) => state,
                Err(e) => {
                    warn!(error = %e, "Wallet poll failed");
                    continue;
                }
            };

            if let Some((prev_identity, prev_network)) = &last {
                if *prev_network != network {
                    debug!(%network, "Wallet network changed");
                    feed.emit(WalletEvent::NetworkChanged(network));
                }
                if *prev_identity != identity {
                    debug!(?identity, "Wallet identity changed");
                    feed.emit(WalletEvent::IdentityChanged(identity.clone()));
                }
            }
            last = Some((identity, network));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryLedger;

    #[tokio::test]
    async fn test_poller_reports_changes_only() {
        let ledger = Arc::new(InMemoryLedger::new(NetworkId(1), Some(Identity::new("0xabc"))));
        let feed = WalletFeed::new();
        let mut events = feed.subscribe();
        let handle = spawn_wallet_poller(Arc::clone(&ledger), feed, Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().is_err());

        // Ledger's own feed is separate from the poller's.
        ledger.switch_network(NetworkId(2));
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, WalletEvent::NetworkChanged(NetworkId(2)));

        handle.abort();
    }
}
