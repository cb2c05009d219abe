//! # Outbound Ports
//!
//! Traits for the engine's external collaborators: the ledger contract,
//! the off-chain mirror and the fraud screen.

use crate::domain::{
    CharityRecord, EntityId, EntityKind, FraudVerdict, Identity, LedgerRecord, NetworkId,
    OrganisationRecord, ScreeningRequest, SyncResult, TransactionRecord, WriteIntent,
    WriteReceipt,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Wallet events that trigger a full resync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    /// The wallet switched accounts (`None` when it disconnected all accounts).
    IdentityChanged(Option<Identity>),
    /// The wallet switched chains.
    NetworkChanged(NetworkId),
}

/// Capacity of a wallet event channel.
pub const WALLET_EVENT_CAPACITY: usize = 64;

/// Broadcast feed of wallet events.
#[derive(Clone, Debug)]
pub struct WalletFeed {
    sender: broadcast::Sender<WalletEvent>,
}

impl WalletFeed {
    /// Create a feed with the default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(WALLET_EVENT_CAPACITY);
        Self { sender }
    }

    /// New receiver; sees events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. Returns the number of receivers reached.
    pub fn emit(&self, event: WalletEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for WalletFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed access to the on-chain contract.
///
/// Reads take the block height they are pinned to, so one resync observes a
/// single ledger state.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Latest block height.
    async fn block_height(&self) -> SyncResult<u64>;

    /// Number of entities of `kind` as of block `at`.
    async fn get_count(&self, kind: EntityKind, at: u64) -> SyncResult<u64>;

    /// Entity `id` (1-based) of `kind` as of block `at`.
    async fn get_entity(&self, kind: EntityKind, id: EntityId, at: u64)
        -> SyncResult<LedgerRecord>;

    /// Submit a state-changing call from `from` and wait for inclusion.
    async fn call(&self, intent: &WriteIntent, from: &Identity) -> SyncResult<WriteReceipt>;

    /// Identity the wallet currently exposes.
    async fn current_identity(&self) -> SyncResult<Option<Identity>>;

    /// Network the wallet is currently on.
    async fn current_network(&self) -> SyncResult<NetworkId>;

    /// Subscribe to identity/network change events.
    fn wallet_events(&self) -> broadcast::Receiver<WalletEvent>;
}

/// Off-chain mirror of ledger writes. Every call is idempotent on ledger id.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// `GET /init`
    async fn init(&self) -> SyncResult<()>;

    /// Mirror a created charity.
    async fn upsert_charity(&self, record: &CharityRecord) -> SyncResult<()>;

    /// Mirror a created organisation.
    async fn upsert_organisation(&self, record: &OrganisationRecord) -> SyncResult<()>;

    /// Mirror a recorded donation.
    async fn append_transaction(&self, record: &TransactionRecord) -> SyncResult<()>;
}

/// External fraud classifier. Advisory only.
#[async_trait]
pub trait FraudScreen: Send + Sync {
    /// Prepare the screen (`POST /init`).
    async fn init(&self) -> SyncResult<()>;

    /// Classify one donation.
    async fn check(&self, request: &ScreeningRequest) -> SyncResult<FraudVerdict>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_feed_delivers_to_subscribers() {
        let feed = WalletFeed::new();
        let mut rx = feed.subscribe();

        assert_eq!(feed.emit(WalletEvent::NetworkChanged(NetworkId(5))), 1);
        assert_eq!(rx.recv().await.unwrap(), WalletEvent::NetworkChanged(NetworkId(5)));
    }

    #[test]
    fn test_feed_without_subscribers() {
        let feed = WalletFeed::default();
        assert_eq!(feed.emit(WalletEvent::IdentityChanged(None)), 0);
    }
}
