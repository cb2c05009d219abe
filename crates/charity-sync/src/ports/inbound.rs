//! # Inbound Ports
//!
//! API the rendering layer and wallet glue use to drive synchronization.

use crate::application::Subscription;
use crate::domain::{Identity, NetworkId, Snapshot, SyncResult, WriteIntent, WriteResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked once per published snapshot, in publish order.
pub type SnapshotListener = Arc<dyn Fn(&Arc<Snapshot>) + Send + Sync>;

/// Synchronization API - inbound port.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Full resync under `identity` on `network`; returns the published snapshot.
    async fn initialize(&self, identity: Identity, network: NetworkId)
        -> SyncResult<Arc<Snapshot>>;

    /// Current snapshot. Never blocks on I/O, never fails.
    fn get_snapshot(&self) -> Arc<Snapshot>;

    /// Register a listener; dropping or unsubscribing the handle stops delivery.
    fn subscribe(&self, listener: SnapshotListener) -> Subscription;

    /// Wallet switched account: full resync.
    async fn on_identity_changed(&self, identity: Option<Identity>) -> SyncResult<Arc<Snapshot>>;

    /// Wallet switched chain: cancel old-network work, then full resync.
    async fn on_network_changed(&self, network: NetworkId) -> SyncResult<Arc<Snapshot>>;

    /// Validate, submit, resync, then mirror and screen best-effort.
    async fn submit_write(&self, intent: WriteIntent) -> SyncResult<WriteResult>;
}
