//! # Charity Sync
//!
//! Keeps a versioned in-memory snapshot of a charity ledger contract in step
//! with the chain, and mirrors every confirmed write to off-chain services.
//!
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Guarantees
//!
//! | Guarantee | How |
//! |-----------|-----|
//! | Consistent snapshots | Every resync reads at one pinned block height |
//! | Monotonic versions | Publishing happens only under the operation queue |
//! | No cross-network leaks | Network changes cancel in-flight operations by epoch |
//! | Ledger is truth | Mirror and fraud screen failures never fail a write |
//! | Writes are visible | The post-write resync must read at or above the receipt block |
//!
//! ## Module Structure
//!
//! ```text
//! charity-sync/
//! ├── domain/          # Entities, Snapshot, WriteIntent, errors, invariants
//! ├── ports/           # SyncApi (inbound) + LedgerClient/MirrorStore/FraudScreen (outbound)
//! ├── application/     # SyncEngine, listener registry, wallet listener
//! ├── adapters/        # JSON-RPC ledger, HTTP services, in-memory doubles
//! └── config.rs        # SyncConfig, EndpointConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{
    spawn_wallet_poller, ContractDescriptor, HttpFraudScreen, HttpMirrorStore, InMemoryLedger,
    InMemoryMirror, JsonRpcLedger, StaticFraudScreen,
};
pub use application::{spawn_wallet_listener, Subscription, SyncEngine};
pub use config::{EndpointConfig, SyncConfig};
pub use domain::{
    Amount, Beneficiary, BeneficiaryKind, Charity, EntityId, EntityKind, FraudVerdict, Identity,
    NetworkId, Organisation, Snapshot, SnapshotVersion, SyncError, SyncResult, Transaction,
    WriteIntent, WriteResult,
};
pub use ports::{
    FraudScreen, LedgerClient, MirrorStore, SnapshotListener, SyncApi, WalletEvent, WalletFeed,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
