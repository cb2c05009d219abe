//! # Domain Errors
//!
//! Error taxonomy shared by the engine and its ports.

use super::entities::EntityKind;
use thiserror::Error;

/// Synchronization error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The ledger could not be reached.
    #[error("Ledger unreachable: {0}")]
    Connection(String),

    /// No wallet identity is available to read or sign with.
    #[error("No wallet identity available")]
    Identity,

    /// Write intent failed field validation; no network call was made.
    #[error("Invalid write intent: {0}")]
    Validation(String),

    /// The ledger refused the state change (e.g. reverted call).
    #[error("Ledger rejected the call: {reason}")]
    LedgerRejected {
        /// Reason string reported by the ledger
        reason: String,
    },

    /// Resync aborted mid-assembly. The previous snapshot stays current.
    #[error("Resync aborted reading {kind} #{index}: {reason}")]
    PartialRead {
        /// Collection being read
        kind: EntityKind,
        /// 1-based index that failed
        index: u64,
        /// Underlying failure
        reason: String,
    },

    /// A ledger or side call did not resolve in time.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        /// What was being awaited
        operation: String,
        /// Configured bound
        timeout_ms: u64,
    },

    /// The node answered from a block older than the one a write landed in.
    #[error("Ledger node at block {height} has not reached block {required}")]
    LedgerBehind {
        /// Height the node reported
        height: u64,
        /// Block the write was included in
        required: u64,
    },

    /// The off-chain mirror refused or could not be reached.
    #[error("Mirror unavailable: {0}")]
    MirrorUnavailable(String),

    /// The fraud screen refused or could not be reached.
    #[error("Fraud screen unavailable: {0}")]
    ScreenUnavailable(String),

    /// The operation belonged to a network that is no longer active.
    #[error("Result discarded: network changed while {0} was in flight")]
    Cancelled(String),

    /// The ledger committed the write but the follow-up resync failed.
    #[error("Write {tx_id} committed but resync failed: {source}")]
    StaleAfterWrite {
        /// Ledger transaction id of the committed write
        tx_id: String,
        /// Why the resync failed
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Errors whose message is meant for the end user verbatim.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SyncError::Validation(_) | SyncError::LedgerRejected { .. }
        )
    }

    /// Side-call failures that never fail a write.
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            SyncError::MirrorUnavailable(_) | SyncError::ScreenUnavailable(_)
        )
    }

    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        SyncError::Validation(msg.into())
    }

    /// Shorthand for a ledger rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        SyncError::LedgerRejected {
            reason: reason.into(),
        }
    }
}

/// Result alias for this crate.
pub type SyncResult<T> = Result<T, SyncError>;
