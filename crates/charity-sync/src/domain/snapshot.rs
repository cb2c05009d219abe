//! # Snapshot
//!
//! Immutable, versioned copy of ledger-visible state as of one block.
//! The engine publishes `Arc<Snapshot>`; nothing mutates a snapshot after
//! it has been assembled.

use super::entities::{Charity, EntityId, Identity, NetworkId, Organisation, Transaction};
use serde::{Deserialize, Serialize};

/// Monotonic publication counter.
pub type SnapshotVersion = u64;

/// Ledger state as of `block_height`, tagged with the session it was read under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Publication version. 0 is the unconnected placeholder.
    pub version: SnapshotVersion,
    /// Block the entity reads were pinned to.
    pub block_height: u64,
    /// Caller identity active when the snapshot was built.
    pub identity: Option<Identity>,
    /// Network active when the snapshot was built.
    pub network: Option<NetworkId>,
    /// Charities ordered by id.
    pub charities: Vec<Charity>,
    /// Organisations ordered by id.
    pub organisations: Vec<Organisation>,
    /// Transactions ordered by id.
    pub transactions: Vec<Transaction>,
    latest_charities: Vec<Charity>,
}

impl Snapshot {
    /// Placeholder current before the first successful resync.
    pub fn disconnected() -> Self {
        Self {
            version: 0,
            block_height: 0,
            identity: None,
            network: None,
            charities: Vec::new(),
            organisations: Vec::new(),
            transactions: Vec::new(),
            latest_charities: Vec::new(),
        }
    }

    /// Whether this snapshot was built from a ledger (vs. the placeholder).
    pub fn is_connected(&self) -> bool {
        self.identity.is_some() && self.network.is_some()
    }

    /// Most-recent-first slice of charities.
    pub fn latest_charities(&self) -> &[Charity] {
        &self.latest_charities
    }

    /// Charity by ledger id.
    pub fn charity(&self, id: EntityId) -> Option<&Charity> {
        lookup(&self.charities, id, |c| c.id)
    }

    /// Organisation by ledger id.
    pub fn organisation(&self, id: EntityId) -> Option<&Organisation> {
        lookup(&self.organisations, id, |o| o.id)
    }

    /// Transaction by ledger id.
    pub fn transaction(&self, id: EntityId) -> Option<&Transaction> {
        lookup(&self.transactions, id, |t| t.id)
    }

    /// Entity data equality, ignoring version and block height.
    pub fn same_contents(&self, other: &Snapshot) -> bool {
        self.identity == other.identity
            && self.network == other.network
            && self.charities == other.charities
            && self.organisations == other.organisations
            && self.transactions == other.transactions
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::disconnected()
    }
}

// Collections are dense from 1, so index id-1 first and fall back to a scan.
fn lookup<T>(items: &[T], id: EntityId, key: impl Fn(&T) -> EntityId) -> Option<&T> {
    let idx = usize::try_from(id).ok()?.checked_sub(1)?;
    match items.get(idx) {
        Some(item) if key(item) == id => Some(item),
        _ => items.iter().find(|item| key(item) == id),
    }
}

/// Assembles a snapshot from fully read collections.
///
/// The version is stamped by the engine at publish time.
#[derive(Debug)]
pub struct SnapshotBuilder {
    block_height: u64,
    identity: Identity,
    network: NetworkId,
    charities: Vec<Charity>,
    organisations: Vec<Organisation>,
    transactions: Vec<Transaction>,
}

impl SnapshotBuilder {
    /// Start a snapshot pinned to `block_height`.
    pub fn new(identity: Identity, network: NetworkId, block_height: u64) -> Self {
        Self {
            block_height,
            identity,
            network,
            charities: Vec::new(),
            organisations: Vec::new(),
            transactions: Vec::new(),
        }
    }

    /// Charities in id order.
    pub fn charities(mut self, charities: Vec<Charity>) -> Self {
        self.charities = charities;
        self
    }

    /// Organisations in id order.
    pub fn organisations(mut self, organisations: Vec<Organisation>) -> Self {
        self.organisations = organisations;
        self
    }

    /// Transactions in id order.
    pub fn transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    /// Finish with the given version and latest-charities length.
    pub fn build(self, version: SnapshotVersion, latest_len: usize) -> Snapshot {
        let latest_charities = self
            .charities
            .iter()
            .rev()
            .take(latest_len)
            .cloned()
            .collect();

        Snapshot {
            version,
            block_height: self.block_height,
            identity: Some(self.identity),
            network: Some(self.network),
            charities: self.charities,
            organisations: self.organisations,
            transactions: self.transactions,
            latest_charities,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Amount;

    fn charity(id: EntityId) -> Charity {
        Charity {
            id,
            name: format!("Charity {id}"),
            description: String::new(),
            bank_account: format!("ACC{id}"),
            bank_name: "Bank".into(),
            balance: Amount::zero(),
        }
    }

    fn build(version: SnapshotVersion, count: u64) -> Snapshot {
        SnapshotBuilder::new(Identity::new("0xabc"), NetworkId(1337), 10)
            .charities((1..=count).map(charity).collect())
            .build(version, 3)
    }

    #[test]
    fn test_disconnected_placeholder() {
        let snap = Snapshot::disconnected();
        assert_eq!(snap.version, 0);
        assert!(!snap.is_connected());
        assert!(snap.charities.is_empty());
    }

    #[test]
    fn test_latest_charities_most_recent_first() {
        let snap = build(1, 5);
        let ids: Vec<_> = snap.latest_charities().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn test_latest_charities_shorter_than_limit() {
        let snap = build(1, 2);
        assert_eq!(snap.latest_charities().len(), 2);
    }

    #[test]
    fn test_lookup_by_id() {
        let snap = build(1, 4);
        assert_eq!(snap.charity(3).map(|c| c.id), Some(3));
        assert!(snap.charity(0).is_none());
        assert!(snap.charity(9).is_none());
    }

    #[test]
    fn test_same_contents_ignores_version() {
        let a = build(1, 2);
        let b = build(2, 2);
        assert!(a.same_contents(&b));
        assert_ne!(a, b);
        assert!(!a.same_contents(&build(3, 3)));
    }
}
