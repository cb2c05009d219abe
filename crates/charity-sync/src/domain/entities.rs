//! # Domain Entities
//!
//! Ledger-visible records: charities, organisations and donation transactions,
//! plus the caller identity and network they are observed under.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger-assigned identifier. Dense from 1 within each collection.
pub type EntityId = u64;

/// Amount in the smallest currency unit (wei on EVM ledgers).
pub type Amount = U256;

/// Caller identity as reported by the wallet (address-like string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an address-like string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Raw address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An identity with no characters is treated as "no wallet account".
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Hex addresses compare case-insensitively (checksum casing is cosmetic).
    pub fn matches(&self, other: &Identity) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Network (chain) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collections the ledger enumerates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// `charityCount` / `charities(id)`
    Charity,
    /// `orgCount` / `organisations(id)`
    Organisation,
    /// `transactionCount` / `transactions(id)`
    Transaction,
}

impl EntityKind {
    /// All kinds, in resync order.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Charity,
        EntityKind::Organisation,
        EntityKind::Transaction,
    ];

    /// Contract accessor returning the collection size.
    pub fn count_method(&self) -> &'static str {
        match self {
            EntityKind::Charity => "charityCount",
            EntityKind::Organisation => "orgCount",
            EntityKind::Transaction => "transactionCount",
        }
    }

    /// Contract accessor returning one entity by id.
    pub fn entity_method(&self) -> &'static str {
        match self {
            EntityKind::Charity => "charities",
            EntityKind::Organisation => "organisations",
            EntityKind::Transaction => "transactions",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Charity => f.write_str("charity"),
            EntityKind::Organisation => f.write_str("organisation"),
            EntityKind::Transaction => f.write_str("transaction"),
        }
    }
}

/// Kind of entity a donation can be sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeneficiaryKind {
    /// A registered charity.
    Charity,
    /// A registered organisation.
    Organisation,
}

impl From<BeneficiaryKind> for EntityKind {
    fn from(kind: BeneficiaryKind) -> Self {
        match kind {
            BeneficiaryKind::Charity => EntityKind::Charity,
            BeneficiaryKind::Organisation => EntityKind::Organisation,
        }
    }
}

/// Target of a donation: entity id plus its kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Beneficiary {
    /// Which collection the id belongs to.
    pub kind: BeneficiaryKind,
    /// Ledger id within that collection.
    pub id: EntityId,
}

impl Beneficiary {
    /// Donation target in the charity collection.
    pub fn charity(id: EntityId) -> Self {
        Self {
            kind: BeneficiaryKind::Charity,
            id,
        }
    }

    /// Donation target in the organisation collection.
    pub fn organisation(id: EntityId) -> Self {
        Self {
            kind: BeneficiaryKind::Organisation,
            id,
        }
    }
}

/// Renders as `charity#3` / `organisation#1`; this is also the mirror's `to` field.
impl fmt::Display for Beneficiary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", EntityKind::from(self.kind), self.id)
    }
}

/// A registered charity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charity {
    /// Ledger-assigned id, dense from 1.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Payout bank account.
    pub bank_account: String,
    /// Payout bank.
    pub bank_name: String,
    /// Total donated, in the smallest unit.
    pub balance: Amount,
}

/// A registered organisation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organisation {
    /// Ledger-assigned id, dense from 1.
    pub id: EntityId,
    /// Display name.
    pub name: String,
    /// Payout bank account.
    pub bank_account: String,
    /// Payout bank.
    pub bank_name: String,
    /// Total donated, in the smallest unit.
    pub balance: Amount,
}

/// A donation recorded by the ledger. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Ledger-assigned id; gives the total order.
    pub id: EntityId,
    /// Donor identity.
    pub from: Identity,
    /// Receiving charity or organisation.
    pub to: Beneficiary,
    /// Donated amount, in the smallest unit.
    pub amount: Amount,
    /// Ledger block time, unix seconds.
    pub timestamp: u64,
}

/// One record as returned by `LedgerClient::get_entity`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerRecord {
    /// A charity row.
    Charity(Charity),
    /// An organisation row.
    Organisation(Organisation),
    /// A transaction row.
    Transaction(Transaction),
}

impl LedgerRecord {
    /// Kind of the wrapped record.
    pub fn kind(&self) -> EntityKind {
        match self {
            LedgerRecord::Charity(_) => EntityKind::Charity,
            LedgerRecord::Organisation(_) => EntityKind::Organisation,
            LedgerRecord::Transaction(_) => EntityKind::Transaction,
        }
    }

    /// Ledger id of the wrapped record.
    pub fn id(&self) -> EntityId {
        match self {
            LedgerRecord::Charity(c) => c.id,
            LedgerRecord::Organisation(o) => o.id,
            LedgerRecord::Transaction(t) => t.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beneficiary_display() {
        assert_eq!(Beneficiary::charity(3).to_string(), "charity#3");
        assert_eq!(Beneficiary::organisation(1).to_string(), "organisation#1");
    }

    #[test]
    fn test_identity_matches_ignores_case() {
        let a = Identity::new("0xAbC");
        assert!(a.matches(&Identity::new("0xabc")));
        assert!(!a.matches(&Identity::new("0xabd")));
    }

    #[test]
    fn test_blank_identity_is_empty() {
        assert!(Identity::new("  ").is_empty());
        assert!(!Identity::new("0x1").is_empty());
    }

    #[test]
    fn test_record_kind_and_id() {
        let record = LedgerRecord::Organisation(Organisation {
            id: 7,
            name: "Org".into(),
            bank_account: "ACC".into(),
            bank_name: "Bank".into(),
            balance: Amount::zero(),
        });
        assert_eq!(record.kind(), EntityKind::Organisation);
        assert_eq!(record.id(), 7);
    }
}
