//! # Domain Value Objects
//!
//! Write intents and the results handed back to callers.

use super::entities::{Amount, Beneficiary, EntityId};
use super::snapshot::{Snapshot, SnapshotVersion};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A caller-specified request to change ledger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteIntent {
    /// `createCharity(name, description, bankAccount, bankName)`
    CreateCharity {
        /// Display name
        name: String,
        /// Free-text description
        description: String,
        /// Payout bank account
        bank_account: String,
        /// Payout bank
        bank_name: String,
    },
    /// `createOrganisation(name, bankAccount, bankName)`
    CreateOrganisation {
        /// Display name
        name: String,
        /// Payout bank account
        bank_account: String,
        /// Payout bank
        bank_name: String,
    },
    /// `donateToCharity(id)` with `amount` attached as call value
    DonateToCharity {
        /// Receiving charity
        charity_id: EntityId,
        /// Call value, in the smallest unit
        amount: Amount,
    },
    /// `donateToOrganisation(id)` with `amount` attached as call value
    DonateToOrganisation {
        /// Receiving organisation
        organisation_id: EntityId,
        /// Call value, in the smallest unit
        amount: Amount,
    },
}

impl WriteIntent {
    /// Contract method this intent maps to.
    pub fn method(&self) -> &'static str {
        match self {
            WriteIntent::CreateCharity { .. } => "createCharity",
            WriteIntent::CreateOrganisation { .. } => "createOrganisation",
            WriteIntent::DonateToCharity { .. } => "donateToCharity",
            WriteIntent::DonateToOrganisation { .. } => "donateToOrganisation",
        }
    }

    /// Donation target and value, for donation intents.
    pub fn donation(&self) -> Option<(Beneficiary, Amount)> {
        match self {
            WriteIntent::DonateToCharity { charity_id, amount } => {
                Some((Beneficiary::charity(*charity_id), *amount))
            }
            WriteIntent::DonateToOrganisation {
                organisation_id,
                amount,
            } => Some((Beneficiary::organisation(*organisation_id), *amount)),
            _ => None,
        }
    }

    /// Value to attach to the ledger call (zero for creations).
    pub fn value(&self) -> Amount {
        self.donation()
            .map(|(_, amount)| amount)
            .unwrap_or_else(Amount::zero)
    }
}

/// What the ledger reports once a write is included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Ledger transaction id (hash on EVM ledgers).
    pub tx_id: String,
    /// Block the write was included in.
    pub block_height: u64,
}

/// Advisory fraud classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudVerdict {
    /// Whether the screen flagged the donation.
    pub is_fraud: bool,
}

/// Outcome of a successful `submit_write`.
#[derive(Clone, Debug)]
pub struct WriteResult {
    /// Ledger transaction id.
    pub tx_id: String,
    /// Created entity id, or the recorded donation Transaction id.
    /// `None` when the snapshot shows nothing that matches the write.
    pub entity: Option<EntityId>,
    /// Version of the snapshot that first includes this write.
    pub version: SnapshotVersion,
    /// That snapshot.
    pub snapshot: Arc<Snapshot>,
    /// Set when mirroring failed; the write itself still succeeded.
    pub mirror_warning: Option<String>,
    /// Set when the fraud screen failed.
    pub screen_warning: Option<String>,
    /// Fraud screen answer, donations only.
    pub fraud_verdict: Option<FraudVerdict>,
}

impl WriteResult {
    /// Whether any best-effort side call failed.
    pub fn has_warnings(&self) -> bool {
        self.mirror_warning.is_some() || self.screen_warning.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_donation_value() {
        let intent = WriteIntent::DonateToOrganisation {
            organisation_id: 2,
            amount: Amount::from(9u64),
        };
        assert_eq!(intent.value(), Amount::from(9u64));
        assert_eq!(intent.donation(), Some((Beneficiary::organisation(2), Amount::from(9u64))));
        assert_eq!(intent.method(), "donateToOrganisation");
    }

    #[test]
    fn test_creation_has_zero_value() {
        let intent = WriteIntent::CreateOrganisation {
            name: "Org".into(),
            bank_account: "ACC".into(),
            bank_name: "Bank".into(),
        };
        assert!(intent.value().is_zero());
        assert!(intent.donation().is_none());
    }

    #[test]
    fn test_fraud_verdict_wire_name() {
        let json = serde_json::to_string(&FraudVerdict { is_fraud: true }).unwrap();
        assert_eq!(json, r#"{"isFraud":true}"#);
    }
}
