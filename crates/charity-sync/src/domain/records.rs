//! # Off-chain Records
//!
//! JSON bodies exchanged with the mirror and fraud services. Field names
//! follow the services' camelCase wire format.

use super::entities::{Charity, EntityId, Identity, Organisation, Transaction};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /saveCharity`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharityRecord {
    /// Natural key. Absent on records written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_id: Option<EntityId>,
    /// Display name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Payout bank account.
    pub bank_account: String,
    /// Payout bank.
    pub bank_name: String,
    /// Identity that registered the charity.
    pub charity_address: String,
}

impl CharityRecord {
    /// Mirror body for a charity registered by `creator`.
    pub fn from_charity(charity: &Charity, creator: &Identity) -> Self {
        Self {
            ledger_id: Some(charity.id),
            name: charity.name.clone(),
            description: charity.description.clone(),
            bank_account: charity.bank_account.clone(),
            bank_name: charity.bank_name.clone(),
            charity_address: creator.to_string(),
        }
    }
}

/// Body of `POST /saveOrganisation`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationRecord {
    /// Natural key. Absent on records written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_id: Option<EntityId>,
    /// Display name.
    pub name: String,
    /// Payout bank account.
    pub bank_account: String,
    /// Payout bank.
    pub bank_name: String,
    /// Identity that registered the organisation.
    pub organisation_address: String,
}

impl OrganisationRecord {
    /// Mirror body for an organisation registered by `creator`.
    pub fn from_organisation(org: &Organisation, creator: &Identity) -> Self {
        Self {
            ledger_id: Some(org.id),
            name: org.name.clone(),
            bank_account: org.bank_account.clone(),
            bank_name: org.bank_name.clone(),
            organisation_address: creator.to_string(),
        }
    }
}

/// Body of `POST /saveTransaction`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Ledger transaction id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_id: Option<EntityId>,
    /// Donor identity.
    pub from: String,
    /// Target rendered as `charity#<id>` / `organisation#<id>`.
    pub to: String,
    /// Decimal amount in the smallest unit.
    pub amount: String,
    /// Ledger block time.
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    /// Mirror body for a recorded donation.
    pub fn from_transaction(tx: &Transaction) -> Self {
        let timestamp = i64::try_from(tx.timestamp)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_default();

        Self {
            ledger_id: Some(tx.id),
            from: tx.from.to_string(),
            to: tx.to.to_string(),
            amount: tx.amount.to_string(),
            timestamp,
        }
    }
}

/// Body of `POST /check`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningRequest {
    /// Donor identity.
    pub from: String,
    /// Target rendered as `charity#<id>` / `organisation#<id>`.
    pub to: String,
    /// Decimal amount in the smallest unit.
    pub amount: String,
}

impl From<&Transaction> for ScreeningRequest {
    fn from(tx: &Transaction) -> Self {
        Self {
            from: tx.from.to_string(),
            to: tx.to.to_string(),
            amount: tx.amount.to_string(),
        }
    }
}
