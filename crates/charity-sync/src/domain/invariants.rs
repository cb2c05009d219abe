//! # Domain Invariants
//!
//! Rules checked before writes are submitted and while snapshots are assembled.

use super::entities::{EntityId, EntityKind};
use super::errors::SyncError;
use super::snapshot::SnapshotVersion;
use super::value_objects::WriteIntent;

/// Default length of the most-recent-first charity slice.
pub const DEFAULT_LATEST_CHARITIES: usize = 3;

/// Gas attached to every write.
pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

/// Validate a write intent before any network call.
///
/// Text fields must be non-blank, ids and amounts strictly positive.
pub fn validate_intent(intent: &WriteIntent) -> Result<(), SyncError> {
    match intent {
        WriteIntent::CreateCharity {
            name,
            description,
            bank_account,
            bank_name,
        } => {
            require_text("name", name)?;
            require_text("description", description)?;
            require_text("bankAccount", bank_account)?;
            require_text("bankName", bank_name)
        }
        WriteIntent::CreateOrganisation {
            name,
            bank_account,
            bank_name,
        } => {
            require_text("name", name)?;
            require_text("bankAccount", bank_account)?;
            require_text("bankName", bank_name)
        }
        WriteIntent::DonateToCharity { charity_id, amount } => {
            require_id("charityId", *charity_id)?;
            require_positive(amount.is_zero())
        }
        WriteIntent::DonateToOrganisation {
            organisation_id,
            amount,
        } => {
            require_id("organisationId", *organisation_id)?;
            require_positive(amount.is_zero())
        }
    }
}

fn require_text(field: &str, value: &str) -> Result<(), SyncError> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn require_id(field: &str, id: EntityId) -> Result<(), SyncError> {
    if id == 0 {
        return Err(SyncError::validation(format!("{field} must be positive")));
    }
    Ok(())
}

fn require_positive(is_zero: bool) -> Result<(), SyncError> {
    if is_zero {
        return Err(SyncError::validation("amount must be positive"));
    }
    Ok(())
}

/// Invariant: a record read at index `index` must carry id `index`.
///
/// Ledger ids are dense from 1; a mismatch means the ledger answered for a
/// different entity and the snapshot would be inconsistent.
pub fn invariant_dense_id(kind: EntityKind, index: u64, id: EntityId) -> Result<(), SyncError> {
    if index != id {
        return Err(SyncError::PartialRead {
            kind,
            index,
            reason: format!("ledger returned id {id}"),
        });
    }
    Ok(())
}

/// Invariant: published versions strictly increase.
pub fn invariant_monotonic(previous: SnapshotVersion, next: SnapshotVersion) -> bool {
    next > previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Amount;

    fn charity_intent(name: &str) -> WriteIntent {
        WriteIntent::CreateCharity {
            name: name.into(),
            description: "desc".into(),
            bank_account: "ACC1".into(),
            bank_name: "BankA".into(),
        }
    }

    #[test]
    fn test_valid_charity_intent() {
        assert!(validate_intent(&charity_intent("Red Cross")).is_ok());
    }

    #[test]
    fn test_blank_name_rejected() {
        let err = validate_intent(&charity_intent("   ")).unwrap_err();
        assert_eq!(err, SyncError::validation("name is required"));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let intent = WriteIntent::DonateToCharity {
            charity_id: 1,
            amount: Amount::zero(),
        };
        assert!(matches!(validate_intent(&intent), Err(SyncError::Validation(_))));
    }

    #[test]
    fn test_zero_id_rejected() {
        let intent = WriteIntent::DonateToOrganisation {
            organisation_id: 0,
            amount: Amount::from(1u64),
        };
        let err = validate_intent(&intent).unwrap_err();
        assert!(err.to_string().contains("organisationId"));
    }

    #[test]
    fn test_dense_id() {
        assert!(invariant_dense_id(EntityKind::Charity, 2, 2).is_ok());
        assert!(invariant_dense_id(EntityKind::Charity, 2, 3).is_err());
    }

    #[test]
    fn test_monotonic() {
        assert!(invariant_monotonic(1, 2));
        assert!(!invariant_monotonic(2, 2));
    }
}
