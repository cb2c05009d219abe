//! # Mirror Store
//!
//! In-memory collections behind the mirror service. Records carrying a
//! `ledgerId` replace the stored record with the same id; records without
//! one are appended.

use charity_sync::domain::{CharityRecord, EntityId, OrganisationRecord, TransactionRecord};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

/// A stored record plus its document id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Stored<T> {
    /// Document id assigned on first insert.
    pub id: Uuid,
    /// Latest body saved under this id.
    #[serde(flatten)]
    pub record: T,
}

/// How a save landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// New document.
    Inserted(Uuid),
    /// Existing document with the same `ledgerId` overwritten.
    Replaced(Uuid),
}

impl SaveOutcome {
    /// Document id either way.
    pub fn id(&self) -> Uuid {
        match self {
            SaveOutcome::Inserted(id) | SaveOutcome::Replaced(id) => *id,
        }
    }
}

/// Record types keyed by ledger id.
pub trait LedgerKeyed {
    /// Natural key, if the record carries one.
    fn ledger_id(&self) -> Option<EntityId>;
}

impl LedgerKeyed for CharityRecord {
    fn ledger_id(&self) -> Option<EntityId> {
        self.ledger_id
    }
}

impl LedgerKeyed for OrganisationRecord {
    fn ledger_id(&self) -> Option<EntityId> {
        self.ledger_id
    }
}

impl LedgerKeyed for TransactionRecord {
    fn ledger_id(&self) -> Option<EntityId> {
        self.ledger_id
    }
}

/// One collection.
#[derive(Debug)]
pub struct Collection<T> {
    items: RwLock<Vec<Stored<T>>>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
        }
    }
}

impl<T: LedgerKeyed + Clone> Collection<T> {
    /// Upsert by ledger id; records without one are appended.
    pub fn save(&self, record: T) -> SaveOutcome {
        let mut items = self.items.write();
        let slot = record.ledger_id().and_then(|key| {
            items
                .iter()
                .position(|stored| stored.record.ledger_id() == Some(key))
        });

        match slot {
            Some(idx) => {
                items[idx].record = record;
                SaveOutcome::Replaced(items[idx].id)
            }
            None => {
                let id = Uuid::new_v4();
                items.push(Stored { id, record });
                SaveOutcome::Inserted(id)
            }
        }
    }

    /// Copy of every stored document, in insertion order.
    pub fn all(&self) -> Vec<Stored<T>> {
        self.items.read().clone()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether nothing has been saved.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

/// All mirror collections.
#[derive(Debug, Default)]
pub struct MirrorDb {
    /// `saveCharity` bodies.
    pub charities: Collection<CharityRecord>,
    /// `saveOrganisation` bodies.
    pub organisations: Collection<OrganisationRecord>,
    /// `saveTransaction` bodies.
    pub transactions: Collection<TransactionRecord>,
}

impl MirrorDb {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charity(ledger_id: Option<EntityId>, name: &str) -> CharityRecord {
        CharityRecord {
            ledger_id,
            name: name.into(),
            description: "d".into(),
            bank_account: "ACC".into(),
            bank_name: "Bank".into(),
            charity_address: "0xabc".into(),
        }
    }

    #[test]
    fn test_save_replaces_same_ledger_id() {
        let db = MirrorDb::new();
        let first = db.charities.save(charity(Some(1), "A"));
        let second = db.charities.save(charity(Some(1), "A2"));

        assert!(matches!(first, SaveOutcome::Inserted(_)));
        assert_eq!(second, SaveOutcome::Replaced(first.id()));
        assert_eq!(db.charities.len(), 1);
        assert_eq!(db.charities.all()[0].record.name, "A2");
    }

    #[test]
    fn test_save_without_ledger_id_appends() {
        let db = MirrorDb::new();
        db.charities.save(charity(None, "A"));
        db.charities.save(charity(None, "A"));
        assert_eq!(db.charities.len(), 2);
    }

    #[test]
    fn test_stored_serializes_flat() {
        let db = MirrorDb::new();
        db.charities.save(charity(Some(3), "A"));
        let json = serde_json::to_value(&db.charities.all()[0]).unwrap();
        assert_eq!(json["ledgerId"], 3);
        assert_eq!(json["charityAddress"], "0xabc");
        assert!(json["id"].is_string());
    }
}
