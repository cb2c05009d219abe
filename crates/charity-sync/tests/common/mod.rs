//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use charity_sync::{
    Amount, Identity, InMemoryLedger, InMemoryMirror, NetworkId, Snapshot, SnapshotListener,
    StaticFraudScreen, SyncConfig, SyncEngine, WriteIntent,
};
use parking_lot::Mutex;

pub type Engine = SyncEngine<InMemoryLedger, InMemoryMirror, StaticFraudScreen>;

pub const NETWORK: NetworkId = NetworkId(1337);
pub const ALICE: &str = "0xABC";
pub const BOB: &str = "0xDEF";

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub mirror: Arc<InMemoryMirror>,
    pub screen: Arc<StaticFraudScreen>,
    pub engine: Arc<Engine>,
}

pub fn harness() -> Harness {
    harness_with(StaticFraudScreen::new())
}

pub fn harness_with(screen: StaticFraudScreen) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new(NETWORK, Some(Identity::new(ALICE))));
    let mirror = Arc::new(InMemoryMirror::new());
    let screen = Arc::new(screen);
    let engine = Arc::new(SyncEngine::new(
        SyncConfig::for_testing(),
        Arc::clone(&ledger),
        Arc::clone(&mirror),
        Arc::clone(&screen),
    ));

    Harness {
        ledger,
        mirror,
        screen,
        engine,
    }
}

pub fn create_charity(name: &str) -> WriteIntent {
    WriteIntent::CreateCharity {
        name: name.to_string(),
        description: format!("{name} description"),
        bank_account: "ACC1".to_string(),
        bank_name: "BankA".to_string(),
    }
}

pub fn create_organisation(name: &str) -> WriteIntent {
    WriteIntent::CreateOrganisation {
        name: name.to_string(),
        bank_account: "ACC2".to_string(),
        bank_name: "BankB".to_string(),
    }
}

pub fn donate_charity(charity_id: u64, amount: u64) -> WriteIntent {
    WriteIntent::DonateToCharity {
        charity_id,
        amount: Amount::from(amount),
    }
}

/// Listener that records every published version.
pub fn version_recorder() -> (Arc<Mutex<Vec<u64>>>, SnapshotListener) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: SnapshotListener =
        Arc::new(move |snapshot: &Arc<Snapshot>| sink.lock().push(snapshot.version));
    (seen, listener)
}
