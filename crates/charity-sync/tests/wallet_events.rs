//! Wallet event handling: listener task, poller and ordering.

mod common;

use std::sync::Arc;
use std::time::Duration;

use charity_sync::{
    spawn_wallet_listener, spawn_wallet_poller, Identity, LedgerClient, NetworkId, Snapshot,
    SyncApi, SyncError, WalletEvent, WalletFeed,
};
use common::*;

async fn wait_for_snapshot(engine: &Engine, done: impl Fn(&Snapshot) -> bool) -> Arc<Snapshot> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = engine.get_snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("snapshot condition not reached")
}

#[tokio::test]
async fn test_listener_applies_identity_changes() {
    let h = harness();
    h.engine.initialize(Identity::new(ALICE), NETWORK).await.unwrap();
    h.engine.submit_write(create_charity("Red Cross")).await.unwrap();
    let task = spawn_wallet_listener(Arc::clone(&h.engine), h.ledger.wallet_events());

    h.ledger.set_identity(None);
    let disconnected = wait_for_snapshot(&h.engine, |s| !s.is_connected()).await;
    assert!(disconnected.charities.is_empty());
    assert_eq!(h.engine.identity(), None);

    h.ledger.set_identity(Some(Identity::new(BOB)));
    let reconnected = wait_for_snapshot(&h.engine, |s| s.is_connected()).await;
    assert_eq!(reconnected.identity, Some(Identity::new(BOB)));
    assert_eq!(reconnected.charities.len(), 1);

    task.abort();
}

#[tokio::test]
async fn test_listener_follows_network_switch() {
    let h = harness();
    h.engine.initialize(Identity::new(ALICE), NETWORK).await.unwrap();
    h.engine.submit_write(create_charity("Red Cross")).await.unwrap();
    let task = spawn_wallet_listener(Arc::clone(&h.engine), h.ledger.wallet_events());

    h.ledger.switch_network(NetworkId(5));
    let switched = wait_for_snapshot(&h.engine, |s| s.network == Some(NetworkId(5))).await;
    assert!(switched.charities.is_empty());
    assert_eq!(h.engine.network(), Some(NetworkId(5)));

    task.abort();
}

#[tokio::test]
async fn test_events_apply_in_arrival_order() {
    let h = harness();
    h.engine.initialize(Identity::new(ALICE), NETWORK).await.unwrap();

    let first = h.engine.apply_wallet_event(WalletEvent::NetworkChanged(NetworkId(5)));
    h.ledger.switch_network(NetworkId(5));
    let second = h
        .engine
        .apply_wallet_event(WalletEvent::IdentityChanged(Some(Identity::new(BOB))));

    // The first resync may be superseded; the second always lands.
    match first.await.unwrap() {
        Ok(_) | Err(SyncError::Cancelled(_)) => {}
        Err(other) => panic!("unexpected resync failure: {other}"),
    }
    let last = second.await.unwrap().unwrap();

    assert_eq!(last.network, Some(NetworkId(5)));
    assert_eq!(last.identity, Some(Identity::new(BOB)));
    assert!(Arc::ptr_eq(&last, &h.engine.get_snapshot()));
}

#[tokio::test]
async fn test_blank_identity_event_disconnects() {
    let h = harness();
    h.engine.initialize(Identity::new(ALICE), NETWORK).await.unwrap();

    let snapshot = h
        .engine
        .apply_wallet_event(WalletEvent::IdentityChanged(Some(Identity::new(" "))))
        .await
        .unwrap()
        .unwrap();

    assert!(!snapshot.is_connected());
    assert_eq!(h.engine.identity(), None);
}

#[tokio::test]
async fn test_poller_drives_engine() {
    let h = harness();
    h.engine.initialize(Identity::new(ALICE), NETWORK).await.unwrap();

    let feed = WalletFeed::new();
    let listener = spawn_wallet_listener(Arc::clone(&h.engine), feed.subscribe());
    let poller = spawn_wallet_poller(Arc::clone(&h.ledger), feed, Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(40)).await;

    h.ledger.set_identity(Some(Identity::new(BOB)));
    let snapshot =
        wait_for_snapshot(&h.engine, |s| s.identity == Some(Identity::new(BOB))).await;
    assert!(snapshot.is_connected());

    poller.abort();
    listener.abort();
}
