//! Property tests: published versions strictly increase and the current
//! snapshot is always the last one delivered, whatever the operation mix,
//! including network switches that cancel queued and in-flight work.

mod common;

use std::sync::Arc;

use charity_sync::{Identity, NetworkId, SyncApi};
use common::*;
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Create(u8),
    Donate { charity: u64, amount: u64 },
    Resync,
    Disconnect,
    SwitchNetwork(NetworkId),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u8>().prop_map(Op::Create),
        (0u64..4, 0u64..50).prop_map(|(charity, amount)| Op::Donate { charity, amount }),
        Just(Op::Resync),
        Just(Op::Disconnect),
        any::<bool>().prop_map(|alt| Op::SwitchNetwork(if alt { NetworkId(5) } else { NETWORK })),
    ]
}

fn run(ops: Vec<Op>) -> (Vec<u64>, u64) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let h = harness();
        let (seen, listener) = version_recorder();
        let _subscription = h.engine.subscribe(listener);
        h.engine.initialize(Identity::new(ALICE), NETWORK).await.unwrap();

        let tasks: Vec<_> = ops
            .into_iter()
            .map(|op| {
                let engine = Arc::clone(&h.engine);
                let ledger = Arc::clone(&h.ledger);
                tokio::spawn(async move {
                    let _ = match op {
                        Op::Create(n) => engine
                            .submit_write(create_charity(&format!("C{n}")))
                            .await
                            .map(|r| r.snapshot),
                        Op::Donate { charity, amount } => engine
                            .submit_write(donate_charity(charity, amount))
                            .await
                            .map(|r| r.snapshot),
                        Op::Resync => {
                            engine.on_identity_changed(Some(Identity::new(ALICE))).await
                        }
                        Op::Disconnect => engine.on_identity_changed(None).await,
                        Op::SwitchNetwork(network) => {
                            ledger.switch_network(network);
                            engine.on_network_changed(network).await
                        }
                    };
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let versions = seen.lock().clone();
        (versions, h.engine.get_snapshot().version)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_versions_strictly_increase(ops in prop::collection::vec(op(), 1..12)) {
        let (versions, current) = run(ops);

        prop_assert!(!versions.is_empty());
        prop_assert!(versions.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(versions.last().copied(), Some(current));
    }
}
