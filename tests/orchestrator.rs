// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::{sync::Arc, time::Duration};

use forkwatch::{
    config::MonitorConfig,
    model::{Network, PeerId},
    notify::Event,
    orchestrator::Orchestrator,
    rpc::responses::{ChainTipStatus, FullBlock, TxOutSetInfo},
    shutdown::shutdown_handles,
    store::{MemoryStore, Store},
};
use serde_json::json;

use self::common::*;

fn config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.chain = TEST_CHAIN;
    config.lag.grace_period = Duration::ZERO;
    config
}

/// Two primary peers that disagree about a fork and one peer of another network.
fn fleet() -> (Arc<MockConnector>, Arc<MockNode>, Arc<MockNode>, Arc<MockNode>) {
    let connector = MockConnector::new();

    let leader = MockNode::new(MODERN_VERSION);
    leader.extend(&main_chain(30));
    leader.load(&build_chain(1, 0, 30, 30));
    leader.add_tip(hash(1, 30), 30, ChainTipStatus::Invalid);
    leader.with(|state| {
        state.softforks = Some(
            serde_json::from_value(json!({
                "taproot": { "type": "bip9", "active": false, "bip9": { "status": "started", "bit": 2, "since": 2016 } }
            }))
            .unwrap(),
        );
        state.utxo = Some(TxOutSetInfo {
            height: 30,
            bestblock: hash(0, 30),
            txouts: 100,
            total_amount: 1550.0,
        });
        state.bodies.insert(
            hash(0, 30),
            FullBlock {
                hash: hash(0, 30),
                height: 30,
                tx: vec![coinbase_tx(ANTPOOL_COINBASE)],
            },
        );
    });

    let follower = MockNode::new(200_000);
    follower.load(&main_chain(30));
    follower.activate(&hash(0, 28));
    follower.load(&build_chain(1, 0, 30, 30));
    follower.add_tip(hash(1, 30), 30, ChainTipStatus::ValidFork);

    let other = MockNode::new(MODERN_VERSION);
    other.extend(&build_chain(9, 9, 0, 10));

    connector.register(1, leader.clone());
    connector.register(2, follower.clone());
    connector.register(3, other.clone());
    (connector, leader, follower, other)
}

#[tokio::test]
async fn cycles_poll_and_detect() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let (connector, _leader, _follower, _other) = fleet();
    let mut orchestrator = Orchestrator::new(store.clone(), connector, notifier.clone(), config());
    orchestrator
        .register_peers([peer(1, Network::Btc), peer(2, Network::Btc), peer(3, Network::Bch)])
        .await
        .unwrap();
    let (_handle, signal) = shutdown_handles();

    orchestrator.cycle(&signal).await.unwrap();

    let events = notifier.events();
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], Event::Softfork { peer, .. } if peer.id == PeerId(1)));
    assert!(
        matches!(&events[1], Event::Lag { peer, reference, blocks_behind: 2, .. } if peer.id == PeerId(2) && reference.id == PeerId(1))
    );
    // Both peers saw a block at height 30.
    assert!(
        matches!(&events[2], Event::StaleCandidate { candidate, blocks } if candidate.height == 30 && blocks.len() == 2)
    );
    assert_eq!(
        store.block(&hash(0, 30)).await.unwrap().unwrap().pool.as_deref(),
        Some("Antpool")
    );
    // The follower's fork tip was resolved into the store.
    assert!(store.block(&hash(1, 30)).await.unwrap().is_some());
    assert!(store.utxo_snapshot(&hash(0, 30)).await.unwrap().is_some());
    assert!(store.block(&hash(0, 30)).await.unwrap().unwrap().checked_lightning);
    let other = store.peer(PeerId(3)).await.unwrap().unwrap();
    assert_eq!(other.best_block, Some(hash(9, 10)));
    assert_eq!(store.block(&hash(9, 10)).await.unwrap().unwrap().network, Network::Bch);

    // The leader now rejects a block the store knows about.
    orchestrator.cycle(&signal).await.unwrap();
    let events = notifier.events();
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[3], Event::InvalidTip { peer, block, .. } if peer.id == PeerId(1) && block.hash == hash(1, 30)));
    assert_eq!(store.invalid_tips().await.unwrap().len(), 1);
    assert_eq!(store.lags().await.unwrap().len(), 1);
    assert_eq!(store.stale_candidates(Network::Btc).await.unwrap().len(), 1);

    orchestrator.cycle(&signal).await.unwrap();
    assert_eq!(notifier.events().len(), 4);
}

#[tokio::test]
async fn unreachable_peer_does_not_stop_the_cycle() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let (connector, leader, _follower, other) = fleet();
    leader.with(|state| state.unreachable = true);
    let mut orchestrator = Orchestrator::new(store.clone(), connector, notifier.clone(), config());
    orchestrator
        .register_peers([peer(1, Network::Btc), peer(2, Network::Btc), peer(3, Network::Bch)])
        .await
        .unwrap();
    let (_handle, signal) = shutdown_handles();

    orchestrator.cycle(&signal).await.unwrap();

    let leader = store.peer(PeerId(1)).await.unwrap().unwrap();
    assert!(leader.unreachable_since.is_some());
    assert_eq!(store.peer(PeerId(2)).await.unwrap().unwrap().best_block, Some(hash(0, 28)));
    assert_eq!(store.peer(PeerId(3)).await.unwrap().unwrap().best_block, Some(hash(9, 10)));
    // Nobody to compare the follower with.
    assert!(store.lags().await.unwrap().is_empty());
    assert!(other.header_calls() > 0);
}

#[tokio::test]
async fn registration_keeps_observed_status() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let (connector, ..) = fleet();
    let mut orchestrator = Orchestrator::new(store.clone(), connector, notifier, config());
    let mut configured = peer(1, Network::Btc);
    configured.common_height = Some(10);
    orchestrator.register_peers([configured.clone()]).await.unwrap();
    let (_handle, signal) = shutdown_handles();
    orchestrator.cycle(&signal).await.unwrap();

    let polled = store.peer(PeerId(1)).await.unwrap().unwrap();
    assert_eq!(polled.common_block, Some(hash(0, 10)));

    configured.name = "renamed".into();
    configured.common_height = Some(20);
    orchestrator.register_peers([configured]).await.unwrap();
    let registered = store.peer(PeerId(1)).await.unwrap().unwrap();
    assert_eq!(registered.name, "renamed");
    assert_eq!(registered.best_block, polled.best_block);
    assert_eq!(registered.version, Some(MODERN_VERSION));
    assert_eq!(registered.common_block, None);
}

async fn lightning_checked(store: &MemoryStore, heights: std::ops::RangeInclusive<u64>) -> Vec<bool> {
    let mut checked = Vec::new();
    for height in heights {
        checked.push(store.block(&hash(0, height)).await.unwrap().unwrap().checked_lightning);
    }
    checked
}

#[tokio::test]
async fn failed_body_fetch_is_scanned_on_a_later_cycle() {
    let store = Arc::new(MemoryStore::new());
    let connector = MockConnector::new();
    let node = MockNode::new(MODERN_VERSION);
    node.extend(&main_chain(5));
    node.with(|state| state.failing_blocks.insert(hash(0, 3)));
    connector.register(1, node.clone());
    let mut orchestrator = Orchestrator::new(store.clone(), connector, RecordingNotifier::new(), config());
    orchestrator.register_peers([peer(1, Network::Btc)]).await.unwrap();
    let (_handle, signal) = shutdown_handles();

    orchestrator.cycle(&signal).await.unwrap();
    assert_eq!(
        lightning_checked(&store, 0..=5).await,
        vec![true, true, true, false, false, false]
    );

    node.with(|state| state.failing_blocks.clear());
    node.extend(&main_chain(6));
    orchestrator.cycle(&signal).await.unwrap();
    assert_eq!(lightning_checked(&store, 0..=6).await, vec![true; 7]);
}

#[tokio::test]
async fn utxo_summary_of_a_newer_block_is_resolved() {
    let store = Arc::new(MemoryStore::new());
    let connector = MockConnector::new();
    let node = MockNode::new(MODERN_VERSION);
    node.extend(&main_chain(30));
    // Block 31 arrives while the summary is computed.
    node.load(&main_chain(31));
    node.with(|state| {
        state.utxo = Some(TxOutSetInfo {
            height: 31,
            bestblock: hash(0, 31),
            txouts: 100,
            total_amount: 1600.0,
        })
    });
    connector.register(1, node);
    let mut orchestrator = Orchestrator::new(store.clone(), connector, RecordingNotifier::new(), config());
    orchestrator.register_peers([peer(1, Network::Btc)]).await.unwrap();
    let (_handle, signal) = shutdown_handles();

    orchestrator.cycle(&signal).await.unwrap();

    assert_eq!(store.peer(PeerId(1)).await.unwrap().unwrap().best_block, Some(hash(0, 30)));
    let block = store.block(&hash(0, 31)).await.unwrap().unwrap();
    assert_eq!(block.parent, Some(hash(0, 30)));
    let snapshot = store.utxo_snapshot(&hash(0, 31)).await.unwrap().unwrap();
    assert_eq!(snapshot.height, 31);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let notifier = RecordingNotifier::new();
    let mut orchestrator = Orchestrator::new(store, MockConnector::new(), notifier, config());
    let (handle, signal) = shutdown_handles();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown();
    });
    tokio::time::timeout(Duration::from_secs(5), orchestrator.run(signal))
        .await
        .unwrap();
    stopper.await.unwrap();
}
