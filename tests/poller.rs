// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::sync::Arc;

use forkwatch::{
    chain::ancestry,
    model::{Network, PeerId},
    poller::Poller,
    rpc::responses::{ChainTipStatus, FullBlock},
    store::{MemoryStore, Store},
};

use self::common::*;

fn setup(version: u32) -> (Arc<MemoryStore>, Arc<MockNode>, Poller) {
    let store = Arc::new(MemoryStore::new());
    let node = MockNode::new(version);
    let connector = MockConnector::new();
    connector.register(1, node.clone());
    let poller = Poller::new(store.clone(), connector, Network::Btc, TEST_CHAIN);
    (store, node, poller)
}

#[tokio::test]
async fn poll_records_status() {
    let (store, node, mut poller) = setup(MODERN_VERSION);
    node.extend(&main_chain(10));
    let mut peer = peer(1, Network::Btc);

    let info = poller.poll(&mut peer, at(0)).await.unwrap().unwrap();
    assert_eq!(info.bestblockhash, hash(0, 10));
    assert_eq!(peer.version, Some(MODERN_VERSION));
    assert_eq!(peer.peer_count, Some(8));
    assert_eq!(peer.best_block, Some(hash(0, 10)));
    assert!(peer.is_synced());
    assert_eq!(store.peer(PeerId(1)).await.unwrap(), Some(peer));
}

#[tokio::test]
async fn unreachable_since_is_kept() {
    let (store, node, mut poller) = setup(MODERN_VERSION);
    node.extend(&main_chain(10));
    let mut peer = peer(1, Network::Btc);
    poller.poll(&mut peer, at(0)).await.unwrap();

    node.with(|state| state.unreachable = true);
    assert!(poller.poll(&mut peer, at(5)).await.unwrap().is_none());
    assert!(poller.poll(&mut peer, at(10)).await.unwrap().is_none());
    assert_eq!(peer.unreachable_since, Some(at(5)));
    let stored = store.peer(PeerId(1)).await.unwrap().unwrap();
    assert_eq!(stored.unreachable_since, Some(at(5)));
    assert!(!stored.is_synced());

    node.with(|state| state.unreachable = false);
    assert!(poller.poll(&mut peer, at(15)).await.unwrap().is_some());
    assert_eq!(peer.unreachable_since, None);
    assert_eq!(store.peer(PeerId(1)).await.unwrap().unwrap().unreachable_since, None);
}

#[tokio::test]
async fn initial_sync_clears_best_block() {
    let (store, node, mut poller) = setup(MODERN_VERSION);
    node.extend(&main_chain(10));
    let mut peer = peer(1, Network::Btc);
    poller.poll(&mut peer, at(0)).await.unwrap();
    assert!(peer.best_block.is_some());

    node.with(|state| state.initial_sync = true);
    poller.poll(&mut peer, at(5)).await.unwrap();
    assert!(peer.initial_sync);
    assert_eq!(peer.best_block, None);
    assert!(!store.peer(PeerId(1)).await.unwrap().unwrap().is_synced());
}

#[tokio::test]
async fn common_block_is_resolved() {
    let (store, node, mut poller) = setup(MODERN_VERSION);
    node.extend(&main_chain(10));
    let mut peer = peer(1, Network::Btc);
    peer.common_height = Some(5);

    poller.poll(&mut peer, at(0)).await.unwrap();
    assert_eq!(peer.common_block, Some(hash(0, 5)));
    assert!(store.block(&hash(0, 5)).await.unwrap().is_some());

    // The common block lowers the floor, so the next tip is linked all the way down to it.
    let calls = node.header_calls();
    node.extend(&build_chain(0, 0, 11, 11));
    poller.poll(&mut peer, at(5)).await.unwrap();
    assert_eq!(node.header_calls(), calls + 5);
    assert_eq!(peer.common_block, Some(hash(0, 5)));
    assert_eq!(ancestry(store.as_ref(), &hash(0, 11), 100).await.unwrap().len(), 7);
}

#[tokio::test]
async fn client_follows_version_changes() {
    let (_store, node, mut poller) = setup(LEGACY_VERSION);
    node.extend(&main_chain(10));
    let mut peer = peer(1, Network::Btc);

    poller.poll(&mut peer, at(0)).await.unwrap();
    assert_eq!(node.header_calls(), 0);
    assert_eq!(node.block_calls(), 1);

    node.with(|state| state.version = MODERN_VERSION);
    node.extend(&build_chain(0, 0, 11, 11));
    poller.poll(&mut peer, at(5)).await.unwrap();
    assert_eq!(peer.version, Some(MODERN_VERSION));
    assert_eq!(node.header_calls(), 1);
    assert_eq!(node.block_calls(), 1);
}

#[tokio::test]
async fn fork_tips_within_horizon_are_resolved() {
    let (store, node, mut poller) = setup(MODERN_VERSION);
    node.extend(&main_chain(30));
    node.load(&build_chain(1, 0, 27, 28));
    node.load(&build_chain(2, 0, 5, 6));
    node.add_tip(hash(1, 28), 28, ChainTipStatus::ValidFork);
    node.add_tip(hash(2, 6), 6, ChainTipStatus::ValidFork);
    let mut peer = peer(1, Network::Btc);
    poller.poll(&mut peer, at(0)).await.unwrap();

    let tips = poller.chain_tips(&peer).await.unwrap();
    assert_eq!(tips.len(), 3);
    assert_eq!(poller.resolve_fork_tips(&peer, &tips, 10).await.unwrap(), 1);
    assert!(store.block(&hash(1, 28)).await.unwrap().is_some());
    assert!(store.block(&hash(2, 6)).await.unwrap().is_none());
}

#[tokio::test]
async fn pruned_bodies_are_absent() {
    let (_store, node, mut poller) = setup(MODERN_VERSION);
    node.extend(&main_chain(10));
    node.with(|state| {
        state.bodies.insert(
            hash(0, 9),
            FullBlock {
                hash: hash(0, 9),
                height: 9,
                tx: Vec::new(),
            },
        );
        state.pruned.insert(hash(0, 8));
    });
    let mut peer = peer(1, Network::Btc);
    poller.poll(&mut peer, at(0)).await.unwrap();

    let body = poller.full_block(&peer, &hash(0, 9)).await.unwrap().unwrap();
    assert_eq!(body.height, 9);
    assert!(poller.full_block(&peer, &hash(0, 8)).await.unwrap().is_none());
    assert!(poller.full_block(&peer, &hash(0, 7)).await.unwrap().is_none());
}
