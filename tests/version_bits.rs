// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

mod common;

use forkwatch::{
    detect::{DetectError, VersionBitsConfig, VersionBitsDetector},
    model::Network,
    notify::Event,
    rpc::responses::BlockHeaderInfo,
    store::{MemoryStore, Store},
};

use self::common::*;

const BIT: u8 = 5;

fn signaling(mut headers: Vec<BlockHeaderInfo>, from_height: u64) -> Vec<BlockHeaderInfo> {
    for header in headers.iter_mut().filter(|h| h.height >= from_height) {
        header.version = Some(BASE_VERSION | 1 << BIT);
    }
    headers
}

#[tokio::test]
async fn alert_opens_and_closes() {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let detector = VersionBitsDetector::new(VersionBitsConfig::default());

    // 60 of the last 100 blocks signal.
    store_chain(&store, Network::Btc, &signaling(main_chain(99), 40)).await;
    let tip = store.block(&hash(0, 99)).await.unwrap().unwrap();
    let notified = detector.check(&store, notifier.as_ref(), &tip, at(0)).await.unwrap();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].bit, BIT);
    assert_eq!(notified[0].tally, 60);
    assert_eq!(notified[0].activation, hash(0, 99));

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Event::VersionBit { alert, block } if alert.bit == BIT && block.height == 99));

    // Still signaled, no second notification.
    store_chain(&store, Network::Btc, &signaling(build_chain(0, 0, 100, 100), 0)).await;
    let tip = store.block(&hash(0, 100)).await.unwrap().unwrap();
    assert!(detector.check(&store, notifier.as_ref(), &tip, at(10)).await.unwrap().is_empty());
    assert_eq!(notifier.events().len(), 1);

    // A full window without the bit closes the alert.
    store_chain(&store, Network::Btc, &build_chain(0, 0, 101, 200)).await;
    let tip = store.block(&hash(0, 200)).await.unwrap().unwrap();
    assert!(detector.check(&store, notifier.as_ref(), &tip, at(20)).await.unwrap().is_empty());

    assert!(store.open_version_bit_alert(Network::Btc, BIT).await.unwrap().is_none());
    let alerts = store.version_bit_alerts(Network::Btc).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].deactivation, Some(hash(0, 200)));
    assert_eq!(alerts[0].notified_at, Some(at(0)));
    assert_eq!(notifier.events().len(), 1);
}

#[tokio::test]
async fn below_threshold_is_quiet() {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let detector = VersionBitsDetector::new(VersionBitsConfig::default());

    store_chain(&store, Network::Btc, &signaling(main_chain(99), 51)).await;
    let tip = store.block(&hash(0, 99)).await.unwrap().unwrap();
    assert!(detector.check(&store, notifier.as_ref(), &tip, at(0)).await.unwrap().is_empty());
    assert!(store.version_bit_alerts(Network::Btc).await.unwrap().is_empty());
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn short_ancestry_is_tallied() {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let detector = VersionBitsDetector::new(VersionBitsConfig::default());

    store_chain(&store, Network::Btc, &signaling(main_chain(59), 0)).await;
    let tip = store.block(&hash(0, 59)).await.unwrap().unwrap();
    let notified = detector.check(&store, notifier.as_ref(), &tip, at(0)).await.unwrap();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].tally, 60);
}

#[tokio::test]
async fn missing_version_aborts() {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let detector = VersionBitsDetector::new(VersionBitsConfig::default());

    let mut headers = signaling(main_chain(99), 0);
    headers[90].version = None;
    store_chain(&store, Network::Btc, &headers).await;
    let tip = store.block(&hash(0, 99)).await.unwrap().unwrap();
    let err = detector.check(&store, notifier.as_ref(), &tip, at(0)).await.unwrap_err();
    assert!(matches!(err, DetectError::MissingVersion { height: 90, .. }));
    assert!(store.version_bit_alerts(Network::Btc).await.unwrap().is_empty());
}
