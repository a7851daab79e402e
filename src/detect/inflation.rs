// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::DetectError;
use crate::{
    model::{Block, InflationSnapshot, Peer},
    notify::{Event, Notifier},
    rpc::responses::TxOutSetInfo,
    store::Store,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_BLOCKS: u32 = 10;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InflationConfig {
    pub enabled: bool,
    /// Minimum time between two UTXO set snapshots.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How far back to look for a baseline snapshot.
    pub max_blocks: u32,
}

impl Default for InflationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InflationOutcome {
    /// The block already had a snapshot.
    AlreadySnapshotted,
    /// The ancestry ended before any snapshot was found.
    NoBaseline,
    /// No snapshot within the configured number of blocks.
    BoundExceeded,
    /// Supply grew by no more than the subsidy.
    Consistent,
    /// Supply grew by `excess` satoshi more than the subsidy.
    Inflated { excess: u64 },
}

enum Baseline {
    Found(InflationSnapshot),
    Missing(InflationOutcome),
}

/// Compares the growth of the UTXO set total with the subsidy schedule.
#[derive(Debug)]
pub struct InflationDetector {
    config: InflationConfig,
    last_run: Option<OffsetDateTime>,
}

impl InflationDetector {
    pub fn new(config: InflationConfig) -> Self {
        Self { config, last_run: None }
    }

    /// Whether the configured interval has passed since the last pass.
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.config.enabled && self.last_run.map_or(true, |last| now >= last + self.config.interval)
    }

    /// Snapshots the UTXO set summary `info` that `peer` reported and compares it with a baseline.
    ///
    /// The block of the summary must be stored. Until it is, the pass stays due.
    #[instrument(skip_all, fields(peer = %peer.id, height = info.height), err)]
    pub async fn check(
        &mut self,
        store: &dyn Store,
        notifier: &dyn Notifier,
        peer: &Peer,
        info: &TxOutSetInfo,
        now: OffsetDateTime,
    ) -> Result<InflationOutcome, DetectError> {
        let block = store
            .block(&info.bestblock)
            .await?
            .ok_or_else(|| DetectError::MissingBlock(info.bestblock.clone()))?;
        self.last_run = Some(now);
        if store.utxo_snapshot(&block.hash).await?.is_some() {
            return Ok(InflationOutcome::AlreadySnapshotted);
        }

        let mut snapshot = InflationSnapshot {
            block: block.hash.clone(),
            network: block.network,
            height: block.height,
            peer: peer.id,
            total_amount: info.total_amount_sat(),
            txouts: info.txouts,
            excess: None,
            notified_at: None,
        };

        let baseline = match self.baseline(store, &block).await? {
            Baseline::Found(baseline) => baseline,
            Baseline::Missing(outcome) => {
                self.insert(store, &snapshot).await?;
                return Ok(outcome);
            }
        };

        let expected = block.network.subsidy_between(baseline.height, snapshot.height);
        let delta = snapshot.total_amount.saturating_sub(baseline.total_amount);
        snapshot.excess = delta.checked_sub(expected).filter(|excess| *excess > 0);
        if !self.insert(store, &snapshot).await? {
            return Ok(InflationOutcome::AlreadySnapshotted);
        }

        let Some(excess) = snapshot.excess else {
            debug!("supply grew by {delta} sat, expected up to {expected} sat");
            return Ok(InflationOutcome::Consistent);
        };
        warn!("supply grew by {excess} sat more than expected at height {}", snapshot.height);
        if store.mark_snapshot_notified(&snapshot.block, now).await? {
            snapshot.notified_at = Some(now);
            notifier
                .notify(&Event::Inflation {
                    peer: peer.clone(),
                    snapshot,
                    baseline,
                    expected,
                })
                .await?;
        }
        Ok(InflationOutcome::Inflated { excess })
    }

    /// Walks back from the parent of `block` to the nearest snapshot.
    async fn baseline(&self, store: &dyn Store, block: &Block) -> Result<Baseline, DetectError> {
        let mut next = block.parent.clone();
        for _ in 0..self.config.max_blocks {
            let Some(hash) = next else {
                return Ok(Baseline::Missing(InflationOutcome::NoBaseline));
            };
            if let Some(snapshot) = store.utxo_snapshot(&hash).await? {
                return Ok(Baseline::Found(snapshot));
            }
            next = match store.block(&hash).await? {
                Some(ancestor) => ancestor.parent,
                None => return Ok(Baseline::Missing(InflationOutcome::NoBaseline)),
            };
        }
        info!(
            "no snapshot within {} blocks of height {}, starting a new baseline",
            self.config.max_blocks, block.height
        );
        Ok(Baseline::Missing(InflationOutcome::BoundExceeded))
    }

    /// Returns `false` if a concurrent writer stored the snapshot first.
    async fn insert(&self, store: &dyn Store, snapshot: &InflationSnapshot) -> Result<bool, DetectError> {
        match store.insert_utxo_snapshot(snapshot).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_duplicate() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
