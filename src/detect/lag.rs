// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::DetectError;
use crate::{
    model::{Block, LagRecord, Peer, PeerId},
    notify::{Event, Notifier},
    store::Store,
};

/// The default delay between first detecting a lag and notifying about it.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LagConfig {
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// The outcome of comparing one peer with the reference peer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LagStatus {
    /// Not behind and nothing to clean up.
    InSync,
    /// Behind the reference peer. `suppressed` while still within the grace period.
    Behind { suppressed: bool },
    /// Behind, and notified during this pass.
    Notified,
    /// Caught up again, the lag record was removed.
    Cleared,
    /// Either side is unreachable or not synced, or the peer has no connections.
    Skipped,
}

/// Compares the cumulative work of every primary peer with the peer that has the most.
#[derive(Debug)]
pub struct LagDetector {
    config: LagConfig,
    reference: Option<PeerId>,
}

impl LagDetector {
    pub fn new(config: LagConfig) -> Self {
        Self {
            config,
            reference: None,
        }
    }

    /// The peer chosen as reference by the last pass.
    pub fn reference(&self) -> Option<PeerId> {
        self.reference
    }

    #[instrument(skip_all, err)]
    pub async fn check(
        &mut self,
        store: &dyn Store,
        notifier: &dyn Notifier,
        peers: &mut [Peer],
        now: OffsetDateTime,
    ) -> Result<Vec<(PeerId, LagStatus)>, DetectError> {
        let mut best_blocks = HashMap::new();
        for peer in peers.iter().filter(|p| p.is_synced()) {
            if let Some(hash) = &peer.best_block {
                if let Some(block) = store.block(hash).await? {
                    best_blocks.insert(peer.id, block);
                }
            }
        }

        let Some(reference_id) = self.select_reference(peers, &best_blocks) else {
            debug!("no synced peer to compare against");
            return Ok(peers.iter().map(|p| (p.id, LagStatus::Skipped)).collect());
        };
        if self.reference != Some(reference_id) {
            info!("peer {reference_id} is the new reference peer");
            self.reference = Some(reference_id);
        }

        // Records against a previous reference peer no longer describe the fleet.
        for record in store.lags().await? {
            if record.reference != reference_id {
                store.delete_lag(record.peer, record.reference).await?;
            }
        }

        let Some(reference) = peers.iter().find(|p| p.id == reference_id).cloned() else {
            return Ok(Vec::new());
        };
        let Some(reference_block) = best_blocks.get(&reference_id).cloned() else {
            return Ok(Vec::new());
        };

        let mut statuses = Vec::with_capacity(peers.len());
        for peer in peers.iter_mut().filter(|p| p.id != reference_id) {
            let status = match best_blocks.get(&peer.id) {
                Some(block) if peer.peer_count.unwrap_or_default() >= 1 => {
                    self.compare(store, notifier, peer, block, &reference, &reference_block, now)
                        .await?
                }
                _ => LagStatus::Skipped,
            };
            statuses.push((peer.id, status));
        }
        Ok(statuses)
    }

    /// The synced peer with the most work. On a tie the current reference keeps its role.
    fn select_reference(&self, peers: &[Peer], best_blocks: &HashMap<PeerId, Block>) -> Option<PeerId> {
        let max_work = best_blocks.values().map(|b| b.work).max()?;
        if let Some(current) = self.reference {
            if best_blocks.get(&current).map_or(false, |b| b.work == max_work) {
                return Some(current);
            }
        }
        peers
            .iter()
            .find(|p| best_blocks.get(&p.id).map_or(false, |b| b.work == max_work))
            .map(|p| p.id)
    }

    #[allow(clippy::too_many_arguments)]
    async fn compare(
        &self,
        store: &dyn Store,
        notifier: &dyn Notifier,
        peer: &mut Peer,
        block: &Block,
        reference: &Peer,
        reference_block: &Block,
        now: OffsetDateTime,
    ) -> Result<LagStatus, DetectError> {
        let existing = store.lag(peer.id, reference.id).await?;

        if block.hash == reference_block.hash || block.work >= reference_block.work {
            if existing.is_none() {
                return Ok(LagStatus::InSync);
            }
            store.delete_lag(peer.id, reference.id).await?;
            if peer.lagging_since.take().is_some() {
                store.upsert_peer(peer).await?;
            }
            info!("peer {} caught up with peer {}", peer.id, reference.id);
            return Ok(LagStatus::Cleared);
        }

        let mut record = match existing {
            Some(record) => record,
            None => {
                let record = LagRecord {
                    peer: peer.id,
                    reference: reference.id,
                    created_at: now,
                    notified_at: None,
                };
                match store.insert_lag(&record).await {
                    Ok(()) => record,
                    Err(e) if e.is_duplicate() => store.lag(peer.id, reference.id).await?.unwrap_or(record),
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if peer.lagging_since != Some(record.created_at) {
            peer.lagging_since = Some(record.created_at);
            store.upsert_peer(peer).await?;
        }

        if now < record.created_at + self.config.grace_period {
            debug!("peer {} is behind peer {}, within grace period", peer.id, reference.id);
            return Ok(LagStatus::Behind { suppressed: true });
        }
        if record.notified_at.is_some() || !store.mark_lag_notified(peer.id, reference.id, now).await? {
            return Ok(LagStatus::Behind { suppressed: false });
        }
        record.notified_at = Some(now);

        let blocks_behind = reference_block.height as i64 - block.height as i64;
        info!(
            "peer {} is {blocks_behind} blocks behind peer {}",
            peer.id, reference.id
        );
        notifier
            .notify(&Event::Lag {
                peer: peer.clone(),
                reference: reference.clone(),
                record,
                blocks_behind,
            })
            .await?;
        Ok(LagStatus::Notified)
    }
}
