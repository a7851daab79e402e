// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::DetectError;
use crate::{
    model::{InvalidTipRecord, Peer},
    notify::{Event, Notifier},
    rpc::responses::{ChainTip, ChainTipStatus},
    store::Store,
};

/// The default distance from the best height within which `valid-fork` tips are resolved.
pub const DEFAULT_FORK_HORIZON: u64 = 1000;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvalidTipConfig {
    /// `valid-fork` tips deeper than this below the peer's best height are ignored.
    pub fork_horizon: u64,
}

impl Default for InvalidTipConfig {
    fn default() -> Self {
        Self {
            fork_horizon: DEFAULT_FORK_HORIZON,
        }
    }
}

/// Finds blocks that one peer rejects but that are part of the shared block graph.
#[derive(Copy, Clone, Debug, Default)]
pub struct InvalidTipDetector;

impl InvalidTipDetector {
    /// Checks the `invalid` tips of one peer against the store.
    ///
    /// Returns the record that was notified, if any. Scanning stops at the first notification.
    #[instrument(skip_all, fields(peer = %peer.id))]
    pub async fn check(
        &self,
        store: &dyn Store,
        notifier: &dyn Notifier,
        peer: &Peer,
        tips: &[ChainTip],
        now: OffsetDateTime,
    ) -> Result<Option<InvalidTipRecord>, DetectError> {
        if !peer.is_synced() {
            return Ok(None);
        }
        for tip in tips.iter().filter(|t| t.status == ChainTipStatus::Invalid) {
            let Some(block) = store.block(&tip.hash).await? else { continue };

            let mut record = match store.invalid_tip(peer.id, &block.hash).await? {
                Some(record) => record,
                None => {
                    let record = InvalidTipRecord::new(peer.id, block.hash.clone(), now);
                    match store.insert_invalid_tip(&record).await {
                        Ok(()) => record,
                        Err(e) if e.is_duplicate() => store
                            .invalid_tip(peer.id, &block.hash)
                            .await?
                            .ok_or_else(|| DetectError::MissingBlock(block.hash.clone()))?,
                        Err(e) => return Err(e.into()),
                    }
                }
            };

            if record.notified_at.is_none() && store.mark_invalid_tip_notified(peer.id, &block.hash, now).await? {
                record.notified_at = Some(now);
                info!("peer {} marked block {} at height {} invalid", peer.id, block.hash, block.height);
                notifier
                    .notify(&Event::InvalidTip {
                        peer: peer.clone(),
                        block,
                        record: record.clone(),
                    })
                    .await?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
