// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use super::DetectError;
use crate::{
    model::{Block, StaleCandidate},
    notify::{Event, Notifier},
    store::Store,
};

pub const DEFAULT_WINDOW: u64 = 10;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaleCandidateConfig {
    pub enabled: bool,
    /// How many heights below the tip to look for competing blocks.
    pub window: u64,
}

impl Default for StaleCandidateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Reports heights where more than one block was seen.
#[derive(Debug)]
pub struct StaleCandidateDetector {
    config: StaleCandidateConfig,
}

impl StaleCandidateDetector {
    pub fn new(config: StaleCandidateConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Records every height within the window below `tip` that has competing blocks.
    ///
    /// Each height is notified once. Returns the candidates notified by this call.
    #[instrument(skip_all, fields(height = tip.height), err)]
    pub async fn check(
        &self,
        store: &dyn Store,
        notifier: &dyn Notifier,
        tip: &Block,
        now: OffsetDateTime,
    ) -> Result<Vec<StaleCandidate>, DetectError> {
        let from = tip.height.saturating_sub(self.config.window);
        let mut heights = BTreeMap::<u64, Vec<Block>>::new();
        for block in store.blocks_between(tip.network, from, tip.height).await? {
            heights.entry(block.height).or_default().push(block);
        }

        let mut notified = Vec::new();
        for (height, blocks) in heights.into_iter().filter(|(_, blocks)| blocks.len() > 1) {
            if store.stale_candidate(tip.network, height).await?.is_none() {
                let candidate = StaleCandidate {
                    network: tip.network,
                    height,
                    blocks: blocks.iter().map(|block| block.hash.clone()).collect(),
                    created_at: now,
                    notified_at: None,
                };
                match store.insert_stale_candidate(&candidate).await {
                    Ok(()) => {}
                    Err(e) if e.is_duplicate() => {}
                    Err(e) => return Err(e.into()),
                }
            }
            if !store.mark_stale_candidate_notified(tip.network, height, now).await? {
                continue;
            }
            let Some(candidate) = store.stale_candidate(tip.network, height).await? else {
                continue;
            };
            warn!("{} blocks compete at height {height}", blocks.len());
            notifier
                .notify(&Event::StaleCandidate {
                    candidate: candidate.clone(),
                    blocks,
                })
                .await?;
            notified.push(candidate);
        }
        Ok(notified)
    }
}
