// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::DetectError;
use crate::{
    chain::ancestry,
    model::{Block, VersionBitAlert},
    notify::{Event, Notifier},
    store::Store,
};

/// Bits above this one form the fixed version prefix and are never tallied.
pub const MAX_SIGNAL_BIT: u8 = 28;

pub const DEFAULT_WINDOW: u32 = 100;
pub const DEFAULT_THRESHOLD: u32 = 50;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VersionBitsConfig {
    pub enabled: bool,
    /// Number of recent blocks to tally.
    pub window: u32,
    /// Signaling blocks within the window needed to open an alert.
    pub threshold: u32,
}

impl Default for VersionBitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: DEFAULT_WINDOW,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Per-bit signaling counts over a run of blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionBitsTally {
    counts: [u32; MAX_SIGNAL_BIT as usize + 1],
    blocks: u32,
}

impl VersionBitsTally {
    /// Tallies the given blocks. Fails on the first block that has no version.
    pub fn from_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Result<Self, DetectError> {
        let mut tally = Self {
            counts: Default::default(),
            blocks: 0,
        };
        for block in blocks {
            let version = block.version.ok_or_else(|| DetectError::MissingVersion {
                hash: block.hash.clone(),
                height: block.height,
            })? as u32;
            for (bit, count) in tally.counts.iter_mut().enumerate() {
                if version & (1 << bit) != 0 {
                    *count += 1;
                }
            }
            tally.blocks += 1;
        }
        Ok(tally)
    }

    /// The number of blocks signaling `bit`, zero for the prefix bits.
    pub fn count(&self, bit: u8) -> u32 {
        self.counts.get(bit as usize).copied().unwrap_or_default()
    }

    /// The number of blocks tallied.
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn bits(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.counts.iter().enumerate().map(|(bit, count)| (bit as u8, *count))
    }
}

/// Watches for unknown soft forks being signaled through block version bits.
#[derive(Debug)]
pub struct VersionBitsDetector {
    config: VersionBitsConfig,
}

impl VersionBitsDetector {
    pub fn new(config: VersionBitsConfig) -> Self {
        Self { config }
    }

    /// Tallies the window ending at `tip`, opening and closing alerts.
    ///
    /// Returns the alerts that were notified during this pass.
    #[instrument(skip_all, fields(height = tip.height), err)]
    pub async fn check(
        &self,
        store: &dyn Store,
        notifier: &dyn Notifier,
        tip: &Block,
        now: OffsetDateTime,
    ) -> Result<Vec<VersionBitAlert>, DetectError> {
        let blocks = ancestry(store, &tip.hash, self.config.window as usize).await?;
        let tally = VersionBitsTally::from_blocks(&blocks)?;
        if tally.blocks() < self.config.window {
            debug!("only {} of {} blocks available", tally.blocks(), self.config.window);
        }

        let mut notified = Vec::new();
        for (bit, count) in tally.bits() {
            let open = store.open_version_bit_alert(tip.network, bit).await?;
            let mut alert = if count >= self.config.threshold {
                match open {
                    Some(alert) => alert,
                    None => {
                        info!("bit {bit} signaled by {count} blocks");
                        let alert = VersionBitAlert {
                            network: tip.network,
                            bit,
                            activation: tip.hash.clone(),
                            activation_height: tip.height,
                            deactivation: None,
                            tally: count,
                            window: self.config.window,
                            notified_at: None,
                        };
                        match store.insert_version_bit_alert(&alert).await {
                            Ok(()) => alert,
                            Err(e) if e.is_duplicate() => {
                                store.open_version_bit_alert(tip.network, bit).await?.unwrap_or(alert)
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            } else if count == 0 {
                if open.is_some() {
                    info!("bit {bit} is no longer signaled");
                    store.close_version_bit_alert(tip.network, bit, &tip.hash).await?;
                }
                continue;
            } else {
                match open {
                    Some(alert) => alert,
                    None => continue,
                }
            };

            if alert.notified_at.is_none() && store.mark_version_bit_notified(tip.network, bit, now).await? {
                alert.notified_at = Some(now);
                notifier
                    .notify(&Event::VersionBit {
                        alert: alert.clone(),
                        block: tip.clone(),
                    })
                    .await?;
                notified.push(alert);
            }
        }
        Ok(notified)
    }
}
