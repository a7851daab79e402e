// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::DetectError;
use crate::{
    model::{pool_from_coinbase_tx, Block},
    rpc::responses::FullBlock,
    store::Store,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_BLOCKS: u32 = 10;

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    pub enabled: bool,
    /// Minimum time between two passes.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// How many blocks below the tip to look at per pass.
    pub max_blocks: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

/// Attributes blocks to mining pools by the tag in their coinbase.
#[derive(Debug)]
pub struct PoolMatcher {
    config: PoolConfig,
    last_run: Option<OffsetDateTime>,
}

impl PoolMatcher {
    pub fn new(config: PoolConfig) -> Self {
        Self { config, last_run: None }
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.config.enabled && self.last_run.map_or(true, |last| now >= last + self.config.interval)
    }

    /// Collects the blocks without a pool among the last `max_blocks` up to `tip`, oldest first.
    ///
    /// Blocks whose coinbase matched no known pool stay in the result, so later passes retry them.
    pub async fn pending(
        &mut self,
        store: &dyn Store,
        tip: &Block,
        now: OffsetDateTime,
    ) -> Result<Vec<Block>, DetectError> {
        self.last_run = Some(now);
        let mut pending = Vec::new();
        let mut current = Some(tip.clone());
        for _ in 0..self.config.max_blocks {
            let Some(block) = current.take() else { break };
            if let Some(parent) = &block.parent {
                current = store.block(parent).await?;
            }
            if block.pool.is_none() {
                pending.push(block);
            }
        }
        pending.reverse();
        Ok(pending)
    }

    /// Stores the pool named in the coinbase of `body`, if any.
    #[instrument(skip_all, fields(height = block.height), err)]
    pub async fn attribute(
        &self,
        store: &dyn Store,
        block: &Block,
        body: Option<&FullBlock>,
    ) -> Result<Option<&'static str>, DetectError> {
        let Some(body) = body else {
            warn!("body of block {} is unavailable, leaving its pool unknown", block.hash);
            return Ok(None);
        };
        let Some(pool) = body.tx.first().and_then(pool_from_coinbase_tx) else {
            info!("no known pool in the coinbase of block {}", block.hash);
            return Ok(None);
        };
        store.set_block_pool(&block.hash, pool).await?;
        debug!("block {} was mined by {pool}", block.hash);
        Ok(Some(pool))
    }
}
