// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The shared block graph and the resolution of peer-reported tips into it.

mod resolver;

use serde::{Deserialize, Serialize};

pub use self::resolver::{ResolveError, Resolver};
use crate::{
    model::{Block, BlockHash},
    store::{Store, StoreError},
};

/// The default height below which ancestors are never fetched.
pub const DEFAULT_CUTOFF_HEIGHT: u64 = 560_000;

/// Bounds of the backward ancestry walk.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    /// Historical height below which ancestors are never fetched.
    pub cutoff_height: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            cutoff_height: DEFAULT_CUTOFF_HEIGHT,
        }
    }
}

/// Collects `start` and up to `limit - 1` of its resolved ancestors, newest first.
///
/// Stops early at a block whose parent is unresolved.
pub async fn ancestry(store: &dyn Store, start: &BlockHash, limit: usize) -> Result<Vec<Block>, StoreError> {
    let mut blocks = Vec::with_capacity(limit);
    let mut next = Some(start.clone());
    while blocks.len() < limit {
        let Some(hash) = next.take() else { break };
        let Some(block) = store.block(&hash).await? else { break };
        next = block.parent.clone();
        blocks.push(block);
    }
    Ok(blocks)
}
