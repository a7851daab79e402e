// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Fleet-wide analyses that run after each poll cycle.
//!
//! Detectors only read the store and peer status, write alert-state entities and notify. They never
//! talk to peers: the [`Poller`](crate::poller::Poller) fetches whatever RPC data they need.

mod inflation;
mod invalid_tip;
mod lag;
mod lightning;
mod pool;
mod softfork;
mod stale;
mod version_bits;

use thiserror::Error;

pub use self::{
    inflation::{InflationConfig, InflationDetector, InflationOutcome},
    invalid_tip::{InvalidTipConfig, InvalidTipDetector},
    lag::{LagConfig, LagDetector, LagStatus},
    lightning::{classify, LightningConfig, LightningScanner, ScanPlan},
    pool::{PoolConfig, PoolMatcher},
    softfork::SoftforkDetector,
    stale::{StaleCandidateConfig, StaleCandidateDetector},
    version_bits::{VersionBitsConfig, VersionBitsDetector, VersionBitsTally},
};
use crate::{
    model::BlockHash,
    notify::NotifyError,
    store::StoreError,
};

#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum DetectError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("block {hash} at height {height} has no version")]
    MissingVersion { hash: BlockHash, height: u64 },
    #[error("block {0} is missing from the store")]
    MissingBlock(BlockHash),
}
