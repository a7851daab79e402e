// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The persistence boundary of the monitor.

mod memory;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

pub use self::memory::MemoryStore;
use crate::model::{
    Block, BlockHash, InflationSnapshot, InvalidTipRecord, LagRecord, LightningTransaction, Network, Peer, PeerId,
    SoftforkStatus, StaleCandidate, VersionBitAlert,
};

#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StoreError {
    /// A uniqueness constraint was violated, usually by a concurrent writer.
    #[error("duplicate {0}")]
    Duplicate(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    MongoDb(#[from] mongodb::error::Error),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Find, insert and update operations for every entity.
///
/// The `mark_*_notified` operations only succeed on the transition from un-notified to notified and
/// report whether they performed it, which gives notifications at-most-once delivery.
#[async_trait]
pub trait Store: Send + Sync {
    async fn block(&self, hash: &BlockHash) -> Result<Option<Block>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the hash is already known.
    async fn insert_block(&self, block: &Block) -> Result<(), StoreError>;

    /// Sets the parent of `child` unless it already has one. Returns whether it was set.
    async fn attach_parent(&self, child: &BlockHash, parent: &BlockHash) -> Result<bool, StoreError>;

    async fn mark_lightning_checked(&self, hash: &BlockHash) -> Result<(), StoreError>;

    /// The lowest height of any stored block of the network.
    async fn min_block_height(&self, network: Network) -> Result<Option<u64>, StoreError>;

    /// The stored blocks of the network with a height in `from..=to`, ordered by height and hash.
    async fn blocks_between(&self, network: Network, from: u64, to: u64) -> Result<Vec<Block>, StoreError>;

    async fn set_block_pool(&self, hash: &BlockHash, pool: &str) -> Result<(), StoreError>;

    async fn peers(&self) -> Result<Vec<Peer>, StoreError>;

    async fn peer(&self, id: PeerId) -> Result<Option<Peer>, StoreError>;

    async fn upsert_peer(&self, peer: &Peer) -> Result<(), StoreError>;

    /// The open record for the pair, or else the most recently dismissed one.
    async fn invalid_tip(&self, peer: PeerId, block: &BlockHash) -> Result<Option<InvalidTipRecord>, StoreError>;

    async fn insert_invalid_tip(&self, record: &InvalidTipRecord) -> Result<(), StoreError>;

    async fn mark_invalid_tip_notified(
        &self,
        peer: PeerId,
        block: &BlockHash,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    async fn dismiss_invalid_tip(&self, peer: PeerId, block: &BlockHash, at: OffsetDateTime)
    -> Result<bool, StoreError>;

    async fn invalid_tips(&self) -> Result<Vec<InvalidTipRecord>, StoreError>;

    async fn lag(&self, peer: PeerId, reference: PeerId) -> Result<Option<LagRecord>, StoreError>;

    async fn insert_lag(&self, record: &LagRecord) -> Result<(), StoreError>;

    async fn mark_lag_notified(&self, peer: PeerId, reference: PeerId, at: OffsetDateTime)
    -> Result<bool, StoreError>;

    async fn delete_lag(&self, peer: PeerId, reference: PeerId) -> Result<(), StoreError>;

    async fn lags(&self) -> Result<Vec<LagRecord>, StoreError>;

    /// The alert for the bit that has not been deactivated yet, if any.
    async fn open_version_bit_alert(&self, network: Network, bit: u8) -> Result<Option<VersionBitAlert>, StoreError>;

    async fn insert_version_bit_alert(&self, alert: &VersionBitAlert) -> Result<(), StoreError>;

    async fn close_version_bit_alert(
        &self,
        network: Network,
        bit: u8,
        deactivation: &BlockHash,
    ) -> Result<bool, StoreError>;

    async fn mark_version_bit_notified(&self, network: Network, bit: u8, at: OffsetDateTime)
    -> Result<bool, StoreError>;

    async fn version_bit_alerts(&self, network: Network) -> Result<Vec<VersionBitAlert>, StoreError>;

    async fn softfork(&self, peer: PeerId, name: &str) -> Result<Option<SoftforkStatus>, StoreError>;

    async fn upsert_softfork(&self, status: &SoftforkStatus) -> Result<(), StoreError>;

    async fn softforks(&self) -> Result<Vec<SoftforkStatus>, StoreError>;

    async fn utxo_snapshot(&self, block: &BlockHash) -> Result<Option<InflationSnapshot>, StoreError>;

    async fn insert_utxo_snapshot(&self, snapshot: &InflationSnapshot) -> Result<(), StoreError>;

    async fn mark_snapshot_notified(&self, block: &BlockHash, at: OffsetDateTime) -> Result<bool, StoreError>;

    /// Records a match. Transactions that are already stored are ignored.
    async fn insert_lightning_transaction(&self, transaction: &LightningTransaction) -> Result<(), StoreError>;

    async fn lightning_transactions(&self, network: Network) -> Result<Vec<LightningTransaction>, StoreError>;

    async fn stale_candidate(&self, network: Network, height: u64) -> Result<Option<StaleCandidate>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the height already has a candidate.
    async fn insert_stale_candidate(&self, candidate: &StaleCandidate) -> Result<(), StoreError>;

    async fn mark_stale_candidate_notified(
        &self,
        network: Network,
        height: u64,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    async fn stale_candidates(&self, network: Network) -> Result<Vec<StaleCandidate>, StoreError>;
}
