// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use mongodb::error::Error;
use time::OffsetDateTime;

use super::{
    collections::{
        BlockCollection, InvalidTipCollection, LagCollection, LightningCollection, PeerCollection, SnapshotCollection,
        SoftforkCollection, StaleCandidateCollection, VersionBitCollection,
    },
    is_duplicate_key, MongoDb,
};
use crate::{
    model::{
        Block, BlockHash, InflationSnapshot, InvalidTipRecord, LagRecord, LightningTransaction, Network, Peer, PeerId,
        SoftforkStatus, StaleCandidate, VersionBitAlert,
    },
    store::{Store, StoreError},
};

/// Maps a duplicate key error to [`StoreError::Duplicate`].
fn on_insert(what: impl FnOnce() -> String) -> impl FnOnce(Error) -> StoreError {
    move |e| {
        if is_duplicate_key(&e) {
            StoreError::Duplicate(what())
        } else {
            StoreError::MongoDb(e)
        }
    }
}

/// A [`Store`] backed by MongoDB.
#[derive(Clone, Debug)]
pub struct MongoStore {
    db: MongoDb,
}

impl MongoStore {
    /// Creates all collections and their indexes.
    pub async fn new(db: MongoDb) -> Result<Self, Error> {
        db.prepare::<BlockCollection>().await?;
        db.prepare::<PeerCollection>().await?;
        db.prepare::<InvalidTipCollection>().await?;
        db.prepare::<LagCollection>().await?;
        db.prepare::<VersionBitCollection>().await?;
        db.prepare::<SoftforkCollection>().await?;
        db.prepare::<SnapshotCollection>().await?;
        db.prepare::<LightningCollection>().await?;
        db.prepare::<StaleCandidateCollection>().await?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &MongoDb {
        &self.db
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn block(&self, hash: &BlockHash) -> Result<Option<Block>, StoreError> {
        Ok(self.db.collection::<BlockCollection>().get_block(hash).await?)
    }

    async fn insert_block(&self, block: &Block) -> Result<(), StoreError> {
        self.db
            .collection::<BlockCollection>()
            .insert_block(block)
            .await
            .map_err(on_insert(|| format!("block {}", block.hash)))
    }

    async fn attach_parent(&self, child: &BlockHash, parent: &BlockHash) -> Result<bool, StoreError> {
        Ok(self.db.collection::<BlockCollection>().set_parent(child, parent).await?)
    }

    async fn mark_lightning_checked(&self, hash: &BlockHash) -> Result<(), StoreError> {
        if self.db.collection::<BlockCollection>().set_checked_lightning(hash).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("block {hash}")))
        }
    }

    async fn min_block_height(&self, network: Network) -> Result<Option<u64>, StoreError> {
        Ok(self.db.collection::<BlockCollection>().get_min_height(network).await?)
    }

    async fn blocks_between(&self, network: Network, from: u64, to: u64) -> Result<Vec<Block>, StoreError> {
        Ok(self
            .db
            .collection::<BlockCollection>()
            .get_between(network, from, to)
            .await?)
    }

    async fn set_block_pool(&self, hash: &BlockHash, pool: &str) -> Result<(), StoreError> {
        if self.db.collection::<BlockCollection>().set_pool(hash, pool).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("block {hash}")))
        }
    }

    async fn peers(&self) -> Result<Vec<Peer>, StoreError> {
        Ok(self.db.collection::<PeerCollection>().get_peers().await?)
    }

    async fn peer(&self, id: PeerId) -> Result<Option<Peer>, StoreError> {
        Ok(self.db.collection::<PeerCollection>().get_peer(id).await?)
    }

    async fn upsert_peer(&self, peer: &Peer) -> Result<(), StoreError> {
        Ok(self.db.collection::<PeerCollection>().upsert_peer(peer).await?)
    }

    async fn invalid_tip(&self, peer: PeerId, block: &BlockHash) -> Result<Option<InvalidTipRecord>, StoreError> {
        Ok(self.db.collection::<InvalidTipCollection>().get_latest(peer, block).await?)
    }

    async fn insert_invalid_tip(&self, record: &InvalidTipRecord) -> Result<(), StoreError> {
        self.db
            .collection::<InvalidTipCollection>()
            .insert_record(record)
            .await
            .map_err(on_insert(|| format!("invalid tip {} of peer {}", record.block, record.peer)))
    }

    async fn mark_invalid_tip_notified(
        &self,
        peer: PeerId,
        block: &BlockHash,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self
            .db
            .collection::<InvalidTipCollection>()
            .set_notified(peer, block, at)
            .await?)
    }

    async fn dismiss_invalid_tip(
        &self,
        peer: PeerId,
        block: &BlockHash,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.db.collection::<InvalidTipCollection>().dismiss(peer, block, at).await?)
    }

    async fn invalid_tips(&self) -> Result<Vec<InvalidTipRecord>, StoreError> {
        Ok(self.db.collection::<InvalidTipCollection>().get_records().await?)
    }

    async fn lag(&self, peer: PeerId, reference: PeerId) -> Result<Option<LagRecord>, StoreError> {
        Ok(self.db.collection::<LagCollection>().get_lag(peer, reference).await?)
    }

    async fn insert_lag(&self, record: &LagRecord) -> Result<(), StoreError> {
        self.db
            .collection::<LagCollection>()
            .insert_lag(record)
            .await
            .map_err(on_insert(|| {
                format!("lag of peer {} behind {}", record.peer, record.reference)
            }))
    }

    async fn mark_lag_notified(&self, peer: PeerId, reference: PeerId, at: OffsetDateTime) -> Result<bool, StoreError> {
        Ok(self
            .db
            .collection::<LagCollection>()
            .set_notified(peer, reference, at)
            .await?)
    }

    async fn delete_lag(&self, peer: PeerId, reference: PeerId) -> Result<(), StoreError> {
        Ok(self.db.collection::<LagCollection>().delete_lag(peer, reference).await?)
    }

    async fn lags(&self) -> Result<Vec<LagRecord>, StoreError> {
        Ok(self.db.collection::<LagCollection>().get_lags().await?)
    }

    async fn open_version_bit_alert(&self, network: Network, bit: u8) -> Result<Option<VersionBitAlert>, StoreError> {
        Ok(self.db.collection::<VersionBitCollection>().get_open(network, bit).await?)
    }

    async fn insert_version_bit_alert(&self, alert: &VersionBitAlert) -> Result<(), StoreError> {
        self.db
            .collection::<VersionBitCollection>()
            .insert_alert(alert)
            .await
            .map_err(on_insert(|| format!("open alert for bit {}", alert.bit)))
    }

    async fn close_version_bit_alert(
        &self,
        network: Network,
        bit: u8,
        deactivation: &BlockHash,
    ) -> Result<bool, StoreError> {
        Ok(self
            .db
            .collection::<VersionBitCollection>()
            .close(network, bit, deactivation)
            .await?)
    }

    async fn mark_version_bit_notified(
        &self,
        network: Network,
        bit: u8,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self
            .db
            .collection::<VersionBitCollection>()
            .set_notified(network, bit, at)
            .await?)
    }

    async fn version_bit_alerts(&self, network: Network) -> Result<Vec<VersionBitAlert>, StoreError> {
        Ok(self.db.collection::<VersionBitCollection>().get_alerts(network).await?)
    }

    async fn softfork(&self, peer: PeerId, name: &str) -> Result<Option<SoftforkStatus>, StoreError> {
        Ok(self.db.collection::<SoftforkCollection>().get_status(peer, name).await?)
    }

    async fn upsert_softfork(&self, status: &SoftforkStatus) -> Result<(), StoreError> {
        Ok(self.db.collection::<SoftforkCollection>().upsert_status(status).await?)
    }

    async fn softforks(&self) -> Result<Vec<SoftforkStatus>, StoreError> {
        Ok(self.db.collection::<SoftforkCollection>().get_statuses().await?)
    }

    async fn utxo_snapshot(&self, block: &BlockHash) -> Result<Option<InflationSnapshot>, StoreError> {
        Ok(self.db.collection::<SnapshotCollection>().get_snapshot(block).await?)
    }

    async fn insert_utxo_snapshot(&self, snapshot: &InflationSnapshot) -> Result<(), StoreError> {
        self.db
            .collection::<SnapshotCollection>()
            .insert_snapshot(snapshot)
            .await
            .map_err(on_insert(|| format!("snapshot at {}", snapshot.block)))
    }

    async fn mark_snapshot_notified(&self, block: &BlockHash, at: OffsetDateTime) -> Result<bool, StoreError> {
        Ok(self
            .db
            .collection::<SnapshotCollection>()
            .set_notified(block, at)
            .await?)
    }

    async fn insert_lightning_transaction(&self, transaction: &LightningTransaction) -> Result<(), StoreError> {
        self.db
            .collection::<LightningCollection>()
            .insert_transaction(transaction)
            .await?;
        Ok(())
    }

    async fn lightning_transactions(&self, network: Network) -> Result<Vec<LightningTransaction>, StoreError> {
        Ok(self
            .db
            .collection::<LightningCollection>()
            .get_transactions(network)
            .await?)
    }

    async fn stale_candidate(&self, network: Network, height: u64) -> Result<Option<StaleCandidate>, StoreError> {
        Ok(self
            .db
            .collection::<StaleCandidateCollection>()
            .get_candidate(network, height)
            .await?)
    }

    async fn insert_stale_candidate(&self, candidate: &StaleCandidate) -> Result<(), StoreError> {
        self.db
            .collection::<StaleCandidateCollection>()
            .insert_candidate(candidate)
            .await
            .map_err(on_insert(|| format!("stale candidate at height {}", candidate.height)))
    }

    async fn mark_stale_candidate_notified(
        &self,
        network: Network,
        height: u64,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self
            .db
            .collection::<StaleCandidateCollection>()
            .set_notified(network, height, at)
            .await?)
    }

    async fn stale_candidates(&self, network: Network) -> Result<Vec<StaleCandidate>, StoreError> {
        Ok(self
            .db
            .collection::<StaleCandidateCollection>()
            .get_candidates(network)
            .await?)
    }
}
