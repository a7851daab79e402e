// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{Store, StoreError};
use crate::model::{
    Block, BlockHash, InflationSnapshot, InvalidTipRecord, LagRecord, LightningTransaction, Network, Peer, PeerId,
    SoftforkStatus, StaleCandidate, VersionBitAlert,
};

#[derive(Default)]
struct State {
    blocks: HashMap<BlockHash, Block>,
    peers: BTreeMap<PeerId, Peer>,
    invalid_tips: Vec<InvalidTipRecord>,
    lags: BTreeMap<(PeerId, PeerId), LagRecord>,
    version_bits: Vec<VersionBitAlert>,
    softforks: BTreeMap<(PeerId, String), SoftforkStatus>,
    snapshots: HashMap<BlockHash, InflationSnapshot>,
    lightning: BTreeMap<String, LightningTransaction>,
    stale_candidates: BTreeMap<(Network, u64), StaleCandidate>,
}

impl State {
    fn open_invalid_tip_mut(&mut self, peer: PeerId, block: &BlockHash) -> Option<&mut InvalidTipRecord> {
        self.invalid_tips
            .iter_mut()
            .find(|r| r.peer == peer && &r.block == block && r.is_open())
    }

    fn open_alert_mut(&mut self, network: Network, bit: u8) -> Option<&mut VersionBitAlert> {
        self.version_bits
            .iter_mut()
            .find(|a| a.network == network && a.bit == bit && a.is_open())
    }
}

/// Keeps everything in process memory. Used for trial runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn transition(slot: &mut Option<OffsetDateTime>, at: OffsetDateTime) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(at);
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn block(&self, hash: &BlockHash) -> Result<Option<Block>, StoreError> {
        Ok(self.state.read().await.blocks.get(hash).cloned())
    }

    async fn insert_block(&self, block: &Block) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.blocks.contains_key(&block.hash) {
            return Err(StoreError::Duplicate(format!("block {}", block.hash)));
        }
        state.blocks.insert(block.hash.clone(), block.clone());
        Ok(())
    }

    async fn attach_parent(&self, child: &BlockHash, parent: &BlockHash) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let block = state
            .blocks
            .get_mut(child)
            .ok_or_else(|| StoreError::NotFound(format!("block {child}")))?;
        if block.parent.is_some() {
            return Ok(false);
        }
        block.parent = Some(parent.clone());
        Ok(true)
    }

    async fn mark_lightning_checked(&self, hash: &BlockHash) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let block = state
            .blocks
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(format!("block {hash}")))?;
        block.checked_lightning = true;
        Ok(())
    }

    async fn min_block_height(&self, network: Network) -> Result<Option<u64>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .blocks
            .values()
            .filter(|b| b.network == network)
            .map(|b| b.height)
            .min())
    }

    async fn blocks_between(&self, network: Network, from: u64, to: u64) -> Result<Vec<Block>, StoreError> {
        let mut blocks = self
            .state
            .read()
            .await
            .blocks
            .values()
            .filter(|b| b.network == network && (from..=to).contains(&b.height))
            .cloned()
            .collect::<Vec<_>>();
        blocks.sort_by(|a, b| (a.height, &a.hash).cmp(&(b.height, &b.hash)));
        Ok(blocks)
    }

    async fn set_block_pool(&self, hash: &BlockHash, pool: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let block = state
            .blocks
            .get_mut(hash)
            .ok_or_else(|| StoreError::NotFound(format!("block {hash}")))?;
        block.pool = Some(pool.to_owned());
        Ok(())
    }

    async fn peers(&self) -> Result<Vec<Peer>, StoreError> {
        Ok(self.state.read().await.peers.values().cloned().collect())
    }

    async fn peer(&self, id: PeerId) -> Result<Option<Peer>, StoreError> {
        Ok(self.state.read().await.peers.get(&id).cloned())
    }

    async fn upsert_peer(&self, peer: &Peer) -> Result<(), StoreError> {
        self.state.write().await.peers.insert(peer.id, peer.clone());
        Ok(())
    }

    async fn invalid_tip(&self, peer: PeerId, block: &BlockHash) -> Result<Option<InvalidTipRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .invalid_tips
            .iter()
            .filter(|r| r.peer == peer && &r.block == block)
            .max_by_key(|r| (r.is_open(), r.created_at))
            .cloned())
    }

    async fn insert_invalid_tip(&self, record: &InvalidTipRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.open_invalid_tip_mut(record.peer, &record.block).is_some() {
            return Err(StoreError::Duplicate(format!(
                "invalid tip {} of peer {}",
                record.block, record.peer
            )));
        }
        state.invalid_tips.push(record.clone());
        Ok(())
    }

    async fn mark_invalid_tip_notified(
        &self,
        peer: PeerId,
        block: &BlockHash,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .open_invalid_tip_mut(peer, block)
            .map_or(false, |r| transition(&mut r.notified_at, at)))
    }

    async fn dismiss_invalid_tip(
        &self,
        peer: PeerId,
        block: &BlockHash,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .open_invalid_tip_mut(peer, block)
            .map_or(false, |r| transition(&mut r.dismissed_at, at)))
    }

    async fn invalid_tips(&self) -> Result<Vec<InvalidTipRecord>, StoreError> {
        Ok(self.state.read().await.invalid_tips.clone())
    }

    async fn lag(&self, peer: PeerId, reference: PeerId) -> Result<Option<LagRecord>, StoreError> {
        Ok(self.state.read().await.lags.get(&(peer, reference)).cloned())
    }

    async fn insert_lag(&self, record: &LagRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let key = (record.peer, record.reference);
        if state.lags.contains_key(&key) {
            return Err(StoreError::Duplicate(format!(
                "lag of peer {} behind {}",
                record.peer, record.reference
            )));
        }
        state.lags.insert(key, record.clone());
        Ok(())
    }

    async fn mark_lag_notified(&self, peer: PeerId, reference: PeerId, at: OffsetDateTime) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .lags
            .get_mut(&(peer, reference))
            .map_or(false, |r| transition(&mut r.notified_at, at)))
    }

    async fn delete_lag(&self, peer: PeerId, reference: PeerId) -> Result<(), StoreError> {
        self.state.write().await.lags.remove(&(peer, reference));
        Ok(())
    }

    async fn lags(&self) -> Result<Vec<LagRecord>, StoreError> {
        Ok(self.state.read().await.lags.values().cloned().collect())
    }

    async fn open_version_bit_alert(&self, network: Network, bit: u8) -> Result<Option<VersionBitAlert>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .version_bits
            .iter()
            .find(|a| a.network == network && a.bit == bit && a.is_open())
            .cloned())
    }

    async fn insert_version_bit_alert(&self, alert: &VersionBitAlert) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.open_alert_mut(alert.network, alert.bit).is_some() {
            return Err(StoreError::Duplicate(format!("open alert for bit {}", alert.bit)));
        }
        state.version_bits.push(alert.clone());
        Ok(())
    }

    async fn close_version_bit_alert(
        &self,
        network: Network,
        bit: u8,
        deactivation: &BlockHash,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(match state.open_alert_mut(network, bit) {
            Some(alert) => {
                alert.deactivation = Some(deactivation.clone());
                true
            }
            None => false,
        })
    }

    async fn mark_version_bit_notified(
        &self,
        network: Network,
        bit: u8,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .open_alert_mut(network, bit)
            .map_or(false, |a| transition(&mut a.notified_at, at)))
    }

    async fn version_bit_alerts(&self, network: Network) -> Result<Vec<VersionBitAlert>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .version_bits
            .iter()
            .filter(|a| a.network == network)
            .cloned()
            .collect())
    }

    async fn softfork(&self, peer: PeerId, name: &str) -> Result<Option<SoftforkStatus>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .softforks
            .get(&(peer, name.to_owned()))
            .cloned())
    }

    async fn upsert_softfork(&self, status: &SoftforkStatus) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .softforks
            .insert((status.peer, status.name.clone()), status.clone());
        Ok(())
    }

    async fn softforks(&self) -> Result<Vec<SoftforkStatus>, StoreError> {
        Ok(self.state.read().await.softforks.values().cloned().collect())
    }

    async fn utxo_snapshot(&self, block: &BlockHash) -> Result<Option<InflationSnapshot>, StoreError> {
        Ok(self.state.read().await.snapshots.get(block).cloned())
    }

    async fn insert_utxo_snapshot(&self, snapshot: &InflationSnapshot) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.snapshots.contains_key(&snapshot.block) {
            return Err(StoreError::Duplicate(format!("snapshot at {}", snapshot.block)));
        }
        state.snapshots.insert(snapshot.block.clone(), snapshot.clone());
        Ok(())
    }

    async fn mark_snapshot_notified(&self, block: &BlockHash, at: OffsetDateTime) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .snapshots
            .get_mut(block)
            .map_or(false, |s| transition(&mut s.notified_at, at)))
    }

    async fn insert_lightning_transaction(&self, transaction: &LightningTransaction) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .lightning
            .entry(transaction.txid.clone())
            .or_insert_with(|| transaction.clone());
        Ok(())
    }

    async fn lightning_transactions(&self, network: Network) -> Result<Vec<LightningTransaction>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .lightning
            .values()
            .filter(|t| t.network == network)
            .cloned()
            .collect())
    }

    async fn stale_candidate(&self, network: Network, height: u64) -> Result<Option<StaleCandidate>, StoreError> {
        Ok(self.state.read().await.stale_candidates.get(&(network, height)).cloned())
    }

    async fn insert_stale_candidate(&self, candidate: &StaleCandidate) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let key = (candidate.network, candidate.height);
        if state.stale_candidates.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("stale candidate at height {}", candidate.height)));
        }
        state.stale_candidates.insert(key, candidate.clone());
        Ok(())
    }

    async fn mark_stale_candidate_notified(
        &self,
        network: Network,
        height: u64,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .stale_candidates
            .get_mut(&(network, height))
            .map_or(false, |c| transition(&mut c.notified_at, at)))
    }

    async fn stale_candidates(&self, network: Network) -> Result<Vec<StaleCandidate>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .stale_candidates
            .values()
            .filter(|c| c.network == network)
            .cloned()
            .collect())
    }
}
