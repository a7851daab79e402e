// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    model::{Block, BlockHash, Network, Peer, Work},
    rpc::{responses::BlockHeaderInfo, PeerClient, RpcError},
    store::{Store, StoreError},
};

#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ResolveError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("incomplete ancestry below block {hash} at height {height}: {source}")]
    IncompleteAncestry {
        hash: BlockHash,
        height: u64,
        source: RpcError,
    },
    #[error(
        "refusing parent {parent} (height {parent_height}, work {parent_work}) of block {child} (height {child_height}, work {child_work})"
    )]
    InvalidParent {
        child: BlockHash,
        child_height: u64,
        child_work: Work,
        parent: BlockHash,
        parent_height: u64,
        parent_work: Work,
    },
    #[error("block {0} is missing from the store")]
    MissingBlock(BlockHash),
}

impl ResolveError {
    /// Whether the peer stopped answering while resolving.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Rpc(e) | Self::IncompleteAncestry { source: e, .. } => e.is_connection(),
            _ => false,
        }
    }
}

/// Materializes peer-reported blocks and links them to their ancestors.
pub struct Resolver<'a> {
    store: &'a dyn Store,
    primary_network: Network,
    cutoff_height: u64,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn Store, primary_network: Network, cutoff_height: u64) -> Self {
        Self {
            store,
            primary_network,
            cutoff_height,
        }
    }

    /// Makes sure the block `hash` and its ancestors down to the floor height are in the store.
    #[instrument(skip_all, fields(peer = %peer.id, hash = %hash), err)]
    pub async fn resolve_tip(&self, peer: &Peer, client: &PeerClient, hash: &BlockHash) -> Result<Block, ResolveError> {
        let tip = self.find_or_create(peer, client, hash).await?;
        if tip.parent.is_some() {
            return Ok(tip);
        }
        let floor = self.floor(peer.network).await?;
        self.link_ancestors(peer, client, tip, floor).await?;
        self.store
            .block(hash)
            .await?
            .ok_or_else(|| ResolveError::MissingBlock(hash.clone()))
    }

    /// Resolves the block a peer has at `height`, without walking its ancestors.
    pub async fn resolve_height(&self, peer: &Peer, client: &PeerClient, height: u64) -> Result<Block, ResolveError> {
        let hash = client.block_hash(height).await?;
        self.find_or_create(peer, client, &hash).await
    }

    /// Walks the peer's best chain down to `until_height`, even through ancestors that are already linked.
    ///
    /// Returns the number of blocks visited.
    #[instrument(skip_all, fields(peer = %peer.id, until_height = until_height), err)]
    pub async fn backfill(&self, peer: &Peer, client: &PeerClient, until_height: u64) -> Result<u64, ResolveError> {
        let best = client.best_block_hash().await?;
        let mut current = self.find_or_create(peer, client, &best).await?;
        let mut visited = 1;
        while current.height > until_height {
            let parent = match &current.parent {
                Some(parent) => self
                    .store
                    .block(parent)
                    .await?
                    .ok_or_else(|| ResolveError::MissingBlock(parent.clone()))?,
                None => {
                    let Some(previous) = current.previous_hash.clone() else { break };
                    let parent = match self.store.block(&previous).await? {
                        Some(parent) => parent,
                        None => self.fetch_and_insert(peer, client, &previous).await?,
                    };
                    self.link(peer, &current, &parent).await?;
                    parent
                }
            };
            if visited % 1000 == 0 {
                debug!("backfilled down to height {}", parent.height);
            }
            visited += 1;
            current = parent;
        }
        Ok(visited)
    }

    /// The height below which no ancestors are fetched: the lowest stored height, but never below the
    /// historical cutoff.
    async fn floor(&self, network: Network) -> Result<u64, StoreError> {
        Ok(self
            .store
            .min_block_height(network)
            .await?
            .map_or(self.cutoff_height, |min| min.max(self.cutoff_height)))
    }

    async fn link_ancestors(&self, peer: &Peer, client: &PeerClient, tip: Block, floor: u64) -> Result<(), ResolveError> {
        let mut current = tip;
        while current.parent.is_none() && current.height > floor {
            let Some(previous) = current.previous_hash.clone() else { break };
            let (parent, known) = match self.store.block(&previous).await? {
                Some(parent) => (parent, true),
                None => match self.fetch_and_insert(peer, client, &previous).await {
                    Ok(parent) => (parent, false),
                    Err(ResolveError::Rpc(e)) if peer.network != self.primary_network => {
                        debug!("stopping ancestry walk at height {}: {e}", current.height);
                        return Ok(());
                    }
                    Err(ResolveError::Rpc(e)) => {
                        return Err(ResolveError::IncompleteAncestry {
                            hash: current.hash.clone(),
                            height: current.height,
                            source: e,
                        });
                    }
                    Err(e) => return Err(e),
                },
            };
            self.link(peer, &current, &parent).await?;
            if known && parent.parent.is_some() {
                break;
            }
            current = parent;
        }
        Ok(())
    }

    /// Attaches `parent` to `child` after checking that the link is consistent.
    async fn link(&self, peer: &Peer, child: &Block, parent: &Block) -> Result<(), ResolveError> {
        if parent.work >= child.work || parent.height + 1 != child.height {
            warn!("peer {} reported an inconsistent parent for block {}", peer.id, child.hash);
            return Err(ResolveError::InvalidParent {
                child: child.hash.clone(),
                child_height: child.height,
                child_work: child.work,
                parent: parent.hash.clone(),
                parent_height: parent.height,
                parent_work: parent.work,
            });
        }
        self.store.attach_parent(&child.hash, &parent.hash).await?;
        Ok(())
    }

    async fn find_or_create(&self, peer: &Peer, client: &PeerClient, hash: &BlockHash) -> Result<Block, ResolveError> {
        match self.store.block(hash).await? {
            Some(block) => Ok(block),
            None => self.fetch_and_insert(peer, client, hash).await,
        }
    }

    /// Fetches a header and creates the block. A concurrent insert of the same block is reloaded.
    async fn fetch_and_insert(&self, peer: &Peer, client: &PeerClient, hash: &BlockHash) -> Result<Block, ResolveError> {
        let header = self.fetch_header(peer, client, hash).await?;
        let block = Block::from_header(peer.network, header, Some(peer.id));
        match self.store.insert_block(&block).await {
            Ok(()) => Ok(block),
            Err(e) if e.is_duplicate() => self
                .store
                .block(hash)
                .await?
                .ok_or_else(|| ResolveError::MissingBlock(hash.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_header(&self, peer: &Peer, client: &PeerClient, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        match client.header(hash).await {
            Err(e) if e.allows_block_fallback() && client.headers().is_some() && peer.network == self.primary_network => {
                debug!("header of {hash} unavailable ({e}), retrying with a block fetch");
                client.block_summary(hash).await
            }
            res => res,
        }
    }
}
