// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Refreshes the status of one peer at a time and performs the RPC work of the detectors.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use crate::{
    chain::{ChainConfig, ResolveError, Resolver},
    model::{Block, BlockHash, Network, Peer, PeerId, RpcEndpoint},
    rpc::{
        responses::{BlockchainInfo, ChainTip, ChainTipStatus, FullBlock, TxOutSetInfo},
        NodeRpc, PeerClient, RpcConnector, RpcError,
    },
    store::{Store, StoreError},
};

#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum PollError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl PollError {
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Rpc(e) => e.is_connection(),
            Self::Resolve(e) => e.is_connection(),
            Self::Store(_) => false,
        }
    }
}

struct Connection {
    endpoint: RpcEndpoint,
    rpc: Arc<dyn NodeRpc>,
    client: Option<PeerClient>,
}

/// Polls peers and keeps one negotiated connection per peer.
pub struct Poller {
    store: Arc<dyn Store>,
    connector: Arc<dyn RpcConnector>,
    primary_network: Network,
    chain: ChainConfig,
    connections: HashMap<PeerId, Connection>,
}

impl Poller {
    pub fn new(
        store: Arc<dyn Store>,
        connector: Arc<dyn RpcConnector>,
        primary_network: Network,
        chain: ChainConfig,
    ) -> Self {
        Self {
            store,
            connector,
            primary_network,
            chain,
            connections: HashMap::new(),
        }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.store.as_ref(), self.primary_network, self.chain.cutoff_height)
    }

    /// Refreshes the status of `peer` and resolves its best block.
    ///
    /// Returns `None` if the peer did not answer, in which case it is marked unreachable.
    #[instrument(skip_all, fields(peer = %peer.id), err)]
    pub async fn poll(&mut self, peer: &mut Peer, now: OffsetDateTime) -> Result<Option<BlockchainInfo>, PollError> {
        let rpc = self.rpc(peer)?;
        let network_info = match rpc.network_info().await {
            Err(e) if e.is_connection() => return self.mark_unreachable(peer, e, now).await,
            res => res?,
        };
        let info = match rpc.blockchain_info().await {
            Err(e) if e.is_connection() => return self.mark_unreachable(peer, e, now).await,
            res => res?,
        };

        if peer.unreachable_since.take().is_some() {
            info!("peer {} is reachable again", peer.id);
        }
        peer.version = Some(network_info.version);
        peer.peer_count = Some(network_info.connections);
        peer.initial_sync = info.in_initial_sync();

        let client = self.client(peer)?;
        let res = self.resolve(peer, &client, &info).await;
        self.store.upsert_peer(peer).await?;
        match res {
            Err(e) if e.is_connection() => self.mark_unreachable(peer, e, now).await,
            Err(e) => Err(e),
            Ok(()) => Ok(Some(info)),
        }
    }

    async fn resolve(&self, peer: &mut Peer, client: &PeerClient, info: &BlockchainInfo) -> Result<(), PollError> {
        if peer.initial_sync {
            debug!("peer {} is in initial sync at height {}", peer.id, info.blocks);
            peer.best_block = None;
            return Ok(());
        }
        let tip = self.resolver().resolve_tip(peer, client, &info.bestblockhash).await?;
        peer.best_block = Some(tip.hash);

        if let Some(height) = peer.common_height.filter(|_| peer.common_block.is_none()) {
            let block = self.resolver().resolve_height(peer, client, height).await?;
            debug!("peer {} has block {} at common height {height}", peer.id, block.hash);
            peer.common_block = Some(block.hash);
        }
        Ok(())
    }

    async fn mark_unreachable<T>(
        &mut self,
        peer: &mut Peer,
        error: impl Into<PollError>,
        now: OffsetDateTime,
    ) -> Result<Option<T>, PollError> {
        let error = error.into();
        if peer.unreachable_since.is_none() {
            warn!("peer {} is unreachable: {error}", peer.id);
            peer.unreachable_since = Some(now);
        } else {
            debug!("peer {} is still unreachable: {error}", peer.id);
        }
        self.store.upsert_peer(peer).await?;
        Ok(None)
    }

    pub async fn chain_tips(&mut self, peer: &Peer) -> Result<Vec<ChainTip>, PollError> {
        Ok(self.rpc(peer)?.chain_tips().await?)
    }

    /// Resolves the `valid-fork` tips within `horizon` blocks of the active tip.
    ///
    /// Returns the number of tips resolved. Tips that fail to resolve are skipped.
    #[instrument(skip_all, fields(peer = %peer.id), err)]
    pub async fn resolve_fork_tips(&mut self, peer: &Peer, tips: &[ChainTip], horizon: u64) -> Result<usize, PollError> {
        let Some(active) = tips.iter().find(|t| t.status == ChainTipStatus::Active) else {
            return Ok(0);
        };
        let client = self.client(peer)?;
        let mut resolved = 0;
        for tip in tips
            .iter()
            .filter(|t| t.status == ChainTipStatus::ValidFork && t.height + horizon >= active.height)
        {
            match self.resolver().resolve_tip(peer, &client, &tip.hash).await {
                Ok(_) => resolved += 1,
                Err(e) if e.is_connection() => return Err(e.into()),
                Err(e) => warn!("skipping fork tip {} at height {}: {e}", tip.hash, tip.height),
            }
        }
        Ok(resolved)
    }

    pub async fn utxo_snapshot(&mut self, peer: &Peer) -> Result<TxOutSetInfo, PollError> {
        Ok(self.rpc(peer)?.utxo_set_summary().await?)
    }

    /// Stores the block `hash` that `peer` reported, linked to its ancestors.
    pub async fn resolve_block(&mut self, peer: &Peer, hash: &BlockHash) -> Result<Block, PollError> {
        let client = self.client(peer)?;
        Ok(self.resolver().resolve_tip(peer, &client, hash).await?)
    }

    /// Fetches a block body. Returns `None` if the peer no longer has it.
    pub async fn full_block(&mut self, peer: &Peer, hash: &BlockHash) -> Result<Option<FullBlock>, PollError> {
        match self.client(peer)?.full_block(hash).await {
            Ok(block) => Ok(Some(block)),
            Err(RpcError::DataPruned(_) | RpcError::BlockNotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Walks the best chain of `peer` down to `until_height`, linking every block on the way.
    pub async fn backfill(&mut self, peer: &mut Peer, until_height: u64) -> Result<u64, PollError> {
        let network_info = self.rpc(peer)?.network_info().await?;
        peer.version = Some(network_info.version);
        let client = self.client(peer)?;
        let visited = self.resolver().backfill(peer, &client, until_height).await?;
        info!("backfilled {visited} blocks of peer {}", peer.id);
        Ok(visited)
    }

    /// The connection to `peer`, reopened whenever its endpoint changes.
    fn rpc(&mut self, peer: &Peer) -> Result<Arc<dyn NodeRpc>, RpcError> {
        if let Some(connection) = self.connections.get(&peer.id) {
            if connection.endpoint == peer.rpc {
                return Ok(connection.rpc.clone());
            }
        }
        let rpc = self.connector.connect(peer)?;
        self.connections.insert(
            peer.id,
            Connection {
                endpoint: peer.rpc.clone(),
                rpc: rpc.clone(),
                client: None,
            },
        );
        Ok(rpc)
    }

    /// The client negotiated for the last known version of `peer`.
    fn client(&mut self, peer: &Peer) -> Result<PeerClient, RpcError> {
        let rpc = self.rpc(peer)?;
        let connection = self
            .connections
            .get_mut(&peer.id)
            .ok_or_else(|| RpcError::Connection(format!("no connection to peer {}", peer.id)))?;
        match &connection.client {
            Some(client) if client.version() == peer.version => Ok(client.clone()),
            _ => {
                let client = PeerClient::negotiate(rpc, peer.version);
                connection.client = Some(client.clone());
                Ok(client)
            }
        }
    }
}
