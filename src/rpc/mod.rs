// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Access to the control port of a monitored node.

mod client;
mod error;
mod http;
pub mod responses;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

pub use self::{
    client::{HeaderClient, LegacyClient, PeerClient},
    error::RpcError,
    http::HttpRpc,
};
use self::responses::{BlockHeaderInfo, BlockchainInfo, ChainTip, NetworkInfo, TxOutSetInfo, Verbosity};
use crate::model::{BlockHash, Peer};

/// The raw operations of a node. Calls never retry.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn network_info(&self) -> Result<NetworkInfo, RpcError>;

    async fn blockchain_info(&self) -> Result<BlockchainInfo, RpcError>;

    async fn best_block_hash(&self) -> Result<BlockHash, RpcError>;

    async fn chain_tips(&self) -> Result<Vec<ChainTip>, RpcError>;

    /// Only answered from version 0.12 onwards, see [`PeerClient`].
    async fn block_header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError>;

    async fn raw_block(&self, hash: &BlockHash, verbosity: Verbosity) -> Result<serde_json::Value, RpcError>;

    async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError>;

    async fn utxo_set_summary(&self) -> Result<TxOutSetInfo, RpcError>;

    async fn invalidate_block(&self, hash: &BlockHash) -> Result<(), RpcError>;

    async fn reconsider_block(&self, hash: &BlockHash) -> Result<(), RpcError>;

    async fn set_network_active(&self, active: bool) -> Result<(), RpcError>;
}

/// Opens connections to peers.
pub trait RpcConnector: Send + Sync {
    fn connect(&self, peer: &Peer) -> Result<Arc<dyn NodeRpc>, RpcError>;
}

/// Connects over HTTP using the endpoint stored with each peer.
#[derive(Copy, Clone, Debug)]
pub struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl RpcConnector for HttpConnector {
    fn connect(&self, peer: &Peer) -> Result<Arc<dyn NodeRpc>, RpcError> {
        Ok(Arc::new(HttpRpc::new(&peer.rpc, self.timeout)?))
    }
}
