// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::{
    responses::{BlockHeaderInfo, FullBlock, Verbosity},
    NodeRpc, RpcError,
};
use crate::model::{BlockHash, HEADER_RPC_MIN_VERSION};

/// A client for peers that answer `getblockheader`.
#[derive(Clone)]
pub struct HeaderClient {
    rpc: Arc<dyn NodeRpc>,
    version: u32,
}

impl HeaderClient {
    pub async fn block_header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        self.rpc.block_header(hash).await
    }
}

/// A client for peers that predate header queries and need full block fetches.
#[derive(Clone)]
pub struct LegacyClient {
    rpc: Arc<dyn NodeRpc>,
    version: Option<u32>,
}

/// A peer connection specialized to what the peer's software version supports.
#[derive(Clone)]
pub enum PeerClient {
    Headers(HeaderClient),
    Legacy(LegacyClient),
}

impl PeerClient {
    /// Selects the variant for the given client version. Unknown versions are treated as legacy.
    pub fn negotiate(rpc: Arc<dyn NodeRpc>, version: Option<u32>) -> Self {
        match version {
            Some(version) if version >= HEADER_RPC_MIN_VERSION => Self::Headers(HeaderClient { rpc, version }),
            version => Self::Legacy(LegacyClient { rpc, version }),
        }
    }

    /// The version the variant was negotiated for.
    pub fn version(&self) -> Option<u32> {
        match self {
            Self::Headers(client) => Some(client.version),
            Self::Legacy(client) => client.version,
        }
    }

    /// The connection, for the calls every variant answers. `getblockheader` goes through [`HeaderClient`] only.
    fn node(&self) -> &dyn NodeRpc {
        match self {
            Self::Headers(client) => client.rpc.as_ref(),
            Self::Legacy(client) => client.rpc.as_ref(),
        }
    }

    /// The hash of the block at `height` on the peer's active chain.
    pub async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError> {
        self.node().block_hash(height).await
    }

    pub async fn best_block_hash(&self) -> Result<BlockHash, RpcError> {
        self.node().best_block_hash().await
    }

    pub fn headers(&self) -> Option<&HeaderClient> {
        match self {
            Self::Headers(client) => Some(client),
            Self::Legacy(_) => None,
        }
    }

    /// Fetches the header of a block with the cheapest call the peer supports.
    pub async fn header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        match self {
            Self::Headers(client) => client.block_header(hash).await,
            Self::Legacy(_) => self.block_summary(hash).await,
        }
    }

    /// Fetches the header fields through `getblock`, which also answers for peers without `getblockheader`.
    pub async fn block_summary(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        self.block(hash, Verbosity::Summary, "getblock").await
    }

    /// Fetches a block body with decoded transactions.
    pub async fn full_block(&self, hash: &BlockHash) -> Result<FullBlock, RpcError> {
        self.block(hash, Verbosity::Full, "getblock").await
    }

    async fn block<T: DeserializeOwned>(
        &self,
        hash: &BlockHash,
        verbosity: Verbosity,
        method: &str,
    ) -> Result<T, RpcError> {
        let value = self.node().raw_block(hash, verbosity).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode {
            method: method.to_owned(),
            message: e.to_string(),
        })
    }
}
