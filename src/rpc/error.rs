// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub(crate) const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
pub(crate) const RPC_METHOD_NOT_FOUND: i64 = -32601;

/// The failure modes of a call to a peer.
#[derive(Clone, Debug, Error)]
pub enum RpcError {
    /// The peer did not answer in time, refused the connection or rejected the credentials.
    #[error("peer unreachable: {0}")]
    Connection(String),
    #[error("method `{0}` is not supported by the peer")]
    MethodUnsupported(String),
    #[error("data pruned by the peer: {0}")]
    DataPruned(String),
    #[error("block not found: {0}")]
    BlockNotFound(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response to `{method}`: {message}")]
    Decode { method: String, message: String },
}

impl RpcError {
    /// Classifies an error object returned by the node.
    pub fn from_node(method: &str, code: i64, message: String) -> Self {
        if code == RPC_METHOD_NOT_FOUND {
            Self::MethodUnsupported(method.to_owned())
        } else if message.to_ascii_lowercase().contains("pruned") {
            Self::DataPruned(message)
        } else if code == RPC_INVALID_ADDRESS_OR_KEY {
            Self::BlockNotFound(message)
        } else {
            Self::Rpc { code, message }
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Whether a full block fetch may still answer where a header fetch failed.
    pub fn allows_block_fallback(&self) -> bool {
        matches!(self, Self::DataPruned(_) | Self::MethodUnsupported(_))
    }
}
