// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module that contains the entities tracked by the monitor.

mod block;
mod network;
mod peer;
mod pool;
mod records;

pub use self::{
    block::{Block, BlockHash, ParseError, Work},
    network::{Network, HALVING_INTERVAL, INITIAL_SUBSIDY},
    peer::{Peer, PeerId, RpcEndpoint, HEADER_RPC_MIN_VERSION},
    pool::{pool_from_coinbase, pool_from_coinbase_tx},
    records::{
        InflationSnapshot, InvalidTipRecord, LagRecord, LightningKind, LightningTransaction, SoftforkStatus,
        StaleCandidate, VersionBitAlert,
    },
};
