// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{BlockHash, Network, PeerId};

/// A block in the store that a peer reported as part of an invalid chain tip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidTipRecord {
    pub peer: PeerId,
    pub block: BlockHash,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp::option")]
    pub notified_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::timestamp::option")]
    pub dismissed_at: Option<OffsetDateTime>,
}

impl InvalidTipRecord {
    pub fn new(peer: PeerId, block: BlockHash, now: OffsetDateTime) -> Self {
        Self {
            peer,
            block,
            created_at: now,
            notified_at: None,
            dismissed_at: None,
        }
    }

    /// Whether an operator has not yet dismissed the record.
    pub fn is_open(&self) -> bool {
        self.dismissed_at.is_none()
    }
}

/// Live marker of a peer whose cumulative work is behind the reference peer's.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagRecord {
    pub peer: PeerId,
    pub reference: PeerId,
    /// Anchor of the grace period.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp::option")]
    pub notified_at: Option<OffsetDateTime>,
}

/// A version bit that reached the signaling threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBitAlert {
    pub network: Network,
    pub bit: u8,
    pub activation: BlockHash,
    pub activation_height: u64,
    pub deactivation: Option<BlockHash>,
    /// The number of signaling blocks in the window that opened the alert.
    pub tally: u32,
    pub window: u32,
    #[serde(with = "time::serde::timestamp::option")]
    pub notified_at: Option<OffsetDateTime>,
}

impl VersionBitAlert {
    /// Whether the bit has not yet been seen dropping back to zero.
    pub fn is_open(&self) -> bool {
        self.deactivation.is_none()
    }
}

/// The last observed deployment status of a named soft fork on one peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftforkStatus {
    pub peer: PeerId,
    pub network: Network,
    pub name: String,
    /// `bip9`, `bip8` or `buried`, when reported.
    pub fork_type: Option<String>,
    pub status: String,
    pub bit: Option<u8>,
    /// Height at which the current status took effect, when reported.
    pub since: Option<u64>,
    #[serde(with = "time::serde::timestamp::option")]
    pub notified_at: Option<OffsetDateTime>,
}

/// A UTXO set total measured at a specific block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflationSnapshot {
    pub block: BlockHash,
    pub network: Network,
    pub height: u64,
    pub peer: PeerId,
    /// Total value of all unspent outputs, in satoshi.
    pub total_amount: u64,
    pub txouts: u64,
    /// Supply growth beyond the expected subsidy, in satoshi.
    pub excess: Option<u64>,
    #[serde(with = "time::serde::timestamp::option")]
    pub notified_at: Option<OffsetDateTime>,
}

/// The settlement pattern a lightning transaction matched.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightningKind {
    /// Revocation path spend of a `to_local` output.
    Penalty,
    /// Delayed path spend of a `to_local` output.
    Sweep,
    /// A unilaterally broadcast commitment transaction.
    ForceClose,
}

/// A payment channel settlement found in a block body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningTransaction {
    pub txid: String,
    pub block: BlockHash,
    pub network: Network,
    pub kind: LightningKind,
    /// Total value of the transaction outputs, in satoshi.
    pub amount: u64,
}

/// A height of the chain with more than one stored block, where all but one will go stale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleCandidate {
    pub network: Network,
    pub height: u64,
    /// The competing blocks, in hash order.
    pub blocks: Vec<BlockHash>,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp::option")]
    pub notified_at: Option<OffsetDateTime>,
}
