// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

/// Module containing the block collection.
mod block;
/// Module containing the UTXO snapshot collection.
mod inflation;
/// Module containing the invalid tip collection.
mod invalid_tip;
/// Module containing the lag collection.
mod lag;
/// Module containing the lightning transaction collection.
mod lightning;
/// Module containing the peer collection.
mod peer;
/// Module containing the soft fork status collection.
mod softfork;
/// Module containing the stale candidate collection.
mod stale_candidate;
/// Module containing the version bit collection.
mod version_bit;

pub use self::{
    block::{BlockCollection, BlockDocument},
    inflation::{SnapshotCollection, SnapshotDocument},
    invalid_tip::{InvalidTipCollection, InvalidTipDocument},
    lag::LagCollection,
    lightning::{LightningCollection, LightningDocument},
    peer::{PeerCollection, PeerDocument},
    softfork::SoftforkCollection,
    stale_candidate::StaleCandidateCollection,
    version_bit::{VersionBitCollection, VersionBitDocument},
};
