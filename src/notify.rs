// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! The boundary to the notification delivery subsystem.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::model::{
    Block, InflationSnapshot, InvalidTipRecord, LagRecord, Peer, SoftforkStatus, StaleCandidate, VersionBitAlert,
};

#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// An alert, carrying everything needed to render it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    InvalidTip {
        peer: Peer,
        block: Block,
        record: InvalidTipRecord,
    },
    Lag {
        peer: Peer,
        reference: Peer,
        record: LagRecord,
        /// Height difference between the two best blocks.
        blocks_behind: i64,
    },
    VersionBit {
        alert: VersionBitAlert,
        block: Block,
    },
    Softfork {
        peer: Peer,
        status: SoftforkStatus,
        previous: Option<String>,
    },
    Inflation {
        peer: Peer,
        snapshot: InflationSnapshot,
        baseline: InflationSnapshot,
        /// Summed subsidy of the blocks between baseline and snapshot, in satoshi.
        expected: u64,
    },
    StaleCandidate {
        candidate: StaleCandidate,
        /// The competing blocks, in hash order.
        blocks: Vec<Block>,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTip { peer, block, .. } => write!(
                f,
                "{} considers block {} at height {} invalid",
                peer.name_with_version(),
                block.hash,
                block.height
            ),
            Self::Lag {
                peer,
                reference,
                blocks_behind,
                ..
            } => write!(
                f,
                "{} is {} blocks behind {}",
                peer.name_with_version(),
                blocks_behind,
                reference.name_with_version()
            ),
            Self::VersionBit { alert, block } => write!(
                f,
                "bit {} was signaled by {} of the last {} blocks at height {}",
                alert.bit, alert.tally, alert.window, block.height
            ),
            Self::Softfork { peer, status, previous } => write!(
                f,
                "{} reports soft fork {} as {} (was {})",
                peer.name_with_version(),
                status.name,
                status.status,
                previous.as_deref().unwrap_or("unknown")
            ),
            Self::Inflation {
                peer,
                snapshot,
                expected,
                ..
            } => write!(
                f,
                "{} reports {} sat more supply than the expected {} sat at height {}",
                peer.name_with_version(),
                snapshot.excess.unwrap_or_default(),
                expected,
                snapshot.height
            ),
            Self::StaleCandidate { candidate, blocks } => {
                write!(f, "{} blocks compete at height {}", blocks.len(), candidate.height)
            }
        }
    }
}

/// Delivers alerts. Only called on the transition to notified, after the timestamp was stored.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Event) -> Result<(), NotifyError>;
}

/// Writes alerts to the log.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        warn!(target: "forkwatch::alert", "{event}");
        Ok(())
    }
}
