// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{BlockHash, Network};

/// The first node version that answers `getblockheader`.
pub const HEADER_RPC_MIN_VERSION: u32 = 120_000;

/// Identifies a monitored node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The control port of a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    pub url: String,
    pub user: String,
    pub password: String,
}

/// A monitored node and its last observed status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub name: String,
    pub network: Network,
    pub rpc: RpcEndpoint,
    /// The numeric client version, e.g. `170001` for 0.17.0.1.
    pub version: Option<u32>,
    pub peer_count: Option<u32>,
    pub initial_sync: bool,
    /// The peer's current best block. Only the poller writes this.
    pub best_block: Option<BlockHash>,
    #[serde(with = "time::serde::timestamp::option")]
    pub unreachable_since: Option<OffsetDateTime>,
    #[serde(with = "time::serde::timestamp::option")]
    pub lagging_since: Option<OffsetDateTime>,
    /// An administratively configured height whose block all peers are expected to share.
    pub common_height: Option<u64>,
    pub common_block: Option<BlockHash>,
}

impl Peer {
    /// Creates a peer with no observed status.
    pub fn new(id: PeerId, name: impl Into<String>, network: Network, rpc: RpcEndpoint) -> Self {
        Self {
            id,
            name: name.into(),
            network,
            rpc,
            version: None,
            peer_count: None,
            initial_sync: false,
            best_block: None,
            unreachable_since: None,
            lagging_since: None,
            common_height: None,
            common_block: None,
        }
    }

    /// Whether the peer answered its last poll.
    pub fn is_reachable(&self) -> bool {
        self.unreachable_since.is_none()
    }

    /// Whether the peer can be trusted as an authority on the chain.
    pub fn is_synced(&self) -> bool {
        self.is_reachable() && !self.initial_sync && self.best_block.is_some()
    }

    /// Whether the peer answers header-only queries.
    pub fn supports_headers(&self) -> bool {
        self.version.map_or(false, |v| v >= HEADER_RPC_MIN_VERSION)
    }

    /// Display name including the decoded client version, e.g. `Bitcoin Core 0.17.0.1`.
    pub fn name_with_version(&self) -> String {
        match self.version {
            Some(version) => format!("{} {}", self.name, format_version(version)),
            None => self.name.clone(),
        }
    }
}

/// Decodes `1000000 * major + 10000 * minor + 100 * revision + build`.
fn format_version(version: u32) -> String {
    let major = version / 1_000_000;
    let minor = (version / 10_000) % 100;
    let revision = (version / 100) % 100;
    let build = version % 100;
    let mut out = if major == 0 && minor >= 22 {
        // From 22.0 onwards the leading zero was dropped.
        format!("{minor}.{revision}")
    } else {
        format!("{major}.{minor}.{revision}")
    };
    if build > 0 {
        out.push_str(&format!(".{build}"));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn peer(version: Option<u32>) -> Peer {
        let mut peer = Peer::new(
            PeerId(1),
            "Bitcoin Core",
            Network::Btc,
            RpcEndpoint {
                url: "http://127.0.0.1:8332".into(),
                user: "user".into(),
                password: "password".into(),
            },
        );
        peer.version = version;
        peer
    }

    #[test]
    fn name_with_version() {
        assert_eq!(peer(Some(170_001)).name_with_version(), "Bitcoin Core 0.17.0.1");
        assert_eq!(peer(Some(100_000)).name_with_version(), "Bitcoin Core 0.10.0");
        assert_eq!(peer(Some(250_100)).name_with_version(), "Bitcoin Core 25.1");
        assert_eq!(peer(None).name_with_version(), "Bitcoin Core");
    }

    #[test]
    fn header_support() {
        assert!(!peer(None).supports_headers());
        assert!(!peer(Some(119_999)).supports_headers());
        assert!(peer(Some(120_000)).supports_headers());
    }
}
