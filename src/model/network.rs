// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

/// The initial block subsidy in satoshi.
pub const INITIAL_SUBSIDY: u64 = 50 * 100_000_000;
/// The number of blocks between subsidy halvings.
pub const HALVING_INTERVAL: u64 = 210_000;

/// A network monitored by the fleet.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Btc,
    Tbtc,
    Bch,
    Bsv,
}

impl Network {
    /// Returns the lowercase identifier used in storage and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Btc => "btc",
            Self::Tbtc => "tbtc",
            Self::Bch => "bch",
            Self::Bsv => "bsv",
        }
    }

    /// The expected coinbase subsidy of a block at `height`, in satoshi.
    pub fn block_subsidy(&self, height: u64) -> u64 {
        let halvings = height / HALVING_INTERVAL;
        if halvings >= 64 {
            0
        } else {
            INITIAL_SUBSIDY >> halvings
        }
    }

    /// The summed subsidy of all blocks in `(from, to]`.
    pub fn subsidy_between(&self, from: u64, to: u64) -> u64 {
        (from.saturating_add(1)..=to).map(|h| self.block_subsidy(h)).sum()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
