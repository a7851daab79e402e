// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, str::FromStr};

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::{Network, PeerId};
use crate::rpc::responses::BlockHeaderInfo;

/// Errors that can occur when parsing hex-encoded chain values.
#[derive(Debug, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ParseError {
    #[error("invalid block hash `{0}`: expected 64 hex characters")]
    BlockHash(String),
    #[error("invalid chain work `{0}`")]
    Work(String),
}

/// The hash of a block, stored in its canonical lowercase hex encoding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BlockHash(String);

impl BlockHash {
    /// The length of the hex encoding.
    pub const LENGTH: usize = 64;

    /// Returns the hex encoding of the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BlockHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LENGTH || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::BlockHash(s.to_owned()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cumulative proof-of-work of a chain up to and including a block.
///
/// Serialized as fixed-width, 64 digit hex (the `chainwork` format of the node RPC), which also
/// makes the lexical order of stored values equal to their numeric order.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Work(pub U256);

impl Work {
    /// Returns `log2` of the work, for display purposes only.
    pub fn log2(&self) -> f64 {
        let bits = self.0.bits();
        if bits == 0 {
            return f64::NEG_INFINITY;
        }
        // Keep the 64 most significant bits so the mantissa stays precise.
        let shift = bits.saturating_sub(64);
        let top = (self.0 >> shift).low_u64() as f64;
        top.log2() + shift as f64
    }
}

impl From<u64> for Work {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl FromStr for Work {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim_start_matches("0x");
        if digits.is_empty() || digits.len() > 64 {
            return Err(ParseError::Work(s.to_owned()));
        }
        U256::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| ParseError::Work(s.to_owned()))
    }
}

impl fmt::Display for Work {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064x}", self.0)
    }
}

impl Serialize for Work {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Work {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A header-level record of an observed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockHash,
    pub network: Network,
    pub height: u64,
    /// The resolved parent. Once set it never changes.
    pub parent: Option<BlockHash>,
    /// The previous block hash announced by the header, `None` only for a genesis block.
    pub previous_hash: Option<BlockHash>,
    pub work: Work,
    /// Block time as a unix timestamp.
    pub timestamp: i64,
    pub median_time: Option<i64>,
    /// The version field. Legacy peers may omit it.
    pub version: Option<i32>,
    pub first_seen_by: Option<PeerId>,
    /// The mining pool identified from the coinbase, once the body was inspected.
    #[serde(default)]
    pub pool: Option<String>,
    /// Whether the lightning settlement scanner has processed the block body.
    pub checked_lightning: bool,
}

impl Block {
    /// Creates an unlinked block from a header reported by a peer.
    pub fn from_header(network: Network, header: BlockHeaderInfo, first_seen_by: Option<PeerId>) -> Self {
        Self {
            hash: header.hash,
            network,
            height: header.height,
            parent: None,
            previous_hash: header.previousblockhash,
            work: header.chainwork,
            timestamp: header.time,
            median_time: header.mediantime,
            version: header.version,
            first_seen_by,
            pool: None,
            checked_lightning: false,
        }
    }

    /// Display field: `log2` of the cumulative work.
    pub fn log2_work(&self) -> f64 {
        self.work.log2()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn block_hash_is_validated_and_lowercased() {
        let upper = "00000000000000000001A2B3C4D5E6F708090A0B0C0D0E0F1011121314151617";
        let hash = upper.parse::<BlockHash>().unwrap();
        assert_eq!(hash.as_str(), upper.to_ascii_lowercase());

        assert!("abc".parse::<BlockHash>().is_err());
        assert!("zz".repeat(32).parse::<BlockHash>().is_err());
    }

    #[test]
    fn work_compares_full_width() {
        let low: Work = "00000000000000000000000000000000000000000000000000000000ffffffff".parse().unwrap();
        let high: Work = "0000000000000000000000000000000000000001000000000000000000000000".parse().unwrap();
        assert!(low < high);
        assert_eq!(high.to_string().len(), 64);
        assert_eq!(high.to_string().parse::<Work>().unwrap(), high);
    }

    #[test]
    fn log2_of_work() {
        let one: Work = "00000000000000000000000000000001".parse().unwrap();
        let two: Work = "00000000000000000000000000000002".parse().unwrap();
        assert_eq!(one.log2(), 0.0);
        assert_eq!(two.log2(), 1.0);
        let big = Work(U256::one() << 200);
        assert_eq!(big.log2(), 200.0);
    }

    #[test]
    fn work_serializes_as_fixed_width_hex() {
        let work = Work::from(255);
        let json = serde_json::to_string(&work).unwrap();
        assert_eq!(json, format!("\"{}ff\"", "0".repeat(62)));
        assert_eq!(serde_json::from_str::<Work>(&json).unwrap(), work);
    }
}
