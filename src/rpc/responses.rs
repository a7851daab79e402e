// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Typed answers of the node control port.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{BlockHash, Work};

/// Below this verification progress a peer without an explicit flag is considered to be syncing.
pub const SYNCED_VERIFICATION_PROGRESS: f64 = 0.99;

const SATOSHI_PER_COIN: f64 = 100_000_000.0;

/// The detail level of a `getblock` answer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Verbosity {
    /// Serialized block as hex.
    Raw = 0,
    /// Header fields and transaction ids.
    Summary = 1,
    /// Header fields and decoded transactions.
    Full = 2,
}

/// Answer of `getnetworkinfo`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub version: u32,
    #[serde(default)]
    pub subversion: String,
    #[serde(default)]
    pub connections: u32,
}

/// Answer of `getblockchaininfo`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockchainInfo {
    #[serde(default)]
    pub chain: String,
    pub blocks: u64,
    pub headers: Option<u64>,
    pub bestblockhash: BlockHash,
    pub chainwork: Option<Work>,
    pub verificationprogress: Option<f64>,
    pub initialblockdownload: Option<bool>,
    pub pruned: Option<bool>,
    pub softforks: Option<Softforks>,
    pub bip9_softforks: Option<BTreeMap<String, Bip9Info>>,
}

impl BlockchainInfo {
    /// Prefers the explicit flag, older peers only report the verification progress.
    pub fn in_initial_sync(&self) -> bool {
        match self.initialblockdownload {
            Some(flag) => flag,
            None => self.verificationprogress.unwrap_or(1.0) < SYNCED_VERIFICATION_PROGRESS,
        }
    }

    /// Flattens both the named `softforks` map and the legacy `bip9_softforks` map.
    pub fn softfork_reports(&self) -> Vec<SoftforkReport> {
        let mut reports = Vec::new();
        if let Some(Softforks::Named(forks)) = &self.softforks {
            for (name, info) in forks {
                let (status, bit, since) = match &info.bip9 {
                    Some(bip9) => (bip9.status.clone(), bip9.bit, bip9.since),
                    None => (
                        if info.active.unwrap_or(false) { "active" } else { "defined" }.to_owned(),
                        None,
                        info.height,
                    ),
                };
                reports.push(SoftforkReport {
                    name: name.clone(),
                    fork_type: info.fork_type.clone(),
                    status,
                    bit,
                    since,
                });
            }
        }
        if let Some(forks) = &self.bip9_softforks {
            for (name, info) in forks {
                reports.push(SoftforkReport {
                    name: name.clone(),
                    fork_type: "bip9".to_owned(),
                    status: info.status.clone(),
                    bit: info.bit,
                    since: info.since,
                });
            }
        }
        reports
    }
}

/// The `softforks` field changed from a list to a map keyed by deployment name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Softforks {
    Named(BTreeMap<String, SoftforkInfo>),
    Legacy(Vec<serde_json::Value>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftforkInfo {
    #[serde(rename = "type")]
    pub fork_type: String,
    pub active: Option<bool>,
    pub height: Option<u64>,
    pub bip9: Option<Bip9Info>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bip9Info {
    pub status: String,
    pub bit: Option<u8>,
    pub since: Option<u64>,
}

/// A deployment status as reported by one peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftforkReport {
    pub name: String,
    pub fork_type: String,
    pub status: String,
    pub bit: Option<u8>,
    pub since: Option<u64>,
}

/// The validation state of a chain tip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainTipStatus {
    Active,
    ValidFork,
    ValidHeaders,
    HeadersOnly,
    Invalid,
    #[serde(other)]
    Unknown,
}

/// An entry of `getchaintips`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u64,
    pub hash: BlockHash,
    #[serde(default)]
    pub branchlen: u64,
    pub status: ChainTipStatus,
}

/// The header fields shared by `getblockheader` and `getblock` with verbosity 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeaderInfo {
    pub hash: BlockHash,
    pub height: u64,
    pub version: Option<i32>,
    pub time: i64,
    pub mediantime: Option<i64>,
    pub chainwork: Work,
    pub previousblockhash: Option<BlockHash>,
}

/// Answer of `gettxoutsetinfo`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxOutSetInfo {
    pub height: u64,
    pub bestblock: BlockHash,
    pub txouts: u64,
    /// Total value in coins.
    pub total_amount: f64,
}

impl TxOutSetInfo {
    pub fn total_amount_sat(&self) -> u64 {
        to_satoshi(self.total_amount)
    }
}

/// A block with decoded transactions (`getblock` with verbosity 2).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FullBlock {
    pub hash: BlockHash,
    pub height: u64,
    #[serde(default)]
    pub tx: Vec<Transaction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    #[serde(default)]
    pub locktime: u32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
}

impl Transaction {
    /// Sum of all output values, in satoshi.
    pub fn output_value_sat(&self) -> u64 {
        self.vout.iter().map(|out| to_satoshi(out.value)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxIn {
    pub coinbase: Option<String>,
    pub txid: Option<String>,
    pub vout: Option<u32>,
    #[serde(default)]
    pub txinwitness: Vec<String>,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: f64,
    pub n: u32,
}

fn to_satoshi(coins: f64) -> u64 {
    (coins * SATOSHI_PER_COIN).round() as u64
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    const HASH: &str = "0000000000000000000a5b5e0fc4a4b1e6d7e1a0a7d7a0a1b3c4d5e6f7a8b9c0";

    fn info(softforks: serde_json::Value, bip9: serde_json::Value) -> BlockchainInfo {
        serde_json::from_value(json!({
            "chain": "main",
            "blocks": 600000,
            "headers": 600000,
            "bestblockhash": HASH,
            "chainwork": "000000000000000000000000000000000000000009dea7d1f1e0d7f8ee7d7b1a",
            "verificationprogress": 0.9999,
            "softforks": softforks,
            "bip9_softforks": bip9,
        }))
        .unwrap()
    }

    #[test]
    fn initial_sync_falls_back_to_progress() {
        let mut info = info(json!(null), json!(null));
        assert!(!info.in_initial_sync());
        info.verificationprogress = Some(0.5);
        assert!(info.in_initial_sync());
        info.initialblockdownload = Some(false);
        assert!(!info.in_initial_sync());
    }

    #[test]
    fn parses_named_softforks() {
        let info = info(
            json!({
                "bip34": { "type": "buried", "active": true, "height": 227931 },
                "taproot": { "type": "bip9", "active": false, "bip9": { "status": "started", "bit": 2, "since": 681408 } }
            }),
            json!(null),
        );
        let reports = info.softfork_reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].fork_type, "buried");
        assert_eq!(reports[1].name, "taproot");
        assert_eq!(reports[1].status, "started");
        assert_eq!(reports[1].bit, Some(2));
    }

    #[test]
    fn parses_legacy_softforks() {
        let info = info(
            json!([{ "id": "bip34", "version": 2, "reject": { "status": true } }]),
            json!({ "segwit": { "status": "defined", "startTime": 1479168000, "timeout": 1510704000, "since": 0 } }),
        );
        let reports = info.softfork_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "segwit");
        assert_eq!(reports[0].fork_type, "bip9");
        assert_eq!(reports[0].status, "defined");
    }

    #[test]
    fn unknown_tip_status() {
        let tip: ChainTip =
            serde_json::from_value(json!({ "height": 1, "hash": HASH, "branchlen": 0, "status": "conflicting" })).unwrap();
        assert_eq!(tip.status, ChainTipStatus::Unknown);
        let tip: ChainTip =
            serde_json::from_value(json!({ "height": 1, "hash": HASH, "branchlen": 2, "status": "valid-fork" })).unwrap();
        assert_eq!(tip.status, ChainTipStatus::ValidFork);
    }

    #[test]
    fn amounts_round_to_satoshi() {
        let set = TxOutSetInfo {
            height: 1,
            bestblock: HASH.parse().unwrap(),
            txouts: 1,
            total_amount: 1234.56789012,
        };
        assert_eq!(set.total_amount_sat(), 123_456_789_012);
    }
}
