// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use forkwatch::{
    chain::ChainConfig,
    db::{MongoDb, MongoDbConfig},
    model::{Block, BlockHash, Network, Peer, PeerId, RpcEndpoint, Work},
    notify::{Event, Notifier, NotifyError},
    rpc::{
        responses::{
            BlockHeaderInfo, BlockchainInfo, ChainTip, ChainTipStatus, FullBlock, NetworkInfo, Softforks,
            Transaction, TxIn, TxOutSetInfo, Verbosity,
        },
        NodeRpc, RpcConnector, RpcError,
    },
    store::Store,
};
use thiserror::Error;
use time::OffsetDateTime;

/// A version that answers `getblockheader`.
pub const MODERN_VERSION: u32 = 250_000;
/// A version that predates `getblockheader`.
pub const LEGACY_VERSION: u32 = 110_200;
/// The version field of blocks that signal nothing.
pub const BASE_VERSION: i32 = 0x2000_0000;

/// Ancestry is never cut off in tests.
pub const TEST_CHAIN: ChainConfig = ChainConfig { cutoff_height: 0 };

/// A fixed point in time, offset by `seconds`.
pub fn at(seconds: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_700_000_000 + seconds).unwrap()
}

/// Coinbase script of a block mined by Antpool.
pub const ANTPOOL_COINBASE: &str = "0375e8081b4d696e656420627920416e74506f6f6c34381d00330020c85d207ffabe6d6d2bcb43e33b12c011f5e99afe1b4478d1001b7ce90db6b7c937793e89fafae6dd040000000000000052000000eb0b0200";
/// Coinbase script of a block mined by F2Pool.
pub const F2POOL_COINBASE: &str = "039de8082cfabe6d6db6e2235d03234641c5859b7b1864addea7c0c2ef07a68bb8ebc178ac804f4b6910000000f09f909f000f4d696e656420627920776c3337373100000000000000000000000000000000000000000000000000000000050024c5aa2a";

pub fn coinbase_tx(coinbase: &str) -> Transaction {
    Transaction {
        txid: "cc".repeat(32),
        locktime: 0,
        vin: vec![TxIn {
            coinbase: Some(coinbase.to_string()),
            txid: None,
            vout: None,
            txinwitness: Vec::new(),
            sequence: 0xffff_ffff,
        }],
        vout: Vec::new(),
    }
}

/// Hash of the block at `height` on `branch`. Branch 0 is the main chain.
pub fn hash(branch: u64, height: u64) -> BlockHash {
    format!("{branch:032x}{height:032x}").parse().unwrap()
}

pub fn work(height: u64) -> Work {
    Work::from((height + 1) * 2)
}

/// Builds the headers `start..=end` of `branch`. The first one links to `start - 1` on `parent_branch`.
pub fn build_chain(branch: u64, parent_branch: u64, start: u64, end: u64) -> Vec<BlockHeaderInfo> {
    (start..=end)
        .map(|height| BlockHeaderInfo {
            hash: hash(branch, height),
            height,
            version: Some(BASE_VERSION),
            time: 1_500_000_000 + height as i64 * 600,
            mediantime: Some(1_500_000_000 + height as i64 * 600 - 3000),
            chainwork: work(height),
            previousblockhash: match height {
                0 => None,
                h if h == start => Some(hash(parent_branch, h - 1)),
                h => Some(hash(branch, h - 1)),
            },
        })
        .collect()
}

/// The main chain `0..=end`.
pub fn main_chain(end: u64) -> Vec<BlockHeaderInfo> {
    build_chain(0, 0, 0, end)
}

/// Stores the headers as blocks, linking each one to its previous block when that is stored.
pub async fn store_chain(store: &dyn Store, network: Network, headers: &[BlockHeaderInfo]) {
    for header in headers {
        store
            .insert_block(&Block::from_header(network, header.clone(), None))
            .await
            .unwrap();
        if let Some(previous) = &header.previousblockhash {
            if store.block(previous).await.unwrap().is_some() {
                store.attach_parent(&header.hash, previous).await.unwrap();
            }
        }
    }
}

/// A synced peer whose best block is `best`.
pub fn synced_peer(id: u64, best: BlockHash) -> Peer {
    let mut peer = peer(id, Network::Btc);
    peer.version = Some(MODERN_VERSION);
    peer.peer_count = Some(8);
    peer.best_block = Some(best);
    peer
}

pub fn peer(id: u64, network: Network) -> Peer {
    Peer::new(
        PeerId(id),
        format!("node-{id}"),
        network,
        RpcEndpoint {
            url: format!("http://127.0.0.1:{}", 8332 + id),
            user: "user".into(),
            password: "password".into(),
        },
    )
}

#[derive(Default)]
pub struct NodeState {
    pub version: u32,
    pub connections: u32,
    pub unreachable: bool,
    pub initial_sync: bool,
    pub headers: HashMap<BlockHash, BlockHeaderInfo>,
    pub active: HashMap<u64, BlockHash>,
    pub best: Option<BlockHash>,
    pub tips: Vec<ChainTip>,
    pub bodies: HashMap<BlockHash, FullBlock>,
    pub pruned: HashSet<BlockHash>,
    /// Answers `getblock` for these with a generic RPC error.
    pub failing_blocks: HashSet<BlockHash>,
    /// Answers `getblockheader` with a pruned error, as nodes do for headers below their prune height.
    pub pruned_headers: HashSet<BlockHash>,
    pub utxo: Option<TxOutSetInfo>,
    pub softforks: Option<Softforks>,
    pub header_calls: usize,
    pub block_calls: usize,
}

/// A scriptable node.
pub struct MockNode {
    state: Mutex<NodeState>,
}

impl MockNode {
    pub fn new(version: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NodeState {
                version,
                connections: 8,
                ..Default::default()
            }),
        })
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut NodeState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Adds headers without changing the active chain.
    pub fn load(&self, headers: &[BlockHeaderInfo]) {
        self.with(|state| {
            for header in headers {
                state.headers.insert(header.hash.clone(), header.clone());
            }
        })
    }

    /// Adds headers and makes the last one the active tip.
    pub fn extend(&self, headers: &[BlockHeaderInfo]) {
        self.load(headers);
        if let Some(last) = headers.last() {
            self.activate(&last.hash);
        }
    }

    /// Makes `tip` the best block, rebuilding the height index along its ancestors.
    pub fn activate(&self, tip: &BlockHash) {
        self.with(|state| {
            state.active.clear();
            let mut next = Some(tip.clone());
            while let Some(hash) = next {
                let Some(header) = state.headers.get(&hash) else { break };
                state.active.insert(header.height, hash.clone());
                next = header.previousblockhash.clone();
            }
            let height = state.headers[tip].height;
            state.tips.retain(|t| t.status != ChainTipStatus::Active);
            state.tips.push(ChainTip {
                height,
                hash: tip.clone(),
                branchlen: 0,
                status: ChainTipStatus::Active,
            });
            state.best = Some(tip.clone());
        })
    }

    pub fn add_tip(&self, hash: BlockHash, height: u64, status: ChainTipStatus) {
        self.with(|state| {
            state.tips.push(ChainTip {
                height,
                hash,
                branchlen: 1,
                status,
            })
        })
    }

    pub fn set_version(&self, hash: &BlockHash, version: Option<i32>) {
        self.with(|state| {
            if let Some(header) = state.headers.get_mut(hash) {
                header.version = version;
            }
        })
    }

    pub fn header_calls(&self) -> usize {
        self.with(|state| state.header_calls)
    }

    pub fn block_calls(&self) -> usize {
        self.with(|state| state.block_calls)
    }

    fn check_reachable(&self) -> Result<(), RpcError> {
        if self.with(|state| state.unreachable) {
            Err(RpcError::Connection("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn network_info(&self) -> Result<NetworkInfo, RpcError> {
        self.check_reachable()?;
        Ok(self.with(|state| NetworkInfo {
            version: state.version,
            subversion: "/Satoshi/".into(),
            connections: state.connections,
        }))
    }

    async fn blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.check_reachable()?;
        self.with(|state| {
            let best = state
                .best
                .clone()
                .ok_or_else(|| RpcError::Rpc {
                    code: -28,
                    message: "Loading block index".into(),
                })?;
            let header = &state.headers[&best];
            Ok(BlockchainInfo {
                chain: "main".into(),
                blocks: header.height,
                headers: Some(header.height),
                bestblockhash: best.clone(),
                chainwork: Some(header.chainwork),
                verificationprogress: Some(if state.initial_sync { 0.5 } else { 1.0 }),
                initialblockdownload: None,
                pruned: Some(false),
                softforks: state.softforks.clone(),
                bip9_softforks: None,
            })
        })
    }

    async fn best_block_hash(&self) -> Result<BlockHash, RpcError> {
        self.check_reachable()?;
        self.with(|state| state.best.clone())
            .ok_or_else(|| RpcError::BlockNotFound("no best block".into()))
    }

    async fn chain_tips(&self) -> Result<Vec<ChainTip>, RpcError> {
        self.check_reachable()?;
        Ok(self.with(|state| state.tips.clone()))
    }

    async fn block_header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        self.check_reachable()?;
        self.with(|state| {
            state.header_calls += 1;
            if state.version < forkwatch::model::HEADER_RPC_MIN_VERSION {
                return Err(RpcError::MethodUnsupported("getblockheader".into()));
            }
            if state.pruned_headers.contains(hash) {
                return Err(RpcError::DataPruned("Block not available (pruned data)".into()));
            }
            state
                .headers
                .get(hash)
                .cloned()
                .ok_or_else(|| RpcError::BlockNotFound(hash.to_string()))
        })
    }

    async fn raw_block(&self, hash: &BlockHash, verbosity: Verbosity) -> Result<serde_json::Value, RpcError> {
        self.check_reachable()?;
        self.with(|state| {
            state.block_calls += 1;
            if state.failing_blocks.contains(hash) {
                return Err(RpcError::Rpc {
                    code: -1,
                    message: "internal error".into(),
                });
            }
            if state.pruned.contains(hash) {
                return Err(RpcError::DataPruned("Block not available (pruned data)".into()));
            }
            let value = match verbosity {
                Verbosity::Summary => state.headers.get(hash).map(serde_json::to_value),
                Verbosity::Full => state.bodies.get(hash).map(serde_json::to_value),
                Verbosity::Raw => None,
            };
            value
                .ok_or_else(|| RpcError::BlockNotFound(hash.to_string()))?
                .map_err(|e| RpcError::Decode {
                    method: "getblock".into(),
                    message: e.to_string(),
                })
        })
    }

    async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError> {
        self.check_reachable()?;
        self.with(|state| state.active.get(&height).cloned())
            .ok_or_else(|| RpcError::Rpc {
                code: -8,
                message: "Block height out of range".into(),
            })
    }

    async fn utxo_set_summary(&self) -> Result<TxOutSetInfo, RpcError> {
        self.check_reachable()?;
        self.with(|state| state.utxo.clone()).ok_or_else(|| RpcError::Rpc {
            code: -1,
            message: "unable to read UTXO set".into(),
        })
    }

    async fn invalidate_block(&self, _hash: &BlockHash) -> Result<(), RpcError> {
        self.check_reachable()
    }

    async fn reconsider_block(&self, _hash: &BlockHash) -> Result<(), RpcError> {
        self.check_reachable()
    }

    async fn set_network_active(&self, _active: bool) -> Result<(), RpcError> {
        self.check_reachable()
    }
}

/// Hands out the mock node registered for each peer id.
#[derive(Default)]
pub struct MockConnector {
    nodes: Mutex<HashMap<PeerId, Arc<MockNode>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, id: u64, node: Arc<MockNode>) {
        self.nodes.lock().unwrap().insert(PeerId(id), node);
    }
}

impl RpcConnector for MockConnector {
    fn connect(&self, peer: &Peer) -> Result<Arc<dyn NodeRpc>, RpcError> {
        match self.nodes.lock().unwrap().get(&peer.id) {
            Some(node) => Ok(node.clone()),
            None => Err(RpcError::Connection(format!("no node for peer {}", peer.id))),
        }
    }
}

/// Collects every delivered event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum TestDbError {
    #[error("failed to read config at '{0}': {1}")]
    FileRead(String, std::io::Error),
    #[error("toml deserialization failed: {0}")]
    TomlDeserialization(toml::de::Error),
    #[error(transparent)]
    MongoDb(#[from] mongodb::error::Error),
}

pub async fn connect_to_test_db(database_name: impl ToString) -> Result<MongoDb, TestDbError> {
    let mut config = if let Ok(path) = std::env::var("CONFIG_PATH") {
        let val = std::fs::read_to_string(&path)
            .map_err(|e| TestDbError::FileRead(AsRef::<Path>::as_ref(&path).display().to_string(), e))
            .and_then(|contents| toml::from_str::<toml::Value>(&contents).map_err(TestDbError::TomlDeserialization))?;
        if let Some(mongodb) = val.get("mongodb").cloned() {
            mongodb.try_into().map_err(TestDbError::TomlDeserialization)?
        } else {
            MongoDbConfig::default()
        }
    } else {
        MongoDbConfig::default()
    };
    config.database_name = database_name.to_string();

    Ok(MongoDb::connect(&config).await?)
}

pub async fn teardown(db: MongoDb) {
    db.drop().await.unwrap();
}
