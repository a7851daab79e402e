// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;
use url::Url;

use super::{
    responses::{BlockHeaderInfo, BlockchainInfo, ChainTip, NetworkInfo, TxOutSetInfo, Verbosity},
    NodeRpc, RpcError,
};
use crate::model::{BlockHash, RpcEndpoint};

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    result: Option<Value>,
    error: Option<ErrorObject>,
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// JSON-RPC 1.0 over HTTP with basic authentication.
#[derive(Debug)]
pub struct HttpRpc {
    client: reqwest::Client,
    url: Url,
    user: String,
    password: String,
    next_id: AtomicU64,
}

impl HttpRpc {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(endpoint: &RpcEndpoint, timeout: Duration) -> Result<Self, RpcError> {
        let url = Url::parse(&endpoint.url)
            .map_err(|e| RpcError::Connection(format!("invalid endpoint `{}`: {e}", endpoint.url)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("forkwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RpcError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            url,
            user: endpoint.user.clone(),
            password: endpoint.password.clone(),
            next_id: AtomicU64::new(0),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("{} -> {method}", self.url);
        let res = self
            .client
            .post(self.url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .json(&Request {
                jsonrpc: "1.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(|e| RpcError::Connection(e.to_string()))?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RpcError::Connection(format!("`{method}` rejected with HTTP {status}")));
        }

        // The node answers errors with a non-success status but a regular JSON body.
        let body = match res.json::<Response>().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return Err(RpcError::Connection(e.to_string())),
            Err(e) if !status.is_success() => {
                return Err(RpcError::Rpc {
                    code: i64::from(status.as_u16()),
                    message: e.to_string(),
                });
            }
            Err(e) => {
                return Err(RpcError::Decode {
                    method: method.to_owned(),
                    message: e.to_string(),
                });
            }
        };

        if let Some(err) = body.error {
            return Err(RpcError::from_node(method, err.code, err.message));
        }
        serde_json::from_value(body.result.unwrap_or(Value::Null)).map_err(|e| RpcError::Decode {
            method: method.to_owned(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl NodeRpc for HttpRpc {
    async fn network_info(&self) -> Result<NetworkInfo, RpcError> {
        self.call("getnetworkinfo", json!([])).await
    }

    async fn blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.call("getblockchaininfo", json!([])).await
    }

    async fn best_block_hash(&self) -> Result<BlockHash, RpcError> {
        self.call("getbestblockhash", json!([])).await
    }

    async fn chain_tips(&self) -> Result<Vec<ChainTip>, RpcError> {
        self.call("getchaintips", json!([])).await
    }

    async fn block_header(&self, hash: &BlockHash) -> Result<BlockHeaderInfo, RpcError> {
        self.call("getblockheader", json!([hash])).await
    }

    async fn raw_block(&self, hash: &BlockHash, verbosity: Verbosity) -> Result<Value, RpcError> {
        // Nodes before 0.15 only take a boolean, later ones still accept it for the first two levels.
        let verbosity = match verbosity {
            Verbosity::Raw => json!(false),
            Verbosity::Summary => json!(true),
            Verbosity::Full => json!(Verbosity::Full as u8),
        };
        self.call("getblock", json!([hash, verbosity])).await
    }

    async fn block_hash(&self, height: u64) -> Result<BlockHash, RpcError> {
        self.call("getblockhash", json!([height])).await
    }

    async fn utxo_set_summary(&self) -> Result<TxOutSetInfo, RpcError> {
        self.call("gettxoutsetinfo", json!([])).await
    }

    async fn invalidate_block(&self, hash: &BlockHash) -> Result<(), RpcError> {
        self.call::<Value>("invalidateblock", json!([hash])).await.map(drop)
    }

    async fn reconsider_block(&self, hash: &BlockHash) -> Result<(), RpcError> {
        self.call::<Value>("reconsiderblock", json!([hash])).await.map(drop)
    }

    async fn set_network_active(&self, active: bool) -> Result<(), RpcError> {
        self.call::<Value>("setnetworkactive", json!([active])).await.map(drop)
    }
}
