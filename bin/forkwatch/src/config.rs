// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{fs, path::Path};

use forkwatch::{
    config::MonitorConfig,
    db::MongoDbConfig,
    model::{Network, Peer, PeerId, RpcEndpoint},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at '{0}': {1}")]
    FileRead(String, std::io::Error),
    #[error("toml deserialization failed: {0}")]
    TomlDeserialization(toml::de::Error),
    #[error("peer id {0} is configured twice")]
    DuplicatePeer(u64),
}

/// Where the monitor keeps its state.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    #[value(name = "mongodb")]
    MongoDb,
    /// Keeps everything in memory, for trial runs.
    Memory,
}

/// Configuration of Forkwatch.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForkwatchConfig {
    pub store: StoreKind,
    pub mongodb: MongoDbConfig,
    pub monitor: MonitorConfig,
    pub peers: Vec<PeerConfig>,
}

/// A monitored node as configured by the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerConfig {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub network: Network,
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// A height whose block all peers of the network are expected to agree on.
    #[serde(default)]
    pub common_height: Option<u64>,
}

impl From<&PeerConfig> for Peer {
    fn from(value: &PeerConfig) -> Self {
        let mut peer = Peer::new(
            PeerId(value.id),
            value.name.clone(),
            value.network,
            RpcEndpoint {
                url: value.url.clone(),
                user: value.user.clone(),
                password: value.password.clone(),
            },
        );
        peer.common_height = value.common_height;
        peer
    }
}

impl ForkwatchConfig {
    /// Reads the config from the file located at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = fs::read_to_string(&path)
            .map_err(|e| ConfigError::FileRead(path.as_ref().display().to_string(), e))
            .and_then(|contents| toml::from_str::<Self>(&contents).map_err(ConfigError::TomlDeserialization))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = self.peers.iter().map(|p| p.id).collect::<Vec<_>>();
        ids.sort_unstable();
        match ids.windows(2).find(|pair| pair[0] == pair[1]) {
            Some(pair) => Err(ConfigError::DuplicatePeer(pair[0])),
            None => Ok(()),
        }
    }
}
