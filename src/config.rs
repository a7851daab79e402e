// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Settings of the polling loop and the detectors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    chain::ChainConfig,
    detect::{
        InflationConfig, InvalidTipConfig, LagConfig, LightningConfig, PoolConfig, StaleCandidateConfig,
        VersionBitsConfig,
    },
    model::Network,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CYCLE_PAUSE: Duration = Duration::from_millis(500);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// The network whose peers are authoritative for every detector.
    pub primary_network: Network,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Extra pause after every cycle.
    #[serde(with = "humantime_serde")]
    pub cycle_pause: Duration,
    /// Upper bound of every single RPC call.
    #[serde(with = "humantime_serde")]
    pub rpc_timeout: Duration,
    pub chain: ChainConfig,
    pub invalid_tips: InvalidTipConfig,
    pub lag: LagConfig,
    pub version_bits: VersionBitsConfig,
    pub inflation: InflationConfig,
    pub lightning: LightningConfig,
    pub pools: PoolConfig,
    pub stale_candidates: StaleCandidateConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            primary_network: Network::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            cycle_pause: DEFAULT_CYCLE_PAUSE,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            chain: Default::default(),
            invalid_tips: Default::default(),
            lag: Default::default(),
            version_bits: Default::default(),
            inflation: Default::default(),
            lightning: Default::default(),
            pools: Default::default(),
            stale_candidates: Default::default(),
        }
    }
}
