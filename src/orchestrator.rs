// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Sequences polling and detection across the fleet.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    config::MonitorConfig,
    detect::{
        InflationDetector, InvalidTipDetector, LagDetector, LightningScanner, PoolMatcher, SoftforkDetector,
        StaleCandidateDetector, VersionBitsDetector,
    },
    model::{Block, Peer},
    notify::Notifier,
    poller::Poller,
    rpc::RpcConnector,
    shutdown::ShutdownSignal,
    store::{Store, StoreError},
};

/// Runs poll cycles until a shutdown is requested.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    poller: Poller,
    config: MonitorConfig,
    softforks: SoftforkDetector,
    lag: LagDetector,
    invalid_tips: InvalidTipDetector,
    version_bits: VersionBitsDetector,
    inflation: InflationDetector,
    lightning: LightningScanner,
    pools: PoolMatcher,
    stale_candidates: StaleCandidateDetector,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        connector: Arc<dyn RpcConnector>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            poller: Poller::new(store.clone(), connector, config.primary_network, config.chain),
            store,
            notifier,
            softforks: SoftforkDetector,
            lag: LagDetector::new(config.lag),
            invalid_tips: InvalidTipDetector,
            version_bits: VersionBitsDetector::new(config.version_bits),
            inflation: InflationDetector::new(config.inflation),
            lightning: LightningScanner::new(config.lightning),
            pools: PoolMatcher::new(config.pools),
            stale_candidates: StaleCandidateDetector::new(config.stale_candidates),
            config,
        }
    }

    /// Stores the configured peers. Known peers keep their observed status.
    pub async fn register_peers(&self, peers: impl IntoIterator<Item = Peer>) -> Result<(), StoreError> {
        for configured in peers {
            let peer = match self.store.peer(configured.id).await? {
                Some(mut known) => {
                    if known.common_height != configured.common_height {
                        known.common_block = None;
                    }
                    known.name = configured.name;
                    known.network = configured.network;
                    known.rpc = configured.rpc;
                    known.common_height = configured.common_height;
                    known
                }
                None => configured,
            };
            debug!("registering peer {} ({})", peer.id, peer.name);
            self.store.upsert_peer(&peer).await?;
        }
        Ok(())
    }

    pub async fn run(&mut self, mut shutdown: ShutdownSignal) {
        info!("polling every {:?}", self.config.poll_interval);
        while !shutdown.is_requested() {
            if let Err(e) = self.cycle(&shutdown).await {
                error!("poll cycle failed: {e}");
            }
            tokio::select! {
                _ = shutdown.requested() => break,
                _ = tokio::time::sleep(self.config.cycle_pause + self.config.poll_interval) => {}
            }
        }
        info!("polling stopped");
    }

    /// Polls every peer once and runs the detectors in between.
    ///
    /// Failures of single peers or detectors are logged and do not end the cycle.
    #[instrument(skip_all, err)]
    pub async fn cycle(&mut self, shutdown: &ShutdownSignal) -> Result<(), StoreError> {
        let now = OffsetDateTime::now_utc();
        let (mut primary, mut secondary): (Vec<Peer>, Vec<Peer>) = self
            .store
            .peers()
            .await?
            .into_iter()
            .partition(|p| p.network == self.config.primary_network);
        primary.sort_by(|a, b| b.version.cmp(&a.version));

        for peer in primary.iter_mut() {
            if shutdown.is_requested() {
                return Ok(());
            }
            match self.poller.poll(peer, now).await {
                Ok(Some(info)) => {
                    if let Err(e) = self
                        .softforks
                        .check(self.store.as_ref(), self.notifier.as_ref(), peer, &info, now)
                        .await
                    {
                        error!("soft fork check of peer {} failed: {e}", peer.id);
                    }
                }
                Ok(None) => (),
                Err(e) => error!("failed to poll peer {}: {e}", peer.id),
            }
        }

        if shutdown.is_requested() {
            return Ok(());
        }
        match self
            .lag
            .check(self.store.as_ref(), self.notifier.as_ref(), &mut primary, now)
            .await
        {
            Ok(statuses) => debug!("lag statuses: {statuses:?}"),
            Err(e) => error!("lag check failed: {e}"),
        }

        for peer in primary.iter().filter(|p| p.is_synced()) {
            if shutdown.is_requested() {
                return Ok(());
            }
            self.check_invalid_tips(peer, now).await;
        }

        if self.config.version_bits.enabled && !shutdown.is_requested() {
            if let Some((_, tip)) = self.most_capable(&primary).await? {
                if let Err(e) = self
                    .version_bits
                    .check(self.store.as_ref(), self.notifier.as_ref(), &tip, now)
                    .await
                {
                    error!("version bits check failed: {e}");
                }
            }
        }

        if self.inflation.is_due(now) && !shutdown.is_requested() {
            if let Some((peer, tip)) = self.reference(&primary).await? {
                self.check_inflation(&peer, &tip, now).await;
            }
        }

        if self.config.lightning.enabled && !shutdown.is_requested() {
            if let Some((peer, tip)) = self.reference(&primary).await? {
                self.scan_lightning(&peer, &tip).await;
            }
        }

        if self.pools.is_due(now) && !shutdown.is_requested() {
            if let Some((peer, tip)) = self.reference(&primary).await? {
                self.match_pools(&peer, &tip, now).await;
            }
        }

        if self.stale_candidates.enabled() && !shutdown.is_requested() {
            if let Some((_, tip)) = self.reference(&primary).await? {
                if let Err(e) = self
                    .stale_candidates
                    .check(self.store.as_ref(), self.notifier.as_ref(), &tip, now)
                    .await
                {
                    error!("stale candidate check failed: {e}");
                }
            }
        }

        for peer in secondary.iter_mut() {
            if shutdown.is_requested() {
                return Ok(());
            }
            if let Err(e) = self.poller.poll(peer, now).await {
                error!("failed to poll peer {}: {e}", peer.id);
            }
        }
        Ok(())
    }

    async fn check_invalid_tips(&mut self, peer: &Peer, now: OffsetDateTime) {
        let tips = match self.poller.chain_tips(peer).await {
            Ok(tips) => tips,
            Err(e) => {
                warn!("failed to fetch chain tips of peer {}: {e}", peer.id);
                return;
            }
        };
        if let Err(e) = self
            .poller
            .resolve_fork_tips(peer, &tips, self.config.invalid_tips.fork_horizon)
            .await
        {
            warn!("failed to resolve fork tips of peer {}: {e}", peer.id);
            return;
        }
        if let Err(e) = self
            .invalid_tips
            .check(self.store.as_ref(), self.notifier.as_ref(), peer, &tips, now)
            .await
        {
            error!("invalid tip check of peer {} failed: {e}", peer.id);
        }
    }

    async fn check_inflation(&mut self, peer: &Peer, tip: &Block, now: OffsetDateTime) {
        match self.store.utxo_snapshot(&tip.hash).await {
            Ok(Some(_)) => return,
            Ok(None) => (),
            Err(e) => {
                error!("failed to load snapshot of block {}: {e}", tip.hash);
                return;
            }
        }
        let info = match self.poller.utxo_snapshot(peer).await {
            Ok(info) => info,
            Err(e) => {
                warn!("failed to fetch the UTXO set summary of peer {}: {e}", peer.id);
                return;
            }
        };
        // The peer may have moved on while it summed up the UTXO set.
        if info.bestblock != tip.hash {
            if let Err(e) = self.poller.resolve_block(peer, &info.bestblock).await {
                warn!("failed to resolve block {} of the UTXO set summary: {e}", info.bestblock);
                return;
            }
        }
        match self
            .inflation
            .check(self.store.as_ref(), self.notifier.as_ref(), peer, &info, now)
            .await
        {
            Ok(outcome) => debug!("inflation check: {outcome:?}"),
            Err(e) => error!("inflation check failed: {e}"),
        }
    }

    async fn scan_lightning(&mut self, peer: &Peer, tip: &Block) {
        let plan = match self.lightning.pending(self.store.as_ref(), tip).await {
            Ok(plan) => plan,
            Err(e) => {
                error!("failed to collect unscanned blocks: {e}");
                return;
            }
        };
        for block in &plan.blocks {
            let body = match self.poller.full_block(peer, &block.hash).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(
                        "failed to fetch block {} from peer {}, leaving heights {}..={} for the next pass: {e}",
                        block.hash, peer.id, block.height, tip.height
                    );
                    return;
                }
            };
            if let Err(e) = self.lightning.scan(self.store.as_ref(), block, body.as_ref()).await {
                error!("lightning scan of block {} failed: {e}", block.hash);
                return;
            }
        }
    }

    async fn match_pools(&mut self, peer: &Peer, tip: &Block, now: OffsetDateTime) {
        let pending = match self.pools.pending(self.store.as_ref(), tip, now).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("failed to collect blocks without pool: {e}");
                return;
            }
        };
        for block in &pending {
            let body = match self.poller.full_block(peer, &block.hash).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("failed to fetch block {} from peer {}: {e}", block.hash, peer.id);
                    return;
                }
            };
            if let Err(e) = self.pools.attribute(self.store.as_ref(), block, body.as_ref()).await {
                error!("pool attribution of block {} failed: {e}", block.hash);
                return;
            }
        }
    }

    /// The first synced peer in version order, with its best block.
    async fn most_capable(&self, peers: &[Peer]) -> Result<Option<(Peer, Block)>, StoreError> {
        for peer in peers.iter().filter(|p| p.is_synced()) {
            if let Some(tip) = self.best_block(peer).await? {
                return Ok(Some((peer.clone(), tip)));
            }
        }
        Ok(None)
    }

    /// The peer with the most work as chosen by the lag check, or the most capable one.
    async fn reference(&self, peers: &[Peer]) -> Result<Option<(Peer, Block)>, StoreError> {
        if let Some(peer) = peers
            .iter()
            .find(|p| Some(p.id) == self.lag.reference() && p.is_synced())
        {
            if let Some(tip) = self.best_block(peer).await? {
                return Ok(Some((peer.clone(), tip)));
            }
        }
        self.most_capable(peers).await
    }

    async fn best_block(&self, peer: &Peer) -> Result<Option<Block>, StoreError> {
        match &peer.best_block {
            Some(hash) => self.store.block(hash).await,
            None => Ok(None),
        }
    }
}
