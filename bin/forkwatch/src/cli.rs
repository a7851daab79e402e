// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use clap::{Parser, Subcommand};
use forkwatch::{
    model::{Peer, PeerId},
    poller::Poller,
    rpc::HttpConnector,
};

use crate::{
    config::{ConfigError, ForkwatchConfig, StoreKind},
    error::Error,
};

/// Watches a fleet of full nodes for chain forks and consensus divergence.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct ClArgs {
    /// The location of the configuration file.
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<String>,
    /// Where to keep the monitor state.
    #[arg(long, value_enum, env = "FORKWATCH_STORE")]
    pub store: Option<StoreKind>,
    /// The MongoDB connection string.
    #[arg(long = "mongodb.conn-str", env = "MONGODB_CONN_STR")]
    pub mongodb_conn_str: Option<String>,
    /// The MongoDB database name.
    #[arg(long = "mongodb.database-name", env = "MONGODB_DATABASE_NAME")]
    pub mongodb_database_name: Option<String>,
    /// Height below which ancestors are never fetched.
    #[arg(long = "monitor.cutoff-height")]
    pub cutoff_height: Option<u64>,
    /// Subcommands.
    #[command(subcommand)]
    pub subcommand: Option<Subcommands>,
}

impl ClArgs {
    /// Get a config file with CLI args applied.
    pub fn get_config(&self) -> Result<ForkwatchConfig, ConfigError> {
        let mut config = self
            .config
            .as_ref()
            .map(ForkwatchConfig::from_file)
            .transpose()?
            .unwrap_or_default();
        self.apply_cl_args(&mut config);
        Ok(config)
    }

    /// Applies command line arguments to the config.
    pub fn apply_cl_args(&self, config: &mut ForkwatchConfig) {
        if let Some(store) = self.store {
            config.store = store;
        }
        if let Some(conn_str) = &self.mongodb_conn_str {
            config.mongodb.conn_str = conn_str.clone();
        }
        if let Some(database_name) = &self.mongodb_database_name {
            config.mongodb.database_name = database_name.clone();
        }
        if let Some(cutoff_height) = self.cutoff_height {
            config.monitor.chain.cutoff_height = cutoff_height;
        }
    }

    /// Process subcommands and return whether the app should early exit.
    pub async fn process_subcommands(&self, config: &ForkwatchConfig) -> Result<PostCommand, Error> {
        if let Some(subcommand) = &self.subcommand {
            match subcommand {
                Subcommands::Backfill { until_height, peer } => {
                    let configured = config
                        .peers
                        .iter()
                        .find(|p| peer.map_or(p.network == config.monitor.primary_network, |id| p.id == id))
                        .ok_or(Error::NoPeer)?;
                    let store = crate::connect_store(config).await?;
                    let mut peer = match store.peer(PeerId(configured.id)).await? {
                        Some(peer) => peer,
                        None => Peer::from(configured),
                    };
                    tracing::info!("Backfilling from peer {} down to height {until_height}.", peer.id);
                    let mut poller = Poller::new(
                        store.clone(),
                        Arc::new(HttpConnector::new(config.monitor.rpc_timeout)),
                        config.monitor.primary_network,
                        config.monitor.chain,
                    );
                    let visited = poller.backfill(&mut peer, *until_height).await?;
                    store.upsert_peer(&peer).await?;
                    tracing::info!("Visited {visited} blocks.");
                    return Ok(PostCommand::Exit);
                }
                #[cfg(debug_assertions)]
                Subcommands::ClearDatabase { run } => {
                    if config.store == StoreKind::MongoDb {
                        let db = forkwatch::db::MongoDb::connect(&config.mongodb).await?;
                        db.clear().await?;
                        tracing::info!("Database cleared successfully.");
                    }
                    if !run {
                        return Ok(PostCommand::Exit);
                    }
                }
            }
        }
        Ok(PostCommand::Start)
    }
}

#[derive(Debug, Subcommand)]
pub enum Subcommands {
    /// Walk the best chain of a peer down to a height, linking every block.
    Backfill {
        /// The lowest height to walk to.
        #[arg(long)]
        until_height: u64,
        /// The id of the peer to walk. Defaults to the first peer of the primary network.
        #[arg(long)]
        peer: Option<u64>,
    },
    /// Clear the Forkwatch database.
    #[cfg(debug_assertions)]
    ClearDatabase {
        /// Run the application after this command.
        #[arg(short, long)]
        run: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub enum PostCommand {
    Start,
    Exit,
}
