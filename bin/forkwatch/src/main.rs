// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module that contains the binary entry point of Forkwatch.

mod cli;
mod config;
mod error;
mod process;

use std::sync::Arc;

use clap::Parser;
use forkwatch::{
    db::{MongoDb, MongoStore},
    model::Peer,
    notify::LogNotifier,
    orchestrator::Orchestrator,
    rpc::HttpConnector,
    shutdown::shutdown_handles,
    store::{MemoryStore, Store},
};
use tracing::{error, info};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use self::{
    cli::{ClArgs, PostCommand},
    config::{ForkwatchConfig, StoreKind},
    error::Error,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    set_up_logging();

    std::panic::set_hook(Box::new(|p| {
        error!("{}", p);
    }));

    if let Err(e) = entry_point().await {
        error!("{}", e);
        std::process::exit(-1);
    }
}

async fn entry_point() -> Result<(), Error> {
    let cl_args = ClArgs::parse();
    let config = cl_args.get_config()?;

    if cl_args.process_subcommands(&config).await? == PostCommand::Exit {
        return Ok(());
    }

    let store = connect_store(&config).await?;
    let mut orchestrator = Orchestrator::new(
        store,
        Arc::new(HttpConnector::new(config.monitor.rpc_timeout)),
        Arc::new(LogNotifier),
        config.monitor.clone(),
    );
    orchestrator
        .register_peers(config.peers.iter().map(Peer::from))
        .await?;
    info!("Monitoring {} peers.", config.peers.len());

    let (handle, signal) = shutdown_handles();
    let signal_listener = tokio::spawn(async move {
        match process::shutdown_requested().await {
            Ok(signal) => info!("Received {signal}, finishing the current cycle."),
            Err(e) => error!("Failed to listen for shutdown signals: {e}"),
        }
        handle.shutdown();
    });

    orchestrator.run(signal).await;
    signal_listener.abort();

    Ok(())
}

pub(crate) async fn connect_store(config: &ForkwatchConfig) -> Result<Arc<dyn Store>, Error> {
    let store: Arc<dyn Store> = match config.store {
        StoreKind::MongoDb => {
            info!("Connecting to database `{}`.", config.mongodb.database_name);
            let db = MongoDb::connect(&config.mongodb).await?;
            Arc::new(MongoStore::new(db).await?)
        }
        StoreKind::Memory => {
            info!("Keeping the monitor state in memory.");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
