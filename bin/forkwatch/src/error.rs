// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use forkwatch::{poller::PollError, store::StoreError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    MongoDb(#[from] mongodb::error::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("no configured peer to backfill from")]
    NoPeer,
}
