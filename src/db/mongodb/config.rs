// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Connection settings of the MongoDB store.

use std::time::Duration;

use mongodb::{
    error::Error,
    options::{ClientOptions, Credential},
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONN_STR: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE_NAME: &str = "forkwatch";
pub const DEFAULT_MIN_POOL_SIZE: u32 = 2;
pub const DEFAULT_SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(10);

#[must_use]
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MongoDbConfig {
    pub conn_str: String,
    /// Used together with `password` when `conn_str` carries no credentials.
    pub username: Option<String>,
    pub password: Option<String>,
    pub database_name: String,
    /// Connections kept open in the pool.
    pub min_pool_size: u32,
    /// How long an operation waits for a usable server before it fails.
    #[serde(with = "humantime_serde")]
    pub server_selection_timeout: Duration,
}

impl MongoDbConfig {
    /// Parses the connection string and applies the remaining settings on top of it.
    pub async fn client_options(&self) -> Result<ClientOptions, Error> {
        let mut options = ClientOptions::parse(&self.conn_str).await?;
        options.app_name = Some("Forkwatch".to_string());
        options.min_pool_size = Some(self.min_pool_size);
        options.server_selection_timeout = Some(self.server_selection_timeout);
        if options.credential.is_none() {
            if let (Some(username), Some(password)) = (&self.username, &self.password) {
                options.credential = Some(
                    Credential::builder()
                        .username(username.clone())
                        .password(password.clone())
                        .build(),
                );
            }
        }
        Ok(options)
    }
}

impl Default for MongoDbConfig {
    fn default() -> Self {
        Self {
            conn_str: DEFAULT_CONN_STR.to_string(),
            username: None,
            password: None,
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            min_pool_size: DEFAULT_MIN_POOL_SIZE,
            server_selection_timeout: DEFAULT_SERVER_SELECTION_TIMEOUT,
        }
    }
}
