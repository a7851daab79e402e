// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Holds the `MongoDb` type and the [`Store`](crate::store::Store) implementation on top of it.

mod collection;
/// Module containing the collections of the monitor entities.
pub mod collections;
pub mod config;
mod store;

use mongodb::{
    bson::{doc, Document},
    error::{Error, ErrorKind},
    Client, Database,
};

pub use self::{
    collection::{is_duplicate_key, MongoDbCollection, MongoDbCollectionExt},
    config::MongoDbConfig,
    store::MongoStore,
};

const NAMESPACE_EXISTS_CODE: i32 = 48;

/// A handle to the database that holds the monitor state.
#[derive(Clone, Debug)]
pub struct MongoDb {
    client: Client,
    name: String,
}

impl MongoDb {
    /// Builds the client. The driver connects lazily, so an unreachable server shows up on the first operation.
    pub async fn connect(config: &MongoDbConfig) -> Result<Self, Error> {
        let options = config.client_options().await?;
        Ok(Self {
            client: Client::with_options(options)?,
            name: config.database_name.clone(),
        })
    }

    pub fn db(&self) -> Database {
        self.client.database(&self.name)
    }

    /// Gets a typed handle on a collection.
    pub fn collection<T: MongoDbCollection>(&self) -> T {
        T::instantiate(self.db().collection(T::NAME))
    }

    /// Creates the collection of `T` and its indexes. Both steps are no-ops for existing ones.
    pub async fn prepare<T: MongoDbCollection>(&self) -> Result<(), Error> {
        let db = self.db();
        if let Err(e) = db.create_collection(T::NAME, None).await {
            if !matches!(&*e.kind, ErrorKind::Command(c) if c.code == NAMESPACE_EXISTS_CODE) {
                return Err(e);
            }
        }
        let indexes = T::indexes();
        if !indexes.is_empty() {
            db.collection::<Document>(T::NAME).create_indexes(indexes, None).await?;
        }
        Ok(())
    }

    /// Drops every collection but keeps the database and its views.
    pub async fn clear(&self) -> Result<(), Error> {
        let db = self.db();
        for name in db.list_collection_names(doc! { "type": "collection" }).await? {
            db.collection::<Document>(&name).drop(None).await?;
        }
        Ok(())
    }

    pub async fn drop(self) -> Result<(), Error> {
        self.db().drop(None).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
