// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use mongodb::{bson::doc, error::Error};
use serde::{Deserialize, Serialize};

use crate::{
    db::mongodb::{MongoDbCollection, MongoDbCollectionExt},
    model::{LightningTransaction, Network},
};

/// A [`LightningTransaction`] keyed by its txid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightningDocument {
    #[serde(rename = "_id")]
    pub txid: String,
    #[serde(flatten)]
    pub transaction: LightningTransaction,
}

/// Settlement transactions found by the lightning scanner.
pub struct LightningCollection {
    collection: mongodb::Collection<LightningDocument>,
}

impl MongoDbCollection for LightningCollection {
    const NAME: &'static str = "lightning_transactions";
    type Document = LightningDocument;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }
}

impl LightningCollection {
    /// Returns `false` if the transaction was recorded before.
    pub async fn insert_transaction(&self, transaction: &LightningTransaction) -> Result<bool, Error> {
        self.insert_new(LightningDocument {
            txid: transaction.txid.clone(),
            transaction: transaction.clone(),
        })
        .await
    }

    pub async fn get_transactions(&self, network: Network) -> Result<Vec<LightningTransaction>, Error> {
        Ok(self
            .all(doc! { "network": network.as_str() }, doc! { "_id": 1 })
            .await?
            .into_iter()
            .map(|doc| doc.transaction)
            .collect())
    }
}
