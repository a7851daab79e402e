// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use mongodb::{
    bson::{doc, Bson},
    error::Error,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    db::mongodb::{MongoDbCollection, MongoDbCollectionExt},
    model::{BlockHash, InflationSnapshot},
};

/// An [`InflationSnapshot`] keyed by the block it was taken at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(rename = "_id")]
    pub block: BlockHash,
    #[serde(flatten)]
    pub snapshot: InflationSnapshot,
}

/// UTXO set totals, at most one per block.
pub struct SnapshotCollection {
    collection: mongodb::Collection<SnapshotDocument>,
}

impl MongoDbCollection for SnapshotCollection {
    const NAME: &'static str = "utxo_snapshots";
    type Document = SnapshotDocument;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }
}

impl SnapshotCollection {
    pub async fn get_snapshot(&self, block: &BlockHash) -> Result<Option<InflationSnapshot>, Error> {
        Ok(self
            .first(doc! { "_id": block.as_str() }, None)
            .await?
            .map(|doc| doc.snapshot))
    }

    pub async fn insert_snapshot(&self, snapshot: &InflationSnapshot) -> Result<(), Error> {
        self.insert(SnapshotDocument {
            block: snapshot.block.clone(),
            snapshot: snapshot.clone(),
        })
        .await
    }

    pub async fn set_notified(&self, block: &BlockHash, at: OffsetDateTime) -> Result<bool, Error> {
        self.set_once(
            doc! { "_id": block.as_str() },
            "notified_at",
            Bson::from(at.unix_timestamp()),
        )
        .await
    }
}
