// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use mongodb::{
    bson::{doc, Bson, Document},
    error::Error,
    IndexModel,
};
use time::OffsetDateTime;

use crate::{
    db::mongodb::{collection::unique_index, MongoDbCollection, MongoDbCollectionExt},
    model::{LagRecord, PeerId},
};

/// Peers that are behind a reference peer, one record per pair.
pub struct LagCollection {
    collection: mongodb::Collection<LagRecord>,
}

impl MongoDbCollection for LagCollection {
    const NAME: &'static str = "lags";
    type Document = LagRecord;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }

    fn indexes() -> Vec<IndexModel> {
        vec![unique_index("lag_pair_index", doc! { "peer": 1, "reference": 1 }, None)]
    }
}

fn pair(peer: PeerId, reference: PeerId) -> Document {
    doc! { "peer": peer.0 as i64, "reference": reference.0 as i64 }
}

impl LagCollection {
    pub async fn get_lag(&self, peer: PeerId, reference: PeerId) -> Result<Option<LagRecord>, Error> {
        self.first(pair(peer, reference), None).await
    }

    pub async fn insert_lag(&self, record: &LagRecord) -> Result<(), Error> {
        self.insert(record.clone()).await
    }

    pub async fn set_notified(&self, peer: PeerId, reference: PeerId, at: OffsetDateTime) -> Result<bool, Error> {
        self.set_once(pair(peer, reference), "notified_at", Bson::from(at.unix_timestamp()))
            .await
    }

    pub async fn delete_lag(&self, peer: PeerId, reference: PeerId) -> Result<(), Error> {
        self.remove(pair(peer, reference)).await
    }

    pub async fn get_lags(&self) -> Result<Vec<LagRecord>, Error> {
        self.all(doc! {}, doc! { "created_at": 1 }).await
    }
}
