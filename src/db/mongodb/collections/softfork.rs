// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use mongodb::{bson::doc, error::Error, IndexModel};

use crate::{
    db::mongodb::{collection::unique_index, MongoDbCollection, MongoDbCollectionExt},
    model::{PeerId, SoftforkStatus},
};

/// Deployment statuses, one per peer and fork name.
pub struct SoftforkCollection {
    collection: mongodb::Collection<SoftforkStatus>,
}

impl MongoDbCollection for SoftforkCollection {
    const NAME: &'static str = "softforks";
    type Document = SoftforkStatus;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }

    fn indexes() -> Vec<IndexModel> {
        vec![unique_index("softfork_peer_index", doc! { "peer": 1, "name": 1 }, None)]
    }
}

impl SoftforkCollection {
    pub async fn get_status(&self, peer: PeerId, name: &str) -> Result<Option<SoftforkStatus>, Error> {
        self.first(doc! { "peer": peer.0 as i64, "name": name }, None).await
    }

    pub async fn upsert_status(&self, status: &SoftforkStatus) -> Result<(), Error> {
        self.upsert(
            doc! { "peer": status.peer.0 as i64, "name": status.name.as_str() },
            status.clone(),
        )
        .await
    }

    pub async fn get_statuses(&self) -> Result<Vec<SoftforkStatus>, Error> {
        self.all(doc! {}, doc! { "name": 1, "peer": 1 }).await
    }
}
