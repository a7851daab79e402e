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
    model::{Network, StaleCandidate},
};

/// Heights with competing blocks, one record per height.
pub struct StaleCandidateCollection {
    collection: mongodb::Collection<StaleCandidate>,
}

impl MongoDbCollection for StaleCandidateCollection {
    const NAME: &'static str = "stale_candidates";
    type Document = StaleCandidate;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }

    fn indexes() -> Vec<IndexModel> {
        vec![unique_index(
            "stale_candidate_height_index",
            doc! { "network": 1, "height": 1 },
            None,
        )]
    }
}

fn at_height(network: Network, height: u64) -> Document {
    doc! { "network": network.as_str(), "height": height as i64 }
}

impl StaleCandidateCollection {
    pub async fn get_candidate(&self, network: Network, height: u64) -> Result<Option<StaleCandidate>, Error> {
        self.first(at_height(network, height), None).await
    }

    pub async fn insert_candidate(&self, candidate: &StaleCandidate) -> Result<(), Error> {
        self.insert(candidate.clone()).await
    }

    pub async fn set_notified(&self, network: Network, height: u64, at: OffsetDateTime) -> Result<bool, Error> {
        self.set_once(at_height(network, height), "notified_at", Bson::from(at.unix_timestamp()))
            .await
    }

    pub async fn get_candidates(&self, network: Network) -> Result<Vec<StaleCandidate>, Error> {
        self.all(doc! { "network": network.as_str() }, doc! { "height": 1 }).await
    }
}
