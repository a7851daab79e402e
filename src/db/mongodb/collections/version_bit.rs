// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use mongodb::{
    bson::{doc, Bson, Document},
    error::Error,
    IndexModel,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    db::mongodb::{collection::unique_index, MongoDbCollection, MongoDbCollectionExt},
    model::{BlockHash, Network, VersionBitAlert},
};

/// A [`VersionBitAlert`] plus a flag for the partial unique index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBitDocument {
    #[serde(flatten)]
    pub alert: VersionBitAlert,
    /// Mirrors `deactivation.is_none()`.
    pub open: bool,
}

/// Version bits that reached the signaling threshold.
pub struct VersionBitCollection {
    collection: mongodb::Collection<VersionBitDocument>,
}

impl MongoDbCollection for VersionBitCollection {
    const NAME: &'static str = "version_bits";
    type Document = VersionBitDocument;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }

    fn indexes() -> Vec<IndexModel> {
        vec![unique_index(
            "open_version_bit_index",
            doc! { "network": 1, "bit": 1 },
            Some(doc! { "open": true }),
        )]
    }
}

fn open_alert(network: Network, bit: u8) -> Document {
    doc! { "network": network.as_str(), "bit": i32::from(bit), "open": true }
}

impl VersionBitCollection {
    pub async fn get_open(&self, network: Network, bit: u8) -> Result<Option<VersionBitAlert>, Error> {
        Ok(self.first(open_alert(network, bit), None).await?.map(|doc| doc.alert))
    }

    /// Fails with a duplicate key error while the bit has an open alert.
    pub async fn insert_alert(&self, alert: &VersionBitAlert) -> Result<(), Error> {
        self.insert(VersionBitDocument {
            open: alert.is_open(),
            alert: alert.clone(),
        })
        .await
    }

    /// Records the block at which the bit stopped being signaled.
    pub async fn close(&self, network: Network, bit: u8, deactivation: &BlockHash) -> Result<bool, Error> {
        let res = self
            .set(
                open_alert(network, bit),
                doc! { "deactivation": deactivation.as_str(), "open": false },
            )
            .await?;
        Ok(res.modified_count == 1)
    }

    pub async fn set_notified(&self, network: Network, bit: u8, at: OffsetDateTime) -> Result<bool, Error> {
        self.set_once(open_alert(network, bit), "notified_at", Bson::from(at.unix_timestamp()))
            .await
    }

    pub async fn get_alerts(&self, network: Network) -> Result<Vec<VersionBitAlert>, Error> {
        Ok(self
            .all(doc! { "network": network.as_str() }, doc! { "activation_height": 1 })
            .await?
            .into_iter()
            .map(|doc| doc.alert)
            .collect())
    }
}
