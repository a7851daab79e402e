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
    model::{BlockHash, InvalidTipRecord, PeerId},
};

/// An [`InvalidTipRecord`] plus a flag for the partial unique index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidTipDocument {
    #[serde(flatten)]
    pub record: InvalidTipRecord,
    /// Mirrors `dismissed_at.is_none()`.
    pub open: bool,
}

/// Blocks that peers report on invalid chain tips.
pub struct InvalidTipCollection {
    collection: mongodb::Collection<InvalidTipDocument>,
}

impl MongoDbCollection for InvalidTipCollection {
    const NAME: &'static str = "invalid_tips";
    type Document = InvalidTipDocument;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }

    fn indexes() -> Vec<IndexModel> {
        vec![unique_index(
            "open_invalid_tip_index",
            doc! { "peer": 1, "block": 1 },
            Some(doc! { "open": true }),
        )]
    }
}

fn open_record(peer: PeerId, block: &BlockHash) -> Document {
    doc! { "peer": peer.0 as i64, "block": block.as_str(), "open": true }
}

impl InvalidTipCollection {
    /// Gets the open record of the pair, or else the most recent dismissed one.
    pub async fn get_latest(&self, peer: PeerId, block: &BlockHash) -> Result<Option<InvalidTipRecord>, Error> {
        Ok(self
            .first(
                doc! { "peer": peer.0 as i64, "block": block.as_str() },
                doc! { "open": -1, "created_at": -1 },
            )
            .await?
            .map(|doc| doc.record))
    }

    /// Fails with a duplicate key error while the pair has an open record.
    pub async fn insert_record(&self, record: &InvalidTipRecord) -> Result<(), Error> {
        self.insert(InvalidTipDocument {
            open: record.is_open(),
            record: record.clone(),
        })
        .await
    }

    pub async fn set_notified(&self, peer: PeerId, block: &BlockHash, at: OffsetDateTime) -> Result<bool, Error> {
        self.set_once(open_record(peer, block), "notified_at", Bson::from(at.unix_timestamp()))
            .await
    }

    pub async fn dismiss(&self, peer: PeerId, block: &BlockHash, at: OffsetDateTime) -> Result<bool, Error> {
        let res = self
            .set(
                open_record(peer, block),
                doc! { "dismissed_at": at.unix_timestamp(), "open": false },
            )
            .await?;
        Ok(res.modified_count == 1)
    }

    /// Gets all records, newest first.
    pub async fn get_records(&self) -> Result<Vec<InvalidTipRecord>, Error> {
        Ok(self
            .all(doc! {}, doc! { "created_at": -1 })
            .await?
            .into_iter()
            .map(|doc| doc.record)
            .collect())
    }
}
