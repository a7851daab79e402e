// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use mongodb::{
    bson::{doc, Bson},
    error::Error,
    IndexModel,
};
use serde::{Deserialize, Serialize};

use crate::{
    db::mongodb::{collection::index, MongoDbCollection, MongoDbCollectionExt},
    model::{Block, BlockHash, Network},
};

/// A [`Block`] keyed by its hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDocument {
    #[serde(rename = "_id")]
    pub hash: BlockHash,
    #[serde(flatten)]
    pub block: Block,
}

impl From<&Block> for BlockDocument {
    fn from(block: &Block) -> Self {
        Self {
            hash: block.hash.clone(),
            block: block.clone(),
        }
    }
}

/// The observed blocks.
pub struct BlockCollection {
    collection: mongodb::Collection<BlockDocument>,
}

impl MongoDbCollection for BlockCollection {
    const NAME: &'static str = "blocks";
    type Document = BlockDocument;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }

    fn indexes() -> Vec<IndexModel> {
        vec![
            index("block_height_index", doc! { "network": 1, "height": 1 }),
            index("block_work_index", doc! { "network": 1, "work": -1 }),
        ]
    }
}

impl BlockCollection {
    pub async fn get_block(&self, hash: &BlockHash) -> Result<Option<Block>, Error> {
        Ok(self.first(doc! { "_id": hash.as_str() }, None).await?.map(|doc| doc.block))
    }

    /// Fails with a duplicate key error if the hash is known.
    pub async fn insert_block(&self, block: &Block) -> Result<(), Error> {
        self.insert(block.into()).await
    }

    /// Links `child` to `parent` unless it already has a parent.
    pub async fn set_parent(&self, child: &BlockHash, parent: &BlockHash) -> Result<bool, Error> {
        self.set_once(doc! { "_id": child.as_str() }, "parent", Bson::from(parent.as_str()))
            .await
    }

    /// Returns `false` if the block is unknown.
    pub async fn set_checked_lightning(&self, hash: &BlockHash) -> Result<bool, Error> {
        let res = self
            .set(doc! { "_id": hash.as_str() }, doc! { "checked_lightning": true })
            .await?;
        Ok(res.matched_count == 1)
    }

    /// Gets the blocks of a network with a height in `from..=to`.
    pub async fn get_between(&self, network: Network, from: u64, to: u64) -> Result<Vec<Block>, Error> {
        Ok(self
            .all(
                doc! { "network": network.as_str(), "height": { "$gte": from as i64, "$lte": to as i64 } },
                doc! { "height": 1, "_id": 1 },
            )
            .await?
            .into_iter()
            .map(|doc| doc.block)
            .collect())
    }

    /// Returns `false` if the block is unknown.
    pub async fn set_pool(&self, hash: &BlockHash, pool: &str) -> Result<bool, Error> {
        let res = self.set(doc! { "_id": hash.as_str() }, doc! { "pool": pool }).await?;
        Ok(res.matched_count == 1)
    }

    pub async fn get_min_height(&self, network: Network) -> Result<Option<u64>, Error> {
        Ok(self
            .first(doc! { "network": network.as_str() }, doc! { "height": 1 })
            .await?
            .map(|doc| doc.block.height))
    }
}
