// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use mongodb::{bson::doc, error::Error};
use serde::{Deserialize, Serialize};

use crate::{
    db::mongodb::{MongoDbCollection, MongoDbCollectionExt},
    model::{Peer, PeerId},
};

/// A [`Peer`] keyed by its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDocument {
    #[serde(rename = "_id")]
    pub id: PeerId,
    #[serde(flatten)]
    pub peer: Peer,
}

/// The monitored nodes.
pub struct PeerCollection {
    collection: mongodb::Collection<PeerDocument>,
}

impl MongoDbCollection for PeerCollection {
    const NAME: &'static str = "peers";
    type Document = PeerDocument;

    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self {
        Self { collection }
    }

    fn collection(&self) -> &mongodb::Collection<Self::Document> {
        &self.collection
    }
}

impl PeerCollection {
    /// Gets all peers ordered by id.
    pub async fn get_peers(&self) -> Result<Vec<Peer>, Error> {
        Ok(self
            .all(doc! {}, doc! { "_id": 1 })
            .await?
            .into_iter()
            .map(|doc| doc.peer)
            .collect())
    }

    pub async fn get_peer(&self, id: PeerId) -> Result<Option<Peer>, Error> {
        Ok(self.first(doc! { "_id": id.0 as i64 }, None).await?.map(|doc| doc.peer))
    }

    pub async fn upsert_peer(&self, peer: &Peer) -> Result<(), Error> {
        self.upsert(
            doc! { "_id": peer.id.0 as i64 },
            PeerDocument {
                id: peer.id,
                peer: peer.clone(),
            },
        )
        .await
    }
}
