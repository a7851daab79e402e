// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{Bson, Document},
    error::{Error, ErrorKind, WriteFailure},
    options::{FindOneOptions, FindOptions, IndexOptions, ReplaceOptions},
    results::UpdateResult,
    IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Whether a write was rejected by a unique index.
pub fn is_duplicate_key(error: &Error) -> bool {
    let code = match &*error.kind {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code,
        ErrorKind::Command(e) => e.code,
        _ => return false,
    };
    code == DUPLICATE_KEY_CODE
}

/// A named, non-unique index.
pub(crate) fn index(name: &str, keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

/// A named unique index, optionally restricted to the documents matching `partial`.
pub(crate) fn unique_index(name: &str, keys: Document, partial: Option<Document>) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .partial_filter_expression(partial)
                .build(),
        )
        .build()
}

/// A MongoDB collection holding one kind of monitor entity.
pub trait MongoDbCollection {
    /// The collection name.
    const NAME: &'static str;
    /// The stored document.
    type Document: Serialize + DeserializeOwned + Unpin + Send + Sync;

    /// Wraps the typed driver handle.
    fn instantiate(collection: mongodb::Collection<Self::Document>) -> Self;

    fn collection(&self) -> &mongodb::Collection<Self::Document>;

    /// The indexes to create together with the collection.
    fn indexes() -> Vec<IndexModel> {
        Vec::new()
    }
}

/// The access patterns the monitor entities share.
#[async_trait]
pub trait MongoDbCollectionExt: MongoDbCollection + Sync {
    /// Gets the first match, in `sort` order if one is given.
    async fn first(
        &self,
        filter: Document,
        sort: impl Into<Option<Document>> + Send,
    ) -> Result<Option<Self::Document>, Error> {
        let options = FindOneOptions::builder().sort(sort.into()).build();
        self.collection().find_one(filter, options).await
    }

    /// Collects every match in `sort` order.
    async fn all(&self, filter: Document, sort: Document) -> Result<Vec<Self::Document>, Error> {
        let options = FindOptions::builder().sort(sort).build();
        self.collection().find(filter, options).await?.try_collect().await
    }

    /// Inserts a document. A unique index conflict surfaces as a duplicate key error.
    async fn insert(&self, document: Self::Document) -> Result<(), Error> {
        self.collection().insert_one(document, None).await?;
        Ok(())
    }

    /// Inserts a document unless a unique index already covers it. Returns whether it was new.
    async fn insert_new(&self, document: Self::Document) -> Result<bool, Error> {
        match self.insert(document).await {
            Ok(()) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Replaces the document matching `filter`, or inserts it.
    async fn upsert(&self, filter: Document, document: Self::Document) -> Result<(), Error> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection().replace_one(filter, document, options).await?;
        Ok(())
    }

    /// Sets `fields` on the first match.
    async fn set(&self, filter: Document, fields: Document) -> Result<UpdateResult, Error> {
        let mut update = Document::new();
        update.insert("$set", fields);
        self.collection().update_one(filter, update, None).await
    }

    /// Sets `field` on the first match where it is still null.
    ///
    /// The check and the write are a single operation, so of several concurrent callers exactly one sees `true`.
    async fn set_once(&self, mut filter: Document, field: &str, value: Bson) -> Result<bool, Error> {
        filter.insert(field, Bson::Null);
        let mut fields = Document::new();
        fields.insert(field, value);
        Ok(self.set(filter, fields).await?.modified_count == 1)
    }

    async fn remove(&self, filter: Document) -> Result<(), Error> {
        self.collection().delete_one(filter, None).await?;
        Ok(())
    }
}

impl<T: MongoDbCollection + Sync> MongoDbCollectionExt for T {}
