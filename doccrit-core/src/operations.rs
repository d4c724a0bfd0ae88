//! The untyped operations interface implemented by store backends.
//!
//! [`MongoOperations`] addresses collections by name and works on raw BSON documents.
//! Typed access (collection from the entity type, decoding into the entity) lives in
//! [`MongoOperationsExt`](crate::extensions::MongoOperationsExt), which every
//! implementation gets for free.
//!
//! # Traits
//!
//! - [`MongoOperations`]: the core trait for store backends
//! - [`OperationsBuilder`]: factory trait for creating backend instances

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    error::OperationsResult,
    index::{Index, IndexInfo},
    map_reduce::MapReduceOptions,
    query::Query,
    update::Update,
};

/// Options for update operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first.
    pub multi: bool,
    /// Insert a document built from the query and update when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn multi() -> Self {
        Self {
            multi: true,
            upsert: false,
        }
    }

    pub fn upsert() -> Self {
        Self {
            multi: false,
            upsert: true,
        }
    }
}

/// Options for find-and-modify and find-and-replace operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindAndModifyOptions {
    /// Return the document after modification instead of before.
    pub return_new: bool,
    /// Insert when nothing matches.
    pub upsert: bool,
}

impl FindAndModifyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn return_new(mut self, return_new: bool) -> Self {
        self.return_new = return_new;
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Outcome of an update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateResult {
    /// Number of documents that matched the query.
    pub matched: u64,
    /// Number of documents actually changed.
    pub modified: u64,
    /// `_id` of the inserted document when an upsert inserted.
    pub upserted_id: Option<Bson>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Abstract interface for document store operations.
///
/// Implementations must be thread-safe. Queries, updates and pipelines arrive as
/// builders; implementations render them and report rendering failures as
/// [`OperationsError::Criteria`](crate::error::OperationsError::Criteria).
///
/// Collections are created implicitly on first write.
#[async_trait]
pub trait MongoOperations: Send + Sync + Debug {
    /// Lists the names of all collections.
    async fn collection_names(&self) -> OperationsResult<Vec<String>>;

    async fn has_collection(&self, collection: &str) -> OperationsResult<bool>;

    /// Creates an empty collection.
    ///
    /// # Errors
    ///
    /// Fails if the collection already exists.
    async fn create_named_collection(&self, collection: &str) -> OperationsResult<()>;

    /// Drops a collection and all its documents. Dropping a missing collection is a no-op.
    async fn drop_named_collection(&self, collection: &str) -> OperationsResult<()>;

    /// Finds documents matching the query, honouring sort, skip, limit and projection.
    async fn find_documents(&self, collection: &str, query: &Query) -> OperationsResult<Vec<Document>>;

    /// Counts documents matching the query's filter, honouring skip and limit.
    async fn count_documents(&self, collection: &str, query: &Query) -> OperationsResult<u64>;

    /// Returns the distinct values of `field` among documents matching the query.
    ///
    /// Array fields contribute each of their elements.
    async fn distinct_values(
        &self,
        collection: &str,
        field: &str,
        query: &Query,
    ) -> OperationsResult<Vec<Bson>>;

    /// Inserts documents, assigning an `ObjectId` to those without `_id`.
    ///
    /// Returns the `_id` of each document in input order.
    ///
    /// # Errors
    ///
    /// Returns [`OperationsError::DuplicateKey`](crate::error::OperationsError::DuplicateKey)
    /// if an `_id` is already taken.
    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> OperationsResult<Vec<Bson>>;

    /// Saves a document: replaces the document with the same `_id`, or inserts it.
    async fn save_document(&self, collection: &str, document: Document) -> OperationsResult<Bson>;

    /// Applies an update to the first or every document matching the query.
    async fn update_documents(
        &self,
        collection: &str,
        query: &Query,
        update: &Update,
        options: UpdateOptions,
    ) -> OperationsResult<UpdateResult>;

    /// Removes every document matching the query.
    async fn delete_documents(&self, collection: &str, query: &Query) -> OperationsResult<DeleteResult>;

    /// Atomically updates the first matching document and returns it.
    async fn find_and_modify_document(
        &self,
        collection: &str,
        query: &Query,
        update: &Update,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<Document>>;

    /// Atomically removes the first matching document and returns it.
    async fn find_and_remove_document(
        &self,
        collection: &str,
        query: &Query,
    ) -> OperationsResult<Option<Document>>;

    /// Atomically replaces the first matching document and returns it.
    ///
    /// The replacement keeps the `_id` of the replaced document.
    async fn find_and_replace_document(
        &self,
        collection: &str,
        query: &Query,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<Document>>;

    /// Runs an aggregation pipeline.
    async fn aggregate_documents(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> OperationsResult<Vec<Document>>;

    /// Runs a map-reduce job and returns its `{ _id, value }` results.
    async fn map_reduce_documents(
        &self,
        collection: &str,
        options: &MapReduceOptions,
    ) -> OperationsResult<Vec<Document>>;

    /// Creates an index if no index with the same name exists; returns its name.
    async fn create_index(&self, collection: &str, index: &Index) -> OperationsResult<String>;

    async fn drop_index(&self, collection: &str, name: &str) -> OperationsResult<()>;

    /// Drops every index except the one on `_id`.
    async fn drop_indexes(&self, collection: &str) -> OperationsResult<()>;

    async fn list_indexes(&self, collection: &str) -> OperationsResult<Vec<IndexInfo>>;

    /// Releases connections and other resources. The default is a no-op.
    async fn shutdown(&self) -> OperationsResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<O> MongoOperations for &O
where
    O: MongoOperations + ?Sized,
{
    async fn collection_names(&self) -> OperationsResult<Vec<String>> {
        (**self).collection_names().await
    }

    async fn has_collection(&self, collection: &str) -> OperationsResult<bool> {
        (**self).has_collection(collection).await
    }

    async fn create_named_collection(&self, collection: &str) -> OperationsResult<()> {
        (**self).create_named_collection(collection).await
    }

    async fn drop_named_collection(&self, collection: &str) -> OperationsResult<()> {
        (**self).drop_named_collection(collection).await
    }

    async fn find_documents(&self, collection: &str, query: &Query) -> OperationsResult<Vec<Document>> {
        (**self).find_documents(collection, query).await
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> OperationsResult<u64> {
        (**self).count_documents(collection, query).await
    }

    async fn distinct_values(
        &self,
        collection: &str,
        field: &str,
        query: &Query,
    ) -> OperationsResult<Vec<Bson>> {
        (**self)
            .distinct_values(collection, field, query)
            .await
    }

    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> OperationsResult<Vec<Bson>> {
        (**self)
            .insert_documents(collection, documents)
            .await
    }

    async fn save_document(&self, collection: &str, document: Document) -> OperationsResult<Bson> {
        (**self).save_document(collection, document).await
    }

    async fn update_documents(
        &self,
        collection: &str,
        query: &Query,
        update: &Update,
        options: UpdateOptions,
    ) -> OperationsResult<UpdateResult> {
        (**self)
            .update_documents(collection, query, update, options)
            .await
    }

    async fn delete_documents(&self, collection: &str, query: &Query) -> OperationsResult<DeleteResult> {
        (**self).delete_documents(collection, query).await
    }

    async fn find_and_modify_document(
        &self,
        collection: &str,
        query: &Query,
        update: &Update,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<Document>> {
        (**self)
            .find_and_modify_document(collection, query, update, options)
            .await
    }

    async fn find_and_remove_document(
        &self,
        collection: &str,
        query: &Query,
    ) -> OperationsResult<Option<Document>> {
        (**self)
            .find_and_remove_document(collection, query)
            .await
    }

    async fn find_and_replace_document(
        &self,
        collection: &str,
        query: &Query,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<Document>> {
        (**self)
            .find_and_replace_document(collection, query, replacement, options)
            .await
    }

    async fn aggregate_documents(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> OperationsResult<Vec<Document>> {
        (**self)
            .aggregate_documents(collection, pipeline)
            .await
    }

    async fn map_reduce_documents(
        &self,
        collection: &str,
        options: &MapReduceOptions,
    ) -> OperationsResult<Vec<Document>> {
        (**self)
            .map_reduce_documents(collection, options)
            .await
    }

    async fn create_index(&self, collection: &str, index: &Index) -> OperationsResult<String> {
        (**self).create_index(collection, index).await
    }

    async fn drop_index(&self, collection: &str, name: &str) -> OperationsResult<()> {
        (**self).drop_index(collection, name).await
    }

    async fn drop_indexes(&self, collection: &str) -> OperationsResult<()> {
        (**self).drop_indexes(collection).await
    }

    async fn list_indexes(&self, collection: &str) -> OperationsResult<Vec<IndexInfo>> {
        (**self).list_indexes(collection).await
    }

    async fn shutdown(&self) -> OperationsResult<()> {
        (**self).shutdown().await
    }
}

/// Factory trait for creating store backends.
///
/// Builders collect configuration and establish connections in
/// [`build`](OperationsBuilder::build).
#[async_trait]
pub trait OperationsBuilder {
    type Operations: MongoOperations;

    async fn build(self) -> OperationsResult<Self::Operations>;
}

/// Renders a filter, update or pipeline stage as compact JSON for log fields.
pub fn log_json(document: &Document) -> String {
    serde_json::to_string(document).unwrap_or_else(|_| document.to_string())
}
