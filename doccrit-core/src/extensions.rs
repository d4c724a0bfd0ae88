//! Typed operations over any [`MongoOperations`].
//!
//! [`MongoOperationsExt`] is implemented for every `MongoOperations`. Its methods take
//! the entity type as a type parameter: the collection comes from
//! [`Entity::collection_name`] (or from [`Query::in_collection`] when set) and
//! results are decoded into the entity.
//!
//! ```ignore
//! use doccrit::prelude::*;
//!
//! let ops = InMemoryOperations::builder().build().await?;
//! ops.insert(&book).await?;
//!
//! let cheap: Vec<Book> = ops.find::<Book>(Query::new(BookFields::price().lt(10.0))).await?;
//! let dune = ops.query::<Book>().matching(BookFields::title().eq("Dune")).one().await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, marker::PhantomData};

use crate::{
    aggregation::Aggregation,
    entity::{Entity, EntityExt, decode_all, decode_document, decode_value},
    error::{OperationsError, OperationsResult},
    find::ExecutableFind,
    index::{Index, IndexInfo},
    map_reduce::MapReduceOptions,
    near::{GeoResults, NearQuery},
    operations::{DeleteResult, FindAndModifyOptions, MongoOperations, UpdateOptions, UpdateResult},
    page::{Page, PaginationParams},
    query::{Query, id_query},
    update::Update,
};

/// The collection a typed operation on `T` targets.
pub(crate) fn target_collection<'q, T: Entity>(query: &'q Query) -> Cow<'q, str> {
    match query.collection() {
        Some(collection) => Cow::Borrowed(collection),
        None => T::collection_name(),
    }
}

/// Typed operations, available on every [`MongoOperations`] implementation.
#[async_trait]
pub trait MongoOperationsExt: MongoOperations {
    /// The collection `T` is stored in.
    fn collection_name<T: Entity>(&self) -> Cow<'static, str> {
        T::collection_name()
    }

    async fn collection_exists<T: Entity>(&self) -> OperationsResult<bool> {
        self.has_collection(&T::collection_name()).await
    }

    async fn create_collection<T: Entity>(&self) -> OperationsResult<()> {
        self.create_named_collection(&T::collection_name()).await
    }

    async fn drop_collection<T: Entity>(&self) -> OperationsResult<()> {
        self.drop_named_collection(&T::collection_name()).await
    }

    /// Index operations on the collection of `T`.
    fn index_ops<T: Entity>(&self) -> IndexOperations<'_, Self, T> {
        IndexOperations {
            ops: self,
            _entity: PhantomData,
        }
    }

    /// Starts a fluent find on the collection of `T`.
    fn query<T: Entity>(&self) -> ExecutableFind<'_, Self, T> {
        ExecutableFind::new(self)
    }

    /// Finds every `T` matching the query.
    async fn find<T: Entity>(&self, query: Query) -> OperationsResult<Vec<T>> {
        let documents = self
            .find_documents(&target_collection::<T>(&query), &query)
            .await?;
        decode_all(documents)
    }

    /// Finds the first `T` matching the query, in the query's sort order.
    async fn find_one<T: Entity>(&self, query: Query) -> OperationsResult<Option<T>> {
        let query = query.with_limit(1);
        let documents = self
            .find_documents(&target_collection::<T>(&query), &query)
            .await?;
        documents
            .into_iter()
            .next()
            .map(decode_document)
            .transpose()
    }

    /// Finds the `T` with the given `_id`.
    async fn find_by_id<T, I>(&self, id: I) -> OperationsResult<Option<T>>
    where
        T: Entity,
        I: Into<Bson> + Send,
    {
        self.find_one::<T>(id_query(id)).await
    }

    /// Finds every `T` in its collection.
    async fn find_all<T: Entity>(&self) -> OperationsResult<Vec<T>> {
        self.find::<T>(Query::all()).await
    }

    /// Finds one page of `T` matching the query, with the total count of matches.
    async fn find_page<T: Entity>(
        &self,
        query: Query,
        params: &PaginationParams,
    ) -> OperationsResult<Page<T>> {
        let query = query.without_paging();
        let collection = target_collection::<T>(&query).into_owned();

        let total = self.count_documents(&collection, &query).await?;
        let items: Vec<T> = decode_all(
            self.find_documents(&collection, &query.with_page(params))
                .await?,
        )?;

        Ok(params.page_of(items, usize::try_from(total).unwrap_or(usize::MAX)))
    }

    /// Returns `true` if any `T` matches the query.
    async fn exists<T: Entity>(&self, query: Query) -> OperationsResult<bool> {
        let query = query.with_limit(1);
        Ok(self
            .count_documents(&target_collection::<T>(&query), &query)
            .await?
            > 0)
    }

    /// Counts the `T` matching the query.
    async fn count<T: Entity>(&self, query: Query) -> OperationsResult<u64> {
        self.count_documents(&target_collection::<T>(&query), &query)
            .await
    }

    /// Returns the distinct values of `field` among the `T` matching the query.
    async fn find_distinct<T, V>(&self, field: &str, query: Query) -> OperationsResult<Vec<V>>
    where
        T: Entity,
        V: DeserializeOwned + Send,
    {
        self.distinct_values(&target_collection::<T>(&query), field, &query)
            .await?
            .into_iter()
            .map(decode_value)
            .collect()
    }

    /// Inserts an entity and returns its `_id`.
    async fn insert<T: Entity>(&self, entity: &T) -> OperationsResult<Bson> {
        let mut ids = self
            .insert_documents(&T::collection_name(), vec![entity.to_document()?])
            .await?;
        ids.pop()
            .ok_or_else(|| OperationsError::Backend("insert returned no id".to_string()))
    }

    /// Inserts entities in one batch and returns their `_id`s in order.
    async fn insert_all<T: Entity>(&self, entities: &[T]) -> OperationsResult<Vec<Bson>> {
        let documents = entities
            .iter()
            .map(EntityExt::to_document)
            .collect::<OperationsResult<Vec<_>>>()?;
        self.insert_documents(&T::collection_name(), documents)
            .await
    }

    /// Inserts an entity, or replaces the stored one with the same `_id`.
    async fn save<T: Entity>(&self, entity: &T) -> OperationsResult<Bson> {
        self.save_document(&T::collection_name(), entity.to_document()?)
            .await
    }

    /// Updates the first matching `T`, or inserts one built from the query and update.
    async fn upsert<T: Entity>(&self, query: Query, update: Update) -> OperationsResult<UpdateResult> {
        self.update_documents(
            &target_collection::<T>(&query),
            &query,
            &update,
            UpdateOptions::upsert(),
        )
        .await
    }

    /// Updates the first matching `T`.
    async fn update_first<T: Entity>(
        &self,
        query: Query,
        update: Update,
    ) -> OperationsResult<UpdateResult> {
        self.update_documents(
            &target_collection::<T>(&query),
            &query,
            &update,
            UpdateOptions::first(),
        )
        .await
    }

    /// Updates every matching `T`.
    async fn update_multi<T: Entity>(
        &self,
        query: Query,
        update: Update,
    ) -> OperationsResult<UpdateResult> {
        self.update_documents(
            &target_collection::<T>(&query),
            &query,
            &update,
            UpdateOptions::multi(),
        )
        .await
    }

    /// Removes every matching `T`.
    async fn remove<T: Entity>(&self, query: Query) -> OperationsResult<DeleteResult> {
        self.delete_documents(&target_collection::<T>(&query), &query)
            .await
    }

    /// Removes the `T` with the given `_id`.
    async fn remove_by_id<T, I>(&self, id: I) -> OperationsResult<DeleteResult>
    where
        T: Entity,
        I: Into<Bson> + Send,
    {
        self.remove::<T>(id_query(id)).await
    }

    /// Atomically updates the first matching `T` and returns it, before or after the
    /// update depending on `options`.
    async fn find_and_modify<T: Entity>(
        &self,
        query: Query,
        update: Update,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<T>> {
        self.find_and_modify_document(&target_collection::<T>(&query), &query, &update, options)
            .await?
            .map(decode_document)
            .transpose()
    }

    /// Atomically removes the first matching `T` and returns it.
    async fn find_and_remove<T: Entity>(&self, query: Query) -> OperationsResult<Option<T>> {
        self.find_and_remove_document(&target_collection::<T>(&query), &query)
            .await?
            .map(decode_document)
            .transpose()
    }

    /// Removes every matching `T` and returns the removed entities.
    ///
    /// Matches are read first and then removed by `_id`; the two steps are not atomic.
    async fn find_all_and_remove<T: Entity>(&self, query: Query) -> OperationsResult<Vec<T>> {
        let collection = target_collection::<T>(&query).into_owned();
        let documents = self.find_documents(&collection, &query).await?;

        let ids: Vec<Bson> = documents
            .iter()
            .filter_map(|document| document.get("_id").cloned())
            .collect();
        if !ids.is_empty() {
            self.delete_documents(&collection, &Query::from_document(doc! { "_id": { "$in": ids } }))
                .await?;
        }

        decode_all(documents)
    }

    /// Atomically replaces the first matching `T`, keeping its `_id`.
    async fn find_and_replace<T: Entity>(
        &self,
        query: Query,
        replacement: &T,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<T>> {
        let mut document: Document = replacement.to_document()?;
        document.remove("_id");

        self.find_and_replace_document(&target_collection::<T>(&query), &query, document, options)
            .await?
            .map(decode_document)
            .transpose()
    }

    /// Runs a pipeline over the collection of `I` and decodes the output as `O`.
    async fn aggregate<I, O>(&self, aggregation: Aggregation) -> OperationsResult<Vec<O>>
    where
        I: Entity,
        O: DeserializeOwned + Send,
    {
        self.aggregate_in::<O>(&I::collection_name(), aggregation)
            .await
    }

    /// Runs a pipeline over a named collection and decodes the output as `O`.
    async fn aggregate_in<O>(&self, collection: &str, aggregation: Aggregation) -> OperationsResult<Vec<O>>
    where
        O: DeserializeOwned + Send,
    {
        let pipeline = aggregation.to_pipeline()?;
        decode_all(self.aggregate_documents(collection, pipeline).await?)
    }

    /// Runs a map-reduce job over the collection of `T` and decodes each
    /// `{ _id, value }` result as `R`.
    async fn map_reduce<T, R>(&self, options: MapReduceOptions) -> OperationsResult<Vec<R>>
    where
        T: Entity,
        R: DeserializeOwned + Send,
    {
        decode_all(
            self.map_reduce_documents(&T::collection_name(), &options)
                .await?,
        )
    }

    /// Finds `T` near a point, nearest first, with their distances.
    async fn geo_near<T: Entity>(&self, near: NearQuery) -> OperationsResult<GeoResults<T>> {
        let pipeline = near.to_pipeline()?;
        let documents = self
            .aggregate_documents(&T::collection_name(), pipeline)
            .await?;
        GeoResults::from_documents(documents, &near)
    }
}

impl<O: MongoOperations + ?Sized> MongoOperationsExt for O {}

/// Index operations bound to the collection of `T`.
#[derive(Debug)]
pub struct IndexOperations<'a, O: ?Sized, T> {
    ops: &'a O,
    _entity: PhantomData<fn() -> T>,
}

impl<O: MongoOperations + ?Sized, T: Entity> IndexOperations<'_, O, T> {
    /// Creates the index unless one with the same name exists; returns its name.
    pub async fn ensure_index(&self, index: &Index) -> OperationsResult<String> {
        self.ops
            .create_index(&T::collection_name(), index)
            .await
    }

    pub async fn drop_index(&self, name: &str) -> OperationsResult<()> {
        self.ops.drop_index(&T::collection_name(), name).await
    }

    /// Drops every index except the one on `_id`.
    pub async fn drop_all_indexes(&self) -> OperationsResult<()> {
        self.ops.drop_indexes(&T::collection_name()).await
    }

    pub async fn index_info(&self) -> OperationsResult<Vec<IndexInfo>> {
        self.ops.list_indexes(&T::collection_name()).await
    }

    pub async fn index_names(&self) -> OperationsResult<Vec<String>> {
        Ok(self
            .index_info()
            .await?
            .into_iter()
            .map(|info| info.name)
            .collect())
    }
}
