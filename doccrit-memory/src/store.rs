//! In-memory implementation of [`MongoOperations`].
//!
//! Collections keep their documents in insertion order behind an async-aware
//! read-write lock, so natural order is stable and clones share state.

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

use doccrit_core::{
    error::{OperationsError, OperationsResult},
    index::{Index, IndexInfo},
    map_reduce::MapReduceOptions,
    operations::{
        DeleteResult, FindAndModifyOptions, MongoOperations, OperationsBuilder, UpdateOptions,
        UpdateResult, log_json,
    },
    query::Query,
    update::Update,
};

use crate::{
    evaluator, path,
    pipeline::{self, SortKeys},
    updater,
};

const ID: &str = "_id";
const ID_INDEX: &str = "_id_";

type StoreMap = HashMap<String, Collection>;

#[derive(Debug, Clone)]
struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexInfo>,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![IndexInfo {
                name: ID_INDEX.to_string(),
                keys: doc! { "_id": 1 },
                unique: true,
                sparse: false,
            }],
        }
    }
}

impl Collection {
    /// Positions of the documents matching `filter`, in `sort` order when one is given.
    fn matching(&self, filter: &Document, sort: &Document) -> OperationsResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if evaluator::matches(document, filter)? {
                positions.push(position);
            }
        }

        if !sort.is_empty() {
            let keys = SortKeys::parse(sort)?;
            positions.sort_by(|a, b| keys.compare(&self.documents[*a], &self.documents[*b]));
        }
        Ok(positions)
    }

    fn first_matching(&self, query: &Query) -> OperationsResult<Option<usize>> {
        let positions = self.matching(&query.filter_document()?, &query.sort_document())?;
        Ok(positions.first().copied())
    }

    /// Rejects `document` if it collides with another document on a unique index.
    fn check_unique(&self, name: &str, document: &Document, replacing: Option<usize>) -> OperationsResult<()> {
        for index in self.indexes.iter().filter(|index| index.unique) {
            let key: Vec<Option<&Bson>> = index
                .keys
                .keys()
                .map(|field| path::get(document, field))
                .collect();
            if index.sparse && key.iter().all(Option::is_none) {
                continue;
            }

            let clash = self
                .documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != replacing)
                .any(|(_, existing)| {
                    index.keys.keys().zip(&key).all(|(field, value)| {
                        evaluator::equal(
                            path::get(existing, field).unwrap_or(&Bson::Null),
                            value.unwrap_or(&Bson::Null),
                        )
                    })
                });

            if clash {
                let rendered = key
                    .iter()
                    .map(|value| value.map_or_else(|| "null".to_string(), ToString::to_string))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(OperationsError::DuplicateKey(rendered, name.to_string()));
            }
        }
        Ok(())
    }

    /// The field covered by a `2d` or `2dsphere` index, if any.
    fn geo_field(&self) -> Option<&str> {
        self.indexes
            .iter()
            .flat_map(|index| index.keys.iter())
            .find(|(_, kind)| matches!(kind, Bson::String(k) if k == "2d" || k == "2dsphere"))
            .map(|(field, _)| field.as_str())
    }

    fn insert(&mut self, name: &str, mut document: Document) -> OperationsResult<Bson> {
        let id = ensure_id(&mut document);
        self.check_unique(name, &document, None)?;
        self.documents.push(document);
        Ok(id)
    }

    /// Replaces the document at `position`, returning whether it changed.
    fn replace_at(&mut self, name: &str, position: usize, document: Document) -> OperationsResult<bool> {
        let current = &self.documents[position];
        if document.get(ID) != current.get(ID) {
            return Err(OperationsError::Backend(
                "the immutable field '_id' cannot be modified".to_string(),
            ));
        }
        if &document == current {
            return Ok(false);
        }

        self.check_unique(name, &document, Some(position))?;
        self.documents[position] = document;
        Ok(true)
    }

    fn update_at(&mut self, name: &str, position: usize, update: &Document) -> OperationsResult<bool> {
        let mut updated = self.documents[position].clone();
        updater::apply(&mut updated, update, false)?;
        self.replace_at(name, position, updated)
    }

    /// Inserts the document an upsert produces when nothing matched.
    fn upsert(&mut self, name: &str, filter: &Document, update: &Document) -> OperationsResult<Document> {
        let mut document = updater::seed_from_filter(filter)?;
        updater::apply(&mut document, update, true)?;
        ensure_id(&mut document);
        self.check_unique(name, &document, None)?;
        self.documents.push(document.clone());
        Ok(document)
    }
}

/// Puts `id` first in `document`, replacing any `_id` it carries.
fn with_id(id: Bson, document: Document) -> Document {
    let mut identified = Document::new();
    identified.insert(ID, id);
    for (key, value) in document {
        if key != ID {
            identified.insert(key, value);
        }
    }
    identified
}

/// Returns the document's `_id`, generating an `ObjectId` first if it has none.
fn ensure_id(document: &mut Document) -> Bson {
    match document.get(ID) {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            *document = with_id(id.clone(), std::mem::take(document));
            id
        }
    }
}

fn window(query: &Query) -> (usize, usize) {
    let to_usize = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
    (
        query.skip().map_or(0, to_usize),
        query
            .limit()
            .filter(|limit| *limit > 0)
            .map_or(usize::MAX, to_usize),
    )
}

/// Thread-safe in-memory document store.
///
/// Implements [`MongoOperations`] by evaluating rendered filter, update and pipeline
/// documents directly. Clones share the same underlying data.
///
/// Supported: comparison, element, array, logical, `$regex`, `$mod`, bitwise and
/// `$geoWithin` query operators; every update operator the [`Update`] builder
/// renders; the `$geoNear`, `$match`, `$sort`, `$skip`, `$limit`, `$count`,
/// `$unwind`, `$project` and `$group` stages; unique and sparse indexes. Anything
/// else, map-reduce included, fails with [`OperationsError::Unsupported`].
///
/// # Example
///
/// ```ignore
/// use doccrit_memory::InMemoryOperations;
/// use doccrit::prelude::*;
///
/// let ops = InMemoryOperations::new();
/// ops.insert(&Book { title: "Dune".into(), year: 1965 }).await?;
///
/// let found = ops.find::<Book>(Query::new(BookFields::year().lt(2000))).await?;
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryOperations {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryOperations {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryOperationsBuilder {
        InMemoryOperationsBuilder::default()
    }
}

#[async_trait]
impl MongoOperations for InMemoryOperations {
    async fn collection_names(&self) -> OperationsResult<Vec<String>> {
        let mut names: Vec<String> = self.store.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn has_collection(&self, collection: &str) -> OperationsResult<bool> {
        Ok(self.store.read().await.contains_key(collection))
    }

    async fn create_named_collection(&self, collection: &str) -> OperationsResult<()> {
        debug!(collection, "create collection");
        let mut store = self.store.write().await;
        if store.contains_key(collection) {
            return Err(OperationsError::Backend(format!(
                "collection {collection} already exists"
            )));
        }
        store.insert(collection.to_string(), Collection::default());
        Ok(())
    }

    async fn drop_named_collection(&self, collection: &str) -> OperationsResult<()> {
        debug!(collection, "drop collection");
        self.store.write().await.remove(collection);
        Ok(())
    }

    async fn find_documents(&self, collection: &str, query: &Query) -> OperationsResult<Vec<Document>> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "find documents");

        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let (skip, limit) = window(query);
        let projection = query.projection_document();
        data.matching(&filter, &query.sort_document())?
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|position| {
                let document = &data.documents[position];
                match &projection {
                    Some(spec) => pipeline::project(document, spec),
                    None => Ok(document.clone()),
                }
            })
            .collect()
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> OperationsResult<u64> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "count documents");

        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(0);
        };

        let (skip, limit) = window(query);
        let matched = data.matching(&filter, &Document::new())?.len();
        Ok(matched.saturating_sub(skip).min(limit) as u64)
    }

    async fn distinct_values(
        &self,
        collection: &str,
        field: &str,
        query: &Query,
    ) -> OperationsResult<Vec<Bson>> {
        let filter = query.filter_document()?;
        debug!(collection, field, filter = %log_json(&filter), "distinct values");

        let store = self.store.read().await;
        let Some(data) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut distinct: Vec<Bson> = Vec::new();
        for position in data.matching(&filter, &Document::new())? {
            for value in path::lookup(&data.documents[position], field) {
                let candidates = match value {
                    Bson::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                for candidate in candidates {
                    if !distinct.iter().any(|seen| evaluator::equal(seen, candidate)) {
                        distinct.push(candidate.clone());
                    }
                }
            }
        }
        Ok(distinct)
    }

    async fn insert_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> OperationsResult<Vec<Bson>> {
        debug!(collection, count = documents.len(), "insert documents");

        let mut store = self.store.write().await;
        let data = store.entry(collection.to_string()).or_default();
        documents
            .into_iter()
            .map(|document| data.insert(collection, document))
            .collect()
    }

    async fn save_document(&self, collection: &str, mut document: Document) -> OperationsResult<Bson> {
        let id = ensure_id(&mut document);
        debug!(collection, id = %id, "save document");

        let mut store = self.store.write().await;
        let data = store.entry(collection.to_string()).or_default();
        let existing = data
            .documents
            .iter()
            .position(|stored| stored.get(ID).is_some_and(|stored_id| evaluator::equal(stored_id, &id)));

        match existing {
            Some(position) => {
                data.replace_at(collection, position, document)?;
                Ok(id)
            }
            None => data.insert(collection, document),
        }
    }

    async fn update_documents(
        &self,
        collection: &str,
        query: &Query,
        update: &Update,
        options: UpdateOptions,
    ) -> OperationsResult<UpdateResult> {
        let filter = query.filter_document()?;
        let rendered = update.to_document()?;
        debug!(
            collection,
            filter = %log_json(&filter),
            update = %log_json(&rendered),
            multi = options.multi,
            upsert = options.upsert,
            "update documents"
        );

        let mut store = self.store.write().await;
        if !options.upsert && !store.contains_key(collection) {
            return Ok(UpdateResult {
                matched: 0,
                modified: 0,
                upserted_id: None,
            });
        }
        let data = store.entry(collection.to_string()).or_default();

        let mut positions = data.matching(&filter, &query.sort_document())?;
        if !options.multi {
            positions.truncate(1);
        }

        if positions.is_empty() && options.upsert {
            let inserted = data.upsert(collection, &filter, &rendered)?;
            return Ok(UpdateResult {
                matched: 0,
                modified: 0,
                upserted_id: inserted.get(ID).cloned(),
            });
        }

        let mut modified = 0;
        for position in &positions {
            if data.update_at(collection, *position, &rendered)? {
                modified += 1;
            }
        }

        Ok(UpdateResult {
            matched: positions.len() as u64,
            modified,
            upserted_id: None,
        })
    }

    async fn delete_documents(&self, collection: &str, query: &Query) -> OperationsResult<DeleteResult> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "delete documents");

        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(DeleteResult { deleted: 0 });
        };

        let mut positions = data.matching(&filter, &Document::new())?;
        positions.sort_unstable_by(|a, b| b.cmp(a));
        for position in &positions {
            data.documents.remove(*position);
        }

        Ok(DeleteResult {
            deleted: positions.len() as u64,
        })
    }

    async fn find_and_modify_document(
        &self,
        collection: &str,
        query: &Query,
        update: &Update,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<Document>> {
        let filter = query.filter_document()?;
        let rendered = update.to_document()?;
        debug!(
            collection,
            filter = %log_json(&filter),
            update = %log_json(&rendered),
            "find and modify"
        );

        let mut store = self.store.write().await;
        if !options.upsert && !store.contains_key(collection) {
            return Ok(None);
        }
        let data = store.entry(collection.to_string()).or_default();

        match data.first_matching(query)? {
            Some(position) => {
                let before = data.documents[position].clone();
                data.update_at(collection, position, &rendered)?;
                Ok(Some(if options.return_new {
                    data.documents[position].clone()
                } else {
                    before
                }))
            }
            None if options.upsert => {
                let inserted = data.upsert(collection, &filter, &rendered)?;
                Ok(options.return_new.then_some(inserted))
            }
            None => Ok(None),
        }
    }

    async fn find_and_remove_document(
        &self,
        collection: &str,
        query: &Query,
    ) -> OperationsResult<Option<Document>> {
        debug!(collection, filter = %log_json(&query.filter_document()?), "find and remove");

        let mut store = self.store.write().await;
        let Some(data) = store.get_mut(collection) else {
            return Ok(None);
        };

        Ok(data
            .first_matching(query)?
            .map(|position| data.documents.remove(position)))
    }

    async fn find_and_replace_document(
        &self,
        collection: &str,
        query: &Query,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> OperationsResult<Option<Document>> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "find and replace");

        let mut store = self.store.write().await;
        if !options.upsert && !store.contains_key(collection) {
            return Ok(None);
        }
        let data = store.entry(collection.to_string()).or_default();

        match data.first_matching(query)? {
            Some(position) => {
                let before = data.documents[position].clone();
                let id = before.get(ID).cloned().unwrap_or(Bson::Null);
                let replacement = with_id(id, replacement);
                data.replace_at(collection, position, replacement.clone())?;
                Ok(Some(if options.return_new { replacement } else { before }))
            }
            None if options.upsert => {
                let mut document = match updater::seed_from_filter(&filter)?.get(ID) {
                    Some(id) => with_id(id.clone(), replacement),
                    None => replacement,
                };
                ensure_id(&mut document);
                data.insert(collection, document.clone())?;
                Ok(options.return_new.then_some(document))
            }
            None => Ok(None),
        }
    }

    async fn aggregate_documents(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> OperationsResult<Vec<Document>> {
        debug!(
            collection,
            pipeline = %pipeline.iter().map(log_json).collect::<Vec<_>>().join(", "),
            "aggregate"
        );

        let store = self.store.read().await;
        match store.get(collection) {
            Some(data) => pipeline::run(data.documents.clone(), &pipeline, data.geo_field()),
            None => pipeline::run(Vec::new(), &pipeline, None),
        }
    }

    async fn map_reduce_documents(
        &self,
        collection: &str,
        options: &MapReduceOptions,
    ) -> OperationsResult<Vec<Document>> {
        debug!(collection, output = ?options.get_output(), "map reduce");
        Err(OperationsError::Unsupported(
            "map-reduce needs a JavaScript engine and is only available on a server".to_string(),
        ))
    }

    async fn create_index(&self, collection: &str, index: &Index) -> OperationsResult<String> {
        let name = index.name();
        debug!(collection, index = %name, "create index");

        let mut store = self.store.write().await;
        let data = store.entry(collection.to_string()).or_default();
        if data.indexes.iter().any(|existing| existing.name == name) {
            return Ok(name);
        }

        let info = IndexInfo {
            name: name.clone(),
            keys: index.keys_document(),
            unique: index.is_unique(),
            sparse: index.is_sparse(),
        };

        if info.unique {
            let mut probe = Collection {
                documents: Vec::with_capacity(data.documents.len()),
                indexes: vec![info.clone()],
            };
            for document in &data.documents {
                probe.check_unique(collection, document, None)?;
                probe.documents.push(document.clone());
            }
        }

        data.indexes.push(info);
        Ok(name)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> OperationsResult<()> {
        debug!(collection, index = name, "drop index");
        if name == ID_INDEX {
            return Err(OperationsError::Backend("cannot drop the _id index".to_string()));
        }

        let mut store = self.store.write().await;
        let data = store
            .get_mut(collection)
            .ok_or_else(|| OperationsError::CollectionNotFound(collection.to_string()))?;

        let before = data.indexes.len();
        data.indexes.retain(|index| index.name != name);
        if data.indexes.len() == before {
            return Err(OperationsError::Backend(format!("index not found with name [{name}]")));
        }
        Ok(())
    }

    async fn drop_indexes(&self, collection: &str) -> OperationsResult<()> {
        debug!(collection, "drop indexes");
        if let Some(data) = self.store.write().await.get_mut(collection) {
            data.indexes.retain(|index| index.name == ID_INDEX);
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> OperationsResult<Vec<IndexInfo>> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .map(|data| data.indexes.clone())
            .unwrap_or_default())
    }

    async fn shutdown(&self) -> OperationsResult<()> {
        info!("in-memory store shut down");
        Ok(())
    }
}

/// Builder for [`InMemoryOperations`].
///
/// ```ignore
/// let ops = InMemoryOperations::builder()
///     .with_collection("books")
///     .build()
///     .await?;
/// ```
#[derive(Default, Debug)]
pub struct InMemoryOperationsBuilder {
    collections: Vec<String>,
}

impl InMemoryOperationsBuilder {
    /// Creates the named collection up front.
    pub fn with_collection(mut self, name: impl Into<String>) -> Self {
        self.collections.push(name.into());
        self
    }
}

#[async_trait]
impl OperationsBuilder for InMemoryOperationsBuilder {
    type Operations = InMemoryOperations;

    async fn build(self) -> OperationsResult<Self::Operations> {
        let operations = InMemoryOperations::new();
        {
            let mut store = operations.store.write().await;
            for name in self.collections {
                store.entry(name).or_default();
            }
        }

        info!("in-memory store ready");
        Ok(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doccrit_core::{
        index::IndexKind,
        query::{Direction, Sort},
    };
    use pretty_assertions::assert_eq;

    fn query(filter: Document) -> Query {
        Query::from_document(filter)
    }

    async fn seeded() -> InMemoryOperations {
        let ops = InMemoryOperations::new();
        ops.insert_documents(
            "books",
            vec![
                doc! { "_id": 1, "title": "Dune", "year": 1965, "tags": ["scifi", "classic"] },
                doc! { "_id": 2, "title": "Emma", "year": 1815, "tags": ["classic"] },
                doc! { "_id": 3, "title": "Neuromancer", "year": 1984, "tags": ["scifi"] },
            ],
        )
        .await
        .unwrap();
        ops
    }

    #[tokio::test]
    async fn insert_assigns_object_ids() {
        let ops = InMemoryOperations::new();
        let ids = ops
            .insert_documents("books", vec![doc! { "title": "Dune" }, doc! { "_id": 7, "title": "Emma" }])
            .await
            .unwrap();

        assert!(matches!(ids[0], Bson::ObjectId(_)));
        assert_eq!(ids[1], Bson::Int32(7));

        let stored = ops.find_documents("books", &Query::all()).await.unwrap();
        assert_eq!(stored[0].keys().next().map(String::as_str), Some("_id"));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let ops = seeded().await;
        let error = ops
            .insert_documents("books", vec![doc! { "_id": 1, "title": "Again" }])
            .await
            .unwrap_err();
        assert!(matches!(error, OperationsError::DuplicateKey(_, ref c) if c == "books"));
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let ops = seeded().await;
        let query = query(doc! { "tags": "scifi" })
            .with_sort(Sort::by_path("year", Direction::Desc))
            .with_skip(1)
            .with_limit(5);

        let found = ops.find_documents("books", &query).await.unwrap();
        assert_eq!(found, vec![doc! { "_id": 1, "title": "Dune", "year": 1965, "tags": ["scifi", "classic"] }]);
        assert_eq!(ops.count_documents("books", &query).await.unwrap(), 1);
        assert_eq!(ops.count_documents("books", &Query::all()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn missing_collections_read_as_empty() {
        let ops = InMemoryOperations::new();
        assert!(ops.find_documents("nothing", &Query::all()).await.unwrap().is_empty());
        assert_eq!(ops.count_documents("nothing", &Query::all()).await.unwrap(), 0);
        assert!(!ops.has_collection("nothing").await.unwrap());
    }

    #[tokio::test]
    async fn distinct_flattens_arrays() {
        let ops = seeded().await;
        let tags = ops.distinct_values("books", "tags", &Query::all()).await.unwrap();
        assert_eq!(tags, vec![Bson::String("scifi".into()), Bson::String("classic".into())]);
    }

    #[tokio::test]
    async fn update_first_multi_and_upsert() {
        let ops = seeded().await;
        let bump = Update::from_document(doc! { "$inc": { "year": 1 } });

        let first = ops
            .update_documents("books", &query(doc! { "tags": "classic" }), &bump, UpdateOptions::first())
            .await
            .unwrap();
        assert_eq!((first.matched, first.modified), (1, 1));

        let multi = ops
            .update_documents("books", &Query::all(), &bump, UpdateOptions::multi())
            .await
            .unwrap();
        assert_eq!((multi.matched, multi.modified), (3, 3));

        let upserted = ops
            .update_documents(
                "books",
                &query(doc! { "title": "Solaris" }),
                &Update::from_document(doc! { "$set": { "year": 1961 } }),
                UpdateOptions::upsert(),
            )
            .await
            .unwrap();
        assert!(upserted.upserted_id.is_some());

        let solaris = ops
            .find_documents("books", &query(doc! { "title": "Solaris" }))
            .await
            .unwrap();
        assert_eq!(solaris[0].get_i32("year").unwrap(), 1961);
    }

    #[tokio::test]
    async fn updates_cannot_change_ids() {
        let ops = seeded().await;
        let error = ops
            .update_documents(
                "books",
                &query(doc! { "_id": 1 }),
                &Update::from_document(doc! { "$set": { "_id": 9 } }),
                UpdateOptions::first(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, OperationsError::Backend(_)));
    }

    #[tokio::test]
    async fn find_and_modify_returns_old_or_new() {
        let ops = seeded().await;
        let update = Update::from_document(doc! { "$set": { "title": "Dune Messiah" } });

        let old = ops
            .find_and_modify_document("books", &query(doc! { "_id": 1 }), &update, FindAndModifyOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.get_str("title").unwrap(), "Dune");

        let update = Update::from_document(doc! { "$set": { "title": "Children of Dune" } });
        let new = ops
            .find_and_modify_document(
                "books",
                &query(doc! { "_id": 1 }),
                &update,
                FindAndModifyOptions::new().return_new(true),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new.get_str("title").unwrap(), "Children of Dune");
    }

    #[tokio::test]
    async fn find_and_replace_keeps_the_id() {
        let ops = seeded().await;
        let replaced = ops
            .find_and_replace_document(
                "books",
                &query(doc! { "title": "Emma" }),
                doc! { "title": "Persuasion", "year": 1817 },
                FindAndModifyOptions::new().return_new(true),
            )
            .await
            .unwrap();
        assert_eq!(replaced, Some(doc! { "_id": 2, "title": "Persuasion", "year": 1817 }));
    }

    #[tokio::test]
    async fn find_and_remove_takes_the_first_in_sort_order() {
        let ops = seeded().await;
        let removed = ops
            .find_and_remove_document(
                "books",
                &Query::all().with_sort(Sort::by_path("year", Direction::Asc)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.get_str("title").unwrap(), "Emma");
        assert_eq!(ops.count_documents("books", &Query::all()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_and_save() {
        let ops = seeded().await;
        let deleted = ops
            .delete_documents("books", &query(doc! { "tags": "scifi" }))
            .await
            .unwrap();
        assert_eq!(deleted.deleted, 2);

        ops.save_document("books", doc! { "_id": 2, "title": "Emma", "year": 1816 })
            .await
            .unwrap();
        let emma = ops.find_documents("books", &Query::all()).await.unwrap();
        assert_eq!(emma, vec![doc! { "_id": 2, "title": "Emma", "year": 1816 }]);
    }

    #[tokio::test]
    async fn unique_indexes_are_enforced() {
        let ops = seeded().await;
        let index = Index::on("title", IndexKind::Ascending).unique();
        assert_eq!(ops.create_index("books", &index).await.unwrap(), "title_1");

        let error = ops
            .insert_documents("books", vec![doc! { "title": "Dune" }])
            .await
            .unwrap_err();
        assert!(matches!(error, OperationsError::DuplicateKey(..)));

        let names: Vec<String> = ops
            .list_indexes("books")
            .await
            .unwrap()
            .into_iter()
            .map(|index| index.name)
            .collect();
        assert_eq!(names, vec!["_id_".to_string(), "title_1".to_string()]);

        ops.drop_indexes("books").await.unwrap();
        assert_eq!(ops.list_indexes("books").await.unwrap().len(), 1);
        assert!(ops.drop_index("books", "_id_").await.is_err());
    }

    #[tokio::test]
    async fn collections_lifecycle() {
        let ops = InMemoryOperations::builder()
            .with_collection("authors")
            .build()
            .await
            .unwrap();

        assert!(ops.create_named_collection("authors").await.is_err());
        ops.create_named_collection("books").await.unwrap();
        assert_eq!(
            ops.collection_names().await.unwrap(),
            vec!["authors".to_string(), "books".to_string()]
        );

        ops.drop_named_collection("books").await.unwrap();
        ops.drop_named_collection("books").await.unwrap();
        assert!(!ops.has_collection("books").await.unwrap());
    }

    #[tokio::test]
    async fn aggregate_uses_the_geo_index() {
        let ops = InMemoryOperations::new();
        ops.insert_documents(
            "venues",
            vec![
                doc! { "name": "far", "location": [3.0, 4.0] },
                doc! { "name": "near", "location": [0.0, 1.0] },
            ],
        )
        .await
        .unwrap();
        ops.create_index("venues", &Index::on("location", IndexKind::Geo2d))
            .await
            .unwrap();

        let found = ops
            .aggregate_documents(
                "venues",
                vec![doc! { "$geoNear": { "near": [0.0, 0.0], "distanceField": "dis", "spherical": false } }],
            )
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.get_str("name").unwrap()).collect();
        assert_eq!(names, vec!["near", "far"]);
        assert_eq!(found[1].get_f64("dis").unwrap(), 5.0);
    }

    #[tokio::test]
    async fn map_reduce_is_unsupported() {
        let ops = seeded().await;
        let options = MapReduceOptions::new("function() {}", "function(k, v) {}");
        let error = ops.map_reduce_documents("books", &options).await.unwrap_err();
        assert!(matches!(error, OperationsError::Unsupported(_)));
    }
}
