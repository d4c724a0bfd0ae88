use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{
        ClientOptions, CountOptions, FindOneAndDeleteOptions, FindOneAndReplaceOptions,
        FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
    },
};
use tracing::{debug, info};

use doccrit_core::{
    error::{OperationsError, OperationsResult},
    index::{Index, IndexInfo},
    map_reduce::{MapReduceOptions, MapReduceOutput},
    operations::{
        DeleteResult, FindAndModifyOptions, MongoOperations, OperationsBuilder, UpdateOptions,
        UpdateResult, log_json,
    },
    query::Query,
    update::Update,
};

const DUPLICATE_KEY: i32 = 11000;

/// Maps driver errors, reporting duplicate-key write errors as
/// [`OperationsError::DuplicateKey`].
fn map_error(collection: &str, error: MongoError) -> OperationsError {
    let duplicate = match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            Some(write.message.clone())
        }
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.iter().find(|e| e.code == DUPLICATE_KEY))
            .map(|e| e.message.clone()),
        _ => None,
    };

    match duplicate {
        Some(message) => OperationsError::DuplicateKey(message, collection.to_string()),
        None => OperationsError::Backend(error.to_string()),
    }
}

/// Gives a document without `_id` a fresh `ObjectId` in first position; returns the id.
fn assign_id(document: &mut Document) -> Bson {
    if let Some(id) = document.get("_id") {
        return id.clone();
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut identified = doc! { "_id": id.clone() };
    for (key, value) in std::mem::take(document) {
        identified.insert(key, value);
    }
    *document = identified;
    id
}

fn assign_ids(documents: &mut [Document]) -> Vec<Bson> {
    documents.iter_mut().map(assign_id).collect()
}

/// Reads the `results` array of an inline map-reduce response.
fn inline_results(response: &Document) -> OperationsResult<Vec<Document>> {
    response
        .get_array("results")
        .map_err(|_| OperationsError::Backend("map-reduce response has no results".to_string()))?
        .iter()
        .map(|result| match result {
            Bson::Document(document) => Ok(document.clone()),
            other => Err(OperationsError::Backend(format!(
                "unexpected map-reduce result {other}"
            ))),
        })
        .collect()
}

/// Clamps a query limit into the driver's signed range.
fn driver_limit(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn non_empty(document: Document) -> Option<Document> {
    (!document.is_empty()).then_some(document)
}

fn return_document(return_new: bool) -> ReturnDocument {
    if return_new {
        ReturnDocument::After
    } else {
        ReturnDocument::Before
    }
}

/// [`MongoOperations`] on a MongoDB database through the official driver.
///
/// ```ignore
/// let template = MongoTemplate::builder("mongodb://localhost:27017", "library")
///     .app_name("catalog")
///     .max_pool_size(20)
///     .build()
///     .await?;
///
/// let books = template.find::<Book>(Query::new(BookFields::year().gte(2000))).await?;
/// ```
#[derive(Debug, Clone)]
pub struct MongoTemplate {
    client: Client,
    database: String,
}

impl MongoTemplate {
    pub fn new(client: Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoTemplateBuilder {
        MongoTemplateBuilder::new(dsn, database)
    }

    /// The driver handle for the configured database.
    pub fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    fn get_collection(&self, collection: &str) -> MongoCollection<Document> {
        self.database().collection(collection)
    }

    async fn collect(
        &self,
        collection: &str,
        cursor: mongodb::Cursor<Document>,
    ) -> OperationsResult<Vec<Document>> {
        cursor
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| map_error(collection, e))
    }
}

#[async_trait]
impl MongoOperations for MongoTemplate {
    async fn collection_names(&self) -> OperationsResult<Vec<String>> {
        self.database()
            .list_collection_names()
            .await
            .map_err(|e| OperationsError::Backend(e.to_string()))
    }

    async fn has_collection(&self, collection: &str) -> OperationsResult<bool> {
        Ok(self
            .collection_names()
            .await?
            .iter()
            .any(|name| name == collection))
    }

    async fn create_named_collection(&self, collection: &str) -> OperationsResult<()> {
        debug!(collection, "create collection");
        self.database()
            .create_collection(collection)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn drop_named_collection(&self, collection: &str) -> OperationsResult<()> {
        debug!(collection, "drop collection");
        self.get_collection(collection)
            .drop()
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn find_documents(&self, collection: &str, query: &Query) -> OperationsResult<Vec<Document>> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "find documents");

        let mut options = FindOptions::default();
        options.sort = non_empty(query.sort_document());
        options.skip = query.skip();
        options.limit = query.limit().map(driver_limit);
        options.projection = query.projection_document();

        let cursor = self
            .get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| map_error(collection, e))?;
        self.collect(collection, cursor).await
    }

    async fn count_documents(&self, collection: &str, query: &Query) -> OperationsResult<u64> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "count documents");

        let mut options = CountOptions::default();
        options.skip = query.skip();
        options.limit = query.limit();

        self.get_collection(collection)
            .count_documents(filter)
            .with_options(options)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn distinct_values(
        &self,
        collection: &str,
        field: &str,
        query: &Query,
    ) -> OperationsResult<Vec<Bson>> {
        let filter = query.filter_document()?;
        debug!(collection, field, filter = %log_json(&filter), "distinct values");

        self.get_collection(collection)
            .distinct(field, filter)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn insert_documents(
        &self,
        collection: &str,
        mut documents: Vec<Document>,
    ) -> OperationsResult<Vec<Bson>> {
        debug!(collection, count = documents.len(), "insert documents");
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let ids = assign_ids(&mut documents);
        self.get_collection(collection)
            .insert_many(documents)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(ids)
    }

    async fn save_document(&self, collection: &str, mut document: Document) -> OperationsResult<Bson> {
        let id = assign_id(&mut document);
        debug!(collection, id = %id, "save document");

        self.get_collection(collection)
            .replace_one(doc! { "_id": id.clone() }, document)
            .upsert(true)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(id)
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

        let target = self.get_collection(collection);
        let result = if options.multi {
            target
                .update_many(filter, rendered)
                .upsert(options.upsert)
                .await
        } else {
            target
                .update_one(filter, rendered)
                .upsert(options.upsert)
                .await
        }
        .map_err(|e| map_error(collection, e))?;

        Ok(UpdateResult {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_documents(&self, collection: &str, query: &Query) -> OperationsResult<DeleteResult> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "delete documents");

        let result = self
            .get_collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| map_error(collection, e))?;
        Ok(DeleteResult {
            deleted: result.deleted_count,
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

        let mut driver_options = FindOneAndUpdateOptions::default();
        driver_options.sort = non_empty(query.sort_document());
        driver_options.upsert = Some(options.upsert);
        driver_options.return_document = Some(return_document(options.return_new));

        self.get_collection(collection)
            .find_one_and_update(filter, rendered)
            .with_options(driver_options)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn find_and_remove_document(
        &self,
        collection: &str,
        query: &Query,
    ) -> OperationsResult<Option<Document>> {
        let filter = query.filter_document()?;
        debug!(collection, filter = %log_json(&filter), "find and remove");

        let mut options = FindOneAndDeleteOptions::default();
        options.sort = non_empty(query.sort_document());

        self.get_collection(collection)
            .find_one_and_delete(filter)
            .with_options(options)
            .await
            .map_err(|e| map_error(collection, e))
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

        let mut driver_options = FindOneAndReplaceOptions::default();
        driver_options.sort = non_empty(query.sort_document());
        driver_options.upsert = Some(options.upsert);
        driver_options.return_document = Some(return_document(options.return_new));

        self.get_collection(collection)
            .find_one_and_replace(filter, replacement)
            .with_options(driver_options)
            .await
            .map_err(|e| map_error(collection, e))
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

        let cursor = self
            .get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| map_error(collection, e))?;
        self.collect(collection, cursor).await
    }

    async fn map_reduce_documents(
        &self,
        collection: &str,
        options: &MapReduceOptions,
    ) -> OperationsResult<Vec<Document>> {
        let command = options.to_command(collection)?;
        debug!(collection, output = ?options.get_output(), "map reduce");

        let response = self
            .database()
            .run_command(command)
            .await
            .map_err(|e| map_error(collection, e))?;

        match options.get_output() {
            MapReduceOutput::Inline => inline_results(&response),
            output => {
                let target = output.collection().unwrap_or(collection);
                let cursor = self
                    .get_collection(target)
                    .find(doc! {})
                    .await
                    .map_err(|e| map_error(target, e))?;
                self.collect(target, cursor).await
            }
        }
    }

    async fn create_index(&self, collection: &str, index: &Index) -> OperationsResult<String> {
        let name = index.name();
        debug!(collection, index = %name, "create index");

        let mut options = IndexOptions::default();
        options.name = Some(name);
        options.unique = index.is_unique().then_some(true);
        options.sparse = index.is_sparse().then_some(true);
        options.expire_after = index.expiry();

        let model = IndexModel::builder()
            .keys(index.keys_document())
            .options(options)
            .build();

        Ok(self
            .get_collection(collection)
            .create_index(model)
            .await
            .map_err(|e| map_error(collection, e))?
            .index_name)
    }

    async fn drop_index(&self, collection: &str, name: &str) -> OperationsResult<()> {
        debug!(collection, index = name, "drop index");
        self.get_collection(collection)
            .drop_index(name)
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn drop_indexes(&self, collection: &str) -> OperationsResult<()> {
        debug!(collection, "drop indexes");
        self.get_collection(collection)
            .drop_indexes()
            .await
            .map_err(|e| map_error(collection, e))
    }

    async fn list_indexes(&self, collection: &str) -> OperationsResult<Vec<IndexInfo>> {
        let models = self
            .get_collection(collection)
            .list_indexes()
            .await
            .map_err(|e| map_error(collection, e))?
            .try_collect::<Vec<IndexModel>>()
            .await
            .map_err(|e| map_error(collection, e))?;

        Ok(models
            .into_iter()
            .map(|model| {
                let options = model.options.unwrap_or_default();
                IndexInfo {
                    name: options.name.unwrap_or_default(),
                    keys: model.keys,
                    unique: options.unique.unwrap_or(false),
                    sparse: options.sparse.unwrap_or(false),
                }
            })
            .collect())
    }

    async fn shutdown(&self) -> OperationsResult<()> {
        info!(database = %self.database, "closing MongoDB client");
        self.client.clone().shutdown().await;
        Ok(())
    }
}

/// Builder for [`MongoTemplate`].
#[derive(Debug, Clone)]
pub struct MongoTemplateBuilder {
    dsn: String,
    database: String,
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    min_pool_size: Option<u32>,
}

impl MongoTemplateBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            app_name: None,
            max_pool_size: None,
            min_pool_size: None,
        }
    }

    /// Application name reported to the server.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Overrides connection-string settings with the ones set on this builder.
    fn apply(&self, options: &mut ClientOptions) {
        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if self.max_pool_size.is_some() {
            options.max_pool_size = self.max_pool_size;
        }
        if self.min_pool_size.is_some() {
            options.min_pool_size = self.min_pool_size;
        }
    }
}

#[async_trait]
impl OperationsBuilder for MongoTemplateBuilder {
    type Operations = MongoTemplate;

    async fn build(self) -> OperationsResult<Self::Operations> {
        let mut options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| OperationsError::Initialization(e.to_string()))?;
        self.apply(&mut options);

        let client = Client::with_options(options)
            .map_err(|e| OperationsError::Initialization(e.to_string()))?;
        info!(database = %self.database, "MongoDB client ready");

        Ok(MongoTemplate::new(client, self.database))
    }
}
