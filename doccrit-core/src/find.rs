//! Fluent find operations.
//!
//! ```ignore
//! let titles: Vec<TitleOnly> = ops
//!     .query::<Book>()
//!     .matching(BookFields::year().gte(2000))
//!     .in_collection("archive")
//!     .as_type::<TitleOnly>()
//!     .all()
//!     .await?;
//! ```

use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::{
    entity::{Entity, decode_all, decode_document},
    error::{OperationsError, OperationsResult},
    extensions::target_collection,
    operations::MongoOperations,
    query::Query,
};

/// A find on the collection of `T` whose results decode as `R`.
///
/// Created with [`MongoOperationsExt::query`](crate::extensions::MongoOperationsExt::query).
/// Nothing runs until one of the terminal methods is awaited.
#[derive(Debug)]
pub struct ExecutableFind<'a, O: ?Sized, T, R = T> {
    ops: &'a O,
    query: Query,
    _types: PhantomData<fn() -> (T, R)>,
}

impl<'a, O: ?Sized, T> ExecutableFind<'a, O, T, T> {
    pub(crate) fn new(ops: &'a O) -> Self {
        Self {
            ops,
            query: Query::all(),
            _types: PhantomData,
        }
    }
}

impl<'a, O, T, R> ExecutableFind<'a, O, T, R>
where
    O: MongoOperations + ?Sized,
    T: Entity,
    R: DeserializeOwned,
{
    /// Sets the query. A collection set on the query is kept unless
    /// [`in_collection`](Self::in_collection) overrides it.
    pub fn matching(mut self, query: impl Into<Query>) -> Self {
        let collection = self.query.collection().map(str::to_string);
        self.query = query.into();
        if let (None, Some(collection)) = (self.query.collection(), collection) {
            self.query = self.query.in_collection(collection);
        }
        self
    }

    /// Reads from the named collection instead of the entity's own.
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.query = self.query.in_collection(collection);
        self
    }

    /// Decodes results as `R2` instead, e.g. a projection of the entity.
    pub fn as_type<R2: DeserializeOwned>(self) -> ExecutableFind<'a, O, T, R2> {
        ExecutableFind {
            ops: self.ops,
            query: self.query,
            _types: PhantomData,
        }
    }

    fn collection(&self) -> String {
        target_collection::<T>(&self.query).into_owned()
    }

    /// Every matching document.
    pub async fn all(&self) -> OperationsResult<Vec<R>> {
        decode_all(
            self.ops
                .find_documents(&self.collection(), &self.query)
                .await?,
        )
    }

    /// The only matching document, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationsError::IncorrectResultSize`] if more than one document matches.
    pub async fn one(&self) -> OperationsResult<Option<R>> {
        let query = self.query.clone().with_limit(2);
        let mut documents = self
            .ops
            .find_documents(&self.collection(), &query)
            .await?;

        match documents.len() {
            0 => Ok(None),
            1 => documents.pop().map(decode_document).transpose(),
            found => Err(OperationsError::IncorrectResultSize(found)),
        }
    }

    /// The first matching document in the query's sort order, or `None`.
    pub async fn first(&self) -> OperationsResult<Option<R>> {
        let query = self.query.clone().with_limit(1);
        self.ops
            .find_documents(&self.collection(), &query)
            .await?
            .into_iter()
            .next()
            .map(decode_document)
            .transpose()
    }

    /// The number of matching documents.
    pub async fn count(&self) -> OperationsResult<u64> {
        self.ops
            .count_documents(&self.collection(), &self.query)
            .await
    }

    /// Whether any document matches.
    pub async fn exists(&self) -> OperationsResult<bool> {
        let query = self.query.clone().with_limit(1);
        Ok(self
            .ops
            .count_documents(&self.collection(), &query)
            .await?
            > 0)
    }
}
