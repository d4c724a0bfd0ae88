//! Entities: types that map to a collection.
//!
//! An [`Entity`] is any serde-serializable type bound to a collection name. The typed
//! extension methods in [`extensions`](crate::extensions) use the entity type parameter
//! to pick the collection and to decode results, so callers never pass the collection
//! name or the result type at runtime.

use bson::{Bson, Document, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};
use std::borrow::Cow;

use crate::error::OperationsResult;

/// Core trait for types stored in a collection.
///
/// The identifier is whatever the type serializes under `_id`; use
/// `#[serde(rename = "_id")]` on the id field.
///
/// # Example
///
/// ```ignore
/// use doccrit::entity::Entity;
/// use bson::oid::ObjectId;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Book {
///     #[serde(rename = "_id")]
///     pub id: ObjectId,
///     pub title: String,
/// }
///
/// impl Entity for Book {
///     fn collection_name() -> Cow<'static, str> {
///         Cow::Borrowed("books")
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    /// Returns the name of the collection this entity is stored in.
    ///
    /// Defaults to the unqualified type name with its first character lower-cased,
    /// so `my_app::model::BookShelf` maps to `bookShelf`.
    fn collection_name() -> Cow<'static, str> {
        Cow::Owned(default_collection_name(std::any::type_name::<Self>()))
    }
}

/// Derives the default collection name from a fully qualified type name.
pub fn default_collection_name(type_name: &str) -> String {
    let without_generics = type_name
        .split('<')
        .next()
        .unwrap_or(type_name);
    let simple = without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics);

    let mut chars = simple.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Extension trait providing conversions between entities and their stored form.
///
/// This trait is automatically implemented for all types that implement [`Entity`].
pub trait EntityExt: Entity {
    /// Converts this entity to a BSON document for storage.
    fn to_document(&self) -> OperationsResult<Document>;

    /// Decodes an entity from a stored BSON document.
    fn from_document(document: Document) -> OperationsResult<Self>;

    /// Converts this entity to a JSON value.
    fn to_json(&self) -> OperationsResult<Value>;

    /// Creates an entity from a JSON value.
    fn from_json(value: Value) -> OperationsResult<Self>;
}

impl<E: Entity> EntityExt for E {
    fn to_document(&self) -> OperationsResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> OperationsResult<Self> {
        Ok(deserialize_from_document(document)?)
    }

    fn to_json(&self) -> OperationsResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> OperationsResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Decodes a batch of documents into any deserializable type.
///
/// Used for projections and aggregation outputs, which need not be entities.
pub(crate) fn decode_all<R: DeserializeOwned>(documents: Vec<Document>) -> OperationsResult<Vec<R>> {
    documents.into_iter().map(decode_document).collect()
}

/// Decodes a single document into any deserializable type.
pub(crate) fn decode_document<R: DeserializeOwned>(document: Document) -> OperationsResult<R> {
    Ok(deserialize_from_document(document)?)
}

/// Decodes a single BSON value into any deserializable type.
pub(crate) fn decode_value<R: DeserializeOwned>(value: Bson) -> OperationsResult<R> {
    Ok(bson::de::deserialize_from_bson(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name_strips_module_path() {
        assert_eq!(default_collection_name("my_app::model::BookShelf"), "bookShelf");
    }

    #[test]
    fn default_name_strips_generics() {
        assert_eq!(
            default_collection_name("my_app::Wrapper<my_app::Inner>"),
            "wrapper"
        );
    }

    #[test]
    fn default_name_for_plain_type() {
        assert_eq!(default_collection_name("Person"), "person");
        assert_eq!(default_collection_name(""), "");
    }
}
