//! Index definitions.

use bson::{Bson, Document, doc};
use std::time::Duration;

use crate::query::Direction;

/// How a key is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Ascending,
    Descending,
    /// Legacy coordinate pairs on a flat plane.
    Geo2d,
    /// GeoJSON and coordinate pairs on a sphere.
    Geo2dSphere,
    Text,
    Hashed,
}

impl IndexKind {
    fn to_bson(self) -> Bson {
        match self {
            IndexKind::Ascending => Bson::Int32(1),
            IndexKind::Descending => Bson::Int32(-1),
            IndexKind::Geo2d => Bson::String("2d".to_string()),
            IndexKind::Geo2dSphere => Bson::String("2dsphere".to_string()),
            IndexKind::Text => Bson::String("text".to_string()),
            IndexKind::Hashed => Bson::String("hashed".to_string()),
        }
    }

    fn name_part(self) -> String {
        match self.to_bson() {
            Bson::Int32(value) => value.to_string(),
            Bson::String(value) => value,
            other => other.to_string(),
        }
    }
}

impl From<Direction> for IndexKind {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Asc => IndexKind::Ascending,
            Direction::Desc => IndexKind::Descending,
        }
    }
}

/// An index to create on a collection.
///
/// ```ignore
/// let index = Index::on(BookFields::isbn(), Direction::Asc).unique();
/// ops.index_ops::<Book>().ensure_index(&index).await?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    keys: Vec<(String, IndexKind)>,
    name: Option<String>,
    unique: bool,
    sparse: bool,
    expire_after: Option<Duration>,
}

impl Index {
    /// Creates an index on one key.
    pub fn on(path: impl AsRef<str>, kind: impl Into<IndexKind>) -> Self {
        Self {
            keys: vec![(path.as_ref().to_string(), kind.into())],
            name: None,
            unique: false,
            sparse: false,
            expire_after: None,
        }
    }

    /// Adds a key, making this a compound index.
    pub fn and(mut self, path: impl AsRef<str>, kind: impl Into<IndexKind>) -> Self {
        self.keys.push((path.as_ref().to_string(), kind.into()));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Rejects documents that duplicate an indexed value.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Skips documents that lack the indexed field.
    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    /// Removes documents once the indexed date is older than `ttl`.
    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    pub fn keys(&self) -> &[(String, IndexKind)] {
        &self.keys
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse
    }

    pub fn expiry(&self) -> Option<Duration> {
        self.expire_after
    }

    /// The explicit name, or the server's default `path_1_other_-1` form.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .keys
                .iter()
                .map(|(path, kind)| format!("{path}_{}", kind.name_part()))
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    /// Renders the key document.
    pub fn keys_document(&self) -> Document {
        self.keys
            .iter()
            .map(|(path, kind)| (path.clone(), kind.to_bson()))
            .collect()
    }

    /// Renders the full index specification as accepted by `createIndexes`.
    pub fn to_document(&self) -> Document {
        let mut spec = doc! { "key": self.keys_document(), "name": self.name() };
        if self.unique {
            spec.insert("unique", true);
        }
        if self.sparse {
            spec.insert("sparse", true);
        }
        if let Some(ttl) = self.expire_after {
            spec.insert("expireAfterSeconds", ttl.as_secs() as i64);
        }
        spec
    }
}

/// An index as reported by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
    pub sparse: bool,
}

impl IndexInfo {
    /// Returns `true` if this index covers exactly `path` as its only key.
    pub fn is_on(&self, path: &str) -> bool {
        self.keys.len() == 1 && self.keys.contains_key(path)
    }
}
