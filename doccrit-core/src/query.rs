//! Queries: criteria plus sort, paging, projection and an optional collection.
//!
//! A [`Query`] wraps a [`Criteria`] chain with everything a find operation needs
//! beyond the filter itself.
//!
//! ```ignore
//! use doccrit::prelude::*;
//!
//! let query = Query::builder()
//!     .criteria(BookFields::price().lt(20.0))
//!     .sort_by(BookFields::title(), Direction::Asc)
//!     .limit(10)
//!     .build();
//!
//! let query = query.add_criteria(BookFields::year().gte(1990))?;
//! ```

use bson::{Bson, Document, doc};
use std::fmt;

use crate::{
    criteria::{Criteria, FieldCriteria},
    error::{CriteriaError, CriteriaResult},
    page::PaginationParams,
    property::Property,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl Direction {
    /// The value used in sort and index key documents.
    pub fn value(&self) -> i32 {
        match self {
            Direction::Asc => 1,
            Direction::Desc => -1,
        }
    }
}

/// An ordered list of sort keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sort {
    orders: Vec<(String, Direction)>,
}

impl Sort {
    /// Creates an empty sort (natural order).
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Sorts by a property.
    pub fn by<O, T>(property: Property<O, T>, direction: Direction) -> Self {
        Self::by_path(property.path(), direction)
    }

    /// Sorts by a raw dotted path.
    pub fn by_path(path: impl Into<String>, direction: Direction) -> Self {
        Self {
            orders: vec![(path.into(), direction)],
        }
    }

    /// Adds a secondary sort key.
    pub fn then<O, T>(self, property: Property<O, T>, direction: Direction) -> Self {
        self.then_path(property.path(), direction)
    }

    /// Adds a secondary sort key by raw dotted path.
    ///
    /// A path that is already sorted on keeps its position and takes the new direction.
    pub fn then_path(mut self, path: impl Into<String>, direction: Direction) -> Self {
        let path = path.into();
        match self.orders.iter_mut().find(|(existing, _)| *existing == path) {
            Some(order) => order.1 = direction,
            None => self.orders.push((path, direction)),
        }
        self
    }

    pub fn orders(&self) -> &[(String, Direction)] {
        &self.orders
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Renders the sort as `{ path: 1 | -1, ... }`.
    pub fn to_document(&self) -> Document {
        self.orders
            .iter()
            .map(|(path, direction)| (path.clone(), Bson::Int32(direction.value())))
            .collect()
    }
}

/// A find query.
///
/// Use [`Query::builder`] for fluent construction, or [`Query::new`] for a query that
/// only filters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    criteria: Criteria,
    sort: Sort,
    skip: Option<u64>,
    limit: Option<u64>,
    projection: Vec<(String, bool)>,
    collection: Option<String>,
}

impl Query {
    /// Creates a query filtering with the given criteria.
    pub fn new(criteria: impl Into<Criteria>) -> Self {
        Self {
            criteria: criteria.into(),
            ..Self::default()
        }
    }

    /// Creates a query matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Creates a query from a raw filter document.
    pub fn from_document(filter: Document) -> Self {
        Self::new(Criteria::from_document(filter))
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Adds criteria to this query.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::InvalidApiUsage`] if the query already filters on one
    /// of the keys the new criteria renders. Combine such criteria with
    /// [`Criteria::and_operator`] instead.
    pub fn add_criteria(mut self, criteria: impl Into<Criteria>) -> CriteriaResult<Self> {
        let criteria = criteria.into();
        let existing = self.criteria.keys();

        if let Some(key) = criteria.keys().into_iter().find(|key| existing.contains(key)) {
            return Err(CriteriaError::InvalidApiUsage(format!(
                "can't add a second '{key}' criteria; query already contains a criteria on '{key}'"
            )));
        }

        self.criteria = self.criteria.and(criteria);
        Ok(self)
    }

    /// Skips to the page described by `params` and limits the result to one page.
    pub fn with_page(mut self, params: &PaginationParams) -> Self {
        self.skip = Some(params.offset() as u64);
        self.limit = Some(params.per_page as u64);
        self
    }

    /// Clears skip and limit.
    pub fn without_paging(mut self) -> Self {
        self.skip = None;
        self.limit = None;
        self
    }

    /// Replaces the sort of this query.
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Targets an explicit collection instead of the entity's own.
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// Renders the filter document.
    pub fn filter_document(&self) -> CriteriaResult<Document> {
        self.criteria.to_document()
    }

    /// Renders the sort document; empty when unsorted.
    pub fn sort_document(&self) -> Document {
        self.sort.to_document()
    }

    /// Renders the projection document, or `None` when every field is returned.
    pub fn projection_document(&self) -> Option<Document> {
        if self.projection.is_empty() {
            return None;
        }

        Some(
            self.projection
                .iter()
                .map(|(path, include)| (path.clone(), Bson::Int32(i32::from(*include))))
                .collect(),
        )
    }
}

impl From<Criteria> for Query {
    fn from(criteria: Criteria) -> Self {
        Query::new(criteria)
    }
}

impl<O, T> From<FieldCriteria<O, T>> for Query {
    fn from(criteria: FieldCriteria<O, T>) -> Self {
        Query::new(criteria)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query: {}", self.criteria)?;
        if !self.sort.is_empty() {
            write!(f, ", Sort: {}", self.sort.to_document())?;
        }
        if let Some(skip) = self.skip {
            write!(f, ", Skip: {skip}")?;
        }
        if let Some(limit) = self.limit {
            write!(f, ", Limit: {limit}")?;
        }
        if let Some(projection) = self.projection_document() {
            write!(f, ", Fields: {projection}")?;
        }
        Ok(())
    }
}

/// Builder for [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the criteria of the query, replacing any set before.
    pub fn criteria(mut self, criteria: impl Into<Criteria>) -> Self {
        self.query.criteria = criteria.into();
        self
    }

    /// Sorts by a property. Repeated calls add secondary keys.
    pub fn sort_by<O, T>(self, property: Property<O, T>, direction: Direction) -> Self {
        self.sort_by_path(property.path(), direction)
    }

    /// Sorts by a raw dotted path. Repeated calls add secondary keys.
    pub fn sort_by_path(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.query.sort = std::mem::take(&mut self.query.sort).then_path(path, direction);
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.query.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets skip and limit from pagination parameters.
    pub fn page(mut self, params: &PaginationParams) -> Self {
        self.query = self.query.with_page(params);
        self
    }

    /// Returns only the given field (plus `_id`).
    pub fn include<O, T>(mut self, property: Property<O, T>) -> Self {
        self.query.projection.push((property.to_dot_path(), true));
        self
    }

    /// Returns every field except the given one.
    pub fn exclude<O, T>(mut self, property: Property<O, T>) -> Self {
        self.query.projection.push((property.to_dot_path(), false));
        self
    }

    /// Targets an explicit collection.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.query.collection = Some(collection.into());
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// A query matching the document with the given `_id`.
pub fn id_query(id: impl Into<Bson>) -> Query {
    Query::from_document(doc! { "_id": id.into() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Book;

    fn title() -> Property<Book, String> {
        Property::new("title")
    }

    fn year() -> Property<Book, i32> {
        Property::new("year")
    }

    #[test]
    fn builder_sets_every_part() {
        let query = Query::builder()
            .criteria(year().gte(1990))
            .sort_by(year(), Direction::Desc)
            .sort_by(title(), Direction::Asc)
            .skip(5)
            .limit(10)
            .include(title())
            .build();

        assert_eq!(query.filter_document().unwrap(), doc! { "year": { "$gte": 1990 } });
        assert_eq!(query.sort_document(), doc! { "year": -1, "title": 1 });
        assert_eq!(query.skip(), Some(5));
        assert_eq!(query.limit(), Some(10));
        assert_eq!(query.projection_document(), Some(doc! { "title": 1 }));
    }

    #[test]
    fn add_criteria_appends_new_paths() {
        let query = Query::new(title().eq("Dune"))
            .add_criteria(year().lt(2000))
            .unwrap();

        assert_eq!(
            query.filter_document().unwrap(),
            doc! { "title": "Dune", "year": { "$lt": 2000 } }
        );
    }

    #[test]
    fn add_criteria_rejects_a_second_criteria_on_the_same_path() {
        let result = Query::new(year().gt(1900)).add_criteria(year().lt(2000));
        assert!(matches!(result, Err(CriteriaError::InvalidApiUsage(msg)) if msg.contains("'year'")));
    }

    #[test]
    fn with_page_sets_skip_and_limit() {
        let query = Query::all().with_page(&PaginationParams::new(3, 20));
        assert_eq!(query.skip(), Some(40));
        assert_eq!(query.limit(), Some(20));
    }

    #[test]
    fn resorting_a_path_keeps_its_position() {
        let sort = Sort::by(year(), Direction::Asc)
            .then(title(), Direction::Asc)
            .then(year(), Direction::Desc);
        assert_eq!(sort.to_document(), doc! { "year": -1, "title": 1 });
    }

    #[test]
    fn raw_documents_and_display() {
        let query = Query::from_document(doc! { "title": "Emma" }).with_limit(1);
        assert_eq!(query.filter_document().unwrap(), doc! { "title": "Emma" });
        assert!(query.to_string().contains("Limit: 1"));
        assert_eq!(query.projection_document(), None);
    }
}
