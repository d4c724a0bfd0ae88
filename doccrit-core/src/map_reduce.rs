//! Map-reduce commands.
//!
//! Map-reduce is deprecated on the server in favour of aggregation pipelines but is
//! still accepted. [`MapReduceOptions`] renders the `mapReduce` command document.

use bson::{Bson, Document, doc};

use crate::{
    criteria::Criteria,
    error::{CriteriaError, CriteriaResult},
    query::Sort,
};

/// Where map-reduce results go.
#[derive(Debug, Clone, PartialEq)]
pub enum MapReduceOutput {
    /// Results are returned with the command response.
    Inline,
    /// Results replace the contents of the named collection.
    Replace(String),
    /// Results are merged into the named collection, overwriting existing keys.
    Merge(String),
    /// Results are reduced together with existing documents of the named collection.
    Reduce(String),
}

impl MapReduceOutput {
    fn to_bson(&self) -> Bson {
        match self {
            MapReduceOutput::Inline => Bson::Document(doc! { "inline": 1 }),
            MapReduceOutput::Replace(collection) => Bson::String(collection.clone()),
            MapReduceOutput::Merge(collection) => Bson::Document(doc! { "merge": collection.as_str() }),
            MapReduceOutput::Reduce(collection) => Bson::Document(doc! { "reduce": collection.as_str() }),
        }
    }

    /// The output collection, or `None` for inline results.
    pub fn collection(&self) -> Option<&str> {
        match self {
            MapReduceOutput::Inline => None,
            MapReduceOutput::Replace(collection)
            | MapReduceOutput::Merge(collection)
            | MapReduceOutput::Reduce(collection) => Some(collection),
        }
    }
}

/// A map-reduce job over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MapReduceOptions {
    map: String,
    reduce: String,
    finalize: Option<String>,
    query: Option<Criteria>,
    sort: Option<Sort>,
    limit: Option<u64>,
    scope: Option<Document>,
    output: MapReduceOutput,
}

impl MapReduceOptions {
    /// Creates a job from JavaScript `map` and `reduce` functions, returning results inline.
    pub fn new(map: impl Into<String>, reduce: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            reduce: reduce.into(),
            finalize: None,
            query: None,
            sort: None,
            limit: None,
            scope: None,
            output: MapReduceOutput::Inline,
        }
    }

    pub fn finalize(mut self, finalize: impl Into<String>) -> Self {
        self.finalize = Some(finalize.into());
        self
    }

    /// Restricts the input documents.
    pub fn query(mut self, criteria: impl Into<Criteria>) -> Self {
        self.query = Some(criteria.into());
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Global variables visible to the map, reduce and finalize functions.
    pub fn scope(mut self, scope: Document) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn output(mut self, output: MapReduceOutput) -> Self {
        self.output = output;
        self
    }

    pub fn get_output(&self) -> &MapReduceOutput {
        &self.output
    }

    /// Renders the `mapReduce` command for `collection`.
    pub fn to_command(&self, collection: &str) -> CriteriaResult<Document> {
        if self.map.trim().is_empty() || self.reduce.trim().is_empty() {
            return Err(CriteriaError::InvalidApiUsage(
                "map-reduce requires both a map and a reduce function".to_string(),
            ));
        }

        let mut command = doc! {
            "mapReduce": collection,
            "map": Bson::JavaScriptCode(self.map.clone()),
            "reduce": Bson::JavaScriptCode(self.reduce.clone()),
            "out": self.output.to_bson(),
        };

        if let Some(query) = &self.query {
            command.insert("query", query.to_document()?);
        }
        if let Some(sort) = self.sort.as_ref().filter(|sort| !sort.is_empty()) {
            command.insert("sort", sort.to_document());
        }
        if let Some(limit) = self.limit {
            command.insert("limit", crate::aggregation::count_to_bson(limit)?);
        }
        if let Some(finalize) = &self.finalize {
            command.insert("finalize", Bson::JavaScriptCode(finalize.clone()));
        }
        if let Some(scope) = &self.scope {
            command.insert("scope", scope.clone());
        }

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use pretty_assertions::assert_eq;

    const MAP: &str = "function() { emit(this.author, 1); }";
    const REDUCE: &str = "function(key, values) { return Array.sum(values); }";

    #[test]
    fn inline_command() {
        let command = MapReduceOptions::new(MAP, REDUCE).to_command("books").unwrap();

        assert_eq!(
            command,
            doc! {
                "mapReduce": "books",
                "map": Bson::JavaScriptCode(MAP.to_string()),
                "reduce": Bson::JavaScriptCode(REDUCE.to_string()),
                "out": { "inline": 1 },
            }
        );
    }

    #[test]
    fn full_command_with_output_collection() {
        let options = MapReduceOptions::new(MAP, REDUCE)
            .query(Criteria::from_document(doc! { "year": { "$gt": 2000 } }))
            .sort(Sort::by_path("year", Direction::Asc))
            .limit(100)
            .finalize("function(key, value) { return value; }")
            .scope(doc! { "factor": 2 })
            .output(MapReduceOutput::Merge("counts".to_string()));
        let command = options.to_command("books").unwrap();

        assert_eq!(command.get_document("out").unwrap(), &doc! { "merge": "counts" });
        assert_eq!(command.get_document("query").unwrap(), &doc! { "year": { "$gt": 2000 } });
        assert_eq!(command.get_document("sort").unwrap(), &doc! { "year": 1 });
        assert_eq!(command.get_i64("limit").unwrap(), 100);
        assert!(command.contains_key("finalize"));
        assert_eq!(options.get_output().collection(), Some("counts"));
    }

    #[test]
    fn empty_functions_are_rejected() {
        assert!(MapReduceOptions::new("", REDUCE).to_command("books").is_err());
    }
}
