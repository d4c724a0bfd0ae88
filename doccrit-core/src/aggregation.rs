//! Aggregation pipelines.
//!
//! ```ignore
//! let pipeline = Aggregation::new()
//!     .match_criteria(BookFields::year().gte(2000))
//!     .unwind(BookFields::tags())
//!     .group(Group::by(BookFields::tags()).count("books").avg("avgPrice", BookFields::price()))
//!     .sort(Sort::by_path("books", Direction::Desc))
//!     .limit(5);
//! ```
//!
//! Paths accept anything that is `AsRef<str>`, so generated properties and plain
//! strings can be mixed.

use bson::{Bson, Document, doc};

use crate::{
    criteria::Criteria,
    error::{CriteriaError, CriteriaResult},
    near::NearQuery,
    query::Sort,
};

fn field_ref(path: &str) -> String {
    format!("${path}")
}

/// The grouping key of a `$group` stage.
#[derive(Debug, Clone, PartialEq)]
enum GroupId {
    Null,
    Field(String),
    Fields(Vec<String>),
}

/// An accumulator of a `$group` stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(String),
    Count,
    Avg(String),
    Min(String),
    Max(String),
    First(String),
    Last(String),
    Push(String),
}

impl Accumulator {
    pub fn to_document(&self) -> Document {
        match self {
            Accumulator::Sum(path) => doc! { "$sum": field_ref(path) },
            Accumulator::Count => doc! { "$sum": 1 },
            Accumulator::Avg(path) => doc! { "$avg": field_ref(path) },
            Accumulator::Min(path) => doc! { "$min": field_ref(path) },
            Accumulator::Max(path) => doc! { "$max": field_ref(path) },
            Accumulator::First(path) => doc! { "$first": field_ref(path) },
            Accumulator::Last(path) => doc! { "$last": field_ref(path) },
            Accumulator::Push(path) => doc! { "$push": field_ref(path) },
        }
    }
}

/// A `$group` stage: a grouping key and named accumulators.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: GroupId,
    accumulators: Vec<(String, Accumulator)>,
}

impl Group {
    /// Groups by the value of one field.
    pub fn by(field: impl AsRef<str>) -> Self {
        Self::with_id(GroupId::Field(field.as_ref().to_string()))
    }

    /// Groups by a compound key of several fields.
    ///
    /// The `_id` of each group is a document keyed by field path, with dots replaced
    /// by underscores.
    pub fn by_fields<P: AsRef<str>>(fields: impl IntoIterator<Item = P>) -> Self {
        Self::with_id(GroupId::Fields(
            fields
                .into_iter()
                .map(|field| field.as_ref().to_string())
                .collect(),
        ))
    }

    /// Puts every input document into a single group.
    pub fn all() -> Self {
        Self::with_id(GroupId::Null)
    }

    fn with_id(id: GroupId) -> Self {
        Self {
            id,
            accumulators: Vec::new(),
        }
    }

    fn accumulate(mut self, output: impl Into<String>, accumulator: Accumulator) -> Self {
        self.accumulators.push((output.into(), accumulator));
        self
    }

    pub fn sum(self, output: impl Into<String>, field: impl AsRef<str>) -> Self {
        self.accumulate(output, Accumulator::Sum(field.as_ref().to_string()))
    }

    /// Counts the documents of each group.
    pub fn count(self, output: impl Into<String>) -> Self {
        self.accumulate(output, Accumulator::Count)
    }

    pub fn avg(self, output: impl Into<String>, field: impl AsRef<str>) -> Self {
        self.accumulate(output, Accumulator::Avg(field.as_ref().to_string()))
    }

    pub fn min(self, output: impl Into<String>, field: impl AsRef<str>) -> Self {
        self.accumulate(output, Accumulator::Min(field.as_ref().to_string()))
    }

    pub fn max(self, output: impl Into<String>, field: impl AsRef<str>) -> Self {
        self.accumulate(output, Accumulator::Max(field.as_ref().to_string()))
    }

    pub fn first(self, output: impl Into<String>, field: impl AsRef<str>) -> Self {
        self.accumulate(output, Accumulator::First(field.as_ref().to_string()))
    }

    pub fn last(self, output: impl Into<String>, field: impl AsRef<str>) -> Self {
        self.accumulate(output, Accumulator::Last(field.as_ref().to_string()))
    }

    /// Collects the values of a field into an array.
    pub fn push(self, output: impl Into<String>, field: impl AsRef<str>) -> Self {
        self.accumulate(output, Accumulator::Push(field.as_ref().to_string()))
    }

    /// Renders the `$group` stage.
    pub fn to_document(&self) -> CriteriaResult<Document> {
        let id = match &self.id {
            GroupId::Null => Bson::Null,
            GroupId::Field(path) => Bson::String(field_ref(path)),
            GroupId::Fields(paths) => Bson::Document(
                paths
                    .iter()
                    .map(|path| (path.replace('.', "_"), Bson::String(field_ref(path))))
                    .collect(),
            ),
        };

        let mut group = doc! { "_id": id };
        for (output, accumulator) in &self.accumulators {
            if output == "_id" || group.contains_key(output) {
                return Err(CriteriaError::InvalidApiUsage(format!(
                    "group output '{output}' is declared twice"
                )));
            }
            group.insert(output.clone(), accumulator.to_document());
        }

        Ok(doc! { "$group": group })
    }
}

/// One stage of an [`Aggregation`].
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Criteria),
    Sort(Sort),
    Skip(u64),
    Limit(u64),
    Project(Vec<String>),
    Unwind {
        path: String,
        preserve_null_and_empty_arrays: bool,
    },
    Group(Group),
    Count(String),
    GeoNear(NearQuery),
    /// A pre-rendered stage, passed through as-is.
    Raw(Document),
}

impl Stage {
    /// Renders the stage. A geo-near stage may render into several documents.
    pub fn to_documents(&self) -> CriteriaResult<Vec<Document>> {
        let stage = match self {
            Stage::Match(criteria) => doc! { "$match": criteria.to_document()? },
            Stage::Sort(sort) => doc! { "$sort": sort.to_document() },
            Stage::Skip(skip) => doc! { "$skip": count_to_bson(*skip)? },
            Stage::Limit(limit) => doc! { "$limit": count_to_bson(*limit)? },
            Stage::Project(fields) => doc! {
                "$project": fields
                    .iter()
                    .map(|field| (field.clone(), Bson::Int32(1)))
                    .collect::<Document>(),
            },
            Stage::Unwind {
                path,
                preserve_null_and_empty_arrays: false,
            } => doc! { "$unwind": field_ref(path) },
            Stage::Unwind { path, .. } => doc! {
                "$unwind": { "path": field_ref(path), "preserveNullAndEmptyArrays": true }
            },
            Stage::Group(group) => group.to_document()?,
            Stage::Count(field) => doc! { "$count": field.as_str() },
            Stage::GeoNear(near) => return near.to_pipeline(),
            Stage::Raw(document) => document.clone(),
        };

        Ok(vec![stage])
    }
}

pub(crate) fn count_to_bson(value: u64) -> CriteriaResult<Bson> {
    i64::try_from(value)
        .map(Bson::Int64)
        .map_err(|_| CriteriaError::InvalidApiUsage(format!("{value} is out of range")))
}

/// An aggregation pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregation {
    stages: Vec<Stage>,
}

impl Aggregation {
    /// Creates an empty pipeline, which passes every document through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters documents (`$match`).
    pub fn match_criteria(self, criteria: impl Into<Criteria>) -> Self {
        self.stage(Stage::Match(criteria.into()))
    }

    pub fn sort(self, sort: Sort) -> Self {
        self.stage(Stage::Sort(sort))
    }

    pub fn skip(self, skip: u64) -> Self {
        self.stage(Stage::Skip(skip))
    }

    pub fn limit(self, limit: u64) -> Self {
        self.stage(Stage::Limit(limit))
    }

    /// Keeps only the given fields (plus `_id`).
    pub fn project<P: AsRef<str>>(self, fields: impl IntoIterator<Item = P>) -> Self {
        self.stage(Stage::Project(
            fields
                .into_iter()
                .map(|field| field.as_ref().to_string())
                .collect(),
        ))
    }

    /// Emits one document per element of an array field; documents without elements
    /// are dropped.
    pub fn unwind(self, path: impl AsRef<str>) -> Self {
        self.stage(Stage::Unwind {
            path: path.as_ref().to_string(),
            preserve_null_and_empty_arrays: false,
        })
    }

    /// Like [`unwind`](Self::unwind), but keeps documents whose array is missing or empty.
    pub fn unwind_preserving(self, path: impl AsRef<str>) -> Self {
        self.stage(Stage::Unwind {
            path: path.as_ref().to_string(),
            preserve_null_and_empty_arrays: true,
        })
    }

    pub fn group(self, group: Group) -> Self {
        self.stage(Stage::Group(group))
    }

    /// Replaces the documents with a single `{ field: count }` document.
    pub fn count(self, field: impl Into<String>) -> Self {
        self.stage(Stage::Count(field.into()))
    }

    /// Starts the pipeline with a `$geoNear` stage.
    pub fn geo_near(self, near: NearQuery) -> Self {
        self.stage(Stage::GeoNear(near))
    }

    /// Appends a raw stage document.
    pub fn raw(self, stage: Document) -> Self {
        self.stage(Stage::Raw(stage))
    }

    /// Appends a stage.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Renders the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::InvalidApiUsage`] if a `$geoNear` stage is not the
    /// first stage, or any error from rendering a stage's criteria.
    pub fn to_pipeline(&self) -> CriteriaResult<Vec<Document>> {
        if self
            .stages
            .iter()
            .skip(1)
            .any(|stage| matches!(stage, Stage::GeoNear(_)))
        {
            return Err(CriteriaError::InvalidApiUsage(
                "$geoNear is only valid as the first stage of a pipeline".to_string(),
            ));
        }

        let mut pipeline = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            pipeline.extend(stage.to_documents()?);
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{property::Property, query::Direction};
    use pretty_assertions::assert_eq;

    struct Book;

    fn year() -> Property<Book, i32> {
        Property::new("year")
    }

    fn tags() -> Property<Book, Vec<String>> {
        Property::new("tags")
    }

    #[test]
    fn renders_stages_in_order() {
        let pipeline = Aggregation::new()
            .match_criteria(year().gte(2000))
            .unwind(tags())
            .group(
                Group::by(tags())
                    .count("books")
                    .avg("avgPrice", "price")
                    .push("titles", "title"),
            )
            .sort(Sort::by_path("books", Direction::Desc))
            .skip(1)
            .limit(5)
            .to_pipeline()
            .unwrap();

        assert_eq!(
            pipeline,
            vec![
                doc! { "$match": { "year": { "$gte": 2000 } } },
                doc! { "$unwind": "$tags" },
                doc! {
                    "$group": {
                        "_id": "$tags",
                        "books": { "$sum": 1 },
                        "avgPrice": { "$avg": "$price" },
                        "titles": { "$push": "$title" },
                    }
                },
                doc! { "$sort": { "books": -1 } },
                doc! { "$skip": 1_i64 },
                doc! { "$limit": 5_i64 },
            ]
        );
    }

    #[test]
    fn compound_and_null_group_keys() {
        assert_eq!(
            Group::by_fields(["author.name", "year"]).to_document().unwrap(),
            doc! { "$group": { "_id": { "author_name": "$author.name", "year": "$year" } } }
        );
        assert_eq!(
            Group::all().sum("total", "price").to_document().unwrap(),
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$price" } } }
        );
    }

    #[test]
    fn duplicate_group_outputs_are_rejected() {
        let result = Group::all().count("n").sum("n", "price").to_document();
        assert!(result.is_err());
    }

    #[test]
    fn project_unwind_preserving_count_and_raw() {
        let pipeline = Aggregation::new()
            .project(["title", "tags"])
            .unwind_preserving("tags")
            .raw(doc! { "$sample": { "size": 3 } })
            .count("total")
            .to_pipeline()
            .unwrap();

        assert_eq!(
            pipeline,
            vec![
                doc! { "$project": { "title": 1, "tags": 1 } },
                doc! { "$unwind": { "path": "$tags", "preserveNullAndEmptyArrays": true } },
                doc! { "$sample": { "size": 3 } },
                doc! { "$count": "total" },
            ]
        );
    }

    #[test]
    fn match_errors_surface_on_render() {
        let result = Aggregation::new()
            .match_criteria(year().gt(1).and(year().lt(2)))
            .to_pipeline();
        assert!(matches!(result, Err(CriteriaError::InvalidApiUsage(_))));
    }
}
