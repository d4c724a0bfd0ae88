//! Typed criteria construction.
//!
//! A [`Criteria`] is an ordered chain of clauses that renders to a single filter
//! document. Field clauses are created from [`Property`] references and collect
//! operators for that one field; logical clauses (`$and`, `$or`, `$nor`) hold nested
//! criteria.
//!
//! # Building criteria
//!
//! ```ignore
//! use doccrit::prelude::*;
//!
//! let criteria = BookFields::price()
//!     .gt(10.0)
//!     .lte(50.0)
//!     .and((BookFields::author() / AuthorFields::name()).eq("Ann Leckie"));
//!
//! // { "price": { "$gt": 10.0, "$lte": 50.0 }, "author.name": "Ann Leckie" }
//! let filter = criteria.to_document()?;
//! ```
//!
//! Logical composition:
//!
//! ```ignore
//! let cheap_or_classic = BookFields::price().lt(5.0)
//!     .or(BookFields::year().lt(1900));
//!
//! let neither = Criteria::none_of([
//!     BookFields::title().regex("^Draft").into(),
//!     BookFields::published().eq(false).into(),
//! ]);
//! ```
//!
//! Builders never fail while chaining. Misuse (a field used twice in one chain, two
//! `eq` on one field, `not()` before `eq`, empty logical groups, serialization
//! failures) is recorded and reported by [`Criteria::to_document`].

mod field;
mod render;

use bson::{Bson, Document};
use std::fmt;

use crate::{
    error::{CriteriaError, CriteriaResult},
    geo::{GeoJson, Point, Shape},
    property::Property,
};

pub use field::{Bits, BitsTest, FieldCriteria};
pub use render::{CriteriaVisitor, DocumentRenderer, KeyCollector};

/// Logical operators combining nested criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logical {
    /// All nested criteria must match (`$and`).
    And,
    /// Any nested criteria must match (`$or`).
    Or,
    /// No nested criteria may match (`$nor`).
    Nor,
}

impl Logical {
    /// The operator key used in the rendered document.
    pub fn key(&self) -> &'static str {
        match self {
            Logical::And => "$and",
            Logical::Or => "$or",
            Logical::Nor => "$nor",
        }
    }
}

/// BSON type aliases accepted by `$type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsonType {
    Double,
    String,
    Object,
    Array,
    BinData,
    ObjectId,
    Bool,
    Date,
    Null,
    Regex,
    JavaScript,
    Int,
    Timestamp,
    Long,
    Decimal,
    MinKey,
    MaxKey,
    /// Matches any numeric type.
    Number,
}

impl BsonType {
    /// The string alias understood by `$type`.
    pub fn alias(&self) -> &'static str {
        match self {
            BsonType::Double => "double",
            BsonType::String => "string",
            BsonType::Object => "object",
            BsonType::Array => "array",
            BsonType::BinData => "binData",
            BsonType::ObjectId => "objectId",
            BsonType::Bool => "bool",
            BsonType::Date => "date",
            BsonType::Null => "null",
            BsonType::Regex => "regex",
            BsonType::JavaScript => "javascript",
            BsonType::Int => "int",
            BsonType::Timestamp => "timestamp",
            BsonType::Long => "long",
            BsonType::Decimal => "decimal",
            BsonType::MinKey => "minKey",
            BsonType::MaxKey => "maxKey",
            BsonType::Number => "number",
        }
    }
}

/// Bit mask for bitwise query operators: either an integer mask or a list of bit positions.
#[derive(Debug, Clone, PartialEq)]
pub enum BitMask {
    Mask(i64),
    Positions(Vec<u32>),
}

impl BitMask {
    pub fn to_bson(&self) -> Bson {
        match self {
            BitMask::Mask(mask) => Bson::Int64(*mask),
            BitMask::Positions(positions) => Bson::Array(
                positions
                    .iter()
                    .map(|p| Bson::Int64(i64::from(*p)))
                    .collect(),
            ),
        }
    }
}

impl From<i64> for BitMask {
    fn from(mask: i64) -> Self {
        BitMask::Mask(mask)
    }
}

impl From<Vec<u32>> for BitMask {
    fn from(positions: Vec<u32>) -> Self {
        BitMask::Positions(positions)
    }
}

/// The four bitwise tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitsKind {
    AllSet,
    AnySet,
    AllClear,
    AnyClear,
}

impl BitsKind {
    pub fn key(&self) -> &'static str {
        match self {
            BitsKind::AllSet => "$bitsAllSet",
            BitsKind::AnySet => "$bitsAnySet",
            BitsKind::AllClear => "$bitsAllClear",
            BitsKind::AnyClear => "$bitsAnyClear",
        }
    }
}

/// The reference point of a `$near` / `$nearSphere` query.
#[derive(Debug, Clone, PartialEq)]
pub enum NearPoint {
    /// Legacy coordinate pair; distances are in coordinate units (radians for spheres).
    Legacy(Point),
    /// GeoJSON point; distances are in meters.
    GeoJson(GeoJson),
}

impl From<Point> for NearPoint {
    fn from(point: Point) -> Self {
        NearPoint::Legacy(point)
    }
}

impl From<GeoJson> for NearPoint {
    fn from(geometry: GeoJson) -> Self {
        NearPoint::GeoJson(geometry)
    }
}

/// A single field operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Mod { divisor: i64, remainder: i64 },
    All(Vec<Bson>),
    Size(i64),
    Exists(bool),
    Type(Vec<BsonType>),
    Regex { pattern: String, options: String },
    ElemMatch(Criteria),
    /// Negation of the wrapped operator.
    Not(Box<Operator>),
    GeoWithin(Shape),
    Near { point: NearPoint, spherical: bool },
    MinDistance(f64),
    MaxDistance(f64),
    GeoIntersects(GeoJson),
    Bits(BitsKind, BitMask),
}

impl Operator {
    /// The operator key used in the rendered document.
    pub fn key(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "$eq",
            Operator::Ne(_) => "$ne",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::In(_) => "$in",
            Operator::Nin(_) => "$nin",
            Operator::Mod { .. } => "$mod",
            Operator::All(_) => "$all",
            Operator::Size(_) => "$size",
            Operator::Exists(_) => "$exists",
            Operator::Type(_) => "$type",
            Operator::Regex { .. } => "$regex",
            Operator::ElemMatch(_) => "$elemMatch",
            Operator::Not(_) => "$not",
            Operator::GeoWithin(_) => "$geoWithin",
            Operator::Near { spherical: false, .. } => "$near",
            Operator::Near { spherical: true, .. } => "$nearSphere",
            Operator::MinDistance(_) => "$minDistance",
            Operator::MaxDistance(_) => "$maxDistance",
            Operator::GeoIntersects(_) => "$geoIntersects",
            Operator::Bits(kind, _) => kind.key(),
        }
    }
}

/// All operators applied to one field path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldClause {
    pub path: String,
    pub operators: Vec<Operator>,
    /// Set by `not()` until the next operator consumes it.
    pub pending_not: bool,
}

/// One element of a criteria chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Field(FieldClause),
    Logical(Logical, Vec<Criteria>),
    /// A pre-rendered filter fragment, merged as-is.
    Raw(Document),
}

/// A chain of clauses rendering to one filter document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria {
    clauses: Vec<Clause>,
    errors: Vec<CriteriaError>,
}

impl Criteria {
    /// Creates an empty criteria that matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a typed field clause for the given property.
    pub fn field<O, T>(property: Property<O, T>) -> FieldCriteria<O, T> {
        FieldCriteria::new(property)
    }

    /// Starts a key-less clause for use inside `$elemMatch` on arrays of scalars.
    ///
    /// `Criteria::element::<i32>().gte(80).lt(85)` renders `{ "$gte": 80, "$lt": 85 }`.
    pub fn element<T>() -> FieldCriteria<T, T> {
        FieldCriteria::new(Property::new(""))
    }

    /// Wraps a raw filter document.
    pub fn from_document(document: Document) -> Self {
        Self {
            clauses: vec![Clause::Raw(document)],
            errors: Vec::new(),
        }
    }

    /// Combines criteria with `$and`.
    pub fn all_of(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::new().and_operator(criteria)
    }

    /// Combines criteria with `$or`.
    pub fn any_of(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::new().or_operator(criteria)
    }

    /// Combines criteria with `$nor`.
    pub fn none_of(criteria: impl IntoIterator<Item = Criteria>) -> Self {
        Self::new().nor_operator(criteria)
    }

    pub(crate) fn from_parts(clauses: Vec<Clause>, errors: Vec<CriteriaError>) -> Self {
        Self { clauses, errors }
    }

    /// The clauses of this chain, in insertion order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Errors recorded while building; reported on render.
    pub fn errors(&self) -> &[CriteriaError] {
        &self.errors
    }

    /// Returns `true` if the chain has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Appends another criteria's clauses to this chain.
    ///
    /// Both chains render into the same document, which is an implicit AND. Using the
    /// same path in both is reported on render; use [`Criteria::and_operator`] then.
    pub fn and(mut self, other: impl Into<Criteria>) -> Self {
        let other = other.into();
        self.clauses.extend(other.clauses);
        self.errors.extend(other.errors);
        self
    }

    /// Combines this criteria with another using `$or`.
    ///
    /// If this criteria is already a lone `$or` group, the other criteria is appended
    /// to it. Otherwise a new two-element `$or` group is created.
    pub fn or(self, other: impl Into<Criteria>) -> Self {
        let other = other.into();

        let is_or_group = matches!(self.clauses.as_slice(), [Clause::Logical(Logical::Or, _)]);

        if !is_or_group {
            return Self::new().or_operator([self, other]);
        }

        let Criteria { mut clauses, errors } = self;
        if let Some(Clause::Logical(_, members)) = clauses.first_mut() {
            members.push(other);
        }
        Self { clauses, errors }
    }

    /// Combines this criteria with another using `$nor`: neither may match.
    ///
    /// Always creates a new two-element group, so chained calls nest.
    pub fn nor(self, other: impl Into<Criteria>) -> Self {
        Self::new().nor_operator([self, other.into()])
    }

    /// Appends an `$and` clause over the given criteria.
    pub fn and_operator(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.logical(Logical::And, criteria)
    }

    /// Appends an `$or` clause over the given criteria.
    pub fn or_operator(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.logical(Logical::Or, criteria)
    }

    /// Appends a `$nor` clause over the given criteria.
    pub fn nor_operator(self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.logical(Logical::Nor, criteria)
    }

    fn logical(mut self, logical: Logical, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.clauses
            .push(Clause::Logical(logical, criteria.into_iter().collect()));
        self
    }

    /// Renders this criteria into a filter document.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::InvalidApiUsage`] for malformed chains and
    /// [`CriteriaError::Serialization`] for values that failed to convert.
    pub fn to_document(&self) -> CriteriaResult<Document> {
        DocumentRenderer.visit_criteria(self)
    }

    /// Returns the top-level keys this criteria renders, in order.
    pub fn keys(&self) -> Vec<String> {
        KeyCollector.visit_criteria(self).unwrap_or_default()
    }
}

impl From<Document> for Criteria {
    fn from(document: Document) -> Self {
        Criteria::from_document(document)
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_document() {
            Ok(document) => write!(f, "{document}"),
            Err(err) => write!(f, "<invalid criteria: {err}>"),
        }
    }
}
