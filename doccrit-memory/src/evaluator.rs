//! Filter document evaluation for in-memory collections.
//!
//! [`matches`] decides whether a stored document satisfies a rendered filter
//! document, following the store's query semantics: dotted paths, implicit array
//! traversal, and `null` matching missing fields.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex_lite::Regex;

use doccrit_core::error::{OperationsError, OperationsResult};

use crate::path;

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so `1` equals `1.0`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's type in the cross-type sort order.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Other(Bson::MinKey) => 0,
            Comparable::Null => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) | Comparable::Other(Bson::Symbol(_)) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
            Comparable::Other(Bson::Timestamp(_)) => 10,
            Comparable::Other(Bson::RegularExpression(_)) => 11,
            Comparable::Other(Bson::MaxKey) => 12,
            Comparable::Other(_) => 6,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Total order over BSON values: by type rank first, then by value.
pub(crate) fn compare(left: &Bson, right: &Bson) -> Ordering {
    let (left, right) = (Comparable::from(left), Comparable::from(right));
    left.type_rank()
        .cmp(&right.type_rank())
        .then_with(|| left.partial_cmp(&right).unwrap_or(Ordering::Equal))
}

/// Equality under the store's numeric normalization.
pub(crate) fn equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Whether the document's first key is an operator, e.g. `{ "$gt": 5 }`.
pub(crate) fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn unsupported(operator: &str) -> OperationsError {
    OperationsError::Unsupported(format!("query operator {operator}"))
}

fn invalid(operator: &str, expected: &str) -> OperationsError {
    OperationsError::Backend(format!("{operator} expects {expected}"))
}

/// Whether `document` satisfies `filter`.
pub(crate) fn matches(document: &Document, filter: &Document) -> OperationsResult<bool> {
    for (key, condition) in filter {
        if !matches_entry(document, key, condition)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_entry(document: &Document, key: &str, condition: &Bson) -> OperationsResult<bool> {
    match key {
        "$and" => {
            for clause in clauses(key, condition)? {
                if !matches(document, clause)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$or" | "$nor" => {
            let mut any = false;
            for clause in clauses(key, condition)? {
                if matches(document, clause)? {
                    any = true;
                    break;
                }
            }
            Ok(any == (key == "$or"))
        }
        "$comment" => Ok(true),
        operator if operator.starts_with('$') => Err(unsupported(operator)),
        field => {
            let values = path::lookup(document, field);
            match condition {
                Bson::Document(operators) if is_operator_document(operators) => {
                    matches_operators(&values, operators)
                }
                Bson::RegularExpression(regex) => {
                    matches_regex(&values, regex.pattern.as_str(), regex.options.as_str())
                }
                expected => Ok(equals_any(&values, expected)),
            }
        }
    }
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> OperationsResult<Vec<&'a Document>> {
    match condition {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Bson::Document(clause) => Ok(clause),
                _ => Err(invalid(operator, "an array of documents")),
            })
            .collect(),
        _ => Err(invalid(operator, "a non-empty array")),
    }
}

fn equals_any(values: &[&Bson], expected: &Bson) -> bool {
    if values.is_empty() {
        return matches!(expected, Bson::Null);
    }
    let expected = Comparable::from(expected);
    path::expand(values)
        .into_iter()
        .any(|value| Comparable::from(value) == expected)
}

fn compares(values: &[&Bson], bound: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let bound = Comparable::from(bound);
    path::expand(values).into_iter().any(|value| {
        Comparable::from(value)
            .partial_cmp(&bound)
            .is_some_and(&accept)
    })
}

fn array_argument<'a>(operator: &str, argument: &'a Bson) -> OperationsResult<&'a [Bson]> {
    match argument {
        Bson::Array(items) => Ok(items),
        _ => Err(invalid(operator, "an array")),
    }
}

pub(crate) fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

pub(crate) fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => as_f64(other).is_none_or(|n| n != 0.0),
    }
}

/// Evaluates an operator document such as `{ "$gte": 1, "$lt": 5 }` against the
/// values found at a path.
pub(crate) fn matches_operators(values: &[&Bson], operators: &Document) -> OperationsResult<bool> {
    for (operator, argument) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals_any(values, argument),
            "$ne" => !equals_any(values, argument),
            "$gt" => compares(values, argument, |o| o == Ordering::Greater),
            "$gte" => compares(values, argument, |o| o != Ordering::Less),
            "$lt" => compares(values, argument, |o| o == Ordering::Less),
            "$lte" => compares(values, argument, |o| o != Ordering::Greater),
            "$in" => array_argument(operator, argument)?
                .iter()
                .any(|candidate| equals_any(values, candidate)),
            "$nin" => !array_argument(operator, argument)?
                .iter()
                .any(|candidate| equals_any(values, candidate)),
            "$exists" => !values.is_empty() == truthy(argument),
            "$type" => matches_type(values, argument)?,
            "$size" => {
                let size = as_i64(argument).ok_or_else(|| invalid(operator, "a number"))?;
                values
                    .iter()
                    .any(|value| matches!(value, Bson::Array(items) if items.len() as i64 == size))
            }
            "$all" => {
                let required = array_argument(operator, argument)?;
                !required.is_empty() && required.iter().all(|item| equals_any(values, item))
            }
            "$elemMatch" => match argument {
                Bson::Document(condition) => elem_match(values, condition)?,
                _ => return Err(invalid(operator, "a document")),
            },
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or_default();
                match argument {
                    Bson::String(pattern) => matches_regex(values, pattern, options)?,
                    Bson::RegularExpression(regex) => {
                        matches_regex(values, regex.pattern.as_str(), regex.options.as_str())?
                    }
                    _ => return Err(invalid(operator, "a string")),
                }
            }
            "$options" => true,
            "$not" => match argument {
                Bson::Document(inner) => !matches_operators(values, inner)?,
                Bson::RegularExpression(regex) => {
                    !matches_regex(values, regex.pattern.as_str(), regex.options.as_str())?
                }
                _ => return Err(invalid(operator, "an operator document")),
            },
            "$mod" => matches_mod(values, argument)?,
            "$bitsAllSet" | "$bitsAnySet" | "$bitsAllClear" | "$bitsAnyClear" => {
                matches_bits(values, operator, argument)?
            }
            "$geoWithin" => match argument {
                Bson::Document(shape) => geo_within(values, shape)?,
                _ => return Err(invalid(operator, "a shape document")),
            },
            other => return Err(unsupported(other)),
        };

        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn elem_match(values: &[&Bson], condition: &Document) -> OperationsResult<bool> {
    for value in values {
        let Bson::Array(items) = value else { continue };
        for item in items {
            let hit = if is_operator_document(condition) {
                matches_operators(&[item], condition)?
            } else {
                match item {
                    Bson::Document(element) => matches(element, condition)?,
                    _ => false,
                }
            };
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Compiles a pattern with store-style option letters into a regex.
pub(crate) fn compile_regex(pattern: &str, options: &str) -> OperationsResult<Regex> {
    let flags: String = options
        .chars()
        .filter(|flag| matches!(flag, 'i' | 'm' | 's' | 'x'))
        .collect();
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{flags}){pattern}")
    };

    Regex::new(&source)
        .map_err(|e| OperationsError::Backend(format!("invalid regular expression '{pattern}': {e}")))
}

fn matches_regex(values: &[&Bson], pattern: &str, options: &str) -> OperationsResult<bool> {
    let regex = compile_regex(pattern, options)?;
    Ok(path::expand(values)
        .into_iter()
        .any(|value| matches!(value, Bson::String(text) if regex.is_match(text))))
}

const TYPE_CODES: &[(i64, &str)] = &[
    (1, "double"),
    (2, "string"),
    (3, "object"),
    (4, "array"),
    (5, "binData"),
    (7, "objectId"),
    (8, "bool"),
    (9, "date"),
    (10, "null"),
    (11, "regex"),
    (13, "javascript"),
    (16, "int"),
    (17, "timestamp"),
    (18, "long"),
    (19, "decimal"),
    (-1, "minKey"),
    (127, "maxKey"),
];

fn type_alias(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => "javascript",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
        _ => "other",
    }
}

fn matches_type(values: &[&Bson], argument: &Bson) -> OperationsResult<bool> {
    let requested: Vec<&Bson> = match argument {
        Bson::Array(items) => items.iter().collect(),
        single => vec![single],
    };

    let mut aliases = Vec::with_capacity(requested.len());
    for entry in requested {
        let alias = match entry {
            Bson::String(alias) => alias.as_str(),
            code => {
                let code = as_i64(code).ok_or_else(|| invalid("$type", "a type alias or code"))?;
                TYPE_CODES
                    .iter()
                    .find(|(known, _)| *known == code)
                    .map(|(_, alias)| *alias)
                    .ok_or_else(|| invalid("$type", "a known type code"))?
            }
        };
        aliases.push(alias);
    }

    Ok(path::expand(values).into_iter().any(|value| {
        let actual = type_alias(value);
        aliases.iter().any(|alias| {
            *alias == actual
                || (*alias == "number" && matches!(actual, "double" | "int" | "long" | "decimal"))
        })
    }))
}

fn matches_mod(values: &[&Bson], argument: &Bson) -> OperationsResult<bool> {
    let (divisor, remainder) = match array_argument("$mod", argument)? {
        [divisor, remainder] => (
            as_i64(divisor).ok_or_else(|| invalid("$mod", "numeric divisor and remainder"))?,
            as_i64(remainder).ok_or_else(|| invalid("$mod", "numeric divisor and remainder"))?,
        ),
        _ => return Err(invalid("$mod", "[divisor, remainder]")),
    };
    if divisor == 0 {
        return Err(invalid("$mod", "a non-zero divisor"));
    }

    Ok(path::expand(values).into_iter().any(|value| {
        as_f64(value).is_some_and(|n| (n.trunc() as i64).wrapping_rem(divisor) == remainder)
    }))
}

fn matches_bits(values: &[&Bson], operator: &str, argument: &Bson) -> OperationsResult<bool> {
    let mask = match argument {
        Bson::Array(positions) => positions.iter().try_fold(0i64, |mask, position| {
            as_i64(position)
                .filter(|p| (0..64).contains(p))
                .map(|p| mask | (1i64 << p))
                .ok_or_else(|| invalid(operator, "bit positions between 0 and 63"))
        })?,
        Bson::Binary(_) => return Err(unsupported("binary bit masks")),
        other => as_i64(other).ok_or_else(|| invalid(operator, "a numeric mask"))?,
    };

    Ok(path::expand(values).into_iter().filter_map(as_i64).any(|bits| {
        match operator {
            "$bitsAllSet" => bits & mask == mask,
            "$bitsAnySet" => bits & mask != 0,
            "$bitsAllClear" => bits & mask == 0,
            _ => bits & mask != mask,
        }
    }))
}

/// Reads a location as `(x, y)`: a coordinate array, a GeoJSON point, or a
/// document whose first two values are numeric.
pub(crate) fn point_of(value: &Bson) -> Option<(f64, f64)> {
    match value {
        Bson::Array(items) => match items.as_slice() {
            [x, y, ..] => Some((as_f64(x)?, as_f64(y)?)),
            _ => None,
        },
        Bson::Document(document) => {
            if let Some(coordinates) = document.get("coordinates") {
                return point_of(coordinates);
            }
            let mut numbers = document.values().filter_map(as_f64);
            Some((numbers.next()?, numbers.next()?))
        }
        _ => None,
    }
}

fn points_of(value: &Bson) -> Option<Vec<(f64, f64)>> {
    match value {
        Bson::Array(items) => items.iter().map(point_of).collect(),
        _ => None,
    }
}

/// Great-circle distance in radians between two `(longitude, latitude)` points.
pub(crate) fn spherical_distance(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lng1, lat1) = (from.0.to_radians(), from.1.to_radians());
    let (lng2, lat2) = (to.0.to_radians(), to.1.to_radians());
    let a = ((lat2 - lat1) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lng2 - lng1) / 2.0).sin().powi(2);
    2.0 * a.sqrt().min(1.0).asin()
}

fn in_polygon((x, y): (f64, f64), ring: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let mut previous = match ring.last() {
        Some(last) => *last,
        None => return false,
    };
    for &(xi, yi) in ring {
        let (xj, yj) = previous;
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        previous = (xi, yi);
    }
    inside
}

fn geo_within(values: &[&Bson], shape: &Document) -> OperationsResult<bool> {
    let (kind, argument) = shape
        .iter()
        .next()
        .ok_or_else(|| invalid("$geoWithin", "a shape"))?;

    let contains: Box<dyn Fn((f64, f64)) -> bool> = match kind.as_str() {
        "$box" => {
            let corners = points_of(argument).ok_or_else(|| invalid("$box", "two points"))?;
            let [(x1, y1), (x2, y2)] = corners[..] else {
                return Err(invalid("$box", "two points"));
            };
            Box::new(move |(x, y)| {
                x >= x1.min(x2) && x <= x1.max(x2) && y >= y1.min(y2) && y <= y1.max(y2)
            })
        }
        "$center" | "$centerSphere" => {
            let (center, radius) = match array_argument(kind, argument)? {
                [center, radius] => (
                    point_of(center).ok_or_else(|| invalid(kind, "a center point"))?,
                    as_f64(radius).ok_or_else(|| invalid(kind, "a numeric radius"))?,
                ),
                _ => return Err(invalid(kind, "[center, radius]")),
            };
            if kind == "$center" {
                Box::new(move |(x, y)| ((x - center.0).powi(2) + (y - center.1).powi(2)).sqrt() <= radius)
            } else {
                Box::new(move |point| spherical_distance(center, point) <= radius)
            }
        }
        "$polygon" => {
            let ring = points_of(argument).ok_or_else(|| invalid("$polygon", "an array of points"))?;
            Box::new(move |point| in_polygon(point, &ring))
        }
        "$geometry" => {
            let ring = match argument {
                Bson::Document(geometry) if geometry.get_str("type").is_ok_and(|t| t == "Polygon") => geometry
                    .get_array("coordinates")
                    .ok()
                    .and_then(|rings| rings.first())
                    .and_then(points_of),
                _ => return Err(unsupported("$geoWithin geometries other than Polygon")),
            }
            .ok_or_else(|| invalid("$geometry", "polygon coordinates"))?;
            Box::new(move |point| in_polygon(point, &ring))
        }
        other => return Err(unsupported(other)),
    };

    Ok(values
        .iter()
        .filter_map(|value| point_of(value))
        .any(|point| contains(point)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn book() -> Document {
        doc! {
            "title": "Dune",
            "year": 1965,
            "price": 9.5,
            "tags": ["classic", "scifi"],
            "author": { "name": "Frank Herbert" },
            "reviews": [ { "user": "ann", "stars": 5 }, { "user": "bob", "stars": 3 } ],
            "flags": 5,
            "location": [2.0, 3.0],
        }
    }

    fn check(filter: Document) -> bool {
        matches(&book(), &filter).unwrap()
    }

    #[test]
    fn equality_and_comparison() {
        assert!(check(doc! { "title": "Dune" }));
        assert!(check(doc! { "year": 1965.0 }));
        assert!(check(doc! { "year": { "$gte": 1960, "$lt": 1970 } }));
        assert!(!check(doc! { "price": { "$gt": 10 } }));
        assert!(!check(doc! { "title": { "$gt": 5 } }));
    }

    #[test]
    fn null_matches_missing_fields() {
        assert!(check(doc! { "subtitle": null }));
        assert!(!check(doc! { "subtitle": { "$ne": null } }));
        assert!(check(doc! { "subtitle": { "$exists": false } }));
        assert!(check(doc! { "author.name": { "$exists": true } }));
    }

    #[test]
    fn arrays_are_traversed() {
        assert!(check(doc! { "tags": "scifi" }));
        assert!(check(doc! { "tags": { "$in": ["poetry", "classic"] } }));
        assert!(!check(doc! { "tags": { "$nin": ["classic"] } }));
        assert!(check(doc! { "tags": { "$all": ["scifi", "classic"] } }));
        assert!(check(doc! { "tags": { "$size": 2 } }));
        assert!(check(doc! { "reviews.user": "bob" }));
    }

    #[test]
    fn elem_match_requires_one_element_to_match_all_conditions() {
        assert!(check(doc! { "reviews": { "$elemMatch": { "user": "ann", "stars": 5 } } }));
        assert!(!check(doc! { "reviews": { "$elemMatch": { "user": "bob", "stars": 5 } } }));
        assert!(check(doc! { "tags": { "$elemMatch": { "$regex": "^sci" } } }));
    }

    #[test]
    fn logical_operators() {
        assert!(check(doc! { "$or": [ { "year": 1 }, { "title": "Dune" } ] }));
        assert!(!check(doc! { "$nor": [ { "year": 1 }, { "title": "Dune" } ] }));
        assert!(check(doc! { "$and": [ { "year": 1965 }, { "title": "Dune" } ] }));
        assert!(check(doc! { "year": { "$not": { "$gt": 2000 } } }));
    }

    #[test]
    fn regex_type_mod_and_bits() {
        assert!(check(doc! { "title": { "$regex": "^du", "$options": "i" } }));
        assert!(!check(doc! { "title": { "$regex": "^du" } }));
        assert!(check(doc! { "year": { "$type": "number" } }));
        assert!(check(doc! { "price": { "$type": ["string", "double"] } }));
        assert!(check(doc! { "year": { "$mod": [5, 0] } }));
        assert!(matches(&doc! { "n": i64::MIN }, &doc! { "n": { "$mod": [-1i64, 0i64] } }).unwrap());
        assert!(check(doc! { "flags": { "$bitsAllSet": [0, 2] } }));
        assert!(check(doc! { "flags": { "$bitsAnyClear": 3 } }));
    }

    #[test]
    fn geo_within_shapes() {
        assert!(check(doc! { "location": { "$geoWithin": { "$box": [[0.0, 0.0], [5.0, 5.0]] } } }));
        assert!(!check(doc! { "location": { "$geoWithin": { "$center": [[0.0, 0.0], 1.0] } } }));
        assert!(check(doc! {
            "location": { "$geoWithin": { "$polygon": [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]] } }
        }));
    }

    #[test]
    fn unknown_operators_are_unsupported() {
        let error = matches(&book(), &doc! { "title": { "$near": [0.0, 0.0] } }).unwrap_err();
        assert!(matches!(error, OperationsError::Unsupported(_)));
        let error = matches(&book(), &doc! { "$where": "true" }).unwrap_err();
        assert!(matches!(error, OperationsError::Unsupported(_)));
    }

    #[test]
    fn compare_orders_by_type_then_value() {
        assert_eq!(compare(&Bson::Null, &Bson::Int32(1)), Ordering::Less);
        assert_eq!(compare(&Bson::Int32(2), &Bson::Double(1.5)), Ordering::Greater);
        assert_eq!(compare(&Bson::String("a".into()), &Bson::Int64(9)), Ordering::Greater);
    }
}
