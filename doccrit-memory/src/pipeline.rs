//! Aggregation pipeline execution over in-memory documents.
//!
//! Supports `$geoNear`, `$match`, `$sort`, `$skip`, `$limit`, `$count`, `$unwind`,
//! `$project` and `$group`. Any other stage fails with
//! [`OperationsError::Unsupported`].

use std::cmp::Ordering;

use bson::{Bson, Document, doc};

use doccrit_core::error::{OperationsError, OperationsResult};

use crate::{
    evaluator::{self, as_f64, as_i64, compare, equal, point_of, spherical_distance},
    path,
};

const EARTH_RADIUS_METERS: f64 = 6_378_100.0;

fn invalid(stage: &str, expected: &str) -> OperationsError {
    OperationsError::Backend(format!("{stage} expects {expected}"))
}

/// Runs `pipeline` over `documents`.
///
/// `geo_field` is the path covered by the collection's geo index, used by
/// `$geoNear` stages that name no `key`.
pub(crate) fn run(
    mut documents: Vec<Document>,
    pipeline: &[Document],
    geo_field: Option<&str>,
) -> OperationsResult<Vec<Document>> {
    for (position, stage) in pipeline.iter().enumerate() {
        let mut entries = stage.iter();
        let (name, spec) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(OperationsError::Backend(
                    "a pipeline stage must have exactly one field".to_string(),
                ));
            }
        };

        documents = match name.as_str() {
            "$geoNear" if position == 0 => geo_near(documents, document_spec(name, spec)?, geo_field)?,
            "$geoNear" => {
                return Err(OperationsError::Backend(
                    "$geoNear is only valid as the first stage of a pipeline".to_string(),
                ));
            }
            "$match" => {
                let filter = document_spec(name, spec)?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if evaluator::matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            "$sort" => {
                sort(&mut documents, document_spec(name, spec)?)?;
                documents
            }
            "$skip" => documents.into_iter().skip(count_spec(name, spec)?).collect(),
            "$limit" => documents.into_iter().take(count_spec(name, spec)?).collect(),
            "$count" => {
                let Bson::String(field) = spec else {
                    return Err(invalid(name, "a field name"));
                };
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let count = i64::try_from(documents.len()).unwrap_or(i64::MAX);
                    let value = i32::try_from(count).map_or(Bson::Int64(count), Bson::Int32);
                    vec![doc! { field.as_str(): value }]
                }
            }
            "$unwind" => unwind(documents, spec)?,
            "$project" => {
                let spec = document_spec(name, spec)?;
                documents
                    .iter()
                    .map(|document| project(document, spec))
                    .collect::<OperationsResult<Vec<_>>>()?
            }
            "$group" => group(&documents, document_spec(name, spec)?)?,
            other => {
                return Err(OperationsError::Unsupported(format!("aggregation stage {other}")));
            }
        };
    }
    Ok(documents)
}

fn document_spec<'a>(stage: &str, spec: &'a Bson) -> OperationsResult<&'a Document> {
    match spec {
        Bson::Document(spec) => Ok(spec),
        _ => Err(invalid(stage, "a document")),
    }
}

fn count_spec(stage: &str, spec: &Bson) -> OperationsResult<usize> {
    as_i64(spec)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(stage, "a non-negative integer"))
}

/// Parsed `{ path: 1 | -1 }` sort specification. Missing fields sort as null.
pub(crate) struct SortKeys<'a>(Vec<(&'a str, bool)>);

impl<'a> SortKeys<'a> {
    pub(crate) fn parse(spec: &'a Document) -> OperationsResult<Self> {
        let mut keys = Vec::with_capacity(spec.len());
        for (field, direction) in spec {
            let descending = match as_i64(direction) {
                Some(1) => false,
                Some(-1) => true,
                _ => return Err(invalid("$sort", "1 or -1 for each field")),
            };
            keys.push((field.as_str(), descending));
        }
        Ok(Self(keys))
    }

    pub(crate) fn compare(&self, left: &Document, right: &Document) -> Ordering {
        self.0
            .iter()
            .map(|(field, descending)| {
                let ordering = compare(
                    path::get(left, field).unwrap_or(&Bson::Null),
                    path::get(right, field).unwrap_or(&Bson::Null),
                );
                if *descending { ordering.reverse() } else { ordering }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

fn sort(documents: &mut [Document], spec: &Document) -> OperationsResult<()> {
    let keys = SortKeys::parse(spec)?;
    documents.sort_by(|left, right| keys.compare(left, right));
    Ok(())
}

fn field_path<'a>(stage: &str, reference: &'a str) -> OperationsResult<&'a str> {
    reference
        .strip_prefix('$')
        .ok_or_else(|| invalid(stage, "a field path starting with '$'"))
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> OperationsResult<Vec<Document>> {
    let (reference, preserve) = match spec {
        Bson::String(reference) => (reference.as_str(), false),
        Bson::Document(options) => (
            options
                .get_str("path")
                .map_err(|_| invalid("$unwind", "a path"))?,
            options
                .get_bool("preserveNullAndEmptyArrays")
                .unwrap_or(false),
        ),
        _ => return Err(invalid("$unwind", "a field path or options document")),
    };
    let field = field_path("$unwind", reference)?;

    let mut unwound = Vec::with_capacity(documents.len());
    for document in documents {
        match path::get(&document, field).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = document.clone();
                    path::set(&mut copy, field, item)?;
                    unwound.push(copy);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    unwound.push(document);
                }
            }
            Some(_) => unwound.push(document),
        }
    }
    Ok(unwound)
}

/// Applies an inclusion or exclusion projection such as `{ "title": 1 }`.
///
/// `_id` is included unless excluded explicitly. Field references like
/// `{ "name": "$author.name" }` are computed in inclusion projections.
pub(crate) fn project(document: &Document, spec: &Document) -> OperationsResult<Document> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    let mut computed = Vec::new();
    let mut keep_id = true;

    for (field, value) in spec {
        match value {
            Bson::String(reference) => computed.push((field.as_str(), field_path("$project", reference)?)),
            other => {
                let included = match other {
                    Bson::Boolean(flag) => *flag,
                    number => as_f64(number)
                        .map(|n| n != 0.0)
                        .ok_or_else(|| invalid("$project", "0, 1 or a field reference"))?,
                };
                match (field.as_str(), included) {
                    ("_id", flag) => keep_id = flag,
                    (_, true) => include.push(field.as_str()),
                    (_, false) => exclude.push(field.as_str()),
                }
            }
        }
    }

    if !exclude.is_empty() && !(include.is_empty() && computed.is_empty()) {
        return Err(OperationsError::Backend(
            "a projection cannot mix inclusion and exclusion".to_string(),
        ));
    }

    if include.is_empty() && computed.is_empty() {
        let mut projected = document.clone();
        for field in exclude {
            path::remove(&mut projected, field)?;
        }
        if !keep_id {
            projected.remove("_id");
        }
        return Ok(projected);
    }

    let mut projected = Document::new();
    if keep_id {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for field in include {
        if let Some(value) = path::get(document, field) {
            path::set(&mut projected, field, value.clone())?;
        }
    }
    for (field, source) in computed {
        if let Some(value) = path::get(document, source) {
            path::set(&mut projected, field, value.clone())?;
        }
    }
    Ok(projected)
}

/// Evaluates a group key or accumulator operand: field references, documents of
/// expressions, or constants.
fn evaluate(document: &Document, expression: &Bson) -> OperationsResult<Bson> {
    match expression {
        Bson::String(reference) if reference.starts_with('$') => {
            Ok(path::get(document, &reference[1..]).cloned().unwrap_or(Bson::Null))
        }
        Bson::Document(fields) if evaluator::is_operator_document(fields) => Err(
            OperationsError::Unsupported("expression operators in $group".to_string()),
        ),
        Bson::Document(fields) => {
            let mut evaluated = Document::new();
            for (key, value) in fields {
                evaluated.insert(key.as_str(), evaluate(document, value)?);
            }
            Ok(Bson::Document(evaluated))
        }
        constant => Ok(constant.clone()),
    }
}

#[derive(Debug)]
enum Accumulated {
    Sum(Bson),
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    Push(Vec<Bson>),
    AddToSet(Vec<Bson>),
}

impl Accumulated {
    fn new(operator: &str) -> OperationsResult<Self> {
        Ok(match operator {
            "$sum" => Accumulated::Sum(Bson::Int32(0)),
            "$avg" => Accumulated::Avg { total: 0.0, count: 0 },
            "$min" => Accumulated::Min(None),
            "$max" => Accumulated::Max(None),
            "$first" => Accumulated::First(None),
            "$last" => Accumulated::Last(Bson::Null),
            "$push" => Accumulated::Push(Vec::new()),
            "$addToSet" => Accumulated::AddToSet(Vec::new()),
            other => return Err(OperationsError::Unsupported(format!("accumulator {other}"))),
        })
    }

    fn add(&mut self, value: Bson) {
        match self {
            Accumulated::Sum(total) => {
                *total = match (&*total, &value) {
                    (Bson::Int32(a), Bson::Int32(b)) => a
                        .checked_add(*b)
                        .map_or(Bson::Int64(*a as i64 + *b as i64), Bson::Int32),
                    (a, b) => match (as_i64_strict(a), as_i64_strict(b)) {
                        (Some(a), Some(b)) => Bson::Int64(a.saturating_add(b)),
                        _ => match (as_f64(a), as_f64(b)) {
                            (Some(a), Some(b)) => Bson::Double(a + b),
                            _ => total.clone(),
                        },
                    },
                };
            }
            Accumulated::Avg { total, count } => {
                if let Some(n) = as_f64(&value) {
                    *total += n;
                    *count += 1;
                }
            }
            Accumulated::Min(current) => {
                if value != Bson::Null
                    && current.as_ref().is_none_or(|c| compare(&value, c) == Ordering::Less)
                {
                    *current = Some(value);
                }
            }
            Accumulated::Max(current) => {
                if value != Bson::Null
                    && current.as_ref().is_none_or(|c| compare(&value, c) == Ordering::Greater)
                {
                    *current = Some(value);
                }
            }
            Accumulated::First(current) => {
                current.get_or_insert(value);
            }
            Accumulated::Last(current) => *current = value,
            Accumulated::Push(items) => items.push(value),
            Accumulated::AddToSet(items) => {
                if !items.iter().any(|item| equal(item, &value)) {
                    items.push(value);
                }
            }
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulated::Sum(total) => total,
            Accumulated::Avg { count: 0, .. } => Bson::Null,
            Accumulated::Avg { total, count } => Bson::Double(total / count as f64),
            Accumulated::Min(value) | Accumulated::Max(value) | Accumulated::First(value) => {
                value.unwrap_or(Bson::Null)
            }
            Accumulated::Last(value) => value,
            Accumulated::Push(items) | Accumulated::AddToSet(items) => Bson::Array(items),
        }
    }
}

fn as_i64_strict(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

fn group(documents: &[Document], spec: &Document) -> OperationsResult<Vec<Document>> {
    let key_expression = spec
        .get("_id")
        .ok_or_else(|| invalid("$group", "an _id expression"))?;

    let mut outputs = Vec::new();
    for (name, accumulator) in spec.iter().filter(|(name, _)| *name != "_id") {
        let Bson::Document(accumulator) = accumulator else {
            return Err(invalid("$group", "accumulator documents"));
        };
        let Some((operator, operand)) = accumulator.iter().next() else {
            return Err(invalid("$group", "accumulator documents"));
        };
        Accumulated::new(operator)?;
        outputs.push((name.as_str(), operator.as_str(), operand));
    }

    let mut groups: Vec<(Bson, Vec<Accumulated>)> = Vec::new();
    for document in documents {
        let key = evaluate(document, key_expression)?;
        let index = match groups.iter().position(|(existing, _)| equal(existing, &key)) {
            Some(index) => index,
            None => {
                let state = outputs
                    .iter()
                    .map(|(_, operator, _)| Accumulated::new(operator))
                    .collect::<OperationsResult<Vec<_>>>()?;
                groups.push((key, state));
                groups.len() - 1
            }
        };

        for (state, (_, _, operand)) in groups[index].1.iter_mut().zip(&outputs) {
            state.add(evaluate(document, operand)?);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, state)| {
            let mut output = doc! { "_id": key };
            for (value, (name, _, _)) in state.into_iter().zip(&outputs) {
                output.insert(*name, value.finish());
            }
            output
        })
        .collect())
}

fn geo_near(
    documents: Vec<Document>,
    spec: &Document,
    geo_field: Option<&str>,
) -> OperationsResult<Vec<Document>> {
    let near = spec
        .get("near")
        .ok_or_else(|| invalid("$geoNear", "a near point"))?;
    let origin = point_of(near).ok_or_else(|| invalid("$geoNear", "a near point"))?;
    let geojson = matches!(near, Bson::Document(_));
    let spherical = geojson || spec.get_bool("spherical").unwrap_or(false);

    let distance_field = spec
        .get_str("distanceField")
        .map_err(|_| invalid("$geoNear", "a distanceField"))?;
    let key = match spec.get_str("key") {
        Ok(key) => key,
        Err(_) => geo_field.ok_or_else(|| {
            OperationsError::Backend("$geoNear requires a geo index or a key".to_string())
        })?,
    };
    let min = spec.get("minDistance").and_then(as_f64);
    let max = spec.get("maxDistance").and_then(as_f64);
    let multiplier = spec.get("distanceMultiplier").and_then(as_f64).unwrap_or(1.0);
    let query = match spec.get("query") {
        Some(Bson::Document(query)) => Some(query),
        Some(_) => return Err(invalid("$geoNear", "a query document")),
        None => None,
    };

    let mut found = Vec::new();
    for mut document in documents {
        if let Some(query) = query {
            if !evaluator::matches(&document, query)? {
                continue;
            }
        }
        let Some(location) = path::get(&document, key).and_then(point_of) else {
            continue;
        };

        let distance = match (spherical, geojson) {
            (true, true) => spherical_distance(origin, location) * EARTH_RADIUS_METERS,
            (true, false) => spherical_distance(origin, location),
            _ => ((location.0 - origin.0).powi(2) + (location.1 - origin.1).powi(2)).sqrt(),
        };
        if min.is_some_and(|min| distance < min) || max.is_some_and(|max| distance > max) {
            continue;
        }

        path::set(&mut document, distance_field, Bson::Double(distance * multiplier))?;
        found.push((distance, document));
    }

    found.sort_by(|(a, _), (b, _)| a.total_cmp(b));
    Ok(found.into_iter().map(|(_, document)| document).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn books() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "title": "Dune", "year": 1965, "price": 10.0, "tags": ["scifi", "classic"] },
            doc! { "_id": 2, "title": "Emma", "year": 1815, "price": 4.0, "tags": ["classic"] },
            doc! { "_id": 3, "title": "Neuromancer", "year": 1984, "price": 8.0, "tags": [] },
        ]
    }

    #[test]
    fn match_sort_skip_limit() {
        let result = run(
            books(),
            &[
                doc! { "$match": { "year": { "$gt": 1900 } } },
                doc! { "$sort": { "price": 1 } },
                doc! { "$skip": 1_i64 },
                doc! { "$limit": 5_i64 },
            ],
            None,
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get_str("title").unwrap(), "Dune");
    }

    #[test]
    fn unwind_and_group() {
        let result = run(
            books(),
            &[
                doc! { "$unwind": "$tags" },
                doc! { "$group": {
                    "_id": "$tags",
                    "books": { "$sum": 1 },
                    "avgPrice": { "$avg": "$price" },
                    "titles": { "$push": "$title" },
                } },
                doc! { "$sort": { "_id": 1 } },
            ],
            None,
        )
        .unwrap();

        assert_eq!(
            result,
            vec![
                doc! { "_id": "classic", "books": 2, "avgPrice": 7.0, "titles": ["Dune", "Emma"] },
                doc! { "_id": "scifi", "books": 1, "avgPrice": 10.0, "titles": ["Dune"] },
            ]
        );
    }

    #[test]
    fn unwind_preserving_keeps_empty_arrays() {
        let result = run(
            books(),
            &[doc! { "$unwind": { "path": "$tags", "preserveNullAndEmptyArrays": true } }],
            None,
        )
        .unwrap();
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn group_all_and_count() {
        let result = run(
            books(),
            &[doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$price" }, "oldest": { "$min": "$year" } } }],
            None,
        )
        .unwrap();
        assert_eq!(result, vec![doc! { "_id": Bson::Null, "total": 22.0, "oldest": 1815 }]);

        let counted = run(books(), &[doc! { "$count": "total" }], None).unwrap();
        assert_eq!(counted, vec![doc! { "total": 3 }]);
    }

    #[test]
    fn projections() {
        let document = doc! { "_id": 1, "title": "Dune", "author": { "name": "Frank", "born": 1920 } };
        assert_eq!(
            project(&document, &doc! { "title": 1, "author.name": 1 }).unwrap(),
            doc! { "_id": 1, "title": "Dune", "author": { "name": "Frank" } }
        );
        assert_eq!(
            project(&document, &doc! { "author": 0, "_id": 0 }).unwrap(),
            doc! { "title": "Dune" }
        );
        assert!(project(&document, &doc! { "title": 1, "author": 0 }).is_err());
    }

    #[test]
    fn geo_near_sorts_by_distance() {
        let venues = vec![
            doc! { "name": "far", "location": [5.0, 0.0] },
            doc! { "name": "near", "location": [1.0, 0.0] },
            doc! { "name": "nowhere" },
        ];
        let result = run(
            venues,
            &[doc! { "$geoNear": { "near": [0.0, 0.0], "distanceField": "dis", "spherical": false, "maxDistance": 10.0 } }],
            Some("location"),
        )
        .unwrap();

        assert_eq!(
            result,
            vec![
                doc! { "name": "near", "location": [1.0, 0.0], "dis": 1.0 },
                doc! { "name": "far", "location": [5.0, 0.0], "dis": 5.0 },
            ]
        );
    }

    #[test]
    fn unknown_stages_are_unsupported() {
        let error = run(books(), &[doc! { "$sample": { "size": 1 } }], None).unwrap_err();
        assert!(matches!(error, OperationsError::Unsupported(_)));
    }
}
