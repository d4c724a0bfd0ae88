//! Applies rendered update documents to stored documents.

use bson::{Bson, DateTime, Document, Timestamp};

use doccrit_core::error::{OperationsError, OperationsResult};

use crate::{
    evaluator::{self, as_f64, compare, equal, is_operator_document},
    path,
};

fn failed(operator: &str, path: &str, reason: &str) -> OperationsError {
    OperationsError::Backend(format!("cannot apply {operator} to '{path}': {reason}"))
}

/// Applies every operator of `update` to `document`.
///
/// `$setOnInsert` only takes effect when `inserting` is set.
pub(crate) fn apply(document: &mut Document, update: &Document, inserting: bool) -> OperationsResult<()> {
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(OperationsError::Backend(format!(
                "update operator {operator} expects a document"
            )));
        };

        for (field, argument) in fields {
            apply_one(document, operator, field, argument, inserting)?;
        }
    }
    Ok(())
}

fn apply_one(
    document: &mut Document,
    operator: &str,
    field: &str,
    argument: &Bson,
    inserting: bool,
) -> OperationsResult<()> {
    match operator {
        "$set" => path::set(document, field, argument.clone()),
        "$setOnInsert" if inserting => path::set(document, field, argument.clone()),
        "$setOnInsert" => Ok(()),
        "$unset" => path::remove(document, field).map(|_| ()),
        "$inc" => {
            let current = path::get(document, field).cloned();
            let value = match current {
                Some(current) => arithmetic(operator, field, &current, argument, i64::checked_add, |a, b| a + b)?,
                None => numeric(operator, field, argument)?.clone(),
            };
            path::set(document, field, value)
        }
        "$mul" => {
            let current = path::get(document, field).cloned();
            let value = match current {
                Some(current) => arithmetic(operator, field, &current, argument, i64::checked_mul, |a, b| a * b)?,
                None => zero_like(numeric(operator, field, argument)?),
            };
            path::set(document, field, value)
        }
        "$min" | "$max" => {
            let wanted = if operator == "$min" {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            };
            let replace = path::get(document, field)
                .is_none_or(|current| compare(argument, current) == wanted);
            if replace {
                path::set(document, field, argument.clone())?;
            }
            Ok(())
        }
        "$rename" => {
            let Bson::String(target) = argument else {
                return Err(failed(operator, field, "the new name must be a string"));
            };
            if let Some(value) = path::remove(document, field)? {
                path::set(document, target, value)?;
            }
            Ok(())
        }
        "$push" | "$addToSet" => {
            let items = match argument {
                Bson::Document(modifiers) if modifiers.contains_key("$each") => {
                    match modifiers.get("$each") {
                        Some(Bson::Array(items)) => items.clone(),
                        _ => return Err(failed(operator, field, "$each expects an array")),
                    }
                }
                single => vec![single.clone()],
            };
            let array = array_at(document, operator, field, true)?;
            for item in items {
                if operator == "$push" || !array.iter().any(|existing| equal(existing, &item)) {
                    array.push(item);
                }
            }
            Ok(())
        }
        "$pull" => {
            let mut error = None;
            if let Some(array) = existing_array(document, operator, field)? {
                array.retain(|item| match pull_matches(item, argument) {
                    Ok(matched) => !matched,
                    Err(e) => {
                        error.get_or_insert(e);
                        true
                    }
                });
            }
            error.map_or(Ok(()), Err)
        }
        "$pullAll" => {
            let Bson::Array(removed) = argument else {
                return Err(failed(operator, field, "expects an array"));
            };
            if let Some(array) = existing_array(document, operator, field)? {
                array.retain(|item| !removed.iter().any(|r| equal(item, r)));
            }
            Ok(())
        }
        "$pop" => {
            let from_front = evaluator::as_i64(argument) == Some(-1);
            if let Some(array) = existing_array(document, operator, field)? {
                if from_front {
                    if !array.is_empty() {
                        array.remove(0);
                    }
                } else {
                    array.pop();
                }
            }
            Ok(())
        }
        "$currentDate" => {
            let timestamp = matches!(
                argument,
                Bson::Document(spec) if spec.get_str("$type").is_ok_and(|t| t == "timestamp")
            );
            let now = DateTime::now();
            let value = if timestamp {
                Bson::Timestamp(Timestamp {
                    time: (now.timestamp_millis() / 1000) as u32,
                    increment: 1,
                })
            } else {
                Bson::DateTime(now)
            };
            path::set(document, field, value)
        }
        other => Err(OperationsError::Unsupported(format!("update operator {other}"))),
    }
}

fn numeric<'a>(operator: &str, field: &str, value: &'a Bson) -> OperationsResult<&'a Bson> {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(value),
        _ => Err(failed(operator, field, "the operand must be numeric")),
    }
}

fn zero_like(value: &Bson) -> Bson {
    match value {
        Bson::Int32(_) => Bson::Int32(0),
        Bson::Int64(_) => Bson::Int64(0),
        _ => Bson::Double(0.0),
    }
}

/// Integer arithmetic stays integral while it fits; doubles are contagious.
fn arithmetic(
    operator: &str,
    field: &str,
    current: &Bson,
    operand: &Bson,
    integral: fn(i64, i64) -> Option<i64>,
    floating: fn(f64, f64) -> f64,
) -> OperationsResult<Bson> {
    numeric(operator, field, operand)?;
    let integer = |value: &Bson| match value {
        Bson::Int32(v) => Some(*v as i64),
        Bson::Int64(v) => Some(*v),
        _ => None,
    };

    match (integer(current), integer(operand)) {
        (Some(a), Some(b)) => Ok(match integral(a, b) {
            Some(result) => match (current, operand, i32::try_from(result)) {
                (Bson::Int32(_), Bson::Int32(_), Ok(small)) => Bson::Int32(small),
                _ => Bson::Int64(result),
            },
            None => Bson::Double(floating(a as f64, b as f64)),
        }),
        _ => match (as_f64(current), as_f64(operand)) {
            (Some(a), Some(b)) => Ok(Bson::Double(floating(a, b))),
            _ => Err(failed(operator, field, "the existing value is not numeric")),
        },
    }
}

fn array_at<'a>(
    document: &'a mut Document,
    operator: &str,
    field: &str,
    create: bool,
) -> OperationsResult<&'a mut Vec<Bson>> {
    if create && path::get(document, field).is_none() {
        path::set(document, field, Bson::Array(Vec::new()))?;
    }
    match path::get_mut(document, field)? {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(failed(operator, field, "the existing value is not an array")),
    }
}

fn existing_array<'a>(
    document: &'a mut Document,
    operator: &str,
    field: &str,
) -> OperationsResult<Option<&'a mut Vec<Bson>>> {
    if path::get(document, field).is_none() {
        return Ok(None);
    }
    array_at(document, operator, field, false).map(Some)
}

fn pull_matches(item: &Bson, condition: &Bson) -> OperationsResult<bool> {
    match (item, condition) {
        (_, Bson::Document(operators)) if is_operator_document(operators) => {
            evaluator::matches_operators(&[item], operators)
        }
        (Bson::Document(element), Bson::Document(filter)) => evaluator::matches(element, filter),
        _ => Ok(equal(item, condition)),
    }
}

/// The document an upsert starts from: the equality conditions of its filter.
pub(crate) fn seed_from_filter(filter: &Document) -> OperationsResult<Document> {
    let mut seed = Document::new();
    collect_equalities(filter, &mut seed)?;
    Ok(seed)
}

fn collect_equalities(filter: &Document, seed: &mut Document) -> OperationsResult<()> {
    for (key, condition) in filter {
        if key == "$and" {
            if let Bson::Array(clauses) = condition {
                for clause in clauses {
                    if let Bson::Document(clause) = clause {
                        collect_equalities(clause, seed)?;
                    }
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }

        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                if let Some(value) = operators.get("$eq") {
                    path::set(seed, key, value.clone())?;
                }
            }
            Bson::RegularExpression(_) => {}
            value => path::set(seed, key, value.clone())?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    fn updated(mut document: Document, update: Document) -> Document {
        apply(&mut document, &update, false).unwrap();
        document
    }

    #[test]
    fn set_unset_and_rename() {
        let document = updated(
            doc! { "a": 1, "b": 2, "c": 3 },
            doc! { "$set": { "a": 10, "d.e": true }, "$unset": { "b": "" }, "$rename": { "c": "z" } },
        );
        assert_eq!(document, doc! { "a": 10, "d": { "e": true }, "z": 3 });
    }

    #[test]
    fn inc_and_mul_keep_integer_types() {
        let document = updated(
            doc! { "count": 1, "big": 2_i64, "price": 2.5 },
            doc! { "$inc": { "count": 2, "big": 1, "fresh": 5 }, "$mul": { "price": 2, "none": 3 } },
        );
        assert_eq!(
            document,
            doc! { "count": 3, "big": 3_i64, "price": 5.0, "fresh": 5, "none": 0 }
        );
    }

    #[test]
    fn inc_rejects_non_numeric_values() {
        let mut document = doc! { "name": "x" };
        assert!(apply(&mut document, &doc! { "$inc": { "name": 1 } }, false).is_err());
    }

    #[test]
    fn min_and_max() {
        let document = updated(
            doc! { "low": 5, "high": 5 },
            doc! { "$min": { "low": 3, "high": 9 }, "$max": { "missing": 1 } },
        );
        assert_eq!(document, doc! { "low": 3, "high": 5, "missing": 1 });
    }

    #[test]
    fn array_operators() {
        let document = updated(
            doc! { "tags": ["a", "b"], "scores": [1, 5, 9, 5], "queue": [1, 2, 3] },
            doc! {
                "$push": { "tags": { "$each": ["c", "a"] } },
                "$addToSet": { "more": { "$each": ["x", "x"] } },
                "$pull": { "scores": { "$gte": 5 } },
                "$pop": { "queue": -1 },
            },
        );
        assert_eq!(
            document,
            doc! {
                "tags": ["a", "b", "c", "a"],
                "scores": [1],
                "queue": [2, 3],
                "more": ["x"],
            }
        );
    }

    #[test]
    fn pull_documents_by_filter() {
        let document = updated(
            doc! { "items": [ { "k": 1 }, { "k": 2 } ] },
            doc! { "$pull": { "items": { "k": 2 } }, "$pullAll": { "none": [1] } },
        );
        assert_eq!(document, doc! { "items": [ { "k": 1 } ] });
    }

    #[test]
    fn set_on_insert_only_applies_on_insert() {
        let update = doc! { "$setOnInsert": { "created": true } };
        let mut document = Document::new();
        apply(&mut document, &update, false).unwrap();
        assert!(document.is_empty());
        apply(&mut document, &update, true).unwrap();
        assert_eq!(document, doc! { "created": true });
    }

    #[test]
    fn seeds_upserts_from_equalities() {
        let seed = seed_from_filter(&doc! {
            "name": "x",
            "age": { "$gt": 3 },
            "kind": { "$eq": "y" },
            "$and": [ { "meta.tag": "t" } ],
        })
        .unwrap();
        assert_eq!(seed, doc! { "name": "x", "kind": "y", "meta": { "tag": "t" } });
    }
}
