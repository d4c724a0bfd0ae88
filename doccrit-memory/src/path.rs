//! Dotted-path access into BSON documents.
//!
//! Reads follow the store's implicit array traversal: `tags.name` on an array of
//! documents yields the `name` of every element. Numeric segments index into arrays.
//! Writes create missing intermediate documents.

use bson::{Bson, Document};

use doccrit_core::error::{OperationsError, OperationsResult};

/// Values reached by `path`, traversing arrays at intermediate positions.
///
/// Arrays at the end of the path are returned as-is; see [`expand`].
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Vec::new();
    };
    let rest: Vec<&str> = segments.collect();

    match document.get(first) {
        Some(value) => descend(value, &rest),
        None => Vec::new(),
    }
}

fn descend<'a>(value: &'a Bson, segments: &[&str]) -> Vec<&'a Bson> {
    let Some((segment, rest)) = segments.split_first() else {
        return vec![value];
    };

    match value {
        Bson::Document(document) => match document.get(*segment) {
            Some(next) => descend(next, rest),
            None => Vec::new(),
        },
        Bson::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                return items
                    .get(index)
                    .map(|item| descend(item, rest))
                    .unwrap_or_default();
            }
            items
                .iter()
                .filter(|item| matches!(item, Bson::Document(_)))
                .flat_map(|item| descend(item, segments))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// The values themselves plus the elements of any array among them.
pub(crate) fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }
    expanded
}

/// The single value at `path`, without array traversal except numeric indexes.
pub(crate) fn get<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current: Option<&Bson> = None;
    for (position, segment) in path.split('.').enumerate() {
        current = match (position, current) {
            (0, _) => document.get(segment),
            (_, Some(Bson::Document(inner))) => inner.get(segment),
            (_, Some(Bson::Array(items))) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        };
        current?;
    }
    current
}

/// Most nulls a positional write may append before its index.
const MAX_PADDING: usize = 1_500_000;

fn path_error(path: &str, reason: &str) -> OperationsError {
    OperationsError::Backend(format!("cannot write '{path}': {reason}"))
}

/// Mutable access to the value at `path`, creating intermediate documents when `create`.
fn slot<'a>(document: &'a mut Document, path: &str, create: bool) -> OperationsResult<Option<&'a mut Bson>> {
    let (parent_path, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, path),
    };

    let parent: &mut Bson = match parent_path {
        None => {
            if create && !document.contains_key(leaf) {
                document.insert(leaf, Bson::Null);
            }
            return Ok(document.get_mut(leaf));
        }
        Some(parent_path) => match container(document, parent_path, create)? {
            Some(parent) => parent,
            None => return Ok(None),
        },
    };

    match parent {
        Bson::Document(inner) => {
            if create && !inner.contains_key(leaf) {
                inner.insert(leaf, Bson::Null);
            }
            Ok(inner.get_mut(leaf))
        }
        Bson::Array(items) => {
            let index = leaf
                .parse::<usize>()
                .map_err(|_| path_error(path, "array elements are addressed by index"))?;
            if create && index >= items.len() {
                if index - items.len() > MAX_PADDING {
                    return Err(path_error(path, "index is too far past the end of the array"));
                }
                items.resize(index + 1, Bson::Null);
            }
            Ok(items.get_mut(index))
        }
        _ => Err(path_error(path, "parent is not a document or array")),
    }
}

fn container<'a>(document: &'a mut Document, path: &str, create: bool) -> OperationsResult<Option<&'a mut Bson>> {
    let Some(value) = slot(document, path, create)? else {
        return Ok(None);
    };
    if create && matches!(value, Bson::Null) {
        *value = Bson::Document(Document::new());
    }
    Ok(Some(value))
}

/// Mutable access to an existing value at `path`.
pub(crate) fn get_mut<'a>(document: &'a mut Document, path: &str) -> OperationsResult<Option<&'a mut Bson>> {
    slot(document, path, false)
}

/// Writes `value` at `path`, creating intermediate documents.
pub(crate) fn set(document: &mut Document, path: &str, value: Bson) -> OperationsResult<()> {
    match slot(document, path, true)? {
        Some(target) => {
            *target = value;
            Ok(())
        }
        None => Err(path_error(path, "path could not be created")),
    }
}

/// Removes and returns the value at `path`.
pub(crate) fn remove(document: &mut Document, path: &str) -> OperationsResult<Option<Bson>> {
    let Some((parent_path, leaf)) = path.rsplit_once('.') else {
        return Ok(document.remove(path));
    };

    match slot(document, parent_path, false)? {
        Some(Bson::Document(parent)) => Ok(parent.remove(leaf)),
        Some(Bson::Array(items)) => match leaf.parse::<usize>() {
            // Unsetting an array element leaves a null in its place.
            Ok(index) if index < items.len() => {
                Ok(Some(std::mem::replace(&mut items[index], Bson::Null)))
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_traverses_arrays_of_documents() {
        let document = doc! {
            "author": { "name": "Ann" },
            "reviews": [ { "stars": 4 }, { "stars": 5 }, 7 ],
            "tags": ["a", "b"],
        };

        assert_eq!(lookup(&document, "author.name"), vec![&Bson::String("Ann".into())]);
        assert_eq!(
            lookup(&document, "reviews.stars"),
            vec![&Bson::Int32(4), &Bson::Int32(5)]
        );
        assert_eq!(lookup(&document, "reviews.1.stars"), vec![&Bson::Int32(5)]);
        assert_eq!(lookup(&document, "tags").len(), 1);
        assert_eq!(expand(&lookup(&document, "tags")).len(), 3);
        assert!(lookup(&document, "missing.path").is_empty());
    }

    #[test]
    fn set_pads_arrays_up_to_a_limit() {
        let mut document = doc! { "tags": ["a"] };
        set(&mut document, "tags.2", Bson::String("c".into())).unwrap();
        assert_eq!(document, doc! { "tags": ["a", Bson::Null, "c"] });

        for index in [usize::MAX.to_string(), "4000000000".to_string()] {
            let path = format!("tags.{index}");
            assert!(set(&mut document, &path, Bson::String("x".into())).is_err());
        }
        assert_eq!(document, doc! { "tags": ["a", Bson::Null, "c"] });
    }

    #[test]
    fn set_creates_intermediate_documents() {
        let mut document = doc! { "a": 1 };
        set(&mut document, "b.c.d", Bson::Int32(2)).unwrap();
        assert_eq!(document, doc! { "a": 1, "b": { "c": { "d": 2 } } });
        assert_eq!(get(&document, "b.c.d"), Some(&Bson::Int32(2)));
    }

    #[test]
    fn set_indexes_into_arrays() {
        let mut document = doc! { "tags": ["a", "b"] };
        set(&mut document, "tags.1", Bson::String("z".into())).unwrap();
        assert_eq!(document, doc! { "tags": ["a", "z"] });
    }

    #[test]
    fn set_through_scalar_fails() {
        let mut document = doc! { "a": 1 };
        assert!(set(&mut document, "a.b", Bson::Int32(2)).is_err());
    }

    #[test]
    fn remove_nested() {
        let mut document = doc! { "a": { "b": 1, "c": 2 } };
        assert_eq!(remove(&mut document, "a.b").unwrap(), Some(Bson::Int32(1)));
        assert_eq!(remove(&mut document, "a.x").unwrap(), None);
        assert_eq!(document, doc! { "a": { "c": 2 } });
    }
}
