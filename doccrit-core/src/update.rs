//! Typed update documents.
//!
//! ```ignore
//! let update = Update::new()
//!     .set(BookFields::title(), "Dune Messiah")
//!     .inc(BookFields::printings(), 1)
//!     .push(BookFields::tags(), "sequel")
//!     .current_date(BookFields::updated_at());
//!
//! // { "$set": { "title": "Dune Messiah" }, "$inc": { "printings": 1 }, ... }
//! let rendered = update.to_document()?;
//! ```
//!
//! Values are checked against the property's field type at compile time and converted
//! to BSON when the update is built. Conversion failures and conflicting paths are
//! reported by [`Update::to_document`].

use bson::{Bson, Document, doc};
use serde::Serialize;
use std::{borrow::Cow, fmt};

use crate::{
    criteria::Criteria,
    error::{CriteriaError, CriteriaResult},
    property::{ArrayField, NumericField, Property},
};

/// End of an array that `$pop` removes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Last,
}

impl Position {
    fn value(&self) -> i32 {
        match self {
            Position::First => -1,
            Position::Last => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Modifier {
    operator: Cow<'static, str>,
    path: String,
    value: Bson,
}

impl Modifier {
    /// The new name of a `$rename`.
    fn rename_target(&self) -> Option<&str> {
        match &self.value {
            Bson::String(target) if self.operator == "$rename" => Some(target),
            _ => None,
        }
    }

    /// Whether this modifier renames a field onto a path `other` also writes.
    fn renames_onto(&self, other: &Modifier) -> bool {
        self.rename_target().is_some_and(|target| {
            std::iter::once(other.path.as_str())
                .chain(other.rename_target())
                .any(|path| path == target || paths_overlap(path, target))
        })
    }
}

/// A set of update operators applied to matching documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Update {
    modifiers: Vec<Modifier>,
    errors: Vec<CriteriaError>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an update from a raw update document such as `{ "$set": { "a": 1 } }`.
    ///
    /// Top-level keys must be operators holding a document of paths.
    pub fn from_document(document: Document) -> Self {
        let mut update = Self::new();

        for (operator, fields) in document {
            match fields {
                Bson::Document(fields) if operator.starts_with('$') => {
                    for (path, value) in fields {
                        update.modifiers.push(Modifier {
                            operator: Cow::Owned(operator.clone()),
                            path,
                            value,
                        });
                    }
                }
                other => update.errors.push(CriteriaError::InvalidApiUsage(format!(
                    "update documents must map operators to field documents, found '{operator}: {other}'"
                ))),
            }
        }

        update
    }

    /// Sets the value of a field (`$set`).
    pub fn set<O, T: Serialize>(self, property: Property<O, T>, value: impl Into<T>) -> Self {
        self.typed::<T>("$set", property.path(), &value.into())
    }

    /// Sets the value of a field only when an upsert inserts a new document (`$setOnInsert`).
    pub fn set_on_insert<O, T: Serialize>(
        self,
        property: Property<O, T>,
        value: impl Into<T>,
    ) -> Self {
        self.typed::<T>("$setOnInsert", property.path(), &value.into())
    }

    /// Removes a field (`$unset`).
    pub fn unset<O, T>(self, property: Property<O, T>) -> Self {
        self.modifier("$unset", property.path(), Bson::Int32(1))
    }

    /// Increments a numeric field (`$inc`).
    pub fn inc<O, T>(self, property: Property<O, T>, by: impl Into<T>) -> Self
    where
        T: NumericField + Serialize,
    {
        self.typed::<T>("$inc", property.path(), &by.into())
    }

    /// Multiplies a numeric field (`$mul`).
    pub fn mul<O, T>(self, property: Property<O, T>, by: impl Into<T>) -> Self
    where
        T: NumericField + Serialize,
    {
        self.typed::<T>("$mul", property.path(), &by.into())
    }

    /// Sets a field to `value` if `value` is smaller than the current value (`$min`).
    pub fn min<O, T: Serialize>(self, property: Property<O, T>, value: impl Into<T>) -> Self {
        self.typed::<T>("$min", property.path(), &value.into())
    }

    /// Sets a field to `value` if `value` is larger than the current value (`$max`).
    pub fn max<O, T: Serialize>(self, property: Property<O, T>, value: impl Into<T>) -> Self {
        self.typed::<T>("$max", property.path(), &value.into())
    }

    /// Renames a field (`$rename`).
    pub fn rename<O, T>(self, property: Property<O, T>, new_name: impl Into<String>) -> Self {
        self.modifier("$rename", property.path(), Bson::String(new_name.into()))
    }

    /// Appends a value to an array (`$push`).
    pub fn push<O, T>(self, property: Property<O, T>, value: impl Into<T::Item>) -> Self
    where
        T: ArrayField,
        T::Item: Serialize,
    {
        self.typed::<T::Item>("$push", property.path(), &value.into())
    }

    /// Appends every value to an array (`$push` with `$each`).
    pub fn push_all<O, T, V>(self, property: Property<O, T>, values: impl IntoIterator<Item = V>) -> Self
    where
        T: ArrayField,
        T::Item: Serialize,
        V: Into<T::Item>,
    {
        self.each::<T::Item, V>("$push", property.path(), values)
    }

    /// Adds a value to an array unless already present (`$addToSet`).
    pub fn add_to_set<O, T>(self, property: Property<O, T>, value: impl Into<T::Item>) -> Self
    where
        T: ArrayField,
        T::Item: Serialize,
    {
        self.typed::<T::Item>("$addToSet", property.path(), &value.into())
    }

    /// Adds every value not already present to an array (`$addToSet` with `$each`).
    pub fn add_all_to_set<O, T, V>(
        self,
        property: Property<O, T>,
        values: impl IntoIterator<Item = V>,
    ) -> Self
    where
        T: ArrayField,
        T::Item: Serialize,
        V: Into<T::Item>,
    {
        self.each::<T::Item, V>("$addToSet", property.path(), values)
    }

    /// Removes every occurrence of a value from an array (`$pull`).
    pub fn pull<O, T>(self, property: Property<O, T>, value: impl Into<T::Item>) -> Self
    where
        T: ArrayField,
        T::Item: Serialize,
    {
        self.typed::<T::Item>("$pull", property.path(), &value.into())
    }

    /// Removes every array element matching the criteria (`$pull` with a condition).
    ///
    /// Use [`Criteria::element`] for arrays of scalars.
    pub fn pull_matching<O, T: ArrayField>(
        self,
        property: Property<O, T>,
        criteria: impl Into<Criteria>,
    ) -> Self {
        match criteria.into().to_document() {
            Ok(condition) => self.modifier("$pull", property.path(), Bson::Document(condition)),
            Err(err) => self.error(err),
        }
    }

    /// Removes every occurrence of the given values from an array (`$pullAll`).
    pub fn pull_all<O, T, V>(self, property: Property<O, T>, values: impl IntoIterator<Item = V>) -> Self
    where
        T: ArrayField,
        T::Item: Serialize,
        V: Into<T::Item>,
    {
        match serialize_all::<T::Item, V>(values) {
            Ok(values) => self.modifier("$pullAll", property.path(), Bson::Array(values)),
            Err(err) => self.error(err),
        }
    }

    /// Removes the first or last element of an array (`$pop`).
    pub fn pop<O, T: ArrayField>(self, property: Property<O, T>, position: Position) -> Self {
        self.modifier("$pop", property.path(), Bson::Int32(position.value()))
    }

    /// Sets a field to the current date (`$currentDate`).
    pub fn current_date<O, T>(self, property: Property<O, T>) -> Self {
        self.modifier("$currentDate", property.path(), Bson::Boolean(true))
    }

    /// Returns `true` if no modifier was added.
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Returns the paths this update modifies, in first-use order.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        for modifier in &self.modifiers {
            if !paths.contains(&modifier.path.as_str()) {
                paths.push(&modifier.path);
            }
        }
        paths
    }

    /// Renders the update document, grouping modifiers by operator in first-use order.
    ///
    /// Setting the same path twice under the same operator keeps the last value.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::InvalidApiUsage`] for an empty update, when a path
    /// (or one of its parents) is modified by two different operators or is the target
    /// of a `$rename` that another modifier also writes, and
    /// [`CriteriaError::Serialization`] for values that failed to convert.
    pub fn to_document(&self) -> CriteriaResult<Document> {
        if let Some(err) = self.errors.first() {
            return Err(err.clone());
        }

        if self.modifiers.is_empty() {
            return Err(CriteriaError::InvalidApiUsage(
                "an update must contain at least one modifier".to_string(),
            ));
        }

        for (index, modifier) in self.modifiers.iter().enumerate() {
            let conflict = self.modifiers[..index].iter().find(|earlier| {
                let same_path = earlier.path == modifier.path;
                if same_path && earlier.operator == modifier.operator {
                    return false;
                }
                same_path
                    || paths_overlap(&earlier.path, &modifier.path)
                    || earlier.renames_onto(modifier)
                    || modifier.renames_onto(earlier)
            });

            if let Some(earlier) = conflict {
                return Err(CriteriaError::InvalidApiUsage(format!(
                    "updating '{}' with '{}' conflicts with '{}' on '{}'",
                    modifier.path, modifier.operator, earlier.operator, earlier.path
                )));
            }
        }

        let mut rendered = Document::new();
        for modifier in &self.modifiers {
            let operator = modifier.operator.as_ref();
            if !rendered.contains_key(operator) {
                rendered.insert(operator, Document::new());
            }
            if let Some(Bson::Document(group)) = rendered.get_mut(operator) {
                group.insert(modifier.path.clone(), modifier.value.clone());
            }
        }

        Ok(rendered)
    }

    fn typed<V: Serialize>(self, operator: &'static str, path: &str, value: &V) -> Self {
        match bson::ser::serialize_to_bson(value) {
            Ok(value) => self.modifier(operator, path, value),
            Err(err) => self.error(err.into()),
        }
    }

    fn each<I, V>(self, operator: &'static str, path: &str, values: impl IntoIterator<Item = V>) -> Self
    where
        I: Serialize,
        V: Into<I>,
    {
        match serialize_all::<I, V>(values) {
            Ok(values) => self.modifier(operator, path, Bson::Document(doc! { "$each": values })),
            Err(err) => self.error(err),
        }
    }

    fn modifier(mut self, operator: &'static str, path: &str, value: Bson) -> Self {
        self.modifiers.push(Modifier {
            operator: Cow::Borrowed(operator),
            path: path.to_string(),
            value,
        });
        self
    }

    fn error(mut self, err: CriteriaError) -> Self {
        self.errors.push(err);
        self
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_document() {
            Ok(document) => write!(f, "{document}"),
            Err(err) => write!(f, "<invalid update: {err}>"),
        }
    }
}

fn serialize_all<I, V>(values: impl IntoIterator<Item = V>) -> CriteriaResult<Vec<Bson>>
where
    I: Serialize,
    V: Into<I>,
{
    values
        .into_iter()
        .map(|value| bson::ser::serialize_to_bson::<I>(&value.into()).map_err(CriteriaError::from))
        .collect()
}

/// `a` and `a.b` overlap; `a` and `ab` do not.
fn paths_overlap(left: &str, right: &str) -> bool {
    let is_parent = |parent: &str, child: &str| {
        child.len() > parent.len()
            && child.starts_with(parent)
            && child.as_bytes()[parent.len()] == b'.'
    };
    is_parent(left, right) || is_parent(right, left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Book;

    fn title() -> Property<Book, String> {
        Property::new("title")
    }

    fn printings() -> Property<Book, i32> {
        Property::new("printings")
    }

    fn tags() -> Property<Book, Vec<String>> {
        Property::new("tags")
    }

    fn ratings() -> Property<Book, Vec<i32>> {
        Property::new("ratings")
    }

    fn meta() -> Property<Book, String> {
        Property::new("meta")
    }

    fn meta_source() -> Property<Book, String> {
        Property::raw("meta.source")
    }

    #[test]
    fn groups_modifiers_by_operator_in_first_use_order() {
        let update = Update::new()
            .inc(printings(), 2)
            .set(title(), "Dune")
            .push(tags(), "classic")
            .set(meta(), "x");

        assert_eq!(
            update.to_document().unwrap(),
            doc! {
                "$inc": { "printings": 2 },
                "$set": { "title": "Dune", "meta": "x" },
                "$push": { "tags": "classic" },
            }
        );
    }

    #[test]
    fn each_variants_and_array_removal() {
        let update = Update::new()
            .push_all(tags(), ["a", "b"])
            .add_all_to_set(ratings(), [4, 5])
            .pop(Property::<Book, Vec<String>>::new("shelves"), Position::First);

        assert_eq!(
            update.to_document().unwrap(),
            doc! {
                "$push": { "tags": { "$each": ["a", "b"] } },
                "$addToSet": { "ratings": { "$each": [4, 5] } },
                "$pop": { "shelves": -1 },
            }
        );

        let update = Update::new()
            .pull_matching(ratings(), Criteria::element::<i32>().lt(3))
            .pull_all(tags(), ["draft"]);
        assert_eq!(
            update.to_document().unwrap(),
            doc! {
                "$pull": { "ratings": { "$lt": 3 } },
                "$pullAll": { "tags": ["draft"] },
            }
        );
    }

    #[test]
    fn unset_rename_and_current_date() {
        let update = Update::new()
            .unset(meta())
            .rename(title(), "name")
            .current_date(Property::<Book, bson::DateTime>::new("updatedAt"));

        assert_eq!(
            update.to_document().unwrap(),
            doc! {
                "$unset": { "meta": 1 },
                "$rename": { "title": "name" },
                "$currentDate": { "updatedAt": true },
            }
        );
    }

    #[test]
    fn same_operator_keeps_last_value() {
        let update = Update::new().set(title(), "a").set(title(), "b");
        assert_eq!(update.to_document().unwrap(), doc! { "$set": { "title": "b" } });
    }

    #[test]
    fn conflicting_operators_are_rejected() {
        let result = Update::new().set(title(), "a").unset(title()).to_document();
        assert!(matches!(result, Err(CriteriaError::InvalidApiUsage(msg)) if msg.contains("conflicts")));

        let result = Update::new().set(meta(), "a").set(meta_source(), "b").to_document();
        assert!(result.is_err());

        assert!(!paths_overlap("meta", "metadata"));
    }

    #[test]
    fn rename_targets_take_part_in_conflicts() {
        let result = Update::new().set(title(), "a").rename(meta(), "title").to_document();
        assert!(matches!(result, Err(CriteriaError::InvalidApiUsage(msg)) if msg.contains("conflicts")));

        let result = Update::new().rename(meta(), "title.main").set(title(), "a").to_document();
        assert!(result.is_err());

        let result = Update::new().rename(meta(), "name").rename(title(), "name").to_document();
        assert!(result.is_err());

        let update = Update::new().rename(title(), "name").set(meta(), "x");
        assert_eq!(
            update.to_document().unwrap(),
            doc! { "$rename": { "title": "name" }, "$set": { "meta": "x" } }
        );
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(Update::new().to_document().is_err());
    }

    #[test]
    fn raw_documents_are_parsed_into_modifiers() {
        let update = Update::from_document(doc! { "$set": { "a": 1 }, "$inc": { "b": 2 } });
        assert_eq!(update.paths(), vec!["a", "b"]);
        assert_eq!(
            update.to_document().unwrap(),
            doc! { "$set": { "a": 1 }, "$inc": { "b": 2 } }
        );

        let replacement = Update::from_document(doc! { "a": 1 });
        assert!(replacement.to_document().is_err());
    }
}
