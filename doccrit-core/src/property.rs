//! Compile-time checked property references and nested path resolution.
//!
//! A [`Property<O, T>`] names a field of type `T` declared on owner type `O`. It carries
//! only the stored field name; the type parameters exist so that operators can check
//! their arguments and so that nested references only compose along real fields.
//!
//! Properties are usually generated with `#[derive(Fields)]`, which emits a
//! `{Type}Fields` accessor type:
//!
//! ```ignore
//! #[derive(Serialize, Deserialize, Fields)]
//! struct Book { title: String, author: Author }
//!
//! #[derive(Serialize, Deserialize, Fields)]
//! struct Author { name: String }
//!
//! let path = BookFields::author() / AuthorFields::name();
//! assert_eq!(path.path(), "author.name");
//! ```

use std::{
    borrow::Cow,
    collections::{BTreeSet, HashSet, VecDeque},
    fmt,
    marker::PhantomData,
    ops::Div,
};

use crate::geo::{GeoJson, Point};

/// A typed reference to a field of `O` holding a `T`.
pub struct Property<O, T> {
    path: Cow<'static, str>,
    _marker: PhantomData<fn(&O) -> T>,
}

impl<O, T> Property<O, T> {
    /// Creates a property for a top-level field name.
    pub const fn new(name: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(name),
            _marker: PhantomData,
        }
    }

    /// Creates a property from an arbitrary dotted path.
    ///
    /// Nothing checks that the path exists on `O`; prefer generated accessors.
    pub fn raw(path: impl Into<String>) -> Self {
        Self {
            path: Cow::Owned(path.into()),
            _marker: PhantomData,
        }
    }

    /// Returns the dotted path of this property.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the dotted path of this property as an owned string.
    pub fn to_dot_path(&self) -> String {
        self.path.to_string()
    }

    /// Resolves a property of an embedded type relative to this one.
    ///
    /// `book.nested(author_name)` yields the path `"author.name"` typed as a
    /// property of the book. The `/` operator is shorthand for this.
    pub fn nested<U>(self, inner: Property<T::Target, U>) -> Property<O, U>
    where
        T: Embedded,
    {
        Property::raw(format!("{}.{}", self.path, inner.path))
    }
}

impl<O, T, U> Div<Property<T::Target, U>> for Property<O, T>
where
    T: Embedded,
{
    type Output = Property<O, U>;

    fn div(self, inner: Property<T::Target, U>) -> Self::Output {
        self.nested(inner)
    }
}

impl<O, T> Clone for Property<O, T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<O, T> AsRef<str> for Property<O, T> {
    fn as_ref(&self) -> &str {
        &self.path
    }
}

impl<O, T> fmt::Debug for Property<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.path).finish()
    }
}

impl<O, T> fmt::Display for Property<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Links a type to the accessor type generated by `#[derive(Fields)]`.
pub trait HasFields {
    /// The generated `{Type}Fields` accessor type.
    type Fields;
}

/// Types whose fields can be traversed with a nested property path.
///
/// `#[derive(Fields)]` implements this with `Target = Self`. Wrappers forward to
/// their content, so an `Option<Author>` or `Vec<Author>` field can be traversed into
/// `Author`'s fields. For arrays this follows the store's implicit array traversal:
/// `authors.name` matches if any element's name matches.
pub trait Embedded {
    /// The type whose properties may follow this one in a path.
    type Target;
}

impl<T: Embedded> Embedded for Option<T> {
    type Target = T::Target;
}

impl<T: Embedded> Embedded for Box<T> {
    type Target = T::Target;
}

impl<T: Embedded> Embedded for Vec<T> {
    type Target = T::Target;
}

/// Field types that support arithmetic operators (`$mod`, `$inc`, bitwise tests).
pub trait NumericField {}

macro_rules! numeric_field {
    ($($ty:ty),* $(,)?) => {
        $(impl NumericField for $ty {})*
    };
}

numeric_field!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl<T: NumericField> NumericField for Option<T> {}

/// Field types that support pattern operators (`$regex`).
pub trait TextField {}

impl TextField for String {}
impl TextField for Box<str> {}
impl TextField for Cow<'static, str> {}
impl<T: TextField> TextField for Option<T> {}

/// Field types that hold arrays, with their element type.
pub trait ArrayField {
    /// Element type of the array.
    type Item;
}

impl<E> ArrayField for Vec<E> {
    type Item = E;
}

impl<E> ArrayField for VecDeque<E> {
    type Item = E;
}

impl<E> ArrayField for HashSet<E> {
    type Item = E;
}

impl<E> ArrayField for BTreeSet<E> {
    type Item = E;
}

impl<E, const N: usize> ArrayField for [E; N] {
    type Item = E;
}

impl<A: ArrayField> ArrayField for Option<A> {
    type Item = A::Item;
}

/// Field types that hold locations and accept geospatial operators.
pub trait GeoField {}

impl GeoField for Point {}
impl GeoField for GeoJson {}
impl GeoField for [f64; 2] {}
impl GeoField for Vec<f64> {}
impl<T: GeoField> GeoField for Option<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Book;
    struct Author;
    struct Address;

    impl Embedded for Author {
        type Target = Author;
    }

    impl Embedded for Address {
        type Target = Address;
    }

    fn author() -> Property<Book, Author> {
        Property::new("author")
    }

    fn address() -> Property<Author, Option<Address>> {
        Property::new("address")
    }

    fn city() -> Property<Address, String> {
        Property::new("city")
    }

    fn name() -> Property<Author, String> {
        Property::new("name")
    }

    #[test]
    fn top_level_path_is_the_field_name() {
        assert_eq!(author().path(), "author");
        assert_eq!(author().to_dot_path(), "author".to_string());
    }

    #[test]
    fn nested_path_joins_with_dot() {
        assert_eq!(author().nested(name()).path(), "author.name");
        assert_eq!((author() / name()).path(), "author.name");
    }

    #[test]
    fn chains_compose_left_to_right() {
        let path = author() / address() / city();
        assert_eq!(path.path(), "author.address.city");
        assert_eq!(path.to_string(), "author.address.city");
    }

    #[test]
    fn vec_fields_traverse_into_elements() {
        let authors: Property<Book, Vec<Author>> = Property::new("authors");
        assert_eq!((authors / name()).path(), "authors.name");
    }

    #[test]
    fn raw_paths_are_kept_verbatim() {
        let property: Property<Book, i32> = Property::raw("stats.pages");
        assert_eq!(property.path(), "stats.pages");
        assert_eq!(property.clone().path(), property.path());
    }
}
