use bson::{Bson, ser::serialize_to_bson};
use serde::Serialize;
use std::marker::PhantomData;

use super::{BitMask, BitsKind, BsonType, Clause, Criteria, FieldClause, NearPoint, Operator};
use crate::{
    error::{CriteriaError, CriteriaResult},
    geo::{Circle, GeoJson, Shape},
    property::{ArrayField, GeoField, NumericField, Property, TextField},
};

fn to_bson<V: Serialize>(value: &V) -> CriteriaResult<Bson> {
    Ok(serialize_to_bson(value)?)
}

fn to_bson_list<T, V>(values: impl IntoIterator<Item = V>) -> CriteriaResult<Vec<Bson>>
where
    T: Serialize,
    V: Into<T>,
{
    values
        .into_iter()
        .map(|value| to_bson::<T>(&value.into()))
        .collect()
}

/// Entry point handed to the closure of [`FieldCriteria::bits`].
pub struct Bits;

/// A bitwise test produced by [`Bits`].
#[derive(Debug, Clone, PartialEq)]
pub struct BitsTest {
    kind: BitsKind,
    mask: BitMask,
}

impl Bits {
    /// All bits of the mask are set (`$bitsAllSet`).
    pub fn all_set(self, mask: impl Into<BitMask>) -> BitsTest {
        BitsTest { kind: BitsKind::AllSet, mask: mask.into() }
    }

    /// Any bit of the mask is set (`$bitsAnySet`).
    pub fn any_set(self, mask: impl Into<BitMask>) -> BitsTest {
        BitsTest { kind: BitsKind::AnySet, mask: mask.into() }
    }

    /// All bits of the mask are clear (`$bitsAllClear`).
    pub fn all_clear(self, mask: impl Into<BitMask>) -> BitsTest {
        BitsTest { kind: BitsKind::AllClear, mask: mask.into() }
    }

    /// Any bit of the mask is clear (`$bitsAnyClear`).
    pub fn any_clear(self, mask: impl Into<BitMask>) -> BitsTest {
        BitsTest { kind: BitsKind::AnyClear, mask: mask.into() }
    }
}

/// Operators collected for a single typed field.
///
/// Created by calling an operator on a [`Property`] (or by [`Criteria::field`]).
/// Every further operator call applies to the same field; [`FieldCriteria::and`]
/// moves on to another field in the same chain.
pub struct FieldCriteria<O, T> {
    clause: FieldClause,
    errors: Vec<CriteriaError>,
    _marker: PhantomData<fn(&O) -> T>,
}

impl<O, T> FieldCriteria<O, T> {
    pub(crate) fn new(property: Property<O, T>) -> Self {
        Self {
            clause: FieldClause {
                path: property.to_dot_path(),
                ..FieldClause::default()
            },
            errors: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// The dotted path this clause applies to.
    pub fn path(&self) -> &str {
        &self.clause.path
    }

    fn invalid(&mut self, message: String) {
        self.errors.push(CriteriaError::InvalidApiUsage(message));
    }

    fn push(mut self, operator: Operator) -> Self {
        let operator = if self.clause.pending_not {
            self.clause.pending_not = false;

            if matches!(operator, Operator::Eq(_)) {
                let message = format!(
                    "'not' can't be used with 'eq' on '{}'; use 'ne' instead",
                    self.clause.path
                );
                self.invalid(message);
                return self;
            }

            Operator::Not(Box::new(operator))
        } else {
            operator
        };

        let key = operator.key();
        if self.clause.operators.iter().any(|existing| existing.key() == key) {
            let message = match &operator {
                Operator::Eq(_) => format!(
                    "multiple 'eq' values declared for '{}'; use 'and' with multiple criteria",
                    self.clause.path
                ),
                _ => format!(
                    "'{key}' declared more than once for '{}'; use 'and_operator' with multiple criteria",
                    self.clause.path
                ),
            };
            self.invalid(message);
            return self;
        }

        self.clause.operators.push(operator);
        self
    }

    fn push_with<V>(mut self, value: CriteriaResult<V>, build: impl FnOnce(V) -> Operator) -> Self {
        match value {
            Ok(value) => self.push(build(value)),
            Err(err) => {
                self.errors.push(err);
                self
            }
        }
    }

    /// Negates the next operator: `not().gt(5)` renders `{ "$not": { "$gt": 5 } }`.
    pub fn not(mut self) -> Self {
        self.clause.pending_not = true;
        self
    }

    /// Matches documents that have (or lack) the field.
    pub fn exists(self, exists: bool) -> Self {
        self.push(Operator::Exists(exists))
    }

    /// Matches documents whose field has one of the given BSON types.
    pub fn type_of(self, types: impl IntoIterator<Item = BsonType>) -> Self {
        self.push(Operator::Type(types.into_iter().collect()))
    }

    /// Appends another clause to the chain.
    pub fn and(self, other: impl Into<Criteria>) -> Criteria {
        Criteria::from(self).and(other)
    }

    /// Combines this clause with another criteria using `$or`.
    pub fn or(self, other: impl Into<Criteria>) -> Criteria {
        Criteria::from(self).or(other)
    }

    /// Combines this clause with another criteria using `$nor`.
    pub fn nor(self, other: impl Into<Criteria>) -> Criteria {
        Criteria::from(self).nor(other)
    }

    /// Renders this clause on its own.
    pub fn to_document(&self) -> CriteriaResult<bson::Document> {
        Criteria::from_parts(
            vec![Clause::Field(self.clause.clone())],
            self.errors.clone(),
        )
        .to_document()
    }
}

impl<O, T: Serialize> FieldCriteria<O, T> {
    /// Field equals the value.
    pub fn eq(self, value: impl Into<T>) -> Self {
        self.push_with(to_bson::<T>(&value.into()), Operator::Eq)
    }

    /// Field does not equal the value.
    pub fn ne(self, value: impl Into<T>) -> Self {
        self.push_with(to_bson::<T>(&value.into()), Operator::Ne)
    }

    /// Field is less than the value.
    pub fn lt(self, value: impl Into<T>) -> Self {
        self.push_with(to_bson::<T>(&value.into()), Operator::Lt)
    }

    /// Field is less than or equal to the value.
    pub fn lte(self, value: impl Into<T>) -> Self {
        self.push_with(to_bson::<T>(&value.into()), Operator::Lte)
    }

    /// Field is greater than the value.
    pub fn gt(self, value: impl Into<T>) -> Self {
        self.push_with(to_bson::<T>(&value.into()), Operator::Gt)
    }

    /// Field is greater than or equal to the value.
    pub fn gte(self, value: impl Into<T>) -> Self {
        self.push_with(to_bson::<T>(&value.into()), Operator::Gte)
    }

    /// Field equals any of the values (`$in`).
    pub fn in_values<V: Into<T>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.push_with(to_bson_list::<T, V>(values), Operator::In)
    }

    /// Field equals none of the values (`$nin`).
    pub fn nin<V: Into<T>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.push_with(to_bson_list::<T, V>(values), Operator::Nin)
    }
}

impl<O, T: NumericField> FieldCriteria<O, T> {
    /// Field modulo `divisor` equals `remainder` (`$mod`).
    pub fn modulo(self, divisor: i64, remainder: i64) -> Self {
        self.push(Operator::Mod { divisor, remainder })
    }

    /// Bitwise test against the field: `bits(|b| b.all_set(0b101))`.
    pub fn bits(self, test: impl FnOnce(Bits) -> BitsTest) -> Self {
        let BitsTest { kind, mask } = test(Bits);
        self.push(Operator::Bits(kind, mask))
    }
}

impl<O, T: ArrayField> FieldCriteria<O, T> {
    /// Array field has exactly `size` elements (`$size`).
    pub fn size(self, size: usize) -> Self {
        let value = i64::try_from(size)
            .map_err(|_| CriteriaError::InvalidApiUsage(format!("size {size} out of range")));
        self.push_with(value, Operator::Size)
    }

    /// At least one array element matches all of the given criteria (`$elemMatch`).
    ///
    /// Paths in the nested criteria are relative to the element.
    pub fn elem_match(self, criteria: impl Into<Criteria>) -> Self {
        self.push(Operator::ElemMatch(criteria.into()))
    }
}

impl<O, T> FieldCriteria<O, T>
where
    T: ArrayField,
    T::Item: Serialize,
{
    /// Array field contains all of the values (`$all`).
    pub fn all<V: Into<T::Item>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.push_with(to_bson_list::<T::Item, V>(values), Operator::All)
    }
}

impl<O, T: TextField> FieldCriteria<O, T> {
    /// Field matches the regular expression.
    pub fn regex(self, pattern: impl Into<String>) -> Self {
        self.regex_with_options(pattern, "")
    }

    /// Field matches the regular expression with options (`i`, `m`, `s`, `x`).
    pub fn regex_with_options(self, pattern: impl Into<String>, options: impl Into<String>) -> Self {
        self.push(Operator::Regex {
            pattern: pattern.into(),
            options: options.into(),
        })
    }
}

impl<O, T: GeoField> FieldCriteria<O, T> {
    /// Location lies within the shape (`$geoWithin`).
    pub fn within(self, shape: impl Into<Shape>) -> Self {
        self.push(Operator::GeoWithin(shape.into()))
    }

    /// Location lies within a circle on a sphere (`$geoWithin` / `$centerSphere`).
    pub fn within_sphere(self, circle: Circle) -> Self {
        self.push(Operator::GeoWithin(Shape::Sphere(circle)))
    }

    /// Orders results by distance from the point on a flat plane (`$near`).
    pub fn near(self, point: impl Into<NearPoint>) -> Self {
        self.push(Operator::Near {
            point: point.into(),
            spherical: false,
        })
    }

    /// Orders results by distance from the point on a sphere (`$nearSphere`).
    pub fn near_sphere(self, point: impl Into<NearPoint>) -> Self {
        self.push(Operator::Near {
            point: point.into(),
            spherical: true,
        })
    }

    /// Location intersects the geometry (`$geoIntersects`).
    pub fn intersects(self, geometry: impl Into<GeoJson>) -> Self {
        self.push(Operator::GeoIntersects(geometry.into()))
    }

    /// Minimum distance for a preceding `near` / `near_sphere`.
    pub fn min_distance(self, distance: f64) -> Self {
        self.push(Operator::MinDistance(distance))
    }

    /// Maximum distance for a preceding `near` / `near_sphere`.
    pub fn max_distance(self, distance: f64) -> Self {
        self.push(Operator::MaxDistance(distance))
    }
}

impl<O, T> From<FieldCriteria<O, T>> for Criteria {
    fn from(field: FieldCriteria<O, T>) -> Self {
        Criteria::from_parts(vec![Clause::Field(field.clause)], field.errors)
    }
}

impl<O, T> Property<O, T> {
    /// Starts a criteria clause on this property.
    pub fn criteria(self) -> FieldCriteria<O, T> {
        FieldCriteria::new(self)
    }

    /// See [`FieldCriteria::not`].
    pub fn not(self) -> FieldCriteria<O, T> {
        self.criteria().not()
    }

    /// See [`FieldCriteria::exists`].
    pub fn exists(self, exists: bool) -> FieldCriteria<O, T> {
        self.criteria().exists(exists)
    }

    /// See [`FieldCriteria::type_of`].
    pub fn type_of(self, types: impl IntoIterator<Item = BsonType>) -> FieldCriteria<O, T> {
        self.criteria().type_of(types)
    }
}

impl<O, T: Serialize> Property<O, T> {
    pub fn eq(self, value: impl Into<T>) -> FieldCriteria<O, T> {
        self.criteria().eq(value)
    }

    pub fn ne(self, value: impl Into<T>) -> FieldCriteria<O, T> {
        self.criteria().ne(value)
    }

    pub fn lt(self, value: impl Into<T>) -> FieldCriteria<O, T> {
        self.criteria().lt(value)
    }

    pub fn lte(self, value: impl Into<T>) -> FieldCriteria<O, T> {
        self.criteria().lte(value)
    }

    pub fn gt(self, value: impl Into<T>) -> FieldCriteria<O, T> {
        self.criteria().gt(value)
    }

    pub fn gte(self, value: impl Into<T>) -> FieldCriteria<O, T> {
        self.criteria().gte(value)
    }

    pub fn in_values<V: Into<T>>(self, values: impl IntoIterator<Item = V>) -> FieldCriteria<O, T> {
        self.criteria().in_values(values)
    }

    pub fn nin<V: Into<T>>(self, values: impl IntoIterator<Item = V>) -> FieldCriteria<O, T> {
        self.criteria().nin(values)
    }
}

impl<O, T: NumericField> Property<O, T> {
    pub fn modulo(self, divisor: i64, remainder: i64) -> FieldCriteria<O, T> {
        self.criteria().modulo(divisor, remainder)
    }

    pub fn bits(self, test: impl FnOnce(Bits) -> BitsTest) -> FieldCriteria<O, T> {
        self.criteria().bits(test)
    }
}

impl<O, T: ArrayField> Property<O, T> {
    pub fn size(self, size: usize) -> FieldCriteria<O, T> {
        self.criteria().size(size)
    }

    pub fn elem_match(self, criteria: impl Into<Criteria>) -> FieldCriteria<O, T> {
        self.criteria().elem_match(criteria)
    }
}

impl<O, T> Property<O, T>
where
    T: ArrayField,
    T::Item: Serialize,
{
    pub fn all<V: Into<T::Item>>(self, values: impl IntoIterator<Item = V>) -> FieldCriteria<O, T> {
        self.criteria().all(values)
    }
}

impl<O, T: TextField> Property<O, T> {
    pub fn regex(self, pattern: impl Into<String>) -> FieldCriteria<O, T> {
        self.criteria().regex(pattern)
    }

    pub fn regex_with_options(
        self,
        pattern: impl Into<String>,
        options: impl Into<String>,
    ) -> FieldCriteria<O, T> {
        self.criteria().regex_with_options(pattern, options)
    }
}

impl<O, T: GeoField> Property<O, T> {
    pub fn within(self, shape: impl Into<Shape>) -> FieldCriteria<O, T> {
        self.criteria().within(shape)
    }

    pub fn within_sphere(self, circle: Circle) -> FieldCriteria<O, T> {
        self.criteria().within_sphere(circle)
    }

    pub fn near(self, point: impl Into<NearPoint>) -> FieldCriteria<O, T> {
        self.criteria().near(point)
    }

    pub fn near_sphere(self, point: impl Into<NearPoint>) -> FieldCriteria<O, T> {
        self.criteria().near_sphere(point)
    }

    pub fn intersects(self, geometry: impl Into<GeoJson>) -> FieldCriteria<O, T> {
        self.criteria().intersects(geometry)
    }
}
