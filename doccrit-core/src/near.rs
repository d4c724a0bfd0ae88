//! Geo-near queries and their results.
//!
//! A [`NearQuery`] renders a `$geoNear` aggregation stage: documents sorted by distance
//! from a point, each annotated with its distance. Results come back as
//! [`GeoResults`].
//!
//! Distances given with a [`Metric`] other than [`Metric::Neutral`] make the query
//! spherical. Returned distances are then expressed in that metric.

use bson::{Bson, Document, doc};
use serde::de::DeserializeOwned;

use crate::{
    aggregation::count_to_bson,
    criteria::{Criteria, NearPoint},
    entity::decode_document,
    error::{CriteriaResult, OperationsError, OperationsResult},
    geo::{Distance, Metric},
};

/// Distance field used when none is configured.
pub const DEFAULT_DISTANCE_FIELD: &str = "dis";

fn meters_per_unit(metric: Metric) -> f64 {
    match metric {
        Metric::Kilometers => 1000.0,
        Metric::Miles => 1609.344,
        Metric::Neutral => 1.0,
    }
}

/// A `$geoNear` query.
#[derive(Debug, Clone, PartialEq)]
pub struct NearQuery {
    point: NearPoint,
    spherical: bool,
    min_distance: Option<Distance>,
    max_distance: Option<Distance>,
    skip: Option<u64>,
    limit: Option<u64>,
    query: Option<Criteria>,
    distance_field: String,
    distance_multiplier: Option<f64>,
    key: Option<String>,
}

impl NearQuery {
    /// Creates a query for documents near the given point.
    pub fn near(point: impl Into<NearPoint>) -> Self {
        Self {
            point: point.into(),
            spherical: false,
            min_distance: None,
            max_distance: None,
            skip: None,
            limit: None,
            query: None,
            distance_field: DEFAULT_DISTANCE_FIELD.to_string(),
            distance_multiplier: None,
            key: None,
        }
    }

    /// Calculates distances on a sphere.
    pub fn spherical(mut self, spherical: bool) -> Self {
        self.spherical = spherical;
        self
    }

    pub fn min_distance(mut self, distance: impl Into<Distance>) -> Self {
        self.min_distance = Some(distance.into());
        self
    }

    pub fn max_distance(mut self, distance: impl Into<Distance>) -> Self {
        self.max_distance = Some(distance.into());
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restricts the candidate documents.
    pub fn query(mut self, criteria: impl Into<Criteria>) -> Self {
        self.query = Some(criteria.into());
        self
    }

    /// Names the output field holding the calculated distance.
    pub fn distance_field(mut self, field: impl Into<String>) -> Self {
        self.distance_field = field.into();
        self
    }

    /// Multiplies every returned distance; overrides the metric-derived multiplier.
    pub fn distance_multiplier(mut self, multiplier: f64) -> Self {
        self.distance_multiplier = Some(multiplier);
        self
    }

    /// Names the geospatial index field to use when a collection has several.
    pub fn key(mut self, key: impl AsRef<str>) -> Self {
        self.key = Some(key.as_ref().to_string());
        self
    }

    pub fn distance_field_name(&self) -> &str {
        &self.distance_field
    }

    /// The metric returned distances are expressed in.
    pub fn metric(&self) -> Metric {
        self.max_distance
            .or(self.min_distance)
            .map(|distance| distance.metric)
            .unwrap_or(Metric::Neutral)
    }

    fn is_geojson(&self) -> bool {
        matches!(self.point, NearPoint::GeoJson(_))
    }

    fn is_spherical(&self) -> bool {
        self.spherical || self.is_geojson() || self.metric() != Metric::Neutral
    }

    /// Converts a distance into the units the server expects for this point type.
    fn server_distance(&self, distance: Distance) -> f64 {
        if self.is_geojson() {
            distance.value * meters_per_unit(distance.metric)
        } else if distance.metric == Metric::Neutral {
            distance.value
        } else {
            distance.normalized_value()
        }
    }

    fn multiplier(&self) -> Option<f64> {
        if self.distance_multiplier.is_some() {
            return self.distance_multiplier;
        }

        match self.metric() {
            Metric::Neutral => None,
            metric if self.is_geojson() => Some(1.0 / meters_per_unit(metric)),
            metric => Some(metric.multiplier()),
        }
    }

    /// Renders the `$geoNear` stage.
    pub fn to_stage(&self) -> CriteriaResult<Document> {
        let near = match &self.point {
            NearPoint::Legacy(point) => point.to_bson(),
            NearPoint::GeoJson(geometry) => Bson::Document(geometry.to_document()),
        };

        let mut stage = doc! {
            "near": near,
            "distanceField": self.distance_field.as_str(),
            "spherical": self.is_spherical(),
        };

        if let Some(distance) = self.min_distance {
            stage.insert("minDistance", self.server_distance(distance));
        }
        if let Some(distance) = self.max_distance {
            stage.insert("maxDistance", self.server_distance(distance));
        }
        if let Some(query) = &self.query {
            stage.insert("query", query.to_document()?);
        }
        if let Some(multiplier) = self.multiplier() {
            stage.insert("distanceMultiplier", multiplier);
        }
        if let Some(key) = &self.key {
            stage.insert("key", key.as_str());
        }

        Ok(doc! { "$geoNear": stage })
    }

    /// Renders the `$geoNear` stage followed by `$skip` and `$limit` when set.
    pub fn to_pipeline(&self) -> CriteriaResult<Vec<Document>> {
        let mut pipeline = vec![self.to_stage()?];
        if let Some(skip) = self.skip {
            pipeline.push(doc! { "$skip": count_to_bson(skip)? });
        }
        if let Some(limit) = self.limit {
            pipeline.push(doc! { "$limit": count_to_bson(limit)? });
        }
        Ok(pipeline)
    }
}

/// A document found by a geo-near query with its distance from the query point.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResult<T> {
    pub content: T,
    pub distance: Distance,
}

/// The results of a geo-near query, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResults<T> {
    pub results: Vec<GeoResult<T>>,
    pub average_distance: Distance,
}

impl<T> GeoResults<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the found documents without distances.
    pub fn into_contents(self) -> Vec<T> {
        self.results
            .into_iter()
            .map(|result| result.content)
            .collect()
    }
}

impl<T: DeserializeOwned> GeoResults<T> {
    /// Decodes `$geoNear` output, stripping the distance field from each document.
    pub fn from_documents(documents: Vec<Document>, near: &NearQuery) -> OperationsResult<Self> {
        let metric = near.metric();
        let mut results = Vec::with_capacity(documents.len());

        for mut document in documents {
            let distance = match document.remove(near.distance_field_name()) {
                Some(Bson::Double(value)) => value,
                Some(Bson::Int32(value)) => f64::from(value),
                Some(Bson::Int64(value)) => value as f64,
                other => {
                    return Err(OperationsError::Serialization(format!(
                        "expected a numeric '{}' in geo-near result, found {other:?}",
                        near.distance_field_name()
                    )));
                }
            };

            results.push(GeoResult {
                content: decode_document(document)?,
                distance: Distance::new(distance, metric),
            });
        }

        let average = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.distance.value).sum::<f64>() / results.len() as f64
        };

        Ok(Self {
            results,
            average_distance: Distance::new(average, metric),
        })
    }
}
