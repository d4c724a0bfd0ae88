//! Geospatial value types used by geo operators and geo-near queries.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

/// A legacy coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Renders the point as a `[x, y]` coordinate array.
    pub fn to_bson(&self) -> Bson {
        Bson::Array(vec![Bson::Double(self.x), Bson::Double(self.y)])
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point::new(x, y)
    }
}

/// Unit of a [`Distance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Kilometers,
    Miles,
    /// Distances in the units of the coordinate system (radians for spherical queries).
    Neutral,
}

impl Metric {
    /// Earth radius in this metric; dividing by it converts a distance to radians.
    pub fn multiplier(&self) -> f64 {
        match self {
            Metric::Kilometers => 6378.137,
            Metric::Miles => 3963.191,
            Metric::Neutral => 1.0,
        }
    }
}

/// A distance value with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub value: f64,
    pub metric: Metric,
}

impl Distance {
    pub fn new(value: f64, metric: Metric) -> Self {
        Self { value, metric }
    }

    pub fn neutral(value: f64) -> Self {
        Self::new(value, Metric::Neutral)
    }

    pub fn kilometers(value: f64) -> Self {
        Self::new(value, Metric::Kilometers)
    }

    pub fn miles(value: f64) -> Self {
        Self::new(value, Metric::Miles)
    }

    /// The distance converted to radians.
    pub fn normalized_value(&self) -> f64 {
        self.value / self.metric.multiplier()
    }
}

impl From<f64> for Distance {
    fn from(value: f64) -> Self {
        Distance::neutral(value)
    }
}

/// A circle on a flat plane, or on a sphere when used with `within_sphere`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: Distance,
}

impl Circle {
    pub fn new(center: impl Into<Point>, radius: impl Into<Distance>) -> Self {
        Self {
            center: center.into(),
            radius: radius.into(),
        }
    }
}

/// Shapes accepted by `$geoWithin`.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Rectangle given by its lower-left and upper-right corners.
    Box { first: Point, second: Point },
    Circle(Circle),
    /// Circle on a sphere; its radius is converted to radians.
    Sphere(Circle),
    Polygon(Vec<Point>),
    GeoJson(GeoJson),
}

impl Shape {
    pub fn rectangle(first: impl Into<Point>, second: impl Into<Point>) -> Self {
        Shape::Box {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn polygon(points: impl IntoIterator<Item = Point>) -> Self {
        Shape::Polygon(points.into_iter().collect())
    }

    /// Renders the body of a `$geoWithin` clause.
    pub fn to_document(&self) -> Document {
        match self {
            Shape::Box { first, second } => doc! {
                "$box": [first.to_bson(), second.to_bson()],
            },
            Shape::Circle(circle) => doc! {
                "$center": [circle.center.to_bson(), circle.radius.value],
            },
            Shape::Sphere(circle) => doc! {
                "$centerSphere": [circle.center.to_bson(), circle.radius.normalized_value()],
            },
            Shape::Polygon(points) => doc! {
                "$polygon": points.iter().map(Point::to_bson).collect::<Vec<_>>(),
            },
            Shape::GeoJson(geometry) => doc! {
                "$geometry": geometry.to_document(),
            },
        }
    }
}

impl From<Circle> for Shape {
    fn from(circle: Circle) -> Self {
        Shape::Circle(circle)
    }
}

impl From<GeoJson> for Shape {
    fn from(geometry: GeoJson) -> Self {
        Shape::GeoJson(geometry)
    }
}

/// GeoJSON geometries. Serializes as `{ "type": ..., "coordinates": ... }`, so it can
/// also be used as the type of a stored location field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum GeoJson {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    MultiPoint(Vec<[f64; 2]>),
    /// Rings of a polygon; the first is the outer ring and must be closed.
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl GeoJson {
    pub fn point(x: f64, y: f64) -> Self {
        GeoJson::Point([x, y])
    }

    pub fn polygon(ring: impl IntoIterator<Item = Point>) -> Self {
        GeoJson::Polygon(vec![ring.into_iter().map(|p| [p.x, p.y]).collect()])
    }

    /// Renders the geometry as a GeoJSON document.
    pub fn to_document(&self) -> Document {
        fn pair(coords: &[f64; 2]) -> Bson {
            Bson::Array(vec![Bson::Double(coords[0]), Bson::Double(coords[1])])
        }

        fn pairs(coords: &[[f64; 2]]) -> Bson {
            Bson::Array(coords.iter().map(pair).collect())
        }

        match self {
            GeoJson::Point(coords) => doc! { "type": "Point", "coordinates": pair(coords) },
            GeoJson::LineString(coords) => doc! { "type": "LineString", "coordinates": pairs(coords) },
            GeoJson::MultiPoint(coords) => doc! { "type": "MultiPoint", "coordinates": pairs(coords) },
            GeoJson::Polygon(rings) => doc! {
                "type": "Polygon",
                "coordinates": rings.iter().map(|ring| pairs(ring)).collect::<Vec<_>>(),
            },
        }
    }
}

impl From<Point> for GeoJson {
    fn from(point: Point) -> Self {
        GeoJson::point(point.x, point.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sphere_radius_is_converted_to_radians() {
        let shape = Shape::Sphere(Circle::new((1.0, 2.0), Distance::kilometers(6378.137)));
        assert_eq!(
            shape.to_document(),
            doc! { "$centerSphere": [[1.0, 2.0], 1.0] },
        );
    }

    #[test]
    fn box_renders_both_corners() {
        let shape = Shape::rectangle((0.0, 0.0), (10.0, 5.0));
        assert_eq!(
            shape.to_document(),
            doc! { "$box": [[0.0, 0.0], [10.0, 5.0]] },
        );
    }

    #[test]
    fn geojson_point_matches_serde_form() {
        let point = GeoJson::point(13.4, 52.5);
        let serialized = bson::serialize_to_document(&point).unwrap();
        assert_eq!(point.to_document(), serialized);
        assert_eq!(serialized.get_str("type").unwrap(), "Point");
    }
}
