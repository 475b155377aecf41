//! Feature model: a numeric ID, a (multi)polygon and scalar properties.

use geo::{BoundingRect, Intersects, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a feature, unique within a dataset (e.g. a census GEOID).
pub type FeatureId = u64;

/// Geometry of a stored feature. Only areal geometries are supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl FeatureGeometry {
    /// Axis-aligned bounding box, or `None` for an empty geometry.
    pub fn envelope(&self) -> Option<Rect<f64>> {
        match self {
            FeatureGeometry::Polygon(p) => p.bounding_rect(),
            FeatureGeometry::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }

    /// Exact disjointness against an areal query shape.
    pub fn is_disjoint(&self, other: &Polygon<f64>) -> bool {
        match self {
            FeatureGeometry::Polygon(p) => !other.intersects(p),
            FeatureGeometry::MultiPolygon(mp) => !other.intersects(mp),
        }
    }

    pub fn num_geometries(&self) -> usize {
        match self {
            FeatureGeometry::Polygon(_) => 1,
            FeatureGeometry::MultiPolygon(mp) => mp.0.len(),
        }
    }

    /// Member polygons; a plain polygon yields itself.
    pub fn polygons(&self) -> std::slice::Iter<'_, Polygon<f64>> {
        match self {
            FeatureGeometry::Polygon(p) => std::slice::from_ref(p).iter(),
            FeatureGeometry::MultiPolygon(mp) => mp.0.iter(),
        }
    }
}

impl From<Polygon<f64>> for FeatureGeometry {
    fn from(polygon: Polygon<f64>) -> Self {
        FeatureGeometry::Polygon(polygon)
    }
}

impl From<MultiPolygon<f64>> for FeatureGeometry {
    fn from(multi: MultiPolygon<f64>) -> Self {
        FeatureGeometry::MultiPolygon(multi)
    }
}

/// Scalar property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl PropertyValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Text(v) => f.write_str(v),
            PropertyValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

/// A polygonal feature with properties.
///
/// Properties are kept in an ordered map so that encoding a feature is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: FeatureGeometry,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Feature {
    pub fn new(id: FeatureId, geometry: impl Into<FeatureGeometry>) -> Self {
        Self {
            id,
            geometry: geometry.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn envelope(&self) -> Option<Rect<f64>> {
        self.geometry.envelope()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Rect};

    fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
        Rect::new((x, y), (x + size, y + size)).to_polygon()
    }

    #[test]
    fn test_envelope() {
        let feature = Feature::new(1, square(-74.0, 40.0, 0.5));
        let env = feature.envelope().unwrap();
        assert_eq!(env.min().x, -74.0);
        assert_eq!(env.max().y, 40.5);
    }

    #[test]
    fn test_empty_geometry_has_no_envelope() {
        let geometry = FeatureGeometry::MultiPolygon(MultiPolygon(vec![]));
        assert!(geometry.envelope().is_none());
        assert_eq!(geometry.num_geometries(), 0);
    }

    #[test]
    fn test_disjoint_uses_geometry_not_envelope() {
        // L-shaped polygon whose envelope covers the query, but whose body does not
        let l_shape: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        let query = square(5.0, 5.0, 2.0);
        let geometry = FeatureGeometry::Polygon(l_shape);
        assert!(geometry.is_disjoint(&query));

        let touching = square(0.5, 5.0, 2.0);
        assert!(!geometry.is_disjoint(&touching));
    }

    #[test]
    fn test_properties() {
        let feature = Feature::new(7, square(0.0, 0.0, 1.0))
            .with_property("pop", 1200i64)
            .with_property("name", "Block 7");
        assert_eq!(feature.property("pop"), Some(&PropertyValue::Int(1200)));
        assert_eq!(feature.property("pop").and_then(PropertyValue::as_f64), Some(1200.0));
        assert_eq!(feature.property("name").unwrap().to_string(), "Block 7");
        assert!(feature.property("missing").is_none());
    }

    #[test]
    fn test_polygons_iter() {
        let multi = MultiPolygon(vec![square(0.0, 0.0, 1.0), square(2.0, 2.0, 1.0)]);
        let geometry = FeatureGeometry::from(multi);
        assert_eq!(geometry.polygons().count(), 2);
        let single = FeatureGeometry::from(square(0.0, 0.0, 1.0));
        assert_eq!(single.polygons().count(), 1);
    }
}
