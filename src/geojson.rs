//! GeoJSON conversion for features.
//!
//! Export writes a `FeatureCollection` with the numeric feature ID as the
//! GeoJSON `id`. Import accepts a `FeatureCollection` or a single `Feature`
//! whose geometry is a Polygon or MultiPolygon and whose `id` is a number or
//! a string of digits.

use crate::error::{Result, SeamlessError};
use crate::feature::{Feature, FeatureGeometry, FeatureId, PropertyValue};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::feature::Id;
use geojson::{FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue, Value};
use std::io::{Read, Write};

fn ring_to_positions(ring: &LineString<f64>) -> Vec<Vec<f64>> {
    ring.coords().map(|c| vec![c.x, c.y]).collect()
}

fn polygon_to_rings(polygon: &Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_to_positions)
        .collect()
}

fn geometry_to_geojson(geometry: &FeatureGeometry) -> Geometry {
    let value = match geometry {
        FeatureGeometry::Polygon(polygon) => Value::Polygon(polygon_to_rings(polygon)),
        FeatureGeometry::MultiPolygon(multi) => {
            Value::MultiPolygon(multi.iter().map(polygon_to_rings).collect())
        }
    };
    Geometry::new(value)
}

fn property_to_json(value: &PropertyValue) -> JsonValue {
    match value {
        PropertyValue::Int(v) => JsonValue::from(*v),
        PropertyValue::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        PropertyValue::Text(v) => JsonValue::String(v.clone()),
        PropertyValue::Bool(v) => JsonValue::Bool(*v),
    }
}

/// Convert one feature to a GeoJSON feature.
pub fn to_geojson_feature(feature: &Feature) -> geojson::Feature {
    let properties: JsonObject = feature
        .properties
        .iter()
        .map(|(name, value)| (name.clone(), property_to_json(value)))
        .collect();

    geojson::Feature {
        bbox: None,
        geometry: Some(geometry_to_geojson(&feature.geometry)),
        id: Some(Id::Number(feature.id.into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Build a feature collection, preserving input order.
pub fn to_feature_collection<'a, I>(features: I) -> FeatureCollection
where
    I: IntoIterator<Item = &'a Feature>,
{
    FeatureCollection {
        bbox: None,
        features: features.into_iter().map(to_geojson_feature).collect(),
        foreign_members: None,
    }
}

fn json_error(e: serde_json::Error) -> SeamlessError {
    if e.is_io() {
        SeamlessError::Io(e.into())
    } else {
        SeamlessError::codec(format!("failed to serialize GeoJSON: {e}"))
    }
}

/// Serialize features as a GeoJSON feature collection.
pub fn write_feature_collection<'a, W, I>(writer: W, features: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Feature>,
{
    let collection = to_feature_collection(features);
    serde_json::to_writer(writer, &collection).map_err(json_error)
}

/// Serialize a feature collection one feature at a time.
///
/// Nothing beyond the current feature is held in memory, so this suits result
/// sets kept on disk. A failing source aborts the document half written.
pub fn write_feature_stream<W, I>(mut writer: W, features: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = Result<Feature>>,
{
    writer.write_all(br#"{"type":"FeatureCollection","features":["#)?;
    for (n, feature) in features.into_iter().enumerate() {
        if n > 0 {
            writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut writer, &to_geojson_feature(&feature?)).map_err(json_error)?;
    }
    writer.write_all(b"]}")?;
    Ok(())
}

fn positions_to_ring(positions: &[Vec<f64>]) -> Result<LineString<f64>> {
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(SeamlessError::invalid_input(
                "Coordinate must have at least 2 values",
            )),
        })
        .collect::<Result<Vec<_>>>()
        .map(LineString::from)
}

fn rings_to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings
        .split_first()
        .ok_or_else(|| SeamlessError::invalid_input("Polygon must have at least one ring"))?;
    let interiors = interiors
        .iter()
        .map(|ring| positions_to_ring(ring))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(positions_to_ring(exterior)?, interiors))
}

fn geometry_from_geojson(geometry: &Geometry) -> Result<FeatureGeometry> {
    match &geometry.value {
        Value::Polygon(rings) => Ok(FeatureGeometry::Polygon(rings_to_polygon(rings)?)),
        Value::MultiPolygon(polygons) => {
            let polygons = polygons
                .iter()
                .map(|rings| rings_to_polygon(rings))
                .collect::<Result<Vec<_>>>()?;
            Ok(FeatureGeometry::MultiPolygon(MultiPolygon(polygons)))
        }
        Value::Point(_) => Err(SeamlessError::UnsupportedGeometry("Point".to_string())),
        Value::MultiPoint(_) => Err(SeamlessError::UnsupportedGeometry("MultiPoint".to_string())),
        Value::LineString(_) => Err(SeamlessError::UnsupportedGeometry("LineString".to_string())),
        Value::MultiLineString(_) => {
            Err(SeamlessError::UnsupportedGeometry("MultiLineString".to_string()))
        }
        Value::GeometryCollection(_) => {
            Err(SeamlessError::UnsupportedGeometry("GeometryCollection".to_string()))
        }
    }
}

fn property_from_json(value: &JsonValue) -> Option<PropertyValue> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(v) => Some(PropertyValue::Bool(*v)),
        JsonValue::Number(n) => Some(match n.as_i64() {
            Some(v) => PropertyValue::Int(v),
            None => PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        JsonValue::String(v) => Some(PropertyValue::Text(v.clone())),
        nested => Some(PropertyValue::Text(nested.to_string())),
    }
}

fn id_from_geojson(id: Option<&Id>) -> Result<FeatureId> {
    match id {
        Some(Id::Number(n)) => n
            .as_u64()
            .ok_or_else(|| SeamlessError::invalid_input(format!("feature id {n} is not a non-negative integer"))),
        Some(Id::String(s)) => s
            .parse()
            .map_err(|_| SeamlessError::invalid_input(format!("feature id '{s}' is not numeric"))),
        None => Err(SeamlessError::invalid_input("feature has no id")),
    }
}

/// Convert one GeoJSON feature.
pub fn from_geojson_feature(feature: &geojson::Feature) -> Result<Feature> {
    let id = id_from_geojson(feature.id.as_ref())?;
    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| SeamlessError::invalid_input(format!("feature {id} has no geometry")))?;

    let mut result = Feature::new(id, geometry_from_geojson(geometry)?);
    if let Some(properties) = &feature.properties {
        for (name, value) in properties {
            if let Some(value) = property_from_json(value) {
                result.set_property(name.clone(), value);
            }
        }
    }
    Ok(result)
}

/// Parse features from a GeoJSON document.
pub fn features_from_geojson<R: Read>(reader: R) -> Result<Vec<Feature>> {
    let document: GeoJson = serde_json::from_reader(reader)
        .map_err(|e| SeamlessError::invalid_input(format!("Failed to parse GeoJSON: {e}")))?;

    match document {
        GeoJson::FeatureCollection(collection) => {
            collection.features.iter().map(from_geojson_feature).collect()
        }
        GeoJson::Feature(feature) => Ok(vec![from_geojson_feature(&feature)?]),
        GeoJson::Geometry(_) => Err(SeamlessError::invalid_input(
            "bare geometry has no feature id",
        )),
    }
}
