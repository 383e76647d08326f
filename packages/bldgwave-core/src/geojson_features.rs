// Features given as decoded JSON documents rather than binary tiles.
//
// Geometry is classified by how deeply its coordinate arrays nest:
// 3 levels is one polygon, 4 levels is a multi-polygon.
use geo_types::{Coord, LineString};
use serde_json::Value;

use crate::config::TileConfig;
use crate::error::{FeatureError, TileError};
use crate::models::{Feature, FeatureGeometry, Ring};

/// Nesting depth of a JSON value.
///
/// A non-array leaf has depth 0, an empty array depth 1, and every array
/// adds one level over its deepest element.
pub fn nesting_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(nesting_depth).max().unwrap_or(0),
        _ => 0,
    }
}

fn parse_point(value: &Value) -> Result<Coord<f64>, FeatureError> {
    let pair = value.as_array().ok_or(FeatureError::InvalidCoordinate)?;
    match (pair.first().and_then(Value::as_f64), pair.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Ok(Coord { x, y }),
        _ => Err(FeatureError::InvalidCoordinate),
    }
}

fn parse_ring(value: &Value) -> Result<Ring, FeatureError> {
    let points = value.as_array().ok_or(FeatureError::InvalidCoordinate)?;
    let coords = points.iter().map(parse_point).collect::<Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

fn parse_ring_set(value: &Value) -> Result<Vec<Ring>, FeatureError> {
    let rings = value.as_array().ok_or(FeatureError::InvalidCoordinate)?;
    rings.iter().map(parse_ring).collect()
}

/// Classify a coordinate array into a tagged geometry by depth.
pub fn geometry_from_coordinates(coordinates: &Value) -> Result<FeatureGeometry, FeatureError> {
    let geometry = match nesting_depth(coordinates) {
        3 => FeatureGeometry::Polygon(parse_ring_set(coordinates)?),
        4 => {
            let members = coordinates.as_array().ok_or(FeatureError::InvalidCoordinate)?;
            FeatureGeometry::MultiPolygon(
                members.iter().map(parse_ring_set).collect::<Result<Vec<_>, _>>()?,
            )
        }
        depth => return Err(FeatureError::UnexpectedDepth { depth }),
    };

    if geometry.is_empty() {
        return Err(FeatureError::EmptyGeometry);
    }
    Ok(geometry)
}

// Same truthiness rules as the tile decoder: only non-zero numbers count
fn json_height(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite() && *n != 0.0)
}

/// Build a [`Feature`] from `{ "id", "properties", "geometry": { "coordinates" } }`.
pub fn feature_from_json(value: &Value, config: &TileConfig) -> Result<Feature, FeatureError> {
    let coordinates = value
        .get("geometry")
        .and_then(|g| g.get("coordinates"))
        .ok_or(FeatureError::EmptyGeometry)?;
    let geometry = geometry_from_coordinates(coordinates)?;

    let height = value
        .get("properties")
        .and_then(|props| {
            config
                .height_keys
                .iter()
                .find_map(|key| props.get(key).and_then(json_height))
        })
        .map(|h| h.max(0.0))
        .unwrap_or(0.0);

    Ok(Feature {
        id: value.get("id").and_then(Value::as_u64),
        height,
        geometry,
    })
}

/// Parse a JSON array of feature documents, or a FeatureCollection.
///
/// Entries that fail are logged and skipped; only an unparseable document
/// is an error.
pub fn features_from_json_str(json: &str, config: &TileConfig) -> Result<Vec<Feature>, TileError> {
    let document: Value = serde_json::from_str(json).map_err(|e| TileError::Decode(e.to_string()))?;

    let entries = match &document {
        Value::Array(items) => items,
        Value::Object(_) => document
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| TileError::Decode("object has no 'features' array".into()))?,
        _ => return Err(TileError::Decode("expected an array of features".into())),
    };

    let mut features = Vec::with_capacity(entries.len());
    for entry in entries {
        match feature_from_json(entry, config) {
            Ok(feature) => features.push(feature),
            Err(e) => log::warn!("Skipping feature {}: {}", entry.get("id").unwrap_or(&Value::Null), e),
        }
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn depth_rule() {
        assert_eq!(nesting_depth(&json!(5)), 0);
        assert_eq!(nesting_depth(&json!([])), 1);
        assert_eq!(nesting_depth(&json!([1, 2])), 1);
        assert_eq!(nesting_depth(&json!([[1, 2], []])), 2);
        assert_eq!(nesting_depth(&json!([[[0, 0], [1, 0], [1, 1], [0, 0]]])), 3);
        assert_eq!(nesting_depth(&json!([[[[0, 0], [1, 0], [1, 1], [0, 0]]]])), 4);
    }

    #[test]
    fn depth_three_is_polygon() {
        let doc = json!({
            "id": 12,
            "properties": { "z": 0, "height": 7.5 },
            "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 0]]] }
        });
        let feature = feature_from_json(&doc, &TileConfig::default()).expect("polygon");
        assert_eq!(feature.id, Some(12));
        assert_eq!(feature.height, 7.5);
        assert!(matches!(feature.geometry, FeatureGeometry::Polygon(ref rings) if rings.len() == 1));
    }

    #[test]
    fn depth_four_is_multi_polygon() {
        let doc = json!({
            "id": 3,
            "properties": {},
            "geometry": { "coordinates": [
                [[[0, 0], [10, 0], [10, 10], [0, 0]]],
                [[[20, 20], [30, 20], [30, 30], [20, 20]]]
            ] }
        });
        let feature = feature_from_json(&doc, &TileConfig::default()).expect("multi-polygon");
        assert_eq!(feature.height, 0.0);
        match feature.geometry {
            FeatureGeometry::MultiPolygon(members) => assert_eq!(members.len(), 2),
            other => panic!("expected multi-polygon, got {:?}", other),
        }
    }

    #[test]
    fn other_depths_are_rejected() {
        let doc = json!({ "geometry": { "coordinates": [[0, 0], [1, 1]] } });
        assert_eq!(
            feature_from_json(&doc, &TileConfig::default()),
            Err(FeatureError::UnexpectedDepth { depth: 2 })
        );
        let empty = json!({ "geometry": { "coordinates": [] } });
        assert_eq!(
            feature_from_json(&empty, &TileConfig::default()),
            Err(FeatureError::UnexpectedDepth { depth: 1 })
        );
    }

    #[test]
    fn collection_skips_bad_entries() {
        let json = r#"{ "features": [
            { "id": 1, "geometry": { "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 0]]] } },
            { "id": 2, "geometry": { "coordinates": [[["a", 0]]] } },
            { "id": 3 }
        ] }"#;
        let features = features_from_json_str(json, &TileConfig::default()).expect("valid json");
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id, Some(1));

        assert!(features_from_json_str("42", &TileConfig::default()).is_err());
    }
}
