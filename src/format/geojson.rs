//! Geographic feature collections.

use serde_json::Value;
use tracing::debug;

use super::columns::{Cell, KeyedRows};
use super::json::scalar_cell;
use super::Decoded;
use crate::dataset::Dataset;
use crate::error::Result;

/// CRS assumed when a collection does not name one.
pub const DEFAULT_CRS: &str = "EPSG:4326";
/// Name of the column holding each feature's geometry as GeoJSON text.
pub const GEOMETRY_COLUMN: &str = "geometry";

const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

pub(crate) fn is_feature_collection(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("FeatureCollection")
}

pub(crate) fn parse(bytes: &[u8]) -> Result<Decoded> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => from_value(value),
        Err(e) => Ok(Decoded::Unusable(format!("invalid GeoJSON: {}", e))),
    }
}

/// Build a geospatial dataset from a parsed GeoJSON document.
pub(crate) fn from_value(mut value: Value) -> Result<Decoded> {
    let crs = crs_of(&value);
    let kind = value.get("type").and_then(Value::as_str).map(str::to_string);

    let features: Vec<Value> = match kind.as_deref() {
        Some("FeatureCollection") => match value.get_mut("features").map(Value::take) {
            Some(Value::Array(features)) => features,
            _ => {
                return Ok(Decoded::Unusable(
                    "feature collection has no features array".to_string(),
                ))
            }
        },
        Some("Feature") => vec![value],
        Some(kind) if GEOMETRY_TYPES.contains(&kind) => {
            vec![serde_json::json!({ "type": "Feature", "properties": {}, "geometry": value })]
        }
        Some(kind) => return Ok(Decoded::Unusable(format!("unsupported GeoJSON type '{}'", kind))),
        None => return Ok(Decoded::Unusable("GeoJSON object has no type".to_string())),
    };

    let mut rows = KeyedRows::new();
    rows.add_column(GEOMETRY_COLUMN);
    for feature in &features {
        let mut row: Vec<(String, Cell)> = match feature.get("properties") {
            Some(Value::Object(props)) => props
                .iter()
                .filter(|(key, _)| key.as_str() != GEOMETRY_COLUMN)
                .map(|(key, value)| (key.clone(), scalar_cell(value)))
                .collect(),
            _ => Vec::new(),
        };
        let geometry = match feature.get("geometry") {
            None | Some(Value::Null) => Cell::Null,
            Some(geometry) => Cell::Text(geometry.to_string()),
        };
        row.push((GEOMETRY_COLUMN.to_string(), geometry));
        rows.push_row(row);
    }

    debug!(features = rows.len(), crs = %crs, "feature collection decoded");
    let batch = move_geometry_last(rows)?;
    Ok(Decoded::Dataset(Dataset::Geospatial { batch, crs }))
}

/// Property columns in first-seen order, then the geometry column.
fn move_geometry_last(rows: KeyedRows) -> Result<arrow::record_batch::RecordBatch> {
    let batch = rows.into_batch()?;
    let schema = batch.schema();
    match schema.index_of(GEOMETRY_COLUMN) {
        Ok(pos) if pos + 1 != schema.fields().len() => {
            let mut order: Vec<usize> = (0..schema.fields().len()).filter(|&i| i != pos).collect();
            order.push(pos);
            Ok(batch.project(&order)?)
        }
        _ => Ok(batch),
    }
}

/// CRS named by the legacy `crs` member, normalized to `EPSG:<code>`.
fn crs_of(value: &Value) -> String {
    value
        .get("crs")
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(Value::as_str)
        .map(normalize_crs)
        .unwrap_or_else(|| DEFAULT_CRS.to_string())
}

fn normalize_crs(name: &str) -> String {
    if name.to_ascii_uppercase().ends_with("CRS84") {
        return DEFAULT_CRS.to_string();
    }
    if name.to_ascii_uppercase().contains("EPSG") {
        let code = name.rsplit(':').next().unwrap_or_default();
        if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
            return format!("EPSG:{}", code);
        }
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};

    fn geo(bytes: &[u8]) -> Dataset {
        match parse(bytes).unwrap() {
            Decoded::Dataset(dataset) => dataset,
            other => panic!("expected a dataset, got {:?}", other),
        }
    }

    #[test]
    fn test_properties_then_geometry() {
        let dataset = geo(br#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"nome": "A", "pop": 10},
                 "geometry": {"type": "Point", "coordinates": [-34.9, -8.0]}},
                {"type": "Feature", "properties": {"nome": "B", "area": 2.5},
                 "geometry": null}
            ]
        }"#);

        assert!(dataset.is_geospatial());
        assert_eq!(dataset.shape(), (2, 4));
        assert_eq!(dataset.column_names(), vec!["nome", "pop", "area", "geometry"]);

        let geometry = dataset
            .column("geometry")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert!(geometry.value(0).contains("Point"));
        assert!(geometry.is_null(1));
    }

    #[test]
    fn test_crs_from_legacy_member() {
        let dataset = geo(br#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::31983"}},
            "features": []
        }"#);
        assert_eq!(dataset.crs(), Some("EPSG:31983"));
        assert_eq!(dataset.num_rows(), 0);
        assert_eq!(dataset.column_names(), vec!["geometry"]);
    }

    #[test]
    fn test_normalize_crs() {
        assert_eq!(normalize_crs("urn:ogc:def:crs:OGC:1.3:CRS84"), "EPSG:4326");
        assert_eq!(normalize_crs("EPSG:3857"), "EPSG:3857");
        assert_eq!(normalize_crs("custom"), "custom");
    }

    #[test]
    fn test_bare_feature_is_one_row() {
        let dataset = geo(br#"{"type": "Feature", "properties": {"id": 7},
            "geometry": {"type": "Point", "coordinates": [0, 0]}}"#);
        assert_eq!(dataset.shape(), (1, 2));
        assert_eq!(dataset.crs(), Some(DEFAULT_CRS));
    }

    #[test]
    fn test_bare_geometry_is_one_row() {
        let dataset = geo(br#"{"type": "Point", "coordinates": [0, 0]}"#);
        assert_eq!(dataset.column_names(), vec!["geometry"]);
    }

    #[test]
    fn test_unknown_type_is_unusable() {
        assert!(matches!(
            parse(br#"{"type": "Topology"}"#).unwrap(),
            Decoded::Unusable(_)
        ));
        assert!(matches!(parse(b"[]").unwrap(), Decoded::Unusable(_)));
    }
}
