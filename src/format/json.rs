//! Structured-record files.
//!
//! A `FeatureCollection` payload is handed to the geographic parser. Anything
//! else is flattened into rows:
//!
//! - a top-level array yields one row per element
//! - a top-level object yields the rows of its first non-empty array value,
//!   or a single row of its own keys when it has none
//! - any other value yields a single row with a `value` column

use serde_json::{Map, Value};
use tracing::debug;

use super::columns::{Cell, KeyedRows};
use super::{geojson, Decoded};
use crate::dataset::Dataset;
use crate::error::Result;

/// Column used for list elements that are not objects.
const SCALAR_COLUMN: &str = "value";

pub(crate) fn parse(bytes: &[u8]) -> Result<Decoded> {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => return Ok(Decoded::Unusable(format!("invalid JSON: {}", e))),
    };

    if geojson::is_feature_collection(&value) {
        debug!("structured record file is a feature collection");
        return geojson::from_value(value);
    }

    let rows = match value {
        Value::Array(items) => flatten_all(&items),
        Value::Object(map) => match first_record_list(&map) {
            Some((key, items)) => {
                debug!(key = %key, records = items.len(), "using record list");
                flatten_all(items)
            }
            None => single_row(&map),
        },
        scalar => {
            let mut rows = KeyedRows::new();
            rows.push_row(vec![(SCALAR_COLUMN.to_string(), scalar_cell(&scalar))]);
            rows
        }
    };

    Ok(Decoded::Dataset(Dataset::Tabular(rows.into_batch()?)))
}

fn first_record_list(map: &Map<String, Value>) -> Option<(&String, &Vec<Value>)> {
    map.iter().find_map(|(key, value)| match value {
        Value::Array(items) if !items.is_empty() => Some((key, items)),
        _ => None,
    })
}

fn flatten_all(items: &[Value]) -> KeyedRows {
    let mut rows = KeyedRows::new();
    for item in items {
        rows.push_row(flatten_record(item));
    }
    rows
}

/// Flatten one list element into `(column, cell)` pairs.
fn flatten_record(item: &Value) -> Vec<(String, Cell)> {
    match item {
        Value::Object(map) => {
            let mut row = Vec::new();
            flatten_into("", map, &mut row);
            row
        }
        other => vec![(SCALAR_COLUMN.to_string(), scalar_cell(other))],
    }
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, row: &mut Vec<(String, Cell)>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(nested) => flatten_into(&path, nested, row),
            other => row.push((path, scalar_cell(other))),
        }
    }
}

/// The whole object as one row; nested values are kept as JSON text.
fn single_row(map: &Map<String, Value>) -> KeyedRows {
    let mut rows = KeyedRows::new();
    rows.push_row(
        map.iter()
            .map(|(key, value)| (key.clone(), scalar_cell(value)))
            .collect(),
    );
    rows
}

/// Cell for a JSON value; arrays and objects become their JSON text.
pub(crate) fn scalar_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Bool(b) => Cell::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Cell::Int(i),
            None => n.as_f64().map(Cell::Float).unwrap_or(Cell::Null),
        },
        Value::String(s) => Cell::Text(s.clone()),
        nested => Cell::Text(nested.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::record_batch::RecordBatch;

    fn tabular(bytes: &[u8]) -> RecordBatch {
        match parse(bytes).unwrap() {
            Decoded::Dataset(Dataset::Tabular(batch)) => batch,
            other => panic!("expected tabular data, got {:?}", other),
        }
    }

    fn column_names(batch: &RecordBatch) -> Vec<String> {
        batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    #[test]
    fn test_heterogeneous_records_union_columns() {
        let batch = tabular(
            br#"[
                {"id": 1, "nome": "a"},
                {"id": 2, "cidade": "Recife"},
                {"id": 3, "nome": "c", "ativo": true}
            ]"#,
        );
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(column_names(&batch), vec!["id", "nome", "cidade", "ativo"]);
        assert!(batch.column(1).is_null(1));
        assert!(batch.column(3).is_null(0));
    }

    #[test]
    fn test_nested_objects_flatten_to_dotted_paths() {
        let batch = tabular(br#"[{"id": 1, "endereco": {"rua": "X", "geo": {"lat": -8.0}}, "tags": [1, 2]}]"#);
        assert_eq!(
            column_names(&batch),
            vec!["id", "endereco.rua", "endereco.geo.lat", "tags"]
        );
        let tags = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(tags.value(0), "[1,2]");
    }

    #[test]
    fn test_mapping_uses_first_non_empty_list() {
        let batch = tabular(br#"{"meta": {"v": 1}, "vazio": [], "dados": [{"a": 1}, {"a": 2}], "outros": [{"b": 1}]}"#);
        assert_eq!(column_names(&batch), vec!["a"]);
        let values = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(values.value(1), 2);
    }

    #[test]
    fn test_mapping_without_list_is_single_row() {
        let batch = tabular(br#"{"nome": "x", "total": 10, "meta": {"v": 1}}"#);
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(column_names(&batch), vec!["nome", "total", "meta"]);
        let meta = batch.column(2).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(meta.value(0), r#"{"v":1}"#);
    }

    #[test]
    fn test_scalar_list_elements() {
        let batch = tabular(b"[1, 2, 3]");
        assert_eq!(column_names(&batch), vec!["value"]);
        assert_eq!(batch.num_rows(), 3);
    }

    #[test]
    fn test_top_level_scalar_is_single_row() {
        let batch = tabular(b"\"hello\"");
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(column_names(&batch), vec!["value"]);
    }

    #[test]
    fn test_feature_collection_is_routed_to_geo() {
        let decoded = parse(
            br#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"nome": "a"},
                 "geometry": {"type": "Point", "coordinates": [1, 2]}}
            ]}"#,
        )
        .unwrap();
        match decoded {
            Decoded::Dataset(dataset) => {
                assert!(dataset.is_geospatial());
                assert_eq!(dataset.crs(), Some("EPSG:4326"));
                assert_eq!(dataset.column_names(), vec!["nome", "geometry"]);
            }
            other => panic!("expected a dataset, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_unusable() {
        assert!(matches!(parse(b"{not json").unwrap(), Decoded::Unusable(_)));
    }
}
