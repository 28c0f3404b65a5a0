//! Relational hash join over two in-memory batches.
//!
//! Inner, left and outer joins hash the right input and probe with the left.
//! Right joins hash the left input so output follows the right row order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, UInt32Array};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::{Result, WarehouseError};

/// Kind of relational join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
    /// Full outer join
    Outer,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "inner"),
            JoinKind::Left => write!(f, "left"),
            JoinKind::Right => write!(f, "right"),
            JoinKind::Outer => write!(f, "outer"),
        }
    }
}

impl FromStr for JoinKind {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinKind::Inner),
            "left" => Ok(JoinKind::Left),
            "right" => Ok(JoinKind::Right),
            "outer" | "full" => Ok(JoinKind::Outer),
            other => Err(WarehouseError::invalid_argument(format!(
                "Unknown join kind '{}'. Expected inner, left, right or outer",
                other
            ))),
        }
    }
}

/// Hashable form of one key cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyValue {
    Bool(bool),
    Int(i64),
    /// Bit pattern of the value, with `-0.0` folded into `0.0`
    Float(u64),
    Text(String),
}

/// Composite key per row; `None` when any key cell is null.
type RowKeys = Vec<Option<Vec<KeyValue>>>;

fn key_column(array: &ArrayRef) -> Result<Vec<Option<KeyValue>>> {
    let values = match array.data_type() {
        DataType::Boolean => array
            .as_boolean()
            .iter()
            .map(|v| v.map(KeyValue::Bool))
            .collect(),
        dt if dt.is_integer() => cast(array, &DataType::Int64)?
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(KeyValue::Int))
            .collect(),
        dt if dt.is_floating() => cast(array, &DataType::Float64)?
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map(|f| KeyValue::Float((f + 0.0).to_bits())))
            .collect(),
        _ => {
            let text = cast(array, &DataType::Utf8).map_err(|e| {
                WarehouseError::schema(format!(
                    "Cannot join on column of type {}: {}",
                    array.data_type(),
                    e
                ))
            })?;
            text.as_string::<i32>()
                .iter()
                .map(|v| v.map(|s| KeyValue::Text(s.to_string())))
                .collect()
        }
    };
    Ok(values)
}

fn row_keys(batch: &RecordBatch, on: &[String]) -> Result<RowKeys> {
    let columns = on
        .iter()
        .map(|name| key_column(column(batch, name)?))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..batch.num_rows())
        .map(|row| {
            columns
                .iter()
                .map(|col| col[row].clone())
                .collect::<Option<Vec<_>>>()
        })
        .collect())
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| WarehouseError::schema(format!("Join key '{}' not found", name)))
}

fn hash_rows(keys: &RowKeys) -> HashMap<&[KeyValue], Vec<u32>> {
    let mut map: HashMap<&[KeyValue], Vec<u32>> = HashMap::new();
    for (row, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            map.entry(key.as_slice()).or_default().push(row as u32);
        }
    }
    map
}

/// Pair up matching rows; returns (left indices, right indices).
fn match_rows(left: &RowKeys, right: &RowKeys, kind: JoinKind) -> (Vec<Option<u32>>, Vec<Option<u32>>) {
    let mut left_idx = Vec::new();
    let mut right_idx = Vec::new();

    if kind == JoinKind::Right {
        let table = hash_rows(left);
        for (r, key) in right.iter().enumerate() {
            match key.as_ref().and_then(|k| table.get(k.as_slice())) {
                Some(rows) => {
                    for &l in rows {
                        left_idx.push(Some(l));
                        right_idx.push(Some(r as u32));
                    }
                }
                None => {
                    left_idx.push(None);
                    right_idx.push(Some(r as u32));
                }
            }
        }
        return (left_idx, right_idx);
    }

    let table = hash_rows(right);
    let mut right_matched = vec![false; right.len()];
    for (l, key) in left.iter().enumerate() {
        match key.as_ref().and_then(|k| table.get(k.as_slice())) {
            Some(rows) => {
                for &r in rows {
                    left_idx.push(Some(l as u32));
                    right_idx.push(Some(r));
                    right_matched[r as usize] = true;
                }
            }
            None if kind != JoinKind::Inner => {
                left_idx.push(Some(l as u32));
                right_idx.push(None);
            }
            None => {}
        }
    }

    if kind == JoinKind::Outer {
        for (r, matched) in right_matched.iter().enumerate() {
            if !matched {
                left_idx.push(None);
                right_idx.push(Some(r as u32));
            }
        }
    }

    (left_idx, right_idx)
}

/// Join `left` and `right` on the columns named in `on`.
///
/// Output holds every left column (keys once, in their left position)
/// followed by the right non-key columns. Other names present on both sides
/// get `_x` (left) and `_y` (right) suffixes. Null keys never match.
pub fn join(left: &RecordBatch, right: &RecordBatch, on: &[String], kind: JoinKind) -> Result<RecordBatch> {
    if on.is_empty() {
        return Err(WarehouseError::invalid_argument("At least one join key is required"));
    }
    for name in on {
        let (l, r) = (column(left, name)?, column(right, name)?);
        if l.data_type() != r.data_type() {
            return Err(WarehouseError::schema(format!(
                "Join key '{}' has type {} on the left but {} on the right",
                name,
                l.data_type(),
                r.data_type()
            )));
        }
    }

    let (left_idx, right_idx) = match_rows(&row_keys(left, on)?, &row_keys(right, on)?, kind);
    let right_only = BooleanArray::from(left_idx.iter().map(Option::is_none).collect::<Vec<_>>());
    let left_idx = UInt32Array::from(left_idx);
    let right_idx = UInt32Array::from(right_idx);

    let is_key = |name: &String| on.contains(name);
    let left_schema = left.schema();
    let right_schema = right.schema();
    let right_names: Vec<&String> = right_schema
        .fields()
        .iter()
        .map(|f| f.name())
        .filter(|n| !is_key(*n))
        .collect();
    let left_names: Vec<&String> = left_schema
        .fields()
        .iter()
        .map(|f| f.name())
        .filter(|n| !is_key(*n))
        .collect();

    let mut fields = Vec::new();
    let mut columns = Vec::new();

    for (i, field) in left_schema.fields().iter().enumerate() {
        let name = field.name();
        let gathered = take(left.column(i).as_ref(), &left_idx, None)?;
        if is_key(name) {
            let from_right = take(column(right, name)?.as_ref(), &right_idx, None)?;
            columns.push(zip(&right_only, &from_right, &gathered)?);
            fields.push(Field::new(name, field.data_type().clone(), true));
        } else {
            let out_name = if right_names.contains(&name) {
                format!("{}_x", name)
            } else {
                name.clone()
            };
            columns.push(gathered);
            fields.push(Field::new(out_name, field.data_type().clone(), true));
        }
    }

    for (i, field) in right_schema.fields().iter().enumerate() {
        let name = field.name();
        if is_key(name) {
            continue;
        }
        let out_name = if left_names.contains(&name) {
            format!("{}_y", name)
        } else {
            name.clone()
        };
        columns.push(take(right.column(i).as_ref(), &right_idx, None)?);
        fields.push(Field::new(out_name, field.data_type().clone(), true));
    }

    let options = RecordBatchOptions::new().with_row_count(Some(right_idx.len()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(ArrowSchema::new(fields)),
        columns,
        &options,
    )?)
}
