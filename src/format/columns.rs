//! Typed column building from loosely typed cells.
//!
//! Workbook and structured-record parsers hand over rows of [`Cell`]s; the
//! narrowest Arrow type that fits every non-null cell of a column is chosen.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::{Result, WarehouseError};

/// A single loosely typed value.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Text form used when a column falls back to Utf8.
    fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    fn candidate(&self) -> Option<CandidateType> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some(CandidateType::Boolean),
            Cell::Int(_) => Some(CandidateType::Int64),
            Cell::Float(_) => Some(CandidateType::Float64),
            Cell::Text(_) => Some(CandidateType::Utf8),
        }
    }
}

/// Candidate column types, from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateType {
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl CandidateType {
    fn widen(self, other: CandidateType) -> CandidateType {
        use CandidateType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Int64, Float64) | (Float64, Int64) => Float64,
            _ => Utf8,
        }
    }

    fn to_arrow_type(self) -> DataType {
        match self {
            CandidateType::Boolean => DataType::Boolean,
            CandidateType::Int64 => DataType::Int64,
            CandidateType::Float64 => DataType::Float64,
            CandidateType::Utf8 => DataType::Utf8,
        }
    }
}

fn resolve_type(cells: &[Cell]) -> CandidateType {
    cells
        .iter()
        .filter_map(Cell::candidate)
        .reduce(CandidateType::widen)
        .unwrap_or(CandidateType::Utf8)
}

fn build_column(cells: &[Cell], candidate: CandidateType) -> ArrayRef {
    match candidate {
        CandidateType::Boolean => Arc::new(
            cells
                .iter()
                .map(|c| match c {
                    Cell::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        CandidateType::Int64 => Arc::new(
            cells
                .iter()
                .map(|c| match c {
                    Cell::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        CandidateType::Float64 => Arc::new(
            cells
                .iter()
                .map(|c| match c {
                    Cell::Int(i) => Some(*i as f64),
                    Cell::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        CandidateType::Utf8 => Arc::new(
            cells
                .iter()
                .map(Cell::render)
                .collect::<StringArray>(),
        ),
    }
}

/// Build a batch from named columns and rows of cells.
///
/// Every row must have exactly one cell per column.
pub(crate) fn build_batch(names: &[String], rows: &[Vec<Cell>]) -> Result<RecordBatch> {
    if let Some(bad) = rows.iter().position(|r| r.len() != names.len()) {
        return Err(WarehouseError::internal(format!(
            "Row {} has {} cells, expected {}",
            bad,
            rows[bad].len(),
            names.len()
        )));
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let cells: Vec<Cell> = rows.iter().map(|r| r[i].clone()).collect();
        let candidate = resolve_type(&cells);
        fields.push(Field::new(name, candidate.to_arrow_type(), true));
        columns.push(build_column(&cells, candidate));
    }

    finish(fields, columns, rows.len())
}

/// Build an all-Utf8 batch; `None` cells become nulls.
pub(crate) fn build_text_batch(names: &[String], rows: &[Vec<Option<String>>]) -> Result<RecordBatch> {
    let fields = names
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();
    let columns = (0..names.len())
        .map(|i| {
            let array: StringArray = rows
                .iter()
                .map(|r| r.get(i).cloned().flatten())
                .collect();
            Arc::new(array) as ArrayRef
        })
        .collect();

    finish(fields, columns, rows.len())
}

fn finish(fields: Vec<Field>, columns: Vec<ArrayRef>, row_count: usize) -> Result<RecordBatch> {
    let schema = Arc::new(ArrowSchema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(row_count));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

/// Rows of keyed cells whose column set is the union of keys, in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct KeyedRows {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<(usize, Cell)>>,
}

impl KeyedRows {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a column without adding a row.
    pub(crate) fn add_column(&mut self, name: &str) -> usize {
        if let Some(&pos) = self.positions.get(name) {
            return pos;
        }
        let pos = self.columns.len();
        self.columns.push(name.to_string());
        self.positions.insert(name.to_string(), pos);
        pos
    }

    pub(crate) fn push_row(&mut self, row: Vec<(String, Cell)>) {
        let row = row
            .into_iter()
            .map(|(name, cell)| (self.add_column(&name), cell))
            .collect();
        self.rows.push(row);
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn into_batch(self) -> Result<RecordBatch> {
        let width = self.columns.len();
        let rows: Vec<Vec<Cell>> = self
            .rows
            .into_iter()
            .map(|keyed| {
                let mut cells = vec![Cell::Null; width];
                for (pos, cell) in keyed {
                    cells[pos] = cell;
                }
                cells
            })
            .collect();
        build_batch(&self.columns, &rows)
    }
}

/// Header names with blanks replaced by a positional placeholder.
pub(crate) fn header_names(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    raw.into_iter()
        .enumerate()
        .map(|(i, name)| {
            if name.trim().is_empty() {
                format!("column_{}", i)
            } else {
                name
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_type_widening() {
        assert_eq!(
            resolve_type(&[Cell::Int(1), Cell::Null, Cell::Int(2)]),
            CandidateType::Int64
        );
        assert_eq!(
            resolve_type(&[Cell::Int(1), Cell::Float(2.5)]),
            CandidateType::Float64
        );
        assert_eq!(
            resolve_type(&[Cell::Bool(true), Cell::Int(1)]),
            CandidateType::Utf8
        );
        assert_eq!(resolve_type(&[Cell::Null, Cell::Null]), CandidateType::Utf8);
    }

    #[test]
    fn test_build_batch_types() {
        let rows = vec![
            vec![Cell::Int(1), Cell::Float(1.5), Cell::Bool(true), Cell::Text("a".into())],
            vec![Cell::Int(2), Cell::Int(3), Cell::Null, Cell::Int(7)],
        ];
        let batch = build_batch(&names(&["i", "f", "b", "s"]), &rows).unwrap();

        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Boolean);
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);

        let floats = batch.column(1).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(floats.value(1), 3.0);
        let text = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(text.value(1), "7");
        assert!(batch.column(2).is_null(1));
    }

    #[test]
    fn test_build_batch_rejects_ragged_rows() {
        let rows = vec![vec![Cell::Int(1)], vec![Cell::Int(1), Cell::Int(2)]];
        assert!(build_batch(&names(&["a"]), &rows).is_err());
    }

    #[test]
    fn test_build_text_batch_pads_short_rows() {
        let rows = vec![vec![Some("1".to_string())], vec![]];
        let batch = build_text_batch(&names(&["a", "b"]), &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert!(batch.column(1).is_null(0));
        assert!(batch.column(0).is_null(1));
    }

    #[test]
    fn test_empty_rows_keep_columns() {
        let batch = build_batch(&names(&["a", "b"]), &[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
    }

    #[test]
    fn test_keyed_rows_union_in_first_seen_order() {
        let mut rows = KeyedRows::new();
        rows.push_row(vec![("b".into(), Cell::Int(1)), ("a".into(), Cell::Int(2))]);
        rows.push_row(vec![("c".into(), Cell::Text("x".into())), ("b".into(), Cell::Int(3))]);
        assert_eq!(rows.len(), 2);

        let batch = rows.into_batch().unwrap();
        let schema = batch.schema();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert!(batch.column(1).is_null(1));
        assert!(batch.column(2).is_null(0));
    }

    #[test]
    fn test_header_names_fill_blanks() {
        let header = header_names(vec!["id".to_string(), " ".to_string()]);
        assert_eq!(header, vec!["id", "column_1"]);
    }
}
