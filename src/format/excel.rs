//! Spreadsheet workbooks (xlsx / xls).

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType as _, Reader};
use tracing::debug;

use super::columns::{build_batch, header_names, Cell};
use super::Decoded;
use crate::config::SheetSelector;
use crate::dataset::Dataset;
use crate::error::Result;

/// Read one sheet of a workbook; its first row is the header.
pub(crate) fn parse(bytes: &[u8], sheet: &SheetSelector) -> Result<Decoded> {
    let mut workbook = match open_workbook_auto_from_rs(Cursor::new(bytes)) {
        Ok(workbook) => workbook,
        Err(e) => return Ok(Decoded::Unusable(format!("not a readable workbook: {}", e))),
    };

    let names = workbook.sheet_names();
    let name = match resolve_sheet(&names, sheet) {
        Ok(name) => name,
        Err(reason) => return Ok(Decoded::Unusable(reason)),
    };

    let range = match workbook.worksheet_range(&name) {
        Ok(range) => range,
        Err(e) => return Ok(Decoded::Unusable(format!("sheet '{}' unreadable: {}", name, e))),
    };

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header) => header_names(header.iter().map(header_text)),
        None => return Ok(Decoded::Unusable(format!("sheet '{}' is empty", name))),
    };

    let body: Vec<Vec<Cell>> = rows
        .map(|row| {
            let mut cells: Vec<Cell> = row.iter().map(to_cell).collect();
            cells.resize(header.len(), Cell::Null);
            cells
        })
        .collect();

    debug!(sheet = %name, rows = body.len(), columns = header.len(), "workbook sheet decoded");
    Ok(Decoded::Dataset(Dataset::Tabular(build_batch(&header, &body)?)))
}

fn resolve_sheet(names: &[String], sheet: &SheetSelector) -> std::result::Result<String, String> {
    match sheet {
        SheetSelector::Index(i) => names.get(*i).cloned().ok_or_else(|| {
            format!(
                "sheet index {} out of range; workbook has {} sheet(s): {}",
                i,
                names.len(),
                names.join(", ")
            )
        }),
        SheetSelector::Name(wanted) => names
            .iter()
            .find(|n| *n == wanted)
            .cloned()
            .ok_or_else(|| format!("sheet '{}' not found; available: {}", wanted, names.join(", "))),
    }
}

fn header_text(cell: &Data) -> String {
    match to_cell(cell) {
        Cell::Null => String::new(),
        Cell::Bool(b) => b.to_string(),
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => f.to_string(),
        Cell::Text(s) => s,
    }
}

fn to_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty | Data::Error(_) => Cell::Null,
        Data::Bool(b) => Cell::Bool(*b),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Cell::Int(*f as i64),
        Data::Float(f) => Cell::Float(*f),
        Data::String(s) if s.is_empty() => Cell::Null,
        Data::String(s) => Cell::Text(s.clone()),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) => Cell::Text(dt.to_string()),
            None => Cell::Text(cell.to_string()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
