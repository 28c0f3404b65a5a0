//! Per-table load bookkeeping.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dataset::Dataset;
use crate::format::FileKind;
use crate::gateway::RemoteFile;

/// What the warehouse knows about the last successful load of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableMetadata {
    /// Display name of the source file
    pub file_name: String,
    /// `Google Sheet` or the upper-cased file extension
    pub file_type: String,
    pub is_geospatial: bool,
    pub crs: Option<String>,
    /// `(rows, columns)`
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    /// Remote modification time as seen by the index
    pub modified_time: Option<DateTime<Utc>>,
    pub loaded_at: DateTime<Utc>,
}

impl TableMetadata {
    pub fn from_load(file: &RemoteFile, dataset: &Dataset) -> Self {
        Self {
            file_name: file.name.clone(),
            file_type: FileKind::type_label(file),
            is_geospatial: dataset.is_geospatial(),
            crs: dataset.crs().map(str::to_string),
            shape: dataset.shape(),
            columns: dataset.column_names(),
            modified_time: file.modified_time,
            loaded_at: Utc::now(),
        }
    }
}

impl fmt::Display for TableMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "file:      {} ({})", self.file_name, self.file_type)?;
        writeln!(f, "shape:     {} rows x {} columns", self.shape.0, self.shape.1)?;
        if let Some(crs) = &self.crs {
            writeln!(f, "crs:       {}", crs)?;
        }
        writeln!(f, "columns:   {}", self.columns.join(", "))?;
        if let Some(modified) = self.modified_time {
            writeln!(f, "modified:  {}", modified.to_rfc3339())?;
        }
        write!(f, "loaded at: {}", self.loaded_at.to_rfc3339())
    }
}
