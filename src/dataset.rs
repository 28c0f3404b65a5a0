//! In-memory datasets produced by the format dispatcher.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{Field, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::Result;

/// A table loaded from one remote file (or one sheet of it).
///
/// Arrow arrays are immutable, so clones handed to callers can never alter
/// the copy held by the cache.
#[derive(Debug, Clone)]
pub enum Dataset {
    /// Plain rows and named columns
    Tabular(RecordBatch),
    /// Feature rows with a `geometry` column and a coordinate reference system
    Geospatial { batch: RecordBatch, crs: String },
}

impl Dataset {
    pub fn batch(&self) -> &RecordBatch {
        match self {
            Dataset::Tabular(batch) => batch,
            Dataset::Geospatial { batch, .. } => batch,
        }
    }

    pub fn into_batch(self) -> RecordBatch {
        match self {
            Dataset::Tabular(batch) => batch,
            Dataset::Geospatial { batch, .. } => batch,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.batch().num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch().num_columns()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_columns())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch()
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch().column_by_name(name)
    }

    pub fn crs(&self) -> Option<&str> {
        match self {
            Dataset::Tabular(_) => None,
            Dataset::Geospatial { crs, .. } => Some(crs),
        }
    }

    pub fn is_geospatial(&self) -> bool {
        matches!(self, Dataset::Geospatial { .. })
    }

    /// Approximate in-memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.batch().get_array_memory_size()
    }

    /// Render the first `limit` rows as a text table.
    pub fn pretty(&self, limit: usize) -> Result<String> {
        let batch = self.batch();
        let head = batch.slice(0, limit.min(batch.num_rows()));
        Ok(arrow::util::pretty::pretty_format_batches(&[head])?.to_string())
    }

    /// Write all rows to a CSV file with a header line.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = arrow::csv::WriterBuilder::new()
            .with_header(true)
            .build(file);
        writer.write(self.batch())?;
        Ok(())
    }

    /// Strip surrounding whitespace from column names of tabular data.
    ///
    /// Geospatial datasets are returned unchanged.
    pub(crate) fn with_trimmed_column_names(self) -> Result<Self> {
        match self {
            Dataset::Tabular(batch) => {
                let schema = batch.schema();
                let fields: Vec<Field> = schema
                    .fields()
                    .iter()
                    .map(|f| f.as_ref().clone().with_name(f.name().trim()))
                    .collect();
                let schema = Arc::new(ArrowSchema::new_with_metadata(
                    fields,
                    schema.metadata().clone(),
                ));
                let options = RecordBatchOptions::new().with_row_count(Some(batch.num_rows()));
                Ok(Dataset::Tabular(RecordBatch::try_new_with_options(
                    schema,
                    batch.columns().to_vec(),
                    &options,
                )?))
            }
            geo => Ok(geo),
        }
    }
}

/// Outcome of loading a named table.
///
/// Absent or unusable tables are ordinary outcomes, not errors.
#[derive(Debug, Clone)]
pub enum TableLoad {
    /// The table was served from cache or freshly parsed
    Loaded(Dataset),
    /// No table with that name is indexed
    NotFound {
        name: String,
        /// Up to five indexed names, for diagnostics
        suggestions: Vec<String>,
    },
    /// The file exists but no parse produced a usable table
    Unreadable { name: String, reason: String },
}

impl TableLoad {
    pub fn is_loaded(&self) -> bool {
        matches!(self, TableLoad::Loaded(_))
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        match self {
            TableLoad::Loaded(dataset) => Some(dataset),
            _ => None,
        }
    }

    pub fn into_dataset(self) -> Option<Dataset> {
        match self {
            TableLoad::Loaded(dataset) => Some(dataset),
            _ => None,
        }
    }
}
