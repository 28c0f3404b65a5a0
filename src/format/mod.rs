//! Format dispatcher.
//!
//! Turns a remote file into a [`Dataset`] based on its declared type:
//!
//! - native spreadsheets are read range-wise through the gateway
//! - delimited text is probed over encodings and delimiters
//! - workbooks are read with the requested sheet selector
//! - structured records are flattened, unless they are a feature collection
//! - GeoJSON becomes a geospatial dataset carrying its CRS
//!
//! Files that cannot be turned into a table yield [`Decoded::Unusable`];
//! only gateway failures are returned as errors.

mod columns;
pub mod csv;
mod excel;
pub mod geojson;
mod json;
pub mod sheets;

use std::fmt;

use tracing::debug;

use crate::config::SheetSelector;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::gateway::{DriveGateway, RemoteFile};

/// File extensions the warehouse turns into tables.
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["csv", "xlsx", "xls", "json", "geojson"];

/// Structural kind of a remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    NativeSpreadsheet,
    Csv,
    Excel,
    Json,
    GeoJson,
}

impl FileKind {
    /// Kind of `file`, or `None` when it is not a supported table source.
    pub fn classify(file: &RemoteFile) -> Option<FileKind> {
        if file.is_native_spreadsheet() {
            return Some(FileKind::NativeSpreadsheet);
        }
        Self::from_extension(file.extension()?.as_str())
    }

    pub fn from_extension(ext: &str) -> Option<FileKind> {
        match ext {
            "csv" => Some(FileKind::Csv),
            "xlsx" | "xls" => Some(FileKind::Excel),
            "json" => Some(FileKind::Json),
            "geojson" => Some(FileKind::GeoJson),
            _ => None,
        }
    }

    /// Human readable type of `file`, e.g. `Google Sheet` or `CSV`.
    pub fn type_label(file: &RemoteFile) -> String {
        if file.is_native_spreadsheet() {
            "Google Sheet".to_string()
        } else {
            file.extension().unwrap_or_default().to_uppercase()
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::NativeSpreadsheet => write!(f, "native spreadsheet"),
            FileKind::Csv => write!(f, "csv"),
            FileKind::Excel => write!(f, "workbook"),
            FileKind::Json => write!(f, "json"),
            FileKind::GeoJson => write!(f, "geojson"),
        }
    }
}

/// Result of decoding one file.
#[derive(Debug, Clone)]
pub enum Decoded {
    Dataset(Dataset),
    /// No parse produced a usable table; carries the reason
    Unusable(String),
}

/// Fetch and decode `file`, honoring `sheet` for multi-sheet sources.
pub fn decode(gateway: &dyn DriveGateway, file: &RemoteFile, sheet: &SheetSelector) -> Result<Decoded> {
    let kind = match FileKind::classify(file) {
        Some(kind) => kind,
        None => {
            return Ok(Decoded::Unusable(format!(
                "unsupported file type ({})",
                file.mime_type
            )))
        }
    };
    debug!(file = %file.name, %kind, "decoding");

    let decoded = match kind {
        FileKind::NativeSpreadsheet => sheets::read(gateway, &file.id, sheet)?,
        _ => {
            let bytes = gateway.download(&file.id)?;
            decode_bytes(kind, &bytes, sheet)?
        }
    };
    post_process(decoded)
}

/// Decode downloaded content of a known kind.
///
/// Native spreadsheets have no byte form and are always unusable here.
pub fn decode_bytes(kind: FileKind, bytes: &[u8], sheet: &SheetSelector) -> Result<Decoded> {
    let decoded = match kind {
        FileKind::Csv => csv::parse(bytes)?,
        FileKind::Excel => excel::parse(bytes, sheet)?,
        FileKind::Json => json::parse(bytes)?,
        FileKind::GeoJson => geojson::parse(bytes)?,
        FileKind::NativeSpreadsheet => {
            Decoded::Unusable("native spreadsheets are read through the gateway".to_string())
        }
    };
    post_process(decoded)
}

fn post_process(decoded: Decoded) -> Result<Decoded> {
    match decoded {
        Decoded::Dataset(dataset) => Ok(Decoded::Dataset(dataset.with_trimmed_column_names()?)),
        unusable => Ok(unusable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryDrive, SPREADSHEET_MIME_TYPE};

    fn file(name: &str, mime: &str) -> RemoteFile {
        RemoteFile {
            id: "1".into(),
            name: name.into(),
            mime_type: mime.into(),
            modified_time: None,
            parents: vec![],
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(FileKind::classify(&file("a.CSV", "text/csv")), Some(FileKind::Csv));
        assert_eq!(FileKind::classify(&file("a.xls", "x")), Some(FileKind::Excel));
        assert_eq!(FileKind::classify(&file("a.geojson", "x")), Some(FileKind::GeoJson));
        assert_eq!(FileKind::classify(&file("a.txt", "text/plain")), None);
        assert_eq!(FileKind::classify(&file("README", "text/plain")), None);
        assert_eq!(
            FileKind::classify(&file("Budget", SPREADSHEET_MIME_TYPE)),
            Some(FileKind::NativeSpreadsheet)
        );
    }

    #[test]
    fn test_type_label() {
        assert_eq!(FileKind::type_label(&file("a.xlsx", "x")), "XLSX");
        assert_eq!(FileKind::type_label(&file("Budget", SPREADSHEET_MIME_TYPE)), "Google Sheet");
    }

    #[test]
    fn test_tabular_column_names_are_trimmed() {
        let decoded = decode_bytes(FileKind::Csv, b" a ;b \n1;2\n", &SheetSelector::default()).unwrap();
        match decoded {
            Decoded::Dataset(dataset) => assert_eq!(dataset.column_names(), vec!["a", "b"]),
            other => panic!("expected a dataset, got {:?}", other),
        }
    }

    #[test]
    fn test_geo_column_names_are_kept() {
        let decoded = decode_bytes(
            FileKind::GeoJson,
            br#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {" nome ": "a"}, "geometry": null}
            ]}"#,
            &SheetSelector::default(),
        )
        .unwrap();
        match decoded {
            Decoded::Dataset(dataset) => {
                assert_eq!(dataset.column_names(), vec![" nome ", "geometry"])
            }
            other => panic!("expected a dataset, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_downloads_regular_files() {
        let drive = MemoryDrive::new("root");
        drive.add_file("f", "dados.csv", "root", "x;y\n1;2\n");
        let remote = drive.list_children("root", None).unwrap().files.remove(0);

        let decoded = decode(&drive, &remote, &SheetSelector::default()).unwrap();
        assert!(matches!(decoded, Decoded::Dataset(_)));
        assert_eq!(drive.download_count(), 1);
    }

    #[test]
    fn test_decode_download_failure_is_an_error() {
        let drive = MemoryDrive::new("root");
        let missing = file("ghost.csv", "text/csv");
        assert!(decode(&drive, &missing, &SheetSelector::default()).is_err());
    }
}
