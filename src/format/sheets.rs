//! Native online spreadsheets, read through the gateway's range API.

use tracing::debug;

use super::columns::{build_text_batch, header_names};
use super::Decoded;
use crate::config::SheetSelector;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::gateway::DriveGateway;

/// Columns fetched for every sheet.
const CELL_RANGE: &str = "A1:ZZ";

/// A1 range covering the whole of `title`.
pub fn sheet_range(title: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), CELL_RANGE)
}

pub(crate) fn read(
    gateway: &dyn DriveGateway,
    spreadsheet_id: &str,
    sheet: &SheetSelector,
) -> Result<Decoded> {
    let titles: Vec<String> = gateway
        .spreadsheet_sheets(spreadsheet_id)?
        .into_iter()
        .map(|s| s.title)
        .collect();

    if titles.is_empty() {
        return Ok(Decoded::Unusable("spreadsheet has no sheets".to_string()));
    }

    let title = match sheet {
        SheetSelector::Index(i) => match titles.get(*i) {
            Some(title) => title.clone(),
            None => {
                return Ok(Decoded::Unusable(format!(
                    "sheet index {} out of range (valid: 0..={})",
                    i,
                    titles.len() - 1
                )))
            }
        },
        SheetSelector::Name(name) => match titles.iter().find(|t| *t == name) {
            Some(title) => title.clone(),
            None => {
                return Ok(Decoded::Unusable(format!(
                    "sheet '{}' not found; available: {}",
                    name,
                    titles.join(", ")
                )))
            }
        },
    };

    let values = gateway.spreadsheet_values(spreadsheet_id, &sheet_range(&title))?;
    let mut rows = values.into_iter();
    let header = match rows.next() {
        Some(header) if !header.is_empty() => {
            header_names(header.into_iter().map(|h| h.trim().to_string()))
        }
        _ => return Ok(Decoded::Unusable(format!("sheet '{}' is empty", title))),
    };

    let mut body = Vec::new();
    for (i, row) in rows.enumerate() {
        if row.len() > header.len() {
            return Ok(Decoded::Unusable(format!(
                "sheet '{}' row {} has {} values but the header has {} columns",
                title,
                i + 2,
                row.len(),
                header.len()
            )));
        }
        body.push(row.into_iter().map(Some).collect::<Vec<_>>());
    }

    debug!(sheet = %title, rows = body.len(), columns = header.len(), "spreadsheet range decoded");
    Ok(Decoded::Dataset(Dataset::Tabular(build_text_batch(&header, &body)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryDrive;
    use arrow::array::{Array, StringArray};

    fn drive() -> MemoryDrive {
        let drive = MemoryDrive::new("root");
        drive.add_spreadsheet(
            "s1",
            "Orcamento",
            "root",
            vec![
                ("Resumo", vec![vec![" ano ", "total"], vec!["2024", "10"], vec!["2025"]]),
                ("Vazia", vec![]),
            ],
        );
        drive
    }

    fn tabular(decoded: Decoded) -> Dataset {
        match decoded {
            Decoded::Dataset(dataset) => dataset,
            other => panic!("expected a dataset, got {:?}", other),
        }
    }

    #[test]
    fn test_sheet_range_quotes_title() {
        assert_eq!(sheet_range("Q1"), "'Q1'!A1:ZZ");
        assert_eq!(sheet_range("it's"), "'it''s'!A1:ZZ");
    }

    #[test]
    fn test_read_by_index_trims_header_and_pads() {
        let drive = drive();
        let dataset = tabular(read(&drive, "s1", &SheetSelector::Index(0)).unwrap());
        assert_eq!(dataset.column_names(), vec!["ano", "total"]);
        assert_eq!(dataset.shape(), (2, 2));

        let total = dataset
            .column("total")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(total.value(0), "10");
        assert!(total.is_null(1));
    }

    #[test]
    fn test_read_by_name() {
        let drive = drive();
        let dataset = tabular(read(&drive, "s1", &SheetSelector::Name("Resumo".into())).unwrap());
        assert_eq!(dataset.num_rows(), 2);
    }

    #[test]
    fn test_unknown_sheet_lists_titles() {
        let drive = drive();
        match read(&drive, "s1", &SheetSelector::Name("Outra".into())).unwrap() {
            Decoded::Unusable(reason) => assert!(reason.contains("Resumo, Vazia")),
            other => panic!("expected unusable, got {:?}", other),
        }
        match read(&drive, "s1", &SheetSelector::Index(9)).unwrap() {
            Decoded::Unusable(reason) => assert!(reason.contains("0..=1")),
            other => panic!("expected unusable, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_sheet_is_unusable() {
        let drive = drive();
        assert!(matches!(
            read(&drive, "s1", &SheetSelector::Name("Vazia".into())).unwrap(),
            Decoded::Unusable(_)
        ));
    }
}
