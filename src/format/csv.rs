//! Delimited text with encoding and delimiter probing.

use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::Decoded;
use crate::dataset::Dataset;
use crate::error::Result;

/// Encodings tried, in order.
pub const ENCODINGS: [TextEncoding; 2] = [TextEncoding::Utf8, TextEncoding::Latin1];
/// Delimiters tried for each encoding, in order.
pub const DELIMITERS: [u8; 3] = [b';', b',', b'|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

impl TextEncoding {
    /// Decode `bytes`; `None` when they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<Cow<'_, str>> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
            }
            // Every byte maps to the code point of the same value.
            TextEncoding::Latin1 => Some(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

/// Try every encoding/delimiter pair and keep the first multi-column parse.
pub(crate) fn parse(bytes: &[u8]) -> Result<Decoded> {
    for encoding in ENCODINGS {
        let text = match encoding.decode(bytes) {
            Some(text) => text,
            None => {
                debug!(%encoding, "content is not valid in this encoding");
                continue;
            }
        };

        for delimiter in DELIMITERS {
            match probe(&text, delimiter) {
                Ok(Some(batch)) => {
                    debug!(
                        %encoding,
                        delimiter = %(delimiter as char),
                        columns = batch.num_columns(),
                        "delimited text accepted"
                    );
                    return Ok(Decoded::Dataset(Dataset::Tabular(batch)));
                }
                Ok(None) => {
                    debug!(%encoding, delimiter = %(delimiter as char), "single column, rejected");
                }
                Err(e) => {
                    debug!(%encoding, delimiter = %(delimiter as char), error = %e, "probe failed");
                }
            }
        }
    }

    Ok(Decoded::Unusable(
        "no encoding/delimiter combination produced more than one column".to_string(),
    ))
}

/// Parse `text` with one delimiter; `None` when it yields a single column.
///
/// Rows shorter than the header are padded with nulls; longer rows fail.
fn probe(text: &str, delimiter: u8) -> Result<Option<RecordBatch>> {
    let (schema, _) = Format::default()
        .with_delimiter(delimiter)
        .with_header(true)
        .with_truncated_rows(true)
        .infer_schema(Cursor::new(text.as_bytes()), None)?;

    if schema.fields().len() <= 1 {
        return Ok(None);
    }

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_delimiter(delimiter)
        .with_header(true)
        .with_truncated_rows(true)
        .build(Cursor::new(text.as_bytes()))?;

    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Some(concat_batches(&schema, &batches)?))
}
