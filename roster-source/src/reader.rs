//! CSV export reading.
//!
//! Exports come as UTF-8 or UTF-16LE, with or without a byte order mark.
//! The text is decoded up front and handed to the `csv` reader in flexible
//! mode so short rows can be skipped instead of aborting the file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use roster_core::Encoding;

use crate::error::{io_err, SourceError};

const BOM: char = '\u{feff}';

/// One data row, addressed by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvRow {
    /// 1-based line of the row in the export, header included.
    pub line: u64,
    fields: HashMap<String, String>,
}

impl CsvRow {
    pub fn new(line: u64, fields: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            line,
            fields: fields.into_iter().collect(),
        }
    }

    /// Trimmed cell value; blank cells read as absent.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Rows of an export plus how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub rows: Vec<CsvRow>,
    pub skipped: usize,
}

/// Read and decode the export at `path`.
pub fn read_file(path: &Path, encoding: Encoding) -> Result<CsvTable, SourceError> {
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
    let text = decode(&bytes, encoding, path)?;
    parse(&text, path)
}

/// Decode raw bytes, dropping a leading byte order mark.
pub fn decode(bytes: &[u8], encoding: Encoding, path: &Path) -> Result<String, SourceError> {
    let text = match encoding {
        Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| SourceError::Encoding {
            path: path.to_path_buf(),
            encoding: "UTF-8",
            message: e.to_string(),
        })?,
        Encoding::Utf16le => {
            if bytes.len() % 2 != 0 {
                return Err(SourceError::Encoding {
                    path: path.to_path_buf(),
                    encoding: "UTF-16LE",
                    message: format!("odd byte length {}", bytes.len()),
                });
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).map_err(|e| SourceError::Encoding {
                path: path.to_path_buf(),
                encoding: "UTF-16LE",
                message: e.to_string(),
            })?
        }
    };
    Ok(match text.strip_prefix(BOM) {
        Some(rest) => rest.to_string(),
        None => text,
    })
}

/// Parse decoded CSV text. `path` is only used for error messages.
pub fn parse(text: &str, path: &Path) -> Result<CsvTable, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_err(path, e))?
        .iter()
        .map(|h| h.trim_start_matches(BOM).trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(SourceError::MissingHeader {
            path: path.to_path_buf(),
        });
    }

    let mut table = CsvTable::default();
    for result in reader.records() {
        let record = result.map_err(|e| csv_err(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.len() < headers.len() {
            tracing::debug!(
                "{}:{}: {} of {} columns, row skipped",
                path.display(),
                line,
                record.len(),
                headers.len()
            );
            table.skipped += 1;
            continue;
        }
        if record.iter().all(is_blank_cell) {
            table.skipped += 1;
            continue;
        }

        let fields = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.to_string()));
        table.rows.push(CsvRow::new(line, fields));
    }
    Ok(table)
}

/// Empty, or nothing but separator characters.
fn is_blank_cell(cell: &str) -> bool {
    cell.chars()
        .all(|c| c.is_whitespace() || matches!(c, ';' | ','))
}

fn csv_err(path: &Path, source: csv::Error) -> SourceError {
    SourceError::Csv {
        path: path.to_path_buf(),
        source,
    }
}
