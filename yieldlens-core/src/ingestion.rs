//! Tabular ingestion.
//!
//! Converts an uploaded file into the canonical comma-separated string that
//! every model request of a session reuses. CSV text is re-emitted through
//! the `csv` crate; spreadsheets are read with `calamine` (first worksheet).

use crate::error::IngestError;
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Upload formats recognized by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularFormat {
    Csv,
    Spreadsheet,
}

impl TabularFormat {
    /// Classify a file by its extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Result<Self, IngestError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(TabularFormat::Csv),
            Some("xlsx" | "xls" | "xlsb" | "ods") => Ok(TabularFormat::Spreadsheet),
            _ => Err(IngestError::UnsupportedInput {
                file_name: file_name.to_string(),
            }),
        }
    }
}

/// Convert an uploaded file into canonical CSV text.
pub fn to_canonical_csv(file_name: &str, bytes: &[u8]) -> Result<String, IngestError> {
    let format = TabularFormat::from_file_name(file_name)?;
    let rows = match format {
        TabularFormat::Csv => read_csv_rows(bytes)?,
        TabularFormat::Spreadsheet => read_spreadsheet_rows(bytes)?,
    };
    if rows.is_empty() {
        return Err(IngestError::EmptyTable);
    }

    let canonical = write_rows(&rows)?;
    info!(
        file_name,
        ?format,
        rows = rows.len(),
        bytes = canonical.len(),
        "Converted upload to canonical CSV"
    );
    Ok(canonical)
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, IngestError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| IngestError::Encoding {
        message: e.to_string(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

fn read_spreadsheet_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        IngestError::Spreadsheet {
            message: e.to_string(),
        }
    })?;

    let sheet_name = workbook.sheet_names().first().cloned().unwrap_or_default();
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::Spreadsheet {
            message: "workbook has no worksheets".to_string(),
        })?
        .map_err(|e| IngestError::Spreadsheet {
            message: e.to_string(),
        })?;
    debug!(sheet = sheet_name.as_str(), size = ?range.get_size(), "Reading first worksheet");

    Ok(range
        .rows()
        .filter(|row| row.iter().any(|cell| !matches!(cell, Data::Empty)))
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Render one spreadsheet cell as CSV field text.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        other => other.to_string(),
    }
}

fn write_rows(rows: &[Vec<String>]) -> Result<String, IngestError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row)?;
    }
    let buf = writer.into_inner().map_err(|e| IngestError::Encoding {
        message: e.to_string(),
    })?;
    let text = String::from_utf8(buf).map_err(|e| IngestError::Encoding {
        message: e.to_string(),
    })?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}
