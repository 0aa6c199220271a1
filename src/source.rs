//! Reads the CSV snapshots: byte decoding, parsing and field coercion
//! into typed row batches.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use encoding_rs::{UTF_8, WINDOWS_1251};
use serde::de::DeserializeOwned;

use crate::models::{RowBatch, SourceTable};
use crate::storage::LoadError;

/// Reads and parses the source file for a table.
pub fn read_rows(path: &Path, table: SourceTable) -> Result<RowBatch, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound(path.display().to_string()));
    }
    let bytes = fs::read(path)?;
    let (text, encoding) = decode(&bytes);
    tracing::debug!(file = %path.display(), encoding, "decoded source file");

    let batch = match table {
        SourceTable::Balance => RowBatch::Balances(parse_rows(&text, path)?),
        SourceTable::Posting => RowBatch::Postings(parse_rows(&text, path)?),
        SourceTable::Account => RowBatch::Accounts(parse_rows(&text, path)?),
        SourceTable::Currency => RowBatch::Currencies(parse_rows(&text, path)?),
        SourceTable::ExchangeRate => RowBatch::ExchangeRates(parse_rows(&text, path)?),
        SourceTable::LedgerAccount => RowBatch::LedgerAccounts(parse_rows(&text, path)?),
    };
    Ok(batch)
}

/// Expected source files that are absent from the data directory.
pub fn missing_source_files(data_dir: &Path) -> Vec<PathBuf> {
    SourceTable::ALL
        .iter()
        .map(|table| data_dir.join(table.file_name()))
        .filter(|path| !path.exists())
        .collect()
}

// Snapshots arrive as UTF-8 (sometimes with a BOM), windows-1251 or UTF-16.
// BOM sniffing in the first attempt covers the UTF-16 variants. Latin-1 maps
// every byte to a scalar, so the final fallback cannot fail.
fn decode(bytes: &[u8]) -> (String, &'static str) {
    let (text, encoding, had_errors) = UTF_8.decode(bytes);
    if !had_errors {
        return (text.into_owned(), encoding.name());
    }
    let (text, _, had_errors) = WINDOWS_1251.decode(bytes);
    if !had_errors {
        return (text.into_owned(), WINDOWS_1251.name());
    }
    (encoding_rs::mem::decode_latin1(bytes).into_owned(), "latin1")
}

fn parse_rows<R>(text: &str, path: &Path) -> Result<Vec<R>, LoadError>
where
    R: DeserializeOwned,
{
    if text.trim().is_empty() {
        return Err(parse_error(path, "file is empty"));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = normalize_headers(
        reader
            .headers()
            .map_err(|e| parse_error(path, format!("header row: {e}")))?,
    );

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row_number = idx + 1;
        let record = record.map_err(|e| parse_error(path, format!("row {row_number}: {e}")))?;
        let row: R = record
            .deserialize(Some(&headers))
            .map_err(|e| parse_error(path, format!("row {row_number}: {e}")))?;
        rows.push(row);
    }
    Ok(rows)
}

// Header case and padding vary between snapshot exports.
fn normalize_headers(raw: &StringRecord) -> StringRecord {
    raw.iter().map(|name| name.trim().to_lowercase()).collect()
}

fn parse_error(path: &Path, message: impl fmt::Display) -> LoadError {
    LoadError::Parse {
        file: path.display().to_string(),
        message: message.to_string(),
    }
}
