//! CSV parser for merged air-quality datasets.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use flate2::read::GzDecoder;
use polars::prelude::*;
use std::collections::HashSet;
use std::io::{Cursor, Read};
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::AirQualityError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Cell values treated as missing, in addition to the empty string.
const MISSING_TOKENS: &[&str] = &["NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

/// Decodes a CSV dataset from raw bytes, transparently gunzipping input
/// that starts with the gzip magic number.
///
/// A column is numeric when every non-missing cell parses as `f64`, and
/// text otherwise. Cells that parse to NaN in any spelling (`-nan`, `NAN`)
/// are missing.
///
/// # Errors
///
/// Returns an error if the bytes are not valid gzip, if two headers share a
/// name after trimming, or if the CSV is malformed.
pub fn parse_dataset(bytes: &[u8]) -> Result<Dataset> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut decoded)
            .context("Failed to decompress gzip input")?;
        debug!(compressed = bytes.len(), decoded = decoded.len(), "Gzip input decoded");
        return parse_csv(decoded);
    }
    parse_csv(bytes.to_vec())
}

/// Trimmed header names, rejecting duplicates.
fn read_headers(bytes: &[u8]) -> Result<Vec<String>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(bytes);
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    let mut seen = HashSet::new();
    for name in &headers {
        if !seen.insert(name.as_str()) {
            return Err(AirQualityError::DuplicateColumn(name.clone()).into());
        }
    }
    Ok(headers)
}

fn parse_csv(bytes: Vec<u8>) -> Result<Dataset> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Dataset::default());
    }
    let headers = read_headers(&bytes)?;

    let null_values = std::iter::once("")
        .chain(MISSING_TOKENS.iter().copied())
        .map(PlSmallStr::from)
        .collect();
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(
            CsvParseOptions::default().with_null_values(Some(NullValues::AllColumns(null_values))),
        )
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .context("Malformed CSV input")?;
    df.set_column_names(headers.as_slice())?;

    let ds = Dataset::new(df)?;
    debug!(rows = ds.n_rows(), cols = ds.n_cols(), "CSV parsed");
    Ok(ds)
}
