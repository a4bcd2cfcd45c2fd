//! Output formatting and persistence for datasets and reports.
//!
//! Supports JSON reports, CSV export, and a text preview for logging.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::dataset::Dataset;

/// Logs a value as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes a value as pretty-printed JSON to `path`.
pub fn write_json(path: &str, value: &impl Serialize) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create '{path}'"))?;
    serde_json::to_writer_pretty(file, value)?;
    debug!(path, "JSON written");
    Ok(())
}

/// Row-major string cells of a dataset, missing cells empty.
fn rendered_rows(ds: &Dataset) -> Result<Vec<Vec<String>>> {
    let columns = ds.rendered_columns()?;
    Ok((0..ds.n_rows())
        .map(|r| columns.iter().map(|c| c[r].clone()).collect())
        .collect())
}

/// Serializes a dataset as CSV into any writer. Missing cells are empty.
pub fn write_csv<W: Write>(writer: W, ds: &Dataset) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    writer.write_record(ds.column_names())?;
    for row in rendered_rows(ds)? {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a dataset to `path` as CSV, gzip-compressed when the path ends
/// in `.gz`. Overwrites any existing file.
pub fn write_dataset(path: &str, ds: &Dataset) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create '{path}'"))?;
    let gzip = Path::new(path).extension().and_then(|e| e.to_str()) == Some("gz");

    if gzip {
        let mut encoder = GzEncoder::new(file, Compression::default());
        write_csv(&mut encoder, ds)?;
        encoder.finish()?;
    } else {
        write_csv(file, ds)?;
    }

    info!(path, rows = ds.n_rows(), cols = ds.n_cols(), gzip, "Dataset written");
    Ok(())
}

/// Renders the first `n` rows as an aligned text table for logging.
pub fn preview(ds: &Dataset, n: usize) -> Result<String> {
    let head = ds.head(n);
    let mut rows: Vec<Vec<String>> = vec![head.column_names().iter().map(|c| c.to_string()).collect()];
    rows.extend(rendered_rows(&head)?);

    let widths: Vec<usize> = (0..head.n_cols())
        .map(|c| rows.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
        .collect();

    Ok(rows
        .iter()
        .map(|r| {
            r.iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{cell:>w$}"))
                .collect::<Vec<_>>()
                .join("  ")
        })
        .collect::<Vec<_>>()
        .join("\n"))
}
