//! Dataset profiling: structure, missing values and summary statistics.

use anyhow::Result;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::Serialize;

use crate::dataset::{DType, Dataset};

/// Per-column structure, in the spirit of a dataframe `info()`.
#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    pub column: String,
    pub dtype: DType,
    pub non_null: usize,
}

#[derive(Debug, Serialize)]
pub struct DatasetInfo {
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    pub columns: usize,
    pub schema: Vec<ColumnInfo>,
}

impl DatasetInfo {
    pub fn from_dataset(ds: &Dataset) -> Self {
        DatasetInfo {
            generated_at: Utc::now(),
            rows: ds.n_rows(),
            columns: ds.n_cols(),
            schema: ds
                .dtypes()
                .into_iter()
                .zip(ds.missing_counts())
                .map(|((column, dtype), (_, missing))| ColumnInfo {
                    column,
                    dtype,
                    non_null: ds.n_rows() - missing,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingCount {
    pub column: String,
    pub missing: usize,
    pub missing_pct: f64,
}

/// Missing-value counts for the columns that have any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingSummary {
    pub total_rows: usize,
    pub total_missing: usize,
    pub columns: Vec<MissingCount>,
}

impl MissingSummary {
    pub fn from_dataset(ds: &Dataset) -> Self {
        let total_rows = ds.n_rows();
        let columns: Vec<MissingCount> = ds
            .missing_counts()
            .into_iter()
            .filter(|(_, missing)| *missing > 0)
            .map(|(column, missing)| MissingCount {
                column,
                missing,
                missing_pct: pct(missing, total_rows),
            })
            .collect();

        MissingSummary {
            total_rows,
            total_missing: columns.iter().map(|c| c.missing).sum(),
            columns,
        }
    }

    pub fn missing_in(&self, column: &str) -> usize {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .map(|c| c.missing)
            .unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        self.columns.is_empty()
    }
}

pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// Summary statistics of one numeric column. Statistics are `None` when
/// the column has no known values (or fewer than two, for `std`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    #[serde(rename = "25%")]
    pub p25: Option<f64>,
    #[serde(rename = "50%")]
    pub p50: Option<f64>,
    #[serde(rename = "75%")]
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSummary {
    pub fn from_chunked(column: &str, values: &Float64Chunked) -> Result<Self> {
        let count = values.len() - values.null_count();

        Ok(ColumnSummary {
            column: column.to_string(),
            count,
            mean: values.mean(),
            std: if count >= 2 { values.std(1) } else { None },
            min: values.min(),
            p25: values.quantile(0.25, QuantileMethod::Linear)?,
            p50: values.quantile(0.5, QuantileMethod::Linear)?,
            p75: values.quantile(0.75, QuantileMethod::Linear)?,
            max: values.max(),
        })
    }
}

/// Summary statistics for every numeric column, in column order.
pub fn describe(ds: &Dataset) -> Result<Vec<ColumnSummary>> {
    ds.numeric_columns()
        .iter()
        .map(|name| ColumnSummary::from_chunked(name, ds.numeric(name)?))
        .collect()
}
