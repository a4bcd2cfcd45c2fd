//! Missing-value handling.
//!
//! Strategies mirror the choices offered by the dashboard: drop incomplete
//! rows, drop named columns, fill numeric columns with a per-column
//! statistic, or KNN imputation over the numeric columns.

mod knn;

pub use knn::{KnnImputer, nan_euclidean};

use anyhow::Result;
use ndarray::Array2;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::analyzers::utility::mode;
use crate::dataset::Dataset;
use crate::error::AirQualityError;
use crate::stats::MissingSummary;

/// Per-column statistic used by [`ImputeStrategy::Fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FillMethod {
    Mean,
    Median,
    Mode,
}

impl FillMethod {
    fn statistic(self, values: &Float64Chunked) -> Option<f64> {
        match self {
            FillMethod::Mean => values.mean(),
            FillMethod::Median => values.median(),
            FillMethod::Mode => mode(&values.into_iter().flatten().collect::<Vec<_>>()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImputeStrategy {
    NoAction,
    DropRows,
    DropColumns(Vec<String>),
    Fill(FillMethod),
    Knn { n_neighbors: usize },
}

impl fmt::Display for ImputeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputeStrategy::NoAction => write!(f, "no action"),
            ImputeStrategy::DropRows => write!(f, "drop rows"),
            ImputeStrategy::DropColumns(cols) => write!(f, "drop columns {}", cols.join(",")),
            ImputeStrategy::Fill(method) => write!(f, "fill with {method:?}"),
            ImputeStrategy::Knn { n_neighbors } => write!(f, "KNN imputation (k={n_neighbors})"),
        }
    }
}

/// Missing counts before and after a strategy was applied.
#[derive(Debug, Serialize)]
pub struct ImputeReport {
    pub strategy: String,
    pub rows_before: usize,
    pub rows_after: usize,
    pub before: MissingSummary,
    pub after: MissingSummary,
}

/// Applies `strategy` and returns the new dataset with a before/after report.
#[tracing::instrument(skip_all, fields(strategy = %strategy, rows = ds.n_rows()))]
pub fn impute(ds: &Dataset, strategy: &ImputeStrategy) -> Result<(Dataset, ImputeReport)> {
    let out = match strategy {
        ImputeStrategy::NoAction => ds.clone(),
        ImputeStrategy::DropRows => ds.drop_incomplete_rows()?,
        ImputeStrategy::DropColumns(cols) => ds.drop_columns(cols)?,
        ImputeStrategy::Fill(method) => fill_numeric(ds, *method)?,
        ImputeStrategy::Knn { n_neighbors } => knn_numeric(ds, &KnnImputer::new(*n_neighbors))?,
    };

    let report = ImputeReport {
        strategy: strategy.to_string(),
        rows_before: ds.n_rows(),
        rows_after: out.n_rows(),
        before: MissingSummary::from_dataset(ds),
        after: MissingSummary::from_dataset(&out),
    };
    info!(
        rows_before = report.rows_before,
        rows_after = report.rows_after,
        missing_before = report.before.total_missing,
        missing_after = report.after.total_missing,
        "Missing values handled"
    );

    Ok((out, report))
}

fn fill_numeric(ds: &Dataset, method: FillMethod) -> Result<Dataset> {
    let mut out = ds.clone();
    for name in ds.numeric_columns() {
        let values = ds.numeric(&name)?;
        let Some(fill) = method.statistic(values) else {
            warn!(column = %name, "Column has no observed values; left unfilled");
            continue;
        };
        let filled: Vec<Option<f64>> = values.into_iter().map(|v| Some(v.unwrap_or(fill))).collect();
        out.with_numeric(&name, &filled)?;
    }
    Ok(out)
}

fn knn_numeric(ds: &Dataset, imputer: &KnnImputer) -> Result<Dataset> {
    let names = ds.numeric_columns();
    if names.is_empty() {
        return Err(AirQualityError::NoNumericColumns.into());
    }

    let mut data = Array2::from_elem((ds.n_rows(), names.len()), f64::NAN);
    for (c, name) in names.iter().enumerate() {
        for (r, value) in ds.numeric(name)?.into_iter().enumerate() {
            if let Some(value) = value {
                data[[r, c]] = value;
            }
        }
    }
    imputer.fill(&mut data);

    let mut out = ds.clone();
    for (name, column) in names.iter().zip(data.columns()) {
        let values: Vec<Option<f64>> = column.iter().map(|v| (!v.is_nan()).then_some(*v)).collect();
        out.with_numeric(name, &values)?;
    }
    Ok(out)
}
