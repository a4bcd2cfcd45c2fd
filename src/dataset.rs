//! In-memory tabular dataset backed by a polars [`DataFrame`].
//!
//! Every column is either `Float64` (numeric) or `String` (text). Numeric
//! columns never hold NaN; it is stored as null, so a missing cell has a
//! single representation everywhere.

use anyhow::Result;
use polars::prelude::*;
use serde::Serialize;

use crate::error::AirQualityError;

/// Column storage kind, as reported by [`Dataset::dtypes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Numeric,
    Text,
}

impl DType {
    fn of(dtype: &DataType) -> Self {
        if *dtype == DataType::Float64 {
            DType::Numeric
        } else {
            DType::Text
        }
    }
}

/// Builds a numeric column; NaN cells become missing.
pub fn numeric_column(name: &str, values: &[Option<f64>]) -> Column {
    let values: Vec<Option<f64>> = values
        .iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect();
    Series::new(name.into(), values).into()
}

pub fn text_column<S: AsRef<str>>(name: &str, values: &[Option<S>]) -> Column {
    let values: Vec<Option<&str>> = values.iter().map(|v| v.as_ref().map(AsRef::as_ref)).collect();
    Series::new(name.into(), values).into()
}

/// Cells of a text column that all read as floats, or `None` if any does not.
fn parse_floats(cells: &StringChunked) -> Option<Vec<Option<f64>>> {
    cells
        .into_iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => s.trim().parse::<f64>().ok().map(Some),
        })
        .collect()
}

/// Coerces a column to `Float64` when every value is numeric, else `String`.
fn normalize(column: &Column) -> PolarsResult<Column> {
    let name = column.name().to_string();
    let dtype = column.dtype();

    let values = if dtype.is_float() || dtype.is_integer() {
        let cast = column.cast(&DataType::Float64)?;
        Some(cast.as_materialized_series().f64()?.into_iter().collect())
    } else if matches!(dtype, DataType::String | DataType::Null) {
        let cast = column.cast(&DataType::String)?;
        parse_floats(cast.as_materialized_series().str()?)
    } else {
        None
    };

    match values {
        Some(values) => Ok(numeric_column(&name, &values)),
        None => column.cast(&DataType::String),
    }
}

fn render(column: &Column) -> Result<Vec<String>> {
    let series = column.as_materialized_series();
    let cells = if *series.dtype() == DataType::Float64 {
        series
            .f64()?
            .into_iter()
            .map(|v| v.map(|x| x.to_string()).unwrap_or_default())
            .collect()
    } else {
        let text = series.cast(&DataType::String)?;
        text.str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect()
    };
    Ok(cells)
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    df: DataFrame,
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.df.get_column_names() == other.df.get_column_names()
            && self.df.equals_missing(&other.df)
    }
}

impl Dataset {
    /// Wraps a frame, coercing every column to `Float64` or `String`.
    pub fn new(df: DataFrame) -> Result<Self> {
        let columns = df
            .get_columns()
            .iter()
            .map(normalize)
            .collect::<PolarsResult<Vec<_>>>()?;
        Ok(Self {
            df: DataFrame::new(columns)?,
        })
    }

    /// Builds a dataset, rejecting duplicate names and columns of differing
    /// length.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        Self::new(DataFrame::new(columns)?)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn n_rows(&self) -> usize {
        self.df.height()
    }

    pub fn n_cols(&self) -> usize {
        self.df.width()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.df.shape()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.df.get_column_names_str()
    }

    pub fn dtypes(&self) -> Vec<(String, DType)> {
        self.df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), DType::of(c.dtype())))
            .collect()
    }

    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.df.column(name).ok().map(|c| DType::of(c.dtype()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.df.column(name).is_ok()
    }

    /// Null count of every column, in column order.
    pub fn missing_counts(&self) -> Vec<(String, usize)> {
        self.df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.null_count()))
            .collect()
    }

    /// Looks up a column that must exist and be numeric.
    pub fn numeric(&self, name: &str) -> Result<&Float64Chunked, AirQualityError> {
        let column = self
            .df
            .column(name)
            .map_err(|_| AirQualityError::MissingColumn(name.to_string()))?;
        column
            .as_materialized_series()
            .f64()
            .map_err(|_| AirQualityError::NotNumeric(name.to_string()))
    }

    /// Values of a numeric column, in row order.
    pub fn values(&self, name: &str) -> Result<Vec<Option<f64>>, AirQualityError> {
        Ok(self.numeric(name)?.into_iter().collect())
    }

    /// Any column read as text; numbers are rendered by polars.
    pub fn text(&self, name: &str) -> Result<Vec<Option<String>>> {
        let column = self
            .df
            .column(name)
            .map_err(|_| AirQualityError::MissingColumn(name.to_string()))?;
        let cast = column.cast(&DataType::String)?;
        Ok(cast
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect())
    }

    /// Names of all numeric columns, in order.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.dtypes()
            .into_iter()
            .filter(|(_, dtype)| *dtype == DType::Numeric)
            .map(|(name, _)| name)
            .collect()
    }

    /// Adds a numeric column at the end, or replaces an existing one in place.
    pub fn with_numeric(&mut self, name: &str, values: &[Option<f64>]) -> Result<()> {
        self.insert(numeric_column(name, values))
    }

    pub fn with_text<S: AsRef<str>>(&mut self, name: &str, values: &[Option<S>]) -> Result<()> {
        self.insert(text_column(name, values))
    }

    fn insert(&mut self, column: Column) -> Result<()> {
        if self.n_cols() > 0 && column.len() != self.n_rows() {
            return Err(AirQualityError::RaggedColumn {
                column: column.name().to_string(),
                expected: self.n_rows(),
                actual: column.len(),
            }
            .into());
        }
        self.df.with_column(column)?;
        Ok(())
    }

    /// Returns a copy without the named columns. Unknown names are an error.
    pub fn drop_columns(&self, names: &[String]) -> Result<Dataset> {
        if let Some(unknown) = names.iter().find(|n| !self.has_column(n)) {
            return Err(AirQualityError::UnknownColumn(unknown.clone()).into());
        }

        let kept: Vec<&str> = self
            .column_names()
            .into_iter()
            .filter(|n| !names.iter().any(|d| d.as_str() == *n))
            .collect();
        Ok(Dataset {
            df: self.df.select(kept)?,
        })
    }

    /// Returns a copy without the rows that have any missing cell.
    pub fn drop_incomplete_rows(&self) -> Result<Dataset> {
        Ok(Dataset {
            df: self.df.clone().lazy().drop_nulls(None).collect()?,
        })
    }

    pub fn head(&self, n: usize) -> Dataset {
        Dataset {
            df: self.df.head(Some(n)),
        }
    }

    /// Every column rendered as strings, missing cells empty.
    pub fn rendered_columns(&self) -> Result<Vec<Vec<String>>> {
        self.df.get_columns().iter().map(render).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_columns(vec![
            numeric_column("PM2.5", &[Some(10.0), None, Some(30.0)]),
            text_column("station", &[Some("Dongsi"), Some("Dongsi"), None]),
        ])
        .unwrap()
    }

    #[test]
    fn test_shape_and_dtypes() {
        let ds = sample();
        assert_eq!(ds.shape(), (3, 2));
        assert_eq!(
            ds.dtypes(),
            vec![
                ("PM2.5".to_string(), DType::Numeric),
                ("station".to_string(), DType::Text)
            ]
        );
        assert_eq!(ds.dtype("station"), Some(DType::Text));
        assert_eq!(ds.dtype("O3"), None);
    }

    #[test]
    fn test_integer_columns_become_numeric() {
        let df = DataFrame::new(vec![Series::new("year".into(), [2013i64, 2014]).into()]).unwrap();
        let ds = Dataset::new(df).unwrap();
        assert_eq!(ds.values("year").unwrap(), vec![Some(2013.0), Some(2014.0)]);
    }

    #[test]
    fn test_numeric_text_is_converted() {
        let ds = Dataset::from_columns(vec![text_column("CO", &[Some("300"), None, Some(" 7.5")])])
            .unwrap();
        assert_eq!(ds.values("CO").unwrap(), vec![Some(300.0), None, Some(7.5)]);
    }

    #[test]
    fn test_nan_is_missing() {
        let ds = Dataset::from_columns(vec![
            numeric_column("O3", &[Some(f64::NAN), Some(1.0)]),
            text_column("NO2", &[Some("-nan"), Some("NAN")]),
        ])
        .unwrap();
        assert_eq!(ds.values("O3").unwrap(), vec![None, Some(1.0)]);
        assert_eq!(ds.values("NO2").unwrap(), vec![None, None]);
        assert_eq!(ds.missing_counts()[1], ("NO2".to_string(), 2));
    }

    #[test]
    fn test_ragged_column_rejected() {
        let mut ds = sample();
        let err = ds.with_numeric("CO", &[Some(1.0)]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AirQualityError>(),
            Some(AirQualityError::RaggedColumn { expected: 3, actual: 1, .. })
        ));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut ds = sample();
        ds.with_numeric("PM2.5", &[Some(1.0); 3]).unwrap();
        assert_eq!(ds.column_names(), ["PM2.5", "station"]);
        assert_eq!(ds.values("PM2.5").unwrap()[1], Some(1.0));
    }

    #[test]
    fn test_numeric_lookup_errors() {
        let ds = sample();
        assert_eq!(
            ds.numeric("station").unwrap_err(),
            AirQualityError::NotNumeric("station".to_string())
        );
        assert_eq!(
            ds.numeric("O3").unwrap_err(),
            AirQualityError::MissingColumn("O3".to_string())
        );
    }

    #[test]
    fn test_drop_columns() {
        let ds = sample();
        let dropped = ds.drop_columns(&["station".to_string()]).unwrap();
        assert_eq!(dropped.column_names(), ["PM2.5"]);
        assert!(ds.drop_columns(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_drop_incomplete_rows_and_head() {
        let ds = sample();
        let kept = ds.drop_incomplete_rows().unwrap();
        assert_eq!(kept.n_rows(), 1);
        assert_eq!(kept.values("PM2.5").unwrap(), vec![Some(10.0)]);
        assert_eq!(ds.head(1).n_rows(), 1);
        assert_eq!(ds.head(10).n_rows(), 3);
    }

    #[test]
    fn test_rendered_missing_as_empty() {
        let columns = sample().rendered_columns().unwrap();
        assert_eq!(columns[0], vec!["10", "", "30"]);
        assert_eq!(columns[1], vec!["Dongsi", "Dongsi", ""]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = Dataset::from_columns(vec![
            numeric_column("PM2.5", &[Some(1.0)]),
            numeric_column("PM2.5", &[Some(2.0)]),
        ]);
        assert!(result.is_err());
    }
}
