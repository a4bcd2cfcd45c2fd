//! Domain errors surfaced by the library.
//!
//! Library functions return [`anyhow::Result`]; these variants travel inside
//! it and can be recovered with `downcast_ref::<AirQualityError>()`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AirQualityError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Column is not numeric: {0}")]
    NotNumeric(String),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Unknown pollutant: {0}")]
    UnknownPollutant(String),

    #[error("Invalid breakpoint table for {pollutant}: {reason}")]
    InvalidBreakpoints { pollutant: String, reason: String },

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Dataset has no numeric columns")]
    NoNumericColumns,
}
