//! Chart data for the air-quality dashboard.
//!
//! This module annotates a dataset with AQI columns and reduces it to the
//! series each chart draws: AQI per station and year, monthly averages,
//! per-station means and rankings, pollutant correlations and the AQI
//! category distribution. Rendering is left to the consumer of the JSON.

pub mod aggregate;
pub mod analyzer;
pub mod types;
pub mod utility;
