//! Data types used by the chart-data pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::aqi::AqiCategory;

/// Mean AQI of one station in one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationYearAqi {
    pub station: String,
    pub year: i32,
    pub aqi: f64,
    pub samples: usize,
}

/// Mean of each requested column for one calendar month (1..=12).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAverage {
    pub month: u32,
    pub values: BTreeMap<String, Option<f64>>,
}

/// Mean of each requested column at one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMean {
    pub station: String,
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStation {
    pub station: String,
    pub mean: f64,
}

/// Highest-mean stations for one pollutant, worst first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollutantRanking {
    pub pollutant: String,
    pub stations: Vec<RankedStation>,
}

/// How many pollutant rankings a station appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationFrequency {
    pub station: String,
    pub appearances: usize,
}

/// Pairwise Pearson correlations; `values[i][j]` pairs `columns[i]` and
/// `columns[j]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub category: AqiCategory,
    pub count: usize,
    pub pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Scatter,
    Line,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct XyPoint {
    pub x: f64,
    pub y: f64,
}

/// Points for an ad-hoc chart of one numeric column against another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XySeries {
    pub kind: ChartKind,
    pub x_column: String,
    pub y_column: String,
    pub points: Vec<XyPoint>,
}

/// Every chart series the dashboard draws, exported as one JSON document.
#[derive(Debug, Serialize)]
pub struct ChartReport {
    pub schema_version: u8,
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    pub yearly_aqi: Vec<StationYearAqi>,
    pub monthly_averages: Vec<MonthlyAverage>,
    pub station_means: Vec<StationMean>,
    pub top_stations: Vec<PollutantRanking>,
    pub frequent_stations: Vec<StationFrequency>,
    pub correlations: CorrelationMatrix,
    pub categories: Vec<CategoryCount>,
}
