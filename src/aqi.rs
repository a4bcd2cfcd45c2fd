//! Air Quality Index computation.
//!
//! Each tracked pollutant's concentration is mapped to a sub-index by
//! piecewise-linear interpolation against its [`BreakpointTable`]. The
//! composite AQI of an observation is the worst (largest) known sub-index,
//! and its category follows fixed thresholds.
//!
//! Every degeneracy (missing value, concentration outside the table, table
//! without a usable segment) yields an unknown sub-index instead of an error.

use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, trace};

use crate::breakpoints::{BreakpointSet, BreakpointTable};
use crate::dataset::Dataset;
use crate::pollutant::Pollutant;

/// Name of the composite index column.
pub const AQI_COLUMN: &str = "AQI";
/// Name of the composite category column.
pub const CATEGORY_COLUMN: &str = "AQI_Category";

/// Severity label for a composite index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AqiCategory {
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Moderate")]
    Moderate,
    #[serde(rename = "Unhealthy for Sensitive Groups")]
    UnhealthyForSensitiveGroups,
    #[serde(rename = "Unhealthy")]
    Unhealthy,
    #[serde(rename = "Very Unhealthy")]
    VeryUnhealthy,
    #[serde(rename = "Hazardous")]
    Hazardous,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl AqiCategory {
    pub const ALL: [AqiCategory; 7] = [
        AqiCategory::Good,
        AqiCategory::Moderate,
        AqiCategory::UnhealthyForSensitiveGroups,
        AqiCategory::Unhealthy,
        AqiCategory::VeryUnhealthy,
        AqiCategory::Hazardous,
        AqiCategory::Unknown,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
            AqiCategory::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AqiCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AqiCategory::ALL
            .into_iter()
            .find(|c| c.label() == s)
            .ok_or_else(|| format!("unknown AQI category '{s}'"))
    }
}

/// Maps a composite index to its category.
///
/// | Index       | Category                       |
/// |-------------|--------------------------------|
/// | unknown/NaN | Unknown                        |
/// | <= 50       | Good                           |
/// | <= 100      | Moderate                       |
/// | <= 150      | Unhealthy for Sensitive Groups |
/// | <= 200      | Unhealthy                      |
/// | <= 300      | Very Unhealthy                 |
/// | > 300       | Hazardous                      |
pub fn categorize(index: Option<f64>) -> AqiCategory {
    match index {
        None => AqiCategory::Unknown,
        Some(v) if v.is_nan() => AqiCategory::Unknown,
        Some(v) if v <= 50.0 => AqiCategory::Good,
        Some(v) if v <= 100.0 => AqiCategory::Moderate,
        Some(v) if v <= 150.0 => AqiCategory::UnhealthyForSensitiveGroups,
        Some(v) if v <= 200.0 => AqiCategory::Unhealthy,
        Some(v) if v <= 300.0 => AqiCategory::VeryUnhealthy,
        Some(_) => AqiCategory::Hazardous,
    }
}

/// Sub-index of one concentration, or `None` when unknown.
///
/// Segments are inclusive on both ends and scanned in boundary order, so a
/// concentration on a shared boundary uses the lower segment. The
/// interpolated value is rounded half-to-even.
pub fn compute_subindex(
    pollutant: Pollutant,
    concentration: Option<f64>,
    table: &BreakpointTable,
) -> Option<i64> {
    let c = concentration.filter(|c| !c.is_nan())?;

    let Some(segment) = table.segments().find(|s| s.contains(c)) else {
        trace!(%pollutant, concentration = c, "No enclosing breakpoint segment");
        return None;
    };

    Some(segment.interpolate(c).round_ties_even() as i64)
}

/// Concentrations of the tracked pollutants for one row.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Observation {
    concentrations: [Option<f64>; Pollutant::COUNT],
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pollutant: Pollutant, concentration: Option<f64>) -> Self {
        self.concentrations[pollutant.index()] = concentration;
        self
    }

    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        self.concentrations[pollutant.index()]
    }
}

/// Derived fields for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AqiReading {
    subindices: [Option<i64>; Pollutant::COUNT],
    pub aqi: Option<i64>,
    pub category: AqiCategory,
}

impl AqiReading {
    pub fn subindex(&self, pollutant: Pollutant) -> Option<i64> {
        self.subindices[pollutant.index()]
    }

    /// The pollutant whose sub-index set the composite, first in column
    /// order on ties.
    pub fn dominant(&self) -> Option<Pollutant> {
        let aqi = self.aqi?;
        Pollutant::ALL
            .into_iter()
            .find(|p| self.subindex(*p) == Some(aqi))
    }
}

/// Computes every sub-index, the composite AQI and its category.
pub fn compute_aqi(observation: &Observation, tables: &BreakpointSet) -> AqiReading {
    let mut subindices = [None; Pollutant::COUNT];
    for pollutant in Pollutant::ALL {
        subindices[pollutant.index()] =
            compute_subindex(pollutant, observation.get(pollutant), tables.table(pollutant));
    }

    let aqi = subindices.iter().flatten().copied().max();

    AqiReading {
        subindices,
        aqi,
        category: categorize(aqi.map(|v| v as f64)),
    }
}

/// Applies [`compute_aqi`] to whole datasets with a validated set of tables.
#[derive(Debug, Clone)]
pub struct AqiEngine {
    tables: BreakpointSet,
}

impl Default for AqiEngine {
    fn default() -> Self {
        Self {
            tables: BreakpointSet::reference(),
        }
    }
}

impl AqiEngine {
    /// Validates `tables` once; every later computation reuses them.
    pub fn new(tables: BreakpointSet) -> Result<Self> {
        tables.validate()?;
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &BreakpointSet {
        &self.tables
    }

    pub fn compute(&self, observation: &Observation) -> AqiReading {
        compute_aqi(observation, &self.tables)
    }

    /// Reads the tracked pollutant columns into per-row observations.
    ///
    /// # Errors
    ///
    /// Fails if any pollutant column is absent or not numeric.
    pub fn observations(&self, dataset: &Dataset) -> Result<Vec<Observation>> {
        let mut columns = Vec::with_capacity(Pollutant::COUNT);
        for pollutant in Pollutant::ALL {
            columns.push((pollutant, dataset.values(pollutant.column_name())?));
        }

        Ok((0..dataset.n_rows())
            .map(|row| {
                columns
                    .iter()
                    .fold(Observation::new(), |obs, (p, col)| obs.with(*p, col[row]))
            })
            .collect())
    }

    /// Computes one reading per row, in row order.
    pub fn readings(&self, dataset: &Dataset) -> Result<Vec<AqiReading>> {
        let observations = self.observations(dataset)?;
        Ok(observations.par_iter().map(|obs| self.compute(obs)).collect())
    }

    /// Returns a copy of `dataset` with the sub-index, AQI and category
    /// columns added, replacing any left by a previous run.
    #[tracing::instrument(skip_all, fields(rows = dataset.n_rows()))]
    pub fn annotate(&self, dataset: &Dataset) -> Result<Dataset> {
        let readings = self.readings(dataset)?;
        let mut out = dataset.clone();

        for pollutant in Pollutant::ALL {
            let values: Vec<Option<f64>> = readings
                .iter()
                .map(|r| r.subindex(pollutant).map(|v| v as f64))
                .collect();
            out.with_numeric(&pollutant.subindex_column(), &values)?;
        }

        let aqi: Vec<Option<f64>> = readings.iter().map(|r| r.aqi.map(|v| v as f64)).collect();
        out.with_numeric(AQI_COLUMN, &aqi)?;
        let labels: Vec<Option<&str>> = readings.iter().map(|r| Some(r.category.label())).collect();
        out.with_text(CATEGORY_COLUMN, &labels)?;

        let unknown = readings.iter().filter(|r| r.aqi.is_none()).count();
        if unknown > 0 {
            debug!(unknown, "Rows with no known sub-index");
        }
        info!(rows = readings.len(), unknown, "AQI computed");

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::numeric_column;
    use crate::error::AirQualityError;

    fn pm25() -> BreakpointTable {
        BreakpointSet::reference().table(Pollutant::Pm25).clone()
    }

    #[test]
    fn test_subindex_lower_boundary() {
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(12.0), &pm25()), Some(50));
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(0.0), &pm25()), Some(0));
    }

    #[test]
    fn test_subindex_upper_boundary() {
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(35.5), &pm25()), Some(100));
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(150.5), &pm25()), Some(200));
    }

    #[test]
    fn test_subindex_midpoint() {
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(23.75), &pm25()), Some(75));
    }

    #[test]
    fn test_subindex_rounds_half_to_even() {
        // Identity segment: the interpolated value equals the concentration.
        let table = BreakpointTable::from_pairs(&[(0.0, 0.0), (100.0, 100.0)]);
        assert_eq!(compute_subindex(Pollutant::Co, Some(2.5), &table), Some(2));
        assert_eq!(compute_subindex(Pollutant::Co, Some(3.5), &table), Some(4));
        assert_eq!(compute_subindex(Pollutant::Co, Some(3.49), &table), Some(3));
    }

    #[test]
    fn test_subindex_missing_is_unknown() {
        assert_eq!(compute_subindex(Pollutant::Pm25, None, &pm25()), None);
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(f64::NAN), &pm25()), None);
    }

    #[test]
    fn test_subindex_out_of_range_is_unknown() {
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(999.0), &pm25()), None);
        assert_eq!(compute_subindex(Pollutant::Pm25, Some(-1.0), &pm25()), None);
    }

    #[test]
    fn test_subindex_shared_boundary_uses_first_segment() {
        // Discontinuous index at c = 10: lower segment ends at 50, upper starts at 60.
        let table = BreakpointTable::from_pairs(&[(0.0, 0.0), (10.0, 50.0), (10.0, 60.0), (20.0, 100.0)]);
        assert_eq!(compute_subindex(Pollutant::O3, Some(10.0), &table), Some(50));
    }

    #[test]
    fn test_subindex_short_table_is_unknown() {
        let table = BreakpointTable::from_pairs(&[(0.0, 0.0)]);
        assert_eq!(compute_subindex(Pollutant::So2, Some(0.0), &table), None);
        assert_eq!(compute_subindex(Pollutant::So2, Some(0.0), &BreakpointTable::default()), None);
    }

    #[test]
    fn test_categorize_boundaries() {
        assert_eq!(categorize(None), AqiCategory::Unknown);
        assert_eq!(categorize(Some(f64::NAN)), AqiCategory::Unknown);
        assert_eq!(categorize(Some(0.0)), AqiCategory::Good);
        assert_eq!(categorize(Some(50.0)), AqiCategory::Good);
        assert_eq!(categorize(Some(50.5)), AqiCategory::Moderate);
        assert_eq!(categorize(Some(100.0)), AqiCategory::Moderate);
        assert_eq!(categorize(Some(150.0)), AqiCategory::UnhealthyForSensitiveGroups);
        assert_eq!(categorize(Some(200.0)), AqiCategory::Unhealthy);
        assert_eq!(categorize(Some(300.0)), AqiCategory::VeryUnhealthy);
        assert_eq!(categorize(Some(300.1)), AqiCategory::Hazardous);
        assert_eq!(categorize(Some(-5.0)), AqiCategory::Good);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(
            AqiCategory::UnhealthyForSensitiveGroups.to_string(),
            "Unhealthy for Sensitive Groups"
        );
        assert_eq!(
            serde_json::to_string(&AqiCategory::VeryUnhealthy).unwrap(),
            "\"Very Unhealthy\""
        );
    }

    #[test]
    fn test_composite_is_max_of_known() {
        // PM2.5 23.75 -> 75, PM10 40 -> 40, rest missing.
        let obs = Observation::new()
            .with(Pollutant::Pm25, Some(23.75))
            .with(Pollutant::Pm10, Some(40.0));
        let reading = compute_aqi(&obs, &BreakpointSet::reference());

        assert_eq!(reading.subindex(Pollutant::Pm25), Some(75));
        assert_eq!(reading.subindex(Pollutant::Pm10), Some(40));
        assert_eq!(reading.subindex(Pollutant::Co), None);
        assert_eq!(reading.aqi, Some(75));
        assert_eq!(reading.category, AqiCategory::Moderate);
        assert_eq!(reading.dominant(), Some(Pollutant::Pm25));
    }

    #[test]
    fn test_all_missing_is_unknown() {
        let reading = compute_aqi(&Observation::new(), &BreakpointSet::reference());
        assert_eq!(reading.aqi, None);
        assert_eq!(reading.category, AqiCategory::Unknown);
        assert_eq!(reading.dominant(), None);
    }

    #[test]
    fn test_out_of_range_pollutant_is_ignored_in_composite() {
        let obs = Observation::new()
            .with(Pollutant::Pm25, Some(999.0))
            .with(Pollutant::No2, Some(60.0));
        let reading = compute_aqi(&obs, &BreakpointSet::reference());
        assert_eq!(reading.aqi, Some(60));
    }

    fn dataset(pm25: Vec<Option<f64>>) -> Dataset {
        let n = pm25.len();
        let mut columns = vec![numeric_column("PM2.5", &pm25)];
        for p in &Pollutant::ALL[1..] {
            columns.push(numeric_column(p.column_name(), &vec![None; n]));
        }
        Dataset::from_columns(columns).unwrap()
    }

    #[test]
    fn test_annotate_adds_columns() {
        let ds = dataset(vec![Some(12.0), None, Some(999.0)]);
        let out = AqiEngine::default().annotate(&ds).unwrap();

        assert_eq!(out.n_cols(), ds.n_cols() + Pollutant::COUNT + 2);
        assert_eq!(out.values("PM2.5_IAQI").unwrap(), vec![Some(50.0), None, None]);
        assert_eq!(out.values(AQI_COLUMN).unwrap(), vec![Some(50.0), None, None]);
        assert_eq!(
            out.text(CATEGORY_COLUMN).unwrap(),
            vec![
                Some("Good".to_string()),
                Some("Unknown".to_string()),
                Some("Unknown".to_string())
            ]
        );
    }

    #[test]
    fn test_annotate_is_idempotent() {
        let ds = dataset(vec![Some(12.0), Some(40.0), None]);
        let engine = AqiEngine::default();
        let once = engine.annotate(&ds).unwrap();
        let twice = engine.annotate(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_row_order_independent() {
        let engine = AqiEngine::default();
        let values = vec![Some(5.0), Some(60.0), None, Some(140.0)];
        let forward = engine.readings(&dataset(values.clone())).unwrap();
        let reversed: Vec<_> = values.into_iter().rev().collect();
        let mut backward = engine.readings(&dataset(reversed)).unwrap();
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_annotate_requires_pollutant_columns() {
        let ds = Dataset::from_columns(vec![numeric_column("PM2.5", &[Some(1.0)])]).unwrap();
        let err = AqiEngine::default().annotate(&ds).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AirQualityError>(),
            Some(&AirQualityError::MissingColumn("PM10".to_string()))
        );
    }

    #[test]
    fn test_engine_rejects_invalid_tables() {
        let tables = BreakpointSet::reference().with_table(
            Pollutant::Co,
            BreakpointTable::from_pairs(&[(10.0, 0.0), (0.0, 50.0)]),
        );
        assert!(AqiEngine::new(tables).is_err());
    }
}
