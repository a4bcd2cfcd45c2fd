//! Breakpoint tables for the piecewise-linear sub-index interpolation.
//!
//! The reference tables reproduce the dashboard's values. Only PM2.5 follows a
//! regulatory scale: PM10 shares its table with SO2, and NO2, CO and O3 share
//! another. Load an authoritative set with [`BreakpointSet::load`] when
//! accuracy matters.
//!
//! Stored on disk as a JSON object keyed by pollutant column name:
//! ```json
//! {
//!   "PM2.5": { "concentration": [0, 12, 35.5], "iaqi": [0, 50, 100] },
//!   "CO":    { "concentration": [0, 4.4, 9.4], "iaqi": [0, 50, 100] }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::AirQualityError;
use crate::pollutant::Pollutant;

/// One `(concentration, index)` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub concentration: f64,
    pub index: f64,
}

/// Ordered boundaries for a single pollutant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BreakpointTable {
    points: Vec<Breakpoint>,
}

/// A usable interpolation segment between two adjacent boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub lo: Breakpoint,
    pub hi: Breakpoint,
}

impl Segment {
    pub fn contains(&self, concentration: f64) -> bool {
        self.lo.concentration <= concentration && concentration <= self.hi.concentration
    }

    pub fn interpolate(&self, concentration: f64) -> f64 {
        (self.hi.index - self.lo.index) / (self.hi.concentration - self.lo.concentration)
            * (concentration - self.lo.concentration)
            + self.lo.index
    }
}

impl BreakpointTable {
    pub fn new(points: Vec<Breakpoint>) -> Self {
        Self { points }
    }

    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|&(concentration, index)| Breakpoint {
                    concentration,
                    index,
                })
                .collect(),
        )
    }

    /// Segments in boundary order. Degenerate segments (`c_hi == c_lo`) are
    /// skipped, so a table with fewer than two points yields nothing.
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.points
            .windows(2)
            .map(|w| Segment { lo: w[0], hi: w[1] })
            .filter(|s| s.hi.concentration != s.lo.concentration)
    }

    pub fn min_concentration(&self) -> Option<f64> {
        self.points.first().map(|p| p.concentration)
    }

    pub fn max_concentration(&self) -> Option<f64> {
        self.points.last().map(|p| p.concentration)
    }

    /// Rejects tables that cannot be interpolated consistently.
    ///
    /// Short tables and degenerate segments pass; they only ever produce
    /// unknown sub-indices.
    pub fn validate(&self, pollutant: Pollutant) -> Result<(), AirQualityError> {
        let invalid = |reason: String| AirQualityError::InvalidBreakpoints {
            pollutant: pollutant.to_string(),
            reason,
        };

        for (i, p) in self.points.iter().enumerate() {
            if !p.concentration.is_finite() || !p.index.is_finite() {
                return Err(invalid(format!("non-finite boundary at position {i}")));
            }
        }

        for (i, w) in self.points.windows(2).enumerate() {
            if w[1].concentration < w[0].concentration {
                return Err(invalid(format!(
                    "concentration decreases from {} to {} at position {}",
                    w[0].concentration,
                    w[1].concentration,
                    i + 1
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawTable {
    concentration: Vec<f64>,
    iaqi: Vec<f64>,
}

/// One breakpoint table per tracked pollutant.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakpointSet {
    tables: [BreakpointTable; Pollutant::COUNT],
}

impl Default for BreakpointSet {
    fn default() -> Self {
        Self::reference()
    }
}

impl BreakpointSet {
    /// The dashboard's tables.
    pub fn reference() -> Self {
        const PM25: &[(f64, f64)] = &[
            (0.0, 0.0),
            (12.0, 50.0),
            (35.5, 100.0),
            (55.5, 150.0),
            (150.5, 200.0),
        ];
        const PM10_SO2: &[(f64, f64)] = &[
            (0.0, 0.0),
            (54.0, 54.0),
            (154.0, 154.0),
            (254.0, 254.0),
            (354.0, 354.0),
        ];
        const GASES: &[(f64, f64)] = &[
            (0.0, 0.0),
            (40.0, 40.0),
            (80.0, 80.0),
            (180.0, 180.0),
            (280.0, 280.0),
        ];

        Self {
            tables: [
                BreakpointTable::from_pairs(PM25),
                BreakpointTable::from_pairs(PM10_SO2),
                BreakpointTable::from_pairs(PM10_SO2),
                BreakpointTable::from_pairs(GASES),
                BreakpointTable::from_pairs(GASES),
                BreakpointTable::from_pairs(GASES),
            ],
        }
    }

    pub fn table(&self, pollutant: Pollutant) -> &BreakpointTable {
        &self.tables[pollutant.index()]
    }

    pub fn with_table(mut self, pollutant: Pollutant, table: BreakpointTable) -> Self {
        self.tables[pollutant.index()] = table;
        self
    }

    /// Validates every table, warning about ones that can never match.
    pub fn validate(&self) -> Result<(), AirQualityError> {
        for pollutant in Pollutant::ALL {
            let table = self.table(pollutant);
            table.validate(pollutant)?;
            if table.segments().next().is_none() {
                warn!(%pollutant, "Breakpoint table has no usable segment; sub-index will always be unknown");
            }
        }
        Ok(())
    }

    /// Parses a JSON breakpoint file. Pollutants absent from the file keep
    /// their reference table.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: HashMap<String, RawTable> = serde_json::from_str(content)?;
        let mut set = Self::reference();
        let mut seen = HashSet::new();

        for (name, table) in raw {
            let pollutant: Pollutant = name.parse()?;
            if !seen.insert(pollutant) {
                return Err(AirQualityError::InvalidBreakpoints {
                    pollutant: pollutant.to_string(),
                    reason: "listed more than once".to_string(),
                }
                .into());
            }
            if table.concentration.len() != table.iaqi.len() {
                return Err(AirQualityError::InvalidBreakpoints {
                    pollutant: pollutant.to_string(),
                    reason: format!(
                        "{} concentration boundaries but {} index boundaries",
                        table.concentration.len(),
                        table.iaqi.len()
                    ),
                }
                .into());
            }

            let points = table
                .concentration
                .into_iter()
                .zip(table.iaqi)
                .map(|(concentration, index)| Breakpoint {
                    concentration,
                    index,
                })
                .collect();
            debug!(%pollutant, "Breakpoint table overridden");
            set = set.with_table(pollutant, BreakpointTable::new(points));
        }

        set.validate()?;
        Ok(set)
    }

    /// Loads and validates breakpoint tables from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read breakpoint file '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("Invalid breakpoint file '{path}'"))
    }
}
