use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::analyzers::aggregate::{
    category_counts, correlations, frequent_stations, monthly_averages, station_means,
    top_stations, yearly_aqi_by_station,
};
use crate::analyzers::types::{ChartReport, CorrelationMatrix};
use crate::aqi::{AQI_COLUMN, AqiEngine};
use crate::dataset::Dataset;
use crate::error::AirQualityError;
use crate::pollutant::Pollutant;

/// Bumped whenever the JSON layout of [`ChartReport`] changes.
pub const SCHEMA_VERSION: u8 = 1;

/// Keeps a section empty when its grouping column is absent, instead of
/// failing the whole report.
fn optional<T: Default>(section: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(v) => Ok(v),
        Err(e) => match e.downcast_ref::<AirQualityError>() {
            Some(AirQualityError::MissingColumn(column)) => {
                warn!(section, column = %column, "Chart section skipped");
                Ok(T::default())
            }
            _ => Err(e),
        },
    }
}

/// Annotates `ds` with AQI columns and computes every chart series.
#[tracing::instrument(skip_all, fields(rows = ds.n_rows(), top_n = top_n))]
pub fn analyze(ds: &Dataset, engine: &AqiEngine, top_n: usize) -> Result<ChartReport> {
    let annotated = engine.annotate(ds)?;

    let pollutants: Vec<String> = Pollutant::ALL
        .iter()
        .map(|p| p.column_name().to_string())
        .collect();
    let mut with_aqi = pollutants.clone();
    with_aqi.push(AQI_COLUMN.to_string());

    let yearly_aqi = optional("yearly_aqi", yearly_aqi_by_station(&annotated))?;
    let monthly = optional("monthly_averages", monthly_averages(&annotated, &with_aqi))?;
    let means = optional("station_means", station_means(&annotated, &pollutants))?;
    let top = top_stations(&means, &pollutants, top_n);
    let frequent = frequent_stations(&top);
    let correlation: CorrelationMatrix = correlations(&annotated, &pollutants)?;
    let categories = category_counts(&annotated)?;

    info!(
        stations = means.len(),
        yearly_points = yearly_aqi.len(),
        months = monthly.len(),
        "Chart data computed"
    );

    Ok(ChartReport {
        schema_version: SCHEMA_VERSION,
        generated_at: Utc::now(),
        rows: annotated.n_rows(),
        yearly_aqi,
        monthly_averages: monthly,
        station_means: means,
        top_stations: top,
        frequent_stations: frequent,
        correlations: correlation,
        categories,
    })
}
