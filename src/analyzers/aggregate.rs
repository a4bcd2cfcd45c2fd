use anyhow::Result;
use polars::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::analyzers::types::{
    CategoryCount, ChartKind, CorrelationMatrix, MonthlyAverage, PollutantRanking,
    RankedStation, StationFrequency, StationMean, StationYearAqi, XyPoint, XySeries,
};
use crate::analyzers::utility::pearson;
use crate::aqi::{AQI_COLUMN, AqiCategory, CATEGORY_COLUMN};
use crate::dataset::Dataset;
use crate::error::AirQualityError;
use crate::stats::pct;

pub const STATION_COLUMN: &str = "station";
pub const YEAR_COLUMN: &str = "year";
pub const MONTH_COLUMN: &str = "month";

const GROUP_KEY: &str = "__group";

fn require_column(ds: &Dataset, name: &str) -> Result<(), AirQualityError> {
    if ds.has_column(name) {
        Ok(())
    } else {
        Err(AirQualityError::MissingColumn(name.to_string()))
    }
}

fn require_numeric(ds: &Dataset, columns: &[String]) -> Result<(), AirQualityError> {
    columns.iter().try_for_each(|c| ds.numeric(c).map(|_| ()))
}

fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(df
        .column(name)?
        .as_materialized_series()
        .f64()?
        .into_iter()
        .collect())
}

/// Means of `columns` per value of `key`, over the rows kept by `filter`.
/// The key is returned as the `GROUP_KEY` column, one row per group.
fn group_means(ds: &Dataset, key: Expr, filter: Expr, columns: &[String]) -> Result<DataFrame> {
    let mut selected = vec![key.alias(GROUP_KEY)];
    selected.extend(columns.iter().map(|c| col(c.as_str())));
    let means: Vec<Expr> = columns.iter().map(|c| col(c.as_str()).mean()).collect();

    Ok(ds
        .frame()
        .clone()
        .lazy()
        .select(selected)
        .filter(filter)
        .group_by([col(GROUP_KEY)])
        .agg(means)
        .collect()?)
}

fn row_values(columns: &[String], values: &[Vec<Option<f64>>], row: usize) -> BTreeMap<String, Option<f64>> {
    columns.iter().cloned().zip(values.iter().map(|v| v[row])).collect()
}

/// Mean AQI per station per year, ordered by station then year.
pub fn yearly_aqi_by_station(ds: &Dataset) -> Result<Vec<StationYearAqi>> {
    require_column(ds, STATION_COLUMN)?;
    ds.numeric(YEAR_COLUMN)?;
    ds.numeric(AQI_COLUMN)?;

    let df = ds
        .frame()
        .clone()
        .lazy()
        .select([
            col(STATION_COLUMN).cast(DataType::String),
            col(YEAR_COLUMN).cast(DataType::Int32),
            col(AQI_COLUMN),
        ])
        .filter(col(STATION_COLUMN).is_not_null().and(col(YEAR_COLUMN).is_not_null()))
        .group_by([col(STATION_COLUMN), col(YEAR_COLUMN)])
        .agg([
            col(AQI_COLUMN).mean().alias("aqi"),
            col(AQI_COLUMN).count().cast(DataType::UInt32).alias("samples"),
        ])
        .collect()?;

    let stations = df.column(STATION_COLUMN)?.as_materialized_series().str()?;
    let years = df.column(YEAR_COLUMN)?.as_materialized_series().i32()?;
    let samples = df.column("samples")?.as_materialized_series().u32()?;
    let aqi = f64_values(&df, "aqi")?;

    let mut out: Vec<StationYearAqi> = stations
        .into_iter()
        .zip(years.into_iter())
        .zip(samples.into_iter())
        .zip(aqi)
        .filter_map(|(((station, year), samples), aqi)| {
            Some(StationYearAqi {
                station: station?.to_string(),
                year: year?,
                aqi: aqi?,
                samples: samples? as usize,
            })
        })
        .collect();
    out.sort_by(|a, b| a.station.cmp(&b.station).then(a.year.cmp(&b.year)));
    Ok(out)
}

/// Mean of each column per calendar month. Months outside 1..=12 are ignored.
pub fn monthly_averages(ds: &Dataset, columns: &[String]) -> Result<Vec<MonthlyAverage>> {
    ds.numeric(MONTH_COLUMN)?;
    require_numeric(ds, columns)?;

    let month = col(GROUP_KEY);
    let df = group_means(
        ds,
        col(MONTH_COLUMN).cast(DataType::Int32),
        month.clone().gt_eq(lit(1)).and(month.lt_eq(lit(12))),
        columns,
    )?;

    let months = df.column(GROUP_KEY)?.as_materialized_series().i32()?;
    let values = columns
        .iter()
        .map(|c| f64_values(&df, c))
        .collect::<Result<Vec<_>>>()?;

    let mut out: Vec<MonthlyAverage> = months
        .into_iter()
        .enumerate()
        .filter_map(|(row, month)| {
            Some(MonthlyAverage {
                month: u32::try_from(month?).ok()?,
                values: row_values(columns, &values, row),
            })
        })
        .collect();
    out.sort_by_key(|m| m.month);
    Ok(out)
}

/// Mean of each column per station, ordered by station name.
pub fn station_means(ds: &Dataset, columns: &[String]) -> Result<Vec<StationMean>> {
    require_column(ds, STATION_COLUMN)?;
    require_numeric(ds, columns)?;

    let df = group_means(
        ds,
        col(STATION_COLUMN).cast(DataType::String),
        col(GROUP_KEY).is_not_null(),
        columns,
    )?;

    let stations = df.column(GROUP_KEY)?.as_materialized_series().str()?;
    let values = columns
        .iter()
        .map(|c| f64_values(&df, c))
        .collect::<Result<Vec<_>>>()?;

    let mut out: Vec<StationMean> = stations
        .into_iter()
        .enumerate()
        .filter_map(|(row, station)| {
            Some(StationMean {
                station: station?.to_string(),
                values: row_values(columns, &values, row),
            })
        })
        .collect();
    out.sort_by(|a, b| a.station.cmp(&b.station));
    Ok(out)
}

/// The `n` stations with the highest mean for each column, worst first.
pub fn top_stations(means: &[StationMean], columns: &[String], n: usize) -> Vec<PollutantRanking> {
    columns
        .iter()
        .map(|column| {
            let mut stations: Vec<RankedStation> = means
                .iter()
                .filter_map(|m| {
                    Some(RankedStation {
                        station: m.station.clone(),
                        mean: (*m.values.get(column)?)?,
                    })
                })
                .collect();
            stations.sort_by(|a, b| b.mean.total_cmp(&a.mean).then_with(|| a.station.cmp(&b.station)));
            stations.truncate(n);

            PollutantRanking {
                pollutant: column.clone(),
                stations,
            }
        })
        .collect()
}

/// Stations ordered by how many rankings they appear in.
pub fn frequent_stations(rankings: &[PollutantRanking]) -> Vec<StationFrequency> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for ranking in rankings {
        for s in &ranking.stations {
            *counts.entry(s.station.as_str()).or_default() += 1;
        }
    }

    let mut out: Vec<StationFrequency> = counts
        .into_iter()
        .map(|(station, appearances)| StationFrequency {
            station: station.to_string(),
            appearances,
        })
        .collect();
    out.sort_by(|a, b| match b.appearances.cmp(&a.appearances) {
        Ordering::Equal => a.station.cmp(&b.station),
        other => other,
    });
    out
}

/// Pairwise Pearson correlation of the given columns.
pub fn correlations(ds: &Dataset, columns: &[String]) -> Result<CorrelationMatrix> {
    let values = columns
        .iter()
        .map(|c| ds.values(c))
        .collect::<Result<Vec<_>, _>>()?;
    let matrix = values
        .iter()
        .map(|a| values.iter().map(|b| pearson(a, b)).collect())
        .collect();

    Ok(CorrelationMatrix {
        columns: columns.to_vec(),
        values: matrix,
    })
}

/// Row count per AQI category, every category listed in severity order.
/// Missing or unrecognised labels count as `Unknown`.
pub fn category_counts(ds: &Dataset) -> Result<Vec<CategoryCount>> {
    let labels = ds.text(CATEGORY_COLUMN)?;

    let mut counts: BTreeMap<AqiCategory, usize> = BTreeMap::new();
    for label in &labels {
        let category = label
            .as_deref()
            .and_then(|l| l.parse::<AqiCategory>().ok())
            .unwrap_or(AqiCategory::Unknown);
        *counts.entry(category).or_default() += 1;
    }

    let total = ds.n_rows();
    Ok(AqiCategory::ALL
        .into_iter()
        .map(|category| {
            let count = counts.get(&category).copied().unwrap_or(0);
            CategoryCount {
                category,
                count,
                pct: pct(count, total),
            }
        })
        .collect())
}

/// Points of `y` against `x`, skipping rows where either is unknown.
pub fn xy_series(ds: &Dataset, x: &str, y: &str, kind: ChartKind) -> Result<XySeries> {
    let xs = ds.values(x)?;
    let ys = ds.values(y)?;

    let points = xs
        .into_iter()
        .zip(ys)
        .filter_map(|(a, b)| Some(XyPoint { x: a?, y: b? }))
        .collect();

    Ok(XySeries {
        kind,
        x_column: x.to_string(),
        y_column: y.to_string(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{numeric_column, text_column};

    fn sample() -> Dataset {
        Dataset::from_columns(vec![
            text_column(
                "station",
                &[Some("Dongsi"), Some("Dongsi"), Some("Guanyuan"), Some("Guanyuan"), None],
            ),
            numeric_column("year", &[Some(2013.0), Some(2014.0), Some(2013.0), Some(2013.0), Some(2013.0)]),
            numeric_column("month", &[Some(3.0), Some(3.0), Some(4.0), Some(13.0), Some(4.0)]),
            numeric_column("PM2.5", &[Some(10.0), Some(20.0), Some(30.0), Some(50.0), Some(99.0)]),
            numeric_column("CO", &[Some(900.0), None, Some(300.0), Some(500.0), None]),
            numeric_column("AQI", &[Some(40.0), Some(60.0), None, Some(80.0), Some(10.0)]),
            text_column(
                "AQI_Category",
                &[Some("Good"), Some("Moderate"), Some("Unknown"), Some("Moderate"), None],
            ),
        ])
        .unwrap()
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_yearly_aqi_by_station() {
        let yearly = yearly_aqi_by_station(&sample()).unwrap();
        assert_eq!(
            yearly,
            vec![
                StationYearAqi { station: "Dongsi".into(), year: 2013, aqi: 40.0, samples: 1 },
                StationYearAqi { station: "Dongsi".into(), year: 2014, aqi: 60.0, samples: 1 },
                StationYearAqi { station: "Guanyuan".into(), year: 2013, aqi: 80.0, samples: 1 },
            ]
        );
    }

    #[test]
    fn test_yearly_requires_station() {
        let ds = sample().drop_columns(&cols(&["station"])).unwrap();
        let err = yearly_aqi_by_station(&ds).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AirQualityError>(),
            Some(&AirQualityError::MissingColumn("station".to_string()))
        );
    }

    #[test]
    fn test_monthly_averages_ignore_invalid_months() {
        let monthly = monthly_averages(&sample(), &cols(&["PM2.5", "CO"])).unwrap();
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].month, 3);
        assert_eq!(monthly[0].values["PM2.5"], Some(15.0));
        assert_eq!(monthly[0].values["CO"], Some(900.0));
        assert_eq!(monthly[1].month, 4);
        assert_eq!(monthly[1].values["PM2.5"], Some(64.5));
        assert_eq!(monthly[1].values["CO"], Some(300.0));
    }

    #[test]
    fn test_grouped_means_reject_text_columns() {
        let err = monthly_averages(&sample(), &cols(&["AQI_Category"])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AirQualityError>(),
            Some(&AirQualityError::NotNumeric("AQI_Category".to_string()))
        );
        assert!(station_means(&sample(), &cols(&["station"])).is_err());
    }

    #[test]
    fn test_station_means_and_rankings() {
        let columns = cols(&["PM2.5", "CO"]);
        let means = station_means(&sample(), &columns).unwrap();
        assert_eq!(means.len(), 2);
        assert_eq!(means[1].values["PM2.5"], Some(40.0));

        let rankings = top_stations(&means, &columns, 1);
        assert_eq!(rankings[0].stations[0].station, "Guanyuan");
        assert_eq!(rankings[1].stations[0].station, "Dongsi");

        let frequent = frequent_stations(&rankings);
        assert_eq!(frequent.len(), 2);
        assert!(frequent.iter().all(|f| f.appearances == 1));
        assert_eq!(frequent[0].station, "Dongsi");
    }

    #[test]
    fn test_correlations() {
        let matrix = correlations(&sample(), &cols(&["PM2.5", "AQI"])).unwrap();
        assert_eq!(matrix.values.len(), 2);
        assert!((matrix.get("PM2.5", "PM2.5").unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(matrix.get("PM2.5", "AQI"), matrix.get("AQI", "PM2.5"));
        assert_eq!(matrix.get("PM2.5", "TEMP"), None);
    }

    #[test]
    fn test_category_counts() {
        let counts = category_counts(&sample()).unwrap();
        assert_eq!(counts.len(), AqiCategory::ALL.len());

        let get = |c: AqiCategory| counts.iter().find(|x| x.category == c).unwrap().count;
        assert_eq!(get(AqiCategory::Good), 1);
        assert_eq!(get(AqiCategory::Moderate), 2);
        assert_eq!(get(AqiCategory::Unknown), 2);
        assert_eq!(get(AqiCategory::Hazardous), 0);
    }

    #[test]
    fn test_xy_series_skips_missing() {
        let series = xy_series(&sample(), "PM2.5", "CO", ChartKind::Scatter).unwrap();
        assert_eq!(series.points.len(), 3);
        assert_eq!(series.points[0], XyPoint { x: 10.0, y: 900.0 });

        assert!(xy_series(&sample(), "PM2.5", "station", ChartKind::Line).is_err());
    }
}
