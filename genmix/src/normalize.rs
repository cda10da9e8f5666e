//! Validation of raw source rows into canonical observations.

use std::collections::BTreeMap;
use std::str::FromStr;

use log::{debug, info, warn};
use polars::df;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::error::{GenmixError, GenmixResult};
use crate::period::YearMonth;
use crate::sources::SourceLabel;
use crate::COL;

/// A row as delivered by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub entity_code: String,
    pub date: String,
    pub series: String,
    #[serde(alias = "generation_value")]
    pub generation_twh: Option<f64>,
    #[serde(default, alias = "share_pct")]
    pub share_of_generation_pct: Option<f64>,
}

impl RawRow {
    pub fn new(entity_code: &str, date: &str, series: &str, generation_twh: f64) -> Self {
        Self {
            entity_code: entity_code.to_string(),
            date: date.to_string(),
            series: series.to_string(),
            generation_twh: Some(generation_twh),
            share_of_generation_pct: None,
        }
    }
}

/// A validated base fact: one primary source of one country in one month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub entity: String,
    pub date: YearMonth,
    pub source: SourceLabel,
    pub generation: f64,
}

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Rows dated before this month are dropped.
    pub start: Option<YearMonth>,
    /// Number of decimal digits kept for generation values.
    pub precision: u32,
    /// Entity codes reserved for aggregates; base rows using them are dropped.
    pub reserved_entities: Vec<String>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            start: None,
            precision: 2,
            reserved_entities: vec![],
        }
    }
}

pub(crate) fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Turns raw rows into observations, sorted by (entity, date, source).
///
/// Malformed rows are skipped with a warning. An empty input, or one where no row survives, is
/// reported as `GenmixError::NoData`.
pub fn normalize(rows: &[RawRow], options: &NormalizeOptions) -> GenmixResult<Vec<Observation>> {
    if rows.is_empty() {
        info!("No raw rows to normalize");
        return Err(GenmixError::NoData);
    }

    let mut observations: BTreeMap<(String, YearMonth, SourceLabel), f64> = BTreeMap::new();
    let mut skipped = 0usize;
    for row in rows {
        let Some(observation) = parse_row(row, options) else {
            skipped += 1;
            continue;
        };
        let key = (observation.entity, observation.date, observation.source);
        if observations.contains_key(&key) {
            warn!(
                "Duplicate observation for {} {} {}, keeping the first",
                key.0, key.1, key.2
            );
            skipped += 1;
            continue;
        }
        observations.insert(key, observation.generation);
    }
    debug!(
        "Normalized {} of {} raw rows ({skipped} skipped)",
        observations.len(),
        rows.len()
    );

    if observations.is_empty() {
        return Err(GenmixError::NoData);
    }
    Ok(observations
        .into_iter()
        .map(|((entity, date, source), generation)| Observation {
            entity,
            date,
            source,
            generation,
        })
        .collect())
}

fn parse_row(row: &RawRow, options: &NormalizeOptions) -> Option<Observation> {
    let entity = row.entity_code.trim();
    if entity.is_empty() {
        warn!("Skipping row without entity code: {row:?}");
        return None;
    }
    if options.reserved_entities.iter().any(|e| e == entity) {
        warn!("Skipping base row for reserved aggregate entity '{entity}'");
        return None;
    }
    let date = match YearMonth::from_str(&row.date) {
        Ok(date) => date,
        Err(err) => {
            warn!("Skipping row for {entity}: {err}");
            return None;
        }
    };
    if options.start.is_some_and(|start| date < start) {
        return None;
    }
    let source = match SourceLabel::from_str(row.series.trim()) {
        Ok(source) if source.is_primary() => source,
        Ok(_) => {
            debug!("Skipping derived series '{}' for {entity}", row.series);
            return None;
        }
        Err(_) => {
            warn!("Skipping unknown series '{}' for {entity}", row.series);
            return None;
        }
    };
    let generation = match row.generation_twh {
        Some(value) if value.is_finite() && value >= 0.0 => round_to(value, options.precision),
        other => {
            warn!("Skipping {entity} {date} {source}: invalid generation {other:?}");
            return None;
        }
    };
    Some(Observation {
        entity: entity.to_string(),
        date,
        source,
        generation,
    })
}

/// Builds the canonical base table.
pub fn observations_to_frame(observations: &[Observation]) -> GenmixResult<DataFrame> {
    let df = df!(
        COL::ENTITY => observations.iter().map(|o| o.entity.clone()).collect::<Vec<_>>(),
        COL::YEAR => observations.iter().map(|o| o.date.year()).collect::<Vec<_>>(),
        COL::MONTH => observations.iter().map(|o| o.date.month() as i32).collect::<Vec<_>>(),
        COL::PERIOD => observations.iter().map(|o| o.date.period()).collect::<Vec<_>>(),
        COL::SOURCE => observations.iter().map(|o| o.source.as_str().to_string()).collect::<Vec<_>>(),
        COL::GENERATION => observations.iter().map(|o| o.generation).collect::<Vec<_>>()
    )?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_no_data() {
        let result = normalize(&[], &NormalizeOptions::default());
        assert!(matches!(result, Err(GenmixError::NoData)));
    }

    #[test]
    fn rows_are_parsed_rounded_and_sorted() {
        let rows = vec![
            RawRow::new("ITA", "2020-02-01", "Gas", 5.123),
            RawRow::new("ITA", "2020-01", "Coal", 10.0),
            RawRow::new("FRA", "2020-01", "Other fossil", 1.005_1),
        ];
        let observations = normalize(&rows, &NormalizeOptions::default()).unwrap();
        assert_eq!(observations.len(), 3);
        assert_eq!(observations[0].entity, "FRA");
        assert_eq!(observations[0].source, SourceLabel::OtherFossil);
        assert_eq!(observations[0].generation, 1.01);
        assert_eq!(observations[1].date, YearMonth::new(2020, 1).unwrap());
        assert_eq!(observations[2].generation, 5.12);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let mut missing = RawRow::new("ITA", "2020-01", "Wind", 0.0);
        missing.generation_twh = None;
        let rows = vec![
            RawRow::new("ITA", "not a date", "Coal", 1.0),
            RawRow::new("ITA", "2020-01", "Geothermal", 1.0),
            RawRow::new("ITA", "2020-01", "Total", 1.0),
            RawRow::new("ITA", "2020-01", "Gas", -1.0),
            RawRow::new("ITA", "2020-01", "Solar", f64::NAN),
            RawRow::new("", "2020-01", "Solar", 1.0),
            missing,
            RawRow::new("ITA", "2020-01", "Hydro", 2.0),
        ];
        let observations = normalize(&rows, &NormalizeOptions::default()).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].source, SourceLabel::Hydro);
    }

    #[test]
    fn all_malformed_is_no_data() {
        let rows = vec![RawRow::new("ITA", "??", "Coal", 1.0)];
        assert!(normalize(&rows, &NormalizeOptions::default())
            .unwrap_err()
            .is_no_data());
    }

    #[test]
    fn start_date_and_reserved_entities_filter_rows() {
        let options = NormalizeOptions {
            start: YearMonth::new(2014, 1),
            reserved_entities: vec!["EUR".to_string()],
            ..Default::default()
        };
        let rows = vec![
            RawRow::new("ITA", "2013-12", "Coal", 1.0),
            RawRow::new("ITA", "2014-01", "Coal", 2.0),
            RawRow::new("EUR", "2014-01", "Coal", 100.0),
        ];
        let observations = normalize(&rows, &options).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].generation, 2.0);
    }

    #[test]
    fn duplicates_keep_the_first_row() {
        let rows = vec![
            RawRow::new("ITA", "2020-01", "Coal", 1.0),
            RawRow::new("ITA", "2020-01-01", "Coal", 9.0),
        ];
        let observations = normalize(&rows, &NormalizeOptions::default()).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].generation, 1.0);
    }

    #[test]
    fn raw_rows_accept_interface_aliases() -> anyhow::Result<()> {
        let row: RawRow = serde_json::from_str(
            r#"{"entity_code": "ITA", "date": "2020-01", "series": "Coal", "generation_value": 3.5, "share_pct": 12.0}"#,
        )?;
        assert_eq!(row.generation_twh, Some(3.5));
        assert_eq!(row.share_of_generation_pct, Some(12.0));
        Ok(())
    }

    #[test]
    fn frame_has_canonical_columns() -> anyhow::Result<()> {
        let observations = normalize(
            &[RawRow::new("ITA", "2021-03", "Coal", 1.0)],
            &NormalizeOptions::default(),
        )?;
        let df = observations_to_frame(&observations)?;
        assert_eq!(df.shape(), (1, 6));
        assert_eq!(df.column(COL::PERIOD)?.i32()?.get(0), Some(2021 * 12 + 2));
        assert_eq!(df.column(COL::SOURCE)?.str()?.get(0), Some("Coal"));
        Ok(())
    }
}
