//! Per-source series for plotting one entity.

use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::error::GenmixResult;
use crate::sources::{SourceLabel, ORDERED_SOURCES};
use crate::view::{ViewRow, ViewTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ChartMetric {
    /// Share of total generation, in percent.
    #[default]
    Share,
    /// Year-over-year change, in percent.
    Yoy,
}

impl ChartMetric {
    fn value(&self, row: &ViewRow) -> Option<f64> {
        match self {
            ChartMetric::Share => row.share_pct,
            ChartMetric::Yoy => row.yoy_pct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub source: SourceLabel,
    pub color: &'static str,
    /// `(date label, value)` in date order. Gaps are `None`.
    pub points: Vec<(String, Option<f64>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub entity: String,
    pub metric: ChartMetric,
    pub y_range: (f64, f64),
    pub series: Vec<ChartSeries>,
}

/// Shares are plotted on a fixed 0 to 100 axis. Changes get their extremes padded by a tenth of
/// the largest magnitude.
fn y_range(metric: ChartMetric, values: impl Iterator<Item = f64>) -> (f64, f64) {
    match metric {
        ChartMetric::Share => (0.0, 100.0),
        ChartMetric::Yoy => {
            let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if !min.is_finite() || !max.is_finite() {
                return (0.0, 0.0);
            }
            let margin = min.abs().max(max.abs()) * 0.1;
            (min - margin, max + margin)
        }
    }
}

/// Builds one series per primary source of `entity` present in the view, in the fixed plotting
/// order. Returns `None` when there is nothing to draw.
pub fn chart_series(
    view: &ViewTable,
    entity: &str,
    metric: ChartMetric,
) -> GenmixResult<Option<Chart>> {
    let rows: Vec<ViewRow> = view
        .rows()?
        .into_iter()
        .filter(|row| row.entity == entity)
        .collect();

    let series: Vec<ChartSeries> = ORDERED_SOURCES
        .iter()
        .filter_map(|source| {
            let points: Vec<(String, Option<f64>)> = rows
                .iter()
                .filter(|row| row.source == source.as_str())
                .map(|row| (row.date.clone(), metric.value(row)))
                .collect();
            let color = source.color()?;
            (!points.is_empty()).then(|| ChartSeries {
                source: *source,
                color,
                points,
            })
        })
        .collect();

    let values = series
        .iter()
        .flat_map(|s| s.points.iter().filter_map(|(_, value)| *value));
    if series.iter().all(|s| s.points.iter().all(|(_, v)| v.is_none())) {
        return Ok(None);
    }
    let y_range = y_range(metric, values);

    Ok(Some(Chart {
        entity: entity.to_string(),
        metric,
        y_range,
        series,
    }))
}
