//! Filtered monthly or annual slices of the enriched table.

use std::collections::BTreeSet;

use itertools::izip;
use log::debug;
use polars::lazy::dsl::{col, lit, Expr};
use polars::prelude::{
    DataFrame, DataType, IntoLazy, LazyFrame, NamedFrom, Series, SortMultipleOptions, NULL,
};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::delta::{with_lagged_change, ZeroBaseline};
use crate::error::GenmixResult;
use crate::period::YearRange;
use crate::pipeline::EnrichedTable;
use crate::selection::Selection;
use crate::share::with_shares_on;
use crate::COL;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Granularity {
    #[default]
    Monthly,
    Annual,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewFilters {
    pub entities: Selection,
    pub sources: Selection,
    /// `None` keeps every year.
    pub years: Option<Vec<YearRange>>,
    pub granularity: Granularity,
}

impl ViewFilters {
    pub fn with_entities(mut self, entities: Selection) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_sources(mut self, sources: Selection) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_years(mut self, years: Vec<YearRange>) -> Self {
        self.years = Some(years);
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    fn predicates(&self) -> Vec<Expr> {
        let mut predicates = Vec::new();
        predicates.extend(self.entities.to_expr(COL::ENTITY));
        predicates.extend(self.sources.to_expr(COL::SOURCE));
        if let Some(years) = &self.years {
            // An empty list of ranges matches no year
            let any_year = years
                .iter()
                .map(Expr::from)
                .reduce(|acc, e| acc.or(e))
                .unwrap_or(lit(false));
            predicates.push(any_year);
        }
        predicates
    }
}

/// One row of a view. Monthly dates are labelled `MM-YYYY`, annual ones `YYYY`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRow {
    pub entity: String,
    pub date: String,
    pub year: i32,
    pub month: Option<u32>,
    pub source: String,
    pub generation: f64,
    pub share_pct: Option<f64>,
    pub yoy_pct: Option<f64>,
    pub boy_pct: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ViewTable {
    df: DataFrame,
    granularity: Granularity,
}

/// Columns written out for a view, in order.
pub const EXPORT_COLUMNS: [&str; 7] = [
    COL::ENTITY,
    COL::DATE,
    COL::SOURCE,
    COL::GENERATION,
    COL::SHARE,
    COL::YOY,
    COL::BOY,
];

impl ViewTable {
    pub fn as_df(&self) -> &DataFrame {
        &self.df
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// The view without its helper year/month columns.
    pub fn export_frame(&self) -> GenmixResult<DataFrame> {
        Ok(self.df.select(EXPORT_COLUMNS)?)
    }

    pub fn available_years(&self) -> GenmixResult<Vec<i32>> {
        let years: BTreeSet<i32> = self
            .df
            .column(COL::YEAR)?
            .i32()?
            .into_iter()
            .flatten()
            .collect();
        Ok(years.into_iter().collect())
    }

    pub fn rows(&self) -> GenmixResult<Vec<ViewRow>> {
        let df = &self.df;
        let rows = izip!(
            df.column(COL::ENTITY)?.str()?,
            df.column(COL::DATE)?.str()?,
            df.column(COL::YEAR)?.i32()?,
            df.column(COL::MONTH)?.i32()?,
            df.column(COL::SOURCE)?.str()?,
            df.column(COL::GENERATION)?.f64()?,
            df.column(COL::SHARE)?.f64()?,
            df.column(COL::YOY)?.f64()?,
            df.column(COL::BOY)?.f64()?
        )
        .filter_map(
            |(entity, date, year, month, source, generation, share, yoy, boy)| {
                Some(ViewRow {
                    entity: entity?.to_string(),
                    date: date?.to_string(),
                    year: year?,
                    month: month.map(|m| m as u32),
                    source: source?.to_string(),
                    generation: generation?,
                    share_pct: share,
                    yoy_pct: yoy,
                    boy_pct: boy,
                })
            },
        )
        .collect();
        Ok(rows)
    }
}

/// Re-sums monthly generation per (entity, source, year) and recomputes share and year-over-year
/// change on the annual sums. BOY has no annual meaning and is left null.
fn annualize(monthly: LazyFrame, zero_baseline: ZeroBaseline, precision: u32) -> LazyFrame {
    let annual = monthly
        .group_by_stable([col(COL::ENTITY), col(COL::SOURCE), col(COL::YEAR)])
        .agg([col(COL::GENERATION).sum().round(precision)]);
    let annual = with_shares_on(annual, &[COL::ENTITY, COL::YEAR]);
    with_lagged_change(annual, COL::YEAR, 1, COL::YOY, zero_baseline).with_columns([
        lit(NULL).cast(DataType::Int32).alias(COL::MONTH),
        lit(NULL).cast(DataType::Float64).alias(COL::BOY),
    ])
}

fn date_labels(df: &DataFrame) -> GenmixResult<Vec<String>> {
    let labels = df
        .column(COL::YEAR)?
        .i32()?
        .into_iter()
        .zip(df.column(COL::MONTH)?.i32()?)
        .map(|(year, month)| match (year, month) {
            (Some(year), Some(month)) => format!("{month:02}-{year}"),
            (Some(year), None) => year.to_string(),
            _ => String::new(),
        })
        .collect();
    Ok(labels)
}

/// Selects entities, sources and years from the enriched table at the requested granularity,
/// sorted by entity, source and date. An empty result is a valid view.
pub fn view(table: &EnrichedTable, filters: &ViewFilters) -> GenmixResult<ViewTable> {
    let monthly = table.as_df().clone().lazy();
    let lf = match filters.granularity {
        Granularity::Monthly => monthly,
        Granularity::Annual => annualize(monthly, table.zero_baseline(), table.precision()),
    };
    let lf = filters
        .predicates()
        .into_iter()
        .fold(lf, |lf, predicate| lf.filter(predicate));

    let mut df = lf
        .select([
            col(COL::ENTITY),
            col(COL::YEAR),
            col(COL::MONTH),
            col(COL::SOURCE),
            col(COL::GENERATION),
            col(COL::SHARE),
            col(COL::YOY),
            col(COL::BOY),
        ])
        .sort_by_exprs(
            [col(COL::ENTITY), col(COL::SOURCE), col(COL::YEAR), col(COL::MONTH)],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;
    let labels = date_labels(&df)?;
    df.with_column(Series::new(COL::DATE, labels))?;
    debug!(
        "{} view with {} rows for {:?}",
        filters.granularity,
        df.height(),
        filters
    );

    Ok(ViewTable {
        df,
        granularity: filters.granularity,
    })
}
