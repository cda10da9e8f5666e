use std::collections::BTreeSet;

use itertools::izip;
use log::{debug, info};
use polars::lazy::dsl::col;
use polars::prelude::{DataFrame, IntoLazy, SortMultipleOptions};
use serde::{Deserialize, Serialize};

use crate::delta::{with_deltas, ZeroBaseline};
use crate::error::GenmixResult;
use crate::groups::{aggregate, GroupConfig};
use crate::normalize::{normalize, observations_to_frame, NormalizeOptions, RawRow};
use crate::period::YearMonth;
use crate::share::with_shares;
use crate::view::{view, ViewFilters, ViewTable};
use crate::COL;

/// The first month kept by default.
pub const DEFAULT_START: (i32, u32) = (2014, 1);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows dated before this month are dropped. `None` keeps everything.
    pub start: Option<YearMonth>,
    /// Decimal places for generation values and group sums.
    pub precision: u32,
    pub zero_baseline: ZeroBaseline,
    pub groups: GroupConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start: YearMonth::new(DEFAULT_START.0, DEFAULT_START.1),
            precision: 2,
            zero_baseline: ZeroBaseline::default(),
            groups: GroupConfig::default(),
        }
    }
}

/// One row of the enriched table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub entity: String,
    pub date: YearMonth,
    pub source: String,
    pub generation: f64,
    pub share_pct: Option<f64>,
    pub yoy_pct: Option<f64>,
    pub boy_pct: Option<f64>,
}

/// Monthly table holding every entity (countries and blocs) and every source (primary sources,
/// `Total` and source sets), with shares and percentage changes attached.
#[derive(Debug, Clone)]
pub struct EnrichedTable {
    df: DataFrame,
    zero_baseline: ZeroBaseline,
    precision: u32,
}

impl EnrichedTable {
    pub fn as_df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn zero_baseline(&self) -> ZeroBaseline {
        self.zero_baseline
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn rows(&self) -> GenmixResult<Vec<EnrichedRow>> {
        let df = &self.df;
        let rows = izip!(
            df.column(COL::ENTITY)?.str()?,
            df.column(COL::PERIOD)?.i32()?,
            df.column(COL::SOURCE)?.str()?,
            df.column(COL::GENERATION)?.f64()?,
            df.column(COL::SHARE)?.f64()?,
            df.column(COL::YOY)?.f64()?,
            df.column(COL::BOY)?.f64()?
        )
        .filter_map(|(entity, period, source, generation, share, yoy, boy)| {
            Some(EnrichedRow {
                entity: entity?.to_string(),
                date: YearMonth::from_period(period?),
                source: source?.to_string(),
                generation: generation?,
                share_pct: share,
                yoy_pct: yoy,
                boy_pct: boy,
            })
        })
        .collect();
        Ok(rows)
    }

    fn distinct_strings(&self, column: &str) -> GenmixResult<Vec<String>> {
        let values: BTreeSet<String> = self
            .df
            .column(column)?
            .str()?
            .into_iter()
            .flatten()
            .map(String::from)
            .collect();
        Ok(values.into_iter().collect())
    }

    /// Every entity in the table, countries and blocs, sorted.
    pub fn entities(&self) -> GenmixResult<Vec<String>> {
        self.distinct_strings(COL::ENTITY)
    }

    /// Every source label in the table, sorted.
    pub fn sources(&self) -> GenmixResult<Vec<String>> {
        self.distinct_strings(COL::SOURCE)
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
}

/// Runs normalizer, group aggregator, share calculator and period differ in that order.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, rows: &[RawRow]) -> GenmixResult<EnrichedTable> {
        let groups = &self.config.groups;
        groups.validate()?;

        let options = NormalizeOptions {
            start: self.config.start,
            precision: self.config.precision,
            reserved_entities: groups.bloc_names(),
        };
        let observations = normalize(rows, &options)?;
        info!(
            "Running pipeline over {} observations from {} raw rows",
            observations.len(),
            rows.len()
        );

        let base = observations_to_frame(&observations)?.lazy();
        let aggregated = aggregate(base, groups, self.config.precision)?;
        let df = with_deltas(with_shares(aggregated), self.config.zero_baseline)
            .select([
                col(COL::ENTITY),
                col(COL::YEAR),
                col(COL::MONTH),
                col(COL::PERIOD),
                col(COL::SOURCE),
                col(COL::GENERATION),
                col(COL::SHARE),
                col(COL::YOY),
                col(COL::BOY),
            ])
            .sort_by_exprs(
                [col(COL::ENTITY), col(COL::SOURCE), col(COL::PERIOD)],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        debug!("Enriched table shape: {:?}", df.shape());

        Ok(EnrichedTable {
            df,
            zero_baseline: self.config.zero_baseline,
            precision: self.config.precision,
        })
    }

    pub fn view(&self, table: &EnrichedTable, filters: &ViewFilters) -> GenmixResult<ViewTable> {
        view(table, filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenmixError;
    use crate::groups::{GroupSpec, G7, TOTAL};
    use crate::selection::Selection;
    use crate::sources::SourceLabel;
    use crate::view::Granularity;

    fn find<'a>(
        rows: &'a [EnrichedRow],
        entity: &str,
        date: &str,
        source: &str,
    ) -> Option<&'a EnrichedRow> {
        let date: YearMonth = date.parse().unwrap();
        rows.iter()
            .find(|r| r.entity == entity && r.date == date && r.source == source)
    }

    fn pipeline(groups: GroupConfig) -> Pipeline {
        Pipeline::new(PipelineConfig {
            start: None,
            groups,
            ..PipelineConfig::default()
        })
    }

    fn green_brown() -> GroupConfig {
        GroupConfig {
            groups: vec![
                GroupSpec::source_set(
                    "Green",
                    &[SourceLabel::Solar, SourceLabel::Wind, SourceLabel::Nuclear],
                ),
                GroupSpec::source_set("Brown", &[SourceLabel::Coal, SourceLabel::Gas]),
            ],
        }
    }

    #[test]
    fn shares_and_yoy_for_a_single_country() -> anyhow::Result<()> {
        let rows = vec![
            RawRow::new("ITA", "2020-01-01", "Coal", 10.0),
            RawRow::new("ITA", "2020-01-01", "Gas", 5.0),
            RawRow::new("ITA", "2021-01-01", "Coal", 12.0),
            RawRow::new("ITA", "2021-01-01", "Gas", 6.0),
        ];
        let table = pipeline(green_brown()).run(&rows)?;
        let rows = table.rows()?;

        assert_eq!(find(&rows, "ITA", "2020-01", TOTAL).unwrap().generation, 15.0);
        assert_eq!(find(&rows, "ITA", "2021-01", TOTAL).unwrap().generation, 18.0);
        assert_eq!(find(&rows, "ITA", "2020-01", TOTAL).unwrap().share_pct, Some(100.0));

        let coal_2020 = find(&rows, "ITA", "2020-01", "Coal").unwrap();
        assert_eq!(coal_2020.share_pct, Some(66.67));
        assert_eq!(coal_2020.yoy_pct, None);
        assert_eq!(coal_2020.boy_pct, Some(0.0));
        assert_eq!(find(&rows, "ITA", "2021-01", "Coal").unwrap().yoy_pct, Some(20.0));

        assert_eq!(find(&rows, "ITA", "2020-01", "Brown").unwrap().share_pct, Some(100.0));
        // No member rows for Green
        assert!(find(&rows, "ITA", "2020-01", "Green").is_none());
        Ok(())
    }

    fn brown_only_rows() -> Vec<RawRow> {
        vec![
            RawRow::new("ITA", "2020-03-01", "Coal", 0.0),
            RawRow::new("ITA", "2020-03-01", "Gas", 4.0),
            RawRow::new("ITA", "2021-03-01", "Coal", 2.0),
            RawRow::new("ITA", "2021-03-01", "Gas", 6.0),
        ]
    }

    #[test]
    fn zero_baseline_reports_no_change_by_default() -> anyhow::Result<()> {
        let table = pipeline(green_brown()).run(&brown_only_rows())?;
        let rows = table.rows()?;
        assert_eq!(find(&rows, "ITA", "2021-03", "Coal").unwrap().yoy_pct, Some(0.0));
        assert_eq!(find(&rows, "ITA", "2021-03", "Gas").unwrap().yoy_pct, Some(50.0));
        assert_eq!(find(&rows, "ITA", "2021-03", "Brown").unwrap().yoy_pct, Some(100.0));
        assert_eq!(find(&rows, "ITA", "2021-03", TOTAL).unwrap().yoy_pct, Some(100.0));

        let strict = Pipeline::new(PipelineConfig {
            start: None,
            zero_baseline: ZeroBaseline::Null,
            groups: green_brown(),
            ..PipelineConfig::default()
        })
        .run(&brown_only_rows())?;
        let rows = strict.rows()?;
        assert_eq!(find(&rows, "ITA", "2021-03", "Coal").unwrap().yoy_pct, None);
        Ok(())
    }

    #[test]
    fn bloc_sums_only_members_present() -> anyhow::Result<()> {
        let groups = GroupConfig {
            groups: vec![GroupSpec::bloc("G7", Selection::only(&G7))],
        };
        let rows = vec![
            RawRow::new("ITA", "2022-05-01", "Coal", 4.0),
            RawRow::new("FRA", "2022-05-01", "Coal", 1.0),
            RawRow::new("ESP", "2022-05-01", "Coal", 100.0),
            RawRow::new("ITA", "2022-06-01", "Coal", 3.0),
        ];
        let table = pipeline(groups).run(&rows)?;
        let rows = table.rows()?;
        assert_eq!(find(&rows, "G7", "2022-05", "Coal").unwrap().generation, 5.0);
        assert_eq!(find(&rows, "G7", "2022-05", TOTAL).unwrap().generation, 5.0);
        assert_eq!(find(&rows, "G7", "2022-06", "Coal").unwrap().generation, 3.0);
        assert!(table.entities()?.contains(&"G7".to_string()));
        Ok(())
    }

    #[test]
    fn annual_view_resums_monthly_values() -> anyhow::Result<()> {
        let mut rows = Vec::new();
        for month in 1..=12 {
            rows.push(RawRow::new("ITA", &format!("2019-{month:02}-01"), "Solar", 1.0));
            rows.push(RawRow::new("ITA", &format!("2020-{month:02}-01"), "Solar", 2.0));
            rows.push(RawRow::new("ITA", &format!("2020-{month:02}-01"), "Coal", 2.0));
        }
        // 2021 is a partial year
        for month in 1..=3 {
            rows.push(RawRow::new("ITA", &format!("2021-{month:02}-01"), "Solar", 10.0));
        }
        let pipeline = pipeline(GroupConfig::empty());
        let table = pipeline.run(&rows)?;
        let annual = pipeline.view(
            &table,
            &ViewFilters::default()
                .with_sources(Selection::only(&["Solar"]))
                .with_granularity(Granularity::Annual),
        )?;
        let rows = annual.rows()?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].date, "2019");
        assert_eq!(rows[0].generation, 12.0);
        assert_eq!(rows[0].share_pct, Some(100.0));
        assert_eq!(rows[0].yoy_pct, None);
        assert_eq!(rows[1].generation, 24.0);
        assert_eq!(rows[1].share_pct, Some(50.0));
        assert_eq!(rows[1].yoy_pct, Some(100.0));
        assert_eq!(rows[2].date, "2021");
        assert_eq!(rows[2].generation, 30.0);
        assert_eq!(rows[2].yoy_pct, Some(25.0));
        assert!(rows.iter().all(|r| r.boy_pct.is_none()));
        Ok(())
    }

    #[test]
    fn primary_sources_sum_to_total() -> anyhow::Result<()> {
        let sources = ["Coal", "Gas", "Hydro", "Wind", "Solar", "Bioenergy"];
        let mut rows = Vec::new();
        for (i, entity) in ["ITA", "FRA", "DEU"].iter().enumerate() {
            for month in 1..=6 {
                for (j, source) in sources.iter().enumerate() {
                    let value = ((i + 1) * (j + 3) * month) as f64 / 7.0;
                    rows.push(RawRow::new(entity, &format!("2023-{month:02}-01"), source, value));
                }
            }
        }
        let table = pipeline(GroupConfig::default()).run(&rows)?;
        let rows = table.rows()?;
        let totals: Vec<&EnrichedRow> = rows.iter().filter(|r| r.source == TOTAL).collect();
        for bloc in ["EUR", "G7", "G20", "WORLD"] {
            assert!(totals.iter().any(|t| t.entity == bloc), "no {bloc} totals");
        }
        for total in totals {
            assert_eq!(total.share_pct, Some(100.0));
            let parts: f64 = rows
                .iter()
                .filter(|r| {
                    r.entity == total.entity
                        && r.date == total.date
                        && r.source
                            .parse::<SourceLabel>()
                            .map(|s| s.is_primary())
                            .unwrap_or(false)
                })
                .map(|r| r.generation)
                .sum();
            assert!(
                (parts - total.generation).abs() <= 0.01,
                "{} {} parts {parts} total {}",
                total.entity,
                total.date,
                total.generation
            );
        }
        assert!(rows.iter().all(|r| r.yoy_pct.is_none()));
        Ok(())
    }

    #[test]
    fn default_pipeline_runs_end_to_end() -> anyhow::Result<()> {
        let rows = vec![
            RawRow::new("ITA", "2022-01-01", "Coal", 10.0),
            RawRow::new("ITA", "2022-01-01", "Wind", 5.0),
            RawRow::new("ITA", "2022-06-01", "Coal", 8.0),
            RawRow::new("ITA", "2023-01-01", "Coal", 12.0),
            RawRow::new("ITA", "2023-01-01", "Wind", 5.0),
            RawRow::new("ITA", "2023-06-01", "Coal", 6.0),
        ];
        let table = Pipeline::default().run(&rows)?;
        let rows = table.rows()?;
        assert_eq!(find(&rows, "ITA", "2023-06", "Coal").unwrap().yoy_pct, Some(-25.0));
        assert_eq!(find(&rows, "ITA", "2023-06", "Coal").unwrap().boy_pct, Some(-50.0));
        assert_eq!(find(&rows, "ITA", "2023-01", "Brown").unwrap().yoy_pct, Some(20.0));
        assert_eq!(find(&rows, "WORLD", "2023-01", TOTAL).unwrap().yoy_pct, Some(13.33));
        assert_eq!(find(&rows, "EUR", "2022-01", "Wind").unwrap().share_pct, Some(33.33));

        let annual = Pipeline::default().view(
            &table,
            &ViewFilters::default()
                .with_entities(Selection::only(&["ITA"]))
                .with_sources(Selection::only(&[TOTAL]))
                .with_granularity(Granularity::Annual),
        )?;
        let annual = annual.rows()?;
        assert_eq!(annual.len(), 2);
        // 2022: 23, 2023: 23
        assert_eq!(annual[1].yoy_pct, Some(0.0));
        Ok(())
    }

    #[test]
    fn start_month_is_applied() -> anyhow::Result<()> {
        let rows = vec![
            RawRow::new("ITA", "2013-12-01", "Coal", 1.0),
            RawRow::new("ITA", "2014-01-01", "Coal", 2.0),
        ];
        let table = Pipeline::default().run(&rows)?;
        assert_eq!(table.available_years()?, vec![2014]);
        Ok(())
    }

    #[test]
    fn empty_input_is_no_data() {
        let result = Pipeline::default().run(&[]);
        assert!(matches!(result, Err(GenmixError::NoData)));
    }
}
