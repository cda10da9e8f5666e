//! Derivation of composite sources (Total, Green, Brown, ...) and multi-country blocs.

use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, info};
use polars::lazy::dsl::{col, lit, Expr};
use polars::prelude::{LazyFrame, NamedFrom, Series, UnionArgs, UniqueKeepStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{GenmixError, GenmixResult};
use crate::selection::Selection;
use crate::sources::{primary_source_names, SourceLabel, BROWN_SOURCES, GREEN_SOURCES};
use crate::COL;

/// Label of the always-derived sum over every primary source.
pub const TOTAL: &str = "Total";

pub const EUROPE: [&str; 39] = [
    "ALB", "AUT", "BEL", "BIH", "BGR", "HRV", "CYP", "CZE", "DNK", "EST", "FIN", "FRA", "DEU",
    "GRC", "HUN", "ISL", "IRL", "ITA", "LVA", "LTU", "LUX", "MLT", "MDA", "MNE", "NLD", "MKD",
    "NOR", "POL", "PRT", "ROU", "SRB", "SVK", "SVN", "ESP", "SWE", "CHE", "UKR", "GBR", "XKX",
];

pub const G7: [&str; 7] = ["CAN", "FRA", "DEU", "ITA", "JPN", "GBR", "USA"];

/// Country members of the G20. The European Union seat is a bloc itself and is left out.
pub const G20: [&str; 19] = [
    "ARG", "AUS", "BRA", "CAN", "CHN", "FRA", "DEU", "IND", "IDN", "ITA", "JPN", "KOR", "MEX",
    "RUS", "SAU", "ZAF", "TUR", "GBR", "USA",
];

/// A named aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupSpec {
    /// One row per (entity, date) summing the member sources.
    SourceSet {
        name: String,
        members: Vec<SourceLabel>,
    },
    /// One row per (date, source) summing the member countries, stamped with `name` as entity.
    Bloc { name: String, members: Selection },
}

impl GroupSpec {
    pub fn source_set(name: &str, members: &[SourceLabel]) -> Self {
        GroupSpec::SourceSet {
            name: name.to_string(),
            members: members.to_vec(),
        }
    }

    pub fn bloc(name: &str, members: Selection) -> Self {
        GroupSpec::Bloc {
            name: name.to_string(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GroupSpec::SourceSet { name, .. } | GroupSpec::Bloc { name, .. } => name,
        }
    }
}

/// Declarative list of the aggregates to derive. `Total` is always derived and is not listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupConfig {
    pub groups: Vec<GroupSpec>,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            groups: vec![
                GroupSpec::source_set(SourceLabel::Green.as_str(), &GREEN_SOURCES),
                GroupSpec::source_set(SourceLabel::Brown.as_str(), &BROWN_SOURCES),
                GroupSpec::bloc("EUR", Selection::only(&EUROPE)),
                GroupSpec::bloc("G7", Selection::only(&G7)),
                GroupSpec::bloc("G20", Selection::only(&G20)),
                GroupSpec::bloc("WORLD", Selection::All),
            ],
        }
    }
}

impl GroupConfig {
    pub fn empty() -> Self {
        Self { groups: vec![] }
    }

    pub fn bloc_names(&self) -> Vec<String> {
        self.blocs().map(|(name, _)| name.to_string()).collect()
    }

    pub fn blocs(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.groups.iter().filter_map(|group| match group {
            GroupSpec::Bloc { name, members } => Some((name.as_str(), members)),
            GroupSpec::SourceSet { .. } => None,
        })
    }

    pub fn source_sets(&self) -> impl Iterator<Item = (&str, &[SourceLabel])> {
        self.groups.iter().filter_map(|group| match group {
            GroupSpec::SourceSet { name, members } => Some((name.as_str(), members.as_slice())),
            GroupSpec::Bloc { .. } => None,
        })
    }

    /// Checks that names are unique and that source sets are disjoint sets of primary sources.
    pub fn validate(&self) -> GenmixResult<()> {
        let invalid = |msg: String| Err(GenmixError::InvalidGroupConfig(msg));
        let mut names = HashSet::new();
        for group in &self.groups {
            let name = group.name();
            if name.trim().is_empty() {
                return invalid("group names cannot be empty".into());
            }
            if name == TOTAL {
                return invalid(format!("'{TOTAL}' is always derived and cannot be configured"));
            }
            if primary_source_names().iter().any(|source| *source == name) {
                return invalid(format!("group '{name}' shadows a primary source"));
            }
            if !names.insert(name) {
                return invalid(format!("group '{name}' is defined more than once"));
            }
        }

        let mut assigned: Vec<(SourceLabel, &str)> = vec![];
        for (name, members) in self.source_sets() {
            if members.is_empty() {
                return invalid(format!("source set '{name}' has no members"));
            }
            for member in members {
                if !member.is_primary() {
                    return invalid(format!(
                        "source set '{name}' may only contain primary sources, found '{member}'"
                    ));
                }
                if let Some((_, other)) = assigned.iter().find(|(source, _)| source == member) {
                    return invalid(format!(
                        "'{member}' belongs to both '{other}' and '{name}'"
                    ));
                }
                assigned.push((*member, name));
            }
        }

        for (name, members) in self.blocs() {
            if let Selection::Only(members) = members {
                if members.is_empty() {
                    return invalid(format!("bloc '{name}' has no members"));
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn canonical_columns() -> [Expr; 6] {
    [
        col(COL::ENTITY),
        col(COL::YEAR),
        col(COL::MONTH),
        col(COL::PERIOD),
        col(COL::SOURCE),
        col(COL::GENERATION),
    ]
}

fn sum_over_sources(entity_level: LazyFrame, name: &str, precision: u32) -> LazyFrame {
    entity_level
        .group_by_stable([col(COL::ENTITY), col(COL::YEAR), col(COL::MONTH), col(COL::PERIOD)])
        .agg([col(COL::GENERATION).sum().round(precision)])
        .with_column(lit(name).alias(COL::SOURCE))
        .select(canonical_columns())
}

fn sum_over_entities(base: LazyFrame, name: &str, precision: u32) -> LazyFrame {
    base.group_by_stable([col(COL::YEAR), col(COL::MONTH), col(COL::PERIOD), col(COL::SOURCE)])
        .agg([col(COL::GENERATION).sum().round(precision)])
        .with_column(lit(name).alias(COL::ENTITY))
        .select(canonical_columns())
}

/// Appends bloc rows and source-set rows to the table.
///
/// Only primary-source rows of non-bloc entities are used as input, so derived rows already
/// present are recomputed rather than summed again. Blocs are summed first and then receive their
/// own source sets. A group without member rows at a date yields no row for that date.
pub fn aggregate(table: LazyFrame, config: &GroupConfig, precision: u32) -> GenmixResult<LazyFrame> {
    config.validate()?;
    let bloc_names = config.bloc_names();
    info!(
        "Aggregating {} blocs and {} source sets",
        bloc_names.len(),
        config.source_sets().count() + 1
    );

    let base = table
        .filter(col(COL::SOURCE).is_in(lit(Series::new("primary", primary_source_names()))))
        .filter(
            col(COL::ENTITY)
                .is_in(lit(Series::new("blocs", bloc_names.clone())))
                .not(),
        )
        .select(canonical_columns());

    let bloc_frames = config
        .blocs()
        .map(|(name, members)| {
            let members_frame = match members.to_expr(COL::ENTITY) {
                Some(expr) => base.clone().filter(expr),
                None => base.clone(),
            };
            sum_over_entities(members_frame, name, precision)
        })
        .collect_vec();

    let entity_level = polars::prelude::concat(
        std::iter::once(base).chain(bloc_frames).collect_vec(),
        UnionArgs::default(),
    )?;

    let mut frames = vec![
        entity_level.clone(),
        sum_over_sources(entity_level.clone(), TOTAL, precision),
    ];
    for (name, members) in config.source_sets() {
        debug!("Source set '{name}': {members:?}");
        let names = members.iter().map(SourceLabel::as_str).collect_vec();
        let filtered = entity_level
            .clone()
            .filter(col(COL::SOURCE).is_in(lit(Series::new("members", names))));
        frames.push(sum_over_sources(filtered, name, precision));
    }

    Ok(polars::prelude::concat(frames, UnionArgs::default())?.unique_stable(
        Some(vec![
            COL::ENTITY.to_string(),
            COL::PERIOD.to_string(),
            COL::SOURCE.to_string(),
        ]),
        UniqueKeepStrategy::First,
    ))
}

#[cfg(test)]
mod tests {
    use polars::df;
    use polars::prelude::{DataFrame, IntoLazy, SortMultipleOptions};

    use super::*;

    fn base() -> DataFrame {
        df!(
            COL::ENTITY => &["ITA", "ITA", "ITA", "FRA", "FRA", "DEU"],
            COL::YEAR => &[2020, 2020, 2020, 2020, 2020, 2020],
            COL::MONTH => &[1, 1, 1, 1, 1, 2],
            COL::PERIOD => &[24240, 24240, 24240, 24240, 24240, 24241],
            COL::SOURCE => &["Coal", "Gas", "Wind", "Coal", "Nuclear", "Coal"],
            COL::GENERATION => &[10.0, 5.0, 2.5, 1.0, 30.0, 7.0]
        )
        .unwrap()
    }

    fn generation(df: &DataFrame, entity: &str, period: i32, source: &str) -> Option<f64> {
        let filtered = df
            .clone()
            .lazy()
            .filter(
                col(COL::ENTITY)
                    .eq(lit(entity))
                    .and(col(COL::PERIOD).eq(lit(period)))
                    .and(col(COL::SOURCE).eq(lit(source))),
            )
            .collect()
            .unwrap();
        assert!(filtered.height() <= 1, "keys must be unique");
        if filtered.height() == 0 {
            return None;
        }
        filtered.column(COL::GENERATION).unwrap().f64().unwrap().get(0)
    }

    fn sorted(df: DataFrame) -> DataFrame {
        df.lazy()
            .sort_by_exprs(
                [col(COL::ENTITY), col(COL::SOURCE), col(COL::PERIOD)],
                SortMultipleOptions::default(),
            )
            .collect()
            .unwrap()
    }

    #[test]
    fn source_sets_are_summed_per_entity_and_date() -> anyhow::Result<()> {
        let df = aggregate(base().lazy(), &GroupConfig::default(), 2)?.collect()?;
        assert_eq!(generation(&df, "ITA", 24240, TOTAL), Some(17.5));
        assert_eq!(generation(&df, "ITA", 24240, "Green"), Some(2.5));
        assert_eq!(generation(&df, "ITA", 24240, "Brown"), Some(15.0));
        assert_eq!(generation(&df, "FRA", 24240, "Green"), Some(30.0));
        // No green source for Germany in February, so no Green row at all
        assert_eq!(generation(&df, "DEU", 24241, "Green"), None);
        Ok(())
    }

    #[test]
    fn blocs_only_sum_present_members() -> anyhow::Result<()> {
        let config = GroupConfig {
            groups: vec![GroupSpec::bloc("G7", Selection::only(&G7))],
        };
        let df = aggregate(base().lazy(), &config, 2)?.collect()?;
        assert_eq!(generation(&df, "G7", 24240, "Coal"), Some(11.0));
        assert_eq!(generation(&df, "G7", 24240, TOTAL), Some(48.5));
        // Only Germany reported in February
        assert_eq!(generation(&df, "G7", 24241, TOTAL), Some(7.0));
        assert_eq!(generation(&df, "G7", 24241, "Gas"), None);
        Ok(())
    }

    #[test]
    fn aggregation_is_idempotent() -> anyhow::Result<()> {
        let config = GroupConfig::default();
        let once = aggregate(base().lazy(), &config, 2)?.collect()?;
        let twice = aggregate(once.clone().lazy(), &config, 2)?.collect()?;
        assert_eq!(sorted(once), sorted(twice));
        Ok(())
    }

    #[test]
    fn blocs_never_include_other_blocs() -> anyhow::Result<()> {
        let config = GroupConfig::default();
        let once = aggregate(base().lazy(), &config, 2)?.collect()?;
        let again = aggregate(once.lazy(), &config, 2)?.collect()?;
        // WORLD covers every base entity, but not EUR/G7/G20 rows
        assert_eq!(generation(&again, "WORLD", 24240, "Coal"), Some(11.0));
        assert_eq!(generation(&again, "WORLD", 24240, TOTAL), Some(48.5));
        Ok(())
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let overlapping = GroupConfig {
            groups: vec![
                GroupSpec::source_set("Green", &GREEN_SOURCES),
                GroupSpec::source_set("Low carbon", &[SourceLabel::Nuclear]),
            ],
        };
        assert!(overlapping.validate().is_err());

        let derived_member = GroupConfig {
            groups: vec![GroupSpec::source_set("Mix", &[SourceLabel::Green])],
        };
        assert!(derived_member.validate().is_err());

        let total = GroupConfig {
            groups: vec![GroupSpec::source_set(TOTAL, &[SourceLabel::Coal])],
        };
        assert!(total.validate().is_err());

        let duplicate = GroupConfig {
            groups: vec![
                GroupSpec::bloc("G7", Selection::All),
                GroupSpec::bloc("G7", Selection::All),
            ],
        };
        assert!(duplicate.validate().is_err());

        let empty_bloc = GroupConfig {
            groups: vec![GroupSpec::bloc("NONE", Selection::Only(vec![]))],
        };
        assert!(empty_bloc.validate().is_err());

        assert!(GroupConfig::default().validate().is_ok());
    }

    #[test]
    fn nuclear_can_be_reclassified() -> anyhow::Result<()> {
        let config = GroupConfig {
            groups: vec![
                GroupSpec::source_set("Green", &GREEN_SOURCES[..5]),
                GroupSpec::source_set(
                    "Brown",
                    &[
                        SourceLabel::Coal,
                        SourceLabel::Gas,
                        SourceLabel::OtherFossil,
                        SourceLabel::Nuclear,
                    ],
                ),
            ],
        };
        let df = aggregate(base().lazy(), &config, 2)?.collect()?;
        assert_eq!(generation(&df, "FRA", 24240, "Green"), None);
        assert_eq!(generation(&df, "FRA", 24240, "Brown"), Some(31.0));
        Ok(())
    }

    #[test]
    fn config_should_deserialize() -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Wrapper {
            groups: GroupConfig,
        }
        let wrapper: Wrapper = serde_json::from_str(
            r#"{"groups": [
                {"kind": "source_set", "name": "Fossil", "members": ["Coal", "Other fossil"]},
                {"kind": "bloc", "name": "IBERIA", "members": {"only": ["ESP", "PRT"]}},
                {"kind": "bloc", "name": "WORLD", "members": "all"}
            ]}"#,
        )?;
        assert_eq!(wrapper.groups.groups.len(), 3);
        assert_eq!(
            wrapper.groups.groups[0],
            GroupSpec::source_set("Fossil", &[SourceLabel::Coal, SourceLabel::OtherFossil])
        );
        assert_eq!(wrapper.groups.bloc_names(), vec!["IBERIA", "WORLD"]);
        Ok(())
    }
}
