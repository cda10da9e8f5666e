//! Generation source labels and the fixed chart palette.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// A primary generation technology, or one of the derived buckets introduced by aggregation.
///
/// String forms match the series names used by the Ember API.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
pub enum SourceLabel {
    Coal,
    Gas,
    #[serde(rename = "Other fossil")]
    #[strum(serialize = "Other fossil")]
    OtherFossil,
    Nuclear,
    Solar,
    Wind,
    Hydro,
    Bioenergy,
    #[serde(rename = "Other renewables")]
    #[strum(serialize = "Other renewables")]
    OtherRenewables,
    Total,
    Green,
    Brown,
}

pub const PRIMARY_SOURCES: [SourceLabel; 9] = [
    SourceLabel::Coal,
    SourceLabel::Gas,
    SourceLabel::OtherFossil,
    SourceLabel::Nuclear,
    SourceLabel::Solar,
    SourceLabel::Wind,
    SourceLabel::Hydro,
    SourceLabel::Bioenergy,
    SourceLabel::OtherRenewables,
];

/// Stacking order of sources in charts.
pub const ORDERED_SOURCES: [SourceLabel; 9] = PRIMARY_SOURCES;

/// Default members of the `Green` bucket. Nuclear is counted as green here; override through
/// `GroupConfig` to classify it differently.
pub const GREEN_SOURCES: [SourceLabel; 6] = [
    SourceLabel::Bioenergy,
    SourceLabel::Hydro,
    SourceLabel::Solar,
    SourceLabel::Wind,
    SourceLabel::OtherRenewables,
    SourceLabel::Nuclear,
];

pub const BROWN_SOURCES: [SourceLabel; 3] =
    [SourceLabel::Coal, SourceLabel::Gas, SourceLabel::OtherFossil];

impl SourceLabel {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    pub fn is_primary(&self) -> bool {
        PRIMARY_SOURCES.contains(self)
    }

    /// Chart colour of a primary source. Derived buckets have no fixed colour.
    pub fn color(&self) -> Option<&'static str> {
        match self {
            SourceLabel::Coal => Some("#4d4d4d"),
            SourceLabel::OtherFossil => Some("#a6a6a6"),
            SourceLabel::Gas => Some("#b5651d"),
            SourceLabel::Nuclear => Some("#ffdd44"),
            SourceLabel::Solar => Some("#87CEEB"),
            SourceLabel::Wind => Some("#aec7e8"),
            SourceLabel::Hydro => Some("#1f77b4"),
            SourceLabel::Bioenergy => Some("#2ca02c"),
            SourceLabel::OtherRenewables => Some("#17becf"),
            SourceLabel::Total | SourceLabel::Green | SourceLabel::Brown => None,
        }
    }
}

/// Source to colour mapping in `ORDERED_SOURCES` order.
pub fn color_map() -> Vec<(SourceLabel, &'static str)> {
    ORDERED_SOURCES
        .iter()
        .filter_map(|source| source.color().map(|color| (*source, color)))
        .collect()
}

pub(crate) fn primary_source_names() -> Vec<&'static str> {
    PRIMARY_SOURCES.iter().map(SourceLabel::as_str).collect()
}
