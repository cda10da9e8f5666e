//! This module stores the column names of the generation tables. Raw-row columns match the field
//! names returned by the Ember API so that a raw export can be replayed through `CsvSource`.

pub const ENTITY: &str = "entity_code";
pub const SOURCE: &str = "series";
pub const GENERATION: &str = "generation_twh";
pub const RAW_DATE: &str = "date";
pub const RAW_SHARE: &str = "share_of_generation_pct";

pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
/// Linear month index, `year * 12 + (month - 1)`.
pub const PERIOD: &str = "period";

pub const SHARE: &str = "share_of_generation_pct";
pub const YOY: &str = "yoy_pct";
pub const BOY: &str = "boy_pct";

/// Human readable date label of a view row (`MM-YYYY` or `YYYY`).
pub const DATE: &str = "date";

// Intermediate join columns, never part of an output table
pub const TOTAL_GENERATION: &str = "total_generation_twh";
pub const PREVIOUS_YEAR_GENERATION: &str = "generation_twh_previous_year";
pub const JANUARY_GENERATION: &str = "generation_twh_january";
