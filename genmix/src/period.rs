//! Calendar months and year ranges.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Utc};
use polars::lazy::dsl::{col, lit, Expr};
use serde::{Deserialize, Serialize};

use crate::error::GenmixError;
use crate::COL;

/// A calendar month. Any day component is dropped on parsing, so every `YearMonth` stands for the
/// first day of its month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Linear month index used for offset arithmetic: `year * 12 + (month - 1)`.
    pub fn period(&self) -> i32 {
        self.year * 12 + self.month as i32 - 1
    }

    pub fn from_period(period: i32) -> Self {
        Self {
            year: period.div_euclid(12),
            month: period.rem_euclid(12) as u32 + 1,
        }
    }

    /// Shift by a (possibly negative) number of months.
    pub fn offset(&self, months: i32) -> Self {
        Self::from_period(self.period() + months)
    }

    /// January of the same year.
    pub fn beginning_of_year(&self) -> Self {
        Self {
            year: self.year,
            month: 1,
        }
    }

    /// Label used by monthly views, e.g. `03-2021`.
    pub fn label(&self) -> String {
        format!("{:02}-{}", self.month, self.year)
    }

    /// The month before the current one, used when the source cannot tell us its latest month.
    pub fn previous_to_today() -> Self {
        Self::from(Utc::now().date_naive()).offset(-1)
    }
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl FromStr for YearMonth {
    type Err = GenmixError;

    /// Accepts `YYYY-MM` and `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d"))
            .map(Self::from)
            .map_err(|_| GenmixError::InvalidPeriod(s.to_string()))
    }
}

impl TryFrom<String> for YearMonth {
    type Error = GenmixError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Filter over calendar years. All ranges are inclusive.
#[derive(PartialEq, Eq, Clone, Debug, Deserialize, Serialize)]
pub enum YearRange {
    Before(i32),
    After(i32),
    Between(i32, i32),
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        match self {
            YearRange::Before(end) => year <= *end,
            YearRange::After(start) => year >= *start,
            YearRange::Between(start, end) => (*start..=*end).contains(&year),
        }
    }
}

impl FromStr for YearRange {
    type Err = GenmixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GenmixError::InvalidSelection(format!("invalid year range '{s}'"));
        let parts: Vec<Option<i32>> = s
            .trim()
            .split("...")
            .map(|value| {
                if value.is_empty() {
                    Ok(None)
                } else {
                    value.parse::<i32>().map(Some).map_err(|_| invalid())
                }
            })
            .collect::<Result<_, _>>()?;
        match parts.as_slice() {
            [Some(a)] => Ok(YearRange::Between(*a, *a)),
            [None, Some(a)] => Ok(YearRange::Before(*a)),
            [Some(a), None] => Ok(YearRange::After(*a)),
            [Some(a), Some(b)] if a <= b => Ok(YearRange::Between(*a, *b)),
            _ => Err(invalid()),
        }
    }
}

/// Parses comma-separated year ranges, e.g. `2015,2019...2021`.
pub fn parse_year_ranges(value: &str) -> Result<Vec<YearRange>, GenmixError> {
    value.split(',').map(YearRange::from_str).collect()
}

impl From<&YearRange> for Expr {
    fn from(value: &YearRange) -> Self {
        match value {
            YearRange::Before(year) => col(COL::YEAR).lt_eq(lit(*year)),
            YearRange::After(year) => col(COL::YEAR).gt_eq(lit(*year)),
            YearRange::Between(start, end) => col(COL::YEAR)
                .gt_eq(lit(*start))
                .and(col(COL::YEAR).lt_eq(lit(*end))),
        }
    }
}
