use std::fmt::Display;
use std::str::FromStr;

use polars::lazy::dsl::{col, lit, Expr};
use polars::prelude::{NamedFrom, Series};
use serde::{Deserialize, Serialize};

use crate::error::GenmixError;

/// A set of values picked by the user, with an "everything" wildcard.
///
/// In configuration files this is written as `"all"` or `{ only = ["ITA", "FRA"] }`; on the
/// command line as `all`, `*` or a comma-separated list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    All,
    Only(Vec<String>),
}

impl Selection {
    pub fn only<S: AsRef<str>>(values: &[S]) -> Self {
        Selection::Only(values.iter().map(|v| v.as_ref().to_string()).collect())
    }

    pub fn contains(&self, value: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(values) => values.iter().any(|v| v == value),
        }
    }

    /// A filter expression over `column`, or `None` when everything is selected.
    pub fn to_expr(&self, column: &str) -> Option<Expr> {
        match self {
            Selection::All => None,
            Selection::Only(values) => {
                Some(col(column).is_in(lit(Series::new("selection", values.clone()))))
            }
        }
    }
}

impl FromStr for Selection {
    type Err = GenmixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s == "*" {
            return Ok(Selection::All);
        }
        let values: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        if values.is_empty() {
            return Err(GenmixError::InvalidSelection(format!(
                "empty selection '{s}'"
            )));
        }
        Ok(Selection::Only(values))
    }
}

impl Display for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selection::All => write!(f, "all"),
            Selection::Only(values) => write!(f, "{}", values.join(",")),
        }
    }
}
