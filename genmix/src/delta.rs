//! Year-over-year and beginning-of-year percentage changes per (entity, source) series.

use polars::lazy::dsl::{col, lit, when, Expr};
use polars::prelude::{DataType, JoinArgs, JoinType, LazyFrame, NULL};
use serde::{Deserialize, Serialize};

use crate::COL;

/// How to report a percentage change when the reference value is exactly zero.
///
/// Mathematically the change is undefined. `Zero` reports 0% so that a true-zero baseline does not
/// propagate nulls; `Null` leaves the cell empty like a missing reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroBaseline {
    #[default]
    Zero,
    Null,
}

/// `round((current - reference) / reference * 100, 2)`, null when the reference is null.
pub(crate) fn percent_change(current: Expr, reference: Expr, zero_baseline: ZeroBaseline) -> Expr {
    let change = ((current - reference.clone()) / reference.clone() * lit(100.0)).round(2);
    let on_zero = match zero_baseline {
        ZeroBaseline::Zero => lit(0.0),
        ZeroBaseline::Null => lit(NULL).cast(DataType::Float64),
    };
    when(reference.eq(lit(0.0)))
        .then(on_zero)
        .otherwise(change)
}

/// Joins each row to the row of the same series `lag` steps earlier on the `step` column and adds
/// the percentage change as `alias`.
pub(crate) fn with_lagged_change(
    table: LazyFrame,
    step: &str,
    lag: i32,
    alias: &str,
    zero_baseline: ZeroBaseline,
) -> LazyFrame {
    let previous = table.clone().select([
        col(COL::ENTITY),
        col(COL::SOURCE),
        (col(step) + lit(lag).cast(DataType::Int32)).alias(step),
        col(COL::GENERATION).alias(COL::PREVIOUS_YEAR_GENERATION),
    ]);
    let keys = [col(COL::ENTITY), col(COL::SOURCE), col(step)];
    table
        .join(previous, keys.clone(), keys, JoinArgs::new(JoinType::Left))
        .with_column(
            percent_change(
                col(COL::GENERATION),
                col(COL::PREVIOUS_YEAR_GENERATION),
                zero_baseline,
            )
            .alias(alias),
        )
        .drop([COL::PREVIOUS_YEAR_GENERATION])
}

/// Adds `yoy_pct` (against the same month one year earlier) and `boy_pct` (against January of the
/// same year). A missing reference row leaves the cell null.
pub fn with_deltas(table: LazyFrame, zero_baseline: ZeroBaseline) -> LazyFrame {
    let with_yoy = with_lagged_change(table, COL::PERIOD, 12, COL::YOY, zero_baseline);

    let january = with_yoy.clone().filter(col(COL::MONTH).eq(lit(1))).select([
        col(COL::ENTITY),
        col(COL::SOURCE),
        col(COL::YEAR),
        col(COL::GENERATION).alias(COL::JANUARY_GENERATION),
    ]);
    let keys = [col(COL::ENTITY), col(COL::SOURCE), col(COL::YEAR)];
    with_yoy
        .join(january, keys.clone(), keys, JoinArgs::new(JoinType::Left))
        .with_column(
            percent_change(
                col(COL::GENERATION),
                col(COL::JANUARY_GENERATION),
                zero_baseline,
            )
            .alias(COL::BOY),
        )
        .drop([COL::JANUARY_GENERATION])
}
