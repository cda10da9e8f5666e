//! Share of each row in the total generation of its entity and date.

use polars::lazy::dsl::{col, lit, when, Expr};
use polars::prelude::{DataType, JoinArgs, JoinType, LazyFrame, NULL};

use crate::groups::TOTAL;
use crate::COL;

/// Percentage of `part` in `total`, rounded to 2 decimals. Null when the total is zero or missing;
/// the `Total` row itself is pinned to exactly 100.
pub(crate) fn share_expr(part: Expr, total: Expr) -> Expr {
    when(col(COL::SOURCE).eq(lit(TOTAL)))
        .then(lit(100.0))
        .when(total.clone().gt(lit(0.0)))
        .then((part / total * lit(100.0)).round(2))
        .otherwise(lit(NULL).cast(DataType::Float64))
}

/// Adds the share column, keyed on `keys` (the entity and the date columns of the grain).
pub(crate) fn with_shares_on(table: LazyFrame, keys: &[&str]) -> LazyFrame {
    let key_exprs: Vec<Expr> = keys.iter().map(|key| col(key)).collect();
    let totals = table
        .clone()
        .filter(col(COL::SOURCE).eq(lit(TOTAL)))
        .select(
            key_exprs
                .iter()
                .cloned()
                .chain([col(COL::GENERATION).alias(COL::TOTAL_GENERATION)])
                .collect::<Vec<_>>(),
        );
    table
        .join(
            totals,
            key_exprs.clone(),
            key_exprs,
            JoinArgs::new(JoinType::Left),
        )
        .with_column(share_expr(col(COL::GENERATION), col(COL::TOTAL_GENERATION)).alias(COL::SHARE))
        .drop([COL::TOTAL_GENERATION])
}

/// Adds `share_of_generation_pct` per (entity, month).
pub fn with_shares(table: LazyFrame) -> LazyFrame {
    with_shares_on(table, &[COL::ENTITY, COL::PERIOD])
}

#[cfg(test)]
mod tests {
    use polars::df;
    use polars::prelude::{DataFrame, IntoLazy};

    use super::*;

    fn share(df: &DataFrame, entity: &str, source: &str) -> Option<f64> {
        let filtered = df
            .clone()
            .lazy()
            .filter(
                col(COL::ENTITY)
                    .eq(lit(entity))
                    .and(col(COL::SOURCE).eq(lit(source))),
            )
            .collect()
            .unwrap();
        if filtered.height() == 0 {
            return None;
        }
        filtered.column(COL::SHARE).unwrap().f64().unwrap().get(0)
    }

    #[test]
    fn shares_are_relative_to_the_total_row() -> anyhow::Result<()> {
        let df = df!(
            COL::ENTITY => &["ITA", "ITA", "ITA", "ZER", "ZER", "MIS"],
            COL::PERIOD => &[1, 1, 1, 1, 1, 1],
            COL::SOURCE => &["Coal", "Gas", TOTAL, "Coal", TOTAL, "Coal"],
            COL::GENERATION => &[10.0, 5.0, 15.0, 0.0, 0.0, 3.0]
        )?;
        let df = with_shares(df.lazy()).collect()?;
        assert_eq!(share(&df, "ITA", "Coal"), Some(66.67));
        assert_eq!(share(&df, "ITA", "Gas"), Some(33.33));
        assert_eq!(share(&df, "ITA", TOTAL), Some(100.0));
        // Zero total: no share, but Total stays pinned at 100
        assert_eq!(share(&df, "ZER", "Coal"), None);
        assert_eq!(share(&df, "ZER", TOTAL), Some(100.0));
        // Missing total
        assert_eq!(share(&df, "MIS", "Coal"), None);
        assert!(df.column(COL::TOTAL_GENERATION).is_err());
        Ok(())
    }
}
