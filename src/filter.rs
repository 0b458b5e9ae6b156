//! Per-column filter predicates and their conjunction over a dataset.
//!
//! The predicate kind is decided by the column's dtype when the filter set
//! is built: numeric columns get an inclusive range, everything else an
//! exact-match selector with an "(All)" wildcard. Applying filters is a pure
//! function; the caller replaces its view with the result.

use color_eyre::Result;
use polars::prelude::*;

/// A per-column filter condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Inclusive `[min, max]`; a missing bound is unconstrained on that side.
    Range { min: Option<f64>, max: Option<f64> },
    /// Exact match on the string representation; `None` is the wildcard.
    Category { value: Option<String> },
}

impl Predicate {
    /// True when the predicate cannot exclude any row.
    pub fn is_unconstrained(&self) -> bool {
        match self {
            Predicate::Range { min, max } => min.is_none() && max.is_none(),
            Predicate::Category { value } => value.is_none(),
        }
    }
}

/// One column's predicate plus the context the selector UI needs.
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    pub column: String,
    pub predicate: Predicate,
    /// Observed bounds for numeric columns (seed values for the range inputs).
    pub data_min: Option<f64>,
    pub data_max: Option<f64>,
    /// Distinct values for the categorical selector, in first-appearance
    /// order, capped at construction time.
    pub choices: Vec<String>,
}

/// Build the default (unconstrained) filter set from a dataset's schema.
pub fn build_filters(df: &DataFrame, max_categories: usize) -> Result<Vec<ColumnFilter>> {
    let mut filters = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let name = column.name().to_string();
        if column.dtype().is_numeric() {
            let values = column.cast(&DataType::Float64)?;
            let values = values.f64()?;
            filters.push(ColumnFilter {
                column: name,
                predicate: Predicate::Range {
                    min: None,
                    max: None,
                },
                data_min: values.min(),
                data_max: values.max(),
                choices: Vec::new(),
            });
        } else {
            let distinct = column.as_materialized_series().unique_stable()?;
            let mut choices = Vec::new();
            for i in 0..distinct.len().min(max_categories) {
                let value = distinct.get(i)?;
                if !matches!(value, AnyValue::Null) {
                    choices.push(value.str_value().to_string());
                }
            }
            filters.push(ColumnFilter {
                column: name,
                predicate: Predicate::Category { value: None },
                data_min: None,
                data_max: None,
                choices,
            });
        }
    }
    Ok(filters)
}

/// Translate one filter into a polars expression, or None when it cannot
/// exclude anything.
fn filter_expr(filter: &ColumnFilter) -> Option<Expr> {
    match &filter.predicate {
        Predicate::Range { min, max } => {
            let mut expr: Option<Expr> = None;
            if let Some(min) = min {
                expr = Some(col(filter.column.as_str()).gt_eq(lit(*min)));
            }
            if let Some(max) = max {
                let upper = col(filter.column.as_str()).lt_eq(lit(*max));
                expr = Some(match expr {
                    Some(e) => e.and(upper),
                    None => upper,
                });
            }
            expr
        }
        Predicate::Category { value } => value.as_ref().map(|v| {
            col(filter.column.as_str())
                .cast(DataType::String)
                .eq(lit(v.clone()))
        }),
    }
}

/// Keep rows satisfying every supplied predicate (conjunction). Predicates
/// naming a column absent from the frame are skipped; an empty or fully
/// unconstrained set returns a copy of the input.
pub fn apply_filters(df: &DataFrame, filters: &[ColumnFilter]) -> Result<DataFrame> {
    let mut combined: Option<Expr> = None;
    for filter in filters {
        if df.column(&filter.column).is_err() {
            continue;
        }
        if let Some(expr) = filter_expr(filter) {
            combined = Some(match combined {
                Some(e) => e.and(expr),
                None => expr,
            });
        }
    }
    match combined {
        Some(expr) => Ok(df.clone().lazy().filter(expr).collect()?),
        None => Ok(df.clone()),
    }
}
