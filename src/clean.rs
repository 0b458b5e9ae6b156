//! Interactive cleaning operations over the working copy.
//!
//! Every operation is atomic: it either produces the next working copy or
//! fails with a typed [`CleanError`] and leaves the input untouched. Commit
//! and rollback live in the store; this module is pure frame-in, frame-out.

use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;

use crate::loader::parse_naive_datetime_str;

/// Errors surfaced to the user by cleaning operations.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("{method} fill requires a numeric column, but '{column}' is {dtype}")]
    TypeMismatch {
        method: &'static str,
        column: String,
        dtype: DataType,
    },

    #[error("cannot convert '{column}' to {target}: {failures} value(s) would not parse")]
    ConversionFailed {
        column: String,
        target: &'static str,
        failures: usize,
    },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

pub type CleanResult<T> = std::result::Result<T, CleanError>;

/// How missing cells in a column are replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum FillMethod {
    Mean,
    Median,
    Mode,
    Constant(String),
    ForwardFill,
    BackwardFill,
}

impl FillMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillMethod::Mean => "mean",
            FillMethod::Median => "median",
            FillMethod::Mode => "mode",
            FillMethod::Constant(_) => "constant",
            FillMethod::ForwardFill => "forward fill",
            FillMethod::BackwardFill => "backward fill",
        }
    }
}

/// Which occurrence survives deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepPolicy {
    First,
    Last,
    /// Remove every member of any duplicate group.
    None,
}

impl KeepPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeepPolicy::First => "keep first",
            KeepPolicy::Last => "keep last",
            KeepPolicy::None => "remove all",
        }
    }
}

/// Target of a column type conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Text,
    Integer,
    Float,
    Boolean,
    Datetime,
}

impl TargetType {
    pub const ALL: [Self; 5] = [
        Self::Text,
        Self::Integer,
        Self::Float,
        Self::Boolean,
        Self::Datetime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Text => "text",
            TargetType::Integer => "integer",
            TargetType::Float => "float",
            TargetType::Boolean => "boolean",
            TargetType::Datetime => "datetime",
        }
    }
}

/// One user-invoked cleaning operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CleanOp {
    FillMissing {
        column: String,
        method: FillMethod,
    },
    DropMissingRows,
    /// Remove only rows where every cell is missing.
    DropAllMissingRows,
    DropMissingColumns {
        threshold: f64,
    },
    DropDuplicates {
        subset: Vec<String>,
        keep: KeepPolicy,
    },
    CastColumn {
        column: String,
        target: TargetType,
    },
    NormalizeText {
        column: String,
        trim: bool,
        lowercase: bool,
        strip_special: bool,
    },
}

/// Apply one operation, producing the next working copy. Operations on an
/// empty frame are silent no-ops; the panel layer guards empty selections
/// the same way.
pub fn apply_op(df: &DataFrame, op: &CleanOp) -> CleanResult<DataFrame> {
    if df.width() == 0 {
        return Ok(df.clone());
    }
    match op {
        CleanOp::FillMissing { column, method } => fill_missing(df, column, method),
        CleanOp::DropMissingRows => Ok(df.clone().lazy().drop_nulls(None).collect()?),
        CleanOp::DropAllMissingRows => drop_all_missing_rows(df),
        CleanOp::DropMissingColumns { threshold } => drop_missing_columns(df, *threshold),
        CleanOp::DropDuplicates { subset, keep } => drop_duplicates(df, subset, *keep),
        CleanOp::CastColumn { column, target } => cast_column(df, column, *target),
        CleanOp::NormalizeText {
            column,
            trim,
            lowercase,
            strip_special,
        } => normalize_text(df, column, *trim, *lowercase, *strip_special),
    }
}

fn require_column<'a>(df: &'a DataFrame, column: &str) -> CleanResult<&'a Column> {
    df.column(column)
        .map_err(|_| CleanError::ColumnNotFound(column.to_string()))
}

fn fill_missing(df: &DataFrame, column: &str, method: &FillMethod) -> CleanResult<DataFrame> {
    if column.is_empty() {
        return Ok(df.clone());
    }
    let series = require_column(df, column)?;
    if series.null_count() == 0 {
        return Ok(df.clone());
    }

    let expr = match method {
        FillMethod::Mean | FillMethod::Median => {
            if !series.dtype().is_numeric() {
                return Err(CleanError::TypeMismatch {
                    method: if matches!(method, FillMethod::Mean) {
                        "mean"
                    } else {
                        "median"
                    },
                    column: column.to_string(),
                    dtype: series.dtype().clone(),
                });
            }
            let stat = if matches!(method, FillMethod::Mean) {
                col(column).mean()
            } else {
                col(column).median()
            };
            col(column).fill_null(stat)
        }
        FillMethod::Mode => return fill_with_mode(df, column),
        FillMethod::Constant(text) => {
            // Speculative numeric parse; text columns take the input
            // verbatim so "2" does not become "2.0".
            let literal = match text.trim().parse::<f64>() {
                Ok(n) if series.dtype().is_numeric() => lit(n),
                _ => lit(text.clone()),
            };
            col(column).fill_null(literal)
        }
        FillMethod::ForwardFill => col(column).fill_null_with_strategy(FillNullStrategy::Forward(None)),
        FillMethod::BackwardFill => col(column).fill_null_with_strategy(FillNullStrategy::Backward(None)),
    };
    Ok(df.clone().lazy().with_column(expr.alias(column)).collect()?)
}

/// Fill missing cells with the first most-frequent non-missing value. Ties
/// are broken by the smallest string representation so fills are
/// deterministic. A fully missing column is left unchanged.
fn fill_with_mode(df: &DataFrame, column: &str) -> CleanResult<DataFrame> {
    let series = require_column(df, column)?.as_materialized_series();
    let non_missing = series.drop_nulls();
    if non_missing.is_empty() {
        return Ok(df.clone());
    }
    let counts = non_missing.value_counts(true, false, "counts".into(), false)?;
    let count_col = counts.column("counts")?.cast(&DataType::UInt64)?;
    let count_col = count_col.u64()?;
    let top = count_col.get(0).unwrap_or(0);

    let value_col = counts.column(series.name().as_str())?;
    let mut chosen = 0usize;
    let mut chosen_repr: Option<String> = None;
    for i in 0..counts.height() {
        if count_col.get(i) != Some(top) {
            break;
        }
        let repr = value_col.get(i)?.str_value().to_string();
        if chosen_repr.as_ref().is_none_or(|best| repr < *best) {
            chosen_repr = Some(repr);
            chosen = i;
        }
    }

    let fill = value_col
        .slice(chosen as i64, 1)
        .as_materialized_series()
        .new_from_index(0, series.len());
    let filled = series.zip_with(&series.is_not_null(), &fill)?;
    let mut out = df.clone();
    out.with_column(filled)?;
    Ok(out)
}

fn drop_all_missing_rows(df: &DataFrame) -> CleanResult<DataFrame> {
    let mut any_present: Option<Expr> = None;
    for name in df.get_column_names() {
        let present = col(name.as_str()).is_not_null();
        any_present = Some(match any_present {
            Some(e) => e.or(present),
            None => present,
        });
    }
    match any_present {
        Some(expr) => Ok(df.clone().lazy().filter(expr).collect()?),
        None => Ok(df.clone()),
    }
}

/// Keep columns whose missing fraction is at most `threshold`. The boundary
/// is inclusive so that 0.0 keeps exactly the fully populated columns and
/// 1.0 keeps everything.
fn drop_missing_columns(df: &DataFrame, threshold: f64) -> CleanResult<DataFrame> {
    if df.height() == 0 {
        return Ok(df.clone());
    }
    let height = df.height() as f64;
    let keep: Vec<&str> = df
        .get_columns()
        .iter()
        .filter(|c| (c.null_count() as f64 / height) <= threshold)
        .map(|c| c.name().as_str())
        .collect();
    Ok(df.select(keep)?)
}

fn drop_duplicates(df: &DataFrame, subset: &[String], keep: KeepPolicy) -> CleanResult<DataFrame> {
    let subset = if subset.is_empty() {
        None
    } else {
        Some(subset)
    };
    let strategy = match keep {
        KeepPolicy::First => UniqueKeepStrategy::First,
        KeepPolicy::Last => UniqueKeepStrategy::Last,
        KeepPolicy::None => UniqueKeepStrategy::None,
    };
    Ok(df.unique_stable(subset, strategy, None)?)
}

fn cast_column(df: &DataFrame, column: &str, target: TargetType) -> CleanResult<DataFrame> {
    if column.is_empty() {
        return Ok(df.clone());
    }
    let series = require_column(df, column)?;

    let casted = match target {
        TargetType::Datetime => cast_to_datetime(series)?,
        _ => {
            let dtype = match target {
                TargetType::Text => DataType::String,
                TargetType::Integer => DataType::Int64,
                TargetType::Float => DataType::Float64,
                TargetType::Boolean => DataType::Boolean,
                TargetType::Datetime => unreachable!(),
            };
            let casted = series.cast(&dtype)?;
            // Non-strict casts turn unparseable values into nulls; any new
            // null means the conversion must fail atomically.
            let failures = casted.null_count().saturating_sub(series.null_count());
            if failures > 0 {
                return Err(CleanError::ConversionFailed {
                    column: column.to_string(),
                    target: target.as_str(),
                    failures,
                });
            }
            casted
        }
    };

    let mut out = df.clone();
    out.with_column(casted.as_materialized_series().clone())?;
    Ok(out)
}

/// Datetime coercion is deliberately non-strict: each value is parsed with a
/// fixed format list and failures become missing cells.
fn cast_to_datetime(column: &Column) -> CleanResult<Column> {
    if matches!(column.dtype(), DataType::Datetime(_, _) | DataType::Date) {
        return Ok(column.cast(&DataType::Datetime(TimeUnit::Microseconds, None))?);
    }
    let mut stamps: Vec<Option<i64>> = Vec::with_capacity(column.len());
    for i in 0..column.len() {
        let value = column.get(i)?;
        let stamp = match value {
            AnyValue::Null => None,
            other => parse_naive_datetime_str(&other.str_value())
                .map(|dt| dt.and_utc().timestamp_micros()),
        };
        stamps.push(stamp);
    }
    let series = Series::new(column.name().clone(), stamps)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
    Ok(series.into())
}

fn normalize_text(
    df: &DataFrame,
    column: &str,
    trim: bool,
    lowercase: bool,
    strip_special: bool,
) -> CleanResult<DataFrame> {
    if column.is_empty() || !(trim || lowercase || strip_special) {
        return Ok(df.clone());
    }
    require_column(df, column)?;
    let mut expr = col(column).cast(DataType::String);
    if trim {
        expr = expr.str().strip_chars(lit(NULL));
    }
    if lowercase {
        expr = expr.str().to_lowercase();
    }
    if strip_special {
        expr = expr
            .str()
            .replace_all(lit(r"[^a-zA-Z0-9\s]"), lit(""), false);
    }
    Ok(df.clone().lazy().with_column(expr.alias(column)).collect()?)
}

/// Per-column missing counts for the cleaning panel.
#[derive(Debug, Clone, Default)]
pub struct MissingSummary {
    pub total_cells: usize,
    pub total_missing: usize,
    /// (column, missing count, missing fraction), columns with misses only.
    pub per_column: Vec<(String, usize, f64)>,
}

pub fn missing_summary(df: &DataFrame) -> MissingSummary {
    let height = df.height();
    let mut summary = MissingSummary {
        total_cells: height * df.width(),
        ..Default::default()
    };
    for column in df.get_columns() {
        let nulls = column.null_count();
        summary.total_missing += nulls;
        if nulls > 0 && height > 0 {
            summary.per_column.push((
                column.name().to_string(),
                nulls,
                nulls as f64 / height as f64,
            ));
        }
    }
    summary
}

/// Add integer codes for a column's values by first appearance, in a new
/// `<column>_code` column. Missing cells stay missing.
pub fn encode_categories(df: &DataFrame, column: &str) -> CleanResult<DataFrame> {
    let series = require_column(df, column)?;
    let mut seen: HashMap<String, i64> = HashMap::new();
    let mut codes: Vec<Option<i64>> = Vec::with_capacity(series.len());
    for i in 0..series.len() {
        let value = series.get(i)?;
        if matches!(value, AnyValue::Null) {
            codes.push(None);
            continue;
        }
        let repr = value.str_value().to_string();
        let next = seen.len() as i64;
        codes.push(Some(*seen.entry(repr).or_insert(next)));
    }
    let mut out = df.clone();
    out.with_column(Series::new(format!("{}_code", column).into(), codes))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_missing() -> DataFrame {
        df!(
            "age" => &[Some(25.0f64), None, Some(40.0)],
            "name" => &[Some("ann"), Some("bob"), None]
        )
        .unwrap()
    }

    #[test]
    fn fill_mean_example() {
        let out = apply_op(
            &with_missing(),
            &CleanOp::FillMissing {
                column: "age".into(),
                method: FillMethod::Mean,
            },
        )
        .unwrap();
        let age: Vec<f64> = out
            .column("age")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(age, vec![25.0, 32.5, 40.0]);
        // Only missing cells were touched.
        let names = out.column("name").unwrap();
        assert_eq!(names.null_count(), 1);
    }

    #[test]
    fn fill_median() {
        let df = df!("v" => &[Some(1.0f64), Some(2.0), Some(10.0), None]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::FillMissing {
                column: "v".into(),
                method: FillMethod::Median,
            },
        )
        .unwrap();
        assert_eq!(out.column("v").unwrap().f64().unwrap().get(3), Some(2.0));
    }

    #[test]
    fn fill_mean_on_text_is_type_mismatch() {
        let err = apply_op(
            &with_missing(),
            &CleanOp::FillMissing {
                column: "name".into(),
                method: FillMethod::Mean,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CleanError::TypeMismatch { .. }));
    }

    #[test]
    fn fill_mode_takes_most_frequent() {
        let df = df!("c" => &[Some("y"), Some("x"), Some("x"), None]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::FillMissing {
                column: "c".into(),
                method: FillMethod::Mode,
            },
        )
        .unwrap();
        let c = out.column("c").unwrap().str().unwrap();
        assert_eq!(c.get(3), Some("x"));
    }

    #[test]
    fn fill_mode_breaks_ties_deterministically() {
        let df = df!("c" => &[Some("b"), Some("a"), None]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::FillMissing {
                column: "c".into(),
                method: FillMethod::Mode,
            },
        )
        .unwrap();
        assert_eq!(out.column("c").unwrap().str().unwrap().get(2), Some("a"));
    }

    #[test]
    fn fill_mode_all_missing_is_noop() {
        let df = df!("c" => &[None::<&str>, None]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::FillMissing {
                column: "c".into(),
                method: FillMethod::Mode,
            },
        )
        .unwrap();
        assert_eq!(out.column("c").unwrap().null_count(), 2);
    }

    #[test]
    fn fill_constant_parses_numbers_for_numeric_columns() {
        let out = apply_op(
            &with_missing(),
            &CleanOp::FillMissing {
                column: "age".into(),
                method: FillMethod::Constant("7".into()),
            },
        )
        .unwrap();
        assert_eq!(out.column("age").unwrap().f64().unwrap().get(1), Some(7.0));
    }

    #[test]
    fn fill_constant_keeps_text_verbatim() {
        let out = apply_op(
            &with_missing(),
            &CleanOp::FillMissing {
                column: "name".into(),
                method: FillMethod::Constant("42".into()),
            },
        )
        .unwrap();
        assert_eq!(out.column("name").unwrap().str().unwrap().get(2), Some("42"));
    }

    #[test]
    fn forward_and_backward_fill() {
        let df = df!("v" => &[None, Some(1.0f64), None, Some(3.0)]).unwrap();
        let ffill = apply_op(
            &df,
            &CleanOp::FillMissing {
                column: "v".into(),
                method: FillMethod::ForwardFill,
            },
        )
        .unwrap();
        let v = ffill.column("v").unwrap().f64().unwrap();
        // Nothing precedes row 0, so it stays missing.
        assert_eq!(v.get(0), None);
        assert_eq!(v.get(2), Some(1.0));

        let bfill = apply_op(
            &df,
            &CleanOp::FillMissing {
                column: "v".into(),
                method: FillMethod::BackwardFill,
            },
        )
        .unwrap();
        let v = bfill.column("v").unwrap().f64().unwrap();
        assert_eq!(v.get(0), Some(1.0));
        assert_eq!(v.get(2), Some(3.0));
    }

    #[test]
    fn drop_missing_rows_removes_any_missing() {
        let out = apply_op(&with_missing(), &CleanOp::DropMissingRows).unwrap();
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn drop_all_missing_rows_keeps_partial_rows() {
        let df = df!(
            "a" => &[Some(1i64), None, None],
            "b" => &[Some("x"), Some("y"), None]
        )
        .unwrap();
        let out = apply_op(&df, &CleanOp::DropAllMissingRows).unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn threshold_zero_keeps_only_complete_columns() {
        let out = apply_op(
            &with_missing(),
            &CleanOp::DropMissingColumns { threshold: 0.0 },
        )
        .unwrap();
        assert_eq!(out.width(), 0);

        let df = df!("full" => &[1i64, 2], "holey" => &[Some(1i64), None]).unwrap();
        let out = apply_op(&df, &CleanOp::DropMissingColumns { threshold: 0.0 }).unwrap();
        assert_eq!(out.get_column_names(), vec!["full"]);
    }

    #[test]
    fn threshold_one_keeps_everything() {
        let df = df!("empty" => &[None::<i64>, None], "full" => &[1i64, 2]).unwrap();
        let out = apply_op(&df, &CleanOp::DropMissingColumns { threshold: 1.0 }).unwrap();
        assert_eq!(out.width(), 2);
    }

    fn dupes() -> DataFrame {
        df!(
            "k" => &["a", "b", "a", "c"],
            "v" => &[1i64, 2, 3, 4]
        )
        .unwrap()
    }

    #[test]
    fn dedup_keep_first() {
        let out = apply_op(
            &dupes(),
            &CleanOp::DropDuplicates {
                subset: vec!["k".into()],
                keep: KeepPolicy::First,
            },
        )
        .unwrap();
        assert_eq!(out.height(), 3);
        let v: Vec<i64> = out
            .column("v")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(v, vec![1, 2, 4]);
    }

    #[test]
    fn dedup_keep_last() {
        let out = apply_op(
            &dupes(),
            &CleanOp::DropDuplicates {
                subset: vec!["k".into()],
                keep: KeepPolicy::Last,
            },
        )
        .unwrap();
        let v: Vec<i64> = out
            .column("v")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(v, vec![2, 3, 4]);
    }

    #[test]
    fn dedup_keep_none_removes_whole_groups() {
        let out = apply_op(
            &dupes(),
            &CleanOp::DropDuplicates {
                subset: vec!["k".into()],
                keep: KeepPolicy::None,
            },
        )
        .unwrap();
        let k: Vec<&str> = out
            .column("k")
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(k, vec!["b", "c"]);
    }

    #[test]
    fn dedup_empty_subset_uses_all_columns() {
        let df = df!("a" => &[1i64, 1, 2], "b" => &["x", "x", "y"]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::DropDuplicates {
                subset: vec![],
                keep: KeepPolicy::First,
            },
        )
        .unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn cast_text_to_int() {
        let df = df!("v" => &["1", "2", "3"]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::CastColumn {
                column: "v".into(),
                target: TargetType::Integer,
            },
        )
        .unwrap();
        assert_eq!(out.column("v").unwrap().dtype(), &DataType::Int64);
    }

    #[test]
    fn cast_failure_is_atomic() {
        let df = df!("v" => &["1", "oops", "3"]).unwrap();
        let err = apply_op(
            &df,
            &CleanOp::CastColumn {
                column: "v".into(),
                target: TargetType::Integer,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CleanError::ConversionFailed { failures: 1, .. }
        ));
    }

    #[test]
    fn cast_datetime_is_non_strict() {
        let df = df!("v" => &["2024-01-01", "garbage", "2024-03-05 08:00:00"]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::CastColumn {
                column: "v".into(),
                target: TargetType::Datetime,
            },
        )
        .unwrap();
        let v = out.column("v").unwrap();
        assert!(matches!(v.dtype(), DataType::Datetime(_, _)));
        assert_eq!(v.null_count(), 1);
    }

    #[test]
    fn normalize_text_applies_flags_in_order() {
        let df = df!("t" => &["  Hello, World!  ", "A-B_c"]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::NormalizeText {
                column: "t".into(),
                trim: true,
                lowercase: true,
                strip_special: true,
            },
        )
        .unwrap();
        let t = out.column("t").unwrap().str().unwrap();
        assert_eq!(t.get(0), Some("hello world"));
        assert_eq!(t.get(1), Some("abc"));
    }

    #[test]
    fn normalize_text_stringifies_non_text() {
        let df = df!("n" => &[1i64, 22]).unwrap();
        let out = apply_op(
            &df,
            &CleanOp::NormalizeText {
                column: "n".into(),
                trim: true,
                lowercase: false,
                strip_special: false,
            },
        )
        .unwrap();
        assert_eq!(out.column("n").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn missing_summary_counts() {
        let summary = missing_summary(&with_missing());
        assert_eq!(summary.total_cells, 6);
        assert_eq!(summary.total_missing, 2);
        assert_eq!(summary.per_column.len(), 2);
    }

    #[test]
    fn encode_categories_first_appearance() {
        let df = df!("c" => &[Some("b"), Some("a"), Some("b"), None]).unwrap();
        let out = encode_categories(&df, "c").unwrap();
        let codes = out.column("c_code").unwrap().i64().unwrap();
        assert_eq!(codes.get(0), Some(0));
        assert_eq!(codes.get(1), Some(1));
        assert_eq!(codes.get(2), Some(0));
        assert_eq!(codes.get(3), None);
    }
}
