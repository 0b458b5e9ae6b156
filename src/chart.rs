//! Chart request translation: filter, aggregate, and sort the data, then
//! shape it into renderable series for the plotting routines.
//!
//! The adapter never draws; it validates the request, runs the
//! pre-processing pipeline (filters → aggregation → sort), and produces a
//! [`PreparedChart`] that `chart_export` maps onto plotters calls.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;
use std::collections::HashMap;

/// Rows fed into a single chart are capped to keep rendering responsive.
const CHART_ROW_LIMIT: usize = 10_000;
/// Hue partitions beyond this are dropped (palette cycling gets unreadable).
const MAX_HUE_SERIES: usize = 12;
/// Facet values per axis are capped to keep the grid legible.
const MAX_FACET_VALUES: usize = 4;
/// X axes with more distinct values than this get rotated tick labels.
const ROTATE_LABEL_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    BoxPlot,
    Violin,
    Histogram,
    Density,
    Heatmap,
    Pie,
    Area,
}

impl ChartKind {
    pub const ALL: [Self; 10] = [
        Self::Bar,
        Self::Line,
        Self::Scatter,
        Self::BoxPlot,
        Self::Violin,
        Self::Histogram,
        Self::Density,
        Self::Heatmap,
        Self::Pie,
        Self::Area,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Scatter => "scatter",
            ChartKind::BoxPlot => "box",
            ChartKind::Violin => "violin",
            ChartKind::Histogram => "histogram",
            ChartKind::Density => "density",
            ChartKind::Heatmap => "heatmap",
            ChartKind::Pie => "pie",
            ChartKind::Area => "area",
        }
    }
}

/// Aggregate applied to `y`, grouped by `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
}

impl AggFn {
    pub const ALL: [Self; 6] = [
        Self::Sum,
        Self::Mean,
        Self::Median,
        Self::Min,
        Self::Max,
        Self::Count,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggFn::Sum => "sum",
            AggFn::Mean => "mean",
            AggFn::Median => "median",
            AggFn::Min => "min",
            AggFn::Max => "max",
            AggFn::Count => "count",
        }
    }

    fn expr(self, column: &str) -> Expr {
        match self {
            AggFn::Sum => col(column).sum(),
            AggFn::Mean => col(column).mean(),
            AggFn::Median => col(column).median(),
            AggFn::Min => col(column).min(),
            AggFn::Max => col(column).max(),
            AggFn::Count => col(column).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Per-column equality (one value) or membership (several) pre-filter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFilter {
    pub column: String,
    pub values: Vec<String>,
}

/// A chart configuration as collected by the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRequest {
    pub kind: ChartKind,
    pub x: Option<String>,
    pub y: Option<String>,
    pub hue: Option<String>,
    pub facet_row: Option<String>,
    pub facet_col: Option<String>,
    pub filters: Vec<ChartFilter>,
    pub agg: Option<AggFn>,
    pub sort: Option<SortDir>,
    pub palette: String,
    pub title: Option<String>,
    pub size: (u32, u32),
}

impl Default for ChartRequest {
    fn default() -> Self {
        Self {
            kind: ChartKind::Bar,
            x: None,
            y: None,
            hue: None,
            facet_row: None,
            facet_col: None,
            filters: Vec::new(),
            agg: None,
            sort: None,
            palette: "default".to_string(),
            title: None,
            size: (800, 600),
        }
    }
}

/// A named series of numeric points (line, scatter, area).
#[derive(Debug, Clone, PartialEq)]
pub struct Series2D {
    pub name: String,
    pub points: Vec<(f64, f64)>,
}

/// Per-hue bar heights aligned with the shared category list.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValues {
    pub name: String,
    pub values: Vec<f64>,
}

/// Shaped data for one chart (one facet cell).
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    /// line / scatter / area
    Points { series: Vec<Series2D> },
    /// bar
    Bars {
        categories: Vec<String>,
        series: Vec<NamedValues>,
    },
    /// box / violin / histogram / density: value vectors keyed by group
    Groups { groups: Vec<(String, Vec<f64>)> },
    /// heatmap
    Matrix {
        x_labels: Vec<String>,
        y_labels: Vec<String>,
        cells: Vec<Vec<Option<f64>>>,
    },
    /// pie
    Slices {
        labels: Vec<String>,
        values: Vec<f64>,
    },
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        match self {
            ChartData::Points { series } => series.iter().all(|s| s.points.is_empty()),
            ChartData::Bars { categories, .. } => categories.is_empty(),
            ChartData::Groups { groups } => groups.iter().all(|(_, v)| v.is_empty()),
            ChartData::Matrix { cells, .. } => cells.is_empty(),
            ChartData::Slices { values, .. } => values.is_empty(),
        }
    }
}

/// One facet cell: labels identify the slice of the facet grid.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetCell {
    pub row_label: Option<String>,
    pub col_label: Option<String>,
    pub data: ChartData,
}

/// Everything the renderer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChart {
    pub facets: Vec<FacetCell>,
    pub facet_rows: usize,
    pub facet_cols: usize,
    pub x_label: String,
    pub y_label: String,
    pub rotate_x_labels: bool,
}

fn require(option: &Option<String>, what: &str, kind: ChartKind) -> Result<String> {
    option
        .clone()
        .ok_or_else(|| eyre!("{} chart requires {}", kind.as_str(), what))
}

/// Validate the request, run the pre-processing pipeline, and shape the data.
pub fn prepare(df: &DataFrame, request: &ChartRequest) -> Result<PreparedChart> {
    // Requirements that must fail before any computation starts.
    match request.kind {
        ChartKind::Heatmap => {
            require(&request.x, "an x column", request.kind)?;
            require(&request.y, "a y column", request.kind)?;
            if request.agg.is_none() {
                return Err(eyre!("heatmap chart requires an aggregation"));
            }
        }
        ChartKind::Pie => {
            require(&request.x, "an x column", request.kind)?;
            require(&request.y, "a y column", request.kind)?;
        }
        ChartKind::Bar | ChartKind::Line | ChartKind::Scatter | ChartKind::Area => {
            require(&request.x, "an x column", request.kind)?;
            require(&request.y, "a y column", request.kind)?;
        }
        ChartKind::Histogram | ChartKind::Density => {
            require(&request.x, "an x column", request.kind)?;
        }
        ChartKind::BoxPlot | ChartKind::Violin => {
            require(&request.y, "a y column", request.kind)?;
        }
    }

    let processed = preprocess(df, request)?;

    // Aggregation reduces the frame to x/y, so hue and facets only apply to
    // the un-aggregated pipeline.
    let aggregated = request.agg.is_some() && !matches!(request.kind, ChartKind::Heatmap);
    let (facet_rows, facet_cols, facets) = if aggregated {
        (1, 1, vec![(None, None, processed.clone())])
    } else {
        partition_facets(&processed, request)?
    };

    let mut cells = Vec::with_capacity(facets.len());
    for (row_label, col_label, frame) in facets {
        cells.push(FacetCell {
            row_label,
            col_label,
            data: shape(&frame, request, aggregated)?,
        });
    }

    let rotate_x_labels = match request.x.as_deref() {
        Some(x) if processed.column(x).is_ok() => {
            processed
                .column(x)?
                .as_materialized_series()
                .n_unique()
                .unwrap_or(0)
                > ROTATE_LABEL_THRESHOLD
        }
        _ => false,
    };

    Ok(PreparedChart {
        facets: cells,
        facet_rows,
        facet_cols,
        x_label: request.x.clone().unwrap_or_default(),
        y_label: request.y.clone().unwrap_or_default(),
        rotate_x_labels,
    })
}

/// filters → aggregation → sort, then the row cap.
fn preprocess(df: &DataFrame, request: &ChartRequest) -> Result<DataFrame> {
    let mut lf = df.clone().lazy();

    let mut combined: Option<Expr> = None;
    for filter in &request.filters {
        if df.column(&filter.column).is_err() || filter.values.is_empty() {
            continue;
        }
        let mut membership: Option<Expr> = None;
        for value in &filter.values {
            let eq = col(filter.column.as_str())
                .cast(DataType::String)
                .eq(lit(value.clone()));
            membership = Some(match membership {
                Some(e) => e.or(eq),
                None => eq,
            });
        }
        if let Some(m) = membership {
            combined = Some(match combined {
                Some(e) => e.and(m),
                None => m,
            });
        }
    }
    if let Some(expr) = combined {
        lf = lf.filter(expr);
    }

    if let (Some(agg), Some(x), Some(y)) = (request.agg, &request.x, &request.y) {
        if !matches!(request.kind, ChartKind::Heatmap) {
            lf = lf
                .group_by([col(x.as_str())])
                .agg([agg.expr(y).alias(y.as_str())]);
        }
    }

    if let Some(dir) = request.sort {
        let by = request.x.as_ref().or(request.y.as_ref());
        if let Some(by) = by {
            let options = SortMultipleOptions {
                descending: vec![matches!(dir, SortDir::Desc)],
                ..Default::default()
            };
            lf = lf.sort_by_exprs(vec![col(by.as_str())], options);
        }
    }

    Ok(lf.slice(0, CHART_ROW_LIMIT as u32).collect()?)
}

/// Split the frame into facet cells by the distinct values of the facet
/// columns (capped per axis).
#[allow(clippy::type_complexity)]
fn partition_facets(
    df: &DataFrame,
    request: &ChartRequest,
) -> Result<(usize, usize, Vec<(Option<String>, Option<String>, DataFrame)>)> {
    let row_values = facet_values(df, request.facet_row.as_deref())?;
    let col_values = facet_values(df, request.facet_col.as_deref())?;
    if row_values.is_none() && col_values.is_none() {
        return Ok((1, 1, vec![(None, None, df.clone())]));
    }
    let rows = row_values.unwrap_or_else(|| vec![None]);
    let cols = col_values.unwrap_or_else(|| vec![None]);

    let mut cells = Vec::with_capacity(rows.len() * cols.len());
    for row in &rows {
        for column in &cols {
            let mut frame = df.clone();
            if let (Some(name), Some(value)) = (request.facet_row.as_deref(), row) {
                frame = filter_by_string(&frame, name, value)?;
            }
            if let (Some(name), Some(value)) = (request.facet_col.as_deref(), column) {
                frame = filter_by_string(&frame, name, value)?;
            }
            cells.push((row.clone(), column.clone(), frame));
        }
    }
    Ok((rows.len(), cols.len(), cells))
}

/// Distinct values of a facet column in first-appearance order, or None
/// when the column is unset or absent.
#[allow(clippy::type_complexity)]
fn facet_values(df: &DataFrame, name: Option<&str>) -> Result<Option<Vec<Option<String>>>> {
    let Some(name) = name else { return Ok(None) };
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let distinct = column.as_materialized_series().unique_stable()?;
    let mut values = Vec::new();
    for i in 0..distinct.len().min(MAX_FACET_VALUES) {
        let value = distinct.get(i)?;
        if !matches!(value, AnyValue::Null) {
            values.push(Some(value.str_value().to_string()));
        }
    }
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(values))
}

fn filter_by_string(df: &DataFrame, column: &str, value: &str) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .filter(
            col(column)
                .cast(DataType::String)
                .eq(lit(value.to_string())),
        )
        .collect()?)
}

/// Column as f64 values with a parallel validity mask.
fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| eyre!("column '{}' not found", name))?
        .cast(&DataType::Float64)
        .map_err(|_| eyre!("column '{}' is not numeric", name))?;
    let values = column.f64()?;
    Ok(values.iter().collect())
}

/// Column as display strings (missing cells become empty strings).
fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| eyre!("column '{}' not found", name))?;
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let value = column.get(i)?;
        out.push(match value {
            AnyValue::Null => None,
            other => Some(other.str_value().to_string()),
        });
    }
    Ok(out)
}

/// Hue partition labels per row, or a single unnamed partition.
fn hue_labels(df: &DataFrame, request: &ChartRequest, aggregated: bool) -> Result<Vec<String>> {
    if aggregated {
        return Ok(vec![String::new(); df.height()]);
    }
    match request.hue.as_deref() {
        Some(name) if df.column(name).is_ok() => Ok(string_values(df, name)?
            .into_iter()
            .map(|v| v.unwrap_or_default())
            .collect()),
        _ => Ok(vec![String::new(); df.height()]),
    }
}

/// Shape the processed frame for the requested chart kind.
fn shape(df: &DataFrame, request: &ChartRequest, aggregated: bool) -> Result<ChartData> {
    match request.kind {
        ChartKind::Line | ChartKind::Scatter | ChartKind::Area => {
            let x = numeric_values(df, request.x.as_ref().expect("validated"))?;
            let y = numeric_values(df, request.y.as_ref().expect("validated"))?;
            let hues = hue_labels(df, request, aggregated)?;
            let mut order: Vec<String> = Vec::new();
            let mut by_hue: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
            for i in 0..df.height() {
                let (Some(xv), Some(yv)) = (x[i], y[i]) else {
                    continue;
                };
                if !xv.is_finite() || !yv.is_finite() {
                    continue;
                }
                let key = hues[i].clone();
                if !by_hue.contains_key(&key) {
                    if order.len() >= MAX_HUE_SERIES {
                        continue;
                    }
                    order.push(key.clone());
                }
                by_hue.entry(key).or_default().push((xv, yv));
            }
            let series = order
                .into_iter()
                .map(|name| {
                    let points = by_hue.remove(&name).unwrap_or_default();
                    Series2D { name, points }
                })
                .collect();
            Ok(ChartData::Points { series })
        }
        ChartKind::Bar => {
            let x = string_values(df, request.x.as_ref().expect("validated"))?;
            let y = numeric_values(df, request.y.as_ref().expect("validated"))?;
            let hues = hue_labels(df, request, aggregated)?;
            // Without an explicit aggregation, bars reduce repeated
            // categories by mean (matching the usual bar-plot estimator).
            let mut categories: Vec<String> = Vec::new();
            let mut hue_order: Vec<String> = Vec::new();
            let mut sums: HashMap<(String, String), (f64, usize)> = HashMap::new();
            for i in 0..df.height() {
                let (Some(cat), Some(val)) = (x[i].clone(), y[i]) else {
                    continue;
                };
                if !categories.contains(&cat) {
                    categories.push(cat.clone());
                }
                let hue = hues[i].clone();
                if !hue_order.contains(&hue) {
                    if hue_order.len() >= MAX_HUE_SERIES {
                        continue;
                    }
                    hue_order.push(hue.clone());
                }
                let entry = sums.entry((cat, hue)).or_insert((0.0, 0));
                entry.0 += val;
                entry.1 += 1;
            }
            let series = hue_order
                .into_iter()
                .map(|hue| {
                    let values = categories
                        .iter()
                        .map(|cat| {
                            sums.get(&(cat.clone(), hue.clone()))
                                .map(|(sum, count)| {
                                    if aggregated {
                                        *sum
                                    } else {
                                        sum / *count as f64
                                    }
                                })
                                .unwrap_or(0.0)
                        })
                        .collect();
                    NamedValues { name: hue, values }
                })
                .collect();
            Ok(ChartData::Bars { categories, series })
        }
        ChartKind::BoxPlot | ChartKind::Violin => {
            let y = numeric_values(df, request.y.as_ref().expect("validated"))?;
            let groups_by = match request.x.as_deref() {
                Some(name) if df.column(name).is_ok() => Some(string_values(df, name)?),
                _ => None,
            };
            Ok(ChartData::Groups {
                groups: group_values(&y, groups_by.as_deref()),
            })
        }
        ChartKind::Histogram | ChartKind::Density => {
            let x = numeric_values(df, request.x.as_ref().expect("validated"))?;
            let groups_by = match request.hue.as_deref() {
                Some(name) if df.column(name).is_ok() && !aggregated => {
                    Some(string_values(df, name)?)
                }
                _ => None,
            };
            Ok(ChartData::Groups {
                groups: group_values(&x, groups_by.as_deref()),
            })
        }
        ChartKind::Heatmap => shape_heatmap(df, request),
        ChartKind::Pie => shape_pie(df, request),
    }
}

/// Partition numeric values by an optional label column, preserving
/// first-appearance group order.
fn group_values(
    values: &[Option<f64>],
    labels: Option<&[Option<String>]>,
) -> Vec<(String, Vec<f64>)> {
    let mut order: Vec<String> = Vec::new();
    let mut by_label: HashMap<String, Vec<f64>> = HashMap::new();
    for (i, value) in values.iter().enumerate() {
        let Some(v) = value else { continue };
        if !v.is_finite() {
            continue;
        }
        let label = labels
            .and_then(|l| l.get(i).cloned().flatten())
            .unwrap_or_default();
        if !by_label.contains_key(&label) {
            order.push(label.clone());
        }
        by_label.entry(label).or_default().push(*v);
    }
    order
        .into_iter()
        .map(|label| {
            let values = by_label.remove(&label).unwrap_or_default();
            (label, values)
        })
        .collect()
}

/// Heatmap cells: group by (x, y); the value is the aggregate of `hue` when
/// set, otherwise the row count.
fn shape_heatmap(df: &DataFrame, request: &ChartRequest) -> Result<ChartData> {
    let agg = request.agg.expect("validated");
    let x_name = request.x.as_ref().expect("validated");
    let y_name = request.y.as_ref().expect("validated");

    let value_expr = match request.hue.as_deref() {
        Some(value_col) if df.column(value_col).is_ok() => agg.expr(value_col).alias("__value"),
        _ => col(x_name.as_str()).count().alias("__value"),
    };
    let grouped = df
        .clone()
        .lazy()
        .group_by([
            col(x_name.as_str()).cast(DataType::String),
            col(y_name.as_str()).cast(DataType::String),
        ])
        .agg([value_expr])
        .collect()?;

    let xs = string_values(&grouped, x_name)?;
    let ys = string_values(&grouped, y_name)?;
    let values = numeric_values(&grouped, "__value")?;

    let mut x_labels: Vec<String> = Vec::new();
    let mut y_labels: Vec<String> = Vec::new();
    let mut lookup: HashMap<(String, String), f64> = HashMap::new();
    for i in 0..grouped.height() {
        let (Some(xv), Some(yv), Some(v)) = (xs[i].clone(), ys[i].clone(), values[i]) else {
            continue;
        };
        if !x_labels.contains(&xv) {
            x_labels.push(xv.clone());
        }
        if !y_labels.contains(&yv) {
            y_labels.push(yv.clone());
        }
        lookup.insert((xv, yv), v);
    }
    x_labels.sort();
    y_labels.sort();

    let cells = y_labels
        .iter()
        .map(|yv| {
            x_labels
                .iter()
                .map(|xv| lookup.get(&(xv.clone(), yv.clone())).copied())
                .collect()
        })
        .collect();
    Ok(ChartData::Matrix {
        x_labels,
        y_labels,
        cells,
    })
}

/// Pie slices: sum (or the requested aggregate of) `y` per `x` category.
fn shape_pie(df: &DataFrame, request: &ChartRequest) -> Result<ChartData> {
    let x_name = request.x.as_ref().expect("validated");
    let y_name = request.y.as_ref().expect("validated");
    let agg = request.agg.unwrap_or(AggFn::Sum);

    let grouped = df
        .clone()
        .lazy()
        .group_by([col(x_name.as_str()).cast(DataType::String)])
        .agg([agg.expr(y_name).alias("__value")])
        .collect()?;
    let labels = string_values(&grouped, x_name)?;
    let values = numeric_values(&grouped, "__value")?;

    let mut out_labels = Vec::new();
    let mut out_values = Vec::new();
    for i in 0..grouped.height() {
        let (Some(label), Some(value)) = (labels[i].clone(), values[i]) else {
            continue;
        };
        if value.is_finite() && value > 0.0 {
            out_labels.push(label);
            out_values.push(value);
        }
    }
    // Deterministic slice order regardless of group_by hashing.
    let mut order: Vec<usize> = (0..out_labels.len()).collect();
    order.sort_by(|a, b| out_labels[*a].cmp(&out_labels[*b]));
    Ok(ChartData::Slices {
        labels: order.iter().map(|&i| out_labels[i].clone()).collect(),
        values: order.iter().map(|&i| out_values[i]).collect(),
    })
}
