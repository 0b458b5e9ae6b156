//! Chart rendering to PNG (plotters bitmap), SVG (plotters vector), and EPS
//! (minimal PostScript, no deps).
//!
//! Each chart kind maps to one drawing routine over plotters primitives; the
//! shaping decisions all happen in `chart`. EPS covers the point/bar kinds
//! only and reports anything else as unsupported.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use plotters::prelude::*;
use plotters::style::FontTransform;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::chart::{ChartData, ChartKind, ChartRequest, PreparedChart};

/// Output encoding, selected by the destination extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Svg,
    Eps,
}

impl ExportFormat {
    pub const ALL: [Self; 3] = [Self::Png, Self::Svg, Self::Eps];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Eps => "eps",
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("png") => Ok(Self::Png),
            Some("svg") => Ok(Self::Svg),
            Some("eps") => Ok(Self::Eps),
            other => Err(eyre!(
                "unsupported chart format {:?} (use png, svg, or eps)",
                other.unwrap_or("none")
            )),
        }
    }
}

/// Fixed palettes; unknown names fall back to the default.
fn palette_colors(name: &str) -> &'static [RGBColor] {
    const DEFAULT: [RGBColor; 7] = [
        RGBColor(0, 178, 230),
        RGBColor(230, 0, 128),
        RGBColor(0, 178, 0),
        RGBColor(230, 204, 0),
        RGBColor(0, 0, 230),
        RGBColor(230, 0, 0),
        RGBColor(128, 230, 230),
    ];
    const WARM: [RGBColor; 5] = [
        RGBColor(215, 48, 39),
        RGBColor(244, 109, 67),
        RGBColor(253, 174, 97),
        RGBColor(254, 224, 144),
        RGBColor(165, 0, 38),
    ];
    const COOL: [RGBColor; 5] = [
        RGBColor(49, 54, 149),
        RGBColor(69, 117, 180),
        RGBColor(116, 173, 209),
        RGBColor(171, 217, 233),
        RGBColor(224, 243, 248),
    ];
    match name {
        "warm" => &WARM,
        "cool" => &COOL,
        _ => &DEFAULT,
    }
}

/// Save the prepared chart to `path`; the extension picks the encoding.
pub fn save_chart(prepared: &PreparedChart, request: &ChartRequest, path: &Path) -> Result<()> {
    if prepared.facets.iter().all(|f| f.data.is_empty()) {
        return Err(eyre!("no data to plot"));
    }
    match ExportFormat::from_path(path)? {
        ExportFormat::Png => {
            let root = BitMapBackend::new(path, request.size).into_drawing_area();
            render_root(&root, prepared, request)?;
            root.present().map_err(|e| eyre!("chart render: {}", e))?;
        }
        ExportFormat::Svg => {
            let root = SVGBackend::new(path, request.size).into_drawing_area();
            render_root(&root, prepared, request)?;
            root.present().map_err(|e| eyre!("chart render: {}", e))?;
        }
        ExportFormat::Eps => write_eps(path, prepared, request)?,
    }
    Ok(())
}

fn render_root<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    root.fill(&WHITE).map_err(|e| eyre!("chart render: {}", e))?;
    let root = match &request.title {
        Some(title) => root
            .titled(title, ("sans-serif", 20))
            .map_err(|e| eyre!("chart render: {}", e))?,
        None => root.clone(),
    };

    if prepared.facets.len() == 1 {
        return render_cell(&root, &prepared.facets[0].data, prepared, request);
    }

    let cells = root.split_evenly((prepared.facet_rows, prepared.facet_cols));
    for (facet, area) in prepared.facets.iter().zip(cells.iter()) {
        let label = match (&facet.row_label, &facet.col_label) {
            (Some(r), Some(c)) => format!("{} / {}", r, c),
            (Some(r), None) => r.clone(),
            (None, Some(c)) => c.clone(),
            (None, None) => String::new(),
        };
        let area = if label.is_empty() {
            area.clone()
        } else {
            area.titled(&label, ("sans-serif", 14))
                .map_err(|e| eyre!("chart render: {}", e))?
        };
        render_cell(&area, &facet.data, prepared, request)?;
    }
    Ok(())
}

fn render_cell<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    data: &ChartData,
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    match data {
        ChartData::Points { series } => render_points(area, series, prepared, request),
        ChartData::Bars { categories, series } => {
            render_bars(area, categories, series, prepared, request)
        }
        ChartData::Groups { groups } => match request.kind {
            ChartKind::BoxPlot => render_boxes(area, groups, prepared, request),
            ChartKind::Violin => render_violins(area, groups, prepared, request),
            ChartKind::Histogram => render_histogram(area, groups, prepared, request),
            _ => render_density(area, groups, prepared, request),
        },
        ChartData::Matrix {
            x_labels,
            y_labels,
            cells,
        } => render_heatmap(area, x_labels, y_labels, cells, request),
        ChartData::Slices { labels, values } => render_pie(area, labels, values, request),
    }
}

/// Padded [min, max] over an iterator of values.
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if max > min { (max - min) * 0.05 } else { 1.0 };
    (min - pad, max + pad)
}

fn x_label_style(rotate: bool) -> TextStyle<'static> {
    let style: TextStyle = ("sans-serif", 11).into_font().into();
    if rotate {
        style.transform(FontTransform::Rotate90)
    } else {
        style
    }
}

fn render_points<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    series: &[crate::chart::Series2D],
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    let colors = palette_colors(&request.palette);
    let (x_min, x_max) = bounds(series.iter().flat_map(|s| s.points.iter().map(|p| p.0)));
    let (y_min, y_max) = bounds(series.iter().flat_map(|s| s.points.iter().map(|p| p.1)));
    let y_min = if matches!(request.kind, ChartKind::Area) {
        y_min.min(0.0)
    } else {
        y_min
    };

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| eyre!("chart render: {}", e))?;
    chart
        .configure_mesh()
        .x_desc(prepared.x_label.as_str())
        .y_desc(prepared.y_label.as_str())
        .x_label_style(x_label_style(prepared.rotate_x_labels))
        .draw()
        .map_err(|e| eyre!("chart render: {}", e))?;

    for (idx, s) in series.iter().enumerate() {
        if s.points.is_empty() {
            continue;
        }
        let color = colors[idx % colors.len()];
        match request.kind {
            ChartKind::Line => {
                chart
                    .draw_series(LineSeries::new(s.points.iter().copied(), color))
                    .map_err(|e| eyre!("chart render: {}", e))?
                    .label(s.name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            ChartKind::Area => {
                chart
                    .draw_series(AreaSeries::new(
                        s.points.iter().copied(),
                        0.0,
                        color.mix(0.4),
                    ))
                    .map_err(|e| eyre!("chart render: {}", e))?
                    .label(s.name.as_str())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            _ => {
                chart
                    .draw_series(
                        s.points
                            .iter()
                            .map(|&(x, y)| Circle::new((x, y), 3, color.filled())),
                    )
                    .map_err(|e| eyre!("chart render: {}", e))?
                    .label(s.name.as_str())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
            }
        }
    }

    if series.len() > 1 || series.iter().any(|s| !s.name.is_empty()) {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| eyre!("chart render: {}", e))?;
    }
    Ok(())
}

fn render_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    categories: &[String],
    series: &[crate::chart::NamedValues],
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    if categories.is_empty() {
        return Ok(());
    }
    let colors = palette_colors(&request.palette);
    let (_, y_max) = bounds(series.iter().flat_map(|s| s.values.iter().copied()));
    let y_min = series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .fold(0.0f64, f64::min);
    let n = categories.len();

    let labels: Vec<String> = categories.to_vec();
    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(if prepared.rotate_x_labels { 70 } else { 40 })
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), y_min..y_max)
        .map_err(|e| eyre!("chart render: {}", e))?;
    chart
        .configure_mesh()
        .x_desc(prepared.x_label.as_str())
        .y_desc(prepared.y_label.as_str())
        .x_labels(n)
        .x_label_formatter(&move |v| {
            let idx = v.round() as i64;
            if idx >= 0 && (idx as usize) < labels.len() && (v - idx as f64).abs() < 0.3 {
                labels[idx as usize].clone()
            } else {
                String::new()
            }
        })
        .x_label_style(x_label_style(prepared.rotate_x_labels))
        .draw()
        .map_err(|e| eyre!("chart render: {}", e))?;

    let group_width = 0.8;
    let bar_width = group_width / series.len().max(1) as f64;
    for (si, s) in series.iter().enumerate() {
        let color = colors[si % colors.len()];
        chart
            .draw_series(s.values.iter().enumerate().map(|(ci, &v)| {
                let x0 = ci as f64 - group_width / 2.0 + si as f64 * bar_width;
                Rectangle::new([(x0, 0.0), (x0 + bar_width * 0.9, v)], color.filled())
            }))
            .map_err(|e| eyre!("chart render: {}", e))?
            .label(s.name.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 4), (x + 12, y + 4)], color.filled()));
    }

    if series.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| eyre!("chart render: {}", e))?;
    }
    Ok(())
}

/// Quartiles (q1, median, q3) by linear interpolation on sorted data.
fn quartiles(values: &[f64]) -> (f64, f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
    let q = |p: f64| -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }
        let rank = p * (sorted.len() - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    };
    (q(0.25), q(0.5), q(0.75))
}

/// Gaussian kernel density estimate on an evaluation grid. Bandwidth by
/// Silverman's rule of thumb.
fn kde(values: &[f64], grid_points: usize) -> Vec<(f64, f64)> {
    if values.is_empty() {
        return Vec::new();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    let bandwidth = if std > 0.0 {
        1.06 * std * n.powf(-0.2)
    } else {
        1.0
    };
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min) - 3.0 * bandwidth;
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max) + 3.0 * bandwidth;
    let step = (max - min) / (grid_points.max(2) - 1) as f64;
    (0..grid_points)
        .map(|i| {
            let x = min + i as f64 * step;
            let density = values
                .iter()
                .map(|v| {
                    let z = (x - v) / bandwidth;
                    (-0.5 * z * z).exp()
                })
                .sum::<f64>()
                / (n * bandwidth * (2.0 * std::f64::consts::PI).sqrt());
            (x, density)
        })
        .collect()
}

/// Histogram bin count by Sturges' rule.
fn bin_count(n: usize) -> usize {
    if n == 0 {
        return 1;
    }
    ((n as f64).log2().ceil() as usize + 1).clamp(1, 50)
}

fn render_boxes<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    groups: &[(String, Vec<f64>)],
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    if groups.is_empty() {
        return Ok(());
    }
    let colors = palette_colors(&request.palette);
    let (y_lo, y_hi) = bounds(groups.iter().flat_map(|(_, v)| v.iter().copied()));
    let n = groups.len();
    let labels: Vec<String> = groups.iter().map(|(l, _)| l.clone()).collect();

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), y_lo..y_hi)
        .map_err(|e| eyre!("chart render: {}", e))?;
    chart
        .configure_mesh()
        .x_desc(prepared.x_label.as_str())
        .y_desc(prepared.y_label.as_str())
        .x_labels(n)
        .x_label_formatter(&move |v| {
            let idx = v.round() as i64;
            if idx >= 0 && (idx as usize) < labels.len() && (v - idx as f64).abs() < 0.3 {
                labels[idx as usize].clone()
            } else {
                String::new()
            }
        })
        .x_label_style(x_label_style(prepared.rotate_x_labels))
        .draw()
        .map_err(|e| eyre!("chart render: {}", e))?;

    for (i, (_, values)) in groups.iter().enumerate() {
        if values.is_empty() {
            continue;
        }
        let color = colors[i % colors.len()];
        let (q1, median, q3) = quartiles(values);
        let iqr = q3 - q1;
        let lo = values
            .iter()
            .cloned()
            .filter(|v| *v >= q1 - 1.5 * iqr)
            .fold(f64::INFINITY, f64::min);
        let hi = values
            .iter()
            .cloned()
            .filter(|v| *v <= q3 + 1.5 * iqr)
            .fold(f64::NEG_INFINITY, f64::max);
        let x = i as f64;
        let w = 0.3;
        chart
            .draw_series(vec![
                Rectangle::new([(x - w, q1), (x + w, q3)], color.mix(0.4).filled()),
                Rectangle::new([(x - w, q1), (x + w, q3)], color.stroke_width(1)),
            ])
            .map_err(|e| eyre!("chart render: {}", e))?;
        chart
            .draw_series(vec![
                PathElement::new(
                    vec![(x - w, median), (x + w, median)],
                    color.stroke_width(2),
                ),
                PathElement::new(vec![(x, q3), (x, hi)], color.stroke_width(1)),
                PathElement::new(vec![(x, q1), (x, lo)], color.stroke_width(1)),
                PathElement::new(
                    vec![(x - w / 2.0, hi), (x + w / 2.0, hi)],
                    color.stroke_width(1),
                ),
                PathElement::new(
                    vec![(x - w / 2.0, lo), (x + w / 2.0, lo)],
                    color.stroke_width(1),
                ),
            ])
            .map_err(|e| eyre!("chart render: {}", e))?;
    }
    Ok(())
}

fn render_violins<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    groups: &[(String, Vec<f64>)],
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    if groups.is_empty() {
        return Ok(());
    }
    let colors = palette_colors(&request.palette);
    let (y_lo, y_hi) = bounds(groups.iter().flat_map(|(_, v)| v.iter().copied()));
    let n = groups.len();
    let labels: Vec<String> = groups.iter().map(|(l, _)| l.clone()).collect();

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5..(n as f64 - 0.5), y_lo..y_hi)
        .map_err(|e| eyre!("chart render: {}", e))?;
    chart
        .configure_mesh()
        .x_desc(prepared.x_label.as_str())
        .y_desc(prepared.y_label.as_str())
        .x_labels(n)
        .x_label_formatter(&move |v| {
            let idx = v.round() as i64;
            if idx >= 0 && (idx as usize) < labels.len() && (v - idx as f64).abs() < 0.3 {
                labels[idx as usize].clone()
            } else {
                String::new()
            }
        })
        .x_label_style(x_label_style(prepared.rotate_x_labels))
        .draw()
        .map_err(|e| eyre!("chart render: {}", e))?;

    for (i, (_, values)) in groups.iter().enumerate() {
        if values.is_empty() {
            continue;
        }
        let color = colors[i % colors.len()];
        let curve = kde(values, 60);
        let peak = curve.iter().map(|(_, d)| *d).fold(0.0f64, f64::max);
        if peak <= 0.0 {
            continue;
        }
        let x = i as f64;
        let half_width = 0.4;
        let mut outline: Vec<(f64, f64)> = curve
            .iter()
            .map(|&(y, d)| (x - half_width * d / peak, y))
            .collect();
        outline.extend(
            curve
                .iter()
                .rev()
                .map(|&(y, d)| (x + half_width * d / peak, y)),
        );
        chart
            .draw_series(vec![Polygon::new(outline, color.mix(0.5).filled())])
            .map_err(|e| eyre!("chart render: {}", e))?;
    }
    Ok(())
}

fn render_histogram<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    groups: &[(String, Vec<f64>)],
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    let colors = palette_colors(&request.palette);
    let all: Vec<f64> = groups.iter().flat_map(|(_, v)| v.iter().copied()).collect();
    if all.is_empty() {
        return Ok(());
    }
    let bins = bin_count(all.len());
    let lo = all.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = all.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = if hi > lo { (hi - lo) / bins as f64 } else { 1.0 };

    let mut counted: Vec<(usize, Vec<usize>)> = Vec::new();
    let mut max_count = 0usize;
    for (gi, (_, values)) in groups.iter().enumerate() {
        let mut counts = vec![0usize; bins];
        for v in values {
            let idx = (((v - lo) / width) as usize).min(bins - 1);
            counts[idx] += 1;
        }
        max_count = max_count.max(counts.iter().copied().max().unwrap_or(0));
        counted.push((gi, counts));
    }

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            lo..(lo + width * bins as f64),
            0.0..(max_count as f64 * 1.05),
        )
        .map_err(|e| eyre!("chart render: {}", e))?;
    chart
        .configure_mesh()
        .x_desc(prepared.x_label.as_str())
        .y_desc("count")
        .draw()
        .map_err(|e| eyre!("chart render: {}", e))?;

    for (gi, counts) in &counted {
        let color = colors[gi % colors.len()];
        let name = groups[*gi].0.clone();
        chart
            .draw_series(counts.iter().enumerate().filter(|(_, c)| **c > 0).map(
                |(bi, &count)| {
                    let x0 = lo + bi as f64 * width;
                    Rectangle::new(
                        [(x0, 0.0), (x0 + width, count as f64)],
                        color.mix(0.55).filled(),
                    )
                },
            ))
            .map_err(|e| eyre!("chart render: {}", e))?
            .label(name)
            .legend(move |(x, y)| Rectangle::new([(x, y - 4), (x + 12, y + 4)], color.filled()));
    }
    if groups.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| eyre!("chart render: {}", e))?;
    }
    Ok(())
}

fn render_density<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    groups: &[(String, Vec<f64>)],
    prepared: &PreparedChart,
    request: &ChartRequest,
) -> Result<()> {
    let colors = palette_colors(&request.palette);
    let curves: Vec<(String, Vec<(f64, f64)>)> = groups
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(name, values)| (name.clone(), kde(values, 120)))
        .collect();
    if curves.is_empty() {
        return Ok(());
    }
    let (x_min, x_max) = bounds(curves.iter().flat_map(|(_, c)| c.iter().map(|p| p.0)));
    let (_, y_max) = bounds(curves.iter().flat_map(|(_, c)| c.iter().map(|p| p.1)));

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, 0.0..y_max)
        .map_err(|e| eyre!("chart render: {}", e))?;
    chart
        .configure_mesh()
        .x_desc(prepared.x_label.as_str())
        .y_desc("density")
        .draw()
        .map_err(|e| eyre!("chart render: {}", e))?;

    for (i, (name, curve)) in curves.iter().enumerate() {
        let color = colors[i % colors.len()];
        chart
            .draw_series(LineSeries::new(
                curve.iter().copied(),
                color.stroke_width(2),
            ))
            .map_err(|e| eyre!("chart render: {}", e))?
            .label(name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    if curves.len() > 1 {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| eyre!("chart render: {}", e))?;
    }
    Ok(())
}

fn render_heatmap<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    x_labels: &[String],
    y_labels: &[String],
    cells: &[Vec<Option<f64>>],
    _request: &ChartRequest,
) -> Result<()> {
    let nx = x_labels.len();
    let ny = y_labels.len();
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for row in cells {
        for v in row.iter().flatten() {
            lo = lo.min(*v);
            hi = hi.max(*v);
        }
    }
    if !lo.is_finite() {
        return Ok(());
    }
    let span = if hi > lo { hi - lo } else { 1.0 };

    let xs: Vec<String> = x_labels.to_vec();
    let ys: Vec<String> = y_labels.to_vec();
    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..nx as f64, 0.0..ny as f64)
        .map_err(|e| eyre!("chart render: {}", e))?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(nx)
        .y_labels(ny)
        .x_label_formatter(&move |v| {
            let idx = v.floor() as usize;
            xs.get(idx).cloned().unwrap_or_default()
        })
        .y_label_formatter(&move |v| {
            let idx = v.floor() as usize;
            ys.get(idx).cloned().unwrap_or_default()
        })
        .x_label_style(x_label_style(nx > 5))
        .draw()
        .map_err(|e| eyre!("chart render: {}", e))?;

    chart
        .draw_series((0..ny).flat_map(|yi| {
            let row = &cells[yi];
            (0..nx).filter_map(move |xi| {
                row[xi].map(|v| {
                    let t = (v - lo) / span;
                    let shade = RGBColor(
                        (255.0 - t * 205.0) as u8,
                        (245.0 - t * 160.0) as u8,
                        (250.0 - t * 70.0) as u8,
                    );
                    Rectangle::new(
                        [(xi as f64, yi as f64), (xi as f64 + 1.0, yi as f64 + 1.0)],
                        shade.filled(),
                    )
                })
            })
        }))
        .map_err(|e| eyre!("chart render: {}", e))?;
    Ok(())
}

fn render_pie<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    labels: &[String],
    values: &[f64],
    request: &ChartRequest,
) -> Result<()> {
    let colors = palette_colors(&request.palette);
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return Ok(());
    }
    let (w, h) = area.dim_in_pixel();
    let cx = w as f64 / 2.0;
    let cy = h as f64 / 2.0;
    let radius = (w.min(h) as f64 / 2.0) * 0.7;

    let mut start = -std::f64::consts::FRAC_PI_2;
    for (i, (label, value)) in labels.iter().zip(values).enumerate() {
        let sweep = value / total * std::f64::consts::TAU;
        let color = colors[i % colors.len()];
        // Sector approximated as a polygon fan around the center.
        let steps = ((sweep / 0.05).ceil() as usize).max(2);
        let mut points = vec![(cx as i32, cy as i32)];
        for s in 0..=steps {
            let angle = start + sweep * s as f64 / steps as f64;
            points.push((
                (cx + radius * angle.cos()) as i32,
                (cy + radius * angle.sin()) as i32,
            ));
        }
        area.draw(&Polygon::new(points, color.filled()))
            .map_err(|e| eyre!("chart render: {}", e))?;

        let mid = start + sweep / 2.0;
        let share = value / total * 100.0;
        area.draw(&Text::new(
            format!("{} ({:.0}%)", label, share),
            (
                (cx + radius * 1.1 * mid.cos()) as i32 - 20,
                (cy + radius * 1.1 * mid.sin()) as i32,
            ),
            ("sans-serif", 12),
        ))
        .map_err(|e| eyre!("chart render: {}", e))?;
        start += sweep;
    }
    Ok(())
}

/// Escape a string for PostScript ( and ) and \.
fn ps_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Generate "nice" tick values in [min, max] with roughly max_ticks steps.
fn nice_ticks(min: f64, max: f64, max_ticks: usize) -> Vec<f64> {
    let range = if max > min { max - min } else { 1.0 };
    if range <= 0.0 || max_ticks == 0 {
        return vec![min];
    }
    let raw_step = range / (max_ticks as f64).max(1.0);
    let mag = 10.0_f64.powf(raw_step.log10().floor());
    let norm = if mag > 0.0 { raw_step / mag } else { raw_step };
    let step = if norm <= 1.0 {
        mag
    } else if norm <= 2.0 {
        2.0 * mag
    } else if norm <= 5.0 {
        5.0 * mag
    } else {
        10.0 * mag
    };
    let step = step.max(f64::EPSILON);
    let start = (min / step).floor() * step;
    let mut ticks = Vec::new();
    let mut v = start;
    while v <= max + step * 0.001 {
        if v >= min - step * 0.001 {
            ticks.push(v);
        }
        v += step;
        if ticks.len() > max_ticks + 2 {
            break;
        }
    }
    if ticks.is_empty() {
        ticks.push(min);
    }
    ticks
}

/// Format a tick value for display (compact: integer when whole, else 1–2 decimals).
fn format_tick(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let abs = v.abs();
    if abs >= 1000.0 || abs <= 0.01 {
        format!("{:e}", v)
    } else if (v - v.round()).abs() < 1e-10 {
        format!("{:.0}", v)
    } else if abs >= 1.0 {
        format!("{:.1}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// Write the point/bar chart kinds to EPS (Encapsulated PostScript). The
/// group/matrix/pie kinds are PNG/SVG only.
fn write_eps(path: &Path, prepared: &PreparedChart, request: &ChartRequest) -> Result<()> {
    let facet = prepared
        .facets
        .iter()
        .find(|f| !f.data.is_empty())
        .ok_or_else(|| eyre!("no data to plot"))?;

    let series: Vec<(String, Vec<(f64, f64)>)> = match &facet.data {
        ChartData::Points { series } => series
            .iter()
            .map(|s| (s.name.clone(), s.points.clone()))
            .collect(),
        ChartData::Bars { series, .. } => series
            .iter()
            .map(|s| {
                let points = s
                    .values
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| (i as f64, v))
                    .collect();
                (s.name.clone(), points)
            })
            .collect(),
        _ => {
            return Err(eyre!(
                "{} charts cannot be written as EPS (use png or svg)",
                request.kind.as_str()
            ))
        }
    };

    const W: f64 = 400.0;
    const H: f64 = 300.0;
    const MARGIN_LEFT: f64 = 50.0;
    const MARGIN_BOTTOM: f64 = 40.0;
    const PLOT_W: f64 = W - MARGIN_LEFT - 40.0;
    const PLOT_H: f64 = H - MARGIN_BOTTOM - 30.0;

    let (x_min, x_max) = bounds(series.iter().flat_map(|(_, p)| p.iter().map(|q| q.0)));
    let (y_min, y_max) = bounds(series.iter().flat_map(|(_, p)| p.iter().map(|q| q.1)));
    let x_range = if x_max > x_min { x_max - x_min } else { 1.0 };
    let y_range = if y_max > y_min { y_max - y_min } else { 1.0 };
    let to_x = |x: f64| MARGIN_LEFT + (x - x_min) / x_range * PLOT_W;
    let to_y = |y: f64| MARGIN_BOTTOM + (y - y_min) / y_range * PLOT_H;

    let mut f = File::create(path)?;
    writeln!(f, "%!PS-Adobe-3.0 EPSF-3.0")?;
    writeln!(
        f,
        "%%BoundingBox: 0 0 {} {}",
        W.ceil() as i32,
        H.ceil() as i32
    )?;
    writeln!(f, "%%Creator: scour")?;
    writeln!(f, "%%EndComments")?;
    writeln!(f, "gsave")?;
    writeln!(f, "1 setlinewidth")?;

    const MAX_TICKS: usize = 8;
    let x_ticks = nice_ticks(x_min, x_max, MAX_TICKS);
    let y_ticks = nice_ticks(y_min, y_max, MAX_TICKS);

    // Grid behind the plot
    writeln!(f, "0.9 setgray")?;
    writeln!(f, "0.5 setlinewidth")?;
    for &v in &x_ticks {
        let px = to_x(v);
        if (MARGIN_LEFT..=MARGIN_LEFT + PLOT_W).contains(&px) {
            writeln!(
                f,
                "{} {} moveto 0 {} rlineto stroke",
                px, MARGIN_BOTTOM, PLOT_H
            )?;
        }
    }
    for &v in &y_ticks {
        let py = to_y(v);
        if (MARGIN_BOTTOM..=MARGIN_BOTTOM + PLOT_H).contains(&py) {
            writeln!(
                f,
                "{} {} moveto {} 0 rlineto stroke",
                MARGIN_LEFT, py, PLOT_W
            )?;
        }
    }
    writeln!(f, "1 setlinewidth")?;
    writeln!(f, "0 setgray")?;

    // Axis box
    writeln!(f, "{} {} moveto", MARGIN_LEFT, MARGIN_BOTTOM)?;
    writeln!(f, "{} 0 rlineto", PLOT_W)?;
    writeln!(f, "0 {} rlineto", PLOT_H)?;
    writeln!(f, "{} 0 rlineto", -PLOT_W)?;
    writeln!(f, "closepath stroke")?;

    // Tick labels
    writeln!(f, "/Helvetica findfont 9 scalefont setfont")?;
    let char_w: f64 = 5.0;
    for &v in &x_ticks {
        let px = to_x(v);
        if (MARGIN_LEFT..=MARGIN_LEFT + PLOT_W).contains(&px) {
            let s = format_tick(v);
            let label_w = s.len() as f64 * char_w;
            let tx = (px - label_w / 2.0)
                .max(MARGIN_LEFT)
                .min(MARGIN_LEFT + PLOT_W - label_w);
            writeln!(
                f,
                "{} {} moveto ({}) show",
                tx,
                MARGIN_BOTTOM - 12.0,
                ps_escape(&s)
            )?;
        }
    }
    for &v in &y_ticks {
        let py = to_y(v);
        if (MARGIN_BOTTOM..=MARGIN_BOTTOM + PLOT_H).contains(&py) {
            let s = format_tick(v);
            let label_w = s.len() as f64 * char_w;
            let tx = (MARGIN_LEFT - label_w - 4.0).max(2.0);
            writeln!(f, "{} {} moveto ({}) show", tx, py - 3.0, ps_escape(&s))?;
        }
    }

    // Axis titles
    writeln!(f, "/Helvetica findfont 10 scalefont setfont")?;
    if !prepared.x_label.is_empty() {
        let x_center = MARGIN_LEFT + PLOT_W / 2.0;
        let approx = prepared.x_label.len() as f64 * char_w;
        writeln!(
            f,
            "{} {} moveto ({}) show",
            (x_center - approx / 2.0).max(MARGIN_LEFT),
            MARGIN_BOTTOM - 24.0,
            ps_escape(&prepared.x_label)
        )?;
    }
    if !prepared.y_label.is_empty() {
        writeln!(f, "gsave")?;
        writeln!(
            f,
            "12 {} translate -90 rotate",
            MARGIN_BOTTOM + PLOT_H / 2.0
        )?;
        let approx = prepared.y_label.len() as f64 * char_w;
        writeln!(
            f,
            "{} 0 moveto ({}) show",
            -approx / 2.0,
            ps_escape(&prepared.y_label)
        )?;
        writeln!(f, "grestore")?;
    }

    // Fixed palette (RGB 0–1)
    let palette: [(f64, f64, f64); 7] = [
        (0.0, 0.7, 0.9),
        (0.9, 0.0, 0.5),
        (0.0, 0.7, 0.0),
        (0.9, 0.8, 0.0),
        (0.0, 0.0, 0.9),
        (0.9, 0.0, 0.0),
        (0.5, 0.9, 0.9),
    ];

    for (idx, (_, points)) in series.iter().enumerate() {
        if points.is_empty() {
            continue;
        }
        let (r, g, b) = palette[idx % palette.len()];
        writeln!(f, "{} {} {} setrgbcolor", r, g, b)?;

        match request.kind {
            ChartKind::Line | ChartKind::Area => {
                let (px, py) = points[0];
                writeln!(f, "{} {} moveto", to_x(px), to_y(py))?;
                for &(px, py) in &points[1..] {
                    writeln!(f, "{} {} lineto", to_x(px), to_y(py))?;
                }
                writeln!(f, "stroke")?;
            }
            ChartKind::Bar => {
                let n = points.len() as f64;
                let bar_w = (PLOT_W / n).clamp(1.0, 20.0) * 0.7;
                for &(px, py) in points {
                    let cx = to_x(px) - bar_w / 2.0;
                    let cy = to_y(0.0_f64.max(y_min));
                    let h = to_y(py) - cy;
                    writeln!(f, "{} {} {} {} rectfill", cx, cy, bar_w, h)?;
                }
            }
            _ => {
                let rad = 3.0;
                for &(px, py) in points {
                    writeln!(f, "{} {} {} 0 360 arc fill", to_x(px), to_y(py), rad)?;
                }
            }
        }
    }

    writeln!(f, "grestore")?;
    writeln!(f, "%%EOF")?;
    f.sync_all()?;
    Ok(())
}
