use color_eyre::Result;
use scour::chart::{prepare, AggFn, ChartData, ChartFilter, ChartKind, ChartRequest, SortDir};
use scour::chart_export::save_chart;
use scour::loader::{load_dataset, OpenOptions};

mod common;

fn base_request(kind: ChartKind) -> ChartRequest {
    ChartRequest {
        kind,
        size: (320, 240),
        ..Default::default()
    }
}

#[test]
fn heatmap_without_aggregation_is_a_descriptive_error() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let mut request = base_request(ChartKind::Heatmap);
    request.x = Some("region".into());
    request.y = Some("month".into());
    let err = prepare(&df, &request).unwrap_err();
    assert!(err.to_string().contains("aggregation"));
    Ok(())
}

#[test]
fn failed_request_writes_no_file() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("heatmap.png");

    let mut request = base_request(ChartKind::Heatmap);
    request.x = Some("region".into());
    request.y = Some("month".into());
    if let Ok(prepared) = prepare(&df, &request) {
        let _ = save_chart(&prepared, &request, &out);
    }
    assert!(!out.exists());
    Ok(())
}

#[test]
fn aggregated_bar_chart_end_to_end() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("sales.png");

    let mut request = base_request(ChartKind::Bar);
    request.x = Some("region".into());
    request.y = Some("sales".into());
    request.agg = Some(AggFn::Sum);
    request.sort = Some(SortDir::Asc);
    request.title = Some("Sales by region".into());

    let prepared = prepare(&df, &request)?;
    let ChartData::Bars { categories, series } = &prepared.facets[0].data else {
        panic!("expected bars");
    };
    assert_eq!(
        categories,
        &vec!["east".to_string(), "north".to_string(), "south".to_string()]
    );
    // north: 100 + 100 (the missing sales row contributes nothing).
    assert_eq!(series[0].values[1], 200.0);

    save_chart(&prepared, &request, &out)?;
    assert!(out.exists());
    Ok(())
}

#[test]
fn filters_restrict_chart_input() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let mut request = base_request(ChartKind::Scatter);
    request.x = Some("rating".into());
    request.y = Some("sales".into());
    request.filters = vec![ChartFilter {
        column: "region".into(),
        values: vec!["north".into(), "south".into()],
    }];
    let prepared = prepare(&df, &request)?;
    let ChartData::Points { series } = &prepared.facets[0].data else {
        panic!("expected points");
    };
    // Six rows minus the east row and the row with missing sales.
    assert_eq!(series[0].points.len(), 4);
    Ok(())
}

#[test]
fn every_format_writes_a_line_chart() -> Result<()> {
    let file = common::write_csv("t,v\n1,5\n2,9\n3,4\n4,7\n");
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let dir = tempfile::tempdir()?;

    let mut request = base_request(ChartKind::Line);
    request.x = Some("t".into());
    request.y = Some("v".into());
    let prepared = prepare(&df, &request)?;
    for ext in ["png", "svg", "eps"] {
        let out = dir.path().join(format!("chart.{}", ext));
        save_chart(&prepared, &request, &out)?;
        assert!(out.exists(), "missing {}", ext);
        assert!(std::fs::metadata(&out)?.len() > 0);
    }
    Ok(())
}
