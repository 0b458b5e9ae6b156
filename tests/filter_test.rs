use color_eyre::Result;
use scour::filter::{apply_filters, build_filters, ColumnFilter, Predicate};
use scour::loader::{load_dataset, OpenOptions};

mod common;

fn set_range(filters: &mut [ColumnFilter], column: &str, min: Option<f64>, max: Option<f64>) {
    for filter in filters.iter_mut() {
        if filter.column == column {
            filter.predicate = Predicate::Range { min, max };
        }
    }
}

fn set_category(filters: &mut [ColumnFilter], column: &str, value: Option<&str>) {
    for filter in filters.iter_mut() {
        if filter.column == column {
            filter.predicate = Predicate::Category {
                value: value.map(String::from),
            };
        }
    }
}

#[test]
fn predicate_kinds_follow_column_types() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let filters = build_filters(&df, 50)?;

    let by_name = |name: &str| filters.iter().find(|f| f.column == name).unwrap();
    assert!(matches!(
        by_name("sales").predicate,
        Predicate::Range { .. }
    ));
    assert!(matches!(
        by_name("region").predicate,
        Predicate::Category { .. }
    ));
    assert!(by_name("region").choices.contains(&"north".to_string()));
    Ok(())
}

#[test]
fn conjunction_and_row_count_bound() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let mut filters = build_filters(&df, 50)?;
    set_range(&mut filters, "sales", Some(90.0), None);
    set_category(&mut filters, "region", Some("north"));

    let out = apply_filters(&df, &filters)?;
    assert!(out.height() <= df.height());
    // Every retained row satisfies all predicates.
    for i in 0..out.height() {
        let sales: f64 = out.column("sales")?.get(i)?.try_extract()?;
        let region = out.column("region")?.get(i)?.str_value().to_string();
        assert!(sales >= 90.0);
        assert_eq!(region, "north");
    }
    Ok(())
}

#[test]
fn min_only_range_ignores_missing_max() -> Result<()> {
    let file = common::write_csv(
        "score\n10\n40\n50\n60\n75\n90\n20\n55\n80\n100\n", // 10 rows
    );
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let mut filters = build_filters(&df, 50)?;
    set_range(&mut filters, "score", Some(50.0), None);
    let out = apply_filters(&df, &filters)?;
    assert_eq!(out.height(), 7);
    Ok(())
}

#[test]
fn filtered_view_does_not_mutate_source() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let before = df.clone();
    let mut filters = build_filters(&df, 50)?;
    set_category(&mut filters, "month", Some("feb"));
    let _ = apply_filters(&df, &filters)?;
    assert!(df.equals_missing(&before));
    Ok(())
}

#[test]
fn unknown_column_predicates_are_skipped() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let filters = vec![ColumnFilter {
        column: "not_a_column".into(),
        predicate: Predicate::Range {
            min: Some(0.0),
            max: None,
        },
        data_min: None,
        data_max: None,
        choices: Vec::new(),
    }];
    let out = apply_filters(&df, &filters)?;
    assert_eq!(out.height(), df.height());
    Ok(())
}
