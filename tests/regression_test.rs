use color_eyre::Result;
use scour::loader::{load_dataset, OpenOptions};
use scour::regress::{numeric_columns, train, ModelKind, TrainRequest};

mod common;

fn request(features: &[&str], target: &str, kind: ModelKind) -> TrainRequest {
    TrainRequest {
        features: features.iter().map(|s| s.to_string()).collect(),
        target: target.to_string(),
        kind,
        ..Default::default()
    }
}

#[test]
fn numeric_candidacy_includes_numeric_looking_text() -> Result<()> {
    // `price` arrives quoted but every value parses as a number.
    let file = common::write_csv(
        "name,price,qty\n\
         apple,\"1.5\",3\n\
         pear,\"2.0\",5\n\
         plum,\"2.5\",7\n",
    );
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let columns = numeric_columns(&df);
    assert!(columns.contains(&"price".to_string()));
    assert!(columns.contains(&"qty".to_string()));
    assert!(!columns.contains(&"name".to_string()));
    Ok(())
}

#[test]
fn train_on_loaded_csv_and_predict() -> Result<()> {
    let file = common::write_csv(
        "x1,x2,y\n\
         1,5,12\n\
         2,4,14\n\
         3,3,16\n\
         4,2,18\n\
         5,1,20\n\
         6,6,27\n",
    );
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    // y = 2*x1 + x2 + 5 exactly.
    let model = train(&df, &request(&["x1", "x2"], "y", ModelKind::Linear))?;
    assert!((model.r_squared - 1.0).abs() < 1e-8);
    assert!(model.rmse < 1e-6);
    let prediction = model.predict(&[3.0, 5.0])?;
    assert!((prediction - 16.0).abs() < 1e-6);
    Ok(())
}

#[test]
fn rows_with_missing_values_are_excluded() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let model = train(&df, &request(&["rating"], "sales", ModelKind::Linear))?;
    // One row has a missing sales value; five complete rows remain.
    assert_eq!(model.n_rows, 5);
    Ok(())
}

#[test]
fn training_row_prediction_is_deterministic() -> Result<()> {
    let file = common::write_csv(
        "x,y\n\
         1,2.3\n\
         2,4.1\n\
         3,6.4\n\
         4,7.9\n\
         5,10.2\n",
    );
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    for kind in ModelKind::ALL {
        let first = train(&df, &request(&["x"], "y", kind))?;
        let second = train(&df, &request(&["x"], "y", kind))?;
        // The same data and request reproduce the same session exactly.
        assert_eq!(first.coefficients, second.coefficients);
        assert_eq!(first.predict(&[3.0])?, second.predict(&[3.0])?);
    }
    Ok(())
}

#[test]
fn ridge_and_lasso_use_strength() -> Result<()> {
    let file = common::write_csv(
        "x,y\n\
         1,2\n\
         2,4\n\
         3,6\n\
         4,8\n\
         5,10\n",
    );
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    let linear = train(&df, &request(&["x"], "y", ModelKind::Linear))?;

    let mut ridge_req = request(&["x"], "y", ModelKind::Ridge);
    ridge_req.strength = 5.0;
    let ridge = train(&df, &ridge_req)?;
    assert!(ridge.coefficients[0].abs() < linear.coefficients[0].abs());

    let mut lasso_req = request(&["x"], "y", ModelKind::Lasso);
    lasso_req.strength = 1e9;
    let lasso = train(&df, &lasso_req)?;
    assert!(lasso.coefficients.iter().all(|c| *c == 0.0));
    Ok(())
}

#[test]
fn selection_errors_come_before_computation() -> Result<()> {
    let file = common::sample_sales_csv();
    let df = load_dataset(file.path(), &OpenOptions::new())?;
    assert!(train(&df, &request(&[], "sales", ModelKind::Linear)).is_err());
    assert!(train(&df, &request(&["region"], "sales", ModelKind::Linear)).is_err());
    assert!(train(&df, &request(&["sales"], "sales", ModelKind::Linear)).is_err());
    Ok(())
}
