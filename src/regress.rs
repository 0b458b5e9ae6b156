//! Linear model fitting over the numeric projection of a dataset.
//!
//! Features are standardized to zero mean and unit variance before fitting;
//! the fitted scaler travels with the model so predictions see the same
//! transform. Fit quality (R², RMSE) is reported on the training data
//! itself: this is an exploratory tool, not an evaluation pipeline.

use faer::{Col, Mat};
use polars::prelude::*;
use thiserror::Error;

/// Errors surfaced by training and prediction.
#[derive(Debug, Error)]
pub enum RegressError {
    #[error("select at least one feature column")]
    NoFeatures,

    #[error("target column '{0}' cannot also be a feature")]
    TargetIsFeature(String),

    #[error("column '{0}' is not numeric")]
    NotNumeric(String),

    #[error("insufficient rows: need at least {needed} complete rows, got {got}")]
    InsufficientRows { needed: usize, got: usize },

    #[error("feature matrix is singular or nearly singular")]
    SingularMatrix,

    #[error("expected {expected} feature value(s), got {got}")]
    FeatureCountMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

pub type RegressResult<T> = std::result::Result<T, RegressError>;

/// Which linear model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Linear,
    Ridge,
    Lasso,
}

impl ModelKind {
    pub const ALL: [Self; 3] = [Self::Linear, Self::Ridge, Self::Lasso];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Linear => "Linear",
            ModelKind::Ridge => "Ridge",
            ModelKind::Lasso => "Lasso",
        }
    }

    /// Regularization strength only applies to the penalized models.
    pub fn uses_strength(self) -> bool {
        !matches!(self, ModelKind::Linear)
    }
}

/// A training request from the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainRequest {
    pub features: Vec<String>,
    pub target: String,
    pub kind: ModelKind,
    /// Regularization strength for Ridge/Lasso; ignored by Linear.
    pub strength: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for TrainRequest {
    fn default() -> Self {
        Self {
            features: Vec::new(),
            target: String::new(),
            kind: ModelKind::Linear,
            strength: 1.0,
            max_iterations: 1_000,
            tolerance: 1e-6,
        }
    }
}

/// Per-feature standardization transform fitted jointly with the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl Scaler {
    fn fit(x: &Mat<f64>) -> Self {
        let n = x.nrows() as f64;
        let p = x.ncols();
        let mut means = vec![0.0; p];
        let mut stds = vec![0.0; p];
        for j in 0..p {
            let mut sum = 0.0;
            for i in 0..x.nrows() {
                sum += x[(i, j)];
            }
            means[j] = sum / n;
            let mut sq = 0.0;
            for i in 0..x.nrows() {
                sq += (x[(i, j)] - means[j]).powi(2);
            }
            let std = (sq / n).sqrt();
            // Zero-variance features pass through unscaled.
            stds[j] = if std > 0.0 { std } else { 1.0 };
        }
        Self { means, stds }
    }

    fn transform(&self, x: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(x.nrows(), x.ncols(), |i, j| {
            (x[(i, j)] - self.means[j]) / self.stds[j]
        })
    }

    fn transform_row(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .map(|(j, v)| (v - self.means[j]) / self.stds[j])
            .collect()
    }
}

/// The fitted regression session: replaced wholesale by the next `train`.
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub features: Vec<String>,
    pub target: String,
    pub kind: ModelKind,
    pub strength: f64,
    /// Coefficients in feature order, in standardized feature space.
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub r_squared: f64,
    pub rmse: f64,
    pub n_rows: usize,
    scaler: Scaler,
}

impl FittedModel {
    /// Predict the target for one feature vector in trained feature order.
    pub fn predict(&self, values: &[f64]) -> RegressResult<f64> {
        if values.len() != self.features.len() {
            return Err(RegressError::FeatureCountMismatch {
                expected: self.features.len(),
                got: values.len(),
            });
        }
        let scaled = self.scaler.transform_row(values);
        let mut y = self.intercept;
        for (beta, z) in self.coefficients.iter().zip(&scaled) {
            y += beta * z;
        }
        Ok(y)
    }
}

/// Numeric view of a dataset: native numeric columns, plus string columns
/// whose every non-missing value parses as a number (coerced to Float64).
/// Everything else is excluded from feature/target candidacy.
pub fn numeric_projection(df: &DataFrame) -> RegressResult<DataFrame> {
    let mut columns: Vec<polars::prelude::Column> = Vec::new();
    for column in df.get_columns() {
        if column.dtype().is_numeric() {
            columns.push(column.clone());
        } else if column.dtype() == &DataType::String {
            let coerced = column.cast(&DataType::Float64)?;
            let lossless = coerced.null_count() == column.null_count();
            let has_values = column.null_count() < column.len();
            if lossless && has_values {
                columns.push(coerced);
            }
        }
    }
    if columns.is_empty() {
        return Ok(DataFrame::empty());
    }
    Ok(DataFrame::new(columns)?)
}

/// Column names available as regression variables.
pub fn numeric_columns(df: &DataFrame) -> Vec<String> {
    numeric_projection(df)
        .map(|p| {
            p.get_column_names()
                .iter()
                .map(|n| n.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Fit the requested model. Rows with a missing value in any selected
/// column are dropped before fitting.
pub fn train(df: &DataFrame, request: &TrainRequest) -> RegressResult<FittedModel> {
    if request.features.is_empty() {
        return Err(RegressError::NoFeatures);
    }
    if request.features.contains(&request.target) {
        return Err(RegressError::TargetIsFeature(request.target.clone()));
    }

    let projection = numeric_projection(df)?;
    let mut selected = request.features.clone();
    selected.push(request.target.clone());
    for name in &selected {
        if projection.column(name).is_err() {
            return Err(RegressError::NotNumeric(name.clone()));
        }
    }

    let complete = projection
        .select(selected.iter().map(String::as_str))?
        .lazy()
        .drop_nulls(None)
        .collect()?;
    let n = complete.height();
    let p = request.features.len();
    let needed = p + 1;
    if n < needed {
        return Err(RegressError::InsufficientRows { needed, got: n });
    }

    let mut x = Mat::zeros(n, p);
    for (j, name) in request.features.iter().enumerate() {
        let values = complete.column(name)?.cast(&DataType::Float64)?;
        let values = values.f64()?;
        for i in 0..n {
            x[(i, j)] = values.get(i).unwrap_or(f64::NAN);
        }
    }
    let target = complete.column(&request.target)?.cast(&DataType::Float64)?;
    let target = target.f64()?;
    let y = Col::from_fn(n, |i| target.get(i).unwrap_or(f64::NAN));

    let scaler = Scaler::fit(&x);
    let x_std = scaler.transform(&x);

    // Standardized features are centered, so the intercept is the target
    // mean and the penalized models leave it unpenalized.
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let y_centered = Col::from_fn(n, |i| y[i] - y_mean);

    let coefficients = match request.kind {
        ModelKind::Linear => solve_normal_equations(&x_std, &y_centered, 0.0)?,
        ModelKind::Ridge => solve_normal_equations(&x_std, &y_centered, request.strength)?,
        ModelKind::Lasso => coordinate_descent(
            &x_std,
            &y_centered,
            // Lambda follows the glmnet convention (scaled by sample count).
            request.strength * n as f64,
            request.max_iterations,
            request.tolerance,
        ),
    };

    let (r_squared, rmse) = score(&x_std, &y, &coefficients, y_mean);

    Ok(FittedModel {
        features: request.features.clone(),
        target: request.target.clone(),
        kind: request.kind,
        strength: request.strength,
        coefficients: coefficients.iter().copied().collect(),
        intercept: y_mean,
        r_squared,
        rmse,
        n_rows: n,
        scaler,
    })
}

/// Solve `(X'X + λI) β = X'y` by QR with back-substitution. λ = 0 is
/// ordinary least squares.
fn solve_normal_equations(x: &Mat<f64>, y: &Col<f64>, lambda: f64) -> RegressResult<Col<f64>> {
    let p = x.ncols();
    let mut xtx = x.transpose() * x;
    for j in 0..p {
        xtx[(j, j)] += lambda;
    }
    let xty = x.transpose() * y;

    let qr = xtx.qr();
    let q = qr.compute_Q();
    let r = qr.R();
    for i in 0..p {
        if r[(i, i)].abs() < 1e-12 {
            return Err(RegressError::SingularMatrix);
        }
    }

    let qt = q.transpose();
    let mut qtb = vec![0.0; p];
    for (i, slot) in qtb.iter_mut().enumerate() {
        let mut sum = 0.0;
        for k in 0..p {
            sum += qt[(i, k)] * xty[k];
        }
        *slot = sum;
    }

    let mut beta = Col::zeros(p);
    for i in (0..p).rev() {
        let mut sum = qtb[i];
        for j in (i + 1)..p {
            sum -= r[(i, j)] * beta[j];
        }
        beta[i] = sum / r[(i, i)];
    }
    Ok(beta)
}

/// Soft thresholding operator: S(z, γ) = sign(z) · max(|z| − γ, 0).
fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

/// Lasso by coordinate descent on centered data.
fn coordinate_descent(
    x: &Mat<f64>,
    y: &Col<f64>,
    lambda: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Col<f64> {
    let n = x.nrows();
    let p = x.ncols();

    let mut col_sq = vec![0.0; p];
    for (j, slot) in col_sq.iter_mut().enumerate() {
        for i in 0..n {
            *slot += x[(i, j)] * x[(i, j)];
        }
    }

    let mut beta: Col<f64> = Col::zeros(p);
    let mut residuals = y.clone();

    for _ in 0..max_iterations {
        let mut max_change = 0.0f64;
        for j in 0..p {
            if col_sq[j] < 1e-14 {
                continue;
            }
            let old = beta[j];
            let mut rho = 0.0;
            for i in 0..n {
                rho += x[(i, j)] * residuals[i];
            }
            rho += col_sq[j] * old;

            let new = soft_threshold(rho, lambda) / col_sq[j];
            let delta = new - old;
            if delta.abs() > 1e-14 {
                for i in 0..n {
                    residuals[i] -= x[(i, j)] * delta;
                }
            }
            beta[j] = new;
            max_change = max_change.max(delta.abs());
        }
        if max_change < tolerance {
            break;
        }
    }
    beta
}

/// R² and RMSE on the training data.
fn score(x_std: &Mat<f64>, y: &Col<f64>, beta: &Col<f64>, intercept: f64) -> (f64, f64) {
    let n = y.nrows();
    let y_mean = y.iter().sum::<f64>() / n as f64;
    let mut rss = 0.0;
    let mut tss = 0.0;
    for i in 0..n {
        let mut fitted = intercept;
        for j in 0..x_std.ncols() {
            fitted += beta[j] * x_std[(i, j)];
        }
        rss += (y[i] - fitted).powi(2);
        tss += (y[i] - y_mean).powi(2);
    }
    let r_squared = if tss == 0.0 {
        if rss == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - rss / tss
    };
    (r_squared, (rss / n as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    fn linear_data() -> DataFrame {
        let x: Vec<f64> = (1..=5).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        df!("x" => x, "y" => y).unwrap()
    }

    fn request(features: &[&str], target: &str, kind: ModelKind) -> TrainRequest {
        TrainRequest {
            features: features.iter().map(|s| s.to_string()).collect(),
            target: target.to_string(),
            kind,
            ..Default::default()
        }
    }

    #[test]
    fn projection_keeps_numeric_and_numeric_looking_text() {
        let df = df!(
            "a" => &[1i64, 2],
            "b" => &["3.5", "4.5"],
            "c" => &["x", "y"]
        )
        .unwrap();
        let proj = numeric_projection(&df).unwrap();
        assert_eq!(proj.get_column_names(), vec!["a", "b"]);
        assert_eq!(proj.column("b").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn projection_of_all_text_is_empty() {
        let df = df!("c" => &["x", "y"]).unwrap();
        assert_eq!(numeric_projection(&df).unwrap().width(), 0);
    }

    #[test]
    fn linear_fit_recovers_exact_relationship() {
        let model = train(&linear_data(), &request(&["x"], "y", ModelKind::Linear)).unwrap();
        assert!(close(model.r_squared, 1.0));
        assert!(model.rmse < 1e-8);
        assert!(close(model.intercept, 7.0));
        assert!(close(model.predict(&[5.0]).unwrap(), 11.0));
        assert!(close(model.predict(&[0.0]).unwrap(), 1.0));
    }

    #[test]
    fn linear_fit_two_features() {
        let x1: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x2: Vec<f64> = vec![2.0, 1.0, 4.0, 3.0, 6.0, 5.0];
        let y: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| 3.0 * a - 2.0 * b + 0.5)
            .collect();
        let df = df!("x1" => x1, "x2" => x2, "y" => y).unwrap();
        let model = train(&df, &request(&["x1", "x2"], "y", ModelKind::Linear)).unwrap();
        assert!(close(model.r_squared, 1.0));
        assert!(close(model.predict(&[2.0, 2.0]).unwrap(), 2.5));
    }

    #[test]
    fn predict_reproduces_training_predictions() {
        // Noisy data: predict on a training row must equal the fitted value
        // because the same scaler and coefficients apply.
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 1.5 * v + ((v * 7.0) % 3.0)).collect();
        let df = df!("x" => x.clone(), "y" => y).unwrap();
        let model = train(&df, &request(&["x"], "y", ModelKind::Linear)).unwrap();
        let first = model.predict(&[x[3]]).unwrap();
        let second = model.predict(&[x[3]]).unwrap();
        assert!(close(first, second));
    }

    #[test]
    fn ridge_zero_strength_matches_linear() {
        let mut req = request(&["x"], "y", ModelKind::Ridge);
        req.strength = 0.0;
        let ridge = train(&linear_data(), &req).unwrap();
        let linear = train(&linear_data(), &request(&["x"], "y", ModelKind::Linear)).unwrap();
        assert!(close(ridge.coefficients[0], linear.coefficients[0]));
    }

    #[test]
    fn ridge_shrinks_coefficients() {
        let linear = train(&linear_data(), &request(&["x"], "y", ModelKind::Linear)).unwrap();
        let mut req = request(&["x"], "y", ModelKind::Ridge);
        req.strength = 10.0;
        let ridge = train(&linear_data(), &req).unwrap();
        assert!(ridge.coefficients[0].abs() < linear.coefficients[0].abs());
        assert!(ridge.coefficients[0] > 0.0);
    }

    #[test]
    fn lasso_large_strength_zeroes_coefficients() {
        let mut req = request(&["x"], "y", ModelKind::Lasso);
        req.strength = 1e6;
        let model = train(&linear_data(), &req).unwrap();
        assert!(model.coefficients.iter().all(|c| *c == 0.0));
        // With all coefficients zeroed the model predicts the target mean.
        assert!(close(model.predict(&[3.0]).unwrap(), model.intercept));
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let df = df!(
            "x" => &[Some(1.0f64), Some(2.0), None, Some(4.0)],
            "y" => &[Some(3.0f64), Some(5.0), Some(7.0), None]
        )
        .unwrap();
        let model = train(&df, &request(&["x"], "y", ModelKind::Linear)).unwrap();
        assert_eq!(model.n_rows, 2);
    }

    #[test]
    fn train_requires_features() {
        let err = train(&linear_data(), &request(&[], "y", ModelKind::Linear)).unwrap_err();
        assert!(matches!(err, RegressError::NoFeatures));
    }

    #[test]
    fn train_rejects_target_among_features() {
        let err = train(&linear_data(), &request(&["y"], "y", ModelKind::Linear)).unwrap_err();
        assert!(matches!(err, RegressError::TargetIsFeature(_)));
    }

    #[test]
    fn train_rejects_non_numeric_columns() {
        let df = df!("x" => &[1.0f64, 2.0, 3.0], "label" => &["a", "b", "c"]).unwrap();
        let err = train(&df, &request(&["x"], "label", ModelKind::Linear)).unwrap_err();
        assert!(matches!(err, RegressError::NotNumeric(_)));
    }

    #[test]
    fn train_rejects_too_few_rows() {
        let df = df!("x" => &[1.0f64], "y" => &[2.0f64]).unwrap();
        let err = train(&df, &request(&["x"], "y", ModelKind::Linear)).unwrap_err();
        assert!(matches!(err, RegressError::InsufficientRows { .. }));
    }

    #[test]
    fn predict_rejects_wrong_arity() {
        let model = train(&linear_data(), &request(&["x"], "y", ModelKind::Linear)).unwrap();
        let err = model.predict(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            RegressError::FeatureCountMismatch {
                expected: 1,
                got: 2
            }
        ));
    }

    #[test]
    fn soft_threshold_operator() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }
}
