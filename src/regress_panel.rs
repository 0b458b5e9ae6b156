use ratatui::widgets::ListState;

use crate::config::RegressionConfig;
use crate::regress::{FittedModel, ModelKind, TrainRequest};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RegressFocus {
    #[default]
    Features,
    Target,
    Kind,
    Strength,
    Train,
    Predict,
}

/// State for the regression panel: feature checkboxes over the numeric
/// candidates, one target, model kind, and the last fitted session.
#[derive(Default)]
pub struct RegressPanel {
    pub active: bool,
    pub focus: RegressFocus,
    /// Numeric-projection column names.
    pub columns: Vec<String>,
    /// Parallel to `columns`: checked as a feature.
    pub selected: Vec<bool>,
    pub cursor: usize,
    pub target_idx: usize,
    pub kind_idx: usize,
    pub strength_input: String,
    /// Comma-separated feature values for prediction.
    pub predict_input: String,
    pub model: Option<FittedModel>,
    pub prediction: Option<f64>,
    pub feature_state: ListState,
}

impl RegressPanel {
    pub fn new() -> Self {
        Self {
            strength_input: "1.0".to_string(),
            ..Self::default()
        }
    }

    /// Refresh the candidate columns; a changed set discards checkboxes but
    /// keeps the fitted model (it stores its own column names).
    pub fn set_columns(&mut self, columns: Vec<String>) {
        if columns != self.columns {
            self.selected = vec![false; columns.len()];
            self.cursor = 0;
            self.target_idx = 0;
            self.columns = columns;
        }
        self.feature_state.select(if self.columns.is_empty() {
            None
        } else {
            Some(self.cursor.min(self.columns.len() - 1))
        });
    }

    pub fn toggle_feature(&mut self) {
        if let Some(slot) = self.selected.get_mut(self.cursor) {
            *slot = !*slot;
        }
    }

    pub fn move_cursor(&mut self, forward: bool) {
        if self.columns.is_empty() {
            return;
        }
        self.cursor = if forward {
            (self.cursor + 1) % self.columns.len()
        } else {
            self.cursor.checked_sub(1).unwrap_or(self.columns.len() - 1)
        };
        self.feature_state.select(Some(self.cursor));
    }

    pub fn cycle_target(&mut self, forward: bool) {
        if self.columns.is_empty() {
            return;
        }
        self.target_idx = if forward {
            (self.target_idx + 1) % self.columns.len()
        } else {
            self.target_idx
                .checked_sub(1)
                .unwrap_or(self.columns.len() - 1)
        };
    }

    pub fn cycle_kind(&mut self) {
        self.kind_idx = (self.kind_idx + 1) % ModelKind::ALL.len();
    }

    pub fn kind(&self) -> ModelKind {
        ModelKind::ALL[self.kind_idx % ModelKind::ALL.len()]
    }

    pub fn features(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.selected)
            .filter(|(_, checked)| **checked)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn target(&self) -> Option<String> {
        self.columns.get(self.target_idx).cloned()
    }

    /// Strength falls back to the configured default when the field does
    /// not parse.
    pub fn strength(&self, defaults: &RegressionConfig) -> f64 {
        self.strength_input
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0)
            .unwrap_or(defaults.strength)
    }

    pub fn build_request(&self, defaults: &RegressionConfig) -> TrainRequest {
        TrainRequest {
            features: self.features(),
            target: self.target().unwrap_or_default(),
            kind: self.kind(),
            strength: self.strength(defaults),
            max_iterations: defaults.max_iterations,
            tolerance: defaults.tolerance,
        }
    }

    /// Parse the comma-separated prediction input.
    pub fn parse_predict_input(&self) -> Result<Vec<f64>, String> {
        let trimmed = self.predict_input.trim();
        if trimmed.is_empty() {
            return Err("enter comma-separated feature values".to_string());
        }
        trimmed
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|_| format!("'{}' is not a number", part.trim()))
            })
            .collect()
    }
}
