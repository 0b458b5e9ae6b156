use ratatui::widgets::ListState;

use crate::clean::{CleanOp, FillMethod, KeepPolicy, MissingSummary, TargetType};

/// The operation pages of the cleaning panel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CleanPage {
    #[default]
    MissingValues,
    Duplicates,
    ChangeType,
    CleanText,
}

impl CleanPage {
    pub const ALL: [Self; 4] = [
        Self::MissingValues,
        Self::Duplicates,
        Self::ChangeType,
        Self::CleanText,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CleanPage::MissingValues => "Manage Missing Values",
            CleanPage::Duplicates => "Remove Duplicates",
            CleanPage::ChangeType => "Change Data Type",
            CleanPage::CleanText => "Clean Text",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CleanFocus {
    #[default]
    Pages,
    Column,
    Method,
    Value,
    Action,
}

const FILL_METHODS: [&str; 6] = [
    "Mean",
    "Median",
    "Mode",
    "Constant Value",
    "Forward Fill",
    "Backward Fill",
];

/// State for the cleaning panel. Selections translate into a [`CleanOp`]
/// via `build_op`; a missing selection yields `None` (silent no-op, matching
/// the forgiving interactive contract).
#[derive(Default)]
pub struct CleanPanel {
    pub active: bool,
    pub page: CleanPage,
    pub focus: CleanFocus,
    pub columns: Vec<String>,
    pub summary: MissingSummary,

    pub column_idx: usize,
    pub method_idx: usize,
    pub constant_input: String,
    /// Missing-column threshold, entered as a percentage.
    pub threshold_input: String,
    /// Parallel to `columns`: membership in the dedup subset.
    pub subset_selected: Vec<bool>,
    pub keep_idx: usize,
    pub target_idx: usize,
    pub trim: bool,
    pub lowercase: bool,
    pub strip_special: bool,

    pub page_state: ListState,
    pub column_state: ListState,
}

impl CleanPanel {
    pub fn new() -> Self {
        let mut panel = Self {
            threshold_input: "5".to_string(),
            trim: true,
            ..Self::default()
        };
        panel.page_state.select(Some(0));
        panel
    }

    /// Refresh column lists and the missing-value summary after any data
    /// change.
    pub fn set_columns(&mut self, columns: Vec<String>, summary: MissingSummary) {
        self.subset_selected = vec![false; columns.len()];
        self.columns = columns;
        self.summary = summary;
        if self.column_idx >= self.columns.len() {
            self.column_idx = 0;
        }
        self.column_state.select(if self.columns.is_empty() {
            None
        } else {
            Some(self.column_idx)
        });
    }

    pub fn selected_column(&self) -> Option<&String> {
        self.columns.get(self.column_idx)
    }

    pub fn select_page(&mut self, idx: usize) {
        if let Some(page) = CleanPage::ALL.get(idx) {
            self.page = *page;
            self.page_state.select(Some(idx));
        }
    }

    pub fn fill_method_labels() -> &'static [&'static str] {
        &FILL_METHODS
    }

    pub fn fill_method(&self) -> FillMethod {
        match self.method_idx {
            0 => FillMethod::Mean,
            1 => FillMethod::Median,
            2 => FillMethod::Mode,
            3 => FillMethod::Constant(self.constant_input.clone()),
            4 => FillMethod::ForwardFill,
            _ => FillMethod::BackwardFill,
        }
    }

    pub fn keep_policy(&self) -> KeepPolicy {
        match self.keep_idx {
            0 => KeepPolicy::First,
            1 => KeepPolicy::Last,
            _ => KeepPolicy::None,
        }
    }

    pub fn target_type(&self) -> TargetType {
        TargetType::ALL[self.target_idx % TargetType::ALL.len()]
    }

    /// Threshold as a fraction in [0, 1]; the field is edited in percent.
    pub fn threshold_fraction(&self) -> Option<f64> {
        self.threshold_input
            .trim()
            .parse::<f64>()
            .ok()
            .map(|pct| (pct / 100.0).clamp(0.0, 1.0))
    }

    pub fn toggle_subset(&mut self) {
        if let Some(slot) = self.subset_selected.get_mut(self.column_idx) {
            *slot = !*slot;
        }
    }

    pub fn subset_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.subset_selected)
            .filter(|(_, selected)| **selected)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The fill operation for the current selections, or None when nothing
    /// is selected.
    pub fn build_fill_op(&self) -> Option<CleanOp> {
        let column = self.selected_column()?.clone();
        Some(CleanOp::FillMissing {
            column,
            method: self.fill_method(),
        })
    }

    pub fn build_threshold_op(&self) -> Option<CleanOp> {
        Some(CleanOp::DropMissingColumns {
            threshold: self.threshold_fraction()?,
        })
    }

    pub fn build_dedup_op(&self) -> CleanOp {
        CleanOp::DropDuplicates {
            subset: self.subset_columns(),
            keep: self.keep_policy(),
        }
    }

    pub fn build_cast_op(&self) -> Option<CleanOp> {
        let column = self.selected_column()?.clone();
        Some(CleanOp::CastColumn {
            column,
            target: self.target_type(),
        })
    }

    pub fn build_text_op(&self) -> Option<CleanOp> {
        let column = self.selected_column()?.clone();
        Some(CleanOp::NormalizeText {
            column,
            trim: self.trim,
            lowercase: self.lowercase,
            strip_special: self.strip_special,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel_with_columns() -> CleanPanel {
        let mut panel = CleanPanel::new();
        panel.set_columns(
            vec!["a".into(), "b".into(), "c".into()],
            MissingSummary::default(),
        );
        panel
    }

    #[test]
    fn new_panel_defaults() {
        let panel = CleanPanel::new();
        assert_eq!(panel.page, CleanPage::MissingValues);
        assert_eq!(panel.threshold_input, "5");
        assert!(panel.trim);
        assert!(panel.build_fill_op().is_none());
    }

    #[test]
    fn threshold_is_percent() {
        let mut panel = panel_with_columns();
        panel.threshold_input = "25".into();
        assert_eq!(panel.threshold_fraction(), Some(0.25));
        panel.threshold_input = "150".into();
        assert_eq!(panel.threshold_fraction(), Some(1.0));
        panel.threshold_input = "abc".into();
        assert_eq!(panel.threshold_fraction(), None);
    }

    #[test]
    fn fill_op_uses_selected_column_and_method() {
        let mut panel = panel_with_columns();
        panel.column_idx = 1;
        panel.method_idx = 3;
        panel.constant_input = "0".into();
        let op = panel.build_fill_op().unwrap();
        assert_eq!(
            op,
            CleanOp::FillMissing {
                column: "b".into(),
                method: FillMethod::Constant("0".into()),
            }
        );
    }

    #[test]
    fn dedup_op_collects_subset() {
        let mut panel = panel_with_columns();
        panel.column_idx = 0;
        panel.toggle_subset();
        panel.column_idx = 2;
        panel.toggle_subset();
        panel.keep_idx = 2;
        let op = panel.build_dedup_op();
        assert_eq!(
            op,
            CleanOp::DropDuplicates {
                subset: vec!["a".into(), "c".into()],
                keep: KeepPolicy::None,
            }
        );
    }

    #[test]
    fn set_columns_resets_out_of_range_selection() {
        let mut panel = panel_with_columns();
        panel.column_idx = 2;
        panel.set_columns(vec!["only".into()], MissingSummary::default());
        assert_eq!(panel.column_idx, 0);
        assert_eq!(panel.subset_selected.len(), 1);
    }

    #[test]
    fn text_op_carries_flags() {
        let mut panel = panel_with_columns();
        panel.lowercase = true;
        panel.strip_special = true;
        let op = panel.build_text_op().unwrap();
        assert_eq!(
            op,
            CleanOp::NormalizeText {
                column: "a".into(),
                trim: true,
                lowercase: true,
                strip_special: true,
            }
        );
    }
}
