use ratatui::widgets::ListState;

use crate::filter::{ColumnFilter, Predicate};

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum FilterFocus {
    #[default]
    Columns,
    Min,
    Max,
    Choice,
    Apply,
    Clear,
}

/// State for the filter sidebar: one entry per column, numeric entries edit
/// min/max text, categorical entries cycle a selector.
#[derive(Default)]
pub struct FilterPanel {
    pub active: bool,
    pub filters: Vec<ColumnFilter>,
    pub selected: usize,
    pub min_input: String,
    pub max_input: String,
    /// 0 = the "(All)" wildcard, 1.. = index into choices + 1.
    pub choice_idx: usize,
    pub focus: FilterFocus,
    pub list_state: ListState,
}

impl FilterPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filter set after a load or data change.
    pub fn set_filters(&mut self, filters: Vec<ColumnFilter>) {
        self.filters = filters;
        self.selected = 0;
        self.focus = FilterFocus::Columns;
        self.list_state.select(if self.filters.is_empty() {
            None
        } else {
            Some(0)
        });
        self.load_inputs();
    }

    pub fn selected_filter(&self) -> Option<&ColumnFilter> {
        self.filters.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.filters.is_empty() {
            return;
        }
        self.commit_inputs();
        self.selected = (self.selected + 1) % self.filters.len();
        self.list_state.select(Some(self.selected));
        self.load_inputs();
    }

    pub fn select_prev(&mut self) {
        if self.filters.is_empty() {
            return;
        }
        self.commit_inputs();
        self.selected = self.selected.checked_sub(1).unwrap_or(self.filters.len() - 1);
        self.list_state.select(Some(self.selected));
        self.load_inputs();
    }

    /// Refresh the edit fields from the selected predicate.
    pub fn load_inputs(&mut self) {
        let Some(filter) = self.filters.get(self.selected) else {
            self.min_input.clear();
            self.max_input.clear();
            self.choice_idx = 0;
            return;
        };
        match &filter.predicate {
            Predicate::Range { min, max } => {
                self.min_input = min.map(|v| v.to_string()).unwrap_or_default();
                self.max_input = max.map(|v| v.to_string()).unwrap_or_default();
                self.choice_idx = 0;
            }
            Predicate::Category { value } => {
                self.min_input.clear();
                self.max_input.clear();
                self.choice_idx = match value {
                    Some(v) => filter
                        .choices
                        .iter()
                        .position(|c| c == v)
                        .map(|i| i + 1)
                        .unwrap_or(0),
                    None => 0,
                };
            }
        }
    }

    /// Write the edit fields back into the selected predicate. Empty text or
    /// an unparseable bound becomes "unconstrained" rather than an error.
    pub fn commit_inputs(&mut self) {
        let (min_input, max_input, choice_idx) = (
            self.min_input.clone(),
            self.max_input.clone(),
            self.choice_idx,
        );
        let Some(filter) = self.filters.get_mut(self.selected) else {
            return;
        };
        match &mut filter.predicate {
            Predicate::Range { min, max } => {
                *min = min_input.trim().parse::<f64>().ok();
                *max = max_input.trim().parse::<f64>().ok();
            }
            Predicate::Category { value } => {
                *value = if choice_idx == 0 {
                    None
                } else {
                    filter.choices.get(choice_idx - 1).cloned()
                };
            }
        }
    }

    /// Step the categorical selector, wrapping through the wildcard.
    pub fn cycle_choice(&mut self, forward: bool) {
        let Some(filter) = self.filters.get(self.selected) else {
            return;
        };
        let options = filter.choices.len() + 1;
        self.choice_idx = if forward {
            (self.choice_idx + 1) % options
        } else {
            self.choice_idx.checked_sub(1).unwrap_or(options - 1)
        };
        self.commit_inputs();
    }

    /// Reset every predicate to unconstrained.
    pub fn clear_all(&mut self) {
        for filter in &mut self.filters {
            filter.predicate = match filter.predicate {
                Predicate::Range { .. } => Predicate::Range {
                    min: None,
                    max: None,
                },
                Predicate::Category { .. } => Predicate::Category { value: None },
            };
        }
        self.load_inputs();
    }

    /// Count of predicates that currently constrain the view.
    pub fn active_count(&self) -> usize {
        self.filters
            .iter()
            .filter(|f| !f.predicate.is_unconstrained())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> Vec<ColumnFilter> {
        vec![
            ColumnFilter {
                column: "score".into(),
                predicate: Predicate::Range {
                    min: None,
                    max: None,
                },
                data_min: Some(1.0),
                data_max: Some(9.0),
                choices: Vec::new(),
            },
            ColumnFilter {
                column: "grade".into(),
                predicate: Predicate::Category { value: None },
                data_min: None,
                data_max: None,
                choices: vec!["a".into(), "b".into()],
            },
        ]
    }

    #[test]
    fn set_filters_resets_selection() {
        let mut panel = FilterPanel::new();
        panel.set_filters(filters());
        assert_eq!(panel.selected, 0);
        assert_eq!(panel.list_state.selected(), Some(0));
        assert_eq!(panel.active_count(), 0);
    }

    #[test]
    fn commit_parses_numeric_bounds() {
        let mut panel = FilterPanel::new();
        panel.set_filters(filters());
        panel.min_input = "2.5".into();
        panel.max_input = "oops".into();
        panel.commit_inputs();
        match &panel.filters[0].predicate {
            Predicate::Range { min, max } => {
                assert_eq!(*min, Some(2.5));
                assert_eq!(*max, None);
            }
            _ => panic!("expected range"),
        }
        assert_eq!(panel.active_count(), 1);
    }

    #[test]
    fn cycle_choice_wraps_through_wildcard() {
        let mut panel = FilterPanel::new();
        panel.set_filters(filters());
        panel.selected = 1;
        panel.load_inputs();
        panel.cycle_choice(true);
        assert!(matches!(
            &panel.filters[1].predicate,
            Predicate::Category { value: Some(v) } if v == "a"
        ));
        panel.cycle_choice(true);
        panel.cycle_choice(true);
        assert!(matches!(
            &panel.filters[1].predicate,
            Predicate::Category { value: None }
        ));
    }

    #[test]
    fn selection_commits_pending_edits() {
        let mut panel = FilterPanel::new();
        panel.set_filters(filters());
        panel.min_input = "3".into();
        panel.select_next();
        assert!(matches!(
            &panel.filters[0].predicate,
            Predicate::Range { min: Some(v), .. } if *v == 3.0
        ));
    }

    #[test]
    fn clear_all_removes_constraints() {
        let mut panel = FilterPanel::new();
        panel.set_filters(filters());
        panel.min_input = "3".into();
        panel.commit_inputs();
        panel.clear_all();
        assert_eq!(panel.active_count(), 0);
    }
}
