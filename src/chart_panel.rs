use crate::chart::{AggFn, ChartKind, ChartRequest, SortDir};
use crate::config::ChartsConfig;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChartFocus {
    #[default]
    Kind,
    X,
    Y,
    Hue,
    FacetRow,
    FacetCol,
    Agg,
    Sort,
    Title,
    Path,
    Save,
}

impl ChartFocus {
    pub fn next(self) -> Self {
        match self {
            ChartFocus::Kind => ChartFocus::X,
            ChartFocus::X => ChartFocus::Y,
            ChartFocus::Y => ChartFocus::Hue,
            ChartFocus::Hue => ChartFocus::FacetRow,
            ChartFocus::FacetRow => ChartFocus::FacetCol,
            ChartFocus::FacetCol => ChartFocus::Agg,
            ChartFocus::Agg => ChartFocus::Sort,
            ChartFocus::Sort => ChartFocus::Title,
            ChartFocus::Title => ChartFocus::Path,
            ChartFocus::Path => ChartFocus::Save,
            ChartFocus::Save => ChartFocus::Kind,
        }
    }
}

/// State for the chart panel. Column pickers are index-based with 0 meaning
/// "(none)"; `build_request` translates the selections into a ChartRequest.
#[derive(Default)]
pub struct ChartPanel {
    pub active: bool,
    pub focus: ChartFocus,
    pub columns: Vec<String>,
    pub kind_idx: usize,
    pub x_idx: usize,
    pub y_idx: usize,
    pub hue_idx: usize,
    pub facet_row_idx: usize,
    pub facet_col_idx: usize,
    /// 0 = no aggregation, 1.. = AggFn::ALL index + 1.
    pub agg_idx: usize,
    /// 0 = unsorted, 1 = ascending, 2 = descending.
    pub sort_idx: usize,
    pub title_input: String,
    pub path_input: String,
}

impl ChartPanel {
    pub fn new() -> Self {
        Self {
            path_input: "chart.png".to_string(),
            ..Self::default()
        }
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        if columns != self.columns {
            self.x_idx = 0;
            self.y_idx = 0;
            self.hue_idx = 0;
            self.facet_row_idx = 0;
            self.facet_col_idx = 0;
            self.columns = columns;
        }
    }

    pub fn kind(&self) -> ChartKind {
        ChartKind::ALL[self.kind_idx % ChartKind::ALL.len()]
    }

    pub fn cycle_kind(&mut self, forward: bool) {
        let n = ChartKind::ALL.len();
        self.kind_idx = if forward {
            (self.kind_idx + 1) % n
        } else {
            self.kind_idx.checked_sub(1).unwrap_or(n - 1)
        };
    }

    /// Step one of the "(none)" + columns pickers.
    pub fn cycle_column(idx: &mut usize, columns: &[String], forward: bool) {
        let options = columns.len() + 1;
        *idx = if forward {
            (*idx + 1) % options
        } else {
            idx.checked_sub(1).unwrap_or(options - 1)
        };
    }

    fn column_at(&self, idx: usize) -> Option<String> {
        if idx == 0 {
            None
        } else {
            self.columns.get(idx - 1).cloned()
        }
    }

    pub fn agg(&self) -> Option<AggFn> {
        if self.agg_idx == 0 {
            None
        } else {
            AggFn::ALL.get(self.agg_idx - 1).copied()
        }
    }

    pub fn cycle_agg(&mut self, forward: bool) {
        let options = AggFn::ALL.len() + 1;
        self.agg_idx = if forward {
            (self.agg_idx + 1) % options
        } else {
            self.agg_idx.checked_sub(1).unwrap_or(options - 1)
        };
    }

    pub fn sort(&self) -> Option<SortDir> {
        match self.sort_idx {
            1 => Some(SortDir::Asc),
            2 => Some(SortDir::Desc),
            _ => None,
        }
    }

    pub fn cycle_sort(&mut self) {
        self.sort_idx = (self.sort_idx + 1) % 3;
    }

    pub fn build_request(&self, charts: &ChartsConfig) -> ChartRequest {
        ChartRequest {
            kind: self.kind(),
            x: self.column_at(self.x_idx),
            y: self.column_at(self.y_idx),
            hue: self.column_at(self.hue_idx),
            facet_row: self.column_at(self.facet_row_idx),
            facet_col: self.column_at(self.facet_col_idx),
            filters: Vec::new(),
            agg: self.agg(),
            sort: self.sort(),
            palette: charts.palette.clone(),
            title: if self.title_input.trim().is_empty() {
                None
            } else {
                Some(self.title_input.trim().to_string())
            },
            size: (charts.width, charts.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> ChartPanel {
        let mut panel = ChartPanel::new();
        panel.set_columns(vec!["region".into(), "sales".into()]);
        panel
    }

    #[test]
    fn zero_index_means_none() {
        let panel = panel();
        let request = panel.build_request(&ChartsConfig::default());
        assert_eq!(request.x, None);
        assert_eq!(request.y, None);
        assert_eq!(request.agg, None);
        assert_eq!(request.sort, None);
    }

    #[test]
    fn build_request_maps_selections() {
        let mut panel = panel();
        panel.kind_idx = 0; // bar
        panel.x_idx = 1;
        panel.y_idx = 2;
        panel.agg_idx = 1; // sum
        panel.sort_idx = 2;
        panel.title_input = "  Sales by region  ".into();
        let request = panel.build_request(&ChartsConfig::default());
        assert_eq!(request.kind, ChartKind::Bar);
        assert_eq!(request.x.as_deref(), Some("region"));
        assert_eq!(request.y.as_deref(), Some("sales"));
        assert_eq!(request.agg, Some(AggFn::Sum));
        assert_eq!(request.sort, Some(SortDir::Desc));
        assert_eq!(request.title.as_deref(), Some("Sales by region"));
        assert_eq!(request.size, (800, 600));
    }

    #[test]
    fn cycle_column_wraps() {
        let panel = panel();
        let mut idx = 0usize;
        ChartPanel::cycle_column(&mut idx, &panel.columns, true);
        assert_eq!(idx, 1);
        ChartPanel::cycle_column(&mut idx, &panel.columns, true);
        ChartPanel::cycle_column(&mut idx, &panel.columns, true);
        assert_eq!(idx, 0);
        ChartPanel::cycle_column(&mut idx, &panel.columns, false);
        assert_eq!(idx, 2);
    }

    #[test]
    fn set_columns_resets_pickers_on_change() {
        let mut panel = panel();
        panel.x_idx = 2;
        panel.set_columns(vec!["other".into()]);
        assert_eq!(panel.x_idx, 0);
    }

    #[test]
    fn focus_cycle_returns_home() {
        let mut focus = ChartFocus::Kind;
        for _ in 0..11 {
            focus = focus.next();
        }
        assert_eq!(focus, ChartFocus::Kind);
    }
}
