use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent};
use polars::prelude::{AnyValue, DataFrame};
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell, List, ListItem, Paragraph, Row, StatefulWidget, Table, Widget,
};
use std::path::PathBuf;
use std::sync::mpsc::Sender;

pub mod chart;
pub mod chart_export;
pub mod chart_panel;
pub mod clean;
pub mod clean_panel;
pub mod config;
pub mod error_display;
pub mod filter;
pub mod filter_panel;
pub mod loader;
pub mod regress;
pub mod regress_panel;
pub mod store;

pub use config::{AppConfig, ConfigManager};
pub use loader::OpenOptions;

use chart_panel::{ChartFocus, ChartPanel};
use clean_panel::{CleanFocus, CleanPage, CleanPanel};
use error_display::user_message_from_report;
use filter_panel::{FilterFocus, FilterPanel};
use regress_panel::{RegressFocus, RegressPanel};
use store::DataStore;

/// Application name used for the config directory and other app paths
pub const APP_NAME: &str = "scour";

pub enum AppEvent {
    Key(KeyEvent),
    Open(PathBuf, OpenOptions),
    Resize(u16, u16),
    Exit,
    Crash(String),
}

/// Which side panel is open. Panels are mutually exclusive; the table stays
/// visible on the left.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    #[default]
    None,
    Filter,
    Clean,
    Regress,
    Chart,
}

pub struct App {
    events: Sender<AppEvent>,
    config: AppConfig,
    store: Option<DataStore>,
    /// Filtered view of the working copy, recomputed in full on each apply.
    filtered: Option<DataFrame>,
    path: Option<PathBuf>,
    pub panel: Panel,
    pub filter_panel: FilterPanel,
    pub clean_panel: CleanPanel,
    pub regress_panel: RegressPanel,
    pub chart_panel: ChartPanel,
    status: String,
    row_offset: usize,
    col_offset: usize,
}

impl App {
    pub fn new(events: Sender<AppEvent>) -> Self {
        Self::with_config(events, AppConfig::default())
    }

    pub fn with_config(events: Sender<AppEvent>, config: AppConfig) -> Self {
        Self {
            events,
            config,
            store: None,
            filtered: None,
            path: None,
            panel: Panel::None,
            filter_panel: FilterPanel::new(),
            clean_panel: CleanPanel::new(),
            regress_panel: RegressPanel::new(),
            chart_panel: ChartPanel::new(),
            status: "Open a CSV or Excel file to begin".to_string(),
            row_offset: 0,
            col_offset: 0,
        }
    }

    pub fn send_event(&mut self, event: AppEvent) -> Result<()> {
        self.events.send(event)?;
        Ok(())
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// The frame currently shown in the table: the filtered view when
    /// filters are active, otherwise the working copy.
    pub fn display_frame(&self) -> Option<DataFrame> {
        if let Some(filtered) = &self.filtered {
            return Some(filtered.clone());
        }
        self.store.as_ref().map(|s| s.working())
    }

    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        match event {
            AppEvent::Key(key) => self.key(key),
            AppEvent::Open(path, options) => {
                self.open(path, options);
                None
            }
            AppEvent::Resize(_, _) => None,
            AppEvent::Exit | AppEvent::Crash(_) => None,
        }
    }

    fn open(&mut self, path: &PathBuf, options: &OpenOptions) {
        match loader::load_dataset(path, options) {
            Ok(df) => {
                let rows = df.height();
                match &mut self.store {
                    Some(store) => store.load(df),
                    None => self.store = Some(DataStore::new(df)),
                }
                self.filtered = None;
                self.path = Some(path.clone());
                self.row_offset = 0;
                self.col_offset = 0;
                self.refresh_panels();
                self.status = format!("Loaded {} rows from {}", rows, path.display());
            }
            Err(report) => {
                // Prior state stays untouched on a failed load.
                self.status = format!("Load failed: {}", user_message_from_report(&report));
            }
        }
    }

    /// Rebuild every panel's view of the data after a load, filter, or
    /// cleaning operation.
    fn refresh_panels(&mut self) {
        let Some(store) = &self.store else { return };
        let working = store.working();
        match filter::build_filters(&working, self.config.filters.max_categories) {
            Ok(filters) => self.filter_panel.set_filters(filters),
            Err(report) => self.status = user_message_from_report(&report),
        }
        self.clean_panel.set_columns(
            working
                .get_column_names()
                .iter()
                .map(|n| n.to_string())
                .collect(),
            clean::missing_summary(&working),
        );
        self.refresh_consumer_panels();
    }

    /// Refresh only the read-only consumers of the current view. Used after
    /// a filter apply, where rebuilding the filter set would discard the
    /// predicates just edited.
    fn refresh_consumer_panels(&mut self) {
        let Some(view) = self.display_frame() else {
            return;
        };
        self.regress_panel
            .set_columns(regress::numeric_columns(&view));
        self.chart_panel.set_columns(
            view.get_column_names()
                .iter()
                .map(|n| n.to_string())
                .collect(),
        );
    }

    fn apply_filters(&mut self) {
        let Some(store) = &self.store else { return };
        let working = store.working();
        match filter::apply_filters(&working, &self.filter_panel.filters) {
            Ok(filtered) => {
                self.status = format!("Filtered data: {} rows", filtered.height());
                self.filtered = if self.filter_panel.active_count() == 0 {
                    None
                } else {
                    Some(filtered)
                };
                self.row_offset = 0;
            }
            Err(report) => self.status = user_message_from_report(&report),
        }
    }

    fn run_clean_op(&mut self, op: Option<clean::CleanOp>) {
        let Some(op) = op else {
            // No column selected or no data: silent no-op.
            return;
        };
        let Some(store) = &mut self.store else { return };
        let working = store.working();
        match clean::apply_op(&working, &op) {
            Ok(next) => {
                self.status = format!(
                    "{} rows x {} columns after cleaning",
                    next.height(),
                    next.width()
                );
                store.set_working(next);
                self.filtered = None;
                self.refresh_panels();
            }
            Err(err) => self.status = err.to_string(),
        }
    }

    fn apply_changes(&mut self) {
        if let Some(store) = &mut self.store {
            store.apply();
            self.status = "Changes applied".to_string();
        }
    }

    fn reset_data(&mut self) {
        if let Some(store) = &mut self.store {
            store.reset();
            self.filtered = None;
            self.refresh_panels();
            self.status = "Working copy reset".to_string();
        }
    }

    fn run_train(&mut self) {
        let Some(view) = self.display_frame() else {
            return;
        };
        let request = self.regress_panel.build_request(&self.config.regression);
        match regress::train(&view, &request) {
            Ok(model) => {
                self.status = format!(
                    "{} fit on {} rows: R2 = {:.4}, RMSE = {:.4}",
                    model.kind.as_str(),
                    model.n_rows,
                    model.r_squared,
                    model.rmse
                );
                self.regress_panel.model = Some(model);
                self.regress_panel.prediction = None;
            }
            Err(err) => self.status = err.to_string(),
        }
    }

    fn run_predict(&mut self) {
        let Some(model) = &self.regress_panel.model else {
            self.status = "Train a model before predicting".to_string();
            return;
        };
        let values = match self.regress_panel.parse_predict_input() {
            Ok(values) => values,
            Err(msg) => {
                self.status = msg;
                return;
            }
        };
        match model.predict(&values) {
            Ok(prediction) => {
                self.status = format!("Predicted {} = {:.4}", model.target, prediction);
                self.regress_panel.prediction = Some(prediction);
            }
            Err(err) => self.status = err.to_string(),
        }
    }

    fn run_chart_save(&mut self) {
        let Some(view) = self.display_frame() else {
            return;
        };
        let request = self.chart_panel.build_request(&self.config.charts);
        let path = PathBuf::from(self.chart_panel.path_input.trim());
        let result = chart::prepare(&view, &request)
            .and_then(|prepared| chart_export::save_chart(&prepared, &request, &path));
        match result {
            Ok(()) => self.status = format!("Chart saved to {}", path.display()),
            Err(report) => self.status = format!("Chart failed: {}", report),
        }
    }

    fn key(&mut self, key: &KeyEvent) -> Option<AppEvent> {
        match self.panel {
            Panel::None => self.key_main(key),
            Panel::Filter => self.key_filter(key),
            Panel::Clean => self.key_clean(key),
            Panel::Regress => self.key_regress(key),
            Panel::Chart => self.key_chart(key),
        }
    }

    fn key_main(&mut self, key: &KeyEvent) -> Option<AppEvent> {
        match key.code {
            KeyCode::Char('q') => return Some(AppEvent::Exit),
            KeyCode::Char('f') => {
                self.panel = Panel::Filter;
                self.filter_panel.active = true;
            }
            KeyCode::Char('c') => {
                self.panel = Panel::Clean;
                self.clean_panel.active = true;
            }
            KeyCode::Char('r') => {
                self.panel = Panel::Regress;
                self.regress_panel.active = true;
            }
            KeyCode::Char('g') => {
                self.panel = Panel::Chart;
                self.chart_panel.active = true;
            }
            KeyCode::Down => self.scroll_rows(1),
            KeyCode::Up => self.scroll_rows(-1),
            KeyCode::PageDown => self.scroll_rows(20),
            KeyCode::PageUp => self.scroll_rows(-20),
            KeyCode::Right => self.scroll_cols(1),
            KeyCode::Left => self.scroll_cols(-1),
            KeyCode::Home => {
                self.row_offset = 0;
                self.col_offset = 0;
            }
            _ => {}
        }
        None
    }

    fn scroll_rows(&mut self, delta: i64) {
        let height = self.display_frame().map(|df| df.height()).unwrap_or(0);
        let max = height.saturating_sub(1);
        let next = self.row_offset as i64 + delta;
        self.row_offset = next.clamp(0, max as i64) as usize;
    }

    fn scroll_cols(&mut self, delta: i64) {
        let width = self.display_frame().map(|df| df.width()).unwrap_or(0);
        let max = width.saturating_sub(1);
        let next = self.col_offset as i64 + delta;
        self.col_offset = next.clamp(0, max as i64) as usize;
    }

    fn close_panel(&mut self) {
        self.panel = Panel::None;
        self.filter_panel.active = false;
        self.clean_panel.active = false;
        self.regress_panel.active = false;
        self.chart_panel.active = false;
    }

    fn key_filter(&mut self, key: &KeyEvent) -> Option<AppEvent> {
        let is_category = matches!(
            self.filter_panel.selected_filter().map(|f| &f.predicate),
            Some(filter::Predicate::Category { .. })
        );
        match key.code {
            KeyCode::Esc => {
                self.filter_panel.commit_inputs();
                self.close_panel();
            }
            KeyCode::Tab => {
                self.filter_panel.focus = match (self.filter_panel.focus, is_category) {
                    (FilterFocus::Columns, false) => FilterFocus::Min,
                    (FilterFocus::Columns, true) => FilterFocus::Choice,
                    (FilterFocus::Min, _) => FilterFocus::Max,
                    (FilterFocus::Max, _) | (FilterFocus::Choice, _) => FilterFocus::Apply,
                    (FilterFocus::Apply, _) => FilterFocus::Clear,
                    (FilterFocus::Clear, _) => FilterFocus::Columns,
                };
            }
            KeyCode::Down if self.filter_panel.focus == FilterFocus::Columns => {
                self.filter_panel.select_next();
            }
            KeyCode::Up if self.filter_panel.focus == FilterFocus::Columns => {
                self.filter_panel.select_prev();
            }
            KeyCode::Right if self.filter_panel.focus == FilterFocus::Choice => {
                self.filter_panel.cycle_choice(true);
            }
            KeyCode::Left if self.filter_panel.focus == FilterFocus::Choice => {
                self.filter_panel.cycle_choice(false);
            }
            KeyCode::Enter => match self.filter_panel.focus {
                FilterFocus::Clear => {
                    self.filter_panel.clear_all();
                    self.apply_filters();
                    self.refresh_consumer_panels();
                }
                _ => {
                    self.filter_panel.commit_inputs();
                    self.apply_filters();
                    self.refresh_consumer_panels();
                }
            },
            KeyCode::Backspace => match self.filter_panel.focus {
                FilterFocus::Min => {
                    self.filter_panel.min_input.pop();
                }
                FilterFocus::Max => {
                    self.filter_panel.max_input.pop();
                }
                _ => {}
            },
            KeyCode::Char(c) => match self.filter_panel.focus {
                FilterFocus::Min => self.filter_panel.min_input.push(c),
                FilterFocus::Max => self.filter_panel.max_input.push(c),
                _ => {}
            },
            _ => {}
        }
        None
    }

    fn key_clean(&mut self, key: &KeyEvent) -> Option<AppEvent> {
        match key.code {
            KeyCode::Esc => self.close_panel(),
            KeyCode::Tab => {
                self.clean_panel.focus = match self.clean_panel.focus {
                    CleanFocus::Pages => CleanFocus::Column,
                    CleanFocus::Column => CleanFocus::Method,
                    CleanFocus::Method => CleanFocus::Value,
                    CleanFocus::Value => CleanFocus::Action,
                    CleanFocus::Action => CleanFocus::Pages,
                };
            }
            KeyCode::Down | KeyCode::Up => {
                let forward = key.code == KeyCode::Down;
                match self.clean_panel.focus {
                    CleanFocus::Pages => {
                        let idx = CleanPage::ALL
                            .iter()
                            .position(|p| *p == self.clean_panel.page)
                            .unwrap_or(0);
                        let n = CleanPage::ALL.len();
                        let next = if forward {
                            (idx + 1) % n
                        } else {
                            idx.checked_sub(1).unwrap_or(n - 1)
                        };
                        self.clean_panel.select_page(next);
                    }
                    CleanFocus::Column => {
                        let n = self.clean_panel.columns.len();
                        if n > 0 {
                            let idx = self.clean_panel.column_idx;
                            self.clean_panel.column_idx = if forward {
                                (idx + 1) % n
                            } else {
                                idx.checked_sub(1).unwrap_or(n - 1)
                            };
                            self.clean_panel
                                .column_state
                                .select(Some(self.clean_panel.column_idx));
                        }
                    }
                    CleanFocus::Method => match self.clean_panel.page {
                        CleanPage::MissingValues => {
                            let n = CleanPanel::fill_method_labels().len();
                            let idx = self.clean_panel.method_idx;
                            self.clean_panel.method_idx = if forward {
                                (idx + 1) % n
                            } else {
                                idx.checked_sub(1).unwrap_or(n - 1)
                            };
                        }
                        CleanPage::Duplicates => {
                            self.clean_panel.keep_idx = (self.clean_panel.keep_idx + 1) % 3;
                        }
                        CleanPage::ChangeType => {
                            let n = clean::TargetType::ALL.len();
                            let idx = self.clean_panel.target_idx;
                            self.clean_panel.target_idx = if forward {
                                (idx + 1) % n
                            } else {
                                idx.checked_sub(1).unwrap_or(n - 1)
                            };
                        }
                        CleanPage::CleanText => {}
                    },
                    _ => {}
                }
            }
            // Text editing wins over action hotkeys while the value field
            // has focus.
            KeyCode::Backspace if self.clean_panel.focus == CleanFocus::Value => {
                match self.clean_panel.page {
                    CleanPage::MissingValues if self.clean_panel.method_idx == 3 => {
                        self.clean_panel.constant_input.pop();
                    }
                    _ => {
                        self.clean_panel.threshold_input.pop();
                    }
                }
            }
            KeyCode::Char(c) if self.clean_panel.focus == CleanFocus::Value => {
                match self.clean_panel.page {
                    CleanPage::MissingValues if self.clean_panel.method_idx == 3 => {
                        self.clean_panel.constant_input.push(c);
                    }
                    _ => self.clean_panel.threshold_input.push(c),
                }
            }
            KeyCode::Char(' ') if self.clean_panel.page == CleanPage::Duplicates => {
                self.clean_panel.toggle_subset();
            }
            KeyCode::Char('t') if self.clean_panel.page == CleanPage::CleanText => {
                self.clean_panel.trim = !self.clean_panel.trim;
            }
            KeyCode::Char('l') if self.clean_panel.page == CleanPage::CleanText => {
                self.clean_panel.lowercase = !self.clean_panel.lowercase;
            }
            KeyCode::Char('s') if self.clean_panel.page == CleanPage::CleanText => {
                self.clean_panel.strip_special = !self.clean_panel.strip_special;
            }
            KeyCode::Char('x') if self.clean_panel.page == CleanPage::MissingValues => {
                self.run_clean_op(Some(clean::CleanOp::DropMissingRows));
            }
            KeyCode::Char('X') if self.clean_panel.page == CleanPage::MissingValues => {
                self.run_clean_op(Some(clean::CleanOp::DropAllMissingRows));
            }
            KeyCode::Char('o') if self.clean_panel.page == CleanPage::MissingValues => {
                let op = self.clean_panel.build_threshold_op();
                self.run_clean_op(op);
            }
            KeyCode::Char('e') if self.clean_panel.page == CleanPage::ChangeType => {
                self.encode_selected_column();
            }
            KeyCode::Char('a') => self.apply_changes(),
            KeyCode::Char('z') => self.reset_data(),
            KeyCode::Enter => {
                let op = match self.clean_panel.page {
                    CleanPage::MissingValues => self.clean_panel.build_fill_op(),
                    CleanPage::Duplicates => Some(self.clean_panel.build_dedup_op()),
                    CleanPage::ChangeType => self.clean_panel.build_cast_op(),
                    CleanPage::CleanText => self.clean_panel.build_text_op(),
                };
                self.run_clean_op(op);
            }
            _ => {}
        }
        None
    }

    fn encode_selected_column(&mut self) {
        let Some(column) = self.clean_panel.selected_column().cloned() else {
            return;
        };
        let Some(store) = &mut self.store else { return };
        let working = store.working();
        match clean::encode_categories(&working, &column) {
            Ok(next) => {
                store.set_working(next);
                self.filtered = None;
                self.refresh_panels();
                self.status = format!("Added {}_code", column);
            }
            Err(err) => self.status = err.to_string(),
        }
    }

    fn key_regress(&mut self, key: &KeyEvent) -> Option<AppEvent> {
        match key.code {
            KeyCode::Esc => self.close_panel(),
            KeyCode::Tab => {
                self.regress_panel.focus = match self.regress_panel.focus {
                    RegressFocus::Features => RegressFocus::Target,
                    RegressFocus::Target => RegressFocus::Kind,
                    RegressFocus::Kind => RegressFocus::Strength,
                    RegressFocus::Strength => RegressFocus::Train,
                    RegressFocus::Train => RegressFocus::Predict,
                    RegressFocus::Predict => RegressFocus::Features,
                };
            }
            KeyCode::Down if self.regress_panel.focus == RegressFocus::Features => {
                self.regress_panel.move_cursor(true);
            }
            KeyCode::Up if self.regress_panel.focus == RegressFocus::Features => {
                self.regress_panel.move_cursor(false);
            }
            KeyCode::Char(' ') if self.regress_panel.focus == RegressFocus::Features => {
                self.regress_panel.toggle_feature();
            }
            KeyCode::Right if self.regress_panel.focus == RegressFocus::Target => {
                self.regress_panel.cycle_target(true);
            }
            KeyCode::Left if self.regress_panel.focus == RegressFocus::Target => {
                self.regress_panel.cycle_target(false);
            }
            KeyCode::Right | KeyCode::Left
                if self.regress_panel.focus == RegressFocus::Kind =>
            {
                self.regress_panel.cycle_kind();
            }
            KeyCode::Backspace => match self.regress_panel.focus {
                RegressFocus::Strength => {
                    self.regress_panel.strength_input.pop();
                }
                RegressFocus::Predict => {
                    self.regress_panel.predict_input.pop();
                }
                _ => {}
            },
            KeyCode::Char(c) => match self.regress_panel.focus {
                RegressFocus::Strength => self.regress_panel.strength_input.push(c),
                RegressFocus::Predict => self.regress_panel.predict_input.push(c),
                _ => {}
            },
            KeyCode::Enter => match self.regress_panel.focus {
                RegressFocus::Predict => self.run_predict(),
                _ => self.run_train(),
            },
            _ => {}
        }
        None
    }

    fn key_chart(&mut self, key: &KeyEvent) -> Option<AppEvent> {
        match key.code {
            KeyCode::Esc => self.close_panel(),
            KeyCode::Tab => self.chart_panel.focus = self.chart_panel.focus.next(),
            KeyCode::Right | KeyCode::Left => {
                let forward = key.code == KeyCode::Right;
                let columns = self.chart_panel.columns.clone();
                match self.chart_panel.focus {
                    ChartFocus::Kind => self.chart_panel.cycle_kind(forward),
                    ChartFocus::X => {
                        ChartPanel::cycle_column(&mut self.chart_panel.x_idx, &columns, forward)
                    }
                    ChartFocus::Y => {
                        ChartPanel::cycle_column(&mut self.chart_panel.y_idx, &columns, forward)
                    }
                    ChartFocus::Hue => {
                        ChartPanel::cycle_column(&mut self.chart_panel.hue_idx, &columns, forward)
                    }
                    ChartFocus::FacetRow => ChartPanel::cycle_column(
                        &mut self.chart_panel.facet_row_idx,
                        &columns,
                        forward,
                    ),
                    ChartFocus::FacetCol => ChartPanel::cycle_column(
                        &mut self.chart_panel.facet_col_idx,
                        &columns,
                        forward,
                    ),
                    ChartFocus::Agg => self.chart_panel.cycle_agg(forward),
                    ChartFocus::Sort => self.chart_panel.cycle_sort(),
                    _ => {}
                }
            }
            KeyCode::Backspace => match self.chart_panel.focus {
                ChartFocus::Title => {
                    self.chart_panel.title_input.pop();
                }
                ChartFocus::Path => {
                    self.chart_panel.path_input.pop();
                }
                _ => {}
            },
            KeyCode::Char(c) => match self.chart_panel.focus {
                ChartFocus::Title => self.chart_panel.title_input.push(c),
                ChartFocus::Path => self.chart_panel.path_input.push(c),
                _ => {}
            },
            KeyCode::Enter => self.run_chart_save(),
            _ => {}
        }
        None
    }
}

/// Format one cell for the table, using the configured float precision.
fn format_cell(value: &AnyValue, precision: usize) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::Float64(v) => format!("{:.*}", precision, v),
        AnyValue::Float32(v) => format!("{:.*}", precision, v),
        other => other.str_value().to_string(),
    }
}

impl App {
    fn render_table(&mut self, area: Rect, buf: &mut Buffer) {
        let Some(df) = self.display_frame() else {
            Paragraph::new("No imported data set")
                .block(Block::default().borders(Borders::ALL).title(APP_NAME))
                .render(area, buf);
            return;
        };

        let precision = self.config.display.float_precision;
        let visible_rows = (area.height.saturating_sub(4)) as usize;
        let col_width: u16 = 14;
        let visible_cols = (area.width / (col_width + 1)).max(1) as usize;

        let columns = df.get_columns();
        let shown: Vec<_> = columns
            .iter()
            .skip(self.col_offset)
            .take(visible_cols)
            .collect();

        let header = Row::new(
            shown
                .iter()
                .map(|c| Cell::from(c.name().to_string()))
                .collect::<Vec<_>>(),
        )
        .style(Style::default().add_modifier(Modifier::BOLD));

        let end = (self.row_offset + visible_rows).min(df.height());
        let mut rows = Vec::with_capacity(end.saturating_sub(self.row_offset));
        for i in self.row_offset..end {
            let cells: Vec<Cell> = shown
                .iter()
                .map(|c| {
                    let text = c
                        .get(i)
                        .map(|v| format_cell(&v, precision))
                        .unwrap_or_default();
                    Cell::from(text)
                })
                .collect();
            rows.push(Row::new(cells));
        }

        let widths = vec![Constraint::Length(col_width); shown.len()];
        let title = match &self.path {
            Some(path) => format!(
                "{} [{} rows x {} cols]",
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                df.height(),
                df.width()
            ),
            None => APP_NAME.to_string(),
        };
        Widget::render(
            Table::new(rows, widths)
                .header(header)
                .block(Block::default().borders(Borders::ALL).title(title)),
            area,
            buf,
        );
    }

    fn panel_lines(&self) -> Vec<Line<'static>> {
        fn field(focused: bool, label: &str, value: String) -> Line<'static> {
            let marker = if focused { "> " } else { "  " };
            Line::from(vec![
                Span::styled(
                    format!("{}{}: ", marker, label),
                    if focused {
                        Style::default().add_modifier(Modifier::BOLD)
                    } else {
                        Style::default()
                    },
                ),
                Span::raw(value),
            ])
        }

        match self.panel {
            Panel::Filter => {
                let p = &self.filter_panel;
                let mut lines = vec![Line::from(Span::styled(
                    "Filters",
                    Style::default().add_modifier(Modifier::BOLD),
                ))];
                let name = p
                    .selected_filter()
                    .map(|f| f.column.clone())
                    .unwrap_or_default();
                lines.push(field(p.focus == FilterFocus::Columns, "Column", name));
                match p.selected_filter().map(|f| &f.predicate) {
                    Some(filter::Predicate::Range { .. }) => {
                        let seed = p
                            .selected_filter()
                            .map(|f| {
                                format!(
                                    "data range {} .. {}",
                                    f.data_min.map(|v| v.to_string()).unwrap_or_default(),
                                    f.data_max.map(|v| v.to_string()).unwrap_or_default()
                                )
                            })
                            .unwrap_or_default();
                        lines.push(Line::from(Span::raw(format!("  {}", seed))));
                        lines.push(field(p.focus == FilterFocus::Min, "Min", p.min_input.clone()));
                        lines.push(field(p.focus == FilterFocus::Max, "Max", p.max_input.clone()));
                    }
                    Some(filter::Predicate::Category { .. }) => {
                        let label = if p.choice_idx == 0 {
                            "(All)".to_string()
                        } else {
                            p.selected_filter()
                                .and_then(|f| f.choices.get(p.choice_idx - 1).cloned())
                                .unwrap_or_default()
                        };
                        lines.push(field(p.focus == FilterFocus::Choice, "Value", label));
                    }
                    None => {}
                }
                lines.push(field(
                    p.focus == FilterFocus::Apply,
                    "Apply",
                    format!("{} active", p.active_count()),
                ));
                lines.push(field(p.focus == FilterFocus::Clear, "Clear", String::new()));
                lines.push(Line::from(Span::raw(
                    "Tab: next field  Enter: apply  Esc: close",
                )));
                lines
            }
            Panel::Clean => {
                let p = &self.clean_panel;
                let mut lines = vec![Line::from(Span::styled(
                    p.page.as_str().to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ))];
                if p.summary.total_cells > 0 {
                    lines.push(Line::from(Span::raw(format!(
                        "  Missing: {}/{} cells",
                        p.summary.total_missing, p.summary.total_cells
                    ))));
                    for (name, count, fraction) in p.summary.per_column.iter().take(6) {
                        lines.push(Line::from(Span::raw(format!(
                            "  - {}: {} ({:.1}%)",
                            name,
                            count,
                            fraction * 100.0
                        ))));
                    }
                }
                let column = p.selected_column().cloned().unwrap_or_default();
                lines.push(field(p.focus == CleanFocus::Column, "Column", column));
                match p.page {
                    CleanPage::MissingValues => {
                        lines.push(field(
                            p.focus == CleanFocus::Method,
                            "Method",
                            CleanPanel::fill_method_labels()[p.method_idx].to_string(),
                        ));
                        lines.push(field(
                            p.focus == CleanFocus::Value,
                            "Constant / threshold %",
                            format!("{} / {}", p.constant_input, p.threshold_input),
                        ));
                        lines.push(Line::from(Span::raw(
                            "Enter: fill  x: drop missing rows  o: drop columns",
                        )));
                    }
                    CleanPage::Duplicates => {
                        lines.push(field(
                            p.focus == CleanFocus::Method,
                            "Keep",
                            p.keep_policy().as_str().to_string(),
                        ));
                        lines.push(Line::from(Span::raw(format!(
                            "  Subset: {:?}",
                            p.subset_columns()
                        ))));
                        lines.push(Line::from(Span::raw("Space: toggle column  Enter: dedup")));
                    }
                    CleanPage::ChangeType => {
                        lines.push(field(
                            p.focus == CleanFocus::Method,
                            "Convert to",
                            p.target_type().as_str().to_string(),
                        ));
                        lines.push(Line::from(Span::raw("Enter: convert  e: encode as codes")));
                    }
                    CleanPage::CleanText => {
                        lines.push(Line::from(Span::raw(format!(
                            "  [{}] trim  [{}] lowercase  [{}] strip special",
                            if p.trim { "x" } else { " " },
                            if p.lowercase { "x" } else { " " },
                            if p.strip_special { "x" } else { " " },
                        ))));
                        lines.push(Line::from(Span::raw("t/l/s: toggle  Enter: clean")));
                    }
                }
                lines.push(Line::from(Span::raw(
                    "a: apply changes  z: reset  Esc: close",
                )));
                lines
            }
            Panel::Regress => {
                let p = &self.regress_panel;
                let mut lines = vec![Line::from(Span::styled(
                    "Regression",
                    Style::default().add_modifier(Modifier::BOLD),
                ))];
                for (i, name) in p.columns.iter().enumerate() {
                    let checked = p.selected.get(i).copied().unwrap_or(false);
                    let cursor = p.focus == RegressFocus::Features && i == p.cursor;
                    lines.push(Line::from(Span::raw(format!(
                        "{}[{}] {}",
                        if cursor { "> " } else { "  " },
                        if checked { "x" } else { " " },
                        name
                    ))));
                }
                lines.push(field(
                    p.focus == RegressFocus::Target,
                    "Target",
                    p.target().unwrap_or_default(),
                ));
                lines.push(field(
                    p.focus == RegressFocus::Kind,
                    "Model",
                    p.kind().as_str().to_string(),
                ));
                lines.push(field(
                    p.focus == RegressFocus::Strength,
                    "Strength",
                    p.strength_input.clone(),
                ));
                if let Some(model) = &p.model {
                    lines.push(Line::from(Span::raw(format!(
                        "  R2 = {:.4}  RMSE = {:.4}",
                        model.r_squared, model.rmse
                    ))));
                    for (name, beta) in model.features.iter().zip(&model.coefficients) {
                        lines.push(Line::from(Span::raw(format!("  {} = {:.4}", name, beta))));
                    }
                    lines.push(Line::from(Span::raw(format!(
                        "  intercept = {:.4}",
                        model.intercept
                    ))));
                }
                lines.push(field(p.focus == RegressFocus::Train, "Train", String::new()));
                lines.push(field(
                    p.focus == RegressFocus::Predict,
                    "Predict",
                    p.predict_input.clone(),
                ));
                if let Some(prediction) = p.prediction {
                    lines.push(Line::from(Span::raw(format!(
                        "  prediction = {:.4}",
                        prediction
                    ))));
                }
                lines.push(Line::from(Span::raw(
                    "Space: toggle feature  Enter: train/predict  Esc: close",
                )));
                lines
            }
            Panel::Chart => {
                let p = &self.chart_panel;
                let pick = |idx: usize| -> String {
                    if idx == 0 {
                        "(none)".to_string()
                    } else {
                        p.columns.get(idx - 1).cloned().unwrap_or_default()
                    }
                };
                let mut lines = vec![Line::from(Span::styled(
                    "Chart",
                    Style::default().add_modifier(Modifier::BOLD),
                ))];
                lines.push(field(
                    p.focus == ChartFocus::Kind,
                    "Kind",
                    p.kind().as_str().to_string(),
                ));
                lines.push(field(p.focus == ChartFocus::X, "X", pick(p.x_idx)));
                lines.push(field(p.focus == ChartFocus::Y, "Y", pick(p.y_idx)));
                lines.push(field(p.focus == ChartFocus::Hue, "Hue", pick(p.hue_idx)));
                lines.push(field(
                    p.focus == ChartFocus::FacetRow,
                    "Facet row",
                    pick(p.facet_row_idx),
                ));
                lines.push(field(
                    p.focus == ChartFocus::FacetCol,
                    "Facet col",
                    pick(p.facet_col_idx),
                ));
                lines.push(field(
                    p.focus == ChartFocus::Agg,
                    "Aggregate",
                    p.agg()
                        .map(|a| a.as_str().to_string())
                        .unwrap_or_else(|| "(none)".to_string()),
                ));
                lines.push(field(
                    p.focus == ChartFocus::Sort,
                    "Sort",
                    match p.sort() {
                        Some(chart::SortDir::Asc) => "ascending".to_string(),
                        Some(chart::SortDir::Desc) => "descending".to_string(),
                        None => "(none)".to_string(),
                    },
                ));
                lines.push(field(
                    p.focus == ChartFocus::Title,
                    "Title",
                    p.title_input.clone(),
                ));
                lines.push(field(
                    p.focus == ChartFocus::Path,
                    "Save to",
                    p.path_input.clone(),
                ));
                lines.push(field(p.focus == ChartFocus::Save, "Save", String::new()));
                lines.push(Line::from(Span::raw(
                    "Tab: next field  Left/Right: change  Enter: save  Esc: close",
                )));
                lines
            }
            Panel::None => Vec::new(),
        }
    }

    fn render_panel(&mut self, area: Rect, buf: &mut Buffer) {
        if self.panel == Panel::Filter {
            // The column list renders as a stateful list above the fields.
            let items: Vec<ListItem> = self
                .filter_panel
                .filters
                .iter()
                .map(|f| {
                    let marker = if f.predicate.is_unconstrained() {
                        ' '
                    } else {
                        '*'
                    };
                    ListItem::new(format!("{}{}", marker, f.column))
                })
                .collect();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                .split(area);
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("Columns"))
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
            StatefulWidget::render(list, chunks[0], buf, &mut self.filter_panel.list_state);
            Paragraph::new(self.panel_lines())
                .block(Block::default().borders(Borders::ALL))
                .render(chunks[1], buf);
            return;
        }
        Paragraph::new(self.panel_lines())
            .block(Block::default().borders(Borders::ALL))
            .render(area, buf);
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Fill(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(area);

        let main_area = layout[0];
        let (data_area, panel_area) = if self.panel != Panel::None {
            let chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Min(0), Constraint::Length(46)])
                .split(main_area);
            (chunks[0], Some(chunks[1]))
        } else {
            (main_area, None)
        };

        self.render_table(data_area, buf);
        if let Some(panel_area) = panel_area {
            self.render_panel(panel_area, buf);
        }

        Paragraph::new(self.status.clone())
            .style(Style::default().fg(Color::Yellow))
            .render(layout[1], buf);
        Paragraph::new("q: quit  f: filter  c: clean  r: regression  g: chart")
            .style(Style::default().add_modifier(Modifier::DIM))
            .render(layout[2], buf);
    }
}
