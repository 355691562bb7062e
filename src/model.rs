use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::collections::HashMap;
use tracing::{debug, error, info, trace};

use crate::columns::{self, ColumnDescriptor, ColumnKind};
use crate::domain::{CMDMode, HELP_TEXT, Message, RVConfig, RVError};
use crate::filter;
use crate::group::DisplayRow;
use crate::inputter::{InputResult, Inputter};
use crate::loader::FileInfo;
use crate::pipeline::{self, PipelineOutput};
use crate::record::Record;
use crate::search::{SearchIndex, SearchOptions};
use crate::ui::{CMDLINE_HEIGH, COLUMN_WIDTH_MARGIN, GROUP_INDENT, TABLE_HEADER_HEIGHT};
use crate::view_state::{Draft, DraftEdit, Panel, ViewStateController};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    PANEL,
    POPUP,
    CMDINPUT,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineKind {
    Group,
    Record,
}

#[derive(Debug, Clone)]
pub struct UILine {
    pub kind: LineKind,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct PanelView {
    pub title: String,
    pub items: Vec<String>,
    pub selected: usize,
    pub hint: String,
}

pub struct UIData {
    pub name: String,
    pub header: String,
    pub lines: Vec<UILine>, // Only the lines inside the table window
    pub nlines: usize,      // Total number of lines (records and group headers)
    pub selected_row: usize,
    pub abs_selected_row: usize,
    pub show_popup: bool,
    pub popup_message: String,
    pub panel: Option<PanelView>,
    pub cmdinput: InputResult,
    pub cmd_prompt: String,
    pub active_cmdinput: bool,
    pub status_message: String,
    pub summary: String,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            header: String::new(),
            lines: Vec::new(),
            nlines: 0,
            selected_row: 0,
            abs_selected_row: 0,
            show_popup: false,
            popup_message: String::new(),
            panel: None,
            cmdinput: InputResult::default(),
            cmd_prompt: String::new(),
            active_cmdinput: false,
            status_message: String::new(),
            summary: String::new(),
        }
    }
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_height: ui_height.saturating_sub(CMDLINE_HEIGH + TABLE_HEADER_HEIGHT),
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    file_info: Option<FileInfo>,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    records: Vec<Record>,
    index: SearchIndex,
    view: ViewStateController,
    output: PipelineOutput,
    lines: Vec<DisplayRow>,
    column_widths: HashMap<&'static str, usize>,
    selected_line: usize,
    offset_row: usize,
    panel_curser: usize,
    filter_column: Option<ColumnDescriptor>,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
}

impl Model {
    pub fn init(
        config: &RVConfig,
        file_info: Option<FileInfo>,
        records: Vec<Record>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let options = SearchOptions {
            threshold: config.search_threshold,
            distance: config.search_distance,
            ..SearchOptions::default()
        };
        let index = SearchIndex::new(&records, options);
        let view = ViewStateController::new(columns::default_columns());
        let output = pipeline::compute(&records, &index, &view);
        let column_widths =
            Self::calculate_column_widths(&records, view.columns(), config.max_column_width);

        let mut model = Self {
            file_info,
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            records,
            index,
            view,
            output,
            lines: Vec::new(),
            column_widths,
            selected_line: 0,
            offset_row: 0,
            panel_curser: 0,
            filter_column: None,
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
        };
        model.recompute();
        model.set_status_message(format!("Loaded {} records", model.records.len()));
        model
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn calculate_column_widths(
        records: &[Record],
        columns: &[ColumnDescriptor],
        max_column_width: usize,
    ) -> HashMap<&'static str, usize> {
        columns
            .iter()
            .map(|c| {
                let max_width = records
                    .iter()
                    .filter_map(|r| r.display(c.id))
                    .map(|s| s.chars().count())
                    .max()
                    .unwrap_or(0);
                let width =
                    std::cmp::max(c.header.chars().count(), max_width) + COLUMN_WIDTH_MARGIN;
                (c.id, std::cmp::min(width, max_column_width))
            })
            .collect()
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        // One character stays free as column spacer.
        let visible = width.saturating_sub(1);
        if name.chars().count() <= visible {
            return format!("{name:<width$}");
        }
        if visible < 3 {
            return " ".repeat(width);
        }
        let reduced: String = name.chars().take(visible - 3).collect();
        format!("{reduced}... ")
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.uidata.status_message = message.into();
    }

    // Reruns search, filters and grouping on the committed view state.
    fn recompute(&mut self) {
        self.output = pipeline::compute(&self.records, &self.index, &self.view);
        self.lines = self.output.root.flatten();
        if self.selected_line >= self.lines.len() {
            self.selected_line = self.lines.len().saturating_sub(1);
        }
        debug!(
            "Recomputed view: {} records, {} lines",
            self.output.matched,
            self.lines.len()
        );
        self.update_table_data();
    }

    fn update_table_data(&mut self) {
        let height = self.uilayout.table_height.max(1);
        if self.selected_line < self.offset_row {
            self.offset_row = self.selected_line;
        } else if self.selected_line >= self.offset_row + height {
            self.offset_row = self.selected_line + 1 - height;
        }
        let rbegin = self.offset_row.min(self.lines.len());
        let rend = std::cmp::min(rbegin + height, self.lines.len());

        let indent = GROUP_INDENT.repeat(self.grouping_depth());
        let header = self
            .output
            .visible_columns
            .iter()
            .map(|c| Self::get_visible_name(c.header, self.column_width(c.id)))
            .collect::<String>();

        let lines: Vec<UILine> = self.lines[rbegin..rend]
            .iter()
            .map(|line| self.render_line(line))
            .collect();

        self.uidata.name = self
            .file_info
            .as_ref()
            .and_then(|f| f.path.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string();
        self.uidata.header = format!("{indent}{header}");
        self.uidata.lines = lines;
        self.uidata.nlines = self.lines.len();
        self.uidata.selected_row = self.selected_line - rbegin.min(self.selected_line);
        self.uidata.abs_selected_row = self.selected_line;
        self.uidata.summary = self.summary();
        self.uidata.panel = self.build_panel_view();
    }

    fn grouping_depth(&self) -> usize {
        match self.lines.iter().find(|l| matches!(l, DisplayRow::Record { .. })) {
            Some(DisplayRow::Record { depth, .. }) => *depth,
            _ => self.output.grouping.len(),
        }
    }

    fn column_width(&self, id: &str) -> usize {
        self.column_widths.get(id).copied().unwrap_or(COLUMN_WIDTH_MARGIN)
    }

    fn render_line(&self, line: &DisplayRow) -> UILine {
        match line {
            DisplayRow::Header {
                depth,
                column,
                key,
                count,
            } => {
                let header = columns::find(self.view.columns(), column)
                    .map(|c| c.header)
                    .unwrap_or(column.as_str());
                UILine {
                    kind: LineKind::Group,
                    text: format!("{}▾ {header}: {key} ({count})", GROUP_INDENT.repeat(*depth)),
                }
            }
            DisplayRow::Record { depth, index } => {
                let record = &self.records[*index];
                let cells = self
                    .output
                    .visible_columns
                    .iter()
                    .map(|c| {
                        let value = record.display(c.id).unwrap_or_default();
                        Self::get_visible_name(&value, self.column_width(c.id))
                    })
                    .collect::<String>();
                UILine {
                    kind: LineKind::Record,
                    text: format!("{}{cells}", GROUP_INDENT.repeat(*depth)),
                }
            }
        }
    }

    fn summary(&self) -> String {
        let mut parts = vec![format!("{}/{} records", self.output.matched, self.records.len())];
        let state = self.view.state();
        if !state.search_text.is_empty() {
            parts.push(format!("search: \"{}\"", state.search_text));
        }
        if !self.output.filters.is_empty() {
            let columns: Vec<&str> = self.output.filters.keys().map(String::as_str).collect();
            parts.push(format!("filtered: {}", columns.join(", ")));
        }
        if !self.output.grouping.is_empty() {
            let headers: Vec<&str> = self
                .output
                .grouping
                .iter()
                .filter_map(|id| columns::find(self.view.columns(), id).map(|c| c.header))
                .collect();
            parts.push(format!("grouped by: {}", headers.join(" > ")));
        }
        let hidden = self.view.columns().len() - self.output.visible_columns.len();
        if hidden > 0 {
            parts.push(format!("{hidden} hidden"));
        }
        parts.join(" | ")
    }

    // -------------------- Panels ---------------------- //

    fn panel_columns(&self, panel: Panel) -> Vec<&ColumnDescriptor> {
        self.view
            .columns()
            .iter()
            .filter(|c| panel != Panel::Grouping || c.kind == ColumnKind::Categorical)
            .collect()
    }

    fn build_panel_view(&self) -> Option<PanelView> {
        let draft = self.view.draft()?;
        let panel = draft.panel();
        let items = self
            .panel_columns(panel)
            .into_iter()
            .map(|c| match draft {
                Draft::Visibility(visibility) => {
                    let visible = visibility.get(c.id).copied().unwrap_or(true);
                    let mark = if visible { "x" } else { " " };
                    format!("[{mark}] {}", c.header)
                }
                Draft::Grouping(grouping) => match grouping.iter().position(|id| id == c.id) {
                    Some(pos) => format!("[{}] {}", pos + 1, c.header),
                    None => format!("[ ] {}", c.header),
                },
                Draft::Filters(filters) => {
                    let current = filters.get(c.id).map(filter::describe).unwrap_or_default();
                    format!("{:<12} {:<24} {}", c.header, current, self.filter_hint(c))
                }
            })
            .collect();
        let (title, hint) = match panel {
            Panel::Visibility => (
                " View/Hide Columns ",
                " <Space> toggle  <a> show all  <Enter> apply  <Esc> cancel ",
            ),
            Panel::Filters => (
                " Filters ",
                " <Space> edit  <x> clear all  <Enter> apply  <Esc> cancel ",
            ),
            Panel::Grouping => (
                " Group By ",
                " <Space> toggle  <Enter> apply  <Esc> cancel ",
            ),
        };
        Some(PanelView {
            title: title.to_string(),
            items,
            selected: self.panel_curser,
            hint: hint.to_string(),
        })
    }

    // What the rows left by the search hold for a column, so a filter starts on real data.
    fn filter_hint(&self, column: &ColumnDescriptor) -> String {
        let rows = &self.output.searched;
        match column.kind {
            ColumnKind::Text => "text".to_string(),
            ColumnKind::Categorical => {
                let values = filter::distinct_values(&self.records, rows, column.id);
                let mut shown = values.iter().take(4).cloned().collect::<Vec<_>>().join(", ");
                if values.len() > 4 {
                    shown.push_str(", …");
                }
                format!("one of: {shown}")
            }
            ColumnKind::NumericRange => filter::numeric_bounds(&self.records, rows, column.id)
                .map(|(lo, hi)| format!("range {lo}..{hi}"))
                .unwrap_or_default(),
            ColumnKind::DateRange => filter::timestamp_bounds(&self.records, rows, column.id)
                .map(|(lo, hi)| {
                    format!("range {}..{}", lo.format("%Y-%m-%d"), hi.format("%Y-%m-%d"))
                })
                .unwrap_or_default(),
        }
    }

    fn open_panel(&mut self, panel: Panel) {
        self.view.open(panel);
        if self.view.open_panel().is_some() {
            self.previous_modus = self.modus;
            self.modus = Modus::PANEL;
            self.panel_curser = 0;
        } else {
            self.modus = Modus::TABLE;
        }
        self.update_table_data();
    }

    fn selected_panel_column(&self) -> Option<(Panel, ColumnDescriptor)> {
        let panel = self.view.open_panel()?;
        let column = self.panel_columns(panel).get(self.panel_curser).map(|c| (*c).clone())?;
        Some((panel, column))
    }

    fn toggle_panel_item(&mut self) {
        let Some((panel, column)) = self.selected_panel_column() else {
            return;
        };
        match panel {
            Panel::Visibility => {
                self.view.edit_draft(DraftEdit::ToggleColumn(column.id.to_string()));
            }
            Panel::Grouping => {
                self.view.edit_draft(DraftEdit::ToggleGroupColumn(column.id.to_string()));
            }
            Panel::Filters => {
                let current = match self.view.draft() {
                    Some(Draft::Filters(filters)) => {
                        filters.get(column.id).map(filter::describe).unwrap_or_default()
                    }
                    _ => String::new(),
                };
                self.filter_column = Some(column);
                self.enter_cmd_mode(CMDMode::Filter, &current);
                return;
            }
        }
        self.update_table_data();
    }

    fn panel_edit(&mut self, edit: DraftEdit) {
        if self.view.edit_draft(edit) {
            self.update_table_data();
        }
    }

    fn move_panel_selection(&mut self, step: isize) {
        let Some(panel) = self.view.open_panel() else {
            return;
        };
        let count = self.panel_columns(panel).len();
        if count == 0 {
            return;
        }
        self.panel_curser = (self.panel_curser as isize + step).rem_euclid(count as isize) as usize;
        self.update_table_data();
    }

    fn apply_panel(&mut self) {
        let panel = self.view.open_panel();
        let changed = self.view.apply();
        if changed {
            self.recompute();
        }
        match panel {
            Some(panel) if changed => self.set_status_message(format!("Applied {panel:?} changes")),
            _ => self.set_status_message("Nothing changed"),
        }
        self.modus = Modus::TABLE;
        self.previous_modus = Modus::PANEL;
        self.update_table_data();
    }

    fn cancel_panel(&mut self) {
        self.view.cancel();
        self.modus = Modus::TABLE;
        self.previous_modus = Modus::PANEL;
        self.update_table_data();
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.update_table_data();
    }

    pub fn update(&mut self, message: Option<Message>) {
        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_table_selection_down(1),
                    Message::MoveUp => self.move_table_selection_up(1),
                    Message::MovePageUp => {
                        self.move_table_selection_up(self.uilayout.table_height.max(1))
                    }
                    Message::MovePageDown => {
                        self.move_table_selection_down(self.uilayout.table_height.max(1))
                    }
                    Message::MoveBeginning => self.move_table_selection_beginning(),
                    Message::MoveEnd => self.move_table_selection_end(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::CopyRow => self.copy_table_row(),
                    Message::Help => self.show_help(),
                    Message::Search => {
                        let current = self.view.state().search_text.clone();
                        self.enter_cmd_mode(CMDMode::Search, &current);
                    }
                    Message::ShowColumns => self.open_panel(Panel::Visibility),
                    Message::ShowFilters => self.open_panel(Panel::Filters),
                    Message::ShowGrouping => self.open_panel(Panel::Grouping),
                    _ => (),
                },
                Modus::PANEL => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_panel_selection(1),
                    Message::MoveUp => self.move_panel_selection(-1),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Toggle => self.toggle_panel_item(),
                    Message::ShowAll => self.panel_edit(DraftEdit::ShowAllColumns),
                    Message::ClearFilters => self.panel_edit(DraftEdit::ClearAllFilters),
                    Message::ShowColumns => self.open_panel(Panel::Visibility),
                    Message::ShowFilters => self.open_panel(Panel::Filters),
                    Message::ShowGrouping => self.open_panel(Panel::Grouping),
                    Message::Help => self.show_help(),
                    Message::Enter => self.apply_panel(),
                    Message::Exit => self.cancel_panel(),
                    _ => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::Enter | Message::Help => self.close_popup(),
                    _ => (),
                },
                Modus::CMDINPUT => {
                    if let Message::RawKey(key) = msg {
                        self.raw_input(key)
                    } else if let Message::Resize(width, height) = msg {
                        self.ui_resize(width, height)
                    }
                }
            }
        }
    }

    // -------------------- Control handling functions ---------------------- //

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.uidata.popup_message = HELP_TEXT.to_string();
        self.uidata.show_popup = true;
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = self.previous_modus;
        self.previous_modus = Modus::POPUP;
        self.uidata.show_popup = false;
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            // The search box filters while typing.
            if self.cmd_mode == Some(CMDMode::Search)
                && self.view.set_search_text(&self.last_input.input)
            {
                self.recompute();
            }
            if self.last_input.finished {
                self.handle_cmd_input();
            }
            self.uidata.cmdinput = self.last_input.clone();
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode, initial: &str) {
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);

        self.active_cmdinput = true;
        self.input.set(initial);
        self.last_input = self.input.get();

        self.uidata.cmd_prompt = match (mode, &self.filter_column) {
            (CMDMode::Search, _) => "/".to_string(),
            (CMDMode::Filter, Some(column)) => format!("{} filter: ", column.header),
            (CMDMode::Filter, None) => "filter: ".to_string(),
        };
        self.uidata.cmdinput = self.last_input.clone();
        self.uidata.active_cmdinput = self.active_cmdinput;
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        self.uidata.active_cmdinput = self.active_cmdinput;

        let cmd_input = self.last_input.input.clone();
        match self.cmd_mode {
            Some(CMDMode::Search) => {
                if cmd_input.is_empty() {
                    self.set_status_message("Search cleared");
                } else {
                    self.set_status_message(format!(
                        "Search \"{cmd_input}\" matched {} records",
                        self.output.matched
                    ));
                }
            }
            Some(CMDMode::Filter) => {
                if let Some(column) = self.filter_column.take()
                    && !self.last_input.canceled
                {
                    self.edit_filter(&column, &cmd_input);
                }
            }
            None => {
                info!("Cmd mode is none!")
            }
        }

        self.cmd_mode = None;
        self.update_table_data();
    }

    fn edit_filter(&mut self, column: &ColumnDescriptor, input: &str) {
        match filter::parse_filter(column.kind, input) {
            Ok(Some(value)) => {
                self.view
                    .edit_draft(DraftEdit::SetFilter(column.id.to_string(), value));
            }
            Ok(None) => {
                self.view.edit_draft(DraftEdit::ClearFilter(column.id.to_string()));
            }
            Err(RVError::InvalidFilter(reason)) => {
                debug!("Invalid filter for {}: {reason}", column.id);
                self.set_status_message(format!("Invalid {} filter: {reason}", column.header));
            }
            Err(e) => {
                error!("Filter for {} failed: {e:?}", column.id);
                self.set_status_message(format!("Invalid {} filter", column.header));
            }
        }
    }

    fn copy_table_row(&mut self) {
        let index = match self.lines.get(self.selected_line) {
            Some(DisplayRow::Record { index, .. }) => *index,
            _ => {
                self.set_status_message("No record selected");
                return;
            }
        };
        let text = self.records[index].as_tsv();

        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    error!("Clipboard unavailable: {e}");
                    self.set_status_message("Clipboard unavailable");
                    return;
                }
            }
        }
        if let Some(clipboard) = self.clipboard.as_mut() {
            match clipboard.set_text(text) {
                Ok(()) => {
                    self.set_status_message(format!("Copied record {}", self.records[index].id))
                }
                Err(e) => {
                    error!("Copy failed: {e}");
                    self.set_status_message("Copy failed");
                }
            }
        }
    }

    fn move_table_selection_beginning(&mut self) {
        self.selected_line = 0;
        self.update_table_data();
    }

    fn move_table_selection_end(&mut self) {
        self.selected_line = self.lines.len().saturating_sub(1);
        self.update_table_data();
    }

    fn move_table_selection_up(&mut self, size: usize) {
        self.selected_line = self.selected_line.saturating_sub(size);
        self.update_table_data();
    }

    fn move_table_selection_down(&mut self, size: usize) {
        self.selected_line = std::cmp::min(
            self.selected_line + size,
            self.lines.len().saturating_sub(1),
        );
        self.update_table_data();
    }
}
