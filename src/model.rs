use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::columns::{
    SortDirection, Truncation, column_def, column_label, max_substring, parse_val, sort_info,
};
use crate::domain::{CMDMode, DVConfig, DVError, HELP_TEXT, Message};
use crate::export::{csv_line, export_rows};
use crate::inputter::{InputResult, Inputter};
use crate::table::DictionaryTable;
use crate::ui::{
    CMDLINE_HEIGHT, COLUMN_SPACING, MARKER_WIDTH, MIN_COLUMN_WIDTH, TABLE_HEADER_HEIGHT,
};
use crate::visibility::{FieldRow, VisibilityEngine};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMarker {
    Plain,
    Collapsed,
    Expanded,
    History,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowView {
    pub marker: RowMarker,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    pub name: String,
    pub width: u16,
}

// Display state on top of the row collection
#[derive(Default)]
struct TableView {
    rows: Vec<usize>, // Data row index of every displayed row, in display order
    widths: Vec<u16>, // Width per data column, adjusted by resizing
    visible_columns: Vec<usize>,
    curser_row: usize,
    offset_row: usize,
    curser_column: usize, // Data column index
    offset_column: usize,
    height: usize,
    width: usize,
    filter: Option<String>,
    sort: Option<(usize, SortDirection)>,
    matching_rows: usize,
    revision: u64,
}

pub struct UIData {
    pub name: String,
    pub columns: Vec<ColumnView>,
    pub rows: Vec<RowView>,
    pub nrows: usize,
    pub hidden_rows: usize,
    pub selected_row: usize,
    pub selected_column: usize,
    pub abs_selected_row: usize,
    pub sort_info: Option<String>,
    pub filter: Option<String>,
    pub show_popup: bool,
    pub popup_message: String,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
    pub last_update: Instant,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            name: String::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            nrows: 0,
            hidden_rows: 0,
            selected_row: 0,
            selected_column: 0,
            abs_selected_row: 0,
            sort_info: None,
            filter: None,
            show_popup: false,
            popup_message: String::new(),
            cmdinput: InputResult::default(),
            cmd_mode: None,
            active_cmdinput: false,
            status_message: String::new(),
            last_update: Instant::now(),
        }
    }
}

pub struct Model {
    config: DVConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    table: DictionaryTable,
    engine: VisibilityEngine,
    view: TableView,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    status_message: String,
    ui_width: usize,
    ui_height: usize,
}

impl Model {
    pub fn init(config: &DVConfig, ui_width: usize, ui_height: usize) -> Result<Self, DVError> {
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            table: DictionaryTable::default(),
            engine: VisibilityEngine::new(config.retain_passes),
            view: TableView::default(),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            status_message: "Started ddv!".to_string(),
            ui_width,
            ui_height,
        };
        model.apply_layout();
        model.update_table_data();
        Ok(model)
    }

    pub fn load_data_file(&mut self, path: &Path) -> Result<(), DVError> {
        let start_time = Instant::now();
        let table = DictionaryTable::load(path, &self.config)?;
        let nrows = table.rows.len();
        self.set_table(table);
        self.set_status_message(format!(
            "Loaded {nrows} rows in {}ms ...",
            start_time.elapsed().as_millis()
        ));
        Ok(())
    }

    /// Replace the row collection. Toggle state is kept, column widths are kept
    /// when the columns did not change.
    pub fn set_table(&mut self, table: DictionaryTable) {
        let same_columns = table.columns == self.table.columns;
        self.table = table;
        if !same_columns {
            self.view.widths = self.initial_widths();
            self.view.curser_column = 0;
            self.view.offset_column = 0;
            self.view.sort = None;
        }
        self.refresh_rows();
        self.rebuild_view();
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

    pub fn update(&mut self, message: Option<Message>) -> Result<(), DVError> {
        if let Some(msg) = message {
            match self.modus {
                Modus::TABLE => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveDown => self.move_rows(1),
                    Message::MoveUp => self.move_rows(-1),
                    Message::MovePageDown => self.move_rows(self.view.height.max(1) as isize),
                    Message::MovePageUp => self.move_rows(-(self.view.height.max(1) as isize)),
                    Message::MoveBeginning => self.scroll_to(0),
                    Message::MoveEnd => self.scroll_to(self.view.rows.len().saturating_sub(1)),
                    Message::MoveLeft => self.move_column(-1),
                    Message::MoveRight => self.move_column(1),
                    Message::ToggleHistory => self.toggle_history(),
                    Message::Filter => self.enter_cmd_mode(CMDMode::Filter),
                    Message::Export => self.enter_cmd_mode(CMDMode::Export),
                    Message::SortAscending => self.sort_current_column(SortDirection::Ascending),
                    Message::SortDescending => self.sort_current_column(SortDirection::Descending),
                    Message::WidenColumn => self.resize_current_column(1),
                    Message::NarrowColumn => self.resize_current_column(-1),
                    Message::CopyCell => self.copy_table_cell(),
                    Message::CopyRow => self.copy_table_row(),
                    Message::Reload => self.reload(),
                    Message::Help => self.show_help(),
                    Message::Exit => self.exit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::RawKey(_) => (),
                },
                Modus::POPUP => match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::Help | Message::ToggleHistory => self.exit(),
                    _ => (),
                },
                Modus::CMDINPUT => match msg {
                    Message::RawKey(key) => self.raw_input(key),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }

        // Pick up engine changes that did not go through a rebuild yet
        if self.engine.revision() != self.view.revision {
            self.rebuild_view();
        }
        Ok(())
    }

    // -------------------- Row set and view ---------------------- //

    fn refresh_rows(&mut self) {
        let summary = self.engine.compute_visibility(&mut self.table.rows);
        info!(
            "{}: {} rows, {} fields, {} with history, {} hidden, {} states kept",
            self.table.name,
            summary.rows,
            summary.groups,
            summary.duplicated_groups,
            summary.hidden_rows,
            self.engine.len()
        );
        if summary.malformed_rows > 0 {
            warn!(
                "{} rows without key or timestamp are shown on their own",
                summary.malformed_rows
            );
        }
    }

    fn rebuild_view(&mut self) {
        let all: Vec<usize> = (0..self.table.rows.len()).collect();
        let matching = match &self.view.filter {
            Some(term) => self.table.filter(&all, term),
            None => all,
        };
        let ordered = match self.view.sort {
            Some((column, direction)) => self.table.sorted(&matching, column, direction),
            None => self.table.grouped(&matching),
        };
        self.view.matching_rows = ordered.len();
        self.view.rows = ordered
            .into_iter()
            .filter(|&ridx| self.engine.is_visible(&self.table.rows[ridx]))
            .collect();
        self.view.revision = self.engine.revision();
        trace!(
            "View rebuilt: {} of {} rows displayed",
            self.view.rows.len(),
            self.view.matching_rows
        );

        let abs = self.view.offset_row + self.view.curser_row;
        self.scroll_to(abs.min(self.view.rows.len().saturating_sub(1)));
    }

    fn initial_widths(&self) -> Vec<u16> {
        self.table
            .columns
            .iter()
            .enumerate()
            .map(|(cidx, name)| match column_def(name) {
                Some(def) => def.width,
                None => {
                    let content = self
                        .table
                        .rows
                        .iter()
                        .map(|r| {
                            r.values
                                .get(cidx)
                                .and_then(|v| v.as_deref())
                                .map_or(0, |v| v.chars().count())
                        })
                        .max()
                        .unwrap_or(0);
                    let width = name.chars().count().max(content) + COLUMN_SPACING;
                    let max_width = self.config.max_column_width.max(MIN_COLUMN_WIDTH);
                    width.clamp(MIN_COLUMN_WIDTH, max_width) as u16
                }
            })
            .collect()
    }

    fn apply_layout(&mut self) {
        self.view.height = self
            .ui_height
            .saturating_sub(TABLE_HEADER_HEIGHT + CMDLINE_HEIGHT);
        self.view.width = self.ui_width.saturating_sub(MARKER_WIDTH);
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.ui_width, width, self.ui_height, height
        );
        self.ui_width = width;
        self.ui_height = height;
        self.apply_layout();
        let abs = self.view.offset_row + self.view.curser_row;
        self.view.offset_row = 0;
        self.scroll_to(abs);
    }

    fn current_data_row(&self) -> Option<usize> {
        self.view
            .rows
            .get(self.view.offset_row + self.view.curser_row)
            .copied()
    }

    fn marker(&self, row: &FieldRow) -> RowMarker {
        if row.is_history() {
            return RowMarker::History;
        }
        match (row.has_duplicates, row.group_key()) {
            (true, Some(key)) if self.engine.is_expanded(key) => RowMarker::Expanded,
            (true, _) => RowMarker::Collapsed,
            (false, _) => RowMarker::Plain,
        }
    }

    fn layout_columns(&mut self) {
        let view = &mut self.view;
        view.visible_columns.clear();
        let mut used = 0;
        for cidx in view.offset_column..view.widths.len() {
            let width = view.widths[cidx] as usize + COLUMN_SPACING;
            if used + width <= view.width {
                view.visible_columns.push(cidx);
                used += width;
            } else {
                // Add the last partial visible column
                if view.width.saturating_sub(used) > MIN_COLUMN_WIDTH {
                    view.visible_columns.push(cidx);
                }
                break;
            }
        }
    }

    fn update_table_data(&mut self) {
        self.layout_columns();
        let view = &self.view;
        let mut used = 0;
        let columns: Vec<ColumnView> = view
            .visible_columns
            .iter()
            .map(|&cidx| {
                let available = view.width.saturating_sub(used + COLUMN_SPACING);
                let width = (view.widths[cidx] as usize).min(available);
                used += width + COLUMN_SPACING;
                ColumnView {
                    name: column_label(&self.table.columns[cidx]).to_string(),
                    width: width as u16,
                }
            })
            .collect();

        let rend = (view.offset_row + view.height).min(view.rows.len());
        let rbegin = view.offset_row.min(rend);
        let rows: Vec<RowView> = view.rows[rbegin..rend]
            .iter()
            .map(|&ridx| {
                let row = &self.table.rows[ridx];
                let cells = view
                    .visible_columns
                    .iter()
                    .map(|&cidx| {
                        let value = parse_val(row.values.get(cidx).and_then(|v| v.as_deref()));
                        max_substring(value, Truncation::for_column(&self.table.columns[cidx]))
                    })
                    .collect();
                RowView {
                    marker: self.marker(row),
                    cells,
                }
            })
            .collect();

        let sort = view.sort.map(|(cidx, direction)| {
            sort_info(column_label(&self.table.columns[cidx]), direction)
        });
        let selected_column = view
            .visible_columns
            .iter()
            .position(|&c| c == view.curser_column)
            .unwrap_or(0);

        self.uidata = UIData {
            name: self.table.name.clone(),
            columns,
            rows,
            nrows: view.rows.len(),
            hidden_rows: view.matching_rows - view.rows.len(),
            selected_row: view.curser_row,
            selected_column,
            abs_selected_row: view.offset_row + view.curser_row,
            sort_info: sort,
            filter: view.filter.clone(),
            show_popup: self.modus == Modus::POPUP,
            popup_message: if self.modus == Modus::POPUP {
                HELP_TEXT.to_string()
            } else {
                String::new()
            },
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
            last_update: Instant::now(),
        };
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.uidata.last_update = Instant::now();
    }

    // -------------------- Control handling functions ---------------------- //

    fn toggle_history(&mut self) {
        let Some(ridx) = self.current_data_row() else {
            return;
        };
        let row = &self.table.rows[ridx];
        let Some(key) = row
            .group_key()
            .filter(|_| row.has_duplicates)
            .map(str::to_string)
        else {
            self.set_status_message("Field has no older versions");
            return;
        };

        self.engine.toggle_visibility(&key);
        self.rebuild_view();

        // Keep the cursor on the current version of the field
        let canonical = self.view.rows.iter().position(|&i| {
            let r = &self.table.rows[i];
            r.canonical && r.group_key() == Some(key.as_str())
        });
        if let Some(pos) = canonical {
            self.scroll_to(pos);
        }

        let history = self
            .table
            .rows
            .iter()
            .filter(|r| !r.canonical && r.group_key() == Some(key.as_str()))
            .count();
        let message = if self.engine.is_expanded(&key) {
            format!("{key}: showing {history} older versions")
        } else {
            format!("{key}: hiding {history} older versions")
        };
        self.set_status_message(message);
    }

    fn scroll_to(&mut self, abs: usize) {
        let view = &mut self.view;
        let abs = abs.min(view.rows.len().saturating_sub(1));
        if abs < view.offset_row {
            view.offset_row = abs;
        } else if view.height > 0 && abs >= view.offset_row + view.height {
            view.offset_row = abs + 1 - view.height;
        }
        view.curser_row = abs - view.offset_row;
        self.update_table_data();
    }

    fn move_rows(&mut self, delta: isize) {
        let abs = self.view.offset_row + self.view.curser_row;
        self.scroll_to(abs.saturating_add_signed(delta));
    }

    fn move_column(&mut self, delta: isize) {
        let ncolumns = self.view.widths.len();
        if ncolumns == 0 {
            return;
        }
        let view = &mut self.view;
        view.curser_column = view
            .curser_column
            .saturating_add_signed(delta)
            .min(ncolumns - 1);
        if view.curser_column < view.offset_column {
            view.offset_column = view.curser_column;
        }
        self.layout_columns();
        while !self.view.visible_columns.contains(&self.view.curser_column)
            && self.view.offset_column < self.view.curser_column
        {
            self.view.offset_column += 1;
            self.layout_columns();
        }
        self.update_table_data();
    }

    /// Move width between the current column and its right neighbour.
    fn resize_current_column(&mut self, delta: i16) {
        let cidx = self.view.curser_column;
        let Some(&current) = self.view.widths.get(cidx) else {
            return;
        };
        let min = MIN_COLUMN_WIDTH as u16;
        let resized = current.saturating_add_signed(delta).max(min);
        if resized == current {
            return;
        }
        self.view.widths[cidx] = resized;
        if let Some(next) = self.view.widths.get_mut(cidx + 1) {
            *next = next.saturating_add_signed(-delta).max(min);
        }
        let label = column_label(&self.table.columns[cidx]).to_string();
        debug!("Column {label} width {current} -> {resized}");
        self.update_table_data();
        self.set_status_message(format!("{label} width {resized}"));
    }

    fn sort_current_column(&mut self, direction: SortDirection) {
        if self.table.columns.is_empty() {
            return;
        }
        let column = self.view.curser_column;
        if self.view.sort == Some((column, direction)) {
            self.view.sort = None;
            self.set_status_message("Table grouped by field");
        } else {
            self.view.sort = Some((column, direction));
            let label = column_label(&self.table.columns[column]).to_string();
            self.set_status_message(format!("Table sorted by {}", sort_info(&label, direction)));
        }
        self.rebuild_view();
    }

    fn copy_table_cell(&mut self) {
        let Some(ridx) = self.current_data_row() else {
            return;
        };
        let cell = self.table.cell(ridx, self.view.curser_column).to_string();
        trace!("Cell content: {}", cell);
        if self.copy_to_clipboard(cell.clone()) {
            self.set_status_message(format!(
                "{} Copied to Clipboard.",
                max_substring(&cell, Truncation::CopyPaste)
            ));
        }
    }

    fn copy_table_row(&mut self) {
        let Some(ridx) = self.current_data_row() else {
            return;
        };
        let line = csv_line(self.table.rows[ridx].values.iter().map(|v| v.as_deref()));
        if self.copy_to_clipboard(line) {
            self.set_status_message("Row copied to clipboard as CSV.");
        }
    }

    fn copy_to_clipboard(&mut self, text: String) -> bool {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    error!("Clipboard unavailable: {e:?}");
                    self.set_status_message("Clipboard unavailable!");
                    return false;
                }
            }
        }
        let Some(clipboard) = self.clipboard.as_mut() else {
            return false;
        };
        match clipboard.set_text(text) {
            Ok(_) => {
                trace!("Copied content to clipboard.");
                true
            }
            Err(e) => {
                error!("Error copying to clipboard: {e:?}");
                self.set_status_message("Copy to clipboard failed!");
                false
            }
        }
    }

    fn export_visible_rows(&mut self, target: &str) {
        let path = match shellexpand::full(target) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                self.set_status_message(format!("Export failed: {e}"));
                return;
            }
        };
        let headers: Vec<&str> = self.table.columns.iter().map(|c| column_label(c)).collect();
        let rows = self.view.rows.iter().map(|&ridx| &self.table.rows[ridx]);
        let message = match export_rows(&path, &headers, rows) {
            Ok(written) => format!("Exported {written} rows to {}", path.display()),
            Err(e) => {
                error!("{e}");
                e.to_string()
            }
        };
        self.set_status_message(message);
    }

    fn reload(&mut self) {
        match self.table.reload() {
            Ok(Some(table)) => {
                let nrows = table.rows.len();
                self.set_table(table);
                let source = self.table.path().map(|p| p.display().to_string()).unwrap_or_default();
                self.set_status_message(format!("Reloaded {nrows} rows from {source}"));
            }
            Ok(None) => {
                self.refresh_rows();
                self.rebuild_view();
                self.set_status_message("Refreshed");
            }
            Err(e) => {
                error!("Reload failed: {e}");
                self.set_status_message(format!("Reload failed: {e}"));
            }
        }
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::TABLE => {
                if self.view.filter.take().is_some() {
                    self.set_status_message("Filter cleared");
                    self.rebuild_view();
                }
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
                self.update_table_data();
            }
            Modus::CMDINPUT => {}
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.update_table_data();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
            self.update_table_data();
        }
    }

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode {mode:?} ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;

        self.input.clear();
        match mode {
            CMDMode::Filter => self.input.set(self.view.filter.as_deref().unwrap_or("")),
            CMDMode::Export => self.input.set(&self.config.export_path.to_string_lossy()),
        }
        self.last_input = self.input.get();
        self.update_table_data();
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);

        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;
        let mode = self.cmd_mode.take();

        if self.last_input.canceled {
            return;
        }
        let cmd_input = self.last_input.input.trim().to_string();
        match mode {
            Some(CMDMode::Filter) => {
                self.view.filter = (!cmd_input.is_empty()).then_some(cmd_input);
                self.view.offset_row = 0;
                self.view.curser_row = 0;
                self.rebuild_view();
                let message = match &self.view.filter {
                    Some(term) => format!("Filter \"{term}\": {} rows", self.view.rows.len()),
                    None => "Filter cleared".to_string(),
                };
                self.set_status_message(message);
            }
            Some(CMDMode::Export) if !cmd_input.is_empty() => self.export_visible_rows(&cmd_input),
            Some(CMDMode::Export) => {}
            None => info!("Cmd mode is none!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};

    fn row(key: &str, ts: i64, description: &str) -> FieldRow {
        FieldRow::new(
            Some(key.to_string()),
            Some(ts),
            vec![
                Some(key.to_string()),
                Some(description.to_string()),
                Some(ts.to_string()),
            ],
        )
    }

    fn columns() -> Vec<String> {
        vec![
            "internalFieldName".to_string(),
            "Descriptions".to_string(),
            "lastUpdated".to_string(),
        ]
    }

    fn table() -> DictionaryTable {
        DictionaryTable::from_rows(
            "dictionary",
            columns(),
            vec![
                row("GEO", 10, "geo old"),
                row("GEO", 20, "geo new"),
                row("NAME", 5, "person"),
            ],
        )
    }

    fn model() -> Model {
        let mut model = Model::init(&DVConfig::default(), 120, 30).unwrap();
        model.set_table(table());
        model
    }

    fn send(model: &mut Model, message: Message) {
        model.update(Some(message)).unwrap();
    }

    fn type_input(model: &mut Model, s: &str) {
        for c in s.chars() {
            send(model, Message::RawKey(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
        }
    }

    fn key(model: &mut Model, code: KeyCode, modifiers: KeyModifiers) {
        send(model, Message::RawKey(KeyEvent::new(code, modifiers)));
    }

    fn displayed(model: &Model) -> Vec<(RowMarker, String)> {
        model
            .get_uidata()
            .rows
            .iter()
            .map(|r| (r.marker, r.cells[1].clone()))
            .collect()
    }

    #[test]
    fn history_rows_start_hidden() {
        let model = model();
        assert_eq!(
            displayed(&model),
            vec![
                (RowMarker::Collapsed, "geo new".to_string()),
                (RowMarker::Plain, "person".to_string()),
            ]
        );
        let ui = model.get_uidata();
        assert_eq!(ui.hidden_rows, 1);
        assert_eq!(ui.columns[0].name, "Internal FieldName");
    }

    #[test]
    fn toggle_shows_and_hides_history() {
        let mut model = model();
        send(&mut model, Message::ToggleHistory);
        assert_eq!(
            displayed(&model),
            vec![
                (RowMarker::Expanded, "geo new".to_string()),
                (RowMarker::History, "geo old".to_string()),
                (RowMarker::Plain, "person".to_string()),
            ]
        );
        assert_eq!(model.get_uidata().status_message, "GEO: showing 1 older versions");

        // Toggling from the history row collapses the group onto its current row
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::ToggleHistory);
        assert_eq!(displayed(&model).len(), 2);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
    }

    #[test]
    fn toggle_on_singleton_is_noop() {
        let mut model = model();
        send(&mut model, Message::MoveDown);
        send(&mut model, Message::ToggleHistory);
        assert_eq!(displayed(&model).len(), 2);
        assert_eq!(model.get_uidata().status_message, "Field has no older versions");
    }

    #[test]
    fn filter_keeps_toggle_state() {
        let mut model = model();
        send(&mut model, Message::ToggleHistory);

        send(&mut model, Message::Filter);
        assert!(model.raw_keyevents());
        type_input(&mut model, "geo");
        key(&mut model, KeyCode::Enter, KeyModifiers::NONE);
        assert!(!model.raw_keyevents());
        assert_eq!(model.get_uidata().filter.as_deref(), Some("geo"));
        assert_eq!(
            displayed(&model),
            vec![
                (RowMarker::Expanded, "geo new".to_string()),
                (RowMarker::History, "geo old".to_string()),
            ]
        );

        send(&mut model, Message::Exit);
        assert_eq!(model.get_uidata().filter, None);
        assert_eq!(displayed(&model).len(), 3);
    }

    #[test]
    fn canceled_filter_changes_nothing() {
        let mut model = model();
        send(&mut model, Message::Filter);
        type_input(&mut model, "zzz");
        key(&mut model, KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(model.get_uidata().filter, None);
        assert_eq!(displayed(&model).len(), 2);
    }

    #[test]
    fn refresh_keeps_expanded_groups() {
        let mut model = model();
        send(&mut model, Message::ToggleHistory);
        send(&mut model, Message::Reload);
        assert_eq!(displayed(&model).len(), 3);

        // New row objects, different order
        let mut rows = table().rows;
        rows.reverse();
        model.set_table(DictionaryTable::from_rows("dictionary", columns(), rows));
        assert_eq!(
            displayed(&model),
            vec![
                (RowMarker::Plain, "person".to_string()),
                (RowMarker::Expanded, "geo new".to_string()),
                (RowMarker::History, "geo old".to_string()),
            ]
        );
    }

    #[test]
    fn newer_row_becomes_current_after_refresh() {
        let mut model = model();
        let mut rows = table().rows;
        rows.push(row("GEO", 30, "geo newest"));
        model.set_table(DictionaryTable::from_rows("dictionary", columns(), rows));
        assert_eq!(displayed(&model)[0], (RowMarker::Collapsed, "geo newest".to_string()));
        assert_eq!(model.get_uidata().hidden_rows, 2);
    }

    #[test]
    fn sorting_reports_sort_info() {
        let mut model = model();
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::MoveRight);
        send(&mut model, Message::SortAscending);
        assert_eq!(
            model.get_uidata().sort_info.as_deref(),
            Some("Last Updated in ascending order:")
        );
        assert_eq!(
            displayed(&model),
            vec![
                (RowMarker::Plain, "person".to_string()),
                (RowMarker::Collapsed, "geo new".to_string()),
            ]
        );

        send(&mut model, Message::SortDescending);
        assert_eq!(displayed(&model)[0].1, "geo new");

        // Same sort again returns to grouped order
        send(&mut model, Message::SortDescending);
        assert_eq!(model.get_uidata().sort_info, None);
    }

    #[test]
    fn resize_moves_width_to_neighbour() {
        let mut model = model();
        send(&mut model, Message::WidenColumn);
        let ui = model.get_uidata();
        assert_eq!(ui.columns[0].width, 35);
        assert_eq!(ui.columns[1].width, 25);

        send(&mut model, Message::NarrowColumn);
        send(&mut model, Message::NarrowColumn);
        let ui = model.get_uidata();
        assert_eq!(ui.columns[0].width, 33);
        assert_eq!(ui.columns[1].width, 27);
    }

    #[test]
    fn narrow_stops_at_minimum_width() {
        let mut model = model();
        for _ in 0..100 {
            send(&mut model, Message::NarrowColumn);
        }
        assert_eq!(model.get_uidata().columns[0].width, MIN_COLUMN_WIDTH as u16);
    }

    #[test]
    fn export_writes_visible_rows() {
        let mut model = model();
        let path = std::env::temp_dir()
            .join(format!("ddv_model_export_{}.csv", std::process::id()));

        send(&mut model, Message::Export);
        assert_eq!(model.get_uidata().cmdinput.input, "data_dictionary.csv");
        key(&mut model, KeyCode::Char('u'), KeyModifiers::CONTROL);
        type_input(&mut model, &path.to_string_lossy());
        key(&mut model, KeyCode::Enter, KeyModifiers::NONE);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "\"Internal FieldName\",\"Description\",\"Last Updated\"");
        assert_eq!(lines[1], "\"GEO\",\"geo new\",\"20\"");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn help_popup_opens_and_closes() {
        let mut model = model();
        send(&mut model, Message::Help);
        assert!(model.get_uidata().show_popup);
        send(&mut model, Message::MoveDown);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
        send(&mut model, Message::Exit);
        assert!(!model.get_uidata().show_popup);
    }

    #[test]
    fn navigation_is_bounded() {
        let mut model = model();
        send(&mut model, Message::MoveUp);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
        send(&mut model, Message::MoveEnd);
        assert_eq!(model.get_uidata().abs_selected_row, 1);
        send(&mut model, Message::MovePageDown);
        assert_eq!(model.get_uidata().abs_selected_row, 1);
        send(&mut model, Message::MoveBeginning);
        assert_eq!(model.get_uidata().abs_selected_row, 0);
    }

    #[test]
    fn scrolling_keeps_cursor_in_window() {
        let mut model = Model::init(&DVConfig::default(), 80, 10).unwrap();
        let rows = (0..50).map(|i| row(&format!("F{i}"), i, "d")).collect();
        model.set_table(DictionaryTable::from_rows("big", columns(), rows));
        for _ in 0..20 {
            send(&mut model, Message::MoveDown);
        }
        let ui = model.get_uidata();
        assert_eq!(ui.abs_selected_row, 20);
        assert!(ui.selected_row < ui.rows.len());
        assert_eq!(ui.rows[ui.selected_row].cells[0], "F20");
    }

    #[test]
    fn empty_model_handles_messages() {
        let mut model = Model::init(&DVConfig::default(), 80, 24).unwrap();
        for message in [
            Message::MoveDown,
            Message::MoveEnd,
            Message::MoveRight,
            Message::ToggleHistory,
            Message::SortAscending,
            Message::WidenColumn,
            Message::Reload,
        ] {
            send(&mut model, message);
        }
        assert!(model.get_uidata().rows.is_empty());
        send(&mut model, Message::Quit);
        assert_eq!(model.status, Status::QUITTING);
    }

    #[test]
    fn loads_fixture_with_history() {
        let mut model = Model::init(&DVConfig::default(), 200, 40).unwrap();
        model
            .load_data_file(Path::new("tests/fixtures/dictionary_01.csv"))
            .unwrap();
        let ui = model.get_uidata();
        assert_eq!(ui.name, "dictionary_01.csv");
        // 8 rows, two older GEO rows and one older NAME row hidden
        assert_eq!(ui.nrows, 5);
        assert_eq!(ui.hidden_rows, 3);
        assert_eq!(ui.rows[0].marker, RowMarker::Collapsed);
        assert_eq!(ui.rows[0].cells[9], "Geographic point, WGS84");
    }
}
