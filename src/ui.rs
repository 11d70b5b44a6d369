use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState},
};

use crate::domain::CMDMode;
use crate::model::{Model, RowMarker, UIData};

pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const CMDLINE_HEIGHT: usize = 2; // Status line and command line
pub const MARKER_WIDTH: usize = 2;
pub const COLUMN_SPACING: usize = 1;
pub const MIN_COLUMN_WIDTH: usize = 3;

const POPUP_WIDTH: u16 = 64;
const POPUP_HEIGHT: u16 = 24;

#[derive(Default)]
pub struct DictionaryUI {
    table_state: TableState,
}

impl DictionaryUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [table_area, status_area, cmd_area] = Layout::vertical([
            Constraint::Min(TABLE_HEADER_HEIGHT as u16),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        self.draw_table(uidata, frame, table_area);
        Self::draw_statusline(uidata, frame, status_area);
        Self::draw_cmdline(uidata, frame, cmd_area);
        if uidata.show_popup {
            Self::draw_popup(uidata, frame);
        }
    }

    fn draw_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let header = Row::new(
            std::iter::once(Cell::from(""))
                .chain(uidata.columns.iter().map(|c| Cell::from(c.name.clone()))),
        )
        .style(Style::new().bold().underlined());

        let rows = uidata.rows.iter().enumerate().map(|(ridx, row)| {
            let marker = Cell::from(marker_symbol(row.marker)).style(marker_style(row.marker));
            let cells = row.cells.iter().enumerate().map(|(cidx, value)| {
                let cell = Cell::from(value.clone());
                if ridx == uidata.selected_row && cidx == uidata.selected_column {
                    cell.style(Style::new().add_modifier(Modifier::REVERSED))
                } else {
                    cell
                }
            });
            let style = if row.marker == RowMarker::History {
                Style::new().fg(Color::DarkGray).italic()
            } else {
                Style::new()
            };
            Row::new(std::iter::once(marker).chain(cells)).style(style)
        });

        let widths = std::iter::once(Constraint::Length(MARKER_WIDTH as u16))
            .chain(uidata.columns.iter().map(|c| Constraint::Length(c.width)));

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(COLUMN_SPACING as u16)
            .row_highlight_style(Style::new().bg(Color::Rgb(40, 40, 60)));

        *self.table_state.offset_mut() = 0;
        self.table_state
            .select((!uidata.rows.is_empty()).then_some(uidata.selected_row));
        frame.render_stateful_widget(table, area, &mut self.table_state);
    }

    fn draw_statusline(uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::from(format!(" {} ", uidata.name)).bold().reversed(),
            Span::from(format!(
                " {}/{} ",
                (uidata.abs_selected_row + 1).min(uidata.nrows),
                uidata.nrows
            )),
        ];
        if uidata.hidden_rows > 0 {
            spans.push(Span::from(format!("({} older hidden) ", uidata.hidden_rows)).dark_gray());
        }
        if let Some(filter) = &uidata.filter {
            spans.push(Span::from(format!("filter: {filter} ")).yellow());
        }
        if let Some(sort) = &uidata.sort_info {
            spans.push(Span::from(format!("Table sorted by {sort} ")).cyan());
        }
        spans.push(Span::from(format!("│ {}", uidata.status_message)));
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_cmdline(uidata: &UIData, frame: &mut Frame, area: Rect) {
        if !uidata.active_cmdinput {
            let hint = Line::from(vec![
                " Toggle history ".into(),
                "<Enter>".blue().bold(),
                " Filter ".into(),
                "</>".blue().bold(),
                " Help ".into(),
                "<?>".blue().bold(),
                " Quit ".into(),
                "<Q> ".blue().bold(),
            ]);
            frame.render_widget(Paragraph::new(hint), area);
            return;
        }

        let prompt = match uidata.cmd_mode {
            Some(CMDMode::Filter) => "/",
            Some(CMDMode::Export) => "export to: ",
            None => ":",
        };
        let line = Line::from(vec![
            Span::from(prompt).bold(),
            Span::from(uidata.cmdinput.input.clone()),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        let offset = u16::try_from(prompt.chars().count() + uidata.cmdinput.cursor_pos)
            .unwrap_or(u16::MAX);
        let x = area.x.saturating_add(offset);
        frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
    }

    fn draw_popup(uidata: &UIData, frame: &mut Frame) {
        let area = frame.area();
        let width = POPUP_WIDTH.min(area.width);
        let height = POPUP_HEIGHT.min(area.height);
        let popup = Rect {
            x: area.x + (area.width - width) / 2,
            y: area.y + (area.height - height) / 2,
            width,
            height,
        };
        let block = Block::bordered()
            .title(Line::from(" Help ".bold()).centered())
            .title_bottom(Line::from(" <Esc> close ").centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(Text::from(uidata.popup_message.as_str())).block(block),
            popup,
        );
    }
}

fn marker_symbol(marker: RowMarker) -> &'static str {
    match marker {
        RowMarker::Plain => "",
        RowMarker::Collapsed => "▸",
        RowMarker::Expanded => "▾",
        RowMarker::History => "↳",
    }
}

fn marker_style(marker: RowMarker) -> Style {
    match marker {
        RowMarker::Collapsed | RowMarker::Expanded => Style::new().fg(Color::Yellow).bold(),
        _ => Style::new(),
    }
}
