use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, Clear, List, ListState, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState,
    },
};

use crate::model::{LineKind, Model, PanelView, UIData};

pub const CMDLINE_HEIGH: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 2;
pub const GROUP_INDENT: &str = "  ";

#[derive(Debug, Default)]
pub struct TableUI {}

impl TableUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [table_area, cmdline_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(CMDLINE_HEIGH as u16),
        ])
        .areas(frame.area());

        self.render_table(uidata, table_area, frame);
        self.render_cmdline(uidata, cmdline_area, frame);

        if let Some(panel) = &uidata.panel {
            self.render_panel(panel, frame);
        }
        if uidata.show_popup {
            self.render_popup(&uidata.popup_message, frame);
        }
    }

    fn render_table(&self, uidata: &UIData, area: Rect, frame: &mut Frame) {
        let [header_area, body_area] = Layout::vertical([
            Constraint::Length(TABLE_HEADER_HEIGHT as u16),
            Constraint::Min(0),
        ])
        .areas(area);
        let [rows_area, scrollbar_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(SCROLLBAR_WIDTH as u16),
        ])
        .areas(body_area);

        frame.render_widget(
            Paragraph::new(Line::from(uidata.header.as_str()).bold().reversed()),
            header_area,
        );

        let lines: Vec<Line> = uidata
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                let style = match line.kind {
                    LineKind::Group => Style::new().yellow().bold(),
                    LineKind::Record => Style::new(),
                };
                let style = if idx == uidata.selected_row {
                    style.reversed()
                } else {
                    style
                };
                Line::from(Span::styled(line.text.as_str(), style))
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), rows_area);

        let mut scrollbar_state =
            ScrollbarState::new(uidata.nlines).position(uidata.abs_selected_row);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            scrollbar_area,
            &mut scrollbar_state,
        );
    }

    fn render_cmdline(&self, uidata: &UIData, area: Rect, frame: &mut Frame) {
        if uidata.active_cmdinput {
            let prompt = uidata.cmd_prompt.as_str();
            let line = Line::from(vec![
                Span::from(prompt).blue().bold(),
                Span::from(uidata.cmdinput.input.as_str()),
            ]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (prompt.chars().count() + uidata.cmdinput.curser_pos) as u16;
            frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let summary = format!("{} | {} ", uidata.name, uidata.summary);
        let [status_area, summary_area] = Layout::horizontal([
            Constraint::Min(0),
            Constraint::Length(summary.chars().count() as u16),
        ])
        .areas(area);
        frame.render_widget(Paragraph::new(uidata.status_message.as_str()), status_area);
        frame.render_widget(Paragraph::new(summary).right_aligned().dim(), summary_area);
    }

    fn render_panel(&self, panel: &PanelView, frame: &mut Frame) {
        let area = popup_area(frame.area(), 70, 50);
        let block = Block::bordered()
            .title(Line::from(panel.title.as_str()).bold().centered())
            .title_bottom(Line::from(panel.hint.as_str()).centered());
        let list = List::new(panel.items.iter().map(String::as_str))
            .block(block)
            .highlight_style(Style::new().reversed());
        let mut state = ListState::default().with_selected(Some(panel.selected));

        frame.render_widget(Clear, area);
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_popup(&self, message: &str, frame: &mut Frame) {
        let area = popup_area(frame.area(), 60, 80);
        let block = Block::bordered()
            .title(Line::from(" Help ").bold().centered())
            .title_bottom(Line::from(" <Esc> close ").centered());
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(message).block(block), area);
    }
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
    let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
    let [area] = vertical.areas(area);
    let [area] = horizontal.areas(area);
    area
}
