use chrono::TimeZone;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Frame,
};

use super::app::{App, InputMode};
use crate::localtime::local_naive;
use crate::models::{ExceptionKind, Occurrence, OccurrenceKind};

fn row_style(o: &Occurrence) -> Style {
    if o.cancelled {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else if o.fixed {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Green)
    }
}

pub fn ui<Tz: TimeZone>(f: &mut Frame, app: &mut App<'_, Tz>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Agenda
            Constraint::Length(3), // Status
            Constraint::Length(3), // Help
        ])
        .split(f.area());

    let tz = app.planner.tz().clone();
    let rows: Vec<Row> = app
        .occurrences
        .iter()
        .map(|o| {
            let start = local_naive(&tz, o.start);
            let end = local_naive(&tz, o.end);
            let (kind, reference) = match o.kind {
                OccurrenceKind::Weekly { key } => ("weekly", format!("#{}", key.template_id)),
                OccurrenceKind::Normal { task_id } => ("task", task_id.to_string()),
            };
            let state = match o.exception {
                Some(ExceptionKind::Cancelled) => "cancelled",
                Some(ExceptionKind::Rescheduled) => "moved",
                None => "",
            };
            Row::new(vec![
                Cell::from(start.format("%a %d").to_string()),
                Cell::from(format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))),
                Cell::from(o.title.clone()),
                Cell::from(o.task_type.clone()),
                Cell::from(kind),
                Cell::from(reference),
                Cell::from(state),
            ])
            .style(row_style(o))
        })
        .collect();

    let widths = [
        Constraint::Length(7),
        Constraint::Length(12),
        Constraint::Min(20),
        Constraint::Length(12),
        Constraint::Length(7),
        Constraint::Length(6),
        Constraint::Length(10),
    ];

    let title = format!(
        "Weekwise - {} to {}",
        app.week_start.format("%a %Y-%m-%d"),
        app.week_end().format("%a %Y-%m-%d")
    );
    let table = Table::new(rows, widths)
        .header(
            Row::new(vec!["Day", "Time", "Title", "Type", "Kind", "Ref", "State"])
                .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
                .bottom_margin(1),
        )
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().add_modifier(Modifier::BOLD).bg(Color::DarkGray))
        .highlight_symbol(">> ");

    f.render_stateful_widget(table, chunks[0], &mut app.state);

    let status = Paragraph::new(app.message.clone().unwrap_or_default())
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, chunks[1]);

    let help_text = match app.input_mode {
        InputMode::Normal => "q: Quit | j/k: Move | n/p: Week | t: Today | x: Cancel | r: Reschedule | u: Undo | Space: Done | s: Auto-schedule",
        InputMode::Rescheduling => "Enter: Save | Esc: Cancel",
    };
    let help = Paragraph::new(help_text)
        .style(Style::default().fg(Color::Gray))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, chunks[2]);

    if app.input_mode == InputMode::Rescheduling {
        let area = centered_rect(60, 3, f.area());
        f.render_widget(Clear, area);
        let input = Paragraph::new(app.input_buffer.as_str())
            .style(Style::default().fg(Color::Yellow))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Move to (YYYY-MM-DD HH:MM)"),
            );
        f.render_widget(input, area);
    }
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let margin = r.height.saturating_sub(height) / 2;
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(margin),
            Constraint::Length(height),
            Constraint::Length(margin),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
