//! Drawing the monitor.

use chrono::Utc;
use ratatui::{
    Frame,
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use tend_core::SessionStatus;

use super::state::{App, Column, Confirm, Direction, Mode, StatusFilter};
use crate::display::{format_age, shorten_path};

const SELECTED: Style = Style::new().bg(Color::DarkGray).add_modifier(Modifier::BOLD);
const MUTED: Style = Style::new().fg(Color::DarkGray);
const ACCENT: Style = Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD);

pub fn status_style(status: SessionStatus) -> Style {
    match status {
        SessionStatus::AwaitingPermission => Style::new().fg(Color::Red).add_modifier(Modifier::BOLD),
        SessionStatus::AwaitingInput => {
            Style::new().fg(Color::Magenta).add_modifier(Modifier::BOLD)
        }
        SessionStatus::Idle => Style::new().fg(Color::Yellow),
        SessionStatus::Working => Style::new().fg(Color::Green),
        SessionStatus::Running => Style::new().fg(Color::Cyan),
        SessionStatus::Exited => MUTED,
    }
}

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.size());

    render_header(frame, app, chunks[0]);
    render_table(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);

    match &app.mode {
        Mode::Filter { cursor } => render_filter(frame, app, *cursor),
        Mode::Confirm(confirm) => render_confirm(frame, confirm),
        Mode::Help => render_help(frame),
        Mode::Browse | Mode::Search => {}
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(" tend ", ACCENT),
        Span::styled(format!("{} sessions ", app.records().len()), MUTED),
    ];
    for (status, count) in app.status_counts() {
        spans.push(Span::styled(
            format!(" {} {}", count, status.label()),
            status_style(status),
        ));
    }
    if !app.view.filter.is_all() {
        spans.push(Span::styled(
            format!("  filter: {}", app.view.filter.summary()),
            MUTED,
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn header_cell(app: &App, column: Column) -> Cell<'static> {
    let arrow = match app.view.sort.direction_for(column) {
        Some(Direction::Asc) => " ▲",
        Some(Direction::Desc) => " ▼",
        None => "",
    };
    let mut style = Style::new().add_modifier(Modifier::BOLD);
    if app.view.sort.cursor == column {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    Cell::from(Span::styled(format!("{}{}", column.title(), arrow), style))
}

fn render_table(frame: &mut Frame, app: &App, area: Rect) {
    let now = Utc::now();
    let home = dirs::home_dir();

    let rows: Vec<Row> = app
        .rows()
        .map(|r| {
            let status = match &r.detail {
                Some(detail) => Line::from(vec![
                    Span::styled(r.status.label(), status_style(r.status)),
                    Span::styled(format!(" {}", detail), MUTED),
                ]),
                None => Line::from(Span::styled(r.status.label(), status_style(r.status))),
            };
            let attached = if r.attached > 0 {
                Span::styled(r.attached.to_string(), ACCENT)
            } else {
                Span::styled("-", MUTED)
            };
            Row::new(vec![
                Cell::from(r.id.clone()),
                Cell::from(status),
                Cell::from(format_age(r.updated_at, now)),
                Cell::from(attached),
                Cell::from(shorten_path(&r.cwd, home.as_deref())),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(14),
        Constraint::Min(24),
        Constraint::Length(6),
        Constraint::Length(4),
        Constraint::Percentage(40),
    ];
    let header = Row::new(Column::ALL.iter().map(|c| header_cell(app, *c)).collect::<Vec<_>>());

    let title = if !app.loaded {
        " loading… ".to_string()
    } else if app.view.search.is_empty() {
        format!(" {} shown ", app.row_count())
    } else {
        format!(" {} match \"{}\" ", app.row_count(), app.view.search)
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(SELECTED);

    let mut state = TableState::default();
    if app.row_count() > 0 {
        state.select(Some(app.cursor()));
    }
    frame.render_stateful_widget(table, area, &mut state);

    if app.loaded && app.row_count() == 0 {
        let message = if app.records().is_empty() {
            "No sessions. Press n to start one here."
        } else {
            "No sessions match the current filter or search."
        };
        let inner = Rect {
            x: area.x + 2,
            y: area.y + 2,
            width: area.width.saturating_sub(4),
            height: 1.min(area.height.saturating_sub(3)),
        };
        frame.render_widget(Paragraph::new(Span::styled(message, MUTED)), inner);
    }
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let line = match (&app.mode, &app.notice) {
        (Mode::Search, _) => Line::from(vec![
            Span::styled("/", ACCENT),
            Span::raw(app.view.search.clone()),
            Span::styled("█", MUTED),
        ]),
        (_, Some(notice)) => Line::from(Span::styled(
            notice.clone(),
            Style::new().fg(Color::Yellow),
        )),
        _ => Line::from(Span::styled(
            "enter attach  / search  f filter  s sort  ←/→ column  x kill  d detach  n new  r refresh  ? help  q quit",
            MUTED,
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn render_filter(frame: &mut Frame, app: &App, cursor: usize) {
    let lines: Vec<Line> = (0..StatusFilter::ENTRIES)
        .map(|entry| {
            let mark = if app.view.filter.entry_checked(entry) { "[x]" } else { "[ ]" };
            let style = if entry == cursor { SELECTED } else { Style::new() };
            Line::from(Span::styled(
                format!(" {} {}", mark, StatusFilter::entry_label(entry)),
                style,
            ))
        })
        .collect();

    let area = fixed_rect(30, StatusFilter::ENTRIES as u16 + 2, frame.size());
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines)).block(
            Block::default()
                .borders(Borders::ALL)
                .title(Span::styled(" Filter (space toggles) ", ACCENT)),
        ),
        area,
    );
}

fn render_confirm(frame: &mut Frame, confirm: &Confirm) {
    let (title, lines) = match confirm {
        Confirm::Kill { id } => (
            " Kill ",
            vec![
                Line::from(format!("Kill session {}?", id)),
                Line::from(Span::styled("The tmux session and record are removed.", MUTED)),
                Line::from(""),
                Line::from("y kill   n cancel"),
            ],
        ),
        Confirm::Detach { id, clients } => (
            " Detach ",
            vec![
                Line::from(format!("Detach {} client(s) from {}?", clients, id)),
                Line::from(""),
                Line::from("y detach   n cancel"),
            ],
        ),
        Confirm::AttachAttached { id, clients } => (
            " Already attached ",
            vec![
                Line::from(format!("{} has {} attached client(s).", id, clients)),
                Line::from(""),
                Line::from("y take over   f focus the other terminal   n cancel"),
            ],
        ),
    };

    let area = centered_rect(50, 30, frame.size());
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(Span::styled(title, ACCENT)),
            )
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn render_help(frame: &mut Frame) {
    let section = |title: &'static str| Line::from(Span::styled(title, ACCENT));
    let lines = vec![
        section("Navigation"),
        Line::from("  j/k ↑/↓   move"),
        Line::from("  g/G       top / bottom"),
        Line::from("  /         search (enter keeps, esc clears)"),
        Line::from("  f         filter by status"),
        Line::from("  s         cycle sort on the underlined column"),
        Line::from("  ←/→       move the sort column"),
        Line::from(""),
        section("Sessions"),
        Line::from("  enter     attach"),
        Line::from("  n         new session in the current directory"),
        Line::from("  x         kill"),
        Line::from("  d         detach other clients"),
        Line::from("  r         refresh now"),
        Line::from(""),
        Line::from("  ? or F1   toggle this help"),
        Line::from("  q or Esc  quit"),
    ];

    let area = centered_rect(60, 70, frame.size());
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(Span::styled(" Help ", ACCENT)),
            )
            .wrap(Wrap { trim: false }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

/// A `width` x `height` rect centred in `area`, clipped to it.
fn fixed_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
