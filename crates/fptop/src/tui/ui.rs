//! Draw functions: tab bar, version header, per-tab table, key hints.

use crate::dashboard::Tab;
use crate::tui::app::App;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs},
};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // tab bar
            Constraint::Length(2), // version header
            Constraint::Min(5),    // table
            Constraint::Length(1), // key hints
        ])
        .split(frame.area());

    draw_tab_bar(frame, app, chunks[0]);
    draw_version(frame, app, chunks[1]);
    draw_table(frame, app, chunks[2]);
    draw_footer(frame, app, chunks[3]);
}

fn draw_tab_bar(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = Tab::ALL
        .iter()
        .enumerate()
        .map(|(i, tab)| Line::from(format!("{} {}", i + 1, tab.title())))
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.active_tab.index())
        .style(Style::default().fg(Color::Gray))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn draw_version(frame: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = app.version.lines().map(Line::from).collect();
    let header = Paragraph::new(lines).style(Style::default().fg(Color::Cyan));
    frame.render_widget(header, area);
}

fn draw_table(frame: &mut Frame, app: &App, area: Rect) {
    let view = app.view(app.active_tab);

    let header = Row::new(
        headers(app.active_tab)
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().add_modifier(Modifier::BOLD))),
    )
    .height(1);

    let visible = area.height.saturating_sub(3) as usize;
    let rows: Vec<Row> = view
        .rows
        .iter()
        .skip(view.offset)
        .take(visible)
        .map(|cells| Row::new(cells.iter().cloned().map(Cell::from)))
        .collect();

    let table = Table::new(rows, widths(app.active_tab))
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(
                    " {} ({} rows) ",
                    app.active_tab.title(),
                    view.rows.len()
                ))
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .column_spacing(1);
    frame.render_widget(table, area);
}

fn draw_footer(frame: &mut Frame, app: &App, area: Rect) {
    let sort_hint = match app.sort_field_name() {
        Some(field) => format!("s sort [{field}]  ←/→ field  c clear  "),
        None => String::new(),
    };
    let footer = Paragraph::new(format!(
        " Tab/1-5 switch  ↑/↓ scroll  {sort_hint}q quit"
    ))
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, area);
}

fn headers(tab: Tab) -> &'static [&'static str] {
    match tab {
        Tab::Interfaces => &[
            "Name",
            "Idx",
            "State",
            "MTU(L3/IP4/IP6/MPLS)",
            "RxCounters",
            "RxCount",
            "TxCounters",
            "TxCount",
            "Drops",
            "Punts",
            "IP4",
            "IP6",
        ],
        Tab::Nodes => &[
            "NodeName",
            "NodeIndex",
            "Clocks",
            "Vectors",
            "Calls",
            "Suspends",
            "Vectors/Calls",
        ],
        Tab::Errors => &["Counter", "Node", "Reason"],
        Tab::Memory => &["Thread/ID/Name", "Current memory usage per Thread"],
        Tab::Threads => &["ID", "Name", "Type", "PID", "CPUID", "Core", "CPUSocket"],
    }
}

fn widths(tab: Tab) -> Vec<Constraint> {
    match tab {
        Tab::Interfaces => vec![
            Constraint::Length(24),
            Constraint::Length(5),
            Constraint::Length(5),
            Constraint::Length(20),
            Constraint::Length(10),
            Constraint::Length(16),
            Constraint::Length(11),
            Constraint::Length(16),
            Constraint::Length(11),
            Constraint::Length(11),
            Constraint::Length(11),
            Constraint::Min(4),
        ],
        Tab::Nodes => vec![
            Constraint::Length(50),
            Constraint::Length(10),
            Constraint::Fill(1),
            Constraint::Fill(1),
            Constraint::Fill(1),
            Constraint::Fill(1),
            Constraint::Length(22),
        ],
        Tab::Errors => vec![
            Constraint::Length(16),
            Constraint::Fill(1),
            Constraint::Fill(2),
        ],
        Tab::Memory => vec![Constraint::Length(30), Constraint::Fill(1)],
        Tab::Threads => vec![
            Constraint::Length(6),
            Constraint::Fill(1),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Length(8),
            Constraint::Length(6),
            Constraint::Length(10),
        ],
    }
}
