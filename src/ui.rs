use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use sipms::audit::{list_action_logs, ActionLog, ActionLogFilter};
use sipms::entities::{prediction, report, school};
use sipms::{ActionKind, Prediction, PredictionReport, ReportStatus};
use std::collections::HashMap;
use std::io;

const LOG_LIMIT: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Predictions,
    Reports,
    ActionLogs,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Predictions => Page::Reports,
            Page::Reports => Page::ActionLogs,
            Page::ActionLogs => Page::Predictions,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::Predictions => Page::ActionLogs,
            Page::Reports => Page::Predictions,
            Page::ActionLogs => Page::Reports,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Predictions => "Predictions",
            Page::Reports => "Reports",
            Page::ActionLogs => "Action Log",
        }
    }
}

/// Prediction with the school name resolved for display
#[derive(Debug, Clone)]
pub struct PredictionRow {
    pub prediction: Prediction,
    pub school_name: String,
}

pub struct App {
    pub predictions: Vec<PredictionRow>,
    pub reports: Vec<PredictionReport>,
    pub filtered_reports: Vec<PredictionReport>,
    pub report_filter: Option<ReportStatus>,
    pub logs: Vec<ActionLog>,
    pub current_page: Page,
    pub prediction_state: TableState,
    pub report_state: TableState,
    pub log_state: TableState,
    pub show_detail: bool,
}

impl App {
    pub fn load(conn: &Connection) -> sipms::Result<Self> {
        let names: HashMap<i64, String> = school::list_schools(conn)?
            .into_iter()
            .map(|s| (s.id, s.name))
            .collect();

        let predictions = prediction::list_predictions(conn)?
            .into_iter()
            .map(|p| PredictionRow {
                school_name: names
                    .get(&p.school_id)
                    .cloned()
                    .unwrap_or_else(|| format!("#{}", p.school_id)),
                prediction: p,
            })
            .collect();

        let reports = report::list_reports(conn, None)?;
        let logs = list_action_logs(
            conn,
            &ActionLogFilter {
                limit: Some(LOG_LIMIT),
                ..Default::default()
            },
        )?;

        Ok(Self::new(predictions, reports, logs))
    }

    pub fn new(
        predictions: Vec<PredictionRow>,
        reports: Vec<PredictionReport>,
        logs: Vec<ActionLog>,
    ) -> Self {
        let mut app = Self {
            predictions,
            filtered_reports: reports.clone(),
            reports,
            report_filter: None,
            logs,
            current_page: Page::Predictions,
            prediction_state: TableState::default(),
            report_state: TableState::default(),
            log_state: TableState::default(),
            show_detail: false,
        };
        app.prediction_state.select(first(app.predictions.len()));
        app.report_state.select(first(app.filtered_reports.len()));
        app.log_state.select(first(app.logs.len()));
        app
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
    }

    pub fn previous_page(&mut self) {
        self.current_page = self.current_page.previous();
    }

    pub fn selected_prediction(&self) -> Option<&PredictionRow> {
        self.prediction_state
            .selected()
            .and_then(|i| self.predictions.get(i))
    }

    pub fn selected_report(&self) -> Option<&PredictionReport> {
        self.report_state
            .selected()
            .and_then(|i| self.filtered_reports.get(i))
    }

    pub fn filter_reports(&mut self, status: Option<ReportStatus>) {
        self.report_filter = status;
        self.filtered_reports = match status {
            None => self.reports.clone(),
            Some(wanted) => self
                .reports
                .iter()
                .filter(|r| r.status == wanted)
                .cloned()
                .collect(),
        };
        self.report_state.select(first(self.filtered_reports.len()));
    }

    /// Table state and row count of the current page
    fn current(&mut self) -> (&mut TableState, usize) {
        match self.current_page {
            Page::Predictions => (&mut self.prediction_state, self.predictions.len()),
            Page::Reports => (&mut self.report_state, self.filtered_reports.len()),
            Page::ActionLogs => (&mut self.log_state, self.logs.len()),
        }
    }

    pub fn next(&mut self) {
        let (state, len) = self.current();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let (state, len) = self.current();
        if len == 0 {
            return;
        }
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let (state, len) = self.current();
        if len == 0 {
            return;
        }
        let i = state.selected().map_or(0, |i| (i + 20).min(len - 1));
        state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let (state, _) = self.current();
        let i = state.selected().map_or(0, |i| i.saturating_sub(20));
        state.select(Some(i));
    }

    pub fn stats(&self) -> DashboardStats {
        let mut stats = DashboardStats::default();
        for row in &self.predictions {
            let p = &row.prediction;
            stats.rooms_to_build += u64::from(p.rooms_to_build);
            stats.estimated_budget += p.estimated_budget;
            if p.is_fully_approved() {
                stats.fully_approved += 1;
            }
        }
        for r in &self.reports {
            match r.status {
                ReportStatus::Pending => stats.pending_reports += 1,
                ReportStatus::Approved => stats.approved_reports += 1,
                ReportStatus::Denied => stats.denied_reports += 1,
            }
        }
        stats
    }
}

fn first(len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(0)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct DashboardStats {
    pub rooms_to_build: u64,
    pub estimated_budget: i64,
    pub fully_approved: usize,
    pub pending_reports: usize,
    pub approved_reports: usize,
    pub denied_reports: usize,
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => {
                    if key.modifiers.contains(KeyModifiers::SHIFT) {
                        app.previous_page();
                    } else {
                        app.next_page();
                    }
                }
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('1') if app.current_page == Page::Reports => {
                    app.filter_reports(Some(ReportStatus::Pending))
                }
                KeyCode::Char('2') if app.current_page == Page::Reports => {
                    app.filter_reports(Some(ReportStatus::Approved))
                }
                KeyCode::Char('3') if app.current_page == Page::Reports => {
                    app.filter_reports(Some(ReportStatus::Denied))
                }
                KeyCode::Char('c') => app.filter_reports(None),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::PageDown => app.page_down(),
                KeyCode::PageUp => app.page_up(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let detail_page = matches!(app.current_page, Page::Predictions | Page::Reports);
    let content = if app.show_detail && detail_page {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        render_detail_panel(f, split[1], app);
        split[0]
    } else {
        chunks[1]
    };

    match app.current_page {
        Page::Predictions => render_predictions(f, content, app),
        Page::Reports => render_reports(f, content, app),
        Page::ActionLogs => render_action_logs(f, content, app),
    }

    render_status_bar(f, chunks[2], app);
}

fn header_style() -> Style {
    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
}

fn label_style() -> Style {
    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    Row::new(titles.iter().map(|h| Cell::from(*h).style(header_style())))
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn status_color(status: ReportStatus) -> Color {
    match status {
        ReportStatus::Pending => Color::Yellow,
        ReportStatus::Approved => Color::Green,
        ReportStatus::Denied => Color::Red,
    }
}

fn action_color(action: ActionKind) -> Color {
    match action {
        ActionKind::Create | ActionKind::Upload => Color::Green,
        ActionKind::Update | ActionKind::Send => Color::Cyan,
        ActionKind::Delete | ActionKind::Deny => Color::Red,
        ActionKind::Approve => Color::Yellow,
        ActionKind::Other | ActionKind::Login => Color::White,
    }
}

fn yes_no(flag: bool) -> Span<'static> {
    if flag {
        Span::styled("yes", Style::default().fg(Color::Green))
    } else {
        Span::styled("no", Style::default().fg(Color::DarkGray))
    }
}

/// Thousands separators for RWF amounts
fn format_rwf(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if amount < 0 {
        format!("-{} RWF", out)
    } else {
        format!("{} RWF", out)
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let stats = app.stats();

    let mut spans = vec![];
    for (i, page) in [Page::Predictions, Page::Reports, Page::ActionLogs].iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(" │ "));
        }
        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(page.title().to_string(), style));
    }

    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("Rooms: {}", stats.rooms_to_build),
        Style::default().fg(Color::White),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format_rwf(stats.estimated_budget),
        Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::raw("  |  "));
    spans.push(Span::styled(
        format!("⏳ {}", stats.pending_reports),
        Style::default().fg(Color::Yellow),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("✓ {}", stats.approved_reports),
        Style::default().fg(Color::Green),
    ));
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        format!("✗ {}", stats.denied_reports),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(" SIPMS "),
    );
    f.render_widget(header, area);
}

fn render_predictions(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.predictions.iter().map(|row| {
        let p = &row.prediction;
        Row::new(vec![
            Cell::from(p.id.to_string()),
            Cell::from(truncate(&row.school_name, 28)),
            Cell::from(p.required_rooms.to_string()),
            Cell::from(p.rooms_to_build.to_string()),
            Cell::from(format_rwf(p.estimated_budget)),
            Cell::from(yes_no(p.approved_by_district)),
            Cell::from(yes_no(p.approved_by_mineduc)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(30),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(18),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(header_row(&["ID", "School", "Required", "To build", "Budget", "District", "MINEDUC"]))
    .block(Block::default().borders(Borders::ALL).title(" Predictions "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.prediction_state);
}

fn render_reports(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.filtered_reports.iter().map(|r| {
        Row::new(vec![
            Cell::from(r.id.to_string()),
            Cell::from(truncate(&r.location, 20)),
            Cell::from(truncate(&r.document_name, 28)),
            Cell::from(r.status.as_str()).style(Style::default().fg(status_color(r.status))),
            Cell::from(yes_no(r.is_sent_to_mineduc)),
            Cell::from(r.created_at.format("%Y-%m-%d").to_string()),
        ])
    });

    let title = match app.report_filter {
        Some(status) => format!(" Reports ({}) ", status),
        None => " Reports ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(22),
            Constraint::Length(30),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Length(12),
        ],
    )
    .header(header_row(&["ID", "Location", "Document", "Status", "Sent", "Created"]))
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.report_state);
}

fn render_action_logs(f: &mut Frame, area: Rect, app: &mut App) {
    let rows = app.logs.iter().map(|log| {
        let target = match log.object_id {
            Some(id) => format!("{} #{}", log.model_name, id),
            None => log.model_name.clone(),
        };
        Row::new(vec![
            Cell::from(log.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::from(log.username.clone().unwrap_or_else(|| "-".to_string())),
            Cell::from(log.action.as_str()).style(Style::default().fg(action_color(log.action))),
            Cell::from(truncate(&target, 30)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(20),
            Constraint::Length(9),
            Constraint::Min(20),
        ],
    )
    .header(header_row(&["Timestamp", "User", "Action", "Target"]))
    .block(Block::default().borders(Borders::ALL).title(" Action Log "))
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.log_state);
}

fn field<'a>(label: &'a str, value: impl Into<Span<'a>>) -> Line<'a> {
    Line::from(vec![Span::styled(format!("  {}: ", label), label_style()), value.into()])
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let (title, content) = match app.current_page {
        Page::Predictions => match app.selected_prediction() {
            Some(row) => {
                let p = &row.prediction;
                (
                    " Prediction Details ",
                    vec![
                        Line::from(""),
                        field("School", Span::raw(row.school_name.clone())),
                        field("Required rooms", Span::raw(p.required_rooms.to_string())),
                        field("Rooms to build", Span::raw(p.rooms_to_build.to_string())),
                        field("Budget", Span::raw(format_rwf(p.estimated_budget))),
                        Line::from(""),
                        field("District approval", yes_no(p.approved_by_district)),
                        field("MINEDUC approval", yes_no(p.approved_by_mineduc)),
                        field("Created", Span::raw(p.created_at.to_rfc3339())),
                    ],
                )
            }
            None => (" Prediction Details ", vec![Line::from("No prediction selected")]),
        },
        _ => match app.selected_report() {
            Some(r) => {
                let mut lines = vec![
                    Line::from(""),
                    field("Location", Span::raw(r.location.clone())),
                    field("Document", Span::raw(r.document_name.clone())),
                    field("Size", Span::raw(format!("{} bytes", r.document_size))),
                    field("SHA-256", Span::raw(truncate(&r.document_sha256, 20))),
                    Line::from(""),
                    field(
                        "Status",
                        Span::styled(r.status.as_str(), Style::default().fg(status_color(r.status))),
                    ),
                    field("Sent to MINEDUC", yes_no(r.is_sent_to_mineduc)),
                ];
                if let Some(at) = r.approved_at {
                    lines.push(field("Approved at", Span::raw(at.to_rfc3339())));
                }
                if let Some(reason) = &r.denial_reason {
                    lines.push(field("Denial reason", Span::raw(reason.clone())));
                }
                (" Report Details ", lines)
            }
            None => (" Report Details ", vec![Line::from("No report selected")]),
        },
    };

    let panel = Paragraph::new(content).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(title),
    );
    f.render_widget(panel, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (selected, total) = match app.current_page {
        Page::Predictions => (app.prediction_state.selected(), app.predictions.len()),
        Page::Reports => (app.report_state.selected(), app.filtered_reports.len()),
        Page::ActionLogs => (app.log_state.selected(), app.logs.len()),
    };
    let key = Style::default().fg(Color::Yellow);

    let mut spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected.map_or(0, |i| i + 1), total),
        Style::default().fg(Color::Cyan),
    )];

    if app.current_page == Page::Reports {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled("1/2/3", key));
        spans.push(Span::raw(" pending/approved/denied "));
        spans.push(Span::styled("c", key));
        spans.push(Span::raw(" clear"));
    }

    spans.push(Span::raw(" | "));
    spans.push(Span::styled("Enter", key));
    spans.push(Span::raw(" Details | "));
    spans.push(Span::styled("Tab", key));
    spans.push(Span::raw(" Page | "));
    spans.push(Span::styled("↑/↓", key));
    spans.push(Span::raw(" Nav | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let bar = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn report(id: i64, status: ReportStatus) -> PredictionReport {
        PredictionReport {
            id,
            location: "Gasabo".to_string(),
            document: format!("prediction_reports/{}.pdf", id),
            document_name: "plan.pdf".to_string(),
            document_size: 10,
            document_sha256: "00".to_string(),
            is_sent_to_mineduc: false,
            status,
            denial_reason: None,
            approved_at: None,
            created_by: 1,
            created_at: Utc::now(),
        }
    }

    fn app() -> App {
        App::new(
            Vec::new(),
            vec![
                report(1, ReportStatus::Pending),
                report(2, ReportStatus::Approved),
                report(3, ReportStatus::Pending),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_status_filter() {
        let mut app = app();
        app.filter_reports(Some(ReportStatus::Pending));
        assert_eq!(app.filtered_reports.len(), 2);
        assert_eq!(app.report_state.selected(), Some(0));

        app.filter_reports(Some(ReportStatus::Denied));
        assert!(app.filtered_reports.is_empty());
        assert_eq!(app.report_state.selected(), None);

        app.filter_reports(None);
        assert_eq!(app.filtered_reports.len(), 3);
    }

    #[test]
    fn test_navigation_wraps_per_page() {
        let mut app = app();
        app.current_page = Page::Reports;
        app.previous();
        assert_eq!(app.report_state.selected(), Some(2));
        app.next();
        assert_eq!(app.report_state.selected(), Some(0));

        // Empty page is a no-op
        app.current_page = Page::Predictions;
        app.next();
        assert_eq!(app.prediction_state.selected(), None);
    }

    #[test]
    fn test_stats_and_formatting() {
        let stats = app().stats();
        assert_eq!(stats.pending_reports, 2);
        assert_eq!(stats.approved_reports, 1);
        assert_eq!(format_rwf(10_000_000), "10,000,000 RWF");
        assert_eq!(format_rwf(500), "500 RWF");
        assert_eq!(truncate("Groupe Scolaire Kimironko", 10), "Groupe ...");
    }
}
