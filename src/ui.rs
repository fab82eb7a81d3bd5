// 🖥️ Terminal branch browser
//
// Pages through list_branches with the same filters and pagination rules as
// the HTTP API. Keys: ↑/↓ j/k move, n/p page, a show all, / search,
// c clear, Enter details, q quit.

use crate::entities::{non_empty, BranchWithBank};
use crate::error::Result;
use crate::pagination::{window, DEFAULT_PAGE_SIZE};
use crate::query::{catalog_stats, count_branches, list_branches, BranchFilters, CatalogStats};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
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
use std::io;

/// Rows moved by PageUp/PageDown
const JUMP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
}

pub struct App<'a> {
    conn: &'a Connection,
    pub branches: Vec<BranchWithBank>,
    pub state: TableState,
    pub filters: BranchFilters,
    /// 1-based page number
    pub page: i64,
    pub show_all: bool,
    pub total_matching: i64,
    pub stats: CatalogStats,
    pub show_detail: bool,
    pub mode: InputMode,
    pub input: String,
    /// Last storage error, shown in the status bar
    pub message: Option<String>,
}

impl<'a> App<'a> {
    pub fn new(conn: &'a Connection) -> Result<Self> {
        let mut app = App {
            conn,
            branches: Vec::new(),
            state: TableState::default(),
            filters: BranchFilters::default(),
            page: 1,
            show_all: false,
            total_matching: 0,
            stats: catalog_stats(conn)?,
            show_detail: false,
            mode: InputMode::Normal,
            input: String::new(),
            message: None,
        };
        app.reload()?;
        Ok(app)
    }

    /// Re-run the current query (filters + page)
    pub fn reload(&mut self) -> Result<()> {
        let page_size = if self.show_all { 0 } else { DEFAULT_PAGE_SIZE };
        let win = window(Some(self.page), Some(page_size))?;

        self.branches = list_branches(self.conn, &self.filters, win.skip, win.limit)?;
        self.total_matching = count_branches(self.conn, &self.filters)?;
        self.state
            .select(if self.branches.is_empty() { None } else { Some(0) });
        Ok(())
    }

    pub fn total_pages(&self) -> i64 {
        if self.show_all || self.total_matching == 0 {
            1
        } else {
            (self.total_matching + DEFAULT_PAGE_SIZE - 1) / DEFAULT_PAGE_SIZE
        }
    }

    pub fn next_page(&mut self) -> Result<()> {
        if self.show_all || self.page >= self.total_pages() {
            return Ok(());
        }
        self.page += 1;
        self.reload()
    }

    pub fn previous_page(&mut self) -> Result<()> {
        if self.show_all || self.page <= 1 {
            return Ok(());
        }
        self.page -= 1;
        self.reload()
    }

    pub fn toggle_show_all(&mut self) -> Result<()> {
        self.show_all = !self.show_all;
        self.page = 1;
        self.reload()
    }

    pub fn start_search(&mut self) {
        self.mode = InputMode::Search;
        self.input = self.filters.search.clone().unwrap_or_default();
    }

    pub fn cancel_search(&mut self) {
        self.mode = InputMode::Normal;
        self.input.clear();
    }

    pub fn submit_search(&mut self) -> Result<()> {
        self.mode = InputMode::Normal;
        self.filters.search = non_empty(Some(&self.input));
        self.input.clear();
        self.page = 1;
        self.reload()
    }

    pub fn clear_filters(&mut self) -> Result<()> {
        self.filters = BranchFilters::default();
        self.page = 1;
        self.reload()
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn selected_branch(&self) -> Option<&BranchWithBank> {
        self.state.selected().and_then(|i| self.branches.get(i))
    }

    pub fn next(&mut self) {
        let len = self.branches.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.branches.len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.branches.len();
        if len == 0 {
            return;
        }
        let i = self.state.selected().map_or(0, |i| (i + JUMP).min(len - 1));
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        if self.branches.is_empty() {
            return;
        }
        let i = self.state.selected().map_or(0, |i| i.saturating_sub(JUMP));
        self.state.select(Some(i));
    }

    /// Record a failed action instead of tearing down the terminal
    fn report(&mut self, result: Result<()>) {
        self.message = result.err().map(|e| e.to_string());
    }
}

pub fn run_ui(app: &mut App) -> anyhow::Result<()> {
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

    res?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if app.mode == InputMode::Search {
            match key.code {
                KeyCode::Enter => {
                    let result = app.submit_search();
                    app.report(result);
                }
                KeyCode::Esc => app.cancel_search(),
                KeyCode::Backspace => {
                    app.input.pop();
                }
                KeyCode::Char(c) => app.input.push(c),
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
            KeyCode::Enter => app.toggle_detail(),
            KeyCode::Char('/') => app.start_search(),
            KeyCode::Char('n') | KeyCode::Right => {
                let result = app.next_page();
                app.report(result);
            }
            KeyCode::Char('p') | KeyCode::Left => {
                let result = app.previous_page();
                app.report(result);
            }
            KeyCode::Char('a') => {
                let result = app.toggle_show_all();
                app.report(result);
            }
            KeyCode::Char('c') => {
                let result = app.clear_filters();
                app.report(result);
            }
            KeyCode::Down | KeyCode::Char('j') => app.next(),
            KeyCode::Up | KeyCode::Char('k') => app.previous(),
            KeyCode::PageDown => app.page_down(),
            KeyCode::PageUp => app.page_up(),
            KeyCode::Home => app.state.select(Some(0)),
            KeyCode::End => {
                if !app.branches.is_empty() {
                    app.state.select(Some(app.branches.len() - 1));
                }
            }
            _ => {}
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Totals
            Constraint::Min(0),    // Branch table
            Constraint::Length(3), // Status bar / search input
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            "IFSC Catalog",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Banks: {}", app.stats.total_banks),
            Style::default().fg(Color::White),
        ),
        Span::raw("  "),
        Span::styled(
            format!("Branches: {}", app.stats.total_branches),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Matching: {}", app.total_matching),
            Style::default().fg(Color::Green),
        ),
    ];

    if let Some(search) = &app.filters.search {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("Search: {}", search),
            Style::default().fg(Color::Cyan),
        ));
    }

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["IFSC", "Bank", "Branch", "City", "District", "State"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.branches.iter().map(|row| {
        let b = &row.branch;
        let cells = vec![
            Cell::from(b.ifsc.clone()).style(Style::default().fg(Color::Cyan)),
            Cell::from(truncate(row.bank_name().unwrap_or("-"), 28)),
            Cell::from(truncate(b.branch.as_deref().unwrap_or(""), 30)),
            Cell::from(truncate(b.city.as_deref().unwrap_or(""), 18)),
            Cell::from(truncate(b.district.as_deref().unwrap_or(""), 18)),
            Cell::from(truncate(b.state.as_deref().unwrap_or(""), 18)),
        ];
        Row::new(cells).height(1)
    });

    let title = if app.show_all {
        " Branches (all) ".to_string()
    } else {
        format!(" Branches (page {}/{}) ", app.page, app.total_pages())
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(13),
            Constraint::Length(30),
            Constraint::Length(32),
            Constraint::Length(20),
            Constraint::Length(20),
            Constraint::Length(20),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let spans = if app.mode == InputMode::Search {
        vec![
            Span::styled(" Search: ", Style::default().fg(Color::Cyan)),
            Span::raw(app.input.clone()),
            Span::styled("█", Style::default().fg(Color::Yellow)),
            Span::raw("  ("),
            key("Enter"),
            Span::raw(" apply, "),
            key("Esc"),
            Span::raw(" cancel)"),
        ]
    } else if let Some(message) = &app.message {
        vec![Span::styled(format!(" Error: {}", message), Style::default().fg(Color::Red))]
    } else {
        let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
        vec![
            Span::styled(
                format!(" Row: {}/{} ", selected, app.branches.len()),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw(" | "),
            key("n/p"),
            Span::raw(" Page | "),
            key("a"),
            Span::raw(if app.show_all { " Paged | " } else { " All | " }),
            key("/"),
            Span::raw(" Search | "),
            key("c"),
            Span::raw(" Clear | "),
            key("Enter"),
            Span::raw(" Details | "),
            Span::styled("q", Style::default().fg(Color::Red)),
            Span::raw(" Quit"),
        ]
    };

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Branch Details ");

    let Some(row) = app.selected_branch() else {
        f.render_widget(Paragraph::new("No branch selected").block(block), area);
        return;
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let field = |name: &'static str, value: String| {
        vec![
            Line::from(vec![Span::styled(format!("  {}: ", name), label), Span::raw(value)]),
            Line::from(""),
        ]
    };
    let text = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    let b = &row.branch;
    let mut content = vec![Line::from("")];
    content.extend(field("IFSC", b.ifsc.clone()));
    content.extend(field(
        "Bank",
        format!("{} (#{})", row.bank_name().unwrap_or("-"), b.bank_id),
    ));
    content.extend(field("Branch", text(&b.branch)));
    content.extend(field("City", text(&b.city)));
    content.extend(field("District", text(&b.district)));
    content.extend(field("State", text(&b.state)));
    content.push(Line::from(vec![Span::styled("  Address:", label)]));
    content.push(Line::from(vec![
        Span::raw("  "),
        Span::styled(
            wrap_text(&text(&b.address), 35),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ),
    ]));
    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_connection;

    #[test]
    fn test_app_loads_first_page() {
        let conn = seeded_connection();
        let app = App::new(&conn).unwrap();

        assert_eq!(app.branches.len(), 4);
        assert_eq!(app.total_matching, 4);
        assert_eq!(app.stats.total_banks, 3);
        assert_eq!(app.state.selected(), Some(0));
        assert_eq!(app.total_pages(), 1);
    }

    #[test]
    fn test_search_and_clear() {
        let conn = seeded_connection();
        let mut app = App::new(&conn).unwrap();

        app.start_search();
        app.input.push_str("delhi");
        app.submit_search().unwrap();

        assert_eq!(app.mode, InputMode::Normal);
        assert_eq!(app.branches.len(), 1);
        assert_eq!(app.selected_branch().unwrap().branch.ifsc, "SBIN0000002");

        app.clear_filters().unwrap();
        assert_eq!(app.branches.len(), 4);
    }

    #[test]
    fn test_empty_search_is_no_filter() {
        let conn = seeded_connection();
        let mut app = App::new(&conn).unwrap();

        app.start_search();
        app.input.push_str("   ");
        app.submit_search().unwrap();

        assert!(app.filters.search.is_none());
        assert_eq!(app.branches.len(), 4);
    }

    #[test]
    fn test_show_all_and_paging_bounds() {
        let conn = seeded_connection();
        let mut app = App::new(&conn).unwrap();

        app.next_page().unwrap();
        assert_eq!(app.page, 1); // only one page of data

        app.toggle_show_all().unwrap();
        assert!(app.show_all);
        assert_eq!(app.branches.len(), 4);

        app.previous_page().unwrap();
        assert_eq!(app.page, 1);
    }

    #[test]
    fn test_selection_wraps() {
        let conn = seeded_connection();
        let mut app = App::new(&conn).unwrap();

        app.previous();
        assert_eq!(app.state.selected(), Some(3));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
        app.page_down();
        assert_eq!(app.state.selected(), Some(3));
        app.page_up();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_paging_keys_on_empty_results() {
        let conn = seeded_connection();
        let mut app = App::new(&conn).unwrap();

        app.start_search();
        app.input.push_str("no such branch");
        app.submit_search().unwrap();
        assert!(app.branches.is_empty());

        app.page_up();
        assert_eq!(app.state.selected(), None);
        app.page_down();
        assert_eq!(app.state.selected(), None);
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(truncate("MUMBAI", 10), "MUMBAI");
        assert_eq!(truncate("KAMALA MILLS COMPOUND", 10), "KAMALA ...");
        assert_eq!(wrap_text("11 SANSAD MARG NEW DELHI", 10), "11 SANSAD\n  MARG NEW\n  DELHI");
    }
}
