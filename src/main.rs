use std::io;
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Local};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use fpl_ticker::config::{TickerConfig, load_dotenv};
use fpl_ticker::difficulty::{SLIDER_MAX, SLIDER_MIN, Venue};
use fpl_ticker::feed::spawn_provider;
use fpl_ticker::logging;
use fpl_ticker::state::{AppState, Delta, ProviderCommand, Screen, apply_delta};
use fpl_ticker::store::{FileStore, KeyValueStore, MemoryStore};
use fpl_ticker::ticker::ColorDomain;

const TEAM_COL: u16 = 6;
const GW_COL: u16 = 10;

struct App {
    state: AppState,
    cfg: TickerConfig,
    should_quit: bool,
    cmd_tx: Option<mpsc::Sender<ProviderCommand>>,
}

impl App {
    fn new(cfg: TickerConfig, cmd_tx: Option<mpsc::Sender<ProviderCommand>>) -> Self {
        let store: Box<dyn KeyValueStore> = match &cfg.store_path {
            Some(path) => Box::new(FileStore::new(path)),
            None => Box::new(MemoryStore::new()),
        };
        let mut state = AppState::new(store, cfg.store_key.clone());
        if cfg.store_path.is_none() {
            state.push_log("[WARN] No cache directory; difficulties last for this session only");
        }
        Self {
            state,
            cfg,
            should_quit: false,
            cmd_tx,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.state.edit_buffer.is_some() {
            match key.code {
                KeyCode::Enter => self.state.commit_edit(),
                KeyCode::Esc => self.state.cancel_edit(),
                KeyCode::Backspace => self.state.edit_backspace(),
                KeyCode::Char(c) => self.state.edit_push(c),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Char('e') | KeyCode::Tab => self.state.toggle_editor(),
            KeyCode::Esc | KeyCode::Char('b') => self.state.screen = Screen::Ticker,
            KeyCode::Char('j') | KeyCode::Down => self.state.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.state.select_prev(),
            KeyCode::Char('r') => self.request_data(true),
            KeyCode::Char('i') => {
                let path = self.cfg.import_path.clone();
                self.state.import_from(&path);
            }
            KeyCode::Char('o') => {
                let dir = self.cfg.export_dir.clone();
                self.state.export_difficulties_to(&dir);
            }
            KeyCode::Char('s') => {
                let dir = self.cfg.export_dir.clone();
                self.state.export_sorted_to(&dir);
            }
            _ => match self.state.screen {
                Screen::Ticker => self.on_ticker_key(key),
                Screen::Editor => self.on_editor_key(key),
            },
        }
    }

    fn on_ticker_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('[') => self.state.shift_range(-1, 0),
            KeyCode::Char(']') => self.state.shift_range(1, 0),
            KeyCode::Char('{') => self.state.shift_range(0, -1),
            KeyCode::Char('}') => self.state.shift_range(0, 1),
            KeyCode::Char('x') => self.state.cycle_excluded(),
            KeyCode::Char('h') | KeyCode::Left => self.state.scroll_grid(-1),
            KeyCode::Char('l') | KeyCode::Right => self.state.scroll_grid(1),
            _ => {}
        }
    }

    fn on_editor_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('l') | KeyCode::Right => {
                self.state.toggle_editor_venue()
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.state.nudge_selected(1),
            KeyCode::Char('-') => self.state.nudge_selected(-1),
            KeyCode::Char('a') => self.state.apply_sliders(),
            KeyCode::Enter => self.state.begin_edit(),
            _ => {}
        }
    }

    fn request_data(&mut self, announce: bool) {
        let Some(tx) = &self.cmd_tx else {
            if announce {
                self.state.push_log("[INFO] Data fetch unavailable");
            }
            return;
        };
        if tx.send(ProviderCommand::FetchData).is_err() {
            self.state.push_log("[WARN] Data request failed");
        } else if announce {
            self.state.loading = self.state.session.is_none();
            self.state.push_log("[INFO] Data request sent");
        }
    }
}

fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cfg = TickerConfig::from_env();
    let log_result = cfg.log_path.as_deref().map(logging::init_file);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    spawn_provider(cfg.clone(), tx, cmd_rx);

    let mut app = App::new(cfg, Some(cmd_tx));
    if let Some(Err(err)) = log_result {
        app.state.push_log(format!("[WARN] File logging disabled: {err:#}"));
    }
    app.state.push_log("[INFO] Loading FPL fixtures");
    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(delta) = rx.try_recv() {
            apply_delta(&mut app.state, delta);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(4),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(&app.state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let state = &app.state;
    if let Some(message) = &state.unavailable {
        let body = Paragraph::new(format!("{message}\n\nPress r to retry."))
            .style(Style::default().fg(Color::Red));
        frame.render_widget(body, chunks[1]);
    } else if state.session.is_none() {
        let body = Paragraph::new("Loading FPL fixtures...")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(body, chunks[1]);
    } else {
        match state.screen {
            Screen::Ticker => render_ticker(frame, chunks[1], state),
            Screen::Editor => render_editor(frame, chunks[1], state),
        }
    }

    let console = Paragraph::new(console_text(state))
        .block(Block::default().title("Console").borders(Borders::TOP));
    frame.render_widget(console, chunks[2]);

    let footer = Paragraph::new(footer_text(state)).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(footer, chunks[3]);

    if state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &AppState) -> String {
    let range = match &state.session {
        Some(session) => {
            let w = session.window();
            let excluded = w
                .excluded()
                .map(|gw| format!("GW{gw}"))
                .unwrap_or_else(|| "None".to_string());
            format!("GW{} → GW{} | Exclude: {excluded}", w.start(), w.end())
        }
        None => "no data".to_string(),
    };
    let fetched = state
        .data_fetched_at
        .map(|at| {
            let suffix = if state.data_cached { " (cached)" } else { "" };
            format!("Data {}{suffix}", format_time(at))
        })
        .unwrap_or_else(|| "Data pending".to_string());
    let screen = match state.screen {
        Screen::Ticker => "TICKER",
        Screen::Editor => "DIFFICULTY EDITOR",
    };
    format!("FPL FIXTURE {screen} | {range}\n{fetched}")
}

fn footer_text(state: &AppState) -> String {
    if state.edit_buffer.is_some() {
        return "Type value | Enter Save | Esc Cancel".to_string();
    }
    match state.screen {
        Screen::Ticker => {
            "[ ] Start | { } End | x Exclude | h/l Scroll | e Editor | i Import | o/s Export | r Refresh | ? Help | q Quit".to_string()
        }
        Screen::Editor => {
            "j/k Team | h/l Home/Away | +/- Slider | a Apply | Enter Edit | b Back | i Import | o Export | ? Help | q Quit".to_string()
        }
    }
}

fn render_ticker(frame: &mut Frame, area: Rect, state: &AppState) {
    let (Some(session), Some(_)) = (&state.session, &state.output) else {
        return;
    };

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);
    let title = Paragraph::new(session.window().title())
        .style(Style::default().add_modifier(Modifier::BOLD));
    frame.render_widget(title, sections[0]);

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(46), Constraint::Min(10)])
        .split(sections[1]);

    render_sorted_table(frame, panes[0], state);
    render_grid(frame, panes[1], state);
}

fn sorted_columns() -> [Constraint; 5] {
    [
        Constraint::Length(5),
        Constraint::Length(16),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(7),
    ]
}

fn render_sorted_table(frame: &mut Frame, area: Rect, state: &AppState) {
    let Some(output) = &state.output else {
        return;
    };
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);
    let widths = sorted_columns();

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(widths)
        .split(sections[0]);
    let bold = Style::default().add_modifier(Modifier::BOLD);
    for (i, label) in ["Team", "Name", "Total", "Avg", "Matches"].iter().enumerate() {
        render_cell_text(frame, cols[i], label, bold);
    }

    let list_area = sections[1];
    let visible = list_area.height as usize;
    let (start, end) = visible_range(state.selected, output.stats.len(), visible);
    for (i, idx) in (start..end).enumerate() {
        let row_area = Rect {
            x: list_area.x,
            y: list_area.y + i as u16,
            width: list_area.width,
            height: 1,
        };
        let style = if idx == state.selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            Style::default()
        };
        if idx == state.selected {
            frame.render_widget(Block::default().style(style), row_area);
        }
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(widths)
            .split(row_area);
        let stat = &output.stats[idx];
        render_cell_text(frame, cols[0], &stat.team, style);
        render_cell_text(frame, cols[1], &stat.name, style);
        render_cell_text(frame, cols[2], &format_number(stat.total), style);
        render_cell_text(frame, cols[3], &format!("{:.1}", stat.avg), style);
        render_cell_text(frame, cols[4], &stat.matches.to_string(), style);
    }
}

fn render_grid(frame: &mut Frame, area: Rect, state: &AppState) {
    let Some(output) = &state.output else {
        return;
    };
    let grid = &output.grid;
    if area.width <= TEAM_COL || area.height < 2 {
        return;
    }
    let fit = ((area.width - TEAM_COL) / GW_COL).max(1) as usize;
    let first = state.grid_offset.min(grid.gameweeks.len().saturating_sub(1));
    let last = (first + fit).min(grid.gameweeks.len());
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let grey = Style::default().fg(Color::Gray).bg(Color::DarkGray);

    for (col, gw) in grid.gameweeks[first..last].iter().enumerate() {
        let cell_area = Rect {
            x: area.x + TEAM_COL + col as u16 * GW_COL,
            y: area.y,
            width: GW_COL,
            height: 1,
        };
        let style = if grid.is_excluded(*gw) { grey } else { bold };
        render_cell_text(frame, cell_area, &format!("GW{gw}"), style);
    }

    let visible = (area.height - 1) as usize;
    let (start, end) = visible_range(state.selected, grid.rows.len(), visible);
    for (i, idx) in (start..end).enumerate() {
        let row = &grid.rows[idx];
        let y = area.y + 1 + i as u16;
        let team_style = if idx == state.selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            bold
        };
        let team_area = Rect {
            x: area.x,
            y,
            width: TEAM_COL,
            height: 1,
        };
        render_cell_text(frame, team_area, &row.team, team_style);

        for (col, (gw, cell)) in grid
            .gameweeks
            .iter()
            .zip(&row.cells)
            .skip(first)
            .take(last - first)
            .enumerate()
        {
            let cell_area = Rect {
                x: area.x + TEAM_COL + col as u16 * GW_COL,
                y,
                width: GW_COL - 1,
                height: 1,
            };
            let style = if grid.is_excluded(*gw) {
                grey
            } else {
                match cell.value {
                    Some(v) => Style::default()
                        .fg(Color::Black)
                        .bg(difficulty_color(&grid.domain, v)),
                    None => Style::default(),
                }
            };
            if style != Style::default() {
                frame.render_widget(Block::default().style(style), cell_area);
            }
            render_cell_text(frame, cell_area, &cell.label, style);
        }
    }
}

/// Green for easy, yellow mid-table, red for the hardest opposition.
fn difficulty_color(domain: &ColorDomain, value: f64) -> Color {
    const GREEN: (f64, f64, f64) = (26.0, 152.0, 80.0);
    const YELLOW: (f64, f64, f64) = (255.0, 255.0, 191.0);
    const RED: (f64, f64, f64) = (215.0, 48.0, 39.0);

    let t = domain.normalize(value);
    let (from, to, local) = if t < 0.5 {
        (GREEN, YELLOW, t * 2.0)
    } else {
        (YELLOW, RED, (t - 0.5) * 2.0)
    };
    let mix = |a: f64, b: f64| (a + (b - a) * local).round() as u8;
    Color::Rgb(mix(from.0, to.0), mix(from.1, to.1), mix(from.2, to.2))
}

fn editor_columns() -> [Constraint; 6] {
    [
        Constraint::Length(5),
        Constraint::Length(18),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(24),
        Constraint::Length(24),
    ]
}

fn render_editor(frame: &mut Frame, area: Rect, state: &AppState) {
    let Some(session) = &state.session else {
        return;
    };
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);
    let widths = editor_columns();
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(widths)
        .split(sections[0]);
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let venues = [Venue::Home, Venue::Away];
    let headers = ["Team".to_string(), "Name".to_string()]
        .into_iter()
        .chain(venues.iter().map(|v| v.label().to_string()))
        .chain(venues.iter().map(|v| format!("Slider {}", v.label())));
    for (i, label) in headers.enumerate() {
        render_cell_text(frame, cols[i], &label, bold);
    }

    let teams = session.team_codes();
    let list_area = sections[1];
    let (start, end) = visible_range(
        state.editor_selected,
        teams.len(),
        list_area.height as usize,
    );
    for (i, idx) in (start..end).enumerate() {
        let code = &teams[idx];
        let row_area = Rect {
            x: list_area.x,
            y: list_area.y + i as u16,
            width: list_area.width,
            height: 1,
        };
        let selected = idx == state.editor_selected;
        let row_style = if selected {
            Style::default().fg(Color::White).bg(Color::DarkGray)
        } else {
            Style::default()
        };
        if selected {
            frame.render_widget(Block::default().style(row_style), row_area);
        }
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(widths)
            .split(row_area);

        let row = session.difficulties().get(code).copied().unwrap_or_default();
        let slider = session.slider(code);
        render_cell_text(frame, cols[0], code, row_style);
        render_cell_text(frame, cols[1], &session.data().full_name(code), row_style);

        for (offset, venue) in [Venue::Home, Venue::Away].into_iter().enumerate() {
            let focused = selected && state.editor_venue == venue;
            let style = if focused {
                row_style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                row_style
            };
            let text = match (&state.edit_buffer, focused) {
                (Some(buf), true) => format!("{buf}_"),
                _ => row.get(venue).map(format_number).unwrap_or_default(),
            };
            render_cell_text(frame, cols[2 + offset], &text, style);

            let gauge = slider
                .map(|pair| slider_text(pair.get(venue)))
                .unwrap_or_default();
            render_cell_text(frame, cols[4 + offset], &gauge, style);
        }
    }
}

fn slider_text(value: u32) -> String {
    const WIDTH: u32 = 12;
    let filled = ((value.saturating_sub(SLIDER_MIN)) * WIDTH) / (SLIDER_MAX - SLIDER_MIN);
    let bar: String = (0..WIDTH)
        .map(|i| if i < filled { '■' } else { '·' })
        .collect();
    format!("{value:>4} {bar}")
}

fn render_cell_text(frame: &mut Frame, area: Rect, text: &str, style: Style) {
    let text_area = Rect {
        x: area.x,
        y: area.y + (area.height / 2),
        width: area.width,
        height: 1,
    };
    let paragraph = Paragraph::new(text).style(style);
    frame.render_widget(paragraph, text_area);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No alerts yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value:.1}")
    }
}

fn format_time(at: SystemTime) -> String {
    DateTime::<Local>::from(at).format("%H:%M").to_string()
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 70, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "FPL Fixture Ticker - Help",
        "",
        "Global:",
        "  e / Tab      Toggle difficulty editor",
        "  i            Import saved_difficulties.csv",
        "  o            Export difficulties CSV",
        "  s            Export sorted table CSV",
        "  r            Refresh FPL data",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Ticker:",
        "  [ / ]        Range start -/+",
        "  { / }        Range end -/+",
        "  x            Cycle excluded gameweek",
        "  j/k or ↑/↓   Move selection",
        "  h/l or ←/→   Scroll gameweeks",
        "",
        "Editor:",
        "  h/l          Home / Away column",
        "  + / -        Move slider by 50",
        "  a            Apply sliders to all teams",
        "  Enter        Type a value directly",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
