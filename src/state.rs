use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::difficulty::{SLIDER_STEP, Venue, parse_score};
use crate::fpl_fetch::{FplData, UNAVAILABLE_MESSAGE};
use crate::session::{MapOrigin, TickerSession};
use crate::store::KeyValueStore;
use crate::ticker::TickerOutput;

pub const DIFFICULTIES_FILE: &str = "saved_difficulties.csv";
pub const SORTED_FILE: &str = "sorted_ticker.csv";

const MAX_LOGS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Ticker,
    Editor,
}

#[derive(Debug, Clone)]
pub enum Delta {
    SetData {
        data: FplData,
        fetched_at: SystemTime,
        cached: bool,
    },
    Log(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCommand {
    FetchData,
}

pub struct AppState {
    pub screen: Screen,
    pub session: Option<TickerSession>,
    pub output: Option<TickerOutput>,
    pub loading: bool,
    pub unavailable: Option<String>,
    pub data_fetched_at: Option<SystemTime>,
    pub data_cached: bool,
    pub selected: usize,
    pub grid_offset: usize,
    pub editor_selected: usize,
    pub editor_venue: Venue,
    pub edit_buffer: Option<String>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
    last_missing_notice: Option<String>,
    pending_store: Option<Box<dyn KeyValueStore>>,
    store_key: String,
}

impl AppState {
    pub fn new(store: Box<dyn KeyValueStore>, store_key: impl Into<String>) -> Self {
        Self {
            screen: Screen::Ticker,
            session: None,
            output: None,
            loading: true,
            unavailable: None,
            data_fetched_at: None,
            data_cached: false,
            selected: 0,
            grid_offset: 0,
            editor_selected: 0,
            editor_venue: Venue::Home,
            edit_buffer: None,
            logs: VecDeque::with_capacity(MAX_LOGS),
            help_overlay: false,
            last_missing_notice: None,
            pending_store: Some(store),
            store_key: store_key.into(),
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn recompute(&mut self) {
        let Some(session) = &self.session else {
            self.output = None;
            return;
        };
        let output = session.compute();
        let notice = output.missing_notice();
        if notice.is_some() && notice != self.last_missing_notice {
            if let Some(text) = &notice {
                self.push_log(format!("[WARN] {text}"));
            }
        }
        self.last_missing_notice = notice;
        self.output = Some(output);
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let rows = self.output.as_ref().map(|o| o.stats.len()).unwrap_or(0);
        self.selected = self.selected.min(rows.saturating_sub(1));
        let teams = self
            .session
            .as_ref()
            .map(|s| s.team_codes().len())
            .unwrap_or(0);
        self.editor_selected = self.editor_selected.min(teams.saturating_sub(1));
        let cols = self
            .output
            .as_ref()
            .map(|o| o.grid.gameweeks.len())
            .unwrap_or(0);
        self.grid_offset = self.grid_offset.min(cols.saturating_sub(1));
    }

    pub fn select_next(&mut self) {
        match self.screen {
            Screen::Ticker => {
                let rows = self.output.as_ref().map(|o| o.stats.len()).unwrap_or(0);
                if rows > 0 {
                    self.selected = (self.selected + 1).min(rows - 1);
                }
            }
            Screen::Editor => {
                if self.edit_buffer.is_some() {
                    return;
                }
                let teams = self.editor_teams().len();
                if teams > 0 {
                    self.editor_selected = (self.editor_selected + 1).min(teams - 1);
                }
            }
        }
    }

    pub fn select_prev(&mut self) {
        match self.screen {
            Screen::Ticker => self.selected = self.selected.saturating_sub(1),
            Screen::Editor => {
                if self.edit_buffer.is_none() {
                    self.editor_selected = self.editor_selected.saturating_sub(1);
                }
            }
        }
    }

    pub fn scroll_grid(&mut self, delta: i32) {
        let cols = self
            .output
            .as_ref()
            .map(|o| o.grid.gameweeks.len())
            .unwrap_or(0);
        let next = (self.grid_offset as i64 + i64::from(delta)).max(0) as usize;
        self.grid_offset = next.min(cols.saturating_sub(1));
    }

    pub fn toggle_editor(&mut self) {
        self.edit_buffer = None;
        self.screen = match self.screen {
            Screen::Ticker => Screen::Editor,
            Screen::Editor => Screen::Ticker,
        };
    }

    pub fn editor_teams(&self) -> Vec<String> {
        self.session
            .as_ref()
            .map(|s| s.team_codes().to_vec())
            .unwrap_or_default()
    }

    pub fn editor_team(&self) -> Option<String> {
        self.editor_teams().get(self.editor_selected).cloned()
    }

    pub fn toggle_editor_venue(&mut self) {
        if self.edit_buffer.is_none() {
            self.editor_venue = self.editor_venue.other();
        }
    }

    /// Shifts the start and end of the range independently.
    pub fn shift_range(&mut self, start_delta: i32, end_delta: i32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let window = *session.window();
        let start = offset(window.start(), start_delta);
        let end = offset(window.end(), end_delta).max(start);
        match session.set_range(start, end) {
            Ok(()) => self.recompute(),
            Err(err) => self.push_log(format!("[WARN] {err}")),
        }
    }

    pub fn cycle_excluded(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match session.cycle_excluded() {
            Ok(Some(gw)) => self.push_log(format!(
                "[INFO] GW{gw} will be excluded from totals/avg calculations (it will remain visible in the grid)."
            )),
            Ok(None) => self.push_log("[INFO] No gameweek excluded"),
            Err(err) => self.push_log(format!("[WARN] {err}")),
        }
        self.recompute();
    }

    pub fn nudge_selected(&mut self, steps: i32) {
        let Some(team) = self.editor_team() else {
            return;
        };
        let venue = self.editor_venue;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.nudge_slider(&team, venue, steps * SLIDER_STEP as i32);
    }

    pub fn apply_sliders(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = session.apply_sliders();
        self.log_save(result, "Failed to apply/save sliders");
        self.recompute();
    }

    pub fn begin_edit(&mut self) {
        let Some(team) = self.editor_team() else {
            return;
        };
        let current = self
            .session
            .as_ref()
            .and_then(|s| s.difficulties().get(&team).copied())
            .and_then(|row| row.get(self.editor_venue))
            .map(|v| v.to_string())
            .unwrap_or_default();
        self.edit_buffer = Some(current);
    }

    pub fn edit_push(&mut self, c: char) {
        if let Some(buf) = self.edit_buffer.as_mut() {
            if c.is_ascii_digit() || c == '.' || c == '-' {
                buf.push(c);
            }
        }
    }

    pub fn edit_backspace(&mut self) {
        if let Some(buf) = self.edit_buffer.as_mut() {
            buf.pop();
        }
    }

    pub fn cancel_edit(&mut self) {
        self.edit_buffer = None;
    }

    pub fn commit_edit(&mut self) {
        let Some(raw) = self.edit_buffer.take() else {
            return;
        };
        let Some(value) = parse_score(&raw) else {
            self.push_log(format!("[WARN] Not a number: {raw:?}"));
            return;
        };
        let Some(team) = self.editor_team() else {
            return;
        };
        let venue = self.editor_venue;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = session.set_difficulty(&team, venue, Some(value));
        self.log_save(result, "Failed to save difficulties");
        self.recompute();
    }

    pub fn import_from(&mut self, path: &Path) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let result = fs::File::open(path)
            .with_context(|| format!("open {}", path.display()))
            .and_then(|file| session.import_csv(file));
        match result {
            Ok(rows) => {
                self.push_log(format!(
                    "[INFO] Imported and saved difficulties ({rows} rows from {}).",
                    path.display()
                ));
            }
            Err(err) => self.push_log(format!("[WARN] Import failed: {err:#}")),
        }
        self.recompute();
    }

    pub fn export_difficulties_to(&mut self, dir: &Path) -> Option<PathBuf> {
        let session = self.session.as_ref()?;
        let path = dir.join(DIFFICULTIES_FILE);
        let result = session
            .export_difficulties_csv()
            .and_then(|csv| write_export(&path, &csv));
        self.log_export(result, path)
    }

    pub fn export_sorted_to(&mut self, dir: &Path) -> Option<PathBuf> {
        let session = self.session.as_ref()?;
        let path = dir.join(SORTED_FILE);
        let result = session
            .export_sorted_csv()
            .and_then(|csv| write_export(&path, &csv));
        self.log_export(result, path)
    }

    fn log_export(&mut self, result: Result<()>, path: PathBuf) -> Option<PathBuf> {
        match result {
            Ok(()) => {
                self.push_log(format!("[INFO] Exported {}", path.display()));
                Some(path)
            }
            Err(err) => {
                self.push_log(format!("[WARN] Export failed: {err:#}"));
                None
            }
        }
    }

    fn log_save(&mut self, result: Result<()>, failure: &str) {
        match result {
            Ok(()) => self.push_log("[INFO] Saved difficulties to local store."),
            Err(err) => self.push_log(format!("[WARN] {failure}: {err:#}")),
        }
    }
}

fn offset(gw: u32, delta: i32) -> u32 {
    (i64::from(gw) + i64::from(delta)).max(0) as u32
}

fn write_export(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

pub fn apply_delta(state: &mut AppState, delta: Delta) {
    match delta {
        Delta::SetData {
            data,
            fetched_at,
            cached,
        } => {
            state.loading = false;
            if !data.is_available() {
                if state.session.is_none() {
                    state.unavailable = Some(UNAVAILABLE_MESSAGE.to_string());
                }
                state.push_log(format!("[WARN] {UNAVAILABLE_MESSAGE}"));
                return;
            }
            if data.skipped > 0 {
                state.push_log(format!(
                    "[WARN] Skipped {} fixtures with an unreadable gameweek",
                    data.skipped
                ));
            }

            if let Some(session) = state.session.as_mut() {
                if let Err(err) = session.replace_data(data) {
                    state.push_log(format!("[WARN] Refresh ignored: {err}"));
                    return;
                }
            } else {
                let Some(store) = state.pending_store.take() else {
                    return;
                };
                match TickerSession::open(data, store, state.store_key.clone()) {
                    Ok(session) => {
                        match session.origin() {
                            MapOrigin::Saved => {
                                state.push_log("[INFO] Loaded saved difficulties")
                            }
                            MapOrigin::Defaults => {
                                state.push_log("[INFO] Using default difficulties")
                            }
                        }
                        state.session = Some(session);
                        state.unavailable = None;
                    }
                    Err(err) => {
                        state.unavailable = Some(err.to_string());
                        return;
                    }
                }
            }

            state.data_fetched_at = Some(fetched_at);
            state.data_cached = cached;
            state.recompute();
        }
        Delta::Log(msg) => state.push_log(msg),
    }
}
