use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::difficulty::{
    Difficulty, DifficultyDefaults, DifficultyMap, SLIDER_MAX, SLIDER_MIN, Venue, clamp_slider,
};
use crate::difficulty_csv::{difficulties_to_csv_string, import_difficulties, sorted_table_to_csv_string};
use crate::fpl_fetch::{FplData, UNAVAILABLE_MESSAGE};
use crate::store::{KeyValueStore, load_difficulties, save_difficulties};
use crate::ticker::{GwWindow, TickerOutput, aggregate};

/// Staged slider values for one team. They only reach the difficulty map
/// through `apply_sliders`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliderPair {
    pub home: u32,
    pub away: u32,
}

impl SliderPair {
    pub fn get(&self, venue: Venue) -> u32 {
        match venue {
            Venue::Home => self.home,
            Venue::Away => self.away,
        }
    }

    fn set(&mut self, venue: Venue, value: u32) {
        match venue {
            Venue::Home => self.home = value,
            Venue::Away => self.away = value,
        }
    }
}

/// Where the difficulty map came from when the session opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapOrigin {
    Saved,
    Defaults,
}

/// Everything one user works with: fixture data, their difficulty map,
/// staged sliders and the gameweek window. The store is the only side channel.
pub struct TickerSession {
    data: FplData,
    defaults: DifficultyDefaults,
    difficulties: DifficultyMap,
    sliders: BTreeMap<String, SliderPair>,
    window: GwWindow,
    origin: MapOrigin,
    store: Box<dyn KeyValueStore>,
    store_key: String,
}

impl std::fmt::Debug for TickerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerSession")
            .field("teams", &self.data.team_codes.len())
            .field("fixtures", &self.data.fixtures.len())
            .field("window", &self.window)
            .field("origin", &self.origin)
            .field("store_key", &self.store_key)
            .finish()
    }
}

impl TickerSession {
    pub fn open(
        data: FplData,
        store: Box<dyn KeyValueStore>,
        store_key: impl Into<String>,
    ) -> Result<Self> {
        if !data.is_available() {
            bail!(UNAVAILABLE_MESSAGE);
        }
        let store_key = store_key.into();
        let defaults = DifficultyDefaults::for_teams(&data.team_codes);
        let (mut difficulties, origin) = match load_difficulties(store.as_ref(), &store_key) {
            Some(saved) => (saved, MapOrigin::Saved),
            None => (defaults.initial_map(), MapOrigin::Defaults),
        };
        let added = difficulties.ensure_covers(&defaults, &data.team_codes);
        if !added.is_empty() {
            info!(teams = ?added, "filled difficulties for new teams");
        }

        let (min_gw, max_gw) = data.gw_bounds();
        let window = GwWindow::default_for(min_gw, max_gw);

        let mut session = Self {
            data,
            defaults,
            difficulties,
            sliders: BTreeMap::new(),
            window,
            origin,
            store,
            store_key,
        };
        session.reseed_sliders();
        Ok(session)
    }

    pub fn data(&self) -> &FplData {
        &self.data
    }

    pub fn defaults(&self) -> &DifficultyDefaults {
        &self.defaults
    }

    pub fn difficulties(&self) -> &DifficultyMap {
        &self.difficulties
    }

    pub fn window(&self) -> &GwWindow {
        &self.window
    }

    pub fn origin(&self) -> MapOrigin {
        self.origin
    }

    pub fn team_codes(&self) -> &[String] {
        &self.data.team_codes
    }

    pub fn slider(&self, code: &str) -> Option<SliderPair> {
        self.sliders.get(code).copied()
    }

    /// Swap in freshly fetched data, keeping the user's map and window where
    /// they still make sense.
    pub fn replace_data(&mut self, data: FplData) -> Result<()> {
        if !data.is_available() {
            bail!(UNAVAILABLE_MESSAGE);
        }
        self.defaults = DifficultyDefaults::for_teams(&data.team_codes);
        let added = self
            .difficulties
            .ensure_covers(&self.defaults, &data.team_codes);
        for code in &added {
            let pair = self.slider_seed(code);
            self.sliders.insert(code.clone(), pair);
        }
        let (min_gw, max_gw) = data.gw_bounds();
        self.data = data;
        let start = self.window.start().clamp(min_gw, max_gw);
        let end = self.window.end().clamp(start, max_gw);
        self.window = GwWindow::new(start, end, self.window.excluded())?;
        Ok(())
    }

    pub fn compute(&self) -> TickerOutput {
        aggregate(&self.data, &self.difficulties, &self.defaults, &self.window)
    }

    /// Moves the range, clamped to the scheduled gameweeks. An exclusion that
    /// falls out of the new range is dropped.
    pub fn set_range(&mut self, start: u32, end: u32) -> Result<()> {
        let (min_gw, max_gw) = self.data.gw_bounds();
        let start = start.clamp(min_gw, max_gw);
        let end = end.clamp(min_gw, max_gw);
        let excluded = self
            .window
            .excluded()
            .filter(|gw| (start..=end).contains(gw));
        self.window = GwWindow::new(start, end, excluded)?;
        Ok(())
    }

    pub fn set_excluded(&mut self, excluded: Option<u32>) -> Result<()> {
        self.window = GwWindow::new(self.window.start(), self.window.end(), excluded)?;
        Ok(())
    }

    /// `None` followed by every gameweek in the current range.
    pub fn exclusion_options(&self) -> Vec<Option<u32>> {
        std::iter::once(None)
            .chain(self.window.gameweeks().map(Some))
            .collect()
    }

    pub fn cycle_excluded(&mut self) -> Result<Option<u32>> {
        let options = self.exclusion_options();
        let pos = options
            .iter()
            .position(|o| *o == self.window.excluded())
            .unwrap_or(0);
        let next = options[(pos + 1) % options.len()];
        self.set_excluded(next)?;
        Ok(next)
    }

    /// Direct table edit: one cell changes, then the whole map is persisted.
    pub fn set_difficulty(&mut self, code: &str, venue: Venue, value: Option<f64>) -> Result<()> {
        self.difficulties.set_value(code, venue, value);
        self.persist()
    }

    /// Full-table replace, then persist.
    pub fn replace_difficulties(&mut self, map: DifficultyMap) -> Result<()> {
        self.difficulties = map;
        self.difficulties
            .ensure_covers(&self.defaults, &self.data.team_codes);
        self.reseed_sliders();
        self.persist()
    }

    pub fn stage_slider(&mut self, code: &str, venue: Venue, value: u32) {
        let value = value.clamp(SLIDER_MIN, SLIDER_MAX);
        let seed = self.slider_seed(code);
        self.sliders
            .entry(code.to_string())
            .or_insert(seed)
            .set(venue, value);
    }

    pub fn nudge_slider(&mut self, code: &str, venue: Venue, delta: i32) -> u32 {
        let current = self
            .slider(code)
            .unwrap_or_else(|| self.slider_seed(code))
            .get(venue);
        let next = (i64::from(current) + i64::from(delta))
            .clamp(i64::from(SLIDER_MIN), i64::from(SLIDER_MAX)) as u32;
        self.stage_slider(code, venue, next);
        next
    }

    /// Replaces the map with the staged slider values for every current team.
    pub fn apply_sliders(&mut self) -> Result<()> {
        let map: DifficultyMap = self
            .data
            .team_codes
            .iter()
            .map(|code| {
                let pair = self.slider(code).unwrap_or_else(|| self.slider_seed(code));
                (
                    code.clone(),
                    Difficulty::new(f64::from(pair.home), f64::from(pair.away)),
                )
            })
            .collect();
        self.difficulties = map;
        self.persist()
    }

    /// Overwrites the map from CSV. A failed parse or save leaves the map and
    /// sliders as they were.
    pub fn import_csv<R: Read>(&mut self, reader: R) -> Result<usize> {
        let imported = import_difficulties(reader).context("import failed")?;
        let rows = imported.len();
        let previous = (self.difficulties.clone(), self.sliders.clone());
        if let Err(err) = self.replace_difficulties(imported) {
            (self.difficulties, self.sliders) = previous;
            return Err(err.context("imported difficulties not saved"));
        }
        Ok(rows)
    }

    pub fn export_difficulties_csv(&self) -> Result<String> {
        difficulties_to_csv_string(&self.difficulties)
    }

    pub fn export_sorted_csv(&self) -> Result<String> {
        sorted_table_to_csv_string(&self.compute().stats)
    }

    fn persist(&mut self) -> Result<()> {
        match save_difficulties(self.store.as_mut(), &self.store_key, &self.difficulties) {
            Ok(()) => {
                info!(teams = self.difficulties.len(), "difficulties saved");
                Ok(())
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "difficulties save failed");
                Err(err)
            }
        }
    }

    fn slider_seed(&self, code: &str) -> SliderPair {
        let fallback = self.defaults.row_or_generic(code);
        let pick = |venue: Venue| {
            self.difficulties
                .get(code)
                .and_then(|row| row.get(venue))
                .or_else(|| fallback.get(venue))
                .map(clamp_slider)
                .unwrap_or(SLIDER_MIN)
        };
        SliderPair {
            home: pick(Venue::Home),
            away: pick(Venue::Away),
        }
    }

    fn reseed_sliders(&mut self) {
        self.sliders = self
            .data
            .team_codes
            .iter()
            .map(|code| (code.clone(), self.slider_seed(code)))
            .collect();
    }
}
