use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::TickerConfig;
use crate::http_cache::{HttpStatusError, fetch_json_cached};
use crate::http_client::http_client;

pub const UNAVAILABLE_MESSAGE: &str = "Unable to load Fantasy Premier League fixtures/team list right now. \
     This can happen during preseason or if the FPL API is unreachable.";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("endpoint returned http {0}")]
    HttpStatus(u16),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Outcome of reading one field from an untyped JSON record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<T> {
    Present(T),
    Absent,
    WrongType,
}

impl<T> Field<T> {
    pub fn present(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent | Field::WrongType => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub short: String,
}

impl Team {
    fn placeholder(id: u32) -> Self {
        Self {
            id,
            name: format!("Team {id}"),
            short: short_code(&id.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub gw: u32,
    pub home: String,
    pub away: String,
    pub home_name: String,
    pub away_name: String,
    pub kickoff: Option<String>,
}

/// Normalized fixture table plus the team registry it was resolved against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FplData {
    pub fixtures: Vec<Fixture>,
    pub team_codes: Vec<String>,
    pub teams: BTreeMap<u32, Team>,
    /// Fixture records dropped because their gameweek had the wrong type.
    pub skipped: usize,
}

impl FplData {
    pub fn is_available(&self) -> bool {
        !self.fixtures.is_empty() && !self.team_codes.is_empty() && !self.teams.is_empty()
    }

    pub fn gw_bounds(&self) -> (u32, u32) {
        let min = self.fixtures.iter().map(|f| f.gw).min();
        let max = self.fixtures.iter().map(|f| f.gw).max();
        match (min, max) {
            (Some(min), Some(max)) => (min, max),
            _ => (1, 38),
        }
    }

    /// Short code to full name. Later registry entries win on code collisions.
    pub fn short_to_full(&self) -> BTreeMap<String, String> {
        self.teams
            .values()
            .filter(|t| !t.short.is_empty())
            .map(|t| (t.short.clone(), t.name.clone()))
            .collect()
    }

    pub fn full_name(&self, code: &str) -> String {
        self.short_to_full()
            .remove(code)
            .unwrap_or_else(|| code.to_string())
    }
}

/// Fetch fixtures then bootstrap, sequentially. Never fails: an unusable
/// fixtures endpoint yields an empty `FplData`.
pub fn fetch_fpl_data(cfg: &TickerConfig) -> FplData {
    let client = match http_client() {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "http client unavailable");
            return FplData::default();
        }
    };

    let fixtures = fetch_payload(client, &cfg.fixtures_url, cfg.cache_ttl);
    if let Err(err) = &fixtures {
        warn!(error = %err, url = %cfg.fixtures_url, "fixtures endpoint failed");
        return FplData::default();
    }
    let bootstrap = fetch_payload(client, &cfg.bootstrap_url, cfg.cache_ttl);
    let data = normalize(fixtures, bootstrap);
    info!(
        fixtures = data.fixtures.len(),
        teams = data.teams.len(),
        skipped = data.skipped,
        "fpl data normalized"
    );
    data
}

fn fetch_payload(client: &Client, url: &str, max_age: Duration) -> Result<Value, SourceError> {
    let body = fetch_json_cached(client, url, max_age).map_err(|err| {
        match err.downcast_ref::<HttpStatusError>() {
            Some(status) => SourceError::HttpStatus(status.status),
            None => SourceError::Unreachable(format!("{err:#}")),
        }
    })?;
    parse_payload(&body)
}

pub fn parse_payload(raw: &str) -> Result<Value, SourceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SourceError::Malformed("empty body".to_string()));
    }
    serde_json::from_str(trimmed).map_err(|err| SourceError::Malformed(err.to_string()))
}

pub fn normalize(
    fixtures: Result<Value, SourceError>,
    bootstrap: Result<Value, SourceError>,
) -> FplData {
    let records = match fixtures {
        Ok(Value::Array(records)) => records,
        Ok(_) => {
            warn!("fixtures payload is not a list");
            return FplData::default();
        }
        Err(err) => {
            warn!(error = %err, "fixtures unavailable");
            return FplData::default();
        }
    };

    let mut teams = match bootstrap {
        Ok(boot) => registry_from_bootstrap(&boot),
        Err(err) => {
            warn!(error = %err, "bootstrap unavailable, deriving teams from fixtures");
            BTreeMap::new()
        }
    };

    if teams.is_empty() {
        for record in &records {
            for key in ["team_h", "team_a"] {
                if let Some(id) = team_id(record, key) {
                    teams.entry(id).or_insert_with(|| Team::placeholder(id));
                }
            }
        }
    }

    let mut fixtures = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for record in &records {
        let gw = match int_field(record, "event") {
            Field::Present(gw) => match u32::try_from(gw) {
                Ok(gw) => gw,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            },
            Field::Absent => continue,
            Field::WrongType => {
                skipped += 1;
                continue;
            }
        };

        let home_id = team_id(record, "team_h");
        let away_id = team_id(record, "team_a");
        for id in [home_id, away_id].into_iter().flatten() {
            teams.entry(id).or_insert_with(|| Team::placeholder(id));
        }

        let (home, home_name) = resolve_team(&teams, home_id);
        let (away, away_name) = resolve_team(&teams, away_id);
        let kickoff = str_field(record, "kickoff_time")
            .present()
            .map(|s| s.to_string());

        fixtures.push(Fixture {
            gw,
            home,
            away,
            home_name,
            away_name,
            kickoff,
        });
    }

    // `sort_by` is stable, so equal keys keep their feed order.
    fixtures.sort_by(|a, b| {
        a.gw.cmp(&b.gw)
            .then_with(|| cmp_kickoff(a.kickoff.as_deref(), b.kickoff.as_deref()))
    });

    let team_codes = teams
        .values()
        .filter(|t| !t.short.is_empty())
        .map(|t| t.short.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    FplData {
        fixtures,
        team_codes,
        teams,
        skipped,
    }
}

/// All-or-nothing: one unreadable team id discards the whole registry.
fn registry_from_bootstrap(boot: &Value) -> BTreeMap<u32, Team> {
    let Some(entries) = boot.get("teams").and_then(|v| v.as_array()) else {
        return BTreeMap::new();
    };

    let mut teams = BTreeMap::new();
    for entry in entries {
        let Some(id) = int_field(entry, "id")
            .present()
            .and_then(|id| u32::try_from(id).ok())
        else {
            warn!("bootstrap team without a usable id, ignoring registry");
            return BTreeMap::new();
        };
        let name = str_field(entry, "name").present().unwrap_or_default();
        let short = match str_field(entry, "short_name") {
            Field::Present(s) if !s.is_empty() => short_code(s),
            _ => short_code(name),
        };
        teams.insert(
            id,
            Team {
                id,
                name: name.to_string(),
                short,
            },
        );
    }
    teams
}

fn resolve_team(teams: &BTreeMap<u32, Team>, id: Option<u32>) -> (String, String) {
    id.and_then(|id| teams.get(&id))
        .map(|t| (t.short.clone(), t.name.clone()))
        .unwrap_or_default()
}

fn team_id(record: &Value, key: &str) -> Option<u32> {
    int_field(record, key)
        .present()
        .and_then(|id| u32::try_from(id).ok())
}

fn short_code(raw: &str) -> String {
    raw.chars().take(3).collect::<String>().to_uppercase()
}

fn cmp_kickoff(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn int_field(record: &Value, key: &str) -> Field<i64> {
    match record.get(key) {
        None | Some(Value::Null) => Field::Absent,
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Field::Present(i);
            }
            // Integral floats show up in hand-edited payloads.
            match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 => Field::Present(f as i64),
                _ => Field::WrongType,
            }
        }
        Some(_) => Field::WrongType,
    }
}

pub fn str_field<'a>(record: &'a Value, key: &str) -> Field<&'a str> {
    match record.get(key) {
        None | Some(Value::Null) => Field::Absent,
        Some(Value::String(s)) => Field::Present(s.as_str()),
        Some(_) => Field::WrongType,
    }
}

/// Time-keyed cache of the last usable `FplData`.
#[derive(Debug, Clone)]
pub struct FplDataCache {
    ttl: Duration,
    slot: Option<(SystemTime, FplData)>,
}

impl FplDataCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, slot: None }
    }

    pub fn fetched_at(&self) -> Option<SystemTime> {
        self.slot.as_ref().map(|(at, _)| *at)
    }

    pub fn is_fresh(&self, now: SystemTime) -> bool {
        let Some(at) = self.fetched_at() else {
            return false;
        };
        match now.duration_since(at) {
            Ok(age) => age < self.ttl,
            Err(_) => false,
        }
    }

    /// Returns the cached data while fresh, otherwise calls `fetch`. Only
    /// available results are stored. The flag is true on a cache hit.
    pub fn get_or_fetch(
        &mut self,
        now: SystemTime,
        fetch: impl FnOnce() -> FplData,
    ) -> (FplData, bool) {
        if self.is_fresh(now) {
            if let Some((_, data)) = &self.slot {
                return (data.clone(), true);
            }
        }
        let data = fetch();
        if data.is_available() {
            self.slot = Some((now, data.clone()));
        }
        (data, false)
    }
}
