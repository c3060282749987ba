use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const SLIDER_MIN: u32 = 500;
pub const SLIDER_MAX: u32 = 2000;
pub const SLIDER_STEP: u32 = 50;

pub const GENERIC_HOME_DEFAULT: f64 = 1250.0;
pub const GENERIC_AWAY_DEFAULT: f64 = 1350.0;

// Curated starting values keyed by FPL short code.
const CUSTOM_DEFAULTS: &[(&str, f64, f64)] = &[
    ("ARS", 1750.0, 1950.0),
    ("AVL", 1100.0, 1250.0),
    ("BHA", 1200.0, 1300.0),
    ("BOU", 1100.0, 1250.0),
    ("BRE", 1050.0, 1200.0),
    ("BUR", 900.0, 950.0),
    ("CHE", 1450.0, 1600.0),
    ("CRY", 1150.0, 1300.0),
    ("EVE", 1000.0, 1100.0),
    ("FUL", 1050.0, 1150.0),
    ("LEE", 1000.0, 1050.0),
    ("LIV", 1400.0, 1500.0),
    ("MCI", 1450.0, 1600.0),
    ("MUN", 1200.0, 1300.0),
    ("NEW", 1150.0, 1300.0),
    ("NFO", 1050.0, 1100.0),
    ("SUN", 1000.0, 1150.0),
    ("TOT", 1000.0, 1150.0),
    ("WHU", 900.0, 1000.0),
    ("WOL", 750.0, 800.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn label(self) -> &'static str {
        match self {
            Venue::Home => "Home",
            Venue::Away => "Away",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Venue::Home => Venue::Away,
            Venue::Away => Venue::Home,
        }
    }
}

/// One team's Home/Away scores. `None` marks a value that was never numeric.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Difficulty {
    #[serde(
        rename = "Home",
        default,
        serialize_with = "serialize_score",
        deserialize_with = "deserialize_score"
    )]
    pub home: Option<f64>,
    #[serde(
        rename = "Away",
        default,
        serialize_with = "serialize_score",
        deserialize_with = "deserialize_score"
    )]
    pub away: Option<f64>,
}

impl Difficulty {
    pub fn new(home: f64, away: f64) -> Self {
        Self {
            home: Some(home),
            away: Some(away),
        }
    }

    /// The usable value for `venue`, if it is a finite number.
    pub fn get(&self, venue: Venue) -> Option<f64> {
        let raw = match venue {
            Venue::Home => self.home,
            Venue::Away => self.away,
        };
        raw.filter(|v| v.is_finite())
    }

    pub fn set(&mut self, venue: Venue, value: Option<f64>) {
        match venue {
            Venue::Home => self.home = value,
            Venue::Away => self.away = value,
        }
    }
}

/// Accepts numbers and numeric strings; anything else becomes `None`.
pub fn coerce_score(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_score(s),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn parse_score(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn deserialize_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_score(&value))
}

fn serialize_score<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        // Whole scores are written as integers so the blob reads like the slider values.
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 => {
            serializer.serialize_i64(*v as i64)
        }
        Some(v) if v.is_finite() => serializer.serialize_f64(*v),
        _ => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DifficultyMap {
    rows: BTreeMap<String, Difficulty>,
}

impl DifficultyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: &str) -> Option<&Difficulty> {
        self.rows.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rows.contains_key(code)
    }

    pub fn insert(&mut self, code: impl Into<String>, difficulty: Difficulty) {
        self.rows.insert(code.into(), difficulty);
    }

    pub fn set_value(&mut self, code: &str, venue: Venue, value: Option<f64>) {
        self.rows
            .entry(code.to_string())
            .or_default()
            .set(venue, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Difficulty)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Inserts defaults for every code the map lacks. Returns the added codes.
    pub fn ensure_covers(&mut self, defaults: &DifficultyDefaults, codes: &[String]) -> Vec<String> {
        let mut added = Vec::new();
        for code in codes {
            if !self.rows.contains_key(code) {
                self.rows.insert(code.clone(), defaults.row_or_generic(code));
                added.push(code.clone());
            }
        }
        added
    }
}

impl FromIterator<(String, Difficulty)> for DifficultyMap {
    fn from_iter<I: IntoIterator<Item = (String, Difficulty)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// Default values for the teams in the current fixture data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DifficultyDefaults {
    table: BTreeMap<String, Difficulty>,
}

impl DifficultyDefaults {
    pub fn for_teams(codes: &[String]) -> Self {
        let table = codes
            .iter()
            .map(|code| (code.clone(), curated_or_generic(code)))
            .collect();
        Self { table }
    }

    pub fn get(&self, code: &str) -> Option<&Difficulty> {
        self.table.get(code)
    }

    /// Defaults only know about current teams; anyone else resolves to `None`.
    pub fn value(&self, code: &str, venue: Venue) -> Option<f64> {
        self.table.get(code).and_then(|d| d.get(venue))
    }

    pub fn row_or_generic(&self, code: &str) -> Difficulty {
        self.table
            .get(code)
            .copied()
            .unwrap_or_else(|| curated_or_generic(code))
    }

    pub fn initial_map(&self) -> DifficultyMap {
        self.table
            .iter()
            .map(|(code, d)| (code.clone(), *d))
            .collect()
    }
}

pub fn curated_or_generic(code: &str) -> Difficulty {
    CUSTOM_DEFAULTS
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, home, away)| Difficulty::new(*home, *away))
        .unwrap_or_else(|| Difficulty::new(GENERIC_HOME_DEFAULT, GENERIC_AWAY_DEFAULT))
}

pub fn clamp_slider(value: f64) -> u32 {
    if !value.is_finite() {
        return SLIDER_MIN;
    }
    (value.trunc().max(SLIDER_MIN as f64).min(SLIDER_MAX as f64)) as u32
}
