use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;

use anyhow::{Result, ensure};

use crate::difficulty::{DifficultyDefaults, DifficultyMap, Venue};
use crate::fpl_fetch::{Fixture, FplData};

pub const FALLBACK_DOMAIN: ColorDomain = ColorDomain {
    min: 500.0,
    max: 2000.0,
};

const MISSING_NOTICE_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GwWindow {
    start: u32,
    end: u32,
    excluded: Option<u32>,
}

impl GwWindow {
    pub fn new(start: u32, end: u32, excluded: Option<u32>) -> Result<Self> {
        ensure!(start <= end, "gameweek range start GW{start} is after end GW{end}");
        Ok(Self {
            start,
            end,
            excluded,
        })
    }

    /// The dashboard's opening window: twelve to sixteen weeks past the first
    /// scheduled gameweek, capped at the last one.
    pub fn default_for(min_gw: u32, max_gw: u32) -> Self {
        let max_gw = max_gw.max(min_gw);
        Self {
            start: min_gw.saturating_add(11).min(max_gw),
            end: min_gw.saturating_add(15).min(max_gw),
            excluded: None,
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn excluded(&self) -> Option<u32> {
        self.excluded
    }

    pub fn gameweeks(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }

    pub fn contains(&self, gw: u32) -> bool {
        self.gameweeks().contains(&gw)
    }

    /// True when fixtures in `gw` feed totals and averages.
    pub fn counts(&self, gw: u32) -> bool {
        self.contains(gw) && self.excluded != Some(gw)
    }

    /// The exclusion, but only when it actually falls inside the range.
    pub fn effective_excluded(&self) -> Option<u32> {
        self.excluded.filter(|gw| self.contains(*gw))
    }

    pub fn title(&self) -> String {
        match self.effective_excluded() {
            Some(gw) => format!(
                "Sorted Teams (GW{} → GW{}, excluding GW{gw})",
                self.start, self.end
            ),
            None => format!("Sorted Teams (GW{} → GW{})", self.start, self.end),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamStat {
    pub team: String,
    pub name: String,
    pub total: f64,
    pub matches: u32,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridCell {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub team: String,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorDomain {
    pub min: f64,
    pub max: f64,
}

impl ColorDomain {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
        if !min.is_finite() || !max.is_finite() || min == max {
            return FALLBACK_DOMAIN;
        }
        Self { min, max }
    }

    /// Position of `value` in the domain, clamped to 0..=1.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.5;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureGrid {
    pub gameweeks: Vec<u32>,
    pub rows: Vec<GridRow>,
    pub domain: ColorDomain,
    pub excluded: Option<u32>,
}

impl FixtureGrid {
    pub fn cell(&self, team: &str, gw: u32) -> Option<&GridCell> {
        let col = self.gameweeks.iter().position(|g| *g == gw)?;
        self.rows
            .iter()
            .find(|row| row.team == team)
            .and_then(|row| row.cells.get(col))
    }

    pub fn is_excluded(&self, gw: u32) -> bool {
        self.excluded == Some(gw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerOutput {
    pub stats: Vec<TeamStat>,
    pub grid: FixtureGrid,
    /// Opponent codes that had no usable difficulty value anywhere.
    pub missing: BTreeSet<String>,
}

impl TickerOutput {
    pub fn stat(&self, team: &str) -> Option<&TeamStat> {
        self.stats.iter().find(|s| s.team == team)
    }

    pub fn missing_notice(&self) -> Option<String> {
        if self.missing.is_empty() {
            return None;
        }
        let examples = self
            .missing
            .iter()
            .take(MISSING_NOTICE_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let more = if self.missing.len() > MISSING_NOTICE_LIMIT {
            "..."
        } else {
            ""
        };
        Some(format!(
            "Some opponents lacked difficulty values or full FPL bootstrap mapping. \
             Defaults were used when necessary. Example missing: {examples}{more}"
        ))
    }
}

/// Opponent lookup: the opponent's row, read at the fixture's venue label
/// for the team being scored. Falls back to the defaults table.
fn resolve(
    difficulties: &DifficultyMap,
    defaults: &DifficultyDefaults,
    opponent: &str,
    venue: Venue,
) -> Option<f64> {
    match difficulties.get(opponent) {
        Some(row) => row.get(venue),
        None => defaults.value(opponent, venue),
    }
}

struct CellParts {
    labels: Vec<String>,
    values: Vec<f64>,
}

pub fn aggregate(
    data: &FplData,
    difficulties: &DifficultyMap,
    defaults: &DifficultyDefaults,
    window: &GwWindow,
) -> TickerOutput {
    let mut missing = BTreeSet::new();
    let mut lookup = |opponent: &str, venue: Venue| {
        let value = resolve(difficulties, defaults, opponent, venue);
        if value.is_none() {
            let code = if opponent.is_empty() { "unknown" } else { opponent };
            missing.insert(code.to_string());
        }
        value
    };

    let display: Vec<&Fixture> = data
        .fixtures
        .iter()
        .filter(|f| window.contains(f.gw))
        .collect();

    let index: HashMap<&str, usize> = data
        .team_codes
        .iter()
        .enumerate()
        .map(|(i, code)| (code.as_str(), i))
        .collect();
    let names = data.short_to_full();
    let mut stats: Vec<TeamStat> = data
        .team_codes
        .iter()
        .map(|code| TeamStat {
            team: code.clone(),
            name: names.get(code).cloned().unwrap_or_else(|| code.clone()),
            total: 0.0,
            matches: 0,
            avg: 0.0,
        })
        .collect();

    let mut parts: HashMap<(&str, u32), CellParts> = HashMap::new();

    for fixture in &display {
        let home = fixture.home.as_str();
        let away = fixture.away.as_str();
        let counted = window.counts(fixture.gw);

        let home_value = lookup(away, Venue::Home);
        let away_value = if away != home {
            lookup(home, Venue::Away)
        } else {
            None
        };

        if let Some(&i) = index.get(home) {
            if counted {
                let stat = &mut stats[i];
                stat.matches += 1;
                if let Some(v) = home_value {
                    stat.total += v;
                }
            }
            let cell = parts.entry((home, fixture.gw)).or_insert_with(|| CellParts {
                labels: Vec::new(),
                values: Vec::new(),
            });
            cell.labels.push(away.to_uppercase());
            cell.values.extend(home_value);
        }

        if away == home {
            continue;
        }
        if let Some(&i) = index.get(away) {
            if counted {
                let stat = &mut stats[i];
                stat.matches += 1;
                if let Some(v) = away_value {
                    stat.total += v;
                }
            }
            let cell = parts.entry((away, fixture.gw)).or_insert_with(|| CellParts {
                labels: Vec::new(),
                values: Vec::new(),
            });
            cell.labels.push(home.to_lowercase());
            cell.values.extend(away_value);
        }
    }

    for stat in &mut stats {
        stat.avg = if stat.matches > 0 {
            stat.total / f64::from(stat.matches)
        } else {
            0.0
        };
    }
    // Stable: equal totals keep team-code order.
    stats.sort_by(|a, b| a.total.total_cmp(&b.total));

    let gameweeks: Vec<u32> = window.gameweeks().collect();
    let rows: Vec<GridRow> = stats
        .iter()
        .map(|stat| GridRow {
            team: stat.team.clone(),
            cells: gameweeks
                .iter()
                .map(|gw| match parts.get(&(stat.team.as_str(), *gw)) {
                    Some(cell) => GridCell {
                        label: cell.labels.join(", "),
                        value: mean(&cell.values),
                    },
                    None => GridCell::default(),
                })
                .collect(),
        })
        .collect();

    let domain = ColorDomain::from_values(
        rows.iter()
            .flat_map(|row| row.cells.iter().filter_map(|c| c.value)),
    );

    TickerOutput {
        stats,
        grid: FixtureGrid {
            gameweeks,
            rows,
            domain,
            excluded: window.effective_excluded(),
        },
        missing,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rejects_inverted_range() {
        assert!(GwWindow::new(5, 4, None).is_err());
        assert!(GwWindow::new(4, 4, Some(9)).is_ok());
    }

    #[test]
    fn default_window_is_capped() {
        let w = GwWindow::default_for(1, 38);
        assert_eq!((w.start(), w.end()), (12, 16));
        let w = GwWindow::default_for(1, 14);
        assert_eq!((w.start(), w.end()), (12, 14));
        let w = GwWindow::default_for(30, 38);
        assert_eq!((w.start(), w.end()), (38, 38));
    }

    #[test]
    fn exclusion_outside_range_is_inert() {
        let w = GwWindow::new(3, 5, Some(9)).expect("valid window");
        assert!(w.counts(3));
        assert_eq!(w.effective_excluded(), None);
        assert_eq!(w.title(), "Sorted Teams (GW3 → GW5)");
        let w = GwWindow::new(3, 5, Some(4)).expect("valid window");
        assert!(!w.counts(4));
        assert_eq!(w.title(), "Sorted Teams (GW3 → GW5, excluding GW4)");
    }

    #[test]
    fn domain_fallbacks() {
        assert_eq!(ColorDomain::from_values([]), FALLBACK_DOMAIN);
        assert_eq!(ColorDomain::from_values([1250.0, 1250.0]), FALLBACK_DOMAIN);
        assert_eq!(ColorDomain::from_values([f64::NAN]), FALLBACK_DOMAIN);
        assert_eq!(
            ColorDomain::from_values([900.0, f64::NAN, 1400.0]),
            ColorDomain {
                min: 900.0,
                max: 1400.0
            }
        );
    }

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1000.0, 1500.0]), Some(1250.0));
    }
}
