use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;

use fpl_ticker::difficulty::DifficultyDefaults;
use fpl_ticker::fpl_fetch::{FplData, normalize};
use fpl_ticker::ticker::{GwWindow, aggregate};

const TEAMS: [&str; 20] = [
    "ARS", "AVL", "BHA", "BOU", "BRE", "BUR", "CHE", "CRY", "EVE", "FUL", "LEE", "LIV", "MCI",
    "MUN", "NEW", "NFO", "SUN", "TOT", "WHU", "WOL",
];

/// Circle-method double round robin: 38 gameweeks of 10 fixtures.
fn season_payloads() -> (Value, Value) {
    let n = TEAMS.len();
    let mut fixtures = Vec::with_capacity(380);
    for gw in 1..=38u32 {
        let round = (gw as usize - 1) % (n - 1);
        for i in 0..n / 2 {
            let a = if i == 0 { n - 1 } else { (round + i) % (n - 1) };
            let b = (round + n - 1 - i) % (n - 1);
            let (home, away) = if gw <= 19 { (a, b) } else { (b, a) };
            fixtures.push(json!({
                "event": gw,
                "team_h": home + 1,
                "team_a": away + 1,
                "kickoff_time": format!("2025-{:02}-{:02}T15:00:00Z", 8 + gw / 5, 1 + i),
            }));
        }
    }
    let teams: Vec<Value> = TEAMS
        .iter()
        .enumerate()
        .map(|(i, code)| json!({"id": i + 1, "name": format!("{code} FC"), "short_name": code}))
        .collect();
    (Value::Array(fixtures), json!({ "teams": teams }))
}

fn season() -> FplData {
    let (fixtures, bootstrap) = season_payloads();
    normalize(Ok(fixtures), Ok(bootstrap))
}

fn bench_normalize(c: &mut Criterion) {
    let (fixtures, bootstrap) = season_payloads();
    c.bench_function("normalize_season", |b| {
        b.iter(|| {
            let data = normalize(Ok(black_box(fixtures.clone())), Ok(black_box(bootstrap.clone())));
            black_box(data.fixtures.len());
        })
    });
}

fn bench_aggregate_full_season(c: &mut Criterion) {
    let data = season();
    let defaults = DifficultyDefaults::for_teams(&data.team_codes);
    let difficulties = defaults.initial_map();
    let window = GwWindow::new(1, 38, Some(20)).unwrap();
    c.bench_function("aggregate_full_season", |b| {
        b.iter(|| {
            let out = aggregate(black_box(&data), &difficulties, &defaults, &window);
            black_box(out.stats.len());
        })
    });
}

fn bench_aggregate_default_window(c: &mut Criterion) {
    let data = season();
    let defaults = DifficultyDefaults::for_teams(&data.team_codes);
    let difficulties = defaults.initial_map();
    let window = GwWindow::default_for(1, 38);
    c.bench_function("aggregate_default_window", |b| {
        b.iter(|| {
            let out = aggregate(black_box(&data), &difficulties, &defaults, &window);
            black_box(out.grid.rows.len());
        })
    });
}

criterion_group!(
    perf,
    bench_normalize,
    bench_aggregate_full_season,
    bench_aggregate_default_window
);
criterion_main!(perf);
