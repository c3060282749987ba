use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, SystemTime};

use tempdir::TempDir;

use fpl_ticker::difficulty::{SLIDER_STEP, Venue};
use fpl_ticker::feed::spawn_provider_with;
use fpl_ticker::fpl_fetch::{FplData, UNAVAILABLE_MESSAGE, normalize, parse_payload};
use fpl_ticker::state::{
    AppState, DIFFICULTIES_FILE, Delta, ProviderCommand, SORTED_FILE, Screen, apply_delta,
};
use fpl_ticker::store::MemoryStore;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fpl_data() -> FplData {
    normalize(
        parse_payload(&read_fixture("fpl_fixtures.json")),
        parse_payload(&read_fixture("fpl_bootstrap.json")),
    )
}

fn loaded_state() -> AppState {
    let mut state = AppState::new(Box::new(MemoryStore::new()), "k");
    apply_delta(
        &mut state,
        Delta::SetData {
            data: fpl_data(),
            fetched_at: SystemTime::now(),
            cached: false,
        },
    );
    state
}

fn last_log(state: &AppState) -> &str {
    state.logs.back().map(String::as_str).unwrap_or_default()
}

#[test]
fn first_data_opens_session() {
    let state = loaded_state();
    assert!(!state.loading);
    assert!(state.session.is_some());
    assert!(state.unavailable.is_none());
    let output = state.output.as_ref().expect("output computed");
    assert_eq!(output.stats.len(), 5);
    assert!(state.logs.iter().any(|l| l.contains("Using default difficulties")));
    assert!(state.logs.iter().any(|l| l.contains("Skipped 1 fixtures")));
}

#[test]
fn unavailable_data_halts_with_message() {
    let mut state = AppState::new(Box::new(MemoryStore::new()), "k");
    apply_delta(
        &mut state,
        Delta::SetData {
            data: FplData::default(),
            fetched_at: SystemTime::now(),
            cached: false,
        },
    );
    assert!(state.session.is_none());
    assert!(state.output.is_none());
    assert_eq!(state.unavailable.as_deref(), Some(UNAVAILABLE_MESSAGE));
}

#[test]
fn failed_refresh_keeps_current_session() {
    let mut state = loaded_state();
    apply_delta(
        &mut state,
        Delta::SetData {
            data: FplData::default(),
            fetched_at: SystemTime::now(),
            cached: false,
        },
    );
    assert!(state.session.is_some());
    assert!(state.unavailable.is_none());
    assert!(last_log(&state).starts_with("[WARN]"));
}

#[test]
fn range_keys_shift_and_recompute() {
    let mut state = loaded_state();
    state.shift_range(-1, 0);
    let session = state.session.as_ref().expect("session");
    assert_eq!((session.window().start(), session.window().end()), (1, 2));
    assert_eq!(
        state.output.as_ref().map(|o| o.grid.gameweeks.clone()),
        Some(vec![1, 2])
    );

    // The end never moves before the start.
    state.shift_range(0, -5);
    let session = state.session.as_ref().expect("session");
    assert_eq!((session.window().start(), session.window().end()), (1, 1));
}

#[test]
fn exclusion_logs_info_notice() {
    let mut state = loaded_state();
    state.shift_range(-1, 0);
    state.cycle_excluded();
    assert_eq!(
        last_log(&state),
        "[INFO] GW1 will be excluded from totals/avg calculations (it will remain visible in the grid)."
    );
    assert_eq!(state.output.as_ref().and_then(|o| o.grid.excluded), Some(1));
}

#[test]
fn editor_edit_commits_value() {
    let mut state = loaded_state();
    state.toggle_editor();
    assert_eq!(state.screen, Screen::Editor);
    state.select_next();
    assert_eq!(state.editor_team().as_deref(), Some("ARS"));
    state.toggle_editor_venue();
    assert_eq!(state.editor_venue, Venue::Away);

    state.begin_edit();
    assert_eq!(state.edit_buffer.as_deref(), Some("1950"));
    for _ in 0..4 {
        state.edit_backspace();
    }
    for c in "12x34".chars() {
        state.edit_push(c);
    }
    state.commit_edit();
    assert!(state.edit_buffer.is_none());
    let session = state.session.as_ref().expect("session");
    assert_eq!(
        session.difficulties().get("ARS").and_then(|d| d.away),
        Some(1234.0)
    );
    assert_eq!(last_log(&state), "[INFO] Saved difficulties to local store.");
}

#[test]
fn non_numeric_edit_is_rejected() {
    let mut state = loaded_state();
    state.toggle_editor();
    state.begin_edit();
    state.edit_buffer = Some("-".to_string());
    state.commit_edit();
    assert!(last_log(&state).starts_with("[WARN] Not a number"));
}

#[test]
fn nudged_sliders_apply_together() {
    let mut state = loaded_state();
    state.toggle_editor();
    // editor_selected 0 is team "20" with generic 1250/1350.
    state.nudge_selected(2);
    state.nudge_selected(1);
    let session = state.session.as_ref().expect("session");
    assert_eq!(
        session.slider("20").map(|s| s.home),
        Some(1250 + 3 * SLIDER_STEP)
    );
    assert_eq!(
        session.difficulties().get("20").and_then(|d| d.home),
        Some(1250.0)
    );

    state.apply_sliders();
    let session = state.session.as_ref().expect("session");
    assert_eq!(
        session.difficulties().get("20").and_then(|d| d.home),
        Some(1400.0)
    );
}

#[test]
fn import_and_export_round_trip_through_files() {
    let dir = TempDir::new("fpl_ticker_io").expect("temp dir");
    let mut state = loaded_state();

    let mut fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    fixture.push("tests/fixtures/saved_difficulties.csv");
    state.import_from(&fixture);
    assert!(last_log(&state).starts_with("[INFO] Imported and saved difficulties"));

    let written = state
        .export_difficulties_to(dir.path())
        .expect("difficulties exported");
    assert_eq!(written, dir.path().join(DIFFICULTIES_FILE));
    let csv = fs::read_to_string(&written).expect("read export");
    assert!(csv.contains("ARS,1800,1900"));

    let sorted = state.export_sorted_to(dir.path()).expect("sorted exported");
    assert_eq!(sorted, dir.path().join(SORTED_FILE));
    let csv = fs::read_to_string(&sorted).expect("read export");
    assert!(csv.starts_with("Team,Name,Total,Avg,Matches\n"));
}

#[test]
fn missing_import_file_is_a_warning() {
    let mut state = loaded_state();
    state.import_from(&PathBuf::from("/nonexistent/saved_difficulties.csv"));
    assert!(last_log(&state).starts_with("[WARN] Import failed"));
    assert!(state.session.is_some());
}

#[test]
fn logs_are_bounded() {
    let mut state = AppState::new(Box::new(MemoryStore::new()), "k");
    for i in 0..250 {
        state.push_log(format!("line {i}"));
    }
    assert_eq!(state.logs.len(), 200);
    assert_eq!(state.logs.front().map(String::as_str), Some("line 50"));
}

#[test]
fn provider_serves_repeat_requests_from_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let handle = spawn_provider_with(
        Duration::from_secs(3600),
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            fpl_data()
        },
        tx,
        cmd_rx,
    );

    cmd_tx.send(ProviderCommand::FetchData).expect("send command");
    drop(cmd_tx);
    handle.join().expect("provider thread exits");

    let mut cached = Vec::new();
    let mut logs = Vec::new();
    for delta in rx.try_iter() {
        match delta {
            Delta::SetData { cached: hit, .. } => cached.push(hit),
            Delta::Log(line) => logs.push(line),
        }
    }
    assert_eq!(cached, vec![false, true]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(logs, vec!["[INFO] Serving cached FPL data".to_string()]);
}

#[test]
fn provider_refetches_when_nothing_was_cached() {
    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let handle = spawn_provider_with(Duration::from_secs(3600), FplData::default, tx, cmd_rx);

    cmd_tx.send(ProviderCommand::FetchData).expect("send command");
    drop(cmd_tx);
    handle.join().expect("provider thread exits");

    let logs: Vec<String> = rx
        .try_iter()
        .filter_map(|delta| match delta {
            Delta::Log(line) => Some(line),
            Delta::SetData { .. } => None,
        })
        .collect();
    assert_eq!(logs, vec!["[INFO] Fetched fresh FPL data".to_string()]);
}
