use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};

use fpl_ticker::difficulty::{Difficulty, SLIDER_MAX, Venue};
use fpl_ticker::fpl_fetch::{FplData, UNAVAILABLE_MESSAGE, normalize, parse_payload};
use fpl_ticker::session::{MapOrigin, SliderPair, TickerSession};
use fpl_ticker::store::{KeyValueStore, MemoryStore, decode_difficulties};

const KEY: &str = "saved_difficulties_v13";

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

/// Store handle the test keeps a clone of, to look at what the session wrote.
#[derive(Clone, Default)]
struct SharedStore(Arc<Mutex<HashMap<String, String>>>);

impl SharedStore {
    fn blob(&self) -> Option<String> {
        self.0.lock().expect("store lock").get(KEY).cloned()
    }
}

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.0.lock().expect("store lock").get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> Result<()> {
        self.0
            .lock()
            .expect("store lock")
            .insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    fn set(&mut self, _key: &str, _blob: &str) -> Result<()> {
        bail!("disk full")
    }
}

fn open_shared() -> (TickerSession, SharedStore) {
    let store = SharedStore::default();
    let session =
        TickerSession::open(fpl_data(), Box::new(store.clone()), KEY).expect("session opens");
    (session, store)
}

#[test]
fn opens_with_defaults_when_nothing_saved() {
    let (session, store) = open_shared();
    assert_eq!(session.origin(), MapOrigin::Defaults);
    assert_eq!(session.difficulties().len(), 5);
    assert_eq!(
        session.difficulties().get("ARS"),
        Some(&Difficulty::new(1750.0, 1950.0))
    );
    assert_eq!(
        session.difficulties().get("20"),
        Some(&Difficulty::new(1250.0, 1350.0))
    );
    assert_eq!((session.window().start(), session.window().end()), (2, 2));
    assert_eq!(
        session.slider("WOL"),
        Some(SliderPair {
            home: 750,
            away: 800
        })
    );
    // Opening alone never writes.
    assert_eq!(store.blob(), None);
}

#[test]
fn saved_map_is_extended_to_current_teams() {
    let blob = r#"{"ARS": {"Home": 1000, "Away": 1100}, "OLD": {"Home": 900, "Away": 950}}"#;
    let store = MemoryStore::with_entry(KEY, blob);
    let session = TickerSession::open(fpl_data(), Box::new(store), KEY).expect("session opens");

    assert_eq!(session.origin(), MapOrigin::Saved);
    assert_eq!(
        session.difficulties().get("ARS"),
        Some(&Difficulty::new(1000.0, 1100.0))
    );
    assert_eq!(
        session.difficulties().get("CHE"),
        Some(&Difficulty::new(1450.0, 1600.0))
    );
    assert!(session.difficulties().contains("OLD"));
    assert_eq!(session.difficulties().len(), 6);
}

#[test]
fn malformed_saved_map_falls_back_to_defaults() {
    let store = MemoryStore::with_entry(KEY, r#"{"ARS": [1, 2]}"#);
    let session = TickerSession::open(fpl_data(), Box::new(store), KEY).expect("session opens");
    assert_eq!(session.origin(), MapOrigin::Defaults);
    assert_eq!(
        session.difficulties().get("ARS"),
        Some(&Difficulty::new(1750.0, 1950.0))
    );
}

#[test]
fn unavailable_data_does_not_open() {
    let err = TickerSession::open(FplData::default(), Box::new(MemoryStore::new()), KEY)
        .expect_err("no data");
    assert_eq!(err.to_string(), UNAVAILABLE_MESSAGE);
}

#[test]
fn edits_persist_the_whole_map() {
    let (mut session, store) = open_shared();
    session
        .set_difficulty("CHE", Venue::Home, Some(1525.0))
        .expect("edit saves");

    let saved = decode_difficulties(&store.blob().expect("blob written")).expect("blob decodes");
    assert_eq!(&saved, session.difficulties());
    assert_eq!(saved.get("CHE").and_then(|d| d.home), Some(1525.0));
    assert_eq!(saved.len(), 5);
}

#[test]
fn failed_save_keeps_the_edit_in_memory() {
    let mut session =
        TickerSession::open(fpl_data(), Box::new(FailingStore), KEY).expect("session opens");
    assert!(session.set_difficulty("ARS", Venue::Away, Some(1200.0)).is_err());
    assert_eq!(
        session.difficulties().get("ARS").and_then(|d| d.away),
        Some(1200.0)
    );
}

#[test]
fn sliders_apply_only_on_request() {
    let (mut session, store) = open_shared();
    session.stage_slider("ARS", Venue::Home, 600);
    assert_eq!(session.nudge_slider("ARS", Venue::Away, 500), SLIDER_MAX);
    assert_eq!(
        session.difficulties().get("ARS"),
        Some(&Difficulty::new(1750.0, 1950.0))
    );
    assert_eq!(store.blob(), None);

    session.apply_sliders().expect("apply saves");
    assert_eq!(
        session.difficulties().get("ARS"),
        Some(&Difficulty::new(600.0, 2000.0))
    );
    assert!(store.blob().is_some());

    assert_eq!(
        session.slider("ARS"),
        Some(SliderPair {
            home: 600,
            away: 2000
        })
    );
}

#[test]
fn range_is_clamped_and_stale_exclusion_dropped() {
    let (mut session, _) = open_shared();
    session.set_range(0, 40).expect("range set");
    assert_eq!((session.window().start(), session.window().end()), (1, 2));

    session.set_excluded(Some(2)).expect("exclude");
    session.set_range(1, 1).expect("range set");
    assert_eq!(session.window().excluded(), None);

    assert!(session.set_range(2, 1).is_err());
}

#[test]
fn exclusion_cycles_through_range() {
    let (mut session, _) = open_shared();
    session.set_range(1, 2).expect("range set");
    assert_eq!(session.exclusion_options(), vec![None, Some(1), Some(2)]);
    assert_eq!(session.cycle_excluded().expect("cycle"), Some(1));
    assert_eq!(session.cycle_excluded().expect("cycle"), Some(2));
    assert_eq!(session.cycle_excluded().expect("cycle"), None);

    session.cycle_excluded().expect("cycle");
    let out = session.compute();
    let matches: u32 = out.stats.iter().map(|s| s.matches).sum();
    // GW1 is excluded: only the two GW2 fixtures count.
    assert_eq!(matches, 4);
    assert_eq!(out.grid.excluded, Some(1));
}

#[test]
fn import_replaces_map_and_reseeds_sliders() {
    let (mut session, store) = open_shared();
    let rows = session
        .import_csv(read_fixture("saved_difficulties.csv").as_bytes())
        .expect("import succeeds");
    assert_eq!(rows, 4);
    assert_eq!(
        session.difficulties().get("ARS"),
        Some(&Difficulty::new(1800.0, 1900.0))
    );
    // Teams missing from the file come back with defaults.
    assert_eq!(
        session.difficulties().get("20"),
        Some(&Difficulty::new(1250.0, 1350.0))
    );
    assert_eq!(
        session.slider("ARS"),
        Some(SliderPair {
            home: 1800,
            away: 1900
        })
    );
    // CHE Away did not parse: the slider starts from the default instead.
    assert_eq!(session.slider("CHE").map(|s| s.away), Some(1600));
    assert!(store.blob().is_some());
}

#[test]
fn failed_import_leaves_map_untouched() {
    let (mut session, store) = open_shared();
    let before = session.difficulties().clone();
    assert!(session.import_csv("Name,Value\nARS,1\n".as_bytes()).is_err());
    assert_eq!(session.difficulties(), &before);
    assert_eq!(store.blob(), None);
}

#[test]
fn unsaved_import_is_rolled_back() {
    let mut session =
        TickerSession::open(fpl_data(), Box::new(FailingStore), KEY).expect("session opens");
    let before = session.difficulties().clone();
    let sliders_before = session.slider("ARS");

    let err = session
        .import_csv("Team,Home,Away\nARS,600,600\n".as_bytes())
        .expect_err("save fails");
    assert!(format!("{err:#}").contains("disk full"));
    assert_eq!(session.difficulties(), &before);
    assert_eq!(
        session.difficulties().get("ARS"),
        Some(&Difficulty::new(1750.0, 1950.0))
    );
    assert_eq!(session.slider("ARS"), sliders_before);
}

#[test]
fn refreshed_data_adds_new_teams() {
    let (mut session, _) = open_shared();
    session.set_range(1, 2).expect("range set");
    let fixtures = r#"[
        {"event": 1, "team_h": 1, "team_a": 9, "kickoff_time": null}
    ]"#;
    let bootstrap = r#"{"teams": [
        {"id": 1, "name": "Arsenal", "short_name": "ARS"},
        {"id": 9, "name": "Sunderland", "short_name": "SUN"}
    ]}"#;
    let data = normalize(parse_payload(fixtures), parse_payload(bootstrap));
    session.replace_data(data).expect("refresh applies");

    assert_eq!(
        session.difficulties().get("SUN"),
        Some(&Difficulty::new(1000.0, 1150.0))
    );
    assert!(session.slider("SUN").is_some());
    assert_eq!((session.window().start(), session.window().end()), (1, 1));
    assert!(session.replace_data(FplData::default()).is_err());
}

#[test]
fn sorted_export_follows_window() {
    let (mut session, _) = open_shared();
    session.set_range(1, 1).expect("range set");
    let csv = session.export_sorted_csv().expect("exports");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Team,Name,Total,Avg,Matches"));
    // Team 20 plays nothing in GW1 and sorts first with a zero total.
    assert_eq!(lines.next(), Some("20,Team 20,0,0.0,0"));
}
