use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use fpl_ticker::config::{TickerConfig, load_dotenv};
use fpl_ticker::fpl_fetch::{FplData, fetch_fpl_data, normalize, parse_payload};
use fpl_ticker::logging;
use fpl_ticker::session::TickerSession;
use fpl_ticker::store::{FileStore, KeyValueStore, MemoryStore};
use fpl_ticker::ticker::TickerOutput;

fn main() -> Result<()> {
    load_dotenv();
    logging::init_stderr()?;
    let cfg = TickerConfig::from_env();

    let data = match (arg_value("--fixtures"), arg_value("--bootstrap")) {
        (Some(fixtures), Some(bootstrap)) => {
            load_local(Path::new(&fixtures), Path::new(&bootstrap))?
        }
        _ => fetch_fpl_data(&cfg),
    };
    if data.skipped > 0 {
        eprintln!("skipped {} fixtures with an unreadable gameweek", data.skipped);
    }

    let store: Box<dyn KeyValueStore> = match (&cfg.store_path, has_flag("--no-store")) {
        (Some(path), false) => Box::new(FileStore::new(path)),
        _ => Box::new(MemoryStore::new()),
    };
    let mut session = TickerSession::open(data, store, cfg.store_key.clone())?;

    let window = *session.window();
    let start = parse_gw("--from")?.unwrap_or(window.start());
    let end = parse_gw("--to")?.unwrap_or(window.end());
    session.set_range(start, end)?;
    session.set_excluded(parse_gw("--exclude")?)?;

    if has_flag("--csv") {
        print!("{}", session.export_sorted_csv()?);
        return Ok(());
    }

    let output = session.compute();
    println!("{}", session.window().title());
    println!();
    print_table(&output);
    println!();
    print_grid(&output);
    if let Some(notice) = output.missing_notice() {
        println!();
        println!("warning: {notice}");
    }
    Ok(())
}

fn load_local(fixtures: &Path, bootstrap: &Path) -> Result<FplData> {
    let fixtures = fs::read_to_string(fixtures)
        .with_context(|| format!("read {}", fixtures.display()))?;
    let bootstrap = fs::read_to_string(bootstrap)
        .with_context(|| format!("read {}", bootstrap.display()))?;
    Ok(normalize(parse_payload(&fixtures), parse_payload(&bootstrap)))
}

fn print_table(output: &TickerOutput) {
    println!(
        "{:<5} {:<24} {:>8} {:>8} {:>7}",
        "Team", "Name", "Total", "Avg", "Matches"
    );
    for stat in &output.stats {
        println!(
            "{:<5} {:<24} {:>8} {:>8.1} {:>7}",
            stat.team, stat.name, stat.total, stat.avg, stat.matches
        );
    }
}

fn print_grid(output: &TickerOutput) {
    let grid = &output.grid;
    let mut header = format!("{:<5}", "");
    for gw in &grid.gameweeks {
        let mark = if grid.is_excluded(*gw) { "*" } else { "" };
        header.push_str(&format!(" {:<12}", format!("GW{gw}{mark}")));
    }
    println!("{}", header.trim_end());
    for row in &grid.rows {
        let mut line = format!("{:<5}", row.team);
        for cell in &row.cells {
            line.push_str(&format!(" {:<12}", cell.label));
        }
        println!("{}", line.trim_end());
    }
    if let Some(gw) = grid.excluded {
        println!("* GW{gw} is shown but left out of totals");
    }
}

fn arg_value(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
        if arg == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == flag)
}

fn parse_gw(flag: &str) -> Result<Option<u32>> {
    arg_value(flag)
        .map(|raw| {
            raw.trim()
                .parse::<u32>()
                .with_context(|| format!("{flag} expects a gameweek number, got {raw:?}"))
        })
        .transpose()
}
