use std::io::{Read, Write};

use anyhow::{Context, Result};

use crate::difficulty::{Difficulty, DifficultyMap, parse_score};
use crate::ticker::TeamStat;

pub const DIFFICULTY_HEADERS: [&str; 3] = ["Team", "Home", "Away"];
pub const SORTED_HEADERS: [&str; 5] = ["Team", "Name", "Total", "Avg", "Matches"];

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("missing column {0}")]
    MissingColumn(&'static str),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Reads `Team,Home,Away`. Cells that do not parse as numbers import as
/// absent; blank team names are skipped; a repeated team keeps its last row.
pub fn import_difficulties<R: Read>(reader: R) -> Result<DifficultyMap, ImportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or(ImportError::MissingColumn(name))
    };
    let team_idx = column("Team")?;
    let home_idx = column("Home")?;
    let away_idx = column("Away")?;

    let mut map = DifficultyMap::new();
    for record in rdr.records() {
        let record = record?;
        let team = record.get(team_idx).unwrap_or_default();
        if team.is_empty() {
            continue;
        }
        map.insert(
            team,
            Difficulty {
                home: record.get(home_idx).and_then(parse_score),
                away: record.get(away_idx).and_then(parse_score),
            },
        );
    }
    Ok(map)
}

pub fn export_difficulties<W: Write>(map: &DifficultyMap, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(DIFFICULTY_HEADERS)
        .context("write difficulty header")?;
    for (team, row) in map.iter() {
        let home = format_score(row.home);
        let away = format_score(row.away);
        wtr.write_record([team.as_str(), home.as_str(), away.as_str()])
            .with_context(|| format!("write difficulty row {team}"))?;
    }
    wtr.flush().context("flush difficulty csv")?;
    Ok(())
}

pub fn difficulties_to_csv_string(map: &DifficultyMap) -> Result<String> {
    let mut buf = Vec::new();
    export_difficulties(map, &mut buf)?;
    String::from_utf8(buf).context("difficulty csv is not utf8")
}

pub fn export_sorted_table<W: Write>(stats: &[TeamStat], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(SORTED_HEADERS)
        .context("write sorted header")?;
    for stat in stats {
        let total = stat.total.to_string();
        let avg = format!("{:.1}", stat.avg);
        let matches = stat.matches.to_string();
        wtr.write_record([
            stat.team.as_str(),
            stat.name.as_str(),
            total.as_str(),
            avg.as_str(),
            matches.as_str(),
        ])
        .with_context(|| format!("write sorted row {}", stat.team))?;
    }
    wtr.flush().context("flush sorted csv")?;
    Ok(())
}

pub fn sorted_table_to_csv_string(stats: &[TeamStat]) -> Result<String> {
    let mut buf = Vec::new();
    export_sorted_table(stats, &mut buf)?;
    String::from_utf8(buf).context("sorted csv is not utf8")
}

fn format_score(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() && v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}
