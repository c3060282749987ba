use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::difficulty::{Difficulty, DifficultyMap, coerce_score};

const STORE_VERSION: u32 = 1;

/// Session-scoped key-value persistence. The difficulty map is the only blob
/// the ticker reads or writes through it.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, blob: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, blob: &str) -> Self {
        let mut store = Self::new();
        store.entries.insert(key.to_string(), blob.to_string());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> Result<()> {
        self.entries.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreFile {
    version: u32,
    entries: HashMap<String, String>,
}

/// All keys live in one JSON file, rewritten through a temp file + rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<StoreFile>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read store {}", self.path.display()));
            }
        };
        let file = serde_json::from_str::<StoreFile>(&raw)
            .with_context(|| format!("parse store {}", self.path.display()))?;
        if file.version != STORE_VERSION {
            bail!("unsupported store version {}", file.version);
        }
        Ok(Some(file))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_file()?
            .and_then(|mut file| file.entries.remove(key)))
    }

    fn set(&mut self, key: &str, blob: &str) -> Result<()> {
        // An unreadable file is replaced rather than blocking every save.
        let mut file = match self.read_file() {
            Ok(Some(file)) => file,
            Ok(None) => StoreFile::default(),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "discarding unreadable store file");
                StoreFile::default()
            }
        };
        file.version = STORE_VERSION;
        file.entries.insert(key.to_string(), blob.to_string());

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create store dir {}", dir.display()))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string(&file).context("serialize store")?;
        fs::write(&tmp, json).context("write store")?;
        fs::rename(&tmp, &self.path).context("swap store")?;
        debug!(path = %self.path.display(), key, "store written");
        Ok(())
    }
}

pub fn encode_difficulties(map: &DifficultyMap) -> Result<String> {
    serde_json::to_string(map).context("serialize difficulties")
}

/// Parses a stored blob. The blob must be an object of team rows and carry
/// both a `Home` and an `Away` column somewhere; cells are coerced leniently.
pub fn decode_difficulties(blob: &str) -> Result<DifficultyMap> {
    let root: Value = serde_json::from_str(blob.trim()).context("difficulties blob is not json")?;
    let Value::Object(rows) = root else {
        bail!("difficulties blob is not an object");
    };

    let mut has_home = false;
    let mut has_away = false;
    let mut map = DifficultyMap::new();
    for (code, row) in rows {
        let Value::Object(cells) = row else {
            bail!("difficulties row {code} is not an object");
        };
        has_home |= cells.contains_key("Home");
        has_away |= cells.contains_key("Away");
        map.insert(
            code,
            Difficulty {
                home: cells.get("Home").and_then(coerce_score),
                away: cells.get("Away").and_then(coerce_score),
            },
        );
    }
    if !has_home || !has_away {
        bail!("difficulties blob lacks Home/Away columns");
    }
    Ok(map)
}

/// `None` when nothing is stored or the stored blob is unusable.
pub fn load_difficulties(store: &dyn KeyValueStore, key: &str) -> Option<DifficultyMap> {
    let blob = match store.get(key) {
        Ok(Some(blob)) => blob,
        Ok(None) => return None,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "store read failed");
            return None;
        }
    };
    match decode_difficulties(&blob) {
        Ok(map) => Some(map),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "discarding malformed saved difficulties");
            None
        }
    }
}

pub fn save_difficulties(store: &mut dyn KeyValueStore, key: &str, map: &DifficultyMap) -> Result<()> {
    let blob = encode_difficulties(map)?;
    store.set(key, &blob).context("persist difficulties")
}
