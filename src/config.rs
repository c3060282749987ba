use std::path::PathBuf;
use std::time::Duration;

pub const FPL_FIXTURES_URL: &str = "https://fantasy.premierleague.com/api/fixtures/";
pub const FPL_BOOTSTRAP_URL: &str = "https://fantasy.premierleague.com/api/bootstrap-static/";

pub const APP_DIR: &str = "fpl_ticker";
pub const DEFAULT_STORE_KEY: &str = "saved_difficulties_v13";

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const MIN_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct TickerConfig {
    pub fixtures_url: String,
    pub bootstrap_url: String,
    pub cache_ttl: Duration,
    pub store_path: Option<PathBuf>,
    pub store_key: String,
    pub import_path: PathBuf,
    pub export_dir: PathBuf,
    pub log_path: Option<PathBuf>,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl TickerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cache_ttl_secs = get("FPL_CACHE_TTL_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS)
            .max(MIN_CACHE_TTL_SECS);

        let cache_dir = cache_dir_from(&get);

        Self {
            fixtures_url: get("FPL_FIXTURES_URL").unwrap_or_else(|| FPL_FIXTURES_URL.to_string()),
            bootstrap_url: get("FPL_BOOTSTRAP_URL")
                .unwrap_or_else(|| FPL_BOOTSTRAP_URL.to_string()),
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            store_path: get("TICKER_STORE_PATH")
                .map(PathBuf::from)
                .or_else(|| cache_dir.as_ref().map(|dir| dir.join("store.json"))),
            store_key: get("TICKER_STORE_KEY").unwrap_or_else(|| DEFAULT_STORE_KEY.to_string()),
            import_path: get("TICKER_IMPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("saved_difficulties.csv")),
            export_dir: get("TICKER_EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            log_path: get("TICKER_LOG_PATH")
                .map(PathBuf::from)
                .or_else(|| cache_dir.as_ref().map(|dir| dir.join("fpl_ticker.log"))),
        }
    }
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn app_cache_dir() -> Option<PathBuf> {
    cache_dir_from(&|key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
}

fn cache_dir_from(get: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Some(base) = get("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    // Fallback to ~/.cache on linux-like systems.
    let home = get("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}
