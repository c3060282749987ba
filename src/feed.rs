use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use tracing::{info, warn};

use crate::config::TickerConfig;
use crate::fpl_fetch::{FplData, FplDataCache, fetch_fpl_data};
use crate::state::{Delta, ProviderCommand};

const COMMAND_POLL: Duration = Duration::from_millis(500);

/// Background fetcher for the TUI. Fetches once on start, again whenever the
/// cache TTL lapses, and on every `FetchData` command.
pub fn spawn_provider(
    cfg: TickerConfig,
    tx: Sender<Delta>,
    cmd_rx: Receiver<ProviderCommand>,
) -> JoinHandle<()> {
    let ttl = cfg.cache_ttl;
    spawn_provider_with(ttl, move || fetch_fpl_data(&cfg), tx, cmd_rx)
}

pub fn spawn_provider_with<F>(
    ttl: Duration,
    fetch: F,
    tx: Sender<Delta>,
    cmd_rx: Receiver<ProviderCommand>,
) -> JoinHandle<()>
where
    F: Fn() -> FplData + Send + 'static,
{
    thread::spawn(move || {
        let mut cache = FplDataCache::new(ttl);
        let mut last_refresh = Instant::now();
        if publish(&mut cache, &fetch, &tx).is_none() {
            return;
        }

        loop {
            let requested = match cmd_rx.recv_timeout(COMMAND_POLL) {
                Ok(ProviderCommand::FetchData) => true,
                Err(RecvTimeoutError::Timeout) => {
                    if last_refresh.elapsed() < ttl {
                        continue;
                    }
                    false
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            last_refresh = Instant::now();
            let Some(cached) = publish(&mut cache, &fetch, &tx) else {
                break;
            };
            if requested {
                let line = if cached {
                    "[INFO] Serving cached FPL data"
                } else {
                    "[INFO] Fetched fresh FPL data"
                };
                if tx.send(Delta::Log(line.to_string())).is_err() {
                    break;
                }
            }
        }
    })
}

/// Returns whether the cache served the data, or `None` once the UI side has
/// hung up.
fn publish<F>(cache: &mut FplDataCache, fetch: &F, tx: &Sender<Delta>) -> Option<bool>
where
    F: Fn() -> FplData,
{
    let now = SystemTime::now();
    let (data, cached) = cache.get_or_fetch(now, fetch);
    if data.is_available() {
        info!(
            fixtures = data.fixtures.len(),
            teams = data.team_codes.len(),
            cached,
            "fpl data ready"
        );
    } else {
        warn!("fpl data unavailable");
    }
    let fetched_at = if cached {
        cache.fetched_at().unwrap_or(now)
    } else {
        now
    };
    tx.send(Delta::SetData {
        data,
        fetched_at,
        cached,
    })
    .ok()
    .map(|()| cached)
}
