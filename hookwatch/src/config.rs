//! Runtime configuration.
//!
//! Every tunable has a default matching the reference device firmware and
//! app behavior; [`Config::from_env`] overrides them from `HOOKWATCH_*`
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Device link tunables.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Interval between `status.json` requests in HTTP polling mode.
    pub poll_interval: Duration,

    /// Upper bound on a single poll request. Must be shorter than
    /// `poll_interval` for the poll cadence to hold.
    pub poll_timeout: Duration,

    /// First delay before reconnecting a dropped WebSocket. Doubles on each
    /// failed attempt up to `reconnect_max`.
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(700),
            poll_timeout: Duration::from_millis(600),
            reconnect_initial: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Unhook episode monitor tunables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How long both sensors must read unhooked before an alert fires.
    pub dwell: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dwell: Duration::from_millis(5000),
        }
    }
}

/// Remote push relay endpoint.
#[derive(Debug, Clone)]
pub struct PushConfig {
    pub url: String,
    pub token: String,
}

/// Remote alert history table (PostgREST-style REST endpoint).
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Device to connect to at startup. Falls back to the last address
    /// stored in the key-value store when unset.
    pub device_address: Option<String>,
    pub link: LinkConfig,
    pub monitor: MonitorConfig,

    /// Minimum interval between repeated notifications or history records
    /// for the same logical event.
    pub debounce_window: Duration,

    /// JSON file backing the key-value store.
    pub state_file: PathBuf,

    pub push: Option<PushConfig>,
    pub history: Option<HistoryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_address: None,
            link: LinkConfig::default(),
            monitor: MonitorConfig::default(),
            debounce_window: Duration::from_millis(10_000),
            state_file: PathBuf::from("hookwatch-state.json"),
            push: None,
            history: None,
        }
    }
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        config.device_address = lookup("HOOKWATCH_DEVICE").filter(|s| !s.trim().is_empty());

        if let Some(ms) = millis(&lookup, "HOOKWATCH_POLL_MS")? {
            config.link.poll_interval = ms;
        }
        if let Some(ms) = millis(&lookup, "HOOKWATCH_POLL_TIMEOUT_MS")? {
            config.link.poll_timeout = ms;
        }
        if let Some(ms) = millis(&lookup, "HOOKWATCH_RECONNECT_MS")? {
            config.link.reconnect_initial = ms;
        }
        if let Some(ms) = millis(&lookup, "HOOKWATCH_RECONNECT_MAX_MS")? {
            config.link.reconnect_max = ms;
        }
        if let Some(ms) = millis(&lookup, "HOOKWATCH_DWELL_MS")? {
            config.monitor.dwell = ms;
        }
        if let Some(ms) = millis(&lookup, "HOOKWATCH_DEBOUNCE_MS")? {
            config.debounce_window = ms;
        }
        if let Some(path) = lookup("HOOKWATCH_STATE_FILE") {
            config.state_file = PathBuf::from(path);
        }

        config.push = match (lookup("HOOKWATCH_PUSH_URL"), lookup("HOOKWATCH_PUSH_TOKEN")) {
            (Some(url), Some(token)) => Some(PushConfig { url, token }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "HOOKWATCH_PUSH_URL and HOOKWATCH_PUSH_TOKEN must be set together".into(),
                ));
            }
        };

        config.history = match (lookup("HOOKWATCH_HISTORY_URL"), lookup("HOOKWATCH_HISTORY_KEY")) {
            (Some(base_url), Some(api_key)) => Some(HistoryConfig {
                base_url,
                api_key,
                table: lookup("HOOKWATCH_HISTORY_TABLE").unwrap_or_else(|| "alert_history".into()),
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Config(
                    "HOOKWATCH_HISTORY_URL and HOOKWATCH_HISTORY_KEY must be set together".into(),
                ));
            }
        };

        Ok(config)
    }
}

fn millis<F>(lookup: &F, name: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| Error::Config(format!("{name} must be a whole number of milliseconds, got {raw:?}")))
}
