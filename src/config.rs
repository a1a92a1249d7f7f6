use std::{env, path::PathBuf, str::FromStr, time::Duration};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3000/api";
pub const DEFAULT_STORAGE_PATH: &str = "data/storage.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub api_base_url: String,
    pub storage_path: PathBuf,
    pub stale_window: Duration,
    pub request_timeout: Duration,
    pub storage_poll_interval: Duration,
    pub redirect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_base_url: DEFAULT_API_URL.to_string(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            stale_window: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
            storage_poll_interval: Duration::from_millis(1000),
            redirect_delay: Duration::from_millis(2000),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unparseable values fall
    /// back to the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("OFR_API_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.api_base_url);

        let storage_path = lookup("OFR_STORAGE_PATH")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_path);

        Self {
            port: parse_or(&lookup, "PORT", defaults.port),
            api_base_url,
            storage_path,
            stale_window: Duration::from_secs(parse_or(
                &lookup,
                "OFR_STALE_WINDOW_SECS",
                defaults.stale_window.as_secs(),
            )),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "OFR_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            storage_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "OFR_STORAGE_POLL_MS",
                defaults.storage_poll_interval.as_millis() as u64,
            )),
            redirect_delay: Duration::from_millis(parse_or(
                &lookup,
                "OFR_REDIRECT_DELAY_MS",
                defaults.redirect_delay.as_millis() as u64,
            )),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("ignoring invalid value for {key}: {raw:?}");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert_eq!(config.stale_window, Duration::from_secs(30));
        assert_eq!(config.redirect_delay, Duration::from_secs(2));
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "9090"),
            ("OFR_API_URL", " https://api.example.test/v1 "),
            ("OFR_STALE_WINDOW_SECS", "not-a-number"),
            ("OFR_STORAGE_POLL_MS", "250"),
        ]));
        assert_eq!(config.port, 9090);
        assert_eq!(config.api_base_url, "https://api.example.test/v1");
        assert_eq!(config.stale_window, Duration::from_secs(30));
        assert_eq!(config.storage_poll_interval, Duration::from_millis(250));
    }
}
