use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.football-data.org/v4";
const DEFAULT_COMPETITIONS: &[&str] = &["PL", "CL"];
const DEFAULT_INTERVAL_MIN: u64 = 10;
// One week.
const MAX_INTERVAL_MIN: u64 = 10_080;
const DEFAULT_WINDOW_DAYS: u32 = 7;
// Free tier allows 10 requests per minute.
const DEFAULT_REQUEST_DELAY_MS: u64 = 6_000;
const DEFAULT_THROTTLE_COOLDOWN_SECS: u64 = 60;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCORERS_LIMIT: u32 = 20;
const DEFAULT_FORM_WINDOW: usize = 5;
const DEFAULT_DB_PATH: &str = "data/sports.db";
const DEFAULT_SNAPSHOT_DIR: &str = "data/snapshots";

/// Settings for the rate-limited provider client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_delay: Duration,
    pub throttle_cooldown: Duration,
    /// `None` keeps retrying a throttled request until it succeeds.
    pub max_throttle_retries: Option<u32>,
    pub timeout: Duration,
    pub scorers_limit: u32,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub log: LogConfig,
    pub competitions: Vec<String>,
    pub interval: Duration,
    pub window_days: u32,
    pub db_path: PathBuf,
    pub snapshot_dir: Option<PathBuf>,
    pub form_window: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = get("FOOTBALL_API_KEY").filter(|v| v != "your_api_key_here");
        let base_url = get("API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let request_delay_ms = get("API_REQUEST_DELAY_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_DELAY_MS);
        let cooldown_secs = get("API_THROTTLE_COOLDOWN_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_THROTTLE_COOLDOWN_SECS)
            .max(1);
        let max_throttle_retries = get("API_MAX_THROTTLE_RETRIES")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0);
        let timeout_secs = get("API_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, 300);
        let scorers_limit = get("SCORERS_LIMIT")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_SCORERS_LIMIT)
            .clamp(1, 100);

        let competitions = get("DEFAULT_COMPETITIONS")
            .map(|raw| parse_competitions(&raw))
            .filter(|codes| !codes.is_empty())
            .unwrap_or_else(|| DEFAULT_COMPETITIONS.iter().map(|c| c.to_string()).collect());
        let interval_min = get("FETCH_INTERVAL_MINUTES")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_INTERVAL_MIN);
        let window_days = get("FETCH_WINDOW_DAYS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_WINDOW_DAYS)
            .clamp(1, 60);
        let form_window = get("FORM_WINDOW")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_FORM_WINDOW)
            .max(1);

        let db_path = get("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
        // An explicitly empty SNAPSHOT_DIR turns archival off.
        let snapshot_dir = match lookup("SNAPSHOT_DIR") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(PathBuf::from(raw.trim())),
            None => Some(PathBuf::from(DEFAULT_SNAPSHOT_DIR)),
        };

        Self {
            api: ApiConfig {
                base_url,
                api_key,
                request_delay: Duration::from_millis(request_delay_ms),
                throttle_cooldown: Duration::from_secs(cooldown_secs),
                max_throttle_retries,
                timeout: Duration::from_secs(timeout_secs),
                scorers_limit,
            },
            log: LogConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                file: get("LOG_FILE").map(PathBuf::from),
            },
            competitions,
            interval: interval_from_minutes(interval_min),
            window_days,
            db_path,
            snapshot_dir,
            form_window,
        }
    }

    pub fn with_interval_minutes(mut self, minutes: u64) -> Self {
        self.interval = interval_from_minutes(minutes);
        self
    }
}

fn interval_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.clamp(1, MAX_INTERVAL_MIN).saturating_mul(60))
}

/// Splits a code list like `"pl, CL;bl1"` into unique uppercase codes, keeping order.
pub fn parse_competitions(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split([',', ';', ' '])
        .map(|part| part.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .filter(|code| seen.insert(code.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.api.base_url, DEFAULT_BASE_URL);
        assert!(cfg.api.api_key.is_none());
        assert_eq!(cfg.competitions, vec!["PL", "CL"]);
        assert_eq!(cfg.interval, Duration::from_secs(600));
        assert_eq!(cfg.api.request_delay, Duration::from_secs(6));
        assert_eq!(cfg.api.throttle_cooldown, Duration::from_secs(60));
        assert!(cfg.api.max_throttle_retries.is_none());
        assert_eq!(cfg.snapshot_dir, Some(PathBuf::from(DEFAULT_SNAPSHOT_DIR)));
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn overrides_are_parsed_and_clamped() {
        let cfg = config_from(&[
            ("FOOTBALL_API_KEY", " secret "),
            ("API_BASE_URL", "http://localhost:9000/v4/"),
            ("DEFAULT_COMPETITIONS", "bl1, PL;pl"),
            ("FETCH_INTERVAL_MINUTES", "0"),
            ("FETCH_WINDOW_DAYS", "500"),
            ("API_MAX_THROTTLE_RETRIES", "3"),
            ("SNAPSHOT_DIR", ""),
        ]);
        assert_eq!(cfg.api.api_key.as_deref(), Some("secret"));
        assert_eq!(cfg.api.base_url, "http://localhost:9000/v4");
        assert_eq!(cfg.competitions, vec!["BL1", "PL"]);
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.window_days, 60);
        assert_eq!(cfg.api.max_throttle_retries, Some(3));
        assert!(cfg.snapshot_dir.is_none());
    }

    #[test]
    fn placeholder_api_key_is_ignored() {
        let cfg = config_from(&[("FOOTBALL_API_KEY", "your_api_key_here")]);
        assert!(cfg.api.api_key.is_none());
    }

    #[test]
    fn interval_override() {
        let cfg = config_from(&[]).with_interval_minutes(3);
        assert_eq!(cfg.interval, Duration::from_secs(180));
    }

    #[test]
    fn huge_intervals_are_capped_at_a_week() {
        let week = Duration::from_secs(MAX_INTERVAL_MIN * 60);
        let huge = u64::MAX.to_string();
        let cfg = config_from(&[("FETCH_INTERVAL_MINUTES", huge.as_str())]);
        assert_eq!(cfg.interval, week);
        assert_eq!(config_from(&[]).with_interval_minutes(u64::MAX).interval, week);
        assert_eq!(config_from(&[]).with_interval_minutes(0).interval, Duration::from_secs(60));
    }
}
