use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ApiConfig;
use crate::http_client::{ReqwestTransport, Transport};
use crate::shutdown::StopSignal;
use crate::snapshot::SnapshotArchiver;

const AUTH_HEADER: &str = "X-Auth-Token";

pub type Query = Vec<(String, String)>;

/// A request whose result is absent. The caller decides whether to skip or abort.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{endpoint}: http {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("{endpoint}: request failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint}: invalid json body: {message}")]
    Decode { endpoint: String, message: String },
    #[error("{endpoint}: still throttled after {attempts} attempts")]
    Throttled { endpoint: String, attempts: u32 },
    #[error("{endpoint}: cancelled by stop request")]
    Cancelled { endpoint: String },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::Status { endpoint, .. }
            | FetchError::Transport { endpoint, .. }
            | FetchError::Decode { endpoint, .. }
            | FetchError::Throttled { endpoint, .. }
            | FetchError::Cancelled { endpoint } => endpoint,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Throttled { .. } => Some(429),
            _ => None,
        }
    }
}

/// Everything one recent-window pass managed to fetch, keyed by competition code.
#[derive(Debug, Clone, Default)]
pub struct RecentWindow {
    pub competitions: Vec<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub matches: BTreeMap<String, Value>,
    pub standings: BTreeMap<String, Value>,
    pub scorers: BTreeMap<String, Value>,
    pub failures: Vec<String>,
    /// Set when a stop request cut the pass short.
    pub interrupted: bool,
}

pub struct RateLimitedClient<T: Transport = ReqwestTransport> {
    transport: T,
    cfg: ApiConfig,
    archiver: Option<SnapshotArchiver>,
    stop: StopSignal,
    last_request: Option<Instant>,
}

impl RateLimitedClient<ReqwestTransport> {
    pub fn from_config(cfg: ApiConfig, archiver: Option<SnapshotArchiver>) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(cfg.timeout)?;
        Ok(Self::new(transport, cfg, archiver))
    }
}

impl<T: Transport> RateLimitedClient<T> {
    pub fn new(transport: T, cfg: ApiConfig, archiver: Option<SnapshotArchiver>) -> Self {
        if cfg.api_key.is_none() {
            warn!("API key not configured; set FOOTBALL_API_KEY");
        }
        Self {
            transport,
            cfg,
            archiver,
            stop: StopSignal::new(),
            last_request: None,
        }
    }

    /// Pacing and cooldown sleeps end early, and no new attempt starts, once `stop` is set.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GETs `{base_url}/{endpoint}` and archives the body under a name derived from the endpoint.
    pub fn fetch(&mut self, endpoint: &str, query: &[(String, String)]) -> Result<Value, FetchError> {
        let name = endpoint.replace('/', "_");
        self.fetch_named(endpoint, query, &name)
    }

    fn fetch_named(
        &mut self,
        endpoint: &str,
        query: &[(String, String)],
        snapshot_name: &str,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.cfg.base_url, endpoint.trim_start_matches('/'));
        let mut headers: Vec<(&str, &str)> = Vec::new();
        if let Some(key) = self.cfg.api_key.as_deref() {
            headers.push((AUTH_HEADER, key));
        }

        let cancelled = || {
            info!(endpoint, "request cancelled by stop request");
            FetchError::Cancelled {
                endpoint: endpoint.to_string(),
            }
        };

        let mut throttled = 0u32;
        loop {
            if !pace(&mut self.last_request, self.cfg.request_delay, &self.stop) {
                return Err(cancelled());
            }
            let started = Instant::now();
            let resp = match self.transport.get(&url, query, &headers) {
                Ok(resp) => resp,
                Err(err) => {
                    error!(endpoint, "request failed: {err:#}");
                    return Err(FetchError::Transport {
                        endpoint: endpoint.to_string(),
                        message: format!("{err:#}"),
                    });
                }
            };

            match resp.status {
                200..=299 => {
                    let latency = started.elapsed();
                    let value = serde_json::from_str::<Value>(resp.body.trim()).map_err(|err| {
                        error!(endpoint, "invalid json body: {err}");
                        FetchError::Decode {
                            endpoint: endpoint.to_string(),
                            message: err.to_string(),
                        }
                    })?;
                    info!(endpoint, latency_ms = latency.as_millis() as u64, "fetch succeeded");
                    if resp.status == 200
                        && let Some(archiver) = self.archiver.as_ref()
                    {
                        archiver.archive(&value, snapshot_name);
                    }
                    return Ok(value);
                }
                429 => {
                    throttled += 1;
                    if let Some(max) = self.cfg.max_throttle_retries
                        && throttled > max
                    {
                        error!(endpoint, attempts = throttled, "giving up on throttled request");
                        return Err(FetchError::Throttled {
                            endpoint: endpoint.to_string(),
                            attempts: throttled,
                        });
                    }
                    warn!(
                        endpoint,
                        cooldown_secs = self.cfg.throttle_cooldown.as_secs_f64(),
                        "rate limit exceeded, cooling down"
                    );
                    if !self.stop.sleep(self.cfg.throttle_cooldown) {
                        return Err(cancelled());
                    }
                }
                status => {
                    error!(endpoint, status, "provider error: {}", truncate(&resp.body, 200));
                    return Err(FetchError::Status {
                        endpoint: endpoint.to_string(),
                        status,
                        message: truncate(&resp.body, 500),
                    });
                }
            }
        }
    }

    pub fn fetch_competitions(&mut self) -> Result<Value, FetchError> {
        info!("fetching competitions");
        self.fetch_named("competitions", &[], "competitions")
    }

    /// Matches for one competition, or across competitions when `competition` is `None`.
    pub fn fetch_matches(
        &mut self,
        competition: Option<&str>,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
        status: Option<&str>,
    ) -> Result<Value, FetchError> {
        let mut query = date_query(date_from, date_to);
        if let Some(status) = status {
            query.push(("status".to_string(), status.to_ascii_uppercase()));
        }
        match competition {
            Some(code) => {
                info!(competition = code, "fetching matches");
                self.fetch_named(
                    &format!("competitions/{code}/matches"),
                    &query,
                    &format!("matches_{code}"),
                )
            }
            None => {
                info!("fetching matches across competitions");
                self.fetch_named("matches", &query, "matches_all")
            }
        }
    }

    pub fn fetch_team(&mut self, team_id: u32) -> Result<Value, FetchError> {
        info!(team_id, "fetching team");
        self.fetch_named(&format!("teams/{team_id}"), &[], &format!("team_{team_id}"))
    }

    pub fn fetch_team_matches(
        &mut self,
        team_id: u32,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> Result<Value, FetchError> {
        info!(team_id, "fetching team matches");
        let query = date_query(date_from, date_to);
        self.fetch_named(
            &format!("teams/{team_id}/matches"),
            &query,
            &format!("team_{team_id}_matches"),
        )
    }

    pub fn fetch_standings(&mut self, competition: &str) -> Result<Value, FetchError> {
        info!(competition, "fetching standings");
        self.fetch_named(
            &format!("competitions/{competition}/standings"),
            &[],
            &format!("standings_{competition}"),
        )
    }

    pub fn fetch_scorers(&mut self, competition: &str, limit: u32) -> Result<Value, FetchError> {
        info!(competition, limit, "fetching top scorers");
        let query = vec![("limit".to_string(), limit.to_string())];
        self.fetch_named(
            &format!("competitions/{competition}/scorers"),
            &query,
            &format!("scorers_{competition}"),
        )
    }

    /// One matches, standings and scorers request per competition, in order.
    /// A failed sub-fetch is recorded and the pass moves on; a stop request ends the pass.
    pub fn fetch_recent_window(&mut self, competitions: &[String], days: u32) -> RecentWindow {
        let date_to = Utc::now().date_naive();
        let date_from = date_to
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(date_to);

        let mut window = RecentWindow {
            competitions: competitions.to_vec(),
            date_from: Some(date_from),
            date_to: Some(date_to),
            ..RecentWindow::default()
        };

        let limit = self.cfg.scorers_limit;
        'competitions: for code in competitions {
            info!(competition = %code, %date_from, %date_to, "processing competition");

            for kind in [WindowFetch::Matches, WindowFetch::Standings, WindowFetch::Scorers] {
                if self.stop.is_triggered() {
                    window.interrupted = true;
                    break 'competitions;
                }
                let result = match kind {
                    WindowFetch::Matches => {
                        self.fetch_matches(Some(code.as_str()), Some(date_from), Some(date_to), None)
                    }
                    WindowFetch::Standings => self.fetch_standings(code),
                    WindowFetch::Scorers => self.fetch_scorers(code, limit),
                };
                match result {
                    Ok(v) => {
                        let slot = match kind {
                            WindowFetch::Matches => &mut window.matches,
                            WindowFetch::Standings => &mut window.standings,
                            WindowFetch::Scorers => &mut window.scorers,
                        };
                        slot.insert(code.clone(), v);
                    }
                    Err(FetchError::Cancelled { .. }) => {
                        window.interrupted = true;
                        break 'competitions;
                    }
                    Err(err) => window.failures.push(err.to_string()),
                }
            }
        }

        info!(
            competitions = competitions.len(),
            failures = window.failures.len(),
            interrupted = window.interrupted,
            "recent window fetch completed"
        );
        window
    }
}

#[derive(Debug, Clone, Copy)]
enum WindowFetch {
    Matches,
    Standings,
    Scorers,
}

/// Waits out the remaining spacing since the last request. False when stopped first.
fn pace(last_request: &mut Option<Instant>, spacing: Duration, stop: &StopSignal) -> bool {
    if let Some(last) = *last_request {
        let elapsed = last.elapsed();
        if elapsed < spacing {
            let wait = spacing - elapsed;
            debug!(wait_ms = wait.as_millis() as u64, "rate limiting");
            if !stop.sleep(wait) {
                return false;
            }
        }
    }
    if stop.is_triggered() {
        return false;
    }
    *last_request = Some(Instant::now());
    true
}

fn date_query(date_from: Option<NaiveDate>, date_to: Option<NaiveDate>) -> Query {
    let mut query = Query::new();
    if let Some(from) = date_from {
        query.push(("dateFrom".to_string(), from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = date_to {
        query.push(("dateTo".to_string(), to.format("%Y-%m-%d").to_string()));
    }
    query
}

fn truncate(raw: &str, max: usize) -> String {
    if raw.chars().count() <= max {
        return raw.to_string();
    }
    let mut out: String = raw.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_query_uses_iso_dates() {
        let from = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 8, 8).unwrap();
        let q = date_query(Some(from), Some(to));
        assert_eq!(
            q,
            vec![
                ("dateFrom".to_string(), "2024-08-01".to_string()),
                ("dateTo".to_string(), "2024-08-08".to_string()),
            ]
        );
        assert!(date_query(None, None).is_empty());
    }

    #[test]
    fn truncate_keeps_short_bodies() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }

    #[test]
    fn first_request_is_not_delayed() {
        let mut last = None;
        let start = Instant::now();
        assert!(pace(&mut last, Duration::from_secs(5), &StopSignal::new()));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(last.is_some());
    }

    #[test]
    fn stopped_pace_does_not_record_a_request() {
        let stop = StopSignal::new();
        stop.trigger();
        let mut last = None;
        assert!(!pace(&mut last, Duration::from_secs(5), &stop));
        assert!(last.is_none());
    }
}
