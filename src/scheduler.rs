use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, warn};

use crate::api_client::RateLimitedClient;
use crate::http_client::Transport;
use crate::pipeline::{IngestReport, ingest_matches, log_scorers};
pub use crate::shutdown::StopSignal;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Waiting,
    Stopped,
}

/// One unit of scheduled work plus the resources it owns.
pub trait Cycle {
    type Report: fmt::Debug;

    fn run(&mut self) -> Result<Self::Report>;

    /// Releases owned resources. Called exactly once when the scheduler exits.
    fn shutdown(self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub cycles: usize,
    pub failures: usize,
}

pub struct Scheduler<C: Cycle> {
    cycle: C,
    interval: Duration,
    stop: StopSignal,
    state: SchedulerState,
    stats: RunStats,
}

impl<C: Cycle> Scheduler<C> {
    pub fn new(cycle: C, interval: Duration, stop: StopSignal) -> Self {
        Self {
            cycle,
            interval,
            stop,
            state: SchedulerState::Idle,
            stats: RunStats::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// A single cycle, then cleanup. Never enters the waiting state.
    pub fn run_once(mut self) -> Result<RunStats> {
        info!("running one-time fetch");
        self.tick();
        self.finish()
    }

    /// Runs immediately, then once per interval until the stop signal is set.
    pub fn start(mut self) -> Result<RunStats> {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "starting ingestion scheduler"
        );
        let mut deadline = Instant::now();
        while !self.stop.is_triggered() {
            self.tick();

            let now = Instant::now();
            deadline = deadline.checked_add(self.interval).unwrap_or(now);
            if deadline < now {
                warn!("cycle overran the interval; next cycle starts now");
                deadline = now;
            }
            if !self.wait_until(deadline) {
                break;
            }
        }
        info!("scheduler stopped");
        self.finish()
    }

    fn tick(&mut self) {
        self.state = SchedulerState::Running;
        let started = Instant::now();
        match self.cycle.run() {
            Ok(report) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "cycle completed: {report:?}"
                );
            }
            Err(err) => {
                self.stats.failures += 1;
                error!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "error during scheduled cycle: {err:?}"
                );
            }
        }
        self.stats.cycles += 1;
    }

    /// False when the stop signal arrived while waiting.
    fn wait_until(&mut self, deadline: Instant) -> bool {
        self.state = SchedulerState::Waiting;
        self.stop
            .sleep(deadline.saturating_duration_since(Instant::now()))
    }

    fn finish(mut self) -> Result<RunStats> {
        self.state = SchedulerState::Stopped;
        info!("cleaning up resources");
        let stats = self.stats;
        self.cycle.shutdown()?;
        info!(cycles = stats.cycles, failures = stats.failures, "cleanup completed");
        Ok(stats)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub competitions: usize,
    pub matches: IngestReport,
    pub fetch_failures: usize,
    pub interrupted: bool,
}

/// Fetch the recent window, store every competition's matches, log scorers.
pub struct IngestCycle<T: Transport> {
    client: RateLimitedClient<T>,
    store: Store,
    competitions: Vec<String>,
    window_days: u32,
    stop: StopSignal,
}

impl<T: Transport> IngestCycle<T> {
    pub fn new(
        client: RateLimitedClient<T>,
        store: Store,
        competitions: Vec<String>,
        window_days: u32,
        stop: StopSignal,
    ) -> Self {
        Self {
            client: client.with_stop_signal(stop.clone()),
            store,
            competitions,
            window_days,
            stop,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn client(&self) -> &RateLimitedClient<T> {
        &self.client
    }
}

impl<T: Transport> Cycle for IngestCycle<T> {
    type Report = CycleReport;

    fn run(&mut self) -> Result<CycleReport> {
        if self.competitions.is_empty() {
            return Err(anyhow!("no competitions configured"));
        }
        info!(
            competitions = ?self.competitions,
            days = self.window_days,
            "starting scheduled data fetch"
        );
        let window = self
            .client
            .fetch_recent_window(&self.competitions, self.window_days);

        let mut report = CycleReport {
            competitions: window.competitions.len(),
            fetch_failures: window.failures.len(),
            ..CycleReport::default()
        };
        if window.interrupted {
            info!("stop requested during fetch; nothing stored this cycle");
            report.interrupted = true;
            return Ok(report);
        }

        for code in &window.competitions {
            // Stop between competitions; a started batch of statements always completes.
            if self.stop.is_triggered() {
                info!("stop requested; leaving cycle early");
                report.interrupted = true;
                return Ok(report);
            }
            let Some(payload) = window.matches.get(code) else {
                continue;
            };
            let stored = ingest_matches(&mut self.store, payload)
                .with_context(|| format!("store matches for {code}"))?;
            report.matches.absorb(stored);
        }

        for code in &window.competitions {
            if let Some(payload) = window.scorers.get(code) {
                log_scorers(code, payload);
            }
        }

        Ok(report)
    }

    fn shutdown(self) -> Result<()> {
        self.store.close()
    }
}
