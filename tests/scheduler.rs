mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use football_ingest::api_client::RateLimitedClient;
use football_ingest::scheduler::{Cycle, IngestCycle, Scheduler, StopSignal};
use football_ingest::store::Store;

use common::{FakeTransport, Reply, api_config, read_fixture};

type Runs = Rc<RefCell<Vec<Instant>>>;

struct ScriptedCycle {
    runs: Runs,
    fail_runs: Vec<usize>,
    stop_after: usize,
    stop: StopSignal,
    closed: Rc<Cell<bool>>,
}

impl Cycle for ScriptedCycle {
    type Report = usize;

    fn run(&mut self) -> Result<usize> {
        let mut runs = self.runs.borrow_mut();
        runs.push(Instant::now());
        let n = runs.len();
        if n >= self.stop_after {
            self.stop.trigger();
        }
        if self.fail_runs.contains(&n) {
            return Err(anyhow!("upsert match 100 failed: database is locked"));
        }
        Ok(n)
    }

    fn shutdown(self) -> Result<()> {
        self.closed.set(true);
        Ok(())
    }
}

fn scripted(
    fail_runs: Vec<usize>,
    stop_after: usize,
    stop: &StopSignal,
) -> (ScriptedCycle, Runs, Rc<Cell<bool>>) {
    let runs = Rc::new(RefCell::new(Vec::new()));
    let closed = Rc::new(Cell::new(false));
    let cycle = ScriptedCycle {
        runs: runs.clone(),
        fail_runs,
        stop_after,
        stop: stop.clone(),
        closed: closed.clone(),
    };
    (cycle, runs, closed)
}

#[test]
fn failing_cycle_does_not_stop_the_schedule() {
    let stop = StopSignal::new();
    let (cycle, runs, closed) = scripted(vec![1], 3, &stop);
    let interval = Duration::from_millis(60);

    let stats = Scheduler::new(cycle, interval, stop)
        .start()
        .expect("scheduler exits cleanly");

    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.failures, 1);
    assert!(closed.get());

    let runs = runs.borrow();
    assert_eq!(runs.len(), 3);
    for pair in runs.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap + Duration::from_millis(10) >= interval, "gap {gap:?} shorter than interval");
    }
}

#[test]
fn first_cycle_runs_without_waiting() {
    let stop = StopSignal::new();
    let (cycle, runs, _) = scripted(vec![], 1, &stop);
    let started = Instant::now();

    Scheduler::new(cycle, Duration::from_secs(30), stop).start().expect("start");

    assert_eq!(runs.borrow().len(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn run_once_executes_exactly_one_cycle() {
    let stop = StopSignal::new();
    let (cycle, runs, closed) = scripted(vec![1], usize::MAX, &stop);
    let started = Instant::now();

    let stats = Scheduler::new(cycle, Duration::from_secs(30), stop)
        .run_once()
        .expect("run once");

    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(runs.borrow().len(), 1);
    assert!(closed.get());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn stop_during_wait_ends_loop_promptly() {
    let stop = StopSignal::new();
    let (cycle, runs, closed) = scripted(vec![], usize::MAX, &stop);
    let remote = stop.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        remote.trigger();
    });

    let started = Instant::now();
    Scheduler::new(cycle, Duration::from_secs(60), stop).start().expect("start");
    trigger.join().expect("trigger thread");

    assert_eq!(runs.borrow().len(), 1);
    assert!(closed.get());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn ingest_cycle_stores_fetched_matches() {
    let transport = FakeTransport::new()
        .on("competitions/PL/matches", Reply::ok(read_fixture("matches_pl.json")))
        .on("competitions/PL/standings", Reply::ok(r#"{"standings":[]}"#))
        .on("competitions/PL/scorers", Reply::ok(read_fixture("scorers_pl.json")))
        .on("competitions/CL/matches", Reply::Status(500, "boom".to_string()));
    let client = RateLimitedClient::new(transport, api_config(1, 5), None);
    let store = Store::open_in_memory().expect("open");
    let stop = StopSignal::new();
    let mut cycle = IngestCycle::new(
        client,
        store,
        vec!["PL".to_string(), "CL".to_string()],
        7,
        stop,
    );

    let report = cycle.run().expect("cycle");
    assert_eq!(report.competitions, 2);
    assert_eq!(report.matches.processed, 3);
    assert_eq!(report.matches.stats_appended, 4);
    // CL matches, standings and scorers all fail (the latter two are unrouted).
    assert_eq!(report.fetch_failures, 3);
    assert!(!report.interrupted);

    let matches = cycle
        .store()
        .query("SELECT COUNT(*) AS n FROM matches", [])
        .expect("count");
    assert_eq!(matches.get_i64(0, "n"), Some(3));

    let again = cycle.run().expect("second cycle");
    assert_eq!(again.matches.updated, 3);
    cycle.shutdown().expect("close store");
}

#[test]
fn ingest_cycle_honours_pending_stop() {
    let transport = FakeTransport::new()
        .on("competitions/PL/matches", Reply::ok(read_fixture("matches_pl.json")));
    let client = RateLimitedClient::new(transport, api_config(1, 5), None);
    let stop = StopSignal::new();
    stop.trigger();
    let mut cycle = IngestCycle::new(
        client,
        Store::open_in_memory().expect("open"),
        vec!["PL".to_string()],
        7,
        stop,
    );

    let report = cycle.run().expect("cycle");
    assert!(report.interrupted);
    assert_eq!(report.matches.processed, 0);
    assert_eq!(report.fetch_failures, 0);
    assert!(cycle.client().transport().calls().is_empty());
}

#[test]
fn stop_while_throttled_ends_the_schedule() {
    let transport = FakeTransport::new()
        .on("competitions/PL/matches", Reply::Status(429, String::new()));
    let client = RateLimitedClient::new(transport, api_config(1, 20), None);
    let stop = StopSignal::new();
    let cycle = IngestCycle::new(
        client,
        Store::open_in_memory().expect("open"),
        vec!["PL".to_string()],
        7,
        stop.clone(),
    );
    let remote = stop.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        remote.trigger();
    });

    let started = Instant::now();
    let stats = Scheduler::new(cycle, Duration::from_secs(60), stop)
        .start()
        .expect("scheduler exits and closes the store");
    trigger.join().expect("trigger thread");

    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.failures, 0);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn interrupted_fetch_stores_nothing() {
    let transport = FakeTransport::new()
        .on("competitions/PL/matches", Reply::ok(read_fixture("matches_pl.json")))
        .on("competitions/PL/standings", Reply::Status(429, String::new()));
    let client = RateLimitedClient::new(transport, api_config(1, 20), None);
    let stop = StopSignal::new();
    let mut cycle = IngestCycle::new(
        client,
        Store::open_in_memory().expect("open"),
        vec!["PL".to_string(), "CL".to_string()],
        7,
        stop.clone(),
    );
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        stop.trigger();
    });

    let report = cycle.run().expect("cycle");
    trigger.join().expect("trigger thread");

    assert!(report.interrupted);
    assert_eq!(report.matches.processed, 0);
    let paths = cycle.client().transport().paths();
    assert!(!paths.iter().any(|p| p.starts_with("competitions/CL")));
    let stored = cycle
        .store()
        .query("SELECT COUNT(*) AS n FROM matches", [])
        .expect("count");
    assert_eq!(stored.get_i64(0, "n"), Some(0));
    cycle.shutdown().expect("close store");
}
