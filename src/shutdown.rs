use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

/// Granularity at which long sleeps notice a stop request.
pub const STOP_POLL: Duration = Duration::from_millis(250);

/// Shared stop flag, set from a signal handler and polled by the loop and the client.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleeps in `STOP_POLL` slices. False when the flag was set before the time ran out.
    pub fn sleep(&self, duration: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.is_triggered() {
                return false;
            }
            let elapsed = started.elapsed();
            if elapsed >= duration {
                return true;
            }
            thread::sleep((duration - elapsed).min(STOP_POLL));
        }
    }

    /// Routes Ctrl-C (and SIGTERM on unix) to this flag from a background thread.
    pub fn install_signal_handler(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .context("build signal runtime")?;
        let flag = self.clone();
        thread::Builder::new()
            .name("signal".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    wait_for_shutdown().await;
                    info!("received shutdown signal");
                    flag.trigger();
                })
            })
            .context("spawn signal thread")?;
        Ok(())
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};

    let Ok(mut term) = signal(SignalKind::terminate()) else {
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_runs_to_completion_without_stop() {
        let stop = StopSignal::new();
        let started = Instant::now();
        assert!(stop.sleep(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn sleep_returns_early_once_triggered() {
        let stop = StopSignal::new();
        let remote = stop.clone();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.trigger();
        });
        let started = Instant::now();
        assert!(!stop.sleep(Duration::from_secs(60)));
        assert!(started.elapsed() < Duration::from_secs(5));
        trigger.join().expect("trigger thread");
    }

    #[test]
    fn pending_stop_skips_the_sleep() {
        let stop = StopSignal::new();
        stop.trigger();
        assert!(!stop.sleep(Duration::ZERO));
        assert!(!stop.sleep(Duration::from_secs(60)));
    }
}
