//! Periodic maintenance loop
//!
//! Runs [`MetadataRepository::run_maintenance`] every interval until a stop
//! is requested. The first interrupt stops the loop after the current pass;
//! a second one exits the process.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::repository::{MaintenanceReport, MetadataRepository};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared stop state, set by the interrupt handler
#[derive(Debug, Default)]
pub struct StopState {
    stop: AtomicBool,
    interrupts: AtomicU32,
}

impl StopState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Record an interrupt; returns true on the second and later ones
    fn interrupt(&self) -> bool {
        self.request_stop();
        self.interrupts.fetch_add(1, Ordering::SeqCst) >= 1
    }
}

/// Interval-driven maintenance runner
#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    state: Arc<StopState>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Arc::new(StopState::new()),
        }
    }

    pub fn state(&self) -> Arc<StopState> {
        Arc::clone(&self.state)
    }

    /// Install the Ctrl-C / SIGTERM handler. Call once per process.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || {
            if state.interrupt() {
                eprintln!("\nReceived second interrupt, exiting immediately...");
                std::process::exit(130);
            }
            eprintln!("\nReceived interrupt, stopping after the current pass...");
        })
    }

    /// Run maintenance passes until stopped, or once with `once`
    ///
    /// `on_pass` sees every report. Returns the number of passes made.
    pub fn run<F>(&self, repo: &MetadataRepository, once: bool, mut on_pass: F) -> u64
    where
        F: FnMut(&MaintenanceReport),
    {
        let mut passes = 0;
        info!(interval_secs = self.interval.as_secs(), once, "maintenance loop started");

        while !self.state.is_stopped() {
            let report = repo.run_maintenance();
            passes += 1;
            if !report.is_success() {
                warn!(pass = passes, "maintenance pass finished with failures");
            }
            on_pass(&report);

            if once || self.sleep() {
                break;
            }
        }

        info!(passes, "maintenance loop stopped");
        passes
    }

    /// Sleep one interval; returns true if a stop arrived meanwhile
    fn sleep(&self) -> bool {
        let start = Instant::now();
        while start.elapsed() < self.interval {
            if self.state.is_stopped() {
                return true;
            }
            std::thread::sleep(POLL_INTERVAL.min(self.interval));
        }
        self.state.is_stopped()
    }
}
