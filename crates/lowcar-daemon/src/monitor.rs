//! Liveness bookkeeping for one connection.
//!
//! The inbound role records each well-formed frame; the watchdog compares
//! the recorded instant against a sliding window on its own schedule.
//! Timestamps are monotonic microseconds anchored at process start, so
//! they fit an `AtomicU64` and survive wall-clock adjustments.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static APP_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_micros() -> u64 {
    APP_START.get_or_init(Instant::now).elapsed().as_micros() as u64
}

pub struct LivenessMonitor {
    last_inbound: AtomicU64,
    window: Duration,
}

impl LivenessMonitor {
    /// `window` is the silence span after which the peer counts as dead.
    pub fn new(window: Duration) -> Self {
        Self {
            last_inbound: AtomicU64::new(monotonic_micros()),
            window,
        }
    }

    /// Records an inbound frame.
    pub fn touch(&self) {
        self.last_inbound.store(monotonic_micros(), Ordering::Relaxed);
    }

    /// Time since the last recorded frame.
    pub fn idle_time(&self) -> Duration {
        let last = self.last_inbound.load(Ordering::Relaxed);
        Duration::from_micros(monotonic_micros().saturating_sub(last))
    }

    pub fn is_alive(&self) -> bool {
        self.idle_time() < self.window
    }
}
