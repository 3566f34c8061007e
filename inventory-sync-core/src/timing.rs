//! Timing primitives
//!
//! Both types are pure state machines over caller-supplied [`Instant`]s, so
//! they work with any timer (a sleeping thread, an event loop tick, a test
//! that just advances a value).

use std::time::{Duration, Instant};

/// Default window for coalescing page-structure changes
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Delay before the first scheduled refresh after start-up
pub const FIRST_REFRESH_DELAY: Duration = Duration::from_secs(6);

/// Single-slot debounce timer
///
/// Every signal replaces the pending deadline, so a burst of signals spaced
/// closer than the window collapses into exactly one firing, one window
/// after the last signal.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
    coalesced: u32,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            coalesced: 0,
        }
    }

    /// Record a trigger signal at `now`
    pub fn signal(&mut self, now: Instant) {
        if self.deadline.is_some() {
            self.coalesced += 1;
        }
        self.deadline = Some(now + self.window);
    }

    /// True exactly once per burst, when the window has elapsed
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                if self.coalesced > 0 {
                    log::trace!("Debounce collapsed {} extra signals", self.coalesced);
                }
                self.deadline = None;
                self.coalesced = 0;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending firing
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.coalesced = 0;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the pending firing is due, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

/// Periodic refresh schedule
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    interval: Duration,
    next: Instant,
}

impl RefreshSchedule {
    /// First run after [`FIRST_REFRESH_DELAY`], then every `interval`
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next: now + FIRST_REFRESH_DELAY,
        }
    }

    /// Replace the interval and restart the schedule (settings changed)
    pub fn reset(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.next = now + FIRST_REFRESH_DELAY;
    }

    /// True when a refresh is due; advances to the next period
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }

    /// Time left until the next refresh
    pub fn time_until(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
