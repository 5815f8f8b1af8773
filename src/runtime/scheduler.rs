//! # Fixed-Rate Tick Scheduler
//!
//! Cooperative 100 Hz pacing on a monotonic microsecond clock. `poll`
//! costs nothing before the deadline; an overrun is detected and
//! reported but never compensated, the next tick simply runs as soon
//! as it can.

/// One due tick.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// The tick body before this one ran past a full period
    pub overrun: bool,
}

/// Fixed-period scheduler state.
#[derive(Debug, Clone, Copy)]
pub struct TickScheduler {
    period_us: u64,
    next_tick_us: u64,
}

impl TickScheduler {
    /// Create a scheduler whose first tick is one period from `now_us`.
    #[must_use]
    pub fn new(period_us: u64, now_us: u64) -> Self {
        Self {
            period_us,
            next_tick_us: now_us + period_us,
        }
    }

    /// Check whether a tick is due.
    ///
    /// Returns `None` before the deadline. When due, advances the
    /// deadline by exactly one period (a late caller will find the next
    /// tick due immediately) and reports whether the deadline was
    /// missed by more than a full period.
    pub fn poll(&mut self, now_us: u64) -> Option<Tick> {
        if now_us < self.next_tick_us {
            return None;
        }

        let overrun = now_us > self.next_tick_us + self.period_us;
        self.next_tick_us += self.period_us;

        Some(Tick { overrun })
    }

    /// Configured tick period.
    #[must_use]
    pub fn period_us(&self) -> u64 {
        self.period_us
    }
}
