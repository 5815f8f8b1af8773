//! # Hardware Abstraction Seams
//!
//! Minimal traits injected into the control loop so the core logic can
//! be driven by a simulated clock, a synthetic byte stream and a mock
//! watchdog in tests, and by the real serial port and supervisor in
//! production.

use std::io;
use std::time::Instant;

#[cfg(test)]
use mockall::automock;

/// Monotonic time source.
#[cfg_attr(test, automock)]
pub trait Clock {
    /// Microseconds since an arbitrary fixed origin. Never goes backwards.
    fn now_us(&self) -> u64;
}

/// Non-blocking byte input.
///
/// `read` returns only bytes already buffered; it must never wait for
/// more. A return of 0 means no data is currently available.
#[cfg_attr(test, automock)]
pub trait ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Watchdog refresh seam.
///
/// Arming and reset-cause probing are constructor-side concerns of the
/// concrete implementation; the loop only ever refreshes.
#[cfg_attr(test, automock)]
pub trait Watchdog {
    fn refresh(&mut self);
}

/// Process-relative monotonic clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}
