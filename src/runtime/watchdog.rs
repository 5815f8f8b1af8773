//! # Watchdog Supervisor
//!
//! Host-side analog of a hardware watchdog. A detached supervisor
//! thread checks feed recency; if the control loop stops refreshing
//! for the full timeout the supervisor drops a reset marker and aborts
//! the process so the service manager restarts it from the safe boot
//! state.
//!
//! On startup [`probe_reset_marker`] reports (and consumes) a marker
//! left by a previous abort, which the caller records as the sticky
//! `WatchdogReset` error.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::error;

use super::hal::Watchdog;

/// Supervisor-thread watchdog.
///
/// Armed on construction. Dropping disarms the supervisor, which only
/// happens on orderly shutdown.
pub struct SoftwareWatchdog {
    last_feed_us: Arc<AtomicU64>,
    armed: Arc<AtomicBool>,
    origin: Instant,
}

impl SoftwareWatchdog {
    /// Arm the watchdog and start the supervisor thread.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum allowed gap between refreshes
    /// * `marker_path` - File written just before the abort
    pub fn arm(timeout: Duration, marker_path: PathBuf) -> Self {
        let origin = Instant::now();
        let last_feed_us = Arc::new(AtomicU64::new(0));
        let armed = Arc::new(AtomicBool::new(true));

        let feed = Arc::clone(&last_feed_us);
        let armed_flag = Arc::clone(&armed);
        let timeout_us = timeout.as_micros() as u64;
        let check_interval = timeout / 4;

        thread::spawn(move || {
            while armed_flag.load(Ordering::Relaxed) {
                thread::sleep(check_interval);

                let now_us = origin.elapsed().as_micros() as u64;
                let last = feed.load(Ordering::Relaxed);

                if now_us.saturating_sub(last) > timeout_us {
                    error!(
                        "Watchdog expired ({}us since last refresh), aborting",
                        now_us - last
                    );
                    // Marker write is best-effort, the abort is not
                    let _ = fs::write(&marker_path, format!("{}\n", now_us));
                    std::process::abort();
                }
            }
        });

        Self {
            last_feed_us,
            armed,
            origin,
        }
    }

    /// Time since the loop last refreshed.
    #[must_use]
    pub fn time_since_refresh(&self) -> Duration {
        let now_us = self.origin.elapsed().as_micros() as u64;
        let last = self.last_feed_us.load(Ordering::Relaxed);
        Duration::from_micros(now_us.saturating_sub(last))
    }
}

impl Watchdog for SoftwareWatchdog {
    fn refresh(&mut self) {
        let now_us = self.origin.elapsed().as_micros() as u64;
        self.last_feed_us.store(now_us, Ordering::Relaxed);
    }
}

impl Drop for SoftwareWatchdog {
    fn drop(&mut self) {
        self.armed.store(false, Ordering::Relaxed);
    }
}

/// Check whether the previous run ended in a watchdog abort.
///
/// Consumes the marker so a single reset is reported exactly once.
pub fn probe_reset_marker(marker_path: &Path) -> bool {
    if marker_path.exists() {
        let _ = fs::remove_file(marker_path);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_resets_elapsed() {
        let dir = tempfile::tempdir().unwrap();
        let mut wd = SoftwareWatchdog::arm(Duration::from_secs(10), dir.path().join("marker"));

        thread::sleep(Duration::from_millis(5));
        assert!(wd.time_since_refresh() >= Duration::from_millis(5));

        wd.refresh();
        assert!(wd.time_since_refresh() < Duration::from_millis(5));
    }

    #[test]
    fn test_survives_while_fed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let mut wd = SoftwareWatchdog::arm(Duration::from_millis(500), marker.clone());

        // Feed well inside the timeout for several check intervals
        for _ in 0..10 {
            wd.refresh();
            thread::sleep(Duration::from_millis(20));
        }

        assert!(!marker.exists());
    }

    #[test]
    fn test_probe_consumes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");

        assert!(!probe_reset_marker(&marker));

        fs::write(&marker, "12345\n").unwrap();
        assert!(probe_reset_marker(&marker));
        assert!(!marker.exists());
        assert!(!probe_reset_marker(&marker));
    }
}
