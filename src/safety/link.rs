//! # Link Health Monitor
//!
//! Tracks CRSF frame recency and declares link loss after a timeout.
//! Any CRC-valid frame counts as link activity, regardless of type.
//! Recovery is immediate on the next valid frame, but the sticky
//! timeout error raised on loss is never cleared here.

/// Receiver link watchdog.
#[derive(Debug, Clone, Copy)]
pub struct LinkMonitor {
    timeout_us: u64,
    last_frame_us: u64,
    link_ok: bool,
}

impl LinkMonitor {
    /// Create a monitor; the link starts down until the first valid frame.
    #[must_use]
    pub fn new(timeout_us: u64, now_us: u64) -> Self {
        Self {
            timeout_us,
            last_frame_us: now_us,
            link_ok: false,
        }
    }

    /// Record a CRC-valid frame of any type.
    pub fn frame_received(&mut self, now_us: u64) {
        self.last_frame_us = now_us;
        self.link_ok = true;
    }

    /// Re-evaluate link health.
    ///
    /// Returns true when the timeout has elapsed without a frame; the
    /// caller raises the sticky error and forces outputs neutral. The
    /// link also starts down at boot, but that alone is not a timeout.
    pub fn update(&mut self, now_us: u64) -> bool {
        let timed_out = now_us.saturating_sub(self.last_frame_us) > self.timeout_us;
        if timed_out {
            self.link_ok = false;
        }
        timed_out
    }

    /// Current link state without re-evaluating.
    #[must_use]
    pub fn link_ok(&self) -> bool {
        self.link_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT_US: u64 = 200_000;

    #[test]
    fn test_link_starts_down() {
        let monitor = LinkMonitor::new(TIMEOUT_US, 0);
        assert!(!monitor.link_ok());
    }

    #[test]
    fn test_boot_grace_is_not_a_timeout() {
        let mut monitor = LinkMonitor::new(TIMEOUT_US, 0);

        // Link is down but the timeout has not elapsed yet
        assert!(!monitor.update(100_000));
        assert!(!monitor.link_ok());

        // Past the timeout with no frame ever received
        assert!(monitor.update(200_001));
    }

    #[test]
    fn test_first_frame_brings_link_up() {
        let mut monitor = LinkMonitor::new(TIMEOUT_US, 0);
        monitor.frame_received(10_000);
        assert!(monitor.link_ok());
        assert!(!monitor.update(50_000));
        assert!(monitor.link_ok());
    }

    #[test]
    fn test_timeout_declares_link_loss() {
        let mut monitor = LinkMonitor::new(TIMEOUT_US, 0);
        monitor.frame_received(0);

        // Exactly at the timeout the link is still considered up
        assert!(!monitor.update(200_000));
        assert!(monitor.link_ok());

        assert!(monitor.update(200_001));
        assert!(!monitor.link_ok());
    }

    #[test]
    fn test_recovery_is_immediate() {
        let mut monitor = LinkMonitor::new(TIMEOUT_US, 0);
        monitor.frame_received(0);
        assert!(monitor.update(500_000));

        monitor.frame_received(510_000);
        assert!(monitor.link_ok());
        assert!(!monitor.update(520_000));
        assert!(monitor.link_ok());
    }

    #[test]
    fn test_steady_frames_keep_link_up() {
        let mut monitor = LinkMonitor::new(TIMEOUT_US, 0);

        // 10ms frame cadence, well inside the timeout
        for t in (0..2_000_000u64).step_by(10_000) {
            monitor.frame_received(t);
            assert!(!monitor.update(t + 5_000));
            assert!(monitor.link_ok());
        }
    }
}
