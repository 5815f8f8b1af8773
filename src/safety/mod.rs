//! # Safety Module
//!
//! Arming state machine, sticky error taxonomy, switch debouncing and
//! link health. The weapon must never spin up unintentionally; on any
//! doubt the system disarms and stays disarmed until the operator
//! deliberately re-arms.
//!
//! ## Rules
//!
//! - Boot state is always Disarmed, never persisted.
//! - Disarm conditions are evaluated strictly before arm conditions:
//!   any single adverse condition disarms, all conditions must hold to
//!   arm.
//! - Errors are sticky, first-error-wins, and only an explicit operator
//!   `clear_error()` removes them.
//! - Re-arming after a high-throttle disarm requires the throttle to
//!   drop below a strictly lower threshold first (hysteresis).

pub mod debounce;
pub mod link;

use tracing::{info, warn};

pub use debounce::{debounce, DebouncedSwitch};
pub use link::LinkMonitor;

/// Weapon arming state. Two states only; boot is Disarmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmState {
    #[default]
    Disarmed,
    Armed,
}

/// Sticky system error taxonomy.
///
/// These are domain state consumed by the arming logic, not a Rust
/// error type; they never propagate up a call chain. First error wins
/// and only [`SafetyAggregate::clear_error`] resets to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemError {
    #[default]
    None,
    /// Control loop body exceeded one full tick period
    LoopOverrun,
    /// Previous run ended in a watchdog-forced restart
    WatchdogReset,
    /// No valid CRSF frame within the link timeout
    LinkTimeout,
    /// CRSF frame failed checksum validation
    ChecksumFailure,
}

impl SystemError {
    /// Numeric code carried in the telemetry capacity field.
    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            SystemError::None => 0,
            SystemError::LoopOverrun => 1,
            SystemError::WatchdogReset => 2,
            SystemError::LinkTimeout => 3,
            SystemError::ChecksumFailure => 4,
        }
    }
}

/// Derived system status for diagnostics consumers.
///
/// Computed fresh at the point of use, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Error,
    Failsafe,
    Armed,
    Safe,
}

impl SystemStatus {
    /// Derive status with precedence: error, then link loss, then armed.
    #[must_use]
    pub fn derive(error: SystemError, link_ok: bool, armed: bool) -> Self {
        if error != SystemError::None {
            SystemStatus::Error
        } else if !link_ok {
            SystemStatus::Failsafe
        } else if armed {
            SystemStatus::Armed
        } else {
            SystemStatus::Safe
        }
    }
}

/// Tunable safety thresholds.
#[derive(Debug, Clone, Copy)]
pub struct SafetyParams {
    /// Switch debounce duration in microseconds
    pub debounce_us: u64,
    /// Maximum weapon throttle that still allows arming
    pub arm_threshold: f32,
    /// Throttle must drop below this after a high-throttle disarm
    pub rearm_threshold: f32,
}

impl Default for SafetyParams {
    fn default() -> Self {
        Self {
            debounce_us: 50_000,
            arm_threshold: 0.10,
            rearm_threshold: 0.05,
        }
    }
}

/// Owns the arming state machine and everything it reads.
#[derive(Debug)]
pub struct SafetyAggregate {
    arm_state: ArmState,
    error: SystemError,
    arm_switch: DebouncedSwitch,
    kill_switch: DebouncedSwitch,
    last_disarm_throttle: f32,
    arm_threshold: f32,
    rearm_threshold: f32,
}

impl SafetyAggregate {
    /// Create the aggregate in the safe boot state.
    #[must_use]
    pub fn new(params: SafetyParams, now_us: u64) -> Self {
        Self {
            arm_state: ArmState::Disarmed,
            error: SystemError::None,
            arm_switch: DebouncedSwitch::new(params.debounce_us, now_us),
            kill_switch: DebouncedSwitch::new(params.debounce_us, now_us),
            last_disarm_throttle: 0.0,
            arm_threshold: params.arm_threshold,
            rearm_threshold: params.rearm_threshold,
        }
    }

    /// Raise a sticky error. The first error wins; later ones are dropped.
    pub fn raise(&mut self, error: SystemError) {
        if error == SystemError::None {
            return;
        }
        if self.error == SystemError::None {
            warn!("System error raised: {:?}", error);
            self.error = error;
        }
    }

    /// Operator-initiated error reset. Never called automatically.
    pub fn clear_error(&mut self) {
        if self.error != SystemError::None {
            info!("System error cleared: {:?}", self.error);
        }
        self.error = SystemError::None;
    }

    /// Feed raw switch samples through the debouncers.
    pub fn update_switches(&mut self, raw_arm: bool, raw_kill: bool, now_us: u64) {
        self.arm_switch.update(raw_arm, now_us);
        self.kill_switch.update(raw_kill, now_us);
    }

    /// Run one evaluation of the arming state machine.
    ///
    /// Disarm conditions come first and any one of them disarms; arming
    /// requires every precondition plus the throttle hysteresis check.
    /// An armed system with no disarm condition stays armed without
    /// re-evaluating preconditions.
    pub fn update_arming(&mut self, link_ok: bool, weapon_throttle: f32) {
        let arm_switch = self.arm_switch.value();
        let kill_active = self.kill_switch.value();

        let should_disarm = !arm_switch
            || kill_active
            || !link_ok
            || self.error != SystemError::None;

        if should_disarm {
            if self.arm_state == ArmState::Armed {
                warn!(
                    "Disarming (arm_switch={}, kill={}, link_ok={}, error={:?})",
                    arm_switch, kill_active, link_ok, self.error
                );
            }
            self.arm_state = ArmState::Disarmed;
            self.last_disarm_throttle = weapon_throttle;
            return;
        }

        if self.arm_state == ArmState::Disarmed {
            let throttle_ok = if self.last_disarm_throttle > self.arm_threshold {
                // Disarmed at speed: throttle must come all the way down
                if weapon_throttle < self.rearm_threshold {
                    self.last_disarm_throttle = weapon_throttle;
                    true
                } else {
                    false
                }
            } else {
                weapon_throttle <= self.arm_threshold
            };

            if throttle_ok {
                info!("Armed (weapon throttle {:.2})", weapon_throttle);
                self.arm_state = ArmState::Armed;
                self.last_disarm_throttle = weapon_throttle;
            }
        }
    }

    /// Current arming state.
    #[must_use]
    pub fn arm_state(&self) -> ArmState {
        self.arm_state
    }

    /// True when the weapon is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.arm_state == ArmState::Armed
    }

    /// Current sticky error.
    #[must_use]
    pub fn error(&self) -> SystemError {
        self.error
    }

    /// Debounced arm switch state.
    #[must_use]
    pub fn arm_switch(&self) -> bool {
        self.arm_switch.value()
    }

    /// Debounced kill switch state.
    #[must_use]
    pub fn kill_switch(&self) -> bool {
        self.kill_switch.value()
    }

    /// Weapon command as seen by the actuator: forced to zero unless armed.
    #[must_use]
    pub fn gated_weapon(&self, weapon_throttle: f32) -> f32 {
        if self.is_armed() {
            weapon_throttle.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Aggregate with both switches already debounced to the given values.
    fn aggregate_with_switches(arm: bool, kill: bool) -> SafetyAggregate {
        let mut agg = SafetyAggregate::new(SafetyParams::default(), 0);
        // Hold the raw values past the debounce duration
        agg.update_switches(arm, kill, 1_000);
        agg.update_switches(arm, kill, 100_000);
        agg
    }

    #[test]
    fn test_boots_disarmed_no_error() {
        let agg = SafetyAggregate::new(SafetyParams::default(), 0);
        assert_eq!(agg.arm_state(), ArmState::Disarmed);
        assert_eq!(agg.error(), SystemError::None);
    }

    #[test]
    fn test_golden_path_arms() {
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);
        assert!(agg.is_armed());
    }

    #[test]
    fn test_arm_blocked_without_switch() {
        let mut agg = aggregate_with_switches(false, false);
        agg.update_arming(true, 0.0);
        assert!(!agg.is_armed());
    }

    #[test]
    fn test_arm_blocked_by_kill_switch() {
        let mut agg = aggregate_with_switches(true, true);
        agg.update_arming(true, 0.0);
        assert!(!agg.is_armed());
    }

    #[test]
    fn test_arm_blocked_by_link_loss() {
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(false, 0.0);
        assert!(!agg.is_armed());
    }

    #[test]
    fn test_arm_blocked_by_error() {
        let mut agg = aggregate_with_switches(true, false);
        agg.raise(SystemError::ChecksumFailure);
        agg.update_arming(true, 0.0);
        assert!(!agg.is_armed());
    }

    #[test]
    fn test_arm_blocked_by_high_throttle() {
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.5);
        assert!(!agg.is_armed());
    }

    #[test]
    fn test_throttle_at_threshold_still_arms() {
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.10);
        assert!(agg.is_armed());
    }

    #[test]
    fn test_each_adverse_condition_disarms() {
        // Arm switch drop
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);
        assert!(agg.is_armed());
        agg.update_switches(false, false, 200_000);
        agg.update_switches(false, false, 300_000);
        agg.update_arming(true, 0.0);
        assert!(!agg.is_armed());

        // Kill switch
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);
        agg.update_switches(true, true, 200_000);
        agg.update_switches(true, true, 300_000);
        agg.update_arming(true, 0.0);
        assert!(!agg.is_armed());

        // Link loss
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);
        agg.update_arming(false, 0.0);
        assert!(!agg.is_armed());

        // Sticky error
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);
        agg.raise(SystemError::LoopOverrun);
        agg.update_arming(true, 0.0);
        assert!(!agg.is_armed());
    }

    #[test]
    fn test_hysteresis_after_high_throttle_disarm() {
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);
        assert!(agg.is_armed());

        // Weapon spinning at 0.8 when the link drops
        agg.update_arming(false, 0.8);
        assert!(!agg.is_armed());

        // Link back, throttle still high: must not re-arm
        agg.update_arming(true, 0.8);
        assert!(!agg.is_armed());

        // Even inside the normal arm threshold window is not enough,
        // the rearm threshold is strictly lower
        agg.update_arming(true, 0.07);
        assert!(!agg.is_armed());

        // Below the rearm threshold arming is allowed again
        agg.update_arming(true, 0.01);
        assert!(agg.is_armed());
    }

    #[test]
    fn test_low_throttle_disarm_skips_hysteresis() {
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);

        // Disarm with throttle already low
        agg.update_arming(false, 0.02);
        assert!(!agg.is_armed());

        // Anything at or under the arm threshold re-arms directly
        agg.update_arming(true, 0.08);
        assert!(agg.is_armed());
    }

    #[test]
    fn test_error_is_sticky_first_wins() {
        let mut agg = SafetyAggregate::new(SafetyParams::default(), 0);

        agg.raise(SystemError::ChecksumFailure);
        agg.raise(SystemError::LinkTimeout);
        assert_eq!(agg.error(), SystemError::ChecksumFailure);

        agg.clear_error();
        assert_eq!(agg.error(), SystemError::None);

        agg.raise(SystemError::LinkTimeout);
        assert_eq!(agg.error(), SystemError::LinkTimeout);
    }

    #[test]
    fn test_raise_none_is_ignored() {
        let mut agg = SafetyAggregate::new(SafetyParams::default(), 0);
        agg.raise(SystemError::None);
        assert_eq!(agg.error(), SystemError::None);

        agg.raise(SystemError::LoopOverrun);
        agg.raise(SystemError::None);
        assert_eq!(agg.error(), SystemError::LoopOverrun);
    }

    #[test]
    fn test_clearing_error_does_not_rearm() {
        let mut agg = aggregate_with_switches(true, false);
        agg.update_arming(true, 0.0);
        agg.raise(SystemError::ChecksumFailure);
        agg.update_arming(true, 0.0);
        assert!(!agg.is_armed());

        // Clearing removes the block; the next evaluation may arm again
        agg.clear_error();
        assert!(!agg.is_armed());
        agg.update_arming(true, 0.0);
        assert!(agg.is_armed());
    }

    #[test]
    fn test_gated_weapon() {
        let mut agg = aggregate_with_switches(true, false);
        assert_eq!(agg.gated_weapon(0.7), 0.0);

        agg.update_arming(true, 0.0);
        assert!(agg.is_armed());
        assert_eq!(agg.gated_weapon(0.7), 0.7);
        assert_eq!(agg.gated_weapon(1.5), 1.0);
    }

    #[test]
    fn test_status_precedence() {
        assert_eq!(
            SystemStatus::derive(SystemError::LinkTimeout, false, false),
            SystemStatus::Error
        );
        assert_eq!(
            SystemStatus::derive(SystemError::None, false, false),
            SystemStatus::Failsafe
        );
        assert_eq!(
            SystemStatus::derive(SystemError::None, true, true),
            SystemStatus::Armed
        );
        assert_eq!(
            SystemStatus::derive(SystemError::None, true, false),
            SystemStatus::Safe
        );
    }
}
