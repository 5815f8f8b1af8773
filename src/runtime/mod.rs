//! # Runtime Module
//!
//! The fixed-rate control core: scheduler, watchdog supervisor, HAL
//! seams and the per-tick pipeline that ties decoding, link health,
//! debouncing and the safety machine together.
//!
//! Tick order is fixed: watchdog refresh first, then byte drain and
//! decode, link evaluation, switch debounce, safety recompute, and
//! finally the collaborator read surfaces and diagnostics.

pub mod hal;
pub mod scheduler;
pub mod watchdog;

use std::io;

use tracing::{debug, info};

use crate::crsf::{CrsfDecoder, DecodeEvent};
use crate::error::Result;
use crate::input::ControlInputs;
use crate::safety::{
    ArmState, LinkMonitor, SafetyAggregate, SafetyParams, SystemError, SystemStatus,
};

pub use hal::{ByteSource, Clock, MonotonicClock, Watchdog};
pub use scheduler::{Tick, TickScheduler};
pub use watchdog::{probe_reset_marker, SoftwareWatchdog};

/// Control loop tuning, derived from [`crate::config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct LoopParams {
    /// Tick period in microseconds (10_000 for 100 Hz)
    pub period_us: u64,
    /// Link timeout in microseconds
    pub link_timeout_us: u64,
    /// Stick deadband threshold
    pub deadband: f32,
    /// Arming thresholds and debounce duration
    pub safety: SafetyParams,
    /// Telemetry cadence in ticks (100 = 1 Hz at 100 Hz)
    pub telemetry_interval_ticks: u64,
}

/// Result of one completed tick.
#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    /// Ticks completed since boot, starting at 0
    pub tick: u64,
    /// Telemetry should be emitted for this tick
    pub telemetry_due: bool,
}

/// Read surface for the drive mixer.
#[derive(Debug, Clone, Copy)]
pub struct MixingView {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub throttle: f32,
    pub arm_state: ArmState,
}

/// Read surface for the weapon/self-right actuators.
///
/// The weapon command is already gated: zero whenever disarmed.
#[derive(Debug, Clone, Copy)]
pub struct ActuatorView {
    pub arm_state: ArmState,
    pub weapon: f32,
    pub selfright: bool,
}

/// Read surface for diagnostics and telemetry.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsView {
    pub arm_state: ArmState,
    pub error: SystemError,
    pub link_ok: bool,
    pub status: SystemStatus,
}

/// The single-threaded control core.
///
/// Owns every piece of mutable control state; collaborators only see
/// the copy-out view structs. `poll` is cheap before the tick deadline
/// so the driver can call it as often as it likes.
pub struct ControlLoop<C, B, W>
where
    C: Clock,
    B: ByteSource,
    W: Watchdog,
{
    clock: C,
    source: B,
    watchdog: W,
    decoder: CrsfDecoder,
    scheduler: TickScheduler,
    link: LinkMonitor,
    safety: SafetyAggregate,
    inputs: ControlInputs,
    deadband: f32,
    telemetry_interval_ticks: u64,
    tick_count: u64,
}

impl<C, B, W> ControlLoop<C, B, W>
where
    C: Clock,
    B: ByteSource,
    W: Watchdog,
{
    /// Build the loop in the safe boot state.
    pub fn new(params: LoopParams, clock: C, source: B, watchdog: W) -> Self {
        let now_us = clock.now_us();

        Self {
            scheduler: TickScheduler::new(params.period_us, now_us),
            link: LinkMonitor::new(params.link_timeout_us, now_us),
            safety: SafetyAggregate::new(params.safety, now_us),
            inputs: ControlInputs::neutral(),
            decoder: CrsfDecoder::new(),
            deadband: params.deadband,
            telemetry_interval_ticks: params.telemetry_interval_ticks.max(1),
            tick_count: 0,
            clock,
            source,
            watchdog,
        }
    }

    /// Run one tick if it is due.
    ///
    /// Returns `Ok(None)` before the deadline without touching any
    /// state.
    pub fn poll(&mut self) -> Result<Option<TickReport>> {
        let now_us = self.clock.now_us();

        let tick = match self.scheduler.poll(now_us) {
            Some(tick) => tick,
            None => return Ok(None),
        };

        self.run_tick(tick, now_us).map(Some)
    }

    fn run_tick(&mut self, tick: Tick, now_us: u64) -> Result<TickReport> {
        // The watchdog refresh is always the first action of the body
        self.watchdog.refresh();

        if tick.overrun {
            self.safety.raise(SystemError::LoopOverrun);
        }

        self.drain_bytes(now_us)?;

        if self.link.update(now_us) {
            self.safety.raise(SystemError::LinkTimeout);
            // Active override, not a stale hold
            self.inputs = ControlInputs::neutral();
        }

        self.safety
            .update_switches(self.inputs.arm_switch, self.inputs.kill_switch, now_us);
        self.safety
            .update_arming(self.link.link_ok(), self.inputs.weapon);

        let tick_index = self.tick_count;
        let telemetry_due = tick_index % self.telemetry_interval_ticks == 0;
        self.tick_count += 1;

        // Once per ~10s at 100Hz
        if tick_index % 1000 == 0 {
            let view = self.diagnostics_view();
            info!(
                "Status: {:?} (arm={:?}, error={:?}, link_ok={})",
                view.status, view.arm_state, view.error, view.link_ok
            );
        }

        Ok(TickReport {
            tick: tick_index,
            telemetry_due,
        })
    }

    /// Drain all currently buffered serial bytes through the decoder.
    fn drain_bytes(&mut self, now_us: u64) -> Result<()> {
        let mut buf = [0u8; 256];

        loop {
            let n = match self.source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            };

            for &byte in &buf[..n] {
                match self.decoder.push_byte(byte) {
                    Some(DecodeEvent::RcChannels(raw)) => {
                        self.inputs = ControlInputs::from_raw_channels(&raw, self.deadband);
                        self.link.frame_received(now_us);
                    }
                    Some(DecodeEvent::OtherFrame(frame_type)) => {
                        // Valid frame of a type we don't consume still
                        // proves the link is alive
                        debug!("Ignoring frame type 0x{:02X}", frame_type);
                        self.link.frame_received(now_us);
                    }
                    Some(DecodeEvent::ChecksumMismatch) => {
                        self.safety.raise(SystemError::ChecksumFailure);
                    }
                    None => {}
                }
            }
        }

        Ok(())
    }

    /// View for the drive mixer.
    #[must_use]
    pub fn mixing_view(&self) -> MixingView {
        MixingView {
            roll: self.inputs.roll,
            pitch: self.inputs.pitch,
            yaw: self.inputs.yaw,
            throttle: self.inputs.throttle,
            arm_state: self.safety.arm_state(),
        }
    }

    /// View for the weapon and self-right actuators.
    #[must_use]
    pub fn actuator_view(&self) -> ActuatorView {
        ActuatorView {
            arm_state: self.safety.arm_state(),
            weapon: self.safety.gated_weapon(self.inputs.weapon),
            selfright: self.inputs.selfright_switch,
        }
    }

    /// View for diagnostics and telemetry.
    #[must_use]
    pub fn diagnostics_view(&self) -> DiagnosticsView {
        let error = self.safety.error();
        let link_ok = self.link.link_ok();
        let armed = self.safety.is_armed();

        DiagnosticsView {
            arm_state: self.safety.arm_state(),
            error,
            link_ok,
            status: SystemStatus::derive(error, link_ok, armed),
        }
    }

    /// Current normalized inputs.
    #[must_use]
    pub fn inputs(&self) -> &ControlInputs {
        &self.inputs
    }

    /// Raise a sticky error from outside the tick (boot-time probes).
    pub fn raise_error(&mut self, error: SystemError) {
        self.safety.raise(error);
    }

    /// Operator-initiated error reset.
    pub fn clear_error(&mut self) {
        self.safety.clear_error();
    }
}
