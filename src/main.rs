//! # botctl
//!
//! Control core for a CRSF-driven combat robot.
//!
//! Reads CRSF frames from an ExpressLRS receiver over USB serial, runs
//! the 100 Hz safety and arming pipeline, and reports status back as
//! CRSF battery telemetry plus JSONL log records.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging with tracing subscriber
//!    - Load and validate TOML configuration
//!    - Probe for a watchdog reset marker from a previous run
//!    - Open serial connection to the receiver and arm the watchdog
//!
//! 2. **Main Loop**
//!    - Poll the control core at millisecond granularity; it ticks at
//!      the configured loop rate
//!    - On telemetry-due ticks, send a battery telemetry frame and
//!      append a JSONL status record
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Stop polling, disarm the watchdog, log total tick count

use std::time::Duration;

use anyhow::Result;
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber;

use botctl::config::Config;
use botctl::crsf::encoder::encode_battery_telemetry;
use botctl::runtime::{
    probe_reset_marker, ControlLoop, LoopParams, MonotonicClock, SoftwareWatchdog,
};
use botctl::safety::{ArmState, SafetyParams, SystemError};
use botctl::serial::CrsfSerial;
use botctl::telemetry::{free_mem_percent, TelemetryLogger, TelemetryRecord};

/// Polling granularity of the outer driver loop. The tick scheduler
/// inside the control core enforces the actual loop rate.
const POLL_INTERVAL_MS: u64 = 1;

/// Derive control core tuning from the validated configuration.
fn loop_params(config: &Config) -> LoopParams {
    let period_us = 1_000_000 / u64::from(config.control.loop_rate_hz);

    LoopParams {
        period_us,
        link_timeout_us: config.safety.link_timeout_ms * 1_000,
        deadband: config.channels.deadband,
        safety: SafetyParams {
            debounce_us: config.safety.switch_debounce_ms * 1_000,
            arm_threshold: config.safety.arm_throttle_threshold,
            rearm_threshold: config.safety.rearm_throttle_threshold,
        },
        telemetry_interval_ticks: (config.control.telemetry_frame_interval_ms * 1_000) / period_us,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    info!("botctl v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Loaded configuration from {}", config_path);

    // A leftover marker means the last run died under the watchdog
    let marker_path = std::path::PathBuf::from(&config.safety.watchdog_marker_path);
    let watchdog_reset = probe_reset_marker(&marker_path);

    // Initialize serial communication
    let serial = if config.serial.port.is_empty() {
        CrsfSerial::open(config.serial.baud_rate)?
    } else {
        CrsfSerial::open_with_paths(&[config.serial.port.as_str()], config.serial.baud_rate)?
    };
    info!("CRSF receiver connected at: {}", serial.device_path());
    let (mut writer, byte_source) = serial.split();

    let watchdog = SoftwareWatchdog::arm(
        Duration::from_millis(config.safety.watchdog_timeout_ms),
        marker_path,
    );

    let mut ctrl = ControlLoop::new(
        loop_params(&config),
        MonotonicClock::new(),
        byte_source,
        watchdog,
    );

    if watchdog_reset {
        warn!("Previous run ended in a watchdog reset, starting with sticky error");
        ctrl.raise_error(SystemError::WatchdogReset);
    }

    let mut logger = if config.telemetry.enabled {
        Some(TelemetryLogger::new(&config.telemetry)?)
    } else {
        None
    };

    let mut poll_interval = interval(Duration::from_millis(POLL_INTERVAL_MS));

    info!(
        "Control loop running at {}Hz (telemetry every {}ms)",
        config.control.loop_rate_hz, config.control.telemetry_frame_interval_ms
    );
    info!("Press Ctrl+C to exit");

    let mut tick_count: u64 = 0;

    // Main control loop
    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                let report = match ctrl.poll() {
                    Ok(Some(report)) => report,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!("Control loop failed: {}", e);
                        return Err(e.into());
                    }
                };

                tick_count = report.tick + 1;

                if report.telemetry_due {
                    let diag = ctrl.diagnostics_view();
                    let weapon = ctrl.actuator_view().weapon;

                    // No battery sense on this build, voltage reads zero
                    let frame =
                        encode_battery_telemetry(0, diag.error.code(), free_mem_percent());
                    if let Err(e) = writer.send_frame(&frame).await {
                        warn!("Failed to send telemetry frame: {}", e);
                    }

                    if let Some(logger) = logger.as_mut() {
                        let record = TelemetryRecord::now(
                            diag.arm_state == ArmState::Armed,
                            diag.status,
                            diag.error,
                            diag.link_ok,
                            weapon,
                        );
                        if let Err(e) = logger.log(&record) {
                            warn!("Failed to write telemetry record: {}", e);
                        }
                    }
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Completed {} control ticks", tick_count);
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use botctl::config::Config;

    fn config_from(toml: &str) -> Config {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        Config::load(file.path()).unwrap()
    }

    #[test]
    fn test_loop_params_from_defaults() {
        let config = config_from(
            r#"
[serial]
[channels]
[safety]
[control]
[telemetry]
enabled = false
"#,
        );

        let params = loop_params(&config);
        assert_eq!(params.period_us, 10_000);
        assert_eq!(params.link_timeout_us, 200_000);
        assert_eq!(params.safety.debounce_us, 50_000);
        // 1000ms interval at 100Hz is every 100 ticks
        assert_eq!(params.telemetry_interval_ticks, 100);
    }

    #[test]
    fn test_loop_params_follow_loop_rate() {
        let config = config_from(
            r#"
[serial]
[channels]
[safety]
watchdog_timeout_ms = 500
[control]
loop_rate_hz = 50
telemetry_frame_interval_ms = 500
[telemetry]
enabled = false
"#,
        );

        let params = loop_params(&config);
        assert_eq!(params.period_us, 20_000);
        assert_eq!(params.telemetry_interval_ticks, 25);
    }
}
