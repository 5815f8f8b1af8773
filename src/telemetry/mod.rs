//! # Telemetry Module
//!
//! Handles telemetry logging to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting per-interval status snapshots as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files
//!
//! Telemetry is observational only; nothing here feeds back into the
//! safety logic.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::safety::{SystemError, SystemStatus};

/// One logged status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    /// RFC 3339 wall-clock timestamp
    pub timestamp: String,
    pub armed: bool,
    pub status: String,
    pub error: String,
    pub error_code: u16,
    pub link_ok: bool,
    pub weapon: f32,
}

impl TelemetryRecord {
    /// Snapshot the current system state with a fresh timestamp.
    #[must_use]
    pub fn now(
        armed: bool,
        status: SystemStatus,
        error: SystemError,
        link_ok: bool,
        weapon: f32,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            armed,
            status: format!("{:?}", status),
            error: format!("{:?}", error),
            error_code: error.code(),
            link_ok,
            weapon,
        }
    }
}

/// JSONL telemetry logger with size-based rotation.
#[derive(Debug)]
pub struct TelemetryLogger {
    log_dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_seq: u32,
}

impl TelemetryLogger {
    /// Create a logger writing under the configured directory.
    ///
    /// The directory is created if missing. No file is opened until the
    /// first record arrives.
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let log_dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&log_dir)?;

        info!("Telemetry logging to {}", log_dir.display());

        Ok(Self {
            log_dir,
            max_records_per_file: config.max_records_per_file,
            max_files_to_keep: config.max_files_to_keep,
            writer: None,
            records_in_file: 0,
            file_seq: 0,
        })
    }

    /// Append one record, rotating the file when full.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be serialized or written.
    pub fn log(&mut self, record: &TelemetryRecord) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(record)?;
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// Open the next log file and prune old ones past the retention limit.
    fn rotate(&mut self) -> Result<()> {
        // Sequence number keeps names unique and sortable when several
        // files are opened within the same second
        let name = format!(
            "telemetry_{}_{:04}.jsonl",
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq
        );
        self.file_seq += 1;

        let path = self.log_dir.join(&name);
        let file = File::create(&path)?;
        debug!("Opened telemetry file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;

        self.prune_old_files();
        Ok(())
    }

    /// Delete the oldest telemetry files beyond the retention limit.
    ///
    /// Pruning is best-effort; a failure here never interrupts logging.
    fn prune_old_files(&self) {
        let entries = match fs::read_dir(&self.log_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list telemetry dir for pruning: {}", e);
                return;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("telemetry_") && n.ends_with(".jsonl"))
                    .unwrap_or(false)
            })
            .collect();

        if files.len() <= self.max_files_to_keep {
            return;
        }

        // Names sort chronologically (timestamp plus sequence number)
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to prune telemetry file {}: {}", path.display(), e);
            }
        }
    }
}

/// Percentage of system memory currently available, clamped to 0-100.
///
/// Reported in the battery telemetry frame's fuel field. Returns 0 when
/// /proc/meminfo is unreadable or incomplete.
#[must_use]
pub fn free_mem_percent() -> u8 {
    let contents = match fs::read_to_string("/proc/meminfo") {
        Ok(contents) => contents,
        Err(_) => return 0,
    };

    let field_kb = |name: &str| -> Option<u64> {
        contents
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };

    match (field_kb("MemAvailable:"), field_kb("MemTotal:")) {
        (Some(available), Some(total)) if total > 0 => {
            ((available * 100 / total) as u8).min(100)
        }
        _ => 0,
    }
}
