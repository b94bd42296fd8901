//! # Telemetry JSONL Logger
//!
//! Consumer sink that records the decoded stream to JSONL files with
//! rotation.
//!
//! This module handles:
//! - One JSON object per (frame, classification) pair
//! - Raw-hex and status records for undetected captures
//! - Rotating to a new file every N records
//! - Retaining only the last M files
//!
//! Writes go through a non-blocking writer with a background worker, so
//! a slow disk cannot stall the ingest path.

use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

use crate::error::Result;
use crate::protocol::RawFrame;
use crate::session::{ConsumerSink, SessionStatus};
use crate::telemetry::comparator::FieldReport;
use crate::telemetry::frame::TelemetryFrame;

const FILE_PREFIX: &str = "telemetry-";
const FILE_SUFFIX: &str = ".jsonl";

/// JSONL telemetry logger with file rotation
pub struct JsonlLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    seq: u64,
    records_in_file: usize,
    writer: Option<(NonBlocking, WorkerGuard)>,
}

impl JsonlLogger {
    /// Create a logger writing under `dir`
    ///
    /// # Arguments
    ///
    /// * `dir` - Log directory, created if missing
    /// * `max_records_per_file` - Records before rotating to a new file
    /// * `max_files_to_keep` - Old files retained after rotation
    ///
    /// # Errors
    ///
    /// Returns error if the directory or the first log file cannot be
    /// created
    pub fn new(
        dir: impl Into<PathBuf>,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut logger = Self {
            seq: next_sequence(&dir)?,
            dir,
            max_records_per_file,
            max_files_to_keep,
            records_in_file: 0,
            writer: None,
        };
        logger.open_next_file()?;
        Ok(logger)
    }

    fn open_next_file(&mut self) -> Result<()> {
        // Dropping the previous writer flushes its worker
        self.writer = None;

        let path = self.dir.join(format!("{}{:06}{}", FILE_PREFIX, self.seq, FILE_SUFFIX));
        self.seq += 1;
        self.records_in_file = 0;

        let file = File::create(path)?;
        self.writer = Some(tracing_appender::non_blocking(file));
        self.prune_old_files();
        Ok(())
    }

    /// Remove the oldest log files beyond the retention limit
    fn prune_old_files(&self) {
        let mut files: Vec<PathBuf> = match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
                        .unwrap_or(false)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "telemetry log dir unreadable, skipping prune");
                return;
            }
        };

        // Zero-padded sequence numbers sort lexicographically
        files.sort();
        while files.len() > self.max_files_to_keep {
            let victim = files.remove(0);
            if let Err(e) = fs::remove_file(&victim) {
                warn!(path = %victim.display(), error = %e, "failed to prune telemetry log");
            }
        }
    }

    /// Append one record, rotating first if the current file is full
    ///
    /// Write failures are logged and swallowed: the logger must never
    /// fail the ingest path.
    fn write_record(&mut self, record: serde_json::Value) {
        if self.records_in_file >= self.max_records_per_file {
            if let Err(e) = self.open_next_file() {
                warn!(error = %e, "telemetry log rotation failed");
                return;
            }
        }

        let Some((writer, _guard)) = self.writer.as_mut() else {
            return;
        };
        match serde_json::to_string(&record) {
            Ok(line) => {
                if let Err(e) = writeln!(writer, "{}", line) {
                    warn!(error = %e, "telemetry log write failed");
                } else {
                    self.records_in_file += 1;
                }
            }
            Err(e) => warn!(error = %e, "telemetry record serialization failed"),
        }
    }
}

impl ConsumerSink for JsonlLogger {
    fn on_frame(&mut self, frame: &TelemetryFrame, report: &FieldReport) {
        self.write_record(json!({
            "type": "frame",
            "frame": frame,
            "classification": report,
        }));
    }

    fn on_raw_frame(&mut self, frame: &RawFrame) {
        self.write_record(json!({
            "type": "raw",
            "protocol": frame.protocol,
            "offset": frame.offset,
            "hex": frame.hex(),
        }));
    }

    fn on_status(&mut self, status: SessionStatus) {
        self.write_record(json!({
            "type": "status",
            "status": status,
        }));
    }
}

/// First unused file sequence number in `dir`
///
/// Continuing the numbering keeps restarts from overwriting earlier
/// captures.
fn next_sequence(dir: &PathBuf) -> Result<u64> {
    let mut max_seen: Option<u64> = None;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_prefix(FILE_PREFIX).and_then(|s| s.strip_suffix(FILE_SUFFIX))
        else {
            continue;
        };
        if let Ok(seq) = stem.parse::<u64>() {
            max_seen = Some(max_seen.map_or(seq, |m| m.max(seq)));
        }
    }
    Ok(max_seen.map_or(0, |m| m + 1))
}
