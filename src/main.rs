//! # Dashtap
//!
//! Passive diagnostics for e-scooter dashboard/controller serial buses.
//!
//! This application taps the scooter's internal serial bus through a
//! USB-TTL adapter, decodes the traffic into telemetry frames and
//! classifies each field against a learned per-model baseline.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging with tracing subscriber
//!    - Load configuration (path from the first CLI argument, default
//!      `config/default.toml`; missing file falls back to defaults)
//!    - Load the model's baseline, if one is configured
//!    - Start a telemetry session and open the serial tap
//!
//! 2. **Capture Loop**
//!    - Feed every received chunk into the session
//!    - Consumers log live frames and record JSONL telemetry
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Stop the session and log the final counters

use anyhow::Result;
use std::path::Path;
use tracing::{debug, info, warn};

use dashtap::config::Config;
use dashtap::serial::TapSerial;
use dashtap::session::{
    ConsumerSink, SessionConfig, SessionStatus, TelemetrySession,
};
use dashtap::telemetry::baseline::{Baseline, BaselineStore, JsonBaselineStore};
use dashtap::telemetry::comparator::{Classification, ComparatorConfig, FieldReport};
use dashtap::telemetry::frame::TelemetryFrame;
use dashtap::telemetry::logger::JsonlLogger;
use dashtap::protocol::dispatch::DetectConfig;

/// Frames between live status log lines
const DISPLAY_INTERVAL_FRAMES: u64 = 25;

/// Serial read buffer size
const READ_BUF_BYTES: usize = 512;

/// Console consumer: logs the live telemetry via `tracing`
struct DisplaySink {
    frames_seen: u64,
}

impl DisplaySink {
    fn new() -> Self {
        Self { frames_seen: 0 }
    }
}

impl ConsumerSink for DisplaySink {
    fn on_frame(&mut self, frame: &TelemetryFrame, report: &FieldReport) {
        self.frames_seen += 1;
        debug!(?frame, "frame");

        if self.frames_seen % DISPLAY_INTERVAL_FRAMES == 0 {
            let warnings = report.values().filter(|c| **c == Classification::Warning).count();
            let errors = report.values().filter(|c| **c == Classification::Error).count();
            info!(
                throttle = ?frame.throttle_percent,
                speed = ?frame.speed_kmh,
                voltage = ?frame.voltage,
                current = ?frame.current,
                temperature = ?frame.temperature,
                error = ?frame.error_description(),
                warnings,
                errors,
                "telemetry"
            );
        }
    }

    fn on_status(&mut self, status: SessionStatus) {
        match status {
            SessionStatus::NoValidData => warn!(
                "no valid data on the bus - check the tap wiring and baud rate"
            ),
            SessionStatus::Undetected => warn!(
                "protocol not detected - frames will be surfaced as raw hex"
            ),
            other => info!(status = ?other, "capture status"),
        }
    }
}

/// Load the configured model's baseline, if any
fn load_baseline(config: &Config) -> Option<Baseline> {
    if config.baseline.model.is_empty() {
        info!("No baseline model configured; classification disabled");
        return None;
    }

    let store = JsonBaselineStore::new(&config.baseline.dir);
    match store.load_baseline(&config.baseline.model) {
        Ok(Some(baseline)) => {
            info!(
                model = %baseline.model,
                captured_at = %baseline.captured_at,
                fields = baseline.fields.len(),
                "baseline loaded"
            );
            Some(baseline)
        }
        Ok(None) => {
            warn!(model = %config.baseline.model, "no baseline found for model");
            None
        }
        Err(e) => {
            warn!(error = %e, "baseline store unreadable, continuing without");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Dashtap v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());
    let config = if Path::new(&config_path).exists() {
        info!("Loading configuration from {}", config_path);
        Config::load(&config_path)?
    } else {
        info!("No configuration file at {}, using defaults", config_path);
        Config::default()
    };

    let baseline = load_baseline(&config);

    // Register consumers
    let mut sinks: Vec<Box<dyn ConsumerSink>> = vec![Box::new(DisplaySink::new())];
    if config.telemetry.enabled {
        let logger = JsonlLogger::new(
            &config.telemetry.log_dir,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )?;
        info!(dir = %config.telemetry.log_dir, "telemetry logging enabled");
        sinks.push(Box::new(logger));
    }

    // Start the capture session
    let mut session = TelemetrySession::new();
    session.start(
        SessionConfig {
            protocol: Some(config.capture.protocol.clone()),
            baseline,
            detect: DetectConfig {
                threshold: config.capture.detect_threshold,
                byte_budget: config.capture.detect_byte_budget,
            },
            no_data_byte_budget: config.capture.no_data_byte_budget,
            comparator: ComparatorConfig {
                tolerance_percent: config.analysis.tolerance_percent,
            },
            rpm_per_kmh: config.analysis.rpm_per_kmh,
        },
        sinks,
    )?;

    // Open the tap
    let baud_rate = config.effective_baud()?;
    let mut paths: Vec<&str> = vec![&config.serial.port];
    paths.extend(config.serial.fallback_ports.iter().map(|s| s.as_str()));
    let mut serial = TapSerial::open_with_paths(&paths, baud_rate)?;
    info!("Capturing from {} - press Ctrl+C to stop", serial.device_path());

    let mut buf = [0u8; READ_BUF_BYTES];

    // Capture loop
    loop {
        tokio::select! {
            read = serial.read_chunk(&mut buf) => {
                match read {
                    Ok(0) => {}
                    Ok(count) => session.ingest(&buf[..count])?,
                    Err(e) => {
                        warn!("Serial read failed: {}", e);
                        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    }
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Some(summary) = session.stop() {
        info!(
            bytes = summary.counters.bytes_seen,
            frames_decoded = summary.counters.frames_decoded,
            frames_rejected = summary.counters.frames_rejected,
            noise_bytes = summary.counters.noise_bytes,
            status = ?summary.status,
            "capture finished"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dashtap::protocol::ProtocolId;
    use dashtap::telemetry::comparator::classify;

    #[test]
    fn test_constants_are_sane() {
        assert!(DISPLAY_INTERVAL_FRAMES > 0);
        assert!(READ_BUF_BYTES >= 64, "buffer must hold at least one max-size frame");
    }

    #[test]
    fn test_display_sink_counts_frames() {
        let mut sink = DisplaySink::new();
        let frame = TelemetryFrame::empty(ProtocolId::JpQsS4, Utc::now());
        let report = classify(&frame, None, &ComparatorConfig::default());

        for _ in 0..3 {
            sink.on_frame(&frame, &report);
        }
        assert_eq!(sink.frames_seen, 3);
    }

    #[test]
    fn test_missing_baseline_model_loads_nothing() {
        let config = Config::default();
        assert!(load_baseline(&config).is_none());
    }
}
