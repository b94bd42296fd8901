//! # Telemetry Module
//!
//! Decoded telemetry data and its analysis.
//!
//! This module handles:
//! - The normalized telemetry frame model
//! - Baselines (known-good ranges per scooter model) and their store
//! - Classification of live frames against a baseline
//! - JSONL logging of the decoded stream with file rotation

pub mod baseline;
pub mod comparator;
pub mod frame;
pub mod logger;

pub use baseline::{Baseline, BaselineStore, FieldExpectation, JsonBaselineStore};
pub use comparator::{classify, Classification, ComparatorConfig, FieldReport};
pub use frame::{DriveMode, TelemetryField, TelemetryFrame};
pub use logger::JsonlLogger;
