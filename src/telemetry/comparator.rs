//! # Baseline Comparator
//!
//! Classifies each telemetry field against the loaded baseline.
//!
//! `classify` is a pure function of (frame, baseline, config): no
//! hidden state, deterministic, cheap enough to recompute on every
//! frame at stream rate.

use serde::Serialize;
use std::collections::BTreeMap;

use super::baseline::{Baseline, FieldExpectation};
use super::frame::{TelemetryFrame, TelemetryField};

/// Per-field verdict against the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Within the baseline's accepted range or discrete set
    Normal,
    /// Outside the range but within the tolerance band
    Warning,
    /// Beyond the tolerance band
    Error,
    /// Field absent from the frame or the baseline (or no baseline)
    NotApplicable,
}

/// Classification verdicts for every telemetry field
pub type FieldReport = BTreeMap<TelemetryField, Classification>;

/// Comparator tuning
#[derive(Debug, Clone, Copy)]
pub struct ComparatorConfig {
    /// Warning band beyond min/max, as a percentage of the range span
    pub tolerance_percent: f64,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self { tolerance_percent: 20.0 }
    }
}

/// Classify every field of a frame against a baseline
///
/// Fields absent from either side classify [`Classification::NotApplicable`];
/// with no baseline loaded, every field does.
pub fn classify(
    frame: &TelemetryFrame,
    baseline: Option<&Baseline>,
    config: &ComparatorConfig,
) -> FieldReport {
    let mut report = FieldReport::new();
    for field in TelemetryField::ALL {
        let verdict = match (frame.numeric_value(field), baseline.and_then(|b| b.expectation(field))) {
            (Some(value), Some(FieldExpectation::Range { min, max })) => {
                classify_range(value, *min, *max, config.tolerance_percent)
            }
            (Some(value), Some(FieldExpectation::Discrete { values })) => {
                // Discrete sets have no meaningful "near miss"
                if values.iter().any(|v| (v - value).abs() < 1e-9) {
                    Classification::Normal
                } else {
                    Classification::Error
                }
            }
            _ => Classification::NotApplicable,
        };
        report.insert(field, verdict);
    }
    report
}

/// Classify a value against an inclusive range with a tolerance band
fn classify_range(value: f64, min: f64, max: f64, tolerance_percent: f64) -> Classification {
    if value >= min && value <= max {
        return Classification::Normal;
    }

    let span = max - min;
    // A zero-span range still gets a band proportional to its magnitude
    let band = if span > 0.0 {
        span * tolerance_percent / 100.0
    } else {
        min.abs() * tolerance_percent / 100.0
    };

    if value >= min - band && value <= max + band {
        Classification::Warning
    } else {
        Classification::Error
    }
}
