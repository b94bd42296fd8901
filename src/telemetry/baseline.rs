//! # Baselines
//!
//! Known-good operating ranges recorded per scooter model.
//!
//! A baseline is produced by a separate learn workflow while a healthy
//! scooter runs; this crate only reads the finished record. Baselines
//! are immutable once saved: a re-learn writes a new record, and the
//! most recent one per model wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use super::frame::TelemetryField;
use crate::error::Result;
use tracing::warn;

/// Accepted values for one telemetry field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldExpectation {
    /// Continuous range, bounds inclusive
    Range { min: f64, max: f64 },
    /// Discrete accepted values (e.g. the speed modes seen in learning)
    Discrete { values: Vec<f64> },
}

/// Known-good operating ranges for one scooter model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Scooter model this baseline belongs to
    pub model: String,

    /// When the learn capture finished
    pub captured_at: DateTime<Utc>,

    /// Telemetry frames the learn run was built from
    pub sample_count: u64,

    /// Free-text notes from the technician
    #[serde(default)]
    pub notes: String,

    /// Expected values per telemetry field
    pub fields: BTreeMap<TelemetryField, FieldExpectation>,
}

impl Baseline {
    /// Expected values for a field, if the baseline defines any
    pub fn expectation(&self, field: TelemetryField) -> Option<&FieldExpectation> {
        self.fields.get(&field)
    }
}

/// Read access to stored baselines
///
/// The capture core never writes baselines; it only loads the active
/// one for the session's model.
#[cfg_attr(test, mockall::automock)]
pub trait BaselineStore {
    /// Load the most recent baseline for a model, if any exists
    fn load_baseline(&self, model: &str) -> Result<Option<Baseline>>;
}

/// Baseline store backed by a directory of JSON files
///
/// Every `*.json` file in the directory holds one serialized
/// [`Baseline`]; historical baselines for the same model may coexist
/// and the newest `captured_at` wins.
pub struct JsonBaselineStore {
    dir: PathBuf,
}

impl JsonBaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BaselineStore for JsonBaselineStore {
    fn load_baseline(&self, model: &str) -> Result<Option<Baseline>> {
        if !self.dir.is_dir() {
            return Ok(None);
        }

        let mut newest: Option<Baseline> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents = fs::read_to_string(&path)?;
            let baseline: Baseline = match serde_json::from_str(&contents) {
                Ok(b) => b,
                Err(e) => {
                    // One unreadable file must not block the capture
                    warn!(path = %path.display(), error = %e, "skipping unreadable baseline file");
                    continue;
                }
            };

            if baseline.model != model {
                continue;
            }
            match &newest {
                Some(current) if current.captured_at >= baseline.captured_at => {}
                _ => newest = Some(baseline),
            }
        }

        Ok(newest)
    }
}
