mod department;

pub use department::Department;

use chrono::{DateTime, Utc};
use derive_more::{Display, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Urgency of intervention on a 0..=10 scale. Zero is reserved for the
/// `ok` and `error` verdicts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, Into,
)]
#[serde(from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const NONE: Severity = Severity(0);
    pub const MIN: Severity = Severity(1);
    pub const MAX: Severity = Severity(10);

    pub fn new(value: u8) -> Self {
        Severity(value.min(Self::MAX.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Severity as reported by a model: rounded and clamped into 1..=10.
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() {
            return Self::MIN;
        }
        let rounded = score.round().clamp(Self::MIN.0 as f64, Self::MAX.0 as f64);
        Severity(rounded as u8)
    }

    /// Severity derived from a detector confidence: `floor(confidence * 10)`.
    pub fn from_confidence(confidence: f32) -> Self {
        if !confidence.is_finite() {
            return Self::NONE;
        }
        let scaled = (confidence.clamp(0.0, 1.0) * 10.0).floor();
        Severity(scaled as u8)
    }
}

impl From<u8> for Severity {
    fn from(value: u8) -> Self {
        Severity::new(value)
    }
}

/// What a detection backend concluded about one image, before the request
/// handler stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub department: Department,
    pub severity: Severity,
    pub estimated_fix_time: String,
    pub description: Option<String>,
    pub confidence: Option<f32>,
    pub detected_objects: BTreeMap<String, f32>,
    pub error: Option<String>,
}

impl Finding {
    pub fn new(department: Department, severity: Severity, estimated_fix_time: impl Into<String>) -> Self {
        Self {
            department,
            severity,
            estimated_fix_time: estimated_fix_time.into(),
            description: None,
            confidence: None,
            detected_objects: BTreeMap::new(),
            error: None,
        }
    }

    /// Canonical record returned instead of a fault when analysis fails.
    pub fn failure(description: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            error: Some(error.into()),
            ..Self::new(Department::Error, Severity::NONE, "0")
        }
    }

    pub fn is_failure(&self) -> bool {
        self.department == Department::Error
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn into_result(self, processed_at: DateTime<Utc>) -> AnalysisResult {
        AnalysisResult {
            detected_category: self.department,
            severity_score: self.severity,
            estimated_fix_time: self.estimated_fix_time,
            description: self.description,
            confidence: self.confidence,
            detected_objects: self.detected_objects,
            error: self.error,
            processed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub detected_category: Department,
    pub severity_score: Severity,
    pub estimated_fix_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub detected_objects: BTreeMap<String, f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Body of `POST /analyze/base64`. `image` may be bare base64 or a data URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base64AnalysisRequest {
    pub image: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
