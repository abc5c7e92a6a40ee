//! Typed observations submitted by domain adapters.
//!
//! `Observation` is a closed sum type: every submission path is statically
//! exhaustive. The single runtime check lives in [`Observation::from_tagged`],
//! which decodes untyped `(variant_tag, variant_fields)` input and rejects
//! anything outside the known variants.
//!
//! Every variant stamps `observed_at` with the current UTC time when built,
//! and when decoded from input that omits it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ObservationError, ObservationResult};

// ---------------------------------------------------------------------------
// Enumerated fields
// ---------------------------------------------------------------------------

/// How a SLAM loop closure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopClosureMethod {
    Icp,
    Visual,
    Semantic,
}

impl fmt::Display for LoopClosureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icp => write!(f, "icp"),
            Self::Visual => write!(f, "visual"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// Whether a landmark's appearance matches what was previously seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    Consistent,
    Inconsistent,
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Consistent => write!(f, "consistent"),
            Self::Inconsistent => write!(f, "inconsistent"),
        }
    }
}

/// Flight phase during which a GNC event occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GncMode {
    Burn,
    Coast,
    Maneuver,
}

impl fmt::Display for GncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Burn => write!(f, "burn"),
            Self::Coast => write!(f, "coast"),
            Self::Maneuver => write!(f, "maneuver"),
        }
    }
}

/// Imaging modality of a medical finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    #[serde(rename = "CT")]
    Ct,
    #[serde(rename = "MRI")]
    Mri,
    #[serde(rename = "US")]
    Us,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ct => write!(f, "CT"),
            Self::Mri => write!(f, "MRI"),
            Self::Us => write!(f, "US"),
        }
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// SLAM loop closure against a known landmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopClosure {
    pub landmark_id: String,
    /// Match score in `[0, 1]`.
    pub score: f64,
    pub method: LoopClosureMethod,
    /// Position `x, y, z` followed by orientation quaternion `x, y, z, w`.
    pub pose_estimate: [f64; 7],
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl LoopClosure {
    pub fn new(
        landmark_id: impl Into<String>,
        score: f64,
        method: LoopClosureMethod,
        pose_estimate: [f64; 7],
    ) -> Self {
        Self {
            landmark_id: landmark_id.into(),
            score,
            method,
            pose_estimate,
            observed_at: Utc::now(),
        }
    }

    pub fn with_observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

/// Visual appearance check of a landmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppearanceMatch {
    pub landmark_id: String,
    pub consistency: Consistency,
    /// Match score in `[0, 1]`.
    pub score: f64,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl AppearanceMatch {
    pub fn new(landmark_id: impl Into<String>, consistency: Consistency, score: f64) -> Self {
        Self {
            landmark_id: landmark_id.into(),
            consistency,
            score,
            observed_at: Utc::now(),
        }
    }

    pub fn with_observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

/// Guidance, navigation, and control event, e.g. a thruster anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GncEvent {
    pub event_type: String,
    pub mode: GncMode,
    /// Severity in `[0, 1]`.
    pub severity: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl GncEvent {
    pub fn new(event_type: impl Into<String>, mode: GncMode, severity: f64) -> Self {
        Self {
            event_type: event_type.into(),
            mode,
            severity,
            parameters: BTreeMap::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

/// Medical imaging finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalFinding {
    pub patient_id: String,
    pub finding_type: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    pub location: String,
    pub size_mm: f64,
    pub modality: Modality,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl MedicalFinding {
    pub fn new(
        patient_id: impl Into<String>,
        finding_type: impl Into<String>,
        confidence: f64,
        location: impl Into<String>,
        size_mm: f64,
        modality: Modality,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            finding_type: finding_type.into(),
            confidence,
            location: location.into(),
            size_mm,
            modality,
            observed_at: Utc::now(),
        }
    }

    pub fn with_observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

// ---------------------------------------------------------------------------
// Observation
// ---------------------------------------------------------------------------

/// Every observation the bridge can submit.
///
/// Serialized adjacently tagged: `{"variant": "loop_closure", "fields": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", content = "fields", rename_all = "snake_case")]
pub enum Observation {
    LoopClosure(LoopClosure),
    AppearanceMatch(AppearanceMatch),
    GncEvent(GncEvent),
    MedicalFinding(MedicalFinding),
}

impl Observation {
    /// Wire tags of all supported variants.
    pub const TAGS: [&'static str; 4] = [
        "loop_closure",
        "appearance_match",
        "gnc_event",
        "medical_finding",
    ];

    /// Decode untyped adapter input into a typed observation.
    ///
    /// Fails with [`ObservationError::Unsupported`] for an unknown tag and
    /// [`ObservationError::MalformedFields`] when the fields do not fit the
    /// tag's shape. Nothing is sent in either case.
    pub fn from_tagged(tag: &str, fields: serde_json::Value) -> ObservationResult<Self> {
        let malformed = |e: serde_json::Error| ObservationError::MalformedFields {
            tag: tag.to_string(),
            message: e.to_string(),
        };

        match tag {
            "loop_closure" => serde_json::from_value(fields)
                .map(Self::LoopClosure)
                .map_err(malformed),
            "appearance_match" => serde_json::from_value(fields)
                .map(Self::AppearanceMatch)
                .map_err(malformed),
            "gnc_event" => serde_json::from_value(fields)
                .map(Self::GncEvent)
                .map_err(malformed),
            "medical_finding" => serde_json::from_value(fields)
                .map(Self::MedicalFinding)
                .map_err(malformed),
            other => Err(ObservationError::Unsupported {
                tag: other.to_string(),
            }),
        }
    }

    /// Wire tag of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::LoopClosure(_) => "loop_closure",
            Self::AppearanceMatch(_) => "appearance_match",
            Self::GncEvent(_) => "gnc_event",
            Self::MedicalFinding(_) => "medical_finding",
        }
    }

    /// The entity the observation is about, for logs.
    pub fn subject(&self) -> &str {
        match self {
            Self::LoopClosure(o) => &o.landmark_id,
            Self::AppearanceMatch(o) => &o.landmark_id,
            Self::GncEvent(o) => &o.event_type,
            Self::MedicalFinding(o) => &o.finding_type,
        }
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        match self {
            Self::LoopClosure(o) => o.observed_at,
            Self::AppearanceMatch(o) => o.observed_at,
            Self::GncEvent(o) => o.observed_at,
            Self::MedicalFinding(o) => o.observed_at,
        }
    }
}

impl From<LoopClosure> for Observation {
    fn from(o: LoopClosure) -> Self {
        Self::LoopClosure(o)
    }
}

impl From<AppearanceMatch> for Observation {
    fn from(o: AppearanceMatch) -> Self {
        Self::AppearanceMatch(o)
    }
}

impl From<GncEvent> for Observation {
    fn from(o: GncEvent) -> Self {
        Self::GncEvent(o)
    }
}

impl From<MedicalFinding> for Observation {
    fn from(o: MedicalFinding) -> Self {
        Self::MedicalFinding(o)
    }
}
