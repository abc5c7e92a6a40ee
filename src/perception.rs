//! Detector output and its conversion into appearance observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observation::{AppearanceMatch, Consistency};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Pixel-space box: top-left corner plus extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Little-endian `x, y, width, height`.
    fn to_le_bytes(self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.x.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.y.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.width.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.height.to_le_bytes());
        bytes
    }

    pub fn center(&self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.width) / 2.0,
            f64::from(self.y) + f64::from(self.height) / 2.0,
        )
    }
}

/// One object detected in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub object_class: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
    pub center: (f64, f64),
    pub timestamp: DateTime<Utc>,
    pub frame_id: u64,
}

impl DetectionResult {
    /// Detection with `center` derived from `bbox` and stamped now.
    pub fn new(
        object_class: impl Into<String>,
        confidence: f64,
        bbox: BoundingBox,
        frame_id: u64,
    ) -> Self {
        Self {
            object_class: object_class.into(),
            confidence,
            center: bbox.center(),
            bbox,
            timestamp: Utc::now(),
            frame_id,
        }
    }

    /// `object_{frame}_{hash}` where the hash is FNV-1a over the box, so
    /// the id is the same across runs, builds, and hosts.
    pub fn object_id(&self) -> String {
        format!("object_{}_{:016x}", self.frame_id, fnv1a(&self.bbox.to_le_bytes()))
    }

    pub fn is_confident(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }

    /// Appearance match keyed by [`object_id`](Self::object_id). Detections
    /// at or above `threshold` count as consistent.
    pub fn to_observation(&self, threshold: f64) -> AppearanceMatch {
        let consistency = if self.is_confident(threshold) {
            Consistency::Consistent
        } else {
            Consistency::Inconsistent
        };
        AppearanceMatch::new(self.object_id(), consistency, self.confidence)
            .with_observed_at(self.timestamp)
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Detections at or above `threshold`, in input order.
pub fn filter_confident(detections: &[DetectionResult], threshold: f64) -> Vec<DetectionResult> {
    detections
        .iter()
        .filter(|d| d.is_confident(threshold))
        .cloned()
        .collect()
}
