//! Detections and the detector capability interface.
//!
//! Detections are produced per frame and consumed immediately by the
//! executor; they are never persisted.

mod builder;
mod public;
mod source;

pub use builder::DetectionBuilder;
pub use public::{PublicDetections, PublicDetectionsFactory};
pub use source::{DetectionSource, DetectorFactory};

use serde::{Deserialize, Serialize};

use crate::tracker::Rect;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: Rect,
    pub score: f64,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: Rect, score: f64, class_id: u32) -> Self {
        Self {
            bbox,
            score,
            class_id,
        }
    }
}

/// Keeps detections of the classes of interest at or above a confidence floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    pub confidence: f64,
    pub classes: Vec<u32>,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            confidence: 0.3,
            classes: vec![0],
        }
    }
}

impl DetectionFilter {
    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.score >= self.confidence && self.classes.contains(&detection.class_id)
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }
}
