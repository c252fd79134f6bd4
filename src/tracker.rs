//! Tracker capability interface and the trackers known to the benchmark.

mod byte_tracker;
mod kalman_filter;
mod matching;
mod rect;
mod strack;
mod track_state;

pub use byte_tracker::{ByteTrack, ByteTrackConfig};
pub use rect::{Rect, iou_batch};
pub use strack::STrack;
pub use track_state::TrackState;

use serde::{Deserialize, Serialize};

use crate::catalog::Frame;
use crate::detection::Detection;
use crate::error::{BenchError, Result};

/// One tracked object on one frame, in pixel coordinates.
///
/// `track_id` is only meaningful within the tracker instance that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedBox {
    pub bbox: Rect,
    pub track_id: u64,
}

/// A stateful multi-object tracker bound to a single sequence.
///
/// Frames must be fed in strictly increasing index order; trackers keep
/// motion and appearance history between calls.
pub trait MultiObjectTracker {
    fn update(&mut self, detections: &[Detection], frame: &Frame) -> Result<Vec<TrackedBox>>;
}

/// Builds fresh tracker instances, one per (tracker, sequence) run.
pub trait TrackerFactory: Send + Sync {
    /// Run directory name, e.g. `bytetrack`.
    fn name(&self) -> &str;

    /// Exclusive compute device. Units reporting the same device never run
    /// concurrently.
    fn device(&self) -> Option<&str> {
        None
    }

    fn create(&self) -> Result<Box<dyn MultiObjectTracker + Send>>;
}

/// Algorithm selection plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TrackerKind {
    #[serde(rename = "bytetrack")]
    ByteTrack(ByteTrackConfig),
}

/// Immutable per-tracker configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSpec {
    pub name: String,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(flatten)]
    pub kind: TrackerKind,
}

impl TrackerSpec {
    pub fn bytetrack(name: impl Into<String>, config: ByteTrackConfig) -> Self {
        Self {
            name: name.into(),
            device: None,
            kind: TrackerKind::ByteTrack(config),
        }
    }
}

impl TrackerFactory for TrackerSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    fn create(&self) -> Result<Box<dyn MultiObjectTracker + Send>> {
        match &self.kind {
            TrackerKind::ByteTrack(config) => ByteTrack::new(config.clone())
                .map(|t| Box::new(t) as Box<dyn MultiObjectTracker + Send>)
                .map_err(|e| BenchError::TrackerInit {
                    tracker: self.name.clone(),
                    reason: e.to_string(),
                }),
        }
    }
}
