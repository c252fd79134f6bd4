//! Line formats exchanged between the executor, the stitcher and the evaluator.
//!
//! Intermediate label line (one file per frame, normalized to the frame size):
//! `classId centerX centerY width height trackId`
//!
//! Canonical MOTChallenge row (one file per sequence, absolute pixels):
//! `frame,id,bb_left,bb_top,bb_width,bb_height,1,-1,-1,-1`

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::Resolution;
use crate::tracker::{Rect, TrackedBox};

/// Class column of label lines; the evaluator only scores one class.
pub const CLASS_PLACEHOLDER: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelRecord {
    pub class_id: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub track_id: u64,
}

impl LabelRecord {
    /// Normalizes a pixel box by the frame size it was detected on.
    ///
    /// Boxes reaching outside the frame are not clamped, so values may fall
    /// outside `[0, 1]`.
    pub fn normalize(track: &TrackedBox, frame: Resolution) -> Self {
        let (cx, cy) = track.bbox.center();
        let (w, h) = (frame.width as f64, frame.height as f64);
        Self {
            class_id: CLASS_PLACEHOLDER,
            center_x: cx / w,
            center_y: cy / h,
            width: track.bbox.width / w,
            height: track.bbox.height / h,
            track_id: track.track_id,
        }
    }

    pub fn denormalize(&self, frame: Resolution) -> Rect {
        let (w, h) = (frame.width as f64, frame.height as f64);
        Rect::new(
            (self.center_x - self.width / 2.0) * w,
            (self.center_y - self.height / 2.0) * h,
            self.width * w,
            self.height * h,
        )
    }

    /// Parses a label line. Fields past the sixth are ignored; the track id
    /// may be written as a float and is truncated.
    pub fn parse(line: &str) -> Result<Self, String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            return Err(format!("expected 6 fields, found {}", parts.len()));
        }
        let number = |idx: usize| -> Result<f64, String> {
            parts[idx]
                .parse::<f64>()
                .map_err(|e| format!("field {} ('{}'): {e}", idx + 1, parts[idx]))
        };
        let class_id = number(0)?;
        let track_id = number(5)?;
        if !(track_id.is_finite() && track_id >= 0.0) {
            return Err(format!("invalid track id '{}'", parts[5]));
        }
        Ok(Self {
            class_id: class_id as u32,
            center_x: number(1)?,
            center_y: number(2)?,
            width: number(3)?,
            height: number(4)?,
            track_id: track_id as u64,
        })
    }
}

impl fmt::Display for LabelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6} {}",
            self.class_id, self.center_x, self.center_y, self.width, self.height, self.track_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalRow {
    pub frame_id: u64,
    pub track_id: u64,
    pub bbox: Rect,
}

impl fmt::Display for CanonicalRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{:.2},{:.2},{:.2},{:.2},1,-1,-1,-1",
            self.frame_id,
            self.track_id,
            self.bbox.x,
            self.bbox.y,
            self.bbox.width,
            self.bbox.height
        )
    }
}

/// What the stitcher does with an unreadable label line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedRecordPolicy {
    #[default]
    Skip,
    Fail,
}
