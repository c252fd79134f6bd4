//! Traits for object detection backends.

use crate::catalog::{Frame, Sequence};
use crate::detection::Detection;
use crate::error::Result;

/// Per-sequence detector handle.
///
/// Implement this trait to connect any detection model to the benchmark.
///
/// # Example
///
/// ```ignore
/// use trackbench::{DetectionSource, Detection, Frame, Result};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
///         let pixels = frame.load_rgb()?;
///         // Run inference and return detections in pixel TLBR space
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// Shared detector, opened once per sequence.
///
/// Model weights are typically loaded once by the factory; `open` hands out
/// the per-sequence handle that the executor drives frame by frame.
pub trait DetectorFactory: Send + Sync {
    fn open(&self, sequence: &Sequence) -> Result<Box<dyn DetectionSource + Send>>;
}
