//! Per-sequence tracking executor.
//!
//! Runs one fresh tracker over one sequence, frame by frame, and persists the
//! tracker output as normalized label files under
//! `runs/<tracker>/<sequence>/labels/<frame>.txt`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Frame, FrameRef, Resolution, Sequence};
use crate::detection::{DetectionFilter, DetectionSource, DetectorFactory};
use crate::error::{BenchError, IoContext, Result};
use crate::record::LabelRecord;
use crate::tracker::{MultiObjectTracker, TrackerFactory};

pub const LABELS_DIR: &str = "labels";

/// What happens when detection or tracking fails on a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameErrorPolicy {
    /// Log, write no label file for the frame, continue with the next one.
    #[default]
    SkipFrame,
    /// End the sequence with the error.
    Abort,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    pub filter: DetectionFilter,
    pub frame_errors: FrameErrorPolicy,
    pub frame_timeout: Option<Duration>,
    pub sequence_timeout: Option<Duration>,
}

/// Outcome of one (tracker, sequence) run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub tracker: String,
    pub sequence: String,
    pub frames: usize,
    pub frames_written: usize,
    pub frames_failed: usize,
    pub records: usize,
    /// Boxes reaching outside the frame, written without clamping
    pub out_of_frame: usize,
    /// Time spent in detect + update
    pub tracking_time: Duration,
}

pub struct SequenceExecutor {
    runs_root: PathBuf,
    options: ExecutorOptions,
}

impl SequenceExecutor {
    pub fn new(runs_root: impl Into<PathBuf>, options: ExecutorOptions) -> Self {
        Self {
            runs_root: runs_root.into(),
            options,
        }
    }

    pub fn runs_root(&self) -> &Path {
        &self.runs_root
    }

    pub fn labels_dir(&self, tracker: &str, sequence: &str) -> PathBuf {
        self.runs_root.join(tracker).join(sequence).join(LABELS_DIR)
    }

    /// Runs a freshly built tracker over every frame of `sequence`.
    ///
    /// Tracker construction failures surface as `BenchError::TrackerInit`
    /// before anything is written.
    pub fn run(
        &self,
        factory: &dyn TrackerFactory,
        detectors: &dyn DetectorFactory,
        sequence: &Sequence,
    ) -> Result<SequenceReport> {
        let tracker_name = factory.name();
        let mut tracker = factory.create().map_err(|e| match e {
            BenchError::TrackerInit { .. } => e,
            other => BenchError::TrackerInit {
                tracker: tracker_name.to_string(),
                reason: other.to_string(),
            },
        })?;
        ensure_increasing(sequence)?;
        let mut detector = detectors.open(sequence)?;

        let labels_dir = self.labels_dir(tracker_name, &sequence.name);
        if labels_dir.exists() {
            fs::remove_dir_all(&labels_dir).at(&labels_dir)?;
        }
        fs::create_dir_all(&labels_dir).at(&labels_dir)?;

        info!(tracker = tracker_name, sequence = %sequence.name, frames = sequence.frames.len(), "tracking sequence");

        let mut report = SequenceReport {
            tracker: tracker_name.to_string(),
            sequence: sequence.name.clone(),
            frames: sequence.frames.len(),
            ..SequenceReport::default()
        };
        let started = Instant::now();
        let mut size_mismatch_logged = false;

        for frame_ref in sequence.frames() {
            let frame_started = Instant::now();
            let outcome = self.process_frame(
                tracker.as_mut(),
                detector.as_mut(),
                frame_ref,
                &labels_dir,
            );
            report.tracking_time += frame_started.elapsed();

            match outcome {
                Ok(frame) => {
                    report.frames_written += 1;
                    report.records += frame.records;
                    report.out_of_frame += frame.out_of_frame;
                    if !size_mismatch_logged && frame.size != sequence.resolution {
                        warn!(
                            tracker = tracker_name,
                            sequence = %sequence.name,
                            frame = frame_ref.index,
                            actual = %frame.size,
                            metadata = %sequence.resolution,
                            "frame size differs from sequence metadata; stitched coordinates will be off"
                        );
                        size_mismatch_logged = true;
                    }
                }
                Err(err) => match self.options.frame_errors {
                    FrameErrorPolicy::SkipFrame => {
                        warn!(tracker = tracker_name, sequence = %sequence.name, frame = frame_ref.index, error = %err, "frame failed, skipping");
                        report.frames_failed += 1;
                    }
                    FrameErrorPolicy::Abort => return Err(err),
                },
            }

            let over_frame = self
                .options
                .frame_timeout
                .is_some_and(|limit| frame_started.elapsed() > limit);
            let over_sequence = self
                .options
                .sequence_timeout
                .is_some_and(|limit| started.elapsed() > limit);
            if over_frame || over_sequence {
                return Err(BenchError::Timeout {
                    tracker: tracker_name.to_string(),
                    sequence: sequence.name.clone(),
                    frame: frame_ref.index,
                });
            }
        }

        if report.out_of_frame > 0 {
            info!(tracker = tracker_name, sequence = %sequence.name, boxes = report.out_of_frame, "boxes outside the frame were kept unclamped");
        }
        Ok(report)
    }

    fn process_frame(
        &self,
        tracker: &mut (dyn MultiObjectTracker + Send),
        detector: &mut (dyn DetectionSource + Send),
        frame_ref: &FrameRef,
        labels_dir: &Path,
    ) -> Result<FrameOutcome> {
        let frame = frame_ref.probe()?;
        let detections = self.options.filter.apply(detector.detect(&frame)?);
        let tracks = tracker.update(&detections, &frame)?;

        let size = Resolution::new(frame.width, frame.height);
        let path = labels_dir.join(format!("{}.txt", frame_ref.stem()));
        write_labels(&path, &frame, tracks.iter().map(|t| LabelRecord::normalize(t, size)))?;

        Ok(FrameOutcome {
            size,
            records: tracks.len(),
            out_of_frame: tracks
                .iter()
                .filter(|t| t.bbox.exceeds(frame.width, frame.height))
                .count(),
        })
    }
}

struct FrameOutcome {
    size: Resolution,
    records: usize,
    out_of_frame: usize,
}

/// Writes one label file. A frame without tracks still gets an empty file,
/// so a missing file always means the frame was not processed.
fn write_labels(
    path: &Path,
    frame: &Frame,
    records: impl Iterator<Item = LabelRecord>,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path).at(path)?);
    for record in records {
        writeln!(writer, "{record}").at(path)?;
    }
    writer.flush().at(path)?;
    debug!(frame = frame.index, path = %path.display(), "labels written");
    Ok(())
}

fn ensure_increasing(sequence: &Sequence) -> Result<()> {
    match sequence.frames.windows(2).find(|w| w[0].index >= w[1].index) {
        Some(pair) => Err(BenchError::InvalidSequence {
            name: sequence.name.clone(),
            reason: format!(
                "frame {} follows frame {}; frames must be strictly increasing",
                pair[1].index, pair[0].index
            ),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Detection;
    use crate::tracker::{Rect, TrackedBox};
    use std::sync::{Arc, Mutex};

    struct FixedDetector;

    impl DetectionSource for FixedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(vec![
                Detection::new(Rect::from_tlbr(10.0, 10.0, 30.0, 40.0), 0.9, 0),
                Detection::new(Rect::from_tlbr(50.0, 5.0, 60.0, 20.0), 0.1, 0),
            ])
        }
    }

    impl DetectorFactory for FixedDetector {
        fn open(&self, _sequence: &Sequence) -> Result<Box<dyn DetectionSource + Send>> {
            Ok(Box::new(FixedDetector))
        }
    }

    /// Echoes each detection as a track and records the frame order it saw.
    struct EchoTracker {
        seen: Arc<Mutex<Vec<u64>>>,
        fail_on: Option<u64>,
        empty_on: Option<u64>,
    }

    impl MultiObjectTracker for EchoTracker {
        fn update(&mut self, detections: &[Detection], frame: &Frame) -> Result<Vec<TrackedBox>> {
            self.seen.lock().unwrap().push(frame.index);
            if self.fail_on == Some(frame.index) {
                return Err(BenchError::Tracker("boom".to_string()));
            }
            if self.empty_on == Some(frame.index) {
                return Ok(vec![]);
            }
            Ok(detections
                .iter()
                .enumerate()
                .map(|(i, d)| TrackedBox {
                    bbox: d.bbox,
                    track_id: i as u64 + 1,
                })
                .collect())
        }
    }

    struct EchoFactory {
        seen: Arc<Mutex<Vec<u64>>>,
        fail_on: Option<u64>,
        empty_on: Option<u64>,
    }

    impl TrackerFactory for EchoFactory {
        fn name(&self) -> &str {
            "echo"
        }

        fn create(&self) -> Result<Box<dyn MultiObjectTracker + Send>> {
            Ok(Box::new(EchoTracker {
                seen: Arc::clone(&self.seen),
                fail_on: self.fail_on,
                empty_on: self.empty_on,
            }))
        }
    }

    fn sequence_with_frames(dir: &Path, indices: &[u64]) -> Sequence {
        let frame_dir = dir.join("seq").join("img1");
        fs::create_dir_all(&frame_dir).unwrap();
        let frames = indices
            .iter()
            .map(|&index| {
                let path = frame_dir.join(format!("{index:08}.jpg"));
                image::RgbImage::new(100, 50).save(&path).unwrap();
                FrameRef { index, path }
            })
            .collect();
        Sequence {
            name: "seq".to_string(),
            frame_dir,
            resolution: Resolution::new(100, 50),
            frames,
        }
    }

    fn factory(fail_on: Option<u64>, empty_on: Option<u64>) -> EchoFactory {
        EchoFactory {
            seen: Arc::new(Mutex::new(Vec::new())),
            fail_on,
            empty_on,
        }
    }

    #[test]
    fn test_writes_normalized_labels_in_frame_order() {
        let dir = tempfile::tempdir().unwrap();
        let sequence = sequence_with_frames(dir.path(), &[1, 2, 3]);
        let executor = SequenceExecutor::new(dir.path().join("runs"), ExecutorOptions::default());
        let factory = factory(None, Some(2));

        let report = executor.run(&factory, &FixedDetector, &sequence).unwrap();
        assert_eq!(report.frames_written, 3);
        assert_eq!(report.records, 2);
        assert_eq!(*factory.seen.lock().unwrap(), [1, 2, 3]);

        let labels = executor.labels_dir("echo", "seq");
        let first = fs::read_to_string(labels.join("00000001.txt")).unwrap();
        // low-confidence detection filtered out before tracking
        assert_eq!(first, "0 0.200000 0.500000 0.200000 0.600000 1\n");
        // frame without tracks still produces an empty file
        assert_eq!(fs::read_to_string(labels.join("00000002.txt")).unwrap(), "");
    }

    #[test]
    fn test_skip_frame_policy_continues() {
        let dir = tempfile::tempdir().unwrap();
        let sequence = sequence_with_frames(dir.path(), &[1, 2, 3]);
        let executor = SequenceExecutor::new(dir.path().join("runs"), ExecutorOptions::default());

        let report = executor.run(&factory(Some(2), None), &FixedDetector, &sequence).unwrap();
        assert_eq!(report.frames_failed, 1);
        assert_eq!(report.frames_written, 2);
        assert!(!executor.labels_dir("echo", "seq").join("00000002.txt").exists());
    }

    #[test]
    fn test_abort_policy_stops_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let sequence = sequence_with_frames(dir.path(), &[1, 2, 3]);
        let options = ExecutorOptions {
            frame_errors: FrameErrorPolicy::Abort,
            ..ExecutorOptions::default()
        };
        let executor = SequenceExecutor::new(dir.path().join("runs"), options);
        let factory = factory(Some(2), None);

        assert!(executor.run(&factory, &FixedDetector, &sequence).is_err());
        assert_eq!(*factory.seen.lock().unwrap(), [1, 2]);
        assert!(!executor.labels_dir("echo", "seq").join("00000003.txt").exists());
    }

    #[test]
    fn test_rejects_out_of_order_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut sequence = sequence_with_frames(dir.path(), &[1, 2]);
        sequence.frames.reverse();
        let executor = SequenceExecutor::new(dir.path().join("runs"), ExecutorOptions::default());
        let factory = factory(None, None);

        let result = executor.run(&factory, &FixedDetector, &sequence);
        assert!(matches!(result, Err(BenchError::InvalidSequence { .. })));
        assert!(factory.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_sequence_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let sequence = sequence_with_frames(dir.path(), &[1, 2]);
        let options = ExecutorOptions {
            sequence_timeout: Some(Duration::ZERO),
            ..ExecutorOptions::default()
        };
        let executor = SequenceExecutor::new(dir.path().join("runs"), options);

        let result = executor.run(&factory(None, None), &FixedDetector, &sequence);
        assert!(matches!(result, Err(BenchError::Timeout { frame: 1, .. })));
    }

    #[test]
    fn test_frame_timeout_keeps_written_frames() {
        let dir = tempfile::tempdir().unwrap();
        let sequence = sequence_with_frames(dir.path(), &[1, 2, 3]);
        let options = ExecutorOptions {
            frame_timeout: Some(Duration::ZERO),
            ..ExecutorOptions::default()
        };
        let executor = SequenceExecutor::new(dir.path().join("runs"), options);
        let factory = factory(None, None);

        let result = executor.run(&factory, &FixedDetector, &sequence);
        assert!(matches!(result, Err(BenchError::Timeout { frame: 1, .. })));
        assert_eq!(*factory.seen.lock().unwrap(), [1]);
        let labels = executor.labels_dir("echo", "seq");
        assert!(labels.join("00000001.txt").is_file());
        assert!(!labels.join("00000002.txt").exists());
    }
}
