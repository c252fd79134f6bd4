//! Schedules (tracker, sequence) units over the executor.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::catalog::Sequence;
use crate::detection::DetectorFactory;
use crate::error::{BenchError, IoContext, Result};
use crate::executor::{SequenceExecutor, SequenceReport};
use crate::tracker::TrackerFactory;

pub const SUMMARY_FILE: &str = "summary.csv";

/// What a tracker construction failure costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitFailurePolicy {
    /// Skip every remaining sequence of that tracker.
    #[default]
    SkipTracker,
    /// Lose only the sequence whose tracker failed to build.
    SkipSequence,
}

#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Completed(SequenceReport),
    Failed(String),
    /// Not attempted because the tracker was disabled earlier
    Skipped,
}

#[derive(Debug, Clone)]
pub struct UnitResult {
    pub tracker: String,
    pub sequence: String,
    pub outcome: UnitOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerThroughput {
    pub tracker: String,
    pub sequences: usize,
    pub frames: usize,
    pub fps: f64,
}

#[derive(Debug, Clone, Default)]
pub struct BenchmarkReport {
    pub units: Vec<UnitResult>,
}

impl BenchmarkReport {
    pub fn completed(&self) -> impl Iterator<Item = &SequenceReport> {
        self.units.iter().filter_map(|u| match &u.outcome {
            UnitOutcome::Completed(report) => Some(report),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.units.iter().filter_map(|u| match &u.outcome {
            UnitOutcome::Failed(reason) => Some((u.tracker.as_str(), u.sequence.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// Frames processed per second of detect + update time, per tracker, in
    /// first-seen order.
    pub fn throughput(&self) -> Vec<TrackerThroughput> {
        let mut order: Vec<String> = Vec::new();
        let mut totals: HashMap<String, (usize, usize, Duration)> = HashMap::new();
        for report in self.completed() {
            if !totals.contains_key(&report.tracker) {
                order.push(report.tracker.clone());
            }
            let entry = totals.entry(report.tracker.clone()).or_default();
            entry.0 += 1;
            entry.1 += report.frames_written;
            entry.2 += report.tracking_time;
        }
        order
            .into_iter()
            .map(|tracker| {
                let (sequences, frames, time) = totals[&tracker];
                let secs = time.as_secs_f64();
                TrackerThroughput {
                    tracker,
                    sequences,
                    frames,
                    fps: if secs > 0.0 { frames as f64 / secs } else { 0.0 },
                }
            })
            .collect()
    }

    pub fn write_summary(&self, path: &Path) -> Result<()> {
        let mut out = String::from("tracker,sequences,frames,fps\n");
        for row in self.throughput() {
            let _ = writeln!(out, "{},{},{},{:.2}", row.tracker, row.sequences, row.frames, row.fps);
        }
        fs::write(path, out).at(path)
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkOptions {
    /// Concurrent (tracker, sequence) units; 1 reproduces the sequential loop
    pub workers: usize,
    pub init_failures: InitFailurePolicy,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            init_failures: InitFailurePolicy::SkipTracker,
        }
    }
}

pub struct Benchmark {
    sequences: Vec<Sequence>,
    trackers: Vec<Arc<dyn TrackerFactory>>,
    detectors: Arc<dyn DetectorFactory>,
    executor: SequenceExecutor,
    options: BenchmarkOptions,
    /// Advanced once per finished unit; hidden unless replaced
    progress: ProgressBar,
}

impl Benchmark {
    pub fn new(
        sequences: Vec<Sequence>,
        trackers: Vec<Arc<dyn TrackerFactory>>,
        detectors: Arc<dyn DetectorFactory>,
        executor: SequenceExecutor,
        options: BenchmarkOptions,
    ) -> Self {
        Self {
            sequences,
            trackers,
            detectors,
            executor,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports unit completion on `progress`, sized to the unit count.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        progress.set_length(self.unit_count() as u64);
        self.progress = progress;
        self
    }

    /// Number of (tracker, sequence) units a run schedules.
    pub fn unit_count(&self) -> usize {
        self.trackers.len() * self.sequences.len()
    }

    pub fn runs_root(&self) -> &Path {
        self.executor.runs_root()
    }

    /// Runs every tracker over every sequence, replacing any previous runs.
    pub fn run(&self) -> Result<BenchmarkReport> {
        let runs_root = self.executor.runs_root().to_path_buf();
        if runs_root.exists() {
            fs::remove_dir_all(&runs_root).at(&runs_root)?;
        }
        fs::create_dir_all(&runs_root).at(&runs_root)?;

        let units: Vec<(usize, usize)> = (0..self.trackers.len())
            .flat_map(|t| (0..self.sequences.len()).map(move |s| (t, s)))
            .collect();
        let disabled: Vec<AtomicBool> = self.trackers.iter().map(|_| AtomicBool::new(false)).collect();
        let devices = DeviceLocks::new(&self.trackers);
        let run_unit = |&(t, s): &(usize, usize)| {
            let unit = self.run_unit(t, s, &disabled, &devices);
            self.progress.inc(1);
            unit
        };

        let units = if self.options.workers <= 1 {
            units.iter().map(&run_unit).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.workers)
                .build()
                .map_err(|e| BenchError::InvalidConfig(format!("worker pool: {e}")))?;
            pool.install(|| units.par_iter().map(&run_unit).collect())
        };

        let report = BenchmarkReport { units };
        report.write_summary(&runs_root.join(SUMMARY_FILE))?;
        Ok(report)
    }

    fn run_unit(
        &self,
        tracker_idx: usize,
        sequence_idx: usize,
        disabled: &[AtomicBool],
        devices: &DeviceLocks,
    ) -> UnitResult {
        let factory = self.trackers[tracker_idx].as_ref();
        let sequence = &self.sequences[sequence_idx];
        let result = |outcome| UnitResult {
            tracker: factory.name().to_string(),
            sequence: sequence.name.clone(),
            outcome,
        };

        if disabled[tracker_idx].load(Ordering::SeqCst) {
            return result(UnitOutcome::Skipped);
        }

        let _device = devices.acquire(factory.device());
        match self.executor.run(factory, self.detectors.as_ref(), sequence) {
            Ok(report) => {
                info!(
                    tracker = factory.name(),
                    sequence = %sequence.name,
                    frames = report.frames_written,
                    failed = report.frames_failed,
                    "sequence done"
                );
                result(UnitOutcome::Completed(report))
            }
            Err(err @ BenchError::TrackerInit { .. }) => {
                error!(stage = "execute", tracker = factory.name(), sequence = %sequence.name, error = %err, "tracker construction failed");
                if self.options.init_failures == InitFailurePolicy::SkipTracker {
                    warn!(tracker = factory.name(), "skipping the tracker's remaining sequences");
                    disabled[tracker_idx].store(true, Ordering::SeqCst);
                }
                result(UnitOutcome::Failed(err.to_string()))
            }
            Err(err) => {
                error!(stage = "execute", tracker = factory.name(), sequence = %sequence.name, error = %err, "sequence failed");
                result(UnitOutcome::Failed(err.to_string()))
            }
        }
    }
}

/// One mutex per exclusive device.
struct DeviceLocks {
    locks: HashMap<String, Mutex<()>>,
}

impl DeviceLocks {
    fn new(trackers: &[Arc<dyn TrackerFactory>]) -> Self {
        let locks = trackers
            .iter()
            .filter_map(|t| t.device())
            .map(|d| (d.to_string(), Mutex::new(())))
            .collect();
        Self { locks }
    }

    fn acquire(&self, device: Option<&str>) -> Option<std::sync::MutexGuard<'_, ()>> {
        let lock = self.locks.get(device?)?;
        // a panicked holder leaves no state behind the lock
        Some(lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }
}
