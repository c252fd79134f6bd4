//! Benchmark runner for multi-object trackers on MOTChallenge-style datasets.
//!
//! The pipeline has four stages:
//! 1. [`Benchmark`] runs every configured tracker over every sequence and
//!    writes normalized per-frame label files under `runs/`.
//! 2. [`Stitcher`] merges them into one MOTChallenge file per
//!    (tracker, sequence) under the results root.
//! 3. [`ManifestBuilder`] writes the seqmap listing the sequences to score.
//! 4. [`EvaluationAdapter`] runs TrackEval on the results.
//!
//! Detectors and trackers plug in through [`DetectorFactory`] and
//! [`TrackerFactory`].

pub mod benchmark;
pub mod catalog;
pub mod config;
pub mod detection;
pub mod error;
pub mod evaluation;
pub mod executor;
pub mod manifest;
pub mod record;
pub mod stitcher;
pub mod tracker;

pub use benchmark::{Benchmark, BenchmarkOptions, BenchmarkReport};
pub use catalog::{Frame, Resolution, Sequence, SequenceCatalog};
pub use config::BenchConfig;
pub use detection::{Detection, DetectionSource, DetectorFactory};
pub use error::{BenchError, Result};
pub use evaluation::{EvaluationAdapter, EvaluationOutcome};
pub use executor::{SequenceExecutor, SequenceReport};
pub use manifest::{Manifest, ManifestBuilder};
pub use stitcher::{StitchReport, Stitcher};
pub use tracker::{MultiObjectTracker, TrackedBox, TrackerFactory, TrackerSpec};
