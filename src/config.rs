//! Benchmark configuration loaded once from TOML.
//!
//! Every field has a default matching the DanceTrack validation setup, so an
//! empty file is a valid configuration.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::benchmark::{BenchmarkOptions, InitFailurePolicy};
use crate::catalog::{ResolutionFallbackPolicy, SequenceCatalog};
use crate::detection::{DetectionFilter, DetectorFactory, PublicDetectionsFactory};
use crate::error::{BenchError, IoContext, Result};
use crate::evaluation::{EvaluationAdapter, EvaluationConfig, EvaluationTarget};
use crate::executor::{ExecutorOptions, FrameErrorPolicy, SequenceExecutor};
use crate::manifest::ManifestBuilder;
use crate::record::MalformedRecordPolicy;
use crate::stitcher::{Stitcher, TrackerAliases};
use crate::tracker::{ByteTrackConfig, TrackerFactory, TrackerKind, TrackerSpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Dataset root holding one directory per sequence
    pub dataset: PathBuf,
    pub runs: PathBuf,
    pub results: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("dancetrack_val_local"),
            runs: PathBuf::from("runs"),
            results: PathBuf::from("tracker_results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub name: String,
    pub split: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            name: "DanceTrack".to_string(),
            split: "val".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub confidence: f64,
    pub classes: Vec<u32>,
    pub detector: PublicDetectionsFactory,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let filter = DetectionFilter::default();
        Self {
            confidence: filter.confidence,
            classes: filter.classes,
            detector: PublicDetectionsFactory::default(),
        }
    }
}

impl DetectionConfig {
    pub fn filter(&self) -> DetectionFilter {
        DetectionFilter {
            confidence: self.confidence,
            classes: self.classes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub workers: usize,
    pub init_failures: InitFailurePolicy,
    pub frame_errors: FrameErrorPolicy,
    pub frame_timeout_secs: Option<f64>,
    pub sequence_timeout_secs: Option<f64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            init_failures: InitFailurePolicy::default(),
            frame_errors: FrameErrorPolicy::default(),
            frame_timeout_secs: None,
            sequence_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub resolution_fallback: ResolutionFallbackPolicy,
    pub malformed: MalformedRecordPolicy,
    pub aliases: TrackerAliases,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub paths: PathsConfig,
    pub benchmark: BenchmarkConfig,
    pub detection: DetectionConfig,
    pub execution: ExecutionConfig,
    pub stitch: StitchConfig,
    pub trackers: Vec<TrackerSpec>,
    pub evaluation: EvaluationConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            benchmark: BenchmarkConfig::default(),
            detection: DetectionConfig::default(),
            execution: ExecutionConfig::default(),
            stitch: StitchConfig::default(),
            trackers: vec![TrackerSpec::bytetrack("bytetrack", ByteTrackConfig::default())],
            evaluation: EvaluationConfig::default(),
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).at(path)?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BenchConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(BenchError::InvalidConfig(msg));

        if self.execution.workers == 0 {
            return invalid("execution.workers must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return invalid(format!(
                "detection.confidence must be in [0, 1], got {}",
                self.detection.confidence
            ));
        }
        if self.detection.classes.is_empty() {
            return invalid("detection.classes must not be empty".into());
        }
        for (key, value) in [
            ("frame_timeout_secs", self.execution.frame_timeout_secs),
            ("sequence_timeout_secs", self.execution.sequence_timeout_secs),
        ] {
            match value {
                Some(secs) if !(secs.is_finite() && secs > 0.0) => {
                    return invalid(format!("execution.{key} must be positive, got {secs}"));
                }
                _ => {}
            }
        }

        if self.trackers.is_empty() {
            return invalid("at least one tracker must be configured".into());
        }
        let mut names = HashSet::new();
        for spec in &self.trackers {
            if matches!(spec.name.as_str(), "" | "." | "..") || spec.name.contains(['/', '\\']) {
                return invalid(format!("tracker name {:?} is not a valid directory name", spec.name));
            }
            if !names.insert(spec.name.as_str()) {
                return invalid(format!("tracker {} configured twice", spec.name));
            }
            match &spec.kind {
                TrackerKind::ByteTrack(config) => {
                    if let Err(reason) = config.validate() {
                        return invalid(format!("tracker {}: {reason}", spec.name));
                    }
                }
            }
        }

        if self.stitch.aliases.0.iter().any(|a| a.pattern.is_empty()) {
            return invalid("stitch.aliases patterns must not be empty".into());
        }
        if self.evaluation.metrics.is_empty() || self.evaluation.classes.is_empty() {
            return invalid("evaluation.metrics and evaluation.classes must not be empty".into());
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<SequenceCatalog> {
        SequenceCatalog::open(&self.paths.dataset, self.stitch.resolution_fallback)
    }

    pub fn executor(&self) -> SequenceExecutor {
        SequenceExecutor::new(
            &self.paths.runs,
            ExecutorOptions {
                filter: self.detection.filter(),
                frame_errors: self.execution.frame_errors,
                frame_timeout: self.execution.frame_timeout_secs.map(Duration::from_secs_f64),
                sequence_timeout: self.execution.sequence_timeout_secs.map(Duration::from_secs_f64),
            },
        )
    }

    pub fn benchmark_options(&self) -> BenchmarkOptions {
        BenchmarkOptions {
            workers: self.execution.workers,
            init_failures: self.execution.init_failures,
        }
    }

    pub fn tracker_factories(&self) -> Vec<Arc<dyn TrackerFactory>> {
        self.trackers
            .iter()
            .map(|spec| Arc::new(spec.clone()) as Arc<dyn TrackerFactory>)
            .collect()
    }

    pub fn detector_factory(&self) -> Arc<dyn DetectorFactory> {
        Arc::new(self.detection.detector.clone())
    }

    pub fn stitcher(&self) -> Stitcher {
        Stitcher::new(self.stitch.aliases.clone(), self.stitch.malformed)
    }

    pub fn manifest_builder(&self) -> ManifestBuilder {
        ManifestBuilder::new(&self.benchmark.name, &self.benchmark.split)
    }

    pub fn evaluation_adapter(&self) -> EvaluationAdapter {
        EvaluationAdapter::new(
            self.evaluation.clone(),
            EvaluationTarget {
                benchmark: self.benchmark.name.clone(),
                split: self.benchmark.split.clone(),
                gt_folder: self.paths.dataset.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Resolution;

    #[test]
    fn test_empty_file_yields_reference_setup() {
        let config = BenchConfig::from_toml_str("").unwrap();
        assert_eq!(config, BenchConfig::default());
        assert_eq!(config.paths.dataset, PathBuf::from("dancetrack_val_local"));
        assert_eq!(config.detection.filter(), DetectionFilter::default());
        assert_eq!(config.trackers.len(), 1);
        assert_eq!(config.evaluation.metrics, ["HOTA", "Identity"]);
        assert_eq!(config.manifest_builder().relative_path(), PathBuf::from("seqmaps/dancetrack-val.txt"));
    }

    #[test]
    fn test_full_file() {
        let config = BenchConfig::from_toml_str(
            r#"
            [paths]
            dataset = "data/MOT17/train"

            [benchmark]
            name = "MOT17"
            split = "train"

            [detection]
            confidence = 0.5
            classes = [0, 2]
            detector = { file = "det/frcnn.txt" }

            [execution]
            workers = 4
            init_failures = "skip-sequence"
            frame_errors = "abort"
            sequence_timeout_secs = 600

            [stitch]
            resolution_fallback = "strict"
            malformed = "fail"
            aliases = [{ pattern = "byte", canonical = "ByteTrack" }]

            [[trackers]]
            name = "bytetrack"
            kind = "bytetrack"
            track_thresh = 0.6
            device = "cuda:0"

            [[trackers]]
            name = "bytetrack_low"
            kind = "bytetrack"
            track_thresh = 0.1
            track_buffer = 60

            [evaluation]
            revision = "v1.0"
            timeout_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.benchmark.name, "MOT17");
        assert_eq!(config.detection.classes, [0, 2]);
        assert_eq!(config.detection.detector.file, PathBuf::from("det/frcnn.txt"));
        assert_eq!(config.execution.workers, 4);
        assert_eq!(config.execution.init_failures, InitFailurePolicy::SkipSequence);
        assert_eq!(config.execution.frame_errors, FrameErrorPolicy::Abort);
        assert_eq!(config.execution.sequence_timeout_secs, Some(600.0));
        assert_eq!(config.stitch.resolution_fallback, ResolutionFallbackPolicy::Strict);
        assert_eq!(config.stitch.malformed, MalformedRecordPolicy::Fail);
        assert_eq!(config.stitch.aliases.resolve("bytetrack_low"), Some("ByteTrack"));
        assert_eq!(config.stitch.aliases.resolve("strongsort"), None);

        assert_eq!(config.trackers[0].device.as_deref(), Some("cuda:0"));
        let TrackerKind::ByteTrack(low) = &config.trackers[1].kind;
        assert_eq!(low.track_thresh, 0.1);
        assert_eq!(low.track_buffer, 60);
        assert_eq!(low.match_thresh, 0.8);

        assert_eq!(config.evaluation.revision.as_deref(), Some("v1.0"));
        assert_eq!(config.evaluation.python, "python");
        assert_eq!(config.tracker_factories().len(), 2);
    }

    #[test]
    fn test_explicit_fallback_resolution() {
        let config = BenchConfig::from_toml_str(
            "[stitch]\nresolution_fallback = { fallback = { width = 1280, height = 720 } }\n",
        )
        .unwrap();
        assert_eq!(
            config.stitch.resolution_fallback,
            ResolutionFallbackPolicy::Fallback(Resolution::new(1280, 720))
        );
    }

    #[test]
    fn test_validation_errors() {
        for text in [
            "[execution]\nworkers = 0\n",
            "[detection]\nconfidence = 1.5\n",
            "[execution]\nframe_timeout_secs = 0\n",
            "trackers = []\n",
            "[[trackers]]\nname = \"a\"\nkind = \"bytetrack\"\n[[trackers]]\nname = \"a\"\nkind = \"bytetrack\"\n",
            "[[trackers]]\nname = \"a\"\nkind = \"bytetrack\"\ntrack_thresh = 2.0\n",
            "[[trackers]]\nname = \"a\"\nkind = \"bytetrack\"\nmatch_thresh = 1.0\n",
            "[[trackers]]\nname = \".\"\nkind = \"bytetrack\"\n",
            "[[trackers]]\nname = \"..\"\nkind = \"bytetrack\"\n",
            "[[trackers]]\nname = \"runs/a\"\nkind = \"bytetrack\"\n",
        ] {
            assert!(
                matches!(BenchConfig::from_toml_str(text), Err(BenchError::InvalidConfig(_))),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn test_unknown_tracker_kind_is_a_parse_error() {
        let text = "[[trackers]]\nname = \"x\"\nkind = \"sort\"\n";
        assert!(matches!(BenchConfig::from_toml_str(text), Err(BenchError::ConfigParse(_))));
    }
}
