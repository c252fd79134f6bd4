//! Evaluation adapter: prepares a patched TrackEval checkout and runs it
//! against the stitched results.

pub mod process;
pub mod shim;
pub mod summary;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{BenchError, IoContext, Result};
use crate::stitcher::TRACKER_SUB_FOLDER;

pub use self::shim::ShimReport;
pub use self::summary::{Scoreboard, TrackerScores};

const RUNNER_SCRIPT: &str = "scripts/run_mot_challenge.py";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub repository: String,
    /// Commit or tag checked out after cloning; the default branch otherwise
    pub revision: Option<String>,
    pub checkout: PathBuf,
    pub python: String,
    pub metrics: Vec<String>,
    pub classes: Vec<String>,
    pub gt_loc_format: String,
    pub timeout_secs: Option<u64>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            repository: "https://github.com/JonathonLuiten/TrackEval.git".to_string(),
            revision: None,
            checkout: PathBuf::from("TrackEval"),
            python: "python".to_string(),
            metrics: vec!["HOTA".to_string(), "Identity".to_string()],
            classes: vec!["pedestrian".to_string()],
            gt_loc_format: "{gt_folder}/{seq}/gt/gt.txt".to_string(),
            timeout_secs: None,
        }
    }
}

/// Benchmark the evaluator scores against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationTarget {
    pub benchmark: String,
    pub split: String,
    pub gt_folder: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PrepareReport {
    pub checkout: PathBuf,
    pub shim: ShimReport,
}

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    pub scoreboard: Scoreboard,
    pub scores_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EvaluationAdapter {
    config: EvaluationConfig,
    target: EvaluationTarget,
}

impl EvaluationAdapter {
    pub fn new(config: EvaluationConfig, target: EvaluationTarget) -> Self {
        Self { config, target }
    }

    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Replaces the checkout with a fresh clone and applies the shim.
    /// Single attempt: a failed clone is returned as-is.
    pub fn prepare(&self) -> Result<PrepareReport> {
        let checkout = &self.config.checkout;
        if checkout.exists() {
            fs::remove_dir_all(checkout).at(checkout)?;
        }

        info!(stage = "evaluate", repository = %self.config.repository, "cloning evaluator");
        let mut clone = Command::new("git");
        clone.arg("clone").arg("-q").arg(&self.config.repository).arg(checkout);
        git(clone, "clone")?;

        if let Some(revision) = &self.config.revision {
            let mut pin = Command::new("git");
            pin.arg("-C").arg(checkout).args(["checkout", "-q", revision]);
            git(pin, "checkout")?;
        }

        let shim = shim::apply(checkout)?;
        info!(
            stage = "evaluate",
            version = shim::SHIM_VERSION,
            numpy_aliases = shim.numpy_aliases_replaced,
            seqmap_guard = shim.seqmap_guard_inserted,
            "evaluator shim applied"
        );
        Ok(PrepareReport {
            checkout: checkout.clone(),
            shim,
        })
    }

    /// Command line handed to the evaluator.
    pub fn arguments(&self, manifest: &Path, results_root: &Path, trackers: &[String]) -> Vec<String> {
        let mut args = vec![
            self.config.checkout.join(RUNNER_SCRIPT).display().to_string(),
            "--BENCHMARK".to_string(),
            self.target.benchmark.clone(),
            "--SPLIT_TO_EVAL".to_string(),
            self.target.split.clone(),
            "--TRACKERS_TO_EVAL".to_string(),
        ];
        args.extend(trackers.iter().cloned());
        args.push("--METRICS".to_string());
        args.extend(self.config.metrics.iter().cloned());
        let gt_folder = self.target.gt_folder.display().to_string();
        let trackers_folder = results_root.display().to_string();
        let seqmap = manifest.display().to_string();
        let options: [(&str, &str); 8] = [
            ("--USE_PARALLEL", "False"),
            ("--GT_FOLDER", &gt_folder),
            ("--TRACKERS_FOLDER", &trackers_folder),
            ("--GT_LOC_FORMAT", &self.config.gt_loc_format),
            ("--TRACKER_SUB_FOLDER", TRACKER_SUB_FOLDER),
            ("--OUTPUT_SUB_FOLDER", ""),
            ("--SEQMAP_FILE", &seqmap),
            ("--SKIP_SPLIT_FOL", "True"),
        ];
        for (flag, value) in options {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
        args.push("--CLASSES_TO_EVAL".to_string());
        args.extend(self.config.classes.iter().cloned());
        args.extend(["--PRINT_CONFIG".to_string(), "False".to_string()]);
        args
    }

    /// Runs the evaluator once. A non-zero exit or timeout is reported in the
    /// outcome rather than raised.
    pub fn invoke(&self, manifest: &Path, results_root: &Path, trackers: &[String]) -> Result<EvaluationOutcome> {
        if !manifest.is_file() {
            return Err(BenchError::ManifestMissing(manifest.to_path_buf()));
        }
        if trackers.is_empty() {
            return Err(BenchError::Evaluator("no trackers to evaluate".to_string()));
        }
        if shim::installed_version(&self.config.checkout) != Some(shim::SHIM_VERSION) {
            warn!(
                stage = "evaluate",
                checkout = %self.config.checkout.display(),
                "evaluator checkout is not stamped with the current shim version"
            );
        }

        let mut command = Command::new(&self.config.python);
        command.args(self.arguments(manifest, results_root, trackers));
        info!(stage = "evaluate", trackers = ?trackers, "running evaluator");
        let output = process::run(command, self.config.timeout_secs.map(Duration::from_secs))?;

        let exit_code = output.status.and_then(|s| s.code());
        if output.timed_out {
            error!(stage = "evaluate", timeout_secs = ?self.config.timeout_secs, "evaluator timed out and was killed");
        } else if !output.success() {
            error!(stage = "evaluate", exit_code = ?exit_code, stderr = %output.stderr.trim(), "evaluator failed");
        }

        let scoreboard = Scoreboard::collect(results_root, trackers, &self.config.classes);
        let scores_path = if scoreboard.is_empty() {
            None
        } else {
            let path = scoreboard.write(results_root)?;
            info!(stage = "evaluate", path = %path.display(), entries = scoreboard.entries.len(), "scores written");
            Some(path)
        };

        Ok(EvaluationOutcome {
            exit_code,
            success: output.success(),
            timed_out: output.timed_out,
            stdout: output.stdout,
            stderr: output.stderr,
            scoreboard,
            scores_path,
        })
    }
}

fn git(command: Command, step: &str) -> Result<()> {
    let output = process::run(command, None)?;
    if output.success() {
        Ok(())
    } else {
        Err(BenchError::Evaluator(format!(
            "git {step} failed: {}",
            output.stderr.trim()
        )))
    }
}
