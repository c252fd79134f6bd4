//! Result stitcher: turns per-frame label files into one canonical
//! MOTChallenge file per (tracker, sequence).
//!
//! Output layout: `<output>/<CanonicalName>/data/<sequence>.txt`.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Resolution, SequenceCatalog};
use crate::error::{BenchError, IoContext, Result};
use crate::executor::LABELS_DIR;
use crate::record::{CanonicalRow, LabelRecord, MalformedRecordPolicy};

pub const TRACKER_SUB_FOLDER: &str = "data";

/// Maps a run directory name to the tracker label the evaluator reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerAlias {
    /// Substring looked for in the run directory name
    pub pattern: String,
    pub canonical: String,
}

/// Ordered alias table; the first matching pattern wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerAliases(pub Vec<TrackerAlias>);

impl Default for TrackerAliases {
    fn default() -> Self {
        Self(
            [
                ("deepoc", "DeepOCSORT"),
                ("strong", "StrongSORT"),
                ("byte", "ByteTrack"),
            ]
            .into_iter()
            .map(|(pattern, canonical)| TrackerAlias {
                pattern: pattern.to_string(),
                canonical: canonical.to_string(),
            })
            .collect(),
        )
    }
}

impl TrackerAliases {
    pub fn resolve(&self, run_dir: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|alias| run_dir.contains(&alias.pattern))
            .map(|alias| alias.canonical.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StitchReport {
    /// Canonical tracker names written, in run-directory order
    pub trackers: Vec<String>,
    pub sequences: usize,
    pub rows: usize,
    pub skipped_files: usize,
    pub skipped_lines: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Stitcher {
    aliases: TrackerAliases,
    malformed: MalformedRecordPolicy,
}

impl Stitcher {
    pub fn new(aliases: TrackerAliases, malformed: MalformedRecordPolicy) -> Self {
        Self { aliases, malformed }
    }

    /// Rebuilds `output_root` from scratch out of `runs_root`.
    ///
    /// Files are written into a staging directory that replaces
    /// `output_root` only once everything succeeded.
    pub fn stitch(
        &self,
        runs_root: &Path,
        catalog: &SequenceCatalog,
        output_root: &Path,
    ) -> Result<StitchReport> {
        restore_previous(output_root)?;
        if !runs_root.is_dir() {
            return Err(BenchError::MissingInput {
                what: "runs directory",
                path: runs_root.to_path_buf(),
            });
        }

        let staging = sibling(output_root, "staging");
        if staging.exists() {
            fs::remove_dir_all(&staging).at(&staging)?;
        }
        fs::create_dir_all(&staging).at(&staging)?;

        let mut report = StitchReport::default();
        let result = self.stitch_into(runs_root, catalog, &staging, &mut report);
        if let Err(err) = result {
            let _ = fs::remove_dir_all(&staging);
            return Err(err);
        }

        publish(&staging, output_root)?;
        info!(
            trackers = report.trackers.len(),
            sequences = report.sequences,
            rows = report.rows,
            output = %output_root.display(),
            "results standardized"
        );
        Ok(report)
    }

    fn stitch_into(
        &self,
        runs_root: &Path,
        catalog: &SequenceCatalog,
        staging: &Path,
        report: &mut StitchReport,
    ) -> Result<()> {
        let mut claimed = HashSet::new();

        for run_dir in run_directories(runs_root)? {
            let dir_name = file_name(&run_dir);
            let Some(canonical) = self.aliases.resolve(&dir_name) else {
                debug!(dir = %dir_name, "no tracker alias matches, skipping");
                continue;
            };
            if !claimed.insert(canonical.to_string()) {
                warn!(dir = %dir_name, canonical, "another run directory already produced this tracker, skipping");
                continue;
            }

            let save_dir = staging.join(canonical).join(TRACKER_SUB_FOLDER);
            fs::create_dir_all(&save_dir).at(&save_dir)?;
            info!(tracker = canonical, source = %dir_name, "formatting tracker results");

            for seq_dir in run_directories(&run_dir)? {
                let labels_dir = seq_dir.join(LABELS_DIR);
                if !labels_dir.is_dir() {
                    continue;
                }
                let sequence = file_name(&seq_dir);
                let resolution = catalog.resolution(&sequence)?;
                let output = save_dir.join(format!("{sequence}.txt"));
                self.stitch_sequence(&labels_dir, resolution, &output, report)?;
                report.sequences += 1;
            }
            report.trackers.push(canonical.to_string());
        }
        Ok(())
    }

    fn stitch_sequence(
        &self,
        labels_dir: &Path,
        resolution: Resolution,
        output: &Path,
        report: &mut StitchReport,
    ) -> Result<()> {
        let mut frames: Vec<(u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(labels_dir).at(labels_dir)? {
            let path = entry.at(labels_dir)?.path();
            if path.extension().is_none_or(|e| e != "txt") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<u64>().ok()) {
                Some(frame_id) => frames.push((frame_id, path)),
                None => {
                    debug!(path = %path.display(), "label file name is not a frame number, skipping");
                    report.skipped_files += 1;
                }
            }
        }
        frames.sort();

        let mut writer = BufWriter::new(File::create(output).at(output)?);
        for (frame_id, path) in frames {
            let reader = BufReader::new(File::open(&path).at(&path)?);
            for (idx, line) in reader.lines().enumerate() {
                let line = line.at(&path)?;
                if line.trim().is_empty() {
                    continue;
                }
                let record = match LabelRecord::parse(&line) {
                    Ok(record) => record,
                    Err(reason) => match self.malformed {
                        MalformedRecordPolicy::Skip => {
                            debug!(path = %path.display(), line = idx + 1, reason = %reason, "skipping malformed label line");
                            report.skipped_lines += 1;
                            continue;
                        }
                        MalformedRecordPolicy::Fail => {
                            return Err(BenchError::MalformedRecord {
                                path,
                                line: idx + 1,
                                reason,
                            });
                        }
                    },
                };
                let row = CanonicalRow {
                    frame_id,
                    track_id: record.track_id,
                    bbox: record.denormalize(resolution),
                };
                writeln!(writer, "{row}").at(output)?;
                report.rows += 1;
            }
        }
        writer.flush().at(output)
    }
}

/// Canonical tracker names already published under `output_root`.
pub fn stitched_trackers(output_root: &Path) -> Result<Vec<String>> {
    if !output_root.is_dir() {
        return Ok(Vec::new());
    }
    Ok(run_directories(output_root)?
        .into_iter()
        .filter(|dir| dir.join(TRACKER_SUB_FOLDER).is_dir())
        .map(|dir| file_name(&dir))
        .collect())
}

/// Sub-directories of `root`, sorted.
fn run_directories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).at(root)? {
        let path = entry.at(root)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<parent>/.<name>.<suffix>`, on the same filesystem so renames are atomic.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{name}.{suffix}"))
}

/// Moves a previous output left behind by an interrupted publish back to
/// `target`. A stale previous next to a live target is discarded.
fn restore_previous(target: &Path) -> Result<()> {
    let previous = sibling(target, "previous");
    if !previous.exists() {
        return Ok(());
    }
    if target.exists() {
        fs::remove_dir_all(&previous).at(&previous)
    } else {
        warn!(output = %target.display(), "restoring output from an interrupted stitch");
        fs::rename(&previous, target).at(target)
    }
}

/// Swaps `staging` into `target`. The previous output stays intact until the
/// new one is in place.
fn publish(staging: &Path, target: &Path) -> Result<()> {
    restore_previous(target)?;
    let previous = sibling(target, "previous");
    if target.exists() {
        fs::rename(target, &previous).at(target)?;
    }
    if let Err(err) = fs::rename(staging, target) {
        // put the last good output back
        if previous.exists() {
            let _ = fs::rename(&previous, target);
        }
        return Err(BenchError::Io {
            path: target.to_path_buf(),
            source: err,
        });
    }
    if previous.exists() {
        fs::remove_dir_all(&previous).at(&previous)?;
    }
    Ok(())
}
