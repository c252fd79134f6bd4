//! Seqmap generation: the list of sequences the evaluator should score.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::catalog::SequenceCatalog;
use crate::error::{IoContext, Result};

pub const SEQMAPS_DIR: &str = "seqmaps";
const HEADER: &str = "name";

#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    benchmark: String,
    split: String,
}

impl ManifestBuilder {
    pub fn new(benchmark: impl Into<String>, split: impl Into<String>) -> Self {
        Self {
            benchmark: benchmark.into(),
            split: split.into(),
        }
    }

    /// `seqmaps/<benchmark>-<split>.txt`, lower-cased like `dancetrack-val.txt`.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(SEQMAPS_DIR).join(format!("{}-{}.txt", self.benchmark, self.split).to_lowercase())
    }

    pub fn build(&self, catalog: &SequenceCatalog) -> Result<Manifest> {
        Ok(Manifest {
            relative_path: self.relative_path(),
            sequences: catalog.list_sequences()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    relative_path: PathBuf,
    pub sequences: Vec<String>,
}

impl Manifest {
    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for name in &self.sequences {
            let _ = writeln!(out, "{name}");
        }
        out
    }

    /// Writes the manifest under `results_root`, replacing any previous one.
    pub fn write(&self, results_root: &Path) -> Result<PathBuf> {
        let path = results_root.join(&self.relative_path);
        let dir = path.parent().unwrap_or(results_root);
        fs::create_dir_all(dir).at(dir)?;

        let tmp = path.with_extension("txt.tmp");
        fs::write(&tmp, self.render()).at(&tmp)?;
        fs::rename(&tmp, &path).at(&path)?;
        info!(path = %path.display(), sequences = self.sequences.len(), "manifest written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResolutionFallbackPolicy;

    #[test]
    fn test_manifest_lists_every_sequence_once_in_order() {
        let data = tempfile::tempdir().unwrap();
        for name in ["dancetrack0010", "dancetrack0004", "dancetrack0007"] {
            fs::create_dir(data.path().join(name)).unwrap();
        }
        fs::write(data.path().join("notes.txt"), "not a sequence").unwrap();
        let catalog = SequenceCatalog::open(data.path(), ResolutionFallbackPolicy::Strict).unwrap();

        let manifest = ManifestBuilder::new("DanceTrack", "val").build(&catalog).unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = manifest.write(out.path()).unwrap();

        assert_eq!(path, out.path().join("seqmaps").join("dancetrack-val.txt"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "name\ndancetrack0004\ndancetrack0007\ndancetrack0010\n"
        );
    }

    #[test]
    fn test_rewrite_replaces_previous_manifest() {
        let out = tempfile::tempdir().unwrap();
        let first = Manifest {
            relative_path: PathBuf::from("seqmaps/mot17-train.txt"),
            sequences: vec!["a".into(), "b".into()],
        };
        let second = Manifest {
            sequences: vec!["c".into()],
            ..first.clone()
        };
        first.write(out.path()).unwrap();
        let path = second.write(out.path()).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "name\nc\n");
    }
}
