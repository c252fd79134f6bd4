use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors produced by the benchmark pipeline.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("{what} not found at {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    #[error("unreadable sequence metadata {}: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error("invalid sequence {name}: {reason}")]
    InvalidSequence { name: String, reason: String },

    #[error("tracker {tracker} failed to initialize: {reason}")]
    TrackerInit { tracker: String, reason: String },

    #[error("detector error: {0}")]
    Detector(String),

    #[error("tracker error: {0}")]
    Tracker(String),

    #[error("{tracker}/{sequence} exceeded its time budget at frame {frame}")]
    Timeout {
        tracker: String,
        sequence: String,
        frame: u64,
    },

    #[error("malformed record {}:{line}: {reason}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("manifest not found at {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("evaluator error: {0}")]
    Evaluator(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Result type for trackbench operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Attaches the offending path to an `io::Error`.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| BenchError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
