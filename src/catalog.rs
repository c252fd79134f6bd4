//! Sequence catalog: discovers MOTChallenge-style sequences under a dataset root.
//!
//! Layout: `root/<sequence>/img1/*.jpg` plus `root/<sequence>/seqinfo.ini`.

mod seqinfo;

pub use seqinfo::SeqInfo;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BenchError, IoContext, Result};

const SEQINFO_FILE: &str = "seqinfo.ini";
const DEFAULT_IMAGE_DIR: &str = "img1";
const DEFAULT_IMAGE_EXT: &str = ".jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FALLBACK: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What `resolution()` does when `seqinfo.ini` is missing or unusable.
///
/// The fallback keeps a benchmark running, but rows of the affected sequence
/// are denormalized with a guessed frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionFallbackPolicy {
    Fallback(Resolution),
    Strict,
}

impl Default for ResolutionFallbackPolicy {
    fn default() -> Self {
        Self::Fallback(Resolution::FALLBACK)
    }
}

/// A frame file on disk, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    pub index: u64,
    pub path: PathBuf,
}

impl FrameRef {
    /// Reads the image header to learn the actual frame size.
    pub fn probe(&self) -> Result<Frame> {
        let (width, height) = image::image_dimensions(&self.path)?;
        Ok(Frame {
            index: self.index,
            path: self.path.clone(),
            width,
            height,
        })
    }

    /// File stem, kept verbatim so label files mirror the frame names.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.index.to_string())
    }
}

/// A frame handed to detectors and trackers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u64,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn load_rgb(&self) -> Result<image::RgbImage> {
        Ok(image::open(&self.path)?.to_rgb8())
    }
}

#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: String,
    pub frame_dir: PathBuf,
    pub resolution: Resolution,
    /// Strictly increasing by index
    pub frames: Vec<FrameRef>,
}

impl Sequence {
    pub fn frames(&self) -> &[FrameRef] {
        &self.frames
    }
}

#[derive(Debug, Clone)]
pub struct SequenceCatalog {
    root: PathBuf,
    fallback: ResolutionFallbackPolicy,
}

impl SequenceCatalog {
    pub fn open(root: impl Into<PathBuf>, fallback: ResolutionFallbackPolicy) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(BenchError::MissingInput {
                what: "dataset directory",
                path: root,
            });
        }
        Ok(Self { root, fallback })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sequence directory names in lexicographic order.
    pub fn list_sequences(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).at(&self.root)? {
            let entry = entry.at(&self.root)?;
            if entry.file_type().at(&entry.path())?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn resolution(&self, name: &str) -> Result<Resolution> {
        match self.read_resolution(name) {
            Ok(resolution) => Ok(resolution),
            Err(err) => match self.fallback {
                ResolutionFallbackPolicy::Fallback(resolution) => {
                    warn!(sequence = name, error = %err, fallback = %resolution, "using fallback resolution");
                    Ok(resolution)
                }
                ResolutionFallbackPolicy::Strict => Err(err),
            },
        }
    }

    fn read_resolution(&self, name: &str) -> Result<Resolution> {
        let info = SeqInfo::load(&self.root.join(name).join(SEQINFO_FILE))?;
        Ok(Resolution::new(
            info.get_u32("imWidth")?,
            info.get_u32("imHeight")?,
        ))
    }

    pub fn sequence(&self, name: &str) -> Result<Sequence> {
        let seq_dir = self.root.join(name);
        let info = SeqInfo::load(&seq_dir.join(SEQINFO_FILE)).ok();
        let image_dir = info
            .as_ref()
            .and_then(|i| i.get("imDir"))
            .unwrap_or(DEFAULT_IMAGE_DIR);
        let image_ext = info
            .as_ref()
            .and_then(|i| i.get("imExt"))
            .unwrap_or(DEFAULT_IMAGE_EXT)
            .trim_start_matches('.')
            .to_ascii_lowercase();

        let frame_dir = seq_dir.join(image_dir);
        if !frame_dir.is_dir() {
            return Err(BenchError::MissingInput {
                what: "frame directory",
                path: frame_dir,
            });
        }

        let frames = list_frames(name, &frame_dir, &image_ext)?;
        Ok(Sequence {
            name: name.to_string(),
            frame_dir,
            resolution: self.resolution(name)?,
            frames,
        })
    }

    pub fn sequences(&self) -> Result<Vec<Sequence>> {
        self.list_sequences()?
            .iter()
            .map(|name| self.sequence(name))
            .collect()
    }
}

fn list_frames(sequence: &str, frame_dir: &Path, extension: &str) -> Result<Vec<FrameRef>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(frame_dir).at(frame_dir)? {
        let path = entry.at(frame_dir)?.path();
        let matches_ext = path
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(extension));
        if !matches_ext {
            continue;
        }
        let index = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u64>().ok());
        match index {
            Some(index) => frames.push(FrameRef { index, path }),
            None => warn!(sequence, path = %path.display(), "skipping frame without a numeric name"),
        }
    }

    frames.sort_by_key(|f| f.index);
    if let Some(pair) = frames.windows(2).find(|w| w[0].index == w[1].index) {
        return Err(BenchError::InvalidSequence {
            name: sequence.to_string(),
            reason: format!(
                "frames {} and {} share index {}",
                pair[0].path.display(),
                pair[1].path.display(),
                pair[0].index
            ),
        });
    }
    Ok(frames)
}
