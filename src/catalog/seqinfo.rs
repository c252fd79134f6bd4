//! MOTChallenge `seqinfo.ini` reader.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, Result};

/// Parsed `seqinfo.ini`:
/// ```ini
/// [Sequence]
/// name=dancetrack0004
/// imDir=img1
/// frameRate=20
/// seqLength=1200
/// imWidth=1920
/// imHeight=1080
/// imExt=.jpg
/// ```
#[derive(Debug)]
pub struct SeqInfo {
    path: PathBuf,
    /// (section, key, value); section names are kept as written
    entries: Vec<(String, String, String)>,
}

impl SeqInfo {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BenchError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self::parse(path, &content))
    }

    pub fn parse(path: &Path, content: &str) -> Self {
        let mut section = String::new();
        let mut entries = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.push((
                    section.clone(),
                    key.trim().to_string(),
                    value.trim().to_string(),
                ));
            }
        }

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Value of `key` in the `[Sequence]` section. Keys match case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(section, k, _)| section == "Sequence" && k.eq_ignore_ascii_case(key))
            .map(|(_, _, v)| v.as_str())
    }

    pub fn get_u32(&self, key: &str) -> Result<u32> {
        let value = self.get(key).ok_or_else(|| BenchError::Metadata {
            path: self.path.clone(),
            reason: format!("missing key '{key}' in [Sequence]"),
        })?;
        value.parse().map_err(|e| BenchError::Metadata {
            path: self.path.clone(),
            reason: format!("value for '{key}' is not an integer: {e}"),
        })
    }
}
