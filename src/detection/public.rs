//! Public detections shipped with MOTChallenge sequences (`det/det.txt`).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Frame, Sequence};
use crate::detection::{Detection, DetectionBuilder, DetectionSource, DetectorFactory};
use crate::error::{BenchError, IoContext, Result};

/// Opens `<sequence>/<file>` for each sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicDetectionsFactory {
    /// Path of the detection file relative to the sequence directory
    pub file: PathBuf,
    /// Class assigned to every row; MOT detection files carry no class column
    pub class_id: u32,
}

impl Default for PublicDetectionsFactory {
    fn default() -> Self {
        Self {
            file: PathBuf::from("det/det.txt"),
            class_id: 0,
        }
    }
}

impl DetectorFactory for PublicDetectionsFactory {
    fn open(&self, sequence: &Sequence) -> Result<Box<dyn DetectionSource + Send>> {
        let seq_dir = sequence
            .frame_dir
            .parent()
            .unwrap_or(&sequence.frame_dir)
            .to_path_buf();
        let path = seq_dir.join(&self.file);
        Ok(Box::new(PublicDetections::from_file(&path, self.class_id)?))
    }
}

/// Reads rows `frame,id,bb_left,bb_top,bb_width,bb_height,conf,x,y,z`.
/// Rows with fewer than seven fields or unparsable numbers are skipped.
#[derive(Debug, Default)]
pub struct PublicDetections {
    by_frame: HashMap<u64, Vec<Detection>>,
}

impl PublicDetections {
    pub fn from_file(path: &Path, class_id: u32) -> Result<Self> {
        if !path.is_file() {
            return Err(BenchError::MissingInput {
                what: "detection file",
                path: path.to_path_buf(),
            });
        }
        let reader = BufReader::new(File::open(path).at(path)?);

        let mut by_frame: HashMap<u64, Vec<Detection>> = HashMap::new();
        let mut skipped = 0usize;
        for line in reader.lines() {
            let line = line.at(path)?;
            match parse_row(&line, class_id) {
                Some((frame, detection)) => by_frame.entry(frame).or_default().push(detection),
                None if line.trim().is_empty() => {}
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(path = %path.display(), skipped, "skipped malformed detection rows");
        }
        Ok(Self { by_frame })
    }

    pub fn frames(&self) -> usize {
        self.by_frame.len()
    }
}

impl DetectionSource for PublicDetections {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.by_frame.get(&frame.index).cloned().unwrap_or_default())
    }
}

fn parse_row(line: &str, class_id: u32) -> Option<(u64, Detection)> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 7 {
        return None;
    }
    let frame = parts[0].parse::<f64>().ok()? as u64;
    let mut numbers = [0.0f64; 5];
    for (slot, field) in numbers.iter_mut().zip(&parts[2..7]) {
        *slot = field.parse().ok()?;
    }
    let [left, top, width, height, conf] = numbers;
    let detection = DetectionBuilder::new()
        .tlwh(left, top, width, height)
        .score(conf)
        .class_id(class_id)
        .build();
    Some((frame, detection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_groups_rows_by_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det.txt");
        fs::write(
            &path,
            "1,-1,10,20,30,40,0.9,-1,-1,-1\n\
             1,-1,50,60,10,10,0.4,-1,-1,-1\n\
             2,-1,12,22,30,40,0.8,-1,-1,-1\n\
             garbage\n\
             3,-1,x,1,1,1,0.5\n",
        )
        .unwrap();

        let mut source = PublicDetections::from_file(&path, 0).unwrap();
        assert_eq!(source.frames(), 2);

        let frame = Frame {
            index: 1,
            path: PathBuf::from("1.jpg"),
            width: 100,
            height: 100,
        };
        let dets = source.detect(&frame).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].bbox.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);
        assert_eq!(dets[0].score, 0.9);

        let empty = source.detect(&Frame { index: 7, ..frame }).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = PublicDetections::from_file(&dir.path().join("det.txt"), 0);
        assert!(matches!(result, Err(BenchError::MissingInput { .. })));
    }
}
