//! Parses the evaluator's `<class>_summary.txt` files into a score table.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{IoContext, Result};

pub const SCORES_FILE: &str = "scores.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerScores {
    pub tracker: String,
    pub class: String,
    /// Metric name and value, in evaluator column order
    pub metrics: Vec<(String, f64)>,
}

impl TrackerScores {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scoreboard {
    pub entries: Vec<TrackerScores>,
}

impl Scoreboard {
    /// Collects `<results>/<tracker>/<class>_summary.txt` for every pair.
    /// Missing or unparsable summaries are logged and left out.
    pub fn collect(results_root: &Path, trackers: &[String], classes: &[String]) -> Self {
        let mut entries = Vec::new();
        for tracker in trackers {
            for class in classes {
                let path = results_root.join(tracker).join(format!("{class}_summary.txt"));
                let Ok(text) = fs::read_to_string(&path) else {
                    debug!(tracker = %tracker, class = %class, path = %path.display(), "no evaluator summary");
                    continue;
                };
                match parse_summary(&text) {
                    Some(metrics) => entries.push(TrackerScores {
                        tracker: tracker.clone(),
                        class: class.clone(),
                        metrics,
                    }),
                    None => warn!(path = %path.display(), "unreadable evaluator summary"),
                }
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Metric columns in first-seen order across all entries.
    fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for entry in &self.entries {
            for (name, _) in &entry.metrics {
                if !columns.contains(&name.as_str()) {
                    columns.push(name);
                }
            }
        }
        columns
    }

    pub fn to_csv(&self) -> String {
        let columns = self.columns();
        let mut out = String::from("tracker,class");
        for column in &columns {
            out.push(',');
            out.push_str(column);
        }
        out.push('\n');
        for entry in &self.entries {
            out.push_str(&entry.tracker);
            out.push(',');
            out.push_str(&entry.class);
            for column in &columns {
                out.push(',');
                if let Some(value) = entry.get(column) {
                    let _ = write!(out, "{value}");
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn write(&self, results_root: &Path) -> Result<std::path::PathBuf> {
        let path = results_root.join(SCORES_FILE);
        fs::write(&path, self.to_csv()).at(&path)?;
        Ok(path)
    }
}

/// Header line of metric names followed by one line of values.
pub fn parse_summary(text: &str) -> Option<Vec<(String, f64)>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines.next()?.split_whitespace().collect();
    let values = lines
        .next()?
        .split_whitespace()
        .map(|v| v.parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if header.is_empty() || header.len() != values.len() {
        return None;
    }
    Some(header.into_iter().map(str::to_string).zip(values).collect())
}
