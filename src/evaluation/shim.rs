//! Versioned compatibility shim for the TrackEval checkout.
//!
//! Two source edits keep the upstream MOTChallenge loader usable:
//! numpy 2 removed the `np.int`/`np.float`/`np.bool` aliases, and the CLI
//! hands `SEQMAP_FILE` over as a one-element list.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BenchError, IoContext, Result};

/// Bumped whenever the patch set changes.
pub const SHIM_VERSION: u32 = 1;
pub const STAMP_FILE: &str = ".trackbench-shim";
pub const TARGET_FILE: &str = "trackeval/datasets/mot_challenge_2d_box.py";

const NUMPY_ALIASES: [&str; 3] = ["int", "float", "bool"];
const SEQMAP_ANCHOR: &str = "if not os.path.isfile(seqmap_file):";
const SEQMAP_GUARD: &str = "if isinstance(seqmap_file, list): seqmap_file = seqmap_file[0]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimReport {
    pub target: PathBuf,
    pub numpy_aliases_replaced: usize,
    pub seqmap_guard_inserted: bool,
}

/// Patches the checkout in place and stamps it with `SHIM_VERSION`.
pub fn apply(checkout: &Path) -> Result<ShimReport> {
    let target = checkout.join(TARGET_FILE);
    if !target.is_file() {
        return Err(BenchError::Evaluator(format!(
            "shim v{SHIM_VERSION} target {} is missing; the evaluator layout changed",
            target.display()
        )));
    }
    let source = fs::read_to_string(&target).at(&target)?;

    let (source, numpy_aliases_replaced) = replace_numpy_aliases(&source);
    let (source, seqmap_guard_inserted) = insert_seqmap_guard(&source).ok_or_else(|| {
        BenchError::Evaluator(format!(
            "shim v{SHIM_VERSION}: seqmap check not found in {}",
            target.display()
        ))
    })?;

    fs::write(&target, source).at(&target)?;
    let stamp = checkout.join(STAMP_FILE);
    fs::write(&stamp, format!("{SHIM_VERSION}\n")).at(&stamp)?;

    Ok(ShimReport {
        target,
        numpy_aliases_replaced,
        seqmap_guard_inserted,
    })
}

/// Shim version recorded in a checkout, if any.
pub fn installed_version(checkout: &Path) -> Option<u32> {
    fs::read_to_string(checkout.join(STAMP_FILE))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Rewrites `np.int`, `np.float` and `np.bool` to the builtins. Longer names
/// such as `np.int64` or `np.bool_` are left alone.
pub fn replace_numpy_aliases(source: &str) -> (String, usize) {
    let mut out = String::with_capacity(source.len());
    let mut count = 0;
    let mut rest = source;

    while let Some(pos) = rest.find("np.") {
        out.push_str(&rest[..pos]);
        let preceded_by_ident = out.chars().next_back().is_some_and(is_ident_char);
        let after = &rest[pos + 3..];

        let alias = NUMPY_ALIASES.iter().find(|alias| {
            after.starts_with(*alias)
                && !after[alias.len()..].chars().next().is_some_and(is_ident_char)
        });
        match alias {
            Some(alias) if !preceded_by_ident => {
                out.push_str(alias);
                rest = &after[alias.len()..];
                count += 1;
            }
            _ => {
                out.push_str("np.");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, count)
}

/// Inserts the list-unwrapping guard above the seqmap existence check, at the
/// check's indentation. `None` when neither the guard nor the check exist.
pub fn insert_seqmap_guard(source: &str) -> Option<(String, bool)> {
    if source.contains(SEQMAP_GUARD) {
        return Some((source.to_string(), false));
    }
    let mut out = String::with_capacity(source.len() + SEQMAP_GUARD.len() + 16);
    let mut inserted = false;
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with(SEQMAP_ANCHOR) {
            let indent = &line[..line.len() - trimmed.len()];
            out.push_str(indent);
            out.push_str(SEQMAP_GUARD);
            out.push('\n');
            inserted = true;
        }
        out.push_str(line);
    }
    inserted.then_some((out, true))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
