//! Deterministic ordering of an item's annotation files.
//!
//! Sort key for each annotation:
//!
//! 1. index of the first pattern that fully matches the **filename** (not
//!    the path); files matching no pattern get `patterns.len()`
//! 2. the filename itself, lexicographically
//!
//! With the default patterns this gives:
//!
//! ```text
//! image1.meta_json       # pattern 0
//! image1.WD14_txt        # pattern 1
//! image1.caption1_txt    # pattern 2
//! image1.caption2_txt    # pattern 2
//! image1.notes_txt       # unmatched
//! ```

use regex::Regex;
use std::path::{Path, PathBuf};

/// Patterns used when no template supplies an `ordering` list.
pub const DEFAULT_PATTERNS: &[&str] = &[r".*\.meta_json", r".*\.WD14_txt", r".*\.caption\d+_txt"];

/// Compile a pattern for full-string matching.
pub(crate) fn compile_full_match(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Compiled ordering patterns, in priority order.
#[derive(Debug, Clone)]
pub struct OrderingRules {
    patterns: Vec<Regex>,
}

impl Default for OrderingRules {
    fn default() -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .map(|p| compile_full_match(p).expect("default ordering pattern must compile"))
            .collect();
        Self { patterns }
    }
}

impl OrderingRules {
    /// Compile a configured pattern list.
    ///
    /// Invalid patterns are reported and skipped; the remaining patterns keep
    /// their relative order.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| {
                let p = p.as_ref();
                match compile_full_match(p) {
                    Ok(re) => Some(re),
                    Err(err) => {
                        tracing::warn!("skipping invalid ordering pattern {p:?}: {err}");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Index of the first pattern fully matching `filename`, or `len()`.
    pub fn rank(&self, filename: &str) -> usize {
        self.patterns
            .iter()
            .position(|re| re.is_match(filename))
            .unwrap_or(self.patterns.len())
    }

    /// Sort annotation paths in place.
    pub fn sort(&self, annotations: &mut [PathBuf]) {
        annotations.sort_by_cached_key(|path| {
            let name = file_name(path);
            (self.rank(&name), name)
        });
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
