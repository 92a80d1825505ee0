//! Dataset filtering by quick label.
//!
//! Copies or moves every item whose label passes an expression into a new
//! dataset root, keeping relative paths:
//!
//! ```text
//! dataset-annotator --root data filter out --expr "x.strip() == 'good'"
//!
//! data/d1/img.jpg                   →  out/d1/img.jpg
//! data/d1/img.caption_txt           →  out/d1/img.caption_txt
//! data/d1/img.system_label_meta_txt →  out/d1/img.system_label_meta_txt
//! ```
//!
//! Grouping follows [`crate::scan`] except that every underscore-tagged
//! sidecar travels with its medium, not only text-like ones. Sibling medium
//! candidates that lost the medium selection stay behind.
//!
//! In directory mode the label is `system_label_dir_meta_txt` in the item's
//! top-level directory, the same file the annotator writes in directory
//! quick-label mode. A label file in a deeper directory is not consulted:
//! `a/b/img.jpg` is judged by `a/system_label_dir_meta_txt`, not
//! `a/b/system_label_dir_meta_txt`.
//!
//! The expression is parsed once up front, so a typo fails the run before
//! anything is copied. An expression that errors on a particular label (say
//! `int(x)` on an empty label) excludes that item.

use crate::expr::{self, Expr, ExprError};
use crate::index::Item;
use crate::naming;
use crate::order::OrderingRules;
use crate::scan::{self, AnnotationPolicy, ScanError};
use crate::service::read_lossy;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Invalid filter expression: {0}")]
    Expr(#[from] ExprError),
    #[error("Output directory is the input directory: {0}")]
    SameDirectory(PathBuf),
    #[error("File outside the input directory: {0}")]
    OutsideInput(PathBuf),
}

/// Which label an item is judged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// The item's own `<id>.system_label_meta_txt`.
    #[default]
    Item,
    /// The `system_label_dir_meta_txt` of the item's top-level directory.
    Dir,
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item" => Ok(FilterMode::Item),
            "dir" => Ok(FilterMode::Dir),
            other => Err(format!("unknown filter mode {other:?} (expected item or dir)")),
        }
    }
}

/// How passing files reach the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transfer {
    #[default]
    Copy,
    Move,
}

impl FromStr for Transfer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copy" => Ok(Transfer::Copy),
            "move" => Ok(Transfer::Move),
            other => Err(format!("unknown transfer mode {other:?} (expected copy or move)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Accepted medium extensions, dotted and lowercase. Empty accepts all.
    pub extensions: Vec<String>,
    pub mode: FilterMode,
    pub expr: String,
    pub transfer: Transfer,
}

/// Counts from one filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    /// Items whose label passed.
    pub matched: usize,
    /// Items whose label failed or could not be evaluated.
    pub rejected: usize,
    /// Items skipped for their medium extension.
    pub excluded: usize,
    /// Files copied or moved.
    pub files: usize,
}

/// Parse an extension list such as `"jpg,.PNG"`. `"all"` or an empty
/// string accepts every extension.
pub fn parse_extensions(list: &str) -> Vec<String> {
    let list = list.trim();
    if list.is_empty() || list.eq_ignore_ascii_case("all") {
        return Vec::new();
    }
    list.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| {
            let e = e.to_lowercase();
            if e.starts_with('.') { e } else { format!(".{e}") }
        })
        .collect()
}

/// Whether `label` passes `expr`. Evaluation errors count as a rejection.
pub fn label_passes(expr: &Expr, label: &str) -> bool {
    match expr.evaluate(&Value::String(label.to_string())) {
        Ok(value) => expr::truthy(&value),
        Err(err) => {
            tracing::debug!("filter expression failed on {label:?}: {err}");
            false
        }
    }
}

/// Run a filter over `options.input`.
pub fn filter_dataset(options: &FilterOptions) -> Result<FilterReport, FilterError> {
    let expr = Expr::parse(&options.expr)?;
    if !options.input.is_dir() {
        return Err(ScanError::NotADirectory(options.input.clone()).into());
    }
    let input = options.input.canonicalize()?;
    fs::create_dir_all(&options.output)?;
    let output = options.output.canonicalize()?;
    if input == output {
        return Err(FilterError::SameDirectory(output));
    }

    let items = scan::scan_with_policy(&input, &OrderingRules::default(), AnnotationPolicy::Any)?;
    let mut dir_labels: HashMap<String, String> = HashMap::new();
    let mut report = FilterReport::default();

    for item in &items {
        if !extension_allowed(&options.extensions, &item.media) {
            report.excluded += 1;
            continue;
        }

        let label = match options.mode {
            FilterMode::Item => item_label(item),
            FilterMode::Dir => dir_labels
                .entry(item.directory.clone())
                .or_insert_with(|| read_lossy(&naming::dir_label_path(&input, &item.directory)))
                .clone(),
        };
        if !label_passes(&expr, &label) {
            report.rejected += 1;
            continue;
        }

        report.matched += 1;
        for file in std::iter::once(&item.media).chain(&item.annotations) {
            transfer_file(&input, &output, file, options.transfer)?;
            report.files += 1;
        }
    }

    tracing::info!(
        "filter matched {} of {} items, {} files to {}",
        report.matched,
        items.len(),
        report.files,
        output.display()
    );
    Ok(report)
}

fn extension_allowed(extensions: &[String], media: &Path) -> bool {
    if extensions.is_empty() {
        return true;
    }
    crate::media::dotted_extension(media).is_some_and(|ext| extensions.contains(&ext))
}

fn item_label(item: &Item) -> String {
    item.annotations
        .iter()
        .find(|p| p.file_name().is_some_and(|n| naming::is_quick_label(&n.to_string_lossy())))
        .map(|p| read_lossy(p))
        .unwrap_or_default()
}

/// Copy or move `file` to the same relative location under `output`.
fn transfer_file(input: &Path, output: &Path, file: &Path, transfer: Transfer) -> Result<(), FilterError> {
    let rel = file
        .strip_prefix(input)
        .map_err(|_| FilterError::OutsideInput(file.to_path_buf()))?;
    let dest = output.join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match transfer {
        Transfer::Copy => {
            fs::copy(file, &dest)?;
        }
        Transfer::Move => {
            // rename fails across filesystems
            if fs::rename(file, &dest).is_err() {
                fs::copy(file, &dest)?;
                fs::remove_file(file)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use tempfile::TempDir;

    fn options(input: &Path, output: &Path, expr: &str) -> FilterOptions {
        FilterOptions {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            extensions: Vec::new(),
            mode: FilterMode::Item,
            expr: expr.to_string(),
            transfer: Transfer::Copy,
        }
    }

    fn labelled_dataset(root: &Path) {
        write_files(
            root,
            &[
                ("d/good.jpg", "g"),
                ("d/good.caption_txt", "c"),
                ("d/good.mask_png", "m"),
                ("d/good.system_label_meta_txt", "good\n"),
                ("d/bad.jpg", "b"),
                ("d/bad.system_label_meta_txt", "bad\n"),
                ("clip.mp4", "v"),
                ("clip.system_label_meta_txt", "good\n"),
            ],
        );
    }

    #[test]
    fn copies_matching_groups_with_all_sidecars() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        labelled_dataset(src.path());

        let report = filter_dataset(&options(src.path(), dst.path(), "x.strip() == 'good'")).unwrap();

        assert_eq!(report.matched, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.files, 6);
        assert!(dst.path().join("d/good.mask_png").exists());
        assert!(dst.path().join("d/good.caption_txt").exists());
        assert!(dst.path().join("clip.mp4").exists());
        assert!(!dst.path().join("d/bad.jpg").exists());
        // copy leaves the source intact
        assert!(src.path().join("d/good.jpg").exists());
    }

    #[test]
    fn move_removes_source_files() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        labelled_dataset(src.path());

        let mut opts = options(src.path(), dst.path(), "'bad' in x");
        opts.transfer = Transfer::Move;
        filter_dataset(&opts).unwrap();

        assert!(dst.path().join("d/bad.jpg").exists());
        assert!(!src.path().join("d/bad.jpg").exists());
        assert!(!src.path().join("d/bad.system_label_meta_txt").exists());
        assert!(src.path().join("d/good.jpg").exists());
    }

    #[test]
    fn extension_filter_excludes_other_media() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        labelled_dataset(src.path());

        let mut opts = options(src.path(), dst.path(), "True or true");
        opts.extensions = parse_extensions("MP4");
        let report = filter_dataset(&opts).unwrap();

        assert_eq!(report.excluded, 2);
        assert_eq!(report.matched, 1);
        assert!(dst.path().join("clip.mp4").exists());
    }

    #[test]
    fn directory_mode_uses_directory_label() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_files(
            src.path(),
            &[
                ("keep/a.jpg", ""),
                ("keep/b.jpg", ""),
                ("keep/system_label_dir_meta_txt", "yes\n"),
                ("drop/c.jpg", ""),
            ],
        );

        let mut opts = options(src.path(), dst.path(), "x.strip() == 'yes'");
        opts.mode = FilterMode::Dir;
        let report = filter_dataset(&opts).unwrap();

        assert_eq!(report.matched, 2);
        assert!(dst.path().join("keep/a.jpg").exists());
        assert!(!dst.path().join("drop/c.jpg").exists());
    }

    #[test]
    fn nested_items_use_top_level_directory_label() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_files(
            src.path(),
            &[
                ("a/b/img.jpg", ""),
                ("a/b/system_label_dir_meta_txt", "good\n"),
                ("c/d/img.jpg", ""),
                ("c/system_label_dir_meta_txt", "good\n"),
            ],
        );

        let mut opts = options(src.path(), dst.path(), "x.strip() == 'good'");
        opts.mode = FilterMode::Dir;
        let report = filter_dataset(&opts).unwrap();

        assert_eq!(report.matched, 1);
        assert_eq!(report.rejected, 1);
        assert!(dst.path().join("c/d/img.jpg").exists());
        assert!(!dst.path().join("a/b/img.jpg").exists());
    }

    #[test]
    fn missing_label_reads_as_empty() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_files(src.path(), &[("img.jpg", "")]);

        let report = filter_dataset(&options(src.path(), dst.path(), "x == ''")).unwrap();
        assert_eq!(report.matched, 1);
    }

    #[test]
    fn evaluation_error_rejects_item() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        labelled_dataset(src.path());

        let report = filter_dataset(&options(src.path(), dst.path(), "int(x) > 1")).unwrap();
        assert_eq!(report.matched, 0);
        assert_eq!(report.rejected, 3);
    }

    #[test]
    fn syntax_error_fails_before_copying() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        labelled_dataset(src.path());

        let result = filter_dataset(&options(src.path(), dst.path(), "x ==="));
        assert!(matches!(result, Err(FilterError::Expr(_))));
        assert!(fs::read_dir(dst.path()).unwrap().next().is_none());
    }

    #[test]
    fn same_directory_is_rejected() {
        let src = TempDir::new().unwrap();
        labelled_dataset(src.path());
        let result = filter_dataset(&options(src.path(), src.path(), "true"));
        assert!(matches!(result, Err(FilterError::SameDirectory(_))));
    }

    #[test]
    fn parses_extension_lists() {
        assert!(parse_extensions("all").is_empty());
        assert!(parse_extensions("").is_empty());
        assert_eq!(parse_extensions("jpg, .PNG"), vec![".jpg", ".png"]);
    }

    #[test]
    fn parses_modes() {
        assert_eq!("dir".parse::<FilterMode>(), Ok(FilterMode::Dir));
        assert_eq!("move".parse::<Transfer>(), Ok(Transfer::Move));
        assert!("both".parse::<Transfer>().is_err());
    }
}
