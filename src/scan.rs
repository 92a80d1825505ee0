//! Filesystem scanning and item grouping.
//!
//! Walks a dataset root and turns a flat or nested file tree into the
//! ordered list of [`Item`]s that backs the index.
//!
//! ## Dataset Layout
//!
//! ```text
//! dataset/
//! ├── image1.jpg                     # medium
//! ├── image1.meta_json               # annotations share the base key
//! ├── image1.WD14_txt
//! ├── image1.caption1_txt
//! ├── clip.mp4                       # medium (no image sibling)
//! ├── orphan.caption_txt             # no medium → dropped
//! ├── notes.psd                      # unrecognized medium → dropped
//! └── dir1/
//!     ├── system_label_dir_meta_txt  # directory quick label (no base key match)
//!     ├── img.jpg                    # directory = "dir1"
//!     ├── img.mp4                    # loses to img.jpg
//!     └── img.system_label_meta_txt  # per-item quick label
//! ```
//!
//! ## Grouping Rules
//!
//! 1. Every regular file whose name contains a dot is grouped by its base
//!    key: the root-relative path with the last dot-segment removed.
//! 2. A file whose tag has no underscore is a medium candidate when its
//!    real extension is a recognized media extension.
//! 3. A file whose tag has an underscore is an annotation when its data
//!    extension is text-like (`.txt .csv .json .yaml .yml`).
//! 4. Groups without a medium candidate are dropped with their sidecars.
//! 5. The medium is the candidate with the best [`MediaKind`], ties broken
//!    by filename so the choice does not depend on walk order.
//! 6. Groups are emitted in base-key order, which becomes item order.

use crate::index::Item;
use crate::media::{self, MediaKind};
use crate::naming::{self, FileRole};
use crate::order::OrderingRules;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Dataset root is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Which underscore-tagged sidecars a scan keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnnotationPolicy {
    /// Only sidecars with a text-like data extension (index building).
    #[default]
    TextOnly,
    /// Every underscore-tagged sidecar (dataset filtering, which must carry
    /// all of a group's files along).
    Any,
}

/// A group split into its medium candidates and accepted annotations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitGroup {
    pub candidates: Vec<PathBuf>,
    pub annotations: Vec<PathBuf>,
}

/// Scan `root` into ordered items using the index policy.
pub fn scan(root: &Path, ordering: &OrderingRules) -> Result<Vec<Item>, ScanError> {
    scan_with_policy(root, ordering, AnnotationPolicy::TextOnly)
}

pub fn scan_with_policy(
    root: &Path,
    ordering: &OrderingRules,
    policy: AnnotationPolicy,
) -> Result<Vec<Item>, ScanError> {
    let groups = collect_groups(root)?;
    let group_count = groups.len();
    let mut items = Vec::new();

    for (base, files) in groups {
        let mut split = split_group(&files, policy);
        let Some((media, kind)) = select_medium(&split.candidates) else {
            continue;
        };
        ordering.sort(&mut split.annotations);

        let rel = naming::relative_key(root, &media).unwrap_or_default();
        let directory = naming::top_level_directory(&rel).to_string();

        items.push(Item {
            id: base,
            media,
            kind,
            annotations: split.annotations,
            directory,
        });
    }

    tracing::debug!(
        "grouped {} base keys into {} items under {}",
        group_count,
        items.len(),
        root.display()
    );
    Ok(items)
}

/// Walk `root` and group every dotted file by base key.
///
/// Unreadable entries are logged and skipped; only a missing or non-directory
/// root is an error.
pub fn collect_groups(root: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || !entry.file_name().to_string_lossy().contains('.') {
            continue;
        }
        let Some(rel) = naming::relative_key(root, path) else {
            continue;
        };
        let Some(parsed) = naming::parse_name(&rel) else {
            continue;
        };
        groups
            .entry(parsed.base.to_string())
            .or_default()
            .push(path.to_path_buf());
    }
    Ok(groups)
}

/// Sort a group's files into medium candidates and annotations.
///
/// Files fitting neither role are dropped silently.
pub fn split_group(files: &[PathBuf], policy: AnnotationPolicy) -> SplitGroup {
    let mut split = SplitGroup::default();
    for file in files {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match naming::role_of(naming::tag_of(&name)) {
            FileRole::AnnotationCandidate { data_ext } => {
                if policy == AnnotationPolicy::Any || media::is_text_extension(&data_ext) {
                    split.annotations.push(file.clone());
                }
            }
            FileRole::MediumCandidate => {
                if media::classify_path(file).is_some() {
                    split.candidates.push(file.clone());
                }
            }
        }
    }
    split
}

/// Pick the canonical medium among candidates: best kind, then filename.
pub fn select_medium(candidates: &[PathBuf]) -> Option<(PathBuf, MediaKind)> {
    candidates
        .iter()
        .filter_map(|p| media::classify_path(p).map(|kind| (p, kind)))
        .min_by(|(a, ka), (b, kb)| ka.cmp(kb).then_with(|| a.file_name().cmp(&b.file_name())))
        .map(|(p, kind)| (p.clone(), kind))
}
