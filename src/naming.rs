//! Centralized filename parsing for the `base.tag` sidecar convention.
//!
//! Every file in a dataset is read as `A.B`, split at the **last** dot:
//!
//! - `A` (relative to the dataset root) is the *base key*. Files sharing a
//!   base key form one group.
//! - `B` is the *tag*. A tag without an underscore marks a medium candidate
//!   (`image1.jpg`); a tag with one or more underscores marks an annotation
//!   (`image1.caption_txt`, `image1.WD14_txt`, `image1._txt`).
//!
//! The part of an annotation tag after its last underscore is the *data
//! extension*: `caption2_txt` → `.txt`, `meta_json` → `.json`. It decides
//! whether the sidecar is accepted and how its content is interpreted.
//!
//! ## Reserved Names
//!
//! ```text
//! <id>.system_label_meta_txt          # per-item quick label
//! <dir>/system_label_dir_meta_txt     # per-directory quick label
//! ```

use std::path::{Component, Path, PathBuf};

/// Tag of the per-item quick label sidecar.
pub const QUICK_LABEL_TAG: &str = "system_label_meta_txt";

/// Filename of the per-directory quick label.
pub const DIR_LABEL_NAME: &str = "system_label_dir_meta_txt";

/// How a file participates in its group, decided from its tag alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRole {
    /// Tag has no underscore: may become the item's medium.
    MediumCandidate,
    /// Tag has an underscore; `data_ext` is the lowercase, dotted segment
    /// after the last one.
    AnnotationCandidate { data_ext: String },
}

/// Result of splitting a name at its last dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName<'a> {
    /// Everything before the last dot. For a root-relative path this is the
    /// group's base key.
    pub base: &'a str,
    /// Everything after the last dot.
    pub tag: &'a str,
}

/// Split `name` at its last dot.
///
/// - `"image1.jpg"` → base `"image1"`, tag `"jpg"`
/// - `"dir/a.b.caption_txt"` → base `"dir/a.b"`, tag `"caption_txt"`
/// - `"README"` → `None`
pub fn parse_name(name: &str) -> Option<ParsedName<'_>> {
    name.rsplit_once('.').map(|(base, tag)| ParsedName { base, tag })
}

/// Tag of a filename, or `""` if it has no dot.
pub fn tag_of(filename: &str) -> &str {
    parse_name(filename).map(|p| p.tag).unwrap_or("")
}

/// Classify a tag as medium or annotation candidate.
pub fn role_of(tag: &str) -> FileRole {
    match tag.rsplit_once('_') {
        Some((_, ext)) => FileRole::AnnotationCandidate {
            data_ext: format!(".{}", ext.to_lowercase()),
        },
        None => FileRole::MediumCandidate,
    }
}

/// Data extension of an annotation filename (`"x.meta_json"` → `".json"`).
///
/// Returns `None` for names whose tag carries no underscore.
pub fn data_extension(filename: &str) -> Option<String> {
    match role_of(tag_of(filename)) {
        FileRole::AnnotationCandidate { data_ext } => Some(data_ext),
        FileRole::MediumCandidate => None,
    }
}

/// Root-relative path of `path` with `/` separators.
///
/// Returns `None` when `path` is not under `root`.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Top-level directory of a root-relative path, or `""` when the file sits
/// directly in the root.
///
/// - `"dir1/img.jpg"` → `"dir1"`
/// - `"dir1/sub/img.jpg"` → `"dir1"`
/// - `"img.jpg"` → `""`
pub fn top_level_directory(rel: &str) -> &str {
    match rel.split_once('/') {
        Some((first, _)) => first,
        None => "",
    }
}

/// Whether a relative path stays inside the directory it is joined onto.
///
/// Rejects absolute paths, drive prefixes and any `..` component.
pub fn is_contained(rel: &Path) -> bool {
    rel.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Filename of the per-item quick label for an item id.
pub fn quick_label_name(id: &str) -> String {
    format!("{id}.{QUICK_LABEL_TAG}")
}

/// Directory label file for a top-level directory; `""` means the root.
pub fn dir_label_path(root: &Path, directory: &str) -> PathBuf {
    if directory.is_empty() {
        root.join(DIR_LABEL_NAME)
    } else {
        root.join(directory).join(DIR_LABEL_NAME)
    }
}

/// Whether a filename (or path) is a per-item quick label sidecar.
pub fn is_quick_label(filename: &str) -> bool {
    tag_of(filename) == QUICK_LABEL_TAG
}
