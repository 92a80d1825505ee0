//! Shared test utilities for the dataset-annotator test suite.
//!
//! Provides fixture writers, lookup helpers and bulk extractors that work
//! with scan-phase data ([`Item`]).
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_files(tmp.path(), &[("img.jpg", "img"), ("img.caption_txt", "hello")]);
//! let items = scan(tmp.path(), &OrderingRules::default()).unwrap();
//!
//! let item = find_item(&items, "img");
//! assert_eq!(annotation_names(item), vec!["img.caption_txt"]);
//! ```

use std::path::Path;

use crate::index::Item;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `(relative path, content)` pairs under `root`, creating parent
/// directories as needed.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
    }
}

// =========================================================================
// Lookups: panic with a clear message on miss
// =========================================================================

/// Find an item by id. Panics if not found.
pub fn find_item<'a>(items: &'a [Item], id: &str) -> &'a Item {
    items.iter().find(|i| i.id == id).unwrap_or_else(|| {
        let ids = item_ids(items);
        panic!("item '{id}' not found. Available: {ids:?}")
    })
}

// =========================================================================
// Bulk extractors
// =========================================================================

/// Final path component as an owned string.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// All item ids in index order.
pub fn item_ids(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

/// Annotation filenames of an item in display order.
pub fn annotation_names(item: &Item) -> Vec<String> {
    item.annotations.iter().map(|p| file_name(p)).collect()
}
