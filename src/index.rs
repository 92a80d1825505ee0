//! The in-memory item table and its directory side tables.
//!
//! Built once from a scan and never re-read from disk. The only mutation is
//! [`Index::append_annotation`], used when a save creates a new sidecar.
//!
//! ## Directory Navigation
//!
//! Items keep the scan's base-key order. The [`DirectoryTable`] records, for
//! each top-level directory, the index of its first item, plus the distinct
//! directory names in first-occurrence order:
//!
//! ```text
//! idx  id              directory
//! 0    a/img1          a            first["a"] = 0
//! 1    a/img2          a
//! 2    b/img1          b            first["b"] = 2
//! 3    root_img        ""           first[""]  = 3
//!
//! order = ["a", "b", ""]   next("b") = 3, next("") = 0, prev("a") = 3
//! ```

use crate::media::MediaKind;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One annotatable unit: a medium plus its sidecar files.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    /// Root-relative base key, unique across the index.
    pub id: String,
    /// Absolute path of the canonical medium.
    pub media: PathBuf,
    pub kind: MediaKind,
    /// Absolute annotation paths in display order.
    pub annotations: Vec<PathBuf>,
    /// Top-level directory of the medium, `""` for root-level media.
    pub directory: String,
}

/// First-item lookup and circular navigation over top-level directories.
#[derive(Debug, Clone, Default)]
pub struct DirectoryTable {
    first_index: HashMap<String, usize>,
    order: Vec<String>,
}

impl DirectoryTable {
    pub fn build(items: &[Item]) -> Self {
        let mut table = Self::default();
        for (idx, item) in items.iter().enumerate() {
            if !table.first_index.contains_key(&item.directory) {
                table.first_index.insert(item.directory.clone(), idx);
                table.order.push(item.directory.clone());
            }
        }
        table
    }

    pub fn first_index_of(&self, directory: &str) -> Option<usize> {
        self.first_index.get(directory).copied()
    }

    /// Distinct directory names in first-occurrence order.
    pub fn directories(&self) -> &[String] {
        &self.order
    }

    /// First index of the directory before `directory`, wrapping around.
    pub fn prev_index(&self, directory: &str) -> Option<usize> {
        self.step(directory, -1)
    }

    /// First index of the directory after `directory`, wrapping around.
    pub fn next_index(&self, directory: &str) -> Option<usize> {
        self.step(directory, 1)
    }

    fn step(&self, directory: &str, delta: isize) -> Option<usize> {
        let pos = self.order.iter().position(|d| d == directory)?;
        let len = self.order.len() as isize;
        let target = (pos as isize + delta).rem_euclid(len) as usize;
        self.first_index_of(&self.order[target])
    }
}

/// Ordered item table plus directory side tables.
#[derive(Debug, Clone, Default)]
pub struct Index {
    items: Vec<Item>,
    directories: DirectoryTable,
}

impl Index {
    pub fn new(items: Vec<Item>) -> Self {
        let directories = DirectoryTable::build(&items);
        Self { items, directories }
    }

    pub fn get(&self, idx: usize) -> Option<&Item> {
        self.items.get(idx)
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn directories(&self) -> &DirectoryTable {
        &self.directories
    }

    pub fn first_index_of(&self, directory: &str) -> Option<usize> {
        self.directories.first_index_of(directory)
    }

    /// Add `path` to an item's annotation list unless already present.
    ///
    /// Returns `None` for an out-of-range index, otherwise whether the path
    /// was newly added.
    pub fn append_annotation(&mut self, idx: usize, path: &Path) -> Option<bool> {
        let item = self.items.get_mut(idx)?;
        if item.annotations.iter().any(|p| p == path) {
            return Some(false);
        }
        item.annotations.push(path.to_path_buf());
        Some(true)
    }
}
