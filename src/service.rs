//! The annotator service: one owner for the index, cache and rules.
//!
//! An [`Annotator`] is built once per dataset root and then shared (behind
//! an `Arc`) by whatever serves requests. It is `Send + Sync`:
//!
//! - the [`Index`] sits behind an `RwLock`; reads take the read lock only long
//!   enough to clone one [`Item`](crate::index::Item), and a save takes the write lock for each
//!   `append_annotation`;
//! - the [`PreloadCache`] sits behind a `Mutex`; file bytes are read from
//!   disk with no lock held and inserted afterwards.
//!
//! File contents are never read under a lock.
//!
//! ## Route Contract
//!
//! | Operation | Fails with |
//! |-----------|------------|
//! | [`Annotator::item`] | `NotFound` for an index outside `0..total` |
//! | [`Annotator::save`] | `NotFound`, `OutsideRoot`, `Write` |
//! | [`Annotator::read_file`] | `NotFound`, `OutsideRoot` |
//!
//! Annotation content and directory label reads never fail; an unreadable
//! file reads as `""`. `save` does not consult readonly flags; callers that
//! honour them check [`Annotator::edit_permission`] first.

use crate::cache::{self, CacheStats, PreloadCache};
use crate::config::{AnnotatorConfig, QuickLabelMode};
use crate::index::Index;
use crate::media::{self, MediaKind};
use crate::naming;
use crate::order::OrderingRules;
use crate::rules::{self, EditPermission, FunctionValue, RuleSet, Visibility};
use crate::scan::{self, ScanError};
use crate::template::{self, TemplateConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Path escapes dataset root: {0}")]
    OutsideRoot(String),
    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }
}

/// One visible annotation in an item payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotationView {
    /// Root-relative path, `/`-separated. Also the key for saving.
    pub filename: String,
    pub content: String,
    pub readonly: bool,
    pub functions: Vec<FunctionValue>,
}

/// Everything a client needs to display and edit one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemView {
    pub idx: usize,
    pub id: String,
    pub media_url: String,
    pub media_kind: MediaKind,
    /// Root-relative path of the medium.
    pub media_name: String,
    pub annotations: Vec<AnnotationView>,
    pub directory: String,
    pub dir_label: String,
    pub prev_dir_idx: usize,
    pub next_dir_idx: usize,
    /// Annotations withheld by the template.
    pub hidden: usize,
    pub total: usize,
}

/// One annotation write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationWrite {
    /// Root-relative path.
    pub filename: String,
    pub content: String,
}

/// Body of a save: full writes plus an optional quick label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub annotations: Vec<AnnotationWrite>,
    #[serde(default)]
    pub quick_label: Option<String>,
}

/// What a save touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Every written file, quick label included.
    pub written: Vec<PathBuf>,
    /// Paths newly appended to the item's annotation list.
    pub appended: Vec<PathBuf>,
}

/// Where the bytes of a served file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Cached(Arc<[u8]>),
    Disk(PathBuf),
}

/// A file resolved for serving.
#[derive(Debug, Clone)]
pub struct FileBody {
    pub content_type: &'static str,
    pub source: FileSource,
}

impl FileBody {
    pub fn is_cached(&self) -> bool {
        matches!(self.source, FileSource::Cached(_))
    }

    /// Materialize the bytes, reading from disk on a cache miss.
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            FileSource::Cached(bytes) => Ok(bytes.to_vec()),
            FileSource::Disk(path) => fs::read(path),
        }
    }
}

/// Coordinating owner of a dataset's index, preload cache and rules.
#[derive(Debug)]
pub struct Annotator {
    root: PathBuf,
    config: AnnotatorConfig,
    ordering: OrderingRules,
    rules: Option<RuleSet>,
    index: RwLock<Index>,
    cache: Mutex<PreloadCache>,
}

impl Annotator {
    /// Scan `root` and build the service.
    ///
    /// The template named by `config` is optional; one that cannot be loaded
    /// is reported and the dataset is served without it.
    pub fn open(root: &Path, config: AnnotatorConfig) -> Result<Self, ServiceError> {
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()).into());
        }
        let root = root.canonicalize()?;

        let template = config
            .template_path(&root)
            .and_then(|path| match template::load_template(&path) {
                Ok(t) => Some(t),
                Err(err) => {
                    tracing::warn!("ignoring template {}: {err}", path.display());
                    None
                }
            });
        let (ordering, rules) = compile_template(template.as_ref());

        let items = scan::scan(&root, &ordering)?;
        let index = Index::new(items);
        tracing::info!(
            "indexed {} items in {} directories under {}",
            index.total(),
            index.directories().directories().len(),
            root.display()
        );
        if let Some(rules) = &rules {
            tracing::info!(
                "template active: {} annotation rules, {} ordering patterns",
                rules.len(),
                ordering.len()
            );
        }

        Ok(Self {
            root,
            cache: Mutex::new(PreloadCache::new(config.preload.capacity)),
            config,
            ordering,
            rules,
            index: RwLock::new(index),
        })
    }

    /// Canonical dataset root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn ordering(&self) -> &OrderingRules {
        &self.ordering
    }

    pub fn rules(&self) -> Option<&RuleSet> {
        self.rules.as_ref()
    }

    pub fn total(&self) -> usize {
        self.read_index().total()
    }

    /// Run `f` against the index under the read lock.
    pub fn with_index<R>(&self, f: impl FnOnce(&Index) -> R) -> R {
        f(&self.read_index())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats().clone()
    }

    /// Assemble the payload for item `idx` and preload the items after it.
    pub fn item(&self, idx: usize) -> Result<ItemView, ServiceError> {
        let (item, prev_dir_idx, next_dir_idx, total) = {
            let index = self.read_index();
            let item = index
                .get(idx)
                .cloned()
                .ok_or_else(|| item_not_found(idx, index.total()))?;
            let dirs = index.directories();
            let prev = dirs.prev_index(&item.directory).unwrap_or(idx);
            let next = dirs.next_index(&item.directory).unwrap_or(idx);
            (item, prev, next, index.total())
        };

        let mut annotations = Vec::with_capacity(item.annotations.len());
        let mut hidden = 0;
        for path in &item.annotations {
            let filename = self.relative(path);
            let content = read_lossy(path);
            match rules::assess(self.rules.as_ref(), &filename, &content) {
                Visibility::Hidden => hidden += 1,
                Visibility::Visible {
                    readonly,
                    functions,
                } => annotations.push(AnnotationView {
                    filename,
                    content,
                    readonly,
                    functions,
                }),
            }
        }

        let media_name = self.relative(&item.media);
        let view = ItemView {
            idx,
            media_url: format!("/file/{media_name}"),
            media_kind: item.kind,
            media_name,
            annotations,
            dir_label: read_lossy(&self.dir_label_path(&item.directory)),
            id: item.id,
            directory: item.directory,
            prev_dir_idx,
            next_dir_idx,
            hidden,
            total,
        };

        self.preload(idx);
        Ok(view)
    }

    /// Persist annotation writes and the quick label for item `idx`.
    ///
    /// All paths are checked before anything is written. Each written
    /// annotation path is appended to the item unless already listed. A
    /// write error stops the save and is returned; files written before it
    /// stay written.
    pub fn save(&self, idx: usize, request: &SaveRequest) -> Result<SaveOutcome, ServiceError> {
        let (id, directory) = {
            let index = self.read_index();
            let item = index
                .get(idx)
                .ok_or_else(|| item_not_found(idx, index.total()))?;
            (item.id.clone(), item.directory.clone())
        };

        let targets = request
            .annotations
            .iter()
            .map(|w| Ok((self.resolve(&w.filename)?, w.content.as_str())))
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let mut outcome = SaveOutcome::default();
        for (path, content) in targets {
            write_file(&path, content)?;
            self.record(idx, &path, &mut outcome);
        }

        let quick = request
            .quick_label
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        if let Some(quick) = quick {
            let contents = format!("{quick}\n");
            match self.config.quick_label {
                QuickLabelMode::Item => {
                    let path = self.root.join(naming::quick_label_name(&id));
                    write_file(&path, &contents)?;
                    self.record(idx, &path, &mut outcome);
                }
                QuickLabelMode::Directory => {
                    let path = self.dir_label_path(&directory);
                    write_file(&path, &contents)?;
                    outcome.written.push(path);
                }
            }
        }

        tracing::debug!(
            "saved item {idx} ({id}): {} files written, {} appended",
            outcome.written.len(),
            outcome.appended.len()
        );
        Ok(outcome)
    }

    /// Resolve a root-relative path for serving, cache first.
    pub fn read_file(&self, rel: &str) -> Result<FileBody, ServiceError> {
        let path = self.resolve(rel)?;
        if !path.is_file() {
            return Err(ServiceError::NotFound(format!("file {rel}")));
        }
        let content_type = media::guess_content_type(&path);
        let source = match self.lock_cache().get(&path) {
            Some(bytes) => FileSource::Cached(bytes),
            None => FileSource::Disk(path),
        };
        Ok(FileBody {
            content_type,
            source,
        })
    }

    /// Whether a client may submit edits for `filename`.
    pub fn edit_permission(&self, filename: &str) -> EditPermission {
        rules::edit_permission(self.rules.as_ref(), filename)
    }

    /// Load the images of the items following `idx` into the cache.
    ///
    /// Returns the number of files inserted. Unreadable files are skipped.
    pub fn preload(&self, idx: usize) -> usize {
        let candidates = {
            let index = self.read_index();
            cache::preload_candidates(&index, idx, self.config.preload.lookahead)
        };
        let missing: Vec<PathBuf> = {
            let cache = self.lock_cache();
            candidates.into_iter().filter(|p| !cache.contains(p)).collect()
        };

        let mut inserted = 0;
        for path in missing {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::debug!("preload skipped {}: {err}", path.display());
                    continue;
                }
            };
            let mut cache = self.lock_cache();
            if !cache.contains(&path) {
                cache.insert(path, Arc::from(bytes));
                inserted += 1;
            }
        }
        inserted
    }

    /// Path of the directory label for a top-level directory (`""` = root).
    pub fn dir_label_path(&self, directory: &str) -> PathBuf {
        naming::dir_label_path(&self.root, directory)
    }

    /// Join a client-supplied relative path onto the root.
    fn resolve(&self, rel: &str) -> Result<PathBuf, ServiceError> {
        let path = Path::new(rel);
        if rel.is_empty() || !naming::is_contained(path) {
            return Err(ServiceError::OutsideRoot(rel.to_string()));
        }
        Ok(self.root.join(path))
    }

    fn relative(&self, path: &Path) -> String {
        naming::relative_key(&self.root, path).unwrap_or_else(|| path.display().to_string())
    }

    fn record(&self, idx: usize, path: &Path, outcome: &mut SaveOutcome) {
        if self.write_index().append_annotation(idx, path) == Some(true) {
            outcome.appended.push(path.to_path_buf());
        }
        outcome.written.push(path.to_path_buf());
    }

    fn read_index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, PreloadCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordering rules and rule set for an optional template.
///
/// Without a template the default ordering applies and no rules are active.
/// A template without an `ordering` key also keeps the default ordering.
pub fn compile_template(template: Option<&TemplateConfig>) -> (OrderingRules, Option<RuleSet>) {
    let ordering = template
        .and_then(|t| t.ordering.as_ref())
        .map(|patterns| OrderingRules::from_patterns(patterns.as_slice()))
        .unwrap_or_default();
    let rules = template.map(RuleSet::from_template);
    (ordering, rules)
}

fn item_not_found(idx: usize, total: usize) -> ServiceError {
    ServiceError::NotFound(format!("item {idx} (index has {total} items)"))
}

/// Read a text file, substituting `""` on any failure.
///
/// Bytes that are not valid UTF-8 are dropped, not replaced, so a re-save
/// never writes U+FFFD back to disk.
pub(crate) fn read_lossy(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => bytes.utf8_chunks().map(|chunk| chunk.valid()).collect(),
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("reading {} failed: {err}", path.display());
            }
            String::new()
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ServiceError> {
    fs::write(path, contents).map_err(|source| ServiceError::Write {
        path: path.to_path_buf(),
        source,
    })
}
