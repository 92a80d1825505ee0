//! Preload cache for upcoming image media.
//!
//! Browsing a dataset is sequential: after item `i` the client almost
//! always asks for `i + 1`. Reading the next few images into memory while
//! the user is still looking at the current one turns those reads into
//! memory copies.
//!
//! # Design
//!
//! - **Keyed by path.** Entries are keyed by the absolute medium path, the
//!   same path the index stores, so a file-serving lookup is a map probe.
//! - **Insertion-order eviction.** When full, the entry inserted earliest
//!   is dropped. Reads do not refresh an entry's position: the look-ahead
//!   window moves forward, so the oldest insert is the one furthest behind.
//! - **Images only.** Video and audio are streamed; text is small. See
//!   [`preload_candidates`].
//! - **No authority.** The disk is the source of truth. A cached file that
//!   changes on disk is served stale until it is evicted, which with the
//!   default capacity is at most a handful of navigations later.

use crate::index::Index;
use crate::media::MediaKind;
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default number of cached files.
pub const DEFAULT_CAPACITY: usize = 5;

/// Default number of items after the current one considered for preloading.
pub const DEFAULT_LOOKAHEAD: usize = 5;

/// Bounded path → bytes cache with insertion-order eviction.
#[derive(Debug)]
pub struct PreloadCache {
    capacity: usize,
    entries: IndexMap<PathBuf, Arc<[u8]>>,
    stats: CacheStats,
}

impl Default for PreloadCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PreloadCache {
    /// Create an empty cache. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Look up cached bytes, recording a hit or miss.
    pub fn get(&mut self, path: &Path) -> Option<Arc<[u8]>> {
        match self.entries.get(path) {
            Some(bytes) => {
                self.stats.hit();
                Some(Arc::clone(bytes))
            }
            None => {
                self.stats.miss();
                None
            }
        }
    }

    /// Insert bytes for `path` unless already cached.
    ///
    /// Returns the evicted path when the insert pushed the oldest entry out.
    pub fn insert(&mut self, path: PathBuf, bytes: Arc<[u8]>) -> Option<PathBuf> {
        if self.entries.contains_key(&path) {
            return None;
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0).map(|(old, _)| old)
        } else {
            None
        };
        if let Some(old) = &evicted {
            self.stats.evict();
            tracing::debug!("preload cache evicted {}", old.display());
        }
        tracing::debug!("preload cache stored {} ({} bytes)", path.display(), bytes.len());
        self.entries.insert(path, bytes);
        self.stats.insert();
        evicted
    }

    /// Cached paths, oldest first.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

/// Image media of the `lookahead` items following `idx`, in index order.
///
/// The window stops at the end of the index; it does not wrap.
pub fn preload_candidates(index: &Index, idx: usize, lookahead: usize) -> Vec<PathBuf> {
    let start = idx.saturating_add(1);
    let end = idx.saturating_add(lookahead).saturating_add(1).min(index.total());
    (start..end)
        .filter_map(|i| index.get(i))
        .filter(|item| item.kind == MediaKind::Image)
        .map(|item| item.media.clone())
        .collect()
}

/// Counters for cache activity over the process lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn insert(&mut self) {
        self.inserts += 1;
    }

    pub fn evict(&mut self) {
        self.evictions += 1;
    }

    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lookups() > 0 {
            write!(
                f,
                "{} hits, {} misses, {} preloaded, {} evicted",
                self.hits, self.misses, self.inserts, self.evictions
            )
        } else {
            write!(f, "{} preloaded, {} evicted", self.inserts, self.evictions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Item;

    fn bytes(s: &str) -> Arc<[u8]> {
        Arc::from(s.as_bytes())
    }

    fn item(id: &str, kind: MediaKind) -> Item {
        Item {
            id: id.to_string(),
            media: PathBuf::from(format!("/data/{id}")),
            kind,
            annotations: Vec::new(),
            directory: String::new(),
        }
    }

    // =========================================================================
    // PreloadCache basics
    // =========================================================================

    #[test]
    fn empty_cache() {
        let cache = PreloadCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn zero_capacity_is_raised() {
        assert_eq!(PreloadCache::new(0).capacity(), 1);
    }

    #[test]
    fn get_returns_inserted_bytes() {
        let mut cache = PreloadCache::default();
        cache.insert(PathBuf::from("/a.jpg"), bytes("aaa"));
        assert_eq!(&*cache.get(Path::new("/a.jpg")).unwrap(), b"aaa");
        assert!(cache.get(Path::new("/b.jpg")).is_none());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn sixth_insert_evicts_first() {
        let mut cache = PreloadCache::default();
        for i in 0..5 {
            assert_eq!(cache.insert(PathBuf::from(format!("/{i}.jpg")), bytes("x")), None);
        }
        let evicted = cache.insert(PathBuf::from("/5.jpg"), bytes("x"));

        assert_eq!(evicted, Some(PathBuf::from("/0.jpg")));
        assert_eq!(cache.len(), 5);
        assert!(!cache.contains(Path::new("/0.jpg")));
        assert!(cache.contains(Path::new("/5.jpg")));
    }

    #[test]
    fn reads_do_not_refresh_eviction_order() {
        let mut cache = PreloadCache::new(2);
        cache.insert(PathBuf::from("/a"), bytes("a"));
        cache.insert(PathBuf::from("/b"), bytes("b"));
        cache.get(Path::new("/a"));
        cache.insert(PathBuf::from("/c"), bytes("c"));

        let paths: Vec<&Path> = cache.paths().collect();
        assert_eq!(paths, vec![Path::new("/b"), Path::new("/c")]);
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut cache = PreloadCache::new(2);
        cache.insert(PathBuf::from("/a"), bytes("old"));
        assert_eq!(cache.insert(PathBuf::from("/a"), bytes("new")), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(&*cache.get(Path::new("/a")).unwrap(), b"old");
        assert_eq!(cache.stats().inserts, 1);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = PreloadCache::default();
        for i in 0..50 {
            cache.insert(PathBuf::from(format!("/{i}")), bytes("x"));
            assert!(cache.len() <= DEFAULT_CAPACITY);
        }
        assert_eq!(cache.stats().evictions, 45);
    }

    // =========================================================================
    // Candidate selection
    // =========================================================================

    #[test]
    fn candidates_are_following_images_only() {
        let index = Index::new(vec![
            item("0.jpg", MediaKind::Image),
            item("1.jpg", MediaKind::Image),
            item("2.mp4", MediaKind::Video),
            item("3.png", MediaKind::Image),
        ]);
        let candidates = preload_candidates(&index, 0, DEFAULT_LOOKAHEAD);
        assert_eq!(
            candidates,
            vec![PathBuf::from("/data/1.jpg"), PathBuf::from("/data/3.png")]
        );
    }

    #[test]
    fn candidates_window_is_bounded() {
        let items: Vec<Item> = (0..10)
            .map(|i| item(&format!("{i}.jpg"), MediaKind::Image))
            .collect();
        let index = Index::new(items);

        assert_eq!(preload_candidates(&index, 2, 5).len(), 5);
        assert_eq!(preload_candidates(&index, 7, 5).len(), 2);
        assert!(preload_candidates(&index, 9, 5).is_empty());
    }

    // =========================================================================
    // Stats display
    // =========================================================================

    #[test]
    fn stats_display() {
        let mut stats = CacheStats::default();
        stats.insert();
        assert_eq!(stats.to_string(), "1 preloaded, 0 evicted");
        stats.hit();
        stats.miss();
        assert_eq!(stats.to_string(), "1 hits, 1 misses, 1 preloaded, 0 evicted");
    }
}
