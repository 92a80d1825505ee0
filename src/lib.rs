//! # Dataset Annotator
//!
//! Indexes a directory tree of media files paired with sidecar annotation
//! files, and exposes the operations a browsing/editing client needs:
//! random access to items, directory-wise navigation, annotation saves and
//! cache-backed file serving. Your filesystem is the data source: every
//! medium and the text files sharing its base name become one item.
//!
//! # Architecture: Build Once, Then Serve
//!
//! ```text
//! 1. Scan     dataset/  →  groups by base key  →  items (medium + sidecars)
//! 2. Index    items     →  Index + directory table        (built once)
//! 3. Serve    item(idx) / save(idx, ..) / read_file(rel)  (incremental)
//! ```
//!
//! The index is never rebuilt while serving. A save writes files and appends
//! new sidecar paths to the item; files added on disk by other means appear
//! on the next start.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`media`] | Extension → media kind classification and selection priority |
//! | [`naming`] | `base.tag` filename parsing shared by every stage |
//! | [`scan`] | Walks the dataset root and groups files into items |
//! | [`order`] | Regex-ranked annotation ordering |
//! | [`template`] | Template loading (JSON / YAML / TOML) with per-entry tolerance |
//! | [`rules`] | Annotation visibility, readonly flags and derived function values |
//! | [`expr`] | Closed expression language for function filters and dataset filtering |
//! | [`index`] | Item table and circular directory navigation |
//! | [`cache`] | Bounded preload cache for upcoming images |
//! | [`service`] | [`service::Annotator`]: the shared owner of index, cache and rules |
//! | [`filter`] | Copy or move items whose quick label passes an expression |
//! | [`config`] | `annotator.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Filename Is the Schema
//!
//! `image1.jpg`, `image1.caption1_txt` and `image1.meta_json` belong
//! together because they share everything before the last dot. A tag with an
//! underscore marks an annotation, and the part after its last underscore is
//! the data format. Annotations stay out of the way of tools that key on real
//! extensions, and no manifest file can drift out of sync with the tree. See
//! [`naming`].
//!
//! ## Deterministic Item Order
//!
//! Items are ordered by base key and annotations by the template's ordering
//! patterns with the filename as tie-break. When a group holds several media
//! of the same kind the filename decides too, so the same tree always yields
//! the same indices on every platform.
//!
//! ## No Code in Templates
//!
//! Derived values are computed by a small expression language
//! ([`expr`]) over the parsed sidecar, bound to `x`. It can read fields,
//! compare and call a fixed set of functions; it cannot reach the host.
//!
//! ## Readonly Is a Capability Check
//!
//! Templates mark annotations readonly for display. [`service::Annotator::save`]
//! writes what it is given; callers that enforce the flag ask
//! [`service::Annotator::edit_permission`] first.

pub mod cache;
pub mod config;
pub mod expr;
pub mod filter;
pub mod index;
pub mod media;
pub mod naming;
pub mod order;
pub mod output;
pub mod rules;
pub mod scan;
pub mod service;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;
