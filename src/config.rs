//! Operator configuration module.
//!
//! Loads and validates the optional `annotator.toml` in the dataset root.
//! Every key has a default, so an absent file and an empty file are the
//! same configuration.
//!
//! ## Config File Location
//!
//! ```text
//! dataset/
//! ├── annotator.toml        # optional
//! ├── template.yaml         # referenced by `template`
//! └── ...
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! # template = "template.yaml"   # annotation template, relative to the dataset root
//! quick_label = "item"           # "item" or "directory"
//!
//! [preload]
//! capacity = 5                   # cached images
//! lookahead = 5                  # items after the current one to preload
//! ```
//!
//! Unknown keys are rejected to catch typos early. The `--template` CLI
//! flag overrides the `template` key.

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_LOOKAHEAD};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the operator config file inside the dataset root.
pub const CONFIG_FILENAME: &str = "annotator.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Where a quick label is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickLabelMode {
    /// `<id>.system_label_meta_txt` next to each medium.
    #[default]
    Item,
    /// `system_label_dir_meta_txt` in the item's top-level directory.
    Directory,
}

/// Annotator configuration loaded from `annotator.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnnotatorConfig {
    /// Template file path, relative to the dataset root (or absolute).
    pub template: Option<String>,
    /// Quick label storage mode.
    pub quick_label: QuickLabelMode,
    /// Preload cache sizing.
    pub preload: PreloadConfig,
}

impl AnnotatorConfig {
    /// Reject a zero-sized cache and a blank template path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preload.capacity == 0 {
            return Err(ConfigError::Validation(
                "preload.capacity must be at least 1".into(),
            ));
        }
        if matches!(&self.template, Some(t) if t.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "template must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the template path against the dataset root.
    pub fn template_path(&self, root: &Path) -> Option<PathBuf> {
        self.template.as_ref().map(|t| root.join(t))
    }
}

/// Preload cache settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreloadConfig {
    /// Maximum number of cached image files.
    pub capacity: usize,
    /// How many items after the current one are considered.
    pub lookahead: usize,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

/// Parse and validate the text of an `annotator.toml`.
///
/// Missing keys take their defaults through `#[serde(default)]`.
pub fn parse_config(text: &str) -> Result<AnnotatorConfig, ConfigError> {
    let config: AnnotatorConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Load `annotator.toml` from the dataset root, or the defaults if absent.
pub fn load_config(root: &Path) -> Result<AnnotatorConfig, ConfigError> {
    let path = root.join(CONFIG_FILENAME);
    if !path.is_file() {
        return Ok(AnnotatorConfig::default());
    }
    parse_config(&fs::read_to_string(&path)?)
}

/// Documented default `annotator.toml`, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Dataset Annotator Configuration
# ===============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file in the dataset root as `annotator.toml`.
# Unknown keys will cause an error.

# Annotation template (JSON, YAML or TOML), relative to the dataset root.
# Controls annotation ordering, visibility and derived values.
# Run `dataset-annotator gen-template` for a documented example.
# template = "template.yaml"

# Where quick labels are stored:
#   "item"       -> <id>.system_label_meta_txt next to each medium
#   "directory"  -> system_label_dir_meta_txt in the item's top-level directory
quick_label = "item"

# ---------------------------------------------------------------------------
# Preloading
# ---------------------------------------------------------------------------
[preload]
# Number of image files kept in memory. The oldest insert is evicted first.
capacity = 5

# Number of items after the current one whose images are preloaded.
lookahead = 5
"##
}
