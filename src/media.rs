//! Extension-based media classification.
//!
//! Every decision the indexer makes about a file's role starts here: whether
//! a file may become an item's medium, which candidate wins when a group has
//! several, whether a sidecar's data extension is text-like, and whether a
//! medium is eligible for the preload cache.
//!
//! ## Recognized Extensions
//!
//! ```text
//! image   .jpg .jpeg .png .webp .bmp .gif
//! video   .mp4 .mov .avi .mkv
//! audio   .mp3 .wav .ogg
//! text    .txt .csv .json .yaml .yml
//! ```
//!
//! The variant order of [`MediaKind`] is the medium priority: when a group
//! holds both `x.jpg` and `x.mp4`, the image wins.

use serde::Serialize;
use std::fmt;
use std::path::Path;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".bmp", ".gif"];
const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv"];
const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg"];
const TEXT_EXTENSIONS: &[&str] = &[".txt", ".csv", ".json", ".yaml", ".yml"];

/// Data extensions whose annotation content is parsed as structured data
/// before a rule function's filter is evaluated.
const STRUCTURED_EXTENSIONS: &[&str] = &[".json", ".yaml", ".yml", ".json5"];

/// Kind of a medium file, ordered by selection priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Text,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Text => "text",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a lowercase extension, dot included (`".jpg"`).
///
/// Unknown extensions return `None`. Callers holding a raw extension should
/// go through [`classify_path`], which handles the lowercasing.
pub fn classify(ext: &str) -> Option<MediaKind> {
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Audio)
    } else if TEXT_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Text)
    } else {
        None
    }
}

/// Classify a path by its real filesystem extension, case-insensitively.
pub fn classify_path(path: &Path) -> Option<MediaKind> {
    let ext = dotted_extension(path)?;
    classify(&ext)
}

/// Total priority rank used for tie-breaking: image < video < audio < text <
/// unrecognized.
pub fn priority(kind: Option<MediaKind>) -> u8 {
    match kind {
        Some(MediaKind::Image) => 0,
        Some(MediaKind::Video) => 1,
        Some(MediaKind::Audio) => 2,
        Some(MediaKind::Text) => 3,
        None => 4,
    }
}

/// Whether a sidecar's data extension (`".txt"`, `".json"`, ...) is one the
/// indexer accepts as an annotation.
pub fn is_text_extension(ext: &str) -> bool {
    TEXT_EXTENSIONS.contains(&ext)
}

/// Whether annotation content with this data extension is parsed as
/// structured data for rule functions.
pub fn is_structured_extension(ext: &str) -> bool {
    STRUCTURED_EXTENSIONS.contains(&ext)
}

/// Lowercase extension of a path with a leading dot, if it has one.
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}

/// Guess a MIME type for serving a file.
///
/// Covers every recognized media extension; anything else (including
/// sidecar tags like `caption_txt`) is served as an opaque byte stream.
pub fn guess_content_type(path: &Path) -> &'static str {
    let Some(ext) = dotted_extension(path) else {
        return "application/octet-stream";
    };
    match ext.as_str() {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".webp" => "image/webp",
        ".bmp" => "image/bmp",
        ".gif" => "image/gif",
        ".mp4" => "video/mp4",
        ".mov" => "video/quicktime",
        ".avi" => "video/x-msvideo",
        ".mkv" => "video/x-matroska",
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".ogg" => "audio/ogg",
        ".txt" => "text/plain",
        ".csv" => "text/csv",
        ".json" => "application/json",
        ".yaml" | ".yml" => "application/yaml",
        _ => "application/octet-stream",
    }
}
