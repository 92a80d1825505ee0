//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Items are shown by their **index and id**, the identity the browsing
//! client uses, with file paths as indented context lines. The output reads
//! as an inventory of the dataset while still letting users trace each line
//! back to a file.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! d1 (2 items, from 000)
//!     000 d1/img1 [image]
//!         Source: d1/img1.jpg
//!         Annotations: img1.meta_json, img1.caption1_txt
//!     001 d1/img2 [video]
//!         Source: d1/img2.mp4
//! (root) (1 item, from 002)
//!     002 top [image]
//!         Source: top.png
//!
//! Template
//!     3 annotation rules, 3 ordering patterns
//!
//! Indexed 3 items in 2 directories
//! ```
//!
//! ## Show
//!
//! ```text
//! 000 d1/img1 [image] (1 of 3)
//!     Source: d1/img1.jpg
//!     Directory: d1 (prev 002, next 002)
//!     Directory label: reviewed
//!     d1/img1.meta_json (readonly)
//!         {"caption": "a dog in a park"}
//!         caption = a dog in a park
//!     d1/img1.WD14_txt (editable)
//!         1girl, long hair
//!         hair = 1girl, long [hair]
//!     1 hidden
//! ```
//!
//! ## Save / Filter
//!
//! ```text
//! Saved item 000
//!     d1/img1.caption1_txt (new)
//!     d1/img1.system_label_meta_txt
//!
//! Matched 2 items, 6 files → out
//!     1 rejected by label
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::filter::FilterReport;
use crate::index::{Index, Item};
use crate::naming;
use crate::order::OrderingRules;
use crate::rules::{FunctionValue, RuleSet};
use crate::service::{ItemView, SaveOutcome};
use std::path::Path;

/// Longest content preview shown per annotation.
const PREVIEW_CHARS: usize = 60;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format an item index as 3-digit zero-padded.
fn format_index(idx: usize) -> String {
    format!("{:0>3}", idx)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Display name of a top-level directory.
fn directory_name(directory: &str) -> &str {
    if directory.is_empty() { "(root)" } else { directory }
}

/// `"1 item"`, `"3 items"`.
fn plural(n: usize, word: &str) -> String {
    counted(n, word, &format!("{word}s"))
}

fn counted(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// Item header: index + id + media kind.
///
/// ```text
/// 004 d1/img [image]
/// ```
fn item_header(idx: usize, id: &str, kind: &str) -> String {
    format!("{} {} [{}]", format_index(idx), id, kind)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// First non-empty line of annotation content, truncated.
fn preview(content: &str) -> String {
    let line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    truncate(line.trim(), PREVIEW_CHARS)
}

/// Render a function value, bracketing the first occurrence of its highlight.
///
/// ```text
/// hair = long [hair]
/// ```
fn function_line(function: &FunctionValue) -> String {
    let value = match function.value.find(&function.highlight) {
        Some(start) if !function.highlight.is_empty() => {
            let end = start + function.highlight.len();
            format!(
                "{}[{}]{}",
                &function.value[..start],
                &function.value[start..end],
                &function.value[end..]
            )
        }
        _ => function.value.clone(),
    };
    format!("{} = {}", function.name, truncate(&value, PREVIEW_CHARS))
}

fn annotation_file_names(item: &Item) -> Vec<String> {
    item.annotations
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect()
}

// ============================================================================
// scan
// ============================================================================

/// Format the index inventory, grouped by top-level directory.
pub fn format_scan_output(index: &Index, root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    let dirs = index.directories();

    for directory in dirs.directories() {
        let members: Vec<(usize, &Item)> = index
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| &item.directory == directory)
            .collect();
        let first = dirs.first_index_of(directory).unwrap_or(0);
        lines.push(format!(
            "{} ({}, from {})",
            directory_name(directory),
            plural(members.len(), "item"),
            format_index(first)
        ));

        for (idx, item) in members {
            lines.push(format!("{}{}", indent(1), item_header(idx, &item.id, item.kind.as_str())));
            let source = naming::relative_key(root, &item.media)
                .unwrap_or_else(|| item.media.display().to_string());
            lines.push(format!("{}Source: {}", indent(2), source));
            let names = annotation_file_names(item);
            if !names.is_empty() {
                lines.push(format!("{}Annotations: {}", indent(2), names.join(", ")));
            }
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Indexed {} in {}",
        plural(index.total(), "item"),
        counted(dirs.directories().len(), "directory", "directories")
    ));
    lines
}

/// Format the active template summary.
pub fn format_template_summary(rules: Option<&RuleSet>, ordering: &OrderingRules) -> Vec<String> {
    let mut lines = vec!["Template".to_string()];
    match rules {
        Some(rules) => lines.push(format!(
            "{}{}, {}",
            indent(1),
            plural(rules.len(), "annotation rule"),
            plural(ordering.len(), "ordering pattern")
        )),
        None => lines.push(format!(
            "{}none (all annotations visible and editable, {})",
            indent(1),
            plural(ordering.len(), "default ordering pattern")
        )),
    }
    lines
}

/// Print scan output to stdout.
pub fn print_scan_output(index: &Index, root: &Path, rules: Option<&RuleSet>, ordering: &OrderingRules) {
    let mut lines = format_scan_output(index, root);
    // Template block goes before the closing summary line
    let summary = lines.pop();
    lines.extend(format_template_summary(rules, ordering));
    lines.push(String::new());
    lines.extend(summary);
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// show
// ============================================================================

/// Format one item payload.
pub fn format_item_view(view: &ItemView) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({} of {})",
        item_header(view.idx, &view.id, view.media_kind.as_str()),
        view.idx + 1,
        view.total
    )];
    lines.push(format!("{}Source: {}", indent(1), view.media_name));
    lines.push(format!(
        "{}Directory: {} (prev {}, next {})",
        indent(1),
        directory_name(&view.directory),
        format_index(view.prev_dir_idx),
        format_index(view.next_dir_idx)
    ));
    let dir_label = view.dir_label.trim();
    if !dir_label.is_empty() {
        lines.push(format!("{}Directory label: {}", indent(1), truncate(dir_label, PREVIEW_CHARS)));
    }

    for annotation in &view.annotations {
        let access = if annotation.readonly { "readonly" } else { "editable" };
        lines.push(format!("{}{} ({})", indent(1), annotation.filename, access));
        let text = preview(&annotation.content);
        if !text.is_empty() {
            lines.push(format!("{}{}", indent(2), text));
        }
        for function in &annotation.functions {
            lines.push(format!("{}{}", indent(2), function_line(function)));
        }
    }
    if view.hidden > 0 {
        lines.push(format!("{}{} hidden", indent(1), view.hidden));
    }
    lines
}

pub fn print_item_view(view: &ItemView) {
    for line in format_item_view(view) {
        println!("{}", line);
    }
}

// ============================================================================
// save
// ============================================================================

/// Format the files a save wrote, marking newly indexed ones.
pub fn format_save_output(idx: usize, outcome: &SaveOutcome, root: &Path) -> Vec<String> {
    if outcome.written.is_empty() {
        return vec![format!("Nothing to save for item {}", format_index(idx))];
    }
    let mut lines = vec![format!("Saved item {}", format_index(idx))];
    for path in &outcome.written {
        let rel = naming::relative_key(root, path).unwrap_or_else(|| path.display().to_string());
        if outcome.appended.contains(path) {
            lines.push(format!("{}{} (new)", indent(1), rel));
        } else {
            lines.push(format!("{}{}", indent(1), rel));
        }
    }
    lines
}

pub fn print_save_output(idx: usize, outcome: &SaveOutcome, root: &Path) {
    for line in format_save_output(idx, outcome, root) {
        println!("{}", line);
    }
}

// ============================================================================
// filter
// ============================================================================

/// Format a filter run summary.
pub fn format_filter_output(report: &FilterReport, output: &Path) -> Vec<String> {
    let mut lines = vec![format!(
        "Matched {}, {} → {}",
        plural(report.matched, "item"),
        plural(report.files, "file"),
        output.display()
    )];
    if report.rejected > 0 {
        lines.push(format!("{}{} rejected by label", indent(1), report.rejected));
    }
    if report.excluded > 0 {
        lines.push(format!("{}{} excluded by extension", indent(1), report.excluded));
    }
    lines
}

pub fn print_filter_output(report: &FilterReport, output: &Path) {
    for line in format_filter_output(report, output) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::service::AnnotationView;
    use std::path::PathBuf;

    fn item(id: &str, ext: &str, directory: &str, annotations: &[&str]) -> Item {
        let dir = Path::new("/data");
        Item {
            id: id.to_string(),
            media: dir.join(format!("{id}.{ext}")),
            kind: MediaKind::Image,
            annotations: annotations
                .iter()
                .map(|a| dir.join(format!("{id}.{a}")))
                .collect(),
            directory: directory.to_string(),
        }
    }

    fn view() -> ItemView {
        ItemView {
            idx: 0,
            id: "d1/img1".into(),
            media_url: "/file/d1/img1.jpg".into(),
            media_kind: MediaKind::Image,
            media_name: "d1/img1.jpg".into(),
            annotations: vec![AnnotationView {
                filename: "d1/img1.WD14_txt".into(),
                content: "\n1girl, long hair\nsmile\n".into(),
                readonly: false,
                functions: vec![FunctionValue {
                    name: "hair".into(),
                    value: "1girl, long hair".into(),
                    highlight: "hair".into(),
                }],
            }],
            directory: "d1".into(),
            dir_label: "reviewed\n".into(),
            prev_dir_idx: 2,
            next_dir_idx: 2,
            hidden: 1,
            total: 3,
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(4), "004");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("日本語テキスト", 3), "日本語...");
    }

    #[test]
    fn preview_skips_blank_lines() {
        assert_eq!(preview("\n  \n first \nsecond"), "first");
        assert_eq!(preview(""), "");
    }

    #[test]
    fn function_line_brackets_highlight() {
        let f = FunctionValue {
            name: "hair".into(),
            value: "long hair".into(),
            highlight: "hair".into(),
        };
        assert_eq!(function_line(&f), "hair = long [hair]");

        let plain = FunctionValue {
            name: "caption".into(),
            value: "a dog".into(),
            highlight: String::new(),
        };
        assert_eq!(function_line(&plain), "caption = a dog");
    }

    // =========================================================================
    // Command output tests
    // =========================================================================

    #[test]
    fn scan_output_groups_by_directory() {
        let index = Index::new(vec![
            item("d1/img1", "jpg", "d1", &["meta_json", "caption1_txt"]),
            item("d1/img2", "jpg", "d1", &[]),
            item("top", "png", "", &[]),
        ]);
        let lines = format_scan_output(&index, Path::new("/data"));

        assert_eq!(
            lines,
            vec![
                "d1 (2 items, from 000)",
                "    000 d1/img1 [image]",
                "        Source: d1/img1.jpg",
                "        Annotations: img1.meta_json, img1.caption1_txt",
                "    001 d1/img2 [image]",
                "        Source: d1/img2.jpg",
                "(root) (1 item, from 002)",
                "    002 top [image]",
                "        Source: top.png",
                "",
                "Indexed 3 items in 2 directories",
            ]
        );
    }

    #[test]
    fn scan_output_empty_index() {
        let lines = format_scan_output(&Index::default(), Path::new("/data"));
        assert_eq!(lines, vec!["Indexed 0 items in 0 directories"]);
    }

    #[test]
    fn template_summary() {
        let lines = format_template_summary(None, &OrderingRules::default());
        assert_eq!(
            lines[1],
            "    none (all annotations visible and editable, 3 default ordering patterns)"
        );
    }

    #[test]
    fn item_view_output() {
        let lines = format_item_view(&view());
        assert_eq!(
            lines,
            vec![
                "000 d1/img1 [image] (1 of 3)",
                "    Source: d1/img1.jpg",
                "    Directory: d1 (prev 002, next 002)",
                "    Directory label: reviewed",
                "    d1/img1.WD14_txt (editable)",
                "        1girl, long hair",
                "        hair = 1girl, long [hair]",
                "    1 hidden",
            ]
        );
    }

    #[test]
    fn save_output_marks_new_files() {
        let root = Path::new("/data");
        let outcome = SaveOutcome {
            written: vec![root.join("a.caption_txt"), root.join("a.system_label_meta_txt")],
            appended: vec![root.join("a.caption_txt")],
        };
        assert_eq!(
            format_save_output(7, &outcome, root),
            vec!["Saved item 007", "    a.caption_txt (new)", "    a.system_label_meta_txt"]
        );
        assert_eq!(
            format_save_output(7, &SaveOutcome::default(), root),
            vec!["Nothing to save for item 007"]
        );
    }

    #[test]
    fn filter_output() {
        let report = FilterReport {
            matched: 1,
            rejected: 2,
            excluded: 0,
            files: 3,
        };
        assert_eq!(
            format_filter_output(&report, &PathBuf::from("out")),
            vec!["Matched 1 item, 3 files → out", "    2 rejected by label"]
        );
    }
}
