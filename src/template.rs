//! Template configuration: annotation ordering and visibility rules.
//!
//! A template is a JSON, YAML or TOML document with two optional keys:
//!
//! ```yaml
//! ordering:                       # regexes over annotation filenames, in priority order
//!   - '.*\.meta_json'
//!   - '.*\.caption\d+_txt'
//!
//! annotations:                    # regexes over annotation tags, first match wins
//!   'caption\d*_txt':
//!     readonly: false             # default: true
//!   'meta_json':
//!     functions:                  # derived values; forces readonly
//!       - name: caption
//!         filter: x.caption
//! ```
//!
//! ## Error Tolerance
//!
//! Loading never fails on a single bad entry. A rule object that does not
//! deserialize, an ordering entry that is not a string, or an unknown
//! top-level key is reported with `tracing::warn!` and skipped. Only an
//! unreadable or unparsable file is an error, and callers treat even that as
//! "no template" after reporting it.
//!
//! Regex validity is checked later, when [`crate::order`] and
//! [`crate::rules`] compile the patterns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Source format of a template document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Json,
    Yaml,
    Toml,
    /// Unknown extension: JSON first, then YAML.
    Auto,
}

impl TemplateFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => TemplateFormat::Json,
            "yaml" | "yml" => TemplateFormat::Yaml,
            "toml" => TemplateFormat::Toml,
            _ => TemplateFormat::Auto,
        }
    }
}

/// One derived-value function of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionConfig {
    pub name: String,
    /// Expression over `x` for structured sidecars, literal substring for
    /// plain-text ones.
    pub filter: String,
}

/// A rule object as written by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    #[serde(default = "default_readonly")]
    pub readonly: bool,
    #[serde(default)]
    pub functions: Vec<FunctionConfig>,
}

fn default_readonly() -> bool {
    true
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            readonly: default_readonly(),
            functions: Vec::new(),
        }
    }
}

/// A loaded template, with malformed entries already dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateConfig {
    /// `None` when the key is absent, so the default ordering applies.
    pub ordering: Option<Vec<String>>,
    /// Tag pattern → rule, in document order.
    pub annotations: IndexMap<String, RuleConfig>,
}

/// Document shape before per-entry validation.
#[derive(Debug, Default, Deserialize)]
struct RawTemplate {
    #[serde(default)]
    ordering: Option<Vec<Value>>,
    #[serde(default)]
    annotations: IndexMap<String, Value>,
    #[serde(flatten)]
    unknown: IndexMap<String, Value>,
}

/// Load a template file, choosing the parser from its extension.
pub fn load_template(path: &Path) -> Result<TemplateConfig, TemplateError> {
    let content = fs::read_to_string(path)?;
    parse_template(&content, TemplateFormat::from_path(path))
}

/// Parse template text in the given format.
pub fn parse_template(text: &str, format: TemplateFormat) -> Result<TemplateConfig, TemplateError> {
    let raw: RawTemplate = match format {
        TemplateFormat::Json => serde_json::from_str(text)?,
        TemplateFormat::Yaml => yaml_or_empty(text)?,
        TemplateFormat::Toml => toml::from_str(text)?,
        TemplateFormat::Auto => match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(_) => yaml_or_empty(text)?,
        },
    };
    Ok(validate(raw))
}

/// An empty YAML document parses as null; treat it as an empty template.
fn yaml_or_empty(text: &str) -> Result<RawTemplate, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(RawTemplate::default());
    }
    serde_yaml::from_str(text)
}

fn validate(raw: RawTemplate) -> TemplateConfig {
    for key in raw.unknown.keys() {
        tracing::warn!("ignoring unknown template key {key:?}");
    }

    let ordering = raw.ordering.map(|entries| {
        entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::String(pattern) => Some(pattern),
                other => {
                    tracing::warn!("skipping non-string ordering entry {other}");
                    None
                }
            })
            .collect()
    });

    let mut annotations = IndexMap::new();
    for (pattern, value) in raw.annotations {
        let rule = match value {
            Value::Null => Ok(RuleConfig::default()),
            other => serde_json::from_value::<RuleConfig>(other),
        };
        match rule {
            Ok(rule) => {
                annotations.insert(pattern, rule);
            }
            Err(err) => tracing::warn!("skipping annotation rule {pattern:?}: {err}"),
        }
    }

    TemplateConfig {
        ordering,
        annotations,
    }
}

/// Returns a fully-commented stock template.
///
/// Used by the `gen-template` CLI command.
pub fn stock_template_yaml() -> &'static str {
    r#"# Annotation template
# ===================
# Both keys are optional.
#
# ordering: regular expressions matched against the full annotation
# filename (e.g. "image1.caption1_txt"). Annotations are listed in the
# order of the first pattern they match; unmatched files come last.
# Ties are broken by filename.
ordering:
  - '.*\.meta_json'
  - '.*\.WD14_txt'
  - '.*\.caption\d+_txt'

# annotations: regular expressions matched against the full annotation
# tag (the part after the last dot, e.g. "caption1_txt"). The first
# matching rule decides how the file is shown. Once a template is in
# use, annotations matching no rule are hidden from the editor (they
# stay on disk).
#
#   readonly   whether edits are offered (default: true)
#   functions  derived values shown next to the annotation; a rule with
#              functions is always readonly.
#              For .json/.yaml/.yml/.json5 sidecars the filter is an
#              expression over the parsed document bound to `x`
#              (x.caption, x.tags[0], len(x.tags), x.score > 0.5 ...).
#              For plain-text sidecars the filter is a substring; the
#              first line containing it is shown.
annotations:
  'caption\d*_txt':
    readonly: false
  'WD14_txt':
    readonly: false
  'meta_json':
    functions:
      - name: caption
        filter: x.caption
      - name: tags
        filter: len(get(x, 'tags', []))
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_yaml_in_document_order() {
        let template = parse_template(
            r#"
annotations:
  zeta_txt: {readonly: false}
  alpha_txt: {}
  mid_json:
    functions:
      - {name: f, filter: x.a}
"#,
            TemplateFormat::Yaml,
        )
        .unwrap();

        let keys: Vec<&str> = template.annotations.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta_txt", "alpha_txt", "mid_json"]);
        assert!(!template.annotations["zeta_txt"].readonly);
        assert!(template.annotations["alpha_txt"].readonly);
        assert_eq!(template.annotations["mid_json"].functions[0].filter, "x.a");
        assert_eq!(template.ordering, None);
    }

    #[test]
    fn parses_json_ordering() {
        let template = parse_template(
            r#"{"ordering": ["a", "b"], "annotations": {"x_txt": {"readonly": false}}}"#,
            TemplateFormat::Json,
        )
        .unwrap();
        assert_eq!(template.ordering, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(!template.annotations["x_txt"].readonly);
    }

    #[test]
    fn parses_toml() {
        let template = parse_template(
            r#"
ordering = ['.*\.meta_json']

[annotations.caption_txt]
readonly = false
"#,
            TemplateFormat::Toml,
        )
        .unwrap();
        assert_eq!(template.ordering.as_ref().unwrap().len(), 1);
        assert!(!template.annotations["caption_txt"].readonly);
    }

    #[test]
    fn malformed_rule_is_skipped() {
        let template = parse_template(
            r#"
ordering: ['ok', 42]
annotations:
  good_txt: {readonly: false}
  bad_txt: {readonly: "sometimes"}
  typo_txt: {readnoly: true}
  empty_txt:
"#,
            TemplateFormat::Yaml,
        )
        .unwrap();
        assert_eq!(template.ordering, Some(vec!["ok".to_string()]));
        let keys: Vec<&str> = template.annotations.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["good_txt", "empty_txt"]);
        assert!(template.annotations["empty_txt"].readonly);
    }

    #[test]
    fn unknown_top_level_keys_are_ignored() {
        let template =
            parse_template(r#"{"anotations": {}, "ordering": []}"#, TemplateFormat::Json).unwrap();
        assert_eq!(template.ordering, Some(Vec::new()));
        assert!(template.annotations.is_empty());
    }

    #[test]
    fn auto_format_falls_back_to_yaml() {
        let template = parse_template("ordering:\n  - a\n", TemplateFormat::Auto).unwrap();
        assert_eq!(template.ordering, Some(vec!["a".to_string()]));
    }

    #[test]
    fn empty_yaml_is_empty_template() {
        let template = parse_template("", TemplateFormat::Yaml).unwrap();
        assert_eq!(template, TemplateConfig::default());
    }

    #[test]
    fn unparsable_file_is_error() {
        let result = parse_template("{not json", TemplateFormat::Json);
        assert!(matches!(result, Err(TemplateError::Json(_))));
    }

    #[test]
    fn load_template_picks_parser_by_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("template.yml");
        std::fs::write(&path, "annotations:\n  a_txt: {readonly: false}\n").unwrap();
        let template = load_template(&path).unwrap();
        assert!(!template.annotations["a_txt"].readonly);
    }

    #[test]
    fn stock_template_parses() {
        let template = parse_template(stock_template_yaml(), TemplateFormat::Yaml).unwrap();
        assert_eq!(template.ordering.as_ref().unwrap().len(), 3);
        assert_eq!(template.annotations.len(), 3);
        assert_eq!(template.annotations["meta_json"].functions.len(), 2);
    }
}
