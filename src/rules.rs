//! Template-driven annotation visibility and derived values.
//!
//! Without a template every annotation is visible and editable. With one,
//! each annotation's tag is matched against the template's rules in order:
//!
//! | Outcome | Visible | Editable | Functions |
//! |---------|---------|----------|-----------|
//! | first matching rule, no functions | yes | `!readonly` | none |
//! | first matching rule with functions | yes | no | computed per read |
//! | no rule, quick-label sidecar | yes | yes | none |
//! | no rule | no (counted as hidden) | no | none |
//!
//! Readonly is advisory. Nothing here guards the write path; callers that
//! accept edits ask [`edit_permission`] first.
//!
//! ## Derived Values
//!
//! For sidecars whose data extension is `.json`, `.yaml`, `.yml` or
//! `.json5`, the content is parsed (JSON first, then YAML) and the function
//! filter is evaluated as an [`expr`](crate::expr) expression with `x`
//! bound to the document. For any other sidecar the filter is a literal
//! substring and the first line containing it becomes the value, with the
//! filter as highlight. Failures produce an empty value.

use crate::expr::{self, Expr};
use crate::media;
use crate::naming;
use crate::order::compile_full_match;
use crate::template::TemplateConfig;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

/// A compiled derived-value function.
#[derive(Debug, Clone)]
pub struct RuleFunction {
    pub name: String,
    pub filter: String,
    /// `None` when the filter is not a valid expression; it can still serve
    /// as a plain-text substring.
    compiled: Option<Expr>,
}

/// A compiled annotation rule.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Pattern as written in the template.
    pub source: String,
    pattern: Regex,
    pub readonly: bool,
    pub functions: Vec<RuleFunction>,
}

impl Rule {
    pub fn matches(&self, tag: &str) -> bool {
        self.pattern.is_match(tag)
    }
}

/// Ordered rules compiled from a template's `annotations` mapping.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile the template's rules.
    ///
    /// Invalid patterns are reported and skipped. Rules with functions are
    /// made readonly here, once, whatever the template says.
    pub fn from_template(template: &TemplateConfig) -> Self {
        let mut rules = Vec::with_capacity(template.annotations.len());
        for (source, config) in &template.annotations {
            let pattern = match compile_full_match(source) {
                Ok(re) => re,
                Err(err) => {
                    tracing::warn!("skipping annotation rule with invalid pattern {source:?}: {err}");
                    continue;
                }
            };
            let functions: Vec<RuleFunction> = config
                .functions
                .iter()
                .map(|f| RuleFunction {
                    name: f.name.clone(),
                    filter: f.filter.clone(),
                    compiled: Expr::parse(&f.filter).ok(),
                })
                .collect();
            let readonly = config.readonly || !functions.is_empty();
            rules.push(Rule {
                source: source.clone(),
                pattern,
                readonly,
                functions,
            });
        }
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule whose pattern fully matches `tag`.
    pub fn match_tag(&self, tag: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.matches(tag))
    }
}

/// A computed derived value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionValue {
    pub name: String,
    pub value: String,
    /// Substring to emphasize inside `value`; empty when there is none.
    pub highlight: String,
}

/// How one annotation is presented to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible {
        readonly: bool,
        functions: Vec<FunctionValue>,
    },
}

/// Whether a client may submit edits for an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditPermission {
    Editable,
    ReadOnly,
    Hidden,
}

/// Decide visibility and compute derived values for one annotation.
///
/// `filename` may be a bare name or a path; only its tag is used.
pub fn assess(rules: Option<&RuleSet>, filename: &str, content: &str) -> Visibility {
    let Some(rules) = rules else {
        return Visibility::Visible {
            readonly: false,
            functions: Vec::new(),
        };
    };
    match rules.match_tag(naming::tag_of(filename)) {
        Some(rule) => {
            let data_ext = naming::data_extension(filename);
            let functions = rule
                .functions
                .iter()
                .map(|f| compute_function(f, data_ext.as_deref(), content))
                .collect();
            Visibility::Visible {
                readonly: rule.readonly,
                functions,
            }
        }
        None if naming::is_quick_label(filename) => Visibility::Visible {
            readonly: false,
            functions: Vec::new(),
        },
        None => Visibility::Hidden,
    }
}

/// The readonly capability check for the write path.
pub fn edit_permission(rules: Option<&RuleSet>, filename: &str) -> EditPermission {
    let Some(rules) = rules else {
        return EditPermission::Editable;
    };
    match rules.match_tag(naming::tag_of(filename)) {
        Some(rule) if rule.readonly => EditPermission::ReadOnly,
        Some(_) => EditPermission::Editable,
        None if naming::is_quick_label(filename) => EditPermission::Editable,
        None => EditPermission::Hidden,
    }
}

/// Compute one function's value from raw annotation content.
pub fn compute_function(function: &RuleFunction, data_ext: Option<&str>, content: &str) -> FunctionValue {
    let (value, highlight) = match data_ext {
        Some(ext) if media::is_structured_extension(ext) => {
            (structured_value(function, content).unwrap_or_default(), String::new())
        }
        _ => plain_text_match(&function.filter, content),
    };
    FunctionValue {
        name: function.name.clone(),
        value,
        highlight,
    }
}

fn structured_value(function: &RuleFunction, content: &str) -> Option<String> {
    let document = parse_structured(content)?;
    let expr = function.compiled.as_ref()?;
    match expr.evaluate(&document) {
        Ok(result) => Some(expr::render(&result)),
        Err(err) => {
            tracing::debug!("function {:?} failed: {err}", function.name);
            None
        }
    }
}

/// Parse sidecar content as JSON, falling back to YAML.
pub fn parse_structured(content: &str) -> Option<Value> {
    serde_json::from_str(content)
        .ok()
        .or_else(|| serde_yaml::from_str(content).ok())
}

/// First line containing `filter`, highlighted by the filter itself.
fn plain_text_match(filter: &str, content: &str) -> (String, String) {
    content
        .lines()
        .find(|line| line.contains(filter))
        .map(|line| (line.to_string(), filter.to_string()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{TemplateFormat, parse_template};

    fn rules(yaml: &str) -> RuleSet {
        RuleSet::from_template(&parse_template(yaml, TemplateFormat::Yaml).unwrap())
    }

    fn visible_functions(v: Visibility) -> Vec<FunctionValue> {
        match v {
            Visibility::Visible { functions, .. } => functions,
            Visibility::Hidden => panic!("expected a visible annotation"),
        }
    }

    #[test]
    fn no_template_exposes_everything_editable() {
        assert_eq!(
            assess(None, "img.anything_txt", "x"),
            Visibility::Visible {
                readonly: false,
                functions: vec![]
            }
        );
        assert_eq!(edit_permission(None, "img.anything_txt"), EditPermission::Editable);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = rules(
            r#"
annotations:
  'caption\d+_txt': {readonly: false}
  'caption.*': {readonly: true}
"#,
        );
        assert_eq!(rules.match_tag("caption1_txt").unwrap().source, r"caption\d+_txt");
        assert_eq!(edit_permission(Some(&rules), "i.caption1_txt"), EditPermission::Editable);
        assert_eq!(edit_permission(Some(&rules), "i.captionX_txt"), EditPermission::ReadOnly);
    }

    #[test]
    fn unmatched_annotation_is_hidden_but_quick_label_is_not() {
        let rules = rules("annotations:\n  'meta_json': {}\n");
        assert_eq!(assess(Some(&rules), "i.caption_txt", ""), Visibility::Hidden);
        assert_eq!(edit_permission(Some(&rules), "i.caption_txt"), EditPermission::Hidden);
        assert!(matches!(
            assess(Some(&rules), "i.system_label_meta_txt", "ok"),
            Visibility::Visible { readonly: false, .. }
        ));
    }

    #[test]
    fn functions_force_readonly() {
        let rules = rules(
            r#"
annotations:
  'meta_json':
    readonly: false
    functions:
      - {name: caption, filter: x.caption}
"#,
        );
        assert!(rules.rules()[0].readonly);
        assert_eq!(edit_permission(Some(&rules), "i.meta_json"), EditPermission::ReadOnly);
    }

    #[test]
    fn structured_function_evaluates_expression() {
        let rules = rules(
            r#"
annotations:
  'meta_(json|yaml)':
    functions:
      - {name: caption, filter: x.caption}
      - {name: n, filter: len(x.tags)}
      - {name: broken, filter: x.nope}
"#,
        );
        let json = r#"{"caption": "a dog", "tags": ["dog", "park"]}"#;
        let functions = visible_functions(assess(Some(&rules), "img.meta_json", json));
        assert_eq!(functions[0].value, "a dog");
        assert_eq!(functions[0].highlight, "");
        assert_eq!(functions[1].value, "2");
        assert_eq!(functions[2].value, "");

        let yaml = "caption: from yaml\ntags: []\n";
        let functions = visible_functions(assess(Some(&rules), "img.meta_yaml", yaml));
        assert_eq!(functions[0].value, "from yaml");
    }

    #[test]
    fn unparsable_structured_content_yields_empty() {
        let rules = rules("annotations:\n  'meta_json':\n    functions: [{name: c, filter: x.c}]\n");
        let functions = visible_functions(assess(Some(&rules), "img.meta_json", "{[ nope"));
        assert_eq!(functions[0].value, "");
    }

    #[test]
    fn plain_text_function_finds_first_line() {
        let rules = rules("annotations:\n  'WD14_txt':\n    functions: [{name: hair, filter: hair}]\n");
        let content = "1girl\nlong hair\nshort hair\n";
        let functions = visible_functions(assess(Some(&rules), "img.WD14_txt", content));
        assert_eq!(
            functions[0],
            FunctionValue {
                name: "hair".into(),
                value: "long hair".into(),
                highlight: "hair".into(),
            }
        );

        let functions = visible_functions(assess(Some(&rules), "img.WD14_txt", "1boy\n"));
        assert_eq!(functions[0].value, "");
        assert_eq!(functions[0].highlight, "");
    }

    #[test]
    fn plain_text_filter_need_not_be_an_expression() {
        let rules = rules("annotations:\n  'notes_txt':\n    functions: [{name: todo, filter: 'TODO:'}]\n");
        let functions = visible_functions(assess(Some(&rules), "i.notes_txt", "a\nTODO: fix\n"));
        assert_eq!(functions[0].value, "TODO: fix");
    }

    #[test]
    fn invalid_rule_pattern_is_skipped() {
        let rules = rules("annotations:\n  '(bad': {}\n  'good_txt': {}\n");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.rules()[0].source, "good_txt");
    }
}
