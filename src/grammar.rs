//! Markup grammars
//!
//! A grammar is data: an injective table of open literal → close literal,
//! each pair tagged with the [`TagFamily`] that decides how the text between
//! them is classified. New grammars can be added (or loaded from YAML)
//! without touching the parser's state machine.
//!
//! ```yaml
//! name: sql
//! tags:
//!   - { open: "--{+", close: "+}", family: add }
//!   - { open: "--{-", close: "-}", family: cut }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::MarkupError;

/// How the contents of a tag pair are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagFamily {
    /// Variables, scripts, expressions, conditionals
    Add,
    AddForm,
    DefineInstance,
    DefineStatic,
    DefineInstanceForm,
    DefineStaticForm,
    /// Side-effect only script or expression
    Eval,
    Directive,
    Metadata,
    Cut,
    CutComment,
    CutDocComment,
    /// `head*/placeholder/*` inside a source comment
    Replace,
    ReplaceForm,
}

/// One open/close literal pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPair {
    pub open: String,
    pub close: String,
    pub family: TagFamily,
    /// Wrapped text sits between `*/` and `/*` (source-comment envelope)
    #[serde(default)]
    pub comment: bool,
}

impl TagPair {
    pub fn new(open: &str, close: &str, family: TagFamily) -> Self {
        Self {
            open: open.to_string(),
            close: close.to_string(),
            family,
            comment: false,
        }
    }

    pub fn in_comment(mut self) -> Self {
        self.comment = true;
        self
    }
}

/// A validated tag table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grammar {
    name: String,
    tags: Vec<TagPair>,
}

#[derive(Deserialize)]
struct GrammarConfig {
    name: String,
    tags: Vec<TagPair>,
}

pub const BIND_ML: &str = "BindML";
pub const CODE_ML: &str = "CodeML";

fn bind_ml_tags() -> Vec<TagPair> {
    use TagFamily::*;
    vec![
        TagPair::new("{+", "+}", Add),
        TagPair::new("{{+", "+}}", AddForm),
        TagPair::new("{#", "#}", DefineInstance),
        TagPair::new("{##", "##}", DefineStatic),
        TagPair::new("{{#", "#}}", DefineInstanceForm),
        TagPair::new("{{##", "##}}", DefineStaticForm),
        TagPair::new("{$", "$}", Eval),
        TagPair::new("{$$", "$$}", Directive),
        TagPair::new("{@", "@}", Metadata),
        TagPair::new("{-", "-}", Cut),
    ]
}

impl Grammar {
    /// Build a grammar, rejecting empty literals and non-injective tables
    pub fn new(name: impl Into<String>, tags: Vec<TagPair>) -> Result<Self, MarkupError> {
        let name = name.into();
        let invalid = |message: String| MarkupError::Grammar {
            name: name.clone(),
            message,
        };
        if tags.is_empty() {
            return Err(invalid("no tags defined".to_string()));
        }
        let mut opens = HashSet::new();
        let mut closes = HashSet::new();
        for tag in &tags {
            if tag.open.is_empty() || tag.close.is_empty() {
                return Err(invalid(format!(
                    "empty literal in pair '{}' / '{}'",
                    tag.open, tag.close
                )));
            }
            if !opens.insert(tag.open.as_str()) {
                return Err(invalid(format!("duplicate open literal '{}'", tag.open)));
            }
            if !closes.insert(tag.close.as_str()) {
                return Err(invalid(format!("duplicate close literal '{}'", tag.close)));
            }
        }
        Ok(Self { name, tags })
    }

    /// Plain marks
    pub fn bind_ml() -> Self {
        Self {
            name: BIND_ML.to_string(),
            tags: bind_ml_tags(),
        }
    }

    /// Plain marks plus marks hidden in `/* */` comments
    pub fn code_ml() -> Self {
        use TagFamily::*;
        let mut tags = bind_ml_tags();
        tags.extend([
            TagPair::new("/*{+", "+}*/", Replace).in_comment(),
            TagPair::new("/*{{+", "+}}*/", ReplaceForm).in_comment(),
            TagPair::new("/*{#", "#}*/", DefineInstance),
            TagPair::new("/*{##", "##}*/", DefineStatic),
            TagPair::new("/*{{#", "#}}*/", DefineInstanceForm),
            TagPair::new("/*{{##", "##}}*/", DefineStaticForm),
            TagPair::new("/*{$", "$}*/", Eval),
            TagPair::new("/*{$$", "$$}*/", Directive),
            TagPair::new("/*{@", "@}*/", Metadata),
            TagPair::new("/*{-", "-}*/", Cut).in_comment(),
            TagPair::new("/*-", "-*/", CutComment),
            TagPair::new("/**-", "-**/", CutDocComment),
        ]);
        Self {
            name: CODE_ML.to_string(),
            tags,
        }
    }

    /// Load a grammar from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, MarkupError> {
        let config: GrammarConfig = serde_yaml::from_str(yaml)?;
        Self::new(config.name, config.tags)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[TagPair] {
        &self.tags
    }

    /// Earliest open literal in `text`; at equal positions the longest
    /// literal wins, so `{{+` is never mistaken for `{+` and `{##` for `{#`
    pub fn find_open(&self, text: &str) -> Option<(usize, &TagPair)> {
        self.tags
            .iter()
            .filter_map(|tag| text.find(&tag.open).map(|pos| (pos, tag)))
            .min_by(|(pa, a), (pb, b)| pa.cmp(pb).then(b.open.len().cmp(&a.open.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_literal_wins_at_same_position() {
        let g = Grammar::code_ml();
        let (pos, tag) = g.find_open("int {{+:{+a+}+}}").unwrap();
        assert_eq!((pos, tag.open.as_str()), (4, "{{+"));

        let (_, tag) = g.find_open("{##name:v##}").unwrap();
        assert_eq!(tag.family, TagFamily::DefineStatic);

        let (_, tag) = g.find_open("{$$stripBlankLines$$}").unwrap();
        assert_eq!(tag.family, TagFamily::Directive);
    }

    #[test]
    fn test_earliest_position_wins() {
        let g = Grammar::code_ml();
        let (pos, tag) = g.find_open("x /*{+name*/a/*+}*/").unwrap();
        assert_eq!(pos, 2);
        assert_eq!(tag.family, TagFamily::Replace);

        let (_, tag) = g.find_open("/**- doc -**/").unwrap();
        assert_eq!(tag.family, TagFamily::CutDocComment);
    }

    #[test]
    fn test_bind_ml_ignores_comment_marks() {
        let g = Grammar::bind_ml();
        let (pos, tag) = g.find_open("/*{+name*/a/*+}*/").unwrap();
        assert_eq!(pos, 2);
        assert_eq!(tag.family, TagFamily::Add);
        assert!(g.find_open("plain text").is_none());
    }

    #[test]
    fn test_builtin_grammars_are_injective() {
        for g in [Grammar::bind_ml(), Grammar::code_ml()] {
            let rebuilt = Grammar::new(g.name(), g.tags().to_vec()).unwrap();
            assert_eq!(rebuilt, g);
        }
    }

    #[test]
    fn test_rejects_duplicate_close() {
        let err = Grammar::new(
            "broken",
            vec![
                TagPair::new("<+", "+>", TagFamily::Add),
                TagPair::new("<<+", "+>", TagFamily::AddForm),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, MarkupError::Grammar { .. }));
    }

    #[test]
    fn test_from_yaml() {
        let g = Grammar::from_yaml(
            r#"
name: sql
tags:
  - { open: "--{+", close: "+}", family: add }
  - { open: "--{-", close: "-}", family: cut, comment: false }
"#,
        )
        .unwrap();
        assert_eq!(g.name(), "sql");
        assert_eq!(g.tags()[1].family, TagFamily::Cut);
        assert!(Grammar::from_yaml("name: x\ntags: []").is_err());
    }
}
