//! Compiled markup
//!
//! A [`Template`] is static text split into segments around the blanks that
//! marks fill at render time. It keeps every mark (including the ones that
//! fill nothing) plus the byte offset each mark sat at, so the original
//! markup can always be reconstructed. A [`Dom`] is a template together with
//! the bindings and metadata its static marks produced at compile time.
//!
//! Both are immutable once built and safe to share across threads; every
//! render works on its own [`Context`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::{Context, VarScope};
use crate::error::TailorError;
use crate::mark::{Mark, MarkKind};

// ============================================================================
// Template
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Template {
    marks: Vec<Mark>,
    /// Static text with all marks removed
    text: String,
    /// Offset into `text` where each mark was found
    anchors: Vec<usize>,
    /// Static text around the blanks; always `blanks.len() + 1` entries
    segments: Vec<String>,
    /// Indexes into `marks` of the blank-filling marks
    blanks: Vec<usize>,
}

impl Template {
    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    /// Marks that fill a blank, in document order
    pub fn blanks(&self) -> impl Iterator<Item = &Mark> + '_ {
        self.blanks.iter().map(move |i| &self.marks[*i])
    }

    pub fn blank_count(&self) -> usize {
        self.blanks.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The markup with every mark removed
    pub fn static_text(&self) -> &str {
        &self.text
    }

    /// The source markup, byte for byte
    pub fn markup(&self) -> String {
        let mut out = String::with_capacity(
            self.text.len() + self.marks.iter().map(|m| m.text.len()).sum::<usize>(),
        );
        let mut from = 0;
        for (mark, anchor) in self.marks.iter().zip(&self.anchors) {
            out.push_str(&self.text[from..*anchor]);
            out.push_str(&mark.text);
            from = *anchor;
        }
        out.push_str(&self.text[from..]);
        out
    }

    /// Interleave static segments with the text each blank derives
    pub(crate) fn fill(&self, ctx: &mut Context) -> Result<String, TailorError> {
        let mut out = String::with_capacity(self.text.len());
        for (segment, mark) in self.segments.iter().zip(self.blanks()) {
            out.push_str(segment);
            out.push_str(&mark.fill(ctx)?);
        }
        if let Some(last) = self.segments.last() {
            out.push_str(last);
        }
        Ok(out)
    }
}

/// Accumulates text and marks in document order
#[derive(Debug)]
pub(crate) struct TemplateBuilder {
    template: Template,
    segment: String,
}

impl TemplateBuilder {
    pub(crate) fn new() -> Self {
        Self {
            template: Template::default(),
            segment: String::new(),
        }
    }

    pub(crate) fn text(&mut self, text: &str) {
        self.template.text.push_str(text);
        self.segment.push_str(text);
    }

    pub(crate) fn mark(&mut self, mark: Mark) {
        let t = &mut self.template;
        t.anchors.push(t.text.len());
        if mark.fills_blank() {
            t.segments.push(std::mem::take(&mut self.segment));
            t.blanks.push(t.marks.len());
        }
        t.marks.push(mark);
    }

    pub(crate) fn build(mut self) -> Template {
        self.template.segments.push(self.segment);
        self.template
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Compile-time key/value annotations of a Dom
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Grammar the markup was compiled with
    pub const LANG: &'static str = "lang";
    /// Human readable description of the source
    pub const SOURCE: &'static str = "source";
    pub const ID: &'static str = "id";
    /// RFC 3339 compile timestamp
    pub const COMPILED: &'static str = "compiled";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Dom
// ============================================================================

/// A compiled, immutable markup document
#[derive(Debug, Clone)]
pub struct Dom {
    template: Template,
    statics: VarScope,
    metadata: Metadata,
}

impl Dom {
    pub(crate) fn new(template: Template, statics: VarScope, metadata: Metadata) -> Self {
        Self {
            template,
            statics,
            metadata,
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn marks(&self) -> &[Mark] {
        self.template.marks()
    }

    pub fn blanks(&self) -> impl Iterator<Item = &Mark> + '_ {
        self.template.blanks()
    }

    /// Bindings produced by static define marks
    pub fn statics(&self) -> &VarScope {
        &self.statics
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Directive names referenced by the document, in order
    pub fn directive_names(&self) -> Vec<&str> {
        self.marks()
            .iter()
            .filter_map(|m| match &m.kind {
                MarkKind::DirectiveRef { name } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn markup(&self) -> String {
        self.template.markup()
    }

    /// Render against `ctx`; see [`crate::tailor::Tailor`]
    pub fn tailor(&self, ctx: &mut Context) -> Result<String, TailorError> {
        crate::tailor::Tailor::new(self).run(ctx)
    }

    /// Render with a fresh context holding `bindings` in the instance scope
    pub fn tailor_with<I, K, V>(&self, bindings: I) -> Result<String, TailorError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<crate::value::Value>,
    {
        let mut ctx = Context::new();
        for (k, v) in bindings {
            ctx.set(k, v);
        }
        self.tailor(&mut ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mark::VarRef;
    use pretty_assertions::assert_eq;

    fn template() -> Template {
        let mut b = TemplateBuilder::new();
        b.text("Hello ");
        b.mark(Mark::new("{+name+}", 1, MarkKind::AddVar(VarRef::named("name"))));
        b.text(", ");
        b.mark(Mark::new(
            "{-gone-}",
            1,
            MarkKind::Cut {
                wrapped: "gone".to_string(),
            },
        ));
        b.text("bye");
        b.build()
    }

    #[test]
    fn test_segments_surround_blanks() {
        let t = template();
        assert_eq!(t.marks().len(), 2);
        assert_eq!(t.blank_count(), 1);
        assert_eq!(t.segments(), &["Hello ".to_string(), ", bye".to_string()]);
        assert_eq!(t.static_text(), "Hello , bye");
    }

    #[test]
    fn test_markup_reconstructs_source() {
        assert_eq!(template().markup(), "Hello {+name+}, {-gone-}bye");
    }

    #[test]
    fn test_fill() {
        let mut ctx = Context::new().with("name", "Eric");
        assert_eq!(template().fill(&mut ctx).unwrap(), "Hello Eric, bye");
    }

    #[test]
    fn test_metadata() {
        let mut m = Metadata::new();
        assert!(m.is_empty());
        m.insert(Metadata::LANG, "BindML");
        assert_eq!(m.get("lang"), Some("BindML"));
        assert!(m.contains(Metadata::LANG));
        assert_eq!(m.iter().count(), 1);
    }
}
