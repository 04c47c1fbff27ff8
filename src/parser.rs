//! Markup compiler
//!
//! Markup is read line by line, separators kept exactly as written. The
//! state machine has two states: scanning for the earliest open literal, or
//! buffering a mark until its close literal appears (possibly several lines
//! later). Each completed mark is classified by the factory, run at once if
//! it is static, and appended to the template under construction.
//!
//! Form bodies are compiled by the same machine in fragment mode, sharing
//! the compile-time bindings of the document they appear in.

use std::io::BufRead;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use crate::audit::{IdentifierAudit, VarNameAudit};
use crate::context::{Context, Scope};
use crate::dom::{Dom, Metadata, Template, TemplateBuilder};
use crate::error::{EvalError, MarkupError, TailorError};
use crate::form::{Form, JoinPolicy};
use crate::grammar::{Grammar, TagPair};
use crate::mark::{Mark, MarkKind};
use crate::source::{MarkupSource, StringSource};

/// Compiles markup in one grammar into [`Dom`]s
#[derive(Clone)]
pub struct Compiler {
    pub(crate) grammar: Grammar,
    pub(crate) audit: Arc<dyn VarNameAudit>,
    context: Context,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Grammar::bind_ml())
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("grammar", &self.grammar.name())
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            audit: Arc::new(IdentifierAudit::default()),
            context: Context::new(),
        }
    }

    pub fn bind_ml() -> Self {
        Self::new(Grammar::bind_ml())
    }

    pub fn code_ml() -> Self {
        Self::new(Grammar::code_ml())
    }

    pub fn with_audit(mut self, audit: Arc<dyn VarNameAudit>) -> Self {
        self.audit = audit;
        self
    }

    /// Bindings and scripts visible to static marks at compile time
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn compile(&self, source: &dyn MarkupSource) -> Result<Dom, MarkupError> {
        let descriptor = source.descriptor();
        debug!(source = %descriptor, grammar = self.grammar.name(), "compiling markup");
        let io_error = |e| MarkupError::Io {
            source_name: descriptor.clone(),
            source: e,
        };
        let mut reader = source.open().map_err(io_error)?;

        let mut context = self.context.clone();
        let mut metadata = Metadata::new();
        metadata.insert(Metadata::LANG, self.grammar.name());
        metadata.insert(Metadata::SOURCE, descriptor.clone());
        metadata.insert(Metadata::ID, source.id());
        metadata.insert(Metadata::COMPILED, Utc::now().to_rfc3339());

        let template = {
            let mut state = ParseState::new(self, &mut context, &mut metadata, false);
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).map_err(io_error)? == 0 {
                    break;
                }
                state.line += 1;
                state.feed(&line)?;
            }
            state.finish()?
        };

        let statics = context.scope(Scope::Static).cloned().unwrap_or_default();
        debug!(
            marks = template.marks().len(),
            blanks = template.blank_count(),
            statics = statics.len(),
            "compiled markup"
        );
        Ok(Dom::new(template, statics, metadata))
    }

    pub fn compile_str(&self, markup: &str) -> Result<Dom, MarkupError> {
        self.compile(&StringSource::new(markup))
    }

    /// Compile a form body on its own, `<<join>>` clause included
    pub fn compile_form(&self, body: &str) -> Result<Form, MarkupError> {
        let mut context = self.context.clone();
        let mut metadata = Metadata::new();
        let mut state = ParseState::new(self, &mut context, &mut metadata, true);
        let (body, join) = JoinPolicy::split(body);
        let template = state.fragment(body, 1)?;
        Ok(Form::new(None, template, join))
    }
}

// ============================================================================
// State machine
// ============================================================================

/// A mark whose close literal has not been seen yet
struct OpenTag<'c> {
    tag: &'c TagPair,
    buffer: String,
    line: usize,
}

pub(crate) struct ParseState<'c, 'x> {
    pub(crate) compiler: &'c Compiler,
    /// Compile-time bindings; static marks write their Static scope
    pub(crate) context: &'x mut Context,
    metadata: &'x mut Metadata,
    builder: TemplateBuilder,
    open: Option<OpenTag<'c>>,
    /// Current 1-based line number
    line: usize,
    in_form: bool,
}

impl<'c, 'x> ParseState<'c, 'x> {
    fn new(
        compiler: &'c Compiler,
        context: &'x mut Context,
        metadata: &'x mut Metadata,
        in_form: bool,
    ) -> Self {
        Self {
            compiler,
            context,
            metadata,
            builder: TemplateBuilder::new(),
            open: None,
            line: 0,
            in_form,
        }
    }

    /// Consume one line, separator included
    fn feed(&mut self, line: &str) -> Result<(), MarkupError> {
        let compiler = self.compiler;
        let mut rest = line;
        while !rest.is_empty() {
            match self.open.take() {
                Some(mut open) => match rest.find(open.tag.close.as_str()) {
                    Some(idx) => {
                        let end = idx + open.tag.close.len();
                        open.buffer.push_str(&rest[..end]);
                        rest = &rest[end..];
                        self.complete(open)?;
                    }
                    None => {
                        open.buffer.push_str(rest);
                        self.open = Some(open);
                        return Ok(());
                    }
                },
                None => match compiler.grammar.find_open(rest) {
                    Some((pos, tag)) => {
                        self.builder.text(&rest[..pos]);
                        self.open = Some(OpenTag {
                            tag,
                            buffer: tag.open.clone(),
                            line: self.line,
                        });
                        rest = &rest[pos + tag.open.len()..];
                    }
                    None => {
                        self.builder.text(rest);
                        return Ok(());
                    }
                },
            }
        }
        Ok(())
    }

    fn complete(&mut self, open: OpenTag<'c>) -> Result<(), MarkupError> {
        let text = open.buffer;
        let content = &text[open.tag.open.len()..text.len() - open.tag.close.len()];
        let mark = self.classify(open.tag, &text, content, open.line)?;
        self.register(mark)
    }

    fn register(&mut self, mark: Mark) -> Result<(), MarkupError> {
        let misplaced = |what: &str| MarkupError::Contract {
            text: mark.text.clone(),
            line: mark.line,
            message: format!("{} is not allowed inside a form", what),
        };
        match &mark.kind {
            MarkKind::SetMetadata { .. } if self.in_form => return Err(misplaced("metadata")),
            MarkKind::DirectiveRef { .. } if self.in_form => return Err(misplaced("a directive")),
            MarkKind::SetMetadata { key, value } => {
                self.metadata.insert(key.clone(), value.clone());
            }
            _ if mark.is_static() => match mark.bind(self.context, Scope::Static) {
                Ok(()) => {}
                Err(TailorError::Eval(EvalError::Undefined { name })) => {
                    debug!(%name, line = mark.line, "static mark reads an unbound name, left unbound");
                }
                Err(e) => {
                    return Err(MarkupError::Static {
                        text: mark.text.clone(),
                        line: mark.line,
                        source: Box::new(e),
                    })
                }
            },
            _ => {}
        }
        trace!(line = mark.line, kind = mark.kind_name(), "compiled mark");
        self.builder.mark(mark);
        Ok(())
    }

    fn finish(self) -> Result<Template, MarkupError> {
        if let Some(open) = self.open {
            return Err(MarkupError::UnclosedTag {
                close: open.tag.close.clone(),
                buffered: open.buffer,
                line: open.line,
            });
        }
        Ok(self.builder.build())
    }

    /// Compile a form body that starts on `line`
    fn fragment(&mut self, body: &str, line: usize) -> Result<Template, MarkupError> {
        let mut sub = ParseState::new(self.compiler, &mut *self.context, &mut *self.metadata, true);
        sub.line = line.saturating_sub(1);
        for piece in body.split_inclusive('\n') {
            sub.line += 1;
            sub.feed(piece)?;
        }
        sub.finish()
    }

    /// Compile a form mark's body into a form
    pub(crate) fn form(
        &mut self,
        name: Option<String>,
        body: &str,
        line: usize,
    ) -> Result<Arc<Form>, MarkupError> {
        let (body, join) = JoinPolicy::split(body);
        let template = self.fragment(body, line)?;
        Ok(Arc::new(Form::new(name, template, join)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn compile(markup: &str) -> Dom {
        Compiler::bind_ml().compile_str(markup).unwrap()
    }

    #[test]
    fn test_plain_text_has_no_marks() {
        let dom = compile("just text\nover lines\n");
        assert!(dom.marks().is_empty());
        assert_eq!(dom.template().segments(), &["just text\nover lines\n".to_string()]);
    }

    #[test]
    fn test_mark_spanning_lines() {
        let dom = compile("a\nb {-one\ntwo-} c\n{+name+}");
        assert_eq!(dom.marks().len(), 2);
        assert_eq!(dom.marks()[0].line, 2);
        assert_eq!(dom.marks()[0].wrapped(), Some("one\ntwo"));
        assert_eq!(dom.marks()[1].line, 3);
        assert_eq!(dom.markup(), "a\nb {-one\ntwo-} c\n{+name+}");
    }

    #[test]
    fn test_crlf_is_preserved() {
        let source = "x\r\n{+a+}\r\n";
        assert_eq!(compile(source).markup(), source);
    }

    #[test]
    fn test_unclosed_tag() {
        let err = Compiler::bind_ml().compile_str("ok\n{+name\nmore").unwrap_err();
        match err {
            MarkupError::UnclosedTag { close, buffered, line } => {
                assert_eq!(close, "+}");
                assert_eq!(buffered, "{+name\nmore");
                assert_eq!(line, 2);
            }
            other => panic!("Expected UnclosedTag, got {:?}", other),
        }
    }

    #[test]
    fn test_metadata_and_defaults() {
        let dom = compile("{@package:com.example@}body");
        assert_eq!(dom.metadata().get("package"), Some("com.example"));
        assert_eq!(dom.metadata().get(Metadata::LANG), Some("BindML"));
        assert!(dom.metadata().contains(Metadata::ID));
        assert!(dom.metadata().contains(Metadata::COMPILED));
    }

    #[test]
    fn test_static_define_runs_at_compile_time() {
        let dom = compile("{##greeting:hello##}{##shout:$upper(greeting)##}");
        assert_eq!(
            dom.statics().get("shout").and_then(|b| b.as_value()),
            Some(&Value::from("HELLO"))
        );
        assert_eq!(dom.blanks().count(), 0);
    }

    #[test]
    fn test_forward_reference_in_static_is_absent() {
        let dom = compile("{##a:((b))##}{##b:1##}");
        assert_eq!(
            dom.statics().get("b").and_then(|b| b.as_value()),
            Some(&Value::from("1"))
        );
        assert!(dom.statics().get("a").is_none());
    }

    #[test]
    fn test_metadata_inside_form_rejected() {
        let err = Compiler::bind_ml()
            .compile_str("{{+:{@k:v@}+}}")
            .unwrap_err();
        assert!(matches!(err, MarkupError::Contract { .. }));
    }

    #[test]
    fn test_form_lines_are_absolute() {
        let dom = compile("line1\n{{+:\n{+a+}\n+}}");
        match &dom.marks()[0].kind {
            MarkKind::AddForm(form) => assert_eq!(form.template().marks()[0].line, 3),
            other => panic!("Expected AddForm, got {:?}", other),
        }
    }
}
