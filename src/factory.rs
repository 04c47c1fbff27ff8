//! Mark classification
//!
//! Turns the content between a tag pair into a [`MarkKind`]. The tag family
//! picks the catalog section; fixed prefixes and suffixes pick the variant:
//!
//! ```text
//! $script(input)[*]      script call          ((expr))        expression
//! ?name:text             conditional          name*           required
//! name|default           literal default      name:((check))  checked
//! ```
//!
//! Replace marks live inside a source comment and wrap a placeholder:
//! `/*{+name*/placeholder/*+}*/`.

use crate::error::MarkupError;
use crate::grammar::{TagFamily, TagPair};
use crate::mark::{Flavor, Mark, MarkKind, VarRef};
use crate::parser::ParseState;
use crate::script::ScriptCall;
use crate::value::Value;

/// Where a mark sits, for error reporting
struct Site<'a> {
    text: &'a str,
    line: usize,
}

impl Site<'_> {
    fn unknown(&self) -> MarkupError {
        MarkupError::UnknownMark {
            text: self.text.to_string(),
            line: self.line,
        }
    }

    fn contract(&self, message: &str) -> MarkupError {
        MarkupError::Contract {
            text: self.text.to_string(),
            line: self.line,
            message: message.to_string(),
        }
    }
}

/// `((expr))` → `expr`
fn expression(content: &str) -> Option<&str> {
    let inner = content.strip_prefix("((")?.strip_suffix("))")?.trim();
    (!inner.is_empty()).then_some(inner)
}

/// `((expr)):rest` → (`expr`, `rest`)
fn guarded(content: &str) -> Option<(&str, &str)> {
    let after = content.strip_prefix("((")?;
    let idx = after.find(")):")?;
    Some((after[..idx].trim(), &after[idx + 3..]))
}

/// Drop the `*/ ... /*` envelope around text wrapped inside a comment
fn strip_comment_envelope(wrapped: &str) -> &str {
    let wrapped = wrapped.strip_prefix("*/").unwrap_or(wrapped);
    wrapped.strip_suffix("/*").unwrap_or(wrapped)
}

impl ParseState<'_, '_> {
    pub(crate) fn classify(
        &mut self,
        tag: &TagPair,
        text: &str,
        content: &str,
        line: usize,
    ) -> Result<Mark, MarkupError> {
        let site = Site { text, line };
        let kind = match tag.family {
            TagFamily::Add => self.add(content, &site)?,
            TagFamily::AddForm => self.add_form(content, &site)?,
            TagFamily::DefineInstance => self.define(Flavor::Instance, content, &site)?,
            TagFamily::DefineStatic => self.define(Flavor::Static, content, &site)?,
            TagFamily::DefineInstanceForm => self.define_form(Flavor::Instance, content, &site)?,
            TagFamily::DefineStaticForm => self.define_form(Flavor::Static, content, &site)?,
            TagFamily::Eval => self.eval(content, &site)?,
            TagFamily::Directive => MarkKind::DirectiveRef {
                name: self.name(content.trim(), &site)?,
            },
            TagFamily::Metadata => {
                let (key, value) = content.split_once(':').ok_or_else(|| site.unknown())?;
                let key = key.trim();
                if key.is_empty() {
                    return Err(site.contract("metadata key is empty"));
                }
                MarkKind::SetMetadata {
                    key: key.to_string(),
                    value: value.trim().to_string(),
                }
            }
            TagFamily::Cut => self.cut(content, tag.comment, &site)?,
            TagFamily::CutComment => MarkKind::CutComment {
                wrapped: content.to_string(),
            },
            TagFamily::CutDocComment => MarkKind::CutDocComment {
                wrapped: content.to_string(),
            },
            TagFamily::Replace => self.replace(content, &site)?,
            TagFamily::ReplaceForm => self.replace_form(content, &site)?,
        };
        Ok(Mark::new(text, line, kind))
    }

    fn name(&self, name: &str, site: &Site) -> Result<String, MarkupError> {
        self.compiler
            .audit
            .audit(name)
            .map(str::to_string)
            .map_err(|source| MarkupError::BadName {
                text: site.text.to_string(),
                line: site.line,
                source,
            })
    }

    fn script_call(&self, content: &str, site: &Site) -> Result<ScriptCall, MarkupError> {
        let call = ScriptCall::parse(content).ok_or_else(|| site.unknown())?;
        self.name(&call.name, site)?;
        Ok(call)
    }

    fn identifiers(&self, expression: &str) -> Vec<String> {
        self.context.evaluator().identifiers(expression)
    }

    fn var_ref(&self, content: &str, site: &Site) -> Result<VarRef, MarkupError> {
        let content = content.trim();
        let (content, required) = match content.strip_suffix('*') {
            Some(rest) => (rest.trim_end(), true),
            None => (content, false),
        };
        let (content, default) = match content.split_once('|') {
            Some((name, default)) => (name, Some(default.to_string())),
            None => (content, None),
        };
        if required && default.is_some() {
            return Err(site.contract("a required variable cannot have a default"));
        }
        let (name, check) = match content.split_once(":((") {
            Some((name, rest)) => {
                let check = rest.trim_end().strip_suffix("))").ok_or_else(|| site.unknown())?;
                (name, Some(check.trim().to_string()))
            }
            None => (content, None),
        };
        Ok(VarRef {
            name: self.name(name.trim(), site)?,
            default,
            required,
            check,
        })
    }

    // =========================================================================
    // Families
    // =========================================================================

    fn add(&mut self, content: &str, site: &Site) -> Result<MarkKind, MarkupError> {
        let trimmed = content.trim_start();
        if let Some(rest) = trimmed.strip_prefix('?') {
            if let Some((expression, then)) = guarded(rest) {
                return Ok(MarkKind::AddIfExpression {
                    vars: self.identifiers(expression),
                    expression: expression.to_string(),
                    then: then.to_string(),
                });
            }
            let (guard, then) = rest.split_once(':').ok_or_else(|| site.unknown())?;
            let (name, equals) = match guard.split_once("==") {
                Some((name, literal)) => (name, Some(literal.trim().to_string())),
                None => (guard, None),
            };
            return Ok(MarkKind::AddIfVar {
                name: self.name(name.trim(), site)?,
                equals,
                then: then.to_string(),
            });
        }
        let trimmed = trimmed.trim_end();
        if trimmed.starts_with('$') {
            return Ok(MarkKind::AddScriptResult(self.script_call(trimmed, site)?));
        }
        if let Some(expression) = expression(trimmed) {
            return Ok(MarkKind::AddExpressionResult {
                vars: self.identifiers(expression),
                expression: expression.to_string(),
            });
        }
        Ok(MarkKind::AddVar(self.var_ref(trimmed, site)?))
    }

    fn add_form(&mut self, content: &str, site: &Site) -> Result<MarkKind, MarkupError> {
        let trimmed = content.trim_start();
        if let Some(rest) = trimmed.strip_prefix('?') {
            let (name, body) = rest.split_once(':').ok_or_else(|| site.unknown())?;
            let name = self.name(name.trim(), site)?;
            let form = self.form(None, body, site.line)?;
            return Ok(MarkKind::AddFormIfVar { name, form });
        }
        let (name, body) = trimmed.split_once(':').ok_or_else(|| site.unknown())?;
        let name = match name.trim() {
            "" => None,
            name => Some(self.name(name, site)?),
        };
        Ok(MarkKind::AddForm(self.form(name, body, site.line)?))
    }

    fn define(
        &mut self,
        flavor: Flavor,
        content: &str,
        site: &Site,
    ) -> Result<MarkKind, MarkupError> {
        let (name, value) = content.split_once(':').ok_or_else(|| site.unknown())?;
        let name = self.name(name.trim(), site)?;
        let value = value.trim();
        if let Some(expression) = expression(value) {
            return Ok(MarkKind::DefineVarAsExpressionResult {
                flavor,
                name,
                expression: expression.to_string(),
                vars: self.identifiers(expression),
            });
        }
        if value.starts_with('$') {
            return Ok(MarkKind::DefineVarAsScriptResult {
                flavor,
                name,
                call: self.script_call(value, site)?,
            });
        }
        let value = match value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            Some("") => Value::List(Vec::new()),
            Some(items) => Value::List(items.split(',').map(|i| Value::from(i.trim())).collect()),
            None => Value::from(value),
        };
        Ok(MarkKind::DefineVar { flavor, name, value })
    }

    fn define_form(
        &mut self,
        flavor: Flavor,
        content: &str,
        site: &Site,
    ) -> Result<MarkKind, MarkupError> {
        let (name, body) = content.split_once(':').ok_or_else(|| site.unknown())?;
        let name = self.name(name.trim(), site)?;
        let form = self.form(Some(name.clone()), body, site.line)?;
        Ok(MarkKind::DefineVarAsForm { flavor, name, form })
    }

    fn eval(&mut self, content: &str, site: &Site) -> Result<MarkKind, MarkupError> {
        let trimmed = content.trim();
        if let Some(expression) = expression(trimmed) {
            return Ok(MarkKind::EvalExpression {
                expression: expression.to_string(),
                vars: self.identifiers(expression),
            });
        }
        Ok(MarkKind::EvalScript(self.script_call(trimmed, site)?))
    }

    fn cut(&mut self, content: &str, comment: bool, site: &Site) -> Result<MarkKind, MarkupError> {
        let (guard, wrapped) = match content.strip_prefix('?') {
            Some(rest) => {
                let (expression, wrapped) = guarded(rest).ok_or_else(|| site.unknown())?;
                (Some(expression), wrapped)
            }
            None => (None, content),
        };
        let wrapped = if comment {
            strip_comment_envelope(wrapped)
        } else {
            wrapped
        }
        .to_string();
        Ok(match guard {
            Some(expression) => MarkKind::CutIfExpression {
                vars: self.identifiers(expression),
                expression: expression.to_string(),
                wrapped,
            },
            None => MarkKind::Cut { wrapped },
        })
    }

    /// `head*/wrapped/*`
    fn replace(&mut self, content: &str, site: &Site) -> Result<MarkKind, MarkupError> {
        let (head, wrapped) = split_replacement(content, site)?;
        let head = head.trim();
        if head.starts_with('$') {
            return Ok(MarkKind::ReplaceWithScriptResult {
                call: self.script_call(head, site)?,
                wrapped,
            });
        }
        if let Some(expression) = expression(head) {
            return Ok(MarkKind::ReplaceWithExpressionResult {
                vars: self.identifiers(expression),
                expression: expression.to_string(),
                wrapped,
            });
        }
        Ok(MarkKind::ReplaceWithVar {
            var: self.var_ref(head, site)?,
            wrapped,
        })
    }

    fn replace_form(&mut self, content: &str, site: &Site) -> Result<MarkKind, MarkupError> {
        let (head, wrapped) = split_replacement(content, site)?;
        let (name, body) = head.trim_start().split_once(':').ok_or_else(|| site.unknown())?;
        let name = match name.trim() {
            "" => None,
            name => Some(self.name(name, site)?),
        };
        Ok(MarkKind::ReplaceWithForm {
            form: self.form(name, body, site.line)?,
            wrapped,
        })
    }
}

fn split_replacement<'a>(content: &'a str, site: &Site) -> Result<(&'a str, String), MarkupError> {
    let (head, rest) = content
        .split_once("*/")
        .ok_or_else(|| site.contract("expected '*/' after the replacement"))?;
    let wrapped = rest
        .strip_suffix("/*")
        .ok_or_else(|| site.contract("expected '/*' before the closing tag"))?;
    Ok((head, wrapped.to_string()))
}

#[cfg(test)]
mod tests {
    use crate::error::{MarkupError, NameError};
    use crate::mark::{Flavor, MarkKind, VarRef};
    use crate::parser::Compiler;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn kind(markup: &str) -> MarkKind {
        Compiler::code_ml()
            .compile_str(markup)
            .unwrap()
            .marks()[0]
            .kind
            .clone()
    }

    fn var(markup: &str) -> VarRef {
        match kind(markup) {
            MarkKind::AddVar(v) => v,
            other => panic!("Expected AddVar, got {:?}", other),
        }
    }

    #[test]
    fn test_var_shapes() {
        assert_eq!(var("{+name+}"), VarRef::named("name"));
        assert!(var("{+name*+}").required);
        assert_eq!(var("{+name|anon+}").default.as_deref(), Some("anon"));
        assert_eq!(
            var("{+age:((age >= 0))+}").check.as_deref(),
            Some("age >= 0")
        );
    }

    #[test]
    fn test_required_with_default_is_contract_error() {
        let err = Compiler::bind_ml().compile_str("{+name|x*+}").unwrap_err();
        assert!(matches!(err, MarkupError::Contract { line: 1, .. }));
    }

    #[test]
    fn test_bad_names() {
        let err = Compiler::bind_ml().compile_str("\n{+9lives+}").unwrap_err();
        match err {
            MarkupError::BadName { line, source, .. } => {
                assert_eq!(line, 2);
                assert!(matches!(source, NameError::BadStart { .. }));
            }
            other => panic!("Expected BadName, got {:?}", other),
        }
        assert!(Compiler::bind_ml().compile_str("{+null+}").is_err());
    }

    #[test]
    fn test_script_and_expression() {
        match kind("{+$quote(name)*+}") {
            MarkKind::AddScriptResult(call) => {
                assert_eq!(call.name, "quote");
                assert!(call.required);
            }
            other => panic!("Expected AddScriptResult, got {:?}", other),
        }
        match kind("{+((a + b))+}") {
            MarkKind::AddExpressionResult { expression, vars } => {
                assert_eq!(expression, "a + b");
                assert_eq!(vars, vec!["a", "b"]);
            }
            other => panic!("Expected AddExpressionResult, got {:?}", other),
        }
    }

    #[test]
    fn test_conditionals() {
        match kind("{+?kind==final:final +}") {
            MarkKind::AddIfVar { name, equals, then } => {
                assert_eq!(name, "kind");
                assert_eq!(equals.as_deref(), Some("final"));
                assert_eq!(then, "final ");
            }
            other => panic!("Expected AddIfVar, got {:?}", other),
        }
        match kind("{+?((n > (1))):many+}") {
            MarkKind::AddIfExpression {
                expression, then, ..
            } => {
                assert_eq!(expression, "n > (1)");
                assert_eq!(then, "many");
            }
            other => panic!("Expected AddIfExpression, got {:?}", other),
        }
    }

    #[test]
    fn test_defines() {
        match kind("{#names:[a, b]#}") {
            MarkKind::DefineVar {
                flavor: Flavor::Instance,
                name,
                value,
            } => {
                assert_eq!(name, "names");
                assert_eq!(value, Value::from(vec!["a", "b"]));
            }
            other => panic!("Expected DefineVar, got {:?}", other),
        }
        assert!(matches!(
            kind("{##total:((1 + 2))##}"),
            MarkKind::DefineVarAsExpressionResult {
                flavor: Flavor::Static,
                ..
            }
        ));
        assert!(matches!(
            kind("{#id:$lower(NAME)#}"),
            MarkKind::DefineVarAsScriptResult { .. }
        ));
        assert!(matches!(
            kind("{{#row:{+a+}#}}"),
            MarkKind::DefineVarAsForm { ref name, .. } if name == "row"
        ));
    }

    #[test]
    fn test_replace_marks() {
        match kind("int x = /*{+value|0*/42/*+}*/;") {
            MarkKind::ReplaceWithVar { var, wrapped } => {
                assert_eq!(var.name, "value");
                assert_eq!(var.default.as_deref(), Some("0"));
                assert_eq!(wrapped, "42");
            }
            other => panic!("Expected ReplaceWithVar, got {:?}", other),
        }
        match kind("/*{{+:{+f+}, *//* fields *//*+}}*/") {
            MarkKind::ReplaceWithForm { wrapped, .. } => {
                assert_eq!(wrapped, "/* fields */")
            }
            other => panic!("Expected ReplaceWithForm, got {:?}", other),
        }
        let err = Compiler::code_ml()
            .compile_str("/*{+value+}*/")
            .unwrap_err();
        assert!(matches!(err, MarkupError::Contract { .. }));
    }

    #[test]
    fn test_cuts() {
        assert!(matches!(
            kind("/*-note-*/"),
            MarkKind::CutComment { ref wrapped } if wrapped == "note"
        ));
        assert!(matches!(
            kind("/*{-*/debug();/*-}*/"),
            MarkKind::Cut { ref wrapped } if wrapped == "debug();"
        ));
        assert!(matches!(
            kind("{-?((debug)):trace();-}"),
            MarkKind::CutIfExpression { ref wrapped, .. } if wrapped == "trace();"
        ));
    }

    #[test]
    fn test_unknown_marks() {
        for markup in ["{$nothing$}", "{@novalue@}", "{{+body+}}"] {
            let err = Compiler::bind_ml().compile_str(markup).unwrap_err();
            assert!(
                matches!(err, MarkupError::UnknownMark { .. } | MarkupError::BadName { .. }),
                "{} gave {:?}",
                markup,
                err
            );
        }
    }
}
