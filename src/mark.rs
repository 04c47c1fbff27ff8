//! Mark model
//!
//! Every directive found in markup becomes a [`Mark`]: its exact source text,
//! the line it starts on, and one [`MarkKind`] from a closed catalog. The
//! capabilities a kind has are answered by exhaustive matches
//! ([`Mark::fills_blank`], [`Mark::is_static`], [`Mark::declared_vars`]), so
//! adding a kind forces every dispatch site to decide what to do with it.
//!
//! ```text
//! {+name+}            AddVar                  {#name:value#}      DefineVar (instance)
//! {+$quote(name)+}    AddScriptResult         {##name:value##}    DefineVar (static)
//! {+((a + b))+}       AddExpressionResult     {{#name:body#}}     DefineVarAsForm
//! {+?name:text+}      AddIfVar                {$((a = 1))$}       EvalExpression
//! {{+:body+}}         AddForm                 {$$directive$$}     DirectiveRef
//! {-text-}            Cut                     {@key:value@}       SetMetadata
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::context::{Context, Scope};
use crate::error::TailorError;
use crate::form::Form;
use crate::script::ScriptCall;
use crate::value::Value;

/// Whether a define mark binds once at compile time or on every render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flavor {
    Static,
    Instance,
}

/// A variable reference as written in a mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarRef {
    pub name: String,
    pub default: Option<String>,
    pub required: bool,
    /// Expression that must hold for a bound value
    pub check: Option<String>,
}

impl VarRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
            required: false,
            check: None,
        }
    }
}

/// A variable name a mark reads, as seen by the form engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarDecl {
    pub name: String,
    pub required: bool,
}

impl VarDecl {
    fn optional(name: &str) -> Self {
        Self {
            name: name.to_string(),
            required: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MarkKind {
    AddVar(VarRef),
    AddIfVar {
        name: String,
        equals: Option<String>,
        then: String,
    },
    AddIfExpression {
        expression: String,
        then: String,
        vars: Vec<String>,
    },
    AddScriptResult(ScriptCall),
    AddExpressionResult {
        expression: String,
        vars: Vec<String>,
    },
    AddForm(Arc<Form>),
    AddFormIfVar {
        name: String,
        form: Arc<Form>,
    },
    DefineVar {
        flavor: Flavor,
        name: String,
        value: Value,
    },
    DefineVarAsScriptResult {
        flavor: Flavor,
        name: String,
        call: ScriptCall,
    },
    DefineVarAsExpressionResult {
        flavor: Flavor,
        name: String,
        expression: String,
        vars: Vec<String>,
    },
    DefineVarAsForm {
        flavor: Flavor,
        name: String,
        form: Arc<Form>,
    },
    ReplaceWithVar {
        var: VarRef,
        wrapped: String,
    },
    ReplaceWithScriptResult {
        call: ScriptCall,
        wrapped: String,
    },
    ReplaceWithExpressionResult {
        expression: String,
        vars: Vec<String>,
        wrapped: String,
    },
    ReplaceWithForm {
        form: Arc<Form>,
        wrapped: String,
    },
    Cut {
        wrapped: String,
    },
    CutComment {
        wrapped: String,
    },
    CutDocComment {
        wrapped: String,
    },
    /// Keeps its wrapped text only when the expression is false
    CutIfExpression {
        expression: String,
        vars: Vec<String>,
        wrapped: String,
    },
    SetMetadata {
        key: String,
        value: String,
    },
    DirectiveRef {
        name: String,
    },
    EvalScript(ScriptCall),
    EvalExpression {
        expression: String,
        vars: Vec<String>,
    },
}

/// One parsed directive
#[derive(Debug, Clone)]
pub struct Mark {
    /// Exact source text, open and close literals included
    pub text: String,
    /// 1-based line the mark starts on
    pub line: usize,
    pub kind: MarkKind,
}

impl Mark {
    pub fn new(text: impl Into<String>, line: usize, kind: MarkKind) -> Self {
        Self {
            text: text.into(),
            line,
            kind,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            MarkKind::AddVar(_) => "add-var",
            MarkKind::AddIfVar { .. } => "add-if-var",
            MarkKind::AddIfExpression { .. } => "add-if-expression",
            MarkKind::AddScriptResult(_) => "add-script-result",
            MarkKind::AddExpressionResult { .. } => "add-expression-result",
            MarkKind::AddForm(_) => "add-form",
            MarkKind::AddFormIfVar { .. } => "add-form-if-var",
            MarkKind::DefineVar { .. } => "define-var",
            MarkKind::DefineVarAsScriptResult { .. } => "define-var-as-script-result",
            MarkKind::DefineVarAsExpressionResult { .. } => "define-var-as-expression-result",
            MarkKind::DefineVarAsForm { .. } => "define-var-as-form",
            MarkKind::ReplaceWithVar { .. } => "replace-with-var",
            MarkKind::ReplaceWithScriptResult { .. } => "replace-with-script-result",
            MarkKind::ReplaceWithExpressionResult { .. } => "replace-with-expression-result",
            MarkKind::ReplaceWithForm { .. } => "replace-with-form",
            MarkKind::Cut { .. } => "cut",
            MarkKind::CutComment { .. } => "cut-comment",
            MarkKind::CutDocComment { .. } => "cut-doc-comment",
            MarkKind::CutIfExpression { .. } => "cut-if-expression",
            MarkKind::SetMetadata { .. } => "set-metadata",
            MarkKind::DirectiveRef { .. } => "directive",
            MarkKind::EvalScript(_) => "eval-script",
            MarkKind::EvalExpression { .. } => "eval-expression",
        }
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Whether the mark reserves a blank in the template.
    ///
    /// Instance defines and eval marks fill their blank with nothing, which
    /// is what runs their side effects in document order during a render.
    pub fn fills_blank(&self) -> bool {
        match &self.kind {
            MarkKind::AddVar(_)
            | MarkKind::AddIfVar { .. }
            | MarkKind::AddIfExpression { .. }
            | MarkKind::AddScriptResult(_)
            | MarkKind::AddExpressionResult { .. }
            | MarkKind::AddForm(_)
            | MarkKind::AddFormIfVar { .. }
            | MarkKind::ReplaceWithVar { .. }
            | MarkKind::ReplaceWithScriptResult { .. }
            | MarkKind::ReplaceWithExpressionResult { .. }
            | MarkKind::ReplaceWithForm { .. }
            | MarkKind::CutIfExpression { .. }
            | MarkKind::EvalScript(_)
            | MarkKind::EvalExpression { .. } => true,
            MarkKind::DefineVar { flavor, .. }
            | MarkKind::DefineVarAsScriptResult { flavor, .. }
            | MarkKind::DefineVarAsExpressionResult { flavor, .. }
            | MarkKind::DefineVarAsForm { flavor, .. } => *flavor == Flavor::Instance,
            MarkKind::Cut { .. }
            | MarkKind::CutComment { .. }
            | MarkKind::CutDocComment { .. }
            | MarkKind::SetMetadata { .. }
            | MarkKind::DirectiveRef { .. } => false,
        }
    }

    /// Whether the mark binds at compile time
    pub fn is_static(&self) -> bool {
        match &self.kind {
            MarkKind::DefineVar { flavor, .. }
            | MarkKind::DefineVarAsScriptResult { flavor, .. }
            | MarkKind::DefineVarAsExpressionResult { flavor, .. }
            | MarkKind::DefineVarAsForm { flavor, .. } => *flavor == Flavor::Static,
            _ => false,
        }
    }

    /// Whether registering the mark changes the parser's bindings or metadata
    pub fn mutates_parse_state(&self) -> bool {
        self.is_static() || matches!(self.kind, MarkKind::SetMetadata { .. })
    }

    /// Text physically wrapped by the mark, kept for inspection
    pub fn wrapped(&self) -> Option<&str> {
        match &self.kind {
            MarkKind::ReplaceWithVar { wrapped, .. }
            | MarkKind::ReplaceWithScriptResult { wrapped, .. }
            | MarkKind::ReplaceWithExpressionResult { wrapped, .. }
            | MarkKind::ReplaceWithForm { wrapped, .. }
            | MarkKind::Cut { wrapped }
            | MarkKind::CutComment { wrapped }
            | MarkKind::CutDocComment { wrapped }
            | MarkKind::CutIfExpression { wrapped, .. } => Some(wrapped),
            _ => None,
        }
    }

    /// Variables this mark reads, for cardinality broadcasting.
    ///
    /// Static defines read nothing at render time and declare nothing.
    pub fn declared_vars(&self) -> Vec<VarDecl> {
        match &self.kind {
            MarkKind::AddVar(var) | MarkKind::ReplaceWithVar { var, .. } => vec![VarDecl {
                name: var.name.clone(),
                required: var.required,
            }],
            MarkKind::AddIfVar { name, .. } | MarkKind::AddFormIfVar { name, .. } => {
                vec![VarDecl::optional(name)]
            }
            MarkKind::AddScriptResult(call)
            | MarkKind::ReplaceWithScriptResult { call, .. }
            | MarkKind::EvalScript(call)
            | MarkKind::DefineVarAsScriptResult {
                flavor: Flavor::Instance,
                call,
                ..
            } => call.input_vars().iter().map(|v| VarDecl::optional(v)).collect(),
            MarkKind::AddIfExpression { vars, .. }
            | MarkKind::AddExpressionResult { vars, .. }
            | MarkKind::ReplaceWithExpressionResult { vars, .. }
            | MarkKind::CutIfExpression { vars, .. }
            | MarkKind::EvalExpression { vars, .. }
            | MarkKind::DefineVarAsExpressionResult {
                flavor: Flavor::Instance,
                vars,
                ..
            } => vars.iter().map(|v| VarDecl::optional(v)).collect(),
            MarkKind::AddForm(_)
            | MarkKind::ReplaceWithForm { .. }
            | MarkKind::DefineVar { .. }
            | MarkKind::DefineVarAsScriptResult { .. }
            | MarkKind::DefineVarAsExpressionResult { .. }
            | MarkKind::DefineVarAsForm { .. }
            | MarkKind::Cut { .. }
            | MarkKind::CutComment { .. }
            | MarkKind::CutDocComment { .. }
            | MarkKind::SetMetadata { .. }
            | MarkKind::DirectiveRef { .. } => Vec::new(),
        }
    }

    // =========================================================================
    // Derivation
    // =========================================================================

    /// Compute the mark's value against the live bindings.
    ///
    /// `None` means the mark contributes no text. Define marks return the
    /// value they would bind without binding it; see [`Mark::bind`].
    pub fn derive(&self, ctx: &mut Context) -> Result<Option<Value>, TailorError> {
        match &self.kind {
            MarkKind::AddVar(var) | MarkKind::ReplaceWithVar { var, .. } => self.derive_var(var, ctx),
            MarkKind::AddIfVar { name, equals, then } => {
                let matched = match ctx.resolve_var(name)? {
                    Some(v) if !v.is_null() => match equals {
                        Some(expected) => v.to_string() == *expected,
                        None => true,
                    },
                    _ => false,
                };
                Ok(matched.then(|| Value::Str(then.clone())))
            }
            MarkKind::AddIfExpression {
                expression, then, ..
            } => Ok(evaluate(ctx, expression)?
                .truthy()
                .then(|| Value::Str(then.clone()))),
            MarkKind::AddScriptResult(call) | MarkKind::ReplaceWithScriptResult { call, .. } => {
                self.derive_script(call, ctx)
            }
            MarkKind::AddExpressionResult { expression, .. }
            | MarkKind::ReplaceWithExpressionResult { expression, .. } => {
                Ok(Some(evaluate(ctx, expression)?).filter(|v| !v.is_null()))
            }
            MarkKind::AddForm(form) | MarkKind::ReplaceWithForm { form, .. } => {
                Ok(Some(Value::Str(form.render(ctx)?)))
            }
            MarkKind::AddFormIfVar { name, form } => match ctx.resolve_var(name)? {
                Some(v) if !v.is_null() => Ok(Some(Value::Str(form.render(ctx)?))),
                _ => Ok(None),
            },
            MarkKind::DefineVar { value, .. } => Ok(Some(value.clone())),
            MarkKind::DefineVarAsScriptResult { call, .. } => {
                Ok(Some(call.invoke(ctx)?).filter(|v| !v.is_null()))
            }
            MarkKind::DefineVarAsExpressionResult { expression, .. } => {
                Ok(Some(evaluate(ctx, expression)?))
            }
            MarkKind::DefineVarAsForm { .. } => Ok(None),
            MarkKind::Cut { .. }
            | MarkKind::CutComment { .. }
            | MarkKind::CutDocComment { .. }
            | MarkKind::SetMetadata { .. }
            | MarkKind::DirectiveRef { .. } => Ok(None),
            MarkKind::CutIfExpression {
                expression,
                wrapped,
                ..
            } => Ok((!evaluate(ctx, expression)?.truthy()).then(|| Value::Str(wrapped.clone()))),
            MarkKind::EvalScript(call) => {
                call.invoke(ctx)?;
                Ok(None)
            }
            MarkKind::EvalExpression { expression, .. } => {
                evaluate(ctx, expression)?;
                Ok(None)
            }
        }
    }

    /// Bind a define mark's value into `scope`. An empty string binds nothing.
    pub fn bind(&self, ctx: &mut Context, scope: Scope) -> Result<(), TailorError> {
        let name = match &self.kind {
            MarkKind::DefineVarAsForm { name, form, .. } => {
                ctx.set_script_in(scope, name, Arc::clone(form) as Arc<dyn crate::script::Script>);
                return Ok(());
            }
            MarkKind::DefineVar { name, .. }
            | MarkKind::DefineVarAsScriptResult { name, .. }
            | MarkKind::DefineVarAsExpressionResult { name, .. } => name,
            _ => return Ok(()),
        };
        match self.derive(ctx)? {
            Some(Value::Str(s)) if s.is_empty() => {}
            Some(value) => {
                ctx.set_in(scope, name.clone(), value);
            }
            None => {}
        }
        Ok(())
    }

    /// Text this mark contributes to its blank during a render
    pub(crate) fn fill(&self, ctx: &mut Context) -> Result<String, TailorError> {
        let result = match &self.kind {
            MarkKind::DefineVar { flavor: Flavor::Instance, .. }
            | MarkKind::DefineVarAsScriptResult { flavor: Flavor::Instance, .. }
            | MarkKind::DefineVarAsExpressionResult { flavor: Flavor::Instance, .. }
            | MarkKind::DefineVarAsForm { flavor: Flavor::Instance, .. } => {
                self.bind(ctx, Scope::Instance).map(|_| String::new())
            }
            _ => self
                .derive(ctx)
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        };
        result.map_err(|e| e.at(&self.text, self.line))
    }

    fn derive_var(&self, var: &VarRef, ctx: &mut Context) -> Result<Option<Value>, TailorError> {
        match ctx.resolve_var(&var.name)? {
            Some(value) if !value.is_null() => {
                if let Some(check) = &var.check {
                    if !evaluate(ctx, check)?.truthy() {
                        return Err(TailorError::Invalid {
                            name: var.name.clone(),
                            value: value.to_string(),
                            expression: check.clone(),
                        });
                    }
                }
                Ok(Some(value))
            }
            _ => match &var.default {
                Some(default) => Ok(Some(Value::Str(default.clone()))),
                None if var.required => Err(TailorError::VarRequired {
                    name: var.name.clone(),
                    text: self.text.clone(),
                    line: self.line,
                }),
                None => Ok(None),
            },
        }
    }

    fn derive_script(
        &self,
        call: &ScriptCall,
        ctx: &mut Context,
    ) -> Result<Option<Value>, TailorError> {
        let value = call.invoke(ctx)?;
        if !value.is_null() {
            return Ok(Some(value));
        }
        if call.required {
            return Err(TailorError::ScriptResultRequired {
                script: call.name.clone(),
                input: call.input.clone(),
                text: self.text.clone(),
                line: self.line,
            });
        }
        Ok(None)
    }
}

fn evaluate(ctx: &mut Context, expression: &str) -> Result<Value, TailorError> {
    let evaluator = ctx.evaluator();
    Ok(evaluator.evaluate(ctx, expression)?)
}
