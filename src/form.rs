//! Forms: repeatable sub-templates
//!
//! A form renders its template once per element of the longest list among
//! the variables its marks read (its cardinality). Each iteration binds the
//! i-th element of every list variable in a fresh loop frame; scalars are
//! visible unchanged to every iteration. Instances are then joined by the
//! form's [`JoinPolicy`].
//!
//! ```text
//! {{+:{+type+} {+name+}; +}}    type = [int, String], name = [x, y]
//!                                => "int x; String y; "
//! ```

use serde::Serialize;
use tracing::debug;

use crate::context::{Context, Scope};
use crate::dom::Template;
use crate::error::{MarkupError, TailorError};
use crate::mark::VarDecl;
use crate::parser::Compiler;
use crate::script::{InputParser, Script};
use crate::value::Value;

/// How rendered instances are combined
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPolicy {
    #[default]
    Concat,
    /// Appended after every instance
    After(String),
    /// Placed between instances
    Between(String),
}

impl JoinPolicy {
    /// Split a trailing `<<sep>>` or `<<+suffix>>` clause off a form body
    pub fn split(body: &str) -> (&str, JoinPolicy) {
        if let Some(inner) = body.strip_suffix(">>") {
            if let Some(idx) = inner.rfind("<<") {
                let clause = &inner[idx + 2..];
                let policy = match clause.strip_prefix('+') {
                    Some(suffix) => JoinPolicy::After(suffix.to_string()),
                    None => JoinPolicy::Between(clause.to_string()),
                };
                return (&inner[..idx], policy);
            }
        }
        (body, JoinPolicy::Concat)
    }

    pub fn join(&self, instances: Vec<String>) -> String {
        match self {
            JoinPolicy::Concat => instances.concat(),
            JoinPolicy::Between(sep) => instances.join(sep),
            JoinPolicy::After(suffix) => instances
                .into_iter()
                .flat_map(|i| [i, suffix.clone()])
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Form {
    name: Option<String>,
    template: Template,
    vars: Vec<VarDecl>,
    join: JoinPolicy,
}

impl Form {
    pub fn new(name: Option<String>, template: Template, join: JoinPolicy) -> Self {
        let mut vars: Vec<VarDecl> = Vec::new();
        for decl in template.marks().iter().flat_map(|m| m.declared_vars()) {
            match vars.iter_mut().find(|v| v.name == decl.name) {
                Some(existing) => existing.required |= decl.required,
                None => vars.push(decl),
            }
        }
        Self {
            name,
            template,
            vars,
            join,
        }
    }

    /// Compile an anonymous form from plain markup
    pub fn inline(body: &str) -> Result<Self, MarkupError> {
        Compiler::default().compile_form(body)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Variables the form's marks read, first occurrence order
    pub fn vars(&self) -> &[VarDecl] {
        &self.vars
    }

    pub fn join_policy(&self) -> &JoinPolicy {
        &self.join
    }

    pub fn render(&self, ctx: &mut Context) -> Result<String, TailorError> {
        let mut bound = Vec::with_capacity(self.vars.len());
        let mut cardinality: Option<usize> = None;
        for var in &self.vars {
            let value = ctx.resolve_var(&var.name)?.filter(|v| !v.is_null());
            let len = match &value {
                Some(Value::List(items)) => items.len(),
                Some(_) => 1,
                None if var.required => {
                    return Err(TailorError::RequiredVarMissing {
                        name: var.name.clone(),
                        form: self.name.clone(),
                    })
                }
                None => continue,
            };
            cardinality = Some(cardinality.map_or(len, |c| c.max(len)));
            if let Some(Value::List(items)) = value {
                bound.push((var, items));
            }
        }
        let cardinality = match cardinality {
            Some(n) => n,
            None if self.vars.is_empty() => 1,
            None => 0,
        };
        debug!(form = ?self.name, cardinality, "rendering form");

        let mut instances = Vec::with_capacity(cardinality);
        for index in 0..cardinality {
            ctx.push_loop();
            let rendered = match self.bind_element(ctx, &bound, index, cardinality) {
                Ok(()) => self.template.fill(ctx),
                Err(e) => Err(e),
            };
            ctx.pop_loop();
            instances.push(rendered?);
        }
        Ok(self.join.join(instances))
    }

    fn bind_element(
        &self,
        ctx: &mut Context,
        bound: &[(&VarDecl, Vec<Value>)],
        index: usize,
        cardinality: usize,
    ) -> Result<(), TailorError> {
        for (var, items) in bound {
            match items.get(index) {
                Some(item) => {
                    ctx.set_in(Scope::Loop, var.name.clone(), item.clone());
                }
                None if var.required => {
                    return Err(TailorError::CardinalityMismatch {
                        name: var.name.clone(),
                        form: self.name.clone(),
                        len: items.len(),
                        cardinality,
                        index,
                    })
                }
                None => {
                    ctx.set_in(Scope::Loop, var.name.clone(), "");
                }
            }
        }
        Ok(())
    }
}

impl Script for Form {
    fn input_parser(&self) -> InputParser {
        InputParser::Ignore
    }

    fn eval(&self, context: &mut Context, _input: Value) -> Result<Value, TailorError> {
        Ok(Value::Str(self.render(context)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn form(body: &str) -> Form {
        Form::inline(body).unwrap()
    }

    fn var_names(form: &Form) -> Vec<&str> {
        form.vars().iter().map(|v| v.name.as_str()).collect()
    }

    #[test]
    fn test_vars_cover_every_render_time_mark() {
        assert_eq!(var_names(&form("{+$firstCap($lower(name))+}")), vec!["name"]);
        assert_eq!(var_names(&form("{#up:$upper(name)#}{+up+}")), vec!["name", "up"]);
        assert_eq!(var_names(&form("{#sum:((a + b))#}")), vec!["a", "b"]);
        assert_eq!(var_names(&form("{$((total = n * 2))$}")), vec!["n"]);
        assert_eq!(var_names(&form("{$log(item)$}")), vec!["item"]);
        assert!(form("{##fixed:((1 + 2))##}").vars().is_empty());
    }

    #[test]
    fn test_broadcast_over_lists() {
        let mut ctx = Context::new()
            .with("type", vec!["int", "String"])
            .with("name", vec!["x", "y"]);
        assert_eq!(
            form("{+type+} {+name+}; ").render(&mut ctx).unwrap(),
            "int x; String y; "
        );
    }

    #[test]
    fn test_scalar_is_repeated() {
        let mut ctx = Context::new()
            .with("prefix", "get")
            .with("field", vec!["a", "b", "c"]);
        assert_eq!(
            form("{+prefix+}_{+field+}<<, >>").render(&mut ctx).unwrap(),
            "get_a, get_b, get_c"
        );
    }

    #[test]
    fn test_short_optional_list_renders_blank() {
        let mut ctx = Context::new()
            .with("a", vec!["1", "2"])
            .with("b", vec!["x"]);
        assert_eq!(
            form("{+a+}{+b+}<<+;>>").render(&mut ctx).unwrap(),
            "1x;2;"
        );
    }

    #[test]
    fn test_short_required_list_fails() {
        let mut ctx = Context::new()
            .with("a", vec!["1", "2"])
            .with("b", vec!["x"]);
        let err = form("{+a+}{+b*+}").render(&mut ctx).unwrap_err();
        match err.root() {
            TailorError::CardinalityMismatch {
                name,
                len,
                cardinality,
                index,
                ..
            } => {
                assert_eq!(name, "b");
                assert_eq!((*len, *cardinality, *index), (1, 2, 1));
            }
            other => panic!("Expected CardinalityMismatch, got {:?}", other),
        }
        assert!(ctx.scope(Scope::Loop).is_none());
    }

    #[test]
    fn test_required_missing() {
        let mut ctx = Context::new();
        let err = form("{+a*+}").render(&mut ctx).unwrap_err();
        assert!(matches!(err, TailorError::RequiredVarMissing { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_vacuous_cardinality() {
        let mut ctx = Context::new();
        assert_eq!(form("static").render(&mut ctx).unwrap(), "static");
        assert_eq!(form("[{+missing+}]").render(&mut ctx).unwrap(), "");
        ctx.set("empty", Value::List(vec![]));
        assert_eq!(form("[{+empty+}]").render(&mut ctx).unwrap(), "");
    }

    #[test]
    fn test_loop_bindings_do_not_leak() {
        let mut ctx = Context::new().with("n", vec![1, 2, 3]);
        assert_eq!(form("{+((n * 2))+}").render(&mut ctx).unwrap(), "246");
        assert!(ctx.scope(Scope::Loop).is_none());
        assert_eq!(ctx.get("n"), Some(&Value::from(vec![1, 2, 3])));
    }

    #[test]
    fn test_join_clause() {
        assert_eq!(JoinPolicy::split("a<<, >>"), ("a", JoinPolicy::Between(", ".to_string())));
        assert_eq!(JoinPolicy::split("a<<+;\n>>"), ("a", JoinPolicy::After(";\n".to_string())));
        assert_eq!(JoinPolicy::split("List<List<X>>"), ("List<List<X>>", JoinPolicy::Concat));
    }
}
