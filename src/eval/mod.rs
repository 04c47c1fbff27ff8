//! Expression evaluation port
//!
//! Marks never interpret expressions themselves: they hand the raw text to an
//! [`ExpressionEvaluator`] together with the live [`Context`]. The crate ships
//! [`DefaultEvaluator`], a small nom-based language, but any evaluator that
//! can answer "is this name defined" and read/write bindings can be plugged in.

mod interp;
pub mod parser;

use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::context::Context;
use crate::error::{EvalError, TailorError};
use crate::value::Value;

pub use parser::{parse_expression, Expr};

/// Evaluates boolean and value expressions over live bindings
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, context: &mut Context, expression: &str) -> Result<Value, EvalError>;

    /// Whether `name` is bound, including names bound to null
    fn is_defined(&self, context: &Context, name: &str) -> bool {
        context.is_defined(name)
    }

    /// Names an expression reads; used to broadcast expression marks in forms
    fn identifiers(&self, _expression: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Resolves the value of a variable mark's name
pub trait VarResolver: Send + Sync {
    fn resolve(&self, context: &mut Context, name: &str) -> Result<Option<Value>, TailorError>;
}

/// Asks the context's evaluator whether a name is defined, then reads it
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluatorVarResolver;

impl VarResolver for EvaluatorVarResolver {
    fn resolve(&self, context: &mut Context, name: &str) -> Result<Option<Value>, TailorError> {
        let evaluator = context.evaluator();
        if !evaluator.is_defined(context, name) {
            return Ok(None);
        }
        Ok(Some(evaluator.evaluate(context, name)?))
    }
}

/// The built-in expression language
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl ExpressionEvaluator for DefaultEvaluator {
    fn evaluate(&self, context: &mut Context, expression: &str) -> Result<Value, EvalError> {
        let expr = parse_expression(expression)?;
        interp::evaluate(&expr, context)
    }

    fn identifiers(&self, expression: &str) -> Vec<String> {
        parse_expression(expression)
            .map(|e| e.identifiers())
            .unwrap_or_default()
    }
}

static SHARED: Lazy<Arc<DefaultEvaluator>> = Lazy::new(|| {
    debug!("initializing shared expression evaluator");
    Arc::new(DefaultEvaluator)
});

/// Process-wide evaluator, created at most once on first use
pub fn shared_evaluator() -> Arc<dyn ExpressionEvaluator> {
    SHARED.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_evaluator_is_single_instance() {
        let a = shared_evaluator();
        let b = shared_evaluator();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_var_resolver_distinguishes_null_from_absent() {
        let mut ctx = Context::new();
        assert_eq!(EvaluatorVarResolver.resolve(&mut ctx, "x").unwrap(), None);
        ctx.set("x", Value::Null);
        assert_eq!(
            EvaluatorVarResolver.resolve(&mut ctx, "x").unwrap(),
            Some(Value::Null)
        );
    }

    #[test]
    fn test_identifiers_of_invalid_expression_are_empty() {
        assert!(DefaultEvaluator.identifiers("(a +").is_empty());
        assert_eq!(DefaultEvaluator.identifiers("a + b"), vec!["a", "b"]);
    }
}
