//! Scripts: named callables invoked by script-result marks
//!
//! A script is resolved in two tiers: first from the bindings of the live
//! [`Context`] (`$name` keys, which is also where defined forms live), then
//! from the context's [`ScriptResolver`], a host-populated registry. There is
//! no discovery by type name; hosts register what they want callable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::context::Context;
use crate::error::TailorError;
use crate::form::Form;
use crate::value::Value;

/// How the raw text between a script's parentheses becomes its input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputParser {
    /// Input is always null
    Ignore,
    /// Input is the raw text
    Raw,
    /// Input is the value of the variable named by the text (null if unbound)
    VarName,
    /// A nested `$script(input)` call is evaluated first, otherwise as `VarName`
    Chained,
    /// Nested call, else inline form, else bound variable, else the literal text
    #[default]
    Smart,
}

/// An invokable script
pub trait Script: Send + Sync {
    fn input_parser(&self) -> InputParser {
        InputParser::Smart
    }

    fn eval(&self, context: &mut Context, input: Value) -> Result<Value, TailorError>;
}

/// Host fallback consulted when a script is not bound in the context
pub trait ScriptResolver: Send + Sync {
    fn resolve(&self, context: &Context, name: &str, input: &str) -> Option<Arc<dyn Script>>;
}

/// Explicit name → script registry
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    scripts: HashMap<String, Arc<dyn Script>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, script: Arc<dyn Script>) -> &mut Self {
        self.scripts.insert(name.into(), script);
        self
    }

}

impl ScriptResolver for ScriptRegistry {
    fn resolve(&self, _context: &Context, name: &str, _input: &str) -> Option<Arc<dyn Script>> {
        self.scripts.get(name).cloned()
    }
}

impl fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.scripts.keys().collect();
        names.sort();
        f.debug_struct("ScriptRegistry")
            .field("scripts", &names)
            .finish()
    }
}

/// Adapter turning a closure into a [`Script`]
pub struct FnScript<F> {
    parser: InputParser,
    f: F,
}

impl<F> Script for FnScript<F>
where
    F: Fn(&mut Context, Value) -> Result<Value, TailorError> + Send + Sync,
{
    fn input_parser(&self) -> InputParser {
        self.parser
    }

    fn eval(&self, context: &mut Context, input: Value) -> Result<Value, TailorError> {
        (self.f)(context, input)
    }
}

/// Wrap a closure as a shareable script
pub fn script_fn<F>(parser: InputParser, f: F) -> Arc<dyn Script>
where
    F: Fn(&mut Context, Value) -> Result<Value, TailorError> + Send + Sync + 'static,
{
    Arc::new(FnScript { parser, f })
}

/// Context bindings first, then the host resolver
pub fn resolve(context: &Context, name: &str, input: &str) -> Option<Arc<dyn Script>> {
    context
        .get_script(name)
        .or_else(|| context.resolver().resolve(context, name, input))
}

/// A `$name(input)` invocation as written in a mark
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptCall {
    pub name: String,
    pub input: String,
    pub required: bool,
}

impl ScriptCall {
    /// Parse `$name(input)` or `$name(input)*`; the leading `$` is optional
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix('$').unwrap_or(text);
        let (body, required) = match text.strip_suffix('*') {
            Some(body) if body.ends_with(')') => (body, true),
            _ => (text, false),
        };
        let open = body.find('(')?;
        let input = body[open + 1..].strip_suffix(')')?;
        let name = body[..open].trim();
        if name.is_empty()
            || !name.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            input: input.to_string(),
            required,
        })
    }

    /// Resolve, parse the input per the script's strategy, and invoke.
    ///
    /// Failures of host-resolved scripts are reported as
    /// [`TailorError::Script`] naming the script.
    pub fn invoke(&self, context: &mut Context) -> Result<Value, TailorError> {
        let hosted = context.get_script(&self.name).is_none();
        let script = resolve(context, &self.name, &self.input).ok_or_else(|| {
            TailorError::ScriptNotFound {
                name: self.name.clone(),
            }
        })?;
        let input = parse_input(script.input_parser(), &self.input, context)?;
        trace!(script = %self.name, input = ?input, hosted, "invoking script");
        let result = script.eval(context, input);
        if !hosted {
            return result;
        }
        result.map_err(|e| match e {
            TailorError::Script { .. } => e,
            other => TailorError::script(self.name.as_str(), other),
        })
    }

    /// Variables the input reads: a bare identifier, or those of a nested
    /// `$call(...)` chain
    pub fn input_vars(&self) -> Vec<String> {
        let input = self.input.trim();
        if input.starts_with('$') {
            return Self::parse(input)
                .map(|nested| nested.input_vars())
                .unwrap_or_default();
        }
        let mut chars = input.chars();
        match chars.next() {
            Some(c) if c.is_alphabetic() || c == '_' => {}
            _ => return Vec::new(),
        }
        if chars.all(|c| c.is_alphanumeric() || c == '_') {
            vec![input.to_string()]
        } else {
            Vec::new()
        }
    }
}

/// Turn raw script input into a value according to `parser`
pub fn parse_input(
    parser: InputParser,
    raw: &str,
    context: &mut Context,
) -> Result<Value, TailorError> {
    let trimmed = raw.trim();
    match parser {
        InputParser::Ignore => Ok(Value::Null),
        InputParser::Raw => Ok(Value::Str(raw.to_string())),
        InputParser::VarName => Ok(context.resolve_var(trimmed)?.unwrap_or_default()),
        InputParser::Chained => match ScriptCall::parse(trimmed).filter(|_| trimmed.starts_with('$')) {
            Some(call) => call.invoke(context),
            None => Ok(context.resolve_var(trimmed)?.unwrap_or_default()),
        },
        InputParser::Smart => {
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            if trimmed.starts_with('$') {
                if let Some(call) = ScriptCall::parse(trimmed) {
                    return call.invoke(context);
                }
            }
            if trimmed.contains('{') {
                if let Ok(form) = Form::inline(raw) {
                    return Ok(Value::Str(form.render(context)?));
                }
            }
            if let Some(value) = context.resolve_var(trimmed)? {
                return Ok(value);
            }
            Ok(Value::Str(raw.to_string()))
        }
    }
}

// ============================================================================
// Core library
// ============================================================================

fn map_text(input: &Value, f: impl Fn(&str) -> String) -> Value {
    input.map_each(|v| match v {
        Value::Null => Value::Null,
        other => Value::Str(f(&other.to_string())),
    })
}

fn first_char(s: &str, f: impl Fn(char) -> String) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => f(c) + chars.as_str(),
        None => String::new(),
    }
}

/// Scripts preloaded into the core-library scope of every new context
pub fn core_library() -> Vec<(&'static str, Arc<dyn Script>)> {
    vec![
        (
            "count",
            script_fn(InputParser::Smart, |_, input| {
                Ok(Value::Int(match &input {
                    Value::Null => 0,
                    Value::List(items) => items.len() as i64,
                    _ => 1,
                }))
            }),
        ),
        (
            "quote",
            script_fn(InputParser::Smart, |_, input| {
                Ok(map_text(&input, |s| format!("\"{}\"", s.replace('"', "\\\""))))
            }),
        ),
        (
            "upper",
            script_fn(InputParser::Smart, |_, input| {
                Ok(map_text(&input, str::to_uppercase))
            }),
        ),
        (
            "lower",
            script_fn(InputParser::Smart, |_, input| {
                Ok(map_text(&input, str::to_lowercase))
            }),
        ),
        (
            "firstCap",
            script_fn(InputParser::Smart, |_, input| {
                Ok(map_text(&input, |s| {
                    first_char(s, |c| c.to_uppercase().collect())
                }))
            }),
        ),
        (
            "firstLower",
            script_fn(InputParser::Smart, |_, input| {
                Ok(map_text(&input, |s| {
                    first_char(s, |c| c.to_lowercase().collect())
                }))
            }),
        ),
    ]
}
