//! markup-tailor: compile marked-up text once, tailor it many times
//!
//! Markup is plain text carrying marks: small directives delimited by a
//! grammar's tag pairs (`{+name+}`, `{{+:...+}}`, `/*{+name*/x/*+}*/`, ...).
//! Compiling produces an immutable [`Dom`]; tailoring a Dom against a
//! [`Context`] of scoped bindings produces the final text.
//!
//! - [`grammar`]: tag tables (BindML, CodeML, YAML-loaded)
//! - [`parser`]: line state machine and mark classification
//! - [`mark`]: the closed catalog of mark kinds and their derivation
//! - [`form`]: repeatable sub-templates with cardinality broadcasting
//! - [`context`]: scoped bindings, scripts and directives
//! - [`eval`]: pluggable expression evaluation (nom-based default)
//! - [`tailor`]: render orchestration
//!
//! ```
//! use markup_tailor::{Compiler, Context};
//!
//! let dom = Compiler::bind_ml()
//!     .compile_str("{{+:{+type+} {+name+}; +}}")
//!     .unwrap();
//! let mut ctx = Context::new()
//!     .with("type", vec!["int", "String"])
//!     .with("name", vec!["x", "y"]);
//! assert_eq!(dom.tailor(&mut ctx).unwrap(), "int x; String y; ");
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod directive;
pub mod dom;
pub mod error;
pub mod eval;
mod factory;
pub mod form;
pub mod grammar;
pub mod mark;
pub mod parser;
pub mod script;
pub mod source;
pub mod tailor;
pub mod value;

pub use audit::{IdentifierAudit, NoAudit, VarNameAudit};
pub use config::TailorConfig;
pub use context::{Binding, Context, Scope, VarScope};
pub use directive::Directive;
pub use dom::{Dom, Metadata, Template};
pub use error::{ConfigError, EvalError, MarkupError, NameError, TailorError};
pub use eval::{shared_evaluator, DefaultEvaluator, ExpressionEvaluator, VarResolver};
pub use form::{Form, JoinPolicy};
pub use grammar::{Grammar, TagFamily, TagPair};
pub use mark::{Flavor, Mark, MarkKind, VarRef};
pub use parser::Compiler;
pub use script::{script_fn, InputParser, Script, ScriptRegistry, ScriptResolver};
pub use source::{FileSource, MarkupSource, StringSource};
pub use tailor::Tailor;
pub use value::Value;

/// Compile BindML markup
pub fn compile(markup: &str) -> Result<Dom, MarkupError> {
    Compiler::bind_ml().compile_str(markup)
}

/// Compile BindML markup and render it once against `ctx`
pub fn tailor(markup: &str, ctx: &mut Context) -> Result<String, TailorError> {
    compile(markup)?.tailor(ctx)
}
