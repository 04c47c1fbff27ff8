//! Scoped binding store
//!
//! A [`Context`] is an ordered set of named scopes. Lookups walk the scopes in
//! [`Scope::PRIORITY`] order and the first binding found wins; writes always
//! name their target scope (instance by default).
//!
//! The loop scope is a stack of frames: the form engine pushes a frame per
//! iteration and pops it as soon as the instance is rendered, so loop
//! bindings never reach sibling iterations or marks outside the form.
//! Loop writes are only valid inside a form iteration; with no frame open
//! they are dropped.
//!
//! Scripts and forms share the maps with plain values but live under keys
//! prefixed with [`SCRIPT_MARKER`], so `$name` never collides with `name`.
//!
//! One context serves one render call (and the nested renders of its forms
//! and directives). It is never shared between concurrent renders.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::directive::{self, Directive};
use crate::error::TailorError;
use crate::eval::{self, EvaluatorVarResolver, ExpressionEvaluator, VarResolver};
use crate::script::{self, Script, ScriptRegistry, ScriptResolver};
use crate::value::Value;

/// Leading marker of script and form keys
pub const SCRIPT_MARKER: char = '$';

/// Named binding scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Per form-iteration bindings
    Loop,
    /// Per render bindings supplied by the caller
    Instance,
    /// Compile-time bindings copied from the Dom
    Static,
    Project,
    Global,
    Library,
    /// Built-in scripts
    CoreLibrary,
    Core,
}

impl Scope {
    /// Lookup order, most specific first. Project and global bindings
    /// override the defaults a document declares in its statics.
    pub const PRIORITY: [Scope; 8] = [
        Scope::Loop,
        Scope::Instance,
        Scope::Project,
        Scope::Global,
        Scope::Static,
        Scope::Library,
        Scope::CoreLibrary,
        Scope::Core,
    ];
}

/// A value or an invokable script bound under a name
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    Script(Arc<dyn Script>),
}

impl Binding {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Value(v) => Some(v),
            Binding::Script(_) => None,
        }
    }

    pub fn as_script(&self) -> Option<&Arc<dyn Script>> {
        match self {
            Binding::Script(s) => Some(s),
            Binding::Value(_) => None,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Binding::Script(_) => f.write_str("Script(..)"),
        }
    }
}

/// The bindings of one scope, keyed by name (`$name` for scripts)
pub type VarScope = BTreeMap<String, Binding>;

/// Key under which a script named `name` is stored
pub fn script_key(name: &str) -> String {
    format!("{}{}", SCRIPT_MARKER, name)
}

/// Hierarchical binding store plus the collaborators marks derive through
#[derive(Clone)]
pub struct Context {
    scopes: BTreeMap<Scope, VarScope>,
    loops: Vec<VarScope>,
    directives: HashMap<String, Arc<dyn Directive>>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    resolver: Arc<dyn ScriptResolver>,
    var_resolver: Arc<dyn VarResolver>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a context with the shared default evaluator, the core script
    /// library and the built-in directives
    pub fn new() -> Self {
        let mut ctx = Self::empty(eval::shared_evaluator());
        for (name, s) in script::core_library() {
            ctx.set_script_in(Scope::CoreLibrary, name, s);
        }
        for (name, d) in directive::builtins() {
            ctx.register_directive(name, d);
        }
        ctx
    }

    /// Create a context with no bindings, scripts or directives
    pub fn empty(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            scopes: BTreeMap::new(),
            loops: Vec::new(),
            directives: HashMap::new(),
            evaluator,
            resolver: Arc::new(ScriptRegistry::new()),
            var_resolver: Arc::new(EvaluatorVarResolver),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Fallback used when a script is not bound in any scope
    pub fn with_resolver(mut self, resolver: Arc<dyn ScriptResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_var_resolver(mut self, resolver: Arc<dyn VarResolver>) -> Self {
        self.var_resolver = resolver;
        self
    }

    /// Builder form of [`Context::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn evaluator(&self) -> Arc<dyn ExpressionEvaluator> {
        Arc::clone(&self.evaluator)
    }

    pub fn resolver(&self) -> Arc<dyn ScriptResolver> {
        Arc::clone(&self.resolver)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find a binding by key, walking loop frames (innermost first) and then
    /// the scopes in priority order
    pub fn binding(&self, key: &str) -> Option<&Binding> {
        self.loops
            .iter()
            .rev()
            .find_map(|frame| frame.get(key))
            .or_else(|| {
                Scope::PRIORITY
                    .iter()
                    .filter(|s| **s != Scope::Loop)
                    .find_map(|s| self.scopes.get(s).and_then(|scope| scope.get(key)))
            })
    }

    /// Value bound to `name`; `Some(Value::Null)` for a name bound to null
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.binding(name).and_then(Binding::as_value)
    }

    /// Value bound to `name` in one scope only
    pub fn get_in(&self, scope: Scope, name: &str) -> Option<&Value> {
        self.scope(scope)
            .and_then(|s| s.get(name))
            .and_then(Binding::as_value)
    }

    /// Whether `name` is bound at all, even to null
    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get_script(&self, name: &str) -> Option<Arc<dyn Script>> {
        self.binding(&script_key(name))
            .and_then(Binding::as_script)
            .cloned()
    }

    /// Resolve a variable through the configured [`VarResolver`]
    pub fn resolve_var(&mut self, name: &str) -> Result<Option<Value>, TailorError> {
        let resolver = Arc::clone(&self.var_resolver);
        resolver.resolve(self, name)
    }

    /// Names of every visible value binding
    pub fn names(&self) -> BTreeSet<String> {
        self.loops
            .iter()
            .chain(self.scopes.values())
            .flat_map(|scope| scope.iter())
            .filter(|(_, b)| b.as_value().is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Bindings of one scope; the loop scope is the innermost frame
    pub fn scope(&self, scope: Scope) -> Option<&VarScope> {
        match scope {
            Scope::Loop => self.loops.last(),
            other => self.scopes.get(&other),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Bind a value in the instance scope
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Binding> {
        self.set_in(Scope::Instance, name, value)
    }

    /// Bind a value in `scope`. A loop write with no frame open is dropped.
    pub fn set_in(
        &mut self,
        scope: Scope,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Binding> {
        self.scope_mut(scope)?
            .insert(name.into(), Binding::Value(value.into()))
    }

    /// Bind a script in the instance scope
    pub fn set_script(&mut self, name: &str, script: Arc<dyn Script>) -> Option<Binding> {
        self.set_script_in(Scope::Instance, name, script)
    }

    pub fn set_script_in(
        &mut self,
        scope: Scope,
        name: &str,
        script: Arc<dyn Script>,
    ) -> Option<Binding> {
        self.scope_mut(scope)?
            .insert(script_key(name), Binding::Script(script))
    }

    /// Copy raw bindings into a scope, replacing same-named entries
    pub fn bind_all(&mut self, scope: Scope, bindings: &VarScope) {
        let Some(target) = self.scope_mut(scope) else {
            return;
        };
        for (key, binding) in bindings {
            target.insert(key.clone(), binding.clone());
        }
    }

    pub fn clear(&mut self, scope: Scope) {
        match scope {
            Scope::Loop => self.loops.clear(),
            other => {
                self.scopes.remove(&other);
            }
        }
    }

    /// Open a fresh loop frame
    pub fn push_loop(&mut self) {
        self.loops.push(VarScope::new());
    }

    /// Discard the innermost loop frame
    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    fn scope_mut(&mut self, scope: Scope) -> Option<&mut VarScope> {
        match scope {
            Scope::Loop => {
                if self.loops.is_empty() {
                    warn!("loop binding outside a form iteration dropped");
                }
                self.loops.last_mut()
            }
            other => Some(self.scopes.entry(other).or_default()),
        }
    }

    // =========================================================================
    // Directives
    // =========================================================================

    pub fn register_directive(&mut self, name: impl Into<String>, directive: Arc<dyn Directive>) {
        self.directives.insert(name.into(), directive);
    }

    pub fn directive(&self, name: &str) -> Option<Arc<dyn Directive>> {
        self.directives.get(name).cloned()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scopes", &self.scopes)
            .field("loops", &self.loops)
            .field("directives", &self.directives.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_first_binding_wins() {
        let mut ctx = Context::new();
        ctx.set_in(Scope::Static, "name", "static");
        assert_eq!(ctx.get("name"), Some(&Value::from("static")));

        ctx.set_in(Scope::Global, "name", "global");
        assert_eq!(ctx.get("name"), Some(&Value::from("global")));

        ctx.set_in(Scope::Project, "name", "project");
        assert_eq!(ctx.get("name"), Some(&Value::from("project")));

        ctx.set("name", "instance");
        assert_eq!(ctx.get("name"), Some(&Value::from("instance")));

        ctx.push_loop();
        ctx.set_in(Scope::Loop, "name", "loop");
        assert_eq!(ctx.get("name"), Some(&Value::from("loop")));
        ctx.pop_loop();
        assert_eq!(ctx.get("name"), Some(&Value::from("instance")));
    }

    #[test]
    fn test_loop_write_without_frame_is_dropped() {
        let mut ctx = Context::new();
        assert!(ctx.set_in(Scope::Loop, "x", "leak").is_none());
        assert!(!ctx.is_defined("x"));
        assert!(ctx.scope(Scope::Loop).is_none());

        ctx.push_loop();
        ctx.set_in(Scope::Loop, "x", "kept");
        assert_eq!(ctx.get("x"), Some(&Value::from("kept")));
        ctx.pop_loop();
        assert!(!ctx.is_defined("x"));
    }

    #[test]
    fn test_defined_but_null_is_defined() {
        let mut ctx = Context::new();
        assert!(!ctx.is_defined("x"));
        ctx.set("x", Value::Null);
        assert!(ctx.is_defined("x"));
        assert_eq!(ctx.get("x"), Some(&Value::Null));
    }

    #[test]
    fn test_scripts_do_not_collide_with_values() {
        let mut ctx = Context::new();
        ctx.set("count", 3);
        assert_eq!(ctx.get("count"), Some(&Value::Int(3)));
        assert!(ctx.get_script("count").is_some());
        assert!(ctx.get("$count").is_none());
    }

    #[test]
    fn test_loop_frames_nest_and_pop() {
        let mut ctx = Context::new();
        ctx.push_loop();
        ctx.set_in(Scope::Loop, "outer", 1);
        ctx.push_loop();
        ctx.set_in(Scope::Loop, "inner", 2);
        assert!(ctx.is_defined("outer"));
        assert!(ctx.is_defined("inner"));
        ctx.pop_loop();
        assert!(!ctx.is_defined("inner"));
        assert!(ctx.is_defined("outer"));
        ctx.pop_loop();
        assert!(!ctx.is_defined("outer"));
    }

    #[test]
    fn test_clear_scope() {
        let mut ctx = Context::new();
        ctx.set_in(Scope::Project, "a", 1);
        ctx.set("b", 2);
        ctx.clear(Scope::Project);
        assert!(!ctx.is_defined("a"));
        assert!(ctx.is_defined("b"));
        assert_eq!(ctx.names(), BTreeSet::from(["b".to_string()]));
    }
}
