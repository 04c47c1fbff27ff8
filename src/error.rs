//! Error types for compiling and tailoring markup
//!
//! Compilation failures surface as [`MarkupError`], render failures as
//! [`TailorError`]. Expression failures are [`EvalError`] and are wrapped by
//! both, so a caller can always tell an evaluator problem apart from a
//! missing binding or a malformed mark.

use thiserror::Error;

/// Boxed error raised by host-supplied scripts and directives
pub type Fault = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while reading markup and building a [`crate::Dom`]
#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("line {line}: mark opened but never closed, expected '{close}' after \"{buffered}\"")]
    UnclosedTag {
        close: String,
        buffered: String,
        line: usize,
    },

    #[error("line {line}: unrecognized mark \"{text}\"")]
    UnknownMark { text: String, line: usize },

    #[error("line {line}: invalid name in \"{text}\": {source}")]
    BadName {
        text: String,
        line: usize,
        #[source]
        source: NameError,
    },

    #[error("line {line}: {message} in \"{text}\"")]
    Contract {
        text: String,
        line: usize,
        message: String,
    },

    #[error("line {line}: static mark \"{text}\" failed: {source}")]
    Static {
        text: String,
        line: usize,
        #[source]
        source: Box<TailorError>,
    },

    #[error("Invalid grammar '{name}': {message}")]
    Grammar { name: String, message: String },

    #[error("Failed to read markup from {source_name}: {source}")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Grammar configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

/// Errors raised while loading a [`crate::config::TailorConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binding '{name}' cannot be used: {message}")]
    Binding { name: String, message: String },

    #[error("Unknown grammar '{0}', expected BindML or CodeML")]
    UnknownGrammar(String),

    #[error(transparent)]
    Markup(#[from] MarkupError),
}

/// Identifier audit failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("name is empty")]
    Empty,

    #[error("'{name}' must start with a letter or '_'")]
    BadStart { name: String },

    #[error("'{name}' contains disallowed character '{ch}'")]
    BadChar { name: String, ch: char },

    #[error("'{name}' is a reserved word")]
    Reserved { name: String },
}

/// Expression evaluation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Syntax error in expression \"{expression}\": {message}")]
    Syntax { expression: String, message: String },

    #[error("'{name}' is not defined")]
    Undefined { name: String },

    #[error("Cannot apply '{op}' to {left} and {right}")]
    Type {
        op: String,
        left: String,
        right: String,
    },

    #[error("Division by zero")]
    DivideByZero,

    #[error("Index {index} out of bounds for length {len}")]
    Index { index: i64, len: usize },

    #[error("Integer overflow in '{op}'")]
    Overflow { op: String },
}

/// Errors raised while tailoring a [`crate::Dom`]
#[derive(Error, Debug)]
pub enum TailorError {
    #[error("line {line}: required variable '{name}' is null or missing in \"{text}\"")]
    VarRequired {
        name: String,
        text: String,
        line: usize,
    },

    #[error("line {line}: required result of script '{script}' with input \"{input}\" is null in \"{text}\"")]
    ScriptResultRequired {
        script: String,
        input: String,
        text: String,
        line: usize,
    },

    #[error("Required variable '{name}' missing for form{}", form_label(.form))]
    RequiredVarMissing { name: String, form: Option<String> },

    #[error("Required variable '{name}' has {len} values but form{} needs {cardinality} (index {index})", form_label(.form))]
    CardinalityMismatch {
        name: String,
        form: Option<String>,
        len: usize,
        cardinality: usize,
        index: usize,
    },

    #[error("Value {value:?} of '{name}' fails check (({expression}))")]
    Invalid {
        name: String,
        value: String,
        expression: String,
    },

    #[error("Script '{name}' not found")]
    ScriptNotFound { name: String },

    #[error("Directive '{name}' not found")]
    DirectiveNotFound { name: String },

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("Script '{name}' failed: {source}")]
    Script {
        name: String,
        #[source]
        source: Fault,
    },

    #[error("Directive '{name}' failed: {source}")]
    Directive {
        name: String,
        #[source]
        source: Fault,
    },

    #[error("Inline markup failed: {0}")]
    Markup(#[source] Box<MarkupError>),

    #[error("line {line}: \"{text}\": {source}")]
    AtMark {
        text: String,
        line: usize,
        #[source]
        source: Box<TailorError>,
    },
}

fn form_label(form: &Option<String>) -> String {
    match form {
        Some(name) => format!(" '{}'", name),
        None => String::new(),
    }
}

impl TailorError {
    /// Attach the location of the mark being derived.
    ///
    /// Errors that already carry a mark location are returned unchanged, so
    /// the innermost mark wins when forms nest.
    pub fn at(self, text: &str, line: usize) -> Self {
        match self {
            TailorError::VarRequired { .. }
            | TailorError::ScriptResultRequired { .. }
            | TailorError::AtMark { .. } => self,
            other => TailorError::AtMark {
                text: text.to_string(),
                line,
                source: Box::new(other),
            },
        }
    }

    /// Strip any [`TailorError::AtMark`] wrappers
    pub fn root(&self) -> &TailorError {
        match self {
            TailorError::AtMark { source, .. } => source.root(),
            other => other,
        }
    }

    /// Wrap a host error raised inside a script
    pub fn script(name: impl Into<String>, source: impl Into<Fault>) -> Self {
        TailorError::Script {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Wrap an error raised inside a directive hook
    pub fn directive(name: impl Into<String>, source: impl Into<Fault>) -> Self {
        TailorError::Directive {
            name: name.into(),
            source: source.into(),
        }
    }
}

impl From<MarkupError> for TailorError {
    fn from(error: MarkupError) -> Self {
        TailorError::Markup(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_keeps_innermost_location() {
        let err = TailorError::ScriptNotFound {
            name: "missing".to_string(),
        }
        .at("{+$missing()+}", 3)
        .at("{{+:{+$missing()+}+}}", 1);

        match &err {
            TailorError::AtMark { line, text, .. } => {
                assert_eq!(*line, 3);
                assert_eq!(text, "{+$missing()+}");
            }
            other => panic!("Expected AtMark, got {:?}", other),
        }
        assert!(matches!(err.root(), TailorError::ScriptNotFound { .. }));
    }

    #[test]
    fn test_required_errors_are_not_rewrapped() {
        let err = TailorError::VarRequired {
            name: "name".to_string(),
            text: "{+name*+}".to_string(),
            line: 1,
        }
        .at("{{+:{+name*+}+}}", 1);
        assert!(matches!(err, TailorError::VarRequired { .. }));
    }

    #[test]
    fn test_form_label_in_message() {
        let err = TailorError::RequiredVarMissing {
            name: "type".to_string(),
            form: Some("fields".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Required variable 'type' missing for form 'fields'"
        );
    }
}
