//! Render configuration
//!
//! A config file picks the grammar and seeds the outer scopes of a render
//! context. YAML and JSON are both accepted; the extension decides which.
//!
//! ```yaml
//! grammar: CodeML
//! scopes:
//!   project:
//!     package: com.example
//!   global:
//!     author: tailor
//! ```
//!
//! Path resolution for [`TailorConfig::from_env`]:
//! 1. `TAILOR_CONFIG` environment variable
//! 2. `tailor.yaml` in the working directory
//! 3. defaults (BindML, no bindings)

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::context::{Context, Scope};
use crate::error::ConfigError;
use crate::grammar::{Grammar, TagPair, BIND_ML, CODE_ML};
use crate::value::Value;

pub const CONFIG_ENV: &str = "TAILOR_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "tailor.yaml";

/// Grammar selection: a built-in name or an inline tag table
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GrammarConfig {
    Named(String),
    Inline { name: String, tags: Vec<TagPair> },
}

impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig::Named(BIND_ML.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TailorConfig {
    pub grammar: GrammarConfig,
    pub scopes: BTreeMap<Scope, BTreeMap<String, serde_json::Value>>,
}

impl TailorConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a `.json` file as JSON, anything else as YAML
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read(path)?;
        let config = if is_json(path) {
            Self::from_json(&text)?
        } else {
            Self::from_yaml(&text)?
        };
        info!(path = %path.display(), scopes = config.scopes.len(), "loaded tailor config");
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(path);
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load(DEFAULT_CONFIG_FILE);
        }
        debug!("no tailor config found, using defaults");
        Ok(Self::default())
    }

    pub fn grammar(&self) -> Result<Grammar, ConfigError> {
        match &self.grammar {
            GrammarConfig::Named(name) if name.eq_ignore_ascii_case(BIND_ML) => Ok(Grammar::bind_ml()),
            GrammarConfig::Named(name) if name.eq_ignore_ascii_case(CODE_ML) => Ok(Grammar::code_ml()),
            GrammarConfig::Named(name) => Err(ConfigError::UnknownGrammar(name.clone())),
            GrammarConfig::Inline { name, tags } => Ok(Grammar::new(name.clone(), tags.clone())?),
        }
    }

    /// Bind every configured value into its scope
    pub fn apply(&self, ctx: &mut Context) -> Result<(), ConfigError> {
        for (scope, bindings) in &self.scopes {
            for (name, json) in bindings {
                ctx.set_in(*scope, name.clone(), to_value(name, json.clone())?);
            }
        }
        Ok(())
    }
}

/// Read a flat name → value map from a YAML or JSON file
pub fn load_bindings(path: impl AsRef<Path>) -> Result<BTreeMap<String, Value>, ConfigError> {
    let path = path.as_ref();
    let text = read(path)?;
    let raw: BTreeMap<String, serde_json::Value> = if is_json(path) {
        serde_json::from_str(&text)?
    } else {
        serde_yaml::from_str(&text)?
    };
    raw.into_iter()
        .map(|(name, json)| {
            let value = to_value(&name, json)?;
            Ok((name, value))
        })
        .collect()
}

fn to_value(name: &str, json: serde_json::Value) -> Result<Value, ConfigError> {
    Value::try_from(json).map_err(|message| ConfigError::Binding {
        name: name.to_string(),
        message,
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
