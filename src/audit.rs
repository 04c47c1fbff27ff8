//! Identifier audit for names declared in marks

use std::collections::BTreeSet;

use crate::error::NameError;

/// Validates a name before it becomes part of a mark
pub trait VarNameAudit: Send + Sync {
    fn audit<'a>(&self, name: &'a str) -> Result<&'a str, NameError>;
}

/// Letters, digits and `_`; must start with a letter or `_`; must not be
/// a reserved word
#[derive(Debug, Clone)]
pub struct IdentifierAudit {
    reserved: BTreeSet<String>,
}

impl Default for IdentifierAudit {
    fn default() -> Self {
        Self::with_reserved(["true", "false", "null"])
    }
}

impl IdentifierAudit {
    pub fn with_reserved<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reserved: words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn reserve(&mut self, word: impl Into<String>) {
        self.reserved.insert(word.into());
    }
}

impl VarNameAudit for IdentifierAudit {
    fn audit<'a>(&self, name: &'a str) -> Result<&'a str, NameError> {
        let mut chars = name.chars();
        let first = chars.next().ok_or(NameError::Empty)?;
        if !(first.is_alphabetic() || first == '_') {
            return Err(NameError::BadStart {
                name: name.to_string(),
            });
        }
        if let Some(ch) = chars.find(|c| !(c.is_alphanumeric() || *c == '_')) {
            return Err(NameError::BadChar {
                name: name.to_string(),
                ch,
            });
        }
        if self.reserved.contains(name) {
            return Err(NameError::Reserved {
                name: name.to_string(),
            });
        }
        Ok(name)
    }
}

/// Accepts every name
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudit;

impl VarNameAudit for NoAudit {
    fn audit<'a>(&self, name: &'a str) -> Result<&'a str, NameError> {
        Ok(name)
    }
}
