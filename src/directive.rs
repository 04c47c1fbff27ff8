//! Render directives
//!
//! A directive is a named pair of hooks that a document opts into with a
//! directive mark (`{$$stripBlankLines$$}`). `before` runs ahead of the
//! blank walk and may seed bindings; `after` may rewrite the whole rendered
//! buffer. Hooks run in the order the directives appear in the document.

use std::sync::Arc;

use crate::context::Context;
use crate::dom::Dom;
use crate::error::TailorError;

pub trait Directive: Send + Sync {
    fn before(&self, _dom: &Dom, _context: &mut Context) -> Result<(), TailorError> {
        Ok(())
    }

    fn after(
        &self,
        _dom: &Dom,
        _context: &mut Context,
        _output: &mut String,
    ) -> Result<(), TailorError> {
        Ok(())
    }
}

/// Drops every line that is empty or whitespace only
#[derive(Debug, Clone, Copy, Default)]
pub struct StripBlankLines;

impl Directive for StripBlankLines {
    fn after(&self, _dom: &Dom, _context: &mut Context, output: &mut String) -> Result<(), TailorError> {
        *output = output
            .split_inclusive('\n')
            .filter(|line| !line.trim().is_empty())
            .collect();
        Ok(())
    }
}

/// Removes trailing spaces and tabs from every line
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimTrailingWhitespace;

impl Directive for TrimTrailingWhitespace {
    fn after(&self, _dom: &Dom, _context: &mut Context, output: &mut String) -> Result<(), TailorError> {
        let mut trimmed = String::with_capacity(output.len());
        for line in output.split_inclusive('\n') {
            let (body, separator) = match line.strip_suffix("\r\n") {
                Some(body) => (body, "\r\n"),
                None => match line.strip_suffix('\n') {
                    Some(body) => (body, "\n"),
                    None => (line, ""),
                },
            };
            trimmed.push_str(body.trim_end_matches([' ', '\t']));
            trimmed.push_str(separator);
        }
        *output = trimmed;
        Ok(())
    }
}

/// Directives registered on every new context
pub fn builtins() -> Vec<(&'static str, Arc<dyn Directive>)> {
    vec![
        ("stripBlankLines", Arc::new(StripBlankLines) as Arc<dyn Directive>),
        ("trimTrailingWhitespace", Arc::new(TrimTrailingWhitespace) as Arc<dyn Directive>),
    ]
}
