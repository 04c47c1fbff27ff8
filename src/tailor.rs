//! Render orchestration
//!
//! One pass, no retries:
//!
//! 1. copy the Dom's static bindings into the context
//! 2. resolve every referenced directive and run its `before` hook
//! 3. fill the blanks in document order
//! 4. run the `after` hooks in the same order
//!
//! Any failure aborts the render; no partial output is returned.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::context::{Context, Scope};
use crate::directive::Directive;
use crate::dom::Dom;
use crate::error::TailorError;
use crate::mark::{Mark, MarkKind};

pub struct Tailor<'d> {
    dom: &'d Dom,
}

impl<'d> Tailor<'d> {
    pub fn new(dom: &'d Dom) -> Self {
        Self { dom }
    }

    #[instrument(level = "debug", skip_all)]
    pub fn run(&self, ctx: &mut Context) -> Result<String, TailorError> {
        ctx.bind_all(Scope::Static, self.dom.statics());

        let directives = self.directives(ctx)?;
        for (mark, name, directive) in &directives {
            directive
                .before(self.dom, ctx)
                .map_err(|e| hook_failed(name, e).at(&mark.text, mark.line))?;
        }

        let mut output = self.dom.template().fill(ctx)?;

        for (mark, name, directive) in &directives {
            directive
                .after(self.dom, ctx, &mut output)
                .map_err(|e| hook_failed(name, e).at(&mark.text, mark.line))?;
        }
        debug!(bytes = output.len(), directives = directives.len(), "tailored");
        Ok(output)
    }

    #[allow(clippy::type_complexity)]
    fn directives(
        &self,
        ctx: &Context,
    ) -> Result<Vec<(&'d Mark, &'d str, Arc<dyn Directive>)>, TailorError> {
        self.dom
            .marks()
            .iter()
            .filter_map(|mark| match &mark.kind {
                MarkKind::DirectiveRef { name } => Some((mark, name.as_str())),
                _ => None,
            })
            .map(|(mark, name)| {
                ctx.directive(name)
                    .map(|d| (mark, name, d))
                    .ok_or_else(|| {
                        TailorError::DirectiveNotFound {
                            name: name.to_string(),
                        }
                        .at(&mark.text, mark.line)
                    })
            })
            .collect()
    }
}

fn hook_failed(name: &str, error: TailorError) -> TailorError {
    match error {
        TailorError::Directive { .. } | TailorError::AtMark { .. } => error,
        other => TailorError::directive(name, other),
    }
}
