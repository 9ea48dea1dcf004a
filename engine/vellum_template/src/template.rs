//! Compiled templates and their origins.

use std::sync::Arc;

use vellum_value::ValueMap;

use crate::context::Context;
use crate::engine::Engine;
use crate::error::{RenderError, TemplateSyntaxError};
use crate::node::NodeList;
use crate::parser::Parser;

const UNKNOWN_SOURCE: &str = "<unknown source>";

/// Where a template's source came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    /// Display name, for diagnostics.
    pub name: String,
    /// The name the template was requested under, when it came through a
    /// loader.
    pub template_name: Option<String>,
}

impl Origin {
    /// An origin for a loader-provided template.
    pub fn named(name: &str) -> Self {
        Origin {
            name: name.to_owned(),
            template_name: Some(name.to_owned()),
        }
    }

    /// An origin for a template compiled directly from a string.
    pub fn anonymous() -> Self {
        Origin {
            name: UNKNOWN_SOURCE.to_owned(),
            template_name: None,
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A compiled template: an immutable node tree plus the engine that
/// compiled it. Rendering shares the tree across threads; all mutable
/// state lives in the [`Context`].
pub struct Template {
    pub nodelist: NodeList,
    pub origin: Origin,
    pub source: String,
    pub(crate) engine: Arc<Engine>,
}

impl Template {
    pub(crate) fn compile(
        source: &str,
        origin: Origin,
        engine: &Arc<Engine>,
    ) -> Result<Self, TemplateSyntaxError> {
        let tokens = if engine.debug {
            vellum_lexer::tokenize_debug(source)
        } else {
            vellum_lexer::tokenize(source)
        };
        let mut parser = Parser::new(tokens, &engine.libraries, origin.clone());
        let nodelist = parser
            .parse(&[])
            .map_err(|err| err.with_origin(&origin.name))?;
        Ok(Template {
            nodelist,
            origin,
            source: source.to_owned(),
            engine: Arc::clone(engine),
        })
    }

    /// Compile a template from a string, outside any loader.
    pub fn from_string(engine: &Arc<Engine>, source: &str) -> Result<Self, TemplateSyntaxError> {
        Template::compile(source, Origin::anonymous(), engine)
    }

    /// Render with an existing context.
    pub fn render(&self, context: &mut Context) -> Result<String, RenderError> {
        context.bind_engine(&self.engine);
        let mut out = String::with_capacity(self.source.len());
        self.render_into(context, &mut out)?;
        Ok(out)
    }

    /// Render with a fresh context holding `data`.
    pub fn render_map(&self, data: ValueMap) -> Result<String, RenderError> {
        let mut context = Context::new(data);
        self.render(&mut context)
    }

    /// Render into an existing buffer. Used by inheritance and inclusion,
    /// which splice a template's output into an outer render.
    pub(crate) fn render_into(
        &self,
        context: &mut Context,
        out: &mut String,
    ) -> Result<(), RenderError> {
        context.bind_engine(&self.engine);
        context.render_context.push_template(&self.origin.name);
        let result = self.nodelist.render(context, out);
        context.render_context.pop_template();
        result
    }

    /// A short window of source lines around a compile error, with the
    /// offending line marked. `None` when the error carries no line.
    pub fn error_context(&self, err: &TemplateSyntaxError) -> Option<String> {
        let line = err.line?;
        let mut out = String::new();
        for (idx, text) in self.source.lines().enumerate() {
            let number = idx + 1;
            if number + 2 >= line && number <= line + 2 {
                let marker = if number == line { "->" } else { "  " };
                out.push_str(&format!("{marker} {number:4} | {text}\n"));
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

// The node tree holds tag trait objects, so Debug is summarized by hand.
impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("origin", &self.origin)
            .field("nodes", &self.nodelist.nodes().len())
            .finish_non_exhaustive()
    }
}
