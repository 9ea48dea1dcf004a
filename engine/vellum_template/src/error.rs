//! Error types for template compilation and rendering.
//!
//! The taxonomy mirrors how failures propagate:
//!
//! - [`TemplateSyntaxError`] — compile time, never recoverable, always
//!   surfaced to the caller of `parse`/`get_template`.
//! - [`RenderError::VariableDoesNotExist`] — render time, per variable,
//!   swallowed inside filter-expression evaluation according to the
//!   engine's missing-variable policy (unless the policy is strict).
//! - State errors (`ContextPop`, `BlockSuperWithoutParent`) — programming
//!   errors in tag implementations or templates.
//! - `RecursionLimit` / `TemplateCycle` — fatal, abort the render.

use thiserror::Error;

/// What went wrong while parsing a template.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    #[error("empty variable tag")]
    EmptyVariableTag,
    #[error("empty block tag")]
    EmptyBlockTag,
    #[error("invalid block tag: '{name}'{expected}; did you forget to register this tag?")]
    InvalidBlockTag { name: String, expected: String },
    #[error("unclosed tag: '{command}'; looking for one of: {expected}")]
    UnclosedBlockTag { command: String, expected: String },
    #[error("'{tag}' must be the first tag in the template")]
    MustBeFirst { tag: String },
    #[error("could not find variable at start of '{expression}'")]
    MissingVariable { expression: String },
    #[error("could not parse the remainder: '{remainder}' from '{expression}'")]
    CouldNotParseRemainder {
        remainder: String,
        expression: String,
    },
    #[error("invalid filter: '{name}'")]
    InvalidFilter { name: String },
    #[error("filter '{name}' {problem}")]
    FilterArguments { name: String, problem: String },
    #[error("variables and attributes may not begin with underscores: '{name}'")]
    ReservedName { name: String },
    #[error("invalid numeric literal: '{literal}'")]
    InvalidNumber { literal: String },
    #[error("{0}")]
    Other(String),
}

/// A compile-time template error, annotated with the source line of the
/// offending token and the origin it came from where known.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateSyntaxError {
    pub kind: SyntaxErrorKind,
    /// 1-based source line, when the parser knows it.
    pub line: Option<usize>,
    /// Origin name of the template being compiled.
    pub origin: Option<String>,
}

impl std::error::Error for TemplateSyntaxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl std::fmt::Display for TemplateSyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)?;
        if let Some(line) = self.line {
            write!(f, " (line {line}")?;
            if let Some(origin) = &self.origin {
                write!(f, " of {origin}")?;
            }
            write!(f, ")")?;
        } else if let Some(origin) = &self.origin {
            write!(f, " (in {origin})")?;
        }
        Ok(())
    }
}

impl TemplateSyntaxError {
    pub fn new(kind: SyntaxErrorKind) -> Self {
        TemplateSyntaxError {
            kind,
            line: None,
            origin: None,
        }
    }

    /// Annotate with a source line. The innermost annotation wins, so a
    /// compile error inside a tag body keeps the body's line.
    #[must_use]
    pub fn with_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: &str) -> Self {
        if self.origin.is_none() {
            self.origin = Some(origin.to_owned());
        }
        self
    }

    pub fn other(message: impl Into<String>) -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::Other(message.into()))
    }

    pub fn empty_variable_tag() -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::EmptyVariableTag)
    }

    pub fn empty_block_tag() -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::EmptyBlockTag)
    }

    pub fn invalid_block_tag(name: &str, expected: &[&str]) -> Self {
        let expected = if expected.is_empty() {
            String::new()
        } else {
            format!(", expected {}", quote_list(expected))
        };
        TemplateSyntaxError::new(SyntaxErrorKind::InvalidBlockTag {
            name: name.to_owned(),
            expected,
        })
    }

    pub fn unclosed_block_tag(command: &str, expected: &[&str]) -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::UnclosedBlockTag {
            command: command.to_owned(),
            expected: expected.join(", "),
        })
    }

    pub fn must_be_first(tag: &str) -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::MustBeFirst {
            tag: tag.to_owned(),
        })
    }

    pub fn invalid_filter(name: &str) -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::InvalidFilter {
            name: name.to_owned(),
        })
    }

    pub fn filter_arguments(name: &str, problem: impl Into<String>) -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::FilterArguments {
            name: name.to_owned(),
            problem: problem.into(),
        })
    }

    pub fn reserved_name(name: &str) -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::ReservedName {
            name: name.to_owned(),
        })
    }

    pub fn invalid_number(literal: &str) -> Self {
        TemplateSyntaxError::new(SyntaxErrorKind::InvalidNumber {
            literal: literal.to_owned(),
        })
    }
}

/// Render `["a", "b", "c"]` as `'a', 'b' or 'c'`.
fn quote_list(items: &[&str]) -> String {
    match items {
        [] => String::new(),
        [only] => format!("'{only}'"),
        [init @ .., last] => {
            let quoted: Vec<String> = init.iter().map(|item| format!("'{item}'")).collect();
            format!("{} or '{last}'", quoted.join(", "))
        }
    }
}

/// A failure while loading a template through a [`Loader`].
///
/// [`Loader`]: crate::Loader
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("template '{0}' does not exist")]
    NotFound(String),
    #[error("template '{name}' failed to compile: {message}")]
    Compile { name: String, message: String },
}

/// A failure during rendering.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    /// A dotted-path lookup failed. Swallowed by the expression resolver
    /// under the lenient missing-variable policy; propagated under the
    /// strict policy.
    #[error("failed lookup for key [{segment}] in '{path}'")]
    VariableDoesNotExist { path: String, segment: String },
    /// Popping the context variable stack below its permanent bottom
    /// layer — an unbalanced push/pop in a tag implementation.
    #[error("pop() was called on an empty context stack")]
    ContextPop,
    /// `block.super` with no overriding ancestor in scope.
    #[error("'block.super' for block '{name}' has no parent block to render")]
    BlockSuperWithoutParent { name: String },
    #[error("template recursion limit ({limit}) exceeded while rendering '{name}'")]
    RecursionLimit { name: String, limit: usize },
    #[error("circular template inheritance: '{name}' appears in its own extends chain")]
    TemplateCycle { name: String },
    #[error("'extends' resolved to an empty template reference{hint}")]
    InvalidParentTemplate { hint: String },
    #[error("no template loader configured; cannot load '{name}'")]
    NoLoader { name: String },
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("filter '{name}': {message}")]
    Filter { name: String, message: String },
    #[error("callable failed during variable resolution: {0}")]
    Call(String),
    #[error("cannot iterate over {kind} value in 'for' loop")]
    NotIterable { kind: &'static str },
    #[error("need {expected} values to unpack in 'for' loop; got {got}")]
    UnpackMismatch { expected: usize, got: usize },
}

/// Any failure from the compile-then-render pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error(transparent)]
    Syntax(#[from] TemplateSyntaxError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_line_and_origin() {
        let err = TemplateSyntaxError::invalid_filter("nope")
            .with_line(3)
            .with_origin("base.html");
        assert_eq!(
            err.to_string(),
            "invalid filter: 'nope' (line 3 of base.html)"
        );
    }

    #[test]
    fn innermost_line_annotation_wins() {
        let err = TemplateSyntaxError::empty_block_tag().with_line(2).with_line(7);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn expected_tags_render_as_quoted_list() {
        let err = TemplateSyntaxError::invalid_block_tag("bogus", &["elif", "else", "endif"]);
        assert_eq!(
            err.to_string(),
            "invalid block tag: 'bogus', expected 'elif', 'else' or 'endif'; \
             did you forget to register this tag?"
        );
    }
}
