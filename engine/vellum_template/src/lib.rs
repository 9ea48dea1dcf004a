//! The Vellum template engine.
//!
//! Compilation is a two-stage pipeline: [`vellum_lexer`] splits source
//! into text, variable, block and comment tokens, and [`Parser`] turns
//! them into an immutable node tree by dispatching block tokens to
//! registered tag compile functions. Rendering walks the tree against a
//! layered [`Context`], resolving `variable|filter` expressions through
//! the engine's [`Library`] registrations.
//!
//! ```
//! use std::sync::Arc;
//! use vellum_template::{Context, Engine, Template, Value};
//!
//! let engine = Arc::new(Engine::new());
//! let template = Template::from_string(
//!     &engine,
//!     "Hello {% if user %}{{ user|default:'Guest' }}{% else %}Nobody{% endif %}!",
//! )?;
//! let mut context = Context::new(
//!     [("user".to_owned(), Value::from("Alice"))].into_iter().collect(),
//! );
//! assert_eq!(template.render(&mut context)?, "Hello Alice!");
//! # Ok::<(), vellum_template::TemplateError>(())
//! ```

mod condition;
mod context;
mod defaultfilters;
mod defaulttags;
mod engine;
mod error;
mod expression;
mod library;
mod loader;
mod loader_tags;
mod node;
mod parser;
mod template;

#[cfg(test)]
mod tests;

pub use context::{Context, RenderContext};
pub use engine::{get_template, Engine, IncludePolicy, MissingVariablePolicy, Translator};
pub use error::{LoaderError, RenderError, SyntaxErrorKind, TemplateError, TemplateSyntaxError};
pub use expression::{FilterExpression, Variable};
pub use library::{FilterArity, FilterContext, FilterEntry, FilterFn, Library, TagFn};
pub use loader::{Loader, MemoryLoader};
pub use loader_tags::TemplateValue;
pub use node::{Node, NodeId, NodeKind, NodeList, TagNode};
pub use parser::Parser;
pub use template::{Origin, Template};

pub use vellum_lexer::{smart_split, tokenize, Token, TokenKind};
pub use vellum_value::{
    html_escape, CallError, CallableValue, Object, ObjectRef, Value, ValueMap,
};
