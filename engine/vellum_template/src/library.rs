//! Registration of tags and filters.
//!
//! A [`Library`] is a named collection of tag compile functions and
//! filter entries. The engine merges its libraries into the parser's
//! lookup tables at compile time; later registrations shadow earlier
//! ones, so user libraries can override builtins.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use vellum_value::Value;

use crate::error::{RenderError, TemplateSyntaxError};
use crate::node::Node;
use crate::parser::Parser;
use vellum_lexer::Token;

/// A tag compile function: consumes tokens from the parser (for block
/// tags, through the matching end tag) and returns one compiled node.
pub type TagFn = Arc<dyn Fn(&mut Parser, &Token) -> Result<Node, TemplateSyntaxError> + Send + Sync>;

/// A filter function: value in, value out, with an optional argument.
pub type FilterFn =
    Arc<dyn Fn(&Value, Option<&Value>, &FilterContext) -> Result<Value, RenderError> + Send + Sync>;

/// Render-time environment a filter may consult.
pub struct FilterContext {
    pub autoescape: bool,
}

/// How many arguments a filter accepts; enforced at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterArity {
    None,
    Optional,
    Required,
}

/// A registered filter plus its behavior flags.
#[derive(Clone)]
pub struct FilterEntry {
    pub func: FilterFn,
    pub arity: FilterArity,
    /// The filter does not introduce markup-significant characters, so a
    /// safe input yields a safe output.
    pub is_safe: bool,
    /// The filter's behavior depends on whether autoescaping is active.
    pub needs_autoescape: bool,
}

impl FilterEntry {
    pub fn new(
        arity: FilterArity,
        func: impl Fn(&Value, Option<&Value>, &FilterContext) -> Result<Value, RenderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        FilterEntry {
            func: Arc::new(func),
            arity,
            is_safe: false,
            needs_autoescape: false,
        }
    }

    #[must_use]
    pub fn is_safe(mut self) -> Self {
        self.is_safe = true;
        self
    }

    #[must_use]
    pub fn needs_autoescape(mut self) -> Self {
        self.needs_autoescape = true;
        self
    }
}

/// A collection of tags and filters registered under their names.
#[derive(Clone, Default)]
pub struct Library {
    tags: FxHashMap<String, TagFn>,
    filters: FxHashMap<String, FilterEntry>,
}

impl Library {
    pub fn new() -> Self {
        Library::default()
    }

    /// Register a tag compile function.
    pub fn tag(
        &mut self,
        name: &str,
        func: impl Fn(&mut Parser, &Token) -> Result<Node, TemplateSyntaxError>
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.tags.insert(name.to_owned(), Arc::new(func));
        self
    }

    /// Register a filter with default flags.
    pub fn filter(
        &mut self,
        name: &str,
        arity: FilterArity,
        func: impl Fn(&Value, Option<&Value>, &FilterContext) -> Result<Value, RenderError>
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.filters.insert(name.to_owned(), FilterEntry::new(arity, func));
        self
    }

    /// Register a filter with explicit flags.
    pub fn filter_entry(&mut self, name: &str, entry: FilterEntry) -> &mut Self {
        self.filters.insert(name.to_owned(), entry);
        self
    }

    pub fn tags(&self) -> &FxHashMap<String, TagFn> {
        &self.tags
    }

    pub fn filters(&self) -> &FxHashMap<String, FilterEntry> {
        &self.filters
    }
}
