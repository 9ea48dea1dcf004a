//! The layered variable context threaded through a render.
//!
//! [`Context`] is a stack of maps: lookups walk innermost-first, tags push
//! a layer for the duration of a scope and pop it on the way out. The
//! bottom layer holds the builtins (`True`, `False`, `None`) and is never
//! popped.
//!
//! [`RenderContext`] is the render-private half: inheritance block state,
//! per-node caches and the template nesting depth. It lives inside the
//! `Context` but is invisible to variable lookups.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use vellum_value::{Value, ValueMap};

use crate::engine::Engine;
use crate::error::RenderError;
use crate::loader_tags::BlockContext;
use crate::node::NodeId;
use crate::template::Template;

fn builtins() -> ValueMap {
    let mut map = ValueMap::default();
    map.insert("True".to_owned(), Value::Bool(true));
    map.insert("False".to_owned(), Value::Bool(false));
    map.insert("None".to_owned(), Value::None);
    map
}

/// The stack of variable scopes visible to template expressions.
pub struct Context {
    dicts: Vec<ValueMap>,
    /// Per-context autoescape override; `None` inherits the engine's
    /// setting.
    autoescape: Option<bool>,
    pub(crate) engine: Option<Arc<Engine>>,
    pub render_context: RenderContext,
}

impl Context {
    /// A context seeded with one layer of caller data above the builtins.
    pub fn new(data: ValueMap) -> Self {
        Context {
            dicts: vec![builtins(), data],
            autoescape: None,
            engine: None,
            render_context: RenderContext::default(),
        }
    }

    /// A context with no caller data.
    pub fn empty() -> Self {
        Context::new(ValueMap::default())
    }

    /// Innermost-first lookup across all layers.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.dicts.iter().rev().find_map(|layer| layer.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Bind `key` in the innermost layer.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        if let Some(top) = self.dicts.last_mut() {
            top.insert(key.into(), value);
        }
    }

    /// Push an empty layer.
    pub fn push(&mut self) {
        self.dicts.push(ValueMap::default());
    }

    /// Push a pre-populated layer.
    pub fn push_layer(&mut self, layer: ValueMap) {
        self.dicts.push(layer);
    }

    /// Pop the innermost layer. The builtins layer is permanent; popping
    /// it is an unbalanced push/pop in a tag implementation.
    pub fn pop(&mut self) -> Result<ValueMap, RenderError> {
        if self.dicts.len() == 1 {
            return Err(RenderError::ContextPop);
        }
        // len > 1 checked above
        Ok(self.dicts.pop().unwrap_or_default())
    }

    /// Run `f` with `layer` pushed, popping it afterwards regardless of
    /// the outcome.
    pub fn scope<R>(&mut self, layer: ValueMap, f: impl FnOnce(&mut Context) -> R) -> R {
        self.dicts.push(layer);
        let result = f(self);
        self.dicts.pop();
        result
    }

    /// A fresh context for an isolated sub-render (`include ... only`):
    /// same engine and autoescape mode, new variable stack, new render
    /// state except for the nesting depth, which carries over so the
    /// recursion bound spans isolation boundaries.
    pub fn new_isolated(&self, data: ValueMap) -> Context {
        let mut isolated = Context::new(data);
        isolated.autoescape = self.autoescape;
        isolated.engine = self.engine.clone();
        isolated.render_context.depth = self.render_context.depth;
        isolated
    }

    /// Whether variable output is HTML-escaped unless marked safe.
    pub fn autoescape(&self) -> bool {
        self.autoescape
            .unwrap_or_else(|| self.engine.as_ref().is_none_or(|engine| engine.autoescape))
    }

    /// Override the engine's autoescape setting for this context.
    pub fn set_autoescape(&mut self, on: bool) {
        self.autoescape = Some(on);
    }

    pub(crate) fn bind_engine(&mut self, engine: &Arc<Engine>) {
        if self.engine.is_none() {
            self.engine = Some(Arc::clone(engine));
        }
    }

    pub(crate) fn engine(&self) -> Option<&Arc<Engine>> {
        self.engine.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.dicts.len()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::empty()
    }
}

/// Render-private state: not visible to variable lookups.
#[derive(Default)]
pub struct RenderContext {
    /// Inheritance state, created by the first `extends` encountered.
    pub(crate) block_context: Option<BlockContext>,
    /// Origin names already visited by the extends chain of this render.
    pub(crate) extends_history: Vec<String>,
    /// Per-node template caches, keyed by the node's compile-time id.
    include_caches: FxHashMap<NodeId, FxHashMap<String, Arc<Template>>>,
    /// Current template nesting depth (extends + include).
    pub(crate) depth: usize,
    /// Stack of origin names, innermost last. Diagnostics only.
    template_stack: Vec<String>,
}

impl RenderContext {
    pub(crate) fn include_cache_mut(
        &mut self,
        node: NodeId,
    ) -> &mut FxHashMap<String, Arc<Template>> {
        self.include_caches.entry(node).or_default()
    }

    pub(crate) fn push_template(&mut self, name: &str) {
        self.template_stack.push(name.to_owned());
    }

    pub(crate) fn pop_template(&mut self) {
        self.template_stack.pop();
    }

    /// Origin name of the template currently rendering, if any.
    pub fn current_template(&self) -> Option<&str> {
        self.template_stack.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn data(pairs: &[(&str, Value)]) -> ValueMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn inner_layers_shadow_outer_ones() {
        let mut ctx = Context::new(data(&[("name", Value::from("outer"))]));
        ctx.push_layer(data(&[("name", Value::from("inner"))]));
        assert_eq!(ctx.get("name"), Some(&Value::from("inner")));
        ctx.pop().unwrap();
        assert_eq!(ctx.get("name"), Some(&Value::from("outer")));
    }

    #[test]
    fn builtins_are_always_visible() {
        let ctx = Context::empty();
        assert_eq!(ctx.get("True"), Some(&Value::Bool(true)));
        assert_eq!(ctx.get("None"), Some(&Value::None));
    }

    #[test]
    fn popping_the_bottom_layer_is_an_error() {
        let mut ctx = Context::empty();
        assert!(ctx.pop().is_ok()); // the (empty) data layer
        assert_eq!(ctx.pop(), Err(RenderError::ContextPop));
    }

    #[test]
    fn scope_pops_even_when_the_body_fails() {
        let mut ctx = Context::empty();
        let before = ctx.depth();
        let result: Result<(), RenderError> =
            ctx.scope(data(&[("x", Value::from(1))]), |ctx| {
                assert!(ctx.contains("x"));
                Err(RenderError::ContextPop)
            });
        assert!(result.is_err());
        assert_eq!(ctx.depth(), before);
        assert!(!ctx.contains("x"));
    }

    #[test]
    fn set_binds_in_the_innermost_layer() {
        let mut ctx = Context::empty();
        ctx.push();
        ctx.set("x", Value::from(1));
        ctx.pop().unwrap();
        assert!(!ctx.contains("x"));
    }
}
