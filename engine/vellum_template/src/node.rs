//! Compiled template nodes.
//!
//! Parsing produces a [`NodeList`] of [`Node`]s. Text and variable nodes
//! are built in; everything a `{% ... %}` tag compiles to goes through the
//! [`TagNode`] trait object so tag libraries can contribute node types.

use std::any::Any;

use vellum_value::{html_escape, Value};

use crate::context::Context;
use crate::error::RenderError;
use crate::expression::FilterExpression;

/// Compile-time identity of a node, unique within one template. Render
/// state that must survive across renders of the same compiled template
/// (per-node include caches) is keyed by this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// A node compiled from a `{% ... %}` tag.
pub trait TagNode: Send + Sync {
    /// Append this node's output to `out`.
    fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError>;

    /// Whether this tag must be the first non-text node in a template.
    fn must_be_first(&self) -> bool {
        false
    }

    /// Child node lists, for tree walks such as block collection.
    fn child_nodelists(&self) -> Vec<&NodeList> {
        Vec::new()
    }

    /// Downcast support for node-type-specific tree walks.
    fn as_any(&self) -> &dyn Any;
}

pub enum NodeKind {
    Text(String),
    Variable(FilterExpression),
    Tag(Box<dyn TagNode>),
}

pub struct Node {
    pub kind: NodeKind,
    /// 1-based source line the node started on.
    pub lineno: usize,
}

impl Node {
    pub(crate) fn text(contents: String, lineno: usize) -> Self {
        Node {
            kind: NodeKind::Text(contents),
            lineno,
        }
    }

    pub(crate) fn variable(expr: FilterExpression, lineno: usize) -> Self {
        Node {
            kind: NodeKind::Variable(expr),
            lineno,
        }
    }

    pub fn tag(node: impl TagNode + 'static, lineno: usize) -> Self {
        Node {
            kind: NodeKind::Tag(Box::new(node)),
            lineno,
        }
    }

    pub(crate) fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    pub(crate) fn must_be_first(&self) -> bool {
        match &self.kind {
            NodeKind::Tag(tag) => tag.must_be_first(),
            _ => false,
        }
    }

    pub fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        match &self.kind {
            NodeKind::Text(text) => {
                out.push_str(text);
                Ok(())
            }
            NodeKind::Variable(expr) => {
                let value = expr.resolve(context, false)?;
                out.push_str(&render_value(&value, context));
                Ok(())
            }
            NodeKind::Tag(tag) => tag.render(context, out),
        }
    }
}

/// Convert a resolved value to its output string, HTML-escaping it when
/// the context autoescapes and the value is not marked safe.
pub(crate) fn render_value(value: &Value, context: &Context) -> String {
    let text = value.render_str();
    if context.autoescape() && !value.is_safe() {
        html_escape(&text)
    } else {
        text
    }
}

/// An ordered sequence of compiled nodes.
#[derive(Default)]
pub struct NodeList {
    nodes: Vec<Node>,
    /// False until a variable or tag node is appended; `must_be_first`
    /// enforcement keys off this.
    pub(crate) contains_nontext: bool,
}

impl NodeList {
    pub fn new() -> Self {
        NodeList::default()
    }

    pub fn push(&mut self, node: Node) {
        if !node.is_text() {
            self.contains_nontext = true;
        }
        self.nodes.push(node);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render every node in order into `out`.
    pub fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        for node in &self.nodes {
            node.render(context, out)?;
        }
        Ok(())
    }

    /// Render into a fresh string.
    pub fn render_to_string(&self, context: &mut Context) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render(context, &mut out)?;
        Ok(out)
    }
}
