//! `block`, `extends` and `include`.
//!
//! Inheritance renders the root-most parent's node tree; a shared
//! [`BlockContext`] maps block names to the stack of overrides collected
//! on the way up, most-derived last. A block renders by popping its
//! most-derived override, and pushes it back afterwards so sibling
//! renders of the same block (inside loops) see the same state.

use std::any::Any;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::warn;
use vellum_lexer::Token;
use vellum_value::{Object, Value, ValueMap};

use crate::context::Context;
use crate::engine::{self, IncludePolicy};
use crate::error::{RenderError, TemplateSyntaxError};
use crate::expression::FilterExpression;
use crate::library::Library;
use crate::node::{Node, NodeId, NodeKind, NodeList, TagNode};
use crate::parser::Parser;
use crate::template::Template;

pub(crate) fn register(library: &mut Library) {
    library.tag("block", do_block);
    library.tag("extends", do_extends);
    library.tag("include", do_include);
}

/// A named block body, shareable between the compiled tree and the
/// render-time override stacks.
#[derive(Clone)]
pub(crate) struct BlockRef {
    pub(crate) name: String,
    pub(crate) nodelist: Arc<NodeList>,
}

/// Render-time map from block name to its override stack, most-derived
/// last. Each `extends` level inserts its blocks at the front, so the
/// root template's defaults end up first.
#[derive(Default)]
pub(crate) struct BlockContext {
    blocks: FxHashMap<String, Vec<BlockRef>>,
}

impl BlockContext {
    pub(crate) fn new() -> Self {
        BlockContext::default()
    }

    pub(crate) fn add_blocks(&mut self, blocks: &FxHashMap<String, BlockRef>) {
        for (name, block) in blocks {
            self.blocks
                .entry(name.clone())
                .or_default()
                .insert(0, block.clone());
        }
    }

    pub(crate) fn pop(&mut self, name: &str) -> Option<BlockRef> {
        self.blocks.get_mut(name)?.pop()
    }

    pub(crate) fn push(&mut self, block: BlockRef) {
        self.blocks
            .entry(block.name.clone())
            .or_default()
            .push(block);
    }
}

/// The `block` variable bound while a block body renders; `block.super`
/// is intercepted during path resolution.
pub(crate) struct BlockValue {
    pub(crate) block: BlockRef,
}

impl Object for BlockValue {
    fn attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn display(&self) -> String {
        format!("<block {}>", self.block.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn block_layer(block: BlockRef) -> ValueMap {
    let mut layer = ValueMap::default();
    layer.insert("block".to_owned(), Value::object(BlockValue { block }));
    layer
}

/// Re-render the next block down the chain for `block.super`. The popped
/// level is pushed back afterwards, and the result is safe: it is
/// already-rendered template output.
pub(crate) fn render_super(block: &BlockRef, context: &mut Context) -> Result<Value, RenderError> {
    let next = context
        .render_context
        .block_context
        .as_mut()
        .and_then(|bc| bc.pop(&block.name));
    let Some(next) = next else {
        return Err(RenderError::BlockSuperWithoutParent {
            name: block.name.clone(),
        });
    };
    let mut rendered = String::new();
    let result = context.scope(block_layer(next.clone()), |context| {
        next.nodelist.render(context, &mut rendered)
    });
    if let Some(bc) = context.render_context.block_context.as_mut() {
        bc.push(next);
    }
    result?;
    Ok(Value::safe_string(rendered))
}

pub(crate) struct BlockNode {
    pub(crate) name: String,
    pub(crate) nodelist: Arc<NodeList>,
}

impl TagNode for BlockNode {
    fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        if context.render_context.block_context.is_none() {
            // Rendered standalone: the body is the block.
            let block = BlockRef {
                name: self.name.clone(),
                nodelist: Arc::clone(&self.nodelist),
            };
            return context.scope(block_layer(block), |context| {
                self.nodelist.render(context, out)
            });
        }
        let popped = context
            .render_context
            .block_context
            .as_mut()
            .and_then(|bc| bc.pop(&self.name));
        let active = popped.clone().unwrap_or_else(|| BlockRef {
            name: self.name.clone(),
            nodelist: Arc::clone(&self.nodelist),
        });
        let result = context.scope(block_layer(active.clone()), |context| {
            active.nodelist.render(context, out)
        });
        // Restore the popped level so sibling renders see the full stack.
        if let (Some(bc), Some(saved)) = (context.render_context.block_context.as_mut(), popped) {
            bc.push(saved);
        }
        result
    }

    fn child_nodelists(&self) -> Vec<&NodeList> {
        vec![&self.nodelist]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_block(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    let bits = token.split_contents();
    let [_, name] = bits.as_slice() else {
        return Err(TemplateSyntaxError::other("'block' tag takes only one argument"));
    };
    if !parser.seen_blocks.insert(name.clone()) {
        return Err(TemplateSyntaxError::other(format!(
            "'block' tag with name '{name}' appears more than once"
        )));
    }
    let nodelist = parser.parse(&["endblock"])?;
    let Some(end) = parser.next_token() else {
        return Err(TemplateSyntaxError::unclosed_block_tag("block", &["endblock"]));
    };
    if end.contents != "endblock" && end.contents != format!("endblock {name}") {
        return Err(
            TemplateSyntaxError::invalid_block_tag(&end.contents, &["endblock"])
                .with_line(end.lineno),
        );
    }
    Ok(Node::tag(
        BlockNode {
            name: name.clone(),
            nodelist: Arc::new(nodelist),
        },
        token.lineno,
    ))
}

/// Collect every `block` node in a tree, by name, including nested ones.
fn collect_blocks(list: &NodeList, out: &mut FxHashMap<String, BlockRef>) {
    for node in list.nodes() {
        if let NodeKind::Tag(tag) = &node.kind {
            if let Some(block) = tag.as_any().downcast_ref::<BlockNode>() {
                out.insert(
                    block.name.clone(),
                    BlockRef {
                        name: block.name.clone(),
                        nodelist: Arc::clone(&block.nodelist),
                    },
                );
            }
            for child in tag.child_nodelists() {
                collect_blocks(child, out);
            }
        }
    }
}

fn is_extends_node(node: &Node) -> bool {
    matches!(&node.kind, NodeKind::Tag(tag) if tag.as_any().downcast_ref::<ExtendsNode>().is_some())
}

/// A context value holding an already-compiled template, accepted by
/// `extends` and `include` in place of a name.
pub struct TemplateValue(pub Arc<Template>);

impl Object for TemplateValue {
    fn attr(&self, _name: &str) -> Option<Value> {
        None
    }

    fn display(&self) -> String {
        format!("<template {}>", self.0.origin)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct ExtendsNode {
    origin_name: String,
    parent_expr: FilterExpression,
    /// The extending template's entire node tree.
    nodelist: Arc<NodeList>,
    /// Blocks defined by this template, collected at compile time.
    blocks: FxHashMap<String, BlockRef>,
}

impl ExtendsNode {
    fn find_parent(&self, context: &mut Context) -> Result<Arc<Template>, RenderError> {
        let value = self.parent_expr.resolve(context, false)?;
        if let Value::Object(obj) = &value {
            if let Some(template) = obj.as_any().downcast_ref::<TemplateValue>() {
                return Ok(Arc::clone(&template.0));
            }
        }
        let name = value.render_str();
        if name.is_empty() || !value.is_truthy() {
            let hint = if self.parent_expr.variable().is_literal() {
                String::new()
            } else {
                format!("; got this from the '{}' expression", self.parent_expr.token())
            };
            return Err(RenderError::InvalidParentTemplate { hint });
        }
        let Some(engine) = context.engine().cloned() else {
            return Err(RenderError::NoLoader { name });
        };
        let history = &mut context.render_context.extends_history;
        if history.is_empty() {
            history.push(self.origin_name.clone());
        }
        if history.contains(&name) {
            return Err(RenderError::TemplateCycle { name });
        }
        let parent = engine::get_template(&engine, &name)?;
        context.render_context.extends_history.push(name);
        Ok(parent)
    }
}

impl TagNode for ExtendsNode {
    fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        let parent = self.find_parent(context)?;
        context
            .render_context
            .block_context
            .get_or_insert_with(BlockContext::new)
            .add_blocks(&self.blocks);
        // If the parent extends further, it contributes its blocks when
        // its own extends node renders; only a root parent's defaults are
        // added here.
        let parent_extends = parent
            .nodelist
            .nodes()
            .iter()
            .find(|node| !node.is_text())
            .is_some_and(is_extends_node);
        if !parent_extends {
            let mut parent_blocks = FxHashMap::default();
            collect_blocks(&parent.nodelist, &mut parent_blocks);
            if let Some(bc) = context.render_context.block_context.as_mut() {
                bc.add_blocks(&parent_blocks);
            }
        }
        let limit = recursion_limit(context);
        context.render_context.depth += 1;
        let result = if context.render_context.depth > limit {
            Err(RenderError::RecursionLimit {
                name: parent.origin.name.clone(),
                limit,
            })
        } else {
            parent.render_into(context, out)
        };
        context.render_context.depth -= 1;
        result
    }

    fn must_be_first(&self) -> bool {
        true
    }

    fn child_nodelists(&self) -> Vec<&NodeList> {
        vec![&self.nodelist]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_extends(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    let bits = token.split_contents();
    let [_, parent] = bits.as_slice() else {
        return Err(TemplateSyntaxError::other("'extends' takes one argument"));
    };
    let parent_expr = parser.compile_filter(parent)?;
    if parser.contains_block_tag("extends") {
        return Err(TemplateSyntaxError::other(
            "'extends' cannot appear more than once in the same template",
        ));
    }
    let nodelist = Arc::new(parser.parse(&[])?);
    let mut blocks = FxHashMap::default();
    collect_blocks(&nodelist, &mut blocks);
    Ok(Node::tag(
        ExtendsNode {
            origin_name: parser.origin().name.clone(),
            parent_expr,
            nodelist,
            blocks,
        },
        token.lineno,
    ))
}

fn recursion_limit(context: &Context) -> usize {
    context.engine().map_or(64, |engine| engine.recursion_limit)
}

pub(crate) struct IncludeNode {
    id: NodeId,
    template_expr: FilterExpression,
    extra: Vec<(String, FilterExpression)>,
    isolated: bool,
}

impl IncludeNode {
    fn render_contents(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        let value = self.template_expr.resolve(context, false)?;
        let template = self.resolve_template(value, context)?;
        let mut values = ValueMap::default();
        for (name, expr) in &self.extra {
            values.insert(name.clone(), expr.resolve(context, false)?);
        }
        // Inheritance state belongs to one template render; only the
        // extends chain shares it. Park the outer state so the included
        // template starts its own, and put it back afterwards.
        let saved_blocks = context.render_context.block_context.take();
        let saved_history = std::mem::take(&mut context.render_context.extends_history);
        let limit = recursion_limit(context);
        context.render_context.depth += 1;
        let result = if context.render_context.depth > limit {
            Err(RenderError::RecursionLimit {
                name: template.origin.name.clone(),
                limit,
            })
        } else if self.isolated {
            let mut isolated = context.new_isolated(values);
            template.render_into(&mut isolated, out)
        } else {
            context.scope(values, |context| template.render_into(context, out))
        };
        context.render_context.depth -= 1;
        context.render_context.block_context = saved_blocks;
        context.render_context.extends_history = saved_history;
        result
    }

    /// Accept a pre-compiled template value or load by name, caching the
    /// loaded template per node so includes inside loops hit the loader
    /// once.
    fn resolve_template(
        &self,
        value: Value,
        context: &mut Context,
    ) -> Result<Arc<Template>, RenderError> {
        if let Value::Object(obj) = &value {
            if let Some(template) = obj.as_any().downcast_ref::<TemplateValue>() {
                return Ok(Arc::clone(&template.0));
            }
        }
        let name = value.render_str();
        if let Some(hit) = context.render_context.include_cache_mut(self.id).get(&name) {
            return Ok(Arc::clone(hit));
        }
        let Some(engine) = context.engine().cloned() else {
            return Err(RenderError::NoLoader { name });
        };
        let template = engine::get_template(&engine, &name)?;
        context
            .render_context
            .include_cache_mut(self.id)
            .insert(name, Arc::clone(&template));
        Ok(template)
    }
}

impl TagNode for IncludeNode {
    fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        // Buffer so a failing include contributes nothing under the
        // tolerant policy.
        let mut rendered = String::new();
        match self.render_contents(context, &mut rendered) {
            Ok(()) => {
                out.push_str(&rendered);
                Ok(())
            }
            Err(err) => {
                let policy = context
                    .engine()
                    .map_or(IncludePolicy::Propagate, |engine| engine.include_errors);
                match policy {
                    IncludePolicy::Propagate => Err(err),
                    IncludePolicy::LogAndIgnore => {
                        warn!(
                            template = self.template_expr.token(),
                            error = %err,
                            "include failed"
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_include(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    let mut bits = token.split_contents();
    if bits.len() < 2 {
        return Err(TemplateSyntaxError::other(
            "'include' tag takes at least one argument: the template to include",
        ));
    }
    let template_expr = parser.compile_filter(&bits[1])?;
    let mut remaining = bits.split_off(2);
    let mut extra = Vec::new();
    let mut isolated = false;
    let mut seen_with = false;
    while !remaining.is_empty() {
        let option = remaining.remove(0);
        match option.as_str() {
            "with" => {
                if seen_with {
                    return Err(TemplateSyntaxError::other(
                        "the 'with' option was specified more than once",
                    ));
                }
                extra = crate::defaulttags::token_kwargs(&mut remaining, parser)?;
                if extra.is_empty() {
                    return Err(TemplateSyntaxError::other(
                        "'with' in 'include' tag needs at least one keyword argument",
                    ));
                }
                seen_with = true;
            }
            "only" => {
                if isolated {
                    return Err(TemplateSyntaxError::other(
                        "the 'only' option was specified more than once",
                    ));
                }
                isolated = true;
            }
            other => {
                return Err(TemplateSyntaxError::other(format!(
                    "unknown argument for 'include' tag: '{other}'"
                )));
            }
        }
    }
    Ok(Node::tag(
        IncludeNode {
            id: parser.next_node_id(),
            template_expr,
            extra,
            isolated,
        },
        token.lineno,
    ))
}
