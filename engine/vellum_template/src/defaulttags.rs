//! The built-in control tags: `comment`, `verbatim`, `with`, `if`, `for`.

use std::any::Any;

use vellum_lexer::Token;
use vellum_value::{Value, ValueMap};

use crate::condition::{parse_condition, Condition};
use crate::context::Context;
use crate::error::{RenderError, TemplateSyntaxError};
use crate::expression::FilterExpression;
use crate::library::Library;
use crate::node::{Node, NodeKind, NodeList, TagNode};
use crate::parser::Parser;

pub(crate) fn register(library: &mut Library) {
    library.tag("comment", do_comment);
    library.tag("verbatim", do_verbatim);
    library.tag("with", do_with);
    library.tag("if", do_if);
    library.tag("for", do_for);
}

/// Parse leading `name=expression` bits off the front of `bits`.
/// Stops at the first bit that is not an assignment.
pub(crate) fn token_kwargs(
    bits: &mut Vec<String>,
    parser: &Parser,
) -> Result<Vec<(String, FilterExpression)>, TemplateSyntaxError> {
    let mut kwargs = Vec::new();
    loop {
        let Some(first) = bits.first() else { break };
        let Some((key, value)) = first.split_once('=') else {
            break;
        };
        if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
            break;
        }
        let key = key.to_owned();
        let expr = parser.compile_filter(value)?;
        kwargs.push((key, expr));
        bits.remove(0);
    }
    Ok(kwargs)
}

struct CommentNode;

impl TagNode for CommentNode {
    fn render(&self, _context: &mut Context, _out: &mut String) -> Result<(), RenderError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_comment(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    parser.skip_past("endcomment")?;
    Ok(Node::tag(CommentNode, token.lineno))
}

/// The lexer already demoted everything inside the block to text; the
/// node just stores the concatenation.
struct VerbatimNode {
    content: String,
}

impl TagNode for VerbatimNode {
    fn render(&self, _context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        out.push_str(&self.content);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_verbatim(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    let nodelist = parser.parse(&["endverbatim"])?;
    parser.delete_first_token();
    let mut content = String::new();
    for node in nodelist.nodes() {
        if let NodeKind::Text(text) = &node.kind {
            content.push_str(text);
        }
    }
    Ok(Node::tag(VerbatimNode { content }, token.lineno))
}

struct WithNode {
    extra: Vec<(String, FilterExpression)>,
    nodelist: NodeList,
}

impl TagNode for WithNode {
    fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        // Values resolve in the enclosing scope, before the new layer
        // exists.
        let mut layer = ValueMap::default();
        for (name, expr) in &self.extra {
            layer.insert(name.clone(), expr.resolve(context, false)?);
        }
        context.scope(layer, |context| self.nodelist.render(context, out))
    }

    fn child_nodelists(&self) -> Vec<&NodeList> {
        vec![&self.nodelist]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_with(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    let mut bits = token.split_contents();
    bits.remove(0);
    let extra = token_kwargs(&mut bits, parser)?;
    if extra.is_empty() {
        return Err(TemplateSyntaxError::other(
            "'with' expected at least one variable assignment",
        ));
    }
    if !bits.is_empty() {
        return Err(TemplateSyntaxError::other(format!(
            "'with' received an invalid token: '{}'",
            bits.join(" ")
        )));
    }
    let nodelist = parser.parse(&["endwith"])?;
    parser.delete_first_token();
    Ok(Node::tag(WithNode { extra, nodelist }, token.lineno))
}

struct IfNode {
    /// `(condition, body)` per branch; `None` is the `else` branch.
    branches: Vec<(Option<Condition>, NodeList)>,
}

impl TagNode for IfNode {
    fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        for (condition, nodelist) in &self.branches {
            let take = match condition {
                Some(condition) => condition.eval(context)?,
                None => true,
            };
            if take {
                return nodelist.render(context, out);
            }
        }
        Ok(())
    }

    fn child_nodelists(&self) -> Vec<&NodeList> {
        self.branches.iter().map(|(_, nodelist)| nodelist).collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_if(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    let mut bits = token.split_contents();
    bits.remove(0);
    let condition = parse_condition(&bits, parser)?;
    let nodelist = parser.parse(&["elif", "else", "endif"])?;
    let mut branches = vec![(Some(condition), nodelist)];

    let mut end = next_required(parser, &["elif", "else", "endif"])?;
    while end.contents.starts_with("elif") {
        let mut bits = end.split_contents();
        bits.remove(0);
        let condition = parse_condition(&bits, parser).map_err(|e| e.with_line(end.lineno))?;
        let nodelist = parser.parse(&["elif", "else", "endif"])?;
        branches.push((Some(condition), nodelist));
        end = next_required(parser, &["elif", "else", "endif"])?;
    }
    if end.contents == "else" {
        let nodelist = parser.parse(&["endif"])?;
        branches.push((None, nodelist));
        end = next_required(parser, &["endif"])?;
    }
    if end.contents != "endif" {
        return Err(
            TemplateSyntaxError::invalid_block_tag(&end.contents, &["endif"])
                .with_line(end.lineno),
        );
    }
    Ok(Node::tag(IfNode { branches }, token.lineno))
}

fn next_required(parser: &mut Parser, expected: &[&str]) -> Result<Token, TemplateSyntaxError> {
    parser
        .next_token()
        .ok_or_else(|| TemplateSyntaxError::unclosed_block_tag("if", expected))
}

struct ForNode {
    loopvars: Vec<String>,
    sequence: FilterExpression,
    reversed: bool,
    nodelist_loop: NodeList,
    nodelist_empty: Option<NodeList>,
}

impl ForNode {
    fn items(&self, context: &mut Context) -> Result<Vec<Value>, RenderError> {
        let values = self.sequence.resolve(context, true)?;
        match &values {
            Value::None => Ok(Vec::new()),
            Value::List(items) => Ok(items.to_vec()),
            Value::Str { text, .. } => Ok(text
                .chars()
                .map(|c| Value::string(c.to_string()))
                .collect()),
            other => Err(RenderError::NotIterable { kind: other.kind() }),
        }
    }
}

impl TagNode for ForNode {
    fn render(&self, context: &mut Context, out: &mut String) -> Result<(), RenderError> {
        let parentloop = context.get("forloop").cloned();
        context.scope(ValueMap::default(), |context| {
            let mut items = self.items(context)?;
            if items.is_empty() {
                if let Some(empty) = &self.nodelist_empty {
                    return empty.render(context, out);
                }
                return Ok(());
            }
            if self.reversed {
                items.reverse();
            }
            let len = items.len();
            let unpack = self.loopvars.len() > 1;
            for (i, item) in items.into_iter().enumerate() {
                let mut forloop = ValueMap::default();
                forloop.insert("counter0".to_owned(), Value::from(i));
                forloop.insert("counter".to_owned(), Value::from(i + 1));
                forloop.insert("revcounter".to_owned(), Value::from(len - i));
                forloop.insert("revcounter0".to_owned(), Value::from(len - i - 1));
                forloop.insert("first".to_owned(), Value::Bool(i == 0));
                forloop.insert("last".to_owned(), Value::Bool(i == len - 1));
                forloop.insert(
                    "parentloop".to_owned(),
                    parentloop
                        .clone()
                        .unwrap_or_else(|| Value::map(ValueMap::default())),
                );
                context.set("forloop", Value::map(forloop));
                if unpack {
                    let parts = match &item {
                        Value::List(parts) if parts.len() == self.loopvars.len() => parts.to_vec(),
                        Value::List(parts) => {
                            return Err(RenderError::UnpackMismatch {
                                expected: self.loopvars.len(),
                                got: parts.len(),
                            });
                        }
                        _ => {
                            return Err(RenderError::UnpackMismatch {
                                expected: self.loopvars.len(),
                                got: 1,
                            });
                        }
                    };
                    let layer: ValueMap = self
                        .loopvars
                        .iter()
                        .cloned()
                        .zip(parts)
                        .collect();
                    context.scope(layer, |context| self.nodelist_loop.render(context, out))?;
                } else {
                    context.set(self.loopvars[0].as_str(), item);
                    self.nodelist_loop.render(context, out)?;
                }
            }
            Ok(())
        })
    }

    fn child_nodelists(&self) -> Vec<&NodeList> {
        let mut lists = vec![&self.nodelist_loop];
        if let Some(empty) = &self.nodelist_empty {
            lists.push(empty);
        }
        lists
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn do_for(parser: &mut Parser, token: &Token) -> Result<Node, TemplateSyntaxError> {
    let bits = token.split_contents();
    if bits.len() < 4 {
        return Err(TemplateSyntaxError::other(format!(
            "'for' statements should have at least four words: {}",
            token.contents
        )));
    }
    let reversed = bits[bits.len() - 1] == "reversed";
    let in_index = if reversed {
        bits.len() - 3
    } else {
        bits.len() - 2
    };
    if bits[in_index] != "in" {
        return Err(TemplateSyntaxError::other(format!(
            "'for' statements should use the format 'for x in y': {}",
            token.contents
        )));
    }
    let loopvars: Vec<String> = bits[1..in_index]
        .join(" ")
        .split(',')
        .map(|var| var.trim().to_owned())
        .collect();
    for var in &loopvars {
        if var.is_empty() || !var.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(TemplateSyntaxError::other(format!(
                "'for' tag received an invalid argument: {}",
                token.contents
            )));
        }
    }
    let sequence = parser.compile_filter(&bits[in_index + 1])?;
    let nodelist_loop = parser.parse(&["empty", "endfor"])?;
    let mut nodelist_empty = None;
    let Some(end) = parser.next_token() else {
        return Err(TemplateSyntaxError::unclosed_block_tag("for", &["empty", "endfor"]));
    };
    if end.contents == "empty" {
        nodelist_empty = Some(parser.parse(&["endfor"])?);
        parser.delete_first_token();
    }
    Ok(Node::tag(
        ForNode {
            loopvars,
            sequence,
            reversed,
            nodelist_loop,
            nodelist_empty,
        },
        token.lineno,
    ))
}
