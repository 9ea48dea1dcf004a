//! The recursive-descent template parser.
//!
//! The parser owns the token stream (reversed, so taking the next token
//! is a pop) and the tag/filter lookup tables merged from the engine's
//! libraries. Tag compile functions re-enter [`Parser::parse`] with an
//! `until` list to consume their bodies; the terminating tag is pushed
//! back for the caller to inspect.

use rustc_hash::{FxHashMap, FxHashSet};
use vellum_lexer::{Token, TokenKind};

use crate::error::TemplateSyntaxError;
use crate::expression::FilterExpression;
use crate::library::{FilterEntry, Library, TagFn};
use crate::node::{Node, NodeId, NodeList};
use crate::template::Origin;

pub struct Parser {
    /// Remaining tokens, innermost-next last.
    tokens: Vec<Token>,
    tags: FxHashMap<String, TagFn>,
    filters: FxHashMap<String, FilterEntry>,
    /// Open block tags, for unclosed-tag diagnostics.
    command_stack: Vec<(String, usize)>,
    origin: Origin,
    next_id: u32,
    /// Block names seen so far; duplicates are compile errors.
    pub(crate) seen_blocks: FxHashSet<String>,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>, libraries: &[Library], origin: Origin) -> Self {
        tokens.reverse();
        let mut tags = FxHashMap::default();
        let mut filters = FxHashMap::default();
        for library in libraries {
            tags.extend(library.tags().iter().map(|(k, v)| (k.clone(), v.clone())));
            filters.extend(library.filters().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Parser {
            tokens,
            tags,
            filters,
            command_stack: Vec::new(),
            origin,
            next_id: 0,
            seen_blocks: FxHashSet::default(),
        }
    }

    /// Parse until one of the `until` tags (exclusive) or end of input.
    /// The terminating tag is pushed back onto the stream.
    pub fn parse(&mut self, until: &[&str]) -> Result<NodeList, TemplateSyntaxError> {
        let mut nodelist = NodeList::new();
        while let Some(token) = self.next_token() {
            let lineno = token.lineno;
            match token.kind {
                TokenKind::Text => {
                    self.extend_nodelist(&mut nodelist, Node::text(token.contents, lineno), None)?;
                }
                TokenKind::Comment => {}
                TokenKind::Variable => {
                    if token.contents.is_empty() {
                        return Err(TemplateSyntaxError::empty_variable_tag().with_line(lineno));
                    }
                    let expr = self
                        .compile_filter(&token.contents)
                        .map_err(|e| e.with_line(lineno))?;
                    self.extend_nodelist(&mut nodelist, Node::variable(expr, lineno), None)?;
                }
                TokenKind::Block => {
                    let Some(command) = token.contents.split_whitespace().next() else {
                        return Err(TemplateSyntaxError::empty_block_tag().with_line(lineno));
                    };
                    let command = command.to_owned();
                    if until.contains(&command.as_str()) {
                        self.prepend_token(token);
                        return Ok(nodelist);
                    }
                    self.command_stack.push((command.clone(), lineno));
                    let Some(compile) = self.tags.get(&command).cloned() else {
                        return Err(
                            TemplateSyntaxError::invalid_block_tag(&command, until)
                                .with_line(lineno),
                        );
                    };
                    let node = compile(self, &token).map_err(|e| e.with_line(lineno))?;
                    self.extend_nodelist(&mut nodelist, node, Some(&command))?;
                    self.command_stack.pop();
                }
            }
        }
        if !until.is_empty() {
            let (command, lineno) = self
                .command_stack
                .last()
                .cloned()
                .unwrap_or_else(|| (until.join("/"), 0));
            let mut err = TemplateSyntaxError::unclosed_block_tag(&command, until);
            if lineno > 0 {
                err = err.with_line(lineno);
            }
            return Err(err);
        }
        Ok(nodelist)
    }

    fn extend_nodelist(
        &self,
        nodelist: &mut NodeList,
        node: Node,
        command: Option<&str>,
    ) -> Result<(), TemplateSyntaxError> {
        if node.must_be_first() && nodelist.contains_nontext {
            return Err(
                TemplateSyntaxError::must_be_first(command.unwrap_or("this tag"))
                    .with_line(node.lineno),
            );
        }
        nodelist.push(node);
        Ok(())
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.tokens.pop()
    }

    pub fn prepend_token(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Drop the next token; used to consume a known terminating tag.
    pub fn delete_first_token(&mut self) {
        self.tokens.pop();
    }

    /// Consume tokens up to and including `endtag`, compiling nothing.
    pub fn skip_past(&mut self, endtag: &str) -> Result<(), TemplateSyntaxError> {
        while let Some(token) = self.next_token() {
            if token.kind == TokenKind::Block && token.contents == endtag {
                return Ok(());
            }
        }
        let (command, lineno) = self
            .command_stack
            .last()
            .cloned()
            .unwrap_or_else(|| (endtag.to_owned(), 0));
        let mut err = TemplateSyntaxError::unclosed_block_tag(&command, &[endtag]);
        if lineno > 0 {
            err = err.with_line(lineno);
        }
        Err(err)
    }

    pub fn compile_filter(&self, token: &str) -> Result<FilterExpression, TemplateSyntaxError> {
        FilterExpression::new(token, self)
    }

    pub fn find_filter(&self, name: &str) -> Result<&FilterEntry, TemplateSyntaxError> {
        self.filters
            .get(name)
            .ok_or_else(|| TemplateSyntaxError::invalid_filter(name))
    }

    /// Whether an unconsumed block tag named `name` remains in the stream.
    pub(crate) fn contains_block_tag(&self, name: &str) -> bool {
        self.tokens.iter().any(|token| {
            token.kind == TokenKind::Block
                && token.contents.split_whitespace().next() == Some(name)
        })
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// A node id unique within this template.
    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }
}
