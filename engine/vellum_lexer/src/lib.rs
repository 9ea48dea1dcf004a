//! Tokenizer for the Vellum template language.
//!
//! Splits raw template source into a flat sequence of [`Token`]s in a
//! single linear pass. The four token kinds correspond to the three
//! delimiter pairs plus literal text:
//!
//! - `{% ... %}` — block tag
//! - `{{ ... }}` — variable
//! - `{# ... #}` — comment
//! - everything else — text
//!
//! Malformed delimiters are not a lexer error: an unterminated `{%` simply
//! never matches the tag pattern and the span stays literal text. Syntax
//! validity is the parser's responsibility.

use once_cell::sync::Lazy;
use regex::Regex;

/// Comment content is only preserved when it carries a note for
/// translators; everything else is dropped at lex time.
pub const TRANSLATOR_COMMENT_MARK: &str = "TRANSLATORS";

const BLOCK_TAG_START: &str = "{%";
const VARIABLE_TAG_START: &str = "{{";

/// Matches one complete tag, including delimiters. `.` does not match a
/// newline, so a delimiter pair must close on the same line it opens.
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{%.*?%\}|\{\{.*?\}\}|\{#.*?#\}").expect("tag regex is valid"));

/// The kind of a lexed token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal template text, emitted verbatim.
    Text,
    /// A `{{ ... }}` variable interpolation.
    Variable,
    /// A `{% ... %}` block tag.
    Block,
    /// A `{# ... #}` comment.
    Comment,
}

/// One token of template source.
///
/// Immutable once produced; consumed exactly once by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Tag and variable tokens hold the delimiter-stripped, trimmed
    /// interior; text tokens hold the raw span.
    pub contents: String,
    /// 1-based line number of the token's first character.
    pub lineno: usize,
    /// Byte range in the original source. Only populated by
    /// [`tokenize_debug`]; used for error windows.
    pub span: Option<(usize, usize)>,
}

impl Token {
    fn new(kind: TokenKind, contents: impl Into<String>, lineno: usize) -> Self {
        Token {
            kind,
            contents: contents.into(),
            lineno,
            span: None,
        }
    }

    /// Split the token contents on whitespace, keeping quoted runs (and
    /// any `key="..."` prefix attached to them) as single bits, and
    /// rejoining translation-marked groups like `_("hello world")`.
    pub fn split_contents(&self) -> Vec<String> {
        let mut split = Vec::new();
        let mut bits = smart_split(&self.contents).into_iter();
        while let Some(mut bit) = bits.next() {
            if bit.starts_with("_(\"") || bit.starts_with("_('") {
                // Unicode-safe: the prefix above guarantees byte 2 is a quote.
                let sentinel = format!("{})", &bit[2..3]);
                let mut group = vec![bit.clone()];
                while !bit.ends_with(&sentinel) {
                    match bits.next() {
                        Some(next) => {
                            bit = next;
                            group.push(bit.clone());
                        }
                        None => break,
                    }
                }
                bit = group.join(" ");
            }
            split.push(bit);
        }
        split
    }
}

/// Split on whitespace, but keep quoted substrings together. A quoted run
/// glued to surrounding non-space characters (e.g. `default:"a b"`) stays
/// one bit, quotes included. Backslash escapes are honoured inside quotes.
pub fn smart_split(text: &str) -> Vec<String> {
    let mut bits = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in text.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None => {
                if ch.is_whitespace() {
                    if !current.is_empty() {
                        bits.push(std::mem::take(&mut current));
                    }
                } else {
                    if ch == '"' || ch == '\'' {
                        quote = Some(ch);
                    }
                    current.push(ch);
                }
            }
        }
    }
    if !current.is_empty() {
        bits.push(current);
    }
    bits
}

/// Template lexer. Holds only the verbatim-mode state; tokenizing is a
/// single pass over the source.
struct Lexer<'a> {
    source: &'a str,
    /// When inside `{% verbatim %}`, the end-tag contents that close it
    /// (`endverbatim`, or `endverbatim name` for the named form).
    verbatim: Option<String>,
    with_spans: bool,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, with_spans: bool) -> Self {
        Lexer {
            source,
            verbatim: None,
            with_spans,
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        let mut result = Vec::new();
        let mut lineno = 1;
        let mut last = 0;

        let mut push = |this: &mut Self, start: usize, end: usize, in_tag: bool, lineno: &mut usize| {
            let piece = &this.source[start..end];
            if !piece.is_empty() {
                let mut token = this.create_token(piece, *lineno, in_tag);
                if this.with_spans {
                    token.span = Some((start, end));
                }
                result.push(token);
                *lineno += piece.matches('\n').count();
            }
        };

        // Parallel to a split-with-captures: the gaps between matches are
        // literal text, the matches are tags.
        let matches: Vec<(usize, usize)> = TAG_RE
            .find_iter(self.source)
            .map(|m| (m.start(), m.end()))
            .collect();
        for (start, end) in matches {
            push(&mut self, last, start, false, &mut lineno);
            push(&mut self, start, end, true, &mut lineno);
            last = end;
        }
        let end = self.source.len();
        push(&mut self, last, end, false, &mut lineno);

        result
    }

    /// Convert one source span into a token. `in_tag` is true when the
    /// span matched the tag pattern; otherwise it is literal text.
    fn create_token(&mut self, piece: &str, lineno: usize, in_tag: bool) -> Token {
        if in_tag {
            if piece.starts_with(BLOCK_TAG_START) {
                let contents = piece[2..piece.len() - 2].trim().to_owned();
                if let Some(end_tag) = &self.verbatim {
                    if contents != *end_tag {
                        // Inside a verbatim block every tag is literal.
                        return Token::new(TokenKind::Text, piece, lineno);
                    }
                    // The current verbatim block is ending.
                    self.verbatim = None;
                } else if contents == "verbatim" || contents.starts_with("verbatim ") {
                    self.verbatim = Some(format!("end{contents}"));
                }
                return Token::new(TokenKind::Block, contents, lineno);
            }
            if self.verbatim.is_none() {
                let contents = piece[2..piece.len() - 2].trim();
                if piece.starts_with(VARIABLE_TAG_START) {
                    return Token::new(TokenKind::Variable, contents, lineno);
                }
                // Comment contents are dropped unless addressed to
                // translators.
                let contents = if contents.starts_with(TRANSLATOR_COMMENT_MARK) {
                    contents
                } else {
                    ""
                };
                return Token::new(TokenKind::Comment, contents, lineno);
            }
        }
        Token::new(TokenKind::Text, piece, lineno)
    }
}

/// Tokenize template source.
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source, false).tokenize()
}

/// Tokenize template source, annotating every token with its byte span.
/// Slower than [`tokenize`]; used when the engine runs in debug mode so
/// syntax errors can show the offending source window.
pub fn tokenize_debug(source: &str) -> Vec<Token> {
    Lexer::new(source, true).tokenize()
}
