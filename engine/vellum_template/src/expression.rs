//! Variable and filter-expression resolution.
//!
//! A [`Variable`] is one side of the expression grammar: a literal
//! (number, quoted string, translation-marked string) or a dotted lookup
//! path. A [`FilterExpression`] is a variable followed by a pipeline of
//! filters, parsed in a single regex pass with no gaps allowed between
//! matches.

use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use tracing::debug;
use vellum_value::{CallError, Value};

use crate::context::Context;
use crate::engine::MissingVariablePolicy;
use crate::error::{RenderError, SyntaxErrorKind, TemplateSyntaxError};
use crate::library::{FilterArity, FilterContext, FilterEntry};
use crate::loader_tags::{render_super, BlockValue};
use crate::parser::Parser;

const STR_DQ: &str = r#""[^"\\]*(?:\\.[^"\\]*)*""#;
const STR_SQ: &str = r"'[^'\\]*(?:\\.[^'\\]*)*'";
const NUM: &str = r"[-+.]?\d[\d.e]*";
const VAR: &str = r"[\w.]+";

/// One pattern recognizes the whole expression grammar: an anchored
/// leading constant or variable, then repeated `|filter` or
/// `|filter:arg` segments. The compiler walks the matches and rejects
/// any gap between them.
static FILTER_RE: Lazy<Regex> = Lazy::new(|| {
    let constant = format!(r"_\({STR_DQ}\)|_\({STR_SQ}\)|{STR_DQ}|{STR_SQ}");
    let pattern = format!(
        r"^(?P<constant>{constant})|^(?P<var>{VAR}|{NUM})|(?:\s*\|\s*(?P<filter_name>\w+)(?::(?:(?P<constant_arg>{constant})|(?P<var_arg>{VAR}|{NUM})))?)"
    );
    Regex::new(&pattern).expect("filter regex is valid")
});

type Lookups = SmallVec<[String; 2]>;

/// A template variable: either a literal or a dotted lookup path.
#[derive(Clone)]
pub struct Variable {
    var: String,
    literal: Option<Value>,
    lookups: Option<Lookups>,
    translate: bool,
}

impl Variable {
    pub fn new(var: &str) -> Result<Self, TemplateSyntaxError> {
        if var.is_empty() {
            return Err(TemplateSyntaxError::new(SyntaxErrorKind::MissingVariable {
                expression: String::new(),
            }));
        }
        let mut translate = false;
        let mut text = var;
        let literal = match parse_number(text)? {
            Some(value) => Some(value),
            None => {
                if let Some(inner) = text.strip_prefix("_(").and_then(|t| t.strip_suffix(')')) {
                    translate = true;
                    text = inner;
                }
                // Quoted literals are trusted: they come from the template
                // author, not from context data.
                parse_string_literal(text).map(Value::safe_string)
            }
        };
        let lookups = if literal.is_some() {
            None
        } else {
            if text.starts_with('_') || text.contains("._") {
                return Err(TemplateSyntaxError::reserved_name(var));
            }
            Some(text.split('.').map(str::to_owned).collect())
        };
        Ok(Variable {
            var: var.to_owned(),
            literal,
            lookups,
            translate,
        })
    }

    /// The source text of this variable, as written in the template.
    pub fn text(&self) -> &str {
        &self.var
    }

    pub fn is_literal(&self) -> bool {
        self.literal.is_some()
    }

    pub fn resolve(&self, context: &mut Context) -> Result<Value, RenderError> {
        let value = match (&self.literal, &self.lookups) {
            (Some(literal), _) => literal.clone(),
            (None, Some(lookups)) => resolve_lookup(&self.var, lookups, context)?,
            // new() always sets exactly one of the two
            (None, None) => Value::None,
        };
        if self.translate {
            Ok(translate_value(value, context))
        } else {
            Ok(value)
        }
    }
}

impl std::fmt::Debug for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Variable({:?})", self.var)
    }
}

/// Parse a numeric literal. `None` means "not a number"; trailing-dot
/// forms like `2.` are malformed rather than lookupable names.
fn parse_number(text: &str) -> Result<Option<Value>, TemplateSyntaxError> {
    let Ok(float) = text.parse::<f64>() else {
        return Ok(None);
    };
    if text.ends_with('.') {
        return Err(TemplateSyntaxError::invalid_number(text));
    }
    if text.contains('.') || text.contains(['e', 'E']) {
        Ok(Some(Value::Float(float)))
    } else {
        match text.parse::<i64>() {
            Ok(int) => Ok(Some(Value::Int(int))),
            Err(_) => Ok(Some(Value::Float(float))),
        }
    }
}

/// Strip matching quotes and process `\"`/`\'`/`\\` escapes.
fn parse_string_literal(text: &str) -> Option<String> {
    let mut chars = text.chars();
    let quote = chars.next()?;
    if !matches!(quote, '"' | '\'') || text.len() < 2 || !text.ends_with(quote) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            if ch != quote && ch != '\\' {
                out.push('\\');
            }
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            out.push(ch);
        }
    }
    if escaped {
        out.push('\\');
    }
    Some(out)
}

fn missing(path: &str, segment: &str) -> RenderError {
    RenderError::VariableDoesNotExist {
        path: path.to_owned(),
        segment: segment.to_owned(),
    }
}

fn resolve_lookup(
    path: &str,
    lookups: &Lookups,
    context: &mut Context,
) -> Result<Value, RenderError> {
    let Some((first, rest)) = lookups.split_first() else {
        return Err(missing(path, ""));
    };
    let mut current = match context.get(first) {
        Some(value) => value.clone(),
        None => return Err(missing(path, first)),
    };
    current = auto_invoke(current, context)?;
    for bit in rest {
        // block.super re-renders the next block down the inheritance chain
        let super_block = if bit.as_str() == "super" {
            match &current {
                Value::Object(obj) => obj
                    .as_any()
                    .downcast_ref::<BlockValue>()
                    .map(|bv| bv.block.clone()),
                _ => None,
            }
        } else {
            None
        };
        if let Some(block) = super_block {
            current = render_super(&block, context)?;
            continue;
        }
        let next = current
            .get_key(bit)
            .or_else(|| current.get_attr(bit))
            .or_else(|| bit.parse::<usize>().ok().and_then(|i| current.get_index(i)));
        current = match next {
            Some(value) => auto_invoke(value, context)?,
            None => return Err(missing(path, bit)),
        };
    }
    Ok(current)
}

/// Auto-invoke zero-argument callables encountered during resolution.
/// Data-altering callables and those that fail in a declared-silent way
/// resolve to the engine's invalid-value placeholder.
fn auto_invoke(value: Value, context: &Context) -> Result<Value, RenderError> {
    let Value::Callable(callable) = &value else {
        return Ok(value);
    };
    if callable.do_not_call {
        return Ok(value);
    }
    if callable.alters_data {
        return Ok(invalid_placeholder(context));
    }
    match callable.call() {
        Ok(result) => Ok(result),
        Err(CallError::ArgsRequired | CallError::Silent(_)) => Ok(invalid_placeholder(context)),
        Err(CallError::Failed(message)) => Err(RenderError::Call(message)),
    }
}

fn invalid_placeholder(context: &Context) -> Value {
    match missing_policy(context) {
        MissingVariablePolicy::Placeholder(text) => Value::string(text),
        MissingVariablePolicy::Error => Value::string(""),
    }
}

fn missing_policy(context: &Context) -> MissingVariablePolicy {
    context
        .engine()
        .map(|engine| engine.missing_variables.clone())
        .unwrap_or_default()
}

fn translate_value(value: Value, context: &Context) -> Value {
    let Some(translate) = context.engine().and_then(|e| e.translator.as_ref()) else {
        return value;
    };
    let safe = value.is_safe();
    let translated = Value::string(translate(&value.render_str()));
    if safe {
        translated.mark_safe()
    } else {
        translated
    }
}

/// A filter bound at compile time, with its optional argument.
pub(crate) struct BoundFilter {
    pub(crate) name: String,
    pub(crate) entry: FilterEntry,
    /// Constant arguments resolve without touching the context but go
    /// through `Variable` so translation still applies.
    pub(crate) arg: Option<Variable>,
}

/// A variable plus its filter pipeline, e.g. `user.name|lower|default:"?"`.
pub struct FilterExpression {
    token: String,
    var: Variable,
    filters: Vec<BoundFilter>,
}

impl FilterExpression {
    pub fn new(token: &str, parser: &Parser) -> Result<Self, TemplateSyntaxError> {
        let mut upto = 0;
        let mut var: Option<Variable> = None;
        let mut filters = Vec::new();
        for caps in FILTER_RE.captures_iter(token) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() != upto {
                return Err(TemplateSyntaxError::other(format!(
                    "could not parse some characters: {}|{}|{}",
                    &token[..upto],
                    &token[upto..whole.start()],
                    &token[whole.start()..]
                )));
            }
            upto = whole.end();
            if var.is_none() {
                let leading = caps
                    .name("constant")
                    .or_else(|| caps.name("var"))
                    .map(|m| m.as_str());
                match leading {
                    Some(text) => var = Some(Variable::new(text)?),
                    None => {
                        return Err(TemplateSyntaxError::new(SyntaxErrorKind::MissingVariable {
                            expression: token.to_owned(),
                        }))
                    }
                }
                continue;
            }
            let Some(name) = caps.name("filter_name").map(|m| m.as_str()) else {
                return Err(TemplateSyntaxError::new(SyntaxErrorKind::MissingVariable {
                    expression: token.to_owned(),
                }));
            };
            let entry = parser.find_filter(name)?.clone();
            let arg = caps
                .name("constant_arg")
                .or_else(|| caps.name("var_arg"))
                .map(|m| Variable::new(m.as_str()))
                .transpose()?;
            match (entry.arity, arg.is_some()) {
                (FilterArity::Required, false) => {
                    return Err(TemplateSyntaxError::filter_arguments(
                        name,
                        "requires an argument",
                    ));
                }
                (FilterArity::None, true) => {
                    return Err(TemplateSyntaxError::filter_arguments(
                        name,
                        "takes no argument",
                    ));
                }
                _ => {}
            }
            filters.push(BoundFilter {
                name: name.to_owned(),
                entry,
                arg,
            });
        }
        if upto != token.len() {
            return Err(TemplateSyntaxError::new(
                SyntaxErrorKind::CouldNotParseRemainder {
                    remainder: token[upto..].to_owned(),
                    expression: token.to_owned(),
                },
            ));
        }
        let Some(var) = var else {
            return Err(TemplateSyntaxError::new(SyntaxErrorKind::MissingVariable {
                expression: token.to_owned(),
            }));
        };
        Ok(FilterExpression {
            token: token.to_owned(),
            var,
            filters,
        })
    }

    /// The source text of the whole expression.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn variable(&self) -> &Variable {
        &self.var
    }

    /// Resolve the base variable and run the filter pipeline.
    ///
    /// A failed base lookup is handled per the engine's missing-variable
    /// policy; `ignore_failures` (used by tags that probe values, like
    /// `if` and `for`) turns a failed lookup into `None` and keeps going.
    pub fn resolve(
        &self,
        context: &mut Context,
        ignore_failures: bool,
    ) -> Result<Value, RenderError> {
        let mut obj = match self.var.resolve(context) {
            Ok(value) => value,
            Err(err @ RenderError::VariableDoesNotExist { .. }) => {
                debug!(expression = %self.token, "{err}");
                if ignore_failures {
                    Value::None
                } else {
                    match missing_policy(context) {
                        MissingVariablePolicy::Error => return Err(err),
                        MissingVariablePolicy::Placeholder(text) if !text.is_empty() => {
                            // A visible placeholder short-circuits the
                            // pipeline; filters never see it.
                            return Ok(Value::string(text.replace("%s", self.var.text())));
                        }
                        MissingVariablePolicy::Placeholder(_) => Value::string(""),
                    }
                }
            }
            Err(other) => return Err(other),
        };
        let live = FilterContext {
            autoescape: context.autoescape(),
        };
        // Only filters that declare needs_autoescape see the live state.
        let muted = FilterContext { autoescape: false };
        for bound in &self.filters {
            let arg = match &bound.arg {
                None => None,
                Some(variable) => match variable.resolve(context) {
                    Ok(value) => Some(value),
                    Err(err @ RenderError::VariableDoesNotExist { .. }) => {
                        match missing_policy(context) {
                            MissingVariablePolicy::Error => return Err(err),
                            MissingVariablePolicy::Placeholder(text) => {
                                Some(Value::string(text.replace("%s", variable.text())))
                            }
                        }
                    }
                    Err(other) => return Err(other),
                },
            };
            let was_safe = obj.is_safe();
            let fctx = if bound.entry.needs_autoescape {
                &live
            } else {
                &muted
            };
            let result = (bound.entry.func)(&obj, arg.as_ref(), fctx).map_err(
                |err| match err {
                    err @ RenderError::Filter { .. } => err,
                    other => RenderError::Filter {
                        name: bound.name.clone(),
                        message: other.to_string(),
                    },
                },
            )?;
            obj = if bound.entry.is_safe && was_safe {
                result.mark_safe()
            } else {
                result
            };
        }
        Ok(obj)
    }
}

impl std::fmt::Debug for FilterExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FilterExpression({:?})", self.token)
    }
}
