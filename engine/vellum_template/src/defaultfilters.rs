//! The built-in filters.

use vellum_value::{html_escape, Value};

use crate::error::RenderError;
use crate::library::{FilterArity, FilterContext, FilterEntry, Library};

pub(crate) fn register(library: &mut Library) {
    library.filter("default", FilterArity::Required, |value, arg, _| {
        if value.is_truthy() {
            Ok(value.clone())
        } else {
            Ok(arg.cloned().unwrap_or(Value::None))
        }
    });

    library.filter("upper", FilterArity::None, |value, _, _| {
        Ok(Value::string(value.render_str().to_uppercase()))
    });

    library.filter("lower", FilterArity::None, |value, _, _| {
        Ok(Value::string(value.render_str().to_lowercase()))
    });

    library.filter_entry(
        "capfirst",
        FilterEntry::new(FilterArity::None, |value, _, _| {
            let text = value.render_str();
            let mut chars = text.chars();
            let capped = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => text,
            };
            Ok(Value::string(capped))
        })
        .is_safe(),
    );

    library.filter("title", FilterArity::None, |value, _, _| {
        Ok(Value::string(title_case(&value.render_str())))
    });

    library.filter_entry(
        "length",
        FilterEntry::new(FilterArity::None, |value, _, _| {
            Ok(Value::from(value.len().unwrap_or(0)))
        })
        .is_safe(),
    );

    library.filter_entry(
        "join",
        FilterEntry::new(FilterArity::Required, join_filter).needs_autoescape(),
    );

    library.filter("first", FilterArity::None, |value, _, _| {
        Ok(match value {
            Value::List(items) => items.first().cloned().unwrap_or_else(|| Value::string("")),
            Value::Str { text, .. } => match text.chars().next() {
                Some(c) => Value::string(c.to_string()),
                None => Value::string(""),
            },
            other => other.clone(),
        })
    });

    library.filter("cut", FilterArity::Required, |value, arg, _| {
        let needle = arg.map(Value::render_str).unwrap_or_default();
        Ok(Value::string(value.render_str().replace(&needle, "")))
    });

    library.filter("add", FilterArity::Required, add_filter);

    library.filter_entry(
        "safe",
        FilterEntry::new(FilterArity::None, |value, _, _| {
            Ok(Value::safe_string(value.render_str()))
        })
        .is_safe(),
    );

    library.filter_entry(
        "escape",
        FilterEntry::new(FilterArity::None, |value, _, _| {
            if value.is_safe() {
                Ok(value.clone())
            } else {
                Ok(Value::safe_string(html_escape(&value.render_str())))
            }
        })
        .is_safe(),
    );
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start_of_word = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if start_of_word {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(ch);
            start_of_word = true;
        }
    }
    out
}

/// Join a list, escaping both items and separator when autoescaping is
/// active. The result is finished output, so it is marked safe.
fn join_filter(
    value: &Value,
    arg: Option<&Value>,
    fctx: &FilterContext,
) -> Result<Value, RenderError> {
    let Value::List(items) = value else {
        return Ok(value.clone());
    };
    let escape = |item: &Value| {
        let text = item.render_str();
        if fctx.autoescape && !item.is_safe() {
            html_escape(&text)
        } else {
            text
        }
    };
    let sep = match arg {
        Some(sep) => escape(sep),
        None => String::new(),
    };
    let parts: Vec<String> = items.iter().map(escape).collect();
    Ok(Value::safe_string(parts.join(&sep)))
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) => Some(*n),
        Value::Float(f) => Some(*f as i64),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Str { text, .. } => text.trim().parse().ok(),
        _ => None,
    }
}

/// Integer addition when both sides coerce, otherwise concatenation of
/// like containers, otherwise empty output.
fn add_filter(value: &Value, arg: Option<&Value>, _: &FilterContext) -> Result<Value, RenderError> {
    let Some(arg) = arg else {
        return Ok(value.clone());
    };
    if let (Some(a), Some(b)) = (to_int(value), to_int(arg)) {
        return Ok(Value::Int(a.wrapping_add(b)));
    }
    match (value, arg) {
        (Value::Str { text: a, .. }, Value::Str { text: b, .. }) => {
            Ok(Value::string(format!("{}{}", a.as_str(), b.as_str())))
        }
        (Value::List(a), Value::List(b)) => {
            let mut joined = a.to_vec();
            joined.extend(b.iter().cloned());
            Ok(Value::list(joined))
        }
        _ => Ok(Value::string("")),
    }
}
