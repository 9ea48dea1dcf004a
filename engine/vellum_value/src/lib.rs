//! Runtime value model for the Vellum template engine.
//!
//! Templates are dynamically typed: one closed [`Value`] enum covers
//! everything a context can hold and everything an expression can
//! produce. Path resolution, truthiness, comparisons, and output
//! formatting all pattern-match on the variant — there is no
//! exception-driven fallthrough between access styles.
//!
//! Strings carry a `safe` flag, the minimal "is this value pre-escaped"
//! bookkeeping the renderer needs to decide whether to HTML-escape
//! variable output.

mod escape;
mod heap;
mod object;

use std::cmp::Ordering;
use std::fmt;

use rustc_hash::FxHashMap;

pub use escape::html_escape;
pub use heap::Heap;
pub use object::{CallError, CallableValue, Object, ObjectRef};

/// String-keyed mapping payload of [`Value::Map`].
pub type ValueMap = FxHashMap<String, Value>;

/// A runtime template value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Text, with a flag recording whether it is already escaped (or
    /// otherwise trusted) output.
    Str { text: Heap<String>, safe: bool },
    List(Heap<Vec<Value>>),
    Map(Heap<ValueMap>),
    /// Opaque host object exposing named attributes.
    Object(ObjectRef),
    /// Zero-argument callable, auto-invoked during path resolution.
    Callable(CallableValue),
}

impl Value {
    pub fn string(text: impl Into<String>) -> Self {
        Value::Str {
            text: Heap::new(text.into()),
            safe: false,
        }
    }

    /// A string that must not be escaped again on output.
    pub fn safe_string(text: impl Into<String>) -> Self {
        Value::Str {
            text: Heap::new(text.into()),
            safe: true,
        }
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Heap::new(items))
    }

    pub fn map(entries: ValueMap) -> Self {
        Value::Map(Heap::new(entries))
    }

    pub fn object(object: impl Object + 'static) -> Self {
        Value::Object(std::sync::Arc::new(object))
    }

    pub fn callable(func: impl Fn() -> Result<Value, CallError> + Send + Sync + 'static) -> Self {
        Value::Callable(CallableValue::new(func))
    }

    /// The variant name, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str { .. } => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
            Value::Callable(_) => "callable",
        }
    }

    /// Python-style truthiness: none, false, zero, and empty containers
    /// are falsy; objects decide for themselves and default to truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str { text, .. } => !text.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Object(obj) => obj.is_truthy(),
            Value::Callable(_) => true,
        }
    }

    /// Whether output of this value may skip escaping. Only strings carry
    /// the explicit flag; everything else renders to text that contains
    /// no markup-significant characters of its own.
    pub fn is_safe(&self) -> bool {
        match self {
            Value::Str { safe, .. } => *safe,
            Value::None
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::List(_)
            | Value::Map(_)
            | Value::Object(_)
            | Value::Callable(_) => false,
        }
    }

    /// Flag string content as pre-escaped. Non-strings are unchanged.
    #[must_use]
    pub fn mark_safe(self) -> Self {
        match self {
            Value::Str { text, .. } => Value::Str { text, safe: true },
            other => other,
        }
    }

    /// Number of items, where the value has a length.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str { text, .. } => Some(text.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|n| n == 0)
    }

    /// Mapping-key lookup.
    pub fn get_key(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(entries) => entries.get(key).cloned(),
            _ => None,
        }
    }

    /// Attribute lookup on host objects.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Object(obj) => obj.attr(name),
            _ => None,
        }
    }

    /// Integer-indexed sequence lookup.
    pub fn get_index(&self, index: usize) -> Option<Value> {
        match self {
            Value::List(items) => items.get(index).cloned(),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality across the numeric family, by content for strings and
    /// containers, by identity for objects and callables.
    pub fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str { text: a, .. }, Value::Str { text: b, .. }) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_value(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.eq_value(w)))
            }
            (Value::Object(a), Value::Object(b)) => std::sync::Arc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => CallableValue::ptr_eq(a, b),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Ordering for `<` / `>` comparisons: numbers against numbers,
    /// strings against strings. Anything else is incomparable.
    pub fn cmp_value(&self, other: &Value) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.partial_cmp(&b);
        }
        if let (Value::Str { text: a, .. }, Value::Str { text: b, .. }) = (self, other) {
            return Some(a.as_str().cmp(b.as_str()));
        }
        None
    }

    /// Membership test for `in`: list element, substring, or map key.
    /// `None` means this value is not a container.
    pub fn contains(&self, needle: &Value) -> Option<bool> {
        match self {
            Value::List(items) => Some(items.iter().any(|item| item.eq_value(needle))),
            Value::Str { text, .. } => Some(text.contains(&needle.render_str())),
            Value::Map(entries) => Some(entries.contains_key(&needle.render_str())),
            _ => None,
        }
    }

    /// The string form used for rendered output.
    pub fn render_str(&self) -> String {
        match self {
            Value::None => "None".to_owned(),
            Value::Bool(true) => "True".to_owned(),
            Value::Bool(false) => "False".to_owned(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str { text, .. } => text.as_str().to_owned(),
            Value::List(_) | Value::Map(_) => self.repr(),
            Value::Object(obj) => obj.display(),
            Value::Callable(_) => "<callable>".to_owned(),
        }
    }

    /// Container-style form: strings quoted, containers bracketed.
    fn repr(&self) -> String {
        match self {
            Value::Str { text, .. } => format!("'{}'", text.replace('\'', "\\'")),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("'{}': {}", k, v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            other => other.render_str(),
        }
    }
}

/// Floats keep a trailing `.0` so whole-number floats stay visibly
/// floats, matching the original engine's rendered output.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str { text, safe } => write!(f, "Str({text:?}, safe={safe})"),
            Value::List(items) => f.debug_tuple("List").field(&items.as_slice()).finish(),
            Value::Map(entries) => write!(f, "Map({} entries)", entries.len()),
            Value::Object(obj) => write!(f, "Object({})", obj.display()),
            Value::Callable(c) => c.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

impl From<ValueMap> for Value {
    fn from(entries: ValueMap) -> Self {
        Value::map(entries)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::list(iter.into_iter().collect())
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::map(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn truthiness_matches_emptiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(Value::list(vec![Value::None]).is_truthy());
    }

    #[test]
    fn render_str_uses_python_style_forms() {
        assert_eq!(Value::None.render_str(), "None");
        assert_eq!(Value::Bool(true).render_str(), "True");
        assert_eq!(Value::Float(2.0).render_str(), "2.0");
        assert_eq!(Value::Float(1.5).render_str(), "1.5");
        assert_eq!(
            Value::list(vec![Value::string("a"), Value::Int(1)]).render_str(),
            "['a', 1]"
        );
    }

    #[test]
    fn numeric_family_compares_across_variants() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::string("1"));
        assert_eq!(
            Value::Int(2).cmp_value(&Value::Float(2.5)),
            Some(std::cmp::Ordering::Less)
        );
        assert_eq!(Value::string("a").cmp_value(&Value::Int(1)), None);
    }

    #[test]
    fn containment_covers_lists_strings_and_maps() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(list.contains(&Value::Int(2)), Some(true));
        assert_eq!(list.contains(&Value::Int(3)), Some(false));

        let s = Value::string("hello world");
        assert_eq!(s.contains(&Value::string("lo wo")), Some(true));

        let mut entries = ValueMap::default();
        entries.insert("k".to_owned(), Value::Int(1));
        assert_eq!(Value::map(entries).contains(&Value::string("k")), Some(true));
        assert_eq!(Value::Int(1).contains(&Value::Int(1)), None);
    }

    #[test]
    fn mark_safe_only_affects_strings() {
        assert!(Value::string("<b>").mark_safe().is_safe());
        assert!(!Value::Int(3).mark_safe().is_safe());
    }

    #[test]
    fn safe_flag_does_not_affect_equality() {
        assert_eq!(Value::string("x"), Value::safe_string("x"));
    }
}
