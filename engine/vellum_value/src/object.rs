//! Attribute-bearing and callable runtime values.
//!
//! Templates resolve dotted paths against opaque host objects through the
//! [`Object`] trait, and auto-invoke zero-argument callables during path
//! resolution. Whether a callable may be invoked from a template is
//! explicit metadata here, not something probed by reflection.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Value;

/// A host value that exposes named attributes to templates.
///
/// Implementations decide which attributes exist; returning `None` makes
/// the lookup fall through to the resolver's next access style (integer
/// indexing) and ultimately to the missing-variable policy.
pub trait Object: Send + Sync {
    /// Look up a named attribute.
    fn attr(&self, name: &str) -> Option<Value>;

    /// Truthiness in boolean contexts. Objects are truthy by default.
    fn is_truthy(&self) -> bool {
        true
    }

    /// String form used when the object itself is rendered.
    fn display(&self) -> String {
        "<object>".to_owned()
    }

    /// Downcast support for engine-internal object kinds.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a template-visible object.
pub type ObjectRef = Arc<dyn Object>;

/// Why invoking a callable failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallError {
    /// The callable requires arguments and cannot be auto-invoked; the
    /// resolver substitutes the configured invalid-value placeholder.
    ArgsRequired,
    /// The callable failed in a way it declared safe to swallow; the
    /// resolver substitutes the placeholder.
    Silent(String),
    /// The callable failed; the error propagates and aborts the render.
    Failed(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::ArgsRequired => write!(f, "callable requires arguments"),
            CallError::Silent(msg) | CallError::Failed(msg) => f.write_str(msg),
        }
    }
}

type CallFn = dyn Fn() -> Result<Value, CallError> + Send + Sync;

/// A zero-argument callable value.
///
/// Path resolution invokes these automatically unless `do_not_call` is
/// set; `alters_data` marks data-mutating callables, which resolve to the
/// invalid-value placeholder instead of being invoked.
#[derive(Clone)]
pub struct CallableValue {
    func: Arc<CallFn>,
    pub alters_data: bool,
    pub do_not_call: bool,
}

impl CallableValue {
    pub fn new(func: impl Fn() -> Result<Value, CallError> + Send + Sync + 'static) -> Self {
        CallableValue {
            func: Arc::new(func),
            alters_data: false,
            do_not_call: false,
        }
    }

    /// Mark this callable as mutating data; templates will never invoke it.
    #[must_use]
    pub fn alters_data(mut self) -> Self {
        self.alters_data = true;
        self
    }

    /// Keep this callable as an opaque value during resolution.
    #[must_use]
    pub fn do_not_call(mut self) -> Self {
        self.do_not_call = true;
        self
    }

    pub fn call(&self) -> Result<Value, CallError> {
        (self.func)()
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.func, &b.func)
    }
}

impl fmt::Debug for CallableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallableValue")
            .field("alters_data", &self.alters_data)
            .field("do_not_call", &self.do_not_call)
            .finish_non_exhaustive()
    }
}
