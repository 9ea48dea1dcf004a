//! Engine configuration: registered libraries, rendering policies, the
//! template loader and the translation hook.

use std::sync::Arc;

use crate::error::RenderError;
use crate::library::Library;
use crate::loader::Loader;
use crate::template::Template;

/// What a failed variable lookup renders as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MissingVariablePolicy {
    /// Substitute this string; `%s` inside it is replaced with the
    /// expression that failed. The empty string (the default) renders
    /// nothing but still lets the filter pipeline run.
    Placeholder(String),
    /// Propagate the failure and abort the render.
    Error,
}

impl Default for MissingVariablePolicy {
    fn default() -> Self {
        MissingVariablePolicy::Placeholder(String::new())
    }
}

/// What a failing `{% include %}` does to the outer render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IncludePolicy {
    /// Propagate the error. The default: a broken include is a bug.
    #[default]
    Propagate,
    /// Log a warning and render the include as empty output.
    LogAndIgnore,
}

/// Translation hook applied to `_("...")`-marked values.
pub type Translator = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub struct Engine {
    pub(crate) libraries: Vec<Library>,
    pub missing_variables: MissingVariablePolicy,
    /// Track source spans while lexing; enables richer error windows.
    pub debug: bool,
    /// Default autoescape mode for contexts bound to this engine.
    pub autoescape: bool,
    pub include_errors: IncludePolicy,
    /// Bound on template nesting depth (inheritance plus inclusion).
    pub recursion_limit: usize,
    pub(crate) loader: Option<Arc<dyn Loader>>,
    pub(crate) translator: Option<Translator>,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            libraries: vec![builtin_library()],
            missing_variables: MissingVariablePolicy::default(),
            debug: false,
            autoescape: true,
            include_errors: IncludePolicy::default(),
            recursion_limit: 64,
            loader: None,
            translator: None,
        }
    }

    /// Register a library after the builtins; its tags and filters
    /// shadow earlier registrations of the same name.
    pub fn add_library(&mut self, library: Library) {
        self.libraries.push(library);
    }

    pub fn set_loader(&mut self, loader: impl Loader + 'static) {
        self.loader = Some(Arc::new(loader));
    }

    pub fn set_translator(&mut self, translate: impl Fn(&str) -> String + Send + Sync + 'static) {
        self.translator = Some(Arc::new(translate));
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

/// Load a named template through the engine's loader.
pub fn get_template(engine: &Arc<Engine>, name: &str) -> Result<Arc<Template>, RenderError> {
    match &engine.loader {
        Some(loader) => Ok(loader.get_template(name, engine)?),
        None => Err(RenderError::NoLoader {
            name: name.to_owned(),
        }),
    }
}

fn builtin_library() -> Library {
    let mut library = Library::new();
    crate::defaulttags::register(&mut library);
    crate::loader_tags::register(&mut library);
    crate::defaultfilters::register(&mut library);
    library
}
