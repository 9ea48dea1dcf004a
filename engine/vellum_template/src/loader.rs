//! Template loaders.
//!
//! A [`Loader`] resolves a name to a compiled template. The in-memory
//! loader compiles lazily and caches compiled templates behind a lock,
//! so concurrent renders share one compilation.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::engine::Engine;
use crate::error::LoaderError;
use crate::template::{Origin, Template};

pub trait Loader: Send + Sync {
    fn get_template(&self, name: &str, engine: &Arc<Engine>) -> Result<Arc<Template>, LoaderError>;
}

/// A loader over a fixed set of named sources.
#[derive(Default)]
pub struct MemoryLoader {
    sources: FxHashMap<String, String>,
    cache: RwLock<FxHashMap<String, Arc<Template>>>,
}

impl MemoryLoader {
    pub fn new(
        sources: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        MemoryLoader {
            sources: sources
                .into_iter()
                .map(|(name, source)| (name.into(), source.into()))
                .collect(),
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) {
        let name = name.into();
        self.cache.get_mut().remove(&name);
        self.sources.insert(name, source.into());
    }
}

impl Loader for MemoryLoader {
    fn get_template(&self, name: &str, engine: &Arc<Engine>) -> Result<Arc<Template>, LoaderError> {
        if let Some(hit) = self.cache.read().get(name) {
            return Ok(Arc::clone(hit));
        }
        let source = self
            .sources
            .get(name)
            .ok_or_else(|| LoaderError::NotFound(name.to_owned()))?;
        debug!(template = name, "compiling");
        let template = Template::compile(source, Origin::named(name), engine).map_err(|err| {
            LoaderError::Compile {
                name: name.to_owned(),
                message: err.to_string(),
            }
        })?;
        let template = Arc::new(template);
        self.cache
            .write()
            .insert(name.to_owned(), Arc::clone(&template));
        Ok(template)
    }
}
