//! End-to-end tests over the public API: compile a source string (or a
//! loader full of them) and check the rendered output.

mod control_tags;
mod filters;
mod inheritance;

use std::sync::Arc;

use crate::{Context, Engine, MemoryLoader, Template, Value, ValueMap};

pub(crate) fn engine() -> Arc<Engine> {
    Arc::new(Engine::new())
}

pub(crate) fn loader_engine(sources: &[(&str, &str)]) -> Arc<Engine> {
    let mut engine = Engine::new();
    engine.set_loader(MemoryLoader::new(sources.iter().copied()));
    Arc::new(engine)
}

pub(crate) fn data(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

/// Compile and render a one-off template against the default engine.
pub(crate) fn render(source: &str, pairs: &[(&str, Value)]) -> String {
    render_with(&engine(), source, pairs)
}

pub(crate) fn render_with(engine: &Arc<Engine>, source: &str, pairs: &[(&str, Value)]) -> String {
    let template = Template::from_string(engine, source).expect("template should compile");
    let mut context = Context::new(data(pairs));
    template.render(&mut context).expect("template should render")
}
