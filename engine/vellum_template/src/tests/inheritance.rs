use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use super::{data, loader_engine};
use crate::{
    get_template, Engine, Loader, LoaderError, MemoryLoader, RenderError, Template, Value,
};

fn render_named(sources: &[(&str, &str)], name: &str, pairs: &[(&str, Value)]) -> String {
    let engine = loader_engine(sources);
    get_template(&engine, name)
        .expect("template should load")
        .render_map(data(pairs))
        .expect("template should render")
}

#[test]
fn child_block_overrides_the_parent_default() {
    let out = render_named(
        &[
            ("base.html", "A{% block content %}base{% endblock %}B"),
            (
                "child.html",
                "{% extends 'base.html' %}{% block content %}child{% endblock %}",
            ),
        ],
        "child.html",
        &[],
    );
    assert_eq!(out, "AchildB");
}

#[test]
fn unoverridden_blocks_keep_their_defaults() {
    let out = render_named(
        &[
            (
                "base.html",
                "{% block head %}H{% endblock %}|{% block body %}B{% endblock %}",
            ),
            (
                "child.html",
                "{% extends 'base.html' %}{% block body %}mine{% endblock %}",
            ),
        ],
        "child.html",
        &[],
    );
    assert_eq!(out, "H|mine");
}

#[test]
fn block_super_renders_the_parent_body() {
    let out = render_named(
        &[
            ("base.html", "A{% block content %}base{% endblock %}B"),
            (
                "child.html",
                "{% extends 'base.html' %}{% block content %}({{ block.super }})child{% endblock %}",
            ),
        ],
        "child.html",
        &[],
    );
    assert_eq!(out, "A(base)childB");
}

#[test]
fn three_level_chain_resolves_most_derived_first() {
    let sources = [
        ("base.html", "[{% block x %}b{% endblock %}]"),
        (
            "middle.html",
            "{% extends 'base.html' %}{% block x %}m+{{ block.super }}{% endblock %}",
        ),
        (
            "leaf.html",
            "{% extends 'middle.html' %}{% block x %}l+{{ block.super }}{% endblock %}",
        ),
    ];
    assert_eq!(render_named(&sources, "leaf.html", &[]), "[l+m+b]");
    // the middle template still renders on its own terms
    assert_eq!(render_named(&sources, "middle.html", &[]), "[m+b]");
}

#[test]
fn sibling_blocks_inside_loops_rerender_consistently() {
    let out = render_named(
        &[
            (
                "base.html",
                "{% for i in items %}{% block item %}d{% endblock %}{% endfor %}",
            ),
            (
                "child.html",
                "{% extends 'base.html' %}{% block item %}<{{ i }}>{% endblock %}",
            ),
        ],
        "child.html",
        &[("items", Value::list(vec![Value::from(1), Value::from(2)]))],
    );
    assert_eq!(out, "<1><2>");
}

#[test]
fn parent_name_may_come_from_the_context() {
    let out = render_named(
        &[
            ("base.html", "A{% block c %}x{% endblock %}"),
            (
                "child.html",
                "{% extends parent %}{% block c %}y{% endblock %}",
            ),
        ],
        "child.html",
        &[("parent", Value::from("base.html"))],
    );
    assert_eq!(out, "Ay");
}

#[test]
fn self_extension_is_detected() {
    let engine = loader_engine(&[("a.html", "{% extends 'a.html' %}")]);
    let err = get_template(&engine, "a.html")
        .unwrap()
        .render_map(data(&[]))
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::TemplateCycle {
            name: "a.html".to_owned()
        }
    );
}

#[test]
fn mutual_extension_is_detected() {
    let engine = loader_engine(&[
        ("a.html", "{% extends 'b.html' %}"),
        ("b.html", "{% extends 'a.html' %}"),
    ]);
    let err = get_template(&engine, "a.html")
        .unwrap()
        .render_map(data(&[]))
        .unwrap_err();
    assert!(matches!(err, RenderError::TemplateCycle { .. }));
}

#[test]
fn duplicate_block_names_are_compile_errors() {
    let engine = loader_engine(&[(
        "base.html",
        "{% block a %}{% endblock %}{% block a %}{% endblock %}",
    )]);
    let err = get_template(&engine, "base.html").unwrap_err();
    assert!(matches!(err, RenderError::Loader(LoaderError::Compile { .. })));
}

#[test]
fn extending_template_can_be_included_repeatedly() {
    let out = render_named(
        &[
            ("base.html", "[{% block c %}d{% endblock %}]"),
            (
                "child.html",
                "{% extends 'base.html' %}{% block c %}x{% endblock %}",
            ),
            (
                "page.html",
                "{% include 'child.html' %}{% include 'child.html' %}",
            ),
        ],
        "page.html",
        &[],
    );
    assert_eq!(out, "[x][x]");
}

#[test]
fn extending_template_can_be_included_inside_a_loop() {
    let out = render_named(
        &[
            ("base.html", "[{% block c %}d{% endblock %}]"),
            (
                "child.html",
                "{% extends 'base.html' %}{% block c %}{{ i }}{% endblock %}",
            ),
            (
                "page.html",
                "{% for i in items %}{% include 'child.html' %}{% endfor %}",
            ),
        ],
        "page.html",
        &[(
            "items",
            Value::list(vec![Value::from(1), Value::from(2), Value::from(3)]),
        )],
    );
    assert_eq!(out, "[1][2][3]");
}

#[test]
fn include_splices_the_other_template() {
    let out = render_named(
        &[
            ("row.html", "<{{ label }}>"),
            ("page.html", "a{% include 'row.html' %}b"),
        ],
        "page.html",
        &[("label", Value::from("x"))],
    );
    assert_eq!(out, "a<x>b");
}

#[test]
fn include_with_binds_extra_values() {
    let out = render_named(
        &[
            ("row.html", "{{ label }}:{{ n }}"),
            (
                "page.html",
                "{% include 'row.html' with label=name n=2 %}|{{ label }}",
            ),
        ],
        "page.html",
        &[("name", Value::from("ada"))],
    );
    assert_eq!(out, "ada:2|");
}

#[test]
fn include_only_isolates_the_context() {
    let out = render_named(
        &[
            ("row.html", "[{{ outer }}{{ label }}]"),
            (
                "page.html",
                "{% include 'row.html' with label='L' only %}",
            ),
        ],
        "page.html",
        &[("outer", Value::from("visible"))],
    );
    assert_eq!(out, "[L]");
}

#[test]
fn missing_include_aborts_by_default() {
    let engine = loader_engine(&[("page.html", "{% include 'gone.html' %}")]);
    let err = get_template(&engine, "page.html")
        .unwrap()
        .render_map(data(&[]))
        .unwrap_err();
    assert_eq!(
        err,
        RenderError::Loader(LoaderError::NotFound("gone.html".to_owned()))
    );
}

#[test]
fn tolerant_include_policy_swallows_the_failure() {
    let mut engine = Engine::new();
    engine.include_errors = crate::IncludePolicy::LogAndIgnore;
    engine.set_loader(MemoryLoader::new([(
        "page.html",
        "a{% include 'gone.html' %}b",
    )]));
    let engine = Arc::new(engine);
    let out = get_template(&engine, "page.html")
        .unwrap()
        .render_map(data(&[]))
        .unwrap();
    assert_eq!(out, "ab");
}

struct CountingLoader {
    inner: MemoryLoader,
    hits: Arc<AtomicUsize>,
}

impl Loader for CountingLoader {
    fn get_template(
        &self,
        name: &str,
        engine: &Arc<Engine>,
    ) -> Result<Arc<Template>, LoaderError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        self.inner.get_template(name, engine)
    }
}

#[test]
fn include_inside_a_loop_loads_once_per_render() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut engine = Engine::new();
    engine.set_loader(CountingLoader {
        inner: MemoryLoader::new([
            ("row.html", "{{ x }};"),
            (
                "page.html",
                "{% for x in items %}{% include 'row.html' %}{% endfor %}",
            ),
        ]),
        hits: Arc::clone(&hits),
    });
    let engine = Arc::new(engine);
    let items = Value::list(vec![Value::from(1), Value::from(2), Value::from(3)]);
    let out = get_template(&engine, "page.html")
        .unwrap()
        .render_map(data(&[("items", items)]))
        .unwrap();
    assert_eq!(out, "1;2;3;");
    // one load for the page itself, one for the repeated include
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn runaway_recursive_include_hits_the_depth_limit() {
    let engine = loader_engine(&[("loop.html", "x{% include 'loop.html' %}")]);
    let err = get_template(&engine, "loop.html")
        .unwrap()
        .render_map(data(&[]))
        .unwrap_err();
    assert!(matches!(err, RenderError::RecursionLimit { limit: 64, .. }));
}
