use pretty_assertions::assert_eq;

use super::{engine, render, render_with};
use crate::{
    Engine, FilterArity, FilterEntry, Library, SyntaxErrorKind, Template, Value,
};

#[test]
fn default_replaces_falsy_values_only() {
    let source = "{{ name|default:'Guest' }}";
    assert_eq!(render(source, &[]), "Guest");
    assert_eq!(render(source, &[("name", Value::from(""))]), "Guest");
    assert_eq!(render(source, &[("name", Value::from("ada"))]), "ada");
}

#[test]
fn case_filters() {
    assert_eq!(render("{{ w|upper }}", &[("w", Value::from("ärger"))]), "ÄRGER");
    assert_eq!(render("{{ w|lower }}", &[("w", Value::from("LOUD"))]), "loud");
    assert_eq!(render("{{ w|capfirst }}", &[("w", Value::from("hello you"))]), "Hello you");
    assert_eq!(
        render("{{ w|title }}", &[("w", Value::from("war AND peace"))]),
        "War And Peace"
    );
}

#[test]
fn filters_apply_left_to_right() {
    assert_eq!(
        render("{{ w|upper|cut:'L' }}", &[("w", Value::from("hello"))]),
        "HEO"
    );
}

#[test]
fn length_of_strings_lists_and_everything_else() {
    assert_eq!(render("{{ w|length }}", &[("w", Value::from("héllo"))]), "5");
    assert_eq!(
        render("{{ items|length }}", &[("items", Value::list(vec![Value::None]))]),
        "1"
    );
    assert_eq!(render("{{ n|length }}", &[("n", Value::from(7))]), "0");
}

#[test]
fn join_escapes_items_and_marks_the_result_safe() {
    let items = Value::list(vec![Value::from("<a>"), Value::from("b")]);
    assert_eq!(
        render("{{ items|join:', ' }}", &[("items", items)]),
        "&lt;a&gt;, b"
    );
}

#[test]
fn first_takes_the_head_of_lists_and_strings() {
    let items = Value::list(vec![Value::from("x"), Value::from("y")]);
    assert_eq!(render("{{ items|first }}", &[("items", items)]), "x");
    assert_eq!(render("{{ w|first }}", &[("w", Value::from("abc"))]), "a");
    assert_eq!(render("[{{ empty|first }}]", &[("empty", Value::list(vec![]))]), "[]");
}

#[test]
fn cut_removes_every_occurrence() {
    assert_eq!(
        render("{{ w|cut:' ' }}", &[("w", Value::from("a b c"))]),
        "abc"
    );
}

#[test]
fn add_coerces_to_integers_then_concatenates() {
    assert_eq!(render("{{ n|add:'2' }}", &[("n", Value::from(4))]), "6");
    assert_eq!(render("{{ n|add:m }}", &[("n", Value::from("3")), ("m", Value::from("4"))]), "7");
    assert_eq!(
        render("{{ a|add:b }}", &[("a", Value::from("ab")), ("b", Value::from("cd"))]),
        "abcd"
    );
    let (a, b) = (
        Value::list(vec![Value::from(1)]),
        Value::list(vec![Value::from(2)]),
    );
    assert_eq!(render("{{ a|add:b }}", &[("a", a), ("b", b)]), "[1, 2]");
    assert_eq!(
        render("[{{ a|add:b }}]", &[("a", Value::from("x")), ("b", Value::from(1))]),
        "[]"
    );
}

#[test]
fn escape_is_idempotent() {
    assert_eq!(
        render("{{ w|escape|escape }}", &[("w", Value::from("<b>"))]),
        "&lt;b&gt;"
    );
}

#[test]
fn autoescape_state_reaches_only_declaring_filters() {
    let mut library = Library::new();
    library.filter("plain", FilterArity::None, |_, _, fctx| {
        Ok(Value::string(fctx.autoescape.to_string()))
    });
    library.filter_entry(
        "aware",
        FilterEntry::new(FilterArity::None, |_, _, fctx| {
            Ok(Value::string(fctx.autoescape.to_string()))
        })
        .needs_autoescape(),
    );
    let mut engine = Engine::new();
    engine.add_library(library);
    let engine = std::sync::Arc::new(engine);
    assert_eq!(
        render_with(&engine, "{{ x|plain }}|{{ x|aware }}", &[("x", Value::from(""))]),
        "false|true"
    );
}

#[test]
fn filter_arguments_are_checked_at_compile_time() {
    let err = Template::from_string(&engine(), "{{ x|default }}").unwrap_err();
    assert!(matches!(err.kind, SyntaxErrorKind::FilterArguments { .. }));
    let err = Template::from_string(&engine(), "{{ x|upper:'y' }}").unwrap_err();
    assert!(matches!(err.kind, SyntaxErrorKind::FilterArguments { .. }));
}

#[test]
fn unknown_filters_are_compile_errors() {
    let err = Template::from_string(&engine(), "{{ x|sparkle }}").unwrap_err();
    assert!(matches!(err.kind, SyntaxErrorKind::InvalidFilter { .. }));
}

#[test]
fn trailing_junk_in_an_expression_is_rejected() {
    let err = Template::from_string(&engine(), "{{ x ! }}").unwrap_err();
    assert!(matches!(
        err.kind,
        SyntaxErrorKind::CouldNotParseRemainder { .. }
    ));
}

#[test]
fn filter_arguments_can_be_variables() {
    assert_eq!(
        render(
            "{{ w|cut:sep }}",
            &[("w", Value::from("a-b-c")), ("sep", Value::from("-"))]
        ),
        "abc"
    );
}
