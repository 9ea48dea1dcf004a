use pretty_assertions::assert_eq;

use super::{data, engine, render, render_with};
use crate::{Engine, MissingVariablePolicy, RenderError, Template, Value};

#[test]
fn if_elif_else_takes_the_first_true_branch() {
    let source = "{% if a %}A{% elif b %}B{% else %}C{% endif %}";
    assert_eq!(render(source, &[("a", Value::Bool(true))]), "A");
    assert_eq!(render(source, &[("b", Value::Bool(true))]), "B");
    assert_eq!(render(source, &[]), "C");
}

#[test]
fn and_binds_tighter_than_or() {
    let source = "{% if a or b and c %}y{% else %}n{% endif %}";
    assert_eq!(
        render(source, &[("b", Value::Bool(false)), ("c", Value::Bool(true))]),
        "n"
    );
    assert_eq!(render(source, &[("a", Value::Bool(true))]), "y");
}

#[test]
fn not_negates_comparisons() {
    assert_eq!(
        render("{% if not x == 1 %}y{% else %}n{% endif %}", &[("x", Value::from(2))]),
        "y"
    );
    assert_eq!(
        render("{% if not x %}y{% else %}n{% endif %}", &[("x", Value::from(0))]),
        "y"
    );
}

#[test]
fn membership_operators() {
    assert_eq!(
        render(
            "{% if 'a' in word %}y{% endif %}{% if 'z' not in word %}Y{% endif %}",
            &[("word", Value::from("cart"))]
        ),
        "yY"
    );
    let items = Value::list(vec![Value::from(1), Value::from(2)]);
    assert_eq!(
        render("{% if 2 in items %}y{% endif %}", &[("items", items)]),
        "y"
    );
}

#[test]
fn comparison_operators() {
    assert_eq!(
        render(
            "{% if a < b %}lt{% endif %}{% if b >= 2 %}ge{% endif %}{% if a != b %}ne{% endif %}",
            &[("a", Value::from(1)), ("b", Value::from(2))]
        ),
        "ltgene"
    );
}

#[test]
fn incomparable_operands_are_simply_false() {
    assert_eq!(
        render(
            "{% if word < 1 %}y{% else %}n{% endif %}",
            &[("word", Value::from("a"))]
        ),
        "n"
    );
}

#[test]
fn missing_variables_in_conditions_are_falsy_even_when_strict() {
    let mut engine = Engine::new();
    engine.missing_variables = MissingVariablePolicy::Error;
    let engine = std::sync::Arc::new(engine);
    assert_eq!(
        render_with(&engine, "{% if ghost %}y{% else %}n{% endif %}", &[]),
        "n"
    );
}

#[test]
fn condition_leaves_are_full_filter_expressions() {
    assert_eq!(
        render(
            "{% if name|upper == 'ADA' %}y{% endif %}",
            &[("name", Value::from("ada"))]
        ),
        "y"
    );
}

#[test]
fn for_exposes_loop_counters() {
    let items = Value::list(vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    assert_eq!(
        render(
            "{% for x in items %}{{ forloop.counter }}:{{ x }}{% if not forloop.last %},{% endif %}{% endfor %}",
            &[("items", items.clone())]
        ),
        "1:a,2:b,3:c"
    );
    assert_eq!(
        render(
            "{% for x in items %}{{ forloop.revcounter0 }}{% endfor %}",
            &[("items", items)]
        ),
        "210"
    );
}

#[test]
fn for_reversed_walks_backwards() {
    let items = Value::list(vec![Value::from(1), Value::from(2), Value::from(3)]);
    assert_eq!(
        render("{% for x in items reversed %}{{ x }}{% endfor %}", &[("items", items)]),
        "321"
    );
}

#[test]
fn for_empty_branch_renders_for_empty_and_missing_sequences() {
    let source = "{% for x in items %}{{ x }}{% empty %}none{% endfor %}";
    assert_eq!(render(source, &[("items", Value::list(vec![]))]), "none");
    assert_eq!(render(source, &[]), "none");
}

#[test]
fn for_unpacks_multiple_loop_variables() {
    let pairs = Value::list(vec![
        Value::list(vec![Value::from(1), Value::from("a")]),
        Value::list(vec![Value::from(2), Value::from("b")]),
    ]);
    assert_eq!(
        render(
            "{% for n, l in pairs %}{{ n }}{{ l }} {% endfor %}",
            &[("pairs", pairs)]
        ),
        "1a 2b "
    );
}

#[test]
fn for_unpack_arity_mismatch_fails() {
    let engine = engine();
    let template =
        Template::from_string(&engine, "{% for a, b in pairs %}{% endfor %}").unwrap();
    let pairs = Value::list(vec![Value::list(vec![Value::from(1)])]);
    let err = template.render_map(data(&[("pairs", pairs)])).unwrap_err();
    assert_eq!(err, RenderError::UnpackMismatch { expected: 2, got: 1 });
}

#[test]
fn parentloop_reaches_the_enclosing_loop() {
    let rows = Value::list(vec![
        Value::list(vec![Value::from("a"), Value::from("b")]),
        Value::list(vec![Value::from("c")]),
    ]);
    assert_eq!(
        render(
            "{% for row in rows %}{% for cell in row %}{{ forloop.parentloop.counter }}.{{ forloop.counter }}{{ cell }} {% endfor %}{% endfor %}",
            &[("rows", rows)]
        ),
        "1.1a 1.2b 2.1c "
    );
}

#[test]
fn loop_variable_does_not_leak_out_of_the_loop() {
    let items = Value::list(vec![Value::from("inner")]);
    assert_eq!(
        render(
            "{% for x in items %}{{ x }}{% endfor %}|{{ x }}",
            &[("items", items), ("x", Value::from("outer"))]
        ),
        "inner|outer"
    );
}

#[test]
fn strings_iterate_by_character() {
    assert_eq!(
        render("{% for c in word %}{{ c }}-{% endfor %}", &[("word", Value::from("ab"))]),
        "a-b-"
    );
}

#[test]
fn iterating_a_number_fails() {
    let engine = engine();
    let template = Template::from_string(&engine, "{% for x in n %}{% endfor %}").unwrap();
    let err = template.render_map(data(&[("n", Value::from(5))])).unwrap_err();
    assert_eq!(err, RenderError::NotIterable { kind: "int" });
}

#[test]
fn with_resolves_values_in_the_enclosing_scope() {
    assert_eq!(
        render(
            "{% with total=items|length name=user %}{{ name }}:{{ total }}{% endwith %}",
            &[
                ("items", Value::list(vec![Value::from(1), Value::from(2)])),
                ("user", Value::from("ada")),
            ]
        ),
        "ada:2"
    );
}

#[test]
fn nested_with_shadows_and_restores() {
    assert_eq!(
        render(
            "{% with a='outer' %}{% with a='inner' %}{{ a }}{% endwith %}{{ a }}{% endwith %}",
            &[]
        ),
        "innerouter"
    );
}
