use hawk_templates::{Engine, Error, ErrorKind, Object, Options, Value};
use serde_json::json;

async fn render(source: &str, vars: serde_json::Value) -> Result<String, Error> {
    Engine::new(Options::default())
        .render_source("test", source, vars)
        .await
}

async fn render_ok(source: &str, vars: serde_json::Value) -> String {
    match render(source, vars).await {
        Ok(html) => html,
        Err(err) => panic!("render of {source:?} failed: {err}"),
    }
}

#[tokio::test]
async fn test_operators_are_linear() {
    assert_eq!(render_ok("{%= 1 plus 2 multiply 3 %}", json!({})).await, "9");
    assert_eq!(render_ok("{%= 10 minus 4 divide 2 %}", json!({})).await, "3");
    assert_eq!(render_ok("{%= 'a' plus 1 plus 2 %}", json!({})).await, "a12");
}

#[tokio::test]
async fn test_symbol_operators() {
    assert_eq!(render_ok("{%= x == 1 && y != 2 %}", json!({"x": "1", "y": 3})).await, "true");
    assert_eq!(render_ok("{%= x >= 5 %}", json!({"x": 4})).await, "false");
}

#[tokio::test]
async fn test_not_and_double_not() {
    assert_eq!(render_ok("{%= not x %}", json!({"x": ""})).await, "true");
    assert_eq!(render_ok("{%= not not 'x' %}", json!({})).await, "true");
    assert_eq!(render_ok("{%= a not eq b %}", json!({"a": 1, "b": 2})).await, "true");
}

#[tokio::test]
async fn test_short_circuit() {
    assert_eq!(render_ok("{%= 0 or 'fallback' %}", json!({})).await, "fallback");
    assert_eq!(render_ok("{%= 1 and 0 %}", json!({})).await, "0");
    // The right side is never looked at, so an unknown call is harmless
    assert_eq!(render_ok("{%= 'left' or missing() %}", json!({})).await, "left");
}

#[tokio::test]
async fn test_string_operators() {
    assert_eq!(render_ok("{%= name starts with 'Jel' %}", json!({"name": "Jelle"})).await, "true");
    assert_eq!(render_ok("{%= '   ' empty %}", json!({})).await, "true");
    assert_eq!(render_ok("{%= html emptyhtml %}", json!({"html": "<p> &nbsp;</p>"})).await, "true");
    assert_eq!(render_ok("{%= html emptyhtml %}", json!({"html": "<p><img src=\"a\"></p>"})).await, "false");
}

#[tokio::test]
async fn test_unexpected_token() {
    let err = render("{%= 1 2 %}", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("Unexpected token"), "{err}");
}

#[tokio::test]
async fn test_globals() {
    assert_eq!(render_ok("{%= Math.max(1, 5, 3) %}", json!({})).await, "5");
    assert_eq!(render_ok("{%= JSON.stringify(data) %}", json!({"data": {"a": [1, true]}})).await, "{\"a\":[1,true]}");
    assert_eq!(render_ok("{%= String(12) plus 3 %}", json!({})).await, "123");
}

#[tokio::test]
async fn test_object_and_array_printing() {
    assert_eq!(render_ok("{%= list %}", json!({"list": ["a", "b"]})).await, "ab");
    assert_eq!(render_ok("{%= obj %}", json!({"obj": {"a": 1}})).await, "{\"a\":1}");
    assert_eq!(render_ok("[{%= nothing %}]", json!({"nothing": null})).await, "[]");
}

#[tokio::test]
async fn test_logic_assignment() {
    assert_eq!(render_ok("<% total = 1 + 2 %>{%= total %}", json!({})).await, "3");
    assert_eq!(render_ok("<% var a = 'x'; let b = a + 'y' %>{%= b %}", json!({})).await, "xy");
}

#[tokio::test]
async fn test_print_text_escapes() {
    assert_eq!(render_ok("<% printText('<b>') %>", json!({})).await, "&lt;b&gt;");
    assert_eq!(render_ok("<% print('<b>') %>", json!({})).await, "<b>");
}

#[tokio::test]
async fn test_while_skips_none_branch() {
    let with = "{% with list as item %}{% none %}none{% /with %}";
    let while_ = "{% while list as item %}{% none %}none{% /while %}";
    assert_eq!(render_ok(with, json!({"list": []})).await, "none");
    assert_eq!(render_ok(while_, json!({"list": []})).await, "");
}

#[tokio::test]
async fn test_with_first_non_empty_path() {
    let source = "{% with a, b as item %}{% each %}{%= item %}{% /each %}{% /with %}";
    assert_eq!(render_ok(source, json!({"a": [], "b": [1, 2]})).await, "12");
}

#[tokio::test]
async fn test_with_where_filter() {
    let source = "{% with posts as post where post.published %}{% each %}{%= post.title %},{% /each %}{% /with %}";
    let vars = json!({"posts": [
        {"title": "a", "published": true},
        {"title": "b", "published": false},
    ]});
    assert_eq!(render_ok(source, vars).await, "a,");
}

#[tokio::test]
async fn test_with_all_branch() {
    let source = "{% with items as item %}{% all %}{% each %}{%= item %}{% /each %}{% /with %}";
    assert_eq!(render_ok(source, json!({"items": [1, 2]})).await, "12");
    assert_eq!(render_ok(source, json!({"items": []})).await, "");
}

#[tokio::test]
async fn test_each_over_object() {
    let source = "{% each prices as price %}{%= price %};{% /each %}";
    assert_eq!(render_ok(source, json!({"prices": {"b": 2, "a": 1}})).await, "2;1;");
}

#[tokio::test]
async fn test_each_else() {
    let source = "{% each items as item %}{%= item %}{% else %}empty{% /each %}";
    assert_eq!(render_ok(source, json!({"items": []})).await, "empty");
    assert_eq!(render_ok(source, json!({})).await, "empty");
}

#[tokio::test]
async fn test_break_ends_nearest_expression() {
    let source = "{% each items as item %}{%= item %}{% break %}{% /each %}";
    assert_eq!(render_ok(source, json!({"items": [1, 2, 3]})).await, "1");
}

#[tokio::test]
async fn test_named_break_passes_through() {
    let source = "{% each items as item %}{% if item gt 1 %}{% break each %}{% /if %}{%= item %}{% /each %}done";
    assert_eq!(render_ok(source, json!({"items": [1, 2, 3]})).await, "1done");
}

#[tokio::test]
async fn test_macro_scope() {
    let source = "{% macro show(value) %}[{%= value %}{%= outer %}]{% /macro %}{% print macro show(1) %}";
    assert_eq!(render_ok(source, json!({"outer": "!"})).await, "[1!]");
}

#[tokio::test]
async fn test_unknown_macro() {
    let err = render("{% print macro nowhere() %}", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("Macro `nowhere` is not defined"), "{err}");
}

#[tokio::test]
async fn test_trim_blank() {
    let source = "<p> </p>{% trim blank %}";
    assert_eq!(render_ok(source, json!({})).await, "");
    let source = "<p>x</p>{% trim blank %}";
    assert_eq!(render_ok(source, json!({})).await, "<p>x</p>");
}

#[tokio::test]
async fn test_custom_delimiters() {
    let options = Options::from_json(r#"{"expressionOpen": "[[", "expressionClose": "]]"}"#).unwrap();
    let html = Engine::new(options)
        .render_source("test", "Hi [[= name ]] {%= name %}", json!({"name": "Ann"}))
        .await
        .unwrap();
    assert_eq!(html, "Hi Ann {%= name %}");
}

#[tokio::test]
async fn test_compile_errors() {
    let engine = Engine::new(Options::default());

    let err = engine.compile("a", "{% if x").unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnterminatedTag);

    let err = engine.compile("b", "<% a = %>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSyntax);

    let err = engine.compile("c", "{% with list %}{% /with %}").unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidSyntax);
    assert!(err.to_string().contains("needs an alias"), "{err}");
}

#[tokio::test]
async fn test_if_round_trip() {
    assert_eq!(render_ok("{% if true %}TRUE{% /if %}", json!({})).await, "TRUE");
    assert_eq!(render_ok("{% if false %}TRUE{% else %}ELSE{% /if %}", json!({})).await, "ELSE");
    assert_eq!(render_ok("{% if \"a\" eq \"b\" %}TRUE{% /if %}", json!({})).await, "");
    assert_eq!(render_ok("{% if 1 not eq 0 %}TRUE{% /if %}", json!({})).await, "TRUE");
}

#[tokio::test]
async fn test_break_skips_rest_and_else() {
    let source = "{% if true %}1{% break %}WRONG{% else %}0{% /if %}";
    assert_eq!(render_ok(source, json!({})).await, "1");
}

#[tokio::test]
async fn test_trim_collapses_whitespace() {
    assert_eq!(render_ok("Bla bla {% trim %} bla bla", json!({})).await, "Bla blabla bla");
}

#[tokio::test]
async fn test_multiple_visits_every_element() {
    let source = "{% with numbers as n %}{% multiple %}{% each %}{%= n %}{% /each %}{% /with %}";
    assert_eq!(render_ok(source, json!({"numbers": [0, 1, 2, 3]})).await, "0123");
}

#[tokio::test]
async fn test_branch_matrix() {
    let body = "{% none %}N{% single %}S{%= item %}{% multiple %}M{% each %}{%= item %}{% /each %}{% all %}A";
    let with = format!("{{% with items as item %}}{}{{% /with %}}", body);
    let while_ = format!("{{% while items as item %}}{}{{% /while %}}", body);

    let cases = [
        (json!([]), "N", ""),
        (json!([1]), "S1A", "S1A"),
        (json!([1, 2]), "M12A", "M12A"),
        (json!({"a": 7}), "S7A", "S7A"),
    ];
    for (items, with_expected, while_expected) in cases {
        let vars = json!({ "items": items });
        assert_eq!(render_ok(&with, vars.clone()).await, with_expected, "with {vars}");
        assert_eq!(render_ok(&while_, vars.clone()).await, while_expected, "while {vars}");
    }
}

#[tokio::test]
async fn test_compiling_twice_is_equivalent() {
    let engine = Engine::new(Options::default());
    let source = "{% each list as x %}{%= x multiply 2 %},{% /each %}";
    let first = engine.compile("a", source).unwrap();
    let second = engine.compile("b", source).unwrap();
    let vars = json!({"list": [1, 2]});
    let a = engine.render_template(first, vars.clone()).finish().await.unwrap();
    let b = engine.render_template(second, vars).finish().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a, "2,4,");
}

#[tokio::test]
async fn test_logic_uses_lookup_chain() {
    let engine = Engine::new(Options::default());
    engine.register_helper(
        "greet",
        Value::function("greet", |renderer, _| {
            renderer.print(Value::from("helper"))?;
            Ok(Value::Undefined)
        }),
    );
    let source = "<% greet() %>";
    let html = engine.render_source("test", source, json!({})).await.unwrap();
    assert_eq!(html, "helper");

    let mut vars = Object::new();
    vars.insert(
        "greet".into(),
        Value::function("greet", |renderer, _| {
            renderer.print(Value::from("variable"))?;
            Ok(Value::Undefined)
        }),
    );
    let html = engine.render_source("test", source, vars).await.unwrap();
    assert_eq!(html, "variable");
}
