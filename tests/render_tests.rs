use std::cell::Cell;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use hawk_templates::{
    Content, Engine, Error, ErrorKind, LOOP_MARKER, MemorySource, Object, Options, RenderState,
    Renderable, Renderer, Result, Value,
};
use serde_json::json;

fn engine(templates: &[(&str, &str)]) -> Engine {
    let source = MemorySource::new();
    for (name, text) in templates {
        source.insert(*name, *text);
    }
    Engine::with_source(Options::default(), source)
}

async fn render(engine: &Engine, name: &str, vars: serde_json::Value) -> Result<String> {
    engine.render(name, vars).finish().await
}

struct Counted {
    calls: Rc<Cell<usize>>,
}

impl Renderable for Counted {
    fn render_content<'a>(&'a self, _renderer: &'a Renderer) -> LocalBoxFuture<'a, Result<Content>> {
        self.calls.set(self.calls.get() + 1);
        async { Ok(Content::text("<b>")) }.boxed_local()
    }
}

/// Renders a template that prints this same value again
struct Recursive;

impl Renderable for Recursive {
    fn render_content<'a>(&'a self, renderer: &'a Renderer) -> LocalBoxFuture<'a, Result<Content>> {
        async move {
            let buffer = renderer.render_template("inner", renderer.variables()).await?;
            Ok(Content::Block(buffer))
        }
        .boxed_local()
    }
}

struct Failing;

impl Renderable for Failing {
    fn render_content<'a>(&'a self, _renderer: &'a Renderer) -> LocalBoxFuture<'a, Result<Content>> {
        async { Err(Error::Async("backend unavailable".to_string())) }.boxed_local()
    }
}

#[tokio::test]
async fn test_render_simple() {
    let engine = engine(&[("hello", "Hello {%= name %}!")]);
    let html = render(&engine, "hello", json!({"name": "world"})).await.unwrap();
    assert_eq!(html, "Hello world!");
}

#[tokio::test]
async fn test_expands_keeps_child_block() {
    let engine = engine(&[
        ("base", "{% block 'title' %}Default{% /block %}<% assign('title') %>"),
        ("child", "<% expands('base') %>{% block 'title' %}Child{% /block %}"),
    ]);
    let html = render(&engine, "child", json!({})).await.unwrap();
    assert_eq!(
        html,
        "<he-block data-hid=\"hserverside-0\" data-he-name=\"title\" data-he-template=\"child\">Child</he-block>"
    );
}

#[tokio::test]
async fn test_parent_block_used_without_override() {
    let engine = engine(&[
        ("base", "{% block 'title' %}Default{% /block %}[<% assign('title') %>]"),
        ("child", "<% expands('base') %>"),
    ]);
    let html = render(&engine, "child", json!({})).await.unwrap();
    assert!(html.contains(">Default</he-block>]"), "{html}");
    assert!(html.contains("data-he-template=\"base\""), "{html}");
}

#[tokio::test]
async fn test_assign_missing_block_is_empty_element() {
    let engine = engine(&[("page", "<% assign('nothing') %>")]);
    let html = render(&engine, "page", json!({})).await.unwrap();
    assert_eq!(html, "<he-block data-hid=\"hserverside-0\" data-he-name=\"nothing\"></he-block>");
}

#[tokio::test]
async fn test_assign_class_name() {
    let engine = engine(&[(
        "page",
        "{% block 'main', {className: 'wide'} %}x{% /block %}<% assign('main', {className: 'slot'}) %>",
    )]);
    let html = render(&engine, "page", json!({})).await.unwrap();
    assert_eq!(
        html,
        "<he-block class=\"slot wide\" data-hid=\"hserverside-0\" data-he-name=\"main\" data-he-template=\"page\">x</he-block>"
    );
}

#[tokio::test]
async fn test_partial_blocks_are_isolated() {
    let engine = engine(&[
        ("page", "{% block 'main' %}outer{% /block %}<% partial('part') %>|<% assign('main') %>"),
        ("part", "{% block 'main' %}inner{% /block %}<% assign('main') %>"),
    ]);
    let html = render(&engine, "page", json!({})).await.unwrap();
    assert_eq!(
        html,
        "<he-block data-hid=\"hserverside-1\" data-he-name=\"main\" data-he-template=\"part\">inner</he-block>|\
         <he-block data-hid=\"hserverside-0\" data-he-name=\"main\" data-he-template=\"page\">outer</he-block>"
    );
}

#[tokio::test]
async fn test_implement_shares_block_namespace() {
    let engine = engine(&[
        ("page", "<% implement('part') %><% assign('side') %>"),
        ("part", "{% block 'side' %}from part{% /block %}"),
    ]);
    let html = render(&engine, "page", json!({})).await.unwrap();
    assert!(html.contains(">from part</he-block>"), "{html}");
}

#[tokio::test]
async fn test_include_passes_variables() {
    let engine = engine(&[
        ("page", "<% include('row', {label: 'x'}) %>-{%= label %}"),
        ("row", "[{%= label %}]"),
    ]);
    let html = render(&engine, "page", json!({"label": "outer"})).await.unwrap();
    assert_eq!(html, "[x]-outer");
}

#[tokio::test]
async fn test_theme_prefers_themed_template() {
    let engine = engine(&[("page", "plain"), ("page.dark", "dark")]);
    let renderer = engine.render("page", json!({}));
    renderer.set_theme(Some("dark"));
    assert_eq!(renderer.finish().await.unwrap(), "dark");

    let renderer = engine.render("page", json!({}));
    renderer.set_theme(Some("light"));
    assert_eq!(renderer.finish().await.unwrap(), "plain");
}

#[tokio::test]
async fn test_theme_on_block_element() {
    let engine = engine(&[("page", "<% assign('main') %>")]);
    let renderer = engine.render("page", json!({}));
    renderer.set_theme(Some("dark"));
    let html = renderer.finish().await.unwrap();
    assert!(html.contains("data-theme=\"dark\""), "{html}");
}

#[tokio::test]
async fn test_renderable_resolved_once() {
    let engine = engine(&[("page", "{%= item %}|{%= item %}")]);
    let calls = Rc::new(Cell::new(0));
    let mut vars = Object::new();
    vars.insert("item".into(), Value::content(Counted { calls: calls.clone() }));

    let html = engine.render("page", vars).finish().await.unwrap();
    assert_eq!(html, "&lt;b&gt;|&lt;b&gt;");
    assert_eq!(calls.get(), 1);
}

#[tokio::test]
async fn test_renderable_loop_guard() {
    let engine = engine(&[("outer", "<div>{%= widget %}</div>"), ("inner", "[{%= widget %}]")]);
    let mut vars = Object::new();
    vars.insert("widget".into(), Value::content(Recursive));

    let html = engine.render("outer", vars).finish().await.unwrap();
    assert_eq!(html, format!("<div>[{}]</div>", LOOP_MARKER));
}

#[tokio::test]
async fn test_async_error_ends_render() {
    let engine = engine(&[("page", "before {%= broken %}")]);
    let mut vars = Object::new();
    vars.insert("broken".into(), Value::content(Failing));

    let renderer = engine.render("page", vars);
    let err = renderer.finish().await.unwrap_err();
    assert!(matches!(err, Error::Async(_)));
    assert_eq!(renderer.state(), RenderState::Errored);
}

#[tokio::test]
async fn test_runtime_error_has_context() {
    let engine = engine(&[("page", "one\ntwo\n{%= nope() %}\nfour")]);
    let err = render(&engine, "page", json!({})).await.unwrap_err();
    let Error::Runtime(err) = err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert_eq!(err.template.as_deref(), Some("page"));
    assert_eq!(err.line, Some(3));
    let context = err.context.unwrap();
    assert!(context.contains("»»» 3 | {%= nope() %}"), "{context}");
}

#[tokio::test]
async fn test_missing_template() {
    let engine = engine(&[]);
    let err = render(&engine, "nowhere", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(name) if name == "nowhere"));
}

#[tokio::test]
async fn test_compile_error_is_cached() {
    let engine = engine(&[("bad", "{% if x %}")]);
    for _ in 0..2 {
        match render(&engine, "bad", json!({})).await {
            Err(Error::Compile(err)) => assert_eq!(err.kind, ErrorKind::UnclosedExpression),
            other => panic!("expected a compile error, got {other:?}"),
        }
    }
    assert!(engine.compiled("bad").is_some_and(|result| result.is_err()));
}

#[tokio::test]
async fn test_nesting_depth_limit() {
    let options = Options {
        max_depth: 5,
        ..Options::default()
    };
    let engine = Engine::with_source(options, MemorySource::new().with("self", "<% implement('self') %>"));
    let err = engine.render("self", json!({})).finish().await.unwrap_err();
    assert!(err.to_string().contains("nested more than 5 levels"), "{err}");
}

#[tokio::test]
async fn test_finish_only_once() {
    let engine = engine(&[("page", "x")]);
    let renderer = engine.render("page", json!({}));
    assert_eq!(renderer.finish().await.unwrap(), "x");
    assert_eq!(renderer.state(), RenderState::Done);
    assert!(renderer.finish().await.is_err());
}

#[tokio::test]
async fn test_assemble_is_idempotent() {
    let engine = engine(&[("page", "<% assign('a') %>{% block 'a' %}A{% /block %}")]);
    let renderer = engine.render("page", json!({}));
    let html = renderer.finish().await.unwrap();

    let output = renderer.output().unwrap();
    output.assemble(&renderer).await.unwrap();
    assert_eq!(output.to_html().unwrap(), html);
    assert!(html.contains("hserverside-0"));
    assert!(!html.contains("hserverside-1"));
}

#[tokio::test]
async fn test_to_elements() {
    let engine = engine(&[("page", "a<% open_element('img', {src: 'x.png'}) %>b")]);
    let renderer = engine.render("page", json!({}));
    let html = renderer.finish().await.unwrap();
    assert_eq!(html, "a<img src=\"x.png\">b");

    let fragments = renderer.output().unwrap().to_elements().unwrap();
    let parts: Vec<String> = fragments.iter().map(|fragment| fragment.to_html()).collect();
    assert_eq!(parts, vec!["a", "<img src=\"x.png\">", "b"]);
}

#[tokio::test]
async fn test_history_snapshot() {
    let engine = engine(&[("page", "<% expose('user', {id: 7}) %>{% block 'main' %}{% /block %}")]);
    let renderer = engine.render("page", json!({"title": "Home"}));
    renderer.set_theme(Some("dark"));
    renderer.finish().await.unwrap();

    let history = serde_json::to_value(renderer.history()).unwrap();
    assert_eq!(history["entry"], "page");
    assert_eq!(history["state"], "done");
    assert_eq!(history["theme"], "dark");
    assert_eq!(history["exposed"], json!({"user": {"id": 7}}));
    assert_eq!(history["variables"], json!({"title": "Home"}));
    assert_eq!(history["blocks"][0]["name"], "main");
}

#[tokio::test]
async fn test_helpers_and_commands() {
    let engine = engine(&[("page", "<%= shout('hi') %> <% stamp 'a', 2 %>")]);
    engine.register_helper(
        "shout",
        Value::function("shout", |_, args| {
            Ok(Value::string(args.first().map(|v| v.to_string()).unwrap_or_default().to_uppercase()))
        }),
    );
    engine.register_command("stamp", |renderer, values| {
        let joined: Vec<String> = values.iter().map(|value| value.to_string()).collect();
        renderer.print(Value::string(format!("<{}>", joined.join("/"))))
    });

    let html = render(&engine, "page", json!({})).await.unwrap();
    assert_eq!(html, "HI <a/2>");
}

#[tokio::test]
async fn test_variables_shadow_helpers() {
    let engine = engine(&[("page", "{%= name %}")]);
    engine.register_helper("name", "helper");
    assert_eq!(render(&engine, "page", json!({"name": "var"})).await.unwrap(), "var");
    assert_eq!(render(&engine, "page", json!({})).await.unwrap(), "helper");
}

#[tokio::test]
async fn test_print_member_prints_every_argument() {
    let engine = Engine::new(Options::default());
    let html = engine.render_source("t", "<% print(\"a\", \"b\") %>", json!({})).await.unwrap();
    assert_eq!(html, "ab");
}

#[tokio::test]
async fn test_trim_member_uses_its_arguments() {
    let engine = Engine::new(Options::default());
    let html = engine.render_source("t", "x <% trim(false, true) %> y", json!({})).await.unwrap();
    assert_eq!(html, "x y");
    let html = engine.render_source("t", "x <% this.trim(false, true) %> y", json!({})).await.unwrap();
    assert_eq!(html, "x y");
    let html = engine.render_source("t", "x {% trim %} y", json!({})).await.unwrap();
    assert_eq!(html, "xy");
}
