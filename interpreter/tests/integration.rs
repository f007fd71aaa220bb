use std::cell::{Cell, RefCell};

use interpreter::{
    CompileArgs, Completion, FileResolver, MemoryResolver, ResolvedTemplate, RuntimeValue,
    TemplateResolver, compile, compile_sync,
};
use razor::{ErrorKind, RazorError};
use serde_json::json;

fn render(source: &str) -> String {
    compile_sync(CompileArgs::new(source)).expect("render failed")
}

fn render_with(source: &str, model: serde_json::Value) -> String {
    compile_sync(CompileArgs::new(source).model(model)).expect("render failed")
}

fn render_err(source: &str) -> RazorError {
    match compile_sync(CompileArgs::new(source).file_path("page.raz")) {
        Ok(html) => panic!("expected an error, got {:?}", html),
        Err(e) => e,
    }
}

fn views(entries: &[(&str, &str)]) -> MemoryResolver {
    entries
        .iter()
        .fold(MemoryResolver::new(), |resolver, (name, source)| {
            resolver.with(*name, *source)
        })
}

// ---------------------------------------------------------------------------
// End-to-end scenarios
// ---------------------------------------------------------------------------

#[test]
fn model_property_in_markup() {
    assert_eq!(
        render_with("<p>Hi @Model.name!</p>", json!({"name": "Bob"})),
        "<p>Hi Bob!</p>"
    );
}

#[test]
fn if_else_picks_a_branch() {
    let source = "@if (Model.x) { <b>yes</b> } else { <i>no</i> }";
    assert_eq!(render_with(source, json!({"x": false})), "<i>no</i>");
    assert_eq!(render_with(source, json!({"x": true})), "<b>yes</b>");
}

#[test]
fn section_renders_at_its_consumption_point() {
    let source = "<p>x</p>\n@section Foo { <span>hi</span> }\n<p>y</p>@Html.section(\"Foo\")";
    assert_eq!(render(source), "<p>x</p>\n<p>y</p><span>hi</span>");
}

#[test]
fn layout_wraps_the_body() {
    let resolver = views(&[("Layout", "<html>@Html.body()</html>")]);
    let html = compile_sync(
        CompileArgs::new("@{ Html.layout = \"Layout\"; }<p>content</p>").resolver(&resolver),
    )
    .expect("render failed");
    assert_eq!(html, "<html><p>content</p></html>");
}

#[test]
fn markup_without_code_is_unchanged() {
    let source = "<!DOCTYPE html>\n<html>\n  <body class=\"x\">\n    <br>\n  </body>\n</html>\n";
    assert_eq!(render(source), source);
}

#[test]
fn double_at_renders_one_at() {
    assert_eq!(render("<a>me@@example.com</a>"), "<a>me@example.com</a>");
}

// ---------------------------------------------------------------------------
// Value encoding
// ---------------------------------------------------------------------------

#[test]
fn text_is_escaped() {
    let html = render_with("<p>@Model.text</p>", json!({"text": "<b>&</b>"}));
    assert!(html.contains("&lt;b&gt;&amp;&lt;/b&gt;"), "{}", html);
}

#[test]
fn numbers_and_raw_markup_are_not_escaped() {
    assert_eq!(render("@(1 + 2)"), "3");
    assert_eq!(
        render_with("@Html.raw(Model.text)", json!({"text": "<b>x</b>"})),
        "<b>x</b>"
    );
}

#[test]
fn empty_values_write_nothing() {
    assert_eq!(
        render_with(
            "[@Model.missing][@Model.none][@Model.blank]",
            json!({"none": null, "blank": ""})
        ),
        "[][][]"
    );
    assert_eq!(render("[@Html.raw(undefined)]"), "[]");
}

#[test]
fn encode_writes_escaped_text() {
    assert_eq!(render("@{ Html.encode(\"a < b\"); }"), "a &lt; b");
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[test]
fn for_loop_repeats_markup() {
    let source = "@for (var i = 0; i < 2; i++) {\n    <li>@i</li>\n}\n";
    assert_eq!(render(source), "    <li>0</li>\n    <li>1</li>\n");
}

#[test]
fn for_of_iterates_model_items() {
    let source = "<ul>@for (var item of Model.items) {<li>@item.name</li>}</ul>";
    let model = json!({"items": [{"name": "a"}, {"name": "b"}]});
    assert_eq!(render_with(source, model), "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn code_block_variables_are_visible_to_markup() {
    let source = "@{ var n = Model.n * 2; }\n<p>@n</p>";
    assert_eq!(render_with(source, json!({"n": 21})), "<p>42</p>");
}

#[test]
fn markup_inside_code_block() {
    let source = "@{ var n = Model.n; <p>@n</p> }";
    assert_eq!(render_with(source, json!({"n": 7})), "<p>7</p>");
}

#[test]
fn while_with_break_and_continue() {
    let source = "@{ var i = 0; while (true) { i++; \
                  if (i == 2) { continue; } if (i > 4) { break; } <b>@i</b> } }";
    assert_eq!(render(source), "<b>1</b><b>3</b><b>4</b>");
}

#[test]
fn for_in_lists_object_keys() {
    let source = "@for (var key in Model) {<i>@key</i>}";
    assert_eq!(
        render_with(source, json!({"b": 1, "a": 2})),
        "<i>a</i><i>b</i>"
    );
}

#[test]
fn let_is_block_scoped_and_var_is_not() {
    let source = "@if (true) { var a = 1; let b = 2; }@(typeof a)/@(typeof b)";
    assert_eq!(render(source), "number/undefined");
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[test]
fn operators_follow_precedence() {
    assert_eq!(render("@(2 + 3 * 4)"), "14");
    assert_eq!(render("@((2 + 3) * 4)"), "20");
    assert_eq!(render("@(10 % 4 - 1)"), "1");
    assert_eq!(render("@(7 / 2)"), "3.5");
}

#[test]
fn plus_concatenates_text() {
    assert_eq!(render("@(\"a\" + 1 + 2)"), "a12");
    assert_eq!(render("@(1 + 2 + \"a\")"), "3a");
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(render_with("@(Model.a || \"fallback\")", json!({"a": ""})), "fallback");
    assert_eq!(render_with("@(Model.a ?? \"fallback\")", json!({"a": ""})), "");
    assert_eq!(render("@(false && missing.value)"), "false");
}

#[test]
fn equality_is_loose_or_strict() {
    assert_eq!(render("@(1 == \"1\")/@(1 === \"1\")/@(null == undefined)"), "true/false/true");
}

#[test]
fn ternary_and_template_literals() {
    let source = "@(Model.n > 1 ? `${Model.n} items` : \"one item\")";
    assert_eq!(render_with(source, json!({"n": 3})), "3 items");
    assert_eq!(render_with(source, json!({"n": 1})), "one item");
}

#[test]
fn array_and_object_literals() {
    assert_eq!(render("@{ var xs = [1, 2, 3]; }@xs.length/@xs[1]/@xs.join(\"-\")"), "3/2/1-2-3");
    assert_eq!(render("@{ var o = { a: 1, \"b\": 2 }; o.c = 3; }@(o.a + o.b + o.c)"), "6");
}

#[test]
fn compound_assignment_and_updates() {
    assert_eq!(render("@{ var x = 1; x += 4; x -= 2; var y = x++; }@x/@y"), "4/3");
    assert_eq!(render("@{ var s = \"a\"; s += \"b\"; }@s"), "ab");
}

#[test]
fn builtin_methods() {
    let model = json!({"name": "  Ada Lovelace  ", "price": 3.14159});
    assert_eq!(render_with("@Model.name.trim().toUpperCase()", model.clone()), "ADA LOVELACE");
    assert_eq!(render_with("@Model.price.toFixed(2)", model.clone()), "3.14");
    assert_eq!(
        render_with("@Model.name.trim().split(\" \").length", model.clone()),
        "2"
    );
    assert_eq!(render_with("@Model.name.includes(\"Ada\")", model.clone()), "true");
    assert_eq!(render_with("@Model.name.trim().substring(0, 3)", model), "Ada");
    assert_eq!(render("@(\"a-b-c\".replace(\"-\", \"+\"))"), "a+b-c");
    assert_eq!(render("@([1, 2].indexOf(2))"), "1");
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[test]
fn required_missing_section_is_an_error() {
    let err = render_err("@Html.section(\"Nope\", true)");
    assert_eq!(
        err.kind,
        ErrorKind::SectionIsNotFound {
            name: "Nope".to_string(),
            requested_by: "page.raz".to_string()
        }
    );
}

#[test]
fn optional_missing_section_renders_nothing() {
    assert_eq!(render("[@Html.section(\"Nope\")]"), "[]");
}

#[test]
fn section_can_be_rendered_once() {
    let err = render_err("@section A { <b>a</b> }@Html.section(\"A\")@Html.section(\"A\")");
    assert_eq!(
        err.kind,
        ErrorKind::SectionHasBeenRendered {
            name: "A".to_string(),
            rendered_by: "page.raz".to_string(),
            requested_by: "page.raz".to_string()
        }
    );
}

#[test]
fn layout_renders_sections_of_the_page() {
    let resolver = views(&[(
        "Layout",
        "<head>@Html.section(\"Head\")</head><body>@Html.body()</body>",
    )]);
    let source = "@{ Html.layout = \"Layout\"; }@section Head { <title>T</title> }<p>main</p>";
    let html = compile_sync(CompileArgs::new(source).resolver(&resolver)).expect("render failed");
    assert_eq!(html, "<head><title>T</title></head><body><p>main</p></body>");
}

#[test]
fn partial_sections_reach_the_layout() {
    let resolver = views(&[
        ("Layout", "@Html.body()|@Html.section(\"Scripts\")"),
        ("Widget", "<w/>@section Scripts { <script></script> }"),
    ]);
    let source = "@{ Html.layout = \"Layout\"; }<main>@Html.partial(\"Widget\")</main>";
    let html = compile_sync(CompileArgs::new(source).resolver(&resolver)).expect("render failed");
    assert_eq!(html, "<main><w/></main>|<script></script>");
}

#[test]
fn duplicate_section_across_partial_is_an_error() {
    let resolver = views(&[("Widget", "@section A { <b>2</b> }")]);
    let source = "@section A { <b>1</b> }@Html.partial(\"Widget\")";
    let err = compile_sync(CompileArgs::new(source).file_path("page.raz").resolver(&resolver))
        .expect_err("duplicate section");
    assert_eq!(
        err.kind,
        ErrorKind::SectionIsAlreadyDefined {
            name: "A".to_string()
        }
    );
    assert_eq!(err.file_path, "Widget");
}

// ---------------------------------------------------------------------------
// Partials and layouts
// ---------------------------------------------------------------------------

#[test]
fn partial_uses_parent_or_given_model() {
    let resolver = views(&[("Name", "<i>@Model.name</i>")]);
    let model = json!({"name": "page", "child": {"name": "child"}});
    let source = "@Html.partial(\"Name\")@Html.partial(\"Name\", Model.child)";
    let html = compile_sync(CompileArgs::new(source).model(model).resolver(&resolver))
        .expect("render failed");
    assert_eq!(html, "<i>page</i><i>child</i>");
}

#[test]
fn partial_output_is_captured_by_a_section() {
    let resolver = views(&[("P", "<p>p</p>")]);
    let source = "@section S { <div>@Html.partial(\"P\")</div> }[@Html.section(\"S\")]";
    let html = compile_sync(CompileArgs::new(source).resolver(&resolver)).expect("render failed");
    assert_eq!(html, "[<div><p>p</p></div>]");
}

#[test]
fn missing_partial_is_reported() {
    let resolver = MemoryResolver::new();
    let err = compile_sync(CompileArgs::new("@Html.partial(\"Nope\")").resolver(&resolver))
        .expect_err("missing partial");
    assert!(matches!(err.kind, ErrorKind::PartialNotFound { ref name, .. } if name == "Nope"));
}

#[test]
fn recursive_partials_are_bounded() {
    let resolver = views(&[("Loop", "@Html.partial(\"Loop\")")]);
    let err = compile_sync(CompileArgs::new("@Html.partial(\"Loop\")").resolver(&resolver))
        .expect_err("too deep");
    assert!(matches!(err.kind, ErrorKind::TemplateNestingTooDeep { .. }));
}

#[test]
fn layouts_can_chain() {
    let resolver = views(&[
        ("Inner", "@{ Html.layout = \"Outer\"; }<inner>@Html.body()</inner>"),
        ("Outer", "<outer>@Html.body()</outer>"),
    ]);
    let html = compile_sync(
        CompileArgs::new("@{ Html.layout = \"Inner\"; }page").resolver(&resolver),
    )
    .expect("render failed");
    assert_eq!(html, "<outer><inner>page</inner></outer>");
}

#[test]
fn layout_can_be_read_back() {
    assert_eq!(render("@{ Html.layout = null; }[@Html.layout]"), "[]");
}

/// Counts the layout lookups made through the continuation form.
struct CountingResolver {
    views: MemoryResolver,
    lookups: Cell<usize>,
}

impl TemplateResolver for CountingResolver {
    fn find_partial_sync(
        &self,
        name: &str,
        from_path: &str,
    ) -> Result<ResolvedTemplate, RazorError> {
        self.views.find_partial_sync(name, from_path)
    }

    fn find_partial<'a>(
        &'a self,
        name: &str,
        from_path: &str,
        done: Completion<'a, ResolvedTemplate>,
    ) {
        self.lookups.set(self.lookups.get() + 1);
        done(self.views.find_partial_sync(name, from_path));
    }
}

#[test]
fn async_compile_completes_once_layouts_resolve() {
    let resolver = MemoryResolver::new().with("Layout", "<l>@Html.body()</l>");
    let result = RefCell::new(None);
    compile(
        CompileArgs::new("@{ Html.layout = \"Layout\"; }x").resolver(&resolver),
        |html| *result.borrow_mut() = Some(html),
    );
    let html = result.into_inner().expect("completed").expect("render failed");
    assert_eq!(html, "<l>x</l>");
}

#[test]
fn async_compile_delivers_errors_to_the_callback() {
    let result = RefCell::new(None);
    compile(CompileArgs::new("<div>"), |html| *result.borrow_mut() = Some(html));
    let err = result.into_inner().expect("completed").expect_err("parse error");
    assert!(matches!(err.kind, ErrorKind::MissingMatchingEndTag { .. }));
}

#[test]
fn async_compile_resolves_layouts_through_the_continuation() {
    let resolver = CountingResolver {
        views: views(&[
            ("Inner", "@{ Html.layout = \"Outer\"; }<i>@Html.body()</i>"),
            ("Outer", "<o>@Html.body()</o>"),
        ]),
        lookups: Cell::new(0),
    };
    let result = RefCell::new(None);
    compile(
        CompileArgs::new("@{ Html.layout = \"Inner\"; }x").resolver(&resolver),
        |html| *result.borrow_mut() = Some(html),
    );
    assert_eq!(resolver.lookups.get(), 2);
    let html = result.into_inner().expect("completed").expect("render failed");
    assert_eq!(html, "<o><i>x</i></o>");
}

#[test]
fn async_compile_reports_a_missing_layout() {
    let result = RefCell::new(None);
    compile(
        CompileArgs::new("@{ Html.layout = \"Nope\"; }x").resolver(&MemoryResolver::new()),
        |html| *result.borrow_mut() = Some(html),
    );
    let err = result.into_inner().expect("completed").expect_err("missing layout");
    assert!(matches!(err.kind, ErrorKind::PartialNotFound { .. }));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn parse_errors_carry_path_and_position() {
    let err = render_err("<p>\n  <div>\n</p>");
    assert_eq!(err.file_path, "page.raz");
    assert!(err.line().is_some());
}

#[test]
fn evaluation_errors_are_wrapped() {
    let err = render_err("@missing.value");
    assert_eq!(
        err.kind,
        ErrorKind::Evaluation {
            message: "missing is not defined".to_string()
        }
    );
    assert_eq!(err.file_path, "page.raz");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn stray_break_is_an_error() {
    let err = render_err("@{ break; }");
    assert!(matches!(err.kind, ErrorKind::Evaluation { .. }));
}

#[test]
fn division_by_zero_is_an_error() {
    let err = render_err("@(1 / 0)");
    assert_eq!(
        err.kind,
        ErrorKind::Evaluation {
            message: "division by zero".to_string()
        }
    );
}

#[test]
fn deeply_nested_expression_is_an_error() {
    let source = format!("@({}1{})", "(".repeat(10_000), ")".repeat(10_000));
    let err = render_err(&source);
    assert_eq!(
        err.kind,
        ErrorKind::Evaluation {
            message: "stack overflow".to_string()
        }
    );
}

#[test]
fn moderately_nested_expression_renders() {
    let source = format!("@({}1{})", "(".repeat(100), ")".repeat(100));
    assert_eq!(render(&source), "1");
}

#[test]
fn array_assignment_grows_the_array() {
    assert_eq!(render("@{ var a = []; a[2] = 1; }@a.length"), "3");
}

#[test]
fn array_assignment_far_past_the_end_is_an_error() {
    let err = render_err("@{ var a = []; a[4294967296000] = 1; }ok");
    assert!(matches!(
        err.kind,
        ErrorKind::Evaluation { ref message } if message.contains("out of range")
    ));

    let err = render_err("@{ var a = []; a[1000000 * 1000000 * 1000000 * 1000000] = 1; }ok");
    assert!(matches!(err.kind, ErrorKind::Evaluation { .. }));
}

// ---------------------------------------------------------------------------
// File resolver
// ---------------------------------------------------------------------------

#[test]
fn file_resolver_searches_next_to_the_page_then_views() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pages = dir.path().join("pages");
    let shared = dir.path().join("shared");
    std::fs::create_dir_all(&pages).expect("mkdir");
    std::fs::create_dir_all(&shared).expect("mkdir");
    std::fs::write(pages.join("Local.raz"), "<local/>").expect("write");
    std::fs::write(shared.join("_Layout.raz"), "<main>@Html.body()</main>").expect("write");

    let resolver = FileResolver::new().with_views(&shared);
    let page = pages.join("index.raz");
    let html = compile_sync(
        CompileArgs::new("@{ Html.layout = \"_Layout\"; }@Html.partial(\"Local\")")
            .file_path(page.display().to_string())
            .resolver(&resolver),
    )
    .expect("render failed");
    assert_eq!(html, "<main><local/></main>");
}

#[test]
fn file_resolver_lists_searched_locations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let resolver = FileResolver::new().with_views(dir.path());
    let err = resolver
        .find_partial_sync("Missing", "default")
        .expect_err("missing");
    match err.kind {
        ErrorKind::PartialNotFound { name, searched } => {
            assert_eq!(name, "Missing");
            assert_eq!(searched.len(), 1);
            assert!(searched[0].ends_with("Missing.raz"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn file_resolver_honours_a_custom_extension() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("p.cshtml"), "ok").expect("write");
    let resolver = FileResolver::new()
        .with_views(dir.path())
        .with_extension(".cshtml");
    let resolved = resolver.find_partial_sync("p", "default").expect("found");
    assert_eq!(resolved.data, "ok");
}

#[test]
fn models_convert_from_json() {
    let value = RuntimeValue::from(json!({"a": [1, "x", null], "b": true}));
    assert_eq!(value.property("a").map(|a| a.to_string()), Some("1,x,".to_string()));
    assert_eq!(value.property("b"), Some(RuntimeValue::Boolean(true)));
}
