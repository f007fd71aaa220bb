use razor::{Block, BlockKind, ErrorKind, Instruction, ParsedSectionRegistry, Program, RazorError};

fn parse(source: &str) -> Vec<Block> {
    let mut sections = ParsedSectionRegistry::new();
    razor::parse(source, "test.raz", &mut sections).expect("parse failed")
}

fn parse_err(source: &str) -> RazorError {
    let mut sections = ParsedSectionRegistry::new();
    match razor::parse(source, "test.raz", &mut sections) {
        Ok(blocks) => panic!("expected an error, got {:?}", blocks),
        Err(err) => err,
    }
}

fn shape(blocks: &[Block]) -> Vec<(BlockKind, &str)> {
    blocks.iter().map(|b| (b.kind, b.text.as_str())).collect()
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

#[test]
fn plain_markup_is_one_literal() {
    let source = "<div class=\"a\">\n  <p>Hi</p>\n  <br>\n</div>\n";
    let blocks = parse(source);
    assert_eq!(shape(&blocks), vec![(BlockKind::Literal, source)]);
}

#[test]
fn doctype_and_comments_are_text() {
    let source = "<!DOCTYPE html>\n<!-- <p> is not closed here -->\n<html></html>";
    let blocks = parse(source);
    assert_eq!(shape(&blocks), vec![(BlockKind::Literal, source)]);
}

#[test]
fn void_and_self_closing_tags_need_no_end_tag() {
    let source = "<p><img src=\"a.png\"><input type='text'/><BR></p>";
    assert_eq!(parse(source).len(), 1);
}

#[test]
fn quoted_attributes_may_contain_angle_brackets() {
    let source = "<a title=\"x > y\" data-x='</b>'>link</a>";
    assert_eq!(shape(&parse(source)), vec![(BlockKind::Literal, source)]);
}

#[test]
fn double_at_is_an_escape() {
    let blocks = parse("mail me: user@@example.com");
    assert_eq!(
        shape(&blocks),
        vec![(BlockKind::Literal, "mail me: user@example.com")]
    );
}

#[test]
fn unmatched_open_tag_reports_its_position() {
    let err = parse_err("<p>a</p>\n  <section>\n");
    assert_eq!(
        err.kind,
        ErrorKind::MissingMatchingEndTag {
            tag: "<section>".to_string()
        }
    );
    assert_eq!(err.line(), Some(2));
    assert_eq!(err.column(), Some(3));
    assert_eq!(err.file_path, "test.raz");
}

#[test]
fn stray_close_tag_is_an_error() {
    let err = parse_err("text</div>");
    assert_eq!(
        err.kind,
        ErrorKind::MissingMatchingStartTag {
            tag: "</div>".to_string()
        }
    );
    assert_eq!(err.column(), Some(5));
}

#[test]
fn mismatched_close_tag_is_an_error() {
    let err = parse_err("<div><span></div>");
    assert!(matches!(err.kind, ErrorKind::MissingMatchingStartTag { .. }));
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[test]
fn implicit_expression_ends_at_punctuation() {
    let blocks = parse("<p>Hi @Model.name!</p>");
    assert_eq!(
        shape(&blocks),
        vec![
            (BlockKind::Literal, "<p>Hi "),
            (BlockKind::Expression, "Model.name"),
            (BlockKind::Literal, "!</p>"),
        ]
    );
}

#[test]
fn trailing_dot_is_not_member_access() {
    let blocks = parse("Bye @Model.name.");
    assert_eq!(blocks[1].text, "Model.name");
    assert_eq!(blocks[2].text, ".");
}

#[test]
fn expression_with_calls_and_indexing() {
    let blocks = parse("@Html.raw(Model.items[0].html) done");
    assert_eq!(
        shape(&blocks),
        vec![
            (BlockKind::Expression, "Html.raw(Model.items[0].html)"),
            (BlockKind::Literal, " done"),
        ]
    );
}

#[test]
fn member_chain_continues_after_call() {
    let blocks = parse("@Model.name.trim().toUpperCase()[0]!");
    assert_eq!(blocks[0].text, "Model.name.trim().toUpperCase()[0]");
    assert_eq!(blocks[1].text, "!");

    let blocks = parse("@Html.body() .");
    assert_eq!(blocks[0].text, "Html.body()");
    assert_eq!(blocks[1].text, " .");
}

#[test]
fn explicit_expression_keeps_inner_whitespace() {
    let blocks = parse("<b>@(1 + 2)</b>");
    assert_eq!(blocks[1].kind, BlockKind::Expression);
    assert_eq!(blocks[1].text, "(1 + 2)");
}

#[test]
fn strings_in_expressions_may_contain_brackets() {
    let blocks = parse("@Html.partial(\"a)b\", Model)");
    assert_eq!(blocks[0].text, "Html.partial(\"a)b\", Model)");
}

#[test]
fn whitespace_ends_an_implicit_expression() {
    let blocks = parse("@Model.a @Model.b");
    assert_eq!(
        shape(&blocks),
        vec![
            (BlockKind::Expression, "Model.a"),
            (BlockKind::Literal, " "),
            (BlockKind::Expression, "Model.b"),
        ]
    );
}

#[test]
fn line_indentation_stays_with_markup() {
    let blocks = parse("<ul>\n    @Model.a\n</ul>");
    assert_eq!(blocks[0].text, "<ul>\n    ");
    assert_eq!(blocks[1].text, "Model.a");
    assert_eq!(blocks[2].text, "\n</ul>");
}

#[test]
fn dynamic_tag_names() {
    let blocks = parse("<@Model.tag>x</@Model.tag>");
    let expressions = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Expression)
        .count();
    assert_eq!(expressions, 2);
}

#[test]
fn at_sign_errors() {
    assert_eq!(parse_err("abc @").kind, ErrorKind::EndOfFileFoundAfterAtSign);
    assert_eq!(
        parse_err("a @ b").kind,
        ErrorKind::NotValidStartOfCodeBlock { ch: ' ' }
    );
    assert_eq!(
        parse_err("@!").kind,
        ErrorKind::NotValidStartOfCodeBlock { ch: '!' }
    );
}

#[test]
fn unterminated_expression_names_the_delimiter() {
    let err = parse_err("@(Model.a + 1");
    assert_eq!(
        err.kind,
        ErrorKind::ExpressionMissingEnd {
            expression: "@(Model.a + 1".to_string(),
            expected: ')'
        }
    );
}

#[test]
fn mismatched_bracket_in_expression() {
    assert_eq!(
        parse_err("@Model.f(a]").kind,
        ErrorKind::InvalidExpressionCharacter { ch: ']' }
    );
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[test]
fn code_block_drops_outer_braces_and_line() {
    let blocks = parse("@{ var x = 1; }\n<p>@x</p>");
    assert_eq!(blocks[0].kind, BlockKind::Statement);
    assert_eq!(blocks[0].text.trim(), "var x = 1;");
    assert_eq!(blocks[1].text, "<p>");
    assert_eq!(blocks[2].kind, BlockKind::Expression);
}

#[test]
fn if_else_chains_into_one_statement() {
    let blocks = parse("@if (Model.x) { <b>yes</b> } else { <i>no</i> }");
    assert_eq!(
        shape(&blocks),
        vec![
            (BlockKind::Statement, "if (Model.x) { "),
            (BlockKind::Literal, "<b>yes</b>"),
            (BlockKind::Statement, " } else { "),
            (BlockKind::Literal, "<i>no</i>"),
            (BlockKind::Statement, " }"),
        ]
    );
}

#[test]
fn if_without_else_resumes_markup_on_next_line() {
    let blocks = parse("@if (a) {\n  <b>x</b>\n}\n  <p>after</p>");
    let last = blocks.last().expect("blocks");
    assert_eq!(last.kind, BlockKind::Literal);
    assert_eq!(last.text, "  <p>after</p>");
}

#[test]
fn identifier_starting_with_else_is_not_else() {
    let blocks = parse("@if (a) { <b>x</b> } elsewhere");
    let last = blocks.last().expect("blocks");
    assert_eq!(last.text, "elsewhere");
}

#[test]
fn else_if_is_not_chained() {
    let err = parse_err("@if (a) { <b>1</b> } else if (b) { <b>2</b> }");
    assert_eq!(err.kind, ErrorKind::CharacterExpected { expected: '{' });
}

#[test]
fn loop_body_markup_keeps_its_lines() {
    let source = "@for (var i = 0; i < 2; i++) {\n    <li>@i</li>\n}\n";
    let blocks = parse(source);
    assert_eq!(
        shape(&blocks),
        vec![
            (BlockKind::Statement, "for (var i = 0; i < 2; i++) {\n"),
            (BlockKind::Literal, "    <li>"),
            (BlockKind::Expression, "i"),
            (BlockKind::Literal, "</li>\n"),
            (BlockKind::Statement, "}"),
        ]
    );
}

#[test]
fn markup_after_semicolon_in_code_block() {
    let blocks = parse("@{ var n = Model.n; <p>@n</p> }");
    assert_eq!(blocks[0].text.trim(), "var n = Model.n;");
    assert_eq!(blocks[1].text, "<p>");
    assert_eq!(blocks[2].text, "n");
    assert_eq!(blocks[3].text, "</p>");
}

#[test]
fn nested_markup_inside_statement_markup() {
    let blocks = parse("@{ <ul><li>a</li><li>b</li></ul> }");
    let text: String = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::Literal)
        .map(|b| b.text.as_str())
        .collect();
    assert_eq!(text, "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn division_inside_code_is_not_a_string() {
    let blocks = parse("@{ var half = Model.n / 2; }");
    assert_eq!(blocks[0].text.trim(), "var half = Model.n / 2;");
}

#[test]
fn unterminated_code_block_reports_its_first_line() {
    let err = parse_err("<p></p>\n@{ var x = 1;\n");
    assert_eq!(
        err.kind,
        ErrorKind::CodeBlockMissingClosingChar {
            line: "@{ var x = 1;".to_string()
        }
    );
    assert_eq!(err.line(), Some(2));
    assert_eq!(err.column(), Some(2));
}

#[test]
fn at_sign_at_statement_start_is_an_error() {
    assert_eq!(parse_err("@{ @x }").kind, ErrorKind::UnexpectedAtCharacter);
}

#[test]
fn markup_in_statement_tag_errors() {
    assert_eq!(parse_err("@{ < a> }").kind, ErrorKind::TagNameExpected);
    assert_eq!(
        parse_err("@{ <a<b> }").kind,
        ErrorKind::UnexpectedCharacter { ch: '<' }
    );
    assert!(matches!(
        parse_err("@{ <p>text</b> }").kind,
        ErrorKind::MissingMatchingStartTag { .. }
    ));
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[test]
fn section_holds_its_children() {
    let blocks = parse("<p>x</p>\n@section Foo { <span>hi</span> }\n<p>y</p>");
    assert_eq!(blocks.len(), 3);
    let section = &blocks[1];
    assert_eq!(section.kind, BlockKind::Section);
    assert_eq!(section.name.as_deref(), Some("Foo"));
    assert_eq!(
        shape(&section.children),
        vec![(BlockKind::Literal, "<span>hi</span>")]
    );
    assert_eq!(blocks[2].text, "<p>y</p>");
}

#[test]
fn section_names_are_unique_across_templates() {
    let mut sections = ParsedSectionRegistry::new();
    razor::parse("@section Scripts { <b>1</b> }", "page.raz", &mut sections).expect("first");
    let err = razor::parse("@section Scripts { <b>2</b> }", "partial.raz", &mut sections)
        .expect_err("duplicate");
    assert_eq!(
        err.kind,
        ErrorKind::SectionIsAlreadyDefined {
            name: "Scripts".to_string()
        }
    );
    assert_eq!(err.file_path, "partial.raz");
    assert_eq!(sections.declared_in("Scripts"), Some("page.raz"));
}

#[test]
fn section_syntax_errors() {
    assert_eq!(
        parse_err("@section{ }").kind,
        ErrorKind::WhiteSpaceExpectedAfter {
            keyword: "@section".to_string()
        }
    );
    assert_eq!(
        parse_err("@section  { }").kind,
        ErrorKind::SectionNameExpectedAfterKeyword {
            keyword: "@section".to_string()
        }
    );
    assert_eq!(
        parse_err("@section 1a { }").kind,
        ErrorKind::SectionNameCannotStartWith { ch: '1' }
    );
    assert_eq!(
        parse_err("@section a-b { }").kind,
        ErrorKind::SectionNameCannotInclude { ch: '-' }
    );
    assert_eq!(
        parse_err("@section A x").kind,
        ErrorKind::UnexpectedLiteralFollowingSection { ch: 'x' }
    );
}

#[test]
fn invalid_section_character_is_located() {
    let err = parse_err("@section ab-c { }");
    assert_eq!(err.column(), Some(12));
}

#[test]
fn sections_cannot_nest() {
    let err = parse_err("@section A { <div>@section B { <i>b</i> }</div> }");
    assert_eq!(err.kind, ErrorKind::SectionsCannotBeNested);
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

#[test]
fn program_wraps_sections_in_markers() {
    let mut sections = ParsedSectionRegistry::new();
    let program = razor::compile(
        "<h1>@Model.title</h1>\n@section Side { <p>s</p> }\n",
        "test.raz",
        &mut sections,
    )
    .expect("compile failed");

    assert_eq!(
        program.instructions,
        vec![
            Instruction::EmitLiteral(0),
            Instruction::EmitEvaluatedExpression(1),
            Instruction::EmitLiteral(2),
            Instruction::SectionMarker("Side".to_string()),
            Instruction::EmitLiteral(3),
            Instruction::SectionMarker("Side".to_string()),
        ]
    );
    assert_eq!(program.values.get(1), Some("Model.title"));
    assert_eq!(program.values.get(2), Some("</h1>\n"));
    assert_eq!(program.values.get(3), Some("<p>s</p>"));
}

#[test]
fn statements_are_emitted_verbatim() {
    let blocks = parse("@{ var a = 1; }");
    let program = Program::generate(&blocks);
    assert!(program.values.is_empty());
    assert!(matches!(
        &program.instructions[..],
        [Instruction::ExecuteStatement(text)] if text.trim() == "var a = 1;"
    ));
}

#[test]
fn diagnostics_carry_the_error_position() {
    let err = parse_err("<div>");
    let diagnostic = err.to_diagnostic(0);
    assert_eq!(diagnostic.labels.len(), 1);
    assert_eq!(diagnostic.labels[0].range, 0..0);
    assert!(diagnostic.message.contains("<div>"));
}
