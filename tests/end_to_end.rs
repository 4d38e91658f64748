use liquid_pt::compile::compile_program;
use liquid_pt::context::Context;
use liquid_pt::dialect::standard_context;
use liquid_pt::optimize::Optimizer;
use liquid_pt::parser::{parse_appropriate, Parser};
use liquid_pt::render::Renderer;
use liquid_pt::value::{MapResolver, Value};
use liquid_pt::vm::run_program;
use std::rc::Rc;
use std::time::Duration;

fn context() -> Rc<Context> {
    Rc::new(standard_context().expect("standard dialect registers cleanly"))
}

fn store() -> MapResolver {
    MapResolver::new()
}

/// Parses through `parse_template` directly, the entry point a host uses
/// once it already knows `source` is a full document (mixed literal text
/// and blocks) rather than a bare expression. `parse_appropriate`'s own
/// braces-sniffing routing is exercised separately below.
fn render(source: &str, context: &Rc<Context>, resolver: &mut MapResolver) -> String {
    let (node, errors) = Parser::new(source, context).parse_template();
    assert!(errors.is_empty(), "unexpected parse errors: {:?}", errors);
    let (output, _warnings) = Renderer::new(context.clone())
        .render(&node, resolver)
        .expect("renders");
    output
}

#[test]
fn plain_text_passes_through() {
    let context = context();
    let mut resolver = store();
    assert_eq!(render("hello world", &context, &mut resolver), "hello world");
}

#[test]
fn parse_appropriate_routes_braced_text_through_parse_template() {
    let context = context();
    let mut resolver = store();
    resolver.insert("name", Value::str("Ada"));
    let node = parse_appropriate("Hi, {{ name }}!", &context).expect("parses");
    let (output, _) = Renderer::new(context).render(&node, &mut resolver).unwrap();
    assert_eq!(output, "Hi, Ada!");
}

#[test]
fn parse_appropriate_routes_brace_free_text_through_parse_argument() {
    let context = context();
    let mut resolver = store();
    resolver.insert("name", Value::str("Ada"));
    // No `{{`/`{%` anywhere, so this is treated as a bare expression
    // (spec.md §4.2), not as literal template text.
    let node = parse_appropriate("name", &context).expect("parses");
    let (output, _) = Renderer::new(context).render(&node, &mut resolver).unwrap();
    assert_eq!(output, "Ada");
}

#[test]
fn output_resolves_variable() {
    let context = context();
    let mut resolver = store();
    resolver.insert("name", Value::str("Ada"));
    assert_eq!(render("Hi, {{ name }}!", &context, &mut resolver), "Hi, Ada!");
}

#[test]
fn unknown_variable_renders_empty_when_not_strict() {
    let context = context();
    let mut resolver = store();
    assert_eq!(render("[{{ missing }}]", &context, &mut resolver), "[]");
}

#[test]
fn dotted_and_bracketed_dereference() {
    let context = context();
    let mut resolver = store();
    let mut user = std::collections::BTreeMap::new();
    user.insert("name".to_string(), Value::str("Grace"));
    resolver.insert("user", Value::map(user));
    resolver.insert("key", Value::str("name"));
    assert_eq!(render("{{ user.name }}", &context, &mut resolver), "Grace");
    assert_eq!(render("{{ user[key] }}", &context, &mut resolver), "Grace");
}

#[test]
fn if_elsif_else() {
    let context = context();
    let mut resolver = store();
    resolver.insert("n", Value::Int(2));
    let tpl = "{% if n == 1 %}one{% elsif n == 2 %}two{% else %}many{% endif %}";
    assert_eq!(render(tpl, &context, &mut resolver), "two");
}

#[test]
fn for_loop_over_array_with_qualifiers() {
    let context = context();
    let mut resolver = store();
    resolver.insert(
        "items",
        Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
    );
    let tpl = "{% for x in items limit: 2 %}{{ x }}{% endfor %}";
    assert_eq!(render(tpl, &context, &mut resolver), "12");

    let reversed = "{% for x in items reversed %}{{ x }}{% endfor %}";
    assert_eq!(render(reversed, &context, &mut resolver), "4321");
}

#[test]
fn for_loop_else_on_empty_collection() {
    let context = context();
    let mut resolver = store();
    resolver.insert("items", Value::array(Vec::new()));
    let tpl = "{% for x in items %}{{ x }}{% else %}empty{% endfor %}";
    assert_eq!(render(tpl, &context, &mut resolver), "empty");
}

#[test]
fn break_and_continue() {
    let context = context();
    let mut resolver = store();
    resolver.insert(
        "items",
        Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
    );
    let tpl = "{% for x in items %}{% if x == 2 %}{% continue %}{% endif %}\
               {% if x == 4 %}{% break %}{% endif %}{{ x }}{% endfor %}";
    assert_eq!(render(tpl, &context, &mut resolver), "13");
}

#[test]
fn assign_and_capture() {
    let context = context();
    let mut resolver = store();
    let tpl = "{% assign total = 1 %}{% capture label %}Total{% endcapture %}{{ label }}: {{ total }}";
    assert_eq!(render(tpl, &context, &mut resolver), "Total: 1");
}

#[test]
fn increment_and_decrement_share_a_counter_namespace() {
    let context = context();
    let mut resolver = store();
    let tpl = "{% increment count %}{% increment count %}{% decrement count %}";
    assert_eq!(render(tpl, &context, &mut resolver), "011");
}

#[test]
fn cycle_rotates_through_values() {
    let context = context();
    let mut resolver = store();
    let tpl = "{% for x in (1..3) %}{% cycle 'a', 'b' %}{% endfor %}";
    assert_eq!(render(tpl, &context, &mut resolver), "aba");
}

#[test]
fn raw_disables_interpretation() {
    let context = context();
    let mut resolver = store();
    let tpl = "{% raw %}{{ not a variable }}{% endraw %}";
    assert_eq!(render(tpl, &context, &mut resolver), "{{ not a variable }}");
}

#[test]
fn case_when_matches_first_truthy_branch() {
    let context = context();
    let mut resolver = store();
    resolver.insert("grade", Value::str("b"));
    let tpl = "{% case grade %}{% when 'a' %}great{% when 'b' %}good{% else %}meh{% endcase %}";
    assert_eq!(render(tpl, &context, &mut resolver), "good");
}

#[test]
fn arithmetic_and_comparison_operators() {
    let context = context();
    let mut resolver = store();
    resolver.insert("a", Value::Int(3));
    assert_eq!(render("{{ a + 3 * 6 }}", &context, &mut resolver), "21");
    assert_eq!(render("{{ (a + 3) * 6 }}", &context, &mut resolver), "36");
    assert_eq!(render("{{ a < 10 }}", &context, &mut resolver), "true");
    assert_eq!(render("{{ a >= 10 }}", &context, &mut resolver), "false");
}

#[test]
fn and_or_short_circuit_and_coerce_to_bool() {
    let context = context();
    let mut resolver = store();
    assert_eq!(render("{{ true and false }}", &context, &mut resolver), "false");
    assert_eq!(render("{{ false or 'x' }}", &context, &mut resolver), "true");
}

#[test]
fn range_literal_builds_inclusive_array() {
    let context = context();
    let mut resolver = store();
    let tpl = "{% for x in (1..3) %}{{ x }}{% endfor %}";
    assert_eq!(render(tpl, &context, &mut resolver), "123");
}

#[test]
fn string_and_array_filters() {
    let context = context();
    let mut resolver = store();
    assert_eq!(render("{{ 'hello' | upcase }}", &context, &mut resolver), "HELLO");
    assert_eq!(
        render("{{ 'hello world' | truncate: 8 }}", &context, &mut resolver),
        "hello..."
    );
    resolver.insert(
        "items",
        Value::array(vec![Value::Int(3), Value::Int(1), Value::Int(2)]),
    );
    assert_eq!(render("{{ items | sort | join: ',' }}", &context, &mut resolver), "1,2,3");
    assert_eq!(render("{{ items | size }}", &context, &mut resolver), "3");
    assert_eq!(render("{{ items.size }}", &context, &mut resolver), "3");
}

#[test]
fn numeric_filter_type_mismatch_is_forgiving() {
    let context = context();
    let mut resolver = store();
    assert_eq!(render("[{{ 'abc' | plus: 1 }}]", &context, &mut resolver), "[]");
}

#[test]
fn default_filter_falls_back_on_falsy_subject() {
    let context = context();
    let mut resolver = store();
    assert_eq!(render("{{ nope | default: 'fallback' }}", &context, &mut resolver), "fallback");
}

#[test]
fn unknown_filter_warns_but_does_not_abort() {
    let context = context();
    let mut resolver = store();
    let node = parse_appropriate("{{ 'x' | not_a_real_filter }}", &context).expect("parses");
    let (output, warnings) = Renderer::new(context).render(&node, &mut resolver).expect("renders");
    assert_eq!(output, "");
    assert!(!warnings.is_empty());
}

#[test]
fn strict_variables_errors_on_missing_name() {
    let mut context = standard_context().expect("registers cleanly");
    context.render_options.strict_variables = true;
    let context = Rc::new(context);
    let node = parse_appropriate("{{ missing }}", &context).expect("parses");
    let mut resolver = store();
    let err = Renderer::new(context).render(&node, &mut resolver).unwrap_err();
    assert_eq!(err.kind, liquid_pt::error::RenderErrorKind::UnknownVariable);
}

#[test]
fn exceeded_depth_on_deeply_nested_blocks() {
    let mut context = standard_context().expect("registers cleanly");
    context.render_options.max_rendering_depth = 3;
    let context = Rc::new(context);
    let mut resolver = store();
    // Each nested `if` body is its own concatenation, one rendering-depth
    // level deeper than its parent; four levels exceeds a max of 3.
    let tpl = "{% if true %}{% if true %}{% if true %}{% if true %}deep{% endif %}{% endif %}{% endif %}{% endif %}";
    let node = parse_appropriate(tpl, &context).expect("parses");
    let err = Renderer::new(context).render(&node, &mut resolver).unwrap_err();
    assert_eq!(err.kind, liquid_pt::error::RenderErrorKind::ExceededDepth);
}

#[test]
fn exceeded_memory_on_large_output() {
    let mut context = standard_context().expect("registers cleanly");
    context.render_options.max_memory_usage = 10;
    let context = Rc::new(context);
    let mut resolver = store();
    resolver.insert(
        "items",
        Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
    );
    let tpl = "{% for x in items %}0123456789{% endfor %}";
    let node = parse_appropriate(tpl, &context).expect("parses");
    let err = Renderer::new(context).render(&node, &mut resolver).unwrap_err();
    assert_eq!(err.kind, liquid_pt::error::RenderErrorKind::ExceededMemory);
}

#[test]
fn optimizer_folds_constant_subtrees_without_changing_meaning() {
    let context = context();
    let mut resolver = store();
    let node = parse_appropriate("{{ 1 + 2 }}", &context).expect("parses");
    let optimized = Optimizer::new(context.clone()).optimize(node.clone(), &mut resolver);
    assert!(optimized.is_leaf());

    let (before, _) = Renderer::new(context.clone()).render(&node, &mut resolver).unwrap();
    let (after, _) = Renderer::new(context).render(&optimized, &mut resolver).unwrap();
    assert_eq!(before, after);
}

#[test]
fn optimizer_does_not_fold_across_variable_reads() {
    let context = context();
    let mut resolver = store();
    resolver.insert("n", Value::Int(10));
    let node = parse_appropriate("{{ n + 1 }}", &context).expect("parses");
    let optimized = Optimizer::new(context.clone()).optimize(node, &mut resolver);
    // A variable read folds as long as the store resolves it at optimize
    // time (spec.md §4.4); the result must still match a direct render.
    let (folded_output, _) = Renderer::new(context.clone())
        .render(&optimized, &mut resolver)
        .unwrap();
    assert_eq!(folded_output, "11");
}

#[test]
fn compiled_bytecode_matches_tree_walking_output() {
    let context = context();
    let mut resolver = store();
    resolver.insert("name", Value::str("Ada"));
    resolver.insert(
        "items",
        Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
    );
    let tpl = "Hi {{ name }}, total {{ items | size }}, {{ 2 + 3 * 4 }}, {{ 1 == 1 }}";
    let node = parse_appropriate(tpl, &context).expect("parses");

    let (walked, _) = Renderer::new(context.clone()).render(&node, &mut resolver).unwrap();

    let program = compile_program(&node).expect("compiles");
    let compiled = run_program(
        &program,
        &mut resolver,
        Duration::from_secs(5),
        context.render_options.falsiness,
    )
    .expect("runs");

    assert_eq!(walked, compiled);
}

#[test]
fn break_continue_tags_refuse_to_compile() {
    let context = context();
    let tpl = "{% for x in (1..3) %}{% break %}{% endfor %}";
    let node = parse_appropriate(tpl, &context).expect("parses");
    assert!(compile_program(&node).is_err());
}

#[test]
fn unparse_round_trips_plain_template_text() {
    let context = context();
    let source = "Hello, {{ name }}! {% if true %}yes{% endif %}";
    let node = parse_appropriate(source, &context).expect("parses");
    assert_eq!(node.unparse(), source);
}

#[test]
fn string_literal_unparse_round_trips_with_escaping() {
    let context = context();
    // Liquid source `"ab\"cd"`: an escaped quote inside a double-quoted
    // string literal.
    let source = r#""ab\"cd""#;
    let node = Parser::new(source, &context).parse_argument().expect("parses");

    let unparsed = node.unparse();
    let reparsed = Parser::new(&unparsed, &context)
        .parse_argument()
        .expect("unparsed form reparses as a string literal");
    assert_eq!(node.leaf_value(), reparsed.leaf_value());

    let mut resolver = store();
    let (rendered, _) = Renderer::new(context).render(&node, &mut resolver).unwrap();
    assert_eq!(rendered, "ab\"cd");
}

#[test]
fn trim_markers_remove_adjacent_whitespace() {
    let context = context();
    let mut resolver = store();
    let tpl = "a \n {{- 'b' -}} \n c";
    assert_eq!(render(tpl, &context, &mut resolver), "abc");
}

#[test]
fn parse_argument_entry_point_parses_a_bare_expression() {
    let context = context();
    let parser = Parser::new("1 + 2", &context);
    let node = parser.parse_argument().expect("parses a bare expression");
    let mut resolver = store();
    let (output, _) = Renderer::new(Rc::new(standard_context().unwrap()))
        .render(&node, &mut resolver)
        .unwrap();
    let _ = output;
}
