//! End-to-end properties of the edit engine over real source text.

use rejig_edit::{get, parse, remove, set, EditError, Source};

fn source(text: &str) -> Source {
    parse(text).expect("parse")
}

// ---- set -------------------------------------------------------------------

#[test]
fn set_appends_plain_binding_inline() {
    let mut src = source("{ foo = 1; }");
    let out = set(&mut src, "bar", "2").unwrap();
    insta::assert_snapshot!(out, @"{ foo = 1; bar = 2; }");
}

#[test]
fn set_appends_plain_binding_multiline() {
    let mut src = source("{\n  foo = 1;\n}\n");
    let out = set(&mut src, "bar", "2").unwrap();
    assert_eq!(out, "{\n  foo = 1;\n  bar = 2;\n}\n");
}

#[test]
fn set_creates_explicit_nested_sets() {
    let mut src = source("{ }");
    let out = set(&mut src, "foo.\"bar.baz\"", "1").unwrap();
    insta::assert_snapshot!(out, @r#"{ foo = { "bar.baz" = 1; }; }"#);
}

#[test]
fn set_preserves_attrpath_style() {
    let mut src = source("{ foo.bar = 1; }");
    let out = set(&mut src, "foo.baz", "2").unwrap();
    assert_eq!(out, "{ foo.bar = 1; foo.baz = 2; }");
}

#[test]
fn set_updates_existing_attrpath_leaf() {
    let mut src = source("{ foo.bar = 1; }");
    let out = set(&mut src, "foo.bar", "2").unwrap();
    assert_eq!(out, "{ foo.bar = 2; }");
}

#[test]
fn set_groups_new_leaves_with_their_family() {
    let mut src = source("{ a.x = 1; b = 2; }");
    let out = set(&mut src, "a.y", "3").unwrap();
    assert_eq!(out, "{ a.x = 1; a.y = 3; b = 2; }");
}

#[test]
fn set_keeps_odd_sibling_formatting_untouched() {
    let mut src = source("{ foo=   1; }");
    let out = set(&mut src, "bar", "2").unwrap();
    assert_eq!(out, "{ foo=   1; bar = 2; }");
}

#[test]
fn set_keeps_comments_and_blank_lines() {
    let text = "{\n  # keep this comment\n  foo = 1;\n\n  bar = 2;\n}\n";
    let mut src = source(text);
    let out = set(&mut src, "foo", "9").unwrap();
    assert_eq!(out, "{\n  # keep this comment\n  foo = 9;\n\n  bar = 2;\n}\n");
}

#[test]
fn set_reaches_through_lambda_and_call() {
    let mut src = source("{ pkgs ? null }: { foo = 1; }");
    let out = set(&mut src, "bar", "2").unwrap();
    assert_eq!(out, "{ pkgs ? null }: { foo = 1; bar = 2; }");
}

#[test]
fn set_writes_through_identifier_aliases() {
    let mut src = source("let package_version = \"1.0\"; in { version = package_version; }");
    let out = set(&mut src, "version", "\"2.0\"").unwrap();
    assert_eq!(
        out,
        "let package_version = \"2.0\"; in { version = package_version; }"
    );
}

#[test]
fn set_falls_back_to_overwriting_unresolvable_identifiers() {
    let mut src = source("{ version = unknown_version; }");
    let out = set(&mut src, "version", "\"2.0\"").unwrap();
    assert_eq!(out, "{ version = \"2.0\"; }");
}

#[test]
fn set_refuses_non_set_intermediates() {
    let mut src = source("{ a = 1; }");
    assert!(matches!(
        set(&mut src, "a.b", "2"),
        Err(EditError::NotAnAttributeSet(name)) if name == "a"
    ));
}

#[test]
fn set_refuses_trees_with_parse_errors() {
    let mut src = source("{ foo = 1");
    assert!(matches!(
        set(&mut src, "bar", "2"),
        Err(EditError::Syntax(_))
    ));
}

#[test]
fn set_rejects_values_with_syntax_errors() {
    let mut src = source("{ foo = 1; }");
    assert!(matches!(
        set(&mut src, "bar", "{ unclosed"),
        Err(EditError::Syntax(_))
    ));
}

#[test]
fn set_rejects_ambiguous_targets() {
    let mut src = source("1 + 2");
    assert!(matches!(
        set(&mut src, "foo", "1"),
        Err(EditError::AmbiguousEditTarget)
    ));
}

// ---- remove ----------------------------------------------------------------

#[test]
fn remove_prunes_synthetic_ancestors() {
    let mut src = source("{ foo.bar = 1; }");
    let out = remove(&mut src, "foo.bar").unwrap();
    assert_eq!(out, "{ }");
}

#[test]
fn remove_stops_pruning_at_non_empty_sets() {
    let mut src = source("{ foo.bar = 1; foo.baz = 2; }");
    let out = remove(&mut src, "foo.bar").unwrap();
    assert_eq!(out, "{ foo.baz = 2; }");
}

#[test]
fn remove_plain_binding() {
    let mut src = source("{\n  foo = 1;\n  bar = 2;\n}\n");
    let out = remove(&mut src, "foo").unwrap();
    assert_eq!(out, "{\n  bar = 2;\n}\n");
}

#[test]
fn remove_missing_key_fails() {
    let mut src = source("{ foo = 1; }");
    assert!(matches!(
        remove(&mut src, "bar"),
        Err(EditError::MissingKey(path)) if path == "bar"
    ));
}

// ---- scope layers ----------------------------------------------------------

#[test]
fn set_into_let_scope_layer() {
    let mut src = source("let x = 1; in x");
    let out = set(&mut src, "@y", "2").unwrap();
    assert_eq!(out, "let x = 1; y = 2; in x");
}

#[test]
fn emptying_a_let_layer_unwraps_it() {
    let mut src = source("let x = 1; in x");
    let out = remove(&mut src, "@x").unwrap();
    assert_eq!(out, "x");
}

#[test]
fn set_into_with_environment_layer() {
    let mut src = source("with { v = 1; }; v");
    let out = set(&mut src, "@w", "2").unwrap();
    assert_eq!(out, "with { v = 1; w = 2; }; v");
}

#[test]
fn layer_depth_beyond_available_layers_fails() {
    let mut src = source("{ }");
    assert!(matches!(
        set(&mut src, "@x", "1"),
        Err(EditError::InvalidNPath(_))
    ));
}

// ---- get -------------------------------------------------------------------

#[test]
fn set_then_get_reads_back_the_value() {
    let mut src = source("{ }");
    set(&mut src, "foo.bar", "{ x = 1; }").unwrap();
    assert_eq!(get(&src, "foo.bar").unwrap(), "{ x = 1; }");
}

#[test]
fn attrpath_and_nested_sets_read_identically() {
    let dotted = source("{ a.b = 1; }");
    let explicit = source("{ a = { b = 1; }; }");
    assert_eq!(get(&dotted, "a.b").unwrap(), "1");
    assert_eq!(get(&explicit, "a.b").unwrap(), "1");
}

#[test]
fn get_renders_synthetic_intermediates_as_sets() {
    let src = source("{ a.b = 1; }");
    assert_eq!(get(&src, "a").unwrap(), "{ b = 1; }");
}

#[test]
fn get_quoted_segments() {
    let src = source("{ foo.\"bar.baz\" = 1; }");
    assert_eq!(get(&src, "foo.\"bar.baz\"").unwrap(), "1");
}

// ---- stability -------------------------------------------------------------

#[test]
fn edited_output_reparses_and_rebuilds_identically() {
    let mut src = source("{\n  foo = 1;\n  deep.nested.value = true;\n}\n");
    let out = set(&mut src, "bar.baz", "[ 1 2 ]").unwrap();
    let reparsed = source(&out);
    assert_eq!(reparsed.rebuild(), out);

    // Setting the same value again is a fixpoint.
    let mut again = source(&out);
    let out2 = set(&mut again, "bar.baz", "[ 1 2 ]").unwrap();
    assert_eq!(out2, out);
}

#[test]
fn round_trip_check_matches_cli_contract() {
    assert!(Source::round_trip_check("{ foo = 1; }\n"));
    assert!(Source::round_trip_check("# comment\nlet x = 1; in x\n"));
    assert!(!Source::round_trip_check(""));
}
