use sandjs::Context;

#[test]
fn unterminated_string_literal_is_a_syntax_error() {
    let mut ctx = Context::new();
    let err = ctx.eval("'unterminated").expect_err("unterminated string literal should fail to parse");
    assert!(err.to_string().contains("rror"), "message should describe a syntax error, got: {err}");
}

#[test]
fn unbalanced_brace_is_a_syntax_error() {
    let mut ctx = Context::new();
    assert!(ctx.eval("function f() { return 1;").is_err());
}

#[test]
fn reference_error_on_undeclared_identifier() {
    let mut ctx = Context::new();
    assert!(ctx.eval("thisIdentifierWasNeverDeclared + 1").is_err());
}

#[test]
fn type_error_on_calling_a_non_function() {
    let mut ctx = Context::new();
    assert!(ctx.eval("var x = 1; x();").is_err());
}

#[test]
fn thrown_values_propagate_as_errors_when_uncaught() {
    let mut ctx = Context::new();
    let err = ctx.eval("throw 'custom failure';").expect_err("an uncaught throw should surface as an error");
    assert!(err.to_string().contains("custom failure"));
}

#[test]
fn division_by_zero_produces_infinity_not_an_error() {
    use sandjs::HostValue;
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("1 / 0").unwrap(), HostValue::Number(f64::INFINITY));
}
