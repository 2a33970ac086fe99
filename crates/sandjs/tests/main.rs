use sandjs::{Context, HostValue};

/// Smoke test: a fresh context can evaluate a trivial expression.
#[test]
fn eval_simple_expression() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("1 + 2").unwrap(), HostValue::Number(3.0));
}

/// Smoke test: the same context can be reused across multiple `eval` calls
/// without losing previously declared globals.
#[test]
fn reuse_context_across_calls() {
    let mut ctx = Context::new();
    ctx.eval("var greeting = 'hello';").unwrap();
    let result = ctx.eval("greeting + ' world'").unwrap();
    assert_eq!(result, HostValue::String("hello world".to_owned()));
}
