use pretty_assertions::assert_eq;
use sandjs::{Context, HostValue};

#[test]
fn arithmetic_and_numeric_coercion() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("1 + 2").unwrap(), HostValue::Number(3.0));
    assert_eq!(ctx.eval("'5' * '2'").unwrap(), HostValue::Number(10.0));
    assert_eq!(ctx.eval("10 % 3").unwrap(), HostValue::Number(1.0));
    assert_eq!(ctx.eval("2 ** 10").unwrap(), HostValue::Number(1024.0));
}

#[test]
fn string_concatenation() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("'foo' + 'bar'").unwrap(), HostValue::String("foobar".to_owned()));
    assert_eq!(ctx.eval("'n=' + 1").unwrap(), HostValue::String("n=1".to_owned()));
}

#[test]
fn var_declarations_persist_across_eval_calls() {
    let mut ctx = Context::new();
    ctx.eval("var x = 10;").unwrap();
    assert_eq!(ctx.eval("x + 5").unwrap(), HostValue::Number(15.0));
}

#[test]
fn function_declarations_and_recursion() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "function fact(n) { if (n <= 1) return 1; return n * fact(n - 1); }
             fact(6);",
        )
        .unwrap();
    assert_eq!(result, HostValue::Number(720.0));
}

#[test]
fn closures_capture_by_reference() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "function makeCounter() {
                 var count = 0;
                 return function() { count = count + 1; return count; };
             }
             var counter = makeCounter();
             counter(); counter(); counter();",
        )
        .unwrap();
    assert_eq!(result, HostValue::Number(3.0));
}

#[test]
fn arrow_functions_and_higher_order_calls() {
    let mut ctx = Context::new();
    let result = ctx.eval("var add = (a, b) => a + b; add(3, 4);").unwrap();
    assert_eq!(result, HostValue::Number(7.0));
}

#[test]
fn ternary_and_logical_operators_short_circuit() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("true ? 1 : 2").unwrap(), HostValue::Number(1.0));
    assert_eq!(ctx.eval("0 || 'fallback'").unwrap(), HostValue::String("fallback".to_owned()));
    assert_eq!(ctx.eval("1 && 2").unwrap(), HostValue::Number(2.0));
}

#[test]
fn loops_accumulate_state() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "var sum = 0;
             for (var i = 1; i <= 10; i = i + 1) { sum = sum + i; }
             sum;",
        )
        .unwrap();
    assert_eq!(result, HostValue::Number(55.0));
}

#[test]
fn while_loop_with_break_and_continue() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "var i = 0; var total = 0;
             while (true) {
                 i = i + 1;
                 if (i > 20) break;
                 if (i % 2 === 0) continue;
                 total = total + i;
             }
             total;",
        )
        .unwrap();
    assert_eq!(result, HostValue::Number(100.0));
}

#[test]
fn try_catch_finally_runs_in_order() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "var log = [];
             try {
                 log.push('try');
                 throw 'boom';
             } catch (e) {
                 log.push('catch:' + e);
             } finally {
                 log.push('finally');
             }
             log.join(',');",
        )
        .unwrap();
    assert_eq!(result, HostValue::String("try,catch:boom,finally".to_owned()));
}

#[test]
fn typeof_reports_expected_tags() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("typeof undefined").unwrap(), HostValue::String("undefined".to_owned()));
    assert_eq!(ctx.eval("typeof null").unwrap(), HostValue::String("object".to_owned()));
    assert_eq!(ctx.eval("typeof 1").unwrap(), HostValue::String("number".to_owned()));
    assert_eq!(ctx.eval("typeof 'x'").unwrap(), HostValue::String("string".to_owned()));
    assert_eq!(ctx.eval("typeof function(){}").unwrap(), HostValue::String("function".to_owned()));
}
