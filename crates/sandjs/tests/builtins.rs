use pretty_assertions::assert_eq;
use sandjs::{Context, HostValue};

#[test]
fn math_constants_and_functions() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("Math.floor(3.7)").unwrap(), HostValue::Number(3.0));
    assert_eq!(ctx.eval("Math.ceil(3.2)").unwrap(), HostValue::Number(4.0));
    assert_eq!(ctx.eval("Math.round(2.5)").unwrap(), HostValue::Number(3.0));
    assert_eq!(ctx.eval("Math.max(1, 5, 3)").unwrap(), HostValue::Number(5.0));
    assert_eq!(ctx.eval("Math.min(1, 5, 3)").unwrap(), HostValue::Number(1.0));
    assert_eq!(ctx.eval("Math.abs(-4)").unwrap(), HostValue::Number(4.0));
    assert_eq!(ctx.eval("Math.pow(2, 8)").unwrap(), HostValue::Number(256.0));
}

#[test]
fn json_round_trip_preserves_structure() {
    let mut ctx = Context::new();
    let result = ctx
        .eval("JSON.stringify(JSON.parse('{\"a\":1,\"b\":[1,2,3]}'))")
        .unwrap();
    assert_eq!(result, HostValue::String("{\"a\":1,\"b\":[1,2,3]}".to_owned()));
}

#[test]
fn json_stringify_omits_undefined_and_functions() {
    let mut ctx = Context::new();
    let result = ctx.eval("JSON.stringify({ a: 1, b: undefined, c: function(){} })").unwrap();
    assert_eq!(result, HostValue::String("{\"a\":1}".to_owned()));
}

#[test]
fn global_numeric_parsing_functions() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("parseInt('42')").unwrap(), HostValue::Number(42.0));
    assert_eq!(ctx.eval("parseInt('0xFF', 16)").unwrap(), HostValue::Number(255.0));
    assert_eq!(ctx.eval("parseFloat('3.14abc')").unwrap(), HostValue::Number(3.14));
    assert_eq!(ctx.eval("isNaN(parseInt('not a number'))").unwrap(), HostValue::Boolean(true));
    assert_eq!(ctx.eval("isFinite(1/0)").unwrap(), HostValue::Boolean(false));
}

#[test]
fn indirect_eval_runs_against_shared_globals() {
    let mut ctx = Context::new();
    ctx.eval("var x = 100;").unwrap();
    let result = ctx.eval("var indirect = eval; indirect('x + 1');").unwrap();
    assert_eq!(result, HostValue::Number(101.0));
}

#[test]
fn number_instance_methods() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("(3.14159).toFixed(2)").unwrap(), HostValue::String("3.14".to_owned()));
    assert_eq!(ctx.eval("(255).toString(16)").unwrap(), HostValue::String("ff".to_owned()));
}

#[test]
fn string_instance_methods() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("'Hello World'.toUpperCase()").unwrap(), HostValue::String("HELLO WORLD".to_owned()));
    assert_eq!(ctx.eval("'  spaced  '.trim()").unwrap(), HostValue::String("spaced".to_owned()));
    assert_eq!(ctx.eval("'abcabc'.indexOf('c')").unwrap(), HostValue::Number(2.0));
    assert_eq!(ctx.eval("'abc'.split(',').length").unwrap(), HostValue::Number(1.0));
    assert_eq!(ctx.eval("'a,b,c'.split(',').join('-')").unwrap(), HostValue::String("a-b-c".to_owned()));
}
