use pretty_assertions::assert_eq;
use sandjs::{Context, HostValue};

#[test]
fn regex_test_matches_and_rejects() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("/\\d+/.test('abc123')").unwrap(), HostValue::Boolean(true));
    assert_eq!(ctx.eval("/\\d+/.test('abcdef')").unwrap(), HostValue::Boolean(false));
}

#[test]
fn regex_exec_captures_groups() {
    let mut ctx = Context::new();
    let result = ctx.eval("/(\\w+)@(\\w+)/.exec('user@host')[1]").unwrap();
    assert_eq!(result, HostValue::String("host".to_owned()));
}

#[test]
fn string_match_returns_null_without_a_match() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("'hello'.match(/\\d+/)").unwrap(), HostValue::Null);
    assert_eq!(ctx.eval("'hello123'.match(/\\d+/)[0]").unwrap(), HostValue::String("123".to_owned()));
}

#[test]
fn string_replace_plain_and_regex_and_global_flag() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("'foo bar'.replace('bar', 'baz')").unwrap(), HostValue::String("foo baz".to_owned()));
    assert_eq!(ctx.eval("'a1b2c3'.replace(/\\d/g, '#')").unwrap(), HostValue::String("a#b#c#".to_owned()));
    assert_eq!(ctx.eval("'a1b2c3'.replace(/\\d/, '#')").unwrap(), HostValue::String("a#b2c3".to_owned()));
}

#[test]
fn regex_alternation_and_anchors() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("/^(cat|dog)$/.test('dog')").unwrap(), HostValue::Boolean(true));
    assert_eq!(ctx.eval("/^(cat|dog)$/.test('dogs')").unwrap(), HostValue::Boolean(false));
}
