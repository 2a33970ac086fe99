use pretty_assertions::assert_eq;
use sandjs::{Context, HostValue};

#[test]
fn array_literal_length_and_indexing() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("[10, 20, 30].length").unwrap(), HostValue::Number(3.0));
    assert_eq!(ctx.eval("[10, 20, 30][1]").unwrap(), HostValue::Number(20.0));
}

#[test]
fn array_push_pop_and_map_filter_reduce() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "var a = [1, 2, 3, 4, 5];
             var doubled = a.map(function(x) { return x * 2; });
             var evens = doubled.filter(function(x) { return x % 4 === 0; });
             evens.reduce(function(acc, x) { return acc + x; }, 0);",
        )
        .unwrap();
    assert_eq!(result, HostValue::Number(12.0));
}

#[test]
fn array_sort_with_and_without_comparator() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("[3, 1, 2].sort().join(',')").unwrap(), HostValue::String("1,2,3".to_owned()));
    let result = ctx.eval("[10, 1, 2].sort(function(a, b) { return b - a; }).join(',')").unwrap();
    assert_eq!(result, HostValue::String("10,2,1".to_owned()));
}

#[test]
fn array_find_some_every_includes() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("[1, 2, 3].find(function(x) { return x > 1; })").unwrap(), HostValue::Number(2.0));
    assert_eq!(ctx.eval("[1, 2, 3].some(function(x) { return x > 2; })").unwrap(), HostValue::Boolean(true));
    assert_eq!(ctx.eval("[1, 2, 3].every(function(x) { return x > 0; })").unwrap(), HostValue::Boolean(true));
    assert_eq!(ctx.eval("[1, 2, 3].includes(2)").unwrap(), HostValue::Boolean(true));
}

#[test]
fn object_literal_property_access_and_assignment() {
    let mut ctx = Context::new();
    let result = ctx
        .eval(
            "var obj = { a: 1, b: 2 };
             obj.c = obj.a + obj.b;
             obj.c;",
        )
        .unwrap();
    assert_eq!(result, HostValue::Number(3.0));
}

#[test]
fn object_keys_values_entries() {
    let mut ctx = Context::new();
    assert_eq!(ctx.eval("Object.keys({ a: 1, b: 2 }).join(',')").unwrap(), HostValue::String("a,b".to_owned()));
    assert_eq!(ctx.eval("Object.values({ a: 1, b: 2 }).join(',')").unwrap(), HostValue::String("1,2".to_owned()));
}

#[test]
fn for_in_enumerates_own_keys_and_for_of_enumerates_elements() {
    let mut ctx = Context::new();
    let keys = ctx
        .eval(
            "var keys = [];
             for (var k in { a: 1, b: 2 }) { keys.push(k); }
             keys.join(',');",
        )
        .unwrap();
    assert_eq!(keys, HostValue::String("a,b".to_owned()));

    let sum = ctx
        .eval(
            "var total = 0;
             for (var v of [1, 2, 3]) { total = total + v; }
             total;",
        )
        .unwrap();
    assert_eq!(sum, HostValue::Number(6.0));
}

#[test]
fn host_can_seed_and_read_sequence_and_mapping_values() {
    let mut ctx = Context::new();
    ctx.set("nums", HostValue::Sequence(vec![HostValue::Number(1.0), HostValue::Number(2.0), HostValue::Number(3.0)]));
    let result = ctx.eval("nums.reduce(function(acc, x) { return acc + x; }, 0);").unwrap();
    assert_eq!(result, HostValue::Number(6.0));

    ctx.eval("var made = { x: 1, y: 2 };").unwrap();
    assert_eq!(ctx.get("made"), HostValue::Mapping(vec![("x".to_owned(), HostValue::Number(1.0)), ("y".to_owned(), HostValue::Number(2.0))]));
}
