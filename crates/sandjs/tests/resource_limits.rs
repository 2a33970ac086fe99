use std::time::Duration;

use sandjs::{Context, ResourceLimits};

#[test]
fn operation_ceiling_aborts_runaway_loop() {
    let mut ctx = Context::with_limits(ResourceLimits::new().max_operations(1_000));
    let result = ctx.eval("var i = 0; while (true) { i = i + 1; }");
    assert!(result.is_err(), "a loop exceeding the operation ceiling should error, not run forever");
}

#[test]
fn recursion_ceiling_aborts_unbounded_recursion() {
    let mut ctx = Context::with_limits(ResourceLimits::new().max_recursion_depth(Some(50)));
    let result = ctx.eval("function recurse(n) { return recurse(n + 1); } recurse(0);");
    assert!(result.is_err(), "unbounded recursion should hit the recursion ceiling");
}

#[test]
fn time_ceiling_aborts_long_running_script() {
    let mut ctx = Context::with_limits(ResourceLimits::new().max_duration(Duration::from_millis(1)));
    let result = ctx.eval("var i = 0; while (true) { i = i + 1; }");
    assert!(result.is_err(), "a script exceeding the wall-clock ceiling should error");
}

#[test]
fn uncatchable_errors_are_not_observable_to_guest_try_catch() {
    let mut ctx = Context::with_limits(ResourceLimits::new().max_operations(1_000));
    let result = ctx.eval(
        "var caught = false;
         try {
             var i = 0;
             while (true) { i = i + 1; }
         } catch (e) {
             caught = true;
         }
         caught;",
    );
    assert!(result.is_err(), "a resource-limit breach must unwind past guest try/catch, not be swallowed by it");
}

#[test]
fn scripts_within_limits_still_succeed() {
    let mut ctx = Context::with_limits(ResourceLimits::new().max_operations(10_000).max_duration(Duration::from_secs(5)));
    let result = ctx.eval("var sum = 0; for (var i = 0; i < 100; i = i + 1) { sum = sum + i; } sum;").unwrap();
    assert_eq!(result, sandjs::HostValue::Number(4950.0));
}
