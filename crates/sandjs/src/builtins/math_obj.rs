//! The `Math` global (§6.1), grounded on
//! `original_source/src/mquickjs_python/context.py::_create_math_object` —
//! same constant set, same per-method `ToNumber`-then-libm-call shape.

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, native};
use crate::object::ObjectData;
use crate::value::Value;

pub(super) fn install(globals: &mut ObjectData) {
    let mut math = ObjectData::new();

    math.set_data(Rc::from("PI"), Value::Number(std::f64::consts::PI));
    math.set_data(Rc::from("E"), Value::Number(std::f64::consts::E));
    math.set_data(Rc::from("LN2"), Value::Number(std::f64::consts::LN_2));
    math.set_data(Rc::from("LN10"), Value::Number(std::f64::consts::LN_10));
    math.set_data(Rc::from("LOG2E"), Value::Number(std::f64::consts::LOG2_E));
    math.set_data(Rc::from("LOG10E"), Value::Number(std::f64::consts::LOG10_E));
    math.set_data(Rc::from("SQRT2"), Value::Number(std::f64::consts::SQRT_2));
    math.set_data(Rc::from("SQRT1_2"), Value::Number(std::f64::consts::FRAC_1_SQRT_2));

    let unary = |name: &'static str, f: fn(f64) -> f64| native(name, 1, move |_host, _this, args| Ok(Value::Number(f(arg(args, 0).to_number()))));

    math.set_data(Rc::from("abs"), unary("abs", f64::abs));
    math.set_data(Rc::from("floor"), unary("floor", f64::floor));
    math.set_data(Rc::from("ceil"), unary("ceil", f64::ceil));
    // JS rounds half towards +Infinity, not `f64::round`'s half-away-from-zero.
    math.set_data(Rc::from("round"), unary("round", |x| (x + 0.5).floor()));
    math.set_data(Rc::from("trunc"), unary("trunc", f64::trunc));
    math.set_data(Rc::from("sqrt"), unary("sqrt", |x| if x < 0.0 { f64::NAN } else { x.sqrt() }));
    math.set_data(Rc::from("sin"), unary("sin", f64::sin));
    math.set_data(Rc::from("cos"), unary("cos", f64::cos));
    math.set_data(Rc::from("tan"), unary("tan", f64::tan));
    math.set_data(Rc::from("asin"), unary("asin", |x| if !(-1.0..=1.0).contains(&x) { f64::NAN } else { x.asin() }));
    math.set_data(Rc::from("acos"), unary("acos", |x| if !(-1.0..=1.0).contains(&x) { f64::NAN } else { x.acos() }));
    math.set_data(Rc::from("atan"), unary("atan", f64::atan));
    math.set_data(Rc::from("log"), unary("log", |x| if x < 0.0 { f64::NAN } else if x == 0.0 { f64::NEG_INFINITY } else { x.ln() }));
    math.set_data(Rc::from("exp"), unary("exp", f64::exp));
    math.set_data(
        Rc::from("sign"),
        unary("sign", |x| if x.is_nan() { f64::NAN } else if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { x }),
    );

    math.set_data(Rc::from("min"), native("min", 2, |_host, _this, args| {
        if args.is_empty() {
            return Ok(Value::Number(f64::INFINITY));
        }
        Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |acc, n| if n.is_nan() { f64::NAN } else { acc.min(n) })))
    }));
    math.set_data(Rc::from("max"), native("max", 2, |_host, _this, args| {
        if args.is_empty() {
            return Ok(Value::Number(f64::NEG_INFINITY));
        }
        Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |acc, n| if n.is_nan() { f64::NAN } else { acc.max(n) })))
    }));
    math.set_data(Rc::from("pow"), native("pow", 2, |_host, _this, args| Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))));
    math.set_data(Rc::from("atan2"), native("atan2", 2, |_host, _this, args| Ok(Value::Number(arg(args, 0).to_number().atan2(arg(args, 1).to_number())))));
    math.set_data(Rc::from("random"), native("random", 0, |_host, _this, _args| Ok(Value::Number(pseudo_random()))));

    globals.set_data(Rc::from("Math"), Value::Object(Rc::new(RefCell::new(math))));
}

/// A small xorshift generator seeded from the process clock. `Math.random`
/// has no determinism contract to preserve, so no user-visible seeding API
/// is exposed; a dependency on `rand` would be a larger surface than this
/// one call site needs.
fn pseudo_random() -> f64 {
    use std::cell::Cell;
    use std::time::{SystemTime, UNIX_EPOCH};

    thread_local! {
        static STATE: Cell<u64> = Cell::new(0);
    }

    STATE.with(|state| {
        let mut x = state.get();
        if x == 0 {
            x = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0x9E3779B97F4A7C15) | 1;
        }
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    })
}
