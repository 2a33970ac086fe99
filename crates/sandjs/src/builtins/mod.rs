//! Host-provided callables (§6.1): the one part of the crate that is not
//! core-language machinery. Each file owns one global or one family of
//! instance methods, grounded on `ouros::builtins`'s one-global-per-file
//! layout (`abs.rs`, `map.rs`, `filter.rs`, ...).
//!
//! Array/String/RegExp instance methods are not installed on a prototype
//! object the way user-defined properties are; `vm::attr` falls back to
//! [`array_method`]/[`string_method`]/[`regexp_method`] only after an own
//! property (and, for arrays, a real prototype chain) comes up empty, so a
//! guest script that does `Array.prototype.push = ...` would not observe
//! the override. The dialect has no way to reach `Array.prototype` at all
//! (§6.1 lists no constructor-with-prototype surface), so this is not
//! observable from guest code.

mod array_methods;
mod console;
mod global_fns;
mod json_obj;
mod math_obj;
mod number_methods;
mod object_methods;
mod string_methods;

use std::cell::RefCell;
use std::rc::Rc;

use crate::function::{FunctionValue, NativeFn};
use crate::object::ObjectData;
use crate::value::{ObjRef, Value};

pub(crate) use array_methods::lookup as array_method;
pub(crate) use number_methods::lookup as number_method;
pub(crate) use string_methods::{lookup as string_method, regexp_lookup as regexp_method};

/// Wraps a plain Rust closure as a guest-callable native function value.
pub(crate) fn native(name: &str, arity: usize, f: impl NativeFn + 'static) -> Value {
    Value::Function(Rc::new(FunctionValue::new_native(name, arity, Rc::new(f))))
}

/// `args.get(i)`, defaulting to `undefined` the way every spread/optional
/// JS parameter does.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn new_plain_object() -> ObjRef {
    Rc::new(RefCell::new(ObjectData::new()))
}

/// Builds the globals object a fresh [`crate::context::Context`] installs
/// before running any guest code.
#[must_use]
pub fn install_globals() -> ObjRef {
    let globals = new_plain_object();
    {
        let mut g = globals.borrow_mut();
        g.set_data(Rc::from("undefined"), Value::Undefined);
        g.set_data(Rc::from("NaN"), Value::Number(f64::NAN));
        g.set_data(Rc::from("Infinity"), Value::Number(f64::INFINITY));
        console::install(&mut g);
        math_obj::install(&mut g);
        json_obj::install(&mut g);
        object_methods::install(&mut g);
        global_fns::install(&mut g);
    }
    globals
}
