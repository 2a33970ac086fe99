//! Host/guest value marshalling (§6), grounded on
//! `original_source/src/mquickjs_python/context.py`'s `_to_python`/`_to_js`
//! recursive conversion.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::function::HostContext;
use crate::object::{ArrayData, ObjectData, dict_pairs};
use crate::value::Value;

/// The host-side view of a guest value, crossing the `Context` boundary at
/// [`crate::context::Context::eval`]/`get`/`set`.
///
/// `Function`/`RegExp`/`ArrayBuffer`/`TypedArray` have no host-side
/// representation worth inventing, so converting *to* `HostValue` maps a
/// guest function to the data-less `Callable` marker and everything else in
/// that set to `Undefined`; there is no way back from `Callable` to a guest
/// function (the dialect gives a host no means to synthesize a callable
/// guest value from inert data), so that direction is intentionally
/// asymmetric.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Undefined,
    Boolean(bool),
    Number(f64),
    String(String),
    Sequence(Vec<HostValue>),
    Mapping(Vec<(String, HostValue)>),
    /// A guest function, exposed only as a marker — see the type doc.
    Callable,
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => write!(f, "null"),
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Callable => write!(f, "[function]"),
            HostValue::Boolean(b) => write!(f, "{b}"),
            HostValue::Number(n) => write!(f, "{}", crate::value::number_to_string(*n)),
            HostValue::String(s) => write!(f, "{s}"),
            HostValue::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            HostValue::Mapping(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Converts a guest [`Value`] into a [`HostValue`] snapshot.
#[must_use]
pub fn to_host(value: &Value) -> HostValue {
    match value {
        Value::Undefined => HostValue::Undefined,
        Value::Null => HostValue::Null,
        Value::Boolean(b) => HostValue::Boolean(*b),
        Value::Number(n) => HostValue::Number(*n),
        Value::String(s) => HostValue::String(s.to_string()),
        Value::Array(a) => HostValue::Sequence(a.borrow().elements.iter().map(to_host).collect()),
        Value::Object(o) => HostValue::Mapping(dict_pairs(&o.borrow()).into_iter().map(|(k, v)| (k.to_string(), to_host(&v))).collect()),
        Value::Function(_) => HostValue::Callable,
        Value::RegExp(_) | Value::ArrayBuffer(_) | Value::TypedArray(_) => HostValue::Undefined,
    }
}

/// Converts a [`HostValue`] into a fresh guest [`Value`], allocating through
/// `host` so array/object construction is subject to the same resource
/// accounting as guest-originated allocations.
pub fn from_host(host: &mut dyn HostContext, value: &HostValue) -> Value {
    match value {
        HostValue::Null => Value::Null,
        HostValue::Undefined | HostValue::Callable => Value::Undefined,
        HostValue::Boolean(b) => Value::Boolean(*b),
        HostValue::Number(n) => Value::Number(*n),
        HostValue::String(s) => Value::String(Rc::from(s.as_str())),
        HostValue::Sequence(items) => {
            let elements: Vec<Value> = items.iter().map(|v| from_host(host, v)).collect();
            host.new_array(elements).unwrap_or_else(|_| Value::Array(Rc::new(RefCell::new(ArrayData::new()))))
        }
        HostValue::Mapping(pairs) => {
            let mut obj = ObjectData::new();
            for (k, v) in pairs {
                let converted = from_host(host, v);
                obj.set_data(Rc::from(k.as_str()), converted);
            }
            Value::Object(Rc::new(RefCell::new(obj)))
        }
    }
}
