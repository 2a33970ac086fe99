//! The `JSON` global (§6.1, §9.1 supplement), grounded on
//! `original_source/src/mquickjs_python/context.py`'s `_to_python`/`_to_js`
//! traversal shape but built on `serde_json::Value` as the intermediate
//! representation, the way the rest of the workspace reaches for `serde`
//! for structured (de)serialization.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value as Json;

use super::{arg, native};
use crate::object::{ObjectData, dict_pairs};
use crate::value::Value;

pub(super) fn install(globals: &mut ObjectData) {
    let mut json = ObjectData::new();
    json.set_data(Rc::from("parse"), native("parse", 1, |host, _this, args| {
        let text = arg(args, 0).to_js_string();
        let parsed: Json = serde_json::from_str(&text).map_err(|e| host.type_error(format!("invalid JSON: {e}")))?;
        from_json(host, &parsed)
    }));
    json.set_data(Rc::from("stringify"), native("stringify", 1, |_host, _this, args| {
        let value = arg(args, 0);
        match to_json(&value) {
            Some(j) => Ok(Value::String(Rc::from(j.to_string().as_str()))),
            None => Ok(Value::Undefined),
        }
    }));
    globals.set_data(Rc::from("JSON"), Value::Object(Rc::new(RefCell::new(json))));
}

fn from_json(host: &mut dyn crate::function::HostContext, j: &Json) -> Result<Value, crate::exception::RunError> {
    Ok(match j {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Boolean(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(Rc::from(s.as_str())),
        Json::Array(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                elements.push(from_json(host, item)?);
            }
            host.new_array(elements)?
        }
        Json::Object(map) => {
            let obj = host.new_object()?;
            if let Value::Object(o) = &obj {
                for (k, v) in map {
                    let converted = from_json(host, v)?;
                    o.borrow_mut().set_data(Rc::from(k.as_str()), converted);
                }
            }
            obj
        }
    })
}

/// `undefined`/functions/`RegExp` have no JSON form and are dropped, matching
/// `JSON.stringify`'s own omission rules rather than raising.
fn to_json(v: &Value) -> Option<Json> {
    match v {
        Value::Undefined | Value::Function(_) | Value::RegExp(_) | Value::ArrayBuffer(_) | Value::TypedArray(_) => None,
        Value::Null => Some(Json::Null),
        Value::Boolean(b) => Some(Json::Bool(*b)),
        Value::Number(n) => Some(if n.is_finite() { serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number) } else { Json::Null }),
        Value::String(s) => Some(Json::String(s.to_string())),
        Value::Array(a) => Some(Json::Array(a.borrow().elements.iter().map(|e| to_json(e).unwrap_or(Json::Null)).collect())),
        Value::Object(o) => {
            let mut map = serde_json::Map::new();
            for (k, v) in dict_pairs(&o.borrow()) {
                if let Some(j) = to_json(&v) {
                    map.insert(k.to_string(), j);
                }
            }
            Some(Json::Object(map))
        }
    }
}

