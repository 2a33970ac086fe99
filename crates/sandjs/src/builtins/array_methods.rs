//! `Array.prototype` instance methods (§6.1), grounded on
//! `ouros::builtins::map`/`filter`/`reduce` (one callback-driven method per
//! function, dispatched here by name instead of by file since arrays have
//! no reachable prototype object to hang separate builtins off of — see
//! the module-level note in `builtins/mod.rs`).

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, native};
use crate::object::ArrayData;
use crate::value::Value;

pub(super) fn lookup(name: &str) -> Option<Value> {
    Some(match name {
        "push" => native("push", 1, |_host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            a.borrow_mut().elements.extend(args.iter().cloned());
            Ok(Value::Number(a.borrow().elements.len() as f64))
        }),
        "pop" => native("pop", 0, |_host, this, _args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            Ok(a.borrow_mut().elements.pop().unwrap_or(Value::Undefined))
        }),
        "shift" => native("shift", 0, |_host, this, _args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let mut a = a.borrow_mut();
            if a.elements.is_empty() { Ok(Value::Undefined) } else { Ok(a.elements.remove(0)) }
        }),
        "unshift" => native("unshift", 1, |_host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let mut a = a.borrow_mut();
            for (i, v) in args.iter().cloned().enumerate() {
                a.elements.insert(i, v);
            }
            Ok(Value::Number(a.elements.len() as f64))
        }),
        "slice" => native("slice", 2, |_host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let elements = a.borrow().elements.clone();
            let (start, end) = slice_bounds(elements.len(), args);
            let sliced = if start < end { elements[start..end].to_vec() } else { Vec::new() };
            Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(sliced)))))
        }),
        "concat" => native("concat", 1, |_host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let mut out = a.borrow().elements.clone();
            for v in args {
                match v {
                    Value::Array(other) => out.extend(other.borrow().elements.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(out)))))
        }),
        "join" => native("join", 1, |_host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let sep = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                v => v.to_js_string().to_string(),
            };
            let parts: Vec<String> = a.borrow().elements.iter().map(|v| if v.is_nullish() { String::new() } else { v.to_js_string().to_string() }).collect();
            Ok(Value::String(Rc::from(parts.join(&sep).as_str())))
        }),
        "indexOf" => native("indexOf", 1, |_host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let needle = arg(args, 0);
            let pos = a.borrow().elements.iter().position(|v| v.strict_eq(&needle));
            Ok(Value::Number(pos.map_or(-1.0, |p| p as f64)))
        }),
        "includes" => native("includes", 1, |_host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let needle = arg(args, 0);
            Ok(Value::Boolean(a.borrow().elements.iter().any(|v| v.strict_eq(&needle))))
        }),
        "reverse" => native("reverse", 0, |_host, this, _args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            a.borrow_mut().elements.reverse();
            Ok(this.clone())
        }),
        "forEach" => native("forEach", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let callback = arg(args, 0);
            let elements = a.borrow().elements.clone();
            for (i, v) in elements.into_iter().enumerate() {
                host.call_value(&callback, Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?;
            }
            Ok(Value::Undefined)
        }),
        "map" => native("map", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let callback = arg(args, 0);
            let elements = a.borrow().elements.clone();
            let mut out = Vec::with_capacity(elements.len());
            for (i, v) in elements.into_iter().enumerate() {
                out.push(host.call_value(&callback, Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?);
            }
            Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(out)))))
        }),
        "filter" => native("filter", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let callback = arg(args, 0);
            let elements = a.borrow().elements.clone();
            let mut out = Vec::new();
            for (i, v) in elements.into_iter().enumerate() {
                let keep = host.call_value(&callback, Value::Undefined, &[v.clone(), Value::Number(i as f64), this.clone()])?;
                if keep.to_boolean() {
                    out.push(v);
                }
            }
            Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(out)))))
        }),
        "find" => native("find", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let callback = arg(args, 0);
            let elements = a.borrow().elements.clone();
            for (i, v) in elements.into_iter().enumerate() {
                if host.call_value(&callback, Value::Undefined, &[v.clone(), Value::Number(i as f64), this.clone()])?.to_boolean() {
                    return Ok(v);
                }
            }
            Ok(Value::Undefined)
        }),
        "some" => native("some", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let callback = arg(args, 0);
            let elements = a.borrow().elements.clone();
            for (i, v) in elements.into_iter().enumerate() {
                if host.call_value(&callback, Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?.to_boolean() {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }),
        "every" => native("every", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let callback = arg(args, 0);
            let elements = a.borrow().elements.clone();
            for (i, v) in elements.into_iter().enumerate() {
                if !host.call_value(&callback, Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?.to_boolean() {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }),
        "reduce" => native("reduce", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let callback = arg(args, 0);
            let elements = a.borrow().elements.clone();
            let mut iter = elements.into_iter().enumerate();
            let mut acc = if args.len() > 1 {
                arg(args, 1)
            } else {
                let Some((_, first)) = iter.next() else {
                    return Err(host.type_error("Reduce of empty array with no initial value"));
                };
                first
            };
            for (i, v) in iter {
                acc = host.call_value(&callback, Value::Undefined, &[acc, v, Value::Number(i as f64), this.clone()])?;
            }
            Ok(acc)
        }),
        "sort" => native("sort", 1, |host, this, args| {
            let Value::Array(a) = &this else { return Ok(Value::Undefined) };
            let comparator = arg(args, 0);
            let mut elements = a.borrow().elements.clone();
            // The dialect's resource budget forbids a fallible comparator
            // callback inside `sort_by`'s closure from unwinding through it,
            // so errors are captured and re-raised after sorting completes.
            let mut err = None;
            elements.sort_by(|x, y| {
                if err.is_some() {
                    return std::cmp::Ordering::Equal;
                }
                if comparator.is_undefined() {
                    return x.to_js_string().cmp(&y.to_js_string());
                }
                match host.call_value(&comparator, Value::Undefined, &[x.clone(), y.clone()]) {
                    Ok(result) => {
                        let n = result.to_number();
                        if n < 0.0 {
                            std::cmp::Ordering::Less
                        } else if n > 0.0 {
                            std::cmp::Ordering::Greater
                        } else {
                            std::cmp::Ordering::Equal
                        }
                    }
                    Err(e) => {
                        err = Some(e);
                        std::cmp::Ordering::Equal
                    }
                }
            });
            if let Some(e) = err {
                return Err(e);
            }
            a.borrow_mut().elements = elements;
            Ok(this.clone())
        }),
        _ => return None,
    })
}

fn slice_bounds(len: usize, args: &[Value]) -> (usize, usize) {
    let norm = |v: Value, default: usize| -> usize {
        if v.is_undefined() {
            return default;
        }
        let n = v.to_number();
        if n.is_nan() {
            return 0;
        }
        if n < 0.0 { (len as f64 + n).max(0.0) as usize } else { (n as usize).min(len) }
    };
    let start = norm(arg(args, 0), 0);
    let end = norm(arg(args, 1), len);
    (start.min(len), end.min(len))
}
