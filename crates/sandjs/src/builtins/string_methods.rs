//! `String.prototype` instance methods, plus `RegExp.prototype.test`/`exec`
//! (§6.1, §4.8). This is the one place built-in code calls into the regex
//! sub-engine (`crate::regex::vm::RegExpData`), grounded on
//! `ouros::builtins`'s per-function dispatch and on the regex engine's own
//! `test`/`exec` API (`regex/vm.rs`).

use std::cell::RefCell;
use std::rc::Rc;

use super::{arg, native};
use crate::object::ArrayData;
use crate::regex::vm::RegExpData;
use crate::value::Value;

pub(super) fn lookup(name: &str) -> Option<Value> {
    Some(match name {
        "charAt" => native("charAt", 1, |_host, this, args| {
            let s = this.to_js_string();
            let i = arg(args, 0).to_number();
            let ch = if i.is_sign_negative() || i.is_nan() { None } else { s.chars().nth(i as usize) };
            Ok(Value::String(Rc::from(ch.map(String::from).unwrap_or_default().as_str())))
        }),
        "charCodeAt" => native("charCodeAt", 1, |_host, this, args| {
            let s = this.to_js_string();
            let i = arg(args, 0).to_number();
            let code = if i.is_sign_negative() || i.is_nan() { None } else { s.chars().nth(i as usize) };
            Ok(code.map_or(Value::Number(f64::NAN), |c| Value::Number(c as u32 as f64)))
        }),
        "indexOf" => native("indexOf", 1, |_host, this, args| {
            let s = this.to_js_string();
            let needle = arg(args, 0).to_js_string();
            Ok(Value::Number(s.find(needle.as_ref()).map_or(-1.0, |byte_pos| s[..byte_pos].chars().count() as f64)))
        }),
        "includes" => native("includes", 1, |_host, this, args| {
            let s = this.to_js_string();
            let needle = arg(args, 0).to_js_string();
            Ok(Value::Boolean(s.contains(needle.as_ref())))
        }),
        "slice" => native("slice", 2, |_host, this, args| {
            let s = this.to_js_string();
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), args);
            let out: String = if start < end { chars[start..end].iter().collect() } else { String::new() };
            Ok(Value::String(Rc::from(out.as_str())))
        }),
        "split" => native("split", 1, |_host, this, args| {
            let s = this.to_js_string();
            let sep = arg(args, 0);
            let parts: Vec<Value> = if sep.is_undefined() {
                vec![Value::String(Rc::clone(&s))]
            } else {
                let sep_str = sep.to_js_string();
                if sep_str.is_empty() {
                    s.chars().map(|c| Value::String(Rc::from(c.to_string().as_str()))).collect()
                } else {
                    s.split(sep_str.as_ref()).map(|p| Value::String(Rc::from(p))).collect()
                }
            };
            Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(parts)))))
        }),
        "toUpperCase" => native("toUpperCase", 0, |_host, this, _args| Ok(Value::String(Rc::from(this.to_js_string().to_uppercase().as_str())))),
        "toLowerCase" => native("toLowerCase", 0, |_host, this, _args| Ok(Value::String(Rc::from(this.to_js_string().to_lowercase().as_str())))),
        "trim" => native("trim", 0, |_host, this, _args| Ok(Value::String(Rc::from(this.to_js_string().trim())))),
        "repeat" => native("repeat", 1, |host, this, args| {
            let n = arg(args, 0).to_number();
            if n < 0.0 || !n.is_finite() {
                return Err(host.range_error("Invalid count value"));
            }
            Ok(Value::String(Rc::from(this.to_js_string().repeat(n as usize).as_str())))
        }),
        "startsWith" => native("startsWith", 1, |_host, this, args| Ok(Value::Boolean(this.to_js_string().starts_with(arg(args, 0).to_js_string().as_ref())))),
        "endsWith" => native("endsWith", 1, |_host, this, args| Ok(Value::Boolean(this.to_js_string().ends_with(arg(args, 0).to_js_string().as_ref())))),
        "replace" => native("replace", 2, |host, this, args| {
            let s = this.to_js_string();
            let pattern = arg(args, 0);
            let replacement = arg(args, 1);
            match pattern {
                Value::RegExp(r) => {
                    let mut r = r.borrow_mut();
                    let global = r.global;
                    replace_with_regex(host, &mut r, &s, &replacement, global)
                }
                other => {
                    let needle = other.to_js_string();
                    Ok(Value::String(Rc::from(match s.find(needle.as_ref()) {
                        Some(pos) => {
                            let rep = replacement.to_js_string();
                            format!("{}{}{}", &s[..pos], rep, &s[pos + needle.len()..])
                        }
                        None => s.to_string(),
                    }.as_str())))
                }
            }
        }),
        "match" => native("match", 1, |host, this, args| {
            let s = this.to_js_string();
            let Value::RegExp(r) = arg(args, 0) else {
                return Err(host.type_error("String#match expects a regular expression"));
            };
            let mut r = r.borrow_mut();
            if r.global {
                r.last_index = 0;
                let mut out = Vec::new();
                loop {
                    let Some(m) = r.exec(&s, host.resource_tracker())? else { break };
                    out.push(Value::String(Rc::from(r.capture_strings(&s, &m)[0].clone().unwrap_or_default().as_str())));
                    if m.start == m.end {
                        r.last_index += 1;
                    }
                }
                if out.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(out)))))
                }
            } else {
                match r.exec(&s, host.resource_tracker())? {
                    Some(m) => Ok(match_result_array(&r, &s, &m)),
                    None => Ok(Value::Null),
                }
            }
        }),
        _ => return None,
    })
}

fn replace_with_regex(host: &mut dyn crate::function::HostContext, r: &mut RegExpData, s: &str, replacement: &Value, global: bool) -> Result<Value, crate::exception::RunError> {
    let mut out = String::new();
    let mut cursor = 0usize;
    let chars: Vec<char> = s.chars().collect();
    r.last_index = 0;
    loop {
        let Some(m) = r.exec(s, host.resource_tracker())? else { break };
        let before: String = chars[cursor..m.start].iter().collect();
        out.push_str(&before);
        let captures = r.capture_strings(s, &m);
        out.push_str(&expand_replacement(replacement, &captures));
        cursor = m.end.max(m.start + usize::from(m.start == m.end));
        if m.start == m.end {
            r.last_index = r.last_index.max(cursor as u32);
        }
        if !global {
            break;
        }
    }
    out.push_str(&chars[cursor.min(chars.len())..].iter().collect::<String>());
    Ok(Value::String(Rc::from(out.as_str())))
}

fn expand_replacement(replacement: &Value, captures: &[Option<String>]) -> String {
    let whole = captures[0].clone().unwrap_or_default();
    let template = replacement.to_js_string();
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('&') => {
                    chars.next();
                    out.push_str(&whole);
                }
                Some(d) if d.is_ascii_digit() => {
                    let d = chars.next().unwrap();
                    let idx = d.to_digit(10).unwrap() as usize;
                    out.push_str(captures.get(idx).and_then(Option::as_ref).map(String::as_str).unwrap_or(""));
                }
                _ => out.push('$'),
            }
        } else {
            out.push(c);
        }
    }
    out
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

fn match_result_array(r: &RegExpData, s: &str, m: &crate::regex::vm::RegexMatch) -> Value {
    let captures = r.capture_strings(s, m);
    let elements: Vec<Value> = captures.into_iter().map(|c| c.map_or(Value::Undefined, |s| Value::String(Rc::from(s.as_str())))).collect();
    Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(elements))))
}

pub(super) fn regexp_lookup(name: &str) -> Option<Value> {
    Some(match name {
        "test" => native("test", 1, |host, this, args| {
            let Value::RegExp(r) = &this else { return Ok(Value::Boolean(false)) };
            let s = arg(args, 0).to_js_string();
            let result = r.borrow_mut().test(&s, host.resource_tracker())?;
            Ok(Value::Boolean(result))
        }),
        "exec" => native("exec", 1, |host, this, args| {
            let Value::RegExp(r) = &this else { return Ok(Value::Null) };
            let s = arg(args, 0).to_js_string();
            let mut r = r.borrow_mut();
            match r.exec(&s, host.resource_tracker())? {
                Some(m) => Ok(match_result_array(&r, &s, &m)),
                None => Ok(Value::Null),
            }
        }),
        "toString" => native("toString", 0, |_host, this, _args| Ok(Value::String(this.to_js_string()))),
        _ => return None,
    })
}
