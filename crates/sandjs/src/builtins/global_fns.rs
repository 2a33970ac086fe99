//! Free-standing global functions (§6.1, §9.1 supplement): the numeric
//! coercion helpers `context.py` exposes at top level, plus indirect `eval`.
//!
//! `eval` reuses the ordinary parse → compile → call pipeline
//! (`parser::parse_program`, `compiler::compile_program`,
//! `HostContext::call_value`) with no captured closure cells and no bound
//! `this`, so it runs against the shared globals table exactly like any
//! other top-level call — indirect-eval scoping falls out for free instead
//! of needing special compiler support for `(0, eval)(...)`.

use std::rc::Rc;

use super::{arg, native};
use crate::function::FunctionValue;
use crate::object::ObjectData;
use crate::value::Value;

pub(super) fn install(globals: &mut ObjectData) {
    globals.set_data(Rc::from("parseInt"), native("parseInt", 2, |_host, _this, args| {
        let s = arg(args, 0).to_js_string();
        let radix = arg(args, 1).to_number();
        Ok(Value::Number(parse_int(&s, if radix.is_nan() || radix == 0.0 { 10 } else { radix as u32 })))
    }));
    globals.set_data(Rc::from("parseFloat"), native("parseFloat", 1, |_host, _this, args| {
        let s = arg(args, 0).to_js_string();
        Ok(Value::Number(parse_float(&s)))
    }));
    globals.set_data(Rc::from("isNaN"), native("isNaN", 1, |_host, _this, args| Ok(Value::Boolean(arg(args, 0).to_number().is_nan()))));
    globals.set_data(Rc::from("isFinite"), native("isFinite", 1, |_host, _this, args| Ok(Value::Boolean(arg(args, 0).to_number().is_finite()))));
    globals.set_data(Rc::from("eval"), native("eval", 1, |host, _this, args| {
        let Value::String(src) = arg(args, 0) else { return Ok(arg(args, 0)) };
        let program = crate::parser::parse_program(&src).map_err(|e| crate::exception::RunError::syntax_error(e.message))?;
        let compiled = crate::compiler::compile_program(&program).map_err(|e| crate::exception::RunError::syntax_error(e.message))?;
        let func = FunctionValue::new_compiled(compiled, Vec::new(), None);
        host.call_value(&Value::Function(Rc::new(func)), Value::Undefined, &[])
    }));
}

fn parse_int(s: &str, radix: u32) -> f64 {
    let s = s.trim();
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (radix, s) = if radix == 16 {
        (16, s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s))
    } else if s.starts_with("0x") || s.starts_with("0X") {
        (16, &s[2..])
    } else {
        (radix.clamp(2, 36), s)
    };
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let magnitude = u64::from_str_radix(&digits, radix).map(|v| v as f64).unwrap_or_else(|_| {
        digits.chars().fold(0.0, |acc, c| acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0)))
    });
    if neg { -magnitude } else { magnitude }
}

fn parse_float(s: &str) -> f64 {
    let s = s.trim();
    let mut end = 0;
    let bytes = s.as_bytes();
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let mut seen_digit = false;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        seen_digit = true;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            seen_digit = true;
        }
    }
    if seen_digit && end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    if !seen_digit {
        if s.starts_with("Infinity") || s.starts_with("+Infinity") {
            return f64::INFINITY;
        }
        if s.starts_with("-Infinity") {
            return f64::NEG_INFINITY;
        }
        return f64::NAN;
    }
    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}
