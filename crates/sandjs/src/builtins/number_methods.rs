//! `Number.prototype` instance methods. Not enumerated as a built-in
//! surface of its own, unlike `Math`/`JSON`/`Array`/`String`; kept to the
//! two methods guest scripts reach for most (`toFixed`, `toString`) as a
//! minimal ambient supplement, in the same name-lookup style as
//! [`super::array_methods`]/[`super::string_methods`].

use std::rc::Rc;

use super::{arg, native};
use crate::value::Value;

pub(super) fn lookup(name: &str) -> Option<Value> {
    Some(match name {
        "toFixed" => native("toFixed", 1, |host, this, args| {
            let n = this.to_number();
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits as usize };
            if digits > 100 {
                return Err(host.range_error("toFixed() digits argument must be between 0 and 100"));
            }
            Ok(Value::String(Rc::from(format!("{n:.digits$}").as_str())))
        }),
        "toString" => native("toString", 1, |_host, this, args| {
            let n = this.to_number();
            let radix = arg(args, 0).to_number();
            if radix.is_nan() || radix as u32 == 10 {
                return Ok(Value::String(this.to_js_string()));
            }
            Ok(Value::String(Rc::from(to_radix_string(n, radix as u32).as_str())))
        }),
        "valueOf" => native("valueOf", 0, |_host, this, _args| Ok(Value::Number(this.to_number()))),
        _ => return None,
    })
}

fn to_radix_string(n: f64, radix: u32) -> String {
    let radix = radix.clamp(2, 36);
    if !n.is_finite() {
        return crate::value::number_to_string(n);
    }
    let neg = n < 0.0;
    let mut int_part = n.abs().trunc() as u64;
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    if int_part == 0 {
        out.push(b'0');
    }
    while int_part > 0 {
        out.push(digits[(int_part % u64::from(radix)) as usize]);
        int_part /= u64::from(radix);
    }
    out.reverse();
    let mut s = String::from_utf8(out).unwrap();
    if neg {
        s.insert(0, '-');
    }
    s
}
