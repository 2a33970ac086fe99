//! Arithmetic, bitwise, and unary opcodes (§3 numeric/string coercions).

use std::rc::Rc;

use super::VM;
use crate::exception::RunError;
use crate::io::PrintWriter;
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;
use crate::value::{PrimitiveHint, Value};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// `+`: string concatenation if either `ToPrimitive(Default)` operand is
    /// a string, numeric addition otherwise.
    pub(super) fn op_add(&mut self) -> Result<(), RunError> {
        let b = self.pop();
        let a = self.pop();
        let pa = a.to_primitive(PrimitiveHint::Default);
        let pb = b.to_primitive(PrimitiveHint::Default);
        let result = if matches!(pa, Value::String(_)) || matches!(pb, Value::String(_)) {
            let mut s = String::new();
            s.push_str(&pa.to_js_string());
            s.push_str(&pb.to_js_string());
            Value::String(Rc::from(s.as_str()))
        } else {
            Value::Number(pa.to_number() + pb.to_number())
        };
        self.push(result);
        Ok(())
    }

    pub(super) fn op_numeric(&mut self, f: impl Fn(f64, f64) -> f64) {
        let b = self.pop().to_number();
        let a = self.pop().to_number();
        self.push(Value::Number(f(a, b)));
    }

    pub(super) fn op_int32(&mut self, f: impl Fn(i32, i32) -> i32) {
        let b = self.pop().to_int32();
        let a = self.pop().to_int32();
        self.push(Value::Number(f64::from(f(a, b))));
    }

    /// `<<`/`>>`: shift amount is taken mod 32, matching `ToUint32(rhs) & 31`.
    pub(super) fn op_shift(&mut self, f: impl Fn(i32, u32) -> i32) {
        let b = self.pop().to_uint32() & 0x1f;
        let a = self.pop().to_int32();
        self.push(Value::Number(f64::from(f(a, b))));
    }

    /// `>>>`: unsigned right shift, always non-negative.
    pub(super) fn op_ushr(&mut self) {
        let b = self.pop().to_uint32() & 0x1f;
        let a = self.pop().to_uint32();
        self.push(Value::Number(f64::from(a.wrapping_shr(b))));
    }
}
