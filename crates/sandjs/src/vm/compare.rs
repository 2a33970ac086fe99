//! Relational comparison, `instanceof`, and `in` (§3, §9 prototype chains).

use std::cmp::Ordering;
use std::rc::Rc;

use super::VM;
use crate::exception::RunError;
use crate::io::PrintWriter;
use crate::object::PropertySlot;
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;
use crate::value::{ObjRef, PrimitiveHint, Value, as_array_index};

/// The abstract relational comparison: `ToPrimitive(Number)` both sides,
/// compare lexicographically if both ended up strings, numerically
/// otherwise. `None` (incomparable, i.e. a `NaN` operand) makes every one of
/// `<`, `<=`, `>`, `>=` false, matching IEEE-754 comparisons against `NaN`.
fn abstract_compare(a: &Value, b: &Value) -> Option<Ordering> {
    let pa = a.to_primitive(PrimitiveHint::Number);
    let pb = b.to_primitive(PrimitiveHint::Number);
    if let (Value::String(sa), Value::String(sb)) = (&pa, &pb) {
        return Some(sa.as_ref().cmp(sb.as_ref()));
    }
    let na = pa.to_number();
    let nb = pb.to_number();
    na.partial_cmp(&nb)
}

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    pub(super) fn op_relational(&mut self, accept: impl Fn(Option<Ordering>) -> bool) {
        let b = self.pop();
        let a = self.pop();
        self.push(Value::Boolean(accept(abstract_compare(&a, &b))));
    }

    pub(super) fn op_instanceof(&mut self) -> Result<(), RunError> {
        let ctor = self.pop();
        let obj = self.pop();
        let Value::Function(f) = &ctor else {
            return Err(self.type_error("right-hand side of 'instanceof' is not callable"));
        };
        let result = walk_prototype_chain(&obj, |proto| Rc::ptr_eq(proto, &f.prototype));
        self.push(Value::Boolean(result));
        Ok(())
    }

    pub(super) fn op_in(&mut self) -> Result<(), RunError> {
        let obj = self.pop();
        let key = self.pop();
        let key_str = key.to_js_string();
        let result = match &obj {
            Value::Array(arr) => {
                let b = arr.borrow();
                key_str.as_ref() == "length"
                    || as_array_index(&key_str).is_some_and(|i| (i as usize) < b.elements.len())
                    || has_own_or_inherited(&b.object.prototype.clone(), &key_str, Some(&b.object))
            }
            Value::Object(o) => has_own_or_inherited(&Some(Rc::clone(o)), &key_str, None),
            _ => return Err(self.type_error("cannot use 'in' operator on a non-object")),
        };
        self.push(Value::Boolean(result));
        Ok(())
    }
}

fn walk_prototype_chain(value: &Value, found: impl Fn(&ObjRef) -> bool) -> bool {
    let mut current = match value {
        Value::Object(o) => o.borrow().prototype.clone(),
        Value::Array(a) => a.borrow().object.prototype.clone(),
        _ => None,
    };
    while let Some(proto) = current {
        if found(&proto) {
            return true;
        }
        current = proto.borrow().prototype.clone();
    }
    false
}

/// `own`, if given, is an already-borrowed object checked first (used for
/// arrays, whose own non-index properties live in an embedded `ObjectData`
/// rather than behind another `Rc`); `start` is where the prototype walk
/// continues from.
fn has_own_or_inherited(start: &Option<ObjRef>, key: &str, own: Option<&crate::object::ObjectData>) -> bool {
    if let Some(own) = own {
        if own.get_own(key).is_some() {
            return true;
        }
    }
    let mut current = start.clone();
    while let Some(o) = current {
        let b = o.borrow();
        if matches!(b.get_own(key), Some(PropertySlot::Value(_) | PropertySlot::Accessor { .. })) {
            return true;
        }
        current = b.prototype.clone();
    }
    false
}
