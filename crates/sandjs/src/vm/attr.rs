//! Property access (§3 Object/Array, §9 "Prototype chains"): `GET_PROP`,
//! `SET_PROP`, `DELETE_PROP`, and global `LOAD_NAME`/`STORE_NAME`/`TYPEOF_NAME`.

use std::cell::RefCell;
use std::rc::Rc;

use super::{SubCallOutcome, VM};
use crate::exception::RunError;
use crate::io::PrintWriter;
use crate::object::PropertySlot;
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;
use crate::value::{ArrRef, ObjRef, Value, as_array_index, looks_numeric_but_not_index};

/// A property read's outcome. `Redirected` means a getter threw and the
/// exception was caught by a handler at or above the calling frame — the
/// instruction pointer has already moved there, so the in-flight opcode must
/// not push a value of its own.
pub(super) enum PropResult {
    Value(Value),
    Redirected,
}

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    pub(super) fn op_get_prop(&mut self) -> Result<(), RunError> {
        let key = self.pop();
        let obj = self.pop();
        match self.get_property(&obj, &key)? {
            PropResult::Value(v) => self.push(v),
            PropResult::Redirected => {}
        }
        Ok(())
    }

    pub(super) fn get_property(&mut self, obj: &Value, key: &Value) -> Result<PropResult, RunError> {
        let key_str = key.to_js_string();
        match obj {
            Value::Undefined | Value::Null => {
                Err(self.type_error(format!("cannot read properties of {} (reading '{key_str}')", obj.to_js_string())))
            }
            Value::Array(arr) => self.get_array_property(arr, &key_str),
            Value::String(s) => Ok(PropResult::Value(get_string_property(s, &key_str))),
            Value::Object(o) => self.get_object_property(o, &key_str),
            Value::Function(f) => Ok(PropResult::Value(match key_str.as_ref() {
                "length" => Value::Number(f.param_count as f64),
                "name" => Value::String(Rc::clone(&f.name)),
                "prototype" => Value::Object(Rc::clone(&f.prototype)),
                _ => Value::Undefined,
            })),
            Value::RegExp(r) => {
                let v = {
                    let r = r.borrow();
                    match key_str.as_ref() {
                        "source" => Some(Value::String(Rc::clone(&r.source))),
                        "flags" => Some(Value::String(Rc::clone(&r.flags))),
                        "global" => Some(Value::Boolean(r.global)),
                        "ignoreCase" => Some(Value::Boolean(r.ignore_case)),
                        "multiline" => Some(Value::Boolean(r.multiline)),
                        "unicode" => Some(Value::Boolean(r.unicode)),
                        "sticky" => Some(Value::Boolean(r.sticky)),
                        "dotAll" => Some(Value::Boolean(r.dot_all)),
                        "lastIndex" => Some(Value::Number(f64::from(r.last_index))),
                        _ => None,
                    }
                };
                Ok(PropResult::Value(v.or_else(|| crate::builtins::regexp_method(&key_str)).unwrap_or(Value::Undefined)))
            }
            Value::Boolean(_) => Ok(PropResult::Value(Value::Undefined)),
            Value::Number(_) => Ok(PropResult::Value(crate::builtins::number_method(&key_str).unwrap_or(Value::Undefined))),
            Value::ArrayBuffer(buf) => Ok(PropResult::Value(match key_str.as_ref() {
                "byteLength" => Value::Number(buf.borrow().len() as f64),
                _ => Value::Undefined,
            })),
            Value::TypedArray(ta) => Ok(PropResult::Value(match key_str.as_ref() {
                "length" => Value::Number(ta.borrow().length as f64),
                _ => {
                    if let Some(idx) = as_array_index(&key_str) {
                        read_typed_element(ta, idx as usize)
                    } else {
                        Value::Undefined
                    }
                }
            })),
        }
    }

    fn get_array_property(&mut self, arr: &ArrRef, key: &str) -> Result<PropResult, RunError> {
        if key == "length" {
            return Ok(PropResult::Value(Value::Number(arr.borrow().elements.len() as f64)));
        }
        if let Some(idx) = as_array_index(key) {
            let v = arr.borrow().elements.get(idx as usize).cloned().unwrap_or(Value::Undefined);
            return Ok(PropResult::Value(v));
        }
        let (own, proto) = {
            let b = arr.borrow();
            (b.object.get_own(key).cloned(), b.object.prototype.clone())
        };
        match own {
            Some(PropertySlot::Value(v)) => Ok(PropResult::Value(v)),
            Some(PropertySlot::Accessor { getter, .. }) => self.invoke_getter(getter, Value::Array(Rc::clone(arr))),
            None => match proto {
                Some(p) => self.get_object_property(&p, key),
                None => Ok(PropResult::Value(crate::builtins::array_method(key).unwrap_or(Value::Undefined))),
            },
        }
    }

    pub(super) fn get_object_property(&mut self, obj: &ObjRef, key: &str) -> Result<PropResult, RunError> {
        let mut current = Some(Rc::clone(obj));
        while let Some(o) = current {
            let (slot, proto) = {
                let b = o.borrow();
                (b.get_own(key).cloned(), b.prototype.clone())
            };
            match slot {
                Some(PropertySlot::Value(v)) => return Ok(PropResult::Value(v)),
                Some(PropertySlot::Accessor { getter, .. }) => return self.invoke_getter(getter, Value::Object(o)),
                None => current = proto,
            }
        }
        Ok(PropResult::Value(Value::Undefined))
    }

    fn invoke_getter(&mut self, getter: Option<Value>, receiver: Value) -> Result<PropResult, RunError> {
        let Some(getter) = getter else { return Ok(PropResult::Value(Value::Undefined)) };
        match self.call_and_run(getter, receiver, Vec::new())? {
            SubCallOutcome::Returned(v) => Ok(PropResult::Value(v)),
            SubCallOutcome::Redirected => Ok(PropResult::Redirected),
        }
    }

    pub(super) fn op_set_prop(&mut self) -> Result<(), RunError> {
        let value = self.pop();
        let key = self.pop();
        let obj = self.pop();
        let key_str = key.to_js_string();
        match self.set_property(&obj, &key_str, value.clone())? {
            PropResult::Value(_) => self.push(value),
            PropResult::Redirected => {}
        }
        Ok(())
    }

    fn set_property(&mut self, obj: &Value, key: &str, value: Value) -> Result<PropResult, RunError> {
        match obj {
            Value::Undefined | Value::Null => {
                Err(self.type_error(format!("cannot set properties of {} (setting '{key}')", obj.to_js_string())))
            }
            Value::Array(arr) => self.set_array_property(arr, key, value),
            Value::Object(o) => self.set_object_property(o, key, value),
            Value::RegExp(r) if key == "lastIndex" => {
                r.borrow_mut().last_index = value.to_number().max(0.0) as u32;
                Ok(PropResult::Value(Value::Undefined))
            }
            // Strings, functions, regexes (other than `lastIndex`), booleans,
            // numbers and buffers have no writable own-property storage at
            // the core-VM layer; an assignment to one silently has no
            // effect, matching the compiler's treatment of assignment as
            // always yielding the assigned value regardless of whether
            // anything was stored.
            _ => Ok(PropResult::Value(Value::Undefined)),
        }
    }

    fn set_array_property(&mut self, arr: &ArrRef, key: &str, value: Value) -> Result<PropResult, RunError> {
        if key == "length" {
            let Value::Number(n) = value else {
                return Err(self.range_error("invalid array length"));
            };
            if n < 0.0 || n.fract() != 0.0 || n > f64::from(u32::MAX) {
                return Err(self.range_error("invalid array length"));
            }
            arr.borrow_mut().set_length(n as usize);
            return Ok(PropResult::Value(Value::Undefined));
        }
        if let Some(idx) = as_array_index(key) {
            let len = arr.borrow().elements.len();
            let idx = idx as usize;
            if idx > len {
                return Err(self.type_error(format!("index {idx} out of bounds for array of length {len}")));
            }
            if idx == len {
                self.tracker.on_allocate(|| std::mem::size_of::<Value>())?;
                arr.borrow_mut().elements.push(value);
            } else {
                arr.borrow_mut().elements[idx] = value;
            }
            return Ok(PropResult::Value(Value::Undefined));
        }
        if looks_numeric_but_not_index(key) {
            return Err(self.type_error(format!("{key} is not a valid array index")));
        }
        let own = arr.borrow().object.get_own(key).cloned();
        match own {
            Some(PropertySlot::Accessor { setter: Some(setter), .. }) => {
                return self.invoke_setter(setter, Value::Array(Rc::clone(arr)), value);
            }
            Some(PropertySlot::Accessor { setter: None, .. }) => {
                return Err(self.type_error(format!("cannot set property {key} which has only a getter")));
            }
            Some(PropertySlot::Value(_)) | None => {}
        }
        if own.is_none() {
            let proto = arr.borrow().object.prototype.clone();
            match self.find_setter(proto, key) {
                Some(SetterLookup::Setter(setter)) => return self.invoke_setter(setter, Value::Array(Rc::clone(arr)), value),
                Some(SetterLookup::NoSetter) => {
                    return Err(self.type_error(format!("cannot set property {key} which has only a getter")));
                }
                None => {}
            }
        }
        arr.borrow_mut().object.set_data(Rc::from(key), value);
        Ok(PropResult::Value(Value::Undefined))
    }

    fn set_object_property(&mut self, obj: &ObjRef, key: &str, value: Value) -> Result<PropResult, RunError> {
        match self.find_setter(Some(Rc::clone(obj)), key) {
            Some(SetterLookup::Setter(setter)) => self.invoke_setter(setter, Value::Object(Rc::clone(obj)), value),
            Some(SetterLookup::NoSetter) => Err(self.type_error(format!("cannot set property {key} which has only a getter"))),
            None => {
                obj.borrow_mut().set_data(Rc::from(key), value);
                Ok(PropResult::Value(Value::Undefined))
            }
        }
    }

    /// Walks `start`'s prototype chain looking for the first descriptor (own
    /// or inherited) named `key`. A plain data descriptor anywhere in the
    /// chain means an ordinary own-property write on the receiver (`None`);
    /// only an accessor intercepts the assignment.
    fn find_setter(&self, start: Option<ObjRef>, key: &str) -> Option<SetterLookup> {
        let mut current = start;
        while let Some(o) = current {
            let b = o.borrow();
            match b.get_own(key) {
                Some(PropertySlot::Accessor { setter: Some(setter), .. }) => return Some(SetterLookup::Setter(setter.clone())),
                Some(PropertySlot::Accessor { setter: None, .. }) => return Some(SetterLookup::NoSetter),
                Some(PropertySlot::Value(_)) => return None,
                None => current = b.prototype.clone(),
            }
        }
        None
    }

    fn invoke_setter(&mut self, setter: Value, receiver: Value, value: Value) -> Result<PropResult, RunError> {
        match self.call_and_run(setter, receiver, vec![value])? {
            SubCallOutcome::Returned(_) => Ok(PropResult::Value(Value::Undefined)),
            SubCallOutcome::Redirected => Ok(PropResult::Redirected),
        }
    }

    pub(super) fn op_delete_prop(&mut self) -> Result<(), RunError> {
        let key = self.pop();
        let obj = self.pop();
        let key_str = key.to_js_string();
        let deleted = match &obj {
            Value::Array(arr) => {
                if key_str == "length" {
                    false
                } else if let Some(idx) = as_array_index(&key_str) {
                    // No sparse arrays: "deleting" an index just clears it
                    // to `undefined` rather than creating a hole.
                    let mut b = arr.borrow_mut();
                    if (idx as usize) < b.elements.len() {
                        b.elements[idx as usize] = Value::Undefined;
                    }
                    true
                } else {
                    arr.borrow_mut().object.delete(&key_str)
                }
            }
            Value::Object(o) => o.borrow_mut().delete(&key_str),
            _ => true,
        };
        self.push(Value::Boolean(deleted));
        Ok(())
    }

    pub(super) fn op_load_name(&mut self, idx: u16) -> Result<(), RunError> {
        let name = self.const_name(idx);
        match self.lookup_global(&name) {
            Some(v) => {
                self.push(v);
                Ok(())
            }
            None => Err(self.reference_error(format!("{name} is not defined"))),
        }
    }

    pub(super) fn op_store_name(&mut self, idx: u16) -> Result<(), RunError> {
        let name = self.const_name(idx);
        let value = self.pop();
        if self.globals().borrow().get_own(&name).is_none() {
            return Err(self.reference_error(format!("{name} is not defined")));
        }
        self.globals().borrow_mut().set_data(name, value);
        Ok(())
    }

    pub(super) fn op_typeof_name(&mut self, idx: u16) {
        let name = self.const_name(idx);
        let tag = self.lookup_global(&name).map_or("undefined", |v| v.type_tag().as_str());
        self.push(Value::String(Rc::from(tag)));
    }

    fn lookup_global(&self, name: &str) -> Option<Value> {
        self.globals().borrow().get_own(name).map(|slot| match slot {
            PropertySlot::Value(v) => v.clone(),
            // The globals object is plain data storage; accessors are never
            // installed on it.
            PropertySlot::Accessor { .. } => Value::Undefined,
        })
    }
}

enum SetterLookup {
    Setter(Value),
    NoSetter,
}

fn get_string_property(s: &Rc<str>, key: &str) -> Value {
    if key == "length" {
        return Value::Number(s.encode_utf16().count() as f64);
    }
    if let Some(idx) = as_array_index(key) {
        let units: Vec<u16> = s.encode_utf16().collect();
        return units.get(idx as usize).map_or(Value::Undefined, |&u| Value::String(Rc::from(String::from_utf16_lossy(&[u]))));
    }
    crate::builtins::string_method(key).unwrap_or(Value::Undefined)
}

fn read_typed_element(ta: &Rc<RefCell<crate::value::TypedArrayData>>, idx: usize) -> Value {
    use crate::value::TypedArrayKind as K;
    let ta = ta.borrow();
    if idx >= ta.length {
        return Value::Undefined;
    }
    let buf = ta.buffer.borrow();
    let elem_size = typed_elem_size(ta.element_kind);
    let offset = ta.byte_offset + idx * elem_size;
    let Some(bytes) = buf.get(offset..offset + elem_size) else { return Value::Undefined };
    let n = match ta.element_kind {
        K::Int8 => f64::from(bytes[0] as i8),
        K::Uint8 => f64::from(bytes[0]),
        K::Int16 => f64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        K::Uint16 => f64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
        K::Int32 => f64::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        K::Uint32 => f64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        K::Float32 => f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        K::Float64 => f64::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]),
    };
    Value::Number(n)
}

fn typed_elem_size(kind: crate::value::TypedArrayKind) -> usize {
    use crate::value::TypedArrayKind as K;
    match kind {
        K::Int8 | K::Uint8 => 1,
        K::Int16 | K::Uint16 => 2,
        K::Int32 | K::Uint32 | K::Float32 => 4,
        K::Float64 => 8,
    }
}
