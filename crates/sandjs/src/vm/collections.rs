//! Array/object/regex/closure construction and `for…in`/`for…of` iteration
//! (§3 collections, §9 "Iteration snapshots").
//!
//! The iterator "handle" `FOR_*_INIT` leaves on the stack is an ordinary
//! `Value::Array` holding the remaining snapshot items: reusing the
//! existing array representation means a plain `POP` (emitted by `break`'s
//! unwind) discards it with no VM-side special-casing, and `FOR_*_NEXT`
//! just drains it from the front.

use std::cell::RefCell;
use std::rc::Rc;

use super::VM;
use crate::compiler::code::{CaptureSource, ConstValue};
use crate::exception::RunError;
use crate::function::FunctionValue;
use crate::io::PrintWriter;
use crate::object::{ArrayData, ObjectData, PropertySlot};
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;
use crate::value::Value;

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    pub(super) fn op_build_array(&mut self, n: u16) -> Result<(), RunError> {
        let elements = self.pop_n(n as usize);
        self.tracker.on_allocate(|| elements.len() * std::mem::size_of::<Value>())?;
        self.push(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(elements)))));
        Ok(())
    }

    /// Pops `n` `(key, kind_tag, value)` groups — pushed key-then-tag-then-value
    /// per property, so the last group is on top — and rebuilds them in
    /// source order. `kind_tag` is `0` for a plain property, `1` for a
    /// getter, `2` for a setter; a getter and setter sharing a key arrive as
    /// two separate groups and must merge into one accessor slot.
    pub(super) fn op_build_object(&mut self, n: u16) -> Result<(), RunError> {
        let mut groups = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let value = self.pop();
            let kind_tag = self.pop().to_number() as i32;
            let key = self.pop().to_js_string();
            groups.push((key, kind_tag, value));
        }
        groups.reverse();

        let mut obj = ObjectData::new();
        for (key, tag, value) in groups {
            match tag {
                1 => set_accessor(&mut obj, key, Some(value), None),
                2 => set_accessor(&mut obj, key, None, Some(value)),
                _ => obj.set_data(key, value),
            }
        }
        self.tracker.on_allocate(|| n as usize * std::mem::size_of::<Value>())?;
        self.push(Value::Object(Rc::new(RefCell::new(obj))));
        Ok(())
    }

    pub(super) fn op_build_regex(&mut self, idx: u16) -> Result<(), RunError> {
        let (pattern, flags) = match &self.current_frame().compiled.constants[idx as usize] {
            ConstValue::Regex { pattern, flags } => (Rc::clone(pattern), Rc::clone(flags)),
            _ => unreachable!("BUILD_REGEX must index a Regex constant"),
        };
        let data = crate::regex::vm::RegExpData::compile(Rc::clone(&pattern), Rc::clone(&flags))
            .map_err(|err| self.syntax_error(format!("invalid regular expression /{pattern}/{flags}: {err}")))?;
        self.tracker.on_allocate(|| std::mem::size_of::<crate::regex::vm::RegExpData>())?;
        self.push(Value::RegExp(Rc::new(RefCell::new(data))));
        Ok(())
    }

    pub(super) fn op_make_closure(&mut self, idx: u16) {
        let compiled = match &self.current_frame().compiled.constants[idx as usize] {
            ConstValue::Function(f) => Rc::clone(f),
            _ => unreachable!("MAKE_CLOSURE must index a Function constant"),
        };
        let frame = self.current_frame();
        let closure_cells = compiled
            .capture_sources
            .iter()
            .map(|src| match src {
                CaptureSource::Cell(i) => Rc::clone(&frame.cell_storage[*i as usize]),
                CaptureSource::Closure(i) => Rc::clone(&frame.closure_cells[*i as usize]),
            })
            .collect();
        let captured_this = compiled.is_arrow.then(|| frame.this_value.clone());
        let func = FunctionValue::new_compiled(compiled, closure_cells, captured_this);
        self.push(Value::Function(Rc::new(func)));
    }

    pub(super) fn op_for_in_init(&mut self) -> Result<(), RunError> {
        let obj = self.pop();
        let keys: Vec<Value> = match &obj {
            Value::Array(arr) => {
                let b = arr.borrow();
                let mut keys: Vec<Value> = (0..b.elements.len()).map(|i| Value::String(Rc::from(i.to_string().as_str()))).collect();
                keys.extend(b.object.own_keys().map(|k| Value::String(Rc::clone(k))));
                keys
            }
            Value::Object(o) => o.borrow().own_keys().map(|k| Value::String(Rc::clone(k))).collect(),
            // `for…in` over a primitive enumerates zero own keys.
            _ => Vec::new(),
        };
        self.tracker.on_allocate(|| keys.len() * std::mem::size_of::<Value>())?;
        self.push(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(keys)))));
        Ok(())
    }

    pub(super) fn op_for_of_init(&mut self) -> Result<(), RunError> {
        let obj = self.pop();
        let items: Vec<Value> = match &obj {
            Value::Array(arr) => arr.borrow().elements.clone(),
            Value::String(s) => s.encode_utf16().map(|u| Value::String(Rc::from(String::from_utf16_lossy(&[u])))).collect(),
            _ => return Err(self.type_error(format!("{} is not iterable", obj.to_js_string()))),
        };
        self.tracker.on_allocate(|| items.len() * std::mem::size_of::<Value>())?;
        self.push(Value::Array(Rc::new(RefCell::new(ArrayData::from_vec(items)))));
        Ok(())
    }

    /// Drains one item from the iterator handle sitting on top of the
    /// stack, or pops the (now-exhausted) handle and jumps to `offset`.
    pub(super) fn op_for_next(&mut self, offset: i16) {
        let handle = self.peek(0).clone();
        let Value::Array(arr) = &handle else { unreachable!("FOR_*_NEXT's operand is always the handle FOR_*_INIT pushed") };
        let next = {
            let mut b = arr.borrow_mut();
            if b.elements.is_empty() { None } else { Some(b.elements.remove(0)) }
        };
        match next {
            Some(v) => self.push(v),
            None => {
                self.pop();
                self.apply_jump(offset);
            }
        }
    }
}

fn set_accessor(obj: &mut ObjectData, key: Rc<str>, new_getter: Option<Value>, new_setter: Option<Value>) {
    let (getter, setter) = match obj.get_own(&key) {
        Some(PropertySlot::Accessor { getter, setter }) => (new_getter.or_else(|| getter.clone()), new_setter.or_else(|| setter.clone())),
        _ => (new_getter, new_setter),
    };
    obj.properties.insert(key, PropertySlot::Accessor { getter, setter });
}
