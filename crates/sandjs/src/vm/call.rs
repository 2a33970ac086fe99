//! Call frame setup, `CALL`/`CALL_METHOD`/`NEW`/`RETURN`, and the
//! [`HostContext`] a native built-in uses to call back into the guest.

use std::rc::Rc;

use super::{Frame, SubCallOutcome, VM};
use crate::compiler::code::CompiledFunction;
use crate::exception::RunError;
use crate::function::{Cell, FunctionKind, HostContext, new_cell};
use crate::io::PrintWriter;
use crate::object::ObjectData;
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;
use crate::value::{FuncRef, Value};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// Dispatches a call through whichever `FunctionKind` `callee` holds.
    /// Compiled callees push a frame the surrounding dispatch loop then
    /// drives; native and bound callees complete synchronously here.
    pub(super) fn do_call(&mut self, callee: Value, this: Value, args: Vec<Value>) -> Result<(), RunError> {
        let Value::Function(f) = callee else {
            return Err(self.type_error(format!("{} is not a function", callee.to_js_string())));
        };
        self.call_function(&f, this, args, false)
    }

    fn call_function(&mut self, f: &FuncRef, this: Value, args: Vec<Value>, is_new: bool) -> Result<(), RunError> {
        match &f.kind {
            FunctionKind::Compiled { compiled, closure_cells, captured_this } => {
                let this = captured_this.clone().unwrap_or(this);
                self.call_compiled(Rc::clone(compiled), closure_cells.clone(), this, args, is_new)
            }
            FunctionKind::Native(native) => {
                let native = Rc::clone(native);
                let result = native.call(self, this, &args)?;
                self.push(result);
                Ok(())
            }
            FunctionKind::Bound { target, bound_this, bound_args } => {
                let mut full_args = bound_args.clone();
                full_args.extend(args);
                let target = target.clone();
                let bound_this = bound_this.clone();
                self.do_call(target, bound_this, full_args)
            }
        }
    }

    /// Pushes a new frame for a compiled function: binds parameters,
    /// materializes `arguments`, and boxes every locally-captured slot into
    /// `cell_storage` (§4.5, §9).
    pub(super) fn call_compiled(
        &mut self,
        compiled: Rc<CompiledFunction>,
        closure_cells: Vec<Cell>,
        this_value: Value,
        args: Vec<Value>,
        is_constructor_call: bool,
    ) -> Result<(), RunError> {
        self.tracker.check_recursion_depth(self.frames.len() + 1)?;

        let num_locals = compiled.num_locals as usize;
        let mut locals = vec![Value::Undefined; num_locals];
        for (slot, value) in args.iter().take(compiled.param_count).enumerate() {
            locals[slot] = value.clone();
        }
        if compiled.param_count < num_locals {
            // Scope analysis always reserves the slot right after the
            // parameters for `arguments`, a snapshot of every argument
            // passed regardless of declared arity.
            locals[compiled.param_count] = self.new_array_value(args)?;
        }

        let cell_storage: Vec<Cell> = compiled.cell_slots.iter().map(|&slot| new_cell(locals[slot as usize].clone())).collect();

        let base = self.stack.len();
        self.tracer.on_call(&compiled.name, self.frames.len() + 1);
        self.frames.push(Frame { compiled, ip: 0, base, locals, cell_storage, closure_cells, this_value, is_constructor_call });
        Ok(())
    }

    fn new_array_value(&mut self, elements: Vec<Value>) -> Result<Value, RunError> {
        let len = elements.len();
        self.tracker.on_allocate(|| len * std::mem::size_of::<Value>())?;
        Ok(Value::Array(Rc::new(std::cell::RefCell::new(crate::object::ArrayData::from_vec(elements)))))
    }

    pub(super) fn op_call_method(&mut self, obj: &Value, key: &Value, args: Vec<Value>) -> Result<(), RunError> {
        match self.get_property(obj, key)? {
            super::attr::PropResult::Value(callee) => self.do_call(callee, obj.clone(), args),
            super::attr::PropResult::Redirected => Ok(()),
        }
    }

    pub(super) fn op_new(&mut self, callee: Value, args: Vec<Value>) -> Result<(), RunError> {
        let Value::Function(f) = callee else {
            return Err(self.type_error(format!("{} is not a constructor", callee.to_js_string())));
        };
        let new_this = Value::Object(Rc::new(std::cell::RefCell::new(ObjectData::with_prototype(Some(Rc::clone(&f.prototype))))));
        self.call_function(&f, new_this, args, true)
    }

    pub(super) fn do_return(&mut self, mut result: Value) {
        let frame = self.frames.pop().expect("RETURN with no active frame");
        let depth = self.frames.len();
        while self.handlers.last().is_some_and(|h| h.frame_depth == depth) {
            // A `try` block was exited via `return` rather than falling
            // through `TRY_END`; its handler registration would otherwise
            // dangle and could be mismatched against a later, unrelated
            // frame that happens to reuse this depth.
            self.handlers.pop();
        }
        self.stack.truncate(frame.base);
        if frame.is_constructor_call && !matches!(result, Value::Object(_) | Value::Array(_)) {
            result = frame.this_value;
        }
        self.tracer.on_return(depth);
        self.push(result);
    }
}

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> HostContext for VM<'_, T, P, Tr> {
    fn call_value(&mut self, callee: &Value, this: Value, args: &[Value]) -> Result<Value, RunError> {
        match self.call_and_run(callee.clone(), this, args.to_vec())? {
            SubCallOutcome::Returned(v) => Ok(v),
            // The callback's exception was caught by a handler above our own
            // call site; there is no well-formed value to hand back to the
            // native caller, so surface the (already uncatchable-by-design)
            // situation as a fresh, unhandled propagation instead of risking
            // a native built-in silently continuing past a live exception.
            SubCallOutcome::Redirected => Err(self.type_error("callback exception escaped its call site")),
        }
    }

    fn console_log(&mut self, parts: &[Value]) -> Result<(), RunError> {
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                self.writer_mut().stdout_push(' ')?;
            }
            self.writer_mut().stdout_write(std::borrow::Cow::Owned(part.to_js_string().to_string()))?;
        }
        self.writer_mut().stdout_push('\n')
    }

    fn new_array(&mut self, elements: Vec<Value>) -> Result<Value, RunError> {
        self.new_array_value(elements)
    }

    fn new_object(&mut self) -> Result<Value, RunError> {
        self.tracker.on_allocate(|| std::mem::size_of::<ObjectData>())?;
        Ok(VM::new_object(self))
    }

    fn type_error(&self, message: impl Into<String>) -> RunError {
        VM::type_error(self, message)
    }

    fn range_error(&self, message: impl Into<String>) -> RunError {
        VM::range_error(self, message)
    }

    fn resource_tracker(&mut self) -> &mut dyn ResourceTracker {
        self.tracker
    }
}
