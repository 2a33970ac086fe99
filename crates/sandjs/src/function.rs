//! Compiled function values, closure cells, and host-provided callables.
//!
//! Closure capture is re-architected from the source's environment-chain
//! model (§9): every captured local becomes a heap-allocated single-slot
//! box (`Cell`); a frame owns the boxes for the locals its own inner
//! functions capture (`cell_storage`), and a closure created from that
//! frame stores shared references to exactly the boxes its `free_vars`
//! name. Cells are never duplicated on capture — aliasing is how nested
//! closures observe each other's writes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::compiler::code::CompiledFunction;
use crate::exception::RunError;
use crate::object::ObjectData;
use crate::resource::ResourceTracker;
use crate::value::{ObjRef, Value};

/// A one-slot heap box holding a captured local.
pub type Cell = Rc<RefCell<Value>>;

#[must_use]
pub fn new_cell(initial: Value) -> Cell {
    Rc::new(RefCell::new(initial))
}

/// Anything the VM can call through `CALL`/`CALL_METHOD`/`NEW` without
/// itself being a compiled closure. Kept trait-object-safe so `Value`
/// itself never needs to be generic over the VM's tracker/writer/tracer
/// type parameters.
pub trait HostContext {
    /// Invoke a guest-visible value as a function (used by e.g.
    /// `Array#map`'s callback argument).
    fn call_value(&mut self, callee: &Value, this: Value, args: &[Value]) -> Result<Value, RunError>;

    /// Write one line to the configured `PrintWriter` (used by `console.log`).
    fn console_log(&mut self, parts: &[Value]) -> Result<(), RunError>;

    /// Allocate a fresh array value, subject to resource accounting.
    fn new_array(&mut self, elements: Vec<Value>) -> Result<Value, RunError>;

    /// Allocate a fresh plain object value, subject to resource accounting.
    fn new_object(&mut self) -> Result<Value, RunError>;

    fn type_error(&self, message: impl Into<String>) -> RunError;
    fn range_error(&self, message: impl Into<String>) -> RunError;

    /// The context's resource tracker, for built-ins that must account for
    /// their own allocations or forward it into the regex engine (`RegExp`
    /// `test`/`exec`, `String#replace`/`match`).
    fn resource_tracker(&mut self) -> &mut dyn ResourceTracker;
}

pub trait NativeFn {
    fn call(&self, host: &mut dyn HostContext, this: Value, args: &[Value]) -> Result<Value, RunError>;
}

impl<F> NativeFn for F
where
    F: Fn(&mut dyn HostContext, Value, &[Value]) -> Result<Value, RunError>,
{
    fn call(&self, host: &mut dyn HostContext, this: Value, args: &[Value]) -> Result<Value, RunError> {
        self(host, this, args)
    }
}

pub enum FunctionKind {
    Compiled {
        compiled: Rc<CompiledFunction>,
        closure_cells: Vec<Cell>,
        /// Arrow functions have no `this` binding of their own; the
        /// compiler marks them so `MAKE_CLOSURE` freezes the defining
        /// frame's `this` here instead of letting the call site supply one.
        captured_this: Option<Value>,
    },
    Native(Rc<dyn NativeFn>),
    Bound { target: Value, bound_this: Value, bound_args: Vec<Value> },
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Compiled { compiled, .. } => write!(f, "Compiled({})", compiled.name),
            FunctionKind::Native(_) => write!(f, "Native"),
            FunctionKind::Bound { .. } => write!(f, "Bound"),
        }
    }
}

/// A callable value: compiled closure, native built-in, or bound function.
#[derive(Debug)]
pub struct FunctionValue {
    pub kind: FunctionKind,
    pub name: Rc<str>,
    /// Parameter count, used for `.length`. Bound functions report the
    /// target's arity minus the number of prepended arguments (floored at 0).
    pub param_count: usize,
    pub prototype: ObjRef,
}

impl FunctionValue {
    #[must_use]
    pub fn new_compiled(compiled: Rc<CompiledFunction>, closure_cells: Vec<Cell>, captured_this: Option<Value>) -> Self {
        let name = Rc::clone(&compiled.name);
        let param_count = compiled.param_count;
        let prototype_obj = Rc::new(RefCell::new(ObjectData::new()));
        Self { kind: FunctionKind::Compiled { compiled, closure_cells, captured_this }, name, param_count, prototype: prototype_obj }
    }

    #[must_use]
    pub fn new_native(name: &str, param_count: usize, f: Rc<dyn NativeFn>) -> Self {
        Self {
            kind: FunctionKind::Native(f),
            name: Rc::from(name),
            param_count,
            prototype: Rc::new(RefCell::new(ObjectData::new())),
        }
    }

    #[must_use]
    pub fn new_bound(target: Value, bound_this: Value, bound_args: Vec<Value>, name: Rc<str>, param_count: usize) -> Self {
        Self {
            kind: FunctionKind::Bound { target, bound_this, bound_args },
            name,
            param_count,
            prototype: Rc::new(RefCell::new(ObjectData::new())),
        }
    }

    #[must_use]
    pub fn compiled(&self) -> Option<&Rc<CompiledFunction>> {
        match &self.kind {
            FunctionKind::Compiled { compiled, .. } => Some(compiled),
            _ => None,
        }
    }
}
