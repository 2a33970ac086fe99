//! The embedding façade (§6), grounded on
//! `original_source/src/mquickjs_python/context.py`'s `Context` class: one
//! object owning the guest globals table plus its tracker/writer, exposing
//! `eval`/`get`/`set` and doing the parse → compile → run pipeline and the
//! host/guest marshalling internally so embedders never see bytecode.

use std::rc::Rc;

use crate::builtins;
use crate::compiler::compile_program;
use crate::exception::JSError;
use crate::io::{PrintWriter, StdPrint};
use crate::marshal::{HostValue, from_host, to_host};
use crate::parser::parse_program;
use crate::resource::{LimitedTracker, NoLimitTracker, ResourceLimits, ResourceTracker};
use crate::tracer::NoopTracer;
use crate::value::{ObjRef, Value};
use crate::vm::VM;

/// A sandboxed guest runtime: one globals table, one resource tracker, one
/// output sink. Every `eval` call drives a fresh [`VM`] over the shared
/// globals (§4.5.1: "One `VM` instance is created per `Context::eval`
/// call"), so guest top-level state (variables, function declarations)
/// persists across calls the way a REPL expects, while VM-local state
/// (the call stack, in-flight exception) never leaks between calls.
pub struct Context<T: ResourceTracker = NoLimitTracker, P: PrintWriter = StdPrint> {
    globals: ObjRef,
    tracker: T,
    writer: P,
    tracer: NoopTracer,
}

impl Context<NoLimitTracker, StdPrint> {
    /// A context with no resource ceilings and output sent to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tracker_and_writer(NoLimitTracker::new(), StdPrint::default())
    }
}

impl Default for Context<NoLimitTracker, StdPrint> {
    fn default() -> Self {
        Self::new()
    }
}

impl Context<LimitedTracker, StdPrint> {
    /// A context that enforces `limits` on every `eval` call, with output
    /// sent to stdout.
    #[must_use]
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self::with_tracker_and_writer(LimitedTracker::new(limits), StdPrint::default())
    }
}

impl<T: ResourceTracker, P: PrintWriter> Context<T, P> {
    /// Builds a context from an arbitrary tracker/writer pair, for
    /// embeddings and tests that want a specific combination (e.g.
    /// `LimitedTracker` with `CollectStringPrint` to assert on captured
    /// output).
    #[must_use]
    pub fn with_tracker_and_writer(tracker: T, writer: P) -> Self {
        Self { globals: builtins::install_globals(), tracker, writer, tracer: NoopTracer }
    }

    /// Parses, compiles, and runs `source` against this context's shared
    /// globals, returning its completion value marshalled to [`HostValue`].
    pub fn eval(&mut self, source: &str) -> Result<HostValue, JSError> {
        let program = parse_program(source)?;
        let compiled = compile_program(&program)?;
        let mut vm = VM::new(Rc::clone(&self.globals), &mut self.tracker, &mut self.writer, &mut self.tracer);
        let result = vm.run(compiled)?;
        Ok(to_host(&result))
    }

    /// Reads a global binding, for host code inspecting state a script set.
    #[must_use]
    pub fn get(&self, name: &str) -> HostValue {
        match self.globals.borrow().get_own(name) {
            Some(crate::object::PropertySlot::Value(v)) => to_host(v),
            _ => HostValue::Undefined,
        }
    }

    /// Installs a global binding the next `eval` call will see, for host
    /// code seeding input data before running a script.
    pub fn set(&mut self, name: &str, value: HostValue) {
        let mut vm = VM::new(Rc::clone(&self.globals), &mut self.tracker, &mut self.writer, &mut self.tracer);
        let converted = from_host(&mut vm, &value);
        self.globals.borrow_mut().set_data(Rc::from(name), converted);
    }
}
