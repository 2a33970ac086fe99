//! Bytecode virtual machine (§4.5), grounded on `ouros::bytecode::vm`: a
//! stack-based interpreter with a shared operand stack, a call-frame stack,
//! and a global exception-handler stack of `(frame_depth, catch_ip)` pairs.
//!
//! Split by concern across sibling files the way the teacher splits its own
//! (much larger) VM: `call` (frame setup, `CALL`/`NEW`/`RETURN`), `attr`
//! (property get/set/delete, `LOAD_NAME`/`STORE_NAME`), `binary` (arithmetic
//! and bitwise opcodes), `compare` (relational/equality/`instanceof`/`in`),
//! `collections` (array/object construction, `for…in`/`for…of`), and
//! `exceptions` (`THROW`/`TRY_START`/`TRY_END`/`CATCH`).

mod attr;
mod binary;
mod call;
mod collections;
mod compare;
mod exceptions;

use std::rc::Rc;

use crate::compiler::code::{CompiledFunction, ConstValue};
use crate::compiler::op::Opcode;
use crate::exception::{CodeLoc, RunError};
use crate::function::Cell;
use crate::io::PrintWriter;
use crate::object::ObjectData;
use crate::resource::ResourceTracker;
use crate::tracer::VmTracer;
use crate::value::{ObjRef, Value};

/// Every `N` dispatched opcodes the wall-clock deadline is polled (§5).
const TIME_POLL_INTERVAL: u64 = 1024;

/// One call activation: instruction pointer, locals, this frame's own
/// captured-local cells, the closure's forwarded cells, and `this`.
struct Frame {
    compiled: Rc<CompiledFunction>,
    ip: usize,
    /// Operand-stack depth at frame entry; `RETURN` truncates back to this.
    base: usize,
    locals: Vec<Value>,
    cell_storage: Vec<Cell>,
    closure_cells: Vec<Cell>,
    this_value: Value,
    is_constructor_call: bool,
}

/// A live `TRY_START` registration: where to resume and how far to unwind
/// the operand stack and call stack when an exception reaches it.
struct HandlerEntry {
    frame_depth: usize,
    catch_ip: usize,
    stack_depth: usize,
}

/// Outcome of a synchronous reentrant call (used for accessor invocation):
/// either the callee ran to completion and produced a value, or an
/// exception it raised was caught by a handler at or above our own calling
/// frame, in which case the instruction pointer has already been
/// repositioned there and the in-flight opcode must not push anything.
pub(super) enum SubCallOutcome {
    Returned(Value),
    Redirected,
}

/// `VM<'a, T, P, Tr>` is generic over the resource tracker, output writer,
/// and tracer exactly the way `ouros::bytecode::vm::VM` is, so a
/// `NoopTracer` + `StdPrint` instantiation monomorphizes all tracing away.
pub struct VM<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer> {
    frames: Vec<Frame>,
    stack: Vec<Value>,
    handlers: Vec<HandlerEntry>,
    globals: ObjRef,
    pending_exception: Option<Value>,
    op_count: u64,
    tracker: &'a mut T,
    writer: &'a mut P,
    tracer: &'a mut Tr,
}

impl<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'a, T, P, Tr> {
    #[must_use]
    pub fn new(globals: ObjRef, tracker: &'a mut T, writer: &'a mut P, tracer: &'a mut Tr) -> Self {
        Self { frames: Vec::new(), stack: Vec::new(), handlers: Vec::new(), globals, pending_exception: None, op_count: 0, tracker, writer, tracer }
    }

    #[must_use]
    pub fn globals(&self) -> &ObjRef {
        &self.globals
    }

    pub(super) fn writer_mut(&mut self) -> &mut P {
        self.writer
    }

    /// Runs a compiled program (or any parameterless compiled function) to
    /// completion: one host call enters the VM and it executes until
    /// `return`, an uncaught throw, or a resource-limit breach (§5).
    pub fn run(&mut self, program: Rc<CompiledFunction>) -> Result<Value, RunError> {
        self.call_compiled(program, Vec::new(), Value::Undefined, Vec::new(), false)?;
        loop {
            if let Err(err) = self.execute_one() {
                self.handle_exception(err)?;
            }
            if self.frames.is_empty() {
                return Ok(self.stack.pop().unwrap_or(Value::Undefined));
            }
        }
    }

    /// Drives a freshly pushed callee frame to completion, for reentrant
    /// calls made mid-instruction (property getters/setters). Native/bound
    /// callees complete synchronously in `do_call` with no frame pushed.
    pub(super) fn call_and_run(&mut self, callee: Value, this: Value, args: Vec<Value>) -> Result<SubCallOutcome, RunError> {
        let floor = self.frames.len();
        self.do_call(callee, this, args)?;
        if self.frames.len() == floor {
            return Ok(SubCallOutcome::Returned(self.pop()));
        }
        loop {
            if let Err(err) = self.execute_one() {
                if let Err(final_err) = self.handle_exception(err) {
                    return Err(final_err);
                }
            }
            if self.frames.len() < floor {
                return Ok(SubCallOutcome::Redirected);
            }
            if self.frames.len() == floor {
                return Ok(SubCallOutcome::Returned(self.pop()));
            }
        }
    }

    fn execute_one(&mut self) -> Result<(), RunError> {
        self.op_count += 1;
        if self.op_count % TIME_POLL_INTERVAL == 0 {
            self.tracker.check_time()?;
        }
        self.tracker.tick_operation()?;

        let ip = self.current_frame().ip;
        let opcode = self.fetch_opcode();
        let depth = self.stack.len();
        self.tracer.on_instruction(ip, opcode, depth);

        match opcode {
            Opcode::Pop => {
                self.pop();
            }
            Opcode::Dup => {
                let v = self.peek(0).clone();
                self.push(v);
            }
            Opcode::Dup2 => {
                let b = self.peek(0).clone();
                let a = self.peek(1).clone();
                self.push(a);
                self.push(b);
            }
            Opcode::Swap => {
                let len = self.stack.len();
                self.stack.swap(len - 1, len - 2);
            }
            Opcode::Rot3 => {
                let len = self.stack.len();
                self.stack[len - 3..].rotate_left(1);
            }
            Opcode::Rot4 => {
                let len = self.stack.len();
                self.stack[len - 4..].rotate_left(1);
            }
            Opcode::LoadConst => {
                let idx = self.fetch_u16();
                let v = self.const_value(idx);
                self.push(v);
            }
            Opcode::LoadUndefined => self.push(Value::Undefined),
            Opcode::LoadNull => self.push(Value::Null),
            Opcode::LoadTrue => self.push(Value::Boolean(true)),
            Opcode::LoadFalse => self.push(Value::Boolean(false)),
            Opcode::LoadThis => {
                let v = self.current_frame().this_value.clone();
                self.push(v);
            }
            Opcode::LoadLocal => {
                let slot = self.fetch_u8();
                let v = self.current_frame().locals[slot as usize].clone();
                self.push(v);
            }
            Opcode::StoreLocal => {
                let slot = self.fetch_u8();
                let v = self.pop();
                self.current_frame_mut().locals[slot as usize] = v;
            }
            Opcode::LoadName => {
                let idx = self.fetch_u16();
                self.op_load_name(idx)?;
            }
            Opcode::StoreName => {
                let idx = self.fetch_u16();
                self.op_store_name(idx)?;
            }
            Opcode::LoadCell => {
                let slot = self.fetch_u8();
                let v = self.current_frame().cell_storage[slot as usize].borrow().clone();
                self.push(v);
            }
            Opcode::StoreCell => {
                let slot = self.fetch_u8();
                let v = self.pop();
                *self.current_frame().cell_storage[slot as usize].borrow_mut() = v;
            }
            Opcode::LoadClosure => {
                let slot = self.fetch_u8();
                let v = self.current_frame().closure_cells[slot as usize].borrow().clone();
                self.push(v);
            }
            Opcode::StoreClosure => {
                let slot = self.fetch_u8();
                let v = self.pop();
                *self.current_frame().closure_cells[slot as usize].borrow_mut() = v;
            }
            Opcode::GetProp => self.op_get_prop()?,
            Opcode::SetProp => self.op_set_prop()?,
            Opcode::DeleteProp => self.op_delete_prop()?,
            Opcode::BuildArray => {
                let n = self.fetch_u16();
                self.op_build_array(n)?;
            }
            Opcode::BuildObject => {
                let n = self.fetch_u16();
                self.op_build_object(n)?;
            }
            Opcode::BuildRegex => {
                let idx = self.fetch_u16();
                self.op_build_regex(idx)?;
            }
            Opcode::MakeClosure => {
                let idx = self.fetch_u16();
                self.op_make_closure(idx);
            }
            Opcode::Add => self.op_add()?,
            Opcode::Sub => self.op_numeric(|a, b| a - b),
            Opcode::Mul => self.op_numeric(|a, b| a * b),
            Opcode::Div => self.op_numeric(|a, b| a / b),
            Opcode::Mod => self.op_numeric(f64::rem_euclid_js),
            Opcode::Pow => self.op_numeric(f64::powf),
            Opcode::Neg => {
                let v = Value::Number(-self.pop().to_number());
                self.push(v);
            }
            Opcode::Pos => {
                let v = Value::Number(self.pop().to_number());
                self.push(v);
            }
            Opcode::Inc => {
                let v = Value::Number(self.pop().to_number() + 1.0);
                self.push(v);
            }
            Opcode::Dec => {
                let v = Value::Number(self.pop().to_number() - 1.0);
                self.push(v);
            }
            Opcode::BAnd => self.op_int32(|a, b| a & b),
            Opcode::BOr => self.op_int32(|a, b| a | b),
            Opcode::BXor => self.op_int32(|a, b| a ^ b),
            Opcode::BNot => {
                let v = Value::Number(f64::from(!self.pop().to_int32()));
                self.push(v);
            }
            Opcode::Shl => self.op_shift(|a, b| a.wrapping_shl(b)),
            Opcode::Shr => self.op_shift(|a, b| a.wrapping_shr(b)),
            Opcode::UShr => self.op_ushr(),
            Opcode::Lt => self.op_relational(|o| o == Some(std::cmp::Ordering::Less)),
            Opcode::Le => self.op_relational(|o| matches!(o, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal))),
            Opcode::Gt => self.op_relational(|o| o == Some(std::cmp::Ordering::Greater)),
            Opcode::Ge => self.op_relational(|o| matches!(o, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal))),
            Opcode::Eq => {
                let (a, b) = self.pop2();
                self.push(Value::Boolean(a.loose_eq(&b)));
            }
            Opcode::Ne => {
                let (a, b) = self.pop2();
                self.push(Value::Boolean(!a.loose_eq(&b)));
            }
            Opcode::Seq => {
                let (a, b) = self.pop2();
                self.push(Value::Boolean(a.strict_eq(&b)));
            }
            Opcode::Sne => {
                let (a, b) = self.pop2();
                self.push(Value::Boolean(!a.strict_eq(&b)));
            }
            Opcode::Not => {
                let v = Value::Boolean(!self.pop().to_boolean());
                self.push(v);
            }
            Opcode::Typeof => {
                let v = self.pop();
                self.push(Value::String(Rc::from(v.type_tag().as_str())));
            }
            Opcode::TypeofName => {
                let idx = self.fetch_u16();
                self.op_typeof_name(idx);
            }
            Opcode::Instanceof => self.op_instanceof()?,
            Opcode::In => self.op_in()?,
            Opcode::Jump => {
                let offset = self.fetch_i16();
                self.apply_jump(offset);
            }
            Opcode::JumpIfFalse => {
                let offset = self.fetch_i16();
                if !self.pop().to_boolean() {
                    self.apply_jump(offset);
                }
            }
            Opcode::JumpIfTrue => {
                let offset = self.fetch_i16();
                if self.pop().to_boolean() {
                    self.apply_jump(offset);
                }
            }
            Opcode::Call => {
                let argc = self.fetch_u8();
                let args = self.pop_n(argc as usize);
                let callee = self.pop();
                self.do_call(callee, Value::Undefined, args)?;
            }
            Opcode::CallMethod => {
                let argc = self.fetch_u8();
                let args = self.pop_n(argc as usize);
                let key = self.pop();
                let obj = self.pop();
                self.op_call_method(&obj, &key, args)?;
            }
            Opcode::New => {
                let argc = self.fetch_u8();
                let args = self.pop_n(argc as usize);
                let callee = self.pop();
                self.op_new(callee, args)?;
            }
            Opcode::Return => {
                let v = self.pop();
                self.do_return(v);
            }
            Opcode::ReturnUndefined => self.do_return(Value::Undefined),
            Opcode::Throw => {
                let v = self.pop();
                return Err(RunError::thrown(v));
            }
            Opcode::TryStart => {
                let offset = self.fetch_i16();
                self.op_try_start(offset);
            }
            Opcode::TryEnd => {
                self.handlers.pop();
            }
            Opcode::Catch => {
                let v = self.pending_exception.take().unwrap_or(Value::Undefined);
                self.push(v);
            }
            Opcode::ForInInit => self.op_for_in_init()?,
            Opcode::ForInNext => {
                let offset = self.fetch_i16();
                self.op_for_next(offset);
            }
            Opcode::ForOfInit => self.op_for_of_init()?,
            Opcode::ForOfNext => {
                let offset = self.fetch_i16();
                self.op_for_next(offset);
            }
        }
        Ok(())
    }

    // ---- frame / stack plumbing ----

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    fn fetch_opcode(&mut self) -> Opcode {
        let frame = self.current_frame_mut();
        let byte = frame.compiled.bytecode[frame.ip];
        frame.ip += 1;
        // SAFETY-free: every byte written by `CodeBuilder` is a valid
        // `Opcode` discriminant, so this transmute-free decode is exact.
        opcode_from_u8(byte)
    }

    fn fetch_u8(&mut self) -> u8 {
        let frame = self.current_frame_mut();
        let b = frame.compiled.bytecode[frame.ip];
        frame.ip += 1;
        b
    }

    fn fetch_u16(&mut self) -> u16 {
        let frame = self.current_frame_mut();
        let lo = frame.compiled.bytecode[frame.ip];
        let hi = frame.compiled.bytecode[frame.ip + 1];
        frame.ip += 2;
        u16::from_le_bytes([lo, hi])
    }

    fn fetch_i16(&mut self) -> i16 {
        self.fetch_u16() as i16
    }

    /// Applies a relative jump offset; `fetch_i16` has already advanced `ip`
    /// past the operand, matching `CodeBuilder::patch_jump_to`'s
    /// `target - label - 3` convention.
    fn apply_jump(&mut self, offset: i16) {
        let frame = self.current_frame_mut();
        frame.ip = (frame.ip as i64 + i64::from(offset)) as usize;
    }

    fn const_value(&self, idx: u16) -> Value {
        match &self.current_frame().compiled.constants[idx as usize] {
            ConstValue::Number(n) => Value::Number(*n),
            ConstValue::Str(s) => Value::String(Rc::clone(s)),
            ConstValue::Name(_) | ConstValue::Function(_) | ConstValue::Regex { .. } => {
                unreachable!("LOAD_CONST only ever indexes a Number or Str constant")
            }
        }
    }

    fn const_name(&self, idx: u16) -> Rc<str> {
        match &self.current_frame().compiled.constants[idx as usize] {
            ConstValue::Name(s) => Rc::clone(s),
            _ => unreachable!("name-indexed opcode must index a Name constant"),
        }
    }

    pub(super) fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    pub(super) fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn pop2(&mut self) -> (Value, Value) {
        let b = self.pop();
        let a = self.pop();
        (a, b)
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let start = self.stack.len() - n;
        self.stack.split_off(start)
    }

    fn peek(&self, back: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - back]
    }

    fn current_loc(&self) -> Option<CodeLoc> {
        let frame = self.frames.last()?;
        frame.compiled.location_at(frame.ip).map(|(line, column)| CodeLoc { line, column })
    }

    fn attach_loc(&self, err: RunError) -> RunError {
        let Some(loc) = self.current_loc() else { return err };
        match err {
            RunError::Exc(exc) => RunError::Exc(exc.with_loc(loc)),
            RunError::Uncatchable(exc) => RunError::Uncatchable(exc.with_loc(loc)),
        }
    }

    pub(super) fn type_error(&self, message: impl Into<String>) -> RunError {
        self.attach_loc(RunError::type_error(message))
    }

    pub(super) fn range_error(&self, message: impl Into<String>) -> RunError {
        self.attach_loc(RunError::range_error(message))
    }

    pub(super) fn reference_error(&self, message: impl Into<String>) -> RunError {
        self.attach_loc(RunError::reference_error(message))
    }

    pub(super) fn syntax_error(&self, message: impl Into<String>) -> RunError {
        self.attach_loc(RunError::syntax_error(message))
    }

    pub(super) fn new_object(&self) -> Value {
        Value::Object(Rc::new(std::cell::RefCell::new(ObjectData::new())))
    }
}

fn opcode_from_u8(byte: u8) -> Opcode {
    // `Opcode` is `#[repr(u8)]` with discriminants assigned in declaration
    // order starting at 0; every byte emitted by `CodeBuilder` is one of
    // its own variants, so this table mirrors the enum exactly.
    const TABLE: &[Opcode] = &[
        Opcode::Pop,
        Opcode::Dup,
        Opcode::Dup2,
        Opcode::Swap,
        Opcode::Rot3,
        Opcode::Rot4,
        Opcode::LoadConst,
        Opcode::LoadUndefined,
        Opcode::LoadNull,
        Opcode::LoadTrue,
        Opcode::LoadFalse,
        Opcode::LoadThis,
        Opcode::LoadLocal,
        Opcode::StoreLocal,
        Opcode::LoadName,
        Opcode::StoreName,
        Opcode::LoadCell,
        Opcode::StoreCell,
        Opcode::LoadClosure,
        Opcode::StoreClosure,
        Opcode::GetProp,
        Opcode::SetProp,
        Opcode::DeleteProp,
        Opcode::BuildArray,
        Opcode::BuildObject,
        Opcode::BuildRegex,
        Opcode::MakeClosure,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Pow,
        Opcode::Neg,
        Opcode::Pos,
        Opcode::Inc,
        Opcode::Dec,
        Opcode::BAnd,
        Opcode::BOr,
        Opcode::BXor,
        Opcode::BNot,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::UShr,
        Opcode::Lt,
        Opcode::Le,
        Opcode::Gt,
        Opcode::Ge,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::Seq,
        Opcode::Sne,
        Opcode::Not,
        Opcode::Typeof,
        Opcode::TypeofName,
        Opcode::Instanceof,
        Opcode::In,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::JumpIfTrue,
        Opcode::Call,
        Opcode::CallMethod,
        Opcode::New,
        Opcode::Return,
        Opcode::ReturnUndefined,
        Opcode::Throw,
        Opcode::TryStart,
        Opcode::TryEnd,
        Opcode::Catch,
        Opcode::ForInInit,
        Opcode::ForInNext,
        Opcode::ForOfInit,
        Opcode::ForOfNext,
    ];
    TABLE[byte as usize]
}

/// `%` with JS's dividend-sign semantics (`Rem` in Rust already matches:
/// `a % b` truncates toward zero the same as `fmod`, which is what ECMAScript
/// specifies for the remainder operator).
trait RemEuclidJs {
    fn rem_euclid_js(self, rhs: Self) -> Self;
}

impl RemEuclidJs for f64 {
    fn rem_euclid_js(self, rhs: Self) -> Self {
        self % rhs
    }
}
