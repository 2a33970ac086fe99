//! Bytecode emission (§4.4), grounded on `ouros::bytecode::builder::CodeBuilder`:
//! forward jumps emit a placeholder offset and return a [`JumpLabel`] to
//! patch once the target is known; backward jumps (loop heads) already know
//! their target and are emitted directly.

use std::rc::Rc;

use super::code::{CaptureSource, CompiledFunction, ConstValue, LocationEntry};
use super::op::Opcode;

#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    constants: Vec<ConstValue>,
    locations: Vec<LocationEntry>,
    current_loc: Option<(u32, u32)>,
    stack_depth: i32,
    max_stack_depth: u16,
}

impl CodeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_location(&mut self, line: u32, column: u32) {
        self.current_loc = Some((line, column));
    }

    fn mark_location(&mut self) {
        if let Some((line, column)) = self.current_loc.take() {
            self.locations.push(LocationEntry { offset: self.bytecode.len(), line, column });
        }
    }

    /// Manually adjusts the tracked stack depth; used by the compiler after
    /// emitting variable-arity opcodes (`BuildArray n`, `Call n`, ...) whose
    /// effect `Opcode::stack_effect` cannot express.
    pub fn adjust_stack(&mut self, delta: i32) {
        self.stack_depth += delta;
        debug_assert!(self.stack_depth >= 0, "operand stack underflow during compilation");
        if self.stack_depth > i32::from(self.max_stack_depth) {
            self.max_stack_depth = u16::try_from(self.stack_depth).unwrap_or(u16::MAX);
        }
    }

    fn apply_fixed_effect(&mut self, op: Opcode) {
        if let Some(effect) = op.stack_effect() {
            self.adjust_stack(i32::from(effect));
        }
    }

    pub fn emit(&mut self, op: Opcode) {
        self.mark_location();
        self.bytecode.push(op as u8);
        self.apply_fixed_effect(op);
    }

    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.mark_location();
        self.bytecode.push(op as u8);
        self.bytecode.push(operand);
        self.apply_fixed_effect(op);
    }

    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.mark_location();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        self.apply_fixed_effect(op);
    }

    pub fn emit_u16_u8(&mut self, op: Opcode, operand1: u16, operand2: u8) {
        self.mark_location();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand1.to_le_bytes());
        self.bytecode.push(operand2);
        self.apply_fixed_effect(op);
    }

    /// Emits a forward jump with a placeholder offset, to be fixed up by
    /// [`Self::patch_jump`].
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        self.mark_location();
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&0i16.to_le_bytes());
        self.apply_fixed_effect(op);
        label
    }

    /// Patches a forward jump's offset to target the current position,
    /// relative to the byte just past the offset operand.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        self.patch_jump_to(label, self.bytecode.len());
    }

    pub fn patch_jump_to(&mut self, label: JumpLabel, target: usize) {
        let raw = target as i64 - label.0 as i64 - 3;
        let offset = i16::try_from(raw).expect("jump offset exceeds i16 range; function too large");
        let bytes = offset.to_le_bytes();
        self.bytecode[label.0 + 1] = bytes[0];
        self.bytecode[label.0 + 2] = bytes[1];
    }

    /// Emits a backward jump to an already-known target (a loop head).
    pub fn emit_jump_to(&mut self, op: Opcode, target: usize) {
        self.mark_location();
        let current = self.bytecode.len();
        let raw = target as i64 - (current as i64 + 3);
        let offset = i16::try_from(raw).expect("jump offset exceeds i16 range; function too large");
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&offset.to_le_bytes());
        self.apply_fixed_effect(op);
    }

    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    #[must_use]
    pub fn stack_depth(&self) -> i32 {
        self.stack_depth
    }

    /// Resets the tracked depth after compiling a branch that will not fall
    /// through to the next one (`if`/`else`, ternary arms, `switch` cases):
    /// the builder only simulates straight-line execution, so the compiler
    /// must rewind to the pre-branch depth before compiling the next
    /// mutually-exclusive arm.
    pub fn set_stack_depth(&mut self, depth: i32) {
        self.stack_depth = depth;
    }

    fn add_const(&mut self, c: ConstValue) -> u16 {
        let idx = self.constants.len();
        self.constants.push(c);
        u16::try_from(idx).expect("constant pool exceeds 65535 entries")
    }

    #[must_use]
    pub fn add_number(&mut self, n: f64) -> u16 {
        self.add_const(ConstValue::Number(n))
    }

    #[must_use]
    pub fn add_str(&mut self, s: Rc<str>) -> u16 {
        self.add_const(ConstValue::Str(s))
    }

    #[must_use]
    pub fn add_name(&mut self, s: Rc<str>) -> u16 {
        self.add_const(ConstValue::Name(s))
    }

    #[must_use]
    pub fn add_function(&mut self, f: Rc<CompiledFunction>) -> u16 {
        self.add_const(ConstValue::Function(f))
    }

    #[must_use]
    pub fn add_regex(&mut self, pattern: Rc<str>, flags: Rc<str>) -> u16 {
        self.add_const(ConstValue::Regex { pattern, flags })
    }

    #[must_use]
    pub fn build(
        self,
        name: Rc<str>,
        param_count: usize,
        num_locals: u16,
        cell_slots: Vec<u16>,
        free_vars: Vec<Rc<str>>,
        capture_sources: Vec<CaptureSource>,
        is_arrow: bool,
    ) -> CompiledFunction {
        CompiledFunction {
            name,
            param_count,
            num_locals,
            cell_slots,
            free_vars,
            capture_sources,
            bytecode: self.bytecode,
            constants: self.constants,
            locations: self.locations,
            max_stack_depth: self.max_stack_depth,
            is_arrow,
        }
    }
}
